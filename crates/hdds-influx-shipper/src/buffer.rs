// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingest buffer between producers and the flush cycle.
//!
//! Producers push from any thread without taking a lock; the flush cycle is
//! the only consumer and drains in bounded batches.

use crate::point::Point;
use crossbeam::queue::SegQueue;

/// Unbounded multi-producer FIFO of points awaiting transmission.
#[derive(Debug, Default)]
pub struct IngestBuffer {
    points: SegQueue<Point>,
}

impl IngestBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            points: SegQueue::new(),
        }
    }

    /// Append a point. Never blocks.
    pub fn enqueue(&self, point: Point) {
        self.points.push(point);
    }

    /// Remove and return up to `max` points in FIFO order.
    ///
    /// Points enqueued concurrently with the drain may or may not be part of
    /// the returned batch.
    pub fn drain_up_to(&self, max: usize) -> Vec<Point> {
        let mut batch = Vec::with_capacity(max.min(self.points.len()));
        while batch.len() < max {
            match self.points.pop() {
                Some(point) => batch.push(point),
                None => break,
            }
        }
        batch
    }

    /// Number of queued points (a snapshot under concurrency).
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
