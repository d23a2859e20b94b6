// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Retry FIFO for payloads that failed at the transport level.
//!
//! Entries are only resent after a fresh payload was accepted, so a
//! still-down endpoint is never hammered. Draining is oldest-first and stops
//! at the first resend that fails again, keeping the remaining entries (and
//! their order) for the next successful send.

use crate::transport::Delivery;
use std::collections::VecDeque;

/// Default number of failed resends tolerated before an entry is dropped.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 5;

/// Default cap on queued entries. The oldest entry is dropped on overflow.
pub const DEFAULT_MAX_RETRY_QUEUE_LEN: usize = 1024;

/// A previously failed payload and its failed resend count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEntry {
    /// Already-encoded batch.
    pub payload: String,
    /// Number of resends that failed so far.
    pub attempts: u32,
}

impl RetryEntry {
    /// New entry for a payload that has not been resent yet.
    pub fn new(payload: String) -> Self {
        Self {
            payload,
            attempts: 0,
        }
    }
}

/// Outcome of one [`RetryQueue::drain`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries resent and accepted.
    pub resent: usize,
    /// Entries dropped because they exceeded the attempt limit.
    pub given_up: usize,
    /// Entries left in the queue.
    pub pending: usize,
}

/// Insertion-ordered queue of [`RetryEntry`] values.
#[derive(Debug)]
pub struct RetryQueue {
    entries: VecDeque<RetryEntry>,
    max_attempts: u32,
    max_len: usize,
    dropped_on_overflow: u64,
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_MAX_RETRY_QUEUE_LEN)
    }
}

impl RetryQueue {
    /// Create a queue with the given attempt limit and capacity.
    ///
    /// A `max_len` of zero is treated as one: the most recent failure is
    /// always kept.
    pub fn new(max_attempts: u32, max_len: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_attempts,
            max_len: max_len.max(1),
            dropped_on_overflow: 0,
        }
    }

    /// Queue a payload that just failed, dropping the oldest entry if full.
    pub fn push(&mut self, payload: String) {
        if self.entries.len() >= self.max_len {
            if let Some(oldest) = self.entries.pop_front() {
                self.dropped_on_overflow += 1;
                tracing::warn!(
                    attempts = oldest.attempts,
                    bytes = oldest.payload.len(),
                    max_len = self.max_len,
                    "Retry queue full, dropping oldest payload"
                );
            }
        }
        self.entries.push_back(RetryEntry::new(payload));
    }

    /// Resend queued payloads oldest-first through `post`.
    ///
    /// - entries past the attempt limit are dropped and draining continues
    /// - accepted resends are discarded and draining continues
    /// - the first resend that is not accepted, whether rejected or
    ///   unreachable, bumps that entry's attempt count and stops the pass
    pub fn drain<F>(&mut self, mut post: F) -> DrainReport
    where
        F: FnMut(&str) -> Delivery,
    {
        let mut report = DrainReport::default();

        while let Some(entry) = self.entries.front_mut() {
            if entry.attempts > self.max_attempts {
                tracing::warn!(
                    attempts = entry.attempts,
                    bytes = entry.payload.len(),
                    "Giving up retrying payload"
                );
                self.entries.pop_front();
                report.given_up += 1;
                continue;
            }

            match post(&entry.payload) {
                Delivery::Accepted => {
                    self.entries.pop_front();
                    report.resent += 1;
                }
                Delivery::Rejected { status, reason } => {
                    entry.attempts += 1;
                    tracing::warn!(
                        attempts = entry.attempts,
                        status,
                        %reason,
                        "Endpoint rejected retried payload, keeping it queued"
                    );
                    break;
                }
                Delivery::Unreachable(reason) => {
                    entry.attempts += 1;
                    tracing::debug!(
                        attempts = entry.attempts,
                        %reason,
                        "Retry failed, keeping payload queued"
                    );
                    break;
                }
            }
        }

        report.pending = self.entries.len();
        report
    }

    /// Queued entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &RetryEntry> {
        self.entries.iter()
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries evicted because the queue was full.
    pub fn dropped_on_overflow(&self) -> u64 {
        self.dropped_on_overflow
    }

    /// Attempt limit for this queue.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
