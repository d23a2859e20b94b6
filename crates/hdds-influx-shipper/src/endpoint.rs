// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Payload delivery with retry-on-success.
//!
//! [`ApiEndpoint`] wraps a [`Transport`] with the retry FIFO:
//!
//! ```text
//! post_series(p) --> Accepted    --> drain retry FIFO --> true
//!                --> Rejected    --> log, drop p       --> false
//!                --> Unreachable --> queue p           --> false
//! ```
//!
//! Failed payloads are never retried synchronously. They wait until a later
//! payload proves the endpoint is reachable again.

use crate::config::EndpointConfig;
use crate::retry::{
    DrainReport, RetryQueue, DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_MAX_RETRY_QUEUE_LEN,
};
use crate::transport::{Delivery, EndpointError, HttpTransport, Transport};
use tracing::Dispatch;

/// Destination for encoded batches.
///
/// Implemented by [`ApiEndpoint`]; tests and embedders can substitute their
/// own.
pub trait Endpoint: Send {
    /// Deliver one payload. Returns `true` if the endpoint accepted it.
    fn post_series(&mut self, series: String) -> bool;
}

/// Endpoint that owns a transport and its retry FIFO.
pub struct ApiEndpoint<T: Transport = HttpTransport> {
    transport: T,
    retries: RetryQueue,
    dispatch: Dispatch,
}

impl ApiEndpoint<HttpTransport> {
    /// Build an HTTP endpoint from configuration.
    ///
    /// Fails on an invalid URI or missing database; a malformed proxy only
    /// degrades to the system default proxy.
    pub fn connect(config: &EndpointConfig, dispatch: &Dispatch) -> Result<Self, EndpointError> {
        let transport =
            tracing::dispatcher::with_default(dispatch, || HttpTransport::new(config))?;
        let retries = RetryQueue::new(
            config.max_retry_attempts.unwrap_or(DEFAULT_MAX_RETRY_ATTEMPTS),
            config.max_retry_queue_len.unwrap_or(DEFAULT_MAX_RETRY_QUEUE_LEN),
        );
        Ok(Self::with_retry_queue(transport, retries, dispatch.clone()))
    }
}

impl<T: Transport> ApiEndpoint<T> {
    /// Wrap `transport` with a default retry queue.
    pub fn with_transport(transport: T, dispatch: Dispatch) -> Self {
        Self::with_retry_queue(transport, RetryQueue::default(), dispatch)
    }

    /// Wrap `transport` with the given retry queue.
    pub fn with_retry_queue(transport: T, retries: RetryQueue, dispatch: Dispatch) -> Self {
        Self {
            transport,
            retries,
            dispatch,
        }
    }

    /// Number of payloads waiting for a retry.
    pub fn pending_retries(&self) -> usize {
        self.retries.len()
    }

    /// The retry FIFO, oldest entry first.
    pub fn retry_queue(&self) -> &RetryQueue {
        &self.retries
    }

    /// The wrapped transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn deliver(&mut self, series: String) -> bool {
        match self.transport.post(&series) {
            Delivery::Accepted => {
                tracing::trace!(bytes = series.len(), "Series accepted");
                if !self.retries.is_empty() {
                    let transport = &mut self.transport;
                    let report = self.retries.drain(|payload| transport.post(payload));
                    log_drain(&report);
                }
                true
            }
            Delivery::Rejected { status, reason } => {
                tracing::warn!(
                    status,
                    %reason,
                    bytes = series.len(),
                    "Endpoint rejected series, dropping payload"
                );
                false
            }
            Delivery::Unreachable(reason) => {
                tracing::error!(
                    %reason,
                    bytes = series.len(),
                    pending = self.retries.len() + 1,
                    "Failed to post series, queued for retry"
                );
                self.retries.push(series);
                false
            }
        }
    }
}

impl<T: Transport> Endpoint for ApiEndpoint<T> {
    fn post_series(&mut self, series: String) -> bool {
        let dispatch = self.dispatch.clone();
        tracing::dispatcher::with_default(&dispatch, || self.deliver(series))
    }
}

fn log_drain(report: &DrainReport) {
    if report.resent + report.given_up == 0 {
        return;
    }
    tracing::info!(
        resent = report.resent,
        given_up = report.given_up,
        pending = report.pending,
        "Drained retry queue"
    );
}
