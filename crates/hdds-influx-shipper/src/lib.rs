// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS InfluxDB Shipper
//!
//! Buffers tagged measurements and ships them to an InfluxDB `/write`
//! endpoint in Line Protocol.
//!
//! This crate provides:
//! - Lock-free ingest from any number of producer threads
//! - A non-reentrant periodic flush capped at a batch size per payload
//! - HTTP delivery with retry-on-success for transport failures
//! - YAML-based endpoint configuration
//!
//! # Overview
//!
//! ```text
//! observe() --> IngestBuffer --> flush cycle --> encode_batch --> ApiEndpoint --> HttpTransport
//!                                                                   |
//!                                                              RetryQueue
//! ```
//!
//! Delivery is at-most-once per point. A payload that fails at the
//! transport level is retried only after a later payload succeeds, at most
//! a bounded number of times.
//!
//! # Example
//!
//! ```rust,ignore
//! use hdds_influx_shipper::InfluxObserverFactory;
//! use std::time::SystemTime;
//!
//! let observer = InfluxObserverFactory::new()
//!     .create_from_uri("http://localhost:8086", "metrics", "")?;
//! observer.start();
//! observer.observe("cpu", [("host", "a")], 0.42, SystemTime::now());
//! // ...
//! observer.stop();
//! observer.flush();
//! ```

pub mod buffer;
pub mod config;
pub mod endpoint;
pub mod factory;
pub mod line_protocol;
pub mod observer;
pub mod point;
pub mod retry;
pub mod scheduler;
pub mod transport;

pub use buffer::IngestBuffer;
pub use config::{ConfigError, EndpointConfig, ObserverConfig, ShipperConfig};
pub use endpoint::{ApiEndpoint, Endpoint};
pub use factory::InfluxObserverFactory;
pub use observer::{InfluxObserver, ShipperStats};
pub use point::{Point, PointError};
pub use retry::{RetryEntry, RetryQueue};
pub use scheduler::NonReentrantSchedule;
pub use transport::{Delivery, EndpointError, HttpTransport, ProxySpec, Transport};
