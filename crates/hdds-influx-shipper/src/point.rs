// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Measurement points ready for transmission.
//!
//! A [`Point`] is built once when a measurement is reported and never
//! mutated afterwards. Tags are normalized at construction (sorted by key,
//! one value per key) so the encoder can emit them as-is.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Reasons a measurement cannot become a [`Point`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PointError {
    #[error("measurement name is empty")]
    EmptyName,

    #[error("measurement '{name}' has a non-finite value ({value})")]
    NonFiniteValue { name: String, value: f64 },

    #[error("measurement '{name}' has a tag with an empty key")]
    EmptyTagKey { name: String },

    #[error("measurement '{name}' has an empty value for tag '{key}'")]
    EmptyTagValue { name: String, key: String },

    #[error("measurement '{name}' contains a line break")]
    LineBreak { name: String },
}

/// A single timestamped, tagged numeric observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    name: String,
    tags: Vec<(String, String)>,
    value: f64,
    timestamp_ns: i64,
}

impl Point {
    /// Build a point observed at `timestamp`.
    ///
    /// Tags may be given in any order. When a key appears more than once the
    /// last value wins.
    pub fn new<I, K, V>(
        name: impl Into<String>,
        tags: I,
        value: f64,
        timestamp: SystemTime,
    ) -> Result<Self, PointError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::at_nanos(name, tags, value, epoch_nanos(timestamp))
    }

    /// Build a point from a timestamp already expressed as nanoseconds since
    /// the Unix epoch.
    pub fn at_nanos<I, K, V>(
        name: impl Into<String>,
        tags: I,
        value: f64,
        timestamp_ns: i64,
    ) -> Result<Self, PointError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(PointError::EmptyName);
        }
        if !value.is_finite() {
            return Err(PointError::NonFiniteValue { name, value });
        }

        let tags: BTreeMap<String, String> = tags
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        // Line protocol cannot carry these; one bad line fails the whole write.
        if has_line_break(&name) {
            return Err(PointError::LineBreak { name });
        }
        for (key, value) in &tags {
            if key.is_empty() {
                return Err(PointError::EmptyTagKey { name });
            }
            if value.is_empty() {
                return Err(PointError::EmptyTagValue {
                    name,
                    key: key.clone(),
                });
            }
            if has_line_break(key) || has_line_break(value) {
                return Err(PointError::LineBreak { name });
            }
        }

        Ok(Self {
            name,
            tags: tags.into_iter().collect(),
            value,
            timestamp_ns,
        })
    }

    /// Measurement name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags in ascending key order.
    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    /// Measured value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Observation time in nanoseconds since the Unix epoch.
    pub fn timestamp_ns(&self) -> i64 {
        self.timestamp_ns
    }
}

fn has_line_break(s: &str) -> bool {
    s.contains(|c| c == '\n' || c == '\r')
}

/// Nanoseconds since the Unix epoch, negative for earlier instants.
///
/// Saturates at the `i64` range (roughly the years 1677..2262).
pub fn epoch_nanos(timestamp: SystemTime) -> i64 {
    match timestamp.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(e) => i64::try_from(e.duration().as_nanos())
            .map(|n| -n)
            .unwrap_or(i64::MIN),
    }
}
