// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Builds observers wired to HTTP endpoints.

use crate::config::{EndpointConfig, ObserverConfig, ShipperConfig};
use crate::endpoint::ApiEndpoint;
use crate::observer::InfluxObserver;
use crate::transport::EndpointError;
use tracing::Dispatch;

/// Creates [`InfluxObserver`]s backed by [`ApiEndpoint`]s.
///
/// Every component built by the factory logs to the factory's dispatcher.
#[derive(Debug, Clone, Default)]
pub struct InfluxObserverFactory {
    dispatch: Dispatch,
}

impl InfluxObserverFactory {
    /// Factory logging to the current default subscriber.
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory logging to `dispatch`.
    pub fn with_dispatch(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// One stopped observer for `endpoint`.
    pub fn create(
        &self,
        endpoint: &EndpointConfig,
        observer: &ObserverConfig,
    ) -> Result<InfluxObserver, EndpointError> {
        let api = ApiEndpoint::connect(endpoint, &self.dispatch)?;
        Ok(InfluxObserver::new(api, observer, self.dispatch.clone()))
    }

    /// One stopped observer per configured endpoint.
    ///
    /// Fails on the first invalid endpoint.
    pub fn create_all(&self, config: &ShipperConfig) -> Result<Vec<InfluxObserver>, EndpointError> {
        let observer = config.observer();
        config
            .endpoints
            .iter()
            .map(|endpoint| self.create(endpoint, &observer))
            .collect()
    }

    /// Observer with default buffering for `uri` and `database`.
    ///
    /// `proxy` follows [`crate::transport::ProxySpec`]; pass `""` for the
    /// system default.
    pub fn create_from_uri(
        &self,
        uri: &str,
        database: &str,
        proxy: &str,
    ) -> Result<InfluxObserver, EndpointError> {
        let endpoint = EndpointConfig {
            uri: uri.to_string(),
            database: database.to_string(),
            proxy: Some(proxy.to_string()),
            ..Default::default()
        };
        self.create(&endpoint, &ObserverConfig::default())
    }
}
