// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Single-attempt delivery of encoded payloads to an InfluxDB endpoint.
//!
//! A [`Transport`] performs exactly one POST per call and classifies the
//! outcome. Retry policy lives one level up in [`crate::endpoint`].

use crate::config::EndpointConfig;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Proxy, StatusCode, Url};
use std::time::Duration;
use thiserror::Error;

/// Status acknowledging a write when none is configured (`202 Accepted`).
///
/// Stock InfluxDB 1.x answers `204 No Content`; set
/// `accepted_status: 204` when talking to it directly.
pub const DEFAULT_ACCEPTED_STATUS: u16 = 202;

/// Per-request timeout when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response body excerpt kept for logging a rejection.
const MAX_REASON_LEN: usize = 256;

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The endpoint acknowledged the write.
    Accepted,
    /// The endpoint answered with any other status. Resending the same
    /// payload cannot succeed without a configuration change.
    Rejected { status: u16, reason: String },
    /// The request never completed (connect, reset, timeout, I/O).
    /// The payload is eligible for retry.
    Unreachable(String),
}

/// Sends one payload per call.
pub trait Transport: Send {
    /// POST `body` to the endpoint and classify the outcome.
    fn post(&mut self, body: &str) -> Delivery;
}

/// Errors raised while building an endpoint. These are fatal at startup.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("invalid endpoint uri '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("unsupported endpoint scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),

    #[error("no database configured for endpoint '{0}'")]
    MissingDatabase(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Proxy address with optional basic credentials.
///
/// Accepted format: `http[s]://[username]:[password]@host[:port]`. A bare
/// `host[:port]` is read as an `http://` proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySpec {
    /// Proxy address without credentials.
    pub url: Url,
    /// `(username, password)` when present in the descriptor.
    pub credentials: Option<(String, String)>,
}

impl ProxySpec {
    /// Parse a proxy descriptor.
    ///
    /// Returns `None` for an empty descriptor and for a malformed one; both
    /// mean the system default proxy is used. Malformed descriptors are
    /// logged.
    pub fn parse(descriptor: &str) -> Option<Self> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return None;
        }

        let candidate = if descriptor.contains("://") {
            descriptor.to_string()
        } else {
            format!("http://{}", descriptor)
        };

        let mut url = match Url::parse(&candidate) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => url,
            _ => {
                tracing::warn!(
                    proxy = %redact_userinfo(descriptor),
                    "Malformed proxy descriptor, using system default proxy"
                );
                return None;
            }
        };

        let credentials = if url.username().is_empty() && url.password().is_none() {
            None
        } else {
            Some((
                url.username().to_string(),
                url.password().unwrap_or_default().to_string(),
            ))
        };
        // Credentials travel via basic auth, not the proxy URL.
        let _ = url.set_username("");
        let _ = url.set_password(None);

        Some(Self { url, credentials })
    }

    fn to_proxy(&self) -> reqwest::Result<Proxy> {
        let proxy = Proxy::all(self.url.clone())?;
        Ok(match &self.credentials {
            Some((user, pass)) => proxy.basic_auth(user, pass),
            None => proxy,
        })
    }
}

/// Blocking HTTP transport to `<base-uri>/write?db=<database>`.
///
/// Owns its client and cookie store; only one request is in flight at a
/// time since the caller holds `&mut self`.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    write_url: Url,
    accepted: StatusCode,
}

impl HttpTransport {
    /// Build a transport from endpoint configuration.
    pub fn new(config: &EndpointConfig) -> Result<Self, EndpointError> {
        let write_url = write_url(&config.uri, &config.database)?;

        let accepted_code = config.accepted_status.unwrap_or(DEFAULT_ACCEPTED_STATUS);
        let accepted =
            StatusCode::from_u16(accepted_code).map_err(|e| EndpointError::InvalidUri {
                uri: config.uri.clone(),
                reason: format!("accepted status {}: {}", accepted_code, e),
            })?;

        let timeout = config
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);

        let mut builder = Client::builder().timeout(timeout).cookie_store(true);
        if let Some(spec) = config.proxy.as_deref().and_then(ProxySpec::parse) {
            builder = builder.proxy(spec.to_proxy()?);
        }
        let client = builder.build()?;

        tracing::debug!(url = %write_url, timeout_ms = timeout.as_millis() as u64, "HTTP transport ready");

        Ok(Self {
            client,
            write_url,
            accepted,
        })
    }

    /// Fully resolved write URL.
    pub fn write_url(&self) -> &Url {
        &self.write_url
    }
}

impl Transport for HttpTransport {
    fn post(&mut self, body: &str) -> Delivery {
        let result = self
            .client
            .post(self.write_url.clone())
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .header(ACCEPT, "*/*")
            .body(body.to_owned())
            .send();

        match result {
            Ok(response) if response.status() == self.accepted => Delivery::Accepted,
            Ok(response) => {
                let status = response.status();
                let mut reason = response.text().unwrap_or_default();
                if reason.trim().is_empty() {
                    reason = status.canonical_reason().unwrap_or("unknown").to_string();
                }
                truncate_at_char_boundary(&mut reason, MAX_REASON_LEN);
                Delivery::Rejected {
                    status: status.as_u16(),
                    reason,
                }
            }
            Err(e) => Delivery::Unreachable(e.to_string()),
        }
    }
}

/// Resolve `<base>/write?db=<database>`, keeping any base path prefix.
pub fn write_url(base: &str, database: &str) -> Result<Url, EndpointError> {
    let base = base.trim();
    let mut url = Url::parse(base).map_err(|e| EndpointError::InvalidUri {
        uri: base.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(EndpointError::UnsupportedScheme(url.scheme().to_string()));
    }
    if database.trim().is_empty() {
        return Err(EndpointError::MissingDatabase(base.to_string()));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    let mut url = url.join("write").map_err(|e| EndpointError::InvalidUri {
        uri: base.to_string(),
        reason: e.to_string(),
    })?;
    url.query_pairs_mut().clear().append_pair("db", database.trim());

    Ok(url)
}

fn redact_userinfo(descriptor: &str) -> String {
    match descriptor.rsplit_once('@') {
        Some((_, host)) => format!("***@{}", host),
        None => descriptor.to_string(),
    }
}

fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
