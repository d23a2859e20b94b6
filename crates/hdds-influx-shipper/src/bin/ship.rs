// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS InfluxDB Shipper CLI
//!
//! Reads measurements from stdin and ships them to InfluxDB.
//!
//! # Usage
//!
//! ```bash
//! # One endpoint from the command line
//! echo "cpu,host=a 0.42" | hdds-influx-ship --uri http://localhost:8086 --database metrics
//!
//! # Endpoints from a YAML file
//! tail -F samples.txt | hdds-influx-ship --config shipper.yaml
//! ```
//!
//! Input lines: `name[,tag=value...] value [timestamp_ns]`. Lines without a
//! timestamp are stamped on arrival.

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam::channel::{self, RecvTimeoutError};
use hdds_influx_shipper::{
    EndpointConfig, InfluxObserver, InfluxObserverFactory, ObserverConfig, Point, ShipperConfig,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "hdds-influx-ship")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ship measurements read from stdin to InfluxDB")]
#[command(long_about = None)]
struct Cli {
    /// YAML configuration file (overrides --uri/--database/--proxy)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// InfluxDB base URI
    #[arg(short, long)]
    uri: Option<String>,

    /// Target database
    #[arg(short, long)]
    database: Option<String>,

    /// Proxy: http[s]://[user]:[pass]@host[:port]
    #[arg(long, default_value = "")]
    proxy: String,

    /// Time-to-live of buffered points in milliseconds (flush every ttl/2)
    #[arg(long)]
    ttl_ms: Option<u64>,

    /// Verbose mode (show internal logs)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("hdds_influx_shipper=debug,hdds_influx_ship=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("hdds_influx_shipper=info,hdds_influx_ship=info"))
    };
    fmt().with_env_filter(filter).with_target(false).init();

    let config = build_config(&cli)?;
    let observers = InfluxObserverFactory::new()
        .create_all(&config)
        .context("Failed to create InfluxDB endpoints")?;

    for observer in &observers {
        observer.start();
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    let _ = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        r.store(false, Ordering::SeqCst);
    });

    let (tx, rx) = channel::unbounded::<String>();
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn stdin reader")?;

    let mut parsed = 0u64;
    let mut skipped = 0u64;
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(line) => match parse_line(&line, SystemTime::now()) {
                Some(point) => {
                    parsed += 1;
                    observe_all(&observers, point);
                }
                None if line.trim().is_empty() => {}
                None => {
                    skipped += 1;
                    tracing::debug!(line = %line, "Skipping unparsable line");
                }
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    for observer in &observers {
        observer.stop();
        observer.flush();
        let stats = observer.stats();
        tracing::info!(
            points_observed = stats.points_observed,
            batches_sent = stats.batches_sent,
            batches_failed = stats.batches_failed,
            "Observer shutdown complete"
        );
    }
    tracing::info!(parsed, skipped, "Shipper shutdown complete");

    Ok(())
}

fn build_config(cli: &Cli) -> Result<ShipperConfig> {
    let mut config = match &cli.config {
        Some(path) => ShipperConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            let (Some(uri), Some(database)) = (&cli.uri, &cli.database) else {
                bail!("either --config or both --uri and --database are required");
            };
            ShipperConfig {
                endpoints: vec![EndpointConfig {
                    uri: uri.clone(),
                    database: database.clone(),
                    proxy: Some(cli.proxy.clone()),
                    ..Default::default()
                }],
                shipper: None,
            }
        }
    };

    if let Some(ttl_ms) = cli.ttl_ms {
        config.shipper.get_or_insert_with(ObserverConfig::default).ttl_ms = Some(ttl_ms);
    }
    Ok(config)
}

fn observe_all(observers: &[InfluxObserver], point: Point) {
    if let Some((last, rest)) = observers.split_last() {
        for observer in rest {
            observer.observe_point(point.clone());
        }
        last.observe_point(point);
    }
}

/// Parse `name[,tag=value...] value [timestamp_ns]`.
fn parse_line(line: &str, now: SystemTime) -> Option<Point> {
    let mut parts = line.split_whitespace();
    let series = parts.next()?;
    let value: f64 = parts.next()?.parse().ok()?;
    let timestamp = parts.next().map(str::parse::<i64>);
    if parts.next().is_some() {
        return None;
    }

    let mut series = series.split(',');
    let name = series.next()?;
    let mut tags = Vec::new();
    for tag in series {
        let (k, v) = tag.split_once('=')?;
        if k.is_empty() {
            return None;
        }
        tags.push((k, v));
    }

    match timestamp {
        Some(ts) => Point::at_nanos(name, tags, value, ts.ok()?).ok(),
        None => Point::new(name, tags, value, now).ok(),
    }
}
