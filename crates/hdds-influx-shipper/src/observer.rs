// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Measurement observer: buffering, periodic flushing and lifecycle.
//!
//! Connects the ingest buffer, line protocol encoding and an [`Endpoint`]
//! into a single entry point.
//!
//! ```text
//! observe() --> IngestBuffer --(every ttl/2)--> drain <= batch_size
//!                                            --> encode_batch --> Endpoint
//! ```

use crate::buffer::IngestBuffer;
use crate::config::ObserverConfig;
use crate::endpoint::Endpoint;
use crate::line_protocol::encode_batch;
use crate::point::Point;
use crate::scheduler::NonReentrantSchedule;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::Dispatch;

/// Counters snapshot for an observer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShipperStats {
    /// Points accepted into the buffer.
    pub points_observed: u64,
    /// Points discarded at observe time (see [`PointError`](crate::PointError)).
    pub points_dropped: u64,
    /// Payloads the endpoint accepted.
    pub batches_sent: u64,
    /// Payloads the endpoint did not accept.
    pub batches_failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    points_observed: AtomicU64,
    points_dropped: AtomicU64,
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
}

/// State shared between callers and the flush worker.
struct Shared {
    buffer: IngestBuffer,
    endpoint: Mutex<Box<dyn Endpoint>>,
    batch_size: usize,
    counters: Counters,
}

impl Shared {
    /// One flush cycle: drain and send until a drain comes back short.
    ///
    /// Holding the endpoint lock for the whole cycle keeps the buffer
    /// single-consumer even when `flush()` races a scheduled tick.
    fn flush_cycle(&self) {
        let mut endpoint = self.endpoint.lock();
        loop {
            let batch = self.buffer.drain_up_to(self.batch_size);
            if batch.is_empty() {
                break;
            }
            let full = batch.len() == self.batch_size;
            self.send(&mut endpoint, &batch);
            if !full {
                break;
            }
        }
    }

    fn send(&self, endpoint: &mut Box<dyn Endpoint>, points: &[Point]) -> bool {
        let posted = endpoint.post_series(encode_batch(points));
        let counter = if posted {
            &self.counters.batches_sent
        } else {
            &self.counters.batches_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(points = points.len(), posted, "Flushed batch");
        posted
    }
}

/// Buffers observed measurements and ships them to an endpoint on a fixed
/// schedule.
///
/// Safe to share across threads; `observe` never blocks on the network.
pub struct InfluxObserver {
    shared: Arc<Shared>,
    schedule: NonReentrantSchedule,
    dispatch: Dispatch,
}

impl InfluxObserver {
    /// Create a stopped observer. Call [`start`](Self::start) to begin
    /// flushing every `ttl / 2`.
    pub fn new(endpoint: impl Endpoint + 'static, config: &ObserverConfig, dispatch: Dispatch) -> Self {
        let shared = Arc::new(Shared {
            buffer: IngestBuffer::new(),
            endpoint: Mutex::new(Box::new(endpoint)),
            batch_size: config.batch_size(),
            counters: Counters::default(),
        });
        let schedule = NonReentrantSchedule::every(config.ttl() / 2).dispatch(dispatch.clone());

        Self {
            shared,
            schedule,
            dispatch,
        }
    }

    /// Start the periodic flush. Returns `false` if already running.
    pub fn start(&self) -> bool {
        let shared = self.shared.clone();
        let started = self.schedule.run(move || shared.flush_cycle());
        if started {
            tracing::dispatcher::with_default(&self.dispatch, || {
                tracing::info!(
                    period_ms = self.schedule.period().as_millis() as u64,
                    batch_size = self.shared.batch_size,
                    "Started InfluxDB observer"
                );
            });
        }
        started
    }

    /// Stop the periodic flush, waiting for an in-flight flush to finish.
    ///
    /// Buffered points stay queued; call [`flush`](Self::flush) to send them.
    pub fn stop(&self) {
        if !self.schedule.is_running() {
            return;
        }
        self.schedule.stop();
        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::info!(pending = self.shared.buffer.len(), "Stopped InfluxDB observer");
        });
    }

    /// Check if the periodic flush is running.
    pub fn is_running(&self) -> bool {
        self.schedule.is_running()
    }

    /// Record a measurement observed at `timestamp`.
    ///
    /// Never fails: invalid measurements are counted and discarded.
    pub fn observe<I, K, V>(&self, name: impl Into<String>, tags: I, value: f64, timestamp: SystemTime)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        match Point::new(name, tags, value, timestamp) {
            Ok(point) => self.observe_point(point),
            Err(e) => {
                self.shared.counters.points_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::dispatcher::with_default(&self.dispatch, || {
                    tracing::debug!(error = %e, "Discarding measurement");
                });
            }
        }
    }

    /// Record an already-built point.
    pub fn observe_point(&self, point: Point) {
        self.shared.buffer.enqueue(point);
        self.shared.counters.points_observed.fetch_add(1, Ordering::Relaxed);
    }

    /// Encode `points` into one payload and send it synchronously.
    pub fn post(&self, points: &[Point]) -> bool {
        let mut endpoint = self.shared.endpoint.lock();
        tracing::dispatcher::with_default(&self.dispatch, || {
            self.shared.send(&mut endpoint, points)
        })
    }

    /// Run one flush cycle on the calling thread.
    pub fn flush(&self) {
        tracing::dispatcher::with_default(&self.dispatch, || self.shared.flush_cycle());
    }

    /// Points waiting in the buffer.
    pub fn pending_points(&self) -> usize {
        self.shared.buffer.len()
    }

    /// Interval between scheduled flushes.
    pub fn flush_period(&self) -> Duration {
        self.schedule.period()
    }

    /// Current counters.
    pub fn stats(&self) -> ShipperStats {
        let c = &self.shared.counters;
        ShipperStats {
            points_observed: c.points_observed.load(Ordering::Relaxed),
            points_dropped: c.points_dropped.load(Ordering::Relaxed),
            batches_sent: c.batches_sent.load(Ordering::Relaxed),
            batches_failed: c.batches_failed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for InfluxObserver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::ApiEndpoint;
    use crate::transport::{Delivery, Transport};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::thread;
    use std::time::UNIX_EPOCH;

    /// Records every payload; optionally slow or failing.
    #[derive(Clone, Default)]
    struct RecordingEndpoint {
        posted: Arc<Mutex<Vec<String>>>,
        delay: Duration,
        accept: bool,
        in_flight: Arc<AtomicBool>,
        completed: Arc<AtomicBool>,
    }

    impl RecordingEndpoint {
        fn accepting() -> Self {
            Self {
                accept: true,
                ..Default::default()
            }
        }

        fn payloads(&self) -> Vec<String> {
            self.posted.lock().clone()
        }
    }

    impl Endpoint for RecordingEndpoint {
        fn post_series(&mut self, series: String) -> bool {
            self.in_flight.store(true, Ordering::SeqCst);
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            self.posted.lock().push(series);
            self.completed.store(true, Ordering::SeqCst);
            self.accept
        }
    }

    fn config(ttl_ms: u64, batch_size: usize) -> ObserverConfig {
        ObserverConfig {
            ttl_ms: Some(ttl_ms),
            batch_size: Some(batch_size),
        }
    }

    fn observer(endpoint: &RecordingEndpoint, ttl_ms: u64) -> InfluxObserver {
        InfluxObserver::new(endpoint.clone(), &config(ttl_ms, 5000), Dispatch::none())
    }

    fn no_tags() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn test_observe_then_flush_cpu_scenario() {
        let ep = RecordingEndpoint::accepting();
        let obs = observer(&ep, 60_000);

        let ts = UNIX_EPOCH + Duration::new(1_700_000_000, 5);
        obs.observe("cpu", [("host", "a")], 0.42, ts);
        obs.flush();

        assert_eq!(
            ep.payloads(),
            vec!["cpu,host=a value=0.42 1700000000000000005\n".to_string()]
        );
    }

    #[test]
    fn test_two_observations_share_one_payload() {
        let ep = RecordingEndpoint::accepting();
        let obs = observer(&ep, 60_000);

        let ts = UNIX_EPOCH + Duration::from_secs(10);
        obs.observe("myMetric", [("tag1", "tagValue1")], 1000.0, ts);
        obs.observe("myMetric", [("tag1", "tagValue1")], 1000.0, ts);
        obs.flush();

        let line = "myMetric,tag1=tagValue1 value=1000 10000000000\n";
        assert_eq!(ep.payloads(), vec![format!("{}{}", line, line)]);
    }

    #[test]
    fn test_empty_flush_makes_no_call() {
        let ep = RecordingEndpoint::accepting();
        let obs = observer(&ep, 60_000);

        obs.flush();
        obs.flush();
        assert!(ep.payloads().is_empty());
        assert_eq!(obs.stats().batches_sent, 0);
    }

    #[test]
    fn test_idle_ticks_make_no_call() {
        let ep = RecordingEndpoint::accepting();
        let obs = observer(&ep, 20);
        assert!(obs.start());

        thread::sleep(Duration::from_millis(100));
        obs.stop();
        assert!(ep.payloads().is_empty());
    }

    #[test]
    fn test_observe_does_not_send_before_tick() {
        let ep = RecordingEndpoint::accepting();
        let obs = observer(&ep, 3_600_000);
        obs.start();

        obs.observe("cpu", [("host", "a")], 1.0, SystemTime::now());
        thread::sleep(Duration::from_millis(50));

        assert!(ep.payloads().is_empty());
        assert_eq!(obs.pending_points(), 1);
        obs.stop();
    }

    #[test]
    fn test_burst_is_split_into_capped_batches_in_one_cycle() {
        let ep = RecordingEndpoint::accepting();
        let obs = observer(&ep, 60_000);

        for i in 0..12_000i64 {
            obs.observe_point(Point::at_nanos("m", no_tags(), i as f64, i).expect("valid"));
        }
        obs.flush();

        let payloads = ep.payloads();
        let sizes: Vec<usize> = payloads.iter().map(|p| p.lines().count()).collect();
        assert_eq!(sizes, vec![5000, 5000, 2000]);
        assert!(payloads.iter().all(|p| p.ends_with('\n')));

        // Drain order is preserved across batches.
        assert!(payloads[0].starts_with("m value=0 0\n"));
        assert!(payloads[1].starts_with("m value=5000 5000\n"));
        assert!(payloads[2].ends_with("m value=11999 11999\n"));
        assert_eq!(obs.pending_points(), 0);
    }

    #[test]
    fn test_scheduled_tick_drains_burst() {
        let ep = RecordingEndpoint::accepting();
        let obs = observer(&ep, 100);

        for i in 0..12_000i64 {
            obs.observe_point(Point::at_nanos("m", no_tags(), 1.0, i).expect("valid"));
        }
        obs.start();
        thread::sleep(Duration::from_millis(300));
        obs.stop();

        let sizes: Vec<usize> = ep.payloads().iter().map(|p| p.lines().count()).collect();
        assert_eq!(sizes, vec![5000, 5000, 2000]);
    }

    #[test]
    fn test_exact_multiple_of_batch_size() {
        let ep = RecordingEndpoint::accepting();
        let obs = InfluxObserver::new(ep.clone(), &config(60_000, 3), Dispatch::none());

        for i in 0..6i64 {
            obs.observe_point(Point::at_nanos("m", no_tags(), 1.0, i).expect("valid"));
        }
        obs.flush();

        // The third drain comes back empty and makes no call.
        assert_eq!(ep.payloads().len(), 2);
    }

    #[test]
    fn test_stop_waits_for_in_flight_send() {
        let ep = RecordingEndpoint {
            accept: true,
            delay: Duration::from_millis(150),
            ..Default::default()
        };
        let obs = observer(&ep, 20);

        obs.observe("cpu", no_tags(), 1.0, SystemTime::now());
        obs.start();
        while !ep.in_flight.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }

        obs.stop();
        assert!(ep.completed.load(Ordering::SeqCst));
        assert!(!obs.is_running());

        // No ticks after stop.
        obs.observe("cpu", no_tags(), 2.0, SystemTime::now());
        thread::sleep(Duration::from_millis(80));
        assert_eq!(ep.payloads().len(), 1);
        assert_eq!(obs.pending_points(), 1);
    }

    /// Slow transport answering from a script, `Accepted` once exhausted.
    struct SlowTransport {
        script: VecDeque<Delivery>,
        delay: Duration,
        calls: Arc<AtomicUsize>,
        posted: Arc<Mutex<Vec<String>>>,
    }

    impl Transport for SlowTransport {
        fn post(&mut self, body: &str) -> Delivery {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            self.posted.lock().push(body.to_string());
            self.script.pop_front().unwrap_or(Delivery::Accepted)
        }
    }

    #[test]
    fn test_stop_waits_for_retry_drain_of_in_flight_cycle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let posted = Arc::new(Mutex::new(Vec::new()));
        let transport = SlowTransport {
            script: VecDeque::from([Delivery::Unreachable("connection refused".to_string())]),
            delay: Duration::from_millis(80),
            calls: calls.clone(),
            posted: posted.clone(),
        };
        let endpoint = ApiEndpoint::with_transport(transport, Dispatch::none());
        let obs = InfluxObserver::new(endpoint, &config(20, 5000), Dispatch::none());

        let old = Point::at_nanos("old", no_tags(), 1.0, 1).expect("valid");
        assert!(!obs.post(&[old]));

        obs.observe_point(Point::at_nanos("new", no_tags(), 2.0, 2).expect("valid"));
        obs.start();
        // Wait for the scheduled send of "new" to be in flight.
        while calls.load(Ordering::SeqCst) < 2 {
            thread::sleep(Duration::from_millis(1));
        }

        obs.stop();
        assert_eq!(
            *posted.lock(),
            vec![
                "old value=1 1\n".to_string(),
                "new value=2 2\n".to_string(),
                "old value=1 1\n".to_string(),
            ]
        );
        assert_eq!(obs.stats().batches_sent, 1);
    }

    #[test]
    fn test_start_is_idempotent() {
        let ep = RecordingEndpoint::accepting();
        let obs = observer(&ep, 60_000);
        assert!(obs.start());
        assert!(!obs.start());
        obs.stop();
        assert!(obs.start());
        obs.stop();
    }

    #[test]
    fn test_invalid_measurements_are_dropped_silently() {
        let ep = RecordingEndpoint::accepting();
        let obs = observer(&ep, 60_000);

        obs.observe("", no_tags(), 1.0, SystemTime::now());
        obs.observe("m", no_tags(), f64::NAN, SystemTime::now());
        obs.observe("cpu", [("host", "")], 1.0, SystemTime::now());
        obs.observe("cpu", [("", "x")], 1.0, SystemTime::now());
        obs.observe("mem", [("host", "a\nb")], 1.0, SystemTime::now());
        obs.observe("m", no_tags(), 1.0, UNIX_EPOCH);

        let stats = obs.stats();
        assert_eq!(stats.points_observed, 1);
        assert_eq!(stats.points_dropped, 5);
        obs.flush();
        assert_eq!(ep.payloads(), vec!["m value=1 0\n".to_string()]);
    }

    #[test]
    fn test_post_and_failure_stats() {
        let ep = RecordingEndpoint::default();
        let obs = observer(&ep, 60_000);

        let p = Point::at_nanos("m", no_tags(), 1.0, 1).expect("valid");
        assert!(!obs.post(&[p]));
        assert_eq!(ep.payloads(), vec!["m value=1 1\n".to_string()]);
        assert_eq!(obs.stats().batches_failed, 1);
    }

    #[test]
    fn test_flush_period_is_half_ttl() {
        let ep = RecordingEndpoint::accepting();
        assert_eq!(observer(&ep, 10_000).flush_period(), Duration::from_secs(5));
        assert_eq!(observer(&ep, 0).flush_period(), Duration::from_secs(15));
    }

    #[test]
    fn test_concurrent_observers_all_delivered() {
        let ep = RecordingEndpoint::accepting();
        let obs = Arc::new(observer(&ep, 60_000));

        let producers: Vec<_> = (0..4)
            .map(|t| {
                let obs = obs.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        obs.observe("load", [("thread", t.to_string())], i as f64, SystemTime::now());
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().expect("producer");
        }
        obs.flush();

        let lines: usize = ep.payloads().iter().map(|p| p.lines().count()).sum();
        assert_eq!(lines, 2000);
    }
}
