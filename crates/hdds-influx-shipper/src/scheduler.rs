// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-period, non-reentrant task schedule.
//!
//! # State machine
//! ```text
//! STOPPED --run()--> RUNNING --stop()--> STOPPED
//!            ^                              |
//!            +------------------------------+
//! ```
//!
//! A single worker thread executes the task, so two executions can never
//! overlap. Ticks that come due while the task is still running are skipped
//! and the schedule realigns to the next period boundary.
//!
//! `stop()` wakes the worker through a condvar and joins it, so it returns
//! only once any in-flight execution has finished.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::Dispatch;

/// Stop flag shared with the worker.
#[derive(Debug, Default)]
struct Signal {
    stop: Mutex<bool>,
    wake: Condvar,
}

impl Signal {
    /// Sleep until `deadline` or until stop is requested.
    ///
    /// Returns `true` if the worker should exit.
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut stop = self.stop.lock();
        while !*stop {
            if self.wake.wait_until(&mut stop, deadline).timed_out() {
                break;
            }
        }
        *stop
    }

    fn request_stop(&self) {
        *self.stop.lock() = true;
        self.wake.notify_all();
    }
}

#[derive(Debug)]
struct Worker {
    signal: Arc<Signal>,
    handle: JoinHandle<()>,
}

/// Runs a task once per period on a dedicated thread.
#[derive(Debug)]
pub struct NonReentrantSchedule {
    period: Duration,
    name: String,
    dispatch: Dispatch,
    worker: Mutex<Option<Worker>>,
}

impl NonReentrantSchedule {
    /// Create a stopped schedule firing every `period`.
    ///
    /// A zero period is clamped to one millisecond.
    pub fn every(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            name: "influx-flush".to_string(),
            dispatch: Dispatch::default(),
            worker: Mutex::new(None),
        }
    }

    /// Name given to the worker thread.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Subscriber the worker thread logs to.
    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Interval between executions.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start executing `task` once per period, the first time one period
    /// from now.
    ///
    /// Returns `false` without doing anything if the schedule is already
    /// running.
    pub fn run<F>(&self, mut task: F) -> bool
    where
        F: FnMut() + Send + 'static,
    {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return false;
        }

        let signal = Arc::new(Signal::default());
        let thread_signal = signal.clone();
        let period = self.period;
        let dispatch = self.dispatch.clone();

        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let _guard = tracing::dispatcher::set_default(&dispatch);
                let mut next = Instant::now() + period;
                loop {
                    if thread_signal.wait_until(next) {
                        break;
                    }
                    task();
                    next = next_deadline(next, period, Instant::now());
                }
                tracing::debug!("Schedule worker exited");
            });

        match spawned {
            Ok(handle) => {
                *worker = Some(Worker { signal, handle });
                true
            }
            Err(e) => {
                tracing::dispatcher::with_default(&self.dispatch, || {
                    tracing::error!(error = %e, "Failed to spawn schedule worker");
                });
                false
            }
        }
    }

    /// Stop the schedule, blocking until an in-flight execution completes.
    ///
    /// When called from inside the task itself the stop is only requested;
    /// the worker exits once the current execution returns.
    pub fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        worker.signal.request_stop();
        if worker.handle.thread().id() == thread::current().id() {
            return;
        }
        if worker.handle.join().is_err() {
            tracing::dispatcher::with_default(&self.dispatch, || {
                tracing::error!("Schedule worker panicked");
            });
        }
    }

    /// Check if the schedule is running.
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl Drop for NonReentrantSchedule {
    fn drop(&mut self) {
        self.stop();
    }
}

/// First period boundary after `now`, counted from `previous`.
fn next_deadline(previous: Instant, period: Duration, now: Instant) -> Instant {
    let next = previous + period;
    if next > now {
        return next;
    }

    // Whole-period arithmetic in u128 nanoseconds; the remainder is below
    // one period and always fits.
    let behind = now.duration_since(previous).as_nanos();
    let period_ns = period.as_nanos().max(1);
    let into_period = u64::try_from(behind % period_ns).unwrap_or(0);
    let skipped = u64::try_from(behind / period_ns).unwrap_or(u64::MAX);
    tracing::trace!(skipped = skipped.saturating_sub(1), "Task overran its period, skipping ticks");
    now + (period - Duration::from_nanos(into_period))
}
