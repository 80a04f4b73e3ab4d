// SPDX-License-Identifier: GPL-3.0-only

//! Periodic task: one pinned real-time thread driven by a counting release signal

use super::SchedError;
use super::rt;
use super::stats::{TimingReport, TimingStatistics};
use crate::constants::scheduler::WARM_UP_ACTIVATIONS;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Work executed once per activation
///
/// The callback is trusted to return; the task does not catch or retry.
pub type WorkFn = Box<dyn FnMut() + Send + 'static>;

/// Immutable description of a periodic task
pub struct PeriodicTaskSpec {
    name: String,
    cpu: usize,
    priority: i32,
    period: Duration,
    warm_up: u64,
    work: WorkFn,
}

impl PeriodicTaskSpec {
    /// Validate and build a task description
    ///
    /// The period must be non-zero and the priority inside the kernel's
    /// SCHED_FIFO range.
    pub fn new<F>(
        name: impl Into<String>,
        cpu: usize,
        priority: i32,
        period_ms: u64,
        work: F,
    ) -> Result<Self, SchedError>
    where
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        if period_ms == 0 {
            return Err(SchedError::ZeroPeriod { name });
        }

        let (min, max) = rt::fifo_priority_range();
        if !(min..=max).contains(&priority) {
            return Err(SchedError::PriorityOutOfRange {
                name,
                priority,
                min,
                max,
            });
        }

        Ok(Self {
            name,
            cpu,
            priority,
            period: Duration::from_millis(period_ms),
            warm_up: WARM_UP_ACTIVATIONS,
            work: Box::new(work),
        })
    }

    /// Override how many initial activations are left out of min/max statistics
    pub fn with_warm_up(mut self, activations: u64) -> Self {
        self.warm_up = activations;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cpu(&self) -> usize {
        self.cpu
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl std::fmt::Debug for PeriodicTaskSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTaskSpec")
            .field("name", &self.name)
            .field("cpu", &self.cpu)
            .field("priority", &self.priority)
            .field("period", &self.period)
            .field("warm_up", &self.warm_up)
            .finish_non_exhaustive()
    }
}

/// Counting semaphore: releases accumulate until the worker consumes them
#[derive(Default)]
struct ReleaseSignal {
    pending: Mutex<u64>,
    available: Condvar,
}

impl ReleaseSignal {
    fn post(&self) {
        let mut pending = self.pending.lock();
        *pending += 1;
        self.available.notify_one();
    }

    fn wait(&self) {
        let mut pending = self.pending.lock();
        while *pending == 0 {
            self.available.wait(&mut pending);
        }
        *pending -= 1;
    }

    fn pending(&self) -> u64 {
        *self.pending.lock()
    }
}

/// State shared between the task handle, its worker thread and releasers
struct TaskShared {
    running: AtomicBool,
    release: ReleaseSignal,
    activations: AtomicU64,
}

/// Cheap handle that can release a task from another thread
#[derive(Clone)]
pub struct TaskReleaser {
    shared: Arc<TaskShared>,
}

impl TaskReleaser {
    pub fn release(&self) {
        self.shared.release.post();
    }
}

/// A running periodic task
///
/// The worker thread is started on construction and parks until the first
/// release. Activations of one task never overlap: the single worker thread
/// consumes releases one at a time.
pub struct PeriodicTask {
    name: String,
    period: Duration,
    shared: Arc<TaskShared>,
    thread_handle: Option<JoinHandle<TimingStatistics>>,
    report: Option<TimingReport>,
}

impl PeriodicTask {
    /// Start the worker thread for `spec`
    pub fn spawn(spec: PeriodicTaskSpec) -> Result<Self, SchedError> {
        let PeriodicTaskSpec {
            name,
            cpu,
            priority,
            period,
            warm_up,
            mut work,
        } = spec;

        let shared = Arc::new(TaskShared {
            running: AtomicBool::new(true),
            release: ReleaseSignal::default(),
            activations: AtomicU64::new(0),
        });
        let worker_shared = Arc::clone(&shared);
        let worker_name = name.clone();

        let thread_handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                rt::configure_current_thread(&worker_name, cpu, priority);
                debug!(task = %worker_name, "Task thread waiting for first release");

                let mut stats = TimingStatistics::new(period, warm_up);
                loop {
                    worker_shared.release.wait();
                    if !worker_shared.running.load(Ordering::Acquire) {
                        break;
                    }

                    let start = Instant::now();
                    work();
                    let end = Instant::now();

                    stats.record(start, end);
                    worker_shared.activations.fetch_add(1, Ordering::AcqRel);
                }

                debug!(task = %worker_name, "Task thread exiting");
                stats
            })
            .map_err(|source| SchedError::Spawn {
                name: name.clone(),
                source,
            })?;

        info!(task = %name, cpu, priority, period_ms = period.as_millis(), "Started periodic task");

        Ok(Self {
            name,
            period,
            shared,
            thread_handle: Some(thread_handle),
            report: None,
        })
    }

    /// Record one pending activation without blocking
    pub fn release(&self) {
        self.shared.release.post();
    }

    /// Handle for releasing this task from the scheduler thread
    pub fn releaser(&self) -> TaskReleaser {
        TaskReleaser {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Completed activations so far
    pub fn activations(&self) -> u64 {
        self.shared.activations.load(Ordering::Acquire)
    }

    /// Releases recorded but not yet consumed by the worker
    pub fn pending_releases(&self) -> u64 {
        self.shared.release.pending()
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    /// Stop the worker and return its final statistics
    ///
    /// Safe to call repeatedly; later calls return the stored report.
    pub fn stop(&mut self) -> Option<TimingReport> {
        if let Some(handle) = self.thread_handle.take() {
            self.shared.running.store(false, Ordering::Release);
            // Wake a worker parked on an empty release queue
            self.shared.release.post();

            match handle.join() {
                Ok(stats) => {
                    let report = stats.report(&self.name);
                    info!("{}", report);
                    self.report = Some(report);
                }
                Err(e) => {
                    warn!(task = %self.name, "Task thread panicked: {:?}", e);
                }
            }
        }
        self.report.clone()
    }

    /// Report of a stopped task
    pub fn report(&self) -> Option<&TimingReport> {
        self.report.as_ref()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(task = %self.name, "PeriodicTask dropped, stopping worker");
            self.stop();
        }
    }
}
