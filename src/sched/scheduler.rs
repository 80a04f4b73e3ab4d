// SPDX-License-Identifier: GPL-3.0-only

//! Time-triggered release loop

use super::SchedError;
use super::stats::TimingReport;
use super::task::{PeriodicTask, PeriodicTaskSpec, TaskReleaser};
use crate::constants::scheduler::MAX_SLEEP_MS;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Next release time of each task, in registration order
///
/// Deadlines advance by exactly one period from the previous deadline, never
/// from the time the release actually happened, so lateness does not
/// accumulate into drift.
#[derive(Debug, Clone)]
pub(crate) struct ReleaseSchedule {
    entries: Vec<(Instant, Duration)>,
}

impl ReleaseSchedule {
    /// First release of every task is one period after `origin`
    pub(crate) fn new(origin: Instant, periods: &[Duration]) -> Self {
        Self {
            entries: periods.iter().map(|&p| (origin + p, p)).collect(),
        }
    }

    /// Soonest deadline; ties resolve to the earliest registered task
    pub(crate) fn next_deadline(&self) -> Option<(usize, Instant)> {
        self.entries
            .iter()
            .enumerate()
            .min_by_key(|(index, (next, _))| (*next, *index))
            .map(|(index, (next, _))| (index, *next))
    }

    /// Indices of tasks due at `now`, each advanced by one period
    ///
    /// A task more than one period overdue stays due and is released again on
    /// the next call, so an overslept loop catches up instead of skipping.
    pub(crate) fn release_due(&mut self, now: Instant) -> Vec<usize> {
        let mut due = Vec::new();
        for (index, (next, period)) in self.entries.iter_mut().enumerate() {
            if *next <= now {
                *next += *period;
                due.push(index);
            }
        }
        due
    }
}

struct LoopControl {
    running: Mutex<bool>,
    wake: Condvar,
}

/// Owns the periodic tasks and drives their releases
pub struct TaskScheduler {
    tasks: Vec<PeriodicTask>,
    max_sleep: Duration,
    control: Arc<LoopControl>,
    thread_handle: Option<JoinHandle<()>>,
    started: bool,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(MAX_SLEEP_MS))
    }
}

impl TaskScheduler {
    /// Create a scheduler whose loop never sleeps longer than `max_sleep`
    pub fn new(max_sleep: Duration) -> Self {
        Self {
            tasks: Vec::new(),
            max_sleep: max_sleep.max(Duration::from_millis(1)),
            control: Arc::new(LoopControl {
                running: Mutex::new(false),
                wake: Condvar::new(),
            }),
            thread_handle: None,
            started: false,
        }
    }

    /// Register a task and start its worker thread
    ///
    /// The worker parks until the scheduler releases it. Tasks can only be
    /// added before `start`.
    pub fn add_task(&mut self, spec: PeriodicTaskSpec) -> Result<(), SchedError> {
        if self.started {
            return Err(SchedError::AlreadyStarted {
                name: spec.name().to_string(),
            });
        }
        let task = PeriodicTask::spawn(spec)?;
        self.tasks.push(task);
        Ok(())
    }

    /// Start the release loop on its own thread
    pub fn start(&mut self) -> Result<(), SchedError> {
        if self.started {
            warn!("Scheduler already started");
            return Ok(());
        }

        let releasers: Vec<TaskReleaser> = self.tasks.iter().map(PeriodicTask::releaser).collect();
        let periods: Vec<Duration> = self.tasks.iter().map(PeriodicTask::period).collect();
        let control = Arc::clone(&self.control);
        let max_sleep = self.max_sleep;

        *self.control.running.lock() = true;
        let handle = thread::Builder::new()
            .name("scheduler".to_string())
            .spawn(move || run_release_loop(&releasers, &periods, &control, max_sleep))
            .map_err(|source| {
                *self.control.running.lock() = false;
                SchedError::Spawn {
                    name: "scheduler".to_string(),
                    source,
                }
            })?;

        self.thread_handle = Some(handle);
        self.started = true;
        info!(tasks = self.tasks.len(), max_sleep_ms = self.max_sleep.as_millis(), "Scheduler started");
        Ok(())
    }

    /// Stop the loop, then every task in registration order
    ///
    /// Safe to call repeatedly and on a scheduler that never started.
    pub fn stop(&mut self) -> Vec<TimingReport> {
        {
            let mut running = self.control.running.lock();
            *running = false;
            self.control.wake.notify_all();
        }

        if let Some(handle) = self.thread_handle.take() {
            debug!("Waiting for scheduler thread to finish");
            if let Err(e) = handle.join() {
                warn!("Scheduler thread panicked: {:?}", e);
            }
        }

        self.tasks.iter_mut().filter_map(PeriodicTask::stop).collect()
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    pub fn tasks(&self) -> &[PeriodicTask] {
        &self.tasks
    }

    /// Completed activations per task, in registration order
    pub fn activations(&self) -> Vec<(String, u64)> {
        self.tasks
            .iter()
            .map(|t| (t.name().to_string(), t.activations()))
            .collect()
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        if self.thread_handle.is_some() || self.tasks.iter().any(PeriodicTask::is_running) {
            debug!("TaskScheduler dropped, stopping");
            self.stop();
        }
    }
}

fn run_release_loop(
    releasers: &[TaskReleaser],
    periods: &[Duration],
    control: &LoopControl,
    max_sleep: Duration,
) {
    let mut schedule = ReleaseSchedule::new(Instant::now(), periods);
    let mut running = control.running.lock();

    while *running {
        let wait = match schedule.next_deadline() {
            Some((_, deadline)) => deadline.saturating_duration_since(Instant::now()).min(max_sleep),
            None => max_sleep,
        };

        if !wait.is_zero() {
            control.wake.wait_for(&mut running, wait);
            if !*running {
                break;
            }
        }

        for index in schedule.release_due(Instant::now()) {
            releasers[index].release();
        }
    }

    debug!("Release loop exiting");
}
