// SPDX-License-Identifier: GPL-3.0-only

//! Periodic real-time task scheduling
//!
//! A [`TaskScheduler`] owns a set of [`PeriodicTask`]s. Each task runs on its
//! own OS thread pinned to one core under `SCHED_FIFO`, and parks on a
//! counting release signal between activations. The scheduler's own thread
//! runs a sorted-wakeup loop that releases every task whose deadline has
//! passed and advances that deadline by exactly one period.

mod rt;
mod scheduler;
mod stats;
mod task;

pub use rt::{
    configure_current_thread, fifo_priority_range, monotonic_now, pin_to_core, set_fifo_priority,
};
pub use scheduler::TaskScheduler;
pub use stats::{TimingReport, TimingStatistics};
pub use task::{PeriodicTask, PeriodicTaskSpec, TaskReleaser, WorkFn};

/// Errors raised while configuring or starting periodic tasks
#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    #[error("Task '{name}' has a zero period")]
    ZeroPeriod { name: String },

    #[error("Task '{name}' priority {priority} outside {min}..={max}")]
    PriorityOutOfRange {
        name: String,
        priority: i32,
        min: i32,
        max: i32,
    },

    #[error("Scheduler already started, cannot add task '{name}'")]
    AlreadyStarted { name: String },

    #[error("Failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
