// SPDX-License-Identifier: GPL-3.0-only

//! Per-task timing statistics

use std::fmt;
use std::time::{Duration, Instant};

/// Running execution-time and start-deviation statistics of one task
///
/// The first `warm_up` activations are excluded from min/max tracking so
/// startup transients (page faults, priority changes, cold caches) do not
/// dominate the extremes. The execution-time average covers every activation.
#[derive(Debug, Clone)]
pub struct TimingStatistics {
    period: Duration,
    warm_up: u64,
    activations: u64,
    previous_start: Option<Instant>,

    exec_min: Option<Duration>,
    exec_max: Option<Duration>,
    exec_total: Duration,

    deviation_min: Option<Duration>,
    deviation_max: Option<Duration>,
    deviation_total: Duration,
    deviation_samples: u64,
}

impl TimingStatistics {
    pub fn new(period: Duration, warm_up: u64) -> Self {
        Self {
            period,
            warm_up,
            activations: 0,
            previous_start: None,
            exec_min: None,
            exec_max: None,
            exec_total: Duration::ZERO,
            deviation_min: None,
            deviation_max: None,
            deviation_total: Duration::ZERO,
            deviation_samples: 0,
        }
    }

    /// Fold one activation into the statistics
    pub fn record(&mut self, start: Instant, end: Instant) {
        self.activations += 1;
        let tracked = self.activations > self.warm_up;

        if let Some(previous) = self.previous_start
            && tracked
        {
            let interval = start.saturating_duration_since(previous);
            let deviation = interval.abs_diff(self.period);
            self.deviation_min = Some(self.deviation_min.map_or(deviation, |m| m.min(deviation)));
            self.deviation_max = Some(self.deviation_max.map_or(deviation, |m| m.max(deviation)));
            self.deviation_total += deviation;
            self.deviation_samples += 1;
        }
        self.previous_start = Some(start);

        let exec = end.saturating_duration_since(start);
        self.exec_total += exec;
        if tracked {
            self.exec_min = Some(self.exec_min.map_or(exec, |m| m.min(exec)));
            self.exec_max = Some(self.exec_max.map_or(exec, |m| m.max(exec)));
        }
    }

    pub fn activations(&self) -> u64 {
        self.activations
    }

    /// Freeze the statistics into a report
    pub fn report(&self, name: &str) -> TimingReport {
        let exec_min = self.exec_min.unwrap_or_default();
        let exec_max = self.exec_max.unwrap_or_default();
        let deviation_min = self.deviation_min.unwrap_or_default();
        let deviation_max = self.deviation_max.unwrap_or_default();

        TimingReport {
            name: name.to_string(),
            period: self.period,
            activations: self.activations,
            exec_min,
            exec_max,
            exec_avg: average(self.exec_total, self.activations),
            exec_jitter: exec_max - exec_min,
            start_deviation_min: deviation_min,
            start_deviation_max: deviation_max,
            start_deviation_avg: average(self.deviation_total, self.deviation_samples),
            start_jitter: deviation_max - deviation_min,
        }
    }
}

fn average(total: Duration, samples: u64) -> Duration {
    if samples == 0 {
        return Duration::ZERO;
    }
    // Duration only divides by u32; go through nanoseconds for long runs
    Duration::from_nanos((total.as_nanos() / u128::from(samples)) as u64)
}

/// Final statistics of a stopped task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingReport {
    pub name: String,
    pub period: Duration,
    pub activations: u64,
    pub exec_min: Duration,
    pub exec_max: Duration,
    pub exec_avg: Duration,
    /// `exec_max - exec_min`
    pub exec_jitter: Duration,
    pub start_deviation_min: Duration,
    pub start_deviation_max: Duration,
    pub start_deviation_avg: Duration,
    /// `start_deviation_max - start_deviation_min`
    pub start_jitter: Duration,
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl fmt::Display for TimingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (period {:.0} ms, {} activations): exec min {:.3} ms, max {:.3} ms, avg {:.3} ms, jitter {:.3} ms; \
             start deviation min {:.3} ms, max {:.3} ms, avg {:.3} ms, jitter {:.3} ms",
            self.name,
            ms(self.period),
            self.activations,
            ms(self.exec_min),
            ms(self.exec_max),
            ms(self.exec_avg),
            ms(self.exec_jitter),
            ms(self.start_deviation_min),
            ms(self.start_deviation_max),
            ms(self.start_deviation_avg),
            ms(self.start_jitter),
        )
    }
}
