// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the periodic task scheduler

use gazecursor::sched::{PeriodicTask, PeriodicTaskSpec, TaskScheduler};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn counting_task(name: &str, period_ms: u64, counter: Arc<AtomicU64>) -> PeriodicTaskSpec {
    PeriodicTaskSpec::new(name, 0, 1, period_ms, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap()
}

#[test]
fn test_activation_counts_follow_periods() {
    let counters: Vec<_> = (0..3).map(|_| Arc::new(AtomicU64::new(0))).collect();
    let mut scheduler = TaskScheduler::new(Duration::from_millis(100));
    for (period, counter) in [50, 100, 250].into_iter().zip(&counters) {
        scheduler
            .add_task(counting_task(&format!("t{period}"), period, Arc::clone(counter)))
            .unwrap();
    }

    scheduler.start().unwrap();
    thread::sleep(Duration::from_millis(1025));
    let reports = scheduler.stop();

    let expected = [20i64, 10, 4];
    for ((counter, expected), report) in counters.iter().zip(expected).zip(&reports) {
        let count = counter.load(Ordering::SeqCst) as i64;
        assert!(
            (count - expected).abs() <= 1,
            "{}: {} activations, expected about {}",
            report.name,
            count,
            expected
        );
        assert_eq!(report.activations as i64, count);
    }
}

#[test]
fn test_overrun_delays_next_activation_without_overlap() {
    let inside = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));
    let calls = Arc::new(AtomicU64::new(0));
    let runs = Arc::new(Mutex::new(Vec::new()));

    let spec = {
        let (inside, overlapped, calls, runs) =
            (inside.clone(), overlapped.clone(), calls.clone(), runs.clone());
        PeriodicTaskSpec::new("slow-first", 0, 1, 50, move || {
            let start = Instant::now();
            if inside.swap(true, Ordering::SeqCst) {
                overlapped.store(true, Ordering::SeqCst);
            }
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                thread::sleep(Duration::from_millis(150));
            }
            inside.store(false, Ordering::SeqCst);
            runs.lock().push((start, Instant::now()));
        })
        .unwrap()
        .with_warm_up(0)
    };

    let mut scheduler = TaskScheduler::default();
    scheduler.add_task(spec).unwrap();
    scheduler.start().unwrap();
    thread::sleep(Duration::from_millis(400));
    let reports = scheduler.stop();

    assert!(!overlapped.load(Ordering::SeqCst), "Activations overlapped");

    // Releases queued during the overrun run back to back
    let runs = runs.lock();
    assert!(runs.len() >= 3, "{} runs", runs.len());
    let (_, overrun_end) = runs[0];
    let (next_start, _) = runs[1];
    let gap = next_start.duration_since(overrun_end);
    assert!(gap < Duration::from_millis(20), "second run started {gap:?} after the overrun");
    let report = &reports[0];
    assert!(report.activations >= 3);
    // The second start follows the 150 ms first run, two periods late
    assert!(
        report.start_deviation_max >= Duration::from_millis(50),
        "deviation max {:?}",
        report.start_deviation_max
    );
}

#[test]
fn test_queued_releases_run_sequentially() {
    let inside = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));
    let spec = {
        let (inside, overlapped) = (inside.clone(), overlapped.clone());
        PeriodicTaskSpec::new("burst", 0, 1, 10, move || {
            if inside.swap(true, Ordering::SeqCst) {
                overlapped.store(true, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(2));
            inside.store(false, Ordering::SeqCst);
        })
        .unwrap()
    };

    let mut task = PeriodicTask::spawn(spec).unwrap();
    for _ in 0..10 {
        task.release();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while task.activations() < 10 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    let report = task.stop().unwrap();

    assert_eq!(report.activations, 10);
    assert!(!overlapped.load(Ordering::SeqCst));
}

#[test]
fn test_stop_is_idempotent() {
    let counter = Arc::new(AtomicU64::new(0));
    let mut scheduler = TaskScheduler::new(Duration::from_millis(20));
    scheduler.add_task(counting_task("idle", 30, counter)).unwrap();
    scheduler.start().unwrap();
    thread::sleep(Duration::from_millis(100));

    let first = scheduler.stop();
    assert_eq!(first.len(), 1);
    assert!(!scheduler.is_running());
    // A second stop returns the stored reports
    assert_eq!(scheduler.stop(), first);
}

#[test]
fn test_stop_joins_running_work() {
    let finished = Arc::new(AtomicBool::new(false));
    let spec = {
        let finished = finished.clone();
        PeriodicTaskSpec::new("long", 0, 1, 10, move || {
            thread::sleep(Duration::from_millis(50));
            finished.store(true, Ordering::SeqCst);
        })
        .unwrap()
    };

    let mut scheduler = TaskScheduler::default();
    scheduler.add_task(spec).unwrap();
    scheduler.start().unwrap();
    thread::sleep(Duration::from_millis(30));
    scheduler.stop();

    // The in-progress activation completed before stop returned
    assert!(finished.load(Ordering::SeqCst));
}
