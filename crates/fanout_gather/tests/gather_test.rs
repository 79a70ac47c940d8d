//! End-to-end tests for ordering, limits and bypass refunds.

mod common;

use common::InFlight;
use fanout_core::{Completed, ProgressTracker, TaskSpec, TaskState};
use fanout_gather::{GatherHooks, Gatherer};
use fanout_rate_limit::{FanoutConfig, Limit};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn sleeper(index: u64, delay_ms: u64, gauge: Arc<InFlight>) -> TaskSpec<u64> {
    TaskSpec::new(move || {
        let gauge = Arc::clone(&gauge);
        async move {
            gauge.enter();
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            gauge.exit();
            Ok::<_, String>(index)
        }
    })
}

#[tokio::test(start_paused = true)]
async fn test_results_follow_input_order() {
    let gauge = InFlight::new();
    // Later tasks finish first
    let tasks = (0..8)
        .map(|i| sleeper(i, 100 * (8 - i), Arc::clone(&gauge)))
        .collect();

    let batch = Gatherer::default().gather(tasks).await.unwrap();

    let expected: Vec<u64> = (0..8).collect();
    assert_eq!(batch.len(), 8);
    assert_eq!(batch.successes(), expected.iter().collect::<Vec<_>>());
    assert_eq!(batch.total_retries(), 0);
    assert_eq!(batch.total_attempts(), 8);
    assert_eq!(gauge.peak(), 8);
}

#[tokio::test]
async fn test_empty_batch_returns_empty_result() {
    let batch = Gatherer::default()
        .gather(Vec::<TaskSpec<()>>::new())
        .await
        .unwrap();
    assert!(batch.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_ten_tasks_under_rate_and_concurrency_limit() {
    let gauge = InFlight::new();
    let gatherer = Gatherer::builder()
        .global_limit(Limit::new(5.0, 3))
        .build()
        .unwrap();
    let tasks = (0..10).map(|i| sleeper(i, 400, Arc::clone(&gauge))).collect();

    let start = Instant::now();
    let batch = gatherer.gather(tasks).await.unwrap();

    assert_eq!(batch.success_count(), 10);
    assert!(gauge.peak() <= 3, "peak in flight {}", gauge.peak());
    // Ten admissions at 5 per second need at least 1.8s after the first
    assert!(start.elapsed() >= Duration::from_millis(1800));
}

#[tokio::test(start_paused = true)]
async fn test_buckets_do_not_overlap_themselves_but_overlap_each_other() {
    let global = InFlight::new();
    let per_bucket: HashMap<&str, Arc<InFlight>> =
        [("a", InFlight::new()), ("b", InFlight::new())].into_iter().collect();

    let gatherer = Gatherer::builder()
        .global_limit(Limit::concurrency_only(4))
        .bucket_limit("a", Limit::concurrency_only(1))
        .bucket_limit("b", Limit::concurrency_only(1))
        .build()
        .unwrap();

    let tasks = (0..8)
        .map(|i| {
            let key = if i % 2 == 0 { "a" } else { "b" };
            let bucket = Arc::clone(&per_bucket[key]);
            let global = Arc::clone(&global);
            TaskSpec::new(move || {
                let bucket = Arc::clone(&bucket);
                let global = Arc::clone(&global);
                async move {
                    bucket.enter();
                    global.enter();
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    global.exit();
                    bucket.exit();
                    Ok::<_, String>(i)
                }
            })
            .in_bucket(key)
        })
        .collect();

    let batch = gatherer.gather(tasks).await.unwrap();

    assert_eq!(batch.success_count(), 8);
    assert_eq!(per_bucket["a"].peak(), 1);
    assert_eq!(per_bucket["b"].peak(), 1);
    assert_eq!(global.peak(), 2);
    assert_eq!(batch.meta()[1].bucket().as_deref(), Some("b"));
}

#[tokio::test(start_paused = true)]
async fn test_wildcard_bucket_limits_each_key_separately() {
    let gauges: HashMap<String, Arc<InFlight>> = (0..3)
        .map(|h| (format!("host{h}"), InFlight::new()))
        .collect();
    let total = InFlight::new();

    let gatherer = Gatherer::builder()
        .global_limit(Limit::concurrency_only(10))
        .default_bucket_limit(Limit::concurrency_only(2))
        .build()
        .unwrap();

    let tasks = (0..12)
        .map(|i| {
            let key = format!("host{}", i % 3);
            let gauge = Arc::clone(&gauges[&key]);
            let total = Arc::clone(&total);
            TaskSpec::new(move || {
                let gauge = Arc::clone(&gauge);
                let total = Arc::clone(&total);
                async move {
                    gauge.enter();
                    total.enter();
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    total.exit();
                    gauge.exit();
                    Ok::<_, String>(())
                }
            })
            .in_bucket(key)
        })
        .collect();

    gatherer.gather(tasks).await.unwrap();

    for gauge in gauges.values() {
        assert_eq!(gauge.peak(), 2);
    }
    assert_eq!(total.peak(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_slow_bucket_does_not_stall_other_buckets() {
    let gatherer = Gatherer::builder()
        .global_limit(Limit::concurrency_only(1))
        .bucket_limit("slow", Limit::new(0.2, 10))
        .build()
        .unwrap();

    let start = Instant::now();
    let tasks = ["slow", "slow", "fast", "fast"]
        .into_iter()
        .map(|key| {
            TaskSpec::new(move || async move {
                let started = start.elapsed();
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, String>(started)
            })
            .in_bucket(key)
        })
        .collect();

    let batch = gatherer.gather(tasks).await.unwrap();
    let started: Vec<Duration> = batch.into_values().into_iter().flatten().collect();

    assert_eq!(started.len(), 4);
    // One of the slow tasks waits five seconds for its bucket token
    let later_slow = started[0].max(started[1]);
    assert!(later_slow >= Duration::from_millis(4900), "{later_slow:?}");
    for fast in &started[2..] {
        assert!(*fast < Duration::from_millis(500), "fast task started at {fast:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_bypassed_results_do_not_consume_rate_tokens() {
    let concurrency = 2;
    let gatherer = Gatherer::builder()
        .global_limit(Limit::new(1.0, concurrency))
        .build()
        .unwrap();

    let tasks = (0..concurrency + 1)
        .map(|i| {
            TaskSpec::with_outcome(move || async move { Ok::<_, String>(Completed::cached(i)) })
        })
        .collect();

    let start = Instant::now();
    let batch = gatherer.gather(tasks).await.unwrap();

    assert_eq!(batch.success_count(), concurrency + 1);
    assert!(batch.envelopes().iter().all(|e| e.bypass_limiter()));
    assert!(start.elapsed() < Duration::from_millis(100), "{:?}", start.elapsed());
}

#[tokio::test(start_paused = true)]
async fn test_fresh_results_are_charged() {
    let gatherer = Gatherer::builder()
        .global_limit(Limit::new(1.0, 2))
        .build()
        .unwrap();

    let tasks = (0..3)
        .map(|i| TaskSpec::new(move || async move { Ok::<_, String>(i) }))
        .collect();

    let start = Instant::now();
    gatherer.gather(tasks).await.unwrap();

    assert!(start.elapsed() >= Duration::from_millis(1900));
}

#[tokio::test(start_paused = true)]
async fn test_same_tasks_give_same_outcomes() {
    let gatherer = Gatherer::builder()
        .global_limit(Limit::concurrency_only(3))
        .build()
        .unwrap();
    let make = || {
        (0..6)
            .map(|i| {
                TaskSpec::new(move || async move {
                    if i % 3 == 0 {
                        Err(format!("task {i} rejected"))
                    } else {
                        Ok(i * 2)
                    }
                })
            })
            .collect::<Vec<_>>()
    };

    let first = gatherer.gather(make()).await.unwrap();
    let second = gatherer.gather(make()).await.unwrap();

    let outcome = |b: &fanout_core::BatchResult<i32>| {
        b.envelopes().iter().map(|e| e.is_success()).collect::<Vec<_>>()
    };
    assert_eq!(outcome(&first), outcome(&second));
    assert_eq!(first.successes_or_none(), second.successes_or_none());
    assert_eq!(first.failure_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocking_tasks_run_in_parallel_and_keep_order() {
    let gauge = InFlight::new();
    let gatherer = Gatherer::builder()
        .global_limit(Limit::concurrency_only(3))
        .build()
        .unwrap();

    let tasks = (0..6u64)
        .map(|i| {
            let gauge = Arc::clone(&gauge);
            TaskSpec::blocking(move || {
                gauge.enter();
                std::thread::sleep(Duration::from_millis(20 * (6 - i)));
                gauge.exit();
                Ok::<_, std::io::Error>(i)
            })
        })
        .collect();

    let batch = gatherer.gather(tasks).await.unwrap();

    assert_eq!(batch.into_values(), (0..6u64).map(Some).collect::<Vec<_>>());
    assert!(gauge.peak() <= 3);
}

#[tokio::test(start_paused = true)]
async fn test_labels_and_tracker() {
    let tracker = Arc::new(ProgressTracker::new(3));
    let hooks = GatherHooks::new()
        .with_reporter(tracker.clone())
        .with_labeler(|i, task: &TaskSpec<&'static str>| {
            format!("Link {}: {}", i + 1, task.description().unwrap_or("?"))
        });

    let tasks = vec![
        TaskSpec::new(|| async { Ok::<_, String>("a") }).described("a.example"),
        TaskSpec::new(|| async { Err::<&str, _>("404".to_string()) }).described("b.example"),
        TaskSpec::new(|| async { Ok::<_, String>("c") }),
    ];

    let batch = Gatherer::default().gather_with(tasks, hooks).await.unwrap();

    assert_eq!(batch.meta()[0].label(), "Link 1: a.example");
    assert_eq!(batch.meta()[2].label(), "Link 3: ?");
    let failures = batch.failures();
    assert_eq!(failures[0].label, "Link 2: b.example");

    let snap = tracker.snapshot();
    assert_eq!(snap.succeeded, 2);
    assert_eq!(snap.failed, 1);
    assert_eq!(tracker.state(1), TaskState::Failed);
}

#[tokio::test]
async fn test_default_labels_count_from_one() {
    let tasks = vec![
        TaskSpec::new(|| async { Ok::<_, String>(1) }),
        TaskSpec::new(|| async { Ok::<_, String>(2) }).described("second"),
    ];
    let batch = Gatherer::default().gather(tasks).await.unwrap();
    assert_eq!(batch.meta()[0].label(), "task 1/2");
    assert_eq!(batch.meta()[1].label(), "task 2/2: second");
}

#[tokio::test]
async fn test_gatherer_from_config() {
    let config = FanoutConfig::default().with_global_limit(Limit::concurrency_only(2));
    let gatherer = Gatherer::from_config(&config).unwrap();
    assert_eq!(*gatherer.config().global().concurrency(), 2);

    let bad = FanoutConfig::default().with_global_limit(Limit::new(-1.0, 2));
    assert!(Gatherer::from_config(&bad).is_err());
}
