use fanout_core::{BatchResult, Envelope, TaskMeta, TaskOutcome};
use fanout_error::{TaskError, TaskErrorKind};
use std::time::Duration;

fn sample_batch() -> BatchResult<u32> {
    let envelopes = vec![
        Envelope::success(10, 1, false),
        Envelope::failure(
            TaskError::new(TaskErrorKind::RetriesExhausted {
                attempts: 3,
                last_error: "timeout".to_string(),
            }),
            3,
        ),
        Envelope::success(30, 2, true),
        Envelope::cancelled(),
    ];
    let meta = vec![
        TaskMeta::new("task 1/4", Some("a.example".to_string())),
        TaskMeta::new("task 2/4", Some("b.example".to_string())),
        TaskMeta::new("task 3/4", None),
        TaskMeta::new("task 4/4", None),
    ];
    BatchResult::new(envelopes, meta, 3, Duration::from_millis(1500))
}

#[test]
fn counts_partition_the_batch() {
    let batch = sample_batch();
    assert_eq!(batch.len(), 4);
    assert_eq!(batch.success_count(), 2);
    assert_eq!(batch.failure_count(), 1);
    assert_eq!(batch.cancelled_count(), 1);
    assert_eq!(batch.total_attempts(), 6);
    assert_eq!(batch.total_retries(), 3);
}

#[test]
fn successes_skip_and_or_none_preserves_positions() {
    let batch = sample_batch();
    assert_eq!(batch.successes(), vec![&10, &30]);
    assert_eq!(
        batch.successes_or_none(),
        vec![Some(&10), None, Some(&30), None]
    );
}

#[test]
fn failures_carry_index_and_meta() {
    let batch = sample_batch();
    let failures = batch.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].index, 1);
    assert_eq!(failures[0].label, "task 2/4");
    assert_eq!(failures[0].bucket.as_deref(), Some("b.example"));
    assert_eq!(failures[0].error.last_message(), "timeout");
}

#[test]
fn into_results_maps_cancelled_to_error() {
    let results = sample_batch().into_results();
    assert_eq!(results[0].as_ref().ok(), Some(&10));
    assert!(results[1].is_err());
    assert!(results[3].as_ref().is_err_and(|e| e.is_cancelled()));
}

#[test]
fn envelope_records_bypass_flag() {
    let batch = sample_batch();
    assert!(!batch.get(0).unwrap().bypass_limiter());
    assert!(batch.get(2).unwrap().bypass_limiter());
    assert!(matches!(batch.get(2).unwrap().outcome(), TaskOutcome::Success(30)));
}

#[test]
fn summary_renders_counts() {
    let summary = sample_batch().summary();
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.elapsed_ms, 1500);
    assert_eq!(
        summary.to_string(),
        "2/4 succeeded, 1 failed, 1 cancelled, 3 retries in 1500ms"
    );
}

#[test]
fn empty_batch_is_empty() {
    let batch: BatchResult<()> = BatchResult::empty();
    assert!(batch.is_empty());
    assert_eq!(batch.success_count(), 0);
    assert!(batch.into_values().is_empty());
}
