//! `fanout fetch` command handler.

use super::{FetchArgs, OutputFormat};
use fanout::{
    BatchResult, CancellationToken, FanoutConfig, GatherHooks, Gatherer, Limit, ProgressTracker,
    RetrySettings, TaskOutcome, TaskSpec, WILDCARD_BUCKET,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Bucket used for URLs without a host.
pub const UNKNOWN_HOST: &str = "unknown";

/// Retries the whole batch may spend per allowed retry of one URL.
const BATCH_RETRY_FACTOR: u32 = 10;

/// How often the status board is logged while URLs are being fetched.
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// One successfully fetched URL.
#[derive(Debug, Clone, Serialize)]
pub struct FetchedPage {
    url: String,
    status: u16,
    bytes: usize,
}

/// Bucket key for a URL: its hostname, or [`UNKNOWN_HOST`].
pub fn host_bucket(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_else(|| UNKNOWN_HOST.to_string())
}

/// Apply command-line overrides on top of the loaded configuration.
pub fn apply_overrides(config: FanoutConfig, args: &FetchArgs) -> FanoutConfig {
    let global = *config.limits().global();
    let global = Limit::new(
        args.rps.unwrap_or(*global.rps()),
        args.concurrency.unwrap_or(*global.concurrency()),
    )
    .with_burst(*global.burst());

    let per_host = if args.per_host_rps.is_some() || args.per_host_concurrency.is_some() {
        let base = config
            .limits()
            .buckets()
            .resolve(WILDCARD_BUCKET)
            .copied()
            .unwrap_or_default();
        Some(
            Limit::new(
                args.per_host_rps.unwrap_or(*base.rps()),
                args.per_host_concurrency.unwrap_or(*base.concurrency()),
            )
            .with_burst(*base.burst()),
        )
    } else {
        None
    };

    let retry = match args.retries {
        Some(retries) => {
            let current = config.retry();
            RetrySettings::builder()
                .max_task_retries(retries)
                .max_total_retries(retries.saturating_mul(BATCH_RETRY_FACTOR))
                .initial_backoff(*current.initial_backoff())
                .max_backoff(*current.max_backoff())
                .backoff_factor(*current.backoff_factor())
                .jitter(*current.jitter())
                .build()
        }
        None => config.retry().clone(),
    };

    let config = config.with_global_limit(global).with_retry(retry);
    match per_host {
        Some(limit) => config.with_bucket_limit(WILDCARD_BUCKET, limit),
        None => config,
    }
}

fn fetch_task(client: reqwest::Client, url: String) -> TaskSpec<FetchedPage> {
    let bucket = host_bucket(&url);
    let description = url.clone();
    TaskSpec::new(move || {
        let client = client.clone();
        let url = url.clone();
        async move {
            let response = client.get(&url).send().await?.error_for_status()?;
            let status = response.status().as_u16();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(FetchedPage {
                url,
                status,
                bytes: body.len(),
            })
        }
    })
    .in_bucket(bucket)
    .described(description)
}

/// Fetch every URL and print one line per URL plus a summary.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the HTTP client
/// cannot be built, or no URL could be fetched.
#[instrument(skip(config, args), fields(urls = args.urls.len()))]
pub async fn run_fetch(
    config: FanoutConfig,
    args: FetchArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = apply_overrides(config, &args);
    let gatherer = Gatherer::from_config(&config)?;
    let client = reqwest::Client::builder()
        .user_agent(concat!("fanout/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let tracker = Arc::new(ProgressTracker::new(args.urls.len()));
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, skipping URLs not yet started");
            on_interrupt.cancel();
        }
    });

    let mut hooks = GatherHooks::new()
        .with_reporter(tracker.clone())
        .with_labeler(|index, task: &TaskSpec<FetchedPage>| {
            format!("Link {}: {}", index + 1, task.description().unwrap_or("?"))
        })
        .with_cancellation(cancel);
    if let Some(secs) = args.timeout_secs {
        hooks = hooks.with_timeout(Duration::try_from_secs_f64(secs)?);
    }

    let tasks = args
        .urls
        .iter()
        .map(|url| fetch_task(client.clone(), url.clone()))
        .collect();

    let board_done = CancellationToken::new();
    let board = spawn_status_board(tracker.clone(), STATUS_INTERVAL, board_done.clone());
    let gathered = gatherer.gather_with(tasks, hooks).await;
    board_done.cancel();
    if let Err(e) = board.await {
        warn!(error = %e, "Status board task ended abnormally");
    }

    match gathered {
        Ok(batch) => {
            print_batch(&batch, args.format)?;
            info!(summary = %batch.summary(), "Fetch complete");
            Ok(())
        }
        Err(e) => {
            for line in tracker.render() {
                eprintln!("{}", line);
            }
            Err(e.into())
        }
    }
}

/// Log the tracker's counts every `every` until `done` is cancelled.
///
/// Per-link lines go out at debug level. Resolves to the number of boards
/// logged.
fn spawn_status_board(
    tracker: Arc<ProgressTracker>,
    every: Duration,
    done: CancellationToken,
) -> JoinHandle<u32> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately
        ticker.tick().await;
        let mut boards = 0;
        loop {
            tokio::select! {
                biased;
                _ = done.cancelled() => break,
                _ = ticker.tick() => {
                    let snap = tracker.snapshot();
                    info!(
                        finished = snap.finished(),
                        total = snap.total,
                        running = snap.running,
                        retrying = snap.retrying,
                        failed = snap.failed,
                        "Fetch progress"
                    );
                    for line in tracker.render() {
                        debug!("{}", line);
                    }
                    boards += 1;
                }
            }
        }
        boards
    })
}

fn print_batch(
    batch: &BatchResult<FetchedPage>,
    format: OutputFormat,
) -> Result<(), serde_json::Error> {
    match format {
        OutputFormat::Human => {
            for (meta, envelope) in batch.meta().iter().zip(batch.envelopes()) {
                match envelope.outcome() {
                    TaskOutcome::Success(page) => {
                        println!("{} {} ({} bytes)", page.status, page.url, page.bytes)
                    }
                    TaskOutcome::Failed(err) => println!("ERR {}: {}", meta.label(), err.kind),
                    TaskOutcome::Cancelled => println!("SKIP {}", meta.label()),
                }
            }
            println!("{}", batch.summary());
        }
        OutputFormat::Json => {
            let results: Vec<serde_json::Value> = batch
                .meta()
                .iter()
                .zip(batch.envelopes())
                .map(|(meta, envelope)| match envelope.outcome() {
                    TaskOutcome::Success(page) => serde_json::json!({
                        "label": meta.label(),
                        "attempts": envelope.attempts(),
                        "page": page,
                    }),
                    TaskOutcome::Failed(err) => serde_json::json!({
                        "label": meta.label(),
                        "attempts": envelope.attempts(),
                        "error": err.kind.to_string(),
                    }),
                    TaskOutcome::Cancelled => serde_json::json!({
                        "label": meta.label(),
                        "cancelled": true,
                    }),
                })
                .collect();
            let report = serde_json::json!({
                "results": results,
                "summary": batch.summary(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(urls: &[&str]) -> FetchArgs {
        FetchArgs {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            ..FetchArgs::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_board_reports_until_done() {
        let tracker = Arc::new(ProgressTracker::new(2));
        let done = CancellationToken::new();
        let board = spawn_status_board(tracker, Duration::from_secs(1), done.clone());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        done.cancel();

        assert_eq!(board.await.unwrap(), 3);
    }

    #[test]
    fn test_host_bucket() {
        assert_eq!(host_bucket("https://docs.rs/tokio"), "docs.rs");
        assert_eq!(host_bucket("http://127.0.0.1:8080/x"), "127.0.0.1");
        assert_eq!(host_bucket("not a url"), UNKNOWN_HOST);
        assert_eq!(host_bucket("mailto:someone@example.com"), UNKNOWN_HOST);
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let config = FanoutConfig::bundled().unwrap();
        let merged = apply_overrides(config.clone(), &args(&["https://a.example"]));
        assert_eq!(merged, config);
    }

    #[test]
    fn test_overrides_replace_only_given_fields() {
        let config = FanoutConfig::bundled().unwrap();
        let mut fetch = args(&["https://a.example"]);
        fetch.concurrency = Some(3);
        fetch.per_host_rps = Some(0.5);
        fetch.retries = Some(2);

        let merged = apply_overrides(config.clone(), &fetch);

        let global = merged.limits().global();
        assert_eq!(*global.concurrency(), 3);
        assert_eq!(global.rps(), config.limits().global().rps());

        let per_host = merged.limits().buckets().resolve(WILDCARD_BUCKET).unwrap();
        assert_eq!(*per_host.rps(), 0.5);
        assert_eq!(*merged.retry().max_task_retries(), 2);
        assert_eq!(*merged.retry().max_total_retries(), 20);
        assert!(merged.validate().is_ok());
    }
}
