//! Task descriptors: the unit of work handed to the gatherer.
//!
//! A [`TaskSpec`] pairs a callable ([`Work`]) with an optional bucket key used
//! for per-resource rate limiting. Arguments are whatever the closure
//! captures, so the descriptor itself is immutable once built.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Error returned by a work function.
///
/// Any `std::error::Error`, `String` or `&str` converts into this.
pub type WorkFailure = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Value produced by one successful attempt.
///
/// `bypass_limiter` is set by the work itself when the attempt turned out
/// not to need a real remote call (a cache hit, for example). The gatherer
/// then refunds the rate token spent on the attempt.
///
/// # Examples
///
/// ```
/// use fanout_core::Completed;
///
/// let fresh = Completed::fresh(42);
/// assert!(!fresh.bypass_limiter());
///
/// let cached = Completed::cached("page body");
/// assert!(cached.bypass_limiter());
/// assert_eq!(*cached.value(), "page body");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed<T> {
    value: T,
    bypass_limiter: bool,
}

impl<T> Completed<T> {
    /// A result that was charged against the rate limiter.
    pub fn fresh(value: T) -> Self {
        Self {
            value,
            bypass_limiter: false,
        }
    }

    /// A result that required no remote call and should not be charged.
    pub fn cached(value: T) -> Self {
        Self {
            value,
            bypass_limiter: true,
        }
    }

    /// Borrow the produced value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Whether the attempt should be refunded to the rate limiter.
    pub fn bypass_limiter(&self) -> bool {
        self.bypass_limiter
    }

    /// Split into the value and the bypass flag.
    pub fn into_parts(self) -> (T, bool) {
        (self.value, self.bypass_limiter)
    }
}

/// A unit of work the gatherer can execute, possibly several times.
///
/// Implementations must be callable from any worker and idempotent enough
/// to be retried after a failure.
#[async_trait]
pub trait Work<T>: Send + Sync {
    /// Run one attempt.
    async fn execute(&self) -> Result<Completed<T>, WorkFailure>;
}

/// Adapter for async closures returning `Result<Completed<T>, E>`.
struct AsyncFnWork<F> {
    f: F,
}

#[async_trait]
impl<T, F, Fut, E> Work<T> for AsyncFnWork<F>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Completed<T>, E>> + Send,
    E: Into<WorkFailure>,
{
    async fn execute(&self) -> Result<Completed<T>, WorkFailure> {
        (self.f)().await.map_err(Into::into)
    }
}

/// Adapter running a synchronous closure on the blocking thread pool.
struct BlockingFnWork<F> {
    f: Arc<F>,
}

#[async_trait]
impl<T, F, E> Work<T> for BlockingFnWork<F>
where
    T: Send + 'static,
    F: Fn() -> Result<Completed<T>, E> + Send + Sync + 'static,
    E: Into<WorkFailure> + Send + 'static,
{
    async fn execute(&self) -> Result<Completed<T>, WorkFailure> {
        let f = Arc::clone(&self.f);
        match tokio::task::spawn_blocking(move || f()).await {
            Ok(result) => result.map_err(Into::into),
            // Re-raise so the attempt is recorded as a panic rather than a failure
            Err(join_err) if join_err.is_panic() => std::panic::resume_unwind(join_err.into_panic()),
            Err(join_err) => Err(join_err.into()),
        }
    }
}

/// Immutable description of one task in a batch.
///
/// # Examples
///
/// ```
/// use fanout_core::{Completed, TaskSpec};
///
/// let url = "https://example.com/a".to_string();
/// let task = TaskSpec::new(move || {
///     let url = url.clone();
///     async move { Ok::<_, String>(url.len()) }
/// })
/// .in_bucket("example.com")
/// .described("fetch /a");
///
/// assert_eq!(task.bucket(), Some("example.com"));
/// assert_eq!(task.description(), Some("fetch /a"));
///
/// // A task can also report that it was served from a cache
/// let cached = TaskSpec::with_outcome(|| async { Ok::<_, String>(Completed::cached(1)) });
/// assert_eq!(cached.bucket(), None);
/// ```
pub struct TaskSpec<T> {
    work: Arc<dyn Work<T>>,
    bucket: Option<String>,
    description: Option<String>,
}

impl<T: Send + 'static> TaskSpec<T> {
    /// Wrap an async closure returning a plain value.
    ///
    /// The value is recorded with `bypass_limiter = false`.
    pub fn new<F, Fut, E>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<WorkFailure> + 'static,
    {
        Self::with_outcome(move || {
            let fut = f();
            async move { fut.await.map(Completed::fresh) }
        })
    }

    /// Wrap an async closure that decides its own bypass flag.
    pub fn with_outcome<F, Fut, E>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Completed<T>, E>> + Send + 'static,
        E: Into<WorkFailure> + 'static,
    {
        Self::from_work(Arc::new(AsyncFnWork { f }))
    }

    /// Wrap a synchronous closure; it runs on tokio's blocking pool.
    pub fn blocking<F, E>(f: F) -> Self
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        E: Into<WorkFailure> + Send + 'static,
    {
        Self::blocking_with_outcome(move || f().map(Completed::fresh))
    }

    /// Wrap a synchronous closure that decides its own bypass flag.
    pub fn blocking_with_outcome<F, E>(f: F) -> Self
    where
        F: Fn() -> Result<Completed<T>, E> + Send + Sync + 'static,
        E: Into<WorkFailure> + Send + 'static,
    {
        Self::from_work(Arc::new(BlockingFnWork { f: Arc::new(f) }))
    }
}

impl<T> TaskSpec<T> {
    /// Use a hand-written [`Work`] implementation.
    pub fn from_work(work: Arc<dyn Work<T>>) -> Self {
        Self {
            work,
            bucket: None,
            description: None,
        }
    }

    /// Assign the task to a rate limit bucket.
    pub fn in_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Attach a human-readable description for labelers.
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Bucket key, or `None` when only the global limit applies.
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    /// Caller-supplied description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Shared handle to the work, used by the gatherer for each attempt.
    pub fn work(&self) -> Arc<dyn Work<T>> {
        Arc::clone(&self.work)
    }
}

impl<T> Clone for TaskSpec<T> {
    fn clone(&self) -> Self {
        Self {
            work: Arc::clone(&self.work),
            bucket: self.bucket.clone(),
            description: self.description.clone(),
        }
    }
}

impl<T> fmt::Debug for TaskSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("bucket", &self.bucket)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
