//! Task backend port — submission, polling, cancellation, and cleanup of
//! background tool executions.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::Result;
use crate::value_objects::task::{CancellationHandle, RetryPolicy, TaskProgress, TaskRecord, TaskStats};

/// Where a running task reports progress. Implemented by the infrastructure
/// layer over whatever channel primitive its async runtime offers; the
/// domain layer only needs the sink contract.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Report a progress update. Fire-and-forget: implementations must never
    /// block the caller waiting for a consumer (§5's non-blocking guarantee).
    async fn report(&self, progress: TaskProgress);
}

/// The future a submitted task body resolves to: the raw tool result, to be
/// measured/previewed by the caller once the task reaches `Complete`.
pub type TaskFuture = BoxFuture<'static, Result<serde_json::Value>>;

/// A task body: given a progress sink and a cancellation handle, produce the
/// future that executes the (bound) tool invocation.
///
/// Callable repeatedly (`Fn`, not `FnOnce`): the backend's retry loop
/// (§4.11 point 6) re-invokes the same body on failure, so the closure must
/// not consume its captures on a single call.
pub type TaskFn = Box<dyn Fn(Arc<dyn ProgressSink>, CancellationHandle) -> TaskFuture + Send + Sync>;

/// A pluggable background-execution backend.
///
/// Six operations exactly per §4.10 (`shutdown`/`get_stats` included as the
/// seventh/eighth lifecycle operations the spec's prose also requires). A
/// replacement implementation (e.g. a durable distributed queue) may be
/// substituted without touching the reference store.
#[async_trait]
pub trait TaskBackend: Send + Sync + std::fmt::Debug {
    /// Submit a task body for execution under `task_id`, returning its
    /// freshly created record in the `Pending` state. The backend drives
    /// `func` through `retry_policy`'s retry-with-backoff loop internally,
    /// retrying on error until the policy is exhausted or the task is
    /// cancelled.
    async fn submit(&self, task_id: &str, func: TaskFn, retry_policy: RetryPolicy) -> Result<TaskRecord>;

    /// Fetch the current record for `task_id`, if it is tracked.
    async fn get_status(&self, task_id: &str) -> Result<Option<TaskRecord>>;

    /// Fetch the result value of a terminal, successfully completed task.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::TaskFailed`] or
    /// [`crate::error::Error::InvalidArgument`] if the task is not yet
    /// `Complete`.
    async fn get_result(&self, task_id: &str) -> Result<serde_json::Value>;

    /// Request cancellation of `task_id`. Returns `true` iff the task was
    /// pending or processing at the time of the call; returns `false` (and
    /// leaves the record unchanged) for an already-terminal task.
    async fn cancel(&self, task_id: &str) -> Result<bool>;

    /// Remove terminal task records older than `max_age_seconds`. Returns the
    /// number of records removed.
    async fn cleanup(&self, max_age_seconds: i64) -> Result<u64>;

    /// True iff cancellation has been requested for `task_id`. Intended to be
    /// polled cooperatively by running task bodies.
    async fn is_cancelled(&self, task_id: &str) -> Result<bool>;

    /// Stop accepting new submissions and release backend resources.
    async fn shutdown(&self) -> Result<()>;

    /// Aggregate statistics over all tracked tasks.
    async fn get_stats(&self) -> Result<TaskStats>;
}
