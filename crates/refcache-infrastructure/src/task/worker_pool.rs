//! In-process worker pool — the built-in `TaskBackend` implementation.
//!
//! A fixed number of concurrent workers (a `tokio::sync::Semaphore` permit
//! count, the async-runtime equivalent of the spec's "fixed-size pool of
//! worker threads") execute submitted task bodies. Cancellation is
//! cooperative per §5: `cancel` only flips the shared
//! [`CancellationHandle`]; the task body is expected to observe it and
//! return early, and its resources are reclaimed the moment its future
//! resolves, same as any other completed tokio task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use refcache_domain::error::{Error, Result};
use refcache_domain::ports::task_backend::{ProgressSink, TaskBackend, TaskFn};
use refcache_domain::value_objects::task::{
    CancellationHandle, RetryPolicy, TaskProgress, TaskRecord, TaskStats, TaskStatus,
};

/// The minimum interval between two progress updates landing in the
/// registry for the same task, per §4.11 point 7.
const PROGRESS_RATE_LIMIT: Duration = Duration::from_millis(100);

struct TrackedTask {
    record: TaskRecord,
    result: Option<serde_json::Value>,
}

/// Posts progress updates into the shared task map, rate-limited to one
/// update per [`PROGRESS_RATE_LIMIT`] and never blocking the reporting task.
struct RegistrySink {
    tasks: Arc<Mutex<HashMap<String, TrackedTask>>>,
    task_id: String,
    last_reported: Mutex<Option<Instant>>,
}

#[async_trait]
impl ProgressSink for RegistrySink {
    async fn report(&self, progress: TaskProgress) {
        let now = Instant::now();
        {
            let mut last = self.last_reported.lock();
            if last.is_some_and(|prev| now.duration_since(prev) < PROGRESS_RATE_LIMIT) {
                return;
            }
            *last = Some(now);
        }
        if let Some(tracked) = self.tasks.lock().get_mut(&self.task_id) {
            tracked.record.progress = Some(progress);
        }
    }
}

/// A fixed-size in-process worker pool tracking tasks in a shared map
/// guarded by one mutex, exactly per §5's shared-resource policy for the
/// task registry.
#[derive(Debug)]
pub struct WorkerPoolTaskBackend {
    tasks: Arc<Mutex<HashMap<String, TrackedTask>>>,
    semaphore: Arc<Semaphore>,
}

impl WorkerPoolTaskBackend {
    /// Construct a pool allowing up to `pool_size` task bodies to run
    /// concurrently.
    #[must_use]
    pub fn new(pool_size: usize) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(pool_size.max(1))),
        }
    }
}

impl Default for WorkerPoolTaskBackend {
    fn default() -> Self {
        Self::new(4)
    }
}

#[async_trait]
impl TaskBackend for WorkerPoolTaskBackend {
    async fn submit(&self, task_id: &str, func: TaskFn, retry_policy: RetryPolicy) -> Result<TaskRecord> {
        let record = TaskRecord::new(task_id, retry_policy.max_retries);
        let cancellation = record.cancellation.clone();
        {
            self.tasks.lock().insert(
                task_id.to_owned(),
                TrackedTask {
                    record: record.clone(),
                    result: None,
                },
            );
        }

        let tasks = Arc::clone(&self.tasks);
        let semaphore = Arc::clone(&self.semaphore);
        let task_id = task_id.to_owned();

        tokio::spawn(async move {
            {
                let mut guard = tasks.lock();
                let Some(tracked) = guard.get_mut(&task_id) else { return };
                if !tracked.record.transition(TaskStatus::Processing) {
                    return;
                }
            }

            let sink: Arc<dyn ProgressSink> = Arc::new(RegistrySink {
                tasks: Arc::clone(&tasks),
                task_id: task_id.clone(),
                last_reported: Mutex::new(None),
            });

            let mut attempt = 0u32;
            loop {
                let Ok(_permit) = semaphore.acquire().await else { return };
                if cancellation.is_cancelled() {
                    let mut guard = tasks.lock();
                    if let Some(tracked) = guard.get_mut(&task_id) {
                        tracked.record.transition(TaskStatus::Cancelled);
                    }
                    return;
                }

                let outcome = func(Arc::clone(&sink), cancellation.clone()).await;

                match outcome {
                    Ok(value) => {
                        let mut guard = tasks.lock();
                        if let Some(tracked) = guard.get_mut(&task_id) {
                            if cancellation.is_cancelled() {
                                tracked.record.transition(TaskStatus::Cancelled);
                            } else {
                                tracked.result = Some(value);
                                tracked.record.transition(TaskStatus::Complete);
                            }
                        }
                        return;
                    }
                    Err(err) => {
                        if cancellation.is_cancelled() {
                            let mut guard = tasks.lock();
                            if let Some(tracked) = guard.get_mut(&task_id) {
                                tracked.record.transition(TaskStatus::Cancelled);
                            }
                            return;
                        }
                        let exhausted = {
                            let mut guard = tasks.lock();
                            let Some(tracked) = guard.get_mut(&task_id) else { return };
                            tracked.record.last_error = Some(err.to_string());
                            if tracked.record.retries_exhausted() {
                                tracked.record.transition(TaskStatus::Failed);
                                true
                            } else {
                                tracked.record.retry_count += 1;
                                false
                            }
                        };
                        if exhausted {
                            return;
                        }
                        tracing::debug!(task_id = %task_id, attempt, "retrying task after failure");
                        tokio::time::sleep(retry_policy.delay_for_attempt(attempt)).await;
                        attempt += 1;
                    }
                }
            }
        });

        Ok(record)
    }

    async fn get_status(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        Ok(self.tasks.lock().get(task_id).map(|tracked| tracked.record.clone()))
    }

    async fn get_result(&self, task_id: &str) -> Result<serde_json::Value> {
        let guard = self.tasks.lock();
        let tracked = guard
            .get(task_id)
            .ok_or_else(|| Error::NotFound { resource: format!("task {task_id}") })?;
        match tracked.record.status {
            TaskStatus::Complete => tracked
                .result
                .clone()
                .ok_or_else(|| Error::internal("complete task is missing its result")),
            TaskStatus::Failed => Err(Error::TaskFailed {
                message: tracked.record.last_error.clone().unwrap_or_default(),
            }),
            TaskStatus::Cancelled => Err(Error::Cancelled),
            TaskStatus::Pending | TaskStatus::Processing => Err(Error::InvalidArgument {
                message: format!("task {task_id} has not reached a terminal state"),
            }),
        }
    }

    async fn cancel(&self, task_id: &str) -> Result<bool> {
        let mut guard = self.tasks.lock();
        let Some(tracked) = guard.get_mut(task_id) else { return Ok(false) };
        if tracked.record.status.is_terminal() || tracked.record.cancellation.is_cancelled() {
            return Ok(false);
        }
        tracked.record.cancellation.cancel();
        if tracked.record.status == TaskStatus::Pending {
            tracked.record.transition(TaskStatus::Cancelled);
        }
        Ok(true)
    }

    async fn cleanup(&self, max_age_seconds: i64) -> Result<u64> {
        let mut guard = self.tasks.lock();
        let now = Utc::now();
        let before = guard.len();
        guard.retain(|_, tracked| match tracked.record.completed_at {
            Some(completed_at) => (now - completed_at).num_seconds() < max_age_seconds,
            None => true,
        });
        Ok((before - guard.len()) as u64)
    }

    async fn is_cancelled(&self, task_id: &str) -> Result<bool> {
        Ok(self
            .tasks
            .lock()
            .get(task_id)
            .is_some_and(|tracked| tracked.record.cancellation.is_cancelled()))
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::debug!("worker pool task backend shutting down");
        Ok(())
    }

    async fn get_stats(&self) -> Result<TaskStats> {
        let guard = self.tasks.lock();
        let mut stats = TaskStats::default();
        for tracked in guard.values() {
            match tracked.record.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Complete => stats.complete += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }
}
