//! Background task tracking — status, progress, and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The lifecycle state of a background task.
///
/// Transitions are monotonic: `Pending -> Processing -> {Complete, Failed,
/// Cancelled}`. Once terminal, a task never transitions again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Submitted, not yet picked up by a worker.
    Pending,
    /// A worker is actively executing the task.
    Processing,
    /// Finished successfully; a result is available.
    Complete,
    /// Exhausted its retry budget; a last-error message is available.
    Failed,
    /// Cancelled before or during execution.
    Cancelled,
}

impl TaskStatus {
    /// True iff this status is terminal (no further transitions are valid).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    /// True iff transitioning from `self` to `next` is a legal monotonic step.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Cancelled)
                | (Self::Processing, Self::Complete)
                | (Self::Processing, Self::Failed)
                | (Self::Processing, Self::Cancelled)
        )
    }
}

/// A progress update reported by a running task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    /// Units of work completed so far.
    pub current: u64,
    /// Total units of work, if known.
    pub total: Option<u64>,
    /// A human-readable progress message.
    pub message: Option<String>,
    /// `current / total * 100`, if `total` is known.
    pub percentage: Option<f64>,
}

impl TaskProgress {
    /// Construct a progress update, computing `percentage` from `current`/`total`.
    #[must_use]
    pub fn new(current: u64, total: Option<u64>, message: Option<String>) -> Self {
        let percentage = total.filter(|&t| t > 0).map(|t| current as f64 / t as f64 * 100.0);
        Self {
            current,
            total,
            message,
            percentage,
        }
    }
}

/// A shared, clonable flag used for cooperative task cancellation.
///
/// This is the domain-level "handle for cancellation" §3 attributes to a
/// task record. The worker pool observes [`CancellationHandle::is_cancelled`]
/// between units of work; it never forcibly aborts a running task.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle(Arc<AtomicBool>);

impl CancellationHandle {
    /// Construct a fresh, not-yet-cancelled handle.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True iff cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tracks an in-flight (or recently completed) background execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// The reference identifier this task will populate on success.
    pub ref_id: String,
    /// The task's current lifecycle state.
    pub status: TaskStatus,
    /// The most recent progress update, if any has been reported.
    pub progress: Option<TaskProgress>,
    /// When the task was submitted.
    pub started_at: DateTime<Utc>,
    /// When the task reached a terminal state, if it has.
    pub completed_at: Option<DateTime<Utc>>,
    /// The error text from the last failed attempt, if any.
    pub last_error: Option<String>,
    /// How many retry attempts have been made so far.
    pub retry_count: u32,
    /// The configured retry cap.
    pub max_retries: u32,
    /// The cancellation handle shared with the executing worker.
    #[serde(skip)]
    pub cancellation: CancellationHandle,
}

impl TaskRecord {
    /// Construct a freshly submitted task record in the `Pending` state.
    #[must_use]
    pub fn new(ref_id: impl Into<String>, max_retries: u32) -> Self {
        Self {
            ref_id: ref_id.into(),
            status: TaskStatus::Pending,
            progress: None,
            started_at: Utc::now(),
            completed_at: None,
            last_error: None,
            retry_count: 0,
            max_retries,
            cancellation: CancellationHandle::new(),
        }
    }

    /// Attempt a state transition, applying terminal bookkeeping as needed.
    ///
    /// Returns `false` (no-op) if the transition is not a legal monotonic
    /// step, matching `cancel`'s documented idempotent-false-on-double-cancel
    /// behavior from §5.
    #[must_use]
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        true
    }

    /// True iff the retry budget is exhausted.
    #[must_use]
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Retry knobs for a submitted task, set at decoration time (§4.11) and
/// consumed by the task backend's internal retry loop — `func` is invoked
/// again with `retry_delay_ms * backoff_factor.powi(attempt)` of backoff
/// between attempts until `max_retries` is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of re-invocations after the first attempt fails.
    pub max_retries: u32,
    /// Base delay before the first retry, in milliseconds.
    pub retry_delay_ms: u64,
    /// Multiplier applied to the delay for each subsequent attempt.
    pub backoff_factor: f64,
}

impl RetryPolicy {
    /// No retries: a single attempt only.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            retry_delay_ms: 0,
            backoff_factor: 1.0,
        }
    }

    /// The delay before retry attempt `attempt` (0-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let millis = self.retry_delay_ms as f64 * self.backoff_factor.powi(attempt as i32);
        std::time::Duration::from_millis(millis.round().max(0.0) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Aggregate statistics over a task backend's tracked tasks.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaskStats {
    /// Tasks currently `Pending`.
    pub pending: u64,
    /// Tasks currently `Processing`.
    pub processing: u64,
    /// Tasks that reached `Complete`.
    pub complete: u64,
    /// Tasks that reached `Failed`.
    pub failed: u64,
    /// Tasks that reached `Cancelled`.
    pub cancelled: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_succeed() {
        let mut task = TaskRecord::new("ref_aaaaaaaaaaaaaaaa", 3);
        assert!(task.transition(TaskStatus::Processing));
        assert!(task.transition(TaskStatus::Complete));
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut task = TaskRecord::new("ref_aaaaaaaaaaaaaaaa", 3);
        assert!(!task.transition(TaskStatus::Complete));
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn terminal_state_never_transitions_again() {
        let mut task = TaskRecord::new("ref_aaaaaaaaaaaaaaaa", 3);
        task.transition(TaskStatus::Processing);
        task.transition(TaskStatus::Cancelled);
        assert!(!task.transition(TaskStatus::Processing));
        assert!(!task.transition(TaskStatus::Complete));
    }

    #[test]
    fn double_cancel_is_idempotent_false() {
        let mut task = TaskRecord::new("ref_aaaaaaaaaaaaaaaa", 3);
        task.transition(TaskStatus::Processing);
        assert!(task.transition(TaskStatus::Cancelled));
        assert!(!task.transition(TaskStatus::Cancelled));
    }

    #[test]
    fn progress_percentage_is_derived() {
        let progress = TaskProgress::new(25, Some(100), None);
        assert_eq!(progress.percentage, Some(25.0));
        let unknown_total = TaskProgress::new(25, None, None);
        assert_eq!(unknown_total.percentage, None);
    }

    #[test]
    fn cancellation_handle_is_shared_across_clones() {
        let handle = CancellationHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());
        handle.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn retry_policy_none_has_zero_delay() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.delay_for_attempt(0), std::time::Duration::ZERO);
    }

    #[test]
    fn retry_policy_applies_exponential_backoff() {
        let policy = RetryPolicy {
            max_retries: 3,
            retry_delay_ms: 100,
            backoff_factor: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(0), std::time::Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), std::time::Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), std::time::Duration::from_millis(400));
    }
}
