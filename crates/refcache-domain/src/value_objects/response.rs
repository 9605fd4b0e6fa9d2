//! Structured responses — what the cached-callable wrapper and the polling
//! tool return to a caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::preview::PreviewStrategy;
use super::task::TaskProgress;

/// Detail level for [`StructuredResponse::Processing`] responses.
///
/// Selected at decoration time via `CachedCallable`'s `async_response_format`
/// parameter (§4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AsyncResponseFormat {
    /// Just `ref_id` and `status`.
    Minimal,
    /// Adds `started_at`, `retry_count`, `can_retry`.
    Standard,
    /// Adds `progress`, `eta_seconds`, and an inferred return schema.
    Full,
}

/// What the wrapper returns. Exactly one of three shapes is populated,
/// matching §3's three response kinds verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuredResponse {
    /// The full value fit within the effective `max_size`; it is returned whole.
    Complete {
        /// The reference identifier for this value.
        ref_id: String,
        /// The full value.
        value: serde_json::Value,
        /// Always `true` for this variant; kept as an explicit field so the
        /// wire shape matches a client-side `is_complete` discriminator
        /// without the client needing to match on `kind`.
        is_complete: bool,
        /// The measured size of `value`.
        size: u64,
        /// The number of items, if `value` was list-like.
        total_items: Option<u64>,
    },
    /// The value exceeded the effective `max_size`; a preview is returned.
    Preview {
        /// The reference identifier for the underlying (full) value.
        ref_id: String,
        /// The preview content.
        preview: serde_json::Value,
        /// Always `false` for this variant; see [`StructuredResponse::Complete::is_complete`].
        is_complete: bool,
        /// The strategy used to produce `preview`.
        strategy: PreviewStrategy,
        /// The number of items in the original value.
        total_items: u64,
        /// The measured size of the original value.
        original_size: u64,
        /// The measured size of `preview`.
        preview_size: u64,
        /// The page returned, for paginated previews.
        page: Option<u32>,
        /// The total number of pages, for paginated previews.
        total_pages: Option<u32>,
        /// A note on what was previewed and how to see more (e.g. via `page`/`max_size`).
        message: String,
    },
    /// The tool is still running in the background.
    Processing {
        /// The reference identifier the task will populate on completion.
        ref_id: String,
        /// Always `"processing"`; present for clients that discriminate on
        /// a literal status string rather than `kind`.
        status: &'static str,
        /// When the background task was submitted.
        started_at: DateTime<Utc>,
        /// The most recent progress update, included at [`AsyncResponseFormat::Full`].
        progress: Option<TaskProgress>,
        /// An estimated seconds-to-completion, included at [`AsyncResponseFormat::Full`].
        eta_seconds: Option<f64>,
        /// How many retry attempts have been made, included at [`AsyncResponseFormat::Standard`]+.
        retry_count: Option<u32>,
        /// Whether `retry_task` may still be called, included at [`AsyncResponseFormat::Standard`]+.
        can_retry: Option<bool>,
    },
}

impl StructuredResponse {
    /// Construct a complete response.
    #[must_use]
    pub fn complete(
        ref_id: impl Into<String>,
        value: serde_json::Value,
        size: u64,
        total_items: Option<u64>,
    ) -> Self {
        Self::Complete {
            ref_id: ref_id.into(),
            value,
            is_complete: true,
            size,
            total_items,
        }
    }

    /// The reference identifier carried by any variant of this response.
    #[must_use]
    pub fn ref_id(&self) -> &str {
        match self {
            Self::Complete { ref_id, .. }
            | Self::Preview { ref_id, .. }
            | Self::Processing { ref_id, .. } => ref_id,
        }
    }

    /// True iff this response carries a finished, readable value.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}
