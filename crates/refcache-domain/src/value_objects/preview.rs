//! Preview results — the output of the context-limiting preview pipeline.

use serde::{Deserialize, Serialize};

/// Which preview strategy produced a [`PreviewResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PreviewStrategy {
    /// An evenly-spaced subsample of a list/map-like value.
    Sample,
    /// One page of an equally-sized split of a list.
    Paginate,
    /// A stringified, size-cut, ellipsis-terminated rendering.
    Truncate,
}

/// The result of running a value through a preview strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewResult {
    /// The actual structured preview value (never a stringified blob, except
    /// for [`PreviewStrategy::Truncate`], whose output is a string by nature).
    pub preview: serde_json::Value,
    /// Which strategy produced this preview.
    pub strategy: PreviewStrategy,
    /// The total number of items in the original value, if it was list-like.
    pub total_items: Option<u64>,
    /// The measured size of the original, un-previewed value.
    pub original_size: u64,
    /// The measured size of `preview`.
    pub preview_size: u64,
    /// The page number returned, for [`PreviewStrategy::Paginate`].
    pub page: Option<u32>,
    /// The total number of pages, for [`PreviewStrategy::Paginate`].
    pub total_pages: Option<u32>,
}
