//! Preview generation port.

use crate::error::Result;
use crate::ports::size_measurer::SizeMeasurer;
use crate::value_objects::preview::PreviewResult;

/// Produces a size-bounded preview of an oversized value.
///
/// A concrete generator picks among Sample/Paginate/Truncate per §4.7: Sample
/// by default for list/map-like values (falling back to Truncate for
/// scalars/strings), Paginate whenever `page` is explicitly given.
pub trait PreviewGenerator: Send + Sync + std::fmt::Debug {
    /// Generate a preview of `value` that measures at most `max_size` under
    /// `measurer`, optionally requesting a specific `page` (forces Paginate).
    fn generate(
        &self,
        value: &serde_json::Value,
        max_size: u64,
        measurer: &dyn SizeMeasurer,
        page: Option<u32>,
    ) -> Result<PreviewResult>;
}
