//! Paginate strategy — split a list into equal pages, each ≤ `max_size`.

use refcache_domain::error::{Error, Result};
use refcache_domain::ports::SizeMeasurer;
use refcache_domain::value_objects::preview::{PreviewResult, PreviewStrategy};
use serde_json::Value;

/// The largest page size (number of items) whose serialized form measures
/// at most `max_size`, found by binary search over the first page.
fn largest_fitting_page_size(items: &[Value], max_size: u64, measurer: &dyn SizeMeasurer) -> Result<usize> {
    let len = items.len();
    let (mut lo, mut hi) = (0usize, len);
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        let page = Value::Array(items[..mid].to_vec());
        if measurer.measure(&page)? <= max_size {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Ok(lo.max(1))
}

/// Paginate `value` (which must be list-like), returning `page` (1-indexed,
/// default 1) sized to fit `max_size`.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] if `value` is not an array, or if
/// `page` is out of the computed `[1, total_pages]` range.
pub fn paginate(
    value: &Value,
    max_size: u64,
    measurer: &dyn SizeMeasurer,
    page: Option<u32>,
) -> Result<PreviewResult> {
    let Value::Array(items) = value else {
        return Err(Error::InvalidArgument {
            message: "paginate strategy requires a list-like value".to_owned(),
        });
    };

    let total_items = items.len() as u64;
    if items.is_empty() {
        return Ok(PreviewResult {
            preview: Value::Array(Vec::new()),
            strategy: PreviewStrategy::Paginate,
            total_items: Some(0),
            original_size: measurer.measure(value)?,
            preview_size: measurer.measure(&Value::Array(Vec::new()))?,
            page: Some(1),
            total_pages: Some(1),
        });
    }

    let page_size = largest_fitting_page_size(items, max_size, measurer)?;
    let total_pages = items.len().div_ceil(page_size) as u32;
    let requested_page = page.unwrap_or(1);
    if requested_page < 1 || requested_page > total_pages {
        return Err(Error::InvalidArgument {
            message: format!("page {requested_page} out of range 1..={total_pages}"),
        });
    }

    let start = (requested_page as usize - 1) * page_size;
    let end = (start + page_size).min(items.len());
    let preview = Value::Array(items[start..end].to_vec());
    let preview_size = measurer.measure(&preview)?;
    let original_size = measurer.measure(value)?;

    Ok(PreviewResult {
        preview,
        strategy: PreviewStrategy::Paginate,
        total_items: Some(total_items),
        original_size,
        preview_size,
        page: Some(requested_page),
        total_pages: Some(total_pages),
    })
}
