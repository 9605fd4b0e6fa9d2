//! Fixed-item-count pagination.
//!
//! `refcache-infrastructure`'s `paginate` strategy derives a page's item
//! count from `max_size` via binary search — the right default when a
//! caller only cares about a size bound. A caller that names an explicit
//! `page_size` (item count) wants exactly that many items per page
//! regardless of size, so that case is handled here instead of growing the
//! `PreviewGenerator` port with a parameter none of its other callers need.

use refcache_domain::error::{Error, Result};
use refcache_domain::ports::SizeMeasurer;
use refcache_domain::value_objects::{PreviewResult, PreviewStrategy};
use serde_json::Value;

/// Paginate `value` (which must be list-like) into fixed-size pages of
/// `page_size` items each, returning `page` (1-indexed, default 1).
///
/// # Errors
/// Returns [`Error::InvalidArgument`] if `value` is not an array, if
/// `page_size` is zero, or if `page` is out of the computed range.
pub fn paginate_fixed_size(
    value: &Value,
    page: Option<u32>,
    page_size: u32,
    measurer: &dyn SizeMeasurer,
) -> Result<PreviewResult> {
    let Value::Array(items) = value else {
        return Err(Error::InvalidArgument {
            message: "paginate strategy requires a list-like value".to_owned(),
        });
    };
    if page_size == 0 {
        return Err(Error::InvalidArgument {
            message: "page_size must be at least 1".to_owned(),
        });
    }

    let page_size = page_size as usize;
    let total_items = items.len() as u64;
    let total_pages = items.len().div_ceil(page_size).max(1) as u32;
    let requested_page = page.unwrap_or(1);
    if requested_page < 1 || requested_page > total_pages {
        return Err(Error::InvalidArgument {
            message: format!("page {requested_page} out of range 1..={total_pages}"),
        });
    }

    let start = (requested_page as usize - 1) * page_size;
    let end = (start + page_size).min(items.len());
    let preview = Value::Array(items[start..end].to_vec());

    Ok(PreviewResult {
        preview_size: measurer.measure(&preview)?,
        original_size: measurer.measure(value)?,
        preview,
        strategy: PreviewStrategy::Paginate,
        total_items: Some(total_items),
        page: Some(requested_page),
        total_pages: Some(total_pages),
    })
}
