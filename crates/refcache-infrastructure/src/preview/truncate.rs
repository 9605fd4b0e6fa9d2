//! Truncate strategy — the escape hatch for values Sample can't handle.

use refcache_domain::canonical::canonical;
use refcache_domain::error::Result;
use refcache_domain::ports::SizeMeasurer;
use refcache_domain::value_objects::preview::{PreviewResult, PreviewStrategy};
use serde_json::Value;

/// Ellipsis marker appended to a truncated string.
const ELLIPSIS: &str = "...[truncated]";

/// Stringify `value`, cut it at `max_size`, and append [`ELLIPSIS`].
///
/// `max_size` is interpreted in the same unit `measurer` reports; the cut
/// point is found by binary search over candidate string lengths so the
/// result (including the ellipsis marker) measures at most `max_size`
/// whenever that is achievable at all.
///
/// # Errors
/// Propagates any measurement failure from `measurer`.
pub fn truncate(value: &Value, max_size: u64, measurer: &dyn SizeMeasurer) -> Result<PreviewResult> {
    let original_size = measurer.measure(value)?;
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => canonical(other),
    };

    if measurer.measure(&Value::String(rendered.clone()))? <= max_size {
        let preview = Value::String(rendered);
        let preview_size = measurer.measure(&preview)?;
        return Ok(PreviewResult {
            preview,
            strategy: PreviewStrategy::Truncate,
            total_items: None,
            original_size,
            preview_size,
            page: None,
            total_pages: None,
        });
    }

    let char_indices: Vec<usize> = rendered.char_indices().map(|(i, _)| i).chain(std::iter::once(rendered.len())).collect();
    let (mut lo, mut hi) = (0usize, char_indices.len() - 1);
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        let candidate = format!("{}{ELLIPSIS}", &rendered[..char_indices[mid]]);
        if measurer.measure(&Value::String(candidate))? <= max_size {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    let cut = &rendered[..char_indices[lo]];
    let preview = Value::String(if lo == 0 {
        String::new()
    } else {
        format!("{cut}{ELLIPSIS}")
    });
    let preview_size = measurer.measure(&preview)?;
    let total_items = if lo == 0 { Some(0) } else { None };

    Ok(PreviewResult {
        preview,
        strategy: PreviewStrategy::Truncate,
        total_items,
        original_size,
        preview_size,
        page: None,
        total_pages: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::size::ByteMeasurer;
    use serde_json::json;

    #[test]
    fn short_string_is_returned_unmodified() {
        let value = json!("hello");
        let result = truncate(&value, 100, &ByteMeasurer).unwrap();
        assert_eq!(result.preview, json!("hello"));
        assert_eq!(result.strategy, PreviewStrategy::Truncate);
    }

    #[test]
    fn long_string_is_cut_and_marked() {
        let value = json!("a".repeat(1000));
        let result = truncate(&value, 50, &ByteMeasurer).unwrap();
        assert!(result.preview_size <= 50);
        let Value::String(preview) = &result.preview else { panic!("expected string") };
        assert!(preview.ends_with("...[truncated]") || preview.is_empty());
    }

    #[test]
    fn non_string_values_are_stringified_first() {
        let value = json!({"a": 1, "b": [1, 2, 3]});
        let result = truncate(&value, 200, &ByteMeasurer).unwrap();
        let Value::String(preview) = &result.preview else { panic!("expected string") };
        assert!(preview.contains("\"a\":1"));
    }

    #[test]
    fn budget_below_minimum_yields_zero_items_note() {
        let value = json!("a".repeat(1000));
        let result = truncate(&value, 1, &ByteMeasurer).unwrap();
        assert_eq!(result.total_items, Some(0));
    }
}
