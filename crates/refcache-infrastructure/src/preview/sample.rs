//! Sample strategy — an evenly-spaced subsample of a list- or map-like value.

use refcache_domain::error::Result;
use refcache_domain::ports::SizeMeasurer;
use refcache_domain::value_objects::preview::{PreviewResult, PreviewStrategy};
use serde_json::Value;

use super::truncate;

fn evenly_spaced_indices(len: usize, k: usize) -> Vec<usize> {
    if k == 0 || len == 0 {
        return Vec::new();
    }
    if k >= len {
        return (0..len).collect();
    }
    (0..k)
        .map(|i| i * (len - 1) / (k.saturating_sub(1).max(1)))
        .collect()
}

fn largest_fitting_k<F>(len: usize, max_size: u64, measure_k: F) -> Result<usize>
where
    F: Fn(usize) -> Result<u64>,
{
    let (mut lo, mut hi) = (0usize, len);
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if measure_k(mid)? <= max_size {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Ok(lo)
}

/// Sample `value`, returning the largest evenly-spaced subsample (of a list)
/// or key subset (of a map) that measures at most `max_size`. Strings fall
/// back to [`truncate::truncate`].
///
/// # Errors
/// Propagates any measurement failure from `measurer`.
pub fn sample(value: &Value, max_size: u64, measurer: &dyn SizeMeasurer) -> Result<PreviewResult> {
    match value {
        Value::Array(items) => {
            let len = items.len();
            let k = largest_fitting_k(len, max_size, |k| {
                let indices = evenly_spaced_indices(len, k);
                let subset = Value::Array(indices.into_iter().map(|i| items[i].clone()).collect());
                measurer.measure(&subset)
            })?;
            let indices = evenly_spaced_indices(len, k);
            let preview = Value::Array(indices.into_iter().map(|i| items[i].clone()).collect());
            let preview_size = measurer.measure(&preview)?;
            let original_size = measurer.measure(value)?;
            Ok(PreviewResult {
                preview,
                strategy: PreviewStrategy::Sample,
                total_items: Some(len as u64),
                original_size,
                preview_size,
                page: None,
                total_pages: None,
            })
        }
        Value::Object(map) => {
            let entries: Vec<(&String, &Value)> = map.iter().collect();
            let len = entries.len();
            let k = largest_fitting_k(len, max_size, |k| {
                let indices = evenly_spaced_indices(len, k);
                let mut subset = serde_json::Map::new();
                for i in indices {
                    subset.insert(entries[i].0.clone(), entries[i].1.clone());
                }
                measurer.measure(&Value::Object(subset))
            })?;
            let indices = evenly_spaced_indices(len, k);
            let mut subset = serde_json::Map::new();
            for i in indices {
                subset.insert(entries[i].0.clone(), entries[i].1.clone());
            }
            let preview = Value::Object(subset);
            let preview_size = measurer.measure(&preview)?;
            let original_size = measurer.measure(value)?;
            Ok(PreviewResult {
                preview,
                strategy: PreviewStrategy::Sample,
                total_items: Some(len as u64),
                original_size,
                preview_size,
                page: None,
                total_pages: None,
            })
        }
        other => truncate::truncate(other, max_size, measurer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::size::ByteMeasurer;
    use serde_json::json;

    #[test]
    fn samples_list_within_max_size() {
        let value = Value::Array((0..100).map(Value::from).collect());
        let result = sample(&value, 20, &ByteMeasurer).unwrap();
        assert_eq!(result.strategy, PreviewStrategy::Sample);
        assert_eq!(result.total_items, Some(100));
        assert!(result.preview_size <= 20);
    }

    #[test]
    fn samples_map_within_max_size() {
        let mut map = serde_json::Map::new();
        for i in 0..50 {
            map.insert(format!("k{i}"), json!(i));
        }
        let value = Value::Object(map);
        let result = sample(&value, 30, &ByteMeasurer).unwrap();
        assert!(result.preview_size <= 30);
    }

    #[test]
    fn falls_back_to_truncate_for_strings() {
        let value = json!("a very long string that will not fit in the budget at all");
        let result = sample(&value, 10, &ByteMeasurer).unwrap();
        assert_eq!(result.strategy, PreviewStrategy::Truncate);
    }

    #[test]
    fn zero_budget_yields_zero_items() {
        let value = Value::Array((0..10).map(Value::from).collect());
        let result = sample(&value, 0, &ByteMeasurer).unwrap();
        assert_eq!(result.preview, Value::Array(Vec::new()));
    }
}
