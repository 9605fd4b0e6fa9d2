//! Byte-count size measurer.

use refcache_domain::canonical::canonical;
use refcache_domain::error::Result;
use refcache_domain::ports::SizeMeasurer;

/// Measures `len(canonical_json(value))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteMeasurer;

impl SizeMeasurer for ByteMeasurer {
    fn measure(&self, value: &serde_json::Value) -> Result<u64> {
        Ok(canonical(value).len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn measures_canonical_serialized_length() {
        let measurer = ByteMeasurer;
        let value = json!({"a": 1});
        assert_eq!(measurer.measure(&value).unwrap(), canonical(&value).len() as u64);
    }
}
