//! Preview generation strategies: sample, paginate, and truncate, plus the
//! default [`PreviewGenerator`] that dispatches among them per §4.7.

pub mod paginate;
pub mod sample;
pub mod truncate;

use refcache_domain::error::Result;
use refcache_domain::ports::{PreviewGenerator, SizeMeasurer};
use refcache_domain::value_objects::preview::PreviewResult;
use serde_json::Value;

/// Which strategy a cache defaults to when no `page` is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultStrategy {
    /// Evenly-spaced subsample (the spec's default for list/map-like values).
    #[default]
    Sample,
    /// Equal-sized pages (used whenever `page` is explicitly given, regardless
    /// of this setting — see [`DefaultPreviewGenerator::generate`]).
    Paginate,
}

/// The stock [`PreviewGenerator`]: Sample or Paginate by configuration,
/// always Paginate when `page` is explicitly requested, Truncate as the
/// fallback for scalar values neither strategy can subset.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPreviewGenerator {
    default_strategy: DefaultStrategy,
}

impl DefaultPreviewGenerator {
    /// Construct a generator defaulting to `default_strategy` when no `page`
    /// is given.
    #[must_use]
    pub fn new(default_strategy: DefaultStrategy) -> Self {
        Self { default_strategy }
    }
}

impl PreviewGenerator for DefaultPreviewGenerator {
    fn generate(
        &self,
        value: &Value,
        max_size: u64,
        measurer: &dyn SizeMeasurer,
        page: Option<u32>,
    ) -> Result<PreviewResult> {
        if page.is_some() {
            return paginate::paginate(value, max_size, measurer, page);
        }
        match self.default_strategy {
            DefaultStrategy::Sample => sample::sample(value, max_size, measurer),
            DefaultStrategy::Paginate if matches!(value, Value::Array(_)) => {
                paginate::paginate(value, max_size, measurer, None)
            }
            DefaultStrategy::Paginate => sample::sample(value, max_size, measurer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::size::ByteMeasurer;
    use refcache_domain::value_objects::preview::PreviewStrategy;
    use serde_json::json;

    #[test]
    fn explicit_page_forces_paginate_even_under_sample_default() {
        let generator = DefaultPreviewGenerator::new(DefaultStrategy::Sample);
        let value = Value::Array((0..50).map(Value::from).collect());
        let result = generator.generate(&value, 20, &ByteMeasurer, Some(1)).unwrap();
        assert_eq!(result.strategy, PreviewStrategy::Paginate);
    }

    #[test]
    fn default_sample_is_used_without_a_page() {
        let generator = DefaultPreviewGenerator::default();
        let value = Value::Array((0..50).map(Value::from).collect());
        let result = generator.generate(&value, 20, &ByteMeasurer, None).unwrap();
        assert_eq!(result.strategy, PreviewStrategy::Sample);
    }

    #[test]
    fn scalar_falls_back_to_truncate_regardless_of_default() {
        let generator = DefaultPreviewGenerator::new(DefaultStrategy::Paginate);
        let value = json!("a string that does not fit");
        let result = generator.generate(&value, 5, &ByteMeasurer, None).unwrap();
        assert_eq!(result.strategy, PreviewStrategy::Truncate);
    }
}
