//! Token-count size measurer.

use std::sync::Arc;

use refcache_domain::canonical::canonical;
use refcache_domain::error::Result;
use refcache_domain::ports::{SizeMeasurer, Tokenizer};

/// Serializes a value to canonical JSON, then measures it with an injected
/// [`Tokenizer`]. The default size-mode measurer per §4.6.
#[derive(Debug, Clone)]
pub struct TokenMeasurer {
    tokenizer: Arc<dyn Tokenizer>,
}

impl TokenMeasurer {
    /// Construct a measurer over `tokenizer`.
    #[must_use]
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }
}

impl SizeMeasurer for TokenMeasurer {
    fn measure(&self, value: &serde_json::Value) -> Result<u64> {
        self.tokenizer.count_tokens(&canonical(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::size::tokenizer::FallbackTokenizer;
    use serde_json::json;

    #[test]
    fn delegates_to_the_injected_tokenizer() {
        let measurer = TokenMeasurer::new(Arc::new(FallbackTokenizer));
        let value = json!({"a": 1});
        let expected = FallbackTokenizer.count_tokens(&canonical(&value)).unwrap();
        assert_eq!(measurer.measure(&value).unwrap(), expected);
    }
}
