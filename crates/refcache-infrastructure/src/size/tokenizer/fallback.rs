//! Fallback tokenizer — approximates one token per four bytes.

use refcache_domain::error::Result;
use refcache_domain::ports::Tokenizer;

/// Zero-dependency tokenizer used when no exact tokenizer is installed.
/// The default size-mode tokenizer per §4.6.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackTokenizer;

impl Tokenizer for FallbackTokenizer {
    fn model_name(&self) -> &str {
        "fallback-bytes-per-4"
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let count = text.len().div_ceil(4);
        Ok(vec![0; count])
    }

    fn count_tokens(&self, text: &str) -> Result<u64> {
        Ok(text.len().div_ceil(4) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approximates_one_token_per_four_bytes() {
        let tokenizer = FallbackTokenizer;
        assert_eq!(tokenizer.count_tokens("12345678").unwrap(), 2);
        assert_eq!(tokenizer.count_tokens("123").unwrap(), 1);
        assert_eq!(tokenizer.count_tokens("").unwrap(), 0);
    }

    #[test]
    fn encode_length_matches_count_tokens() {
        let tokenizer = FallbackTokenizer;
        let text = "a fairly long string to approximate";
        assert_eq!(tokenizer.encode(text).unwrap().len() as u64, tokenizer.count_tokens(text).unwrap());
    }
}
