//! Size measurement ports: tokenizers and the measurers built atop them.

use crate::error::Result;

/// A pluggable tokenizer, injected into the token-based [`SizeMeasurer`].
///
/// The library never inspects token-id values; `encode` exists only so
/// callers can obtain a stable count without re-tokenizing for inspection.
pub trait Tokenizer: Send + Sync + std::fmt::Debug {
    /// The model name this tokenizer's vocabulary belongs to.
    fn model_name(&self) -> &str;

    /// Encode `text` to its token ids.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Count the tokens `text` would encode to, without necessarily
    /// allocating the id vector (adapters may override this for speed).
    fn count_tokens(&self, text: &str) -> Result<u64> {
        Ok(self.encode(text)?.len() as u64)
    }
}

/// Measures the "size" of an arbitrary JSON value, in whatever unit the
/// active mode (`TOKEN` or `BYTE`) defines.
pub trait SizeMeasurer: Send + Sync + std::fmt::Debug {
    /// Measure `value`.
    fn measure(&self, value: &serde_json::Value) -> Result<u64>;
}
