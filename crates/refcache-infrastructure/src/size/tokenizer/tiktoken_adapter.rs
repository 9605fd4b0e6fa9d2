//! Exact-BPE tokenizer adapter using `tiktoken-rs`.

use tiktoken_rs::CoreBPE;

use refcache_domain::error::{Error, Result};
use refcache_domain::ports::Tokenizer;

/// An exact-BPE tokenizer for the `cl100k_base`-class encoding shared by the
/// common LLM families §4.6 calls out.
pub struct TiktokenAdapter {
    bpe: CoreBPE,
    model_name: String,
}

impl std::fmt::Debug for TiktokenAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenAdapter")
            .field("model_name", &self.model_name)
            .finish_non_exhaustive()
    }
}

impl TiktokenAdapter {
    /// Construct the adapter for `cl100k_base`, the encoding used by GPT-3.5
    /// and GPT-4 class models.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the encoding's merge tables fail
    /// to load.
    pub fn cl100k_base() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|source| Error::configuration_with_source("failed to load cl100k_base encoding", source))?;
        Ok(Self {
            bpe,
            model_name: "cl100k_base".to_owned(),
        })
    }
}

impl Tokenizer for TiktokenAdapter {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(self
            .bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|id| id as u32)
            .collect())
    }

    fn count_tokens(&self, text: &str) -> Result<u64> {
        Ok(self.bpe.encode_ordinary(text).len() as u64)
    }
}
