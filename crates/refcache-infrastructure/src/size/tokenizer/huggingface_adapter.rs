//! HuggingFace-style tokenizer adapter, lazily loaded and cached across calls.

use std::path::PathBuf;

use once_cell::sync::OnceCell;

use refcache_domain::error::{Error, Result};
use refcache_domain::ports::Tokenizer;

/// Loads a `tokenizers`-crate vocabulary from a local `tokenizer.json` file
/// the first time it is needed, then reuses the loaded tokenizer for every
/// subsequent call — exactly the "lazy-loaded, cached across calls" adapter
/// §4.6 requires.
pub struct HuggingFaceAdapter {
    model_name: String,
    tokenizer_path: PathBuf,
    inner: OnceCell<tokenizers::Tokenizer>,
}

impl std::fmt::Debug for HuggingFaceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuggingFaceAdapter")
            .field("model_name", &self.model_name)
            .field("tokenizer_path", &self.tokenizer_path)
            .finish_non_exhaustive()
    }
}

impl HuggingFaceAdapter {
    /// Construct an adapter for `model_name`, deferring the actual file load
    /// until the first `encode`/`count_tokens` call.
    #[must_use]
    pub fn new(model_name: impl Into<String>, tokenizer_path: PathBuf) -> Self {
        Self {
            model_name: model_name.into(),
            tokenizer_path,
            inner: OnceCell::new(),
        }
    }

    fn tokenizer(&self) -> Result<&tokenizers::Tokenizer> {
        self.inner.get_or_try_init(|| {
            tokenizers::Tokenizer::from_file(&self.tokenizer_path).map_err(|source| {
                Error::configuration(format!(
                    "failed to load tokenizer '{}' from {}: {source}",
                    self.model_name,
                    self.tokenizer_path.display()
                ))
            })
        })
    }
}

impl Tokenizer for HuggingFaceAdapter {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let tokenizer = self.tokenizer()?;
        let encoding = tokenizer
            .encode(text, false)
            .map_err(|source| Error::internal(format!("tokenizer encode failed: {source}")))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn count_tokens(&self, text: &str) -> Result<u64> {
        Ok(self.encode(text)?.len() as u64)
    }
}
