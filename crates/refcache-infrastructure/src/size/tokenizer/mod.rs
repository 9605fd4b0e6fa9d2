//! Tokenizer adapters for the token-based size measurer.

pub mod fallback;
pub mod huggingface_adapter;
pub mod tiktoken_adapter;

pub use fallback::FallbackTokenizer;
pub use huggingface_adapter::HuggingFaceAdapter;
pub use tiktoken_adapter::TiktokenAdapter;
