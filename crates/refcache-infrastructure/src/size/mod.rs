//! Size measurement: byte and token measurers, plus tokenizer adapters.

pub mod byte_measurer;
pub mod token_measurer;
pub mod tokenizer;

pub use byte_measurer::ByteMeasurer;
pub use token_measurer::TokenMeasurer;
