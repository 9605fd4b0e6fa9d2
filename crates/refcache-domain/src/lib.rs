//! Domain layer for `mcp-refcache`.
//!
//! Core types, ports, and access-control logic for the reference-based
//! caching library. This crate is infrastructure-agnostic: storage backends,
//! task execution, tokenizers, and preview generators are all defined here
//! as traits (`ports`), implemented in `refcache-infrastructure`.

pub mod access;
pub mod canonical;
pub mod error;
pub mod ports;
pub mod value_objects;

pub use canonical::canonical;
pub use error::{Error, Result, OPAQUE_REFERENCE_MESSAGE};
