//! Access-control engine: permission resolution atop policies and namespaces.

pub mod permission_checker;

pub use permission_checker::{check, PermissionDenialReason};
