//! Shared fixtures for the end-to-end scenario modules.

#![allow(dead_code)]

use std::sync::Arc;

use refcache_domain::value_objects::{AccessPolicy, PermissionSet};
use refcache_infrastructure::preview::DefaultPreviewGenerator;
use refcache_infrastructure::size::ByteMeasurer;
use refcache_infrastructure::storage::MemoryStorage;
use refcache_infrastructure::task::WorkerPoolTaskBackend;
use refcache_server::ReferenceStore;

/// A store wired with the in-memory backends, matching the `refcache` demo
/// binary's own default wiring.
pub fn store() -> Arc<ReferenceStore> {
    ReferenceStore::builder("calc")
        .storage(Arc::new(MemoryStorage::new()))
        .task_backend(Arc::new(WorkerPoolTaskBackend::new(4)))
        .measurer(Arc::new(ByteMeasurer))
        .preview_generator(Arc::new(DefaultPreviewGenerator::default()))
        .build()
}

/// A policy every role can read/write/delete — used where access control
/// itself isn't the thing under test.
pub fn open_policy() -> AccessPolicy {
    AccessPolicy::with_role_defaults(PermissionSet::FULL, PermissionSet::FULL, PermissionSet::FULL)
}
