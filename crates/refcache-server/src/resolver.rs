//! Reference resolver — deep recursive substitution of reference identifiers
//! found in nested tool arguments.

use std::collections::HashSet;

use refcache_domain::error::{Error, Result};
use refcache_domain::value_objects::{Actor, ReferenceId};
use serde_json::Value;

use crate::reference_store::ReferenceStore;

/// Walk `value` (scalars, lists, maps, arbitrarily nested) and replace every
/// leaf string matching the reference-identifier shape with the value it
/// resolves to, recursively, until no further substitution is possible.
///
/// A fresh, empty `visited` set starts each top-level call; it accumulates
/// branch-scoped (not global) as the walk descends, so the same identifier
/// appearing in sibling branches is never mistaken for a cycle.
///
/// # Errors
/// Returns [`Error::CircularReference`] if an identifier reappears on its own
/// branch, or whatever [`ReferenceStore::resolve`] returns (already collapsed
/// to [`Error::OpaqueReference`] for not-found/denied) if any identifier
/// cannot be resolved.
pub async fn resolve_deep(store: &ReferenceStore, value: &Value, actor: &Actor) -> Result<Value> {
    resolve_branch(store, value, actor, &HashSet::new(), &[]).await
}

fn resolve_branch<'a>(
    store: &'a ReferenceStore,
    value: &'a Value,
    actor: &'a Actor,
    visited: &'a HashSet<ReferenceId>,
    chain: &'a [String],
) -> futures::future::BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        match value {
            Value::String(raw) if ReferenceId::looks_like_one(raw) => {
                let ref_id = ReferenceId::parse(raw.clone())?;
                if visited.contains(&ref_id) {
                    let mut full_chain = chain.to_vec();
                    full_chain.push(ref_id.to_string());
                    return Err(Error::CircularReference { chain: full_chain });
                }
                let mut next_visited = visited.clone();
                next_visited.insert(ref_id.clone());
                let mut next_chain = chain.to_vec();
                next_chain.push(ref_id.to_string());

                let resolved = store.resolve(&ref_id, actor).await?;
                resolve_branch(store, &resolved, actor, &next_visited, &next_chain).await
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(resolve_branch(store, item, actor, visited, chain).await?);
                }
                Ok(Value::Array(out))
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, val) in map {
                    out.insert(key.clone(), resolve_branch(store, val, actor, visited, chain).await?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    })
}
