//! Scenario 6 (§8): namespace isolation.
//!
//! Alice stores a portfolio in her own user-scoped namespace with a policy
//! that grants no role-level access, only the owner. Bob must be denied
//! with an opaque error, Alice must see the value, and the system actor
//! (bypassing ownership checks) must see it too.

use refcache_domain::error::Error;
use refcache_domain::value_objects::{AccessPolicy, Actor, PermissionSet, StructuredResponse};
use refcache_server::mcp::{get_cached_result, GetCachedResultParams};
use serde_json::json;

use crate::support::store;

#[tokio::test]
async fn a_user_scoped_entry_is_hidden_from_other_users() {
    let store = store();
    let alice = Actor::user("alice");
    let policy = AccessPolicy::with_role_defaults(PermissionSet::FULL, PermissionSet::NONE, PermissionSet::FULL);

    let ref_id = store
        .set(&json!("portfolio"), json!({"value": 100}), "user:alice:portfolios", Some(policy), None, None, &alice)
        .await
        .unwrap();

    let bob = Actor::user("bob");
    let denied = get_cached_result(
        &store,
        GetCachedResultParams {
            ref_id: ref_id.as_str().to_owned(),
            actor: Some("user:bob".to_owned()),
            page: None,
            page_size: None,
            max_size: None,
        },
    )
    .await;
    assert!(matches!(denied, Err(Error::OpaqueReference { .. })));

    let as_alice = get_cached_result(
        &store,
        GetCachedResultParams {
            ref_id: ref_id.as_str().to_owned(),
            actor: Some("user:alice".to_owned()),
            page: None,
            page_size: None,
            max_size: None,
        },
    )
    .await
    .unwrap();
    match as_alice {
        StructuredResponse::Complete { value, .. } => assert_eq!(value, json!({"value": 100})),
        other => panic!("expected a complete response, got {other:?}"),
    }

    let as_system = get_cached_result(
        &store,
        GetCachedResultParams {
            ref_id: ref_id.as_str().to_owned(),
            actor: Some("system".to_owned()),
            page: None,
            page_size: None,
            max_size: None,
        },
    )
    .await
    .unwrap();
    assert!(as_system.is_complete());
}
