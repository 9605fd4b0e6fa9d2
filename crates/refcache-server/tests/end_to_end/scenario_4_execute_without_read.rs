//! Scenario 4 (§8): EXECUTE without READ.
//!
//! A secret entry grants agents `EXECUTE` only. A cached tool that takes the
//! secret's reference as an argument can still run against its plaintext,
//! because `CachedCallable::invoke` resolves arguments on the wrapper's
//! trusted internal path — but the same agent calling `get_cached_result` on
//! the secret's own identifier is denied, and only a trusted server-side
//! actor may `resolve` it directly.

use std::sync::Arc;

use refcache_domain::error::Error;
use refcache_domain::value_objects::{AccessPolicy, Actor, PermissionSet, StructuredResponse};
use refcache_server::{CachedCallable, InvocationContext};
use serde_json::json;

use crate::support::store;

#[tokio::test]
async fn execute_only_argument_is_usable_by_a_tool_but_not_directly_readable() {
    let store = store();
    let owner = Actor::user("alice");

    let mut secret_policy = AccessPolicy::owner_only("user:alice", PermissionSet::FULL);
    secret_policy.agent_permissions = PermissionSet::EXECUTE;
    let secret_ref =
        store.set(&json!("secret"), json!({"balance": 4200}), "public", Some(secret_policy), None, None, &owner).await.unwrap();

    let body: refcache_server::ToolBody = Arc::new(|args, _progress, _cancellation| {
        Box::pin(async move {
            let balance = args.get("balance").and_then(serde_json::Value::as_i64).expect("balance");
            Ok(json!({"over_threshold": balance > 1000}))
        })
    });
    let summarize = CachedCallable::new("summarize_balance", store.clone(), body, "public");

    let agent = Actor::agent("bot");
    let context = InvocationContext::new();
    let summary = summarize
        .invoke(json!(secret_ref.as_str()), &agent, &context, None, None, None, None)
        .await
        .expect("EXECUTE-only arguments must still be usable inside a tool body");
    match summary {
        StructuredResponse::Complete { value, .. } => assert_eq!(value, json!({"over_threshold": true})),
        other => panic!("expected a complete response, got {other:?}"),
    }

    let denied = store.get(&secret_ref, &agent, None, None, None).await;
    assert!(
        matches!(denied, Err(Error::OpaqueReference { .. })),
        "EXECUTE alone must never grant disclosure of the underlying value"
    );

    let trusted = agent.as_trusted_server_path();
    let disclosed = store.resolve(&secret_ref, &trusted).await.unwrap();
    assert_eq!(disclosed, json!({"balance": 4200}));
}
