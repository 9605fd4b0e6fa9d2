//! Scenario 5 (§8): circular reference detection.
//!
//! Two stored entries point at each other. Calling a cached tool with one of
//! them as an argument must surface `CircularReference` from the wrapper's
//! own argument-resolution step, not merely from the resolver's internal
//! unit tests.

use std::sync::Arc;

use refcache_domain::error::Error;
use refcache_domain::value_objects::Actor;
use refcache_server::{CachedCallable, InvocationContext};
use serde_json::json;

use crate::support::{open_policy, store};

#[tokio::test]
async fn a_mutual_reference_is_rejected_before_the_tool_body_runs() {
    let store = store();
    let actor = Actor::system();

    let ref_b = store.set(&json!("b-key"), json!("placeholder"), "public", Some(open_policy()), None, None, &actor).await.unwrap();
    let ref_a =
        store.set(&json!("a-key"), json!([ref_b.as_str()]), "public", Some(open_policy()), None, None, &actor).await.unwrap();
    store
        .set(&json!("b-key"), json!([ref_a.as_str()]), "public", Some(open_policy()), None, None, &actor)
        .await
        .unwrap();

    let body: refcache_server::ToolBody =
        Arc::new(|args, _progress, _cancellation| Box::pin(async move { Ok(args) }));
    let echo = CachedCallable::new("echo", store.clone(), body, "public");

    let context = InvocationContext::new();
    let result = echo.invoke(json!(ref_a.as_str()), &actor, &context, None, None, None, None).await;
    assert!(matches!(result, Err(Error::CircularReference { .. })), "expected a circular reference error, got {result:?}");
}
