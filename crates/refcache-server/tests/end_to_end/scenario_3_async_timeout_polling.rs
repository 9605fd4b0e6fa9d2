//! Scenario 3 (§8): async timeout, then polling to completion.
//!
//! `slow_tool` is decorated with a short `async_timeout`; its body sleeps
//! well past that deadline. The first call must return a processing
//! response without blocking for the full duration; polling via
//! `get_cached_result` while the task is still running must keep returning
//! processing, and polling again after the body finishes must return the
//! tool's value.

use std::sync::Arc;
use std::time::Duration;

use refcache_domain::value_objects::{Actor, StructuredResponse};
use refcache_server::mcp::{get_cached_result, GetCachedResultParams};
use refcache_server::{CachedCallable, InvocationContext};
use serde_json::json;

use crate::support::store;

#[tokio::test]
async fn a_timed_out_call_is_pollable_to_completion() {
    let store = store();
    let body: refcache_server::ToolBody = Arc::new(|args, _progress, _cancellation| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok(args)
        })
    });

    let slow_tool =
        CachedCallable::new("slow_tool", store.clone(), body, "calc").with_async_timeout(Duration::from_millis(20));
    let actor = Actor::agent("bot");
    let context = InvocationContext::new();

    let first = slow_tool.invoke(json!({"n": 1}), &actor, &context, None, None, None, None).await.unwrap();
    assert!(!first.is_complete());
    let StructuredResponse::Processing { ref_id, status, .. } = &first else { panic!("expected processing") };
    assert_eq!(*status, "processing");

    let still_running = get_cached_result(
        &store,
        GetCachedResultParams {
            ref_id: ref_id.clone(),
            actor: Some("agent:bot".to_owned()),
            page: None,
            page_size: None,
            max_size: None,
        },
    )
    .await
    .unwrap();
    assert!(!still_running.is_complete(), "polling before the body finishes must still report processing");

    let completed = loop {
        let response = get_cached_result(
            &store,
            GetCachedResultParams {
                ref_id: ref_id.clone(),
                actor: Some("agent:bot".to_owned()),
                page: None,
                page_size: None,
                max_size: None,
            },
        )
        .await
        .unwrap();
        if response.is_complete() {
            break response;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    assert_eq!(completed.ref_id(), ref_id.as_str());
    match completed {
        StructuredResponse::Complete { value, .. } => assert_eq!(value, json!({"n": 1})),
        other => panic!("expected a complete response, got {other:?}"),
    }
}
