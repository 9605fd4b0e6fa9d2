//! Scenario 2 (§8): preview for a large list, with per-call overrides.
//!
//! `generate_fibonacci(100)` is decorated with a tool-level `max_size` of 64
//! bytes. The first call returns a small sample preview; a subsequent
//! `get_cached_result` with a larger `max_size` returns more items from the
//! *same* identifier; and a call with an explicit `page`/`page_size` returns
//! a fixed-size page covering items 11-20.

use std::sync::Arc;

use refcache_domain::value_objects::{Actor, StructuredResponse};
use refcache_server::mcp::{get_cached_result, GetCachedResultParams};
use refcache_server::{CachedCallable, InvocationContext};
use serde_json::{json, Value};

use crate::support::store;

fn fibonacci_sequence(n: usize) -> Vec<u64> {
    let mut seq = Vec::with_capacity(n);
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        seq.push(a);
        let next = a.wrapping_add(b);
        a = b;
        b = next;
    }
    seq
}

fn as_preview_items(response: &StructuredResponse) -> Vec<Value> {
    match response {
        StructuredResponse::Preview { preview: Value::Array(items), .. } => items.clone(),
        other => panic!("expected a preview response, got {other:?}"),
    }
}

#[tokio::test]
async fn per_call_overrides_widen_and_page_the_same_identifier() {
    let store = store();
    let body: refcache_server::ToolBody = Arc::new(|args, _progress, _cancellation| {
        Box::pin(async move {
            let n = args.as_u64().expect("n") as usize;
            Ok(json!(fibonacci_sequence(n)))
        })
    });

    let callable = CachedCallable::new("generate_fibonacci", store.clone(), body, "calc").with_max_size(64);
    let actor = Actor::agent("bot");
    let context = InvocationContext::new();

    let first = callable.invoke(json!(100), &actor, &context, None, None, None, None).await.unwrap();
    assert!(!first.is_complete());
    let StructuredResponse::Preview { total_items, .. } = &first else { panic!("expected a preview") };
    assert_eq!(*total_items, 100);
    let narrow_items = as_preview_items(&first);
    assert!(narrow_items.len() < 100);

    let widened = get_cached_result(
        &store,
        GetCachedResultParams {
            ref_id: first.ref_id().to_owned(),
            actor: Some("agent:bot".to_owned()),
            page: None,
            page_size: None,
            max_size: Some(200),
        },
    )
    .await
    .unwrap();
    let wide_items = as_preview_items(&widened);
    assert!(
        wide_items.len() > narrow_items.len(),
        "a larger max_size override must yield at least as many sampled items"
    );

    let paged = get_cached_result(
        &store,
        GetCachedResultParams {
            ref_id: first.ref_id().to_owned(),
            actor: Some("agent:bot".to_owned()),
            page: Some(2),
            page_size: Some(10),
            max_size: None,
        },
    )
    .await
    .unwrap();
    let StructuredResponse::Preview { page, total_pages, .. } = &paged else { panic!("expected a preview") };
    assert_eq!(*page, Some(2));
    assert_eq!(*total_pages, Some(10));

    let full = fibonacci_sequence(100);
    let expected: Vec<Value> = full[10..20].iter().map(|n| json!(n)).collect();
    assert_eq!(as_preview_items(&paged), expected);
}
