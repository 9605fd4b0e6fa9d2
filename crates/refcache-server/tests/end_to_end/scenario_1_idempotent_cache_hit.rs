//! Scenario 1 (§8): idempotent cache hit via a resolved reference.
//!
//! `matrix_op` invoked with a literal matrix and, separately, with a stored
//! reference that resolves to the identical matrix must mint the same
//! reference identifier and must not re-run the tool body the second time.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use refcache_domain::value_objects::Actor;
use refcache_server::{CachedCallable, InvocationContext};
use serde_json::{json, Value};

use crate::support::{open_policy, store};

fn transpose(matrix: &Value) -> Value {
    let Value::Array(rows) = matrix else { panic!("expected a matrix") };
    let rows: Vec<Vec<Value>> = rows
        .iter()
        .map(|row| match row {
            Value::Array(cells) => cells.clone(),
            _ => panic!("expected a row"),
        })
        .collect();
    let num_cols = rows.first().map_or(0, Vec::len);
    let transposed: Vec<Value> = (0..num_cols)
        .map(|col| Value::Array(rows.iter().map(|row| row[col].clone()).collect()))
        .collect();
    Value::Array(transposed)
}

#[tokio::test]
async fn matrix_op_reuses_the_cache_for_an_equivalent_resolved_argument() {
    let store = store();
    let calls = Arc::new(AtomicU32::new(0));
    let counted = calls.clone();
    let body: refcache_server::ToolBody = Arc::new(move |args, _progress, _cancellation| {
        counted.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(transpose(&args)) })
    });

    let matrix_op = CachedCallable::new("matrix_op", store.clone(), body, "calc");
    let actor = Actor::agent("bot");
    let context = InvocationContext::new();

    let literal = matrix_op.invoke(json!([[1, 3], [2, 4]]), &actor, &context, None, None, None, None).await.unwrap();
    assert!(literal.is_complete());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let input_ref = store
        .set(&json!("inputA"), json!([[1, 3], [2, 4]]), "calc", Some(open_policy()), None, None, &Actor::system())
        .await
        .unwrap();

    let via_reference =
        matrix_op.invoke(json!(input_ref.as_str()), &actor, &context, None, None, None, None).await.unwrap();

    assert_eq!(literal.ref_id(), via_reference.ref_id());
    assert_eq!(calls.load(Ordering::SeqCst), 1, "the second call must reuse the cached result, not re-run the body");

    let response = store.get(
        &refcache_domain::value_objects::ReferenceId::parse(literal.ref_id().to_owned()).unwrap(),
        &actor,
        None,
        None,
        None,
    )
    .await
    .unwrap();
    match response {
        refcache_domain::value_objects::StructuredResponse::Complete { value, .. } => {
            assert_eq!(value, json!([[1, 2], [3, 4]]));
        }
        other => panic!("expected a complete response, got {other:?}"),
    }
}
