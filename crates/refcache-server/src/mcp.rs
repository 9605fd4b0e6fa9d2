//! The `rmcp` tool surface: the polling operation every hosting server must
//! expose (§6 `get_cached_result`) plus the optional administrative tools
//! (`list_cached_keys`, `cache_stats`, `clear_cache`, `cancel_task`,
//! `retry_task`).
//!
//! Each operation is a plain, independently callable async function taking
//! an already-resolved [`Actor`] — a hosting server wires its own identity
//! transport (session auth, a signed header, ...) and constructs the actor
//! before calling in; that binding is explicitly out of this library's scope
//! (§1 "transport protocols"). [`RefcacheTools`] packages the functions below
//! as a standalone `rmcp` server for the common case of exposing just the
//! cache's own surface; a server that also exposes domain-specific cached
//! tools typically calls the functions directly from its own
//! `#[tool_router]` impl instead (see `refcache`'s demo binary).

use std::sync::Arc;

use refcache_domain::value_objects::{Actor, Role, TaskRecord, TaskStats};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::tool::ToolCallContext;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult, PaginatedRequestParams,
    ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{tool, tool_router, RoleServer, ServerHandler};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::reference_store::ReferenceStore;
use crate::wrapper::CachedCallable;

/// Parses the `actor` parameter every tool in this module accepts.
///
/// Accepted forms: `"user"`, `"agent"`, `"system"` (anonymous actor of that
/// role), or `"role:principal"` / `"role:principal:session"` for an
/// identified one. Defaults to an anonymous agent actor when omitted —
/// the permissive default a tool-calling LLM is most likely to present as.
#[must_use]
pub fn parse_actor(raw: Option<&str>) -> Actor {
    let Some(raw) = raw else {
        return Actor::anonymous_agent();
    };
    let mut parts = raw.splitn(3, ':');
    let role = parts.next().unwrap_or("agent");
    let principal = parts.next();
    let session = parts.next();

    let mut actor = match (role, principal) {
        ("system", _) => Actor::system(),
        ("user", Some(principal)) if !principal.is_empty() => Actor::user(principal),
        ("user", _) => Actor::anonymous_user(),
        ("agent", Some(principal)) if !principal.is_empty() => Actor::agent(principal),
        _ => Actor::anonymous_agent(),
    };
    if let Some(session) = session {
        actor = actor.with_session(session.to_owned());
    }
    actor
}

fn require_administrative(actor: &Actor) -> refcache_domain::error::Result<()> {
    if matches!(actor.role, Role::User | Role::System) {
        return Ok(());
    }
    Err(refcache_domain::error::Error::InvalidArgument {
        message: "this operation requires a USER role or SYSTEM actor".to_owned(),
    })
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetCachedResultParams {
    /// The reference identifier returned by a prior cached tool call.
    pub ref_id: String,
    /// Caller identity (`role`, `role:principal`, or `role:principal:session`).
    pub actor: Option<String>,
    /// Which page of a paginated preview to return.
    pub page: Option<u32>,
    /// Fixed item count per page, overriding the size-driven default.
    pub page_size: Option<u32>,
    /// Override `max_size` for this call only (§4.7, highest precedence).
    pub max_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema, Default)]
pub struct NamespaceParams {
    /// Restrict to entries under this namespace; omit for all namespaces.
    pub namespace: Option<String>,
    /// Caller identity (`role`, `role:principal`, or `role:principal:session`).
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema, Default)]
pub struct ActorOnlyParams {
    /// Caller identity (`role`, `role:principal`, or `role:principal:session`).
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RefIdParams {
    /// The reference identifier to act on.
    pub ref_id: String,
    /// Caller identity (`role`, `role:principal`, or `role:principal:session`).
    pub actor: Option<String>,
}

/// Combined cache statistics: the tracked-task breakdown plus the entry
/// count, for actors with SYSTEM-level visibility into the store.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Number of live entries in storage (namespace-filtered, if requested).
    pub entry_count: u64,
    /// Breakdown of tracked background tasks by lifecycle state.
    pub tasks: TaskStats,
}

/// §6 `get_cached_result`: the polling operation every hosting server must
/// expose. Semantics are exactly [`ReferenceStore::get`]'s, including the
/// opaque-error collapse of not-found/denied (§7); when `ref_id` names an
/// active background task the response carries task status instead of data.
pub async fn get_cached_result(
    store: &ReferenceStore,
    params: GetCachedResultParams,
) -> refcache_domain::error::Result<refcache_domain::value_objects::StructuredResponse> {
    let actor = parse_actor(params.actor.as_deref());
    let ref_id = refcache_domain::value_objects::ReferenceId::parse(params.ref_id)?;
    store.get(&ref_id, &actor, params.page, params.page_size, params.max_size).await
}

/// `list_cached_keys(namespace?)` — restricted to SYSTEM actors by
/// [`ReferenceStore::list_keys`] (there is no single entry's policy to check
/// a namespace-wide listing against).
pub async fn list_cached_keys(store: &ReferenceStore, params: NamespaceParams) -> refcache_domain::error::Result<Vec<String>> {
    let actor = parse_actor(params.actor.as_deref());
    store.list_keys(params.namespace.as_deref(), &actor).await
}

/// `cache_stats()` — requires a USER role or SYSTEM actor (§6).
pub async fn cache_stats(store: &ReferenceStore, params: ActorOnlyParams) -> refcache_domain::error::Result<CacheStats> {
    let actor = parse_actor(params.actor.as_deref());
    require_administrative(&actor)?;
    let entry_count = store.list_keys(None, &Actor::system()).await?.len() as u64;
    let tasks = store.task_stats().await?;
    Ok(CacheStats { entry_count, tasks })
}

/// `clear_cache(namespace?)` — restricted to SYSTEM actors by
/// [`ReferenceStore::clear`]. Returns the number of entries removed.
pub async fn clear_cache(store: &ReferenceStore, params: NamespaceParams) -> refcache_domain::error::Result<u64> {
    let actor = parse_actor(params.actor.as_deref());
    store.clear(params.namespace.as_deref(), &actor).await
}

/// `cancel_task(ref_id)` — requires a USER role or SYSTEM actor (§6).
/// Idempotent: a second call against an already-terminal task returns
/// `false` per §4.10.
pub async fn cancel_task(store: &ReferenceStore, params: RefIdParams) -> refcache_domain::error::Result<bool> {
    let actor = parse_actor(params.actor.as_deref());
    require_administrative(&actor)?;
    let ref_id = refcache_domain::value_objects::ReferenceId::parse(params.ref_id)?;
    store.cancel_task(&ref_id).await
}

/// `retry_task(ref_id)` — requires a USER role or SYSTEM actor (§6).
/// Looks up which [`CachedCallable`] owns the failed task via
/// [`ReferenceStore::task_tool_name`], then delegates to its
/// [`CachedCallable::retry`].
///
/// # Errors
/// Returns [`refcache_domain::error::Error::InvalidArgument`] if `ref_id`
/// is not tracked, is not in the `Failed` state, or names a tool not present
/// in `callables`.
pub async fn retry_task(
    store: &ReferenceStore,
    callables: &[Arc<CachedCallable>],
    params: RefIdParams,
) -> refcache_domain::error::Result<TaskRecord> {
    let actor = parse_actor(params.actor.as_deref());
    require_administrative(&actor)?;
    let ref_id = refcache_domain::value_objects::ReferenceId::parse(params.ref_id)?;

    let Some(tool_name) = store.task_tool_name(&ref_id) else {
        return Err(refcache_domain::error::Error::InvalidArgument {
            message: format!("task {ref_id} is not tracked"),
        });
    };
    let Some(callable) = callables.iter().find(|c| c.tool_name() == tool_name) else {
        return Err(refcache_domain::error::Error::InvalidArgument {
            message: format!("no registered callable owns tool `{tool_name}`"),
        });
    };
    callable.retry(&ref_id).await
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, rmcp::ErrorData> {
    let text = serde_json::to_string(value).map_err(|error| rmcp::ErrorData::internal_error(error.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

/// Maps a domain error to the MCP tool-call result channel: opaque and
/// invalid-argument errors are client-fixable (the LLM can adapt and retry),
/// everything else is a server fault reported on the protocol error channel.
fn tool_result<T: Serialize>(result: refcache_domain::error::Result<T>) -> Result<CallToolResult, rmcp::ErrorData> {
    match result {
        Ok(value) => json_result(&value),
        Err(error @ (refcache_domain::error::Error::OpaqueReference { .. }
        | refcache_domain::error::Error::InvalidArgument { .. }
        | refcache_domain::error::Error::CircularReference { .. }
        | refcache_domain::error::Error::TaskFailed { .. }
        | refcache_domain::error::Error::Cancelled)) => Ok(CallToolResult::error(vec![Content::text(error.to_string())])),
        Err(other) => Err(rmcp::ErrorData::internal_error(other.to_string(), None)),
    }
}

/// A standalone `rmcp` server exposing just the cache's polling and
/// administrative surface — `get_cached_result` plus the five tools of §6.
/// A server that also serves its own domain-specific cached tools usually
/// calls this module's plain functions directly from its own
/// `#[tool_router]` instead of running two servers side by side.
#[derive(Clone)]
pub struct RefcacheTools {
    store: Arc<ReferenceStore>,
    callables: Vec<Arc<CachedCallable>>,
    tool_router: ToolRouter<Self>,
}

impl RefcacheTools {
    /// Build the admin/polling tool surface over `store`. `callables` is the
    /// set of cached tools `retry_task` may resubmit against — pass every
    /// [`CachedCallable`] the hosting process registers.
    #[must_use]
    pub fn new(store: Arc<ReferenceStore>, callables: Vec<Arc<CachedCallable>>) -> Self {
        Self {
            store,
            callables,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl RefcacheTools {
    #[tool(
        description = "Poll or fetch a cached reference. If the reference names an active \
                       background task, returns its status instead of data; once terminal, \
                       returns the cached value (whole, or a size-bounded preview).",
        annotations(title = "Get Cached Result", read_only_hint = true, destructive_hint = false, idempotent_hint = true, open_world_hint = false)
    )]
    async fn get_cached_result(
        &self,
        Parameters(params): Parameters<GetCachedResultParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        tool_result(get_cached_result(&self.store, params).await)
    }

    #[tool(
        description = "List cached keys, optionally filtered by namespace. Requires a SYSTEM actor.",
        annotations(title = "List Cached Keys", read_only_hint = true, destructive_hint = false, idempotent_hint = true, open_world_hint = false)
    )]
    async fn list_cached_keys(
        &self,
        Parameters(params): Parameters<NamespaceParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        tool_result(list_cached_keys(&self.store, params).await)
    }

    #[tool(
        description = "Aggregate cache statistics: live entry count and a breakdown of \
                       background tasks by status. Requires a USER role or SYSTEM actor.",
        annotations(title = "Cache Stats", read_only_hint = true, destructive_hint = false, idempotent_hint = true, open_world_hint = false)
    )]
    async fn cache_stats(&self, Parameters(params): Parameters<ActorOnlyParams>) -> Result<CallToolResult, rmcp::ErrorData> {
        tool_result(cache_stats(&self.store, params).await)
    }

    #[tool(
        description = "Remove all entries, optionally scoped to a namespace. Requires a SYSTEM \
                       actor. Returns the number of entries removed.",
        annotations(title = "Clear Cache", read_only_hint = false, destructive_hint = true, idempotent_hint = false, open_world_hint = false)
    )]
    async fn clear_cache(&self, Parameters(params): Parameters<NamespaceParams>) -> Result<CallToolResult, rmcp::ErrorData> {
        tool_result(clear_cache(&self.store, params).await)
    }

    #[tool(
        description = "Request cancellation of a background task. Idempotent — a second call \
                       against an already-terminal task returns false. Requires a USER role or \
                       SYSTEM actor.",
        annotations(title = "Cancel Task", read_only_hint = false, destructive_hint = true, idempotent_hint = true, open_world_hint = false)
    )]
    async fn cancel_task(&self, Parameters(params): Parameters<RefIdParams>) -> Result<CallToolResult, rmcp::ErrorData> {
        tool_result(cancel_task(&self.store, params).await)
    }

    #[tool(
        description = "Resubmit a background task whose retry budget was exhausted, against \
                       the same cached tool and arguments it originally ran with. Requires a \
                       USER role or SYSTEM actor.",
        annotations(title = "Retry Task", read_only_hint = false, destructive_hint = false, idempotent_hint = false, open_world_hint = false)
    )]
    async fn retry_task(&self, Parameters(params): Parameters<RefIdParams>) -> Result<CallToolResult, rmcp::ErrorData> {
        tool_result(retry_task(&self.store, &self.callables, params).await)
    }
}

impl ServerHandler for RefcacheTools {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            server_info: Implementation {
                name: "mcp-refcache".to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                ..Default::default()
            },
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Reference-cache administration and polling tools. Pass `ref_id`s returned by \
                 cached tool calls to `get_cached_result` to fetch full values or later pages; \
                 the remaining tools are administrative and require an elevated `actor`."
                    .to_owned(),
            ),
        }
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let tcc = ToolCallContext::new(self, request, context);
        self.tool_router.call(tcc).await
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::ErrorData> {
        Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        })
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tool_router.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use refcache_domain::value_objects::{AccessPolicy, PermissionSet};
    use refcache_infrastructure::preview::DefaultPreviewGenerator;
    use refcache_infrastructure::size::ByteMeasurer;
    use refcache_infrastructure::storage::MemoryStorage;
    use refcache_infrastructure::task::WorkerPoolTaskBackend;
    use serde_json::json as jsonv;

    use super::*;
    use crate::reference_store::ReferenceStoreBuilder;
    use crate::wrapper::InvocationContext;

    fn store() -> Arc<ReferenceStore> {
        ReferenceStoreBuilder::new("calc")
            .storage(Arc::new(MemoryStorage::new()))
            .task_backend(Arc::new(WorkerPoolTaskBackend::default()))
            .measurer(Arc::new(ByteMeasurer))
            .preview_generator(Arc::new(DefaultPreviewGenerator::default()))
            .build()
    }

    #[test]
    fn parses_bare_role_literals() {
        assert_eq!(parse_actor(Some("system")).role, Role::System);
        assert_eq!(parse_actor(Some("user")).role, Role::User);
        assert_eq!(parse_actor(None).role, Role::Agent);
    }

    #[test]
    fn parses_role_principal_and_session() {
        let actor = parse_actor(Some("user:alice:sess-1"));
        assert_eq!(actor.role, Role::User);
        assert_eq!(actor.principal.as_deref(), Some("alice"));
        assert_eq!(actor.session_id.as_deref(), Some("sess-1"));
    }

    #[tokio::test]
    async fn get_cached_result_returns_the_stored_value() {
        let store = store();
        let owner = Actor::system();
        let policy = AccessPolicy::with_role_defaults(PermissionSet::FULL, PermissionSet::FULL, PermissionSet::FULL);
        let ref_id = store
            .set(&jsonv!("k"), jsonv!({"a": 1}), "public", Some(policy), None, None, &owner)
            .await
            .unwrap();

        let response = get_cached_result(
            &store,
            GetCachedResultParams {
                ref_id: ref_id.to_string(),
                actor: Some("system".to_owned()),
                page: None,
                page_size: None,
                max_size: None,
            },
        )
        .await
        .unwrap();
        assert!(response.is_complete());
    }

    #[tokio::test]
    async fn list_cached_keys_rejects_a_non_system_actor() {
        let store = store();
        let denied = list_cached_keys(
            &store,
            NamespaceParams {
                namespace: None,
                actor: Some("agent:bot".to_owned()),
            },
        )
        .await;
        assert!(matches!(denied, Err(refcache_domain::error::Error::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn cache_stats_rejects_a_bare_agent_actor() {
        let store = store();
        let denied = cache_stats(&store, ActorOnlyParams { actor: Some("agent:bot".to_owned()) }).await;
        assert!(matches!(denied, Err(refcache_domain::error::Error::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn cache_stats_reports_entry_and_task_counts() {
        let store = store();
        let policy = AccessPolicy::with_role_defaults(PermissionSet::FULL, PermissionSet::FULL, PermissionSet::FULL);
        store.set(&jsonv!("k"), jsonv!(1), "public", Some(policy), None, None, &Actor::system()).await.unwrap();

        let stats = cache_stats(&store, ActorOnlyParams { actor: Some("system".to_owned()) }).await.unwrap();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.tasks.pending, 0);
    }

    #[tokio::test]
    async fn clear_cache_removes_entries() {
        let store = store();
        let policy = AccessPolicy::with_role_defaults(PermissionSet::FULL, PermissionSet::FULL, PermissionSet::FULL);
        store.set(&jsonv!("k"), jsonv!(1), "public", Some(policy), None, None, &Actor::system()).await.unwrap();

        let removed =
            clear_cache(&store, NamespaceParams { namespace: None, actor: Some("system".to_owned()) }).await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn retry_task_finds_the_owning_callable_and_resubmits() {
        let store = store();
        let attempts = Arc::new(AtomicU32::new(0));
        let captured = attempts.clone();
        let body: crate::wrapper::ToolBody = Arc::new(move |args, _progress, _cancellation| {
            let attempts = captured.clone();
            Box::pin(async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(refcache_domain::error::Error::internal("first attempt fails"))
                } else {
                    Ok(args)
                }
            })
        });
        let callable = Arc::new(
            CachedCallable::new("flaky", store.clone(), body, "public")
                .with_async_timeout(std::time::Duration::from_millis(200)),
        );

        let actor = Actor::agent("bot");
        let context = InvocationContext::new();
        let first = callable.invoke(jsonv!({"n": 1}), &actor, &context, None, None, None, None).await;
        assert!(first.is_err());

        let args = jsonv!({"n": 1});
        let cache_key = refcache_domain::canonical::canonical(&jsonv!(["flaky", &args]));
        let ref_id = refcache_domain::value_objects::ReferenceId::mint(store.cache_name(), "public", &cache_key);

        let record = retry_task(
            &store,
            std::slice::from_ref(&callable),
            RefIdParams { ref_id: ref_id.to_string(), actor: Some("system".to_owned()) },
        )
        .await
        .unwrap();
        assert_eq!(record.status, refcache_domain::value_objects::TaskStatus::Pending);
    }

    #[tokio::test]
    async fn retry_task_rejects_an_untracked_reference() {
        let store = store();
        let denied = retry_task(
            &store,
            &[],
            RefIdParams { ref_id: "calc:00000000000000000000000000000000".to_owned(), actor: Some("system".to_owned()) },
        )
        .await;
        assert!(matches!(denied, Err(refcache_domain::error::Error::InvalidArgument { .. })));
    }
}
