//! The cached-callable wrapper — turns an arbitrary async tool body into a
//! cache-aware, access-controlled, optionally-backgrounded invocation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use refcache_domain::canonical::canonical;
use refcache_domain::error::{Error, Result};
use refcache_domain::ports::task_backend::{ProgressSink, TaskFn};
use refcache_domain::value_objects::{
    AccessPolicy, Actor, AsyncResponseFormat, CancellationHandle, PermissionSet, ReferenceId, RetryPolicy,
    StructuredResponse, TaskProgress, TaskRecord,
};
use serde_json::Value;

use crate::reference_store::ReferenceStore;
use crate::resolver::resolve_deep;

/// The invocation-time context a tool body substitutes into its
/// `namespace_template`/`owner_template` (§4.11 step 1).
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    /// Values substituted for `{name}` placeholders in namespace/owner templates.
    pub variables: HashMap<String, String>,
    /// This invocation's session id, used when `session_scoped` is set.
    pub session_id: Option<String>,
}

impl InvocationContext {
    /// An empty context: no template variables, no session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a template variable.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Attach this invocation's session id.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    fn substitute(&self, template: &str) -> String {
        let mut out = template.to_owned();
        for (key, value) in &self.variables {
            out = out.replace(&format!("{{{key}}}"), value);
        }
        out
    }
}

/// A non-blocking handle a wrapped tool body uses to report progress, if
/// `progress_enabled` was set at decoration time (§4.11 step 7).
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
}

impl ProgressReporter {
    /// Report a progress update. Fire-and-forget.
    pub async fn report(&self, current: u64, total: Option<u64>, message: Option<String>) {
        self.sink.report(TaskProgress::new(current, total, message)).await;
    }
}

/// The async tool body a [`CachedCallable`] wraps: resolved arguments in,
/// a raw JSON result out. Takes an optional progress reporter and a
/// cooperative cancellation handle so a long-running body can honor both.
pub type ToolBody = Arc<
    dyn Fn(Value, Option<ProgressReporter>, CancellationHandle) -> refcache_domain::ports::task_backend::TaskFuture
        + Send
        + Sync,
>;

/// Builder and per-invocation driver for a cached, access-controlled tool.
///
/// Mirrors §4.11's decoration-time parameter list. Construct once per tool
/// (typically at server startup) and call [`CachedCallable::invoke`] per
/// request.
pub struct CachedCallable {
    tool_name: String,
    store: Arc<ReferenceStore>,
    body: ToolBody,
    namespace: String,
    namespace_template: Option<String>,
    owner_template: Option<String>,
    policy: Option<AccessPolicy>,
    ttl: Option<i64>,
    max_size: Option<u64>,
    resolve_refs: bool,
    session_scoped: bool,
    async_timeout: Option<Duration>,
    async_response_format: AsyncResponseFormat,
    retry_policy: RetryPolicy,
    progress_enabled: bool,
}

impl CachedCallable {
    /// Start building a cached callable named `tool_name`, backed by `store`,
    /// wrapping `body`, writing entries into `namespace` by default.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, store: Arc<ReferenceStore>, body: ToolBody, namespace: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            store,
            body,
            namespace: namespace.into(),
            namespace_template: None,
            owner_template: None,
            policy: None,
            ttl: None,
            max_size: None,
            resolve_refs: true,
            session_scoped: false,
            async_timeout: None,
            async_response_format: AsyncResponseFormat::Standard,
            retry_policy: RetryPolicy::none(),
            progress_enabled: false,
        }
    }

    /// Override the static namespace with a template formatted from the
    /// invocation's context (e.g. `"user:{user_id}:portfolios"`).
    #[must_use]
    pub fn with_namespace_template(mut self, template: impl Into<String>) -> Self {
        self.namespace_template = Some(template.into());
        self
    }

    /// A template resolved into each written entry's `owner` field.
    #[must_use]
    pub fn with_owner_template(mut self, template: impl Into<String>) -> Self {
        self.owner_template = Some(template.into());
        self
    }

    /// The access policy stamped onto entries this callable writes. Defaults
    /// to CRUD for users and agents, FULL for system, if unset.
    #[must_use]
    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// TTL (seconds) stamped onto entries this callable writes.
    #[must_use]
    pub fn with_ttl(mut self, ttl_seconds: i64) -> Self {
        self.ttl = Some(ttl_seconds);
        self
    }

    /// Per-tool `max_size` override, the middle level of §4.7's precedence
    /// chain (below a per-call override, above the store's cache-wide default).
    #[must_use]
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Disable deep reference resolution of arguments (default: enabled).
    #[must_use]
    pub fn without_resolve_refs(mut self) -> Self {
        self.resolve_refs = false;
        self
    }

    /// Require the bound session to match the invoking actor's session id.
    #[must_use]
    pub fn session_scoped(mut self) -> Self {
        self.session_scoped = true;
        self
    }

    /// Background any invocation that doesn't finish within `timeout`,
    /// returning a processing response instead of blocking further (§4.11
    /// step 5, §9 Open Question 2: accepted uniformly, sync or async tools).
    #[must_use]
    pub fn with_async_timeout(mut self, timeout: Duration) -> Self {
        self.async_timeout = Some(timeout);
        self
    }

    /// Detail level for processing responses produced by a timed-out invocation.
    #[must_use]
    pub fn with_async_response_format(mut self, format: AsyncResponseFormat) -> Self {
        self.async_response_format = format;
        self
    }

    /// Retry policy driving the background task backend's internal
    /// retry-with-backoff loop.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Inject a [`ProgressReporter`] into the tool body (§4.11 step 7).
    #[must_use]
    pub fn with_progress_enabled(mut self) -> Self {
        self.progress_enabled = true;
        self
    }

    /// This callable's registered tool name, used by the `retry_task`
    /// administrative tool (§6) to find the callable owning a failed task.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Resubmit `ref_id`'s background task after its backend-internal retry
    /// budget was exhausted. The `retry_task` administrative operation (§6).
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the task is not tracked, or is
    /// not currently in the `Failed` state.
    pub async fn retry(&self, ref_id: &ReferenceId) -> Result<TaskRecord> {
        use refcache_domain::value_objects::TaskStatus;

        match self.store.task_status(ref_id).await? {
            Some(record) if record.status == TaskStatus::Failed => {}
            Some(_) => {
                return Err(Error::InvalidArgument {
                    message: format!("task {ref_id} is not in a failed state"),
                })
            }
            None => {
                return Err(Error::InvalidArgument {
                    message: format!("task {ref_id} is not tracked"),
                })
            }
        }

        let Some((namespace, policy, ttl, metadata, args)) = self.store.task_commit_context(ref_id) else {
            return Err(Error::internal("failed task is missing its commit context"));
        };

        let func = self.task_fn(self.body.clone(), args.clone(), self.progress_enabled);
        self.store
            .submit_background(ref_id, &self.tool_name, &namespace, policy, ttl, metadata, args, self.retry_policy, func)
            .await
    }

    /// A description of this callable's cache behavior, for manual inclusion
    /// in the tool's `rmcp` description string (§4.11 step 9). `rmcp`'s
    /// `#[tool(description = ...)]` requires a literal at compile time, so
    /// dynamic per-instance decoration text cannot be injected automatically;
    /// callers splice this in when authoring the tool's description.
    #[must_use]
    pub fn describe(&self) -> String {
        let max_size = self
            .max_size
            .map_or_else(|| "server default".to_owned(), |size| size.to_string());
        format!(
            "Cached under namespace `{}` (max_size: {max_size}). Reference identifiers in arguments \
             are resolved automatically. Use `get_cached_result` to retrieve a full value or a later page.",
            self.namespace_template.as_deref().unwrap_or(&self.namespace)
        )
    }

    fn effective_namespace(&self, context: &InvocationContext) -> String {
        self.namespace_template
            .as_deref()
            .map_or_else(|| self.namespace.clone(), |template| context.substitute(template))
    }

    fn effective_policy(&self, context: &InvocationContext) -> AccessPolicy {
        let mut policy = self.policy.clone().unwrap_or_else(|| {
            AccessPolicy::with_role_defaults(PermissionSet::CRUD, PermissionSet::CRUD, PermissionSet::FULL)
        });
        if let Some(template) = &self.owner_template {
            policy.owner = Some(context.substitute(template));
        }
        if self.session_scoped {
            if let Some(session_id) = &context.session_id {
                policy = policy.with_bound_session(session_id.clone());
            }
        }
        policy
    }

    /// Adapt this callable's [`ToolBody`] (resolved args, an optional
    /// [`ProgressReporter`], a cancellation handle) into the [`TaskFn`] shape
    /// the task backend drives through its retry-with-backoff loop (§4.11
    /// point 6). Boxed as `Fn`, not `FnOnce`, so the backend can re-invoke it
    /// on each retry attempt against the same bound arguments.
    fn task_fn(&self, body: ToolBody, args: Value, progress_enabled: bool) -> TaskFn {
        Box::new(move |sink: Arc<dyn ProgressSink>, cancellation: CancellationHandle| {
            let body = body.clone();
            let args = args.clone();
            let reporter = progress_enabled.then(|| ProgressReporter { sink });
            Box::pin(async move { (body)(args, reporter, cancellation).await })
        })
    }

    /// Run one invocation: substitute context, resolve references, derive
    /// the cache key, check for a hit, execute (sync or backgrounded) on a
    /// miss, and build the response. Implements §4.11 steps 1–9.
    pub async fn invoke(
        &self,
        args: Value,
        actor: &Actor,
        context: &InvocationContext,
        page: Option<u32>,
        page_size: Option<u32>,
        max_size_override: Option<u64>,
        async_response_format_override: Option<AsyncResponseFormat>,
    ) -> Result<StructuredResponse> {
        let namespace = self.effective_namespace(context);
        let policy = self.effective_policy(context);
        let format = async_response_format_override.unwrap_or(self.async_response_format);

        // Step 2: deep resolution, using the trusted internal invocation path
        // so EXECUTE-only referenced arguments can still be read into the body.
        let resolved_args = if self.resolve_refs {
            let trusted = actor.clone().as_trusted_server_path();
            resolve_deep(&self.store, &args, &trusted).await?
        } else {
            args
        };

        // Step 3: cache key derivation.
        let cache_key = canonical(&serde_json::json!([self.tool_name, &resolved_args]));
        let ref_id = ReferenceId::mint(self.store.cache_name(), &namespace, &cache_key);

        // Step 4: cache lookup. `peek_entry` decides execute-vs-reuse without
        // ever surfacing a permission-denied as "not cached" — an actor
        // lacking READ on an existing entry must see the opaque denial, not
        // trigger a fresh (possibly side-effecting) execution.
        if self.store.peek_entry(&ref_id).await?.is_some() || self.store.task_status(&ref_id).await?.is_some() {
            return self.store.get(&ref_id, actor, page, page_size, max_size_override).await;
        }

        let max_size = max_size_override.or(self.max_size);

        match self.async_timeout {
            None => self.invoke_sync(&ref_id, resolved_args, &namespace, policy, actor, page, page_size, max_size).await,
            Some(timeout) => {
                self.invoke_background(&ref_id, resolved_args, &namespace, policy, actor, timeout, format, max_size)
                    .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn invoke_sync(
        &self,
        ref_id: &ReferenceId,
        args: Value,
        namespace: &str,
        policy: AccessPolicy,
        actor: &Actor,
        page: Option<u32>,
        page_size: Option<u32>,
        max_size: Option<u64>,
    ) -> Result<StructuredResponse> {
        let progress = None;
        let result = (self.body)(args, progress, CancellationHandle::new()).await?;

        self.store
            .set(
                &serde_json::json!(ref_id.as_str()),
                result,
                namespace,
                Some(policy),
                self.ttl,
                None,
                actor,
            )
            .await?;

        self.store.get(ref_id, actor, page, page_size, max_size).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn invoke_background(
        &self,
        ref_id: &ReferenceId,
        args: Value,
        namespace: &str,
        policy: AccessPolicy,
        actor: &Actor,
        timeout: Duration,
        format: AsyncResponseFormat,
        max_size: Option<u64>,
    ) -> Result<StructuredResponse> {
        let body = self.body.clone();
        let progress_enabled = self.progress_enabled;
        let func = self.task_fn(body, args.clone(), progress_enabled);

        let record = self
            .store
            .submit_background(
                ref_id,
                &self.tool_name,
                namespace,
                policy,
                self.ttl,
                HashMap::new(),
                args,
                self.retry_policy,
                func,
            )
            .await?;

        match tokio::time::timeout(timeout, Self::poll_until_terminal(&self.store, ref_id)).await {
            Ok(Ok(())) => self.store.get(ref_id, actor, None, None, max_size).await,
            Ok(Err(error)) => Err(error),
            Err(_elapsed) => Ok(Self::processing_response(ref_id, &record, format)),
        }
    }

    async fn poll_until_terminal(store: &ReferenceStore, ref_id: &ReferenceId) -> Result<()> {
        loop {
            match store.task_status(ref_id).await? {
                Some(record) if record.status.is_terminal() => {
                    return match record.status {
                        refcache_domain::value_objects::TaskStatus::Complete => Ok(()),
                        refcache_domain::value_objects::TaskStatus::Failed => {
                            Err(Error::TaskFailed { message: record.last_error.unwrap_or_default() })
                        }
                        refcache_domain::value_objects::TaskStatus::Cancelled => Err(Error::Cancelled),
                        _ => unreachable!("is_terminal() implies one of the three arms above"),
                    };
                }
                _ => tokio::time::sleep(Duration::from_millis(25)).await,
            }
        }
    }

    fn processing_response(
        ref_id: &ReferenceId,
        record: &refcache_domain::value_objects::TaskRecord,
        format: AsyncResponseFormat,
    ) -> StructuredResponse {
        let (retry_count, can_retry) = match format {
            AsyncResponseFormat::Minimal => (None, None),
            AsyncResponseFormat::Standard | AsyncResponseFormat::Full => {
                (Some(record.retry_count), Some(record.retry_count < record.max_retries))
            }
        };
        let progress = matches!(format, AsyncResponseFormat::Full).then(|| record.progress.clone()).flatten();

        StructuredResponse::Processing {
            ref_id: ref_id.to_string(),
            status: "processing",
            started_at: record.started_at,
            progress,
            eta_seconds: None,
            retry_count,
            can_retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use refcache_infrastructure::preview::DefaultPreviewGenerator;
    use refcache_infrastructure::size::ByteMeasurer;
    use refcache_infrastructure::storage::MemoryStorage;
    use refcache_infrastructure::task::WorkerPoolTaskBackend;
    use serde_json::json;

    use super::*;

    fn store() -> Arc<ReferenceStore> {
        ReferenceStore::builder("calc")
            .storage(Arc::new(MemoryStorage::new()))
            .task_backend(Arc::new(WorkerPoolTaskBackend::default()))
            .measurer(Arc::new(ByteMeasurer))
            .preview_generator(Arc::new(DefaultPreviewGenerator::default()))
            .build()
    }

    fn echo_body() -> ToolBody {
        Arc::new(|args, _progress, _cancellation| Box::pin(async move { Ok(args) }))
    }

    #[tokio::test]
    async fn identical_calls_are_idempotent_and_reuse_the_cache() {
        let store = store();
        let calls = Arc::new(AtomicU32::new(0));
        let counted_calls = calls.clone();
        let body: ToolBody = Arc::new(move |args, _progress, _cancellation| {
            counted_calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(args) })
        });

        let callable = CachedCallable::new("add", store, body, "public");
        let actor = Actor::agent("bot");
        let context = InvocationContext::new();

        let first = callable.invoke(json!({"a": 1, "b": 2}), &actor, &context, None, None, None, None).await.unwrap();
        let second = callable.invoke(json!({"a": 1, "b": 2}), &actor, &context, None, None, None, None).await.unwrap();

        assert_eq!(first.ref_id(), second.ref_id());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_arguments_yield_different_identifiers() {
        let store = store();
        let callable = CachedCallable::new("add", store, echo_body(), "public");
        let actor = Actor::agent("bot");
        let context = InvocationContext::new();

        let first = callable.invoke(json!({"a": 1}), &actor, &context, None, None, None, None).await.unwrap();
        let second = callable.invoke(json!({"a": 2}), &actor, &context, None, None, None, None).await.unwrap();
        assert_ne!(first.ref_id(), second.ref_id());
    }

    #[tokio::test]
    async fn a_denied_actor_never_forces_re_execution() {
        let store = store();
        let calls = Arc::new(AtomicU32::new(0));
        let counted_calls = calls.clone();
        let body: ToolBody = Arc::new(move |args, _progress, _cancellation| {
            counted_calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(args) })
        });

        let owner = Actor::user("alice");
        let policy = AccessPolicy::owner_only("user:alice", PermissionSet::FULL);
        let callable = CachedCallable::new("portfolio", store, body, "public").with_policy(policy);

        let context = InvocationContext::new();
        callable.invoke(json!({"id": 1}), &owner, &context, None, None, None, None).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let bob = Actor::user("bob");
        let denied = callable.invoke(json!({"id": 1}), &bob, &context, None, None, None, None).await;
        assert!(matches!(denied, Err(Error::OpaqueReference { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_tool_with_a_timeout_returns_a_processing_response() {
        let store = store();
        let body: ToolBody = Arc::new(|args, _progress, _cancellation| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(args)
            })
        });
        let callable = CachedCallable::new("slow", store, body, "public").with_async_timeout(Duration::from_millis(20));

        let actor = Actor::agent("bot");
        let context = InvocationContext::new();
        let response = callable.invoke(json!({"n": 1}), &actor, &context, None, None, None, None).await.unwrap();
        assert!(!response.is_complete());
    }

    #[tokio::test]
    async fn retry_task_resubmits_a_failed_background_task() {
        let store = store();
        let attempts = Arc::new(AtomicU32::new(0));
        let captured = attempts.clone();
        let body: ToolBody = Arc::new(move |args, _progress, _cancellation| {
            let attempts = captured.clone();
            Box::pin(async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::internal("first attempt fails"))
                } else {
                    Ok(args)
                }
            })
        });

        let callable =
            CachedCallable::new("flaky", store.clone(), body, "public").with_async_timeout(Duration::from_millis(200));
        let actor = Actor::agent("bot");
        let context = InvocationContext::new();

        let first = callable.invoke(json!({"n": 1}), &actor, &context, None, None, None, None).await;
        assert!(matches!(first, Err(Error::TaskFailed { .. })));

        let args = json!({"n": 1});
        let cache_key = canonical(&json!(["flaky", &args]));
        let ref_id = ReferenceId::mint(store.cache_name(), "public", &cache_key);

        let record = callable.retry(&ref_id).await.unwrap();
        assert_eq!(record.status, refcache_domain::value_objects::TaskStatus::Pending);

        for _ in 0..100 {
            if let Ok(response) = callable.store.get(&ref_id, &actor, None, None, None).await {
                assert!(response.is_complete());
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("retried task never completed");
    }

    #[tokio::test]
    async fn retry_task_rejects_a_task_that_is_not_failed() {
        let store = store();
        let callable = CachedCallable::new("add", store, echo_body(), "public");
        let actor = Actor::agent("bot");
        let context = InvocationContext::new();
        callable.invoke(json!({"a": 1}), &actor, &context, None, None, None, None).await.unwrap();

        let cache_key = canonical(&json!(["add", &json!({"a": 1})]));
        let ref_id = ReferenceId::mint(callable.store.cache_name(), "public", &cache_key);
        assert!(matches!(callable.retry(&ref_id).await, Err(Error::InvalidArgument { .. })));
    }
}
