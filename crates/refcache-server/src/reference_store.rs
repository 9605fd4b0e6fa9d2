//! Reference store — the cache itself: namespacing, TTL, reference-identifier
//! minting, cache-hit logic, and the task registry's commit bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use refcache_domain::canonical::canonical;
use refcache_domain::error::{Error, Result};
use refcache_domain::ports::{PreviewGenerator, SizeMeasurer, StorageBackend, TaskBackend};
use refcache_domain::value_objects::namespace::parse as parse_namespace;
use refcache_domain::value_objects::{
    AccessPolicy, Actor, Entry, PermissionSet, ReferenceId, RetryPolicy, StructuredResponse, TaskRecord, TaskStats,
};
use refcache_domain::ports::task_backend::TaskFn;

/// The namespace/policy/TTL/metadata context a background task needs once it
/// completes, so its result can be committed to storage under the identifier
/// that was handed out at submission time. Keyed by `ref_id` (task id and
/// reference identifier are the same string by construction, see
/// [`ReferenceStore::submit_background`]).
#[derive(Debug, Clone)]
struct TaskCommitContext {
    namespace: String,
    policy: AccessPolicy,
    ttl: Option<i64>,
    metadata: HashMap<String, String>,
    /// The arguments this task was invoked with, kept so `retry_task` can
    /// resubmit the same body against the same inputs after the backend's
    /// own retry budget is exhausted.
    args: serde_json::Value,
    /// The `CachedCallable` tool name this task was submitted under, so the
    /// `retry_task` administrative tool can find the callable that owns the
    /// task body to resubmit it with.
    tool_name: String,
}

/// Builder for [`ReferenceStore`], mirroring the adapters' constructor-
/// injection style: every port is supplied explicitly, never looked up from a
/// registry.
pub struct ReferenceStoreBuilder {
    cache_name: String,
    storage: Option<Arc<dyn StorageBackend>>,
    task_backend: Option<Arc<dyn TaskBackend>>,
    measurer: Option<Arc<dyn SizeMeasurer>>,
    preview_generator: Option<Arc<dyn PreviewGenerator>>,
    default_max_size: u64,
    task_retention_seconds: i64,
    cleanup_interval_seconds: u64,
}

impl ReferenceStoreBuilder {
    /// Start a builder for a cache named `cache_name` (embedded in every
    /// minted reference identifier).
    #[must_use]
    pub fn new(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            storage: None,
            task_backend: None,
            measurer: None,
            preview_generator: None,
            default_max_size: 2048,
            task_retention_seconds: 300,
            cleanup_interval_seconds: 60,
        }
    }

    /// Set the storage backend.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the task backend.
    #[must_use]
    pub fn task_backend(mut self, task_backend: Arc<dyn TaskBackend>) -> Self {
        self.task_backend = Some(task_backend);
        self
    }

    /// Set the size measurer.
    #[must_use]
    pub fn measurer(mut self, measurer: Arc<dyn SizeMeasurer>) -> Self {
        self.measurer = Some(measurer);
        self
    }

    /// Set the preview generator.
    #[must_use]
    pub fn preview_generator(mut self, preview_generator: Arc<dyn PreviewGenerator>) -> Self {
        self.preview_generator = Some(preview_generator);
        self
    }

    /// Cache-wide default `max_size`, the lowest-precedence level of §4.7's
    /// three-level override chain.
    #[must_use]
    pub fn default_max_size(mut self, default_max_size: u64) -> Self {
        self.default_max_size = default_max_size;
        self
    }

    /// How long terminal task records are retained before cleanup.
    #[must_use]
    pub fn task_retention_seconds(mut self, seconds: i64) -> Self {
        self.task_retention_seconds = seconds;
        self
    }

    /// How often the cleanup loop runs.
    #[must_use]
    pub fn cleanup_interval_seconds(mut self, seconds: u64) -> Self {
        self.cleanup_interval_seconds = seconds;
        self
    }

    /// Build the store and spawn its periodic cleanup loop.
    ///
    /// # Panics
    /// Panics if `storage`, `task_backend`, `measurer`, or `preview_generator`
    /// were never set.
    #[must_use]
    pub fn build(self) -> Arc<ReferenceStore> {
        let store = Arc::new(ReferenceStore {
            cache_name: self.cache_name,
            storage: self.storage.expect("ReferenceStoreBuilder: storage is required"),
            task_backend: self.task_backend.expect("ReferenceStoreBuilder: task_backend is required"),
            measurer: self.measurer.expect("ReferenceStoreBuilder: measurer is required"),
            preview_generator: self
                .preview_generator
                .expect("ReferenceStoreBuilder: preview_generator is required"),
            default_max_size: self.default_max_size,
            task_retention_seconds: self.task_retention_seconds,
            cleanup_interval_seconds: self.cleanup_interval_seconds,
            active_tasks: Mutex::new(HashMap::new()),
        });
        store.clone().spawn_cleanup_loop();
        store
    }
}

/// The library's central coordinator: storage + access control + preview +
/// task tracking (§9 "Global mutable state" — one instance per logical cache,
/// never a process-wide singleton).
#[derive(Debug)]
pub struct ReferenceStore {
    cache_name: String,
    storage: Arc<dyn StorageBackend>,
    task_backend: Arc<dyn TaskBackend>,
    measurer: Arc<dyn SizeMeasurer>,
    preview_generator: Arc<dyn PreviewGenerator>,
    default_max_size: u64,
    task_retention_seconds: i64,
    cleanup_interval_seconds: u64,
    active_tasks: Mutex<HashMap<String, TaskCommitContext>>,
}

impl ReferenceStore {
    /// Start building a store for `cache_name`.
    #[must_use]
    pub fn builder(cache_name: impl Into<String>) -> ReferenceStoreBuilder {
        ReferenceStoreBuilder::new(cache_name)
    }

    /// The cache name embedded in every identifier this store mints.
    #[must_use]
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// The cache-wide default `max_size`, §4.7's lowest-precedence level.
    #[must_use]
    pub fn default_max_size(&self) -> u64 {
        self.default_max_size
    }

    /// Borrow the configured size measurer (used by the wrapper to measure a
    /// freshly produced tool result before deciding complete-vs-preview).
    #[must_use]
    pub fn measurer(&self) -> &Arc<dyn SizeMeasurer> {
        &self.measurer
    }

    fn spawn_cleanup_loop(self: Arc<Self>) {
        let interval = Duration::from_secs(self.cleanup_interval_seconds.max(1));
        let retention = self.task_retention_seconds;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.task_backend.cleanup(retention).await {
                    Ok(removed) if removed > 0 => {
                        tracing::debug!(removed, "cleaned up terminal task records");
                    }
                    Ok(_) => {}
                    Err(error) => tracing::warn!(%error, "task backend cleanup failed"),
                }
                self.prune_active_tasks().await;
            }
        });
    }

    /// Drop every `active_tasks` entry whose task the backend no longer
    /// tracks, or that reached `Complete`/`Cancelled`. `Failed` entries are
    /// kept regardless of how long ago they failed: `task_commit_context`/
    /// `task_tool_name` need them alive for [`CachedCallable::retry`] and the
    /// `retry_task` admin tool to resubmit. This is a backstop sweep; the
    /// common path prunes reactively in `materialize_task_result` and
    /// `poll_active_task` as soon as a task is seen to be Complete/Cancelled.
    async fn prune_active_tasks(&self) {
        use refcache_domain::value_objects::TaskStatus;
        let ref_ids: Vec<String> = self.active_tasks.lock().keys().cloned().collect();
        for ref_id in ref_ids {
            let keep = matches!(
                self.task_backend.get_status(&ref_id).await,
                Ok(Some(record)) if !matches!(record.status, TaskStatus::Complete | TaskStatus::Cancelled)
            );
            if !keep {
                self.active_tasks.lock().remove(&ref_id);
            }
        }
    }

    /// Write an entry, minting a reference identifier deterministic in
    /// `(namespace, canonical(key))`. Repeat calls with equal inputs yield the
    /// same identifier and replace the entry in place (§3 idempotent insert).
    pub async fn set(
        &self,
        key: &serde_json::Value,
        value: serde_json::Value,
        namespace: &str,
        policy: Option<AccessPolicy>,
        ttl: Option<i64>,
        metadata: Option<HashMap<String, String>>,
        actor: &Actor,
    ) -> Result<ReferenceId> {
        let _ = actor;
        let canonical_key = canonical(key);
        let ref_id = ReferenceId::mint(&self.cache_name, namespace, &canonical_key);
        let policy = policy.unwrap_or_else(|| {
            AccessPolicy::with_role_defaults(PermissionSet::CRUD, PermissionSet::CRUD, PermissionSet::FULL)
        });

        let mut entry = Entry::new(value, namespace, policy);
        if let Some(ttl) = ttl {
            entry = entry.with_ttl(ttl);
        }
        if let Some(metadata) = metadata {
            entry = entry.with_metadata(metadata);
        }
        self.storage.set(ref_id.as_str(), entry).await?;
        Ok(ref_id)
    }

    /// Existence/fetch check used only by the cached-callable wrapper's
    /// internal cache-lookup step — no permission check, no opaque collapse.
    /// Never exposed past this crate; every externally reachable read goes
    /// through [`ReferenceStore::get`] instead.
    pub(crate) async fn peek_entry(&self, ref_id: &ReferenceId) -> Result<Option<Entry>> {
        self.storage.get(ref_id.as_str()).await
    }

    /// The current record for a background task tracked under `ref_id`, if any.
    pub async fn task_status(&self, ref_id: &ReferenceId) -> Result<Option<TaskRecord>> {
        self.task_backend.get_status(ref_id.as_str()).await
    }

    /// Submit a background execution for `ref_id`, recording the namespace,
    /// policy, and arguments it must be committed/retried under.
    #[allow(clippy::too_many_arguments)]
    pub async fn submit_background(
        &self,
        ref_id: &ReferenceId,
        tool_name: &str,
        namespace: &str,
        policy: AccessPolicy,
        ttl: Option<i64>,
        metadata: HashMap<String, String>,
        args: serde_json::Value,
        retry_policy: RetryPolicy,
        func: TaskFn,
    ) -> Result<TaskRecord> {
        self.active_tasks.lock().insert(
            ref_id.as_str().to_owned(),
            TaskCommitContext {
                namespace: namespace.to_owned(),
                policy,
                ttl,
                metadata,
                args,
                tool_name: tool_name.to_owned(),
            },
        );
        self.task_backend.submit(ref_id.as_str(), func, retry_policy).await
    }

    /// Request cancellation of the background task tracked under `ref_id`.
    pub async fn cancel_task(&self, ref_id: &ReferenceId) -> Result<bool> {
        self.task_backend.cancel(ref_id.as_str()).await
    }

    /// The `(namespace, policy, ttl, metadata, args)` a still-tracked
    /// background task was submitted with, for
    /// [`crate::wrapper::CachedCallable::retry`] to resubmit against.
    #[allow(clippy::type_complexity)]
    pub(crate) fn task_commit_context(
        &self,
        ref_id: &ReferenceId,
    ) -> Option<(String, AccessPolicy, Option<i64>, HashMap<String, String>, serde_json::Value)> {
        self.active_tasks.lock().get(ref_id.as_str()).map(|context| {
            (context.namespace.clone(), context.policy.clone(), context.ttl, context.metadata.clone(), context.args.clone())
        })
    }

    /// The tool name a still-tracked background task was submitted under, if
    /// any — used by the `retry_task` administrative tool (§6) to find the
    /// [`crate::wrapper::CachedCallable`] that owns the task body.
    pub fn task_tool_name(&self, ref_id: &ReferenceId) -> Option<String> {
        self.active_tasks.lock().get(ref_id.as_str()).map(|context| context.tool_name.clone())
    }

    /// Aggregate statistics over the task backend's tracked tasks.
    pub async fn task_stats(&self) -> Result<TaskStats> {
        self.task_backend.get_stats().await
    }

    /// Checks the task registry first (§4.10); then loads the entry; then
    /// requires READ (or returns an opaque error on denial or absence).
    /// Emits a **complete** or **preview** response.
    pub async fn get(
        &self,
        ref_id: &ReferenceId,
        actor: &Actor,
        page: Option<u32>,
        page_size: Option<u32>,
        max_size: Option<u64>,
    ) -> Result<StructuredResponse> {
        if let Some(response) = self.poll_active_task(ref_id, actor).await? {
            return Ok(response);
        }

        let entry = self
            .storage
            .get(ref_id.as_str())
            .await?
            .ok_or_else(|| Error::NotFound { resource: ref_id.to_string() })
            .map_err(|error| error.to_opaque(ref_id.to_string()))?;

        let namespace_info = parse_namespace(&entry.namespace);
        refcache_domain::access::permission_checker::check(actor, PermissionSet::READ, &entry.policy, &namespace_info)
            .map_err(|error| error.to_opaque(ref_id.to_string()))?;

        self.build_value_response(ref_id, &entry.value, page, page_size, max_size)
    }

    /// Returns the full value. Requires READ *or* EXECUTE (EXECUTE only from
    /// [`Actor::is_trusted_server_path`] callers — §9 Open Question 1).
    pub async fn resolve(&self, ref_id: &ReferenceId, actor: &Actor) -> Result<serde_json::Value> {
        let entry = self
            .storage
            .get(ref_id.as_str())
            .await?
            .ok_or_else(|| Error::NotFound { resource: ref_id.to_string() })
            .map_err(|error| error.to_opaque(ref_id.to_string()))?;

        let namespace_info = parse_namespace(&entry.namespace);
        let read_ok =
            refcache_domain::access::permission_checker::check(actor, PermissionSet::READ, &entry.policy, &namespace_info)
                .is_ok();
        let execute_ok = actor.is_trusted_server_path()
            && refcache_domain::access::permission_checker::check(
                actor,
                PermissionSet::EXECUTE,
                &entry.policy,
                &namespace_info,
            )
            .is_ok();

        if !read_ok && !execute_ok {
            return Err(Error::OpaqueReference { ref_id: ref_id.to_string() });
        }
        Ok(entry.value)
    }

    /// Requires DELETE. Returns `true` iff an entry was removed.
    pub async fn delete(&self, ref_id: &ReferenceId, actor: &Actor) -> Result<bool> {
        let Some(entry) = self.storage.get(ref_id.as_str()).await? else {
            return Ok(false);
        };
        let namespace_info = parse_namespace(&entry.namespace);
        refcache_domain::access::permission_checker::check(actor, PermissionSet::DELETE, &entry.policy, &namespace_info)
            .map_err(|error| error.to_opaque(ref_id.to_string()))?;
        self.storage.delete(ref_id.as_str()).await
    }

    /// Opaque existence check: true iff `actor` could observe this reference
    /// via [`ReferenceStore::get`].
    pub async fn exists(&self, ref_id: &ReferenceId, actor: &Actor) -> Result<bool> {
        match self.get(ref_id, actor, None, None, None).await {
            Ok(_) => Ok(true),
            Err(Error::OpaqueReference { .. }) => Ok(false),
            Err(other) => Err(other),
        }
    }

    /// Requires DELETE for the targeted namespace(s); restricted to `SYSTEM`
    /// actors, since a namespace-wide clear has no single entry's policy to
    /// check DELETE against.
    pub async fn clear(&self, namespace: Option<&str>, actor: &Actor) -> Result<u64> {
        if actor.role != refcache_domain::value_objects::Role::System {
            return Err(Error::PermissionDenied {
                actor: actor.canonical(),
                required: PermissionSet::DELETE.to_string(),
                reason: "clear requires a SYSTEM actor".to_owned(),
                namespace: namespace.unwrap_or("*").to_owned(),
            });
        }
        self.storage.clear(namespace).await
    }

    /// List keys, filtered by namespace, restricted to `SYSTEM` actors (same
    /// rationale as [`ReferenceStore::clear`] — no single entry to check a
    /// policy against for a namespace-wide listing).
    pub async fn list_keys(&self, namespace: Option<&str>, actor: &Actor) -> Result<Vec<String>> {
        if actor.role != refcache_domain::value_objects::Role::System {
            return Err(Error::PermissionDenied {
                actor: actor.canonical(),
                required: PermissionSet::READ.to_string(),
                reason: "list_keys requires a SYSTEM actor".to_owned(),
                namespace: namespace.unwrap_or("*").to_owned(),
            });
        }
        self.storage.keys(namespace).await
    }

    async fn poll_active_task(&self, ref_id: &ReferenceId, actor: &Actor) -> Result<Option<StructuredResponse>> {
        let Some(record) = self.task_backend.get_status(ref_id.as_str()).await? else {
            return Ok(None);
        };

        let context = self.active_tasks.lock().get(ref_id.as_str()).cloned();
        if let Some(context) = &context {
            let namespace_info = parse_namespace(&context.namespace);
            refcache_domain::access::permission_checker::check(actor, PermissionSet::READ, &context.policy, &namespace_info)
                .map_err(|error| error.to_opaque(ref_id.to_string()))?;
        }

        use refcache_domain::value_objects::TaskStatus;
        match record.status {
            TaskStatus::Pending | TaskStatus::Processing => Ok(Some(StructuredResponse::Processing {
                ref_id: ref_id.to_string(),
                status: "processing",
                started_at: record.started_at,
                progress: record.progress.clone(),
                eta_seconds: None,
                retry_count: Some(record.retry_count),
                can_retry: Some(false),
            })),
            TaskStatus::Complete => {
                if !self.storage.exists(ref_id.as_str()).await? {
                    self.materialize_task_result(ref_id, context.as_ref()).await?;
                } else {
                    self.active_tasks.lock().remove(ref_id.as_str());
                }
                Ok(None)
            }
            TaskStatus::Failed => Err(Error::TaskFailed { message: record.last_error.clone().unwrap_or_default() }),
            TaskStatus::Cancelled => {
                // Cancelled tasks never populate the cache; the commit context
                // has nothing left to do and must not linger (it would never
                // be retried — `retry_task` only resubmits Failed tasks).
                self.active_tasks.lock().remove(ref_id.as_str());
                Err(Error::Cancelled)
            }
        }
    }

    async fn materialize_task_result(&self, ref_id: &ReferenceId, context: Option<&TaskCommitContext>) -> Result<()> {
        let value = self.task_backend.get_result(ref_id.as_str()).await?;
        let context = context.ok_or_else(|| Error::internal("completed task missing its commit context"))?;

        let mut entry = Entry::new(value, context.namespace.clone(), context.policy.clone());
        if let Some(ttl) = context.ttl {
            entry = entry.with_ttl(ttl);
        }
        entry = entry.with_metadata(context.metadata.clone());
        self.storage.set(ref_id.as_str(), entry).await?;
        self.active_tasks.lock().remove(ref_id.as_str());
        Ok(())
    }

    /// Measure then preview a freshly loaded or just-produced value, honoring
    /// §4.7's three-level `max_size` precedence and the `page`/`page_size`
    /// overrides a caller may request.
    pub(crate) fn build_value_response(
        &self,
        ref_id: &ReferenceId,
        value: &serde_json::Value,
        page: Option<u32>,
        page_size: Option<u32>,
        max_size_override: Option<u64>,
    ) -> Result<StructuredResponse> {
        let max_size = max_size_override.unwrap_or(self.default_max_size);
        let size = self.measurer.measure(value)?;

        if size <= max_size && page.is_none() {
            let total_items = match value {
                serde_json::Value::Array(items) => Some(items.len() as u64),
                serde_json::Value::Object(map) => Some(map.len() as u64),
                _ => None,
            };
            return Ok(StructuredResponse::complete(ref_id.to_string(), value.clone(), size, total_items));
        }

        let preview = match page_size {
            Some(page_size) => crate::paging::paginate_fixed_size(value, page, page_size, self.measurer.as_ref())?,
            None => self.preview_generator.generate(value, max_size, self.measurer.as_ref(), page)?,
        };

        Ok(StructuredResponse::Preview {
            ref_id: ref_id.to_string(),
            preview: preview.preview,
            is_complete: false,
            strategy: preview.strategy,
            total_items: preview.total_items.unwrap_or(0),
            original_size: preview.original_size,
            preview_size: preview.preview_size,
            page: preview.page,
            total_pages: preview.total_pages,
            message: preview_message(&preview),
        })
    }
}

fn preview_message(preview: &refcache_domain::value_objects::PreviewResult) -> String {
    use refcache_domain::value_objects::PreviewStrategy;
    match preview.strategy {
        PreviewStrategy::Sample => format!(
            "showing a {}-item sample of {} total items; pass `page`/`max_size` to see more",
            match &preview.preview {
                serde_json::Value::Array(items) => items.len(),
                serde_json::Value::Object(map) => map.len(),
                _ => 0,
            },
            preview.total_items.unwrap_or(0)
        ),
        PreviewStrategy::Paginate => format!(
            "page {} of {}; pass `page` to see other pages",
            preview.page.unwrap_or(1),
            preview.total_pages.unwrap_or(1)
        ),
        PreviewStrategy::Truncate => "value truncated to fit max_size; pass a larger `max_size` to see more".to_owned(),
    }
}
