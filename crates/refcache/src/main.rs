//! Demo stdio MCP server for `mcp-refcache`.
//!
//! Wires a `ReferenceStore` from `RefcacheConfig`, wraps one example cached
//! tool (`fetch_dataset`, a stand-in for any tool whose output can be large)
//! in a `CachedCallable`, and exposes it alongside the library's
//! administrative tools (`get_cached_result`, `list_cached_keys`,
//! `cache_stats`, `clear_cache`, `cancel_task`, `retry_task`) over a single
//! `rmcp` stdio server. Not a production tool host: real servers call
//! `refcache_server::mcp`'s plain functions from their own `#[tool_router]`
//! instead of reusing this binary's `DemoServer`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use refcache_domain::error::Error as RefcacheError;
use refcache_domain::value_objects::{AccessPolicy, PermissionSet, RetryPolicy};
use refcache_infrastructure::config::{RefcacheConfig, SizeMode, StorageKind};
use refcache_infrastructure::logging::{init_logging, LogFormat};
use refcache_infrastructure::preview::{DefaultPreviewGenerator, DefaultStrategy};
use refcache_infrastructure::size::tokenizer::FallbackTokenizer;
use refcache_infrastructure::{
    ByteMeasurer, MemoryStorage, RedisStorage, SqliteStorage, TokenMeasurer, WorkerPoolTaskBackend,
};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::tool::ToolCallContext;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult, PaginatedRequestParams,
    ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::transport::stdio;
use rmcp::{tool, tool_router, RoleServer, ServerHandler, ServiceExt};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use refcache_server::mcp::{
    self, ActorOnlyParams, GetCachedResultParams, NamespaceParams, RefIdParams,
};
use refcache_server::{CachedCallable, InvocationContext, ReferenceStore};

/// Run `mcp-refcache`'s demo stdio server.
#[derive(Parser, Debug)]
#[command(name = "refcache")]
#[command(about = "Demo mcp-refcache stdio server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Optional TOML configuration file, layered under `REFCACHE_*` env vars.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = CliLogFormat::Pretty)]
    log_format: CliLogFormat,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CliLogFormat {
    Pretty,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(value: CliLogFormat) -> Self {
        match value {
            CliLogFormat::Pretty => LogFormat::Pretty,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

/// Parameters for the demo's one domain tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct FetchDatasetParams {
    /// Logical name of the dataset to fetch.
    dataset: String,
    /// Number of synthetic rows to generate, for demonstrating oversized
    /// (preview-triggering) results.
    #[serde(default = "default_row_count")]
    row_count: u64,
    /// The calling actor, in `"role"` or `"role:principal[:session]"` form.
    /// See [`mcp::parse_actor`]; omitted defaults to an anonymous agent.
    actor: Option<String>,
}

fn default_row_count() -> u64 {
    50
}

/// Builds a synthetic dataset. Stands in for any tool whose output can grow
/// large enough to need caching and preview-on-overflow.
fn fetch_dataset_body(args: Value, row_count_hint: u64) -> Value {
    let dataset = args
        .get("dataset")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_owned();
    let rows: Vec<Value> = (0..row_count_hint)
        .map(|i| json!({ "dataset": dataset, "row": i, "value": i * i }))
        .collect();
    json!({ "dataset": dataset, "rows": rows })
}

/// The demo server: one domain tool plus the library's administrative tools.
#[derive(Clone)]
struct DemoServer {
    store: Arc<ReferenceStore>,
    fetch_dataset: Arc<CachedCallable>,
    tool_router: ToolRouter<Self>,
}

impl DemoServer {
    fn new(store: Arc<ReferenceStore>, fetch_dataset: Arc<CachedCallable>) -> Self {
        Self {
            store,
            fetch_dataset,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl DemoServer {
    #[tool(
        description = "Fetch a (potentially large) dataset, cached by reference and previewed when it exceeds the configured size limit.",
        annotations(
            title = "Fetch dataset",
            read_only_hint = true,
            destructive_hint = false,
            idempotent_hint = true,
            open_world_hint = false
        )
    )]
    async fn fetch_dataset(
        &self,
        Parameters(params): Parameters<FetchDatasetParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let actor = mcp::parse_actor(params.actor.as_deref());
        let context = InvocationContext::new();
        let row_count = params.row_count;
        let response = self
            .fetch_dataset
            .invoke(
                json!({ "dataset": params.dataset, "row_count": row_count }),
                &actor,
                &context,
                None,
                None,
                None,
                None,
            )
            .await;
        mcp_json_result(response)
    }

    #[tool(
        description = "Retrieve a cached value (or a page/preview of it) by reference identifier.",
        annotations(
            title = "Get cached result",
            read_only_hint = true,
            destructive_hint = false,
            idempotent_hint = true,
            open_world_hint = false
        )
    )]
    async fn get_cached_result(
        &self,
        Parameters(params): Parameters<GetCachedResultParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        mcp_json_result(mcp::get_cached_result(&self.store, params).await)
    }

    #[tool(
        description = "List keys tracked by the cache, optionally filtered by namespace.",
        annotations(
            title = "List cached keys",
            read_only_hint = true,
            destructive_hint = false,
            idempotent_hint = true,
            open_world_hint = false
        )
    )]
    async fn list_cached_keys(
        &self,
        Parameters(params): Parameters<NamespaceParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        mcp_json_result(mcp::list_cached_keys(&self.store, params).await)
    }

    #[tool(
        description = "Report aggregate statistics over cached entries and background tasks.",
        annotations(
            title = "Cache stats",
            read_only_hint = true,
            destructive_hint = false,
            idempotent_hint = true,
            open_world_hint = false
        )
    )]
    async fn cache_stats(
        &self,
        Parameters(params): Parameters<ActorOnlyParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        mcp_json_result(mcp::cache_stats(&self.store, params).await)
    }

    #[tool(
        description = "Remove cached entries, optionally restricted to one namespace.",
        annotations(
            title = "Clear cache",
            read_only_hint = false,
            destructive_hint = true,
            idempotent_hint = true,
            open_world_hint = false
        )
    )]
    async fn clear_cache(
        &self,
        Parameters(params): Parameters<NamespaceParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        mcp_json_result(mcp::clear_cache(&self.store, params).await)
    }

    #[tool(
        description = "Cancel a running background task by its reference identifier.",
        annotations(
            title = "Cancel task",
            read_only_hint = false,
            destructive_hint = true,
            idempotent_hint = true,
            open_world_hint = false
        )
    )]
    async fn cancel_task(
        &self,
        Parameters(params): Parameters<RefIdParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        mcp_json_result(mcp::cancel_task(&self.store, params).await)
    }

    #[tool(
        description = "Resubmit a failed background task after its backend retry budget was exhausted.",
        annotations(
            title = "Retry task",
            read_only_hint = false,
            destructive_hint = false,
            idempotent_hint = false,
            open_world_hint = false
        )
    )]
    async fn retry_task(
        &self,
        Parameters(params): Parameters<RefIdParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let callables = std::slice::from_ref(&self.fetch_dataset);
        mcp_json_result(mcp::retry_task(&self.store, callables, params).await)
    }
}

/// Serializes `result`'s success value, mapping client-fixable domain errors
/// to `CallToolResult::error` (LLM-visible) and everything else to the
/// protocol fault channel, exactly as `refcache_server::mcp`'s own tools do.
fn mcp_json_result<T: serde::Serialize>(
    result: refcache_domain::error::Result<T>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    match result {
        Ok(value) => {
            let text = serde_json::to_string(&value)
                .map_err(|source| rmcp::ErrorData::internal_error(source.to_string(), None))?;
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }
        Err(error) if is_client_fixable(&error) => Ok(CallToolResult::error(vec![Content::text(error.to_string())])),
        Err(error) => Err(rmcp::ErrorData::internal_error(error.to_string(), None)),
    }
}

fn is_client_fixable(error: &RefcacheError) -> bool {
    matches!(
        error,
        RefcacheError::OpaqueReference { .. }
            | RefcacheError::InvalidArgument { .. }
            | RefcacheError::CircularReference { .. }
            | RefcacheError::TaskFailed { .. }
            | RefcacheError::Cancelled
    )
}

impl ServerHandler for DemoServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            server_info: Implementation {
                name: "mcp-refcache-demo".to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                ..Default::default()
            },
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Demo mcp-refcache server: fetch_dataset is a cached, size-limited example tool; \
                 the remaining tools poll, list, clear, cancel, and retry cached entries and background tasks."
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

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format.into());

    let config = RefcacheConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::info!(cache_name = %config.cache_name, storage = ?config.storage, "starting mcp-refcache demo server");

    let store = build_store(&config).await?;

    let fetch_dataset = Arc::new(
        CachedCallable::new(
            "fetch_dataset",
            store.clone(),
            Arc::new(|args, _progress, _cancellation| {
                Box::pin(async move {
                    let row_count = args.get("row_count").and_then(Value::as_u64).unwrap_or(50);
                    Ok(fetch_dataset_body(args, row_count))
                })
            }),
            "demo:datasets",
        )
        .with_policy(AccessPolicy::with_role_defaults(
            PermissionSet::READ,
            PermissionSet::READ,
            PermissionSet::FULL,
        ))
        .with_ttl(3600)
        .with_async_timeout(Duration::from_secs(5))
        .with_retry_policy(RetryPolicy {
            max_retries: 2,
            retry_delay_ms: 200,
            backoff_factor: 2.0,
        }),
    );

    let server = DemoServer::new(store, fetch_dataset);
    let service = server.serve(stdio()).await.context("failed to start stdio transport")?;
    service.waiting().await.context("server loop exited with an error")?;
    Ok(())
}

async fn build_store(config: &RefcacheConfig) -> Result<Arc<ReferenceStore>> {
    let storage: Arc<dyn refcache_domain::ports::StorageBackend> = match config.storage {
        StorageKind::Memory => Arc::new(MemoryStorage::new()),
        StorageKind::Sqlite => {
            let path = config.resolve_db_path().context("failed to resolve sqlite database path")?;
            Arc::new(SqliteStorage::open(&path).await.context("failed to open sqlite storage")?)
        }
        StorageKind::Redis => {
            let url = config.resolve_redis_url().context("failed to resolve redis url")?;
            Arc::new(
                RedisStorage::connect(&url, &config.cache_name)
                    .await
                    .context("failed to connect to redis")?,
            )
        }
    };

    let measurer: Arc<dyn refcache_domain::ports::SizeMeasurer> = match config.size_mode {
        SizeMode::Token => Arc::new(TokenMeasurer::new(Arc::new(FallbackTokenizer))),
        SizeMode::Byte => Arc::new(ByteMeasurer),
    };

    let task_backend = Arc::new(WorkerPoolTaskBackend::new(config.worker_pool_size));
    let preview_generator = Arc::new(DefaultPreviewGenerator::new(DefaultStrategy::Sample));

    Ok(ReferenceStore::builder(config.cache_name.clone())
        .storage(storage)
        .task_backend(task_backend)
        .measurer(measurer)
        .preview_generator(preview_generator)
        .default_max_size(config.default_max_size)
        .task_retention_seconds(config.task_retention_seconds)
        .cleanup_interval_seconds(config.cleanup_interval_seconds)
        .build())
}
