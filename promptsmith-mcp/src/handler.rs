//! The `ServerHandler` implementation wiring the [`ReloadEngine`] and
//! [`RmcpToolRegistry`] to MCP's `list_tools`/`call_tool`/resource surface,
//! plus the always-available Control Surface tools.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, InitializeResult,
    ListResourcesResult, ListToolsResult, PaginatedRequestParams, ReadResourceRequestParams,
    ReadResourceResult, ResourceContents, ServerCapabilities, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::{json, Map, Value};

use crate::engine::ReloadEngine;

const HEALTH_URI: &str = "system://health";

/// Names of the built-in, always-available Control Surface tools. These
/// bypass group filtering and are never touched by a reload.
const CONTROL_TOOL_NAMES: [&str; 5] = ["reload", "stats", "list", "inspect", "switch_source"];

/// Wires the reload engine and tool registry into an MCP `ServerHandler`.
pub struct PromptsmithHandler {
    engine: Arc<ReloadEngine>,
    started_at: Instant,
    main_root: PathBuf,
    registry_enabled: bool,
}

impl PromptsmithHandler {
    /// Build a handler around an already-constructed engine.
    pub fn new(engine: Arc<ReloadEngine>, main_root: PathBuf, registry_enabled: bool) -> Self {
        Self {
            engine,
            started_at: Instant::now(),
            main_root,
            registry_enabled,
        }
    }

    fn control_tools() -> Vec<Tool> {
        vec![
            Tool::new("reload", "Re-sync sources and reload every prompt tool.", schema_object(&[])),
            Tool::new("stats", "Snapshot of runtime state counts and tool counts.", schema_object(&[])),
            Tool::new(
                "list",
                "Filtered projection of the runtime state (status/group/tag/runtime_state).",
                schema_object(&["status", "group", "tag", "runtime_state"]),
            ),
            Tool::new("inspect", "Full runtime record for one id.", required_schema(&["id"])),
            Tool::new(
                "switch_source",
                "Replace the active source and reload.",
                required_schema(&["url"]),
            ),
        ]
    }

    async fn call_control_tool(&self, name: &str, args: Map<String, Value>) -> Result<CallToolResult, McpError> {
        match name {
            "reload" => {
                let report = self.engine.full_reload().await;
                Ok(json_result(&*report))
            }
            "stats" => Ok(json_result(&self.stats())),
            "list" => Ok(json_result(&self.list(&args))),
            "inspect" => {
                let id = args.get("id").and_then(Value::as_str).ok_or_else(|| {
                    McpError::invalid_params("'id' is required", None)
                })?;
                match self.engine.state().snapshot().get(id) {
                    Some(runtime) => Ok(json_result(runtime.as_ref())),
                    None => Err(McpError::resource_not_found(format!("no such id '{id}'"), None)),
                }
            }
            "switch_source" => {
                let url = args.get("url").and_then(Value::as_str).ok_or_else(|| {
                    McpError::invalid_params("'url' is required", None)
                })?;
                let branch = args.get("branch").and_then(Value::as_str).map(str::to_string);
                let report = self
                    .engine
                    .switch_source(url.to_string(), branch)
                    .await
                    .map_err(crate::error::McpServerError::from)?;
                Ok(json_result(&json!({ "loaded": report.loaded })))
            }
            _ => unreachable!("dispatch already matched a control tool name"),
        }
    }

    fn stats(&self) -> Value {
        use promptsmith_prompts::RuntimeStateKind;

        let snapshot = self.engine.state().snapshot();
        let mut active = 0;
        let mut legacy = 0;
        let mut invalid = 0;
        let mut disabled = 0;
        let mut warning = 0;
        for runtime in snapshot.all() {
            match runtime.runtime_state {
                RuntimeStateKind::Active => active += 1,
                RuntimeStateKind::Legacy => legacy += 1,
                RuntimeStateKind::Invalid => invalid += 1,
                RuntimeStateKind::Disabled => disabled += 1,
                RuntimeStateKind::Warning => warning += 1,
            }
        }
        let prompt_tools = self.engine.registry().len();
        let basic_tools = CONTROL_TOOL_NAMES.len();
        json!({
            "total": snapshot.len(),
            "active": active,
            "legacy": legacy,
            "invalid": invalid,
            "disabled": disabled,
            "warning": warning,
            "tools": {
                "basic": basic_tools,
                "prompt": prompt_tools,
                "total": basic_tools + prompt_tools,
            }
        })
    }

    fn list(&self, filters: &Map<String, Value>) -> Value {
        let status = filters.get("status").and_then(Value::as_str);
        let group = filters.get("group").and_then(Value::as_str);
        let tag = filters.get("tag").and_then(Value::as_str);
        let runtime_state = filters.get("runtime_state").and_then(Value::as_str);

        let snapshot = self.engine.state().snapshot();
        let prompts: Vec<Value> = snapshot
            .all()
            .filter(|r| status.map_or(true, |s| format!("{:?}", r.status).eq_ignore_ascii_case(s)))
            .filter(|r| group.map_or(true, |g| r.group == g))
            .filter(|r| tag.map_or(true, |t| r.tags.iter().any(|tg| tg == t)))
            .filter(|r| {
                runtime_state.map_or(true, |s| format!("{:?}", r.runtime_state).eq_ignore_ascii_case(s))
            })
            .map(|r| {
                json!({
                    "id": r.id,
                    "title": r.title,
                    "version": r.version.to_string(),
                    "status": r.status,
                    "runtime_state": r.runtime_state,
                    "source": r.source,
                    "tags": r.tags,
                    "use_cases": r.use_cases,
                    "group": r.group,
                    "visibility": r.visibility,
                })
            })
            .collect();

        json!({ "total": prompts.len(), "prompts": prompts })
    }

    async fn health(&self) -> Value {
        let snapshot = self.engine.state().snapshot();
        let mut groups: std::collections::HashSet<&str> = std::collections::HashSet::new();
        let mut active = 0;
        let mut legacy = 0;
        let mut invalid = 0;
        let mut disabled = 0;
        for runtime in snapshot.all() {
            groups.insert(runtime.group.as_str());
            match runtime.runtime_state {
                promptsmith_prompts::RuntimeStateKind::Active => active += 1,
                promptsmith_prompts::RuntimeStateKind::Legacy => legacy += 1,
                promptsmith_prompts::RuntimeStateKind::Invalid => invalid += 1,
                promptsmith_prompts::RuntimeStateKind::Disabled => disabled += 1,
                _ => {}
            }
        }

        let mut system = sysinfo::System::new();
        system.refresh_memory();
        let pid = sysinfo::get_current_pid().ok();
        match pid {
            Some(pid) => system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true),
            None => system.refresh_processes(sysinfo::ProcessesToUpdate::All, true),
        };
        let rss = pid
            .and_then(|p| system.process(p))
            .map(|proc| proc.memory())
            .unwrap_or(0);

        json!({
            "git": {
                "repoUrl": self.engine.active_source_url().await,
                "repoPath": self.main_root.display().to_string(),
                "headCommit": self.engine.active_head_commit().await,
            },
            "prompts": {
                "total": snapshot.len(),
                "active": active,
                "legacy": legacy,
                "invalid": invalid,
                "disabled": disabled,
                "loadedCount": active + legacy,
                "groups": groups.into_iter().collect::<Vec<_>>(),
            },
            "registry": {
                "enabled": self.registry_enabled,
                "source": if self.registry_enabled { "registry.yaml" } else { "none" },
            },
            "cache": {
                "size": snapshot.len(),
                "cleanupInterval": Value::Null,
            },
            "system": {
                "uptime_ms": self.started_at.elapsed().as_millis() as u64,
                "memory": {
                    "heapUsed": rss,
                    "heapTotal": system.total_memory(),
                    "rss": rss,
                }
            }
        })
    }
}

fn schema_object(optional_fields: &[&str]) -> Map<String, Value> {
    let mut properties = Map::new();
    for field in optional_fields {
        properties.insert((*field).to_string(), json!({ "type": "string" }));
    }
    let mut schema = Map::new();
    schema.insert("type".to_string(), Value::String("object".to_string()));
    schema.insert("properties".to_string(), Value::Object(properties));
    schema
}

fn required_schema(required_fields: &[&str]) -> Map<String, Value> {
    let mut schema = schema_object(required_fields);
    schema.insert(
        "required".to_string(),
        Value::Array(required_fields.iter().map(|f| Value::String((*f).to_string())).collect()),
    );
    schema
}

fn json_result(value: &(impl serde::Serialize + ?Sized)) -> CallToolResult {
    let text = serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
    CallToolResult::success(vec![Content::text(text)])
}

impl ServerHandler for PromptsmithHandler {
    fn get_info(&self) -> InitializeResult {
        let capabilities = ServerCapabilities::builder()
            .enable_tools()
            .enable_tool_list_changed()
            .build();
        let mut server_info = Implementation::new("promptsmith-mcp", env!("CARGO_PKG_VERSION"));
        server_info.title = Some("Promptsmith".into());
        InitializeResult::new(capabilities)
            .with_instructions("Dynamic prompt-as-tool MCP server with hot reload.")
            .with_server_info(server_info)
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let mut tools = Self::control_tools();
        tools.extend(self.engine.registry().list());
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = request.arguments.unwrap_or_default();
        if CONTROL_TOOL_NAMES.contains(&request.name.as_ref()) {
            return self.call_control_tool(&request.name, args).await;
        }

        match self.engine.registry().get(&request.name) {
            Some((_, handler)) => Ok(handler(args)),
            None => Err(McpError::resource_not_found(format!("no such tool '{}'", request.name), None)),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult::default())
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        if request.uri != HEALTH_URI {
            return Err(McpError::resource_not_found(format!("no such resource '{}'", request.uri), None));
        }
        let body = serde_json::to_string_pretty(&self.health().await).unwrap_or_default();
        Ok(ReadResourceResult::new(vec![ResourceContents::text(body, HEALTH_URI)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{GroupConfig, ReloadEngine};
    use crate::registry::RmcpToolRegistry;
    use crate::state::RuntimeStateStore;
    use promptsmith_source::SourceManager;
    use promptsmith_templating::{PartialRegistry, TemplateEngine};
    use std::collections::HashSet;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    fn prompt(id: &str) -> String {
        format!("id: {id}\ntitle: {id} title\nstatus: stable\nversion: 1.0.0\ntemplate: \"hi\"\n")
    }

    async fn handler_over(root: &Path) -> PromptsmithHandler {
        std::fs::write(root.join("one.yaml"), prompt("one")).unwrap();
        let mut sources = SourceManager::new(
            vec![(0, root.display().to_string())],
            None,
            root.to_path_buf(),
            "main",
            1,
        );
        sources.initial_load().unwrap();
        let groups = GroupConfig {
            active: HashSet::new(),
            system_configured: false,
        };
        let engine = Arc::new(ReloadEngine::new(
            sources,
            groups,
            TemplateEngine::new(),
            Arc::new(PartialRegistry::new()),
            Arc::new(promptsmith_common::FileCache::new(Duration::from_secs(60))),
            RmcpToolRegistry::new(),
            Arc::new(RuntimeStateStore::new()),
        ));
        engine.full_reload().await;
        PromptsmithHandler::new(engine, root.to_path_buf(), false)
    }

    #[tokio::test]
    async fn stats_counts_registered_prompt_as_active() {
        let root = TempDir::new().unwrap();
        let handler = handler_over(root.path()).await;
        let stats = handler.stats();
        assert_eq!(stats["total"], 1);
        assert_eq!(stats["active"], 1);
        assert_eq!(stats["tools"]["prompt"], 1);
        assert_eq!(stats["tools"]["basic"], CONTROL_TOOL_NAMES.len());
    }

    #[tokio::test]
    async fn list_filters_by_tag() {
        let root = TempDir::new().unwrap();
        let handler = handler_over(root.path()).await;
        let filters = Map::new();
        let all = handler.list(&filters);
        assert_eq!(all["total"], 1);

        let mut filters = Map::new();
        filters.insert("tag".to_string(), Value::String("nonexistent".to_string()));
        let filtered = handler.list(&filters);
        assert_eq!(filtered["total"], 0);
    }

    #[tokio::test]
    async fn reload_control_tool_reports_loaded_count() {
        let root = TempDir::new().unwrap();
        let handler = handler_over(root.path()).await;
        let result = handler.call_control_tool("reload", Map::new()).await.unwrap();
        assert_ne!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn inspect_requires_an_id_argument() {
        let root = TempDir::new().unwrap();
        let handler = handler_over(root.path()).await;
        let err = handler.call_control_tool("inspect", Map::new()).await.unwrap_err();
        assert!(err.to_string().contains("id"));
    }

    #[tokio::test]
    async fn inspect_returns_not_found_for_unknown_id() {
        let root = TempDir::new().unwrap();
        let handler = handler_over(root.path()).await;
        let mut args = Map::new();
        args.insert("id".to_string(), Value::String("missing".to_string()));
        let err = handler.call_control_tool("inspect", args).await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn health_reports_prompt_counts_and_no_network_head_commit() {
        let root = TempDir::new().unwrap();
        let handler = handler_over(root.path()).await;
        let health = handler.health().await;
        assert_eq!(health["prompts"]["total"], 1);
        assert_eq!(health["prompts"]["active"], 1);
        assert_eq!(health["registry"]["enabled"], false);
    }
}
