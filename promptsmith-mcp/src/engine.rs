//! `ReloadEngine`: the singleflight-coalescing `fullReload`/`singleReload`
//! pair that drives source sync, parsing, ranking, and the dual-swap
//! registration against the [`RmcpToolRegistry`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rmcp::model::{CallToolResult, Content, Tool};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use promptsmith_common::FileCache;
use promptsmith_prompts::{
    cmp_priority, coerce_value, group::should_load, is_candidate, parse_document, ArgSchema,
    ArgTypeDocument, ParseContext, ParseOutcome, PromptRuntime, RegistryFile,
};
use promptsmith_source::{SourceError, SourceManager};
use promptsmith_templating::{CompiledTemplate, PartialRegistry, TemplateEngine};

use crate::registry::{RmcpToolRegistry, ToolFn, ToolHandle};
use crate::state::{RuntimeSnapshot, RuntimeStateStore};

/// A parsed prompt paired with its compiled template, carried together
/// through ranking and dedupe so neither needs re-zipping.
type RankedPair = (PromptRuntime, CompiledTemplate);

/// Result of a completed reload, returned to the `reload` control tool and
/// used internally to report `errors` on partial failure.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ReloadReport {
    /// Number of documents that parsed into a runtime entry (any state).
    pub loaded: usize,
    /// `(file path, message)` pairs for documents that failed outright.
    pub errors: Vec<(String, String)>,
}

/// A running watcher or poller for the active source, held by the caller
/// to keep the background task alive; dropping it stops the task.
pub enum SourceWatchHandle {
    Local(promptsmith_source::LocalWatchHandle),
    Git(promptsmith_source::GitPollHandle),
}

/// Which active group set this engine filters loaded documents against.
pub struct GroupConfig {
    /// Configured active groups (`MCP_GROUPS`).
    pub active: HashSet<String>,
    /// Whether a system source is configured at all.
    pub system_configured: bool,
}

/// Owns the sources, the shared template machinery, the tool registry, and
/// the runtime state store; drives reload passes against all of them.
pub struct ReloadEngine {
    sources: Mutex<SourceManager>,
    groups: GroupConfig,
    engine: TemplateEngine,
    partials: Arc<PartialRegistry>,
    file_cache: Arc<FileCache>,
    registry: Arc<RmcpToolRegistry>,
    state: Arc<RuntimeStateStore>,
    in_flight: Mutex<Option<broadcast::Sender<Arc<ReloadReport>>>>,
}

impl ReloadEngine {
    /// Wire an engine around an already-constructed `SourceManager` (its
    /// `initial_load` should have already run) and the shared registries.
    pub fn new(
        sources: SourceManager,
        groups: GroupConfig,
        engine: TemplateEngine,
        partials: Arc<PartialRegistry>,
        file_cache: Arc<FileCache>,
        registry: Arc<RmcpToolRegistry>,
        state: Arc<RuntimeStateStore>,
    ) -> Self {
        Self {
            sources: Mutex::new(sources),
            groups,
            engine,
            partials,
            file_cache,
            registry,
            state,
            in_flight: Mutex::new(None),
        }
    }

    /// Run `SourceManager::initial_load` against the engine's configured
    /// sources. Exposed so callers that construct the engine before the
    /// first sync (including integration tests) don't need access to the
    /// private `sources` field.
    pub async fn initial_load(&self) -> promptsmith_source::Result<promptsmith_source::LoadReport> {
        let mut sources = self.sources.lock().await;
        sources.initial_load()
    }

    /// The shared tool registry.
    pub fn registry(&self) -> &Arc<RmcpToolRegistry> {
        &self.registry
    }

    /// The shared runtime state store.
    pub fn state(&self) -> &Arc<RuntimeStateStore> {
        &self.state
    }

    /// Block until any reload currently in flight finishes, without
    /// starting a new one. Used by graceful shutdown (spec §5: "shutdown
    /// waits for the current reload to finish before releasing watchers").
    pub async fn wait_for_idle(&self) {
        let guard = self.in_flight.lock().await;
        if let Some(sender) = guard.as_ref() {
            let mut rx = sender.subscribe();
            drop(guard);
            let _ = rx.recv().await;
        }
    }

    /// Re-sync sources, rebuild partials, reparse every eligible document,
    /// and dual-swap the tool registry. Concurrent callers while a reload is
    /// already running subscribe to the in-flight result instead of
    /// re-running the work.
    pub async fn full_reload(&self) -> Arc<ReloadReport> {
        let mut guard = self.in_flight.lock().await;
        if let Some(sender) = guard.as_ref() {
            let mut rx = sender.subscribe();
            drop(guard);
            return rx.recv().await.expect("reload broadcaster dropped without sending");
        }

        let (tx, _rx) = broadcast::channel(1);
        *guard = Some(tx.clone());
        drop(guard);

        let report = Arc::new(self.run_full_reload().await);

        let mut guard = self.in_flight.lock().await;
        *guard = None;
        drop(guard);
        let _ = tx.send(report.clone());
        report
    }

    async fn run_full_reload(&self) -> ReloadReport {
        let sources = self.sources.lock().await;
        if let Err(e) = sources.resync_active() {
            warn!(error = %e, "reload sync failed, preserving previous tool set");
            return ReloadReport {
                loaded: 0,
                errors: vec![("<sync>".to_string(), e.to_string())],
            };
        }
        let main_root = sources.target_dir().to_path_buf();
        let system_root = sources.system_target_dir();
        drop(sources);

        self.file_cache.invalidate(Some(&main_root));
        self.file_cache.invalidate(Some(&system_root));

        self.partials.clear();
        let _ = self.partials.load_from_dir(&main_root);
        if system_root.is_dir() {
            let _ = self.partials.load_from_dir(&system_root);
        }

        let registry_file = load_registry(&main_root);

        let mut errors = Vec::new();
        let user_parsed = self.collect_parsed(&main_root, registry_file.as_ref(), false, &mut errors);
        let system_parsed = if system_root.is_dir() {
            self.collect_parsed(&system_root, None, true, &mut errors)
        } else {
            Vec::new()
        };

        let loaded = user_parsed.len() + system_parsed.len();

        // `rank`/`dedupe` are only meant to run over tool-eligible entries
        // (runtime_state active/legacy): ranking an ineligible document in
        // could let it win dedupe over an eligible duplicate of the same id,
        // and since the winner is then rejected by the registration gate
        // below, neither copy would end up registered. Ineligible entries
        // never compete for a tool slot; they pass straight through as
        // shadow-like entries so they still surface via inspect/stats.
        let (user_eligible, user_ineligible): (Vec<RankedPair>, Vec<RankedPair>) =
            user_parsed.into_iter().partition(|(r, _)| r.runtime_state.is_registered());
        let (user_runtimes, user_compiled): (Vec<PromptRuntime>, Vec<CompiledTemplate>) =
            user_eligible.into_iter().unzip();
        let ranked_user = rank_with_templates(user_runtimes, user_compiled);
        let (user_winners, mut user_shadows) = dedupe_with_templates(ranked_user);
        user_shadows.extend(user_ineligible);
        let user_ids: HashSet<&str> = user_winners.iter().map(|(r, _)| r.id.as_str()).collect();

        let (system_eligible, system_ineligible): (Vec<RankedPair>, Vec<RankedPair>) =
            system_parsed.into_iter().partition(|(r, _)| r.runtime_state.is_registered());
        let (system_runtimes, system_compiled): (Vec<PromptRuntime>, Vec<CompiledTemplate>) =
            system_eligible.into_iter().unzip();
        let ranked_system = rank_with_templates(system_runtimes, system_compiled);
        let (system_winners, mut system_shadows) = dedupe_with_templates(ranked_system);
        system_shadows.extend(system_ineligible);
        let system_winners: Vec<_> = system_winners
            .into_iter()
            .filter(|(r, _)| !user_ids.contains(r.id.as_str()))
            .collect();

        let mut all_winners = user_winners;
        all_winners.extend(system_winners);

        let previous_handles: HashMap<String, ToolHandle> = {
            let snapshot = self.state.snapshot();
            snapshot
                .all()
                .filter_map(|r| snapshot.handle(&r.id).map(|h| (r.id.clone(), h.clone())))
                .collect()
        };

        let mut new_handles: HashMap<String, ToolHandle> = HashMap::new();
        let mut by_id: HashMap<String, Arc<PromptRuntime>> = HashMap::new();
        let mut by_path: HashMap<PathBuf, String> = HashMap::new();

        for (runtime, compiled) in &all_winners {
            by_path.insert(runtime.file_path.clone(), runtime.id.clone());
            if runtime.runtime_state.is_registered() {
                let handle = self.register_tool(runtime, compiled.clone());
                new_handles.insert(runtime.id.clone(), handle);
            }
        }
        for runtime in user_shadows.iter().chain(system_shadows.iter()).map(|(r, _)| r) {
            by_path.insert(runtime.file_path.clone(), runtime.id.clone());
        }
        for (runtime, _) in &all_winners {
            by_id.insert(runtime.id.clone(), Arc::new(runtime.clone()));
        }
        for runtime in user_shadows.into_iter().chain(system_shadows).map(|(r, _)| r) {
            by_id.entry(runtime.id.clone()).or_insert_with(|| Arc::new(runtime));
        }

        for (id, handle) in &previous_handles {
            if !new_handles.contains_key(id) {
                handle.remove();
            }
        }

        self.state.publish(RuntimeSnapshot::new(by_id, by_path, new_handles));

        info!(loaded, errors = errors.len(), "full reload complete");
        ReloadReport { loaded, errors }
    }

    /// Per-file reload path for a single changed `LocalSource` file. Falls
    /// back to [`Self::full_reload`] on any failure.
    pub async fn single_reload(&self, file_path: &Path) -> Arc<ReloadReport> {
        if !file_path.exists() {
            let snapshot = self.state.snapshot();
            if let Some(id) = snapshot.id_for_path(file_path) {
                if let Some(handle) = snapshot.handle(id) {
                    handle.remove();
                }
            }
            return Arc::new(ReloadReport::default());
        }

        let sources = self.sources.lock().await;
        let main_root = sources.target_dir().to_path_buf();
        drop(sources);

        let registry_file = load_registry(&main_root);
        let group = promptsmith_prompts::group::compute_group(&main_root, file_path);
        if !should_load(&group, &self.groups.active, self.groups.system_configured, false) {
            return self.full_reload().await;
        }

        let ctx = ParseContext {
            root: &main_root,
            registry: registry_file.as_ref(),
            engine: &self.engine,
            partials: &self.partials,
        };

        match parse_document(file_path, &ctx) {
            ParseOutcome::Parsed { runtime, compiled } => {
                let runtime = *runtime;
                let mut snapshot = (*self.state.snapshot()).clone();
                let mut handle_to_remove = None;
                if let Some(previous_id) = snapshot.id_for_path(file_path) {
                    if previous_id != runtime.id {
                        if let Some(h) = snapshot.handle(previous_id) {
                            handle_to_remove = Some(h.clone());
                        }
                    }
                }

                let new_handle = if runtime.runtime_state.is_registered() {
                    Some(self.register_tool(&runtime, compiled))
                } else {
                    None
                };

                let mut by_id = snapshot_ids(&snapshot);
                let mut by_path = snapshot_paths(&snapshot);
                let mut handles = snapshot_handles(&snapshot);

                by_path.insert(runtime.file_path.clone(), runtime.id.clone());
                if let Some(handle) = new_handle {
                    handles.insert(runtime.id.clone(), handle);
                } else {
                    handles.remove(&runtime.id);
                }
                by_id.insert(runtime.id.clone(), Arc::new(runtime));

                if let Some(h) = handle_to_remove {
                    h.remove();
                }
                let _ = &mut snapshot;
                self.state.publish(RuntimeSnapshot::new(by_id, by_path, handles));
                Arc::new(ReloadReport { loaded: 1, errors: Vec::new() })
            }
            ParseOutcome::Skipped => Arc::new(ReloadReport::default()),
            ParseOutcome::Failed(_) => self.full_reload().await,
        }
    }

    /// The active source's configured URL/path, for health reporting.
    pub async fn active_source_url(&self) -> Option<String> {
        let sources = self.sources.lock().await;
        sources.active_source().map(|s| s.url())
    }

    /// The active source's local `HEAD` commit, if it is a Git source that
    /// has already synced. Reads the local ref; does not touch the network.
    pub async fn active_head_commit(&self) -> Option<String> {
        let sources = self.sources.lock().await;
        match sources.active_source() {
            Some(promptsmith_source::Source::Git(_)) => {
                promptsmith_git::local_head_commit(sources.target_dir())
            }
            _ => None,
        }
    }

    /// Validate and switch the active source, then trigger a full reload.
    pub async fn switch_source(&self, url: String, branch: Option<String>) -> Result<Arc<ReloadReport>, SourceError> {
        let mut sources = self.sources.lock().await;
        sources.switch_active_source(url, branch.as_deref().unwrap_or("main"))?;
        drop(sources);
        Ok(self.full_reload().await)
    }

    /// Start the watcher or poller matching the active source's kind, per
    /// spec §5's "one watcher task per active SourceStrategy". Returns
    /// `None` if the active source supports neither (should not happen for
    /// a validated `Source`).
    pub async fn start_watching(
        self: &Arc<Self>,
        git_polling_interval: std::time::Duration,
        git_max_retries: u32,
    ) -> Option<SourceWatchHandle> {
        let sources = self.sources.lock().await;
        match sources.active_source()? {
            promptsmith_source::Source::Local(local) => {
                let local = local.clone();
                let target_dir = sources.target_dir().to_path_buf();
                drop(sources);
                let engine = self.clone();
                let rt = tokio::runtime::Handle::current();
                let handle = local
                    .watch(&target_dir, move |path| {
                        let engine = engine.clone();
                        rt.spawn(async move {
                            engine.single_reload(&path).await;
                        });
                    })
                    .ok()?;
                Some(SourceWatchHandle::Local(handle))
            }
            promptsmith_source::Source::Git(git) => {
                let git = git.clone();
                let target_dir = sources.target_dir().to_path_buf();
                drop(sources);
                let engine = self.clone();
                let handle = git.poll(target_dir, git_polling_interval, git_max_retries, move || {
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        engine.full_reload().await;
                    });
                });
                Some(SourceWatchHandle::Git(handle))
            }
        }
    }

    fn collect_parsed(
        &self,
        root: &Path,
        registry: Option<&RegistryFile>,
        from_system_source: bool,
        errors: &mut Vec<(String, String)>,
    ) -> Vec<RankedPair> {
        let files = match self.file_cache.list(root, false) {
            Ok(files) => files,
            Err(e) => {
                errors.push((root.display().to_string(), e.to_string()));
                return Vec::new();
            }
        };

        let ctx = ParseContext {
            root,
            registry,
            engine: &self.engine,
            partials: &self.partials,
        };

        let mut out = Vec::new();
        for file in files {
            if !is_candidate(&file) {
                continue;
            }
            let group = promptsmith_prompts::group::compute_group(root, &file);
            if !should_load(&group, &self.groups.active, self.groups.system_configured, from_system_source) {
                continue;
            }
            match parse_document(&file, &ctx) {
                ParseOutcome::Parsed { runtime, compiled } => out.push((*runtime, compiled)),
                ParseOutcome::Skipped => {}
                ParseOutcome::Failed(failure) => {
                    errors.push((file.display().to_string(), failure.to_string()));
                }
            }
        }
        out
    }

    fn register_tool(&self, runtime: &PromptRuntime, compiled: CompiledTemplate) -> ToolHandle {
        let tool = tool_definition(runtime);
        let args = runtime.args.clone();
        let handler: ToolFn = Arc::new(move |call_args| render_tool_result(&compiled, &args, call_args));
        self.registry.register(runtime.id.clone(), tool, handler)
    }
}

fn snapshot_ids(snapshot: &RuntimeSnapshot) -> HashMap<String, Arc<PromptRuntime>> {
    snapshot.all().map(|r| (r.id.clone(), r.clone())).collect()
}

fn snapshot_paths(snapshot: &RuntimeSnapshot) -> HashMap<PathBuf, String> {
    snapshot
        .all()
        .map(|r| (r.file_path.clone(), r.id.clone()))
        .collect()
}

fn snapshot_handles(snapshot: &RuntimeSnapshot) -> HashMap<String, ToolHandle> {
    snapshot
        .all()
        .filter_map(|r| snapshot.handle(&r.id).map(|h| (r.id.clone(), h.clone())))
        .collect()
}

fn rank_with_templates(
    runtimes: Vec<PromptRuntime>,
    compiled: Vec<CompiledTemplate>,
) -> Vec<RankedPair> {
    let mut pairs: Vec<RankedPair> = runtimes.into_iter().zip(compiled).collect();
    pairs.sort_by(|(a, _), (b, _)| cmp_priority(a, b));
    pairs
}

/// Resolve duplicate ids among already rank-ordered `(runtime, compiled)`
/// pairs: the first occurrence of each id wins, later ones become shadows.
/// Mirrors [`dedupe_by_id`]'s semantics without unzipping the template
/// alongside each runtime.
fn dedupe_with_templates(ranked: Vec<RankedPair>) -> (Vec<RankedPair>, Vec<RankedPair>) {
    let mut seen = HashSet::new();
    let mut winners = Vec::new();
    let mut shadows = Vec::new();
    for pair in ranked {
        if seen.insert(pair.0.id.clone()) {
            winners.push(pair);
        } else {
            shadows.push(pair);
        }
    }
    (winners, shadows)
}

fn tool_definition(runtime: &PromptRuntime) -> Tool {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for (name, schema) in &runtime.args {
        properties.insert(name.clone(), arg_schema_json(schema));
        if schema.required {
            required.push(Value::String(name.clone()));
        }
    }
    let mut input_schema = Map::new();
    input_schema.insert("type".to_string(), Value::String("object".to_string()));
    input_schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        input_schema.insert("required".to_string(), Value::Array(required));
    }

    Tool::new(runtime.id.clone(), runtime.title.clone(), input_schema)
}

fn arg_schema_json(schema: &ArgSchema) -> Value {
    let type_name = match schema.arg_type {
        ArgTypeDocument::String => "string",
        ArgTypeDocument::Number => "number",
        ArgTypeDocument::Boolean => "boolean",
    };
    let mut obj = Map::new();
    obj.insert("type".to_string(), Value::String(type_name.to_string()));
    if let Some(description) = &schema.description {
        obj.insert("description".to_string(), Value::String(description.clone()));
    }
    if let Some(default) = &schema.default {
        obj.insert("default".to_string(), default.clone());
    }
    Value::Object(obj)
}

fn render_tool_result(
    compiled: &CompiledTemplate,
    args: &HashMap<String, ArgSchema>,
    call_args: Map<String, Value>,
) -> CallToolResult {
    let mut ctx = HashMap::new();
    for (name, schema) in args {
        let raw = call_args.get(name).cloned();
        let value = match raw {
            Some(v) => match coerce_value(schema, &v) {
                Ok(v) => v,
                Err(e) => return CallToolResult::error(vec![Content::text(e)]),
            },
            None => match &schema.default {
                Some(default) => default.clone(),
                None if schema.required => {
                    return CallToolResult::error(vec![Content::text(format!(
                        "missing required argument '{name}'"
                    ))])
                }
                None => Value::Null,
            },
        };
        ctx.insert(name.clone(), value);
    }
    match compiled.render(&ctx) {
        Ok(text) => CallToolResult::success(vec![Content::text(text)]),
        Err(e) => CallToolResult::error(vec![Content::text(e.to_string())]),
    }
}

fn load_registry(root: &Path) -> Option<RegistryFile> {
    let path = root.join("registry.yaml");
    let body = std::fs::read_to_string(path).ok()?;
    match RegistryFile::parse(&body) {
        Ok(registry) => Some(registry),
        Err(e) => {
            warn!(error = %e, "registry.yaml ill-formed, treating as absent");
            None
        }
    }
}

