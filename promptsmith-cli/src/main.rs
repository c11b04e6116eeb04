//! `promptsmith` binary: loads configuration, syncs the configured sources,
//! builds the reload engine and its registries, then serves the MCP
//! `ServerHandler` over the configured transport until a shutdown signal
//! arrives.

mod exit_codes;
mod logging;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use promptsmith_common::FileCache;
use promptsmith_config::{Settings, TransportType};
use promptsmith_mcp::{GroupConfig, PromptsmithHandler, ReloadEngine, RmcpToolRegistry, RuntimeStateStore};
use promptsmith_source::SourceManager;
use promptsmith_templating::{PartialRegistry, TemplateEngine};
use rmcp::transport::io::stdio;
use rmcp::ServiceExt;
use tracing::{error, info, warn};

use exit_codes::{EXIT_ERROR, EXIT_SUCCESS};

#[tokio::main]
async fn main() {
    let code = run().await;
    std::process::exit(code);
}

async fn run() -> i32 {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return EXIT_ERROR;
        }
    };

    logging::init(&settings);

    if !matches!(settings.transport_type, TransportType::Stdio) {
        error!(transport = ?settings.transport_type, "only stdio transport is implemented");
        return EXIT_ERROR;
    }

    let mut source_manager = SourceManager::new(
        settings.prompt_sources.iter().map(|s| (s.priority, s.url.clone())),
        settings.system_repo_url.clone(),
        settings.storage_dir.clone(),
        &settings.git_branch,
        settings.git_max_retries,
    );

    let load_report = match source_manager.initial_load() {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "no configured source could be loaded");
            return EXIT_ERROR;
        }
    };
    info!(url = %load_report.active_url, system_synced = load_report.system_synced, "initial source load complete");
    for (url, message) in &load_report.warnings {
        warn!(url, message, "source warning during initial load");
    }

    let mut active_groups: HashSet<String> = settings.mcp_groups.clone();
    let system_configured = settings.system_repo_url.is_some();
    if system_configured {
        active_groups.insert("common".to_string());
    }
    let groups = GroupConfig {
        active: active_groups,
        system_configured,
    };

    let file_cache = Arc::new(FileCache::new(Duration::from_secs(300)));
    let engine = Arc::new(ReloadEngine::new(
        source_manager,
        groups,
        TemplateEngine::new(),
        Arc::new(PartialRegistry::new()),
        file_cache.clone(),
        RmcpToolRegistry::new(),
        Arc::new(RuntimeStateStore::new()),
    ));

    let initial = engine.full_reload().await;
    info!(loaded = initial.loaded, errors = initial.errors.len(), "initial reload complete");

    let _sweeper = settings
        .cache_cleanup_interval_ms
        .map(|ms| file_cache.start_sweeper(Duration::from_millis(ms), None));

    let _watch_handle = if settings.watch_mode {
        engine
            .start_watching(
                Duration::from_millis(settings.git_polling_interval_ms),
                settings.git_max_retries,
            )
            .await
    } else {
        None
    };

    let registry_enabled = settings.storage_dir.join("registry.yaml").exists();
    let handler = PromptsmithHandler::new(engine.clone(), settings.storage_dir.clone(), registry_enabled);

    let running_service = match handler.serve(stdio()).await {
        Ok(service) => {
            info!("promptsmith MCP server started on stdio");
            service
        }
        Err(e) => {
            error!(error = %e, "failed to start MCP server");
            return EXIT_ERROR;
        }
    };

    tokio::select! {
        result = running_service.waiting() => {
            match result {
                Ok(reason) => info!(?reason, "MCP server stopped"),
                Err(e) => {
                    error!(error = %e, "MCP server task error");
                    return EXIT_ERROR;
                }
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, waiting for in-flight reload to finish");
            engine.wait_for_idle().await;
        }
    }

    info!("promptsmith shutting down gracefully");
    EXIT_SUCCESS
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
