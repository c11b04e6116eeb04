use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use promptsmith_common::FileCache;
use promptsmith_mcp::{GroupConfig, ReloadEngine, RmcpToolRegistry, RuntimeStateStore};
use promptsmith_source::SourceManager;
use promptsmith_templating::{PartialRegistry, TemplateEngine};
use tempfile::TempDir;

fn metadata_prompt(id: &str, status: &str, version: &str) -> String {
    format!(
        "id: {id}\ntitle: {id} title\nstatus: {status}\nversion: {version}\ntemplate: \"hello {{{{name}}}}\"\nargs:\n  name:\n    type: string\n    required: true\n"
    )
}

fn legacy_prompt(id: &str) -> String {
    format!("id: {id}\ntitle: {id} title\ntemplate: \"hi there\"\n")
}

fn engine_over(main_root: &std::path::Path) -> ReloadEngine {
    let sources = SourceManager::new(
        vec![(0, main_root.display().to_string())],
        None,
        main_root.to_path_buf(),
        "main",
        1,
    );
    let groups = GroupConfig {
        active: HashSet::new(),
        system_configured: false,
    };
    ReloadEngine::new(
        sources,
        groups,
        TemplateEngine::new(),
        Arc::new(PartialRegistry::new()),
        Arc::new(FileCache::new(Duration::from_secs(60))),
        RmcpToolRegistry::new(),
        Arc::new(RuntimeStateStore::new()),
    )
}

fn engine_over_with_system(main_root: &std::path::Path, system_root: &std::path::Path) -> ReloadEngine {
    let sources = SourceManager::new(
        vec![(0, main_root.display().to_string())],
        Some(system_root.display().to_string()),
        main_root.to_path_buf(),
        "main",
        1,
    );
    let groups = GroupConfig {
        active: HashSet::new(),
        system_configured: true,
    };
    ReloadEngine::new(
        sources,
        groups,
        TemplateEngine::new(),
        Arc::new(PartialRegistry::new()),
        Arc::new(FileCache::new(Duration::from_secs(60))),
        RmcpToolRegistry::new(),
        Arc::new(RuntimeStateStore::new()),
    )
}

#[tokio::test]
async fn full_reload_registers_an_active_metadata_prompt_as_a_tool() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("greet.yaml"), metadata_prompt("greet", "stable", "1.0.0")).unwrap();

    let engine = engine_over(root.path());
    engine.initial_load().await.unwrap();

    let report = engine.full_reload().await;
    assert_eq!(report.loaded, 1);
    assert!(report.errors.is_empty());
    assert_eq!(engine.registry().len(), 1);
    assert!(engine.registry().get("greet").is_some());
    assert_eq!(engine.state().snapshot().len(), 1);
}

#[tokio::test]
async fn full_reload_leaves_legacy_prompt_registered() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("old.yaml"), legacy_prompt("old")).unwrap();

    let engine = engine_over(root.path());
    engine.initial_load().await.unwrap();

    engine.full_reload().await;
    assert!(engine.registry().get("old").is_some());
}

#[tokio::test]
async fn user_source_wins_over_system_source_on_duplicate_id() {
    let main_root = TempDir::new().unwrap();
    let system_root = TempDir::new().unwrap();
    std::fs::write(
        main_root.path().join("shared.yaml"),
        metadata_prompt("shared", "stable", "2.0.0"),
    )
    .unwrap();
    std::fs::write(
        system_root.path().join("shared.yaml"),
        metadata_prompt("shared", "stable", "1.0.0"),
    )
    .unwrap();

    let engine = engine_over_with_system(main_root.path(), system_root.path());
    engine.initial_load().await.unwrap();

    engine.full_reload().await;
    let snapshot = engine.state().snapshot();
    let runtime = snapshot.get("shared").unwrap();
    assert_eq!(runtime.version.to_string(), "2.0.0");
}

#[tokio::test]
async fn single_reload_updates_one_tool_without_touching_others() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("a.yaml"), metadata_prompt("a", "stable", "1.0.0")).unwrap();
    std::fs::write(root.path().join("b.yaml"), metadata_prompt("b", "stable", "1.0.0")).unwrap();

    let engine = engine_over(root.path());
    engine.initial_load().await.unwrap();
    engine.full_reload().await;
    assert_eq!(engine.registry().len(), 2);

    std::fs::write(root.path().join("a.yaml"), metadata_prompt("a", "stable", "2.0.0")).unwrap();
    let path = root.path().join("a.yaml");
    engine.single_reload(&path).await;

    assert_eq!(engine.registry().len(), 2);
    let snapshot = engine.state().snapshot();
    let runtime = snapshot.get("a").unwrap();
    assert_eq!(runtime.version.to_string(), "2.0.0");
}

#[tokio::test]
async fn single_reload_removes_tool_on_file_deletion() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("gone.yaml");
    std::fs::write(&path, metadata_prompt("gone", "stable", "1.0.0")).unwrap();

    let engine = engine_over(root.path());
    engine.initial_load().await.unwrap();
    engine.full_reload().await;
    assert!(engine.registry().get("gone").is_some());

    std::fs::remove_file(&path).unwrap();
    engine.single_reload(&path).await;
    assert!(engine.registry().get("gone").is_none());
}

#[tokio::test]
async fn eligible_duplicate_registers_even_when_a_higher_ranked_duplicate_is_ineligible() {
    // `warn.yaml` outranks `ok.yaml` on status+version, but an undeclared
    // partial reference demotes it to runtime_state=warning, which is
    // ineligible for tool registration. The ranker/dedupe pass must not let
    // the ineligible entry win the `dup` id slot and shadow the eligible one.
    let root = TempDir::new().unwrap();
    std::fs::write(
        root.path().join("ok.yaml"),
        metadata_prompt("dup", "draft", "1.0.0"),
    )
    .unwrap();
    std::fs::write(
        root.path().join("warn.yaml"),
        "id: dup\ntitle: dup title\nstatus: stable\nversion: 2.0.0\ntemplate: \"{{> missing }}\"\n",
    )
    .unwrap();

    let engine = engine_over(root.path());
    engine.initial_load().await.unwrap();

    engine.full_reload().await;
    assert!(engine.registry().get("dup").is_some());
    let snapshot = engine.state().snapshot();
    assert_eq!(snapshot.get("dup").unwrap().version.to_string(), "1.0.0");
}

#[tokio::test]
async fn concurrent_full_reload_calls_coalesce() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("c.yaml"), metadata_prompt("c", "stable", "1.0.0")).unwrap();

    let engine = Arc::new(engine_over(root.path()));
    engine.initial_load().await.unwrap();

    let (a, b) = tokio::join!(engine.full_reload(), engine.full_reload());
    assert_eq!(a.loaded, 1);
    assert_eq!(b.loaded, 1);
}
