//! The `id -> runtime`, `file path -> id`, and `id -> tool handle` indices
//! that the reload engine publishes atomically on every completed reload.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use promptsmith_prompts::PromptRuntime;

use crate::registry::ToolHandle;

/// One immutable snapshot of the runtime state, published wholesale by the
/// reload engine. Readers hold an `Arc` clone and never observe a mixed
/// pre-/post-reload view.
#[derive(Debug, Default, Clone)]
pub struct RuntimeSnapshot {
    by_id: HashMap<String, Arc<PromptRuntime>>,
    by_path: HashMap<PathBuf, String>,
    handles: HashMap<String, ToolHandle>,
}

impl RuntimeSnapshot {
    /// Build a snapshot from its three indices.
    pub fn new(
        by_id: HashMap<String, Arc<PromptRuntime>>,
        by_path: HashMap<PathBuf, String>,
        handles: HashMap<String, ToolHandle>,
    ) -> Self {
        Self {
            by_id,
            by_path,
            handles,
        }
    }

    /// Look up a runtime record by id.
    pub fn get(&self, id: &str) -> Option<&Arc<PromptRuntime>> {
        self.by_id.get(id)
    }

    /// Look up the id registered for a given source file.
    pub fn id_for_path(&self, path: &std::path::Path) -> Option<&str> {
        self.by_path.get(path).map(String::as_str)
    }

    /// The tool handle registered for an id, if any (absent for
    /// `warning`/`invalid`/`disabled` states).
    pub fn handle(&self, id: &str) -> Option<&ToolHandle> {
        self.handles.get(id)
    }

    /// All runtime records, in no particular order.
    pub fn all(&self) -> impl Iterator<Item = &Arc<PromptRuntime>> {
        self.by_id.values()
    }

    /// Total record count.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the snapshot holds no records.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Holds the current [`RuntimeSnapshot`] behind a lock, swapped atomically
/// by the reload engine at the end of a reload.
#[derive(Default)]
pub struct RuntimeStateStore {
    current: std::sync::RwLock<Arc<RuntimeSnapshot>>,
}

impl RuntimeStateStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot, cheap to clone (an `Arc` bump).
    pub fn snapshot(&self) -> Arc<RuntimeSnapshot> {
        self.current.read().expect("runtime state lock poisoned").clone()
    }

    /// Replace the snapshot wholesale. Readers in flight keep their old
    /// `Arc` clone; new readers see the replacement immediately.
    pub fn publish(&self, snapshot: RuntimeSnapshot) {
        *self.current.write().expect("runtime state lock poisoned") = Arc::new(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_replaces_snapshot_wholesale() {
        let store = RuntimeStateStore::new();
        assert!(store.snapshot().is_empty());

        let mut by_id = HashMap::new();
        by_id.insert(
            "a".to_string(),
            Arc::new(PromptRuntime {
                id: "a".to_string(),
                title: "A".to_string(),
                version: promptsmith_prompts::Version::ZERO,
                status: promptsmith_prompts::Status::Stable,
                tags: Vec::new(),
                use_cases: Vec::new(),
                runtime_state: promptsmith_prompts::RuntimeStateKind::Active,
                source: promptsmith_prompts::SourceKind::Embedded,
                group: "root".to_string(),
                visibility: None,
                file_path: PathBuf::from("a.yaml"),
                args: HashMap::new(),
                warnings: Vec::new(),
            }),
        );
        store.publish(RuntimeSnapshot::new(by_id, HashMap::new(), HashMap::new()));

        assert_eq!(store.snapshot().len(), 1);
        assert!(store.snapshot().get("a").is_some());
    }
}
