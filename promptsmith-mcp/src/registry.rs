//! The dynamic tool registry. Realises the dual-swap contract from the
//! reload engine: a `register` of an id already present makes the new
//! handler the one served to clients immediately, while the previous handle
//! stays valid until its own, separate `remove()` is called.

use std::sync::Arc;

use dashmap::DashMap;
use rmcp::model::{CallToolResult, Tool};

/// A registered tool's callable body: render its template against coerced
/// arguments and produce a tool result.
pub type ToolFn = Arc<dyn Fn(serde_json::Map<String, serde_json::Value>) -> CallToolResult + Send + Sync>;

struct Registration {
    generation: u64,
    tool: Tool,
    handler: ToolFn,
}

/// A scoped reference to one registered slot. `remove()` only takes effect
/// if the slot still holds the generation this handle was issued for —
/// a later `register()` of the same id bumps the generation, so a stale
/// handle's `remove()` becomes a no-op instead of deleting the live entry.
#[derive(Clone)]
pub struct ToolHandle {
    registry: Arc<RmcpToolRegistry>,
    id: String,
    generation: u64,
}

impl std::fmt::Debug for ToolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolHandle")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .finish()
    }
}

impl ToolHandle {
    /// Remove this registration, but only if it is still the live one for
    /// its id (i.e. no later `register()` has superseded it).
    pub fn remove(&self) {
        self.registry.entries.remove_if(&self.id, |_, entry| {
            entry.generation == self.generation
        });
    }
}

/// Generation-counted, concurrently-readable tool registry.
#[derive(Default)]
pub struct RmcpToolRegistry {
    entries: DashMap<String, Registration>,
    next_generation: std::sync::atomic::AtomicU64,
}

impl RmcpToolRegistry {
    /// An empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register (or replace) the tool for `id`. The returned handle's
    /// `remove()` only deletes this exact registration — a subsequent
    /// `register` of the same id is unaffected by it.
    pub fn register(self: &Arc<Self>, id: impl Into<String>, tool: Tool, handler: ToolFn) -> ToolHandle {
        let id = id.into();
        let generation = self
            .next_generation
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.entries.insert(
            id.clone(),
            Registration {
                generation,
                tool,
                handler,
            },
        );
        ToolHandle {
            registry: self.clone(),
            id,
            generation,
        }
    }

    /// Look up the live tool + handler for an id.
    pub fn get(&self, id: &str) -> Option<(Tool, ToolFn)> {
        self.entries.get(id).map(|e| (e.tool.clone(), e.handler.clone()))
    }

    /// Snapshot of every currently-registered `Tool` definition, for
    /// `list_tools`.
    pub fn list(&self) -> Vec<Tool> {
        self.entries.iter().map(|e| e.tool.clone()).collect()
    }

    /// Number of currently-registered tools.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::Content;

    fn tool(name: &str) -> Tool {
        Tool::new(name.to_string(), "test tool", serde_json::Map::new())
    }

    fn handler() -> ToolFn {
        Arc::new(|_args| CallToolResult::success(vec![Content::text("ok")]))
    }

    #[test]
    fn replacing_a_registration_bumps_generation() {
        let registry = RmcpToolRegistry::new();
        let first = registry.register("a", tool("a"), handler());
        let _second = registry.register("a", tool("a-v2"), handler());

        assert_eq!(registry.len(), 1);
        let (live, _) = registry.get("a").unwrap();
        assert_eq!(live.name, "a-v2");

        // Stale handle's remove() must not delete the live registration.
        first.remove();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_deletes_the_still_live_registration() {
        let registry = RmcpToolRegistry::new();
        let handle = registry.register("a", tool("a"), handler());
        handle.remove();
        assert!(registry.get("a").is_none());
    }

    #[test]
    fn list_reflects_current_registrations() {
        let registry = RmcpToolRegistry::new();
        registry.register("a", tool("a"), handler());
        registry.register("b", tool("b"), handler());
        assert_eq!(registry.list().len(), 2);
    }
}
