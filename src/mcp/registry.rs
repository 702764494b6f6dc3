//! Unified tool catalog with name-based session routing.

use std::collections::HashMap;

use tracing::warn;

use crate::types::ToolDescriptor;

use super::session::SessionId;

/// Reserved exit tool: the model signals the task is done.
pub const TASK_COMPLETE: &str = "task_complete";
/// Reserved exit tool: the model hands control back with a question.
pub const ASK_QUESTION: &str = "ask_question";

/// Reserved tool names recognized by the loop and never dispatched to a
/// session.
pub const EXIT_TOOLS: [&str; 2] = [TASK_COMPLETE, ASK_QUESTION];

/// Whether a tool name is one of the reserved exit tools.
pub fn is_exit_tool(name: &str) -> bool {
    EXIT_TOOLS.contains(&name)
}

/// Descriptors for the reserved exit tools, in fixed order.
pub fn exit_tool_descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::no_args(
            TASK_COMPLETE,
            "Call this tool when the task given by the user is complete",
        ),
        ToolDescriptor::no_args(
            ASK_QUESTION,
            "Ask a question to the user to get more info required to solve or clarify their problem",
        ),
    ]
}

/// Unifies tool descriptors from all connected providers into one
/// addressable catalog.
///
/// Registration order is the catalog order; the reserved exit tools are
/// appended at the tail of every `catalog()` snapshot, independent of any
/// provider. Lives for the whole agent session; there is no removal.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<ToolDescriptor>,
    routes: HashMap<String, SessionId>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite the name -> session mapping.
    ///
    /// A later registration for an existing name silently replaces the
    /// earlier one; the catalog slot is reused so ordering stays stable.
    pub fn register(&mut self, descriptor: ToolDescriptor, session: SessionId) {
        let name = descriptor.name.clone();
        match self.index.get(&name) {
            Some(&slot) => {
                warn!(tool = %name, "duplicate tool registration; later session wins");
                self.entries[slot] = descriptor;
            }
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push(descriptor);
            }
        }
        self.routes.insert(name, session);
    }

    /// Resolve a tool name to its owning session.
    pub fn lookup(&self, name: &str) -> Option<SessionId> {
        self.routes.get(name).copied()
    }

    /// The full catalog used for generation: provider tools in registration
    /// order, then the reserved exit tools.
    pub fn catalog(&self) -> Vec<ToolDescriptor> {
        let mut catalog = self.entries.clone();
        catalog.extend(exit_tool_descriptors());
        catalog
    }

    /// Number of provider-registered tools (exit tools excluded).
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
    use serde_json::json;

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(
            name,
            format!("{name} description"),
            json!({ "type": "object", "properties": { "q": { "type": "string" } } }),
        )
    }

    #[test]
    fn catalog_keeps_registration_order_with_exit_tools_at_tail() {
        let mut registry = ToolRegistry::new();
        registry.register(descriptor("a"), SessionId(0));
        registry.register(descriptor("b"), SessionId(1));
        registry.register(descriptor("c"), SessionId(2));

        let names: Vec<String> = registry.catalog().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["a", "b", "c", TASK_COMPLETE, ASK_QUESTION]);
    }

    #[test]
    fn later_registration_silently_wins() {
        let mut registry = ToolRegistry::new();
        registry.register(descriptor("x"), SessionId(0));
        registry.register(descriptor("x"), SessionId(1));

        assert_eq!(registry.lookup("x"), Some(SessionId(1)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_misses_return_none() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.lookup("missing"), None);
    }

    #[test]
    fn exit_tools_are_recognized_by_name_only() {
        assert!(is_exit_tool(TASK_COMPLETE));
        assert!(is_exit_tool(ASK_QUESTION));
        assert!(!is_exit_tool("task_completed"));

        // Present in the catalog even with no providers connected.
        let registry = ToolRegistry::new();
        let catalog = registry.catalog();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].name, TASK_COMPLETE);
        assert_eq!(catalog[1].name, ASK_QUESTION);
    }
}
