//! Tool capability contract - trait, registry, confirmation types, and
//! argument validation.

pub mod confirmation;
pub mod contract;

pub use confirmation::{
    AllowlistStore, ConfirmationDetails, ConfirmationOutcome, ConfirmationPayload, ModifyContext,
    render_unified_diff,
};
pub use contract::{ConfirmFut, OutputChunk, Tool, ToolCtx, ToolFut};

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// Error types for tool lookup, validation, and execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool \"{name}\" not found in registry")]
    NotFound { name: String },
    #[error("Bad tool args: {message}")]
    BadArgs { message: String },
    #[error("Tool execution failed: {tool}: {message}")]
    ExecutionFailed { tool: String, message: String },
    #[error("Duplicate tool registered: {name}")]
    DuplicateTool { name: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Model-facing description of one registered tool.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub schema: Value,
}

/// Read-only lookup table of registered tools.
///
/// The scheduler only ever reads from the registry; registration happens
/// once at session setup.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateTool { name });
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                display_name: tool.display_name().to_string(),
                description: tool.description().to_string(),
                schema: tool.schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

/// Validate arguments against a JSON schema.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| ToolError::BadArgs {
        message: format!("Invalid tool schema: {e}"),
    })?;
    if let Err(err) = validator.validate(args) {
        return Err(ToolError::BadArgs {
            message: err.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};

    use super::{Tool, ToolError, ToolFut, ToolRegistry, validate_args};
    use crate::contract::ToolCtx;

    struct NamedTool(&'static str);

    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }
        fn display_name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn execute<'a>(&'a self, _args: Value, _ctx: &'a mut ToolCtx) -> ToolFut<'a> {
            Box::pin(std::future::ready(Ok(crucible_types::ToolResult::text(
                "ok",
            ))))
        }
    }

    #[test]
    fn registry_rejects_duplicate_names() {
        let mut registry = ToolRegistry::default();
        registry.register(Arc::new(NamedTool("read"))).unwrap();
        let err = registry.register(Arc::new(NamedTool("read"))).unwrap_err();
        assert!(matches!(err, ToolError::DuplicateTool { .. }));
    }

    #[test]
    fn registry_lookup_misses_unknown_tool() {
        let registry = ToolRegistry::default();
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn definitions_sorted_by_name() {
        let mut registry = ToolRegistry::default();
        registry.register(Arc::new(NamedTool("zeta"))).unwrap();
        registry.register(Arc::new(NamedTool("alpha"))).unwrap();
        let names: Vec<String> = registry
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn validate_args_accepts_matching_object() {
        let schema = json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"],
        });
        assert!(validate_args(&schema, &json!({"path": "a.txt"})).is_ok());
    }

    #[test]
    fn validate_args_reports_schema_violation() {
        let schema = json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"],
        });
        let err = validate_args(&schema, &json!({})).unwrap_err();
        assert!(matches!(err, ToolError::BadArgs { .. }));
    }

    #[test]
    fn not_found_message_names_registry() {
        let err = ToolError::NotFound {
            name: "fetch".to_string(),
        };
        assert_eq!(err.to_string(), "Tool \"fetch\" not found in registry");
    }
}
