//! Tool registration and lookup.

use crate::error::ToolExecError;
use qorch_core::{ToolDefinition, ToolHandler};
use std::collections::HashMap;
use std::sync::Arc;

struct Entry {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
    schema: jsonschema::JSONSchema,
}

pub struct ToolRegistry {
    tools: HashMap<String, Entry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Registers a tool, compiling its argument schema once up front so
    /// validation on the hot path never re-parses it.
    pub fn register(&mut self, definition: ToolDefinition, handler: Arc<dyn ToolHandler>) {
        let schema = jsonschema::JSONSchema::compile(&definition.argument_schema)
            .expect("tool argument schema must be a valid JSON Schema");
        let name = definition.name.clone();
        self.tools.insert(name, Entry { definition, handler, schema });
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|e| &e.definition)
    }

    pub fn handler(&self, name: &str) -> Result<Arc<dyn ToolHandler>, ToolExecError> {
        self.tools
            .get(name)
            .map(|e| e.handler.clone())
            .ok_or_else(|| ToolExecError::NotFound(name.to_string()))
    }

    pub fn validate_arguments(&self, name: &str, arguments: &serde_json::Value) -> Result<(), ToolExecError> {
        let entry = self.tools.get(name).ok_or_else(|| ToolExecError::NotFound(name.to_string()))?;
        entry
            .schema
            .validate(arguments)
            .map_err(|errors| ToolExecError::Validation(errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ")))
    }

    pub fn list(&self) -> Vec<&ToolDefinition> {
        self.tools.values().map(|e| &e.definition).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
