// Tool abstractions for agent execution
//
// Tools represent named, schema-validated capabilities an agent can invoke
// during execution (e.g., a reference-data lookup or a generation call).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;

/// Tool parameters schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameters {
    /// Type (always "object" for tool parameters)
    #[serde(rename = "type")]
    pub param_type: String,
    /// Property definitions
    pub properties: HashMap<String, ToolPropertySchema>,
    /// Required property names
    pub required: Vec<String>,
}

impl ToolParameters {
    /// Create a new tool parameters schema
    pub fn new() -> Self {
        Self { param_type: "object".to_string(), properties: HashMap::new(), required: Vec::new() }
    }

    /// Add a property to the schema
    #[must_use]
    pub fn add_property(
        mut self,
        name: impl Into<String>,
        property_type: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            ToolPropertySchema {
                property_type: property_type.into(),
                description: description.into(),
            },
        );
        if required {
            self.required.push(name);
        }
        self
    }

    /// Checks the schema itself is well-formed: every required property is
    /// declared and every property type is a known JSON type.
    ///
    /// # Errors
    /// Returns a description of the first contract violation found.
    pub fn check_contract(&self) -> std::result::Result<(), String> {
        for name in &self.required {
            if !self.properties.contains_key(name) {
                return Err(format!("required property '{name}' is not declared"));
            }
        }
        for (name, schema) in &self.properties {
            if !matches!(
                schema.property_type.as_str(),
                "string" | "number" | "boolean" | "object" | "array"
            ) {
                return Err(format!(
                    "property '{name}' has unknown type '{}'",
                    schema.property_type
                ));
            }
        }
        Ok(())
    }

    /// Validates an argument object against this schema.
    ///
    /// # Errors
    /// Returns a description of the first violation: missing required
    /// property or a value of the wrong JSON type.
    pub fn validate_args(&self, args: &Value) -> std::result::Result<(), String> {
        let object = args
            .as_object()
            .ok_or_else(|| "arguments must be a JSON object".to_string())?;

        for name in &self.required {
            if !object.contains_key(name) {
                return Err(format!("missing required property '{name}'"));
            }
        }

        for (name, value) in object {
            if let Some(schema) = self.properties.get(name) {
                let matches = match schema.property_type.as_str() {
                    "string" => value.is_string(),
                    "number" => value.is_number(),
                    "boolean" => value.is_boolean(),
                    "object" => value.is_object(),
                    "array" => value.is_array(),
                    _ => false,
                };
                if !matches {
                    return Err(format!(
                        "property '{name}' expected type '{}'",
                        schema.property_type
                    ));
                }
            }
        }

        Ok(())
    }
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self::new()
    }
}

/// Tool property schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPropertySchema {
    /// Property type
    #[serde(rename = "type")]
    pub property_type: String,
    /// Property description
    pub description: String,
}

/// Arguments passed to tool handler
#[derive(Debug, Clone)]
pub struct ToolArguments {
    /// Parsed arguments as JSON value
    pub args: Value,
}

impl ToolArguments {
    /// Create new tool arguments
    pub fn new(args: Value) -> Self {
        Self { args }
    }

    /// Get argument as string
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.args.get(key)?.as_str().map(str::to_string)
    }

    /// Get argument as i64
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.args.get(key)?.as_i64()
    }

    /// Get argument as bool
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.args.get(key)?.as_bool()
    }

    /// Get argument as object
    pub fn get_object(&self, key: &str) -> Option<&serde_json::Map<String, Value>> {
        self.args.get(key)?.as_object()
    }
}

/// Result from tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether execution succeeded
    pub success: bool,
    /// Output from the tool
    pub output: Value,
    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(output: Value) -> Self {
        Self { success: true, output, metadata: HashMap::new() }
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::String(message.into()),
            metadata: HashMap::new(),
        }
    }

    /// Add metadata to the result
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Handler for tool execution
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with given arguments
    ///
    /// # Arguments
    /// * `args` - Tool arguments, already validated against the schema
    ///
    /// # Returns
    /// Result of tool execution
    async fn execute(&self, args: &ToolArguments) -> Result<ToolResult>;
}

/// Tool definition
#[derive(Clone)]
pub struct Tool {
    /// Tool name (unique within a registry)
    pub name: String,
    /// Tool description
    pub description: String,
    /// Parameter schema
    pub parameters: ToolParameters,
    /// Handler for executing the tool
    pub handler: Arc<dyn ToolHandler>,
}

impl Tool {
    /// Create a new tool
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self { name: name.into(), description: description.into(), parameters, handler }
    }
}

// Implement Debug manually since Arc<dyn ToolHandler> doesn't implement Debug
impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("handler", &"<handler>")
            .finish()
    }
}
