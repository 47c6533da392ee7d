//! Structural validation of model output with single-shot repair.
//!
//! A `ResponseSchema` declares the top-level shape a generated JSON document
//! must have. When a document fails validation, the engine re-invokes the
//! model once with the malformed output and an explicit repair instruction;
//! a second failure is terminal for that attempt.

use crate::error::{OrchestratorError, Result};
use crate::executor::ExecutionContext;
use serde_json::Value;
use tracing::{debug, warn};
use vantage_abstraction::ModelParameters;

/// JSON type a response field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// JSON string.
    String,
    /// JSON number.
    Number,
    /// JSON boolean.
    Boolean,
    /// JSON object.
    Object,
    /// JSON array.
    Array,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
        }
    }
}

#[derive(Debug, Clone)]
struct ResponseField {
    name: String,
    kind: FieldKind,
    required: bool,
}

/// Declared top-level shape of a generated JSON document.
#[derive(Debug, Clone, Default)]
pub struct ResponseSchema {
    fields: Vec<ResponseField>,
}

impl ResponseSchema {
    /// Creates an empty schema (accepts any JSON object).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a top-level field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind, required: bool) -> Self {
        self.fields.push(ResponseField { name: name.into(), kind, required });
        self
    }

    /// Validates a value against the schema.
    ///
    /// # Errors
    /// Returns every violation found, one message per field.
    pub fn validate(&self, value: &Value) -> std::result::Result<(), Vec<String>> {
        let Some(object) = value.as_object() else {
            return Err(vec!["expected a JSON object at the top level".to_string()]);
        };

        let mut violations = Vec::new();
        for field in &self.fields {
            match object.get(&field.name) {
                Some(value) if field.kind.matches(value) => {}
                Some(_) => violations.push(format!(
                    "field '{}' must be a {}",
                    field.name,
                    field.kind.name()
                )),
                None if field.required => {
                    violations.push(format!("missing required field '{}'", field.name));
                }
                None => {}
            }
        }

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Human-readable description of the expected shape, for repair prompts.
    #[must_use]
    pub fn describe(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|f| {
                format!(
                    "\"{}\" ({}{})",
                    f.name,
                    f.kind.name(),
                    if f.required { ", required" } else { "" }
                )
            })
            .collect();
        format!("JSON object with fields: {}", fields.join(", "))
    }
}

/// Strips a Markdown code fence from model output, if present.
#[must_use]
pub fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parses and validates model output, repairing it at most once.
///
/// # Errors
/// Returns `OrchestratorError::Validation` when the output still fails after
/// the single repair attempt, or a model error if the repair call fails.
pub async fn validate_and_repair(
    schema: &ResponseSchema,
    raw: &str,
    context: &ExecutionContext,
) -> Result<Value> {
    match parse_and_check(schema, raw) {
        Ok(value) => Ok(value),
        Err(first_failure) => {
            warn!(failure = %first_failure, "Model output failed validation, attempting repair");

            let repair_prompt = format!(
                "The following output is malformed or does not match the expected \
                 structure ({}):\n\n{}\n\nProblem: {}\n\nReturn only the corrected JSON, \
                 with no explanation.",
                schema.describe(),
                raw,
                first_failure
            );

            let repaired = context
                .generate(&repair_prompt, Some(ModelParameters::json()))
                .await?;

            match parse_and_check(schema, &repaired.content) {
                Ok(value) => {
                    debug!("Repair attempt produced a valid document");
                    Ok(value)
                }
                Err(second_failure) => Err(OrchestratorError::Validation(format!(
                    "output invalid after repair attempt: {second_failure}"
                ))),
            }
        }
    }
}

fn parse_and_check(schema: &ResponseSchema, raw: &str) -> std::result::Result<Value, String> {
    let value: Value = serde_json::from_str(extract_json(raw))
        .map_err(|e| format!("invalid JSON: {e}"))?;
    schema.validate(&value).map_err(|violations| violations.join("; "))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ResponseSchema {
        ResponseSchema::new()
            .field("summary", FieldKind::String, true)
            .field("score", FieldKind::Number, true)
            .field("notes", FieldKind::Array, false)
    }

    #[test]
    fn test_validate_accepts_conforming_document() {
        let value = json!({"summary": "ok", "score": 7, "notes": []});
        assert!(schema().validate(&value).is_ok());
    }

    #[test]
    fn test_validate_reports_missing_required() {
        let value = json!({"summary": "ok"});
        let violations = schema().validate(&value).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("score"));
    }

    #[test]
    fn test_validate_reports_wrong_type() {
        let value = json!({"summary": "ok", "score": "seven"});
        let violations = schema().validate(&value).unwrap_err();
        assert!(violations[0].contains("number"));
    }

    #[test]
    fn test_validate_optional_field_may_be_absent() {
        let value = json!({"summary": "ok", "score": 1});
        assert!(schema().validate(&value).is_ok());
    }

    #[test]
    fn test_validate_rejects_non_object() {
        assert!(schema().validate(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_extract_json_strips_fences() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("  {\"a\": 1}  "), "{\"a\": 1}");
    }
}
