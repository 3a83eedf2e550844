//! JSON-Schema compilation and validation.

use anyhow::{Context, Result};
use jsonschema::Validator;
use serde_json::Value;
use tracing::warn;

/// A compiled JSON-Schema document, ready for repeated validation.
pub struct CompiledSchema {
    validator: Validator,
}

impl CompiledSchema {
    pub fn compile(schema: &Value) -> Result<Self> {
        let validator = jsonschema::validator_for(schema).context("failed to compile schema")?;
        Ok(Self { validator })
    }

    pub fn is_valid(&self, value: &Value) -> bool {
        self.validator.is_valid(value)
    }

    /// Collects every validation error message. Empty iff `is_valid` would be true.
    pub fn errors(&self, value: &Value) -> Vec<String> {
        self.validator
            .iter_errors(value)
            .map(|e| e.to_string())
            .collect()
    }
}

/// Validates `value` against `schema`, returning `Ok(())` or the list of schema
/// violations. Callers decide whether a failure is fatal (input) or a logged
/// warning (output).
pub fn validate(schema: &Value, value: &Value) -> Result<Result<(), Vec<String>>> {
    let compiled = CompiledSchema::compile(schema)?;
    let errors = compiled.errors(value);
    if errors.is_empty() {
        Ok(Ok(()))
    } else {
        Ok(Err(errors))
    }
}

/// Validates a tool's output against its declared output schema.
/// Output-schema mismatches are never fatal — they're logged and the output is
/// still returned to the caller.
pub fn validate_output_non_fatal(tool: &str, schema: &Value, value: &Value) {
    match validate(schema, value) {
        Ok(Ok(())) => {}
        Ok(Err(errors)) => {
            warn!(tool, ?errors, "tool output failed schema validation (non-fatal)");
        }
        Err(e) => {
            warn!(tool, error = %e, "failed to compile output schema (non-fatal)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_input_passes() {
        let schema = json!({
            "type": "object",
            "required": ["company_name"],
            "properties": { "company_name": { "type": "string" } }
        });
        let value = json!({"company_name": "TechCorp UAE"});
        assert!(validate(&schema, &value).unwrap().is_ok());
    }

    #[test]
    fn missing_required_field_fails() {
        let schema = json!({
            "type": "object",
            "required": ["company_name"],
            "properties": { "company_name": { "type": "string" } }
        });
        let value = json!({});
        let errors = validate(&schema, &value).unwrap().unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn wrong_type_fails() {
        let schema = json!({"type": "object", "properties": {"size": {"type": "integer"}}});
        let value = json!({"size": "not-a-number"});
        assert!(validate(&schema, &value).unwrap().is_err());
    }
}
