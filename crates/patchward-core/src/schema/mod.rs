//! Envelope schema contract validation.
//!
//! The envelope contract is an externally owned JSON Schema; this module
//! compiles it once and certifies every envelope snapshot before it leaves
//! the engine. A validation failure is a hard error — it indicates a bug in
//! envelope construction, not a transient condition — and reports the JSON
//! path of the first violation.

use serde_json::Value;
use std::path::Path;

use crate::error::EngineError;

/// Compiled envelope schema contract.
pub struct EnvelopeValidator {
    validator: jsonschema::Validator,
}

impl std::fmt::Debug for EnvelopeValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeValidator").finish_non_exhaustive()
    }
}

impl EnvelopeValidator {
    /// Compiles a schema from an in-memory JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SchemaCompile`] if the value is not a valid
    /// JSON Schema.
    pub fn from_value(schema: &Value) -> Result<Self, EngineError> {
        let validator = jsonschema::options()
            .build(schema)
            .map_err(|e| EngineError::SchemaCompile {
                message: e.to_string(),
            })?;
        Ok(Self { validator })
    }

    /// Reads and compiles the schema contract file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SchemaUnavailable`] if the file cannot be
    /// read and [`EngineError::SchemaCompile`] if its content is not a
    /// valid JSON Schema.
    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        let bytes = std::fs::read(path).map_err(|source| EngineError::SchemaUnavailable {
            path: path.display().to_string(),
            source,
        })?;
        let schema: Value =
            serde_json::from_slice(&bytes).map_err(|e| EngineError::SchemaCompile {
                message: format!("{}: {e}", path.display()),
            })?;
        Self::from_value(&schema)
    }

    /// Validates an envelope snapshot against the contract.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SchemaValidation`] with the JSON path of the
    /// first violation.
    pub fn validate(&self, snapshot: &Value) -> Result<(), EngineError> {
        self.validator.validate(snapshot).map_err(|error| {
            let path = error.instance_path.to_string();
            EngineError::SchemaValidation {
                path: if path.is_empty() {
                    "$".to_string()
                } else {
                    format!("${path}")
                },
                message: error.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn contract() -> Value {
        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "type": "object",
            "required": ["attempts", "confidenceComponents", "breakerState",
                         "cascadeDepth", "resourceUsage", "success", "metadata"],
            "properties": {
                "attempts": { "type": "array" },
                "confidenceComponents": {
                    "type": "object",
                    "properties": {
                        "syntax": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                        "logic": { "type": "number", "minimum": 0.0, "maximum": 1.0 }
                    }
                },
                "breakerState": { "type": "string" },
                "cascadeDepth": { "type": "integer", "minimum": 0 },
                "resourceUsage": { "type": "object" },
                "success": { "type": "boolean" },
                "metadata": { "type": "object" }
            }
        })
    }

    #[test]
    fn test_valid_snapshot_passes() {
        let validator = EnvelopeValidator::from_value(&contract()).unwrap();
        let snapshot = json!({
            "attempts": [],
            "confidenceComponents": { "syntax": 0.5, "logic": 0.5, "risk": 0.0 },
            "breakerState": "syntax=closed logic=closed",
            "cascadeDepth": 0,
            "resourceUsage": {},
            "success": false,
            "metadata": {}
        });
        assert!(validator.validate(&snapshot).is_ok());
    }

    #[test]
    fn test_missing_field_reports_path() {
        let validator = EnvelopeValidator::from_value(&contract()).unwrap();
        let snapshot = json!({ "attempts": [] });
        let error = validator.validate(&snapshot).unwrap_err();
        assert!(matches!(error, EngineError::SchemaValidation { .. }));
    }

    #[test]
    fn test_out_of_range_confidence_rejected() {
        let validator = EnvelopeValidator::from_value(&contract()).unwrap();
        let snapshot = json!({
            "attempts": [],
            "confidenceComponents": { "syntax": 1.5, "logic": 0.5 },
            "breakerState": "s",
            "cascadeDepth": 0,
            "resourceUsage": {},
            "success": false,
            "metadata": {}
        });
        let error = validator.validate(&snapshot).unwrap_err();
        match error {
            EngineError::SchemaValidation { path, .. } => {
                assert!(path.contains("confidenceComponents"));
            },
            other => panic!("expected schema validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_contract_file() {
        let result = EnvelopeValidator::from_path(Path::new("/nonexistent/contract.json"));
        assert!(matches!(result, Err(EngineError::SchemaUnavailable { .. })));
    }

    #[test]
    fn test_unparseable_contract_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contract.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let result = EnvelopeValidator::from_path(&path);
        assert!(matches!(result, Err(EngineError::SchemaCompile { .. })));
    }
}
