//! Sandbox collaborator boundary.
//!
//! The sandbox compiles and executes patched code; this crate consumes it
//! as a black box. An implementation receives the patch pair and returns a
//! success flag, resource usage, and optionally a structured diagnostic
//! describing where the patched code failed — the hint the retry
//! orchestrator feeds into the next attempt.
//!
//! A sandbox error is not an engine fault: the orchestrator records it as a
//! failed attempt and keeps going.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Inputs handed to the sandbox for one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxRequest {
    /// Lineage identifier.
    pub patch_id: String,
    /// Source language of the patched code.
    pub language: String,
    /// The proposed patched code.
    pub patched_code: String,
    /// The original code before patching.
    pub original_code: String,
}

/// Severity of a sandbox diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// The finding prevented execution.
    Error,
    /// The finding did not prevent execution.
    Warning,
    /// Informational only.
    Info,
}

/// Structured failure detail extracted from a failed execution.
///
/// Fed forward into the next attempt's metadata so patch regeneration can
/// target the specific failure location instead of retrying blind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// File the failure was reported in.
    pub file: String,
    /// One-based line number.
    pub line: u32,
    /// One-based column number.
    pub column: u32,
    /// Tool-specific error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Severity of the finding.
    pub severity: DiagnosticSeverity,
}

impl Diagnostic {
    /// Renders the diagnostic as a metadata hint value.
    #[must_use]
    pub fn as_hint(&self) -> Value {
        serde_json::json!({
            "file": self.file,
            "line": self.line,
            "column": self.column,
            "code": self.code,
            "message": self.message,
            "severity": self.severity,
        })
    }
}

/// Result of one sandbox execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxOutcome {
    /// Whether the patched code compiled and ran successfully.
    pub success: bool,
    /// Opaque resource usage reported by the sandbox.
    #[serde(default)]
    pub resource_usage: BTreeMap<String, Value>,
    /// Structured failure detail, when the sandbox produced one.
    #[serde(default)]
    pub diagnostic: Option<Diagnostic>,
}

impl SandboxOutcome {
    /// A successful outcome with no resource data.
    #[must_use]
    pub fn succeeded() -> Self {
        Self {
            success: true,
            resource_usage: BTreeMap::new(),
            diagnostic: None,
        }
    }

    /// A failed outcome carrying a diagnostic.
    #[must_use]
    pub fn failed(diagnostic: Option<Diagnostic>) -> Self {
        Self {
            success: false,
            resource_usage: BTreeMap::new(),
            diagnostic,
        }
    }
}

/// Error raised by a sandbox that could not run the patch at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sandbox execution failed: {message}")]
pub struct SandboxError {
    /// What went wrong inside the sandbox.
    pub message: String,
}

/// The execution collaborator contract.
pub trait Sandbox {
    /// Executes the patched code and reports the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError`] when the sandbox itself could not run the
    /// patch (as opposed to the patch running and failing).
    fn execute(&self, request: &SandboxRequest) -> Result<SandboxOutcome, SandboxError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_hint_shape() {
        let diagnostic = Diagnostic {
            file: "src/main.py".to_string(),
            line: 42,
            column: 7,
            code: "E001".to_string(),
            message: "missing closing brace".to_string(),
            severity: DiagnosticSeverity::Error,
        };
        let hint = diagnostic.as_hint();
        assert_eq!(hint["file"], "src/main.py");
        assert_eq!(hint["line"], 42);
        assert_eq!(hint["severity"], "error");
    }

    #[test]
    fn test_outcome_constructors() {
        assert!(SandboxOutcome::succeeded().success);
        let failed = SandboxOutcome::failed(None);
        assert!(!failed.success);
        assert!(failed.diagnostic.is_none());
    }
}
