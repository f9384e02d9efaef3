//! Remediation strategy selection.
//!
//! The external strategy planner names a strategy as a string; here that
//! name is resolved into a closed enum via exhaustive matching, never
//! string dispatch downstream. Unknown names map to the default
//! [`RemediationStrategy::LogAndFix`].

use serde::{Deserialize, Serialize};

/// Remediation strategies the engine can attach to a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationStrategy {
    /// Record the failure and apply the proposed fix. Default.
    LogAndFix,
    /// Revert to the last known-good version of the code.
    Rollback,
    /// Hold the patch for a security-focused review.
    SecurityAudit,
}

impl RemediationStrategy {
    /// Resolves a planner-provided name, defaulting unknown names.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "rollback" => Self::Rollback,
            "security_audit" | "security-audit" => Self::SecurityAudit,
            _ => Self::LogAndFix,
        }
    }

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LogAndFix => "log_and_fix",
            Self::Rollback => "rollback",
            Self::SecurityAudit => "security_audit",
        }
    }
}

impl Default for RemediationStrategy {
    fn default() -> Self {
        Self::LogAndFix
    }
}

impl std::fmt::Display for RemediationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names_resolve() {
        assert_eq!(
            RemediationStrategy::from_name("rollback"),
            RemediationStrategy::Rollback
        );
        assert_eq!(
            RemediationStrategy::from_name("SECURITY_AUDIT"),
            RemediationStrategy::SecurityAudit
        );
        assert_eq!(
            RemediationStrategy::from_name("log_and_fix"),
            RemediationStrategy::LogAndFix
        );
    }

    #[test]
    fn test_unknown_name_maps_to_default() {
        assert_eq!(
            RemediationStrategy::from_name("quantum_debugging"),
            RemediationStrategy::default()
        );
        assert_eq!(
            RemediationStrategy::from_name(""),
            RemediationStrategy::LogAndFix
        );
    }

    #[test]
    fn test_round_trip_names() {
        for strategy in [
            RemediationStrategy::LogAndFix,
            RemediationStrategy::Rollback,
            RemediationStrategy::SecurityAudit,
        ] {
            assert_eq!(RemediationStrategy::from_name(strategy.as_str()), strategy);
        }
    }
}
