//! Keyword-based risk classification.
//!
//! A patch touching anything in the configured keyword set (schema changes,
//! auth bypasses, production data mutation) is classified risky. Risk takes
//! precedence over confidence: the orchestrator escalates risky patches to
//! human review before the sandbox runs and before any budget is consumed.
//!
//! Matching is case-insensitive substring search over the combined patch
//! text. The gate is a pure function of its keyword set and holds no state.

use crate::config::EngineConfig;

/// Classifies patches as risky via keyword matching.
#[derive(Debug, Clone)]
pub struct RiskGate {
    /// Keywords, lowercased once at construction.
    keywords: Vec<String>,
}

impl RiskGate {
    /// Creates a gate from engine policy.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            keywords: config
                .risk_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    /// Returns the first matching keyword, if the combined text is risky.
    #[must_use]
    pub fn matched_keyword(&self, patch_text: &str) -> Option<&str> {
        let haystack = patch_text.to_lowercase();
        self.keywords
            .iter()
            .find(|keyword| !keyword.is_empty() && haystack.contains(keyword.as_str()))
            .map(String::as_str)
    }

    /// Returns `true` if the combined patch text contains any risk keyword.
    #[must_use]
    pub fn is_risky(&self, patch_text: &str) -> bool {
        self.matched_keyword(patch_text).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> RiskGate {
        RiskGate::from_config(
            &EngineConfig::builder()
                .risk_keywords(["drop table", "auth_bypass"])
                .build(),
        )
    }

    #[test]
    fn test_keyword_hit() {
        let gate = gate();
        assert!(gate.is_risky("migration: DROP TABLE users;"));
        assert_eq!(
            gate.matched_keyword("migration: DROP TABLE users;"),
            Some("drop table")
        );
    }

    #[test]
    fn test_case_insensitive_substring() {
        let gate = gate();
        assert!(gate.is_risky("if cfg.Auth_Bypass { skip() }"));
    }

    #[test]
    fn test_clean_patch_not_risky() {
        let gate = gate();
        assert!(!gate.is_risky("fn add(a: i32, b: i32) -> i32 { a + b }"));
        assert_eq!(gate.matched_keyword("let x = 1;"), None);
    }

    #[test]
    fn test_empty_keyword_never_matches() {
        let gate = RiskGate::from_config(
            &EngineConfig::builder().risk_keywords([""]).build(),
        );
        assert!(!gate.is_risky("anything at all"));
    }
}
