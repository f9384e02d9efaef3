//! Cascading-failure tracking across attempts.
//!
//! The tracker keeps a chronological chain of failures, possibly spanning
//! error classes, and decides independently of the circuit breaker whether
//! the chain itself must stop. A lineage can be breaker-admissible yet
//! cascade-blocked when the patch generator is cycling on the same failure.
//!
//! Two stop conditions:
//!
//! - chain depth beyond the configured ceiling;
//! - the configured number of *consecutive* identical failure signatures
//!   (class plus normalized message), indicating non-convergence.
//!
//! Entries are never removed within a lineage. Whether an intervening
//! success clears the chain is policy
//! ([`EngineConfig::reset_cascade_on_success`]); both behaviors are covered
//! by tests below.
//!
//! [`EngineConfig::reset_cascade_on_success`]: crate::config::EngineConfig::reset_cascade_on_success

use serde::{Deserialize, Serialize};

use crate::breaker::ErrorClass;
use crate::config::EngineConfig;

/// One failure in the cascade chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeEntry {
    /// Error class of the failed attempt.
    pub class: ErrorClass,
    /// Failure message as reported.
    pub message: String,
    /// Confidence the engine held when the attempt was made.
    pub confidence: f64,
    /// Relative weight of this failure in trend analysis.
    pub weight: f64,
}

impl CascadeEntry {
    /// Normalized identity of the failure, used for repeat detection.
    fn signature(&self) -> String {
        format!(
            "{}:{}",
            self.class.as_str(),
            self.message.trim().to_lowercase()
        )
    }
}

/// Verdict of a cascade evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeVerdict {
    /// The chain permits further attempts.
    Continue,
    /// The chain must stop.
    Stop {
        /// Why the chain must stop.
        reason: String,
    },
}

impl CascadeVerdict {
    /// Returns `true` if the chain must stop.
    #[must_use]
    pub const fn is_stop(&self) -> bool {
        matches!(self, Self::Stop { .. })
    }

    /// Returns the stop reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Continue => None,
            Self::Stop { reason } => Some(reason),
        }
    }
}

/// Tracks a chronological chain of failures for one lineage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeTracker {
    chain: Vec<CascadeEntry>,
    depth_limit: usize,
    repeat_limit: usize,
    reset_on_success: bool,
}

impl CascadeTracker {
    /// Creates a tracker from engine policy.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            chain: Vec::new(),
            depth_limit: config.cascade_depth_limit,
            repeat_limit: config.cascade_repeat_limit,
            reset_on_success: config.reset_cascade_on_success,
        }
    }

    /// Current chain depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    /// The recorded chain, oldest first.
    #[must_use]
    pub fn chain(&self) -> &[CascadeEntry] {
        &self.chain
    }

    /// Appends one failure to the chain.
    pub fn add_error_to_chain(
        &mut self,
        class: ErrorClass,
        message: impl Into<String>,
        confidence: f64,
        weight: f64,
    ) {
        self.chain.push(CascadeEntry {
            class,
            message: message.into(),
            confidence,
            weight,
        });
        tracing::debug!(class = %class, depth = self.chain.len(), "cascade entry added");
    }

    /// Notes a successful attempt; clears the chain only under the
    /// reset-on-success policy.
    pub fn record_success(&mut self) {
        if self.reset_on_success && !self.chain.is_empty() {
            tracing::debug!(cleared = self.chain.len(), "cascade chain reset on success");
            self.chain.clear();
        }
    }

    /// Evaluates whether the chain itself requires a hard stop.
    #[must_use]
    pub fn should_stop_attempting(&self) -> CascadeVerdict {
        if self.chain.len() > self.depth_limit {
            return CascadeVerdict::Stop {
                reason: format!(
                    "cascade depth {} exceeds limit {}",
                    self.chain.len(),
                    self.depth_limit
                ),
            };
        }
        let repeats = self.trailing_repeat_count();
        if repeats >= self.repeat_limit {
            return CascadeVerdict::Stop {
                reason: format!("same failure signature repeated {repeats} times in a row"),
            };
        }
        CascadeVerdict::Continue
    }

    /// Number of consecutive trailing entries sharing one signature.
    fn trailing_repeat_count(&self) -> usize {
        let Some(last) = self.chain.last() else {
            return 0;
        };
        let signature = last.signature();
        self.chain
            .iter()
            .rev()
            .take_while(|entry| entry.signature() == signature)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(depth_limit: usize, repeat_limit: usize, reset: bool) -> CascadeTracker {
        CascadeTracker::from_config(
            &EngineConfig::builder()
                .cascade_depth_limit(depth_limit)
                .cascade_repeat_limit(repeat_limit)
                .reset_cascade_on_success(reset)
                .build(),
        )
    }

    #[test]
    fn test_empty_chain_continues() {
        let t = tracker(3, 3, false);
        assert!(!t.should_stop_attempting().is_stop());
        assert_eq!(t.depth(), 0);
    }

    #[test]
    fn test_depth_limit_plus_one_stops() {
        let mut t = tracker(3, 10, false);
        for i in 0..4 {
            t.add_error_to_chain(ErrorClass::Syntax, format!("error {i}"), 0.5, 1.0);
        }
        let verdict = t.should_stop_attempting();
        assert!(verdict.is_stop());
        assert!(verdict.reason().unwrap().contains("depth"));
    }

    #[test]
    fn test_depth_at_limit_continues() {
        let mut t = tracker(3, 10, false);
        for i in 0..3 {
            t.add_error_to_chain(ErrorClass::Syntax, format!("error {i}"), 0.5, 1.0);
        }
        assert!(!t.should_stop_attempting().is_stop());
    }

    #[test]
    fn test_repeated_signature_stops() {
        let mut t = tracker(10, 3, false);
        for _ in 0..3 {
            t.add_error_to_chain(ErrorClass::Logic, "expected `;`", 0.5, 1.0);
        }
        let verdict = t.should_stop_attempting();
        assert!(verdict.is_stop());
        assert!(verdict.reason().unwrap().contains("repeated"));
    }

    #[test]
    fn test_signature_is_case_insensitive() {
        let mut t = tracker(10, 2, false);
        t.add_error_to_chain(ErrorClass::Logic, "Missing Brace", 0.5, 1.0);
        t.add_error_to_chain(ErrorClass::Logic, "  missing brace ", 0.4, 1.0);
        assert!(t.should_stop_attempting().is_stop());
    }

    #[test]
    fn test_distinct_messages_do_not_trip_repeat() {
        let mut t = tracker(10, 2, false);
        t.add_error_to_chain(ErrorClass::Logic, "missing brace", 0.5, 1.0);
        t.add_error_to_chain(ErrorClass::Logic, "missing paren", 0.5, 1.0);
        assert!(!t.should_stop_attempting().is_stop());
    }

    #[test]
    fn test_same_message_different_class_not_identical() {
        let mut t = tracker(10, 2, false);
        t.add_error_to_chain(ErrorClass::Syntax, "boom", 0.5, 1.0);
        t.add_error_to_chain(ErrorClass::Logic, "boom", 0.5, 1.0);
        assert!(!t.should_stop_attempting().is_stop());
    }

    #[test]
    fn test_success_does_not_reset_by_default() {
        let mut t = tracker(10, 5, false);
        t.add_error_to_chain(ErrorClass::Syntax, "boom", 0.5, 1.0);
        t.record_success();
        assert_eq!(t.depth(), 1);
    }

    #[test]
    fn test_success_resets_under_reset_policy() {
        let mut t = tracker(10, 5, true);
        t.add_error_to_chain(ErrorClass::Syntax, "boom", 0.5, 1.0);
        t.add_error_to_chain(ErrorClass::Syntax, "boom", 0.5, 1.0);
        t.record_success();
        assert_eq!(t.depth(), 0);
        assert!(!t.should_stop_attempting().is_stop());
    }
}
