//! Dual circuit breaker over per-class failure budgets.
//!
//! Syntax and logic failures have different retry economics: syntax errors
//! are cheap and frequent, logic errors are expensive and rarer. Each class
//! therefore carries its own [`BreakerBudget`] — a shared budget would let
//! one class starve the other's retry allowance.
//!
//! Admission is fail-closed: a class is denied once its attempt ceiling is
//! reached or its failure rate exceeds the configured budget fraction.
//! [`DualCircuitBreaker::record_attempt`] is the only mutator.
//!
//! # Example
//!
//! ```rust
//! use patchward_core::breaker::{BreakerBudget, DualCircuitBreaker, ErrorClass};
//!
//! let mut breaker = DualCircuitBreaker::new(
//!     BreakerBudget::new(3, 0.8),
//!     BreakerBudget::new(2, 0.6),
//! );
//!
//! assert!(breaker.can_attempt(ErrorClass::Syntax).is_allowed());
//! breaker.record_attempt(ErrorClass::Syntax, false);
//! ```

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

/// Classes of errors the engine budgets independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorClass {
    /// Parse/compile failures in the patched code.
    Syntax,
    /// Behavioral failures: the patch compiles but does the wrong thing.
    Logic,
}

impl ErrorClass {
    /// Returns all budgeted error classes.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Syntax, Self::Logic]
    }

    /// Returns the string representation used in summaries and records.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Syntax => "SYNTAX",
            Self::Logic => "LOGIC",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of an admission check for one error class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Further attempts are allowed for the class.
    Allowed,
    /// Further attempts are denied.
    Denied {
        /// Why admission was denied.
        reason: String,
    },
}

impl AdmissionDecision {
    /// Returns `true` if the attempt is admitted.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Returns the denial reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allowed => None,
            Self::Denied { reason } => Some(reason),
        }
    }
}

/// Attempt and failure budget for a single error class.
///
/// Invariant: `failure_count <= attempt_count`. The failure-rate denominator
/// is `max(attempt_count, 1)` so an untouched budget never divides by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerBudget {
    attempt_count: u32,
    failure_count: u32,
    max_attempts: u32,
    error_budget_fraction: f64,
}

impl BreakerBudget {
    /// Creates a fresh budget.
    #[must_use]
    pub fn new(max_attempts: u32, error_budget_fraction: f64) -> Self {
        Self {
            attempt_count: 0,
            failure_count: 0,
            max_attempts,
            error_budget_fraction: error_budget_fraction.clamp(0.0, 1.0),
        }
    }

    /// Returns the number of attempts recorded.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Returns the number of failed attempts recorded.
    #[must_use]
    pub const fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Returns the attempt ceiling.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the observed failure rate.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        f64::from(self.failure_count) / f64::from(self.attempt_count.max(1))
    }

    /// Returns `true` if the budget currently denies admission.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.admission().is_allowed()
    }

    /// Checks whether another attempt is admitted.
    #[must_use]
    pub fn admission(&self) -> AdmissionDecision {
        if self.attempt_count >= self.max_attempts {
            return AdmissionDecision::Denied {
                reason: format!(
                    "attempt ceiling reached: {} of {}",
                    self.attempt_count, self.max_attempts
                ),
            };
        }
        let rate = self.failure_rate();
        if rate > self.error_budget_fraction {
            return AdmissionDecision::Denied {
                reason: format!(
                    "failure rate {rate:.2} exceeds budget {:.2}",
                    self.error_budget_fraction
                ),
            };
        }
        AdmissionDecision::Allowed
    }

    /// Records one attempt outcome. Sole mutator.
    pub fn record(&mut self, success: bool) {
        self.attempt_count = self.attempt_count.saturating_add(1);
        if !success {
            self.failure_count = self.failure_count.saturating_add(1);
        }
        debug_assert!(self.failure_count <= self.attempt_count);
    }
}

/// Independent breaker budgets for syntax- and logic-class failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualCircuitBreaker {
    syntax: BreakerBudget,
    logic: BreakerBudget,
}

impl DualCircuitBreaker {
    /// Creates a breaker from explicit per-class budgets.
    #[must_use]
    pub const fn new(syntax: BreakerBudget, logic: BreakerBudget) -> Self {
        Self { syntax, logic }
    }

    /// Creates a breaker from engine policy.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            syntax: BreakerBudget::new(config.max_syntax_attempts, config.syntax_error_budget),
            logic: BreakerBudget::new(config.max_logic_attempts, config.logic_error_budget),
        }
    }

    /// Returns the budget for a class.
    #[must_use]
    pub const fn budget(&self, class: ErrorClass) -> &BreakerBudget {
        match class {
            ErrorClass::Syntax => &self.syntax,
            ErrorClass::Logic => &self.logic,
        }
    }

    /// Checks whether another attempt is admitted for a class.
    #[must_use]
    pub fn can_attempt(&self, class: ErrorClass) -> AdmissionDecision {
        self.budget(class).admission()
    }

    /// Records one attempt outcome for a class. Sole mutator.
    pub fn record_attempt(&mut self, class: ErrorClass, success: bool) {
        let budget = match class {
            ErrorClass::Syntax => &mut self.syntax,
            ErrorClass::Logic => &mut self.logic,
        };
        budget.record(success);
        tracing::debug!(
            class = %class,
            success,
            attempts = budget.attempt_count(),
            failures = budget.failure_count(),
            "breaker attempt recorded"
        );
    }

    /// Returns a per-class admission label reflecting current state.
    ///
    /// The label reflects state *after* the most recent
    /// [`record_attempt`](Self::record_attempt), suitable for embedding
    /// into envelope attempt records.
    #[must_use]
    pub fn state_summary(&self) -> String {
        let label = |budget: &BreakerBudget| if budget.is_open() { "open" } else { "closed" };
        format!(
            "syntax={} logic={}",
            label(&self.syntax),
            label(&self.logic)
        )
    }
}
