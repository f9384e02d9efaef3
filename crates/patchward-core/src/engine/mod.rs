//! Decision orchestration.
//!
//! [`DecisionEngine::process_error`] composes every gate into one decision
//! per attempt:
//!
//! 1. rate limit (fail fast, nothing else touched);
//! 2. envelope create/update with field-wise metadata merge;
//! 3. confidence scoring;
//! 4. risk gate — risky patches escalate to human review before the
//!    sandbox runs and before any budget is consumed;
//! 5. breaker admission, cascade verdict, and confidence floor;
//! 6. blocked attempts record a `Stop` without executing the patch;
//! 7. otherwise the sandbox executes the patch;
//! 8. the outcome feeds breaker, scorer, cascade, outcome memory, and the
//!    envelope's attempt log;
//! 9. action derived: success promotes, admissible failure retries,
//!    exhausted failure rolls back;
//! 10. the envelope snapshot is certified against the schema contract
//!     before it is returned.
//!
//! # Locking
//!
//! Each shared component sits behind its own mutex, constructed with the
//! engine — no ambient globals. Gate checks acquire, read, and release; the
//! sandbox executes with no engine lock held; outcome recording re-acquires
//! each component in turn. Poisoned locks are recovered, not propagated: a
//! panicking sibling thread must not wedge the engine.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::breaker::{DualCircuitBreaker, ErrorClass};
use crate::cascade::CascadeTracker;
use crate::confidence::ConfidenceScorer;
use crate::config::EngineConfig;
use crate::envelope::EnvelopeStore;
use crate::error::EngineError;
use crate::memory::{OutcomeMemory, OutcomeRecord};
use crate::rate::RateLimiter;
use crate::risk::RiskGate;
use crate::sandbox::{Sandbox, SandboxOutcome, SandboxRequest};
use crate::schema::EnvelopeValidator;
use crate::strategy::RemediationStrategy;

/// The five terminal actions a decision can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealingAction {
    /// The patch succeeded; accept it.
    Promote,
    /// The patch failed but the lineage may attempt again.
    Retry,
    /// The patch failed and the breaker denies further attempts.
    Rollback,
    /// Gating blocked the attempt before execution.
    Stop,
    /// The patch is risky; a human must review it.
    HumanReview,
}

impl HealingAction {
    /// Returns `true` if the action ends a retry session.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Retry)
    }
}

/// One decision request: an error report plus a proposed patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Lineage identifier; generated when absent.
    #[serde(default)]
    pub patch_id: Option<String>,
    /// Error class of the report.
    pub error_class: ErrorClass,
    /// The error message being healed.
    pub message: String,
    /// Proposed patched code.
    pub patch_text: String,
    /// Original code before patching.
    pub original_text: String,
    /// Source language, forwarded to the sandbox.
    #[serde(default)]
    pub language: String,
    /// Raw model scores, one per candidate component.
    #[serde(default)]
    pub logits: Vec<f64>,
    /// Externally observed success rates keyed by error-class name.
    #[serde(default)]
    pub historical_stats: BTreeMap<String, f64>,
    /// Caller metadata, merged field-wise into the envelope.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Strategy name proposed by the external planner, if any.
    #[serde(default)]
    pub strategy_name: Option<String>,
}

impl DecisionRequest {
    /// Creates a minimal request; remaining fields default to empty.
    #[must_use]
    pub fn new(
        error_class: ErrorClass,
        message: impl Into<String>,
        patch_text: impl Into<String>,
        original_text: impl Into<String>,
    ) -> Self {
        Self {
            patch_id: None,
            error_class,
            message: message.into(),
            patch_text: patch_text.into(),
            original_text: original_text.into(),
            language: String::new(),
            logits: Vec::new(),
            historical_stats: BTreeMap::new(),
            metadata: BTreeMap::new(),
            strategy_name: None,
        }
    }
}

/// Supporting detail attached to a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionExtras {
    /// Why gating blocked or shaped the decision; empty when the patch
    /// executed cleanly.
    pub gating_reasons: Vec<String>,
    /// Sandbox outcome, when the patch was executed.
    pub sandbox: Option<SandboxOutcome>,
    /// Strategy chosen for this decision.
    pub strategy: RemediationStrategy,
}

/// The result of one decision call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResponse {
    /// The derived action.
    pub action: HealingAction,
    /// Lineage identifier (generated when the request carried none).
    pub patch_id: String,
    /// Certified envelope snapshot.
    pub envelope: Value,
    /// Gating reasons, sandbox outcome, and chosen strategy.
    pub extras: DecisionExtras,
}

/// Recovers a possibly poisoned mutex guard.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The decision orchestrator.
///
/// Owns every shared component behind its own mutex; construct one per
/// process or per isolated engine instance and share it by reference.
#[derive(Debug)]
pub struct DecisionEngine {
    config: EngineConfig,
    validator: EnvelopeValidator,
    risk_gate: RiskGate,
    rate: Mutex<RateLimiter>,
    breaker: Mutex<DualCircuitBreaker>,
    cascade: Mutex<CascadeTracker>,
    scorer: Mutex<ConfidenceScorer>,
    memory: Mutex<OutcomeMemory>,
    store: Mutex<EnvelopeStore>,
}

impl DecisionEngine {
    /// Creates an engine with fresh state from policy and a compiled
    /// schema contract.
    #[must_use]
    pub fn new(config: EngineConfig, validator: EnvelopeValidator) -> Self {
        let config = config.normalized();
        Self {
            risk_gate: RiskGate::from_config(&config),
            rate: Mutex::new(RateLimiter::from_config(&config)),
            breaker: Mutex::new(DualCircuitBreaker::from_config(&config)),
            cascade: Mutex::new(CascadeTracker::from_config(&config)),
            scorer: Mutex::new(ConfidenceScorer::from_config(&config)),
            memory: Mutex::new(OutcomeMemory::from_config(&config)),
            store: Mutex::new(EnvelopeStore::new()),
            validator,
            config,
        }
    }

    /// The active policy.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the certified snapshot of a lineage's envelope, if any.
    #[must_use]
    pub fn envelope_snapshot(&self, patch_id: &str) -> Option<Value> {
        lock(&self.store).get(patch_id).map(|e| e.snapshot())
    }

    /// Persists the outcome history to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] on I/O failure.
    pub fn save_outcomes(&self, path: &std::path::Path) -> Result<(), EngineError> {
        lock(&self.memory).save(path)
    }

    /// Decides one healing attempt.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RateLimitExceeded`] when the request is not
    /// admitted, and [`EngineError::SchemaValidation`] when the resulting
    /// envelope cannot be certified against the contract. Gating outcomes
    /// and sandbox failures are decision results, never errors.
    pub fn process_error(
        &self,
        request: &DecisionRequest,
        sandbox: &dyn Sandbox,
    ) -> Result<DecisionResponse, EngineError> {
        // Gate 1: admission, ahead of any other work.
        lock(&self.rate).enforce()?;

        let class = request.error_class;
        let patch_id = request
            .patch_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let confidence =
            lock(&self.scorer).score(class, &request.logits, &request.historical_stats);

        let combined_text = format!("{}\n{}", request.patch_text, request.original_text);
        let risky_keyword = self
            .risk_gate
            .matched_keyword(&combined_text)
            .map(ToString::to_string);
        let risky = risky_keyword.is_some();

        // Envelope create/update for this attempt.
        {
            let mut store = lock(&self.store);
            let envelope = store.get_or_create(&patch_id, class);
            envelope.observe_message(&request.message);
            envelope.merge_metadata(&request.metadata);
            envelope.set_confidence(&confidence, risky);
        }

        // Gate 2: risk takes precedence over confidence and consumes no
        // breaker or cascade budget.
        if risky && self.config.require_review_on_risky {
            let keyword = risky_keyword.unwrap_or_default();
            let reason = format!("risk keyword matched: '{keyword}'");
            tracing::warn!(patch_id = %patch_id, keyword = %keyword, "patch escalated to human review");
            let envelope = self.finalize_blocked(&patch_id, class, &reason, Some(&keyword))?;
            return Ok(DecisionResponse {
                action: HealingAction::HumanReview,
                patch_id,
                envelope,
                extras: DecisionExtras {
                    gating_reasons: vec![reason],
                    sandbox: None,
                    strategy: RemediationStrategy::SecurityAudit,
                },
            });
        }

        // Gate 3: breaker, cascade, and confidence floor.
        let mut gating_reasons = Vec::new();
        let admission = lock(&self.breaker).can_attempt(class);
        if let Some(reason) = admission.reason() {
            gating_reasons.push(format!("breaker: {reason}"));
        }
        let verdict = lock(&self.cascade).should_stop_attempting();
        if let Some(reason) = verdict.reason() {
            gating_reasons.push(format!("cascade: {reason}"));
        }
        let floor = match class {
            ErrorClass::Syntax => self.config.syntax_confidence_floor,
            ErrorClass::Logic => self.config.logic_confidence_floor,
        };
        if confidence.overall_confidence < floor {
            gating_reasons.push(format!(
                "confidence {:.3} below floor {floor:.3}",
                confidence.overall_confidence
            ));
        }

        if !gating_reasons.is_empty() {
            let note = gating_reasons.join("; ");
            tracing::info!(patch_id = %patch_id, reasons = %note, "attempt blocked");
            let envelope = self.finalize_blocked(&patch_id, class, &note, None)?;
            return Ok(DecisionResponse {
                action: HealingAction::Stop,
                patch_id,
                envelope,
                extras: DecisionExtras {
                    gating_reasons,
                    sandbox: None,
                    strategy: self.planner_strategy(request),
                },
            });
        }

        // Execute with no engine lock held; the sandbox may block for a
        // compile or a run.
        let sandbox_request = SandboxRequest {
            patch_id: patch_id.clone(),
            language: request.language.clone(),
            patched_code: request.patch_text.clone(),
            original_code: request.original_text.clone(),
        };
        let outcome = match sandbox.execute(&sandbox_request) {
            Ok(outcome) => outcome,
            // A sandbox fault is a failed attempt, not an engine error.
            Err(error) => {
                tracing::warn!(patch_id = %patch_id, error = %error, "sandbox raised");
                SandboxOutcome::failed(None)
            },
        };

        // Record the outcome into every stateful component.
        let success = outcome.success;
        let failure_message = outcome
            .diagnostic
            .as_ref()
            .map_or_else(|| request.message.clone(), |d| d.message.clone());

        let breaker_state = {
            let mut breaker = lock(&self.breaker);
            breaker.record_attempt(class, success);
            breaker.state_summary()
        };
        lock(&self.scorer).record_outcome(class, success);
        let cascade_depth = {
            let mut cascade = lock(&self.cascade);
            if success {
                cascade.record_success();
            } else {
                cascade.add_error_to_chain(
                    class,
                    failure_message.clone(),
                    confidence.overall_confidence,
                    1.0,
                );
            }
            cascade.depth()
        };
        lock(&self.memory).push(OutcomeRecord {
            patch_id: patch_id.clone(),
            class,
            success,
            confidence: confidence.overall_confidence,
            timestamp: chrono::Utc::now(),
        });

        let note = if success {
            "sandbox reported success".to_string()
        } else {
            format!("sandbox reported failure: {failure_message}")
        };
        let envelope = {
            let mut store = lock(&self.store);
            let envelope = store.get_or_create(&patch_id, class);
            envelope.merge_resource_usage(&outcome.resource_usage);
            envelope.record_attempt(success, note, breaker_state.clone());
            envelope.set_gating_state(breaker_state, cascade_depth);
            envelope.snapshot()
        };
        self.validator.validate(&envelope)?;

        let action = if success {
            HealingAction::Promote
        } else if lock(&self.breaker).can_attempt(class).is_allowed() {
            HealingAction::Retry
        } else {
            HealingAction::Rollback
        };
        tracing::info!(patch_id = %patch_id, action = ?action, success, "decision made");

        let strategy = if action == HealingAction::Rollback {
            RemediationStrategy::Rollback
        } else {
            self.planner_strategy(request)
        };

        Ok(DecisionResponse {
            action,
            patch_id,
            envelope,
            extras: DecisionExtras {
                gating_reasons,
                sandbox: Some(outcome),
                strategy,
            },
        })
    }

    /// Resolves the planner-proposed strategy name.
    fn planner_strategy(&self, request: &DecisionRequest) -> RemediationStrategy {
        request
            .strategy_name
            .as_deref()
            .map(RemediationStrategy::from_name)
            .unwrap_or_default()
    }

    /// Records a blocked attempt into the envelope and certifies the
    /// snapshot. Blocked attempts consume no breaker or cascade budget.
    fn finalize_blocked(
        &self,
        patch_id: &str,
        class: ErrorClass,
        note: &str,
        risk_keyword: Option<&str>,
    ) -> Result<Value, EngineError> {
        let breaker_state = lock(&self.breaker).state_summary();
        let cascade_depth = lock(&self.cascade).depth();
        let snapshot = {
            let mut store = lock(&self.store);
            let envelope = store.get_or_create(patch_id, class);
            if let Some(keyword) = risk_keyword {
                envelope.flag_for_developer(format!(
                    "patch matched risk keyword '{keyword}'; human review required"
                ));
            }
            envelope.record_attempt(false, note, breaker_state.clone());
            envelope.set_gating_state(breaker_state, cascade_depth);
            envelope.snapshot()
        };
        self.validator.validate(&snapshot)?;
        Ok(snapshot)
    }
}
