//! Versioned attempt records ("envelopes"), one per patch lineage.
//!
//! An envelope accumulates everything the engine learns about a lineage:
//! an append-only attempt log, the latest confidence snapshot, breaker and
//! cascade state at evaluation time, sandbox resource usage, and metadata.
//!
//! Two rules are enforced at the type level rather than by caller
//! discipline:
//!
//! - **Metadata merges are field-wise.** New keys add, known keys
//!   overwrite, and the store's own error-delta keys are protected from
//!   caller updates. A wholesale replace would erase the delta between the
//!   current error and the previous one, destroying the basis for cascade
//!   and trend reasoning.
//! - **Success is sticky.** A lineage that ever succeeded stays healed even
//!   if later attempts fail.
//!
//! Mutation happens through the methods here; external consumers receive
//! immutable [`Envelope::snapshot`] values at the schema boundary.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::breaker::ErrorClass;
use crate::confidence::ConfidenceResult;

/// Metadata keys owned by the envelope store itself.
///
/// Caller merges never overwrite these; the store maintains them from the
/// sequence of observed error messages.
pub const PROTECTED_METADATA_KEYS: &[&str] = &["previous_error", "error_delta"];

/// One entry in the append-only attempt log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// When the attempt was evaluated.
    pub timestamp: DateTime<Utc>,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Short human-readable note (gate reason or sandbox summary).
    pub note: String,
    /// Breaker admission label at record time.
    #[serde(rename = "breakerSnapshot")]
    pub breaker_snapshot: String,
}

/// Confidence components embedded in the envelope.
///
/// `risk` is a boolean rendered as 0/1, not a probability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceComponents {
    /// Syntax-class confidence in [0,1].
    pub syntax: f64,
    /// Logic-class confidence in [0,1].
    pub logic: f64,
    /// 1.0 when the risk gate classified the patch risky, else 0.0.
    pub risk: f64,
}

/// The accumulating record of all attempts for one patch lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Opaque lineage identifier, immutable after creation.
    patch_id: String,
    /// Error class of the lineage.
    error_class: ErrorClass,
    /// Append-only attempt log; never reordered or truncated.
    attempts: Vec<AttemptRecord>,
    /// Latest confidence snapshot.
    confidence_components: ConfidenceComponents,
    /// Breaker admission label at the time of evaluation.
    breaker_state: String,
    /// Cascade chain depth at the time of evaluation.
    cascade_depth: usize,
    /// Opaque resource usage supplied by the sandbox.
    resource_usage: BTreeMap<String, Value>,
    /// Caller and store metadata, merged field-wise.
    metadata: BTreeMap<String, Value>,
    /// Sticky success flag for the lineage.
    success: bool,
    /// Set only by the risk escalation path.
    flagged_for_developer: bool,
    /// Explanation attached when flagged.
    developer_message: Option<String>,
    /// Last observed error message, basis of the delta keys.
    #[serde(skip)]
    previous_message: Option<String>,
}

impl Envelope {
    /// Creates an envelope for a new lineage.
    #[must_use]
    pub fn new(patch_id: impl Into<String>, error_class: ErrorClass) -> Self {
        Self {
            patch_id: patch_id.into(),
            error_class,
            attempts: Vec::new(),
            confidence_components: ConfidenceComponents::default(),
            breaker_state: String::new(),
            cascade_depth: 0,
            resource_usage: BTreeMap::new(),
            metadata: BTreeMap::new(),
            success: false,
            flagged_for_developer: false,
            developer_message: None,
            previous_message: None,
        }
    }

    /// Lineage identifier.
    #[must_use]
    pub fn patch_id(&self) -> &str {
        &self.patch_id
    }

    /// Error class of the lineage.
    #[must_use]
    pub const fn error_class(&self) -> ErrorClass {
        self.error_class
    }

    /// The attempt log, oldest first.
    #[must_use]
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    /// Latest confidence snapshot.
    #[must_use]
    pub const fn confidence_components(&self) -> &ConfidenceComponents {
        &self.confidence_components
    }

    /// Current metadata view.
    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Sticky success flag.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.success
    }

    /// Whether the risk gate flagged the lineage.
    #[must_use]
    pub const fn flagged_for_developer(&self) -> bool {
        self.flagged_for_developer
    }

    /// Message attached by the risk escalation path.
    #[must_use]
    pub fn developer_message(&self) -> Option<&str> {
        self.developer_message.as_deref()
    }

    /// Cascade depth recorded at the last evaluation.
    #[must_use]
    pub const fn cascade_depth(&self) -> usize {
        self.cascade_depth
    }

    /// Breaker label recorded at the last evaluation.
    #[must_use]
    pub fn breaker_state(&self) -> &str {
        &self.breaker_state
    }

    /// Observes the incoming error message, maintaining the protected
    /// delta keys from the previous attempt's message.
    pub fn observe_message(&mut self, message: &str) {
        if let Some(previous) = self.previous_message.take() {
            if previous != message {
                self.metadata
                    .insert("previous_error".to_string(), Value::String(previous.clone()));
                self.metadata.insert(
                    "error_delta".to_string(),
                    serde_json::json!({ "previous": previous, "current": message }),
                );
            }
        }
        self.previous_message = Some(message.to_string());
    }

    /// Merges caller metadata field-wise: new keys add, known keys
    /// overwrite, protected keys are skipped.
    pub fn merge_metadata(&mut self, updates: &BTreeMap<String, Value>) {
        for (key, value) in updates {
            if PROTECTED_METADATA_KEYS.contains(&key.as_str()) {
                tracing::warn!(key = %key, "ignoring caller update to protected metadata key");
                continue;
            }
            self.metadata.insert(key.clone(), value.clone());
        }
    }

    /// Updates the confidence snapshot.
    pub fn set_confidence(&mut self, result: &ConfidenceResult, risky: bool) {
        self.confidence_components = ConfidenceComponents {
            syntax: result.syntax_confidence,
            logic: result.logic_confidence,
            risk: if risky { 1.0 } else { 0.0 },
        };
    }

    /// Updates the breaker label and cascade depth recorded for this
    /// evaluation.
    pub fn set_gating_state(&mut self, breaker_state: impl Into<String>, cascade_depth: usize) {
        self.breaker_state = breaker_state.into();
        self.cascade_depth = cascade_depth;
    }

    /// Merges sandbox resource usage field-wise.
    pub fn merge_resource_usage(&mut self, usage: &BTreeMap<String, Value>) {
        for (key, value) in usage {
            self.resource_usage.insert(key.clone(), value.clone());
        }
    }

    /// Appends one attempt to the log. Success is sticky-OR'd into the
    /// lineage flag.
    pub fn record_attempt(
        &mut self,
        success: bool,
        note: impl Into<String>,
        breaker_snapshot: impl Into<String>,
    ) {
        self.attempts.push(AttemptRecord {
            timestamp: Utc::now(),
            success,
            note: note.into(),
            breaker_snapshot: breaker_snapshot.into(),
        });
        self.success = self.success || success;
    }

    /// Flags the lineage for human review. Only the risk escalation path
    /// calls this.
    pub fn flag_for_developer(&mut self, message: impl Into<String>) {
        self.flagged_for_developer = true;
        self.developer_message = Some(message.into());
    }

    /// Produces the immutable boundary representation handed to schema
    /// validation and outside callers.
    ///
    /// # Panics
    ///
    /// Never panics: every field of the envelope is JSON-representable.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Null)
    }
}

/// Owns one envelope per lineage.
#[derive(Debug, Default)]
pub struct EnvelopeStore {
    envelopes: HashMap<String, Envelope>,
}

impl EnvelopeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the envelope for a lineage, creating it on first sight.
    pub fn get_or_create(&mut self, patch_id: &str, class: ErrorClass) -> &mut Envelope {
        self.envelopes
            .entry(patch_id.to_string())
            .or_insert_with(|| Envelope::new(patch_id, class))
    }

    /// Returns the envelope for a lineage, if any.
    #[must_use]
    pub fn get(&self, patch_id: &str) -> Option<&Envelope> {
        self.envelopes.get(patch_id)
    }

    /// Number of tracked lineages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    /// Returns `true` if no lineages are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }
}
