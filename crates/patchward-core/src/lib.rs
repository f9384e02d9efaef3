//! # patchward-core
//!
//! A decision engine governing automated code-patch healing attempts.
//! Given an error report and a proposed patch, the engine decides whether
//! to promote, retry, roll back, or escalate to human review — automated
//! patch generation is never trusted blindly. Every attempt is scored,
//! risk-checked, rate-limited, and recorded before an action is taken.
//!
//! ## Components
//!
//! - [`envelope`]: the versioned attempt record for one patch lineage
//! - [`confidence`]: numerically stable confidence scoring from raw logits
//!   and historical outcomes
//! - [`breaker`]: independent failure budgets for syntax- and logic-class
//!   errors
//! - [`cascade`]: runaway-failure-chain detection, independent of the
//!   breaker
//! - [`risk`]: keyword-based escalation of sensitive patches
//! - [`rate`]: sliding-window request admission
//! - [`memory`]: bounded, persistable outcome history
//! - [`schema`]: envelope certification against the external JSON Schema
//!   contract
//! - [`engine`]: the decision orchestrator composing all of the above
//! - [`retry`]: bounded retry sessions threading failure diagnostics into
//!   subsequent attempts
//!
//! ## Example
//!
//! ```rust
//! use patchward_core::breaker::ErrorClass;
//! use patchward_core::config::EngineConfig;
//! use patchward_core::engine::{DecisionEngine, DecisionRequest};
//! use patchward_core::sandbox::{Sandbox, SandboxError, SandboxOutcome, SandboxRequest};
//! use patchward_core::schema::EnvelopeValidator;
//! use serde_json::json;
//!
//! struct NoopSandbox;
//!
//! impl Sandbox for NoopSandbox {
//!     fn execute(&self, _: &SandboxRequest) -> Result<SandboxOutcome, SandboxError> {
//!         Ok(SandboxOutcome::succeeded())
//!     }
//! }
//!
//! let contract = json!({
//!     "type": "object",
//!     "required": ["attempts", "confidenceComponents", "breakerState",
//!                  "cascadeDepth", "resourceUsage", "success", "metadata"]
//! });
//! let validator = EnvelopeValidator::from_value(&contract).unwrap();
//! let engine = DecisionEngine::new(EngineConfig::default(), validator);
//!
//! let request = DecisionRequest::new(
//!     ErrorClass::Syntax,
//!     "SyntaxError: unexpected EOF",
//!     "def f():\n    return 1",
//!     "def f():\n    return",
//! );
//! let response = engine.process_error(&request, &NoopSandbox).unwrap();
//! println!("action: {:?}", response.action);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod breaker;
pub mod cascade;
pub mod confidence;
pub mod config;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod rate;
pub mod retry;
pub mod risk;
pub mod sandbox;
pub mod schema;
pub mod strategy;

pub use breaker::{DualCircuitBreaker, ErrorClass};
pub use cascade::CascadeTracker;
pub use confidence::{ConfidenceResult, ConfidenceScorer};
pub use config::EngineConfig;
pub use engine::{DecisionEngine, DecisionRequest, DecisionResponse, HealingAction};
pub use envelope::{Envelope, EnvelopeStore};
pub use error::EngineError;
pub use memory::{OutcomeMemory, OutcomeRecord};
pub use retry::{RetryOrchestrator, RetryPolicy};
pub use sandbox::{Diagnostic, Sandbox, SandboxOutcome, SandboxRequest};
pub use schema::EnvelopeValidator;
pub use strategy::RemediationStrategy;
