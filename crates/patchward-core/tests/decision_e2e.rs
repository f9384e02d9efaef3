//! End-to-end decision scenarios.
//!
//! Each test drives the full gating sequence against a scripted sandbox:
//!
//! ```text
//! DecisionRequest
//!     |
//!     v
//! RateLimiter (admission)
//!     |
//!     v
//! RiskGate ----> HUMAN_REVIEW (no execution)
//!     |
//!     v
//! DualCircuitBreaker + CascadeTracker + confidence floor ----> STOP
//!     |
//!     v
//! Sandbox (scripted)
//!     |
//!     v
//! PROMOTE / RETRY / ROLLBACK + certified envelope
//! ```

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use patchward_core::breaker::ErrorClass;
use patchward_core::config::EngineConfig;
use patchward_core::engine::{DecisionEngine, DecisionRequest, HealingAction};
use patchward_core::error::EngineError;
use patchward_core::sandbox::{
    Diagnostic, DiagnosticSeverity, Sandbox, SandboxError, SandboxOutcome, SandboxRequest,
};
use patchward_core::schema::EnvelopeValidator;
use serde_json::json;

/// The envelope contract used across these scenarios, shaped like the
/// externally owned schema file.
fn contract() -> EnvelopeValidator {
    EnvelopeValidator::from_value(&json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["attempts", "confidenceComponents", "breakerState",
                     "cascadeDepth", "resourceUsage", "success", "metadata"],
        "properties": {
            "attempts": { "type": "array" },
            "confidenceComponents": {
                "type": "object",
                "required": ["syntax", "logic", "risk"],
                "properties": {
                    "syntax": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                    "logic": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                    "risk": { "type": "number", "minimum": 0.0, "maximum": 1.0 }
                }
            },
            "breakerState": { "type": "string" },
            "cascadeDepth": { "type": "integer", "minimum": 0 },
            "resourceUsage": { "type": "object" },
            "success": { "type": "boolean" },
            "metadata": { "type": "object" }
        }
    }))
    .unwrap()
}

/// Sandbox that replays a script of outcomes and counts invocations.
struct ScriptedSandbox {
    calls: AtomicUsize,
    script: RefCell<Vec<Result<SandboxOutcome, SandboxError>>>,
}

impl ScriptedSandbox {
    fn new(script: Vec<Result<SandboxOutcome, SandboxError>>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script: RefCell::new(script),
        }
    }

    fn always_succeeds() -> Self {
        Self::new(vec![])
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Sandbox for ScriptedSandbox {
    fn execute(&self, _request: &SandboxRequest) -> Result<SandboxOutcome, SandboxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.borrow_mut();
        if script.is_empty() {
            Ok(SandboxOutcome::succeeded())
        } else {
            script.remove(0)
        }
    }
}

fn failure(message: &str) -> Result<SandboxOutcome, SandboxError> {
    Ok(SandboxOutcome::failed(Some(Diagnostic {
        file: "src/app.py".to_string(),
        line: 10,
        column: 1,
        code: "E999".to_string(),
        message: message.to_string(),
        severity: DiagnosticSeverity::Error,
    })))
}

fn syntax_request(patch_id: &str) -> DecisionRequest {
    let mut request = DecisionRequest::new(
        ErrorClass::Syntax,
        "SyntaxError: unexpected EOF while parsing",
        "def handler(event):\n    return event\n",
        "def handler(event):\n    return event",
    );
    request.patch_id = Some(patch_id.to_string());
    request.language = "python".to_string();
    request.logits = vec![3.0, 0.2, -1.0];
    request
}

#[test]
fn scenario_syntax_success_promotes() {
    let engine = DecisionEngine::new(EngineConfig::default(), contract());
    let sandbox = ScriptedSandbox::always_succeeds();

    let response = engine
        .process_error(&syntax_request("lineage-ok"), &sandbox)
        .unwrap();

    assert_eq!(response.action, HealingAction::Promote);
    assert_eq!(response.envelope["success"], true);
    assert_eq!(sandbox.calls(), 1);
    let attempts = response.envelope["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0]["success"], true);
}

#[test]
fn scenario_risky_patch_escalates_without_execution() {
    let engine = DecisionEngine::new(EngineConfig::default(), contract());
    let sandbox = ScriptedSandbox::always_succeeds();

    let mut request = syntax_request("lineage-risky");
    request.patch_text = "cursor.execute('DROP TABLE users')".to_string();

    let response = engine.process_error(&request, &sandbox).unwrap();

    assert_eq!(response.action, HealingAction::HumanReview);
    assert_eq!(response.envelope["flaggedForDeveloper"], true);
    assert!(
        response.envelope["developerMessage"]
            .as_str()
            .unwrap()
            .contains("drop table")
    );
    assert_eq!(response.envelope["confidenceComponents"]["risk"], 1.0);
    // No sandbox execution, no breaker budget consumed.
    assert_eq!(sandbox.calls(), 0);
    let follow_up = engine
        .process_error(&syntax_request("lineage-risky-2"), &sandbox)
        .unwrap();
    assert_eq!(follow_up.action, HealingAction::Promote);
}

#[test]
fn scenario_three_failures_roll_back_and_deny_further_syntax() {
    let config = EngineConfig::builder()
        .max_syntax_attempts(3)
        .syntax_error_budget(1.0)
        .cascade_depth_limit(10)
        .cascade_repeat_limit(10)
        .build();
    let engine = DecisionEngine::new(config, contract());
    let sandbox = ScriptedSandbox::new(vec![
        failure("IndentationError at line 3"),
        failure("IndentationError at line 5"),
        failure("IndentationError at line 7"),
    ]);

    let first = engine
        .process_error(&syntax_request("lineage-fail"), &sandbox)
        .unwrap();
    assert_eq!(first.action, HealingAction::Retry);

    let second = engine
        .process_error(&syntax_request("lineage-fail"), &sandbox)
        .unwrap();
    assert_eq!(second.action, HealingAction::Retry);

    let third = engine
        .process_error(&syntax_request("lineage-fail"), &sandbox)
        .unwrap();
    assert_eq!(third.action, HealingAction::Rollback);

    // A fourth call is breaker-blocked before execution.
    let fourth = engine
        .process_error(&syntax_request("lineage-fail"), &sandbox)
        .unwrap();
    assert_eq!(fourth.action, HealingAction::Stop);
    assert!(
        fourth
            .extras
            .gating_reasons
            .iter()
            .any(|r| r.contains("breaker"))
    );
    assert_eq!(sandbox.calls(), 3);
}

#[test]
fn scenario_repeating_signature_cascade_stops() {
    // Generous breaker so only the cascade can block.
    let config = EngineConfig::builder()
        .max_syntax_attempts(100)
        .syntax_error_budget(1.0)
        .cascade_depth_limit(50)
        .cascade_repeat_limit(2)
        .build();
    let engine = DecisionEngine::new(config, contract());
    let sandbox = ScriptedSandbox::new(vec![
        failure("missing closing brace"),
        failure("missing closing brace"),
        failure("missing closing brace"),
    ]);

    engine
        .process_error(&syntax_request("lineage-cycling"), &sandbox)
        .unwrap();
    engine
        .process_error(&syntax_request("lineage-cycling"), &sandbox)
        .unwrap();

    // Two identical signatures in the chain: the generator is not
    // converging, so the third attempt never executes.
    let third = engine
        .process_error(&syntax_request("lineage-cycling"), &sandbox)
        .unwrap();
    assert_eq!(third.action, HealingAction::Stop);
    assert!(
        third
            .extras
            .gating_reasons
            .iter()
            .any(|r| r.contains("cascade"))
    );
    assert_eq!(sandbox.calls(), 2);
}

#[test]
fn scenario_rate_limit_rejects_before_any_work() {
    let config = EngineConfig::builder().rate_limit_per_window(2).build();
    let engine = DecisionEngine::new(config, contract());
    let sandbox = ScriptedSandbox::always_succeeds();

    engine
        .process_error(&syntax_request("lineage-a"), &sandbox)
        .unwrap();
    engine
        .process_error(&syntax_request("lineage-b"), &sandbox)
        .unwrap();
    let third = engine.process_error(&syntax_request("lineage-c"), &sandbox);
    assert!(matches!(
        third,
        Err(EngineError::RateLimitExceeded { limit: 2, .. })
    ));
    // Nothing was recorded for the rejected lineage.
    assert!(engine.envelope_snapshot("lineage-c").is_none());
    assert_eq!(sandbox.calls(), 2);
}

#[test]
fn scenario_outcomes_persist_across_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outcomes.json");

    let engine = DecisionEngine::new(EngineConfig::default(), contract());
    let sandbox = ScriptedSandbox::always_succeeds();
    engine
        .process_error(&syntax_request("lineage-p1"), &sandbox)
        .unwrap();
    engine
        .process_error(&syntax_request("lineage-p2"), &sandbox)
        .unwrap();
    engine.save_outcomes(&path).unwrap();

    let loaded = patchward_core::memory::OutcomeMemory::load(&path, 500).unwrap();
    assert_eq!(loaded.len(), 2);
    let ids: Vec<_> = loaded.records().map(|r| r.patch_id.clone()).collect();
    assert_eq!(ids, ["lineage-p1", "lineage-p2"]);
}

#[test]
fn scenario_metadata_accumulates_field_wise_across_attempts() {
    let config = EngineConfig::builder()
        .syntax_error_budget(1.0)
        .cascade_repeat_limit(10)
        .build();
    let engine = DecisionEngine::new(config, contract());
    let sandbox = ScriptedSandbox::new(vec![failure("first failure")]);

    let mut first = syntax_request("lineage-meta");
    first
        .metadata
        .insert("origin".to_string(), json!("ci-bot"));
    engine.process_error(&first, &sandbox).unwrap();

    let mut second = syntax_request("lineage-meta");
    second.message = "SyntaxError: invalid syntax".to_string();
    second
        .metadata
        .insert("attempt_tag".to_string(), json!("second"));
    let response = engine.process_error(&second, &sandbox).unwrap();

    let metadata = &response.envelope["metadata"];
    // Keys from both attempts coexist; the store tracks the error delta.
    assert_eq!(metadata["origin"], "ci-bot");
    assert_eq!(metadata["attempt_tag"], "second");
    assert_eq!(
        metadata["previous_error"],
        "SyntaxError: unexpected EOF while parsing"
    );
    assert_eq!(
        metadata["error_delta"]["current"],
        "SyntaxError: invalid syntax"
    );
}
