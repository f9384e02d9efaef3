//! Bounded retry orchestration around the decision engine.
//!
//! A retry session drives up to `max_attempts` decision calls for one
//! logical healing effort, strictly sequentially. After a failed attempt
//! the sandbox diagnostic — file, line, column, code, message, severity —
//! is handed to the [`PatchSource`] for targeted regeneration and injected
//! into the next request's metadata under the `repair_hint` key, so the
//! external patch generator aims at the specific failure location instead
//! of retrying blind.
//!
//! Between attempts the session sleeps per [`BackoffPolicy`]. A session is
//! cancellable through its [`CancelHandle`]: cancellation stops scheduling
//! further attempts but never rolls back breaker, cascade, or memory state
//! already recorded for completed attempts.
//!
//! Terminal conditions end the loop immediately without consuming the
//! remaining attempt budget: a promote, a rollback or stop from gating, or
//! a risk escalation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{DecisionEngine, DecisionRequest, DecisionResponse, HealingAction};
use crate::error::EngineError;
use crate::sandbox::{Diagnostic, Sandbox};

/// Metadata key the orchestrator stores the forwarded diagnostic under.
pub const REPAIR_HINT_KEY: &str = "repair_hint";

/// Delay schedule between attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Fixed delay between attempts.
    Fixed {
        /// Delay duration.
        delay: Duration,
    },
    /// Exponential backoff.
    Exponential {
        /// Initial delay.
        initial_delay: Duration,
        /// Maximum delay.
        max_delay: Duration,
        /// Multiplier per attempt.
        multiplier: f64,
    },
    /// Linear backoff.
    Linear {
        /// Initial delay.
        initial_delay: Duration,
        /// Increment per attempt.
        increment: Duration,
        /// Maximum delay.
        max_delay: Duration,
    },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Exponential {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => *delay,
            Self::Exponential {
                initial_delay,
                max_delay,
                multiplier,
            } => {
                #[allow(clippy::cast_possible_wrap)] // attempt count won't exceed i32
                let secs = initial_delay.as_secs_f64()
                    * multiplier.powi(attempt.saturating_sub(1) as i32);
                Duration::from_secs_f64(secs.max(0.0)).min(*max_delay)
            },
            Self::Linear {
                initial_delay,
                increment,
                max_delay,
            } => {
                let delay = *initial_delay + *increment * attempt.saturating_sub(1);
                delay.min(*max_delay)
            },
        }
    }
}

/// Retry-session policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum decision calls per session.
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Regenerates the request for each attempt of a session.
///
/// `previous` carries the diagnostic extracted from the prior failed
/// attempt, when the sandbox produced one.
pub trait PatchSource {
    /// Produces the request for `attempt` (1-based).
    fn propose(&mut self, attempt: u32, previous: Option<&Diagnostic>) -> DecisionRequest;
}

/// Cancels a running session from another thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Requests cancellation; already-recorded attempt state is kept.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Outcome of one retry session.
#[derive(Debug, Clone)]
pub struct RetryReport {
    /// Session identifier.
    pub session_id: String,
    /// Decision calls actually made.
    pub attempts_made: u32,
    /// The final decision, absent when cancelled before the first call.
    pub last_response: Option<DecisionResponse>,
    /// Whether the session ended by cancellation.
    pub cancelled: bool,
}

impl RetryReport {
    /// The final action, if any decision was made.
    #[must_use]
    pub fn final_action(&self) -> Option<HealingAction> {
        self.last_response.as_ref().map(|r| r.action)
    }
}

/// Drives bounded retry sessions against one engine.
#[derive(Debug)]
pub struct RetryOrchestrator<'a> {
    engine: &'a DecisionEngine,
    session_id: String,
    policy: RetryPolicy,
    cancel: Arc<AtomicBool>,
}

impl<'a> RetryOrchestrator<'a> {
    /// Creates a session.
    #[must_use]
    pub fn new(engine: &'a DecisionEngine, session_id: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            engine,
            session_id: session_id.into(),
            policy,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns a handle that cancels this session.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancel),
        }
    }

    /// Runs the session to a terminal decision, attempt exhaustion, or
    /// cancellation.
    ///
    /// # Errors
    ///
    /// Propagates admission and contract errors from the engine
    /// ([`EngineError::RateLimitExceeded`], [`EngineError::SchemaValidation`]).
    /// Gating outcomes and sandbox failures resolve into actions, not
    /// errors.
    pub fn run(
        &self,
        source: &mut dyn PatchSource,
        sandbox: &dyn Sandbox,
    ) -> Result<RetryReport, EngineError> {
        let mut attempts_made = 0;
        let mut last_response: Option<DecisionResponse> = None;
        let mut forwarded: Option<Diagnostic> = None;

        for attempt in 1..=self.policy.max_attempts {
            if self.cancel.load(Ordering::SeqCst) {
                tracing::info!(session = %self.session_id, attempt, "session cancelled");
                return Ok(RetryReport {
                    session_id: self.session_id.clone(),
                    attempts_made,
                    last_response,
                    cancelled: true,
                });
            }

            let mut request = source.propose(attempt, forwarded.as_ref());
            if let Some(diagnostic) = &forwarded {
                request
                    .metadata
                    .insert(REPAIR_HINT_KEY.to_string(), diagnostic.as_hint());
            }

            let response = self.engine.process_error(&request, sandbox)?;
            attempts_made += 1;
            let action = response.action;
            forwarded = response
                .extras
                .sandbox
                .as_ref()
                .and_then(|outcome| outcome.diagnostic.clone());
            last_response = Some(response);

            if action.is_terminal() {
                tracing::info!(
                    session = %self.session_id,
                    attempt,
                    action = ?action,
                    "session reached terminal action"
                );
                break;
            }

            if attempt < self.policy.max_attempts {
                std::thread::sleep(self.policy.backoff.delay_for_attempt(attempt));
            }
        }

        Ok(RetryReport {
            session_id: self.session_id.clone(),
            attempts_made,
            last_response,
            cancelled: false,
        })
    }
}
