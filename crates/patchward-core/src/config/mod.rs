//! Engine configuration.
//!
//! All tunable policy lives here: per-class breaker budgets, confidence
//! floors, cascade ceilings, risk keywords, and rate limits. Floors are
//! normalized at configuration time — the envelope schema contract declares
//! a minimum confidence of 0.1, so a floor configured below that is clamped
//! up before it can ever reach the validator. Invalid policies never make it
//! into a running engine.
//!
//! # Example
//!
//! ```rust
//! use patchward_core::config::EngineConfig;
//!
//! let config = EngineConfig::builder()
//!     .max_syntax_attempts(5)
//!     .max_logic_attempts(3)
//!     .syntax_confidence_floor(0.05) // clamped to 0.1
//!     .build();
//!
//! assert_eq!(config.syntax_confidence_floor, 0.1);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Minimum confidence floor accepted by the envelope schema contract.
///
/// Floors configured below this value are clamped up at build time rather
/// than rejected at validation time.
pub const SCHEMA_CONFIDENCE_MINIMUM: f64 = 0.1;

/// Policy configuration for a [`DecisionEngine`](crate::engine::DecisionEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum syntax-class attempts before the breaker denies admission.
    #[serde(default = "default_max_syntax_attempts")]
    pub max_syntax_attempts: u32,

    /// Maximum logic-class attempts before the breaker denies admission.
    #[serde(default = "default_max_logic_attempts")]
    pub max_logic_attempts: u32,

    /// Tolerated failure fraction for syntax attempts, in [0,1].
    ///
    /// Syntax retries are cheap, so the budget is generous by default.
    #[serde(default = "default_syntax_error_budget")]
    pub syntax_error_budget: f64,

    /// Tolerated failure fraction for logic attempts, in [0,1].
    #[serde(default = "default_logic_error_budget")]
    pub logic_error_budget: f64,

    /// Minimum syntax confidence required to execute a patch.
    #[serde(default = "default_syntax_floor")]
    pub syntax_confidence_floor: f64,

    /// Minimum logic confidence required to execute a patch.
    #[serde(default = "default_logic_floor")]
    pub logic_confidence_floor: f64,

    /// Weight of the model signal when blending with historical success
    /// rate: `w * model + (1 - w) * history`. In [0,1].
    #[serde(default = "default_blend_weight")]
    pub blend_weight: f64,

    /// Smoothing factor of the per-class moving success rate, in [0,1].
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,

    /// Cascade chain length beyond which attempts hard-stop.
    #[serde(default = "default_cascade_depth_limit")]
    pub cascade_depth_limit: usize,

    /// Consecutive identical failure signatures that hard-stop a lineage.
    ///
    /// A single occurrence is not a repeat: values below 2 are normalized
    /// up to 2 at build time.
    #[serde(default = "default_cascade_repeat_limit")]
    pub cascade_repeat_limit: usize,

    /// Whether a successful attempt clears the cascade chain.
    #[serde(default)]
    pub reset_cascade_on_success: bool,

    /// Keywords whose presence in a patch forces risk classification.
    ///
    /// Matching is case-insensitive substring search over the combined
    /// patch text.
    #[serde(default = "default_risk_keywords")]
    pub risk_keywords: Vec<String>,

    /// Whether risky patches escalate to human review instead of executing.
    #[serde(default = "default_true")]
    pub require_review_on_risky: bool,

    /// Maximum decision requests admitted per rate window.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_window: u32,

    /// Length of the sliding rate window.
    #[serde(default = "default_rate_window")]
    #[serde(with = "humantime_serde")]
    pub rate_window: Duration,

    /// Capacity of the outcome history ring.
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
}

const fn default_max_syntax_attempts() -> u32 {
    5
}

const fn default_max_logic_attempts() -> u32 {
    3
}

const fn default_syntax_error_budget() -> f64 {
    0.8
}

const fn default_logic_error_budget() -> f64 {
    0.6
}

const fn default_syntax_floor() -> f64 {
    0.3
}

const fn default_logic_floor() -> f64 {
    0.5
}

const fn default_blend_weight() -> f64 {
    0.7
}

const fn default_ema_alpha() -> f64 {
    0.2
}

const fn default_cascade_depth_limit() -> usize {
    5
}

const fn default_cascade_repeat_limit() -> usize {
    3
}

fn default_risk_keywords() -> Vec<String> {
    [
        "drop table",
        "alter table",
        "truncate",
        "delete from",
        "auth_bypass",
        "disable_auth",
        "production",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

const fn default_true() -> bool {
    true
}

const fn default_rate_limit() -> u32 {
    60
}

const fn default_rate_window() -> Duration {
    Duration::from_secs(60)
}

const fn default_memory_capacity() -> usize {
    500
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EngineConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Returns a copy with floors and fractions clamped to their valid
    /// ranges.
    ///
    /// The builder already normalizes its output; this exists for
    /// configurations that arrive through deserialization.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.syntax_confidence_floor = clamp_floor(self.syntax_confidence_floor);
        self.logic_confidence_floor = clamp_floor(self.logic_confidence_floor);
        self.syntax_error_budget = self.syntax_error_budget.clamp(0.0, 1.0);
        self.logic_error_budget = self.logic_error_budget.clamp(0.0, 1.0);
        self.blend_weight = self.blend_weight.clamp(0.0, 1.0);
        self.ema_alpha = self.ema_alpha.clamp(0.0, 1.0);
        self.cascade_repeat_limit = self.cascade_repeat_limit.max(2);
        self
    }
}

/// Clamps a confidence floor into `[SCHEMA_CONFIDENCE_MINIMUM, 1.0]`.
fn clamp_floor(floor: f64) -> f64 {
    if floor.is_nan() {
        return SCHEMA_CONFIDENCE_MINIMUM;
    }
    floor.clamp(SCHEMA_CONFIDENCE_MINIMUM, 1.0)
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Creates a builder seeded with default policy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: EngineConfig {
                max_syntax_attempts: default_max_syntax_attempts(),
                max_logic_attempts: default_max_logic_attempts(),
                syntax_error_budget: default_syntax_error_budget(),
                logic_error_budget: default_logic_error_budget(),
                syntax_confidence_floor: default_syntax_floor(),
                logic_confidence_floor: default_logic_floor(),
                blend_weight: default_blend_weight(),
                ema_alpha: default_ema_alpha(),
                cascade_depth_limit: default_cascade_depth_limit(),
                cascade_repeat_limit: default_cascade_repeat_limit(),
                reset_cascade_on_success: false,
                risk_keywords: default_risk_keywords(),
                require_review_on_risky: default_true(),
                rate_limit_per_window: default_rate_limit(),
                rate_window: default_rate_window(),
                memory_capacity: default_memory_capacity(),
            },
        }
    }

    /// Sets the syntax attempt ceiling.
    #[must_use]
    pub const fn max_syntax_attempts(mut self, max: u32) -> Self {
        self.config.max_syntax_attempts = max;
        self
    }

    /// Sets the logic attempt ceiling.
    #[must_use]
    pub const fn max_logic_attempts(mut self, max: u32) -> Self {
        self.config.max_logic_attempts = max;
        self
    }

    /// Sets the tolerated syntax failure fraction.
    #[must_use]
    pub const fn syntax_error_budget(mut self, fraction: f64) -> Self {
        self.config.syntax_error_budget = fraction;
        self
    }

    /// Sets the tolerated logic failure fraction.
    #[must_use]
    pub const fn logic_error_budget(mut self, fraction: f64) -> Self {
        self.config.logic_error_budget = fraction;
        self
    }

    /// Sets the syntax confidence floor (clamped to the schema minimum).
    #[must_use]
    pub const fn syntax_confidence_floor(mut self, floor: f64) -> Self {
        self.config.syntax_confidence_floor = floor;
        self
    }

    /// Sets the logic confidence floor (clamped to the schema minimum).
    #[must_use]
    pub const fn logic_confidence_floor(mut self, floor: f64) -> Self {
        self.config.logic_confidence_floor = floor;
        self
    }

    /// Sets the model/history blend weight.
    #[must_use]
    pub const fn blend_weight(mut self, weight: f64) -> Self {
        self.config.blend_weight = weight;
        self
    }

    /// Sets the moving-success-rate smoothing factor.
    #[must_use]
    pub const fn ema_alpha(mut self, alpha: f64) -> Self {
        self.config.ema_alpha = alpha;
        self
    }

    /// Sets the cascade depth ceiling.
    #[must_use]
    pub const fn cascade_depth_limit(mut self, limit: usize) -> Self {
        self.config.cascade_depth_limit = limit;
        self
    }

    /// Sets the consecutive-identical-signature ceiling.
    #[must_use]
    pub const fn cascade_repeat_limit(mut self, limit: usize) -> Self {
        self.config.cascade_repeat_limit = limit;
        self
    }

    /// Sets whether a success clears the cascade chain.
    #[must_use]
    pub const fn reset_cascade_on_success(mut self, reset: bool) -> Self {
        self.config.reset_cascade_on_success = reset;
        self
    }

    /// Replaces the risk keyword set.
    #[must_use]
    pub fn risk_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.risk_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Sets whether risky patches escalate to human review.
    #[must_use]
    pub const fn require_review_on_risky(mut self, require: bool) -> Self {
        self.config.require_review_on_risky = require;
        self
    }

    /// Sets the per-window request limit.
    #[must_use]
    pub const fn rate_limit_per_window(mut self, limit: u32) -> Self {
        self.config.rate_limit_per_window = limit;
        self
    }

    /// Sets the sliding rate window length.
    #[must_use]
    pub const fn rate_window(mut self, window: Duration) -> Self {
        self.config.rate_window = window;
        self
    }

    /// Sets the outcome history capacity.
    #[must_use]
    pub const fn memory_capacity(mut self, capacity: usize) -> Self {
        self.config.memory_capacity = capacity;
        self
    }

    /// Builds the configuration, normalizing floors and fractions.
    #[must_use]
    pub fn build(self) -> EngineConfig {
        self.config.normalized()
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
