//! Decision records produced by the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Upper bound on reasons carried by a decision
pub const MAX_REASONS: usize = 10;

/// Categorical outcome of a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecisionStatus {
    Approved,
    Review,
    Blocked,
}

impl DecisionStatus {
    /// Whether this outcome needs an analyst alert
    pub fn requires_alert(self) -> bool {
        matches!(self, DecisionStatus::Review | DecisionStatus::Blocked)
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionStatus::Approved => "Approved",
            DecisionStatus::Review => "Review",
            DecisionStatus::Blocked => "Blocked",
        };
        f.write_str(s)
    }
}

/// Recommended action accompanying a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Allow,
    Monitor,
    Investigate,
    Deny,
}

/// Scoring tier that produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineTier {
    Remote,
    Hybrid,
    RulesOnly,
    Precheck,
    Degraded,
}

impl EngineTier {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineTier::Remote => "remote",
            EngineTier::Hybrid => "hybrid",
            EngineTier::RulesOnly => "rules_only",
            EngineTier::Precheck => "precheck",
            EngineTier::Degraded => "degraded",
        }
    }

    /// Engine version string. The hybrid tier embeds the model type.
    pub fn engine_version(self, model_type: Option<&str>) -> String {
        match self {
            EngineTier::Remote => "v4.0-remote".to_string(),
            EngineTier::Hybrid => format!("v3.0-hybrid-{}", model_type.unwrap_or("unknown")),
            EngineTier::RulesOnly => "v2.1-rules".to_string(),
            EngineTier::Precheck => "v1.0-precheck".to_string(),
            EngineTier::Degraded => "v0.0-degraded".to_string(),
        }
    }
}

/// Score thresholds mapping a risk score onto status and action
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// At or above: Blocked / deny
    pub block: u8,
    /// At or above: Review / investigate
    pub investigate: u8,
    /// At or above: Review / monitor
    pub monitor: u8,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            block: 85,
            investigate: 60,
            monitor: 40,
        }
    }
}

impl RiskThresholds {
    /// Classify a 0-100 risk score
    pub fn classify(&self, score: u8) -> (DecisionStatus, Action) {
        if score >= self.block {
            (DecisionStatus::Blocked, Action::Deny)
        } else if score >= self.investigate {
            (DecisionStatus::Review, Action::Investigate)
        } else if score >= self.monitor {
            (DecisionStatus::Review, Action::Monitor)
        } else {
            (DecisionStatus::Approved, Action::Allow)
        }
    }
}

/// Structured breakdown of the signals behind a decision
pub type Explainability = BTreeMap<String, Value>;

/// Final output of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub transaction_id: String,

    /// Risk score (0-100)
    pub risk_score: u8,

    pub status: DecisionStatus,

    pub action: Action,

    /// Human-readable reasons, most significant first
    pub reasons: Vec<String>,

    pub explainability: Explainability,

    pub tier: EngineTier,

    pub engine_version: String,

    /// Wall-clock time spent producing the decision
    pub decision_latency_ms: f64,

    pub decided_at: DateTime<Utc>,
}

impl Decision {
    /// Create a decision; the score is clamped and reasons truncated.
    pub fn new(
        transaction_id: impl Into<String>,
        risk_score: u8,
        status: DecisionStatus,
        action: Action,
        tier: EngineTier,
        engine_version: String,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            risk_score: risk_score.min(100),
            status,
            action,
            reasons: Vec::new(),
            explainability: Explainability::new(),
            tier,
            engine_version,
            decision_latency_ms: 0.0,
            decided_at: Utc::now(),
        }
    }

    pub fn with_reasons(mut self, mut reasons: Vec<String>) -> Self {
        reasons.truncate(MAX_REASONS);
        self.reasons = reasons;
        self
    }

    pub fn with_explainability(mut self, explainability: Explainability) -> Self {
        self.explainability = explainability;
        self
    }

    /// Stamp latency measured by the orchestrator
    pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
        self.decision_latency_ms = latency.as_secs_f64() * 1000.0;
        self
    }

    /// Same decision content, ignoring timing metadata
    pub fn same_outcome(&self, other: &Decision) -> bool {
        self.transaction_id == other.transaction_id
            && self.risk_score == other.risk_score
            && self.status == other.status
            && self.action == other.action
            && self.reasons == other.reasons
            && self.tier == other.tier
            && self.engine_version == other.engine_version
    }
}
