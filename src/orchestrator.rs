//! Decision orchestrator: runs the tier cascade for one transaction.
//!
//! Tiers are tried in priority order (remote, hybrid, rules-only) and the
//! first one to produce a result wins. `analyze` never fails: panics and
//! internal faults become the configured failure-policy decision.

use crate::config::{AppConfig, FailurePolicy, MissingModelPolicy};
use crate::error::PipelineError;
use crate::feature_extractor::FeatureExtractor;
use crate::fusion::ScoreFusion;
use crate::models::local::{LocalModelScorer, HEURISTIC_MODEL_TYPE};
use crate::remote::{HttpRemoteScorer, RemoteScorer};
use crate::rule_engine::RuleEngine;
use crate::types::decision::{Action, Decision, DecisionStatus, EngineTier, Explainability};
use crate::types::rule::Rule;
use crate::types::transaction::TransactionInput;
use chrono::Utc;
use futures::{FutureExt, StreamExt};
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

const PRECHECK_DEFAULT_REASON: &str = "External System Validation Failed";

/// Shared, immutable decision pipeline
pub struct DecisionOrchestrator {
    extractor: FeatureExtractor,
    rule_engine: RuleEngine,
    local: LocalModelScorer,
    fusion: ScoreFusion,
    /// Present only if the startup health probe succeeded
    remote: Option<Arc<dyn RemoteScorer>>,
    missing_model_policy: MissingModelPolicy,
    failure_policy: FailurePolicy,
    workers: usize,
}

impl DecisionOrchestrator {
    /// Orchestrator over the local tiers only
    pub fn new(config: &AppConfig, local: LocalModelScorer) -> Self {
        Self {
            extractor: FeatureExtractor::new(config.features.clone()),
            rule_engine: RuleEngine::new(config.rules.clone(), config.features.clone()),
            local,
            fusion: ScoreFusion::from_config(&config.detection),
            remote: None,
            missing_model_policy: config.models.missing_model_policy,
            failure_policy: config.detection.failure_policy,
            workers: config.pipeline.workers.max(1),
        }
    }

    /// Load model artifacts and, if enabled, probe the remote service
    pub async fn build(config: &AppConfig) -> Self {
        let local = LocalModelScorer::load(&config.models);
        let orchestrator = Self::new(config, local);

        if config.remote.enabled {
            let remote = Arc::new(HttpRemoteScorer::new(&config.remote));
            orchestrator.connect_remote(remote).await
        } else {
            info!("Remote scorer disabled");
            orchestrator
        }
    }

    /// Attach a remote scorer if it passes the health probe.
    ///
    /// Health is established once; an unhealthy scorer is dropped and the
    /// tier is skipped for the lifetime of the orchestrator.
    pub async fn connect_remote(mut self, remote: Arc<dyn RemoteScorer>) -> Self {
        if remote.is_healthy().await {
            info!("Remote scorer healthy, remote tier enabled");
            self.remote = Some(remote);
        } else {
            warn!("Remote scorer unavailable, using local tiers");
            self.remote = None;
        }
        self
    }

    pub fn with_rule_engine(mut self, rule_engine: RuleEngine) -> Self {
        self.rule_engine = rule_engine;
        self
    }

    pub fn remote_enabled(&self) -> bool {
        self.remote.is_some()
    }

    /// Model type of the local tier
    pub fn model_type(&self) -> &str {
        self.local.model_type()
    }

    /// Whether the hybrid tier runs for local decisions
    pub fn hybrid_enabled(&self) -> bool {
        self.local.has_model() || self.missing_model_policy == MissingModelPolicy::Heuristic
    }

    /// Produce a decision for one transaction against a rule snapshot.
    pub async fn analyze(&self, tx: &TransactionInput, rules: &[Rule]) -> Decision {
        let start = Instant::now();

        let decision = match AssertUnwindSafe(self.run_cascade(tx, rules))
            .catch_unwind()
            .await
        {
            Ok(decision) => decision,
            Err(payload) => {
                let e = PipelineError::Internal(panic_message(payload.as_ref()));
                error!(transaction_id = %tx.transaction_id, error = %e, "Decision pipeline panicked");
                self.degraded(tx, &e)
            }
        };

        let mut decision = decision.with_latency(start.elapsed());
        decision.decided_at = Utc::now();

        info!(
            transaction_id = %decision.transaction_id,
            risk_score = decision.risk_score,
            status = %decision.status,
            tier = decision.tier.as_str(),
            latency_ms = decision.decision_latency_ms,
            "Decision produced"
        );
        decision
    }

    /// Score many transactions with bounded parallelism; output keeps input order.
    pub async fn analyze_batch(&self, txs: &[TransactionInput], rules: &[Rule]) -> Vec<Decision> {
        futures::stream::iter(txs)
            .map(|tx| self.analyze(tx, rules))
            .buffered(self.workers)
            .collect()
            .await
    }

    async fn run_cascade(&self, tx: &TransactionInput, rules: &[Rule]) -> Decision {
        if let Some(status) = tx.status {
            return self.precheck(tx, status);
        }

        if let Some(remote) = &self.remote {
            match remote.score(tx).await {
                Some(prediction) => return prediction.to_decision(&tx.transaction_id),
                None => debug!(
                    transaction_id = %tx.transaction_id,
                    "Remote tier produced no result, falling through"
                ),
            }
        }

        let rule_outcome = self.rule_engine.evaluate(tx, rules);

        if self.hybrid_enabled() {
            let features = self.extractor.extract(tx);
            let prediction = self.local.predict(&features);
            let fused = self.fusion.fuse(&prediction, &rule_outcome);

            let decision = Decision::new(
                &tx.transaction_id,
                fused.risk_score,
                fused.status,
                fused.action,
                EngineTier::Hybrid,
                EngineTier::Hybrid.engine_version(Some(&prediction.model_type)),
            )
            .with_reasons(fused.reasons)
            .with_explainability(fused.explainability);
            return decision;
        }

        let (status, action) = self.fusion.thresholds().classify(rule_outcome.score);

        let mut explainability = Explainability::new();
        explainability.insert("rule_score".into(), json!(rule_outcome.score));
        explainability.insert("final_score".into(), json!(rule_outcome.score));
        explainability.insert("baseline".into(), json!(rule_outcome.baseline));
        explainability.insert("matched_rules".into(), json!(rule_outcome.matched_rules));
        explainability.insert("skipped_rules".into(), json!(rule_outcome.skipped_rules));
        explainability.insert("model_type".into(), json!(HEURISTIC_MODEL_TYPE));
        explainability.insert("primary_engine".into(), json!("Rules"));

        Decision::new(
            &tx.transaction_id,
            rule_outcome.score,
            status,
            action,
            EngineTier::RulesOnly,
            EngineTier::RulesOnly.engine_version(None),
        )
        .with_reasons(rule_outcome.reasons)
        .with_explainability(explainability)
    }

    /// Status supplied by an upstream validation step
    fn precheck(&self, tx: &TransactionInput, status: DecisionStatus) -> Decision {
        let (risk_score, action) = match status {
            DecisionStatus::Blocked => (90, Action::Deny),
            DecisionStatus::Review => (60, Action::Investigate),
            DecisionStatus::Approved => (0, Action::Allow),
        };

        let reasons = match &tx.reasons {
            Some(reasons) if !reasons.is_empty() => reasons.clone(),
            _ => vec![PRECHECK_DEFAULT_REASON.to_string()],
        };

        let mut explainability = Explainability::new();
        explainability.insert("precomputed_status".into(), json!(status));
        explainability.insert("primary_engine".into(), json!("Precheck"));

        Decision::new(
            &tx.transaction_id,
            risk_score,
            status,
            action,
            EngineTier::Precheck,
            EngineTier::Precheck.engine_version(None),
        )
        .with_reasons(reasons)
        .with_explainability(explainability)
    }

    fn degraded(&self, tx: &TransactionInput, e: &PipelineError) -> Decision {
        let (risk_score, status, action, reason, policy) = match self.failure_policy {
            FailurePolicy::Approve => (
                0,
                DecisionStatus::Approved,
                Action::Allow,
                "Approved by default, service degraded",
                "approve",
            ),
            FailurePolicy::Review => (
                60,
                DecisionStatus::Review,
                Action::Investigate,
                "Manual review required, service degraded",
                "review",
            ),
        };

        let mut explainability = Explainability::new();
        explainability.insert("failure_policy".into(), json!(policy));
        explainability.insert("error".into(), json!(e.to_string()));

        Decision::new(
            &tx.transaction_id,
            risk_score,
            status,
            action,
            EngineTier::Degraded,
            EngineTier::Degraded.engine_version(None),
        )
        .with_reasons(vec![reason.to_string()])
        .with_explainability(explainability)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
