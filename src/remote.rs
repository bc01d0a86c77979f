//! Remote inference service adapter.
//!
//! Wraps the external `/health` + `/predict` contract. Every failure mode
//! (network, timeout, bad status, undecodable body) collapses into "no
//! result" so the orchestrator simply falls through to the local tiers.

use crate::config::RemoteConfig;
use crate::error::PipelineError;
use crate::types::decision::{
    Action, Decision, DecisionStatus, EngineTier, Explainability, MAX_REASONS,
};
use crate::types::transaction::TransactionInput;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

const MAX_REMOTE_INDICATORS: usize = 3;

/// A scoring tier living outside the process
#[async_trait]
pub trait RemoteScorer: Send + Sync {
    /// Bounded health probe
    async fn is_healthy(&self) -> bool;

    /// Score one transaction; `None` on any failure
    async fn score(&self, tx: &TransactionInput) -> Option<RemotePrediction>;
}

fn default_probability() -> f64 {
    0.5
}

fn default_risk_level() -> String {
    "UNKNOWN".to_string()
}

/// `/predict` response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePrediction {
    #[serde(default = "default_probability")]
    pub fraud_probability: f64,
    #[serde(default)]
    pub is_fraud: bool,
    #[serde(default = "default_risk_level")]
    pub risk_level: String,
    #[serde(default = "default_probability")]
    pub confidence: f64,
    #[serde(default)]
    pub inference_time_ms: f64,
    #[serde(default, alias = "indicators")]
    pub fraud_indicators: Vec<String>,
}

impl RemotePrediction {
    /// Status and action from the remote risk level
    pub fn classify(&self) -> (DecisionStatus, Action) {
        match self.risk_level.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" | "HIGH" => (DecisionStatus::Blocked, Action::Deny),
            "MEDIUM" => (DecisionStatus::Review, Action::Investigate),
            "LOW" => (DecisionStatus::Review, Action::Monitor),
            _ => (DecisionStatus::Approved, Action::Allow),
        }
    }

    /// floor(p * 100), clamped
    pub fn risk_score(&self) -> u8 {
        let p = if self.fraud_probability.is_finite() {
            self.fraud_probability
        } else {
            default_probability()
        };
        (p * 100.0).floor().clamp(0.0, 100.0) as u8
    }

    pub fn to_decision(&self, transaction_id: &str) -> Decision {
        let (status, action) = self.classify();

        let mut reasons = vec![
            format!(
                "Remote: Fraud probability {:.1}%",
                self.fraud_probability * 100.0
            ),
            format!("Remote: Risk level {}", self.risk_level),
        ];
        reasons.extend(
            self.fraud_indicators
                .iter()
                .take(MAX_REMOTE_INDICATORS)
                .map(|indicator| format!("Remote: {indicator}")),
        );
        reasons.truncate(MAX_REASONS);

        let mut explainability = Explainability::new();
        explainability.insert("remote_fraud_probability".into(), json!(self.fraud_probability));
        explainability.insert("risk_level".into(), json!(self.risk_level));
        explainability.insert("confidence".into(), json!(self.confidence));
        explainability.insert("is_fraud".into(), json!(self.is_fraud));
        explainability.insert("inference_time_ms".into(), json!(self.inference_time_ms));
        explainability.insert("fraud_indicators".into(), json!(self.fraud_indicators));
        explainability.insert("primary_engine".into(), json!("Remote"));

        Decision::new(
            transaction_id,
            self.risk_score(),
            status,
            action,
            EngineTier::Remote,
            EngineTier::Remote.engine_version(None),
        )
        .with_reasons(reasons)
        .with_explainability(explainability)
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    transaction_id: &'a str,
    features: Map<String, Value>,
}

/// Map a transaction onto the remote feature contract.
pub fn map_transaction_to_features(tx: &TransactionInput) -> Map<String, Value> {
    let now = Utc::now();
    let ts = tx
        .parsed_timestamp()
        .unwrap_or_else(|| DateTime::<FixedOffset>::from(now));

    let mut features = Map::new();
    features.insert("TransactionAmt".into(), json!(tx.safe_amount()));
    features.insert("Transaction_hour".into(), json!(ts.hour()));
    features.insert(
        "Transaction_weekday".into(),
        json!(ts.weekday().num_days_from_monday()),
    );
    features.insert("currency".into(), json!(tx.currency));
    features.insert("location".into(), json!(tx.location));
    features.insert("country".into(), json!(tx.country));
    features.insert("merchant".into(), json!(tx.merchant));
    features.insert("category".into(), json!(tx.category));
    features.insert("channel".into(), json!(tx.channel));
    features.insert("card_type".into(), json!(tx.card_type));
    features.insert("device_type".into(), json!(tx.device_type));
    features.insert("browser".into(), json!(tx.browser));
    features.insert("os".into(), json!(tx.os));
    features.insert("ip_address".into(), json!(tx.ip_address));
    features.insert("user_txn_count".into(), json!(tx.history.user_txn_count));
    features.insert("user_total_spent".into(), json!(tx.history.user_total_spent));
    features.insert("user_risk_score".into(), json!(tx.history.user_risk_score));
    features.insert(
        "account_age_hours".into(),
        json!(tx.history.account_age_hours(now).unwrap_or(0.0)),
    );
    features
}

/// HTTP client for the remote inference service
pub struct HttpRemoteScorer {
    http: Client,
    base_url: String,
    health_timeout: Duration,
    predict_timeout: Duration,
}

impl HttpRemoteScorer {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            health_timeout: Duration::from_millis(config.health_timeout_ms),
            predict_timeout: Duration::from_millis(config.predict_timeout_ms),
        }
    }

    /// Sets a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, health: Duration, predict: Duration) -> Self {
        self.health_timeout = health;
        self.predict_timeout = predict;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn probe(&self) -> Result<(), PipelineError> {
        let url = format!("{}/health", self.base_url);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::RemoteUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::RemoteUnavailable(format!(
                "health check returned {status}"
            )));
        }

        // Non-JSON bodies are fine; a reported model state must be "loaded"
        let body = response.text().await.unwrap_or_default();
        if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(&body) {
            if let Some(model) = fields.get("model") {
                if model.as_str() != Some("loaded") {
                    return Err(PipelineError::RemoteUnavailable(format!(
                        "remote model not loaded ({model})"
                    )));
                }
            }
        }
        Ok(())
    }

    async fn predict(&self, tx: &TransactionInput) -> Result<RemotePrediction, PipelineError> {
        let url = format!("{}/predict", self.base_url);
        let request = PredictRequest {
            transaction_id: &tx.transaction_id,
            features: map_transaction_to_features(tx),
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::RemoteUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::RemoteUnavailable(format!(
                "API error {status}: {text}"
            )));
        }

        response
            .json::<RemotePrediction>()
            .await
            .map_err(|e| PipelineError::RemoteUnavailable(format!("undecodable response: {e}")))
    }
}

#[async_trait]
impl RemoteScorer for HttpRemoteScorer {
    async fn is_healthy(&self) -> bool {
        match tokio::time::timeout(self.health_timeout, self.probe()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(url = %self.base_url, error = %e, "Remote scorer unhealthy");
                false
            }
            Err(_) => {
                warn!(
                    url = %self.base_url,
                    timeout_ms = self.health_timeout.as_millis() as u64,
                    "Remote health check timed out"
                );
                false
            }
        }
    }

    async fn score(&self, tx: &TransactionInput) -> Option<RemotePrediction> {
        match tokio::time::timeout(self.predict_timeout, self.predict(tx)).await {
            Ok(Ok(prediction)) => {
                debug!(
                    transaction_id = %tx.transaction_id,
                    fraud_probability = prediction.fraud_probability,
                    risk_level = %prediction.risk_level,
                    "Remote prediction"
                );
                Some(prediction)
            }
            Ok(Err(e)) => {
                warn!(transaction_id = %tx.transaction_id, error = %e, "Remote scoring failed");
                None
            }
            Err(_) => {
                warn!(
                    transaction_id = %tx.transaction_id,
                    timeout_ms = self.predict_timeout.as_millis() as u64,
                    "Remote scoring timed out"
                );
                None
            }
        }
    }
}
