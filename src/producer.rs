//! NATS publisher for decisions and alerts

use crate::types::alert::FraudAlert;
use crate::types::decision::Decision;
use anyhow::Result;
use async_nats::{Client, Subject};
use tracing::debug;

/// Publishes pipeline output to NATS
#[derive(Clone)]
pub struct DecisionPublisher {
    client: Client,
    decision_subject: String,
    alert_subject: String,
}

impl DecisionPublisher {
    pub fn new(client: Client, decision_subject: &str, alert_subject: &str) -> Self {
        Self {
            client,
            decision_subject: decision_subject.to_string(),
            alert_subject: alert_subject.to_string(),
        }
    }

    /// Publish a decision on the decision subject
    pub async fn publish_decision(&self, decision: &Decision) -> Result<()> {
        let payload = serde_json::to_vec(decision)?;
        self.client
            .publish(self.decision_subject.clone(), payload.into())
            .await?;

        debug!(
            transaction_id = %decision.transaction_id,
            risk_score = decision.risk_score,
            status = %decision.status,
            "Published decision"
        );
        Ok(())
    }

    /// Answer a request-reply analyze call with the decision
    pub async fn reply(&self, reply: Subject, decision: &Decision) -> Result<()> {
        let payload = serde_json::to_vec(decision)?;
        self.client.publish(reply, payload.into()).await?;
        Ok(())
    }

    /// Publish a created or refreshed alert
    pub async fn publish_alert(&self, alert: &FraudAlert) -> Result<()> {
        let payload = serde_json::to_vec(alert)?;
        self.client
            .publish(self.alert_subject.clone(), payload.into())
            .await?;

        debug!(
            alert_id = %alert.alert_id,
            transaction_id = %alert.transaction_id,
            severity = ?alert.severity,
            "Published fraud alert"
        );
        Ok(())
    }

    pub fn decision_subject(&self) -> &str {
        &self.decision_subject
    }

    pub fn alert_subject(&self) -> &str {
        &self.alert_subject
    }
}
