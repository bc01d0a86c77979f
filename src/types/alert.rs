//! Fraud alert records and their lifecycle

use crate::error::AlertError;
use crate::types::decision::{Decision, DecisionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    High,
    Critical,
}

impl Severity {
    /// Severity for a decision status; `None` when no alert is warranted
    pub fn for_status(status: DecisionStatus) -> Option<Self> {
        match status {
            DecisionStatus::Blocked => Some(Severity::Critical),
            DecisionStatus::Review => Some(Severity::High),
            DecisionStatus::Approved => None,
        }
    }
}

/// Alert lifecycle state. `Resolved` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    Pending,
    Resolved,
}

/// Alert raised for a decision that needs a human look
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAlert {
    /// Unique alert identifier
    pub alert_id: String,

    /// Associated transaction ID (one alert per transaction)
    pub transaction_id: String,

    pub severity: Severity,

    pub status: AlertStatus,

    /// Risk score of the decision that raised or last refreshed the alert
    pub risk_score: u8,

    /// Joined decision reasons
    pub details: String,

    /// Analyst working the alert
    pub assignee: Option<String>,

    pub escalated: bool,

    pub escalated_at: Option<DateTime<Utc>>,

    /// Analyst-supplied status on resolution
    pub final_status: Option<DecisionStatus>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub resolved_at: Option<DateTime<Utc>>,
}

impl FraudAlert {
    /// Raise an alert for a decision, if its status requires one
    pub fn from_decision(decision: &Decision) -> Option<Self> {
        let severity = Severity::for_status(decision.status)?;
        let now = Utc::now();

        Some(Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            transaction_id: decision.transaction_id.clone(),
            severity,
            status: AlertStatus::Pending,
            risk_score: decision.risk_score,
            details: decision.reasons.join(", "),
            assignee: None,
            escalated: false,
            escalated_at: None,
            final_status: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == AlertStatus::Pending
    }

    /// Refresh a pending alert from a newer decision for the same transaction.
    ///
    /// Assignment survives; severity follows the new decision unless the
    /// alert was escalated.
    pub fn refresh(&mut self, decision: &Decision) -> Result<(), AlertError> {
        self.ensure_pending()?;
        if let Some(severity) = Severity::for_status(decision.status) {
            if !self.escalated {
                self.severity = severity;
            }
        }
        self.risk_score = decision.risk_score;
        self.details = decision.reasons.join(", ");
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Assign to an analyst without changing status
    pub fn assign(&mut self, user: impl Into<String>) -> Result<(), AlertError> {
        self.ensure_pending()?;
        self.assignee = Some(user.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Force severity to Critical and record the escalation time
    pub fn escalate(&mut self) -> Result<(), AlertError> {
        self.ensure_pending()?;
        let now = Utc::now();
        self.severity = Severity::Critical;
        self.escalated = true;
        self.escalated_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Close the alert with the analyst's final status
    pub fn resolve(&mut self, final_status: DecisionStatus) -> Result<(), AlertError> {
        self.ensure_pending()?;
        let now = Utc::now();
        self.status = AlertStatus::Resolved;
        self.final_status = Some(final_status);
        self.resolved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    fn ensure_pending(&self) -> Result<(), AlertError> {
        match self.status {
            AlertStatus::Pending => Ok(()),
            AlertStatus::Resolved => Err(AlertError::AlreadyResolved(self.transaction_id.clone())),
        }
    }
}
