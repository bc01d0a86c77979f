//! In-memory decision and alert store keyed by transaction id

use crate::error::AlertError;
use crate::types::alert::{AlertStatus, FraudAlert};
use crate::types::decision::{Action, Decision, DecisionStatus};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

/// Idempotent upsert of decisions and their alerts.
///
/// Lock order is always decisions, then alerts, then the insertion order.
/// A bounded store evicts its oldest transactions once it holds more than
/// `max_decisions`; transactions with a pending alert are never evicted.
#[derive(Default)]
pub struct DecisionStore {
    decisions: RwLock<HashMap<String, Decision>>,
    alerts: RwLock<HashMap<String, FraudAlert>>,
    /// Transaction ids, oldest first
    order: Mutex<VecDeque<String>>,
    /// Zero means unbounded
    max_decisions: usize,
}

impl DecisionStore {
    /// Unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that keeps at most `max_decisions` settled transactions
    pub fn bounded(max_decisions: usize) -> Self {
        Self {
            max_decisions,
            ..Self::default()
        }
    }

    /// Store a decision and keep its alert in step.
    ///
    /// Returns the alert that was created or refreshed, if any. Once a
    /// transaction's alert is resolved the analyst outcome is final and
    /// later decisions for it are ignored.
    pub fn record(&self, decision: &Decision) -> Option<FraudAlert> {
        let mut decisions = self.decisions.write();
        let mut alerts = self.alerts.write();
        let tx_id = &decision.transaction_id;

        if alerts
            .get(tx_id)
            .is_some_and(|alert| alert.status == AlertStatus::Resolved)
        {
            debug!(transaction_id = %tx_id, "Alert already resolved, decision not recorded");
            return None;
        }

        if decisions.insert(tx_id.clone(), decision.clone()).is_none() {
            self.order.lock().push_back(tx_id.clone());
        }

        let alert = if !decision.status.requires_alert() {
            if alerts.remove(tx_id).is_some() {
                info!(transaction_id = %tx_id, "Pending alert cleared by approval");
            }
            None
        } else {
            match alerts.get_mut(tx_id) {
                Some(alert) => match alert.refresh(decision) {
                    Ok(()) => {
                        debug!(transaction_id = %tx_id, severity = ?alert.severity, "Alert refreshed");
                        Some(alert.clone())
                    }
                    Err(_) => None,
                },
                None => FraudAlert::from_decision(decision).map(|alert| {
                    info!(
                        alert_id = %alert.alert_id,
                        transaction_id = %tx_id,
                        severity = ?alert.severity,
                        risk_score = alert.risk_score,
                        "Alert raised"
                    );
                    alerts.insert(tx_id.clone(), alert.clone());
                    alert
                }),
            }
        };

        self.evict(&mut decisions, &mut alerts);
        alert
    }

    /// Drop the oldest settled transactions until the store is within bounds
    fn evict(
        &self,
        decisions: &mut HashMap<String, Decision>,
        alerts: &mut HashMap<String, FraudAlert>,
    ) {
        if self.max_decisions == 0 || decisions.len() <= self.max_decisions {
            return;
        }

        let mut order = self.order.lock();
        let mut remaining = order.len();
        let mut evicted = 0usize;
        while decisions.len() > self.max_decisions && remaining > 0 {
            remaining -= 1;
            let Some(tx_id) = order.pop_front() else { break };
            if alerts.get(&tx_id).is_some_and(FraudAlert::is_pending) {
                order.push_back(tx_id);
                continue;
            }
            decisions.remove(&tx_id);
            alerts.remove(&tx_id);
            evicted += 1;
        }

        if evicted > 0 {
            debug!(evicted, retained = decisions.len(), "Evicted settled decisions");
        }
    }

    pub fn get_decision(&self, transaction_id: &str) -> Option<Decision> {
        self.decisions.read().get(transaction_id).cloned()
    }

    pub fn get_alert(&self, transaction_id: &str) -> Option<FraudAlert> {
        self.alerts.read().get(transaction_id).cloned()
    }

    /// Pending alerts, newest first
    pub fn pending_alerts(&self) -> Vec<FraudAlert> {
        let mut pending: Vec<FraudAlert> = self
            .alerts
            .read()
            .values()
            .filter(|a| a.is_pending())
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        pending
    }

    pub fn decision_count(&self) -> usize {
        self.decisions.read().len()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.read().len()
    }

    pub fn assign(&self, transaction_id: &str, user: &str) -> Result<FraudAlert, AlertError> {
        self.update_alert(transaction_id, |alert| alert.assign(user))
    }

    pub fn escalate(&self, transaction_id: &str) -> Result<FraudAlert, AlertError> {
        self.update_alert(transaction_id, FraudAlert::escalate)
    }

    /// Resolve the alert and overwrite the stored decision's status.
    pub fn resolve(
        &self,
        transaction_id: &str,
        final_status: DecisionStatus,
    ) -> Result<FraudAlert, AlertError> {
        let mut decisions = self.decisions.write();
        let mut alerts = self.alerts.write();

        let alert = alerts
            .get_mut(transaction_id)
            .ok_or_else(|| AlertError::NotFound(transaction_id.to_string()))?;
        alert.resolve(final_status)?;

        if let Some(decision) = decisions.get_mut(transaction_id) {
            decision.status = final_status;
            decision.action = match final_status {
                DecisionStatus::Blocked => Action::Deny,
                DecisionStatus::Review => Action::Investigate,
                DecisionStatus::Approved => Action::Allow,
            };
        }

        info!(
            transaction_id = %transaction_id,
            final_status = %final_status,
            "Alert resolved"
        );
        Ok(alert.clone())
    }

    fn update_alert<F>(&self, transaction_id: &str, f: F) -> Result<FraudAlert, AlertError>
    where
        F: FnOnce(&mut FraudAlert) -> Result<(), AlertError>,
    {
        let mut alerts = self.alerts.write();
        let alert = alerts
            .get_mut(transaction_id)
            .ok_or_else(|| AlertError::NotFound(transaction_id.to_string()))?;
        f(alert)?;
        Ok(alert.clone())
    }
}
