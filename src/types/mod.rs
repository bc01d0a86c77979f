//! Type definitions for the risk-decision pipeline

pub mod alert;
pub mod decision;
pub mod rule;
pub mod transaction;

pub use alert::{AlertStatus, FraudAlert, Severity};
pub use decision::{Action, Decision, DecisionStatus, EngineTier, Explainability, RiskThresholds};
pub use rule::{Rule, RuleCondition, RuleStatus};
pub use transaction::{Channel, TransactionInput, UserHistory};
