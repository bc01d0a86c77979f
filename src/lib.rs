//! Hybrid fraud risk-decision pipeline.
//!
//! Scores a transaction by cascading across a remote inference service, a
//! local trained classifier fused with a rule engine, and the rule engine
//! alone, then keeps analyst alerts in step with the resulting decision.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_extractor;
pub mod fusion;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod producer;
pub mod remote;
pub mod rule_book;
pub mod rule_engine;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use error::{AlertError, PipelineError};
pub use feature_extractor::{FeatureExtractor, FeatureVector};
pub use fusion::ScoreFusion;
pub use models::LocalModelScorer;
pub use orchestrator::DecisionOrchestrator;
pub use remote::{HttpRemoteScorer, RemoteScorer};
pub use rule_book::RuleBook;
pub use rule_engine::RuleEngine;
pub use store::DecisionStore;
pub use types::{
    alert::FraudAlert,
    decision::{Action, Decision, DecisionStatus, EngineTier},
    rule::Rule,
    transaction::TransactionInput,
};
