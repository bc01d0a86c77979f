//! End-to-end decision scenarios across the tier cascade.

use chrono::{Duration as ChronoDuration, Utc};
use fraud_risk_pipeline::config::{AppConfig, FailurePolicy, MissingModelPolicy};
use fraud_risk_pipeline::error::PipelineError;
use fraud_risk_pipeline::models::{FraudClassifier, LocalModelScorer};
use fraud_risk_pipeline::remote::{HttpRemoteScorer, RemotePrediction, RemoteScorer};
use fraud_risk_pipeline::types::{
    Action, DecisionStatus, EngineTier, Rule, TransactionInput, UserHistory,
};
use fraud_risk_pipeline::{DecisionOrchestrator, DecisionStore, RuleBook};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct ConstantClassifier(f64);

impl FraudClassifier for ConstantClassifier {
    fn model_type(&self) -> &str {
        "onnx"
    }

    fn version(&self) -> &str {
        "2026.03"
    }

    fn feature_names(&self) -> &[String] {
        &[]
    }

    fn predict_proba(&self, _inputs: &[f32]) -> Result<f64, PipelineError> {
        Ok(self.0)
    }
}

struct PanickingRemote;

#[async_trait::async_trait]
impl RemoteScorer for PanickingRemote {
    async fn is_healthy(&self) -> bool {
        true
    }

    async fn score(&self, _tx: &TransactionInput) -> Option<RemotePrediction> {
        panic!("remote client bug")
    }
}

fn benign(id: &str, amount: f64) -> TransactionInput {
    TransactionInput::new(id, amount)
        .with_location("Mumbai")
        .with_country("IN")
        .with_merchant("Grocery Mart")
        .with_ip_address("10.0.0.8")
}

fn rules_only() -> DecisionOrchestrator {
    DecisionOrchestrator::new(&AppConfig::default(), LocalModelScorer::heuristic())
}

fn heuristic_hybrid() -> DecisionOrchestrator {
    let mut config = AppConfig::default();
    config.models.missing_model_policy = MissingModelPolicy::Heuristic;
    DecisionOrchestrator::new(&config, LocalModelScorer::heuristic())
}

async fn remote_server(health: ResponseTemplate, predict: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(health)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(predict)
        .mount(&server)
        .await;
    server
}

fn remote_for(server: &MockServer) -> Arc<HttpRemoteScorer> {
    Arc::new(HttpRemoteScorer::new(&AppConfig::default().remote).with_base_url(server.uri()))
}

#[tokio::test]
async fn large_amount_in_high_risk_zone_is_blocked() {
    let tx = TransactionInput::new("SCN-A", 20_000.0).with_location("High Risk Zone");

    for orchestrator in [rules_only(), heuristic_hybrid()] {
        let decision = orchestrator.analyze(&tx, &[]).await;
        assert_eq!(decision.status, DecisionStatus::Blocked, "{:?}", decision.tier);
        assert_eq!(decision.action, Action::Deny);
        assert!(decision
            .reasons
            .iter()
            .any(|r| r.contains("High Risk Zone")));
    }
}

#[tokio::test]
async fn new_account_with_moderate_amount_needs_review() {
    let tx = benign("SCN-B", 600.0).with_history(UserHistory {
        account_created_at: Some((Utc::now() - ChronoDuration::hours(3)).to_rfc3339()),
        ..UserHistory::default()
    });

    let decision = rules_only().analyze(&tx, &[]).await;

    assert_ne!(decision.status, DecisionStatus::Approved);
    assert!(decision.risk_score >= 60);
    assert!(decision
        .reasons
        .contains(&"Rule: High value on new account (<24h)".to_string()));
}

#[tokio::test]
async fn remote_low_risk_maps_to_review_monitor() {
    let server = remote_server(
        ResponseTemplate::new(200).set_body_json(json!({"status": "healthy", "model": "loaded"})),
        ResponseTemplate::new(200).set_body_json(json!({
            "fraud_probability": 0.2,
            "is_fraud": false,
            "risk_level": "LOW",
            "confidence": 0.8,
            "inference_time_ms": 1.4,
            "fraud_indicators": []
        })),
    )
    .await;

    let orchestrator = rules_only().connect_remote(remote_for(&server)).await;
    let decision = orchestrator.analyze(&benign("SCN-C", 75.0), &[]).await;

    assert_eq!(decision.tier, EngineTier::Remote);
    assert_eq!(decision.status, DecisionStatus::Review);
    assert_eq!(decision.action, Action::Monitor);
    assert_eq!(decision.risk_score, 20);
}

#[tokio::test]
async fn missing_model_artifact_falls_back_to_rules() {
    let mut config = AppConfig::default();
    config.models.model_path = Some("/nonexistent/fraud_model.onnx".into());
    config.models.manifest_path = Some("/nonexistent/manifest.json".into());

    let orchestrator = DecisionOrchestrator::build(&config).await;
    assert_eq!(orchestrator.model_type(), "rules-fallback");
    assert!(!orchestrator.hybrid_enabled());

    let decision = orchestrator.analyze(&benign("SCN-D", 250.0), &[]).await;

    assert_eq!(decision.tier, EngineTier::RulesOnly);
    assert_eq!(decision.engine_version, "v2.1-rules");
    assert_eq!(decision.explainability["model_type"], json!("rules-fallback"));
}

#[tokio::test]
async fn unhealthy_remote_still_decides_locally() {
    let server = remote_server(
        ResponseTemplate::new(503),
        ResponseTemplate::new(200).set_body_json(json!({"risk_level": "CRITICAL"})),
    )
    .await;

    let started = Instant::now();
    let orchestrator = rules_only().connect_remote(remote_for(&server)).await;
    let decision = orchestrator.analyze(&benign("FALLBACK-1", 120.0), &[]).await;

    assert!(!orchestrator.remote_enabled());
    assert_eq!(decision.tier, EngineTier::RulesOnly);
    assert_eq!(decision.status, DecisionStatus::Approved);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn remote_error_after_healthy_probe_falls_through() {
    let server = remote_server(
        ResponseTemplate::new(200).set_body_json(json!({"model": "loaded"})),
        ResponseTemplate::new(500),
    )
    .await;

    let orchestrator = heuristic_hybrid().connect_remote(remote_for(&server)).await;
    assert!(orchestrator.remote_enabled());

    let decision = orchestrator.analyze(&benign("FALLBACK-2", 120.0), &[]).await;
    assert_eq!(decision.tier, EngineTier::Hybrid);
    assert_eq!(decision.engine_version, "v3.0-hybrid-rules-fallback");
}

#[tokio::test]
async fn loaded_model_fuses_with_rules() {
    let local = LocalModelScorer::with_classifier(Box::new(ConstantClassifier(0.9)));
    let orchestrator = DecisionOrchestrator::new(&AppConfig::default(), local);

    let decision = orchestrator.analyze(&benign("HYB-1", 120.0), &[]).await;

    // 0.7 * 90 + 0.3 * 10 = 66
    assert_eq!(decision.tier, EngineTier::Hybrid);
    assert_eq!(decision.engine_version, "v3.0-hybrid-onnx");
    assert_eq!(decision.risk_score, 66);
    assert_eq!(decision.status, DecisionStatus::Review);
    assert_eq!(decision.action, Action::Investigate);
    assert!(decision.reasons[0].starts_with("ML Model: High fraud risk"));
    assert_eq!(decision.explainability["rule_score"], json!(10));
}

#[tokio::test]
async fn dynamic_rules_from_rule_book() {
    let book = RuleBook::new(vec![
        Rule::new("R1", "Over five hundred", "amount > 500"),
        Rule::new("R2", "Broken rule", "amount >> five"),
        Rule::new("R3", "Heavy rule", "amount >= 100").with_weight(35),
    ]);

    let decision = rules_only()
        .analyze(&benign("DYN-1", 700.0), &book.snapshot())
        .await;

    // 10 baseline + 20 + 35
    assert_eq!(decision.risk_score, 65);
    assert!(decision.reasons.contains(&"Rule: Over five hundred".to_string()));
    assert!(decision.reasons.contains(&"Rule: Heavy rule".to_string()));
}

#[tokio::test]
async fn repeated_analysis_is_idempotent() {
    let orchestrator = rules_only();
    let store = DecisionStore::new();
    let tx = TransactionInput::new("IDEM-1", 20_000.0).with_location("High Risk Zone");

    let first = orchestrator.analyze(&tx, &[]).await;
    let first_alert = store.record(&first).unwrap();
    let second = orchestrator.analyze(&tx, &[]).await;
    let second_alert = store.record(&second).unwrap();

    assert!(first.same_outcome(&second));
    assert!(store.get_decision("IDEM-1").unwrap().same_outcome(&first));
    assert_eq!(first_alert.alert_id, second_alert.alert_id);
    assert_eq!(store.alert_count(), 1);
}

#[tokio::test]
async fn alerts_track_decision_status() {
    let orchestrator = heuristic_hybrid();
    let store = DecisionStore::new();

    let txs = vec![
        benign("ALERT-1", 40.0),
        benign("ALERT-2", 7_500.0).with_merchant("Lucky Casino"),
        TransactionInput::new("ALERT-3", 20_000.0).with_location("High Risk Zone"),
        benign("ALERT-4", 900.0).with_country("RU"),
        TransactionInput::new("ALERT-5", 0.0),
    ];

    for decision in orchestrator.analyze_batch(&txs, &[]).await {
        store.record(&decision);
        let alert = store.get_alert(&decision.transaction_id);
        match decision.status {
            DecisionStatus::Approved => assert!(alert.is_none(), "{}", decision.transaction_id),
            DecisionStatus::Review | DecisionStatus::Blocked => {
                assert!(alert.is_some(), "{}", decision.transaction_id)
            }
        }
    }
    assert_eq!(
        store.get_alert("ALERT-3").unwrap().severity,
        fraud_risk_pipeline::types::Severity::Critical
    );
}

#[tokio::test]
async fn risk_score_stays_in_range() {
    let orchestrator = heuristic_hybrid();
    let amounts = [-50.0, 0.0, 0.01, 999.99, 5_000.5, 15_000.01, 1e12, f64::NAN, f64::INFINITY];
    let locations = ["High Risk Zone", "Lagos, Nigeria", "Mumbai", ""];
    let merchants = ["DarkCasino Crypto Betting", "Grocery Mart"];

    let mut txs = Vec::new();
    for (i, amount) in amounts.iter().enumerate() {
        for location in locations {
            for merchant in merchants {
                txs.push(
                    TransactionInput::new(format!("RANGE-{i}-{location}-{merchant}"), *amount)
                        .with_location(location)
                        .with_merchant(merchant)
                        .with_country("KP")
                        .with_history(UserHistory {
                            user_txn_count: 10,
                            user_total_spent: 10.0,
                            user_risk_score: 99.0,
                            account_created_at: Some(Utc::now().to_rfc3339()),
                        }),
                );
            }
        }
    }

    let rules = vec![
        Rule::new("R1", "Any amount", "amount >= 0").with_weight(500),
        Rule::new("R2", "Risky", "user_risk_score > 1"),
    ];

    for decision in orchestrator.analyze_batch(&txs, &rules).await {
        assert!(decision.risk_score <= 100);
        assert!(decision.reasons.len() <= 10);
    }
}

#[tokio::test]
async fn panic_in_tier_uses_failure_policy() {
    let approve = rules_only()
        .connect_remote(Arc::new(PanickingRemote))
        .await
        .analyze(&benign("PANIC-1", 10.0), &[])
        .await;
    assert_eq!(approve.tier, EngineTier::Degraded);
    assert_eq!(approve.status, DecisionStatus::Approved);

    let mut config = AppConfig::default();
    config.detection.failure_policy = FailurePolicy::Review;
    let review = DecisionOrchestrator::new(&config, LocalModelScorer::heuristic())
        .connect_remote(Arc::new(PanickingRemote))
        .await
        .analyze(&benign("PANIC-2", 10.0), &[])
        .await;
    assert_eq!(review.status, DecisionStatus::Review);
    assert_eq!(review.action, Action::Investigate);
    assert_eq!(review.engine_version, "v0.0-degraded");
}

#[tokio::test]
async fn resolution_overrides_stored_decision() {
    let orchestrator = rules_only();
    let store = DecisionStore::new();
    let tx = TransactionInput::new("RES-1", 20_000.0).with_location("High Risk Zone");

    store.record(&orchestrator.analyze(&tx, &[]).await);
    store.assign("RES-1", "analyst@bank").unwrap();
    store.resolve("RES-1", DecisionStatus::Approved).unwrap();

    assert_eq!(
        store.get_decision("RES-1").unwrap().status,
        DecisionStatus::Approved
    );
    assert!(store.resolve("RES-1", DecisionStatus::Blocked).is_err());
}

#[tokio::test]
async fn oversized_rule_weight_cannot_degrade_decision() {
    let rules = vec![
        Rule::new("W1", "Any amount", "amount > 0").with_weight(u32::MAX),
        Rule::new("W2", "Any amount again", "amount > 0").with_weight(u32::MAX),
    ];
    let tx = TransactionInput::new("WEIGHT-1", 20_000.0).with_location("High Risk Zone");

    for orchestrator in [rules_only(), heuristic_hybrid()] {
        let decision = orchestrator.analyze(&tx, &rules).await;
        assert_ne!(decision.tier, EngineTier::Degraded);
        assert_eq!(decision.status, DecisionStatus::Blocked);
        assert!(decision.risk_score <= 100);
    }

    let decision = rules_only().analyze(&tx, &rules).await;
    assert_eq!(decision.risk_score, 100);
    assert_eq!(decision.explainability["matched_rules"], json!(["Any amount", "Any amount again"]));
}

#[tokio::test]
async fn offset_timestamp_uses_local_hour() {
    let orchestrator = heuristic_hybrid();

    // 03:30 in Mumbai is 22:00 UTC the previous day
    let local = benign("TZ-1", 120.0).with_timestamp("2026-03-05T03:30:00+05:30");
    let decision = orchestrator.analyze(&local, &[]).await;
    assert!(decision
        .reasons
        .iter()
        .any(|r| r.starts_with("ML Factor: unusual_hour = 3:00")));

    let evening = benign("TZ-2", 120.0).with_timestamp("2026-03-04T22:00:00Z");
    let decision = orchestrator.analyze(&evening, &[]).await;
    assert!(!decision.reasons.iter().any(|r| r.contains("unusual_hour")));
}

#[tokio::test]
async fn partly_malformed_rules_file_keeps_good_rules() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[
            {{"id": "F1", "name": "Over five hundred", "condition": "amount > 500"}},
            {{"id": "F2", "name": "Paused rule", "condition": "amount > 0", "status": "Paused"}},
            {{"id": "F3", "name": "Unparseable", "condition": "amount >> five"}}
        ]"#
    )
    .unwrap();

    let book = RuleBook::default();
    assert_eq!(book.reload_from(file.path()).unwrap(), 2);

    let decision = rules_only()
        .analyze(&benign("FILE-1", 700.0), &book.snapshot())
        .await;

    // 10 baseline + 20
    assert_eq!(decision.risk_score, 30);
    assert_eq!(decision.explainability["matched_rules"], json!(["Over five hundred"]));
    assert_eq!(decision.explainability["skipped_rules"], json!(1));
}
