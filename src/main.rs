//! Fraud Risk Pipeline - service entry point
//!
//! Consumes analyze requests from NATS, runs the decision cascade, and
//! publishes decisions and alerts.

use anyhow::Result;
use fraud_risk_pipeline::{
    config::AppConfig,
    consumer::{decode_transaction, TransactionConsumer},
    metrics::{MetricsReporter, PipelineMetrics},
    orchestrator::DecisionOrchestrator,
    producer::DecisionPublisher,
    rule_book::RuleBook,
    store::DecisionStore,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Shared state handed to every worker task
struct Services {
    orchestrator: DecisionOrchestrator,
    rule_book: Arc<RuleBook>,
    store: DecisionStore,
    publisher: DecisionPublisher,
    metrics: Arc<PipelineMetrics>,
    processed: AtomicU64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config)?;

    info!("Starting Fraud Risk Pipeline");
    info!(
        block = config.detection.thresholds.block,
        investigate = config.detection.thresholds.investigate,
        monitor = config.detection.thresholds.monitor,
        ml_weight = config.detection.ml_weight,
        rule_weight = config.detection.rule_weight,
        failure_policy = ?config.detection.failure_policy,
        "Configuration loaded"
    );

    let orchestrator = DecisionOrchestrator::build(&config).await;
    info!(
        model_type = orchestrator.model_type(),
        hybrid = orchestrator.hybrid_enabled(),
        remote = orchestrator.remote_enabled(),
        "Decision orchestrator ready"
    );

    let rule_book = Arc::new(RuleBook::default());
    if let Some(path) = config.rules.rules_path.clone() {
        if let Err(e) = rule_book.reload_from(&path) {
            warn!(error = %format!("{e:#}"), "Initial rule load failed, starting with no dynamic rules");
        }

        let refresh = Duration::from_secs(config.rules.refresh_secs.max(1));
        let book = rule_book.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresh);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = book.reload_from(&path) {
                    warn!(error = %format!("{e:#}"), "Rule refresh failed, keeping previous rules");
                }
            }
        });
    }

    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = TransactionConsumer::new(client.clone(), &config.nats.transaction_subject);
    let publisher = DecisionPublisher::new(
        client.clone(),
        &config.nats.decision_subject,
        &config.nats.alert_subject,
    );

    let metrics = Arc::new(PipelineMetrics::new());
    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
    tokio::spawn(reporter.start());

    let services = Arc::new(Services {
        orchestrator,
        rule_book,
        store: DecisionStore::bounded(config.store.max_decisions),
        publisher,
        metrics: metrics.clone(),
        processed: AtomicU64::new(0),
    });

    let workers = config.pipeline.workers.max(1);
    let semaphore = Arc::new(Semaphore::new(workers));
    info!(
        workers,
        subject = consumer.subject(),
        decisions = services.publisher.decision_subject(),
        alerts = services.publisher.alert_subject(),
        "Starting transaction processing loop"
    );

    let mut subscription = consumer.subscribe().await?;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            message = subscription.next() => {
                let Some(message) = message else { break };
                let permit = semaphore.clone().acquire_owned().await?;
                let services = services.clone();

                tokio::spawn(async move {
                    handle_message(&services, message).await;
                    drop(permit);
                });
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Pipeline shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("fraud_risk_pipeline={}", config.logging.level).parse()?);

    if config.logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn handle_message(services: &Services, message: async_nats::Message) {
    let tx = match decode_transaction(&message.payload) {
        Ok(tx) => tx,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Rejected analyze request");
            services.metrics.record_rejected();
            return;
        }
    };

    let rules = services.rule_book.snapshot();
    let decision = services.orchestrator.analyze(&tx, &rules).await;
    services.metrics.record_decision(&decision);
    let alert = services.store.record(&decision);

    if let Some(reply) = message.reply {
        if let Err(e) = services.publisher.reply(reply, &decision).await {
            error!(transaction_id = %decision.transaction_id, error = %e, "Failed to reply");
        }
    }

    if let Err(e) = services.publisher.publish_decision(&decision).await {
        error!(
            transaction_id = %decision.transaction_id,
            error = %e,
            "Failed to publish decision"
        );
    }

    if let Some(alert) = alert {
        services.metrics.record_alert(&alert);
        match services.publisher.publish_alert(&alert).await {
            Ok(()) => info!(
                transaction_id = %alert.transaction_id,
                severity = ?alert.severity,
                risk_score = alert.risk_score,
                "Fraud alert published"
            ),
            Err(e) => error!(
                transaction_id = %alert.transaction_id,
                error = %e,
                "Failed to publish fraud alert"
            ),
        }
    }

    let count = services.processed.fetch_add(1, Ordering::Relaxed) + 1;
    if count % 100 == 0 {
        let latency = services.metrics.latency_stats();
        info!(
            processed = count,
            throughput = format!("{:.1} tx/s", services.metrics.throughput()),
            avg_latency_us = latency.mean_us,
            "Processing milestone"
        );
    }
}
