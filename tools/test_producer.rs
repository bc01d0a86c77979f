//! Test Transaction Producer
//!
//! Publishes synthetic benign and suspicious transactions to NATS for
//! exercising the risk pipeline end to end.

use chrono::{Duration as ChronoDuration, Utc};
use fraud_risk_pipeline::config::AppConfig;
use fraud_risk_pipeline::types::{Channel, TransactionInput, UserHistory};
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

const HOME_CITIES: &[&str] = &["Mumbai", "Delhi", "Bengaluru", "Pune", "Chennai"];
const EVERYDAY_MERCHANTS: &[&str] = &["Grocery Mart", "City Pharmacy", "Metro Fuel", "BookHub"];
const RISKY_MERCHANTS: &[&str] = &["CryptoSwap", "Lucky Casino", "BettingKing", "DarkMarket"];
const RISKY_LOCATIONS: &[&str] = &["High Risk Zone", "Lagos, Nigeria", "Unknown"];

/// Transaction generator for testing
struct TransactionGenerator {
    rng: rand::rngs::ThreadRng,
    transaction_counter: u64,
}

impl TransactionGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            transaction_counter: 0,
        }
    }

    fn next_id(&mut self) -> String {
        self.transaction_counter += 1;
        format!("TXN-{:010}", self.transaction_counter)
    }

    fn random_ip(&mut self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.rng.gen_range(1..255),
            self.rng.gen_range(0..255),
            self.rng.gen_range(0..255),
            self.rng.gen_range(1..255)
        )
    }

    /// Everyday purchase by an established customer at home
    fn generate_legitimate(&mut self) -> TransactionInput {
        let id = self.next_id();
        let txn_count = self.rng.gen_range(5..60);
        let avg = self.rng.gen_range(50.0..300.0);
        let now = Utc::now();

        let mut tx = TransactionInput::new(id, self.rng.gen_range(10.0..500.0))
            .with_location(self.random_choice(HOME_CITIES))
            .with_country("IN")
            .with_merchant(self.random_choice(EVERYDAY_MERCHANTS))
            .with_timestamp(now.to_rfc3339())
            .with_history(UserHistory {
                user_txn_count: txn_count,
                user_total_spent: avg * f64::from(txn_count),
                user_risk_score: self.rng.gen_range(0.0..20.0),
                account_created_at: Some(
                    (now - ChronoDuration::days(self.rng.gen_range(30..1000))).to_rfc3339(),
                ),
            });
        tx.currency = "INR".to_string();
        tx.channel = self.random_choice_of(&[Channel::MerchantCheckout, Channel::CardTransfer]);
        tx.ip_address = self.random_ip();
        tx.device_type = self.random_choice(&["mobile", "desktop"]).to_string();
        tx
    }

    /// Large purchase from a risky place, merchant or fresh account
    fn generate_suspicious(&mut self) -> TransactionInput {
        let id = self.next_id();
        let now = Utc::now();

        let mut tx = TransactionInput::new(id, self.rng.gen_range(1000.0..25000.0))
            .with_location(self.random_choice(RISKY_LOCATIONS))
            .with_country(self.random_choice(&["NG", "RU", "KP", "US"]))
            .with_merchant(self.random_choice(RISKY_MERCHANTS))
            .with_timestamp(now.to_rfc3339())
            .with_history(UserHistory {
                user_txn_count: self.rng.gen_range(0..5),
                user_total_spent: self.rng.gen_range(0.0..500.0),
                user_risk_score: self.rng.gen_range(30.0..90.0),
                account_created_at: Some(
                    (now - ChronoDuration::hours(self.rng.gen_range(1..72))).to_rfc3339(),
                ),
            });
        tx.channel = Channel::Web;
        tx.ip_address = self.random_ip();
        tx.device_type = "desktop".to_string();
        tx.browser = self.random_choice(&["Tor", "Unknown"]).to_string();
        tx
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }

    fn random_choice_of<T: Copy>(&mut self, choices: &[T]) -> T {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

/// Command line: `test_producer [count] [suspicious_rate] [delay_ms]`.
/// NATS url and subject come from the pipeline configuration.
struct RunOptions {
    count: u64,
    suspicious_rate: f64,
    delay: Duration,
}

impl RunOptions {
    fn from_args() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let arg = |i: usize| args.get(i).map(String::as_str);
        Self {
            count: arg(0).and_then(|s| s.parse().ok()).unwrap_or(100),
            suspicious_rate: arg(1)
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(0.1)
                .clamp(0.0, 1.0),
            delay: Duration::from_millis(arg(2).and_then(|s| s.parse().ok()).unwrap_or(100)),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    let config = AppConfig::load()?;
    let options = RunOptions::from_args();
    let subject = config.nats.transaction_subject.clone();

    info!(
        nats_url = %config.nats.url,
        subject = %subject,
        count = options.count,
        suspicious_rate = options.suspicious_rate,
        delay_ms = options.delay.as_millis() as u64,
        "Starting test transaction producer"
    );

    // Without a broker, log samples instead of publishing
    let client = match async_nats::connect(&config.nats.url).await {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS, running in dry-run mode");
            None
        }
    };

    let mut generator = TransactionGenerator::new();
    let mut rng = rand::thread_rng();
    let (mut legitimate, mut suspicious) = (0u64, 0u64);

    for i in 1..=options.count {
        let transaction = if rng.gen_bool(options.suspicious_rate) {
            suspicious += 1;
            generator.generate_suspicious()
        } else {
            legitimate += 1;
            generator.generate_legitimate()
        };

        match &client {
            Some(client) => {
                let payload = serde_json::to_vec(&transaction)?;
                client.publish(subject.clone(), payload.into()).await?;
                if i % 10 == 0 {
                    info!(published = i, legitimate, suspicious, "Progress");
                }
            }
            None if i == 1 || i % 10 == 0 => {
                info!("Sample transaction {}:\n{}", i, serde_json::to_string_pretty(&transaction)?);
            }
            None => {}
        }

        tokio::time::sleep(options.delay).await;
    }

    if let Some(client) = &client {
        client.flush().await?;
    }
    info!(total = options.count, legitimate, suspicious, "Done");

    Ok(())
}
