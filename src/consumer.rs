//! NATS consumer for analyze requests

use crate::types::transaction::TransactionInput;
use anyhow::{Context, Result};
use async_nats::{Client, Subscriber};
use tracing::info;

/// Receives transactions to analyze from NATS
pub struct TransactionConsumer {
    client: Client,
    subject: String,
}

impl TransactionConsumer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Subscribe to the transaction subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self
            .client
            .subscribe(self.subject.clone())
            .await
            .with_context(|| format!("Failed to subscribe to {}", self.subject))?;
        info!(subject = %self.subject, "Subscribed to transaction subject");
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Decode an analyze request payload
pub fn decode_transaction(payload: &[u8]) -> Result<TransactionInput> {
    serde_json::from_slice(payload).context("Failed to deserialize transaction")
}
