// Fire-and-forget webhook notifications for pledge events
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outbound event payload: raw data only, formatting happens downstream
#[derive(Debug, Clone, Serialize)]
pub struct PledgeEvent {
    pub event: String,
    pub server_id: Uuid,
    pub server_name: String,
    pub user_id: Uuid,
    pub username: String,

    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_pledged: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub server_cost: Decimal,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PledgeEvent {
    pub fn created(
        server_id: Uuid,
        server_name: String,
        user_id: Uuid,
        username: String,
        amount: Decimal,
        total_pledged: Decimal,
        server_cost: Decimal,
    ) -> Self {
        Self {
            event: "pledge_created".to_string(),
            server_id,
            server_name,
            user_id,
            username,
            amount,
            total_pledged,
            server_cost,
            reason: None,
        }
    }

    pub fn cancelled(
        server_id: Uuid,
        server_name: String,
        user_id: Uuid,
        username: String,
        amount: Decimal,
        total_pledged: Decimal,
        server_cost: Decimal,
    ) -> Self {
        Self {
            event: "pledge_cancelled".to_string(),
            server_id,
            server_name,
            user_id,
            username,
            amount,
            total_pledged,
            server_cost,
            reason: None,
        }
    }

    pub fn charge_failed(
        server_id: Uuid,
        server_name: String,
        user_id: Uuid,
        username: String,
        amount: Decimal,
        total_pledged: Decimal,
        server_cost: Decimal,
        reason: String,
    ) -> Self {
        Self {
            event: "charge_failed".to_string(),
            server_id,
            server_name,
            user_id,
            username,
            amount,
            total_pledged,
            server_cost,
            reason: Some(reason),
        }
    }
}

/// Hands pledge events to an external webhook. Delivery is spawned and
/// never awaited on the settlement path; a dead endpoint costs nothing
/// but a warning.
pub struct PledgeNotifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl PledgeNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }

    /// No-op notifier for deployments without a webhook configured
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn notify(&self, event: PledgeEvent) {
        let url = match &self.webhook_url {
            Some(u) => u.clone(),
            None => return,
        };
        let client = self.client.clone();

        tokio::spawn(async move {
            match client.post(&url).json(&event).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!("🔔 Delivered {} notification", event.event);
                }
                Ok(resp) => {
                    warn!(
                        "Notification endpoint returned {} for {}",
                        resp.status(),
                        event.event
                    );
                }
                Err(e) => {
                    warn!("Notification delivery failed for {}: {}", event.event, e);
                }
            }
        });
    }
}
