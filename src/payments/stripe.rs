use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{from_cents, to_cents, ChargeOutcome, ChargeRequest, PaymentProcessor};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Stripe PaymentIntents implementation: create-and-confirm in one call,
/// off-session, so saved payment methods are charged without the member
/// present.
pub struct StripeProcessor {
    client: reqwest::Client,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentResponse {
    id: String,
    status: String,
    amount_received: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
    code: Option<String>,
}

impl StripeProcessor {
    pub fn new(secret_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key,
        }
    }
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    async fn charge(&self, request: &ChargeRequest) -> ChargeOutcome {
        let params = [
            ("amount", to_cents(request.amount).to_string()),
            ("currency", "usd".to_string()),
            ("customer", request.customer_id.clone()),
            ("payment_method", request.payment_method_id.clone()),
            ("confirm", "true".to_string()),
            ("off_session", "true".to_string()),
            ("metadata[server_id]", request.server_id.to_string()),
            ("metadata[user_id]", request.user_id.to_string()),
            ("metadata[pledge_id]", request.pledge_id.to_string()),
        ];

        let response = self
            .client
            .post(format!("{STRIPE_API_BASE}/payment_intents"))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&params)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                return ChargeOutcome::Failed {
                    reason: format!("transport error: {}", e),
                }
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                return ChargeOutcome::Failed {
                    reason: format!("unreadable response: {}", e),
                }
            }
        };

        if !status.is_success() {
            let reason = serde_json::from_str::<StripeErrorEnvelope>(&body)
                .ok()
                .and_then(|env| env.error.message.or(env.error.code))
                .unwrap_or_else(|| format!("processor returned status {}", status));
            return ChargeOutcome::Failed { reason };
        }

        match serde_json::from_str::<PaymentIntentResponse>(&body) {
            Ok(intent) if intent.status == "succeeded" => {
                debug!("💳 Payment intent {} captured", intent.id);
                let captured = intent
                    .amount_received
                    .map(from_cents)
                    .unwrap_or(request.amount);
                ChargeOutcome::Succeeded { captured }
            }
            Ok(intent) => ChargeOutcome::Failed {
                reason: format!("payment intent {} in status {}", intent.id, intent.status),
            },
            Err(e) => ChargeOutcome::Failed {
                reason: format!("invalid response: {}", e),
            },
        }
    }
}
