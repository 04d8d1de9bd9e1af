use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::escalation::FailureEscalation;
use super::recorder::{RunSummary, WithdrawalRecorder};
use super::ChargeRecord;
use crate::config::SettlementConfig;
use crate::error::{AppResult, SettlementError};
use crate::ledger::models::{ActivityEventType, ActivityLog, ChargeCandidate, GameServer};
use crate::ledger::PledgeLedger;
use crate::notify::{PledgeEvent, PledgeNotifier};
use crate::optimizer;
use crate::payments::{ChargeOutcome, ChargeRequest, PaymentProcessor};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// A candidate that passed the eligibility filter, with both processor
/// handles resolved
#[derive(Debug, Clone)]
struct EligiblePledge {
    pledge_id: Uuid,
    user_id: Uuid,
    username: String,
    amount: Decimal,
    customer_id: String,
    payment_method_id: String,
}

/// Split a server's candidates into chargeable pledges and silent skips
fn partition_eligible(candidates: Vec<ChargeCandidate>) -> (Vec<EligiblePledge>, usize) {
    let total = candidates.len();

    let eligible: Vec<EligiblePledge> = candidates
        .into_iter()
        .filter(|c| c.is_eligible())
        .filter_map(|c| match (c.stripe_customer_id, c.payment_method_id) {
            (Some(customer_id), Some(payment_method_id)) => Some(EligiblePledge {
                pledge_id: c.pledge_id,
                user_id: c.user_id,
                username: c.username,
                amount: c.amount,
                customer_id,
                payment_method_id,
            }),
            _ => None,
        })
        .collect();

    let skipped = total - eligible.len();
    (eligible, skipped)
}

/// Releases the per-server in-flight slot when the run finishes,
/// whichever way it finishes
struct InFlightGuard<'a> {
    servers: &'a Mutex<HashSet<Uuid>>,
    server_id: Uuid,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(servers: &'a Mutex<HashSet<Uuid>>, server_id: Uuid) -> Option<Self> {
        if servers.lock().insert(server_id) {
            Some(Self { servers, server_id })
        } else {
            None
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.servers.lock().remove(&self.server_id);
    }
}

/// Runs the charge batch for one server: optimize the eligible set,
/// attempt exactly one charge per pledge, feed failures to escalation
/// and hand the aggregate to the recorder.
///
/// Pledge outcomes are isolated from each other, and servers are
/// isolated from other servers: nothing here aborts a sibling.
pub struct ChargeExecutor {
    config: SettlementConfig,
    ledger: Arc<dyn PledgeLedger>,
    processor: Arc<dyn PaymentProcessor>,
    escalation: FailureEscalation,
    recorder: WithdrawalRecorder,
    notifier: Arc<PledgeNotifier>,
    rate_limiter: DirectRateLimiter,
    in_flight: Mutex<HashSet<Uuid>>,
}

impl ChargeExecutor {
    pub fn new(
        config: SettlementConfig,
        ledger: Arc<dyn PledgeLedger>,
        processor: Arc<dyn PaymentProcessor>,
        notifier: Arc<PledgeNotifier>,
    ) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(config.charges_per_second.max(1)).unwrap_or(NonZeroU32::MIN),
        );
        let escalation = FailureEscalation::new(config.max_failed_payments, ledger.clone());
        let recorder = WithdrawalRecorder::new(config.clone(), ledger.clone());

        Self {
            rate_limiter: RateLimiter::direct(quota),
            escalation,
            recorder,
            config,
            ledger,
            processor,
            notifier,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Settle one server for the given run date
    pub async fn settle_server(
        &self,
        server: &GameServer,
        scheduled_date: NaiveDate,
    ) -> AppResult<RunSummary> {
        // One worker per server per process
        let _guard = InFlightGuard::acquire(&self.in_flight, server.id).ok_or(
            SettlementError::RunInProgress {
                server_id: server.id,
            },
        )?;

        // Idempotency: a recorded withdrawal means this run already happened
        if self
            .ledger
            .withdrawal_exists(server.id, scheduled_date)
            .await?
        {
            return Err(SettlementError::DuplicateRun {
                server_id: server.id,
                scheduled_date,
            }
            .into());
        }

        let withdrawal_date =
            scheduled_date + chrono::Duration::days(self.config.charge_days_before);

        let candidates = self.ledger.charge_candidates(server.id).await?;
        let (eligible, skipped) = partition_eligible(candidates);
        if skipped > 0 {
            debug!(
                "Skipping {} ineligible pledge(s) on server {}",
                skipped, server.id
            );
        }

        info!(
            "💰 Settling server {} ({}): {} eligible pledge(s)",
            server.name,
            server.id,
            eligible.len()
        );

        let amounts: Vec<Decimal> = eligible.iter().map(|p| p.amount).collect();
        let result = optimizer::optimize(&amounts, server.cost, self.config.min_pledge);
        let total_pledged = result.total_pledged;

        let charges: Vec<(EligiblePledge, Decimal)> =
            eligible.into_iter().zip(result.optimized_costs).collect();

        let records = stream::iter(charges)
            .map(|(pledge, due)| {
                self.charge_pledge(server, pledge, due, scheduled_date, total_pledged)
            })
            .buffer_unordered(self.config.max_concurrent_charges)
            .collect::<Vec<ChargeRecord>>()
            .await;

        self.recorder
            .record(server.id, scheduled_date, withdrawal_date, &records)
            .await
    }

    /// Exactly one charge attempt for one pledge. Never returns an
    /// error: every path collapses into the record's outcome.
    async fn charge_pledge(
        &self,
        server: &GameServer,
        pledge: EligiblePledge,
        due: Decimal,
        scheduled_date: NaiveDate,
        total_pledged: Decimal,
    ) -> ChargeRecord {
        self.rate_limiter.until_ready().await;

        let request = ChargeRequest {
            customer_id: pledge.customer_id.clone(),
            payment_method_id: pledge.payment_method_id.clone(),
            amount: due,
            idempotency_key: format!("pledge-{}-{}", pledge.pledge_id, scheduled_date),
            server_id: server.id,
            user_id: pledge.user_id,
            pledge_id: pledge.pledge_id,
        };

        let outcome = match timeout(
            Duration::from_secs(self.config.charge_timeout_secs),
            self.processor.charge(&request),
        )
        .await
        {
            Ok(outcome) => outcome,
            // A timed-out charge is a failed charge, never silently dropped
            Err(_) => ChargeOutcome::Failed {
                reason: format!(
                    "charge timed out after {}s",
                    self.config.charge_timeout_secs
                ),
            },
        };

        match &outcome {
            ChargeOutcome::Succeeded { captured } => {
                self.on_charge_success(server, &pledge, *captured).await;
            }
            ChargeOutcome::Failed { reason } => {
                self.on_charge_failure(server, &pledge, due, total_pledged, reason)
                    .await;
            }
        }

        ChargeRecord {
            pledge_id: pledge.pledge_id,
            user_id: pledge.user_id,
            amount: due,
            outcome,
        }
    }

    async fn on_charge_success(
        &self,
        server: &GameServer,
        pledge: &EligiblePledge,
        captured: Decimal,
    ) {
        debug!("✅ Captured {} for pledge {}", captured, pledge.pledge_id);

        if let Err(e) = self
            .ledger
            .mark_pledge_charged(pledge.pledge_id, captured)
            .await
        {
            error!(
                "Failed to stamp pledge {} after capture: {}",
                pledge.pledge_id, e
            );
        }

        if let Err(e) = self.escalation.on_success(pledge.user_id).await {
            error!(
                "Failed to reset failure counter for user {}: {}",
                pledge.user_id, e
            );
        }

        let entry = ActivityLog::new(
            ActivityEventType::ChargeSucceeded,
            json!({ "amount": captured.to_string() }),
        )
        .server(server.id)
        .user(pledge.user_id)
        .pledge(pledge.pledge_id);

        if let Err(e) = self.ledger.record_activity(&entry).await {
            warn!("Failed to record charge activity: {}", e);
        }
    }

    async fn on_charge_failure(
        &self,
        server: &GameServer,
        pledge: &EligiblePledge,
        due: Decimal,
        total_pledged: Decimal,
        reason: &str,
    ) {
        warn!(
            "❌ Charge failed for pledge {} on server {}: {}",
            pledge.pledge_id, server.id, reason
        );

        if let Err(e) = self
            .escalation
            .on_failure(pledge.user_id, pledge.pledge_id, server.id, reason)
            .await
        {
            error!("Escalation failed for user {}: {}", pledge.user_id, e);
        }

        let entry = ActivityLog::new(
            ActivityEventType::ChargeFailed,
            json!({ "amount": due.to_string(), "reason": reason }),
        )
        .server(server.id)
        .user(pledge.user_id)
        .pledge(pledge.pledge_id);

        if let Err(e) = self.ledger.record_activity(&entry).await {
            warn!("Failed to record charge activity: {}", e);
        }

        self.notifier.notify(PledgeEvent::charge_failed(
            server.id,
            server.name.clone(),
            pledge.user_id,
            pledge.username.clone(),
            due,
            total_pledged,
            server.cost,
            reason.to_string(),
        ));
    }
}
