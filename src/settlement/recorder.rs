use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use serde_json::json;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::ChargeRecord;
use crate::config::SettlementConfig;
use crate::error::{AppError, AppResult, SettlementError};
use crate::ledger::models::{ActivityEventType, ActivityLog, Withdrawal, WithdrawalStatus};
use crate::ledger::PledgeLedger;

const PERSIST_ATTEMPTS: u32 = 3;
const PERSIST_RETRY_DELAY_MS: u64 = 500;

/// Aggregate outcome of one server's run, returned to the trigger caller
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub server_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub withdrawal_date: NaiveDate,

    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub collected_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub platform_fee: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub processor_fee: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub net_amount: Decimal,

    pub status: WithdrawalStatus,
    pub pledge_count: i32,
    pub successful_charges: i32,
    pub failed_charges: i32,
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Fold a run's charge records into the settlement totals.
///
/// The processor fee is an estimate (the processor determines the real
/// one); the fixed part applies per withdrawal, so an empty run still
/// books it and the net goes negative.
pub fn summarize(
    config: &SettlementConfig,
    server_id: Uuid,
    scheduled_date: NaiveDate,
    withdrawal_date: NaiveDate,
    records: &[ChargeRecord],
) -> RunSummary {
    let total_amount: Decimal = records.iter().map(|r| r.amount).sum();
    let collected_amount: Decimal = records.iter().filter_map(|r| r.captured()).sum();

    let successful_charges = records.iter().filter(|r| r.outcome.is_success()).count() as i32;
    let failed_charges = records.len() as i32 - successful_charges;

    let platform_fee = round_money(collected_amount * config.platform_fee_pct);
    let processor_fee =
        round_money(collected_amount * config.processor_fee_pct + config.processor_fee_fixed);
    let net_amount = collected_amount - platform_fee - processor_fee;

    let status = if successful_charges > 0 {
        WithdrawalStatus::Completed
    } else {
        WithdrawalStatus::Failed
    };

    RunSummary {
        server_id,
        scheduled_date,
        withdrawal_date,
        total_amount,
        collected_amount,
        platform_fee,
        processor_fee,
        net_amount,
        status,
        pledge_count: records.len() as i32,
        successful_charges,
        failed_charges,
    }
}

/// Persists the append-only Withdrawal audit record for each run
pub struct WithdrawalRecorder {
    config: SettlementConfig,
    ledger: Arc<dyn PledgeLedger>,
}

impl WithdrawalRecorder {
    pub fn new(config: SettlementConfig, ledger: Arc<dyn PledgeLedger>) -> Self {
        Self { config, ledger }
    }

    /// Aggregate the records and persist the Withdrawal. Persistence is
    /// the one step that is fatal for this server's run when it fails,
    /// so it is retried before giving up; other servers are unaffected
    /// either way.
    pub async fn record(
        &self,
        server_id: Uuid,
        scheduled_date: NaiveDate,
        withdrawal_date: NaiveDate,
        records: &[ChargeRecord],
    ) -> AppResult<RunSummary> {
        let summary = summarize(
            &self.config,
            server_id,
            scheduled_date,
            withdrawal_date,
            records,
        );

        let withdrawal = Withdrawal {
            id: Uuid::new_v4(),
            server_id,
            scheduled_date,
            withdrawal_date,
            total_amount: summary.total_amount,
            collected_amount: summary.collected_amount,
            platform_fee: summary.platform_fee,
            processor_fee: summary.processor_fee,
            net_amount: summary.net_amount,
            status: summary.status,
            pledge_count: summary.pledge_count,
            successful_charges: summary.successful_charges,
            failed_charges: summary.failed_charges,
            created_at: Utc::now(),
        };

        self.persist_with_retry(&withdrawal).await?;

        info!(
            "🏦 Recorded withdrawal for server {}: collected {} of {} ({} ok / {} failed)",
            server_id,
            summary.collected_amount,
            summary.total_amount,
            summary.successful_charges,
            summary.failed_charges
        );

        let entry = ActivityLog::new(
            ActivityEventType::WithdrawalRecorded,
            json!({
                "scheduled_date": scheduled_date,
                "collected_amount": summary.collected_amount.to_string(),
                "net_amount": summary.net_amount.to_string(),
                "successful_charges": summary.successful_charges,
                "failed_charges": summary.failed_charges,
                "status": summary.status.as_str(),
            }),
        )
        .server(server_id);

        if let Err(e) = self.ledger.record_activity(&entry).await {
            warn!("Failed to record withdrawal activity: {}", e);
        }

        Ok(summary)
    }

    async fn persist_with_retry(&self, withdrawal: &Withdrawal) -> AppResult<()> {
        let mut last_error = None;

        for attempt in 1..=PERSIST_ATTEMPTS {
            match self.ledger.create_withdrawal(withdrawal).await {
                Ok(()) => return Ok(()),
                // A concurrent worker already recorded this run; not ours
                // to retry
                Err(AppError::Settlement(SettlementError::DuplicateRun {
                    server_id,
                    scheduled_date,
                })) => {
                    return Err(AppError::Settlement(SettlementError::DuplicateRun {
                        server_id,
                        scheduled_date,
                    }))
                }
                Err(e) => {
                    error!(
                        "Withdrawal persist attempt {}/{} failed for server {}: {}",
                        attempt, PERSIST_ATTEMPTS, withdrawal.server_id, e
                    );
                    last_error = Some(e);
                    if attempt < PERSIST_ATTEMPTS {
                        sleep(Duration::from_millis(PERSIST_RETRY_DELAY_MS)).await;
                    }
                }
            }
        }

        Err(AppError::Settlement(SettlementError::WithdrawalPersist {
            server_id: withdrawal.server_id,
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        }))
    }
}
