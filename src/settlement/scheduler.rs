// Settlement scheduler - decides which servers are charged on a given day
//
// Members are charged CHARGE_DAYS_BEFORE days ahead of the server's
// withdrawal day, so the money is captured before the host withdraws.
// The due date is computed with real calendar arithmetic: the target
// date is today plus the lead time, and a server is due when its
// withdrawal day (clamped to the target month's length) lands on that
// date. Month boundaries and short months fall out of NaiveDate math
// instead of a wrap-past-31 approximation.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use super::executor::ChargeExecutor;
use super::recorder::RunSummary;
use crate::config::SettlementConfig;
use crate::error::{AppError, SettlementError};
use crate::ledger::PledgeLedger;

/// Per-server result of one settlement cycle
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub server_id: Uuid,
    pub server_name: String,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Charges attempted and the withdrawal recorded
    Settled(RunSummary),
    /// A withdrawal for this server and date already exists
    AlreadyRecorded,
    /// Another worker in this process holds the server
    InProgress,
    /// The run failed before a withdrawal could be recorded
    Failed { message: String },
}

/// Selects due servers each day and fans them out to the executor
#[derive(Clone)]
pub struct SettlementScheduler {
    config: SettlementConfig,
    ledger: Arc<dyn PledgeLedger>,
    executor: Arc<ChargeExecutor>,
}

impl SettlementScheduler {
    pub fn new(
        config: SettlementConfig,
        ledger: Arc<dyn PledgeLedger>,
        executor: Arc<ChargeExecutor>,
    ) -> Self {
        Self {
            config,
            ledger,
            executor,
        }
    }

    /// Start the daily loop (runs in background)
    pub fn start(&self) -> JoinHandle<()> {
        let scheduler = self.clone();

        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = Self::calculate_next_daily_execution(
                    now,
                    scheduler.config.execution_hour.min(23),
                );
                let wait = next.signed_duration_since(now);

                if wait.num_seconds() > 0 {
                    info!(
                        "⏰ Next settlement cycle at {} UTC",
                        next.format("%Y-%m-%d %H:%M:%S")
                    );
                    tokio::time::sleep(Duration::from_secs(wait.num_seconds() as u64)).await;
                }

                info!("🔄 Starting daily settlement cycle");
                let today = Utc::now().date_naive();
                let reports = scheduler.run_cycle(today).await;
                info!(
                    "✓ Settlement cycle completed: {} server(s) processed",
                    reports.len()
                );
            }
        })
    }

    /// Run the full settlement cycle for one calendar day. Safe to call
    /// twice for the same day: already-recorded servers are skipped.
    pub async fn run_cycle(&self, today: NaiveDate) -> Vec<RunReport> {
        let target = today + chrono::Duration::days(self.config.charge_days_before);

        let mut due = Vec::new();
        for day in due_days_for(target) {
            match self.ledger.servers_with_withdrawal_day(day).await {
                Ok(mut servers) => due.append(&mut servers),
                Err(e) => error!("Failed to query servers due on day {}: {}", day, e),
            }
        }

        info!(
            "📅 {} server(s) due for settlement on {} (withdrawal {})",
            due.len(),
            today,
            target
        );

        let executor = self.executor.clone();
        stream::iter(due)
            .map(|server| {
                let executor = executor.clone();
                async move {
                    let outcome = match executor.settle_server(&server, today).await {
                        Ok(summary) => RunOutcome::Settled(summary),
                        Err(AppError::Settlement(SettlementError::DuplicateRun { .. })) => {
                            info!("Server {} already settled for {}", server.id, today);
                            RunOutcome::AlreadyRecorded
                        }
                        Err(AppError::Settlement(SettlementError::RunInProgress { .. })) => {
                            RunOutcome::InProgress
                        }
                        Err(e) => {
                            error!("Settlement failed for server {}: {}", server.id, e);
                            RunOutcome::Failed {
                                message: e.to_string(),
                            }
                        }
                    };

                    RunReport {
                        server_id: server.id,
                        server_name: server.name,
                        outcome,
                    }
                }
            })
            .buffer_unordered(self.config.max_concurrent_servers)
            .collect()
            .await
    }

    /// Calculate next daily execution time
    fn calculate_next_daily_execution(now: DateTime<Utc>, execution_hour: u32) -> DateTime<Utc> {
        let today_run = now.date_naive().and_hms_opt(execution_hour, 0, 0);
        let next = match today_run {
            Some(at) if Utc.from_utc_datetime(&at) > now => at,
            _ => (now.date_naive() + chrono::Duration::days(1))
                .and_hms_opt(execution_hour, 0, 0)
                .unwrap_or_else(|| now.naive_utc()),
        };
        Utc.from_utc_datetime(&next)
    }
}

/// Withdrawal days that come due on the given target date. Normally just
/// the date's own day; on the last day of a short month every later day
/// collapses onto it, so a legacy day-31 row still fires in February.
fn due_days_for(target: NaiveDate) -> Vec<i32> {
    let day = target.day() as i32;
    let mut days = vec![day];
    if day == days_in_month(target) as i32 {
        days.extend(day + 1..=31);
    }
    days
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = (date.year(), date.month());
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    first_of_next
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}
