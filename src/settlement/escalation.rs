use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppResult;
use crate::ledger::models::{ActivityEventType, ActivityLog, PledgeStatus};
use crate::ledger::PledgeLedger;

/// What the escalation did with a charge failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationAction {
    /// Failure counted, account still in good standing
    Counted { failures: i32 },
    /// Threshold reached: account suspended, pledge failed
    Suspended { failures: i32 },
}

/// Tracks consecutive charge failures per user and suspends accounts
/// that exceed the threshold.
///
/// Counter updates go through single atomic statements in the ledger so
/// concurrent server workers touching the same user never lose an
/// increment.
pub struct FailureEscalation {
    max_failed_payments: i32,
    ledger: Arc<dyn PledgeLedger>,
}

impl FailureEscalation {
    pub fn new(max_failed_payments: i32, ledger: Arc<dyn PledgeLedger>) -> Self {
        Self {
            max_failed_payments,
            ledger,
        }
    }

    /// Any successful charge clears the streak
    pub async fn on_success(&self, user_id: Uuid) -> AppResult<()> {
        self.ledger.reset_failed_payments(user_id).await
    }

    /// Count a failure; at the threshold the account is suspended and
    /// the pledge moves to its terminal Failed state (the member must
    /// re-pledge after staff intervention).
    pub async fn on_failure(
        &self,
        user_id: Uuid,
        pledge_id: Uuid,
        server_id: Uuid,
        reason: &str,
    ) -> AppResult<EscalationAction> {
        let failures = self.ledger.increment_failed_payments(user_id).await?;

        if failures < self.max_failed_payments {
            info!(
                "⚠️ Charge failure {}/{} for user {}: {}",
                failures, self.max_failed_payments, user_id, reason
            );
            return Ok(EscalationAction::Counted { failures });
        }

        warn!(
            "⛔ User {} reached {} consecutive failed payments, suspending",
            user_id, failures
        );

        let suspension_reason = format!("{} consecutive failed payments", failures);
        self.ledger.suspend_user(user_id, &suspension_reason).await?;
        self.ledger
            .set_pledge_status(pledge_id, PledgeStatus::Active, PledgeStatus::Failed)
            .await?;

        let entry = ActivityLog::new(
            ActivityEventType::UserSuspended,
            json!({
                "failures": failures,
                "reason": suspension_reason,
                "last_error": reason,
            }),
        )
        .server(server_id)
        .user(user_id)
        .pledge(pledge_id);

        if let Err(e) = self.ledger.record_activity(&entry).await {
            warn!("Failed to record suspension activity: {}", e);
        }

        Ok(EscalationAction::Suspended { failures })
    }
}
