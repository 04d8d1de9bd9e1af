// Pledge, server, user and withdrawal persistence
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppResult;
use models::{
    ActivityLog, ChargeCandidate, GameServer, Pledge, PledgeStatus, User, Withdrawal,
};

/// Persistence surface the settlement core depends on.
///
/// The production implementation is [`postgres::PgPledgeLedger`]; tests
/// drive the core through an in-memory implementation.
#[async_trait]
pub trait PledgeLedger: Send + Sync {
    // ========== SERVER QUERIES ==========

    /// Active servers with the given withdrawal day whose owner has
    /// completed payout setup
    async fn servers_with_withdrawal_day(&self, day: i32) -> AppResult<Vec<GameServer>>;

    async fn get_server(&self, server_id: Uuid) -> AppResult<Option<GameServer>>;

    // ========== PLEDGE QUERIES ==========

    /// Active pledges for a server joined with the owning user's
    /// eligibility data, in creation order
    async fn charge_candidates(&self, server_id: Uuid) -> AppResult<Vec<ChargeCandidate>>;

    /// Active pledges for a server, in creation order
    async fn active_pledges(&self, server_id: Uuid) -> AppResult<Vec<Pledge>>;

    async fn count_active_pledges(&self, server_id: Uuid) -> AppResult<i64>;

    async fn get_pledge(&self, pledge_id: Uuid) -> AppResult<Option<Pledge>>;

    // ========== PLEDGE MUTATIONS ==========

    async fn insert_pledge(&self, pledge: &Pledge) -> AppResult<()>;

    /// Guarded status transition; returns false when the pledge was not
    /// in the expected `from` state (no row changed)
    async fn set_pledge_status(
        &self,
        pledge_id: Uuid,
        from: PledgeStatus,
        to: PledgeStatus,
    ) -> AppResult<bool>;

    /// Stamp a successful charge: cache the captured amount and set
    /// last_charged_at
    async fn mark_pledge_charged(&self, pledge_id: Uuid, captured: Decimal) -> AppResult<()>;

    /// Write recomputed optimized amounts, one (pledge id, amount) pair
    /// per active pledge
    async fn set_optimized_amounts(&self, updates: &[(Uuid, Decimal)]) -> AppResult<()>;

    // ========== USER MUTATIONS ==========

    async fn get_user(&self, user_id: Uuid) -> AppResult<Option<User>>;

    /// Atomic increment of the consecutive-failure counter, stamping
    /// last_failed_payment; returns the post-increment count
    async fn increment_failed_payments(&self, user_id: Uuid) -> AppResult<i32>;

    /// Reset the consecutive-failure counter after a successful charge
    async fn reset_failed_payments(&self, user_id: Uuid) -> AppResult<()>;

    /// Move the account to the suspended role, recording reason and time
    async fn suspend_user(&self, user_id: Uuid, reason: &str) -> AppResult<()>;

    // ========== WITHDRAWALS ==========

    /// Idempotency pre-check: has a run already been recorded for this
    /// server and date?
    async fn withdrawal_exists(&self, server_id: Uuid, scheduled_date: NaiveDate)
        -> AppResult<bool>;

    async fn create_withdrawal(&self, withdrawal: &Withdrawal) -> AppResult<()>;

    /// Audit trail for a server, most recent first
    async fn withdrawals_for_server(&self, server_id: Uuid) -> AppResult<Vec<Withdrawal>>;

    // ========== ACTIVITY LOG ==========

    async fn record_activity(&self, entry: &ActivityLog) -> AppResult<()>;
}
