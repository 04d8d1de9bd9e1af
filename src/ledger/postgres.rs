use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::*;
use super::PledgeLedger;
use crate::error::{AppError, AppResult, PledgeError, SettlementError};

/// Postgres-backed ledger - THE source of truth for all state
pub struct PgPledgeLedger {
    pub pool: PgPool,
}

impl PgPledgeLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PledgeLedger for PgPledgeLedger {
    // ========== SERVER QUERIES ==========

    async fn servers_with_withdrawal_day(&self, day: i32) -> AppResult<Vec<GameServer>> {
        let servers = sqlx::query_as::<_, GameServer>(
            r#"
            SELECT s.id, s.owner_id, s.name, s.cost, s.withdrawal_day,
                   s.is_active, s.created_at, s.updated_at
            FROM servers s
            JOIN users u ON u.id = s.owner_id
            WHERE s.withdrawal_day = $1
              AND s.is_active = TRUE
              AND u.payouts_enabled = TRUE
            ORDER BY s.created_at
            "#,
        )
        .bind(day)
        .fetch_all(&self.pool)
        .await?;

        Ok(servers)
    }

    async fn get_server(&self, server_id: Uuid) -> AppResult<Option<GameServer>> {
        let server = sqlx::query_as::<_, GameServer>(
            r#"
            SELECT id, owner_id, name, cost, withdrawal_day, is_active, created_at, updated_at
            FROM servers
            WHERE id = $1
            "#,
        )
        .bind(server_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(server)
    }

    // ========== PLEDGE QUERIES ==========

    async fn charge_candidates(&self, server_id: Uuid) -> AppResult<Vec<ChargeCandidate>> {
        let candidates = sqlx::query_as::<_, ChargeCandidate>(
            r#"
            SELECT p.id AS pledge_id, p.user_id, u.username, p.amount,
                   p.status AS pledge_status, u.role, u.has_payment_method,
                   u.stripe_customer_id, u.payment_method_id, u.failed_payments
            FROM pledges p
            JOIN users u ON u.id = p.user_id
            WHERE p.server_id = $1 AND p.status = $2
            ORDER BY p.created_at
            "#,
        )
        .bind(server_id)
        .bind(PledgeStatus::Active)
        .fetch_all(&self.pool)
        .await?;

        Ok(candidates)
    }

    async fn active_pledges(&self, server_id: Uuid) -> AppResult<Vec<Pledge>> {
        let pledges = sqlx::query_as::<_, Pledge>(
            r#"
            SELECT id, user_id, server_id, amount, optimized_amount, status,
                   last_charged_at, created_at, updated_at
            FROM pledges
            WHERE server_id = $1 AND status = $2
            ORDER BY created_at
            "#,
        )
        .bind(server_id)
        .bind(PledgeStatus::Active)
        .fetch_all(&self.pool)
        .await?;

        Ok(pledges)
    }

    async fn count_active_pledges(&self, server_id: Uuid) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM pledges WHERE server_id = $1 AND status = $2
            "#,
        )
        .bind(server_id)
        .bind(PledgeStatus::Active)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn get_pledge(&self, pledge_id: Uuid) -> AppResult<Option<Pledge>> {
        let pledge = sqlx::query_as::<_, Pledge>(
            r#"
            SELECT id, user_id, server_id, amount, optimized_amount, status,
                   last_charged_at, created_at, updated_at
            FROM pledges
            WHERE id = $1
            "#,
        )
        .bind(pledge_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(pledge)
    }

    // ========== PLEDGE MUTATIONS ==========

    async fn insert_pledge(&self, pledge: &Pledge) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO pledges (id, user_id, server_id, amount, optimized_amount,
                                 status, last_charged_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(pledge.id)
        .bind(pledge.user_id)
        .bind(pledge.server_id)
        .bind(pledge.amount)
        .bind(pledge.optimized_amount)
        .bind(pledge.status)
        .bind(pledge.last_charged_at)
        .bind(pledge.created_at)
        .bind(pledge.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // Partial unique index: one active pledge per user per server
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AppError::Pledge(PledgeError::DuplicatePledge))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn set_pledge_status(
        &self,
        pledge_id: Uuid,
        from: PledgeStatus,
        to: PledgeStatus,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE pledges
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(pledge_id)
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_pledge_charged(&self, pledge_id: Uuid, captured: Decimal) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE pledges
            SET optimized_amount = $2, last_charged_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(pledge_id)
        .bind(captured)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_optimized_amounts(&self, updates: &[(Uuid, Decimal)]) -> AppResult<()> {
        // One transaction so a half-written recompute is never visible
        let mut tx = self.pool.begin().await?;

        for (pledge_id, amount) in updates {
            sqlx::query(
                r#"
                UPDATE pledges
                SET optimized_amount = $2, updated_at = NOW()
                WHERE id = $1 AND status = $3
                "#,
            )
            .bind(pledge_id)
            .bind(amount)
            .bind(PledgeStatus::Active)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // ========== USER MUTATIONS ==========

    async fn get_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, stripe_customer_id, payment_method_id, has_payment_method,
                   failed_payments, last_failed_payment, role, suspended_at,
                   suspension_reason, payouts_enabled, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn increment_failed_payments(&self, user_id: Uuid) -> AppResult<i32> {
        // Single atomic increment; never read-modify-write from the app
        let count = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE users
            SET failed_payments = failed_payments + 1,
                last_failed_payment = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING failed_payments
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn reset_failed_payments(&self, user_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_payments = 0, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn suspend_user(&self, user_id: Uuid, reason: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET role = $2, suspended_at = NOW(), suspension_reason = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(UserRole::Suspended)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========== WITHDRAWALS ==========

    async fn withdrawal_exists(
        &self,
        server_id: Uuid,
        scheduled_date: NaiveDate,
    ) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM withdrawals WHERE server_id = $1 AND scheduled_date = $2
            )
            "#,
        )
        .bind(server_id)
        .bind(scheduled_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn create_withdrawal(&self, withdrawal: &Withdrawal) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO withdrawals (id, server_id, scheduled_date, withdrawal_date,
                                     total_amount, collected_amount, platform_fee,
                                     processor_fee, net_amount, status, pledge_count,
                                     successful_charges, failed_charges, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(withdrawal.id)
        .bind(withdrawal.server_id)
        .bind(withdrawal.scheduled_date)
        .bind(withdrawal.withdrawal_date)
        .bind(withdrawal.total_amount)
        .bind(withdrawal.collected_amount)
        .bind(withdrawal.platform_fee)
        .bind(withdrawal.processor_fee)
        .bind(withdrawal.net_amount)
        .bind(withdrawal.status)
        .bind(withdrawal.pledge_count)
        .bind(withdrawal.successful_charges)
        .bind(withdrawal.failed_charges)
        .bind(withdrawal.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // The unique index on (server_id, scheduled_date) is the last
            // line of defense against a double-triggered run
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AppError::Settlement(SettlementError::DuplicateRun {
                    server_id: withdrawal.server_id,
                    scheduled_date: withdrawal.scheduled_date,
                }))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn withdrawals_for_server(&self, server_id: Uuid) -> AppResult<Vec<Withdrawal>> {
        let withdrawals = sqlx::query_as::<_, Withdrawal>(
            r#"
            SELECT id, server_id, scheduled_date, withdrawal_date, total_amount,
                   collected_amount, platform_fee, processor_fee, net_amount,
                   status, pledge_count, successful_charges, failed_charges, created_at
            FROM withdrawals
            WHERE server_id = $1
            ORDER BY scheduled_date DESC
            "#,
        )
        .bind(server_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(withdrawals)
    }

    // ========== ACTIVITY LOG ==========

    async fn record_activity(&self, entry: &ActivityLog) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_log (id, event_type, server_id, user_id, pledge_id,
                                      details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.event_type)
        .bind(entry.server_id)
        .bind(entry.user_id)
        .bind(entry.pledge_id)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
