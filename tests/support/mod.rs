#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use pledgepool::error::{AppError, AppResult, PledgeError, SettlementError};
use pledgepool::ledger::models::{
    ActivityLog, ChargeCandidate, GameServer, Pledge, PledgeStatus, User, UserRole, Withdrawal,
};
use pledgepool::ledger::PledgeLedger;
use pledgepool::notify::PledgeNotifier;
use pledgepool::payments::{ChargeOutcome, ChargeRequest, PaymentProcessor};

/// In-memory ledger with the same guarantees as the Postgres one:
/// guarded status transitions, the one-active-pledge rule and the
/// one-withdrawal-per-run rule.
#[derive(Default)]
pub struct MemoryLedger {
    pub users: RwLock<HashMap<Uuid, User>>,
    pub servers: RwLock<HashMap<Uuid, GameServer>>,
    pub pledges: RwLock<HashMap<Uuid, Pledge>>,
    pub withdrawals: RwLock<Vec<Withdrawal>>,
    pub activity: RwLock<Vec<ActivityLog>>,
}

impl MemoryLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A chargeable member with processor handles on file
    pub async fn add_user(&self, username: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            stripe_customer_id: Some(format!("cus_{}", username)),
            payment_method_id: Some(format!("pm_{}", username)),
            has_payment_method: true,
            failed_payments: 0,
            last_failed_payment: None,
            role: UserRole::User,
            suspended_at: None,
            suspension_reason: None,
            payouts_enabled: true,
            created_at: now,
            updated_at: now,
        };
        self.users.write().await.insert(user.id, user.clone());
        user
    }

    pub async fn put_user(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn add_server(
        &self,
        owner_id: Uuid,
        name: &str,
        cost: Decimal,
        withdrawal_day: i32,
    ) -> GameServer {
        let now = Utc::now();
        let server = GameServer {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
            cost,
            withdrawal_day,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.servers.write().await.insert(server.id, server.clone());
        server
    }

    pub async fn put_server(&self, server: GameServer) {
        self.servers.write().await.insert(server.id, server);
    }

    pub async fn add_pledge(&self, user_id: Uuid, server_id: Uuid, amount: Decimal) -> Pledge {
        let now = Utc::now();
        let pledge = Pledge {
            id: Uuid::new_v4(),
            user_id,
            server_id,
            amount,
            optimized_amount: amount,
            status: PledgeStatus::Active,
            last_charged_at: None,
            created_at: now,
            updated_at: now,
        };
        self.pledges.write().await.insert(pledge.id, pledge.clone());
        pledge
    }
}

#[async_trait]
impl PledgeLedger for MemoryLedger {
    async fn servers_with_withdrawal_day(&self, day: i32) -> AppResult<Vec<GameServer>> {
        let users = self.users.read().await;
        let mut due: Vec<GameServer> = self
            .servers
            .read()
            .await
            .values()
            .filter(|s| s.withdrawal_day == day && s.is_active)
            .filter(|s| {
                users
                    .get(&s.owner_id)
                    .map(|u| u.payouts_enabled)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        due.sort_by_key(|s| (s.created_at, s.id));
        Ok(due)
    }

    async fn get_server(&self, server_id: Uuid) -> AppResult<Option<GameServer>> {
        Ok(self.servers.read().await.get(&server_id).cloned())
    }

    async fn charge_candidates(&self, server_id: Uuid) -> AppResult<Vec<ChargeCandidate>> {
        let users = self.users.read().await;
        let pledges = self.pledges.read().await;

        let mut rows: Vec<(chrono::DateTime<Utc>, ChargeCandidate)> = Vec::new();
        for pledge in pledges
            .values()
            .filter(|p| p.server_id == server_id && p.status == PledgeStatus::Active)
        {
            if let Some(user) = users.get(&pledge.user_id) {
                rows.push((
                    pledge.created_at,
                    ChargeCandidate {
                        pledge_id: pledge.id,
                        user_id: user.id,
                        username: user.username.clone(),
                        amount: pledge.amount,
                        pledge_status: pledge.status,
                        role: user.role,
                        has_payment_method: user.has_payment_method,
                        stripe_customer_id: user.stripe_customer_id.clone(),
                        payment_method_id: user.payment_method_id.clone(),
                        failed_payments: user.failed_payments,
                    },
                ));
            }
        }
        rows.sort_by_key(|(at, c)| (*at, c.pledge_id));
        Ok(rows.into_iter().map(|(_, c)| c).collect())
    }

    async fn active_pledges(&self, server_id: Uuid) -> AppResult<Vec<Pledge>> {
        let mut active: Vec<Pledge> = self
            .pledges
            .read()
            .await
            .values()
            .filter(|p| p.server_id == server_id && p.status == PledgeStatus::Active)
            .cloned()
            .collect();
        active.sort_by_key(|p| (p.created_at, p.id));
        Ok(active)
    }

    async fn count_active_pledges(&self, server_id: Uuid) -> AppResult<i64> {
        Ok(self.active_pledges(server_id).await?.len() as i64)
    }

    async fn get_pledge(&self, pledge_id: Uuid) -> AppResult<Option<Pledge>> {
        Ok(self.pledges.read().await.get(&pledge_id).cloned())
    }

    async fn insert_pledge(&self, pledge: &Pledge) -> AppResult<()> {
        let mut pledges = self.pledges.write().await;
        let duplicate = pledges.values().any(|p| {
            p.user_id == pledge.user_id
                && p.server_id == pledge.server_id
                && p.status == PledgeStatus::Active
        });
        if duplicate {
            return Err(AppError::Pledge(PledgeError::DuplicatePledge));
        }
        pledges.insert(pledge.id, pledge.clone());
        Ok(())
    }

    async fn set_pledge_status(
        &self,
        pledge_id: Uuid,
        from: PledgeStatus,
        to: PledgeStatus,
    ) -> AppResult<bool> {
        let mut pledges = self.pledges.write().await;
        match pledges.get_mut(&pledge_id) {
            Some(p) if p.status == from => {
                p.status = to;
                p.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_pledge_charged(&self, pledge_id: Uuid, captured: Decimal) -> AppResult<()> {
        let mut pledges = self.pledges.write().await;
        if let Some(p) = pledges.get_mut(&pledge_id) {
            p.optimized_amount = captured;
            p.last_charged_at = Some(Utc::now());
            p.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_optimized_amounts(&self, updates: &[(Uuid, Decimal)]) -> AppResult<()> {
        let mut pledges = self.pledges.write().await;
        for (pledge_id, amount) in updates {
            if let Some(p) = pledges.get_mut(pledge_id) {
                p.optimized_amount = *amount;
                p.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn get_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn increment_failed_payments(&self, user_id: Uuid) -> AppResult<i32> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))?;
        user.failed_payments += 1;
        user.last_failed_payment = Some(Utc::now());
        user.updated_at = Utc::now();
        Ok(user.failed_payments)
    }

    async fn reset_failed_payments(&self, user_id: Uuid) -> AppResult<()> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&user_id) {
            user.failed_payments = 0;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn suspend_user(&self, user_id: Uuid, reason: &str) -> AppResult<()> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&user_id) {
            user.role = UserRole::Suspended;
            user.suspended_at = Some(Utc::now());
            user.suspension_reason = Some(reason.to_string());
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn withdrawal_exists(
        &self,
        server_id: Uuid,
        scheduled_date: NaiveDate,
    ) -> AppResult<bool> {
        Ok(self
            .withdrawals
            .read()
            .await
            .iter()
            .any(|w| w.server_id == server_id && w.scheduled_date == scheduled_date))
    }

    async fn create_withdrawal(&self, withdrawal: &Withdrawal) -> AppResult<()> {
        let mut withdrawals = self.withdrawals.write().await;
        let duplicate = withdrawals
            .iter()
            .any(|w| w.server_id == withdrawal.server_id && w.scheduled_date == withdrawal.scheduled_date);
        if duplicate {
            return Err(AppError::Settlement(SettlementError::DuplicateRun {
                server_id: withdrawal.server_id,
                scheduled_date: withdrawal.scheduled_date,
            }));
        }
        withdrawals.push(withdrawal.clone());
        Ok(())
    }

    async fn withdrawals_for_server(&self, server_id: Uuid) -> AppResult<Vec<Withdrawal>> {
        let mut rows: Vec<Withdrawal> = self
            .withdrawals
            .read()
            .await
            .iter()
            .filter(|w| w.server_id == server_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.scheduled_date.cmp(&a.scheduled_date));
        Ok(rows)
    }

    async fn record_activity(&self, entry: &ActivityLog) -> AppResult<()> {
        self.activity.write().await.push(entry.clone());
        Ok(())
    }
}

/// Scripted processor: every charge succeeds at the requested amount
/// unless the user was marked as failing. Records every request it sees.
pub struct MockProcessor {
    failing_users: Mutex<HashSet<Uuid>>,
    calls: Mutex<Vec<ChargeRequest>>,
}

impl MockProcessor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            failing_users: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_for(&self, user_id: Uuid) {
        self.failing_users.lock().insert(user_id);
    }

    pub fn calls(&self) -> Vec<ChargeRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn charge(&self, request: &ChargeRequest) -> ChargeOutcome {
        self.calls.lock().push(request.clone());

        if self.failing_users.lock().contains(&request.user_id) {
            ChargeOutcome::Failed {
                reason: "card_declined".to_string(),
            }
        } else {
            ChargeOutcome::Succeeded {
                captured: request.amount,
            }
        }
    }
}

pub fn disabled_notifier() -> Arc<PledgeNotifier> {
    Arc::new(PledgeNotifier::disabled())
}
