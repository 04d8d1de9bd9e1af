use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::models::{FundingStatusResponse, PledgeResponse};
use crate::config::SettlementConfig;
use crate::error::{AppError, AppResult, PledgeError};
use crate::ledger::models::{
    ActivityEventType, ActivityLog, GameServer, Pledge, PledgeStatus, User,
};
use crate::ledger::PledgeLedger;
use crate::notify::{PledgeEvent, PledgeNotifier};
use crate::optimizer::{self, OptimizationResult, PledgePreview};

/// Synchronous pledge entry points, invoked out-of-band from settlement.
///
/// Every create/cancel recomputes the server's cached optimized amounts
/// under a per-server lock, so two near-simultaneous mutations cannot
/// overwrite each other's recompute with stale reads.
pub struct PledgeService {
    config: SettlementConfig,
    ledger: Arc<dyn PledgeLedger>,
    notifier: Arc<PledgeNotifier>,
    recompute_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl PledgeService {
    pub fn new(
        config: SettlementConfig,
        ledger: Arc<dyn PledgeLedger>,
        notifier: Arc<PledgeNotifier>,
    ) -> Self {
        Self {
            config,
            ledger,
            notifier,
            recompute_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a pledge: validate bounds, eligibility and capacity, then
    /// insert and recompute the server's optimized amounts.
    pub async fn create_pledge(
        &self,
        user_id: Uuid,
        server_id: Uuid,
        amount: Decimal,
    ) -> AppResult<Pledge> {
        self.check_amount_bounds(amount)?;

        let server = self.require_server(server_id).await?;
        if !server.is_active {
            return Err(PledgeError::ServerInactive.into());
        }

        let user = self.require_user(user_id).await?;
        self.check_chargeable(&user)?;

        let lock = self.server_lock(server.id);
        let _held = lock.lock().await;

        let current = self.ledger.count_active_pledges(server.id).await? as usize;
        if !optimizer::can_accept_pledge(current, server.cost, self.config.min_pledge) {
            return Err(PledgeError::ServerFull {
                max_people: optimizer::max_people(server.cost, self.config.min_pledge),
            }
            .into());
        }

        let now = chrono::Utc::now();
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
        self.ledger.insert_pledge(&pledge).await?;

        let result = self.recompute_server(&server).await?;

        info!(
            "🤝 Pledge {} created: {} toward {} ({} pledged of {})",
            pledge.id, amount, server.name, result.total_pledged, server.cost
        );

        self.record_activity_quietly(
            ActivityLog::new(
                ActivityEventType::PledgeCreated,
                json!({
                    "amount": amount.to_string(),
                    "total_pledged": result.total_pledged.to_string(),
                }),
            )
            .server(server.id)
            .user(user_id)
            .pledge(pledge.id),
        )
        .await;

        self.notifier.notify(PledgeEvent::created(
            server.id,
            server.name.clone(),
            user_id,
            user.username.clone(),
            amount,
            result.total_pledged,
            server.cost,
        ));

        // Re-read so the caller sees the post-recompute optimized amount
        let pledge = self.ledger.get_pledge(pledge.id).await?.unwrap_or(pledge);
        Ok(pledge)
    }

    /// Cancel an active pledge (terminal) and recompute the remainder
    pub async fn cancel_pledge(&self, pledge_id: Uuid) -> AppResult<Pledge> {
        let pledge = self
            .ledger
            .get_pledge(pledge_id)
            .await?
            .ok_or(PledgeError::NotFound(pledge_id))?;

        if pledge.status != PledgeStatus::Active {
            return Err(PledgeError::InvalidState {
                current: pledge.status.to_string(),
                expected: PledgeStatus::Active.to_string(),
            }
            .into());
        }

        let server = self.require_server(pledge.server_id).await?;

        let lock = self.server_lock(server.id);
        let _held = lock.lock().await;

        let changed = self
            .ledger
            .set_pledge_status(pledge_id, PledgeStatus::Active, PledgeStatus::Cancelled)
            .await?;
        if !changed {
            // Lost a race with another cancellation or the settlement run
            return Err(PledgeError::InvalidState {
                current: "unknown".to_string(),
                expected: PledgeStatus::Active.to_string(),
            }
            .into());
        }

        let result = self.recompute_server(&server).await?;

        info!(
            "👋 Pledge {} cancelled ({} pledged of {} remains)",
            pledge_id, result.total_pledged, server.cost
        );

        self.record_activity_quietly(
            ActivityLog::new(
                ActivityEventType::PledgeCancelled,
                json!({
                    "amount": pledge.amount.to_string(),
                    "total_pledged": result.total_pledged.to_string(),
                }),
            )
            .server(server.id)
            .user(pledge.user_id)
            .pledge(pledge_id),
        )
        .await;

        if let Ok(Some(user)) = self.ledger.get_user(pledge.user_id).await {
            self.notifier.notify(PledgeEvent::cancelled(
                server.id,
                server.name.clone(),
                user.id,
                user.username,
                pledge.amount,
                result.total_pledged,
                server.cost,
            ));
        }

        let cancelled = self
            .ledger
            .get_pledge(pledge_id)
            .await?
            .unwrap_or(Pledge {
                status: PledgeStatus::Cancelled,
                ..pledge
            });
        Ok(cancelled)
    }

    /// What would this candidate actually pay if they pledged now?
    pub async fn preview_pledge(
        &self,
        server_id: Uuid,
        amount: Decimal,
    ) -> AppResult<PledgePreview> {
        self.check_amount_bounds(amount)?;
        let server = self.require_server(server_id).await?;

        let existing: Vec<Decimal> = self
            .ledger
            .active_pledges(server.id)
            .await?
            .iter()
            .map(|p| p.amount)
            .collect();

        Ok(optimizer::preview_for_new_pledger(
            amount,
            &existing,
            server.cost,
            self.config.min_pledge,
        ))
    }

    /// Funding snapshot for display, recomputed from the live pledge set
    pub async fn funding_status(&self, server_id: Uuid) -> AppResult<FundingStatusResponse> {
        let server = self.require_server(server_id).await?;
        let pledges = self.ledger.active_pledges(server.id).await?;

        let amounts: Vec<Decimal> = pledges.iter().map(|p| p.amount).collect();
        let result = optimizer::optimize(&amounts, server.cost, self.config.min_pledge);

        let pledge_responses = pledges
            .into_iter()
            .zip(result.optimized_costs.iter())
            .map(|(pledge, optimized)| {
                PledgeResponse::from(Pledge {
                    optimized_amount: *optimized,
                    ..pledge
                })
            })
            .collect();

        Ok(FundingStatusResponse {
            server_id: server.id,
            server_name: server.name,
            cost: server.cost,
            total_pledged: result.total_pledged,
            total_savings: result.savings,
            pledge_count: amounts.len(),
            max_people: result.max_people,
            is_accepting_pledges: result.is_accepting_pledges,
            is_funded: result.total_pledged >= server.cost,
            pledges: pledge_responses,
        })
    }

    // ========== INTERNALS ==========

    fn check_amount_bounds(&self, amount: Decimal) -> AppResult<()> {
        if amount < self.config.min_pledge || amount > self.config.max_pledge {
            return Err(PledgeError::AmountOutOfRange {
                amount,
                min: self.config.min_pledge,
                max: self.config.max_pledge,
            }
            .into());
        }
        Ok(())
    }

    fn check_chargeable(&self, user: &User) -> AppResult<()> {
        if user.role.is_blocked() {
            return Err(
                PledgeError::AccountNotChargeable(format!("account role is {}", user.role)).into(),
            );
        }
        if !user.is_chargeable() {
            return Err(PledgeError::AccountNotChargeable(
                "no usable payment method on file".to_string(),
            )
            .into());
        }
        Ok(())
    }

    async fn require_server(&self, server_id: Uuid) -> AppResult<GameServer> {
        self.ledger
            .get_server(server_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("server {}", server_id)))
    }

    async fn require_user(&self, user_id: Uuid) -> AppResult<User> {
        self.ledger
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }

    /// Rerun the optimizer over the server's active pledges and write
    /// the cached amounts back. Callers hold the server lock.
    async fn recompute_server(&self, server: &GameServer) -> AppResult<OptimizationResult> {
        let pledges = self.ledger.active_pledges(server.id).await?;
        let amounts: Vec<Decimal> = pledges.iter().map(|p| p.amount).collect();
        let result = optimizer::optimize(&amounts, server.cost, self.config.min_pledge);

        let updates: Vec<(Uuid, Decimal)> = pledges
            .iter()
            .zip(result.optimized_costs.iter())
            .map(|(pledge, cost)| (pledge.id, *cost))
            .collect();
        self.ledger.set_optimized_amounts(&updates).await?;

        Ok(result)
    }

    fn server_lock(&self, server_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.recompute_locks
            .lock()
            .entry(server_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn record_activity_quietly(&self, entry: ActivityLog) {
        if let Err(e) = self.ledger.record_activity(&entry).await {
            warn!("Failed to record {:?} activity: {}", entry.event_type, e);
        }
    }
}
