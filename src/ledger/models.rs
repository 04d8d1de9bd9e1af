use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;
use uuid::Uuid;

/// Pledge status enum
///
/// Cancelled and Failed are terminal: a pledge never leaves either state
/// and is excluded from every future charge run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "pledge_status", rename_all = "lowercase")]
pub enum PledgeStatus {
    Active,
    Cancelled,
    Failed,
}

impl PledgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PledgeStatus::Active => "active",
            PledgeStatus::Cancelled => "cancelled",
            PledgeStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PledgeStatus::Cancelled | PledgeStatus::Failed)
    }
}

impl fmt::Display for PledgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User role enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum UserRole {
    User,
    Staff,
    Admin,
    Suspended,
    Banned,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Staff => "staff",
            UserRole::Admin => "admin",
            UserRole::Suspended => "suspended",
            UserRole::Banned => "banned",
        }
    }

    /// Suspended and banned accounts are never charged
    pub fn is_blocked(&self) -> bool {
        matches!(self, UserRole::Suspended | UserRole::Banned)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Withdrawal status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "withdrawal_status", rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Completed,
    Failed,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Failed => "failed",
        }
    }
}

/// Activity event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "activity_event_type", rename_all = "snake_case")]
pub enum ActivityEventType {
    PledgeCreated,
    PledgeCancelled,
    ChargeSucceeded,
    ChargeFailed,
    UserSuspended,
    WithdrawalRecorded,
}

/// Pledge entity - a member's monthly commitment toward one server
///
/// INVARIANT: min_pledge <= amount <= max_pledge, checked at creation;
/// 0 < optimized_amount <= amount for every non-terminal pledge.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Pledge {
    pub id: Uuid,
    pub user_id: Uuid,
    pub server_id: Uuid,

    /// What the member promised per month
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    /// What they will actually be charged after redistribution
    #[serde(with = "rust_decimal::serde::float")]
    pub optimized_amount: Decimal,

    pub status: PledgeStatus,
    pub last_charged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pledge {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Monthly saving versus the promised amount
    pub fn savings(&self) -> Decimal {
        self.amount - self.optimized_amount
    }
}

/// Game server entity - read-only to the settlement core
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GameServer {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,

    /// Monthly hosting cost the community must raise
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,

    /// Day of month (1-28) the host withdraws funds
    pub withdrawal_day: i32,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User entity (settlement subset)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,

    // Opaque processor handles
    pub stripe_customer_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub has_payment_method: bool,

    /// Consecutive charge failures; reset to 0 on any success
    pub failed_payments: i32,
    pub last_failed_payment: Option<DateTime<Utc>>,

    pub role: UserRole,
    pub suspended_at: Option<DateTime<Utc>>,
    pub suspension_reason: Option<String>,

    /// Owner payout setup complete (read by the scheduler filter)
    pub payouts_enabled: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Check the account can be charged this cycle
    pub fn is_chargeable(&self) -> bool {
        !self.role.is_blocked()
            && self.has_payment_method
            && self.stripe_customer_id.is_some()
            && self.payment_method_id.is_some()
    }
}

/// One row of the active-pledges-with-eligibility join the executor
/// consumes. Carries everything needed to decide inclusion and to
/// issue the charge without further lookups.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChargeCandidate {
    pub pledge_id: Uuid,
    pub user_id: Uuid,
    pub username: String,

    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    pub pledge_status: PledgeStatus,
    pub role: UserRole,
    pub has_payment_method: bool,
    pub stripe_customer_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub failed_payments: i32,
}

impl ChargeCandidate {
    /// Eligibility for inclusion in a run: pledge Active, account not
    /// blocked, and a usable payment method on file. Ineligible rows
    /// are skipped silently - they stay Active but unbilled this cycle.
    pub fn is_eligible(&self) -> bool {
        self.pledge_status == PledgeStatus::Active
            && !self.role.is_blocked()
            && self.has_payment_method
            && self.stripe_customer_id.is_some()
            && self.payment_method_id.is_some()
    }
}

/// Withdrawal entity - immutable settlement record, one per server per run
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Withdrawal {
    pub id: Uuid,
    pub server_id: Uuid,

    /// The run date the record is keyed on (unique per server)
    pub scheduled_date: NaiveDate,
    /// The day funds are due to the host
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
    pub created_at: DateTime<Utc>,
}

/// Activity log entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivityLog {
    pub id: Uuid,
    pub event_type: ActivityEventType,
    pub server_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub pledge_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityLog {
    /// Build an entry stamped now; ids are attached by the caller
    pub fn new(event_type: ActivityEventType, details: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            server_id: None,
            user_id: None,
            pledge_id: None,
            details,
            created_at: Utc::now(),
        }
    }

    pub fn server(mut self, server_id: Uuid) -> Self {
        self.server_id = Some(server_id);
        self
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn pledge(mut self, pledge_id: Uuid) -> Self {
        self.pledge_id = Some(pledge_id);
        self
    }
}
