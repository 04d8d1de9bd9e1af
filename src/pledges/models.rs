use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::ledger::models::{Pledge, PledgeStatus};

// ========== REQUEST MODELS ==========

/// Request to create a pledge
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePledgeRequest {
    pub user_id: Uuid,
    pub server_id: Uuid,
    #[validate(custom = "validate_money_precision")]
    pub amount: Decimal,
}

/// Request to preview what a prospective pledge would actually cost
#[derive(Debug, Deserialize, Validate)]
pub struct PreviewPledgeRequest {
    pub server_id: Uuid,
    #[validate(custom = "validate_money_precision")]
    pub amount: Decimal,
}

/// Money comes in with at most two decimal places
pub fn validate_money_precision(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.scale() > 2 {
        return Err(ValidationError::new("at most two decimal places"));
    }
    Ok(())
}

// ========== RESPONSE MODELS ==========

/// Pledge as returned to the caller
#[derive(Debug, Serialize)]
pub struct PledgeResponse {
    pub pledge_id: Uuid,
    pub user_id: Uuid,
    pub server_id: Uuid,

    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub optimized_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub savings: Decimal,

    pub status: PledgeStatus,
    pub last_charged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Pledge> for PledgeResponse {
    fn from(pledge: Pledge) -> Self {
        Self {
            pledge_id: pledge.id,
            user_id: pledge.user_id,
            server_id: pledge.server_id,
            savings: pledge.savings(),
            amount: pledge.amount,
            optimized_amount: pledge.optimized_amount,
            status: pledge.status,
            last_charged_at: pledge.last_charged_at,
            created_at: pledge.created_at,
        }
    }
}

/// Funding snapshot for one server, recomputed on read
#[derive(Debug, Serialize)]
pub struct FundingStatusResponse {
    pub server_id: Uuid,
    pub server_name: String,

    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_pledged: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_savings: Decimal,

    pub pledge_count: usize,
    pub max_people: usize,
    pub is_accepting_pledges: bool,
    pub is_funded: bool,

    pub pledges: Vec<PledgeResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_precision_rules() {
        assert!(validate_money_precision(&dec!(10)).is_ok());
        assert!(validate_money_precision(&dec!(10.5)).is_ok());
        assert!(validate_money_precision(&dec!(10.55)).is_ok());
        assert!(validate_money_precision(&dec!(10.555)).is_err());
    }
}
