// External payment processor boundary
pub mod stripe;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

/// One charge attempt against the external processor
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub customer_id: String,
    pub payment_method_id: String,
    /// USD amount; converted to cents at the wire boundary
    pub amount: Decimal,
    /// Dedup key forwarded to the processor
    pub idempotency_key: String,

    // Traceability tags
    pub server_id: Uuid,
    pub user_id: Uuid,
    pub pledge_id: Uuid,
}

/// Classified outcome of a charge attempt.
///
/// Failures are values, not errors: a declined card is recorded and the
/// run moves on. The core never inspects processor-specific taxonomies
/// beyond this.
#[derive(Debug, Clone, PartialEq)]
pub enum ChargeOutcome {
    Succeeded { captured: Decimal },
    Failed { reason: String },
}

impl ChargeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ChargeOutcome::Succeeded { .. })
    }
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Attempt exactly one charge and classify the result
    async fn charge(&self, request: &ChargeRequest) -> ChargeOutcome;
}

/// Whole cents for the wire; money stays Decimal everywhere else
pub fn to_cents(amount: Decimal) -> i64 {
    (amount * Decimal::from(100)).round().to_i64().unwrap_or(0)
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::from(cents) / Decimal::from(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cents_conversion() {
        assert_eq!(to_cents(dec!(6.67)), 667);
        assert_eq!(to_cents(dec!(2.00)), 200);
        assert_eq!(to_cents(dec!(0.30)), 30);
        assert_eq!(from_cents(667), dec!(6.67));
        assert_eq!(from_cents(2000), dec!(20.00));
    }

    #[test]
    fn test_outcome_classification() {
        let ok = ChargeOutcome::Succeeded {
            captured: dec!(6.67),
        };
        let bad = ChargeOutcome::Failed {
            reason: "card_declined".to_string(),
        };

        assert!(ok.is_success());
        assert!(!bad.is_success());
    }
}
