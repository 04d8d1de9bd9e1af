// Periodic settlement: scheduling, charging, escalation, recording
pub mod escalation;
pub mod executor;
pub mod recorder;
pub mod scheduler;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::payments::ChargeOutcome;

/// Outcome of one pledge's charge attempt within a run
#[derive(Debug, Clone)]
pub struct ChargeRecord {
    pub pledge_id: Uuid,
    pub user_id: Uuid,
    /// The optimized amount the charge was attempted for
    pub amount: Decimal,
    pub outcome: ChargeOutcome,
}

impl ChargeRecord {
    /// Captured amount, present only for successful charges
    pub fn captured(&self) -> Option<Decimal> {
        match &self.outcome {
            ChargeOutcome::Succeeded { captured } => Some(*captured),
            ChargeOutcome::Failed { .. } => None,
        }
    }
}
