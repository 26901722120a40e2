use uuid::Uuid;

/// Conditions an operator has to look at by hand
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorAlert {
    /// The gateway confirmed payment but the balance could not be credited
    CreditFailed {
        intent_id: Uuid,
        user_id: Uuid,
        amount: i64,
        reason: String,
    },
    /// Money arrived for a subscription but buying it from the balance failed
    SubscriptionChargeFailed {
        intent_id: Uuid,
        user_id: Uuid,
        reason: String,
    },
    /// A notification reported a different amount or currency than the intent holds
    AmountMismatch {
        intent_id: Uuid,
        external_id: String,
        expected: i64,
        expected_currency: String,
        reported: i64,
        reported_currency: String,
    },
}

impl OperatorAlert {
    pub fn kind(&self) -> &'static str {
        match self {
            OperatorAlert::CreditFailed { .. } => "credit_failed",
            OperatorAlert::SubscriptionChargeFailed { .. } => "subscription_charge_failed",
            OperatorAlert::AmountMismatch { .. } => "amount_mismatch",
        }
    }
}

pub trait OperatorAlertPort: Send + Sync {
    fn raise(&self, alert: OperatorAlert);
}
