use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Lifecycle status of a payment intent.
///
/// ```text
/// created --gateway accepts--> pending --success--> succeeded
///                              pending --failure--> failed
/// created --user cancels--> canceled
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, AsRefStr, Display,
    EnumString,
)]
#[sqlx(type_name = "payment_intent_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[derive(Default)]
pub enum PaymentIntentStatus {
    #[default]
    Created,
    Pending,
    Succeeded,
    Failed,
    Canceled,
}

impl PaymentIntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentIntentStatus::Created => "created",
            PaymentIntentStatus::Pending => "pending",
            PaymentIntentStatus::Succeeded => "succeeded",
            PaymentIntentStatus::Failed => "failed",
            PaymentIntentStatus::Canceled => "canceled",
        }
    }

    /// Terminal statuses accept no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentIntentStatus::Succeeded
                | PaymentIntentStatus::Failed
                | PaymentIntentStatus::Canceled
        )
    }

    /// Whether `self -> next` is one of the four allowed edges.
    /// Same-state moves are not transitions.
    pub fn can_transition_to(&self, next: PaymentIntentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentIntentStatus::Created, PaymentIntentStatus::Pending)
                | (PaymentIntentStatus::Pending, PaymentIntentStatus::Succeeded)
                | (PaymentIntentStatus::Pending, PaymentIntentStatus::Failed)
                | (PaymentIntentStatus::Created, PaymentIntentStatus::Canceled)
        )
    }

    /// All statuses that still wait for a gateway outcome
    pub fn open() -> &'static [PaymentIntentStatus] {
        &[PaymentIntentStatus::Created, PaymentIntentStatus::Pending]
    }
}
