use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// What the money of a payment intent is for
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, AsRefStr, Display,
    EnumString,
)]
#[sqlx(type_name = "payment_purpose", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PaymentPurpose {
    /// Plain balance top-up
    TopUp,
    /// Credit the balance, then spend it on a subscription extension
    Subscription,
}

impl PaymentPurpose {
    /// Description sent to the payment provider
    pub fn description(&self) -> &'static str {
        match self {
            PaymentPurpose::TopUp => "Balance top-up",
            PaymentPurpose::Subscription => "Subscription purchase",
        }
    }
}
