use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Behaviour of the dummy gateway when a payment is created.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[derive(Default)]
pub enum PaymentScenario {
    /// Payment waits for the user to confirm, settled later by an operator
    #[default]
    AwaitConfirmation,
    /// Payment succeeds as soon as it is created
    Succeed,
    /// Provider refuses the payment
    Decline,
    /// Provider is unreachable
    Unavailable,
}

impl PaymentScenario {
    pub fn description(&self) -> &'static str {
        match self {
            PaymentScenario::AwaitConfirmation => "Payment waits for confirmation",
            PaymentScenario::Succeed => "Payment succeeds immediately",
            PaymentScenario::Decline => "Payment is declined",
            PaymentScenario::Unavailable => "Provider is unavailable",
        }
    }
}
