use crate::application::ports::alerts::{OperatorAlert, OperatorAlertPort};

/// Emits operator alerts as error events with `alert = true`, for log based alerting.
#[derive(Default)]
pub struct TracingAlertSink;

impl OperatorAlertPort for TracingAlertSink {
    fn raise(&self, alert: OperatorAlert) {
        match &alert {
            OperatorAlert::CreditFailed {
                intent_id,
                user_id,
                amount,
                reason,
            } => tracing::error!(
                alert = true,
                kind = alert.kind(),
                intent_id = %intent_id,
                user_id = %user_id,
                amount,
                reason = %reason,
                "Paid intent could not be credited"
            ),
            OperatorAlert::SubscriptionChargeFailed {
                intent_id,
                user_id,
                reason,
            } => tracing::error!(
                alert = true,
                kind = alert.kind(),
                intent_id = %intent_id,
                user_id = %user_id,
                reason = %reason,
                "Subscription purchase after payment failed"
            ),
            OperatorAlert::AmountMismatch {
                intent_id,
                external_id,
                expected,
                expected_currency,
                reported,
                reported_currency,
            } => tracing::error!(
                alert = true,
                kind = alert.kind(),
                intent_id = %intent_id,
                external_id = %external_id,
                expected,
                expected_currency = %expected_currency,
                reported,
                reported_currency = %reported_currency,
                "Gateway reported a different amount"
            ),
        }
    }
}
