use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{payment_intent_status::PaymentIntentStatus, payment_purpose::PaymentPurpose};

/// A tracked request to move money, independent of the gateway's own record.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
    pub purpose: PaymentPurpose,
    pub plan_id: Option<String>,
    pub duration_months: Option<i32>,
    pub status: PaymentIntentStatus,
    pub external_id: Option<String>,
    pub idempotency_key: String,
    pub confirmation_url: Option<String>,
    pub failure_reason: Option<String>,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The subscription bought by an intent with `PaymentPurpose::Subscription`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionOrder {
    pub plan_id: String,
    pub duration_months: i32,
}

impl PaymentIntent {
    pub fn subscription_order(&self) -> Option<SubscriptionOrder> {
        if self.purpose != PaymentPurpose::Subscription {
            return None;
        }
        match (&self.plan_id, self.duration_months) {
            (Some(plan_id), Some(duration_months)) => Some(SubscriptionOrder {
                plan_id: plan_id.clone(),
                duration_months,
            }),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
