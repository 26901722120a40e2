use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Spendable balance of one user.
///
/// `version` grows by one with every applied change and is the compare-and-swap token
/// for the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub user_id: Uuid,
    /// Minor currency units, never negative
    pub amount: i64,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// Audit record of one applied balance change
#[derive(Debug, Clone, Serialize)]
pub struct BalanceEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub cause_key: String,
    pub delta: i64,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

/// Idempotency key of a balance or subscription change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CauseKey(String);

impl CauseKey {
    /// Money received for a payment intent
    pub fn intent_credit(intent_id: Uuid) -> Self {
        Self(format!("credit:{}", intent_id))
    }

    /// Subscription bought with the money of a payment intent
    pub fn intent_charge(intent_id: Uuid) -> Self {
        Self(format!("charge:{}", intent_id))
    }

    /// Subscription bought directly from the balance
    pub fn activation(user_id: Uuid, idempotency_key: &str) -> Self {
        Self(format!("activation:{}:{}", user_id, idempotency_key))
    }

    /// Money returned after the change under `cause` could not be completed
    pub fn refund(cause: &CauseKey) -> Self {
        Self(format!("refund:{}", cause.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CauseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
