use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Length of one billed month
pub const DAYS_PER_MONTH: i64 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.ends_at > now
    }
}

/// Audit record of one applied extension
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionExtension {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: String,
    pub cause_key: String,
    pub months: i32,
    pub previous_end: Option<DateTime<Utc>>,
    pub new_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Computed window after an extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionWindow {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// Window after buying `months` more at `now`.
///
/// An active subscription keeps its start and stacks the new months on its end.
/// A missing or expired one starts over at `now`.
pub fn extended_window(
    existing: Option<&Subscription>,
    months: i32,
    now: DateTime<Utc>,
) -> SubscriptionWindow {
    let length = Duration::days(DAYS_PER_MONTH * i64::from(months));
    match existing {
        Some(sub) if sub.is_active(now) => SubscriptionWindow {
            starts_at: sub.starts_at,
            ends_at: sub.ends_at + length,
        },
        _ => SubscriptionWindow {
            starts_at: now,
            ends_at: now + length,
        },
    }
}
