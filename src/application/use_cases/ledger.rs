use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::domain::entities::{
    payment_intent::PaymentIntent, payment_intent_status::PaymentIntentStatus,
    payment_purpose::PaymentPurpose,
};

// ============================================================================
// Repository Trait
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewPaymentIntent {
    pub user_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub purpose: PaymentPurpose,
    pub plan_id: Option<String>,
    pub duration_months: Option<i32>,
    pub idempotency_key: String,
}

impl NewPaymentIntent {
    fn matches(&self, existing: &PaymentIntent) -> bool {
        existing.amount == self.amount
            && existing.currency == self.currency
            && existing.purpose == self.purpose
            && existing.plan_id == self.plan_id
            && existing.duration_months == self.duration_months
    }
}

/// Fields written together with a status transition. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub external_id: Option<String>,
    pub confirmation_url: Option<String>,
    pub failure_reason: Option<String>,
}

#[async_trait]
pub trait PaymentIntentRepoTrait: Send + Sync {
    /// Inserts a `created` intent, or returns the one already stored for
    /// `(user_id, idempotency_key)` untouched.
    async fn create_or_get(&self, intent: &NewPaymentIntent) -> AppResult<PaymentIntent>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<PaymentIntent>>;

    async fn get_by_external_id(&self, external_id: &str) -> AppResult<Option<PaymentIntent>>;

    async fn get_by_idempotency_key(
        &self,
        user_id: Uuid,
        idempotency_key: &str,
    ) -> AppResult<Option<PaymentIntent>>;

    /// Compare-and-swap on the status column. Returns `None` when the stored status
    /// was no longer `from`, in which case nothing is written.
    async fn transition(
        &self,
        id: Uuid,
        from: PaymentIntentStatus,
        to: PaymentIntentStatus,
        update: &StatusUpdate,
    ) -> AppResult<Option<PaymentIntent>>;

    /// Records gateway fields on an intent without changing its status.
    async fn record_gateway_details(&self, id: Uuid, update: &StatusUpdate) -> AppResult<()>;

    async fn list_by_user(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<PaymentIntent>>;

    /// Non-terminal intents last touched before `updated_before`, oldest first.
    async fn list_stale_open(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<PaymentIntent>>;

    /// Stamps `archived_at` on terminal intents last touched before `updated_before`.
    async fn archive_terminal_before(&self, updated_before: DateTime<Utc>) -> AppResult<u64>;
}

// ============================================================================
// Use Cases
// ============================================================================

/// Durable record of payment intents and their lifecycle.
#[derive(Clone)]
pub struct LedgerUseCases {
    repo: Arc<dyn PaymentIntentRepoTrait>,
}

impl LedgerUseCases {
    pub fn new(repo: Arc<dyn PaymentIntentRepoTrait>) -> Self {
        Self { repo }
    }

    /// Creates a `created` intent. Repeating the call with the same key returns the
    /// stored intent; reusing a key for a different payment is rejected.
    #[instrument(skip(self, intent), fields(user_id = %intent.user_id, purpose = %intent.purpose))]
    pub async fn create_intent(&self, intent: NewPaymentIntent) -> AppResult<PaymentIntent> {
        if intent.amount <= 0 {
            return Err(AppError::InvalidInput("amount must be positive".into()));
        }
        match intent.purpose {
            PaymentPurpose::TopUp if intent.plan_id.is_some() || intent.duration_months.is_some() => {
                return Err(AppError::InvalidInput(
                    "top-up intents carry no subscription".into(),
                ));
            }
            PaymentPurpose::Subscription
                if intent.plan_id.is_none() || intent.duration_months.is_none() =>
            {
                return Err(AppError::InvalidInput(
                    "subscription intents need a plan and duration".into(),
                ));
            }
            _ => {}
        }

        let stored = self.repo.create_or_get(&intent).await?;
        if !intent.matches(&stored) {
            tracing::warn!(
                intent_id = %stored.id,
                "Idempotency key reused with different payment parameters"
            );
            return Err(AppError::InvalidInput(
                "idempotency key already used for a different payment".into(),
            ));
        }
        Ok(stored)
    }

    /// Moves an intent along one of the allowed edges.
    ///
    /// Same-state moves and any edge out of a terminal status fail with
    /// `InvalidTransition` and leave the intent unchanged.
    #[instrument(skip(self, update), fields(to = %to))]
    pub async fn mark_status(
        &self,
        intent_id: Uuid,
        to: PaymentIntentStatus,
        update: StatusUpdate,
    ) -> AppResult<PaymentIntent> {
        let current = self.get(intent_id).await?;
        if !current.status.can_transition_to(to) {
            return Err(AppError::InvalidTransition {
                from: current.status,
                to,
            });
        }

        match self
            .repo
            .transition(intent_id, current.status, to, &update)
            .await?
        {
            Some(updated) => {
                tracing::info!(
                    intent_id = %intent_id,
                    from = %current.status,
                    to = %to,
                    "Payment intent transitioned"
                );
                Ok(updated)
            }
            None => {
                // Lost the race, report against whatever won
                let latest = self.get(intent_id).await?;
                Err(AppError::InvalidTransition {
                    from: latest.status,
                    to,
                })
            }
        }
    }

    pub async fn record_gateway_details(
        &self,
        intent_id: Uuid,
        update: StatusUpdate,
    ) -> AppResult<()> {
        self.repo.record_gateway_details(intent_id, &update).await
    }

    pub async fn get(&self, intent_id: Uuid) -> AppResult<PaymentIntent> {
        self.repo
            .get_by_id(intent_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Like `get`, but intents of other users look missing.
    pub async fn get_for_user(&self, user_id: Uuid, intent_id: Uuid) -> AppResult<PaymentIntent> {
        let intent = self.get(intent_id).await?;
        if intent.user_id != user_id {
            return Err(AppError::NotFound);
        }
        Ok(intent)
    }

    pub async fn find_by_external_id(&self, external_id: &str) -> AppResult<Option<PaymentIntent>> {
        self.repo.get_by_external_id(external_id).await
    }

    pub async fn find_by_idempotency_key(
        &self,
        user_id: Uuid,
        idempotency_key: &str,
    ) -> AppResult<Option<PaymentIntent>> {
        self.repo
            .get_by_idempotency_key(user_id, idempotency_key)
            .await
    }

    pub async fn list_for_user(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<PaymentIntent>> {
        self.repo.list_by_user(user_id, limit.clamp(1, 100)).await
    }

    pub async fn list_stale(&self, older_than: Duration, limit: i64) -> AppResult<Vec<PaymentIntent>> {
        self.repo
            .list_stale_open(Utc::now() - older_than, limit)
            .await
    }

    /// Archives terminal intents. Nothing is ever deleted.
    pub async fn archive_terminal(&self, older_than: Duration) -> AppResult<u64> {
        let archived = self
            .repo
            .archive_terminal_before(Utc::now() - older_than)
            .await?;
        if archived > 0 {
            tracing::info!(archived, "Archived terminal payment intents");
        }
        Ok(archived)
    }
}
