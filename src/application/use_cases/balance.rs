use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::domain::entities::balance::{Balance, BalanceEntry, CauseKey};

/// Upper bound on compare-and-swap rounds for one change before giving up
pub const MAX_CAS_ATTEMPTS: u32 = 32;

// ============================================================================
// Repository Trait
// ============================================================================

/// One balance change, applied only if the stored version still equals `expected_version`.
#[derive(Debug, Clone)]
pub struct BalanceChange {
    pub user_id: Uuid,
    pub cause_key: CauseKey,
    pub delta: i64,
    pub expected_version: i64,
}

#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// Change written, balance after it
    Applied(Balance),
    /// The cause key was already applied earlier, current balance
    AlreadyApplied(Balance),
    /// Someone else wrote first, the caller must re-read and retry
    VersionConflict,
}

#[async_trait]
pub trait BalanceRepoTrait: Send + Sync {
    async fn get(&self, user_id: Uuid) -> AppResult<Option<Balance>>;

    /// Creates a zero balance if the user has none, returns the stored one.
    async fn open_account(&self, user_id: Uuid) -> AppResult<Balance>;

    /// Atomically checks the cause key, the version and the resulting amount, then writes
    /// the new amount together with its audit entry.
    ///
    /// Errors:
    /// - `UserNotFound` if the user has no balance
    /// - `InsufficientFunds` if the change would make the balance negative
    async fn apply(&self, change: &BalanceChange) -> AppResult<ApplyOutcome>;

    async fn list_entries(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<BalanceEntry>>;

    async fn has_entry(&self, user_id: Uuid, cause_key: &CauseKey) -> AppResult<bool>;
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Debug, Clone)]
pub enum CreditOutcome {
    Applied(Balance),
    AlreadyApplied(Balance),
}

impl CreditOutcome {
    pub fn balance(&self) -> &Balance {
        match self {
            CreditOutcome::Applied(b) | CreditOutcome::AlreadyApplied(b) => b,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, CreditOutcome::Applied(_))
    }
}

/// Sole writer of user balances.
///
/// Every change carries a cause key and is applied at most once per user. Concurrent
/// changes for one user are serialized by the store's version check; conflicts are
/// retried here and never reach the caller unless they persist.
#[derive(Clone)]
pub struct BalanceUseCases {
    repo: Arc<dyn BalanceRepoTrait>,
}

impl BalanceUseCases {
    pub fn new(repo: Arc<dyn BalanceRepoTrait>) -> Self {
        Self { repo }
    }

    pub async fn open_account(&self, user_id: Uuid) -> AppResult<Balance> {
        self.repo.open_account(user_id).await
    }

    pub async fn get(&self, user_id: Uuid) -> AppResult<Balance> {
        self.repo
            .get(user_id)
            .await?
            .ok_or(AppError::UserNotFound)
    }

    pub async fn history(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<BalanceEntry>> {
        self.repo.list_entries(user_id, limit.clamp(1, 200)).await
    }

    /// Adds money received for a payment intent. The intent id is the dedup key.
    #[instrument(skip(self), fields(cause = %CauseKey::intent_credit(cause_intent_id)))]
    pub async fn credit(
        &self,
        user_id: Uuid,
        amount: i64,
        cause_intent_id: Uuid,
    ) -> AppResult<CreditOutcome> {
        if amount <= 0 {
            return Err(AppError::InvalidInput("credit amount must be positive".into()));
        }
        self.apply_with_retry(user_id, amount, CauseKey::intent_credit(cause_intent_id))
            .await
    }

    /// Takes money from the balance, failing with `InsufficientFunds` instead of
    /// going negative.
    #[instrument(skip(self), fields(cause = %cause_key))]
    pub async fn debit(
        &self,
        user_id: Uuid,
        amount: i64,
        cause_key: CauseKey,
    ) -> AppResult<CreditOutcome> {
        if amount <= 0 {
            return Err(AppError::InvalidInput("debit amount must be positive".into()));
        }
        self.apply_with_retry(user_id, -amount, cause_key).await
    }

    /// Gives back a debit made under `cause_key`. Applied at most once per cause.
    #[instrument(skip(self), fields(cause = %cause_key))]
    pub async fn refund(
        &self,
        user_id: Uuid,
        amount: i64,
        cause_key: &CauseKey,
    ) -> AppResult<CreditOutcome> {
        if amount <= 0 {
            return Err(AppError::InvalidInput("refund amount must be positive".into()));
        }
        self.apply_with_retry(user_id, amount, CauseKey::refund(cause_key))
            .await
    }

    pub async fn was_refunded(&self, user_id: Uuid, cause_key: &CauseKey) -> AppResult<bool> {
        self.repo
            .has_entry(user_id, &CauseKey::refund(cause_key))
            .await
    }

    async fn apply_with_retry(
        &self,
        user_id: Uuid,
        delta: i64,
        cause_key: CauseKey,
    ) -> AppResult<CreditOutcome> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.get(user_id).await?;
            let change = BalanceChange {
                user_id,
                cause_key: cause_key.clone(),
                delta,
                expected_version: current.version,
            };

            match self.repo.apply(&change).await? {
                ApplyOutcome::Applied(balance) => {
                    tracing::info!(
                        user_id = %user_id,
                        delta,
                        version = balance.version,
                        "Balance changed"
                    );
                    return Ok(CreditOutcome::Applied(balance));
                }
                ApplyOutcome::AlreadyApplied(balance) => {
                    tracing::info!(user_id = %user_id, "Balance change already applied");
                    return Ok(CreditOutcome::AlreadyApplied(balance));
                }
                ApplyOutcome::VersionConflict => {
                    tracing::debug!(user_id = %user_id, attempt, "Balance version conflict");
                    tokio::task::yield_now().await;
                }
            }
        }

        tracing::warn!(user_id = %user_id, "Balance change kept conflicting");
        Err(AppError::ConcurrencyConflict)
    }
}
