use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::application::use_cases::balance::BalanceUseCases;
use crate::application::validators::is_valid_plan_code;
use crate::domain::entities::{
    balance::CauseKey,
    subscription::{Subscription, SubscriptionExtension, SubscriptionWindow, extended_window},
};

pub const MIN_DURATION_MONTHS: i32 = 1;
pub const MAX_DURATION_MONTHS: i32 = 36;
const MAX_EXTEND_ATTEMPTS: u32 = 16;

// ============================================================================
// Plan Catalog
// ============================================================================

/// Monthly prices of the sellable plans, in minor units
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    monthly_prices: HashMap<String, i64>,
}

impl PlanCatalog {
    pub fn new(monthly_prices: HashMap<String, i64>) -> Self {
        Self { monthly_prices }
    }

    /// Parses `code:price` pairs separated by commas, e.g. `basic:29900,premium:59900`.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let mut monthly_prices = HashMap::new();
        for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (code, price) = pair
                .split_once(':')
                .ok_or_else(|| format!("plan entry '{pair}' is not code:price"))?;
            let code = code.trim();
            if !is_valid_plan_code(code) {
                return Err(format!("invalid plan code '{code}'"));
            }
            let price: i64 = price
                .trim()
                .parse()
                .map_err(|_| format!("invalid price for plan '{code}'"))?;
            if price <= 0 {
                return Err(format!("price for plan '{code}' must be positive"));
            }
            monthly_prices.insert(code.to_string(), price);
        }
        Ok(Self { monthly_prices })
    }

    pub fn monthly_price(&self, plan_id: &str) -> Option<i64> {
        self.monthly_prices.get(plan_id).copied()
    }

    /// Checks that `price` is what `duration_months` of `plan_id` costs.
    pub fn validate_order(&self, plan_id: &str, price: i64, duration_months: i32) -> AppResult<()> {
        if !is_valid_plan_code(plan_id) {
            return Err(AppError::InvalidInput("invalid plan id".into()));
        }
        if !(MIN_DURATION_MONTHS..=MAX_DURATION_MONTHS).contains(&duration_months) {
            return Err(AppError::InvalidInput(format!(
                "duration must be between {} and {} months",
                MIN_DURATION_MONTHS, MAX_DURATION_MONTHS
            )));
        }
        let monthly = self
            .monthly_price(plan_id)
            .ok_or_else(|| AppError::InvalidInput("unknown plan".into()))?;
        let expected = monthly
            .checked_mul(i64::from(duration_months))
            .ok_or_else(|| AppError::InvalidInput("price out of range".into()))?;
        if price != expected {
            return Err(AppError::InvalidInput(
                "price does not match the plan price".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Repository Trait
// ============================================================================

#[derive(Debug, Clone)]
pub struct SubscriptionChange {
    pub user_id: Uuid,
    pub plan_id: String,
    pub cause_key: CauseKey,
    pub months: i32,
    pub window: SubscriptionWindow,
    /// Version of the subscription the window was computed from, `None` if there was none
    pub expected_version: Option<i64>,
}

#[derive(Debug, Clone)]
pub enum ExtendOutcome {
    Applied(Subscription),
    AlreadyApplied(Subscription),
    VersionConflict,
}

#[async_trait]
pub trait SubscriptionRepoTrait: Send + Sync {
    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<Subscription>>;

    /// Writes the new window and its extension record in one step, unless the cause key
    /// was applied already or the stored version moved.
    async fn apply_extension(&self, change: &SubscriptionChange) -> AppResult<ExtendOutcome>;

    async fn list_extensions(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<SubscriptionExtension>>;
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct SubscriptionUseCases {
    repo: Arc<dyn SubscriptionRepoTrait>,
    balances: BalanceUseCases,
    catalog: Arc<PlanCatalog>,
}

impl SubscriptionUseCases {
    pub fn new(
        repo: Arc<dyn SubscriptionRepoTrait>,
        balances: BalanceUseCases,
        catalog: Arc<PlanCatalog>,
    ) -> Self {
        Self {
            repo,
            balances,
            catalog,
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    pub async fn get(&self, user_id: Uuid) -> AppResult<Option<Subscription>> {
        self.repo.get_by_user(user_id).await
    }

    pub async fn history(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<SubscriptionExtension>> {
        self.repo.list_extensions(user_id, limit.clamp(1, 100)).await
    }

    /// Extends the user's subscription by `duration_months`.
    ///
    /// An active subscription keeps its remaining time and gets the months stacked on
    /// its end; otherwise the window starts at `now`. Applying the same cause twice
    /// returns the stored subscription unchanged.
    #[instrument(skip(self, now), fields(cause = %cause_key))]
    pub async fn extend(
        &self,
        user_id: Uuid,
        plan_id: &str,
        duration_months: i32,
        cause_key: CauseKey,
        now: DateTime<Utc>,
    ) -> AppResult<Subscription> {
        if !(MIN_DURATION_MONTHS..=MAX_DURATION_MONTHS).contains(&duration_months) {
            return Err(AppError::InvalidInput(format!(
                "duration must be between {} and {} months",
                MIN_DURATION_MONTHS, MAX_DURATION_MONTHS
            )));
        }

        for _ in 0..MAX_EXTEND_ATTEMPTS {
            let existing = self.repo.get_by_user(user_id).await?;
            let change = SubscriptionChange {
                user_id,
                plan_id: plan_id.to_string(),
                cause_key: cause_key.clone(),
                months: duration_months,
                window: extended_window(existing.as_ref(), duration_months, now),
                expected_version: existing.as_ref().map(|s| s.version),
            };

            match self.repo.apply_extension(&change).await? {
                ExtendOutcome::Applied(subscription) => {
                    tracing::info!(
                        user_id = %user_id,
                        plan_id,
                        ends_at = %subscription.ends_at,
                        "Subscription extended"
                    );
                    return Ok(subscription);
                }
                ExtendOutcome::AlreadyApplied(subscription) => return Ok(subscription),
                ExtendOutcome::VersionConflict => {
                    tracing::debug!(user_id = %user_id, "Subscription version conflict");
                }
            }
        }
        Err(AppError::ConcurrencyConflict)
    }

    /// Buys a subscription with money already on the balance.
    ///
    /// The debit and the extension share one cause key, so a repeated call charges once.
    /// If the extension fails the debit is refunded under `refund:<cause>` and the
    /// extension's error is returned; that cause is then spent and a later call with it
    /// is rejected instead of charging again.
    #[instrument(skip(self), fields(cause = %cause_key))]
    pub async fn purchase(
        &self,
        user_id: Uuid,
        plan_id: &str,
        price: i64,
        duration_months: i32,
        cause_key: CauseKey,
    ) -> AppResult<Subscription> {
        let charged = self
            .balances
            .debit(user_id, price, cause_key.clone())
            .await?;
        if !charged.was_applied() && self.balances.was_refunded(user_id, &cause_key).await? {
            return Err(AppError::InvalidInput(
                "this purchase was rolled back, retry with a new idempotency key".into(),
            ));
        }

        match self
            .extend(user_id, plan_id, duration_months, cause_key.clone(), Utc::now())
            .await
        {
            Ok(subscription) => Ok(subscription),
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Subscription extension failed, refunding the debit"
                );
                if let Err(refund_error) = self.balances.refund(user_id, price, &cause_key).await {
                    tracing::error!(
                        user_id = %user_id,
                        amount = price,
                        error = %refund_error,
                        "Could not refund a failed subscription purchase"
                    );
                }
                Err(e)
            }
        }
    }

    /// `POST /subscription/activate`: checks the price against the catalog, then
    /// purchases from the balance.
    #[instrument(skip(self))]
    pub async fn activate_from_balance(
        &self,
        user_id: Uuid,
        plan_id: &str,
        price: i64,
        duration_months: i32,
        idempotency_key: &str,
    ) -> AppResult<Subscription> {
        self.catalog.validate_order(plan_id, price, duration_months)?;
        self.purchase(
            user_id,
            plan_id,
            price,
            duration_months,
            CauseKey::activation(user_id, idempotency_key),
        )
        .await
    }
}
