//! In-memory mock implementations for the payment repository traits.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::alerts::{OperatorAlert, OperatorAlertPort},
        use_cases::{
            balance::{ApplyOutcome, BalanceChange, BalanceRepoTrait},
            cart::CartRepoTrait,
            ledger::{NewPaymentIntent, PaymentIntentRepoTrait, StatusUpdate},
            subscription::{ExtendOutcome, SubscriptionChange, SubscriptionRepoTrait},
        },
    },
    domain::entities::{
        balance::{Balance, BalanceEntry, CauseKey},
        cart::CartItem,
        payment_intent::PaymentIntent,
        payment_intent_status::PaymentIntentStatus,
        subscription::{Subscription, SubscriptionExtension},
    },
};

fn apply_update(intent: &mut PaymentIntent, update: &StatusUpdate) {
    if let Some(external_id) = &update.external_id {
        intent.external_id = Some(external_id.clone());
    }
    if let Some(url) = &update.confirmation_url {
        intent.confirmation_url = Some(url.clone());
    }
    if let Some(reason) = &update.failure_reason {
        intent.failure_reason = Some(reason.clone());
    }
    intent.updated_at = Utc::now();
}

// ============================================================================
// InMemoryPaymentIntentRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryPaymentIntentRepo {
    pub intents: Mutex<HashMap<Uuid, PaymentIntent>>,
}

impl InMemoryPaymentIntentRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored intent, panics if missing.
    pub fn get(&self, id: Uuid) -> PaymentIntent {
        self.intents
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .expect("intent not stored")
    }

    /// Moves `updated_at` into the past so the intent looks stale.
    pub fn backdate(&self, id: Uuid, by: Duration) {
        if let Some(intent) = self.intents.lock().unwrap().get_mut(&id) {
            intent.updated_at -= by;
        }
    }
}

#[async_trait]
impl PaymentIntentRepoTrait for InMemoryPaymentIntentRepo {
    async fn create_or_get(&self, new: &NewPaymentIntent) -> AppResult<PaymentIntent> {
        let mut intents = self.intents.lock().unwrap();
        if let Some(existing) = intents
            .values()
            .find(|i| i.user_id == new.user_id && i.idempotency_key == new.idempotency_key)
        {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let intent = PaymentIntent {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            amount: new.amount,
            currency: new.currency.clone(),
            purpose: new.purpose,
            plan_id: new.plan_id.clone(),
            duration_months: new.duration_months,
            status: PaymentIntentStatus::Created,
            external_id: None,
            idempotency_key: new.idempotency_key.clone(),
            confirmation_url: None,
            failure_reason: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
        };
        intents.insert(intent.id, intent.clone());
        Ok(intent)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<PaymentIntent>> {
        Ok(self.intents.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_external_id(&self, external_id: &str) -> AppResult<Option<PaymentIntent>> {
        Ok(self
            .intents
            .lock()
            .unwrap()
            .values()
            .find(|i| i.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn get_by_idempotency_key(
        &self,
        user_id: Uuid,
        idempotency_key: &str,
    ) -> AppResult<Option<PaymentIntent>> {
        Ok(self
            .intents
            .lock()
            .unwrap()
            .values()
            .find(|i| i.user_id == user_id && i.idempotency_key == idempotency_key)
            .cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: PaymentIntentStatus,
        to: PaymentIntentStatus,
        update: &StatusUpdate,
    ) -> AppResult<Option<PaymentIntent>> {
        let mut intents = self.intents.lock().unwrap();
        match intents.get_mut(&id) {
            Some(intent) if intent.status == from => {
                intent.status = to;
                apply_update(intent, update);
                Ok(Some(intent.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn record_gateway_details(&self, id: Uuid, update: &StatusUpdate) -> AppResult<()> {
        if let Some(intent) = self.intents.lock().unwrap().get_mut(&id) {
            apply_update(intent, update);
        }
        Ok(())
    }

    async fn list_by_user(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<PaymentIntent>> {
        let mut list: Vec<PaymentIntent> = self
            .intents
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list.truncate(limit.max(0) as usize);
        Ok(list)
    }

    async fn list_stale_open(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<PaymentIntent>> {
        let mut list: Vec<PaymentIntent> = self
            .intents
            .lock()
            .unwrap()
            .values()
            .filter(|i| {
                !i.status.is_terminal() && i.archived_at.is_none() && i.updated_at < updated_before
            })
            .cloned()
            .collect();
        list.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        list.truncate(limit.max(0) as usize);
        Ok(list)
    }

    async fn archive_terminal_before(&self, updated_before: DateTime<Utc>) -> AppResult<u64> {
        let now = Utc::now();
        let mut archived = 0;
        for intent in self.intents.lock().unwrap().values_mut() {
            if intent.status.is_terminal()
                && intent.archived_at.is_none()
                && intent.updated_at < updated_before
            {
                intent.archived_at = Some(now);
                archived += 1;
            }
        }
        Ok(archived)
    }
}

// ============================================================================
// InMemoryBalanceRepo
// ============================================================================

#[derive(Default)]
struct BalanceState {
    balances: HashMap<Uuid, Balance>,
    entries: Vec<BalanceEntry>,
}

/// Applies the same cause/version/sign checks as the Postgres store, under one mutex.
#[derive(Default)]
pub struct InMemoryBalanceRepo {
    state: Mutex<BalanceState>,
    pending_conflicts: AtomicU32,
    unavailable: AtomicBool,
}

impl InMemoryBalanceRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` otherwise valid writes report a version conflict.
    pub fn inject_conflicts(&self, n: u32) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    /// Makes every call fail like an unreachable database.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Database("balance store unavailable".into()));
        }
        Ok(())
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BalanceRepoTrait for InMemoryBalanceRepo {
    async fn get(&self, user_id: Uuid) -> AppResult<Option<Balance>> {
        self.check_available()?;
        Ok(self.state.lock().unwrap().balances.get(&user_id).cloned())
    }

    async fn open_account(&self, user_id: Uuid) -> AppResult<Balance> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        let balance = state.balances.entry(user_id).or_insert_with(|| Balance {
            user_id,
            amount: 0,
            version: 0,
            updated_at: Utc::now(),
        });
        Ok(balance.clone())
    }

    async fn apply(&self, change: &BalanceChange) -> AppResult<ApplyOutcome> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();

        let current = state
            .balances
            .get(&change.user_id)
            .cloned()
            .ok_or(AppError::UserNotFound)?;

        if state
            .entries
            .iter()
            .any(|e| e.user_id == change.user_id && e.cause_key == change.cause_key.as_str())
        {
            return Ok(ApplyOutcome::AlreadyApplied(current));
        }
        if current.version != change.expected_version || self.take_conflict() {
            return Ok(ApplyOutcome::VersionConflict);
        }

        let new_amount = current.amount + change.delta;
        if new_amount < 0 {
            return Err(AppError::InsufficientFunds);
        }

        let now = Utc::now();
        let updated = Balance {
            user_id: change.user_id,
            amount: new_amount,
            version: current.version + 1,
            updated_at: now,
        };
        state.balances.insert(change.user_id, updated.clone());
        state.entries.push(BalanceEntry {
            id: Uuid::new_v4(),
            user_id: change.user_id,
            cause_key: change.cause_key.to_string(),
            delta: change.delta,
            balance_after: new_amount,
            created_at: now,
        });
        Ok(ApplyOutcome::Applied(updated))
    }

    async fn list_entries(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<BalanceEntry>> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .entries
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn has_entry(&self, user_id: Uuid, cause_key: &CauseKey) -> AppResult<bool> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .entries
            .iter()
            .any(|e| e.user_id == user_id && e.cause_key == cause_key.as_str()))
    }
}

// ============================================================================
// InMemorySubscriptionRepo
// ============================================================================

#[derive(Default)]
struct SubscriptionState {
    subscriptions: HashMap<Uuid, Subscription>,
    extensions: Vec<SubscriptionExtension>,
}

#[derive(Default)]
pub struct InMemorySubscriptionRepo {
    state: Mutex<SubscriptionState>,
    unavailable: AtomicBool,
}

impl InMemorySubscriptionRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes writes fail like an unreachable database; reads keep working.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl SubscriptionRepoTrait for InMemorySubscriptionRepo {
    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<Subscription>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .subscriptions
            .get(&user_id)
            .cloned())
    }

    async fn apply_extension(&self, change: &SubscriptionChange) -> AppResult<ExtendOutcome> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Database("subscription store unavailable".into()));
        }
        let mut state = self.state.lock().unwrap();
        let current = state.subscriptions.get(&change.user_id).cloned();

        let already_applied = state
            .extensions
            .iter()
            .any(|e| e.user_id == change.user_id && e.cause_key == change.cause_key.as_str());
        if let (true, Some(subscription)) = (already_applied, current.as_ref()) {
            return Ok(ExtendOutcome::AlreadyApplied(subscription.clone()));
        }
        if current.as_ref().map(|s| s.version) != change.expected_version {
            return Ok(ExtendOutcome::VersionConflict);
        }

        let now = Utc::now();
        let subscription = match &current {
            Some(existing) => Subscription {
                plan_id: change.plan_id.clone(),
                starts_at: change.window.starts_at,
                ends_at: change.window.ends_at,
                version: existing.version + 1,
                updated_at: now,
                ..existing.clone()
            },
            None => Subscription {
                id: Uuid::new_v4(),
                user_id: change.user_id,
                plan_id: change.plan_id.clone(),
                starts_at: change.window.starts_at,
                ends_at: change.window.ends_at,
                version: 0,
                created_at: now,
                updated_at: now,
            },
        };

        state
            .subscriptions
            .insert(change.user_id, subscription.clone());
        state.extensions.push(SubscriptionExtension {
            id: Uuid::new_v4(),
            user_id: change.user_id,
            plan_id: change.plan_id.clone(),
            cause_key: change.cause_key.to_string(),
            months: change.months,
            previous_end: current.map(|s| s.ends_at),
            new_end: subscription.ends_at,
            created_at: now,
        });
        Ok(ExtendOutcome::Applied(subscription))
    }

    async fn list_extensions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<SubscriptionExtension>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .extensions
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

// ============================================================================
// InMemoryCartRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryCartRepo {
    pub items: Mutex<HashMap<Uuid, Vec<CartItem>>>,
}

impl InMemoryCartRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartRepoTrait for InMemoryCartRepo {
    async fn list(&self, user_id: Uuid) -> AppResult<Vec<CartItem>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert(&self, user_id: Uuid, product_id: &str, quantity: i32) -> AppResult<CartItem> {
        let mut items = self.items.lock().unwrap();
        let cart = items.entry(user_id).or_default();
        let now = Utc::now();

        if let Some(item) = cart.iter_mut().find(|i| i.product_id == product_id) {
            item.quantity = quantity;
            item.updated_at = now;
            return Ok(item.clone());
        }

        let item = CartItem {
            user_id,
            product_id: product_id.to_string(),
            quantity,
            added_at: now,
            updated_at: now,
        };
        cart.push(item.clone());
        Ok(item)
    }

    async fn remove(&self, user_id: Uuid, product_id: &str) -> AppResult<bool> {
        let mut items = self.items.lock().unwrap();
        let Some(cart) = items.get_mut(&user_id) else {
            return Ok(false);
        };
        let before = cart.len();
        cart.retain(|i| i.product_id != product_id);
        Ok(cart.len() < before)
    }

    async fn clear(&self, user_id: Uuid) -> AppResult<u64> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .remove(&user_id)
            .map(|cart| cart.len() as u64)
            .unwrap_or(0))
    }
}

// ============================================================================
// RecordingAlertSink
// ============================================================================

/// Keeps raised alerts for assertions.
#[derive(Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<OperatorAlert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raised(&self) -> Vec<OperatorAlert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl OperatorAlertPort for RecordingAlertSink {
    fn raise(&self, alert: OperatorAlert) {
        self.alerts.lock().unwrap().push(alert);
    }
}
