use std::sync::Arc;

use chrono::Duration;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::instrument;
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::application::{
    ports::{
        alerts::{OperatorAlert, OperatorAlertPort},
        payment_gateway::{
            ExternalPaymentId, GatewayNotification, GatewayPaymentRequest, GatewayStatus,
            PaymentGatewayPort,
        },
    },
    retry::{RetryPolicy, retry_transient},
    use_cases::{
        balance::BalanceUseCases,
        ledger::{LedgerUseCases, NewPaymentIntent, StatusUpdate},
        subscription::SubscriptionUseCases,
    },
    validators::{is_valid_currency, is_valid_idempotency_key},
};
use crate::domain::entities::{
    balance::CauseKey, payment_intent::PaymentIntent, payment_intent_status::PaymentIntentStatus,
    payment_purpose::PaymentPurpose,
};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    /// The single currency the service accepts
    pub currency: String,
    /// Largest single top-up, minor units
    pub max_amount: i64,
    /// Where the provider sends users back after confirming
    pub return_url: String,
    pub retry: RetryPolicy,
}

/// Result of starting a payment
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    /// The gateway knows about the payment (or the intent was already past `created`)
    Accepted(PaymentIntent),
    /// The gateway could not be reached; the intent stays `created` and is resubmitted later
    Processing(PaymentIntent),
}

impl CheckoutOutcome {
    pub fn intent(&self) -> &PaymentIntent {
        match self {
            CheckoutOutcome::Accepted(i) | CheckoutOutcome::Processing(i) => i,
        }
    }
}

/// Result of applying one gateway result to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The intent moved forward
    Applied,
    /// The same success was already settled
    Duplicate,
    /// Stale or irrelevant notification, nothing changed
    Ignored,
}

/// Tally of one sweep over stale intents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub advanced: usize,
    pub unchanged: usize,
    pub failed: usize,
}

// ============================================================================
// Use Cases
// ============================================================================

/// Ties gateway results to ledger and balance updates.
///
/// ```text
/// created --gateway accepts--> pending
/// pending --success--> credit balance once --> succeeded
/// pending --failure--> failed
/// created --user cancels--> canceled
/// ```
#[derive(Clone)]
pub struct ReconciliationUseCases {
    ledger: LedgerUseCases,
    balances: BalanceUseCases,
    subscriptions: SubscriptionUseCases,
    gateway: Arc<dyn PaymentGatewayPort>,
    alerts: Arc<dyn OperatorAlertPort>,
    settings: PaymentSettings,
}

impl ReconciliationUseCases {
    pub fn new(
        ledger: LedgerUseCases,
        balances: BalanceUseCases,
        subscriptions: SubscriptionUseCases,
        gateway: Arc<dyn PaymentGatewayPort>,
        alerts: Arc<dyn OperatorAlertPort>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            ledger,
            balances,
            subscriptions,
            gateway,
            alerts,
            settings,
        }
    }

    pub fn settings(&self) -> &PaymentSettings {
        &self.settings
    }

    // ========================================================================
    // Starting payments
    // ========================================================================

    #[instrument(skip(self, idempotency_key))]
    pub async fn start_top_up(
        &self,
        user_id: Uuid,
        amount: i64,
        currency: Option<String>,
        idempotency_key: Option<String>,
    ) -> AppResult<CheckoutOutcome> {
        if amount <= 0 {
            return Err(AppError::InvalidInput("amount must be positive".into()));
        }
        if amount > self.settings.max_amount {
            return Err(AppError::InvalidInput(format!(
                "amount must not exceed {}",
                self.settings.max_amount
            )));
        }
        let currency = self.resolve_currency(currency)?;
        let idempotency_key = Self::resolve_idempotency_key(idempotency_key)?;

        self.balances.open_account(user_id).await?;
        let intent = self
            .ledger
            .create_intent(NewPaymentIntent {
                user_id,
                amount,
                currency,
                purpose: PaymentPurpose::TopUp,
                plan_id: None,
                duration_months: None,
                idempotency_key,
            })
            .await?;

        self.submit(intent).await
    }

    /// Pays for a subscription through the gateway. On success the money is credited
    /// and immediately spent on the extension.
    #[instrument(skip(self, idempotency_key))]
    pub async fn start_subscription_checkout(
        &self,
        user_id: Uuid,
        plan_id: &str,
        price: i64,
        duration_months: i32,
        idempotency_key: Option<String>,
    ) -> AppResult<CheckoutOutcome> {
        self.subscriptions
            .catalog()
            .validate_order(plan_id, price, duration_months)?;
        let idempotency_key = Self::resolve_idempotency_key(idempotency_key)?;

        self.balances.open_account(user_id).await?;
        let intent = self
            .ledger
            .create_intent(NewPaymentIntent {
                user_id,
                amount: price,
                currency: self.settings.currency.clone(),
                purpose: PaymentPurpose::Subscription,
                plan_id: Some(plan_id.to_string()),
                duration_months: Some(duration_months),
                idempotency_key,
            })
            .await?;

        self.submit(intent).await
    }

    /// Cancels an intent the gateway has not accepted yet.
    #[instrument(skip(self))]
    pub async fn cancel(&self, user_id: Uuid, intent_id: Uuid) -> AppResult<PaymentIntent> {
        let intent = self.ledger.get_for_user(user_id, intent_id).await?;
        self.ledger
            .mark_status(
                intent.id,
                PaymentIntentStatus::Canceled,
                StatusUpdate {
                    failure_reason: Some("canceled by user".into()),
                    ..Default::default()
                },
            )
            .await
    }

    /// Sends a `created` intent to the gateway. Intents past `created` are returned as is.
    async fn submit(&self, intent: PaymentIntent) -> AppResult<CheckoutOutcome> {
        if intent.status != PaymentIntentStatus::Created {
            return Ok(CheckoutOutcome::Accepted(intent));
        }

        let request = GatewayPaymentRequest {
            intent_id: intent.id,
            user_id: intent.user_id,
            amount: intent.amount,
            currency: intent.currency.clone(),
            purpose: intent.purpose,
            return_url: self.settings.return_url.clone(),
        };

        let created = retry_transient(&self.settings.retry, "gateway.create_payment", || {
            self.gateway.create_payment(&request)
        })
        .await;

        match created {
            Ok(payment) => {
                let accepted = self
                    .ledger
                    .mark_status(
                        intent.id,
                        PaymentIntentStatus::Pending,
                        StatusUpdate {
                            external_id: Some(payment.external_id.to_string()),
                            confirmation_url: payment.confirmation_url.clone(),
                            failure_reason: None,
                        },
                    )
                    .await;

                let intent = match accepted {
                    Ok(intent) => intent,
                    Err(AppError::InvalidTransition { from, .. }) => {
                        // A notification or a cancel got there first
                        tracing::info!(
                            intent_id = %intent.id,
                            status = %from,
                            "Intent moved on before gateway acceptance was recorded"
                        );
                        self.ledger
                            .record_gateway_details(
                                intent.id,
                                StatusUpdate {
                                    external_id: Some(payment.external_id.to_string()),
                                    confirmation_url: payment.confirmation_url.clone(),
                                    failure_reason: None,
                                },
                            )
                            .await?;
                        self.ledger.get(intent.id).await?
                    }
                    Err(e) => return Err(e),
                };

                if payment.status != GatewayStatus::Pending {
                    self.apply_gateway_result(payment.into()).await?;
                    return Ok(CheckoutOutcome::Accepted(self.ledger.get(intent.id).await?));
                }
                Ok(CheckoutOutcome::Accepted(intent))
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    intent_id = %intent.id,
                    error = %e,
                    "Gateway unavailable, intent left for reconciliation"
                );
                Ok(CheckoutOutcome::Processing(intent))
            }
            Err(AppError::PaymentRejected(reason)) => {
                tracing::info!(intent_id = %intent.id, reason = %reason, "Gateway rejected payment");
                self.ledger
                    .mark_status(
                        intent.id,
                        PaymentIntentStatus::Canceled,
                        StatusUpdate {
                            failure_reason: Some(reason.clone()),
                            ..Default::default()
                        },
                    )
                    .await?;
                Err(AppError::PaymentRejected(reason))
            }
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Gateway results
    // ========================================================================

    /// Entry point for provider notifications. The signature is checked before
    /// anything in the body is looked at.
    pub async fn handle_notification(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> AppResult<ReconcileOutcome> {
        let notification = match self.gateway.verify_notification(body, signature) {
            Ok(notification) => notification,
            Err(e @ AppError::SignatureInvalid(_)) => {
                tracing::warn!(
                    security_review = true,
                    provider = %self.gateway.provider(),
                    has_signature = signature.is_some(),
                    body_len = body.len(),
                    error = %e,
                    "Rejected unauthenticated payment notification"
                );
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.apply_gateway_result(notification).await
    }

    /// Applies an authenticated gateway result to the matching intent.
    #[instrument(skip(self, result), fields(external_id = %result.external_id, status = %result.status))]
    pub async fn apply_gateway_result(
        &self,
        result: GatewayNotification,
    ) -> AppResult<ReconcileOutcome> {
        let intent = self.locate_intent(&result).await?;

        if result.amount != intent.amount
            || !result.currency.eq_ignore_ascii_case(&intent.currency)
        {
            tracing::warn!(
                intent_id = %intent.id,
                expected = intent.amount,
                expected_currency = %intent.currency,
                reported = result.amount,
                reported_currency = %result.currency,
                "Gateway reported a different amount"
            );
            self.alerts.raise(OperatorAlert::AmountMismatch {
                intent_id: intent.id,
                external_id: result.external_id.to_string(),
                expected: intent.amount,
                expected_currency: intent.currency.clone(),
                reported: result.amount,
                reported_currency: result.currency.clone(),
            });
            return Err(AppError::AmountMismatch {
                external_id: result.external_id.to_string(),
                expected: intent.amount,
                expected_currency: intent.currency,
                reported: result.amount,
                reported_currency: result.currency,
            });
        }

        if matches!(
            intent.status,
            PaymentIntentStatus::Failed | PaymentIntentStatus::Canceled
        ) {
            tracing::info!(
                intent_id = %intent.id,
                status = %intent.status,
                "Notification for closed intent ignored"
            );
            return Ok(ReconcileOutcome::Ignored);
        }

        match result.status {
            GatewayStatus::Pending => self.apply_pending(intent, &result).await,
            GatewayStatus::Failed => self.apply_failure(intent, &result).await,
            GatewayStatus::Succeeded => self.apply_success(intent, &result).await,
        }
    }

    async fn locate_intent(&self, result: &GatewayNotification) -> AppResult<PaymentIntent> {
        if let Some(intent) = self
            .ledger
            .find_by_external_id(result.external_id.as_str())
            .await?
        {
            return Ok(intent);
        }

        // The acceptance may not be recorded yet; trust the intent id from our own metadata
        // only while no other gateway id is attached to it.
        if let Some(intent_id) = result.intent_id {
            match self.ledger.get(intent_id).await {
                Ok(intent)
                    if intent
                        .external_id
                        .as_deref()
                        .is_none_or(|id| id == result.external_id.as_str()) =>
                {
                    return Ok(intent);
                }
                Ok(_) | Err(AppError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(external_id = %result.external_id, "Notification for unknown payment");
        Err(AppError::UnknownExternalId(result.external_id.to_string()))
    }

    async fn apply_pending(
        &self,
        intent: PaymentIntent,
        result: &GatewayNotification,
    ) -> AppResult<ReconcileOutcome> {
        if intent.status != PaymentIntentStatus::Created {
            return Ok(ReconcileOutcome::Ignored);
        }
        match self.accept(&intent, result).await? {
            Some(_) => Ok(ReconcileOutcome::Applied),
            None => Ok(ReconcileOutcome::Ignored),
        }
    }

    async fn apply_failure(
        &self,
        intent: PaymentIntent,
        result: &GatewayNotification,
    ) -> AppResult<ReconcileOutcome> {
        if intent.status == PaymentIntentStatus::Succeeded {
            tracing::warn!(intent_id = %intent.id, "Failure reported for settled intent, ignored");
            return Ok(ReconcileOutcome::Ignored);
        }
        if intent.status == PaymentIntentStatus::Created && self.accept(&intent, result).await?.is_none() {
            return Ok(ReconcileOutcome::Ignored);
        }

        match self
            .ledger
            .mark_status(
                intent.id,
                PaymentIntentStatus::Failed,
                StatusUpdate {
                    failure_reason: Some("payment failed at provider".into()),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(_) => Ok(ReconcileOutcome::Applied),
            Err(AppError::InvalidTransition { .. }) => Ok(ReconcileOutcome::Ignored),
            Err(e) => Err(e),
        }
    }

    async fn apply_success(
        &self,
        intent: PaymentIntent,
        result: &GatewayNotification,
    ) -> AppResult<ReconcileOutcome> {
        if intent.status == PaymentIntentStatus::Succeeded {
            // Settlement is idempotent, running it again repairs nothing and costs nothing
            self.settle(&intent).await?;
            tracing::info!(intent_id = %intent.id, "Duplicate success notification");
            return Ok(ReconcileOutcome::Duplicate);
        }
        if intent.status == PaymentIntentStatus::Created && self.accept(&intent, result).await?.is_none() {
            return Ok(ReconcileOutcome::Ignored);
        }

        // Money first: if this fails the intent stays pending and is retried later
        self.settle(&intent).await?;

        match self
            .ledger
            .mark_status(intent.id, PaymentIntentStatus::Succeeded, StatusUpdate::default())
            .await
        {
            Ok(_) => Ok(ReconcileOutcome::Applied),
            Err(AppError::InvalidTransition {
                from: PaymentIntentStatus::Succeeded,
                ..
            }) => Ok(ReconcileOutcome::Duplicate),
            Err(e) => Err(e),
        }
    }

    /// `created -> pending` with the gateway id. `None` if the intent left `created`
    /// for anything but `pending` meanwhile.
    async fn accept(
        &self,
        intent: &PaymentIntent,
        result: &GatewayNotification,
    ) -> AppResult<Option<PaymentIntent>> {
        match self
            .ledger
            .mark_status(
                intent.id,
                PaymentIntentStatus::Pending,
                StatusUpdate {
                    external_id: Some(result.external_id.to_string()),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(intent) => Ok(Some(intent)),
            Err(AppError::InvalidTransition {
                from: PaymentIntentStatus::Pending,
                ..
            }) => self.ledger.get(intent.id).await.map(Some),
            Err(AppError::InvalidTransition { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Credits the intent's money and, for subscription purchases, spends it.
    /// Every step is keyed by the intent id, so running this twice is harmless.
    async fn settle(&self, intent: &PaymentIntent) -> AppResult<()> {
        let credited = retry_transient(&self.settings.retry, "balance.credit", || {
            self.balances.credit(intent.user_id, intent.amount, intent.id)
        })
        .await;

        if let Err(e) = credited {
            tracing::error!(
                intent_id = %intent.id,
                user_id = %intent.user_id,
                error = %e,
                "Could not credit confirmed payment"
            );
            self.alerts.raise(OperatorAlert::CreditFailed {
                intent_id: intent.id,
                user_id: intent.user_id,
                amount: intent.amount,
                reason: e.to_string(),
            });
            return Err(e);
        }

        if let Some(order) = intent.subscription_order() {
            let purchased = retry_transient(&self.settings.retry, "subscription.purchase", || {
                self.subscriptions.purchase(
                    intent.user_id,
                    &order.plan_id,
                    intent.amount,
                    order.duration_months,
                    CauseKey::intent_charge(intent.id),
                )
            })
            .await;

            if let Err(e) = purchased {
                tracing::error!(
                    intent_id = %intent.id,
                    user_id = %intent.user_id,
                    error = %e,
                    "Subscription purchase after payment failed"
                );
                self.alerts.raise(OperatorAlert::SubscriptionChargeFailed {
                    intent_id: intent.id,
                    user_id: intent.user_id,
                    reason: e.to_string(),
                });
                // The money stays on the balance; only retry when the store was unreachable
                if e.is_transient() {
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    // ========================================================================
    // Background reconciliation
    // ========================================================================

    /// Drives one non-terminal intent forward: resubmits it if the gateway never
    /// accepted it, otherwise asks the gateway for the current state.
    pub async fn reconcile_intent(&self, intent: PaymentIntent) -> AppResult<ReconcileOutcome> {
        match intent.status {
            PaymentIntentStatus::Created => match self.submit(intent).await? {
                CheckoutOutcome::Accepted(_) => Ok(ReconcileOutcome::Applied),
                CheckoutOutcome::Processing(_) => Ok(ReconcileOutcome::Ignored),
            },
            PaymentIntentStatus::Pending => {
                let Some(external_id) = intent.external_id.as_deref() else {
                    return Ok(ReconcileOutcome::Ignored);
                };
                let external_id = ExternalPaymentId::new(external_id);
                let payment = retry_transient(&self.settings.retry, "gateway.fetch_payment", || {
                    self.gateway.fetch_payment(&external_id)
                })
                .await?;
                if payment.status == GatewayStatus::Pending {
                    return Ok(ReconcileOutcome::Ignored);
                }
                self.apply_gateway_result(payment.into()).await
            }
            _ => Ok(ReconcileOutcome::Ignored),
        }
    }

    /// One sweep over intents untouched for `older_than`, at most `concurrency` at a time.
    pub async fn reconcile_stale(
        &self,
        older_than: Duration,
        limit: i64,
        concurrency: usize,
    ) -> AppResult<SweepReport> {
        let intents = self.ledger.list_stale(older_than, limit).await?;
        let mut report = SweepReport {
            examined: intents.len(),
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for intent in intents {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::Internal(format!("reconcile semaphore closed: {e}")))?;
            let this = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let intent_id = intent.id;
                (intent_id, this.reconcile_intent(intent).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(ReconcileOutcome::Applied))) => report.advanced += 1,
                Ok((_, Ok(_))) => report.unchanged += 1,
                Ok((intent_id, Err(e))) => {
                    tracing::warn!(intent_id = %intent_id, error = %e, "Reconciliation failed");
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Reconciliation task panicked");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    // ========================================================================
    // Private Helpers
    // ========================================================================

    fn resolve_currency(&self, currency: Option<String>) -> AppResult<String> {
        match currency {
            None => Ok(self.settings.currency.clone()),
            Some(c) => {
                let c = c.trim().to_ascii_uppercase();
                if !is_valid_currency(&c) || c != self.settings.currency {
                    return Err(AppError::InvalidInput(format!(
                        "only {} payments are accepted",
                        self.settings.currency
                    )));
                }
                Ok(c)
            }
        }
    }

    fn resolve_idempotency_key(key: Option<String>) -> AppResult<String> {
        match key {
            Some(key) if is_valid_idempotency_key(&key) => Ok(key),
            Some(_) => Err(AppError::InvalidInput("invalid idempotency key".into())),
            None => Ok(Uuid::new_v4().to_string()),
        }
    }
}
