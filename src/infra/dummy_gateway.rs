use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        ExternalPaymentId, GatewayNotification, GatewayPayment, GatewayPaymentRequest,
        GatewayProvider, GatewayStatus, PaymentGatewayPort,
    },
    domain::entities::payment_scenario::PaymentScenario,
    infra::webhook_signature,
};

/// Notification body sent by the dummy provider.
/// `amount` is in minor units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DummyNotificationBody {
    pub external_id: String,
    pub status: GatewayStatus,
    pub amount: i64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_id: Option<Uuid>,
}

/// A notification ready to be posted to the callback endpoint
#[derive(Debug, Clone)]
pub struct SignedNotification {
    pub body: String,
    pub signature: String,
}

#[derive(Default)]
struct DummyLedger {
    payments: HashMap<String, GatewayPayment>,
    /// Idempotence: intent id -> external id
    by_intent: HashMap<Uuid, String>,
}

/// In-process payment provider for local development and tests.
///
/// Payments live in memory. An operator settles them by hand and the provider
/// produces signed notifications with the same scheme as the real one.
pub struct DummyGateway {
    webhook_secret: SecretString,
    confirmation_base: String,
    scenario: Mutex<PaymentScenario>,
    ledger: Mutex<DummyLedger>,
    create_calls: AtomicU32,
}

impl DummyGateway {
    pub fn new(
        webhook_secret: SecretString,
        scenario: PaymentScenario,
        confirmation_base: impl Into<String>,
    ) -> Self {
        Self {
            webhook_secret,
            confirmation_base: confirmation_base.into(),
            scenario: Mutex::new(scenario),
            ledger: Mutex::new(DummyLedger::default()),
            create_calls: AtomicU32::new(0),
        }
    }

    pub fn set_scenario(&self, scenario: PaymentScenario) {
        if let Ok(mut current) = self.scenario.lock() {
            *current = scenario;
        }
    }

    pub fn scenario(&self) -> PaymentScenario {
        self.scenario.lock().map(|s| *s).unwrap_or_default()
    }

    /// Number of `create_payment` calls that reached the provider
    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Moves a payment to its final state and returns the notification the provider
    /// would send for it.
    pub fn settle(
        &self,
        external_id: &ExternalPaymentId,
        status: GatewayStatus,
    ) -> AppResult<SignedNotification> {
        let payment = {
            let mut ledger = self.lock_ledger()?;
            let payment = ledger
                .payments
                .get_mut(external_id.as_str())
                .ok_or_else(|| AppError::UnknownExternalId(external_id.to_string()))?;
            if payment.status != GatewayStatus::Pending && payment.status != status {
                return Err(AppError::InvalidInput(format!(
                    "payment already {}",
                    payment.status
                )));
            }
            payment.status = status;
            payment.clone()
        };

        tracing::info!(external_id = %external_id, status = %status, "Dummy payment settled");
        self.sign_notification(&payment)
    }

    fn sign_notification(&self, payment: &GatewayPayment) -> AppResult<SignedNotification> {
        let body = serde_json::to_string(&DummyNotificationBody {
            external_id: payment.external_id.to_string(),
            status: payment.status,
            amount: payment.amount,
            currency: payment.currency.clone(),
            intent_id: payment.intent_id,
        })
        .map_err(|e| AppError::Internal(format!("failed to serialize notification: {}", e)))?;
        let signature = webhook_signature::sign(
            &self.webhook_secret,
            chrono::Utc::now().timestamp(),
            body.as_bytes(),
        )?;
        Ok(SignedNotification { body, signature })
    }

    fn lock_ledger(&self) -> AppResult<std::sync::MutexGuard<'_, DummyLedger>> {
        self.ledger
            .lock()
            .map_err(|_| AppError::Internal("dummy gateway state poisoned".into()))
    }
}

#[async_trait]
impl PaymentGatewayPort for DummyGateway {
    fn provider(&self) -> GatewayProvider {
        GatewayProvider::Dummy
    }

    async fn create_payment(&self, request: &GatewayPaymentRequest) -> AppResult<GatewayPayment> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let status = match self.scenario() {
            PaymentScenario::Unavailable => {
                return Err(AppError::TransientGateway(
                    "dummy provider unavailable".into(),
                ));
            }
            PaymentScenario::Decline => {
                return Err(AppError::PaymentRejected("payment declined".into()));
            }
            PaymentScenario::AwaitConfirmation => GatewayStatus::Pending,
            PaymentScenario::Succeed => GatewayStatus::Succeeded,
        };

        let mut ledger = self.lock_ledger()?;
        if let Some(existing) = ledger
            .by_intent
            .get(&request.intent_id)
            .and_then(|id| ledger.payments.get(id))
        {
            return Ok(existing.clone());
        }

        let external_id = format!("dummy_pay_{}", Uuid::new_v4().simple());
        let payment = GatewayPayment {
            external_id: ExternalPaymentId::new(external_id.clone()),
            status,
            amount: request.amount,
            currency: request.currency.clone(),
            confirmation_url: Some(format!(
                "{}/dummy/confirm/{}",
                self.confirmation_base.trim_end_matches('/'),
                external_id
            )),
            intent_id: Some(request.intent_id),
        };
        ledger.by_intent.insert(request.intent_id, external_id.clone());
        ledger.payments.insert(external_id, payment.clone());

        tracing::debug!(
            intent_id = %request.intent_id,
            external_id = %payment.external_id,
            "Dummy payment created"
        );
        Ok(payment)
    }

    async fn fetch_payment(&self, external_id: &ExternalPaymentId) -> AppResult<GatewayPayment> {
        if self.scenario() == PaymentScenario::Unavailable {
            return Err(AppError::TransientGateway(
                "dummy provider unavailable".into(),
            ));
        }
        self.lock_ledger()?
            .payments
            .get(external_id.as_str())
            .cloned()
            .ok_or_else(|| AppError::UnknownExternalId(external_id.to_string()))
    }

    fn verify_notification(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
    ) -> AppResult<GatewayNotification> {
        webhook_signature::verify(
            &self.webhook_secret,
            signature_header,
            body,
            chrono::Utc::now().timestamp(),
        )?;

        let parsed: DummyNotificationBody = serde_json::from_slice(body)
            .map_err(|e| AppError::InvalidInput(format!("malformed notification: {}", e)))?;
        Ok(GatewayNotification {
            external_id: ExternalPaymentId::new(parsed.external_id),
            status: parsed.status,
            amount: parsed.amount,
            currency: parsed.currency,
            intent_id: parsed.intent_id,
        })
    }
}
