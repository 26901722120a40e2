use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{app_error::AppResult, domain::entities::payment_purpose::PaymentPurpose};

// ============================================================================
// Port Types - Provider-agnostic payment types
// ============================================================================

/// Identifier of a payment in the provider's own ledger
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalPaymentId(pub String);

impl ExternalPaymentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExternalPaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which provider implementation serves the gateway port
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum GatewayProvider {
    /// Remote provider reached over HTTPS
    Http,
    /// In-process provider for local development
    Dummy,
}

/// Normalized gateway outcome.
///
/// Provider specific states collapse onto these three; anything the adapter does not
/// recognise becomes `Pending` so that no money is ever granted by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GatewayStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Request to open a payment for an intent
#[derive(Debug, Clone)]
pub struct GatewayPaymentRequest {
    pub intent_id: Uuid,
    pub user_id: Uuid,
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
    pub purpose: PaymentPurpose,
    /// Where the provider sends the user after confirmation
    pub return_url: String,
}

/// The provider's view of one payment
#[derive(Debug, Clone)]
pub struct GatewayPayment {
    pub external_id: ExternalPaymentId,
    pub status: GatewayStatus,
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
    pub confirmation_url: Option<String>,
    /// Intent id echoed back from the metadata we attached on creation
    pub intent_id: Option<Uuid>,
}

/// A verified asynchronous notification, reduced to what reconciliation needs
#[derive(Debug, Clone)]
pub struct GatewayNotification {
    pub external_id: ExternalPaymentId,
    pub status: GatewayStatus,
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
    pub intent_id: Option<Uuid>,
}

impl From<GatewayPayment> for GatewayNotification {
    fn from(payment: GatewayPayment) -> Self {
        Self {
            external_id: payment.external_id,
            status: payment.status,
            amount: payment.amount,
            currency: payment.currency,
            intent_id: payment.intent_id,
        }
    }
}

// ============================================================================
// Port Trait
// ============================================================================

/// Payment gateway port.
///
/// Errors:
/// - `TransientGateway` for timeouts, connection failures, 429 and 5xx (retryable)
/// - `PaymentRejected` when the provider refuses a payment
/// - `UnknownExternalId` when the provider has no such payment
/// - `SignatureInvalid` when a notification fails authentication
#[async_trait]
pub trait PaymentGatewayPort: Send + Sync {
    fn provider(&self) -> GatewayProvider;

    /// Opens a payment. The intent id doubles as the provider idempotence key,
    /// so resubmitting the same intent never creates a second payment.
    async fn create_payment(&self, request: &GatewayPaymentRequest) -> AppResult<GatewayPayment>;

    async fn fetch_payment(&self, external_id: &ExternalPaymentId) -> AppResult<GatewayPayment>;

    /// Authenticates and parses a raw notification body.
    /// Nothing in the body may be trusted before this returns `Ok`.
    fn verify_notification(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
    ) -> AppResult<GatewayNotification>;
}
