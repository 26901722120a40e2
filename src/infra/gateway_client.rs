use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        ExternalPaymentId, GatewayNotification, GatewayPayment, GatewayPaymentRequest,
        GatewayProvider, GatewayStatus, PaymentGatewayPort,
    },
    infra::webhook_signature,
};

/// TCP handshake + TLS
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct GatewayClientConfig {
    pub api_url: Url,
    pub shop_id: String,
    pub secret_key: SecretString,
    pub webhook_secret: SecretString,
    pub request_timeout: Duration,
}

/// Client of the hosted payment provider.
///
/// Amounts travel as decimal strings with two fraction digits. Every create call
/// carries the intent id as `Idempotence-Key`, so a retried request never opens a
/// second payment.
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    config: GatewayClientConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn auth_header(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!(
            "{}:{}",
            self.config.shop_id,
            self.config.secret_key.expose_secret()
        ));
        format!("Basic {}", encoded)
    }

    fn endpoint(&self, path: &str) -> AppResult<Url> {
        self.config
            .api_url
            .join(path)
            .map_err(|e| AppError::Internal(format!("invalid gateway url: {}", e)))
    }

    fn payment_from_wire(&self, payment: ProviderPayment) -> AppResult<GatewayPayment> {
        Ok(GatewayPayment {
            status: map_status(&payment.status),
            amount: parse_amount(&payment.amount.value)?,
            currency: payment.amount.currency,
            confirmation_url: payment.confirmation.and_then(|c| c.confirmation_url),
            intent_id: payment
                .metadata
                .and_then(|m| m.intent_id)
                .and_then(|id| Uuid::parse_str(&id).ok()),
            external_id: ExternalPaymentId::new(payment.id),
        })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::TransientGateway(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Payment provider error");
            let description = serde_json::from_str::<ProviderError>(&body)
                .ok()
                .and_then(|e| e.description)
                .unwrap_or_else(|| status.to_string());
            return Err(classify_status(status, description));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse provider response");
            AppError::Internal(format!("failed to parse provider response: {}", e))
        })
    }
}

#[async_trait]
impl PaymentGatewayPort for GatewayClient {
    fn provider(&self) -> GatewayProvider {
        GatewayProvider::Http
    }

    async fn create_payment(&self, request: &GatewayPaymentRequest) -> AppResult<GatewayPayment> {
        let body = CreatePaymentBody {
            amount: WireAmount {
                value: format_amount(request.amount)?,
                currency: request.currency.clone(),
            },
            capture: true,
            confirmation: WireConfirmationRequest {
                confirmation_type: "redirect",
                return_url: &request.return_url,
            },
            description: request.purpose.description(),
            metadata: WireMetadata {
                intent_id: Some(request.intent_id.to_string()),
                user_id: Some(request.user_id.to_string()),
            },
        };

        let response = self
            .client
            .post(self.endpoint("payments")?)
            .header("Authorization", self.auth_header())
            .header("Idempotence-Key", request.intent_id.to_string())
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        let payment: ProviderPayment = self.handle_response(response).await?;
        self.payment_from_wire(payment)
    }

    async fn fetch_payment(&self, external_id: &ExternalPaymentId) -> AppResult<GatewayPayment> {
        let response = self
            .client
            .get(self.endpoint(&format!("payments/{}", external_id))?)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(request_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::UnknownExternalId(external_id.to_string()));
        }
        let payment: ProviderPayment = self.handle_response(response).await?;
        self.payment_from_wire(payment)
    }

    fn verify_notification(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
    ) -> AppResult<GatewayNotification> {
        webhook_signature::verify(
            &self.config.webhook_secret,
            signature_header,
            body,
            chrono::Utc::now().timestamp(),
        )?;

        let notification: ProviderNotification = serde_json::from_slice(body)
            .map_err(|e| AppError::InvalidInput(format!("malformed notification: {}", e)))?;
        tracing::debug!(event = %notification.event, "Payment notification received");
        Ok(self.payment_from_wire(notification.object)?.into())
    }
}

// ============================================================================
// Status and amount mapping
// ============================================================================

/// Provider status to normalized status. Unknown values never grant money.
pub fn map_status(status: &str) -> GatewayStatus {
    match status {
        "succeeded" => GatewayStatus::Succeeded,
        "canceled" => GatewayStatus::Failed,
        "pending" | "waiting_for_capture" => GatewayStatus::Pending,
        other => {
            tracing::warn!(status = other, "Unknown provider payment status");
            GatewayStatus::Pending
        }
    }
}

fn classify_status(status: StatusCode, description: String) -> AppError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        AppError::TransientGateway(format!("{}: {}", status, description))
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        AppError::Internal(format!("provider refused credentials: {}", description))
    } else {
        AppError::PaymentRejected(description)
    }
}

fn request_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        AppError::TransientGateway(format!("provider request failed: {}", e))
    } else {
        AppError::Internal(format!("provider request failed: {}", e))
    }
}

/// `"100.00"` to `10000` minor units. At most two fraction digits.
pub fn parse_amount(value: &str) -> AppResult<i64> {
    let invalid = || AppError::InvalidInput(format!("invalid amount '{}'", value));
    let value = value.trim();
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    if whole.is_empty()
        || fraction.len() > 2
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    let whole: i64 = whole.parse().map_err(|_| invalid())?;
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => fraction.parse().map_err(|_| invalid())?,
    };
    whole
        .checked_mul(100)
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(invalid)
}

/// `10000` minor units to `"100.00"`
pub fn format_amount(minor: i64) -> AppResult<String> {
    if minor < 0 {
        return Err(AppError::InvalidInput("amount must not be negative".into()));
    }
    Ok(format!("{}.{:02}", minor / 100, minor % 100))
}

// ============================================================================
// Provider Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct WireAmount {
    value: String,
    currency: String,
}

#[derive(Debug, Serialize)]
struct WireConfirmationRequest<'a> {
    #[serde(rename = "type")]
    confirmation_type: &'static str,
    return_url: &'a str,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    intent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreatePaymentBody<'a> {
    amount: WireAmount,
    capture: bool,
    confirmation: WireConfirmationRequest<'a>,
    description: &'static str,
    metadata: WireMetadata,
}

#[derive(Debug, Deserialize)]
struct WireConfirmation {
    confirmation_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderPayment {
    id: String,
    status: String,
    amount: WireAmount,
    confirmation: Option<WireConfirmation>,
    metadata: Option<WireMetadata>,
}

#[derive(Debug, Deserialize)]
struct ProviderNotification {
    event: String,
    object: ProviderPayment,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    description: Option<String>,
}
