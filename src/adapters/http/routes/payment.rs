use axum::body::Bytes;
use chrono::{DateTime, Utc};

use super::common::*;
use crate::application::ports::payment_gateway::{ExternalPaymentId, GatewayStatus};
use crate::application::use_cases::reconciliation::{CheckoutOutcome, ReconcileOutcome};
use crate::domain::entities::{
    payment_intent::PaymentIntent, payment_intent_status::PaymentIntentStatus,
    payment_purpose::PaymentPurpose,
};
use crate::infra::webhook_signature::SIGNATURE_HEADER;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/topup", post(top_up))
        .route("/intents", get(list_intents))
        .route("/intents/{id}", get(get_intent))
        .route("/intents/{id}/cancel", post(cancel_intent))
        .route("/callback", post(gateway_callback))
        .route("/dummy/{external_id}/settle", post(dummy_settle))
}

// ============================================================================
// Types
// ============================================================================

#[derive(Deserialize)]
struct TopUpPayload {
    amount: i64,
    currency: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct IntentResponse {
    intent_id: Uuid,
    status: PaymentIntentStatus,
    amount: i64,
    currency: String,
    purpose: PaymentPurpose,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_months: Option<i32>,
    confirmation_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PaymentIntent> for IntentResponse {
    fn from(intent: PaymentIntent) -> Self {
        Self {
            intent_id: intent.id,
            status: intent.status,
            amount: intent.amount,
            currency: intent.currency,
            purpose: intent.purpose,
            plan_id: intent.plan_id,
            duration_months: intent.duration_months,
            confirmation_url: intent.confirmation_url,
            failure_reason: intent.failure_reason,
            created_at: intent.created_at,
            updated_at: intent.updated_at,
        }
    }
}

/// 201 when the gateway took the payment, 202 when it will be submitted later
pub(crate) fn checkout_response(outcome: CheckoutOutcome) -> (StatusCode, Json<IntentResponse>) {
    match outcome {
        CheckoutOutcome::Accepted(intent) => (StatusCode::CREATED, Json(intent.into())),
        CheckoutOutcome::Processing(intent) => (StatusCode::ACCEPTED, Json(intent.into())),
    }
}

#[derive(Serialize)]
struct CallbackResponse {
    result: &'static str,
}

#[derive(Deserialize)]
struct DummySettlePayload {
    status: GatewayStatus,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/payment/topup
async fn top_up(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<TopUpPayload>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &jar, &app_state)?;
    let key = idempotency_key(&headers)?;

    let outcome = app_state
        .reconciliation
        .start_top_up(user_id, payload.amount, payload.currency, key)
        .await?;

    Ok(checkout_response(outcome))
}

/// GET /api/payment/intents
async fn list_intents(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<LimitQuery>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &jar, &app_state)?;
    let intents = app_state
        .ledger
        .list_for_user(user_id, query.limit.unwrap_or(20))
        .await?;

    Ok(Json(
        intents
            .into_iter()
            .map(IntentResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// GET /api/payment/intents/{id}
async fn get_intent(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(intent_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &jar, &app_state)?;
    let intent = app_state.ledger.get_for_user(user_id, intent_id).await?;
    Ok(Json(IntentResponse::from(intent)))
}

/// POST /api/payment/intents/{id}/cancel
async fn cancel_intent(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(intent_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &jar, &app_state)?;
    let intent = app_state.reconciliation.cancel(user_id, intent_id).await?;
    Ok(Json(IntentResponse::from(intent)))
}

/// POST /api/payment/callback
///
/// Gateway webhook. Unauthenticated, the signature header is the only proof of origin.
async fn gateway_callback(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = app_state
        .reconciliation
        .handle_notification(&body, signature)
        .await?;

    Ok(Json(CallbackResponse {
        result: match outcome {
            ReconcileOutcome::Applied => "applied",
            ReconcileOutcome::Duplicate => "duplicate",
            ReconcileOutcome::Ignored => "ignored",
        },
    }))
}

/// POST /api/payment/dummy/{external_id}/settle
///
/// Confirms or declines a dummy payment and delivers the resulting notification
/// through the regular callback path. Not routed to anything unless the dummy
/// provider is active.
async fn dummy_settle(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(external_id): Path<String>,
    Json(payload): Json<DummySettlePayload>,
) -> AppResult<impl IntoResponse> {
    let Some(dummy) = app_state.dummy_gateway.clone() else {
        return Err(AppError::NotFound);
    };
    let user_id = current_user(&headers, &jar, &app_state)?;

    let intent = app_state
        .ledger
        .find_by_external_id(&external_id)
        .await?
        .filter(|i| i.user_id == user_id)
        .ok_or(AppError::NotFound)?;
    if payload.status == GatewayStatus::Pending {
        return Err(AppError::InvalidInput(
            "status must be succeeded or failed".into(),
        ));
    }

    let signed = dummy.settle(&ExternalPaymentId::new(external_id), payload.status)?;
    app_state
        .reconciliation
        .handle_notification(signed.body.as_bytes(), Some(&signed.signature))
        .await?;

    let intent = app_state.ledger.get(intent.id).await?;
    Ok(Json(IntentResponse::from(intent)))
}
