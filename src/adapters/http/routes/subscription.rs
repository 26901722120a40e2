use chrono::{DateTime, Utc};

use super::common::*;
use super::payment::checkout_response;
use crate::application::validators::is_valid_idempotency_key;
use crate::domain::entities::subscription::{Subscription, SubscriptionExtension};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_subscription))
        .route("/history", get(get_history))
        .route("/activate", post(activate))
        .route("/checkout", post(checkout))
}

// ============================================================================
// Types
// ============================================================================

#[derive(Deserialize)]
struct SubscriptionOrderPayload {
    plan_id: String,
    price: i64,
    duration_months: i32,
}

#[derive(Serialize)]
struct SubscriptionResponse {
    plan_id: String,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    active: bool,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(subscription: Subscription) -> Self {
        Self {
            active: subscription.is_active(Utc::now()),
            plan_id: subscription.plan_id,
            starts_at: subscription.starts_at,
            ends_at: subscription.ends_at,
        }
    }
}

#[derive(Serialize)]
struct ExtensionResponse {
    plan_id: String,
    months: i32,
    previous_end: Option<DateTime<Utc>>,
    new_end: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<SubscriptionExtension> for ExtensionResponse {
    fn from(extension: SubscriptionExtension) -> Self {
        Self {
            plan_id: extension.plan_id,
            months: extension.months,
            previous_end: extension.previous_end,
            new_end: extension.new_end,
            created_at: extension.created_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/subscription
async fn get_subscription(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &jar, &app_state)?;
    let subscription = app_state
        .subscriptions
        .get(user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(SubscriptionResponse::from(subscription)))
}

/// GET /api/subscription/history
async fn get_history(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<LimitQuery>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &jar, &app_state)?;
    let extensions = app_state
        .subscriptions
        .history(user_id, query.limit.unwrap_or(20))
        .await?;

    Ok(Json(
        extensions
            .into_iter()
            .map(ExtensionResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// POST /api/subscription/activate
///
/// Pays from the balance. Without an `Idempotency-Key` every request is a new purchase.
/// A purchase that fails after the debit is refunded before the error is returned.
async fn activate(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<SubscriptionOrderPayload>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &jar, &app_state)?;
    let key = idempotency_key(&headers)?.unwrap_or_else(|| Uuid::new_v4().to_string());
    if !is_valid_idempotency_key(&key) {
        return Err(AppError::InvalidInput("invalid idempotency key".into()));
    }

    let subscription = app_state
        .subscriptions
        .activate_from_balance(
            user_id,
            &payload.plan_id,
            payload.price,
            payload.duration_months,
            &key,
        )
        .await?;

    Ok(Json(SubscriptionResponse::from(subscription)))
}

/// POST /api/subscription/checkout
///
/// Pays through the gateway; the subscription is extended once the payment succeeds.
async fn checkout(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<SubscriptionOrderPayload>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &jar, &app_state)?;
    let key = idempotency_key(&headers)?;

    let outcome = app_state
        .reconciliation
        .start_subscription_checkout(
            user_id,
            &payload.plan_id,
            payload.price,
            payload.duration_months,
            key,
        )
        .await?;

    Ok(checkout_response(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue, header::AUTHORIZATION};
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use crate::test_utils::{TestAppStateBuilder, bearer_for};

    fn build_test_router(app_state: AppState) -> Router<()> {
        router().with_state(app_state)
    }

    #[tokio::test]
    async fn activate_without_funds_returns_402() {
        let (app_state, harness) = TestAppStateBuilder::new().build();
        let server = TestServer::new(build_test_router(app_state)).unwrap();
        let user_id = Uuid::new_v4();
        harness.balances.open_account(user_id).await.unwrap();

        let response = server
            .post("/activate")
            .add_header(AUTHORIZATION, bearer_for(user_id))
            .json(&json!({ "plan_id": "basic", "price": 29900, "duration_months": 1 }))
            .await;

        response.assert_status(StatusCode::PAYMENT_REQUIRED);
    }

    #[tokio::test]
    async fn activate_with_wrong_price_returns_400() {
        let (app_state, harness) = TestAppStateBuilder::new().build();
        let server = TestServer::new(build_test_router(app_state)).unwrap();
        let user_id = Uuid::new_v4();
        harness.balances.open_account(user_id).await.unwrap();
        harness
            .balances
            .credit(user_id, 100_000, Uuid::new_v4())
            .await
            .unwrap();

        let response = server
            .post("/activate")
            .add_header(AUTHORIZATION, bearer_for(user_id))
            .json(&json!({ "plan_id": "basic", "price": 1, "duration_months": 1 }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(harness.balances.get(user_id).await.unwrap().amount, 100_000);
    }

    #[tokio::test]
    async fn activate_with_store_outage_keeps_balance() {
        let (app_state, harness) = TestAppStateBuilder::new().build();
        let server = TestServer::new(build_test_router(app_state)).unwrap();
        let user_id = Uuid::new_v4();
        harness.balances.open_account(user_id).await.unwrap();
        harness
            .balances
            .credit(user_id, 100_000, Uuid::new_v4())
            .await
            .unwrap();
        harness.subscription_repo.set_unavailable(true);

        for _ in 0..2 {
            server
                .post("/activate")
                .add_header(AUTHORIZATION, bearer_for(user_id))
                .json(&json!({ "plan_id": "basic", "price": 29900, "duration_months": 1 }))
                .await
                .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        }

        assert_eq!(harness.balances.get(user_id).await.unwrap().amount, 100_000);
    }

    #[tokio::test]
    async fn activate_debits_once_per_idempotency_key() {
        let (app_state, harness) = TestAppStateBuilder::new().build();
        let server = TestServer::new(build_test_router(app_state)).unwrap();
        let user_id = Uuid::new_v4();
        harness.balances.open_account(user_id).await.unwrap();
        harness
            .balances
            .credit(user_id, 100_000, Uuid::new_v4())
            .await
            .unwrap();

        for _ in 0..2 {
            let response = server
                .post("/activate")
                .add_header(AUTHORIZATION, bearer_for(user_id))
                .add_header(
                    HeaderName::from_static(IDEMPOTENCY_KEY_HEADER),
                    HeaderValue::from_static("activate-1"),
                )
                .json(&json!({ "plan_id": "basic", "price": 29900, "duration_months": 1 }))
                .await;
            response.assert_status_ok();
            let body: Value = response.json();
            assert_eq!(body["plan_id"], "basic");
            assert_eq!(body["active"], true);
        }

        assert_eq!(
            harness.balances.get(user_id).await.unwrap().amount,
            100_000 - 29900
        );

        let history: Value = server
            .get("/history")
            .add_header(AUTHORIZATION, bearer_for(user_id))
            .await
            .json();
        assert_eq!(history.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_without_subscription_returns_404() {
        let (app_state, _) = TestAppStateBuilder::new().build();
        let server = TestServer::new(build_test_router(app_state)).unwrap();

        server
            .get("/")
            .add_header(AUTHORIZATION, bearer_for(Uuid::new_v4()))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn checkout_opens_subscription_intent() {
        let (app_state, harness) = TestAppStateBuilder::new().build();
        let server = TestServer::new(build_test_router(app_state)).unwrap();
        let user_id = Uuid::new_v4();

        let response = server
            .post("/checkout")
            .add_header(AUTHORIZATION, bearer_for(user_id))
            .json(&json!({ "plan_id": "premium", "price": 59900 * 2, "duration_months": 2 }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["purpose"], "subscription");
        assert_eq!(body["plan_id"], "premium");
        assert_eq!(body["duration_months"], 2);
        assert!(harness.subscriptions.get(user_id).await.unwrap().is_none());
    }
}
