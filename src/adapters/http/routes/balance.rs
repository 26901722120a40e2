use chrono::{DateTime, Utc};

use super::common::*;
use crate::domain::entities::balance::{Balance, BalanceEntry};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_balance))
        .route("/history", get(get_history))
}

#[derive(Serialize)]
struct BalanceResponse {
    amount: i64,
    currency: String,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct BalanceEntryResponse {
    id: Uuid,
    delta: i64,
    balance_after: i64,
    created_at: DateTime<Utc>,
}

impl From<BalanceEntry> for BalanceEntryResponse {
    fn from(entry: BalanceEntry) -> Self {
        Self {
            id: entry.id,
            delta: entry.delta,
            balance_after: entry.balance_after,
            created_at: entry.created_at,
        }
    }
}

/// GET /api/balance
///
/// Users without an account yet see a zero balance.
async fn get_balance(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &jar, &app_state)?;

    let balance: Balance = match app_state.balances.get(user_id).await {
        Err(AppError::UserNotFound) => app_state.balances.open_account(user_id).await?,
        other => other?,
    };

    Ok(Json(BalanceResponse {
        amount: balance.amount,
        currency: app_state.config.currency.clone(),
        updated_at: balance.updated_at,
    }))
}

/// GET /api/balance/history
async fn get_history(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<LimitQuery>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &jar, &app_state)?;
    let entries = app_state
        .balances
        .history(user_id, query.limit.unwrap_or(50))
        .await?;

    Ok(Json(
        entries
            .into_iter()
            .map(BalanceEntryResponse::from)
            .collect::<Vec<_>>(),
    ))
}
