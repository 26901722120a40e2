use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::ledger::{NewPaymentIntent, PaymentIntentRepoTrait, StatusUpdate},
    domain::entities::{payment_intent::PaymentIntent, payment_intent_status::PaymentIntentStatus},
};

const SELECT_COLS: &str = r#"
    id, user_id, amount, currency, purpose, plan_id, duration_months, status,
    external_id, idempotency_key, confirmation_url, failure_reason,
    archived_at, created_at, updated_at
"#;

fn row_to_intent(row: sqlx::postgres::PgRow) -> PaymentIntent {
    PaymentIntent {
        id: row.get("id"),
        user_id: row.get("user_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        purpose: row.get("purpose"),
        plan_id: row.get("plan_id"),
        duration_months: row.get("duration_months"),
        status: row.get("status"),
        external_id: row.get("external_id"),
        idempotency_key: row.get("idempotency_key"),
        confirmation_url: row.get("confirmation_url"),
        failure_reason: row.get("failure_reason"),
        archived_at: row.get("archived_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl PaymentIntentRepoTrait for PostgresPersistence {
    async fn create_or_get(&self, intent: &NewPaymentIntent) -> AppResult<PaymentIntent> {
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO payment_intents (
                id, user_id, amount, currency, purpose, plan_id, duration_months, idempotency_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, idempotency_key) DO NOTHING
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(intent.user_id)
        .bind(intent.amount)
        .bind(&intent.currency)
        .bind(intent.purpose)
        .bind(&intent.plan_id)
        .bind(intent.duration_months)
        .bind(&intent.idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        if let Some(row) = inserted {
            return Ok(row_to_intent(row));
        }

        // Key already taken, hand back whatever holds it
        self.get_by_idempotency_key(intent.user_id, &intent.idempotency_key)
            .await?
            .ok_or(AppError::ConcurrencyConflict)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<PaymentIntent>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_intents WHERE id = $1",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_intent))
    }

    async fn get_by_external_id(&self, external_id: &str) -> AppResult<Option<PaymentIntent>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_intents WHERE external_id = $1",
            SELECT_COLS
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_intent))
    }

    async fn get_by_idempotency_key(
        &self,
        user_id: Uuid,
        idempotency_key: &str,
    ) -> AppResult<Option<PaymentIntent>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_intents WHERE user_id = $1 AND idempotency_key = $2",
            SELECT_COLS
        ))
        .bind(user_id)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_intent))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: PaymentIntentStatus,
        to: PaymentIntentStatus,
        update: &StatusUpdate,
    ) -> AppResult<Option<PaymentIntent>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE payment_intents
            SET status = $3,
                external_id = COALESCE($4, external_id),
                confirmation_url = COALESCE($5, confirmation_url),
                failure_reason = COALESCE($6, failure_reason),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(&update.external_id)
        .bind(&update.confirmation_url)
        .bind(&update.failure_reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_intent))
    }

    async fn record_gateway_details(&self, id: Uuid, update: &StatusUpdate) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE payment_intents
            SET external_id = COALESCE($2, external_id),
                confirmation_url = COALESCE($3, confirmation_url),
                failure_reason = COALESCE($4, failure_reason),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&update.external_id)
        .bind(&update.confirmation_url)
        .bind(&update.failure_reason)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(())
    }

    async fn list_by_user(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<PaymentIntent>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM payment_intents
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
            SELECT_COLS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_intent).collect())
    }

    async fn list_stale_open(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<PaymentIntent>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM payment_intents
            WHERE status IN ('created', 'pending')
              AND archived_at IS NULL
              AND updated_at < $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
            SELECT_COLS
        ))
        .bind(updated_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_intent).collect())
    }

    async fn archive_terminal_before(&self, updated_before: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payment_intents
            SET archived_at = NOW()
            WHERE status IN ('succeeded', 'failed', 'canceled')
              AND archived_at IS NULL
              AND updated_at < $1
            "#,
        )
        .bind(updated_before)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected())
    }
}
