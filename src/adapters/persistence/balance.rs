use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::balance::{ApplyOutcome, BalanceChange, BalanceRepoTrait},
    domain::entities::balance::{Balance, BalanceEntry, CauseKey},
};

fn row_to_balance(row: sqlx::postgres::PgRow) -> Balance {
    Balance {
        user_id: row.get("user_id"),
        amount: row.get("amount"),
        version: row.get("version"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_entry(row: sqlx::postgres::PgRow) -> BalanceEntry {
    BalanceEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        cause_key: row.get("cause_key"),
        delta: row.get("delta"),
        balance_after: row.get("balance_after"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl BalanceRepoTrait for PostgresPersistence {
    async fn get(&self, user_id: Uuid) -> AppResult<Option<Balance>> {
        let row = sqlx::query(
            "SELECT user_id, amount, version, updated_at FROM balances WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_balance))
    }

    async fn open_account(&self, user_id: Uuid) -> AppResult<Balance> {
        sqlx::query("INSERT INTO balances (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;

        self.get(user_id).await?.ok_or(AppError::UserNotFound)
    }

    async fn apply(&self, change: &BalanceChange) -> AppResult<ApplyOutcome> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        // Serializes writers of this user's balance until commit
        let current = sqlx::query(
            r#"
            SELECT user_id, amount, version, updated_at
            FROM balances
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(change.user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?
        .map(row_to_balance)
        .ok_or(AppError::UserNotFound)?;

        let already_applied: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM balance_entries WHERE user_id = $1 AND cause_key = $2)",
        )
        .bind(change.user_id)
        .bind(change.cause_key.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from)?;

        if already_applied {
            tx.rollback().await.map_err(AppError::from)?;
            return Ok(ApplyOutcome::AlreadyApplied(current));
        }
        if current.version != change.expected_version {
            tx.rollback().await.map_err(AppError::from)?;
            return Ok(ApplyOutcome::VersionConflict);
        }

        let new_amount = current
            .amount
            .checked_add(change.delta)
            .ok_or_else(|| AppError::InvalidInput("balance out of range".into()))?;
        if new_amount < 0 {
            tx.rollback().await.map_err(AppError::from)?;
            return Err(AppError::InsufficientFunds);
        }

        let updated = sqlx::query(
            r#"
            UPDATE balances
            SET amount = $2, version = version + 1, updated_at = NOW()
            WHERE user_id = $1
            RETURNING user_id, amount, version, updated_at
            "#,
        )
        .bind(change.user_id)
        .bind(new_amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from)?;

        sqlx::query(
            r#"
            INSERT INTO balance_entries (id, user_id, cause_key, delta, balance_after)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(change.user_id)
        .bind(change.cause_key.as_str())
        .bind(change.delta)
        .bind(new_amount)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;

        Ok(ApplyOutcome::Applied(row_to_balance(updated)))
    }

    async fn list_entries(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<BalanceEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, cause_key, delta, balance_after, created_at
            FROM balance_entries
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_entry).collect())
    }

    async fn has_entry(&self, user_id: Uuid, cause_key: &CauseKey) -> AppResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM balance_entries WHERE user_id = $1 AND cause_key = $2) AS found",
        )
        .bind(user_id)
        .bind(cause_key.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.get("found"))
    }
}
