use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::subscription::{
        ExtendOutcome, SubscriptionChange, SubscriptionRepoTrait,
    },
    domain::entities::subscription::{Subscription, SubscriptionExtension},
};

const SELECT_COLS: &str = "id, user_id, plan_id, starts_at, ends_at, version, created_at, updated_at";

fn row_to_subscription(row: sqlx::postgres::PgRow) -> Subscription {
    Subscription {
        id: row.get("id"),
        user_id: row.get("user_id"),
        plan_id: row.get("plan_id"),
        starts_at: row.get("starts_at"),
        ends_at: row.get("ends_at"),
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_extension(row: sqlx::postgres::PgRow) -> SubscriptionExtension {
    SubscriptionExtension {
        id: row.get("id"),
        user_id: row.get("user_id"),
        plan_id: row.get("plan_id"),
        cause_key: row.get("cause_key"),
        months: row.get("months"),
        previous_end: row.get("previous_end"),
        new_end: row.get("new_end"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl SubscriptionRepoTrait for PostgresPersistence {
    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE user_id = $1",
            SELECT_COLS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_subscription))
    }

    async fn apply_extension(&self, change: &SubscriptionChange) -> AppResult<ExtendOutcome> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        let current = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE user_id = $1 FOR UPDATE",
            SELECT_COLS
        ))
        .bind(change.user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?
        .map(row_to_subscription);

        let already_applied: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM subscription_extensions WHERE user_id = $1 AND cause_key = $2
            )
            "#,
        )
        .bind(change.user_id)
        .bind(change.cause_key.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from)?;

        if let (true, Some(subscription)) = (already_applied, current.as_ref()) {
            tx.rollback().await.map_err(AppError::from)?;
            return Ok(ExtendOutcome::AlreadyApplied(subscription.clone()));
        }
        if current.as_ref().map(|s| s.version) != change.expected_version {
            tx.rollback().await.map_err(AppError::from)?;
            return Ok(ExtendOutcome::VersionConflict);
        }

        let written = match change.expected_version {
            None => sqlx::query(&format!(
                r#"
                INSERT INTO subscriptions (id, user_id, plan_id, starts_at, ends_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (user_id) DO NOTHING
                RETURNING {}
                "#,
                SELECT_COLS
            ))
            .bind(Uuid::new_v4())
            .bind(change.user_id)
            .bind(&change.plan_id)
            .bind(change.window.starts_at)
            .bind(change.window.ends_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::from)?,
            Some(version) => sqlx::query(&format!(
                r#"
                UPDATE subscriptions
                SET plan_id = $3, starts_at = $4, ends_at = $5,
                    version = version + 1, updated_at = NOW()
                WHERE user_id = $1 AND version = $2
                RETURNING {}
                "#,
                SELECT_COLS
            ))
            .bind(change.user_id)
            .bind(version)
            .bind(&change.plan_id)
            .bind(change.window.starts_at)
            .bind(change.window.ends_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::from)?,
        };

        let Some(row) = written else {
            tx.rollback().await.map_err(AppError::from)?;
            return Ok(ExtendOutcome::VersionConflict);
        };
        let subscription = row_to_subscription(row);

        sqlx::query(
            r#"
            INSERT INTO subscription_extensions (
                id, user_id, plan_id, cause_key, months, previous_end, new_end
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(change.user_id)
        .bind(&change.plan_id)
        .bind(change.cause_key.as_str())
        .bind(change.months)
        .bind(current.map(|s| s.ends_at))
        .bind(subscription.ends_at)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;

        Ok(ExtendOutcome::Applied(subscription))
    }

    async fn list_extensions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<SubscriptionExtension>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, plan_id, cause_key, months, previous_end, new_end, created_at
            FROM subscription_extensions
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

        Ok(rows.into_iter().map(row_to_extension).collect())
    }
}
