use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::cart::CartRepoTrait,
    domain::entities::cart::CartItem,
};

fn row_to_item(row: sqlx::postgres::PgRow) -> CartItem {
    CartItem {
        user_id: row.get("user_id"),
        product_id: row.get("product_id"),
        quantity: row.get("quantity"),
        added_at: row.get("added_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl CartRepoTrait for PostgresPersistence {
    async fn list(&self, user_id: Uuid) -> AppResult<Vec<CartItem>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, product_id, quantity, added_at, updated_at
            FROM cart_items
            WHERE user_id = $1
            ORDER BY added_at ASC, product_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_item).collect())
    }

    async fn upsert(&self, user_id: Uuid, product_id: &str, quantity: i32) -> AppResult<CartItem> {
        let row = sqlx::query(
            r#"
            INSERT INTO cart_items (user_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                updated_at = NOW()
            RETURNING user_id, product_id, quantity, added_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row_to_item(row))
    }

    async fn remove(&self, user_id: Uuid, product_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self, user_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(result.rows_affected())
    }
}
