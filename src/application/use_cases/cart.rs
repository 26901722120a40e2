use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::application::validators::is_valid_product_id;
use crate::domain::entities::cart::CartItem;

pub const MAX_ITEM_QUANTITY: i32 = 99;
pub const MAX_CART_ITEMS: usize = 50;

#[async_trait]
pub trait CartRepoTrait: Send + Sync {
    async fn list(&self, user_id: Uuid) -> AppResult<Vec<CartItem>>;

    /// Inserts or replaces the quantity of one product.
    async fn upsert(&self, user_id: Uuid, product_id: &str, quantity: i32) -> AppResult<CartItem>;

    /// Returns whether a row was removed.
    async fn remove(&self, user_id: Uuid, product_id: &str) -> AppResult<bool>;

    async fn clear(&self, user_id: Uuid) -> AppResult<u64>;
}

/// Per-user shopping cart
#[derive(Clone)]
pub struct CartUseCases {
    repo: Arc<dyn CartRepoTrait>,
}

impl CartUseCases {
    pub fn new(repo: Arc<dyn CartRepoTrait>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, user_id: Uuid) -> AppResult<Vec<CartItem>> {
        self.repo.list(user_id).await
    }

    pub async fn set_item(
        &self,
        user_id: Uuid,
        product_id: &str,
        quantity: i32,
    ) -> AppResult<CartItem> {
        if !is_valid_product_id(product_id) {
            return Err(AppError::InvalidInput("invalid product id".into()));
        }
        if !(1..=MAX_ITEM_QUANTITY).contains(&quantity) {
            return Err(AppError::InvalidInput(format!(
                "quantity must be between 1 and {}",
                MAX_ITEM_QUANTITY
            )));
        }

        let items = self.repo.list(user_id).await?;
        let already_in_cart = items.iter().any(|i| i.product_id == product_id);
        if !already_in_cart && items.len() >= MAX_CART_ITEMS {
            return Err(AppError::InvalidInput(format!(
                "a cart holds at most {} products",
                MAX_CART_ITEMS
            )));
        }

        self.repo.upsert(user_id, product_id, quantity).await
    }

    pub async fn remove_item(&self, user_id: Uuid, product_id: &str) -> AppResult<()> {
        if !self.repo.remove(user_id, product_id).await? {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    pub async fn clear(&self, user_id: Uuid) -> AppResult<()> {
        self.repo.clear(user_id).await?;
        Ok(())
    }
}
