pub mod balance;
pub mod cart;
pub mod common;
pub mod payment;
pub mod subscription;

use axum::Router;

use crate::adapters::http::app_state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/payment", payment::router())
        .nest("/balance", balance::router())
        .nest("/subscription", subscription::router())
        .nest("/cart", cart::router())
}
