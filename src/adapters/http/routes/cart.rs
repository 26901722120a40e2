use super::common::*;
use crate::domain::entities::cart::CartItem;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_items).delete(clear_cart))
        .route(
            "/items/{product_id}",
            put(set_item).delete(remove_item),
        )
}

#[derive(Deserialize)]
struct SetItemPayload {
    quantity: i32,
}

#[derive(Serialize)]
struct CartItemResponse {
    product_id: String,
    quantity: i32,
}

impl From<CartItem> for CartItemResponse {
    fn from(item: CartItem) -> Self {
        Self {
            product_id: item.product_id,
            quantity: item.quantity,
        }
    }
}

/// GET /api/cart
async fn list_items(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &jar, &app_state)?;
    let items = app_state.cart.list(user_id).await?;
    Ok(Json(
        items
            .into_iter()
            .map(CartItemResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// PUT /api/cart/items/{product_id}
async fn set_item(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(product_id): Path<String>,
    Json(payload): Json<SetItemPayload>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &jar, &app_state)?;
    let item = app_state
        .cart
        .set_item(user_id, &product_id, payload.quantity)
        .await?;
    Ok(Json(CartItemResponse::from(item)))
}

/// DELETE /api/cart/items/{product_id}
async fn remove_item(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(product_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &jar, &app_state)?;
    app_state.cart.remove_item(user_id, &product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/cart
async fn clear_cart(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &jar, &app_state)?;
    app_state.cart.clear(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use crate::test_utils::{TestAppStateBuilder, bearer_for};

    fn build_test_router(app_state: AppState) -> Router<()> {
        router().with_state(app_state)
    }

    fn server() -> TestServer {
        let (app_state, _) = TestAppStateBuilder::new().build();
        TestServer::new(build_test_router(app_state)).unwrap()
    }

    #[tokio::test]
    async fn cart_requires_authentication() {
        server().get("/").await.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn set_item_replaces_quantity() {
        let server = server();
        let user_id = Uuid::new_v4();

        for quantity in [2, 5] {
            server
                .put("/items/issue-1")
                .add_header(AUTHORIZATION, bearer_for(user_id))
                .json(&json!({ "quantity": quantity }))
                .await
                .assert_status_ok();
        }

        let body: Value = server
            .get("/")
            .add_header(AUTHORIZATION, bearer_for(user_id))
            .await
            .json();
        assert_eq!(body, json!([{ "product_id": "issue-1", "quantity": 5 }]));
    }

    #[tokio::test]
    async fn set_item_with_zero_quantity_returns_400() {
        server()
            .put("/items/issue-1")
            .add_header(AUTHORIZATION, bearer_for(Uuid::new_v4()))
            .json(&json!({ "quantity": 0 }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn carts_are_per_user() {
        let server = server();
        let owner = Uuid::new_v4();
        server
            .put("/items/issue-1")
            .add_header(AUTHORIZATION, bearer_for(owner))
            .json(&json!({ "quantity": 1 }))
            .await
            .assert_status_ok();

        let other: Value = server
            .get("/")
            .add_header(AUTHORIZATION, bearer_for(Uuid::new_v4()))
            .await
            .json();
        assert_eq!(other, json!([]));

        server
            .delete("/items/issue-1")
            .add_header(AUTHORIZATION, bearer_for(Uuid::new_v4()))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let server = server();
        let user_id = Uuid::new_v4();
        for product in ["issue-1", "issue-2", "issue-3"] {
            server
                .put(&format!("/items/{}", product))
                .add_header(AUTHORIZATION, bearer_for(user_id))
                .json(&json!({ "quantity": 1 }))
                .await
                .assert_status_ok();
        }

        server
            .delete("/items/issue-2")
            .add_header(AUTHORIZATION, bearer_for(user_id))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        let body: Value = server
            .get("/")
            .add_header(AUTHORIZATION, bearer_for(user_id))
            .await
            .json();
        assert_eq!(body.as_array().unwrap().len(), 2);

        server
            .delete("/")
            .add_header(AUTHORIZATION, bearer_for(user_id))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        let body: Value = server
            .get("/")
            .add_header(AUTHORIZATION, bearer_for(user_id))
            .await
            .json();
        assert_eq!(body, json!([]));
    }
}
