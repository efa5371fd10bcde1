use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Extension, Json, Router,
};
use crumb_catalog::final_price;
use crumb_core::{AuthUser, Cart};
use crumb_order::OrderSummary;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError, extract::JsonBody, params::parse_id, products::MessageResponse,
    state::AppState,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub sale_price: Decimal,
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: i32,
}

fn lines(cart: Cart) -> Vec<CartLine> {
    cart.items
        .into_iter()
        .map(|item| CartLine {
            product_id: item.product_id,
            product_name: item.product.name.clone(),
            quantity: item.quantity,
            price: item.product.price,
            sale_price: final_price(&item.product),
            images: item
                .product
                .images
                .into_iter()
                .filter_map(|i| i.public_url)
                .collect(),
        })
        .collect()
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart).delete(clear_cart))
        .route("/cart/{product_id}", put(set_quantity))
        .route("/cart/checkout", post(checkout))
}

/// GET /cart
async fn get_cart(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Vec<CartLine>>, AppError> {
    let cart = state.carts.get_or_create_cart(caller.id).await?;
    Ok(Json(lines(cart)))
}

/// DELETE /cart
async fn clear_cart(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<MessageResponse>, AppError> {
    state.carts.clear_cart(caller.id).await?;
    Ok(Json(MessageResponse {
        message: "cart cleared".to_string(),
    }))
}

/// PUT /cart/{product_id}
async fn set_quantity(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(product_id): Path<String>,
    JsonBody(body): JsonBody<QuantityRequest>,
) -> Result<Json<Vec<CartLine>>, AppError> {
    let product_id = parse_id(&product_id, "product id")?;
    let cart = state
        .carts
        .set_item_quantity(caller.id, product_id, body.quantity)
        .await?;
    Ok(Json(lines(cart)))
}

/// POST /cart/checkout
async fn checkout(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<OrderSummary>, AppError> {
    Ok(Json(state.checkout.checkout(caller.id).await?))
}
