use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use crumb_core::{AuthUser, Order, OrderStatus, UploadTarget};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, extract::JsonBody, products::MessageResponse, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub user_id: Uuid,
    pub total: Decimal,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slip_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderItemResponse {
    pub product_id: i64,
    pub name: String,
    pub description: String,
    pub tag: String,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

impl OrderResponse {
    fn new(order: Order, state: &AppState) -> Self {
        let slip_url = order
            .slip_url
            .clone()
            .unwrap_or_else(|| state.slips.slip_url(&order.id));
        Self {
            slip_url: Some(slip_url),
            upload_url: None,
            items: order
                .items
                .into_iter()
                .map(|i| OrderItemResponse {
                    product_id: i.product_id,
                    name: i.product_name,
                    description: i.product_description,
                    tag: i.product_tag,
                    quantity: i.quantity,
                    price: i.price,
                })
                .collect(),
            order_id: order.id,
            user_id: order.user_id,
            total: order.total,
            status: order.status,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/order", get(list_orders))
        .route(
            "/order/{order_id}",
            get(get_order).put(update_status).delete(delete_order),
        )
        .route("/order/{order_id}/upload-slip", post(upload_slip))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /order
async fn list_orders(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let orders = state.orders.list_orders(caller.id).await?;
    Ok(Json(
        orders
            .into_iter()
            .map(|o| OrderResponse::new(o, &state))
            .collect(),
    ))
}

/// GET /order/{order_id}
/// Order detail plus a fresh slip upload URL.
async fn get_order(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.orders.get_order(&order_id, caller.id).await?;
    let target = state.slips.issue_upload_target(&order_id, caller.id).await?;

    let mut response = OrderResponse::new(order, &state);
    response.slip_url = Some(target.public_url);
    response.upload_url = Some(target.upload_url);
    Ok(Json(response))
}

/// PUT /order/{order_id}
async fn update_status(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(order_id): Path<String>,
    JsonBody(body): JsonBody<StatusRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .orders
        .update_status(&order_id, &body.status, &caller)
        .await?;
    Ok(Json(OrderResponse::new(order, &state)))
}

/// DELETE /order/{order_id}
async fn delete_order(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(order_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.orders.delete_order(&order_id, caller.id).await?;
    Ok(Json(MessageResponse {
        message: format!("order {} deleted", order_id),
    }))
}

/// POST /order/{order_id}/upload-slip
async fn upload_slip(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(order_id): Path<String>,
) -> Result<Json<UploadTarget>, AppError> {
    Ok(Json(state.slips.issue_upload_target(&order_id, caller.id).await?))
}
