use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use crumb_core::{NewPromotion, Promotion};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    error::AppError,
    extract::{JsonBody, QueryParams},
    params::parse_id,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct PromotionRequest {
    pub product_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub discount: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub is_active: bool,
}

impl From<PromotionRequest> for NewPromotion {
    fn from(req: PromotionRequest) -> Self {
        NewPromotion {
            product_id: req.product_id,
            name: req.name,
            description: req.description,
            discount: req.discount,
            start_date: req.start_date,
            end_date: req.end_date,
            is_active: req.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PromotionQuery {
    pub product_id: Option<i64>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/promotions", get(list_promotions).post(create_promotion))
        .route(
            "/admin/promotions/{id}",
            get(get_promotion).put(update_promotion).delete(delete_promotion),
        )
}

/// POST /admin/promotions
async fn create_promotion(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<PromotionRequest>,
) -> Result<(StatusCode, Json<Promotion>), AppError> {
    let promotion = state.promotions.create_promotion(body.into()).await?;
    Ok((StatusCode::CREATED, Json(promotion)))
}

/// GET /admin/promotions?product_id=
async fn list_promotions(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<PromotionQuery>,
) -> Result<Json<Vec<Promotion>>, AppError> {
    Ok(Json(state.promotions.list_promotions(query.product_id).await?))
}

/// GET /admin/promotions/{id}
async fn get_promotion(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Promotion>, AppError> {
    let id = parse_id(&id, "promotion id")?;
    Ok(Json(state.promotions.get_promotion(id).await?))
}

/// PUT /admin/promotions/{id}
async fn update_promotion(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<PromotionRequest>,
) -> Result<Json<Promotion>, AppError> {
    let id = parse_id(&id, "promotion id")?;
    Ok(Json(state.promotions.update_promotion(id, body.into()).await?))
}

/// DELETE /admin/promotions/{id}
async fn delete_promotion(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id, "promotion id")?;
    state.promotions.delete_promotion(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
