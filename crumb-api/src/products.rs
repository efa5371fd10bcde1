use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use crumb_catalog::{final_price, ImageSlot};
use crumb_core::{Image, NewProduct, Product, ProductFilter, Promotion};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    extract::{JsonBody, QueryParams},
    params::{page_offset, parse_id},
    state::AppState,
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub low_stock: Option<bool>,
    pub q: Option<String>,
    pub simple: Option<bool>,
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tag: String,
    pub price: Decimal,
    #[serde(default)]
    pub stock: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl From<ProductRequest> for NewProduct {
    fn from(req: ProductRequest) -> Self {
        NewProduct {
            name: req.name,
            description: req.description,
            tag: req.tag,
            price: req.price,
            stock: req.stock,
            is_active: req.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ImagesAmountQuery {
    #[serde(default, alias = "image_amount")]
    pub images_amount: i32,
}

#[derive(Debug, Deserialize)]
pub struct DeleteImagesRequest {
    #[serde(default)]
    pub positions: Vec<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageResponse {
    pub id: i64,
    pub position: i32,
    pub file_path: String,
    pub url: Option<String>,
}

impl From<Image> for ImageResponse {
    fn from(image: Image) -> Self {
        Self {
            id: image.id,
            position: image.position,
            file_path: image.file_path,
            url: image.public_url,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProductResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub tag: String,
    pub price: Decimal,
    pub final_price: Decimal,
    pub stock: i32,
    pub is_active: bool,
    pub images: Vec<ImageResponse>,
    pub promotions: Vec<Promotion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        let final_price = final_price(&product);
        Self {
            id: product.id,
            name: product.name,
            description: product.description,
            tag: product.tag,
            price: product.price,
            final_price,
            stock: product.stock,
            is_active: product.is_active,
            images: product.images.into_iter().map(Into::into).collect(),
            promotions: product.promotions.into_iter().filter(|p| p.is_active).collect(),
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimpleProduct {
    pub id: i64,
    pub name: String,
    pub tag: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ProductListing {
    Simple(Vec<SimpleProduct>),
    Full(Vec<ProductResponse>),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadSlot {
    pub position: i32,
    pub upload_url: String,
    pub public_url: Option<String>,
}

impl From<ImageSlot> for UploadSlot {
    fn from(slot: ImageSlot) -> Self {
        Self {
            position: slot.image.position,
            upload_url: slot.upload_url,
            public_url: slot.image.public_url,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedProductResponse {
    pub product: ProductResponse,
    pub uploads: Vec<UploadSlot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/{id}", get(get_product))
        .route("/products/{id}/images", get(list_images))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/products", post(create_product))
        .route("/admin/products/{id}", put(update_product).delete(delete_product))
        .route(
            "/admin/products/{id}/images",
            post(replace_images).delete(delete_images),
        )
}

// ============================================================================
// Public Handlers
// ============================================================================

/// GET /products
async fn list_products(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ListQuery>,
) -> Result<Json<ProductListing>, AppError> {
    let limit = query.limit.unwrap_or(20);
    let page = query.page.unwrap_or(1);
    if limit < 1 || page < 1 {
        return Err(AppError::ValidationError("limit and page must be positive".to_string()));
    }

    let filter = ProductFilter {
        low_stock: query.low_stock.unwrap_or(false),
        query: query.q.filter(|q| !q.trim().is_empty()),
        limit,
        offset: page_offset(page, limit)?,
    };
    let products = state.catalog.list_products(&filter).await?;

    let listing = if query.simple.unwrap_or(false) {
        ProductListing::Simple(
            products
                .into_iter()
                .map(|p| SimpleProduct {
                    id: p.id,
                    name: p.name,
                    tag: p.tag,
                })
                .collect(),
        )
    } else {
        ProductListing::Full(products.into_iter().map(Into::into).collect())
    };
    Ok(Json(listing))
}

/// GET /products/{id}
async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, AppError> {
    let id = parse_id(&id, "product id")?;
    let product = state.catalog.get_product(id).await?;
    Ok(Json(product.into()))
}

/// GET /products/{id}/images
async fn list_images(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ImageResponse>>, AppError> {
    let id = parse_id(&id, "product id")?;
    let images = state.catalog.list_images(id).await?;
    Ok(Json(images.into_iter().map(Into::into).collect()))
}

// ============================================================================
// Admin Handlers
// ============================================================================

/// POST /admin/products?images_amount=N
async fn create_product(
    State(state): State<AppState>,
    QueryParams(amount): QueryParams<ImagesAmountQuery>,
    JsonBody(body): JsonBody<ProductRequest>,
) -> Result<(StatusCode, Json<CreatedProductResponse>), AppError> {
    let (product, slots) = state
        .catalog
        .create_product(body.into(), amount.images_amount)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedProductResponse {
            product: product.into(),
            uploads: slots.into_iter().map(Into::into).collect(),
        }),
    ))
}

/// PUT /admin/products/{id}
async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ProductRequest>,
) -> Result<Json<ProductResponse>, AppError> {
    let id = parse_id(&id, "product id")?;
    let product = state.catalog.update_product(id, body.into()).await?;
    Ok(Json(product.into()))
}

/// DELETE /admin/products/{id}
async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id, "product id")?;
    state.catalog.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/products/{id}/images?image_amount=N
async fn replace_images(
    State(state): State<AppState>,
    Path(id): Path<String>,
    QueryParams(amount): QueryParams<ImagesAmountQuery>,
) -> Result<Json<Vec<UploadSlot>>, AppError> {
    let id = parse_id(&id, "product id")?;
    let slots = state.catalog.replace_images(id, amount.images_amount).await?;
    Ok(Json(slots.into_iter().map(Into::into).collect()))
}

/// DELETE /admin/products/{id}/images
async fn delete_images(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<DeleteImagesRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = parse_id(&id, "product id")?;
    let removed = state.catalog.delete_images(id, &body.positions).await?;
    Ok(Json(MessageResponse {
        message: format!("{} images deleted", removed),
    }))
}
