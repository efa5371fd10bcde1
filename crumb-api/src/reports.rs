//! Admin sales reports. Read-only; every window is in UTC.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{Duration, Utc};
use crumb_core::report::{
    day_window, fill_hours, midnight, DailySales, HourlySales, Period, ProductCustomer,
    ProductSales, TopProduct,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    extract::QueryParams,
    params::{optional_date, page_offset, parse_id, required_date},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub period: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ProductSalesResponse {
    Paged(Paged<ProductSales>),
    All(Vec<ProductSales>),
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/reports/products/top", get(top_products))
        .route("/admin/reports/sales/hourly", get(hourly_sales))
        .route("/admin/reports/sales/daily", get(daily_sales))
        .route("/admin/reports/products/sales", get(product_sales))
        .route("/admin/reports/products/{id}/customers", get(product_customers))
}

/// GET /admin/reports/products/top?period=day|week|month&limit=5
async fn top_products(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<TopQuery>,
) -> Result<Json<Vec<TopProduct>>, AppError> {
    let limit = query.limit.unwrap_or(5);
    if limit < 1 {
        return Err(AppError::ValidationError("limit must be positive".to_string()));
    }
    let since = Period::parse(query.period.as_deref()).start(Utc::now());
    Ok(Json(state.reports.top_products(since, limit).await?))
}

/// GET /admin/reports/sales/hourly?date=YYYY-MM-DD
async fn hourly_sales(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<DateQuery>,
) -> Result<Json<Vec<HourlySales>>, AppError> {
    let day = optional_date(query.date.as_deref())?.unwrap_or_else(|| Utc::now().date_naive());
    let start = midnight(day);
    let rows = state
        .reports
        .sales_by_hour(start, start + Duration::days(1))
        .await?;
    Ok(Json(fill_hours(rows)))
}

/// GET /admin/reports/sales/daily?start&end
async fn daily_sales(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<RangeQuery>,
) -> Result<Json<Vec<DailySales>>, AppError> {
    let start = required_date(query.start.as_deref(), "start")?;
    let end = required_date(query.end.as_deref(), "end")?;
    if end < start {
        return Err(AppError::ValidationError("end must not precede start".to_string()));
    }
    let rows = state
        .reports
        .sales_by_day(midnight(start), midnight(end) + Duration::days(1))
        .await?;
    Ok(Json(rows))
}

/// GET /admin/reports/products/sales?start&end&limit&page
async fn product_sales(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<RangeQuery>,
) -> Result<Json<ProductSalesResponse>, AppError> {
    let (from, to) = day_window(
        optional_date(query.start.as_deref())?,
        optional_date(query.end.as_deref())?,
    );
    let limit = query.limit.unwrap_or(0);
    let page = query.page.unwrap_or(1);
    if limit < 0 || page < 1 {
        return Err(AppError::ValidationError("invalid pagination".to_string()));
    }

    if limit == 0 {
        let (rows, _) = state.reports.product_sales(from, to, None).await?;
        return Ok(Json(ProductSalesResponse::All(rows)));
    }

    let (rows, total) = state
        .reports
        .product_sales(from, to, Some((limit, page_offset(page, limit)?)))
        .await?;
    Ok(Json(ProductSalesResponse::Paged(Paged {
        data: rows,
        total,
        page,
        limit,
    })))
}

/// GET /admin/reports/products/{id}/customers?start&end
async fn product_customers(
    State(state): State<AppState>,
    Path(id): Path<String>,
    QueryParams(query): QueryParams<RangeQuery>,
) -> Result<Json<Vec<ProductCustomer>>, AppError> {
    let id = parse_id(&id, "product id")?;
    let (from, to) = day_window(
        optional_date(query.start.as_deref())?,
        optional_date(query.end.as_deref())?,
    );
    Ok(Json(state.reports.product_customers(id, from, to).await?))
}
