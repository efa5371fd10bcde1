use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crumb_core::report::{DailySales, HourlySales, ProductCustomer, ProductSales, TopProduct};
use crumb_core::{ReportRepository, StoreError};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::db_err;

/// Sales aggregation over `order_items` snapshots. Buckets are UTC.
pub struct PgReportRepository {
    pool: PgPool,
}

impl PgReportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TopProductRow {
    product_id: i64,
    name: String,
    quantity: i64,
    revenue: Decimal,
}

#[derive(sqlx::FromRow)]
struct BucketRow {
    bucket: String,
    total: Decimal,
    orders: i64,
}

#[derive(sqlx::FromRow)]
struct ProductSalesRow {
    product_id: i64,
    product_name: String,
    total_quantity: i64,
    total_revenue: Decimal,
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    customer_id: Uuid,
    customer_name: String,
    order_count: i64,
    total_quantity: i64,
    total_amount: Decimal,
}

#[async_trait]
impl ReportRepository for PgReportRepository {
    async fn top_products(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<TopProduct>, StoreError> {
        let rows = sqlx::query_as::<_, TopProductRow>(
            r#"
            SELECT oi.product_id,
                   MAX(oi.product_name) AS name,
                   SUM(oi.quantity)::BIGINT AS quantity,
                   SUM(oi.quantity * oi.price) AS revenue
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE o.created_at >= $1
            GROUP BY oi.product_id
            ORDER BY quantity DESC, oi.product_id
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|r| TopProduct {
                product_id: r.product_id,
                name: r.name,
                quantity: r.quantity,
                revenue: r.revenue,
            })
            .collect())
    }

    async fn sales_by_hour(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HourlySales>, StoreError> {
        let rows = sqlx::query_as::<_, BucketRow>(
            r#"
            SELECT TO_CHAR(o.created_at AT TIME ZONE 'UTC', 'HH24:00') AS bucket,
                   SUM(oi.quantity * oi.price) AS total,
                   COUNT(DISTINCT o.id) AS orders
            FROM orders o
            JOIN order_items oi ON oi.order_id = o.id
            WHERE o.created_at >= $1 AND o.created_at < $2
            GROUP BY bucket
            ORDER BY bucket
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|r| HourlySales {
                hour: r.bucket,
                total: r.total,
                orders: r.orders,
            })
            .collect())
    }

    async fn sales_by_day(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DailySales>, StoreError> {
        let rows = sqlx::query_as::<_, BucketRow>(
            r#"
            SELECT TO_CHAR(o.created_at AT TIME ZONE 'UTC', 'YYYY-MM-DD') AS bucket,
                   SUM(oi.quantity * oi.price) AS total,
                   COUNT(DISTINCT o.id) AS orders
            FROM orders o
            JOIN order_items oi ON oi.order_id = o.id
            WHERE o.created_at >= $1 AND o.created_at < $2
            GROUP BY bucket
            ORDER BY bucket
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|r| DailySales {
                date: r.bucket,
                total: r.total,
                orders: r.orders,
            })
            .collect())
    }

    async fn product_sales(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        page: Option<(i64, i64)>,
    ) -> Result<(Vec<ProductSales>, i64), StoreError> {
        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(DISTINCT oi.product_id)
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE ($1::TIMESTAMPTZ IS NULL OR o.created_at >= $1)
              AND ($2::TIMESTAMPTZ IS NULL OR o.created_at < $2)
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        // LIMIT NULL means no limit.
        let (limit, offset) = match page {
            Some((limit, offset)) => (Some(limit), offset),
            None => (None, 0),
        };

        let rows = sqlx::query_as::<_, ProductSalesRow>(
            r#"
            SELECT oi.product_id,
                   MAX(oi.product_name) AS product_name,
                   SUM(oi.quantity)::BIGINT AS total_quantity,
                   SUM(oi.quantity * oi.price) AS total_revenue
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE ($1::TIMESTAMPTZ IS NULL OR o.created_at >= $1)
              AND ($2::TIMESTAMPTZ IS NULL OR o.created_at < $2)
            GROUP BY oi.product_id
            ORDER BY total_quantity DESC, oi.product_id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let rows = rows
            .into_iter()
            .map(|r| ProductSales {
                product_id: r.product_id,
                product_name: r.product_name,
                total_quantity: r.total_quantity,
                total_revenue: r.total_revenue,
            })
            .collect();
        Ok((rows, total))
    }

    async fn product_customers(
        &self,
        product_id: i64,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ProductCustomer>, StoreError> {
        let rows = sqlx::query_as::<_, CustomerRow>(
            r#"
            SELECT o.user_id AS customer_id,
                   COALESCE(MAX(u.name), MAX(u.username)) AS customer_name,
                   COUNT(DISTINCT o.id) AS order_count,
                   SUM(oi.quantity)::BIGINT AS total_quantity,
                   SUM(oi.quantity * oi.price) AS total_amount
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            JOIN users u ON u.id = o.user_id
            WHERE oi.product_id = $1
              AND ($2::TIMESTAMPTZ IS NULL OR o.created_at >= $2)
              AND ($3::TIMESTAMPTZ IS NULL OR o.created_at < $3)
            GROUP BY o.user_id
            ORDER BY total_amount DESC
            "#,
        )
        .bind(product_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|r| ProductCustomer {
                customer_id: r.customer_id,
                customer_name: r.customer_name,
                order_count: r.order_count,
                total_quantity: r.total_quantity,
                total_amount: r.total_amount,
            })
            .collect())
    }
}
