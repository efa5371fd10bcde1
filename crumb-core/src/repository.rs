use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Cart, Image, NewImage, NewOrder, NewOrderItem, NewProduct, NewPromotion, NewUser, Order,
    OrderItem, OrderStatus, Product, Promotion, User,
};
use crate::report::{DailySales, HourlySales, ProductCustomer, ProductSales, TopProduct};

/// Persistence failures surfaced by any adapter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("Database error: {0}")]
    Backend(String),
}

/// Filter for product listings.
#[derive(Debug, Clone)]
pub struct ProductFilter {
    /// Only products with fewer than 10 units in stock.
    pub low_stock: bool,
    /// Case-insensitive substring match against name or tag.
    pub query: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            low_stock: false,
            query: None,
            limit: 20,
            offset: 0,
        }
    }
}

pub const LOW_STOCK_THRESHOLD: i32 = 10;

/// Entry point to the persistence engine.
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a unit of work. Dropping it without `commit` rolls back.
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;
}

/// A single atomic unit of work against the persistence engine.
///
/// Every read and write goes through a transaction so that services can
/// compose several steps and commit them together.
#[async_trait]
pub trait Transaction: Send {
    // Users

    async fn insert_user(&mut self, user: &NewUser) -> Result<User, StoreError>;

    async fn find_user(&mut self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_user_by_username(&mut self, username: &str)
        -> Result<Option<User>, StoreError>;

    /// Persist name, phone and address.
    async fn update_user_profile(&mut self, user: &User) -> Result<(), StoreError>;

    // Products

    async fn insert_product(&mut self, product: &NewProduct) -> Result<Product, StoreError>;

    /// Product with its images (ordered by position) and promotions.
    async fn find_product(&mut self, id: i64) -> Result<Option<Product>, StoreError>;

    /// Newest-updated first, with images and promotions loaded.
    async fn list_products(&mut self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError>;

    async fn update_product(
        &mut self,
        id: i64,
        product: &NewProduct,
    ) -> Result<Option<Product>, StoreError>;

    /// Cascades to images, promotions and cart lines.
    async fn delete_product(&mut self, id: i64) -> Result<u64, StoreError>;

    // Images

    async fn list_images(&mut self, product_id: i64) -> Result<Vec<Image>, StoreError>;

    async fn insert_image(&mut self, product_id: i64, image: &NewImage)
        -> Result<Image, StoreError>;

    async fn set_image_public_url(&mut self, image_id: i64, url: &str) -> Result<(), StoreError>;

    /// Delete the images at `positions`, or every image when `None`.
    async fn delete_images(
        &mut self,
        product_id: i64,
        positions: Option<&[i32]>,
    ) -> Result<u64, StoreError>;

    // Promotions

    async fn insert_promotion(&mut self, promotion: &NewPromotion)
        -> Result<Promotion, StoreError>;

    async fn find_promotion(&mut self, id: i64) -> Result<Option<Promotion>, StoreError>;

    async fn list_promotions(&mut self, product_id: Option<i64>)
        -> Result<Vec<Promotion>, StoreError>;

    async fn update_promotion(
        &mut self,
        id: i64,
        promotion: &NewPromotion,
    ) -> Result<Option<Promotion>, StoreError>;

    async fn delete_promotion(&mut self, id: i64) -> Result<u64, StoreError>;

    // Carts

    /// The user's cart with items, products, promotions and images loaded.
    async fn find_cart(&mut self, user_id: Uuid) -> Result<Option<Cart>, StoreError>;

    /// Same as `find_cart`, but holds a row lock on the cart until the
    /// transaction ends so concurrent checkouts of one cart serialize.
    async fn lock_cart(&mut self, user_id: Uuid) -> Result<Option<Cart>, StoreError>;

    /// Fails with `UniqueViolation` when the user already owns a cart.
    async fn insert_cart(&mut self, user_id: Uuid) -> Result<Cart, StoreError>;

    async fn cart_item_quantity(
        &mut self,
        cart_id: i64,
        product_id: i64,
    ) -> Result<Option<i32>, StoreError>;

    async fn insert_cart_item(
        &mut self,
        cart_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> Result<(), StoreError>;

    async fn update_cart_item(
        &mut self,
        cart_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> Result<u64, StoreError>;

    async fn delete_cart_item(&mut self, cart_id: i64, product_id: i64)
        -> Result<u64, StoreError>;

    /// Remove every line of the cart; the cart row itself stays.
    async fn clear_cart(&mut self, cart_id: i64) -> Result<u64, StoreError>;

    // Orders

    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, StoreError>;

    async fn insert_order_item(
        &mut self,
        order_id: &str,
        item: &NewOrderItem,
    ) -> Result<OrderItem, StoreError>;

    async fn set_order_slip(&mut self, order_id: &str, slip_url: &str) -> Result<u64, StoreError>;

    /// Order with its items.
    async fn find_order(&mut self, order_id: &str) -> Result<Option<Order>, StoreError>;

    /// Newest first, with items.
    async fn list_orders(&mut self, user_id: Uuid) -> Result<Vec<Order>, StoreError>;

    async fn update_order_status(
        &mut self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<u64, StoreError>;

    /// Cascades to order items.
    async fn delete_order(&mut self, order_id: &str) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Read-only sales aggregation over order item price snapshots.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn top_products(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TopProduct>, StoreError>;

    /// Sparse: only hours that saw orders.
    async fn sales_by_hour(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HourlySales>, StoreError>;

    async fn sales_by_day(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DailySales>, StoreError>;

    /// Returns the requested page and the number of distinct products.
    /// `page` is `(limit, offset)`; `None` returns every product.
    async fn product_sales(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        page: Option<(i64, i64)>,
    ) -> Result<(Vec<ProductSales>, i64), StoreError>;

    async fn product_customers(
        &self,
        product_id: i64,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ProductCustomer>, StoreError>;
}
