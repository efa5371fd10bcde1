use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crumb_core::repository::{ProductFilter, LOW_STOCK_THRESHOLD};
use crumb_core::{
    Cart, CartItem, Image, NewImage, NewOrder, NewOrderItem, NewProduct, NewPromotion, NewUser,
    Order, OrderItem, OrderStatus, Product, Promotion, Role, Store, StoreError, Transaction, User,
};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

pub(crate) fn db_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::UniqueViolation(db.constraint().unwrap_or("unique").to_string());
        }
    }
    StoreError::Backend(err.to_string())
}

/// PostgreSQL-backed `Store`. Each `begin` checks a connection out of the pool
/// and opens a database transaction on it.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    password_hash: String,
    role: String,
    name: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            role: Role::parse(&row.role).unwrap_or(Role::Member),
            name: row.name,
            phone: row.phone,
            address: row.address,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    description: String,
    tag: String,
    price: Decimal,
    stock: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ImageRow {
    id: i64,
    product_id: i64,
    file_path: String,
    public_url: Option<String>,
    position: i32,
}

impl From<ImageRow> for Image {
    fn from(row: ImageRow) -> Self {
        Image {
            id: row.id,
            product_id: row.product_id,
            file_path: row.file_path,
            public_url: row.public_url,
            position: row.position,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PromotionRow {
    id: i64,
    product_id: i64,
    name: String,
    description: String,
    discount: Decimal,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PromotionRow> for Promotion {
    fn from(row: PromotionRow) -> Self {
        Promotion {
            id: row.id,
            product_id: row.product_id,
            name: row.name,
            description: row.description,
            discount: row.discount,
            start_date: row.start_date,
            end_date: row.end_date,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: i64,
    user_id: Uuid,
}

#[derive(sqlx::FromRow)]
struct CartLineRow {
    cart_id: i64,
    product_id: i64,
    quantity: i32,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    user_id: Uuid,
    total: Decimal,
    status: String,
    slip_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    order_id: String,
    product_id: i64,
    quantity: i32,
    price: Decimal,
    product_name: String,
    product_description: String,
    product_tag: String,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            order_id: row.order_id,
            product_id: row.product_id,
            quantity: row.quantity,
            price: row.price,
            product_name: row.product_name,
            product_description: row.product_description,
            product_tag: row.product_tag,
        }
    }
}

const USER_COLUMNS: &str =
    "id, username, password_hash, role, name, phone, address, created_at";
const PRODUCT_COLUMNS: &str =
    "id, name, description, tag, price, stock, is_active, created_at, updated_at";
const IMAGE_COLUMNS: &str = "id, product_id, file_path, public_url, position";
const PROMOTION_COLUMNS: &str = "id, product_id, name, description, discount, start_date, end_date, is_active, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, user_id, total, status, slip_url, created_at, updated_at";
const ORDER_ITEM_COLUMNS: &str =
    "order_id, product_id, quantity, price, product_name, product_description, product_tag";

impl PgTransaction {
    /// Load images and promotions for a batch of product rows.
    async fn attach(&mut self, rows: Vec<ProductRow>) -> Result<Vec<Product>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

        let images = sqlx::query_as::<_, ImageRow>(&format!(
            "SELECT {} FROM product_images WHERE product_id = ANY($1) ORDER BY position",
            IMAGE_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;

        let promotions = sqlx::query_as::<_, PromotionRow>(&format!(
            "SELECT {} FROM promotions WHERE product_id = ANY($1) ORDER BY id",
            PROMOTION_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;

        let mut images_by_product: HashMap<i64, Vec<Image>> = HashMap::new();
        for image in images {
            images_by_product.entry(image.product_id).or_default().push(image.into());
        }
        let mut promotions_by_product: HashMap<i64, Vec<Promotion>> = HashMap::new();
        for promotion in promotions {
            promotions_by_product
                .entry(promotion.product_id)
                .or_default()
                .push(promotion.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| Product {
                images: images_by_product.remove(&row.id).unwrap_or_default(),
                promotions: promotions_by_product.remove(&row.id).unwrap_or_default(),
                id: row.id,
                name: row.name,
                description: row.description,
                tag: row.tag,
                price: row.price,
                stock: row.stock,
                is_active: row.is_active,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
            .collect())
    }

    async fn load_cart(&mut self, user_id: Uuid, for_update: bool) -> Result<Option<Cart>, StoreError> {
        let sql = if for_update {
            "SELECT id, user_id FROM carts WHERE user_id = $1 FOR UPDATE"
        } else {
            "SELECT id, user_id FROM carts WHERE user_id = $1"
        };
        let Some(cart) = sqlx::query_as::<_, CartRow>(sql)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?
        else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, CartLineRow>(
            "SELECT cart_id, product_id, quantity FROM cart_items WHERE cart_id = $1 ORDER BY product_id",
        )
        .bind(cart.id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;

        let ids: Vec<i64> = lines.iter().map(|l| l.product_id).collect();
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE id = ANY($1)",
            PRODUCT_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        let mut products: HashMap<i64, Product> = self
            .attach(rows)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let items = lines
            .into_iter()
            .filter_map(|line| {
                products.remove(&line.product_id).map(|product| CartItem {
                    cart_id: line.cart_id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    product,
                })
            })
            .collect();

        Ok(Some(Cart {
            id: cart.id,
            user_id: cart.user_id,
            items,
        }))
    }

    async fn attach_items(&mut self, rows: Vec<OrderRow>) -> Result<Vec<Order>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let items = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {} FROM order_items WHERE order_id = ANY($1) ORDER BY product_id",
            ORDER_ITEM_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;

        let mut by_order: HashMap<String, Vec<OrderItem>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id.clone()).or_default().push(item.into());
        }

        rows.into_iter()
            .map(|row| {
                let status = OrderStatus::parse(&row.status).ok_or_else(|| {
                    StoreError::Backend(format!("unknown order status '{}'", row.status))
                })?;
                Ok(Order {
                    items: by_order.remove(&row.id).unwrap_or_default(),
                    id: row.id,
                    user_id: row.user_id,
                    total: row.total,
                    status,
                    slip_url: row.slip_url,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn insert_user(&mut self, user: &NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, username, password_hash, role) VALUES ($1, $2, $3, $4) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(row.into())
    }

    async fn find_user(&mut self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    async fn find_user_by_username(&mut self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    async fn update_user_profile(&mut self, user: &User) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET name = $1, phone = $2, address = $3 WHERE id = $4")
            .bind(&user.name)
            .bind(&user.phone)
            .bind(&user.address)
            .bind(user.id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_product(&mut self, product: &NewProduct) -> Result<Product, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO products (name, description, tag, price, stock, is_active)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            PRODUCT_COLUMNS
        ))
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.tag)
        .bind(product.price)
        .bind(product.stock)
        .bind(product.is_active)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;
        self.attach(vec![row])
            .await?
            .pop()
            .ok_or_else(|| StoreError::Backend("insert returned no product".to_string()))
    }

    async fn find_product(&mut self, id: i64) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => Ok(self.attach(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_products(&mut self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products
             WHERE ($1 = FALSE OR stock < $2)
               AND ($3::TEXT IS NULL OR name ILIKE '%' || $3 || '%' OR tag ILIKE '%' || $3 || '%')
             ORDER BY updated_at DESC, id DESC
             LIMIT $4 OFFSET $5",
            PRODUCT_COLUMNS
        ))
        .bind(filter.low_stock)
        .bind(LOW_STOCK_THRESHOLD)
        .bind(&filter.query)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        self.attach(rows).await
    }

    async fn update_product(
        &mut self,
        id: i64,
        product: &NewProduct,
    ) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE products
             SET name = $1, description = $2, tag = $3, price = $4, stock = $5, is_active = $6, updated_at = NOW()
             WHERE id = $7 RETURNING {}",
            PRODUCT_COLUMNS
        ))
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.tag)
        .bind(product.price)
        .bind(product.stock)
        .bind(product.is_active)
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;
        match row {
            Some(row) => Ok(self.attach(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn delete_product(&mut self, id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn list_images(&mut self, product_id: i64) -> Result<Vec<Image>, StoreError> {
        let rows = sqlx::query_as::<_, ImageRow>(&format!(
            "SELECT {} FROM product_images WHERE product_id = $1 ORDER BY position",
            IMAGE_COLUMNS
        ))
        .bind(product_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_image(&mut self, product_id: i64, image: &NewImage) -> Result<Image, StoreError> {
        let row = sqlx::query_as::<_, ImageRow>(&format!(
            "INSERT INTO product_images (product_id, file_path, public_url, position)
             VALUES ($1, $2, $3, $4) RETURNING {}",
            IMAGE_COLUMNS
        ))
        .bind(product_id)
        .bind(&image.file_path)
        .bind(&image.public_url)
        .bind(image.position)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(row.into())
    }

    async fn set_image_public_url(&mut self, image_id: i64, url: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE product_images SET public_url = $1 WHERE id = $2")
            .bind(url)
            .bind(image_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_images(
        &mut self,
        product_id: i64,
        positions: Option<&[i32]>,
    ) -> Result<u64, StoreError> {
        let result = match positions {
            Some(positions) => {
                sqlx::query("DELETE FROM product_images WHERE product_id = $1 AND position = ANY($2)")
                    .bind(product_id)
                    .bind(positions.to_vec())
                    .execute(&mut *self.tx)
                    .await
            }
            None => {
                sqlx::query("DELETE FROM product_images WHERE product_id = $1")
                    .bind(product_id)
                    .execute(&mut *self.tx)
                    .await
            }
        }
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn insert_promotion(&mut self, promotion: &NewPromotion) -> Result<Promotion, StoreError> {
        let row = sqlx::query_as::<_, PromotionRow>(&format!(
            "INSERT INTO promotions (product_id, name, description, discount, start_date, end_date, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            PROMOTION_COLUMNS
        ))
        .bind(promotion.product_id)
        .bind(&promotion.name)
        .bind(&promotion.description)
        .bind(promotion.discount)
        .bind(promotion.start_date)
        .bind(promotion.end_date)
        .bind(promotion.is_active)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(row.into())
    }

    async fn find_promotion(&mut self, id: i64) -> Result<Option<Promotion>, StoreError> {
        let row = sqlx::query_as::<_, PromotionRow>(&format!(
            "SELECT {} FROM promotions WHERE id = $1",
            PROMOTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    async fn list_promotions(&mut self, product_id: Option<i64>) -> Result<Vec<Promotion>, StoreError> {
        let rows = sqlx::query_as::<_, PromotionRow>(&format!(
            "SELECT {} FROM promotions WHERE ($1::BIGINT IS NULL OR product_id = $1) ORDER BY id",
            PROMOTION_COLUMNS
        ))
        .bind(product_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_promotion(
        &mut self,
        id: i64,
        promotion: &NewPromotion,
    ) -> Result<Option<Promotion>, StoreError> {
        let row = sqlx::query_as::<_, PromotionRow>(&format!(
            "UPDATE promotions
             SET product_id = $1, name = $2, description = $3, discount = $4,
                 start_date = $5, end_date = $6, is_active = $7, updated_at = NOW()
             WHERE id = $8 RETURNING {}",
            PROMOTION_COLUMNS
        ))
        .bind(promotion.product_id)
        .bind(&promotion.name)
        .bind(&promotion.description)
        .bind(promotion.discount)
        .bind(promotion.start_date)
        .bind(promotion.end_date)
        .bind(promotion.is_active)
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    async fn delete_promotion(&mut self, id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM promotions WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn find_cart(&mut self, user_id: Uuid) -> Result<Option<Cart>, StoreError> {
        self.load_cart(user_id, false).await
    }

    async fn lock_cart(&mut self, user_id: Uuid) -> Result<Option<Cart>, StoreError> {
        self.load_cart(user_id, true).await
    }

    async fn insert_cart(&mut self, user_id: Uuid) -> Result<Cart, StoreError> {
        let row = sqlx::query_as::<_, CartRow>("INSERT INTO carts (user_id) VALUES ($1) RETURNING id, user_id")
            .bind(user_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(Cart {
            id: row.id,
            user_id: row.user_id,
            items: Vec::new(),
        })
    }

    async fn cart_item_quantity(
        &mut self,
        cart_id: i64,
        product_id: i64,
    ) -> Result<Option<i32>, StoreError> {
        let quantity: Option<(i32,)> = sqlx::query_as(
            "SELECT quantity FROM cart_items WHERE cart_id = $1 AND product_id = $2",
        )
        .bind(cart_id)
        .bind(product_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(quantity.map(|(q,)| q))
    }

    async fn insert_cart_item(
        &mut self,
        cart_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO cart_items (cart_id, product_id, quantity) VALUES ($1, $2, $3)")
            .bind(cart_id)
            .bind(product_id)
            .bind(quantity)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn update_cart_item(
        &mut self,
        cart_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE cart_items SET quantity = $1 WHERE cart_id = $2 AND product_id = $3",
        )
        .bind(quantity)
        .bind(cart_id)
        .bind(product_id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn delete_cart_item(&mut self, cart_id: i64, product_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id)
            .bind(product_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn clear_cart(&mut self, cart_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (id, user_id, total, status) VALUES ($1, $2, $3, $4) RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(&order.id)
        .bind(order.user_id)
        .bind(order.total)
        .bind(order.status.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;
        self.attach_items(vec![row])
            .await?
            .pop()
            .ok_or_else(|| StoreError::Backend("insert returned no order".to_string()))
    }

    async fn insert_order_item(
        &mut self,
        order_id: &str,
        item: &NewOrderItem,
    ) -> Result<OrderItem, StoreError> {
        let row = sqlx::query_as::<_, OrderItemRow>(&format!(
            "INSERT INTO order_items (order_id, product_id, quantity, price, product_name, product_description, product_tag)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            ORDER_ITEM_COLUMNS
        ))
        .bind(order_id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.price)
        .bind(&item.product_name)
        .bind(&item.product_description)
        .bind(&item.product_tag)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(row.into())
    }

    async fn set_order_slip(&mut self, order_id: &str, slip_url: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE orders SET slip_url = $1 WHERE id = $2")
            .bind(slip_url)
            .bind(order_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn find_order(&mut self, order_id: &str) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => Ok(self.attach_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&mut self, user_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
            ORDER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        self.attach_items(rows).await
    }

    async fn update_order_status(
        &mut self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(order_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn delete_order(&mut self, order_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(db_err)
    }
}
