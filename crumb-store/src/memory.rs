//! In-process implementations of the persistence and object storage seams.
//!
//! `MemoryStore` mirrors the PostgreSQL schema closely enough that services
//! can be exercised without a database: unique constraints raise
//! `StoreError::UniqueViolation`, deletes cascade the way the foreign keys do,
//! and a transaction only publishes its writes on `commit`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use crumb_core::report::{hour_label, DailySales, HourlySales, ProductCustomer, ProductSales, TopProduct};
use crumb_core::repository::{ProductFilter, LOW_STOCK_THRESHOLD};
use crumb_core::{
    Cart, CartItem, Image, NewImage, NewOrder, NewOrderItem, NewProduct, NewPromotion, NewUser,
    ObjectStorage, Order, OrderItem, OrderStatus, Product, Promotion, ReportRepository,
    StorageError, Store, StoreError, Transaction, UploadTarget, User,
};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct CartRow {
    id: i64,
    user_id: Uuid,
}

#[derive(Debug, Clone)]
struct CartLine {
    cart_id: i64,
    product_id: i64,
    quantity: i32,
}

#[derive(Debug, Clone)]
struct OrderRow {
    id: String,
    user_id: Uuid,
    total: Decimal,
    status: OrderStatus,
    slip_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct State {
    users: HashMap<Uuid, User>,
    products: BTreeMap<i64, Product>,
    images: BTreeMap<i64, Image>,
    promotions: BTreeMap<i64, Promotion>,
    carts: BTreeMap<i64, CartRow>,
    cart_lines: Vec<CartLine>,
    orders: BTreeMap<String, OrderRow>,
    order_items: Vec<OrderItem>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Product row with images (by position) and promotions attached.
    fn hydrate(&self, product: &Product) -> Product {
        let mut product = product.clone();
        let mut images: Vec<Image> = self
            .images
            .values()
            .filter(|i| i.product_id == product.id)
            .cloned()
            .collect();
        images.sort_by_key(|i| i.position);
        product.images = images;
        product.promotions = self
            .promotions
            .values()
            .filter(|p| p.product_id == product.id)
            .cloned()
            .collect();
        product
    }

    fn cart(&self, user_id: Uuid) -> Option<Cart> {
        let row = self.carts.values().find(|c| c.user_id == user_id)?;
        let items = self
            .cart_lines
            .iter()
            .filter(|l| l.cart_id == row.id)
            .filter_map(|l| {
                self.products.get(&l.product_id).map(|p| CartItem {
                    cart_id: l.cart_id,
                    product_id: l.product_id,
                    quantity: l.quantity,
                    product: self.hydrate(p),
                })
            })
            .collect();
        Some(Cart {
            id: row.id,
            user_id: row.user_id,
            items,
        })
    }

    fn order(&self, row: &OrderRow) -> Order {
        Order {
            id: row.id.clone(),
            user_id: row.user_id,
            total: row.total,
            status: row.status,
            slip_url: row.slip_url.clone(),
            items: self
                .order_items
                .iter()
                .filter(|i| i.order_id == row.id)
                .cloned()
                .collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    /// Order items joined with their order, restricted to `[start, end)`.
    fn sold_lines(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> impl Iterator<Item = (&OrderRow, &OrderItem)> {
        self.order_items.iter().filter_map(move |item| {
            let order = self.orders.get(&item.order_id)?;
            let after_start = start.map_or(true, |s| order.created_at >= s);
            let before_end = end.map_or(true, |e| order.created_at < e);
            (after_start && before_end).then_some((order, item))
        })
    }
}

/// Shared in-memory database. Cloning shares the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite an order's creation time, for report scenarios.
    pub async fn backdate_order(&self, order_id: &str, at: DateTime<Utc>) {
        if let Some(order) = self.state.lock().await.orders.get_mut(order_id) {
            order.created_at = at;
            order.updated_at = at;
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

/// Holds the store lock for its whole lifetime and edits a private copy.
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<State>,
    working: State,
}

fn unique(what: &str) -> StoreError {
    StoreError::UniqueViolation(what.to_string())
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn insert_user(&mut self, user: &NewUser) -> Result<User, StoreError> {
        let s = &mut self.working;
        if s.users.values().any(|u| u.username == user.username) {
            return Err(unique("users_username_key"));
        }
        let row = User {
            id: Uuid::new_v4(),
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role,
            name: None,
            phone: None,
            address: None,
            created_at: Utc::now(),
        };
        s.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_user(&mut self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn find_user_by_username(&mut self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.working.users.values().find(|u| u.username == username).cloned())
    }

    async fn update_user_profile(&mut self, user: &User) -> Result<(), StoreError> {
        if let Some(row) = self.working.users.get_mut(&user.id) {
            row.name = user.name.clone();
            row.phone = user.phone.clone();
            row.address = user.address.clone();
        }
        Ok(())
    }

    async fn insert_product(&mut self, product: &NewProduct) -> Result<Product, StoreError> {
        let s = &mut self.working;
        if s.products.values().any(|p| p.name == product.name) {
            return Err(unique("products_name_key"));
        }
        let now = Utc::now();
        let row = Product {
            id: s.next_id(),
            name: product.name.clone(),
            description: product.description.clone(),
            tag: product.tag.clone(),
            price: product.price,
            stock: product.stock,
            is_active: product.is_active,
            images: Vec::new(),
            promotions: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        s.products.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_product(&mut self, id: i64) -> Result<Option<Product>, StoreError> {
        let s = &self.working;
        Ok(s.products.get(&id).map(|p| s.hydrate(p)))
    }

    async fn list_products(&mut self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let s = &self.working;
        let needle = filter.query.as_ref().map(|q| q.to_lowercase());
        let mut rows: Vec<&Product> = s
            .products
            .values()
            .filter(|p| !filter.low_stock || p.stock < LOW_STOCK_THRESHOLD)
            .filter(|p| match &needle {
                Some(q) => p.name.to_lowercase().contains(q) || p.tag.to_lowercase().contains(q),
                None => true,
            })
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));

        Ok(rows
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .map(|p| s.hydrate(p))
            .collect())
    }

    async fn update_product(
        &mut self,
        id: i64,
        product: &NewProduct,
    ) -> Result<Option<Product>, StoreError> {
        let s = &mut self.working;
        if s.products.values().any(|p| p.id != id && p.name == product.name) {
            return Err(unique("products_name_key"));
        }
        let Some(row) = s.products.get_mut(&id) else {
            return Ok(None);
        };
        row.name = product.name.clone();
        row.description = product.description.clone();
        row.tag = product.tag.clone();
        row.price = product.price;
        row.stock = product.stock;
        row.is_active = product.is_active;
        row.updated_at = Utc::now();

        let row = row.clone();
        Ok(Some(s.hydrate(&row)))
    }

    async fn delete_product(&mut self, id: i64) -> Result<u64, StoreError> {
        let s = &mut self.working;
        if s.products.remove(&id).is_none() {
            return Ok(0);
        }
        s.images.retain(|_, i| i.product_id != id);
        s.promotions.retain(|_, p| p.product_id != id);
        s.cart_lines.retain(|l| l.product_id != id);
        Ok(1)
    }

    async fn list_images(&mut self, product_id: i64) -> Result<Vec<Image>, StoreError> {
        let mut images: Vec<Image> = self
            .working
            .images
            .values()
            .filter(|i| i.product_id == product_id)
            .cloned()
            .collect();
        images.sort_by_key(|i| i.position);
        Ok(images)
    }

    async fn insert_image(&mut self, product_id: i64, image: &NewImage) -> Result<Image, StoreError> {
        let s = &mut self.working;
        if s.images
            .values()
            .any(|i| i.product_id == product_id && i.position == image.position)
        {
            return Err(unique("product_images_product_id_position_key"));
        }
        let row = Image {
            id: s.next_id(),
            product_id,
            file_path: image.file_path.clone(),
            public_url: image.public_url.clone(),
            position: image.position,
        };
        s.images.insert(row.id, row.clone());
        Ok(row)
    }

    async fn set_image_public_url(&mut self, image_id: i64, url: &str) -> Result<(), StoreError> {
        if let Some(image) = self.working.images.get_mut(&image_id) {
            image.public_url = Some(url.to_string());
        }
        Ok(())
    }

    async fn delete_images(
        &mut self,
        product_id: i64,
        positions: Option<&[i32]>,
    ) -> Result<u64, StoreError> {
        let before = self.working.images.len();
        self.working.images.retain(|_, i| {
            let targeted = i.product_id == product_id
                && positions.map_or(true, |ps| ps.contains(&i.position));
            !targeted
        });
        Ok((before - self.working.images.len()) as u64)
    }

    async fn insert_promotion(&mut self, promotion: &NewPromotion) -> Result<Promotion, StoreError> {
        let s = &mut self.working;
        let now = Utc::now();
        let row = Promotion {
            id: s.next_id(),
            product_id: promotion.product_id,
            name: promotion.name.clone(),
            description: promotion.description.clone(),
            discount: promotion.discount,
            start_date: promotion.start_date,
            end_date: promotion.end_date,
            is_active: promotion.is_active,
            created_at: now,
            updated_at: now,
        };
        s.promotions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_promotion(&mut self, id: i64) -> Result<Option<Promotion>, StoreError> {
        Ok(self.working.promotions.get(&id).cloned())
    }

    async fn list_promotions(&mut self, product_id: Option<i64>) -> Result<Vec<Promotion>, StoreError> {
        Ok(self
            .working
            .promotions
            .values()
            .filter(|p| product_id.map_or(true, |id| p.product_id == id))
            .cloned()
            .collect())
    }

    async fn update_promotion(
        &mut self,
        id: i64,
        promotion: &NewPromotion,
    ) -> Result<Option<Promotion>, StoreError> {
        let Some(row) = self.working.promotions.get_mut(&id) else {
            return Ok(None);
        };
        row.product_id = promotion.product_id;
        row.name = promotion.name.clone();
        row.description = promotion.description.clone();
        row.discount = promotion.discount;
        row.start_date = promotion.start_date;
        row.end_date = promotion.end_date;
        row.is_active = promotion.is_active;
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn delete_promotion(&mut self, id: i64) -> Result<u64, StoreError> {
        Ok(self.working.promotions.remove(&id).map_or(0, |_| 1))
    }

    async fn find_cart(&mut self, user_id: Uuid) -> Result<Option<Cart>, StoreError> {
        Ok(self.working.cart(user_id))
    }

    async fn lock_cart(&mut self, user_id: Uuid) -> Result<Option<Cart>, StoreError> {
        // The transaction already holds the whole store exclusively.
        Ok(self.working.cart(user_id))
    }

    async fn insert_cart(&mut self, user_id: Uuid) -> Result<Cart, StoreError> {
        let s = &mut self.working;
        if s.carts.values().any(|c| c.user_id == user_id) {
            return Err(unique("carts_user_id_key"));
        }
        let id = s.next_id();
        s.carts.insert(id, CartRow { id, user_id });
        Ok(Cart {
            id,
            user_id,
            items: Vec::new(),
        })
    }

    async fn cart_item_quantity(
        &mut self,
        cart_id: i64,
        product_id: i64,
    ) -> Result<Option<i32>, StoreError> {
        Ok(self
            .working
            .cart_lines
            .iter()
            .find(|l| l.cart_id == cart_id && l.product_id == product_id)
            .map(|l| l.quantity))
    }

    async fn insert_cart_item(
        &mut self,
        cart_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> Result<(), StoreError> {
        let s = &mut self.working;
        if quantity <= 0 {
            return Err(StoreError::Backend("cart_items_quantity_check".to_string()));
        }
        if s.cart_lines
            .iter()
            .any(|l| l.cart_id == cart_id && l.product_id == product_id)
        {
            return Err(unique("cart_items_pkey"));
        }
        s.cart_lines.push(CartLine {
            cart_id,
            product_id,
            quantity,
        });
        Ok(())
    }

    async fn update_cart_item(
        &mut self,
        cart_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> Result<u64, StoreError> {
        if quantity <= 0 {
            return Err(StoreError::Backend("cart_items_quantity_check".to_string()));
        }
        let mut updated = 0;
        for line in self
            .working
            .cart_lines
            .iter_mut()
            .filter(|l| l.cart_id == cart_id && l.product_id == product_id)
        {
            line.quantity = quantity;
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete_cart_item(&mut self, cart_id: i64, product_id: i64) -> Result<u64, StoreError> {
        let before = self.working.cart_lines.len();
        self.working
            .cart_lines
            .retain(|l| !(l.cart_id == cart_id && l.product_id == product_id));
        Ok((before - self.working.cart_lines.len()) as u64)
    }

    async fn clear_cart(&mut self, cart_id: i64) -> Result<u64, StoreError> {
        let before = self.working.cart_lines.len();
        self.working.cart_lines.retain(|l| l.cart_id != cart_id);
        Ok((before - self.working.cart_lines.len()) as u64)
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, StoreError> {
        let s = &mut self.working;
        if s.orders.contains_key(&order.id) {
            return Err(unique("orders_pkey"));
        }
        let now = Utc::now();
        let row = OrderRow {
            id: order.id.clone(),
            user_id: order.user_id,
            total: order.total,
            status: order.status,
            slip_url: None,
            created_at: now,
            updated_at: now,
        };
        let out = s.order(&row);
        s.orders.insert(row.id.clone(), row);
        Ok(out)
    }

    async fn insert_order_item(
        &mut self,
        order_id: &str,
        item: &NewOrderItem,
    ) -> Result<OrderItem, StoreError> {
        let s = &mut self.working;
        if !s.orders.contains_key(order_id) {
            return Err(StoreError::Backend("order_items_order_id_fkey".to_string()));
        }
        if s.order_items
            .iter()
            .any(|i| i.order_id == order_id && i.product_id == item.product_id)
        {
            return Err(unique("order_items_pkey"));
        }
        let row = OrderItem {
            order_id: order_id.to_string(),
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
            product_name: item.product_name.clone(),
            product_description: item.product_description.clone(),
            product_tag: item.product_tag.clone(),
        };
        s.order_items.push(row.clone());
        Ok(row)
    }

    async fn set_order_slip(&mut self, order_id: &str, slip_url: &str) -> Result<u64, StoreError> {
        match self.working.orders.get_mut(order_id) {
            Some(order) => {
                order.slip_url = Some(slip_url.to_string());
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn find_order(&mut self, order_id: &str) -> Result<Option<Order>, StoreError> {
        let s = &self.working;
        Ok(s.orders.get(order_id).map(|o| s.order(o)))
    }

    async fn list_orders(&mut self, user_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let s = &self.working;
        let mut rows: Vec<&OrderRow> = s.orders.values().filter(|o| o.user_id == user_id).collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows.into_iter().map(|o| s.order(o)).collect())
    }

    async fn update_order_status(
        &mut self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<u64, StoreError> {
        match self.working.orders.get_mut(order_id) {
            Some(order) => {
                order.status = status;
                order.updated_at = Utc::now();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_order(&mut self, order_id: &str) -> Result<u64, StoreError> {
        let s = &mut self.working;
        if s.orders.remove(order_id).is_none() {
            return Ok(0);
        }
        s.order_items.retain(|i| i.order_id != order_id);
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl ReportRepository for MemoryStore {
    async fn top_products(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<TopProduct>, StoreError> {
        let s = self.state.lock().await;
        let mut by_product: BTreeMap<i64, TopProduct> = BTreeMap::new();
        for (_, item) in s.sold_lines(Some(since), None) {
            let entry = by_product.entry(item.product_id).or_insert_with(|| TopProduct {
                product_id: item.product_id,
                name: item.product_name.clone(),
                quantity: 0,
                revenue: Decimal::ZERO,
            });
            entry.quantity += item.quantity as i64;
            entry.revenue += item.line_total();
        }
        let mut rows: Vec<TopProduct> = by_product.into_values().collect();
        rows.sort_by(|a, b| b.quantity.cmp(&a.quantity));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn sales_by_hour(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HourlySales>, StoreError> {
        let s = self.state.lock().await;
        let mut by_hour: BTreeMap<u32, (Decimal, Vec<String>)> = BTreeMap::new();
        for (order, item) in s.sold_lines(Some(start), Some(end)) {
            let entry = by_hour.entry(order.created_at.hour()).or_default();
            entry.0 += item.line_total();
            if !entry.1.contains(&order.id) {
                entry.1.push(order.id.clone());
            }
        }
        Ok(by_hour
            .into_iter()
            .map(|(hour, (total, orders))| HourlySales {
                hour: hour_label(hour),
                total,
                orders: orders.len() as i64,
            })
            .collect())
    }

    async fn sales_by_day(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DailySales>, StoreError> {
        let s = self.state.lock().await;
        let mut by_day: BTreeMap<String, (Decimal, Vec<String>)> = BTreeMap::new();
        for (order, item) in s.sold_lines(Some(start), Some(end)) {
            let entry = by_day
                .entry(order.created_at.format("%Y-%m-%d").to_string())
                .or_default();
            entry.0 += item.line_total();
            if !entry.1.contains(&order.id) {
                entry.1.push(order.id.clone());
            }
        }
        Ok(by_day
            .into_iter()
            .map(|(date, (total, orders))| DailySales {
                date,
                total,
                orders: orders.len() as i64,
            })
            .collect())
    }

    async fn product_sales(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        page: Option<(i64, i64)>,
    ) -> Result<(Vec<ProductSales>, i64), StoreError> {
        let s = self.state.lock().await;
        let mut by_product: BTreeMap<i64, ProductSales> = BTreeMap::new();
        for (_, item) in s.sold_lines(start, end) {
            let entry = by_product.entry(item.product_id).or_insert_with(|| ProductSales {
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                total_quantity: 0,
                total_revenue: Decimal::ZERO,
            });
            entry.total_quantity += item.quantity as i64;
            entry.total_revenue += item.line_total();
        }
        let mut rows: Vec<ProductSales> = by_product.into_values().collect();
        rows.sort_by(|a, b| b.total_quantity.cmp(&a.total_quantity));
        let total = rows.len() as i64;

        let rows = match page {
            Some((limit, offset)) => rows
                .into_iter()
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .collect(),
            None => rows,
        };
        Ok((rows, total))
    }

    async fn product_customers(
        &self,
        product_id: i64,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ProductCustomer>, StoreError> {
        let s = self.state.lock().await;
        let mut by_user: BTreeMap<Uuid, (ProductCustomer, Vec<String>)> = BTreeMap::new();
        for (order, item) in s.sold_lines(start, end).filter(|(_, i)| i.product_id == product_id) {
            let name = s
                .users
                .get(&order.user_id)
                .map(|u| u.name.clone().unwrap_or_else(|| u.username.clone()))
                .unwrap_or_default();
            let entry = by_user.entry(order.user_id).or_insert_with(|| {
                (
                    ProductCustomer {
                        customer_id: order.user_id,
                        customer_name: name,
                        order_count: 0,
                        total_quantity: 0,
                        total_amount: Decimal::ZERO,
                    },
                    Vec::new(),
                )
            });
            if !entry.1.contains(&order.id) {
                entry.1.push(order.id.clone());
                entry.0.order_count += 1;
            }
            entry.0.total_quantity += item.quantity as i64;
            entry.0.total_amount += item.line_total();
        }
        let mut rows: Vec<ProductCustomer> = by_user.into_values().map(|(c, _)| c).collect();
        rows.sort_by(|a, b| b.total_amount.cmp(&a.total_amount));
        Ok(rows)
    }
}

/// Object storage that only records what it was asked to do.
pub struct MemoryObjectStorage {
    base_url: String,
    issued: StdMutex<Vec<String>>,
    removed: StdMutex<Vec<String>>,
    failing: AtomicBool,
}

impl MemoryObjectStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            issued: StdMutex::new(Vec::new()),
            removed: StdMutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// While set, every call that would reach the network fails.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// `bucket/path` of every upload URL issued so far.
    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// `bucket/path` of every file removed so far.
    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Request("storage unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn generate_upload_url(&self, bucket: &str, path: &str) -> Result<UploadTarget, StorageError> {
        self.check()?;
        if let Ok(mut issued) = self.issued.lock() {
            issued.push(format!("{}/{}", bucket, path));
        }
        Ok(UploadTarget {
            upload_url: format!(
                "{}/object/upload/sign/{}/{}?token={}",
                self.base_url,
                bucket,
                path,
                Uuid::new_v4().simple()
            ),
            public_url: self.public_url(bucket, path),
        })
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/object/public/{}/{}", self.base_url, bucket, path)
    }

    async fn remove_file(&self, bucket: &str, path: &str) -> Result<(), StorageError> {
        self.check()?;
        if let Ok(mut removed) = self.removed.lock() {
            removed.push(format!("{}/{}", bucket, path));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crumb_core::Role;

    fn bread() -> NewProduct {
        NewProduct {
            name: "Sourdough".to_string(),
            description: "Country loaf".to_string(),
            tag: "bread".to_string(),
            price: Decimal::from(120),
            stock: 5,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&bread()).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.list_products(&ProductFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unique_constraints() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        tx.insert_product(&bread()).await.unwrap();
        assert!(matches!(tx.insert_product(&bread()).await, Err(StoreError::UniqueViolation(_))));

        let user = tx
            .insert_user(&NewUser {
                username: "ann".to_string(),
                password_hash: "x".to_string(),
                role: Role::Member,
            })
            .await
            .unwrap();
        tx.insert_cart(user.id).await.unwrap();
        assert!(matches!(tx.insert_cart(user.id).await, Err(StoreError::UniqueViolation(_))));
    }

    #[tokio::test]
    async fn test_product_delete_cascades() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let product = tx.insert_product(&bread()).await.unwrap();
        tx.insert_image(
            product.id,
            &NewImage {
                file_path: "products/1/1.png".to_string(),
                public_url: None,
                position: 1,
            },
        )
        .await
        .unwrap();
        let cart = tx.insert_cart(Uuid::new_v4()).await.unwrap();
        tx.insert_cart_item(cart.id, product.id, 2).await.unwrap();

        assert_eq!(tx.delete_product(product.id).await.unwrap(), 1);
        assert!(tx.list_images(product.id).await.unwrap().is_empty());
        assert_eq!(tx.cart_item_quantity(cart.id, product.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_low_stock_and_query_filters() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&bread()).await.unwrap();
        tx.insert_product(&NewProduct {
            name: "Croissant".to_string(),
            tag: "pastry".to_string(),
            stock: 40,
            ..bread()
        })
        .await
        .unwrap();

        let low = ProductFilter {
            low_stock: true,
            ..ProductFilter::default()
        };
        let rows = tx.list_products(&low).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Sourdough");

        let query = ProductFilter {
            query: Some("PAST".to_string()),
            ..ProductFilter::default()
        };
        let rows = tx.list_products(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Croissant");
    }

    async fn sell(store: &MemoryStore, id: &str, user: Uuid, product: &Product, quantity: i32) {
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&NewOrder {
            id: id.to_string(),
            user_id: user,
            total: product.price * Decimal::from(quantity),
            status: OrderStatus::Pending,
        })
        .await
        .unwrap();
        tx.insert_order_item(
            id,
            &NewOrderItem {
                product_id: product.id,
                quantity,
                price: product.price,
                product_name: product.name.clone(),
                product_description: product.description.clone(),
                product_tag: product.tag.clone(),
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_reports_use_price_snapshots() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let product = tx.insert_product(&bread()).await.unwrap();
        let ann = tx
            .insert_user(&NewUser {
                username: "ann".to_string(),
                password_hash: "x".to_string(),
                role: Role::Member,
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        sell(&store, "ORD-000000000001", ann.id, &product, 2).await;
        sell(&store, "ORD-000000000002", ann.id, &product, 1).await;
        let yesterday = Utc::now() - chrono::Duration::days(1);
        store.backdate_order("ORD-000000000002", yesterday).await;

        let mut tx = store.begin().await.unwrap();
        tx.update_product(
            product.id,
            &NewProduct {
                price: Decimal::from(999),
                ..bread()
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let (rows, total) = store.product_sales(None, None, None).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].total_quantity, 3);
        assert_eq!(rows[0].total_revenue, Decimal::from(360));

        let customers = store.product_customers(product.id, None, None).await.unwrap();
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].customer_name, "ann");
        assert_eq!(customers[0].order_count, 2);

        let start = yesterday - chrono::Duration::days(1);
        let days = store.sales_by_day(start, Utc::now() + chrono::Duration::days(1)).await.unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days.iter().map(|d| d.orders).sum::<i64>(), 2);

        let top = store.top_products(Utc::now() - chrono::Duration::hours(1), 5).await.unwrap();
        assert_eq!(top[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_failing_storage() {
        let storage = MemoryObjectStorage::new("https://cdn.test");
        storage.set_failing(true);
        assert!(storage.generate_upload_url("b", "p.png").await.is_err());
        storage.set_failing(false);

        let target = storage.generate_upload_url("b", "p.png").await.unwrap();
        assert!(target.upload_url.starts_with("https://cdn.test/object/upload/sign/b/p.png"));
        assert_eq!(target.public_url, "https://cdn.test/object/public/b/p.png");
        assert_eq!(storage.issued(), vec!["b/p.png".to_string()]);
    }
}
