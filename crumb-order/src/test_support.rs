use std::sync::Arc;

use chrono::{Duration, Utc};
use crumb_core::{NewProduct, NewPromotion, NewUser, Role, Store};
use crumb_store::memory::{MemoryObjectStorage, MemoryStore};
use rust_decimal::Decimal;
use uuid::Uuid;

pub const SLIP_BUCKET: &str = "order-slips";

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub storage: Arc<MemoryObjectStorage>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            storage: Arc::new(MemoryObjectStorage::new("https://cdn.test")),
        }
    }

    pub async fn user(&self, username: &str) -> Uuid {
        let mut tx = self.store.begin().await.unwrap();
        let user = tx
            .insert_user(&NewUser {
                username: username.to_string(),
                password_hash: "hash".to_string(),
                role: Role::Member,
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        user.id
    }

    pub async fn product(&self, name: &str, price: i64) -> i64 {
        let mut tx = self.store.begin().await.unwrap();
        let product = tx
            .insert_product(&NewProduct {
                name: name.to_string(),
                description: format!("{} description", name),
                tag: "bakery".to_string(),
                price: Decimal::from(price),
                stock: 50,
                is_active: true,
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        product.id
    }

    pub async fn promotion(&self, product_id: i64, discount: i64) -> i64 {
        let now = Utc::now();
        let mut tx = self.store.begin().await.unwrap();
        let promotion = tx
            .insert_promotion(&NewPromotion {
                product_id,
                name: format!("{}% off", discount),
                description: String::new(),
                discount: Decimal::from(discount),
                start_date: now - Duration::days(1),
                end_date: now + Duration::days(1),
                is_active: true,
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        promotion.id
    }

    /// Number of orders owned by `user_id`.
    pub async fn order_count(&self, user_id: Uuid) -> usize {
        let mut tx = self.store.begin().await.unwrap();
        tx.list_orders(user_id).await.unwrap().len()
    }
}
