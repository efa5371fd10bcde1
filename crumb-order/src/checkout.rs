//! Cart to order conversion.
//!
//! Steps run inside one transaction: lock the cart row, price every line
//! once, write the order and its item snapshots, then empty the cart. The
//! snapshot price is the value used for the total and is never recomputed.

use std::sync::Arc;

use crumb_catalog::pricing::final_price;
use crumb_core::storage::slip_path;
use crumb_core::{
    CoreError, CoreResult, NewOrder, NewOrderItem, ObjectStorage, OrderStatus, Store,
    UploadTarget,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Whether checkout must obtain a slip upload URL to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlipPolicy {
    /// No URL, no order: a storage failure rolls the whole checkout back.
    Required,
    /// The order commits regardless; URL fields are omitted on failure.
    Optional,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub order_id: String,
    pub total: Decimal,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

pub struct CheckoutOrchestrator {
    store: Arc<dyn Store>,
    storage: Arc<dyn ObjectStorage>,
    slip_bucket: String,
    policy: SlipPolicy,
}

/// `ORD-` followed by 12 uppercase hex characters.
pub fn new_order_id() -> String {
    let raw = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("ORD-{}", &raw[..12])
}

impl CheckoutOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        storage: Arc<dyn ObjectStorage>,
        slip_bucket: impl Into<String>,
        policy: SlipPolicy,
    ) -> Self {
        Self {
            store,
            storage,
            slip_bucket: slip_bucket.into(),
            policy,
        }
    }

    pub async fn checkout(&self, user_id: Uuid) -> CoreResult<OrderSummary> {
        let mut tx = self.store.begin().await?;

        let cart = tx
            .lock_cart(user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("cart"))?;
        if cart.is_empty() {
            return Err(CoreError::InvalidOperation("cart is empty".to_string()));
        }

        let mut total = Decimal::ZERO;
        let mut lines = Vec::with_capacity(cart.items.len());
        for item in &cart.items {
            let unit_price = final_price(&item.product);
            total += unit_price * Decimal::from(item.quantity);
            lines.push(NewOrderItem {
                product_id: item.product_id,
                quantity: item.quantity,
                price: unit_price,
                product_name: item.product.name.clone(),
                product_description: item.product.description.clone(),
                product_tag: item.product.tag.clone(),
            });
        }

        let order = tx
            .insert_order(&NewOrder {
                id: new_order_id(),
                user_id,
                total,
                status: OrderStatus::Pending,
            })
            .await?;
        for line in &lines {
            tx.insert_order_item(&order.id, line).await?;
        }
        tx.clear_cart(cart.id).await?;

        let path = slip_path(&order.id);
        let target = match self.policy {
            SlipPolicy::Required => {
                let target = self.storage.generate_upload_url(&self.slip_bucket, &path).await?;
                tx.set_order_slip(&order.id, &target.public_url).await?;
                tx.commit().await?;
                Some(target)
            }
            SlipPolicy::Optional => {
                tx.commit().await?;
                self.attach_slip_after_commit(&order.id, &path).await
            }
        };

        info!(
            "Checked out order {} for user {}: {} lines, total {}",
            order.id,
            user_id,
            lines.len(),
            total
        );

        let (upload_url, public_url) = match target {
            Some(t) => (Some(t.upload_url), Some(t.public_url)),
            None => (None, None),
        };
        Ok(OrderSummary {
            order_id: order.id,
            total,
            status: OrderStatus::Pending,
            upload_url,
            public_url,
        })
    }

    async fn attach_slip_after_commit(&self, order_id: &str, path: &str) -> Option<UploadTarget> {
        let target = match self.storage.generate_upload_url(&self.slip_bucket, path).await {
            Ok(target) => target,
            Err(e) => {
                warn!("No slip upload URL for order {}: {}", order_id, e);
                return None;
            }
        };

        let recorded = async {
            let mut tx = self.store.begin().await?;
            tx.set_order_slip(order_id, &target.public_url).await?;
            tx.commit().await?;
            Ok::<_, CoreError>(())
        }
        .await;
        if let Err(e) = recorded {
            warn!("Failed to record slip URL for order {}: {}", order_id, e);
        }

        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CartStore;
    use crate::test_support::{Fixture, SLIP_BUCKET};
    use crumb_core::NewProduct;

    fn orchestrator(fx: &Fixture, policy: SlipPolicy) -> CheckoutOrchestrator {
        CheckoutOrchestrator::new(fx.store.clone(), fx.storage.clone(), SLIP_BUCKET, policy)
    }

    #[tokio::test]
    async fn test_checkout_snapshots_discounted_prices() {
        let fx = Fixture::new();
        let carts = CartStore::new(fx.store.clone());
        let user = fx.user("ann").await;
        let a = fx.product("Product A", 100).await;
        let b = fx.product("Product B", 50).await;
        fx.promotion(a, 20).await;

        carts.set_item_quantity(user, a, 2).await.unwrap();
        carts.set_item_quantity(user, b, 1).await.unwrap();

        let summary = orchestrator(&fx, SlipPolicy::Required).checkout(user).await.unwrap();
        assert_eq!(summary.total, Decimal::from(210));
        assert_eq!(summary.status, OrderStatus::Pending);
        assert!(summary.order_id.starts_with("ORD-"));

        let mut tx = fx.store.begin().await.unwrap();
        let order = tx.find_order(&summary.order_id).await.unwrap().unwrap();
        assert_eq!(order.total, Decimal::from(210));
        assert_eq!(order.items.len(), 2);
        let price_of = |pid: i64| order.items.iter().find(|i| i.product_id == pid).unwrap().price;
        assert_eq!(price_of(a), Decimal::from(80));
        assert_eq!(price_of(b), Decimal::from(50));

        let cart = tx.find_cart(user).await.unwrap().unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_of_one_cart_create_one_order() {
        let fx = Fixture::new();
        let carts = CartStore::new(fx.store.clone());
        let user = fx.user("ann").await;
        let bun = fx.product("Bun", 30).await;
        carts.set_item_quantity(user, bun, 2).await.unwrap();

        let checkout = orchestrator(&fx, SlipPolicy::Required);
        let (first, second) = tokio::join!(checkout.checkout(user), checkout.checkout(user));

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(
            |r| matches!(r, Err(CoreError::InvalidOperation(msg)) if msg == "cart is empty")
        ));
        assert_eq!(fx.order_count(user).await, 1);
    }

    #[tokio::test]
    async fn test_summary_carries_slip_target() {
        let fx = Fixture::new();
        let carts = CartStore::new(fx.store.clone());
        let user = fx.user("ann").await;
        let bun = fx.product("Bun", 30).await;
        carts.set_item_quantity(user, bun, 1).await.unwrap();

        let summary = orchestrator(&fx, SlipPolicy::Required).checkout(user).await.unwrap();
        let expected_path = format!("orders/{}/slip.png", summary.order_id);

        assert!(summary.upload_url.unwrap().contains(&expected_path));
        assert_eq!(
            summary.public_url.as_deref(),
            Some(format!("https://cdn.test/object/public/{}/{}", SLIP_BUCKET, expected_path).as_str())
        );

        let mut tx = fx.store.begin().await.unwrap();
        let order = tx.find_order(&summary.order_id).await.unwrap().unwrap();
        assert!(order.slip_url.unwrap().ends_with(&expected_path));
    }

    #[tokio::test]
    async fn test_empty_cart_is_rejected() {
        let fx = Fixture::new();
        let carts = CartStore::new(fx.store.clone());
        let user = fx.user("ann").await;
        carts.get_or_create_cart(user).await.unwrap();

        let result = orchestrator(&fx, SlipPolicy::Required).checkout(user).await;
        assert!(matches!(result, Err(CoreError::InvalidOperation(msg)) if msg == "cart is empty"));
        assert_eq!(fx.order_count(user).await, 0);
    }

    #[tokio::test]
    async fn test_missing_cart_is_not_found() {
        let fx = Fixture::new();
        let user = fx.user("ann").await;

        let result = orchestrator(&fx, SlipPolicy::Required).checkout(user).await;
        assert!(matches!(result, Err(CoreError::NotFound(msg)) if msg == "cart not found"));
    }

    #[tokio::test]
    async fn test_storage_failure_rolls_back_everything() {
        let fx = Fixture::new();
        let carts = CartStore::new(fx.store.clone());
        let user = fx.user("ann").await;
        let bun = fx.product("Bun", 30).await;
        let loaf = fx.product("Loaf", 90).await;
        carts.set_item_quantity(user, bun, 4).await.unwrap();
        carts.set_item_quantity(user, loaf, 1).await.unwrap();

        fx.storage.set_failing(true);
        let result = orchestrator(&fx, SlipPolicy::Required).checkout(user).await;
        assert!(matches!(result, Err(CoreError::Unavailable(_))));

        assert_eq!(fx.order_count(user).await, 0);
        let cart = carts.get_or_create_cart(user).await.unwrap();
        assert_eq!(cart.items.len(), 2);
        let bun_line = cart.items.iter().find(|i| i.product_id == bun).unwrap();
        assert_eq!(bun_line.quantity, 4);
    }

    #[tokio::test]
    async fn test_optional_slip_commits_without_urls() {
        let fx = Fixture::new();
        let carts = CartStore::new(fx.store.clone());
        let user = fx.user("ann").await;
        let bun = fx.product("Bun", 30).await;
        carts.set_item_quantity(user, bun, 2).await.unwrap();

        fx.storage.set_failing(true);
        let summary = orchestrator(&fx, SlipPolicy::Optional).checkout(user).await.unwrap();

        assert_eq!(summary.total, Decimal::from(60));
        assert!(summary.upload_url.is_none());
        assert!(summary.public_url.is_none());
        assert_eq!(fx.order_count(user).await, 1);
        assert!(carts.get_or_create_cart(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshots_survive_catalog_changes() {
        let fx = Fixture::new();
        let carts = CartStore::new(fx.store.clone());
        let user = fx.user("ann").await;
        let cake = fx.product("Cake", 200).await;
        let promo = fx.promotion(cake, 25).await;
        carts.set_item_quantity(user, cake, 1).await.unwrap();

        let summary = orchestrator(&fx, SlipPolicy::Required).checkout(user).await.unwrap();
        assert_eq!(summary.total, Decimal::from(150));

        let mut tx = fx.store.begin().await.unwrap();
        tx.update_product(
            cake,
            &NewProduct {
                name: "Cake deluxe".to_string(),
                description: "Now with more cream".to_string(),
                tag: "cake".to_string(),
                price: Decimal::from(500),
                stock: 10,
                is_active: true,
            },
        )
        .await
        .unwrap();
        let mut promotion = tx.find_promotion(promo).await.unwrap().unwrap();
        promotion.is_active = false;
        tx.update_promotion(
            promo,
            &crumb_core::NewPromotion {
                product_id: promotion.product_id,
                name: promotion.name.clone(),
                description: promotion.description.clone(),
                discount: promotion.discount,
                start_date: promotion.start_date,
                end_date: promotion.end_date,
                is_active: promotion.is_active,
            },
        )
        .await
        .unwrap();

        let order = tx.find_order(&summary.order_id).await.unwrap().unwrap();
        assert_eq!(order.total, Decimal::from(150));
        assert_eq!(order.items[0].price, Decimal::from(150));
        assert_eq!(order.items[0].product_name, "Cake");
        assert_eq!(order.items[0].product_description, "Cake description");
    }

    #[test]
    fn test_order_id_shape() {
        let id = new_order_id();
        assert_eq!(id.len(), 16);
        assert!(id.starts_with("ORD-"));
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}
