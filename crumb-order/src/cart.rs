use std::sync::Arc;

use crumb_core::{Cart, CoreError, CoreResult, Store, StoreError};
use tracing::debug;
use uuid::Uuid;

/// The single mutable pre-checkout basket per user.
pub struct CartStore {
    store: Arc<dyn Store>,
}

impl CartStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The user's cart with items, products, promotions and images loaded,
    /// created empty on first access.
    pub async fn get_or_create_cart(&self, user_id: Uuid) -> CoreResult<Cart> {
        let mut tx = self.store.begin().await?;
        if let Some(cart) = tx.find_cart(user_id).await? {
            tx.commit().await?;
            return Ok(cart);
        }

        match tx.insert_cart(user_id).await {
            Ok(cart) => {
                tx.commit().await?;
                debug!("Created cart {} for user {}", cart.id, user_id);
                Ok(cart)
            }
            Err(StoreError::UniqueViolation(_)) => {
                // A concurrent request created it first.
                drop(tx);
                let mut tx = self.store.begin().await?;
                let cart = tx.find_cart(user_id).await?;
                tx.commit().await?;
                cart.ok_or_else(|| CoreError::not_found("cart"))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Set the quantity of `product_id` in the user's cart to exactly
    /// `quantity`. A non-positive quantity removes an existing line and is
    /// rejected for a product that is not in the cart.
    pub async fn set_item_quantity(
        &self,
        user_id: Uuid,
        product_id: i64,
        quantity: i32,
    ) -> CoreResult<Cart> {
        let cart = self.get_or_create_cart(user_id).await?;

        let mut tx = self.store.begin().await?;
        if tx.find_product(product_id).await?.is_none() {
            return Err(CoreError::not_found("product"));
        }

        match tx.cart_item_quantity(cart.id, product_id).await? {
            None if quantity <= 0 => {
                return Err(CoreError::InvalidOperation(
                    "cannot set non-positive quantity on a non-existing item".to_string(),
                ));
            }
            None => tx.insert_cart_item(cart.id, product_id, quantity).await?,
            Some(_) if quantity <= 0 => {
                tx.delete_cart_item(cart.id, product_id).await?;
            }
            Some(_) => {
                tx.update_cart_item(cart.id, product_id, quantity).await?;
            }
        }

        let refreshed = tx
            .find_cart(user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("cart"))?;
        tx.commit().await?;
        Ok(refreshed)
    }

    /// Remove every line; the cart itself stays.
    pub async fn clear_cart(&self, user_id: Uuid) -> CoreResult<()> {
        let cart = self.get_or_create_cart(user_id).await?;

        let mut tx = self.store.begin().await?;
        let removed = tx.clear_cart(cart.id).await?;
        tx.commit().await?;

        debug!("Cleared {} lines from cart {}", removed, cart.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;

    #[tokio::test]
    async fn test_cart_is_created_once() {
        let fx = Fixture::new();
        let carts = CartStore::new(fx.store.clone());
        let user = fx.user("ann").await;

        let first = carts.get_or_create_cart(user).await.unwrap();
        let second = carts.get_or_create_cart(user).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_quantity_is_absolute() {
        let fx = Fixture::new();
        let carts = CartStore::new(fx.store.clone());
        let user = fx.user("ann").await;
        let bun = fx.product("Bun", 30).await;

        carts.set_item_quantity(user, bun, 3).await.unwrap();
        let cart = carts.set_item_quantity(user, bun, 5).await.unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 5);
        assert_eq!(cart.items[0].product.name, "Bun");
    }

    #[tokio::test]
    async fn test_zero_removes_existing_line() {
        let fx = Fixture::new();
        let carts = CartStore::new(fx.store.clone());
        let user = fx.user("ann").await;
        let bun = fx.product("Bun", 30).await;

        carts.set_item_quantity(user, bun, 2).await.unwrap();
        let cart = carts.set_item_quantity(user, bun, 0).await.unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_on_missing_line_fails() {
        let fx = Fixture::new();
        let carts = CartStore::new(fx.store.clone());
        let user = fx.user("ann").await;
        let bun = fx.product("Bun", 30).await;

        assert!(matches!(
            carts.set_item_quantity(user, bun, 0).await,
            Err(CoreError::InvalidOperation(_))
        ));
        assert!(matches!(
            carts.set_item_quantity(user, bun, -2).await,
            Err(CoreError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found() {
        let fx = Fixture::new();
        let carts = CartStore::new(fx.store.clone());
        let user = fx.user("ann").await;

        assert!(matches!(
            carts.set_item_quantity(user, 999, 1).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_keeps_cart() {
        let fx = Fixture::new();
        let carts = CartStore::new(fx.store.clone());
        let user = fx.user("ann").await;
        let bun = fx.product("Bun", 30).await;
        let loaf = fx.product("Loaf", 90).await;

        let before = carts.set_item_quantity(user, bun, 1).await.unwrap();
        carts.set_item_quantity(user, loaf, 2).await.unwrap();
        carts.clear_cart(user).await.unwrap();

        let after = carts.get_or_create_cart(user).await.unwrap();
        assert_eq!(after.id, before.id);
        assert!(after.is_empty());
    }
}
