use std::sync::Arc;

use crumb_core::{AuthUser, CoreError, CoreResult, Order, OrderStatus, Store, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::status::can_transition;

/// Manages order lifecycle and state transitions.
///
/// Reads and deletes are scoped to the owning user; an order that belongs to
/// someone else is reported as not found.
pub struct OrderManager {
    store: Arc<dyn Store>,
}

impl OrderManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get_order(&self, order_id: &str, user_id: Uuid) -> CoreResult<Order> {
        let mut tx = self.store.begin().await?;
        let order = owned_order(tx.as_mut(), order_id, user_id).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Newest first.
    pub async fn list_orders(&self, user_id: Uuid) -> CoreResult<Vec<Order>> {
        let mut tx = self.store.begin().await?;
        let orders = tx.list_orders(user_id).await?;
        tx.commit().await?;
        Ok(orders)
    }

    /// Move an order to `requested`. Members may only move their own orders;
    /// admins may move any order.
    pub async fn update_status(
        &self,
        order_id: &str,
        requested: &str,
        caller: &AuthUser,
    ) -> CoreResult<Order> {
        let next = OrderStatus::parse(requested)
            .ok_or_else(|| CoreError::InvalidInput(format!("invalid status: {}", requested)))?;

        let mut tx = self.store.begin().await?;
        let order = if caller.is_admin() {
            tx.find_order(order_id)
                .await?
                .ok_or_else(|| CoreError::not_found("order"))?
        } else {
            owned_order(tx.as_mut(), order_id, caller.id).await?
        };

        if !can_transition(order.status, next) {
            return Err(CoreError::InvalidOperation("cannot skip status steps".to_string()));
        }

        tx.update_order_status(order_id, next).await?;
        let updated = tx
            .find_order(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("order"))?;
        tx.commit().await?;

        info!("Order {} moved {} -> {}", order_id, order.status, next);
        Ok(updated)
    }

    /// Removes the order together with its items.
    pub async fn delete_order(&self, order_id: &str, user_id: Uuid) -> CoreResult<()> {
        let mut tx = self.store.begin().await?;
        owned_order(tx.as_mut(), order_id, user_id).await?;
        tx.delete_order(order_id).await?;
        tx.commit().await?;

        info!("Deleted order {}", order_id);
        Ok(())
    }
}

pub(crate) async fn owned_order(
    tx: &mut dyn Transaction,
    order_id: &str,
    user_id: Uuid,
) -> CoreResult<Order> {
    match tx.find_order(order_id).await? {
        Some(order) if order.user_id == user_id => Ok(order),
        _ => Err(CoreError::not_found("order")),
    }
}
