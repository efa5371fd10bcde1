use std::sync::Arc;

use crumb_core::storage::slip_path;
use crumb_core::{CoreResult, ObjectStorage, Store, UploadTarget};
use tracing::debug;
use uuid::Uuid;

use crate::manager::owned_order;

/// Issues direct-upload targets for payment slips. The file itself never
/// passes through this service.
pub struct SlipCoordinator {
    store: Arc<dyn Store>,
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
}

impl SlipCoordinator {
    pub fn new(store: Arc<dyn Store>, storage: Arc<dyn ObjectStorage>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            storage,
            bucket: bucket.into(),
        }
    }

    /// A fresh signed upload URL for the caller's order. Records the public
    /// URL on the order if it has none yet.
    pub async fn issue_upload_target(&self, order_id: &str, user_id: Uuid) -> CoreResult<UploadTarget> {
        let mut tx = self.store.begin().await?;
        let order = owned_order(tx.as_mut(), order_id, user_id).await?;

        let target = self
            .storage
            .generate_upload_url(&self.bucket, &slip_path(order_id))
            .await?;
        if order.slip_url.is_none() {
            tx.set_order_slip(order_id, &target.public_url).await?;
        }
        tx.commit().await?;

        debug!("Issued slip upload target for order {}", order_id);
        Ok(target)
    }

    /// Where the slip of `order_id` is readable. No I/O.
    pub fn slip_url(&self, order_id: &str) -> String {
        self.storage.public_url(&self.bucket, &slip_path(order_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CartStore;
    use crate::checkout::{CheckoutOrchestrator, SlipPolicy};
    use crate::test_support::{Fixture, SLIP_BUCKET};
    use crumb_core::CoreError;

    #[tokio::test]
    async fn test_issue_for_own_order() {
        let fx = Fixture::new();
        let user = fx.user("ann").await;
        let bun = fx.product("Bun", 30).await;
        CartStore::new(fx.store.clone())
            .set_item_quantity(user, bun, 1)
            .await
            .unwrap();
        let summary = CheckoutOrchestrator::new(
            fx.store.clone(),
            fx.storage.clone(),
            SLIP_BUCKET,
            SlipPolicy::Optional,
        )
        .checkout(user)
        .await
        .unwrap();

        let slips = SlipCoordinator::new(fx.store.clone(), fx.storage.clone(), SLIP_BUCKET);
        let target = slips.issue_upload_target(&summary.order_id, user).await.unwrap();

        assert_eq!(target.public_url, slips.slip_url(&summary.order_id));
        assert!(target.upload_url.contains("/object/upload/sign/order-slips/orders/"));

        let other = fx.user("bob").await;
        assert!(matches!(
            slips.issue_upload_target(&summary.order_id, other).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces() {
        let fx = Fixture::new();
        let user = fx.user("ann").await;
        let bun = fx.product("Bun", 30).await;
        CartStore::new(fx.store.clone())
            .set_item_quantity(user, bun, 1)
            .await
            .unwrap();
        let summary = CheckoutOrchestrator::new(
            fx.store.clone(),
            fx.storage.clone(),
            SLIP_BUCKET,
            SlipPolicy::Required,
        )
        .checkout(user)
        .await
        .unwrap();

        fx.storage.set_failing(true);
        let slips = SlipCoordinator::new(fx.store.clone(), fx.storage.clone(), SLIP_BUCKET);
        assert!(matches!(
            slips.issue_upload_target(&summary.order_id, user).await,
            Err(CoreError::Unavailable(_))
        ));
    }
}
