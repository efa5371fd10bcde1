use std::sync::Arc;

use crumb_catalog::{CatalogService, PromotionService};
use crumb_core::{ObjectStorage, ReportRepository, Store};
use crumb_order::{CartStore, CheckoutOrchestrator, OrderManager, SlipCoordinator, SlipPolicy};
use crumb_store::app_config::StorageConfig;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub reports: Arc<dyn ReportRepository>,
    pub catalog: Arc<CatalogService>,
    pub promotions: Arc<PromotionService>,
    pub carts: Arc<CartStore>,
    pub checkout: Arc<CheckoutOrchestrator>,
    pub orders: Arc<OrderManager>,
    pub slips: Arc<SlipCoordinator>,
    pub auth: AuthConfig,
}

impl AppState {
    /// Wire every service onto the given persistence and storage backends.
    pub fn new(
        store: Arc<dyn Store>,
        reports: Arc<dyn ReportRepository>,
        storage: Arc<dyn ObjectStorage>,
        storage_config: &StorageConfig,
        auth: AuthConfig,
    ) -> Self {
        let policy = if storage_config.require_slip_url {
            SlipPolicy::Required
        } else {
            SlipPolicy::Optional
        };

        Self {
            catalog: Arc::new(CatalogService::new(
                store.clone(),
                storage.clone(),
                storage_config.product_bucket.clone(),
            )),
            promotions: Arc::new(PromotionService::new(store.clone())),
            carts: Arc::new(CartStore::new(store.clone())),
            checkout: Arc::new(CheckoutOrchestrator::new(
                store.clone(),
                storage.clone(),
                storage_config.slip_bucket.clone(),
                policy,
            )),
            orders: Arc::new(OrderManager::new(store.clone())),
            slips: Arc::new(SlipCoordinator::new(
                store.clone(),
                storage,
                storage_config.slip_bucket.clone(),
            )),
            store,
            reports,
            auth,
        }
    }
}
