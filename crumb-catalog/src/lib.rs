pub mod pricing;
pub mod product;
pub mod promotion;

pub use pricing::{final_price, max_active_discount};
pub use product::{CatalogService, ImageSlot};
pub use promotion::PromotionService;
