pub mod app_config;
pub mod database;
pub mod memory;
pub mod report_repo;
pub mod storage_client;

pub use app_config::Config;
pub use database::{DbClient, PgStore};
pub use memory::{MemoryObjectStorage, MemoryStore};
pub use report_repo::PgReportRepository;
pub use storage_client::SupabaseStorage;
