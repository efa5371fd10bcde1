pub mod identity;
pub mod models;
pub mod repository;
pub mod report;
pub mod storage;

pub use identity::{AuthUser, Role};
pub use models::{
    Cart, CartItem, Image, NewImage, NewOrder, NewOrderItem, NewProduct, NewPromotion, NewUser,
    Order, OrderItem, OrderStatus, Product, Promotion, User,
};
pub use repository::{ProductFilter, ReportRepository, Store, StoreError, Transaction};
pub use storage::{ObjectStorage, StorageError, UploadTarget};

/// Failure taxonomy shared by every service crate.
///
/// The HTTP boundary maps each variant onto a status code; services never
/// deal in status codes themselves.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidOperation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn not_found(what: &str) -> Self {
        CoreError::NotFound(format!("{} not found", what))
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(msg) => CoreError::Conflict(msg),
            StoreError::Backend(msg) => CoreError::Unavailable(msg),
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        CoreError::Unavailable(err.to_string())
    }
}
