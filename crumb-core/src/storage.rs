use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

pub const SLIP_FILE_NAME: &str = "slip.png";

/// A direct-upload destination issued by the storage service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadTarget {
    /// Time-limited URL the client uploads to.
    pub upload_url: String,
    /// Where the object will be readable once uploaded.
    pub public_url: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    Request(String),
    #[error("unexpected storage response: {0}")]
    UnexpectedResponse(String),
}

/// Bucket-based blob store. Files never pass through this service; clients
/// upload directly to the signed URL.
#[automock]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn generate_upload_url(
        &self,
        bucket: &str,
        path: &str,
    ) -> Result<UploadTarget, StorageError>;

    fn public_url(&self, bucket: &str, path: &str) -> String;

    async fn remove_file(&self, bucket: &str, path: &str) -> Result<(), StorageError>;
}

/// `orders/{order_id}/slip.png`
pub fn slip_path(order_id: &str) -> String {
    format!("orders/{}/{}", order_id, SLIP_FILE_NAME)
}

/// `products/{product_id}/{position}.png`
pub fn product_image_path(product_id: i64, position: i32) -> String {
    format!("products/{}/{}.png", product_id, position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_namespaced() {
        assert_eq!(slip_path("ORD-AB12"), "orders/ORD-AB12/slip.png");
        assert_eq!(product_image_path(42, 3), "products/42/3.png");
    }
}
