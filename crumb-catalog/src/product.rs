use std::sync::Arc;

use crumb_core::repository::ProductFilter;
use crumb_core::storage::product_image_path;
use crumb_core::{
    CoreError, CoreResult, Image, NewImage, NewProduct, ObjectStorage, Product, Store,
    Transaction,
};
use tracing::{info, warn};

/// Upper bound on image slots per product.
pub const MAX_IMAGES: i32 = 20;

/// A freshly created image row plus the signed URL the client uploads to.
#[derive(Debug, Clone)]
pub struct ImageSlot {
    pub image: Image,
    pub upload_url: String,
}

/// Product catalog management, including the image upload targets that hang
/// off each product.
pub struct CatalogService {
    store: Arc<dyn Store>,
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, storage: Arc<dyn ObjectStorage>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            storage,
            bucket: bucket.into(),
        }
    }

    /// Create a product and, when `images_amount > 0`, that many image rows
    /// with upload targets. Nothing is persisted if any upload URL fails.
    pub async fn create_product(
        &self,
        input: NewProduct,
        images_amount: i32,
    ) -> CoreResult<(Product, Vec<ImageSlot>)> {
        validate_product(&input)?;
        validate_amount(images_amount)?;

        let mut tx = self.store.begin().await?;
        let mut product = tx.insert_product(&input).await?;
        let slots = self.create_slots(tx.as_mut(), product.id, images_amount).await?;
        tx.commit().await?;

        product.images = slots.iter().map(|s| s.image.clone()).collect();
        info!("Created product {} ({}) with {} image slots", product.id, product.name, slots.len());
        Ok((product, slots))
    }

    pub async fn get_product(&self, id: i64) -> CoreResult<Product> {
        let mut tx = self.store.begin().await?;
        let product = tx.find_product(id).await?;
        tx.commit().await?;
        product.ok_or_else(|| CoreError::not_found("product"))
    }

    pub async fn list_products(&self, filter: &ProductFilter) -> CoreResult<Vec<Product>> {
        let mut tx = self.store.begin().await?;
        let products = tx.list_products(filter).await?;
        tx.commit().await?;
        Ok(products)
    }

    /// Full replace of the scalar fields.
    pub async fn update_product(&self, id: i64, input: NewProduct) -> CoreResult<Product> {
        validate_product(&input)?;

        let mut tx = self.store.begin().await?;
        let product = tx
            .update_product(id, &input)
            .await?
            .ok_or_else(|| CoreError::not_found("product"))?;
        tx.commit().await?;

        info!("Updated product {}", id);
        Ok(product)
    }

    /// Delete the product and everything it owns. Image files are removed from
    /// storage after the rows are gone; a storage failure there is only logged.
    pub async fn delete_product(&self, id: i64) -> CoreResult<()> {
        let mut tx = self.store.begin().await?;
        let images = tx.list_images(id).await?;
        if tx.delete_product(id).await? == 0 {
            return Err(CoreError::not_found("product"));
        }
        tx.commit().await?;

        for image in images {
            if let Err(e) = self.storage.remove_file(&self.bucket, &image.file_path).await {
                warn!("Failed to remove {} for deleted product {}: {}", image.file_path, id, e);
            }
        }

        info!("Deleted product {}", id);
        Ok(())
    }

    /// Images ordered by position. Rows missing a public URL get one filled in.
    pub async fn list_images(&self, product_id: i64) -> CoreResult<Vec<Image>> {
        let mut tx = self.store.begin().await?;
        if tx.find_product(product_id).await?.is_none() {
            return Err(CoreError::not_found("product"));
        }

        let mut images = tx.list_images(product_id).await?;
        for image in images.iter_mut().filter(|i| i.public_url.is_none()) {
            let url = self.storage.public_url(&self.bucket, &image.file_path);
            tx.set_image_public_url(image.id, &url).await?;
            image.public_url = Some(url);
        }
        tx.commit().await?;

        Ok(images)
    }

    /// Drop every image row of the product and issue `amount` new slots.
    pub async fn replace_images(&self, product_id: i64, amount: i32) -> CoreResult<Vec<ImageSlot>> {
        validate_amount(amount)?;

        let mut tx = self.store.begin().await?;
        if tx.find_product(product_id).await?.is_none() {
            return Err(CoreError::not_found("product"));
        }

        let old = tx.list_images(product_id).await?;
        tx.delete_images(product_id, None).await?;
        let slots = self.create_slots(tx.as_mut(), product_id, amount).await?;
        tx.commit().await?;

        // New slots reuse paths 1..=amount; anything beyond is orphaned.
        for image in old.iter().filter(|i| i.position > amount) {
            if let Err(e) = self.storage.remove_file(&self.bucket, &image.file_path).await {
                warn!("Failed to remove stale image {}: {}", image.file_path, e);
            }
        }

        Ok(slots)
    }

    /// Remove the images at `positions` from storage, then from the catalog.
    pub async fn delete_images(&self, product_id: i64, positions: &[i32]) -> CoreResult<u64> {
        if positions.is_empty() {
            return Err(CoreError::InvalidInput("no image positions provided".to_string()));
        }

        let mut tx = self.store.begin().await?;
        let targets: Vec<Image> = tx
            .list_images(product_id)
            .await?
            .into_iter()
            .filter(|i| positions.contains(&i.position))
            .collect();

        if targets.is_empty() {
            return Err(CoreError::NotFound("no images found".to_string()));
        }

        for image in &targets {
            self.storage.remove_file(&self.bucket, &image.file_path).await?;
        }

        let removed = tx.delete_images(product_id, Some(positions)).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn create_slots(
        &self,
        tx: &mut dyn Transaction,
        product_id: i64,
        amount: i32,
    ) -> CoreResult<Vec<ImageSlot>> {
        let mut slots = Vec::with_capacity(amount.max(0) as usize);
        for position in 1..=amount {
            let path = product_image_path(product_id, position);
            let target = self.storage.generate_upload_url(&self.bucket, &path).await?;
            let image = tx
                .insert_image(
                    product_id,
                    &NewImage {
                        file_path: path,
                        public_url: Some(target.public_url),
                        position,
                    },
                )
                .await?;
            slots.push(ImageSlot {
                image,
                upload_url: target.upload_url,
            });
        }
        Ok(slots)
    }
}

fn validate_product(input: &NewProduct) -> CoreResult<()> {
    if input.name.trim().is_empty() {
        return Err(CoreError::InvalidInput("name is required".to_string()));
    }
    if input.price.is_sign_negative() {
        return Err(CoreError::InvalidInput("price must not be negative".to_string()));
    }
    if input.stock < 0 {
        return Err(CoreError::InvalidInput("stock must not be negative".to_string()));
    }
    Ok(())
}

fn validate_amount(amount: i32) -> CoreResult<()> {
    if amount < 0 {
        return Err(CoreError::InvalidInput("image amount must not be negative".to_string()));
    }
    if amount > MAX_IMAGES {
        return Err(CoreError::InvalidInput(format!(
            "image amount must be at most {}",
            MAX_IMAGES
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crumb_core::storage::MockObjectStorage;
    use crumb_core::StorageError;
    use crumb_store::memory::{MemoryObjectStorage, MemoryStore};
    use rust_decimal::Decimal;

    fn bread(name: &str) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            description: "Country loaf".to_string(),
            tag: "bread".to_string(),
            price: Decimal::from(120),
            stock: 8,
            is_active: true,
        }
    }

    fn service() -> (CatalogService, Arc<MemoryObjectStorage>) {
        let storage = Arc::new(MemoryObjectStorage::new("https://cdn.test"));
        let svc = CatalogService::new(Arc::new(MemoryStore::new()), storage.clone(), "product-images");
        (svc, storage)
    }

    #[tokio::test]
    async fn test_create_product_issues_image_slots() {
        let (svc, _) = service();
        let (product, slots) = svc.create_product(bread("Sourdough"), 2).await.unwrap();

        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].image.file_path, format!("products/{}/1.png", product.id));
        assert_eq!(slots[1].image.position, 2);
        assert!(slots[0].upload_url.contains("sign"));

        let fetched = svc.get_product(product.id).await.unwrap();
        assert_eq!(fetched.images.len(), 2);
    }

    #[tokio::test]
    async fn test_create_product_rolls_back_on_storage_failure() {
        let store = Arc::new(MemoryStore::new());
        let mut storage = MockObjectStorage::new();
        storage
            .expect_generate_upload_url()
            .returning(|_, _| Err(StorageError::Request("bucket offline".to_string())));
        let svc = CatalogService::new(store, Arc::new(storage), "product-images");

        let err = svc.create_product(bread("Baguette"), 1).await.unwrap_err();
        assert!(matches!(err, CoreError::Unavailable(_)));

        let listed = svc.list_products(&ProductFilter::default()).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_image_amount_is_capped() {
        let (svc, storage) = service();
        assert!(matches!(
            svc.create_product(bread("Focaccia"), MAX_IMAGES + 1).await,
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            svc.create_product(bread("Focaccia"), i32::MAX).await,
            Err(CoreError::InvalidInput(_))
        ));
        assert!(storage.issued().is_empty());

        let (product, slots) = svc.create_product(bread("Focaccia"), MAX_IMAGES).await.unwrap();
        assert_eq!(slots.len(), MAX_IMAGES as usize);
        assert!(matches!(
            svc.replace_images(product.id, MAX_IMAGES + 1).await,
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let (svc, _) = service();
        svc.create_product(bread("Rye"), 0).await.unwrap();
        let err = svc.create_product(bread("Rye"), 0).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_rejects_negative_price() {
        let (svc, _) = service();
        let mut input = bread("Brioche");
        input.price = Decimal::from(-1);
        assert!(matches!(
            svc.create_product(input, 0).await,
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_update_missing_product_is_not_found() {
        let (svc, _) = service();
        assert!(matches!(
            svc.update_product(999, bread("Ghost")).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_product_removes_files() {
        let (svc, storage) = service();
        let (product, _) = svc.create_product(bread("Focaccia"), 2).await.unwrap();

        svc.delete_product(product.id).await.unwrap();

        assert!(matches!(svc.get_product(product.id).await, Err(CoreError::NotFound(_))));
        assert_eq!(storage.removed().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_images_by_position() {
        let (svc, storage) = service();
        let (product, _) = svc.create_product(bread("Ciabatta"), 3).await.unwrap();

        let removed = svc.delete_images(product.id, &[1, 3]).await.unwrap();
        assert_eq!(removed, 2);

        let images = svc.list_images(product.id).await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].position, 2);
        assert_eq!(storage.removed().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_images_validation() {
        let (svc, _) = service();
        let (product, _) = svc.create_product(bread("Pretzel"), 1).await.unwrap();

        assert!(matches!(
            svc.delete_images(product.id, &[]).await,
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            svc.delete_images(product.id, &[7]).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_replace_images_resets_slots() {
        let (svc, storage) = service();
        let (product, _) = svc.create_product(bread("Challah"), 3).await.unwrap();

        let slots = svc.replace_images(product.id, 1).await.unwrap();
        assert_eq!(slots.len(), 1);

        let images = svc.list_images(product.id).await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].position, 1);
        // positions 2 and 3 are no longer referenced
        assert_eq!(storage.removed().len(), 2);
    }
}
