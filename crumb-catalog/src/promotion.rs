use std::sync::Arc;

use crumb_core::{CoreError, CoreResult, NewPromotion, Promotion, Store};
use rust_decimal::Decimal;
use tracing::info;

pub struct PromotionService {
    store: Arc<dyn Store>,
}

impl PromotionService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_promotion(&self, input: NewPromotion) -> CoreResult<Promotion> {
        validate(&input)?;

        let mut tx = self.store.begin().await?;
        if tx.find_product(input.product_id).await?.is_none() {
            return Err(CoreError::not_found("product"));
        }
        let promotion = tx.insert_promotion(&input).await?;
        tx.commit().await?;

        info!(
            "Created promotion {} ({}% off product {})",
            promotion.id, promotion.discount, promotion.product_id
        );
        Ok(promotion)
    }

    pub async fn get_promotion(&self, id: i64) -> CoreResult<Promotion> {
        let mut tx = self.store.begin().await?;
        let promotion = tx.find_promotion(id).await?;
        tx.commit().await?;
        promotion.ok_or_else(|| CoreError::not_found("promotion"))
    }

    pub async fn list_promotions(&self, product_id: Option<i64>) -> CoreResult<Vec<Promotion>> {
        let mut tx = self.store.begin().await?;
        let promotions = tx.list_promotions(product_id).await?;
        tx.commit().await?;
        Ok(promotions)
    }

    pub async fn update_promotion(&self, id: i64, input: NewPromotion) -> CoreResult<Promotion> {
        validate(&input)?;

        let mut tx = self.store.begin().await?;
        if tx.find_product(input.product_id).await?.is_none() {
            return Err(CoreError::not_found("product"));
        }
        let promotion = tx
            .update_promotion(id, &input)
            .await?
            .ok_or_else(|| CoreError::not_found("promotion"))?;
        tx.commit().await?;

        info!("Updated promotion {}", id);
        Ok(promotion)
    }

    pub async fn delete_promotion(&self, id: i64) -> CoreResult<()> {
        let mut tx = self.store.begin().await?;
        if tx.delete_promotion(id).await? == 0 {
            return Err(CoreError::not_found("promotion"));
        }
        tx.commit().await?;
        Ok(())
    }
}

fn validate(input: &NewPromotion) -> CoreResult<()> {
    if input.discount < Decimal::ZERO || input.discount > Decimal::ONE_HUNDRED {
        return Err(CoreError::InvalidInput("discount must be between 0 and 100".to_string()));
    }
    if input.end_date < input.start_date {
        return Err(CoreError::InvalidInput("end_date must not precede start_date".to_string()));
    }
    Ok(())
}
