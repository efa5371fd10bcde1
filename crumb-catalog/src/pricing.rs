use crumb_core::{Product, Promotion};
use rust_decimal::Decimal;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Largest discount among active promotions, or zero.
///
/// Only `is_active` gates a promotion; its start/end window is not consulted.
pub fn max_active_discount(promotions: &[Promotion]) -> Decimal {
    promotions
        .iter()
        .filter(|p| p.is_active)
        .map(|p| p.discount)
        .fold(Decimal::ZERO, Decimal::max)
        .min(HUNDRED)
}

/// Effective unit price: `price - price * (max_active_discount / 100)`.
pub fn final_price(product: &Product) -> Decimal {
    discounted(product.price, max_active_discount(&product.promotions))
}

pub fn discounted(price: Decimal, discount: Decimal) -> Decimal {
    price - price * (discount / HUNDRED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn promotion(discount: i64, is_active: bool) -> Promotion {
        let now = Utc::now();
        Promotion {
            id: 1,
            product_id: 1,
            name: "promo".to_string(),
            description: String::new(),
            discount: Decimal::from(discount),
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(1),
            is_active,
            created_at: now,
            updated_at: now,
        }
    }

    fn product(price: Decimal, promotions: Vec<Promotion>) -> Product {
        let now = Utc::now();
        Product {
            id: 1,
            name: "Sourdough".to_string(),
            description: String::new(),
            tag: "bread".to_string(),
            price,
            stock: 10,
            is_active: true,
            images: vec![],
            promotions,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_no_promotion_keeps_base_price() {
        let p = product(Decimal::from(50), vec![]);
        assert_eq!(final_price(&p), Decimal::from(50));
    }

    #[test]
    fn test_largest_active_discount_wins() {
        let p = product(
            Decimal::from(100),
            vec![promotion(10, true), promotion(20, true), promotion(50, false)],
        );
        assert_eq!(max_active_discount(&p.promotions), Decimal::from(20));
        assert_eq!(final_price(&p), Decimal::from(80));
    }

    #[test]
    fn test_expired_window_still_applies_while_active() {
        let mut promo = promotion(25, true);
        promo.end_date = Utc::now() - Duration::days(7);
        let p = product(Decimal::from(40), vec![promo]);
        assert_eq!(final_price(&p), Decimal::from(30));
    }

    #[test]
    fn test_fractional_discount_is_exact() {
        // 12.5% off 9.99
        let promo = Promotion {
            discount: Decimal::new(125, 1),
            ..promotion(0, true)
        };
        let p = product(Decimal::new(999, 2), vec![promo]);
        assert_eq!(final_price(&p), Decimal::new(874125, 5));
    }

    #[test]
    fn test_final_price_never_exceeds_price() {
        for discount in [0, 1, 33, 99, 100, 150] {
            let p = product(Decimal::new(1234, 2), vec![promotion(discount, true)]);
            let price = final_price(&p);
            assert!(price <= p.price);
            assert!(price >= Decimal::ZERO);
        }
    }

    #[test]
    fn test_input_is_not_mutated() {
        let p = product(Decimal::from(100), vec![promotion(20, true)]);
        let before = p.price;
        let _ = final_price(&p);
        assert_eq!(p.price, before);
        assert_eq!(p.promotions.len(), 1);
    }
}
