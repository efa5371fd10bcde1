use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::Role;

/// A storefront account. Owns at most one cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// Catalog entry. `images` and `promotions` are loaded alongside the row
/// wherever a price has to be computed or the product rendered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub tag: String,
    pub price: Decimal,
    pub stock: i32,
    pub is_active: bool,
    pub images: Vec<Image>,
    pub promotions: Vec<Promotion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Scalar fields of a product, used for both create and full update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub tag: String,
    pub price: Decimal,
    pub stock: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Image {
    pub id: i64,
    pub product_id: i64,
    pub file_path: String,
    pub public_url: Option<String>,
    pub position: i32,
}

#[derive(Debug, Clone)]
pub struct NewImage {
    pub file_path: String,
    pub public_url: Option<String>,
    pub position: i32,
}

/// Percentage discount attached to exactly one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    pub id: i64,
    pub product_id: i64,
    pub name: String,
    pub description: String,
    /// 0..=100
    pub discount: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPromotion {
    pub product_id: i64,
    pub name: String,
    pub description: String,
    pub discount: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
}

/// The mutable pre-checkout basket. One per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: i64,
    pub user_id: Uuid,
    pub items: Vec<CartItem>,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A cart line. Never persisted with a quantity below 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub cart_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub product: Product,
}

/// Order status in the lifecycle, in transition order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipping,
    Delivered,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Shipping,
        OrderStatus::Delivered,
    ];

    /// Position in the lifecycle sequence.
    pub fn position(self) -> usize {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Confirmed => 1,
            OrderStatus::Shipping => 2,
            OrderStatus::Delivered => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipping => "shipping",
            OrderStatus::Delivered => "delivered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A checked-out purchase. `total` and every item price are frozen at
/// checkout; only `status` and `slip_url` change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: Uuid,
    pub total: Decimal,
    pub status: OrderStatus,
    pub slip_url: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Price snapshot of one product inside an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub order_id: String,
    pub product_id: i64,
    pub quantity: i32,
    pub price: Decimal,
    pub product_name: String,
    pub product_description: String,
    pub product_tag: String,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: String,
    pub user_id: Uuid,
    pub total: Decimal,
    pub status: OrderStatus,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub quantity: i32,
    pub price: Decimal,
    pub product_name: String,
    pub product_description: String,
    pub product_tag: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_positions_follow_lifecycle() {
        let positions: Vec<usize> = OrderStatus::ALL.iter().map(|s| s.position()).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(OrderStatus::parse("shipping"), Some(OrderStatus::Shipping));
        assert_eq!(OrderStatus::parse("Shipping"), None);
        assert_eq!(OrderStatus::parse("cancelled"), None);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&OrderStatus::Delivered).unwrap();
        assert_eq!(json, "\"delivered\"");
    }

    #[test]
    fn test_line_total() {
        let item = OrderItem {
            order_id: "ORD-1".to_string(),
            product_id: 1,
            quantity: 3,
            price: Decimal::new(1250, 2),
            product_name: "Croissant".to_string(),
            product_description: String::new(),
            product_tag: "pastry".to_string(),
        };
        assert_eq!(item.line_total(), Decimal::new(3750, 2));
    }
}
