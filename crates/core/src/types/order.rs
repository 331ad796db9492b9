//! Order snapshot types.
//!
//! An order is created only after the checkout decrement fully succeeds.
//! It holds an immutable copy of the cart lines - not live references -
//! so later cart mutations cannot rewrite purchase history. Only the
//! status and tracking fields change after creation, and those belong to
//! the fulfillment collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cart::CartItem;
use super::email::Email;
use super::id::{OrderId, UserId};
use super::price::Price;

/// Order fulfillment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Placed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

/// Shipping target and contact details for an order.
///
/// The engine checks these for presence only; address verification is a
/// collaborator concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub recipient: String,
    pub address1: String,
    pub address2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub email: Email,
    pub phone: Option<String>,
}

impl ShippingInfo {
    /// The first required field that is blank, if any.
    #[must_use]
    pub fn missing_field(&self) -> Option<&'static str> {
        let required = [
            ("recipient", &self.recipient),
            ("address1", &self.address1),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ];
        required
            .into_iter()
            .find(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<CartItem>,
    pub shipping: ShippingInfo,
    pub total: Price,
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub placed_at: DateTime<Utc>,
}
