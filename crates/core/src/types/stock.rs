//! Stock rows and the checkout decrement request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cart::Cart;
use super::id::{ProductId, Size};

/// The composite key addressing one stock row.
///
/// The persisted key is the exact concatenation `{productId}_{size}`. This
/// format is shared with pre-existing data and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub size: Size,
}

impl StockKey {
    /// Create a key for a (product, size) pair.
    pub fn new(product_id: impl Into<ProductId>, size: impl Into<Size>) -> Self {
        Self {
            product_id: product_id.into(),
            size: size.into(),
        }
    }

    /// The document key this row is stored under.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{}_{}", self.product_id, self.size)
    }

    /// The key prefix shared by every size of one product.
    #[must_use]
    pub fn storage_prefix(product_id: &ProductId) -> String {
        format!("{product_id}_")
    }
}

impl std::fmt::Display for StockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.product_id, self.size)
    }
}

/// The persisted record of available quantity for one (product, size) pair.
///
/// `stock` is unsigned: a negative level is unrepresentable, and the ledger
/// enforces non-negativity inside the decrement transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRow {
    pub product_id: ProductId,
    pub size: Size,
    pub stock: u32,
    pub updated_at: DateTime<Utc>,
}

impl StockRow {
    /// The key this row is addressed by.
    #[must_use]
    pub fn key(&self) -> StockKey {
        StockKey {
            product_id: self.product_id.clone(),
            size: self.size.clone(),
        }
    }
}

/// One line of a [`DecrementRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecrementLine {
    pub product_id: ProductId,
    pub size: Size,
    pub quantity: u32,
}

impl DecrementLine {
    /// The stock row this line draws from.
    #[must_use]
    pub fn key(&self) -> StockKey {
        StockKey {
            product_id: self.product_id.clone(),
            size: self.size.clone(),
        }
    }
}

/// The set of (product, size, quantity) lines submitted together as one
/// atomic checkout operation. Ephemeral - never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecrementRequest {
    lines: Vec<DecrementLine>,
}

impl DecrementRequest {
    /// Build a request from a cart, grouping lines by (product, size) and
    /// summing quantities when the same variant appears in multiple cart
    /// rows (e.g., the same shirt in two colors).
    ///
    /// Line order follows first appearance in the cart.
    #[must_use]
    pub fn from_cart(cart: &Cart) -> Self {
        let mut lines: Vec<DecrementLine> = Vec::new();

        for item in cart.items() {
            match lines
                .iter_mut()
                .find(|l| l.product_id == item.product_id && l.size == item.size)
            {
                Some(line) => line.quantity += item.quantity,
                None => lines.push(DecrementLine {
                    product_id: item.product_id.clone(),
                    size: item.size.clone(),
                    quantity: item.quantity,
                }),
            }
        }

        Self { lines }
    }

    /// The grouped lines.
    #[must_use]
    pub fn lines(&self) -> &[DecrementLine] {
        &self.lines
    }

    /// Whether the request has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl From<Vec<DecrementLine>> for DecrementRequest {
    fn from(lines: Vec<DecrementLine>) -> Self {
        Self { lines }
    }
}
