//! Cart and cart item types.
//!
//! A cart is the authoritative document for one user identity; its `total`
//! is derived state, recomputed on every mutation rather than trusted from
//! a stale read. All mutators on [`Cart`] maintain that invariant, so the
//! store layer only ever persists consistent documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{Color, ItemId, ProductId, Size, UserId};
use super::price::{CurrencyCode, Price};

/// Denormalized product data captured when an item is added.
///
/// Display surfaces render cart rows from this snapshot instead of
/// re-fetching the catalog, so a renamed or de-listed product still shows
/// what the shopper actually put in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub name: String,
    pub image: Option<String>,
    pub sizes: Vec<Size>,
    pub colors: Vec<Color>,
}

/// One line of a cart.
///
/// `unit_price` is a snapshot taken at add-time and never re-fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: ItemId,
    pub product_id: ProductId,
    pub snapshot: ProductSnapshot,
    pub quantity: u32,
    pub size: Size,
    pub color: Color,
    pub unit_price: Price,
}

impl CartItem {
    /// The price of this line (unit price times quantity).
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.line_total(self.quantity)
    }

    /// Whether this line is the same purchasable variant as another.
    #[must_use]
    pub fn same_variant(&self, product_id: &ProductId, size: &Size, color: &Color) -> bool {
        self.product_id == *product_id && self.size == *size && self.color == *color
    }
}

/// A user's shopping cart.
///
/// Items keep insertion order, which is also display order. The struct is
/// serialized whole as one document; there is no partial persistence.
/// There is deliberately no `Deserialize`: loading a cart goes through
/// [`Cart::from_parts`], which recomputes the total instead of trusting
/// the persisted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cart {
    id: UserId,
    items: Vec<CartItem>,
    total: Price,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Cart {
    /// Create an empty cart for a user.
    #[must_use]
    pub fn empty(id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id,
            items: Vec::new(),
            total: Price::zero(CurrencyCode::default()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a cart from persisted parts, recomputing the derived total.
    #[must_use]
    pub fn from_parts(
        id: UserId,
        items: Vec<CartItem>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let mut cart = Self {
            id,
            items,
            total: Price::zero(CurrencyCode::default()),
            created_at,
            updated_at,
        };
        cart.recompute_total();
        cart
    }

    /// The owning user identity (also the document key).
    #[must_use]
    pub const fn id(&self) -> &UserId {
        &self.id
    }

    /// The cart lines in display order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// The derived cart total.
    #[must_use]
    pub const fn total(&self) -> Price {
        self.total
    }

    /// When the cart was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the cart was last mutated.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Add a line, merging into an existing line when the same
    /// (product, size, color) variant is already present.
    ///
    /// Returns the id of the affected line.
    pub fn add_line(
        &mut self,
        product_id: impl Into<ProductId>,
        snapshot: ProductSnapshot,
        size: impl Into<Size>,
        color: impl Into<Color>,
        quantity: u32,
        unit_price: Price,
    ) -> ItemId {
        let product_id = product_id.into();
        let size = size.into();
        let color = color.into();

        let id = match self
            .items
            .iter_mut()
            .find(|item| item.same_variant(&product_id, &size, &color))
        {
            Some(item) => {
                item.quantity += quantity;
                item.id.clone()
            }
            None => {
                let id = derive_item_id(&product_id, &size, &color);
                self.items.push(CartItem {
                    id: id.clone(),
                    product_id,
                    snapshot,
                    quantity,
                    size,
                    color,
                    unit_price,
                });
                id
            }
        };

        self.touch();
        id
    }

    /// Remove a line by id. Returns whether a line was removed.
    pub fn remove_line(&mut self, item_id: &ItemId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != *item_id);
        let removed = self.items.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Set the quantity of a line. A quantity of zero removes the line.
    ///
    /// Returns whether the line existed.
    pub fn set_quantity(&mut self, item_id: &ItemId, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove_line(item_id);
        }

        match self.items.iter_mut().find(|item| item.id == *item_id) {
            Some(item) => {
                item.quantity = quantity;
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Remove every line. Idempotent.
    pub fn clear_lines(&mut self) {
        self.items.clear();
        self.touch();
    }

    /// Recompute the derived total and bump `updated_at`.
    fn touch(&mut self) {
        self.recompute_total();
        self.updated_at = Utc::now();
    }

    fn recompute_total(&mut self) {
        self.total = self
            .items
            .iter()
            .fold(Price::zero(CurrencyCode::default()), |acc, item| {
                acc.plus(&item.line_total())
            });
    }
}

/// Derive a line id from the variant plus a creation tick, so re-adding a
/// previously removed variant yields a distinct id.
fn derive_item_id(product_id: &ProductId, size: &Size, color: &Color) -> ItemId {
    ItemId::new(format!(
        "{product_id}:{size}:{color}:{}",
        Utc::now().timestamp_millis()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(name: &str) -> ProductSnapshot {
        ProductSnapshot {
            name: name.to_owned(),
            image: Some(format!("https://img.example.com/{name}.jpg")),
            sizes: vec![Size::new("S"), Size::new("M")],
            colors: vec![Color::new("navy")],
        }
    }

    fn usd(amount: rust_decimal::Decimal) -> Price {
        Price::new(amount, CurrencyCode::USD)
    }

    #[test]
    fn test_total_tracks_mutations() {
        let mut cart = Cart::empty(UserId::new("u1"));
        let first = cart.add_line("p1", snapshot("coat"), "M", "navy", 2, usd(dec!(500)));
        cart.add_line("p2", snapshot("scarf"), "M", "navy", 1, usd(dec!(300)));
        assert_eq!(cart.total().amount, dec!(1300));

        assert!(cart.remove_line(&first));
        assert_eq!(cart.total().amount, dec!(300));
    }

    #[test]
    fn test_add_merges_same_variant() {
        let mut cart = Cart::empty(UserId::new("u1"));
        let a = cart.add_line("p1", snapshot("coat"), "M", "navy", 1, usd(dec!(500)));
        let b = cart.add_line("p1", snapshot("coat"), "M", "navy", 2, usd(dec!(500)));
        assert_eq!(a, b);
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.total().amount, dec!(1500));
    }

    #[test]
    fn test_different_color_is_a_new_line() {
        let mut cart = Cart::empty(UserId::new("u1"));
        cart.add_line("p1", snapshot("coat"), "M", "navy", 1, usd(dec!(500)));
        cart.add_line("p1", snapshot("coat"), "M", "rust", 1, usd(dec!(500)));
        assert_eq!(cart.items().len(), 2);
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut cart = Cart::empty(UserId::new("u1"));
        let id = cart.add_line("p1", snapshot("coat"), "M", "navy", 2, usd(dec!(500)));
        assert!(cart.set_quantity(&id, 0));
        assert!(cart.is_empty());
        assert_eq!(cart.total().amount, dec!(0));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut cart = Cart::empty(UserId::new("u1"));
        cart.add_line("p1", snapshot("coat"), "M", "navy", 1, usd(dec!(500)));
        cart.clear_lines();
        cart.clear_lines();
        assert!(cart.is_empty());
        assert_eq!(cart.total().amount, dec!(0));
    }

    #[test]
    fn test_unknown_item_id() {
        let mut cart = Cart::empty(UserId::new("u1"));
        assert!(!cart.remove_line(&ItemId::new("missing")));
        assert!(!cart.set_quantity(&ItemId::new("missing"), 3));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use rust_decimal::Decimal;

        #[derive(Debug, Clone)]
        enum Op {
            Add { product: u8, qty: u32, cents: u32 },
            RemoveNth(usize),
            SetQuantityNth { index: usize, qty: u32 },
            Clear,
        }

        fn arb_op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0..8u8, 1..5u32, 1..100_000u32)
                    .prop_map(|(product, qty, cents)| Op::Add { product, qty, cents }),
                (0..12usize).prop_map(Op::RemoveNth),
                (0..12usize, 0..5u32)
                    .prop_map(|(index, qty)| Op::SetQuantityNth { index, qty }),
                Just(Op::Clear),
            ]
        }

        fn expected_total(cart: &Cart) -> Decimal {
            cart.items()
                .iter()
                .map(|item| item.unit_price.amount * Decimal::from(item.quantity))
                .sum()
        }

        proptest! {
            // After any mutation sequence, the derived total matches the
            // sum of line totals exactly.
            #[test]
            fn prop_total_matches_lines(ops in proptest::collection::vec(arb_op(), 1..40)) {
                let mut cart = Cart::empty(UserId::new("u1"));

                for op in ops {
                    match op {
                        Op::Add { product, qty, cents } => {
                            let price = Price::new(
                                Decimal::new(i64::from(cents), 2),
                                CurrencyCode::USD,
                            );
                            cart.add_line(
                                format!("p{product}"),
                                snapshot("item"),
                                "M",
                                "navy",
                                qty,
                                price,
                            );
                        }
                        Op::RemoveNth(index) => {
                            if let Some(item) = cart.items().get(index) {
                                let id = item.id.clone();
                                cart.remove_line(&id);
                            }
                        }
                        Op::SetQuantityNth { index, qty } => {
                            if let Some(item) = cart.items().get(index) {
                                let id = item.id.clone();
                                cart.set_quantity(&id, qty);
                            }
                        }
                        Op::Clear => cart.clear_lines(),
                    }

                    prop_assert_eq!(cart.total().amount, expected_total(&cart));
                }
            }
        }
    }
}
