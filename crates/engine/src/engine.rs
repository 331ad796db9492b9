//! Engine facade shared across UI handlers.
//!
//! Bundles the five components behind the operations the display layer
//! consumes. Everything is constructor-injected; tests build a fresh
//! engine over an in-memory store and mirror.

use std::sync::Arc;

use driftwood_core::{
    Cart, Color, ItemId, OrderId, Price, ProductId, ProductSnapshot, ShippingInfo, Size, UserId,
};

use crate::availability::{AvailabilityCache, SizeLevels};
use crate::cart::{CartError, CartStore};
use crate::checkout::{CheckoutCoordinator, CheckoutError};
use crate::config::EngineConfig;
use crate::ledger::{LedgerError, StockLedger};
use crate::mirror::CartMirror;
use crate::store::DocumentStore;

/// The inventory-and-cart consistency engine.
///
/// Cheaply cloneable via `Arc`; one instance per process.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    store: Arc<dyn DocumentStore>,
    mirror: Arc<dyn CartMirror>,
    ledger: Arc<StockLedger>,
    availability: AvailabilityCache,
    checkout: Arc<CheckoutCoordinator>,
}

impl Engine {
    /// Create an engine over a document store and cart mirror.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn DocumentStore>,
        mirror: Arc<dyn CartMirror>,
    ) -> Self {
        let ledger = Arc::new(StockLedger::new(store.clone(), &config));
        let availability = AvailabilityCache::new(ledger.clone());
        let checkout = Arc::new(CheckoutCoordinator::new(
            ledger.clone(),
            store.clone(),
            &config,
        ));

        Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                mirror,
                ledger,
                availability,
                checkout,
            }),
        }
    }

    /// Get a reference to the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Get a reference to the stock ledger (the admin write surface).
    #[must_use]
    pub fn ledger(&self) -> &StockLedger {
        &self.inner.ledger
    }

    /// Per-size availability for a product, served from the process-local
    /// cache. Display only; checkout re-reads authoritative stock.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the first fetch for the product fails.
    pub async fn get_availability(
        &self,
        product_id: &ProductId,
    ) -> Result<Arc<SizeLevels>, LedgerError> {
        self.inner.availability.get(product_id).await
    }

    /// Whether any size of a product is orderable.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the first fetch for the product fails.
    pub async fn any_in_stock(&self, product_id: &ProductId) -> Result<bool, LedgerError> {
        self.inner.availability.any_in_stock(product_id).await
    }

    /// Start a cart session for an authenticated user, running the
    /// session-start reconciliation.
    pub async fn start_session(&self, user_id: UserId) -> CartSession {
        let cart = CartStore::load(
            self.inner.store.clone(),
            self.inner.mirror.clone(),
            &self.inner.config,
            user_id,
        )
        .await;

        CartSession {
            cart: Arc::new(cart),
            checkout: self.inner.checkout.clone(),
        }
    }
}

/// One user's cart session: the operations the UI layer consumes.
#[derive(Clone)]
pub struct CartSession {
    cart: Arc<CartStore>,
    checkout: Arc<CheckoutCoordinator>,
}

impl CartSession {
    /// Add units of a product variant to the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Validation` for a zero quantity.
    pub async fn add_to_cart(
        &self,
        product_id: ProductId,
        snapshot: ProductSnapshot,
        size: Size,
        color: Color,
        quantity: u32,
        unit_price: Price,
    ) -> Result<ItemId, CartError> {
        self.cart
            .add(product_id, snapshot, size, color, quantity, unit_price)
            .await
    }

    /// Remove a cart line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` for an unknown line id.
    pub async fn remove_from_cart(&self, item_id: &ItemId) -> Result<(), CartError> {
        self.cart.remove(item_id).await
    }

    /// Set a line's quantity; zero or less removes the line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` for an unknown line id.
    pub async fn update_quantity(&self, item_id: &ItemId, quantity: i64) -> Result<(), CartError> {
        self.cart.update_quantity(item_id, quantity).await
    }

    /// Empty the cart. Idempotent.
    pub async fn clear_cart(&self) {
        self.cart.clear().await;
    }

    /// Place an order for the cart's contents.
    ///
    /// # Errors
    ///
    /// See [`CheckoutError`].
    pub async fn place_order(&self, shipping: ShippingInfo) -> Result<OrderId, CheckoutError> {
        self.checkout.place_order(&self.cart, shipping).await
    }

    /// A point-in-time copy of the cart for display.
    pub async fn cart(&self) -> Cart {
        self.cart.snapshot().await
    }

    /// Whether the session is operating against the local mirror.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.cart.is_degraded()
    }
}
