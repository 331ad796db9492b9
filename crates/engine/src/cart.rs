//! The session cart store.
//!
//! Owns the authoritative cart document for one user, with a local mirror
//! as write-through shadow. Mutations are serialized by an internal async
//! mutex held across the save, so the in-memory total recomputation and
//! the dual write can never interleave between two callers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

use driftwood_core::{Cart, Color, ItemId, Price, ProductId, ProductSnapshot, Size, UserId};

use crate::config::EngineConfig;
use crate::mirror::CartMirror;
use crate::reconcile::CartReconciler;
use crate::store::{DocumentStore, collections, conversions, with_timeout};

/// Errors surfaced by cart mutations.
///
/// Persistence failures are deliberately absent: a save that cannot reach
/// the remote store degrades to the mirror instead of failing the user's
/// action.
#[derive(Debug, Clone, Error)]
pub enum CartError {
    /// Malformed input, e.g. adding zero units.
    #[error("invalid cart operation: {0}")]
    Validation(String),

    /// The referenced cart line does not exist.
    #[error("no cart line with id {0}")]
    ItemNotFound(ItemId),
}

/// The authoritative cart for one user session.
pub struct CartStore {
    store: Arc<dyn DocumentStore>,
    mirror: Arc<dyn CartMirror>,
    timeout: Duration,
    state: Mutex<Cart>,
    degraded: AtomicBool,
}

impl CartStore {
    /// Load the session cart for a user.
    ///
    /// Runs session-start reconciliation: the remote document wins when it
    /// exists; an absent remote is seeded from the local mirror and pushed
    /// back; an unreachable remote serves the mirror (or an empty cart)
    /// and marks the session degraded.
    #[instrument(skip(store, mirror, config), fields(user_id = %user_id))]
    pub async fn load(
        store: Arc<dyn DocumentStore>,
        mirror: Arc<dyn CartMirror>,
        config: &EngineConfig,
        user_id: UserId,
    ) -> Self {
        let reconciler = CartReconciler::new(store.clone(), mirror.clone(), config);
        let outcome = reconciler.reconcile(&user_id).await;

        // Keep the mirror a shadow of whatever the session starts from.
        if let Err(err) = mirror.store(&outcome.cart).await {
            warn!(error = %err, "could not refresh cart mirror at load");
        }

        Self {
            store,
            mirror,
            timeout: config.store_timeout,
            state: Mutex::new(outcome.cart),
            degraded: AtomicBool::new(outcome.degraded),
        }
    }

    /// Whether the session is operating against the local mirror because
    /// the remote store could not be reached.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// A point-in-time copy of the cart for display.
    pub async fn snapshot(&self) -> Cart {
        self.state.lock().await.clone()
    }

    /// Add units of a product variant, merging into an existing line when
    /// the same (product, size, color) is already in the cart. The unit
    /// price is snapshotted now and never re-fetched.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Validation` for a zero quantity.
    #[instrument(skip(self, snapshot, unit_price), fields(product_id = %product_id, size = %size))]
    pub async fn add(
        &self,
        product_id: ProductId,
        snapshot: ProductSnapshot,
        size: Size,
        color: Color,
        quantity: u32,
        unit_price: Price,
    ) -> Result<ItemId, CartError> {
        if quantity == 0 {
            return Err(CartError::Validation(
                "quantity must be at least 1".to_owned(),
            ));
        }

        let mut cart = self.state.lock().await;
        let id = cart.add_line(product_id, snapshot, size, color, quantity, unit_price);
        self.save(&cart).await;
        Ok(id)
    }

    /// Remove a cart line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` for an unknown line id.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn remove(&self, item_id: &ItemId) -> Result<(), CartError> {
        let mut cart = self.state.lock().await;
        if !cart.remove_line(item_id) {
            return Err(CartError::ItemNotFound(item_id.clone()));
        }
        self.save(&cart).await;
        Ok(())
    }

    /// Set a line's quantity. A quantity of zero or less removes the line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` for an unknown line id.
    #[instrument(skip(self), fields(item_id = %item_id, quantity))]
    pub async fn update_quantity(&self, item_id: &ItemId, quantity: i64) -> Result<(), CartError> {
        let mut cart = self.state.lock().await;
        let clamped = u32::try_from(quantity.max(0)).unwrap_or(u32::MAX);
        if !cart.set_quantity(item_id, clamped) {
            return Err(CartError::ItemNotFound(item_id.clone()));
        }
        self.save(&cart).await;
        Ok(())
    }

    /// Empty the cart. Idempotent.
    #[instrument(skip(self))]
    pub async fn clear(&self) {
        let mut cart = self.state.lock().await;
        cart.clear_lines();
        self.save(&cart).await;
    }

    /// Write-through save: remote first, then the mirror unconditionally.
    ///
    /// A failed remote write flips the session into degraded mode; the
    /// mutation itself survives in memory and in the mirror, deferred
    /// rather than lost. A later successful remote write clears the flag.
    async fn save(&self, cart: &Cart) {
        let doc = match conversions::cart_to_doc(cart) {
            Ok(doc) => Some(doc),
            Err(err) => {
                warn!(error = %err, "could not encode cart document");
                None
            }
        };

        if let Some(doc) = doc {
            match with_timeout(
                self.timeout,
                self.store
                    .set(collections::CARTS, cart.id().as_str(), doc),
            )
            .await
            {
                Ok(()) => self.degraded.store(false, Ordering::SeqCst),
                Err(err) => {
                    warn!(error = %err, "remote cart write failed, deferring to mirror");
                    self.degraded.store(true, Ordering::SeqCst);
                }
            }
        }

        if let Err(err) = self.mirror.store(cart).await {
            warn!(error = %err, "cart mirror write failed");
        }
    }
}
