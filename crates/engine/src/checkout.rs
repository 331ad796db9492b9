//! Order placement.
//!
//! The coordinator walks a checkout through
//! `Idle -> Validating -> Decrementing -> OrderCreated | Failed`. Stock is
//! consumed by the ledger's atomic decrement before the order record is
//! created, and the cart is cleared only once the order record exists.
//!
//! The one deliberately unrecovered path: a successful decrement followed
//! by a failed order write. Retrying the write could double-create the
//! order, and re-incrementing stock would race concurrent buyers, so the
//! event is logged for reconciliation and surfaced as-is.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use driftwood_core::{
    DecrementRequest, Order, OrderId, OrderStatus, ProductId, ShippingInfo, Size,
};

use crate::cart::CartStore;
use crate::config::EngineConfig;
use crate::ledger::{LedgerError, StockLedger};
use crate::store::{DocumentStore, StoreError, collections, with_timeout};

/// Phases of one order placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutState {
    Idle,
    Validating,
    Decrementing,
    OrderCreated,
    Failed,
}

impl std::fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Decrementing => "decrementing",
            Self::OrderCreated => "order_created",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Errors surfaced by order placement.
///
/// Stock failures are per-line and specific so the UI can say which size
/// is short; transient conflict is distinct from exhaustion so the caller
/// may offer "try again".
#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    /// Empty cart or incomplete shipping/contact fields.
    #[error("invalid checkout: {0}")]
    Validation(String),

    /// A cart line references a variant with no tracked stock.
    #[error("{product_id} size {size} is unavailable")]
    Unavailable { product_id: ProductId, size: Size },

    /// A cart line asks for more units than remain.
    #[error(
        "not enough stock for {product_id} size {size}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        size: Size,
        requested: u32,
        available: u32,
    },

    /// The decrement kept losing to concurrent buyers. Transient; the
    /// caller may retry the whole checkout.
    #[error("checkout conflicted with concurrent purchases, please try again")]
    Conflict,

    /// The authoritative store is unreachable. Checkout never proceeds
    /// against the local mirror.
    #[error("cannot complete purchase right now")]
    PersistenceUnavailable,

    /// Stock was consumed but the order record could not be created.
    /// Logged for operational follow-up; never retried automatically.
    #[error("order {order_id} requires manual reconciliation")]
    ReconciliationRequired { order_id: OrderId },

    /// Any other store failure.
    #[error(transparent)]
    Store(StoreError),
}

impl From<LedgerError> for CheckoutError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation(msg) => Self::Validation(msg),
            LedgerError::NotFound { product_id, size } => Self::Unavailable { product_id, size },
            LedgerError::InsufficientStock {
                product_id,
                size,
                requested,
                available,
            } => Self::InsufficientStock {
                product_id,
                size,
                requested,
                available,
            },
            LedgerError::Conflict { .. } => Self::Conflict,
            LedgerError::Store(StoreError::Unavailable(_)) => Self::PersistenceUnavailable,
            LedgerError::Store(store) => Self::Store(store),
        }
    }
}

/// Orchestrates order placement over the ledger, the order collection, and
/// the session cart.
pub struct CheckoutCoordinator {
    ledger: Arc<StockLedger>,
    store: Arc<dyn DocumentStore>,
    timeout: Duration,
}

impl CheckoutCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(
        ledger: Arc<StockLedger>,
        store: Arc<dyn DocumentStore>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            ledger,
            store,
            timeout: config.store_timeout,
        }
    }

    /// Place an order for everything in the session cart.
    ///
    /// # Errors
    ///
    /// See [`CheckoutError`]; stock errors name the failing line.
    #[instrument(skip(self, cart_store, shipping))]
    pub async fn place_order(
        &self,
        cart_store: &CartStore,
        shipping: ShippingInfo,
    ) -> Result<OrderId, CheckoutError> {
        let mut state = CheckoutState::Idle;

        transition(&mut state, CheckoutState::Validating);
        let cart = cart_store.snapshot().await;

        if cart_store.is_degraded() {
            // A degraded session only has the mirror's view of the world;
            // stock decisions must come from the authoritative store.
            transition(&mut state, CheckoutState::Failed);
            return Err(CheckoutError::PersistenceUnavailable);
        }
        if cart.is_empty() {
            transition(&mut state, CheckoutState::Failed);
            return Err(CheckoutError::Validation("cart is empty".to_owned()));
        }
        if let Some(field) = shipping.missing_field() {
            transition(&mut state, CheckoutState::Failed);
            return Err(CheckoutError::Validation(format!(
                "shipping {field} is required"
            )));
        }

        transition(&mut state, CheckoutState::Decrementing);
        let request = DecrementRequest::from_cart(&cart);
        if let Err(err) = self.ledger.decrement_all(&request).await {
            transition(&mut state, CheckoutState::Failed);
            return Err(err.into());
        }

        // Stock is consumed. From here on, failure means reconciliation,
        // not rollback.
        let order = Order {
            id: OrderId::generate(),
            user_id: cart.id().clone(),
            items: cart.items().to_vec(),
            shipping,
            total: cart.total(),
            status: OrderStatus::Placed,
            tracking_number: None,
            placed_at: Utc::now(),
        };

        if let Err(err) = self.create_order(&order).await {
            transition(&mut state, CheckoutState::Failed);
            error!(
                event = "reconciliation_required",
                order_id = %order.id,
                user_id = %order.user_id,
                total = %order.total,
                lines = request.lines().len(),
                error = %err,
                "stock decremented but order record creation failed"
            );
            return Err(CheckoutError::ReconciliationRequired { order_id: order.id });
        }

        transition(&mut state, CheckoutState::OrderCreated);
        cart_store.clear().await;
        info!(order_id = %order.id, user_id = %order.user_id, total = %order.total, "order placed");
        Ok(order.id)
    }

    async fn create_order(&self, order: &Order) -> Result<(), StoreError> {
        let doc = serde_json::to_value(order)?;
        with_timeout(
            self.timeout,
            self.store
                .set(collections::ORDERS, &order.id.to_string(), doc),
        )
        .await
    }
}

fn transition(state: &mut CheckoutState, next: CheckoutState) {
    debug!(from = %state, to = %next, "checkout state");
    *state = next;
}
