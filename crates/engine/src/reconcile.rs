//! Session-start cart reconciliation.
//!
//! Invoked once when a user identity becomes available. The policy is
//! deliberately blunt: the remote document wins if it exists; otherwise a
//! local mirror is promoted to remote; otherwise the session starts with a
//! fresh cart. There is no field-level merge of divergent copies - first
//! observed source wins, and every later mutation flows through the cart
//! store's write-through save, which keeps both copies in lockstep.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use driftwood_core::{Cart, UserId};

use crate::config::EngineConfig;
use crate::mirror::CartMirror;
use crate::store::{DocumentStore, collections, conversions, with_timeout};

/// Where the session's starting cart came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartSource {
    /// The remote document existed and was used as-is.
    Remote,
    /// No remote document; the local mirror was promoted to remote.
    MirrorSeeded,
    /// Neither copy existed; a fresh empty cart.
    Fresh,
}

/// The result of session-start reconciliation.
#[derive(Debug, Clone)]
pub struct ReconciledCart {
    pub cart: Cart,
    pub source: CartSource,
    /// True when the remote store was unreachable and the session is
    /// operating against the mirror.
    pub degraded: bool,
}

/// Merges the local fallback mirror with the remote cart document at
/// session start.
pub struct CartReconciler {
    store: Arc<dyn DocumentStore>,
    mirror: Arc<dyn CartMirror>,
    timeout: Duration,
}

impl CartReconciler {
    /// Create a reconciler over the remote store and local mirror.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        mirror: Arc<dyn CartMirror>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            mirror,
            timeout: config.store_timeout,
        }
    }

    /// Resolve the session's starting cart.
    ///
    /// Never fails: an unreachable remote degrades to the mirror (or an
    /// empty cart), and a corrupt copy is treated as absent.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn reconcile(&self, user_id: &UserId) -> ReconciledCart {
        match with_timeout(
            self.timeout,
            self.store.get(collections::CARTS, user_id.as_str()),
        )
        .await
        {
            Ok(Some(value)) => match conversions::cart_from_doc(user_id, value) {
                Ok(cart) => {
                    debug!("remote cart document wins for this session");
                    ReconciledCart {
                        cart,
                        source: CartSource::Remote,
                        degraded: false,
                    }
                }
                Err(err) => {
                    warn!(error = %err, "remote cart document corrupt, reseeding");
                    self.seed(user_id).await
                }
            },
            Ok(None) => self.seed(user_id).await,
            Err(err) => {
                warn!(error = %err, "remote store unreachable, entering degraded mode");
                let (cart, source) = match self.mirror_cart(user_id).await {
                    Some(cart) => (cart, CartSource::MirrorSeeded),
                    None => (Cart::empty(user_id.clone()), CartSource::Fresh),
                };
                ReconciledCart {
                    cart,
                    source,
                    degraded: true,
                }
            }
        }
    }

    /// No usable remote document: promote the mirror if present, and
    /// establish the remote copy as authoritative going forward.
    async fn seed(&self, user_id: &UserId) -> ReconciledCart {
        let Some(cart) = self.mirror_cart(user_id).await else {
            return ReconciledCart {
                cart: Cart::empty(user_id.clone()),
                source: CartSource::Fresh,
                degraded: false,
            };
        };

        let mut degraded = false;
        match conversions::cart_to_doc(&cart) {
            Ok(doc) => {
                if let Err(err) = with_timeout(
                    self.timeout,
                    self.store.set(collections::CARTS, user_id.as_str(), doc),
                )
                .await
                {
                    warn!(error = %err, "could not promote mirror cart to remote");
                    degraded = true;
                }
            }
            Err(err) => warn!(error = %err, "could not encode mirror cart"),
        }

        debug!(items = cart.items().len(), "seeded session cart from mirror");
        ReconciledCart {
            cart,
            source: CartSource::MirrorSeeded,
            degraded,
        }
    }

    async fn mirror_cart(&self, user_id: &UserId) -> Option<Cart> {
        match self.mirror.load(user_id).await {
            Ok(cart) => cart,
            Err(err) => {
                warn!(error = %err, "cart mirror unreadable, ignoring");
                None
            }
        }
    }
}
