//! Driftwood Engine - inventory-and-cart consistency.
//!
//! The one subsystem of the storefront with real invariants: per-size
//! stock levels that must never go negative, a cart kept consistent
//! across the remote store and a local fallback mirror, and an
//! all-or-nothing multi-row stock decrement at checkout so two concurrent
//! buyers cannot both purchase the last unit of a size.
//!
//! # Components
//!
//! - [`ledger::StockLedger`] - stock rows and the atomic decrement
//! - [`availability::AvailabilityCache`] - memoized per-product reads for
//!   display surfaces
//! - [`cart::CartStore`] - the session cart with write-through mirroring
//! - [`reconcile::CartReconciler`] - session-start merge of mirror and
//!   remote
//! - [`checkout::CheckoutCoordinator`] - order placement
//!
//! The [`engine::Engine`] facade wires them together over a
//! [`store::DocumentStore`] implementation and a [`mirror::CartMirror`].
//! Rendering, identity, payments, and search live elsewhere; this crate
//! only exposes the read/write API those surfaces consume.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod availability;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod mirror;
pub mod reconcile;
pub mod store;

pub use availability::{AvailabilityCache, SizeLevels};
pub use cart::{CartError, CartStore};
pub use checkout::{CheckoutCoordinator, CheckoutError, CheckoutState};
pub use config::{ConfigError, EngineConfig, RetryPolicy};
pub use engine::{CartSession, Engine};
pub use ledger::{LedgerError, StockLedger};
pub use mirror::{CartMirror, FileMirror, MemoryMirror, MirrorError};
pub use reconcile::{CartReconciler, CartSource, ReconciledCart};
pub use store::{DocumentStore, StoreError};
pub use store::memory::MemoryStore;
