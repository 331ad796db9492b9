//! Integration tests for Driftwood.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p driftwood-integration-tests
//! ```
//!
//! Everything runs against the in-memory document store and cart mirror,
//! so the suite needs no external services. The store's offline toggle
//! stands in for remote outages.
//!
//! # Test Categories
//!
//! - `checkout_flow` - End-to-end order placement, including the
//!   last-unit race between concurrent buyers
//! - `degraded_cart` - Remote outages, fallback seeding, and recovery
//! - `reconciliation` - Session-start merge of mirror and remote carts

use std::sync::Arc;

use driftwood_core::{Color, CurrencyCode, Price, ProductId, ProductSnapshot, Size, UserId};
use driftwood_engine::{CartSession, Engine, EngineConfig, MemoryMirror, MemoryStore};
use rust_decimal::Decimal;

/// Shared fixture: an engine wired over fresh in-memory backends, with
/// handles kept for fault injection and direct inspection.
pub struct TestContext {
    pub engine: Engine,
    pub store: MemoryStore,
    pub mirror: MemoryMirror,
}

impl TestContext {
    /// Build a fresh context with test-friendly retry timing.
    #[must_use]
    pub fn new() -> Self {
        init_tracing();

        let store = MemoryStore::new();
        let mirror = MemoryMirror::new();
        let engine = Engine::new(
            EngineConfig::default(),
            Arc::new(store.clone()),
            Arc::new(mirror.clone()),
        );

        Self {
            engine,
            store,
            mirror,
        }
    }

    /// Seed stock for a (product, size).
    pub async fn seed_stock(&self, product: &str, size: &str, stock: i64) {
        self.engine
            .ledger()
            .upsert(&ProductId::new(product), &Size::new(size), stock)
            .await
            .expect("seed stock");
    }

    /// Start a cart session for a user.
    pub async fn session(&self, user: &str) -> CartSession {
        self.engine.start_session(UserId::new(user)).await
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A product snapshot for test items.
#[must_use]
pub fn snapshot(name: &str) -> ProductSnapshot {
    ProductSnapshot {
        name: name.to_owned(),
        image: Some(format!(
            "https://cdn.driftwoodsupply.com/{}.jpg",
            name.to_lowercase().replace(' ', "-")
        )),
        sizes: vec![Size::new("S"), Size::new("M"), Size::new("L")],
        colors: vec![Color::new("navy"), Color::new("rust")],
    }
}

/// A USD price from whole dollars.
#[must_use]
pub fn usd(dollars: i64) -> Price {
    Price::new(Decimal::from(dollars), CurrencyCode::USD)
}

/// Complete shipping details for order placement.
#[must_use]
pub fn shipping() -> driftwood_core::ShippingInfo {
    driftwood_core::ShippingInfo {
        recipient: "A. Shopper".to_owned(),
        address1: "1 Harbor Rd".to_owned(),
        address2: None,
        city: "Port Townsend".to_owned(),
        postal_code: "98368".to_owned(),
        country: "US".to_owned(),
        email: driftwood_core::Email::parse("shopper@example.com").expect("valid email"),
        phone: Some("+1 360 555 0101".to_owned()),
    }
}

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
