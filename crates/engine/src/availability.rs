//! Process-local availability cache for product display surfaces.
//!
//! A memoized read-through over [`StockLedger::read_all_for_product`]:
//! populated on first miss, never invalidated, stale-but-fast. Product
//! pages use it to decide whether a variant is orderable; checkout never
//! does - authoritative stock is re-read inside the decrement transaction.

use std::collections::BTreeMap;
use std::sync::Arc;

use moka::future::Cache;
use tracing::instrument;

use driftwood_core::{ProductId, Size};

use crate::ledger::{LedgerError, StockLedger};

/// Per-size stock levels as the display layer sees them.
pub type SizeLevels = BTreeMap<Size, u32>;

/// Memoized per-product availability.
///
/// An explicit instance with injected dependencies, so tests get isolation
/// by constructing fresh caches rather than poking at shared state.
#[derive(Clone)]
pub struct AvailabilityCache {
    ledger: Arc<StockLedger>,
    cache: Cache<ProductId, Arc<SizeLevels>>,
}

impl AvailabilityCache {
    /// Capacity bound; safety valve only, entries are never expired.
    const MAX_PRODUCTS: u64 = 100_000;

    /// Create a cache over a ledger.
    #[must_use]
    pub fn new(ledger: Arc<StockLedger>) -> Self {
        // No TTL: a stale "orderable" answer costs one failed checkout
        // attempt, which re-reads authoritative stock anyway.
        let cache = Cache::builder().max_capacity(Self::MAX_PRODUCTS).build();
        Self { ledger, cache }
    }

    /// Per-size stock levels for a product, from cache when warm.
    ///
    /// Concurrent misses for the same product collapse into a single
    /// ledger fetch; every waiter receives the same result.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the underlying fetch fails. Failed
    /// fetches are not cached; the next call retries.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get(&self, product_id: &ProductId) -> Result<Arc<SizeLevels>, LedgerError> {
        self.cache
            .try_get_with(product_id.clone(), async {
                let levels = self.ledger.read_all_for_product(product_id).await?;
                Ok(Arc::new(levels))
            })
            .await
            .map_err(|shared: Arc<LedgerError>| (*shared).clone())
    }

    /// Whether any size of the product has stock.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the underlying fetch fails.
    pub async fn any_in_stock(&self, product_id: &ProductId) -> Result<bool, LedgerError> {
        Ok(self.get(product_id).await?.values().any(|stock| *stock > 0))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::store::memory::MemoryStore;

    fn setup() -> (AvailabilityCache, Arc<StockLedger>, MemoryStore) {
        let store = MemoryStore::new();
        let ledger = Arc::new(StockLedger::new(
            Arc::new(store.clone()),
            &EngineConfig::default(),
        ));
        (AvailabilityCache::new(ledger.clone()), ledger, store)
    }

    #[tokio::test]
    async fn test_read_through_and_memoization() {
        let (cache, ledger, _) = setup();
        let p1 = ProductId::new("p1");
        ledger.upsert(&p1, &Size::new("M"), 3).await.unwrap();

        let levels = cache.get(&p1).await.unwrap();
        assert_eq!(levels.get(&Size::new("M")), Some(&3));

        // A later ledger write is not reflected: no invalidation by design.
        ledger.upsert(&p1, &Size::new("M"), 0).await.unwrap();
        let cached = cache.get(&p1).await.unwrap();
        assert_eq!(cached.get(&Size::new("M")), Some(&3));
    }

    #[tokio::test]
    async fn test_any_in_stock() {
        let (cache, ledger, _) = setup();
        let p1 = ProductId::new("p1");
        let p2 = ProductId::new("p2");
        ledger.upsert(&p1, &Size::new("M"), 0).await.unwrap();
        ledger.upsert(&p2, &Size::new("S"), 1).await.unwrap();

        assert!(!cache.any_in_stock(&p1).await.unwrap());
        assert!(cache.any_in_stock(&p2).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let (cache, ledger, store) = setup();
        let p1 = ProductId::new("p1");
        ledger.upsert(&p1, &Size::new("M"), 2).await.unwrap();

        store.set_offline(true);
        assert!(cache.get(&p1).await.is_err());

        store.set_offline(false);
        let levels = cache.get(&p1).await.unwrap();
        assert_eq!(levels.get(&Size::new("M")), Some(&2));
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let (cache, ledger, _) = setup();
        let p1 = ProductId::new("p1");
        ledger.upsert(&p1, &Size::new("M"), 4).await.unwrap();

        let (a, b) = tokio::join!(cache.get(&p1), cache.get(&p1));
        let (a, b) = (a.unwrap(), b.unwrap());
        // Both callers observe the same shared entry.
        assert!(Arc::ptr_eq(&a, &b));
    }
}
