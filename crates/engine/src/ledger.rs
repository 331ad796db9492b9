//! The stock ledger: per-(product, size) stock rows and the atomic
//! multi-row checkout decrement.
//!
//! All cross-client mutual exclusion is delegated to the store's
//! version-guarded commit. The decrement never writes a row it has not
//! read in the same attempt, and a conflicted commit restarts the whole
//! attempt from fresh reads.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use driftwood_core::{DecrementRequest, ProductId, Size, StockKey, StockRow};

use crate::config::{EngineConfig, RetryPolicy};
use crate::store::{
    ConditionalWrite, DocumentStore, StoreError, collections, conversions, with_timeout,
};

/// Errors surfaced by ledger operations.
///
/// `Clone` so a deduplicated availability fetch can hand the same failure
/// to every waiting caller.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// Malformed input: a non-positive quantity or an empty request.
    #[error("invalid stock operation: {0}")]
    Validation(String),

    /// A decrement referenced a variant with no tracked stock row.
    #[error("no stock row for {product_id} size {size}")]
    NotFound { product_id: ProductId, size: Size },

    /// A decrement asked for more units than the row holds.
    #[error(
        "insufficient stock for {product_id} size {size}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        size: Size,
        requested: u32,
        available: u32,
    },

    /// The decrement kept losing to concurrent writers and exhausted its
    /// retry budget.
    #[error("stock decrement conflicted after {attempts} attempts")]
    Conflict { attempts: u32 },

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns per-(product, size) stock rows.
pub struct StockLedger {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl StockLedger {
    /// Create a ledger over a document store.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            retry: config.retry,
            timeout: config.store_timeout,
        }
    }

    /// The stock level for one (product, size).
    ///
    /// An untracked variant reads as 0 - "not tracked" means nothing to
    /// sell, not an error and not infinity.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Store` if the store is unreachable or the row
    /// cannot be decoded.
    #[instrument(skip(self), fields(product_id = %product_id, size = %size))]
    pub async fn read(&self, product_id: &ProductId, size: &Size) -> Result<u32, LedgerError> {
        let key = StockKey::new(product_id.clone(), size.clone());
        let value = with_timeout(
            self.timeout,
            self.store.get(collections::STOCK, &key.storage_key()),
        )
        .await?;

        match value {
            Some(value) => Ok(conversions::stock_row_from_doc(&key, value)?.stock),
            None => Ok(0),
        }
    }

    /// Stock levels for every tracked size of a product.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Store` if the store is unreachable or a row
    /// cannot be decoded.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn read_all_for_product(
        &self,
        product_id: &ProductId,
    ) -> Result<BTreeMap<Size, u32>, LedgerError> {
        let prefix = StockKey::storage_prefix(product_id);
        let rows = with_timeout(
            self.timeout,
            self.store.list_prefix(collections::STOCK, &prefix),
        )
        .await?;

        let mut levels = BTreeMap::new();
        for (key, value) in rows {
            // The key suffix is authoritative for the size; prefix scans
            // can also return other products whose id merely starts with
            // this one (`p1` vs `p10` is excluded by the `_` separator,
            // but an id containing `_` is not), so re-check the row.
            let size = Size::new(key.strip_prefix(prefix.as_str()).unwrap_or(key.as_str()));
            let stock_key = StockKey::new(product_id.clone(), size.clone());
            let row = conversions::stock_row_from_doc(&stock_key, value)?;
            if row.product_id == *product_id {
                levels.insert(size, row.stock);
            }
        }
        Ok(levels)
    }

    /// Set the absolute stock level for a (product, size). Admin-only.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` for a negative level, or
    /// `LedgerError::Store` on store failure.
    #[instrument(skip(self), fields(product_id = %product_id, size = %size, stock))]
    pub async fn upsert(
        &self,
        product_id: &ProductId,
        size: &Size,
        stock: i64,
    ) -> Result<(), LedgerError> {
        let stock = u32::try_from(stock)
            .map_err(|_| LedgerError::Validation(format!("stock must be non-negative, got {stock}")))?;

        let row = StockRow {
            product_id: product_id.clone(),
            size: size.clone(),
            stock,
            updated_at: Utc::now(),
        };
        let key = row.key();
        let doc = conversions::stock_row_to_doc(&row)?;

        with_timeout(
            self.timeout,
            self.store.set(collections::STOCK, &key.storage_key(), doc),
        )
        .await?;
        Ok(())
    }

    /// Remove a stock row entirely. Admin-only; rows are never deleted
    /// implicitly.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Store` on store failure.
    #[instrument(skip(self), fields(product_id = %product_id, size = %size))]
    pub async fn delete(&self, product_id: &ProductId, size: &Size) -> Result<(), LedgerError> {
        let key = StockKey::new(product_id.clone(), size.clone());
        with_timeout(
            self.timeout,
            self.store.delete(collections::STOCK, &key.storage_key()),
        )
        .await?;
        Ok(())
    }

    /// Atomically decrement every line of a request, or nothing at all.
    ///
    /// Inside one logical transaction: read every referenced row, check
    /// that each exists and holds enough stock, then commit every new
    /// value guarded by the versions observed at read time. A commit that
    /// loses to a concurrent writer is retried from fresh reads with
    /// backoff, up to the configured bound.
    ///
    /// # Errors
    ///
    /// - `LedgerError::Validation` for an empty request or a zero line
    /// - `LedgerError::NotFound` if any referenced row is missing
    /// - `LedgerError::InsufficientStock` if any row is short
    /// - `LedgerError::Conflict` once the retry budget is exhausted
    /// - `LedgerError::Store` on store failure
    #[instrument(skip(self, request), fields(lines = request.lines().len()))]
    pub async fn decrement_all(&self, request: &DecrementRequest) -> Result<(), LedgerError> {
        if request.is_empty() {
            return Err(LedgerError::Validation(
                "decrement request has no lines".to_owned(),
            ));
        }
        if let Some(line) = request.lines().iter().find(|line| line.quantity == 0) {
            return Err(LedgerError::Validation(format!(
                "zero quantity for {} size {}",
                line.product_id, line.size
            )));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_decrement(request).await {
                Err(LedgerError::Store(StoreError::Conflict { key, .. })) => {
                    if attempt >= self.retry.max_attempts {
                        warn!(attempts = attempt, key = %key, "decrement retries exhausted");
                        return Err(LedgerError::Conflict { attempts: attempt });
                    }
                    let delay = self.retry.delay_for(attempt);
                    debug!(attempt, key = %key, ?delay, "decrement conflicted, retrying");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    /// One read-check-commit attempt.
    async fn try_decrement(&self, request: &DecrementRequest) -> Result<(), LedgerError> {
        let now = Utc::now();
        let mut writes = Vec::with_capacity(request.lines().len());

        for line in request.lines() {
            let key = line.key();
            let storage_key = key.storage_key();
            let doc = with_timeout(
                self.timeout,
                self.store.get_versioned(collections::STOCK, &storage_key),
            )
            .await?;

            let Some(value) = doc.value else {
                return Err(LedgerError::NotFound {
                    product_id: line.product_id.clone(),
                    size: line.size.clone(),
                });
            };

            let row = conversions::stock_row_from_doc(&key, value)?;
            if row.stock < line.quantity {
                return Err(LedgerError::InsufficientStock {
                    product_id: line.product_id.clone(),
                    size: line.size.clone(),
                    requested: line.quantity,
                    available: row.stock,
                });
            }

            let updated = StockRow {
                stock: row.stock - line.quantity,
                updated_at: now,
                ..row
            };
            writes.push(ConditionalWrite {
                collection: collections::STOCK,
                key: storage_key,
                expected: doc.version,
                value: conversions::stock_row_to_doc(&updated)?,
            });
        }

        with_timeout(self.timeout, self.store.commit(writes)).await?;
        Ok(())
    }
}
