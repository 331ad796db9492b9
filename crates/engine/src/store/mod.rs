//! The persistence collaborator boundary.
//!
//! The remote document store is modeled by the [`DocumentStore`] trait:
//! point reads, prefix scans, unconditional writes, and a version-guarded
//! multi-key commit. The commit is the engine's sole source of cross-client
//! atomicity; nothing in the engine fakes a transaction with sequential
//! unguarded writes.

pub mod conversions;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Collection names used by the engine.
pub mod collections {
    /// Stock rows, keyed `{productId}_{size}`.
    pub const STOCK: &str = "stock";
    /// Cart documents, keyed by user identity.
    pub const CARTS: &str = "carts";
    /// Order records, keyed by order id.
    pub const ORDERS: &str = "orders";
}

/// Errors surfaced by a [`DocumentStore`] implementation.
///
/// `Clone` is required because availability lookups share one in-flight
/// fetch between concurrent callers, and every waiter gets the error.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store could not be reached within the operation timeout.
    #[error("store unreachable: {0}")]
    Unavailable(String),

    /// A conditional commit lost the race: some referenced document changed
    /// between the read and the commit.
    #[error("write conflict on {collection}/{key}")]
    Conflict { collection: String, key: String },

    /// A document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored document has a shape the adapter cannot normalize.
    #[error("corrupt document at {collection}/{key}: {detail}")]
    Corruption {
        collection: String,
        key: String,
        detail: String,
    },
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Monotonic per-document version used for optimistic concurrency.
///
/// An absent document reads at [`Version::INITIAL`], so "still absent" is a
/// checkable commit precondition like any other.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// The version at which an absent document reads.
    pub const INITIAL: Self = Self(0);

    /// The version after one more write.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A document value paired with the version it was read at.
#[derive(Debug, Clone)]
pub struct VersionedDoc {
    /// `None` when the document does not exist.
    pub value: Option<Value>,
    /// The version observed at read time.
    pub version: Version,
}

/// One write of a version-guarded commit.
#[derive(Debug, Clone)]
pub struct ConditionalWrite {
    pub collection: &'static str,
    pub key: String,
    /// The version the document must still be at for the commit to apply.
    pub expected: Version,
    pub value: Value,
}

/// The remote document store.
///
/// Implementations must make [`commit`](DocumentStore::commit) atomic:
/// either every write applies or none do, and a stale `expected` version on
/// any write fails the whole batch with [`StoreError::Conflict`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point read of a document.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Point read plus the document's current version.
    async fn get_versioned(&self, collection: &str, key: &str)
    -> Result<VersionedDoc, StoreError>;

    /// All documents in a collection whose key starts with `prefix`, in
    /// key order.
    async fn list_prefix(
        &self,
        collection: &str,
        prefix: &str,
    ) -> Result<Vec<(String, Value)>, StoreError>;

    /// Unconditional upsert of a document.
    async fn set(&self, collection: &str, key: &str, value: Value) -> Result<(), StoreError>;

    /// Remove a document. Removing an absent document is not an error.
    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError>;

    /// Apply all writes atomically iff every document is still at its
    /// expected version.
    async fn commit(&self, writes: Vec<ConditionalWrite>) -> Result<(), StoreError>;
}

/// Bound a store operation with a timeout, mapping elapse to
/// [`StoreError::Unavailable`] so callers fall through to their degraded
/// paths instead of blocking.
pub(crate) async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, StoreError>> + Send,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unavailable(format!(
            "operation timed out after {limit:?}"
        ))),
    }
}
