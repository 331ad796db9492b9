//! Local fallback mirror for cart documents.
//!
//! The mirror is a write-through shadow of the last known-good cart: every
//! save targets it unconditionally, and reads only fall back to it when
//! the remote store is provably unreachable. It is never merged field-wise
//! with the remote document.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use driftwood_core::{Cart, UserId};

use crate::store::{StoreError, conversions};

/// Errors surfaced by mirror implementations.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("mirror io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("mirror serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt mirror document: {0}")]
    Corrupt(String),
}

impl From<StoreError> for MirrorError {
    fn from(err: StoreError) -> Self {
        Self::Corrupt(err.to_string())
    }
}

/// Locally-persisted cart shadow, keyed by user identity.
#[async_trait]
pub trait CartMirror: Send + Sync {
    /// The mirrored cart for a user, if one was ever written.
    async fn load(&self, user_id: &UserId) -> Result<Option<Cart>, MirrorError>;

    /// Overwrite the mirrored cart for the cart's owner.
    async fn store(&self, cart: &Cart) -> Result<(), MirrorError>;

    /// Drop the mirrored cart for a user. Absence is not an error.
    async fn remove(&self, user_id: &UserId) -> Result<(), MirrorError>;
}

/// File-backed mirror: one JSON document per user under a directory.
pub struct FileMirror {
    dir: PathBuf,
}

impl FileMirror {
    /// Create a mirror rooted at `dir`. The directory is created lazily on
    /// first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// User identities are opaque collaborator strings; hex-encode them so
    /// any identity maps to a valid, collision-free file name.
    fn path_for(&self, user_id: &UserId) -> PathBuf {
        let encoded: String = user_id
            .as_str()
            .bytes()
            .map(|b| format!("{b:02x}"))
            .collect();
        self.dir.join(format!("{encoded}.json"))
    }
}

#[async_trait]
impl CartMirror for FileMirror {
    async fn load(&self, user_id: &UserId) -> Result<Option<Cart>, MirrorError> {
        let path = self.path_for(user_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let value: Value = serde_json::from_slice(&bytes)?;
        Ok(Some(conversions::cart_from_doc(user_id, value)?))
    }

    async fn store(&self, cart: &Cart) -> Result<(), MirrorError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let doc = conversions::cart_to_doc(cart)?;
        let bytes = serde_json::to_vec(&doc)?;
        tokio::fs::write(self.path_for(cart.id()), bytes).await?;
        Ok(())
    }

    async fn remove(&self, user_id: &UserId) -> Result<(), MirrorError> {
        match tokio::fs::remove_file(self.path_for(user_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory mirror for tests.
#[derive(Clone, Default)]
pub struct MemoryMirror {
    carts: Arc<RwLock<HashMap<UserId, Value>>>,
}

impl MemoryMirror {
    /// Create an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartMirror for MemoryMirror {
    async fn load(&self, user_id: &UserId) -> Result<Option<Cart>, MirrorError> {
        let carts = self.carts.read().expect("lock poisoned");
        carts
            .get(user_id)
            .cloned()
            .map(|value| conversions::cart_from_doc(user_id, value).map_err(MirrorError::from))
            .transpose()
    }

    async fn store(&self, cart: &Cart) -> Result<(), MirrorError> {
        let doc = conversions::cart_to_doc(cart)?;
        let mut carts = self.carts.write().expect("lock poisoned");
        carts.insert(cart.id().clone(), doc);
        Ok(())
    }

    async fn remove(&self, user_id: &UserId) -> Result<(), MirrorError> {
        let mut carts = self.carts.write().expect("lock poisoned");
        carts.remove(user_id);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use driftwood_core::{CurrencyCode, Price, ProductSnapshot, Size};
    use rust_decimal_macros::dec;

    fn sample_cart(user: &str) -> Cart {
        let mut cart = Cart::empty(UserId::new(user));
        cart.add_line(
            "p1",
            ProductSnapshot {
                name: "Canvas Tote".to_owned(),
                image: None,
                sizes: vec![Size::new("One Size")],
                colors: vec![],
            },
            "One Size",
            "natural",
            1,
            Price::new(dec!(45), CurrencyCode::USD),
        );
        cart
    }

    fn temp_mirror() -> FileMirror {
        let dir = std::env::temp_dir()
            .join("driftwood-mirror-tests")
            .join(uuid::Uuid::new_v4().to_string());
        FileMirror::new(dir)
    }

    #[tokio::test]
    async fn test_file_mirror_roundtrip() {
        let mirror = temp_mirror();
        let cart = sample_cart("user@example.com");

        mirror.store(&cart).await.unwrap();
        let loaded = mirror.load(cart.id()).await.unwrap().unwrap();
        assert_eq!(loaded.items(), cart.items());
        assert_eq!(loaded.total(), cart.total());
    }

    #[tokio::test]
    async fn test_file_mirror_absent_user() {
        let mirror = temp_mirror();
        assert!(mirror.load(&UserId::new("nobody")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_mirror_remove_is_idempotent() {
        let mirror = temp_mirror();
        let cart = sample_cart("u1");
        mirror.store(&cart).await.unwrap();

        mirror.remove(cart.id()).await.unwrap();
        mirror.remove(cart.id()).await.unwrap();
        assert!(mirror.load(cart.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_mirror_roundtrip() {
        let mirror = MemoryMirror::new();
        let cart = sample_cart("u1");
        mirror.store(&cart).await.unwrap();
        let loaded = mirror.load(cart.id()).await.unwrap().unwrap();
        assert_eq!(loaded.items(), cart.items());
    }
}
