//! Local key/value persistence for the wallet session and course records.
//!
//! Values are stored as JSON strings under fixed keys, the same way a browser
//! keeps them in `localStorage`. There is no schema versioning: a value that
//! no longer deserializes is logged and read back as absent.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[cfg(feature = "rocksdb")]
mod rocks;

#[cfg(feature = "rocksdb")]
pub use rocks::RocksDbStorage;

pub mod keys {
    pub const SESSION: &str = "wallet_session";
    pub const TRANSACTIONS: &str = "wallet_transactions";
    pub const CART: &str = "cart";
    pub const PURCHASED_COURSES: &str = "purchased_courses";
    pub const ENROLLMENTS: &str = "enrollments";

    pub fn course_progress(course_id: u64) -> String {
        format!("course_progress_{course_id}")
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("failed to encode stored value: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Reads a JSON value, treating a malformed entry as absent.
pub async fn load_json<T: DeserializeOwned>(
    storage: &dyn SessionStorage,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = storage.get(key).await? else {
        return Ok(None);
    };

    match serde_json::from_str::<T>(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            warn!("ignoring malformed stored value under {}: {}", key, err);
            Ok(None)
        }
    }
}

pub async fn save_json<T: Serialize + ?Sized>(
    storage: &dyn SessionStorage,
    key: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    debug!("writing {} bytes under {}", raw.len(), key);
    storage.set(key, raw).await
}

/// Reads a JSON list, an absent or malformed entry yields an empty list.
pub async fn load_list<T: DeserializeOwned>(
    storage: &dyn SessionStorage,
    key: &str,
) -> Result<Vec<T>> {
    Ok(load_json::<Vec<T>>(storage, key).await?.unwrap_or_default())
}

#[derive(Default)]
pub struct InMemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryStorage {
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStorage for InMemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let guard = self.entries.read().await;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut guard = self.entries.write().await;
        guard.insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut guard = self.entries.write().await;
        guard.remove(key);
        Ok(())
    }
}
