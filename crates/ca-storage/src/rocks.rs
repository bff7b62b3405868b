use async_trait::async_trait;
use rocksdb::{DB, Options};
use std::sync::Arc;
use tracing::warn;

use crate::{Result, SessionStorage, StorageError};

/// Disk-backed storage for a single profile, one database directory per profile.
pub struct RocksDbStorage {
    db: Arc<DB>,
}

impl RocksDbStorage {
    pub fn open_default(path: &str) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path).map_err(backend)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn key_for(key: &str) -> String {
        format!("local:{key}")
    }
}

fn backend(err: rocksdb::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

#[async_trait]
impl SessionStorage for RocksDbStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(raw) = self.db.get(Self::key_for(key).as_bytes()).map_err(backend)? else {
            return Ok(None);
        };
        match String::from_utf8(raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!("ignoring non-UTF-8 stored value under {}: {}", key, err);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.db
            .put(Self::key_for(key).as_bytes(), value.as_bytes())
            .map_err(backend)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.db.delete(Self::key_for(key).as_bytes()).map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{keys, load_list, save_json};

    #[tokio::test]
    async fn values_survive_reopen() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().to_string_lossy().to_string();

        {
            let storage = RocksDbStorage::open_default(&path)?;
            save_json(&storage, keys::PURCHASED_COURSES, &vec![1_u64, 7]).await?;
        }

        let storage = RocksDbStorage::open_default(&path)?;
        let courses: Vec<u64> = load_list(&storage, keys::PURCHASED_COURSES).await?;
        assert_eq!(courses, vec![1, 7]);

        storage.remove(keys::PURCHASED_COURSES).await?;
        assert!(storage.get(keys::PURCHASED_COURSES).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn non_utf8_value_reads_as_absent() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().to_string_lossy().to_string();
        let storage = RocksDbStorage::open_default(&path)?;

        storage
            .db
            .put(RocksDbStorage::key_for(keys::SESSION).as_bytes(), [0xff, 0xfe, 0x00])?;

        assert!(storage.get(keys::SESSION).await?.is_none());
        assert!(load_list::<u64>(&storage, keys::SESSION).await?.is_empty());
        Ok(())
    }
}
