use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Key-value object storage as the pipeline sees it.
///
/// The transform job, catalog registrar and partition discovery all talk to
/// storage through this trait so they can run against MinIO in production and
/// an in-memory store in tests.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches an object. Returns `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes an object, replacing any existing content under the key.
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Lists all object keys under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Deletes an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory [`ObjectStore`] used by the test suites and local dry runs.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.read().await;
        Ok(objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();

        store.put("raw/a.csv", b"id,amount\n1,2\n").await.unwrap();
        let fetched = store.get("raw/a.csv").await.unwrap();
        assert_eq!(fetched.as_deref(), Some(b"id,amount\n1,2\n".as_slice()));

        assert_eq!(store.get("raw/missing.csv").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_list_filters_by_prefix() {
        let store = MemoryStore::new();
        store.put("raw/a.csv", b"a").await.unwrap();
        store.put("raw/b.csv", b"b").await.unwrap();
        store.put("transformed/c.parquet", b"c").await.unwrap();

        let raw = store.list("raw/").await.unwrap();
        assert_eq!(raw, vec!["raw/a.csv".to_string(), "raw/b.csv".to_string()]);

        let all = store.list("").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_memory_store_delete_is_idempotent() {
        let store = MemoryStore::new();
        store.put("k", b"v").await.unwrap();

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);

        // Deleting again must not fail.
        store.delete("k").await.unwrap();
    }
}
