use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::errors::{WorkflowError, WorkflowResult};

/// An object read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Blob storage for derived artifacts (converted documents, thumbnails).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `path` and return a retrievable URL.
    async fn put(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
        ttl: Duration,
    ) -> WorkflowResult<String>;

    async fn delete(&self, url: &str) -> WorkflowResult<()>;

    async fn list_by_prefix(&self, prefix: &str) -> WorkflowResult<Vec<String>>;

    /// Fetch an object by path, if it exists and has not expired.
    async fn get(&self, path: &str) -> WorkflowResult<Option<StoredObject>>;
}

#[derive(Debug)]
struct MemoryObject {
    object: StoredObject,
    expires_at: Instant,
}

/// In-process object store. URLs are `{public_base}/{path}`, which the HTTP
/// server resolves through its `/api/objects/{*path}` route.
#[derive(Debug)]
pub struct MemoryObjectStore {
    public_base: String,
    objects: DashMap<String, MemoryObject>,
}

impl MemoryObjectStore {
    pub fn new(public_base: impl Into<String>) -> Self {
        Self {
            public_base: public_base.into().trim_end_matches('/').to_string(),
            objects: DashMap::new(),
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.public_base, path)
    }

    fn path_for<'a>(&self, url: &'a str) -> WorkflowResult<&'a str> {
        url.strip_prefix(&self.public_base)
            .map(|p| p.trim_start_matches('/'))
            .ok_or_else(|| WorkflowError::Validation(format!("URL {} is not in this store", url)))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
        ttl: Duration,
    ) -> WorkflowResult<String> {
        let path = path.trim_start_matches('/');
        if path.is_empty() || path.split('/').any(|segment| segment == "..") {
            return Err(WorkflowError::Validation(format!(
                "Invalid object path '{}'",
                path
            )));
        }
        self.objects.insert(
            path.to_string(),
            MemoryObject {
                object: StoredObject {
                    bytes,
                    content_type: content_type.to_string(),
                },
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(self.url_for(path))
    }

    async fn delete(&self, url: &str) -> WorkflowResult<()> {
        let path = self.path_for(url)?;
        self.objects.remove(path);
        Ok(())
    }

    async fn list_by_prefix(&self, prefix: &str) -> WorkflowResult<Vec<String>> {
        let now = Instant::now();
        let prefix = prefix.trim_start_matches('/');
        let mut urls: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && entry.value().expires_at > now)
            .map(|entry| self.url_for(entry.key()))
            .collect();
        urls.sort();
        Ok(urls)
    }

    async fn get(&self, path: &str) -> WorkflowResult<Option<StoredObject>> {
        let now = Instant::now();
        let path = path.trim_start_matches('/');
        let expired = match self.objects.get(path) {
            None => return Ok(None),
            Some(entry) if entry.expires_at <= now => true,
            Some(entry) => return Ok(Some(entry.object.clone())),
        };
        if expired {
            self.objects.remove(path);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_put_returns_url_under_public_base() {
        let store = MemoryObjectStore::new("http://localhost:3000/api/objects/");
        let url = store
            .put(b"pdf".to_vec(), "runs/r1/iter-1/preview.pdf", "application/pdf", TTL)
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:3000/api/objects/runs/r1/iter-1/preview.pdf");
        let obj = store.get("runs/r1/iter-1/preview.pdf").await.unwrap().unwrap();
        assert_eq!(obj.bytes, b"pdf");
        assert_eq!(obj.content_type, "application/pdf");
    }

    #[tokio::test]
    async fn test_list_and_delete_by_prefix() {
        let store = MemoryObjectStore::new("mem://objects");
        store.put(vec![1], "runs/r1/iter-1/a.png", "image/png", TTL).await.unwrap();
        store.put(vec![2], "runs/r1/iter-2/a.png", "image/png", TTL).await.unwrap();
        store.put(vec![3], "runs/r2/iter-1/a.png", "image/png", TTL).await.unwrap();

        let urls = store.list_by_prefix("runs/r1/").await.unwrap();
        assert_eq!(urls.len(), 2);
        for url in &urls {
            store.delete(url).await.unwrap();
        }
        assert!(store.list_by_prefix("runs/r1/").await.unwrap().is_empty());
        assert_eq!(store.list_by_prefix("runs/").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_traversal_paths() {
        let store = MemoryObjectStore::new("mem://objects");
        let err = store.put(vec![], "../etc/passwd", "text/plain", TTL).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[tokio::test]
    async fn test_expired_objects_are_invisible() {
        let store = MemoryObjectStore::new("mem://objects");
        store
            .put(vec![1], "tmp/a", "text/plain", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get("tmp/a").await.unwrap().is_none());
        assert!(store.list_by_prefix("tmp/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_foreign_url_is_rejected() {
        let store = MemoryObjectStore::new("mem://objects");
        assert!(store.delete("https://elsewhere/a").await.is_err());
    }
}
