use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use checkloop_common::Artifact;
use tracing::debug;

use crate::errors::{WorkflowError, WorkflowResult};
use crate::registry::{KvStore, Ttl};

/// Resolves opaque file identifiers from a submission into artifacts.
#[async_trait]
pub trait FileRegistry: Send + Sync {
    /// Register an artifact, assigning it an id if it has none.
    async fn register(&self, artifact: Artifact) -> WorkflowResult<Artifact>;

    /// Resolve ids in order. Unknown ids are a validation error.
    async fn resolve(&self, ids: &[String]) -> WorkflowResult<Vec<Artifact>>;
}

/// File registry persisted in a [`KvStore`] under `file:{id}`.
pub struct KvFileRegistry {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl KvFileRegistry {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(id: &str) -> String {
        format!("file:{}", id)
    }
}

#[async_trait]
impl FileRegistry for KvFileRegistry {
    async fn register(&self, mut artifact: Artifact) -> WorkflowResult<Artifact> {
        if artifact.name.trim().is_empty() || artifact.url.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "File name and url must not be empty".to_string(),
            ));
        }
        let id = match artifact.id.take() {
            Some(id) if !id.trim().is_empty() => id,
            _ => uuid::Uuid::new_v4().to_string(),
        };
        artifact.id = Some(id.clone());
        if artifact.mime_type.is_none() {
            artifact.mime_type = mime_guess::from_path(&artifact.name)
                .first()
                .map(|m| m.essence_str().to_string());
        }
        let raw = serde_json::to_string(&artifact)
            .map_err(|e| WorkflowError::Registry(format!("Failed to encode file: {}", e)))?;
        self.store
            .put(&Self::key(&id), raw, Ttl::After(self.ttl))
            .await?;
        debug!(file_id = %id, name = %artifact.name, "Registered file");
        Ok(artifact)
    }

    async fn resolve(&self, ids: &[String]) -> WorkflowResult<Vec<Artifact>> {
        let mut resolved = Vec::with_capacity(ids.len());
        for id in ids {
            let raw = self
                .store
                .get(&Self::key(id))
                .await?
                .ok_or_else(|| WorkflowError::Validation(format!("Unknown file id '{}'", id)))?;
            let artifact: Artifact = serde_json::from_str(&raw)
                .map_err(|e| WorkflowError::Registry(format!("Corrupt file record {}: {}", id, e)))?;
            resolved.push(artifact);
        }
        Ok(resolved)
    }
}
