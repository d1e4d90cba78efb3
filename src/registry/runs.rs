use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use checkloop_common::{RunRecord, RunRequest, RunStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::store::{KvStore, Ttl};
use crate::errors::{WorkflowError, WorkflowResult};
use crate::workflow::events::CancellationCheck;

/// Engine-owned half of a run record. The stop flag lives under its own key so
/// the control plane and the engine never overwrite each other's fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRun {
    request: RunRequest,
    status: RunStatus,
    created_at: DateTime<Utc>,
}

const STOP_SET: &str = "1";
const STOP_CLEAR: &str = "0";

/// TTL-bounded registry of run metadata shared by the HTTP control plane and
/// the engine.
#[derive(Clone)]
pub struct RunRegistry {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl RunRegistry {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn run_key(run_id: &str) -> String {
        format!("run:{}", run_id)
    }

    fn stop_key(run_id: &str) -> String {
        format!("run:{}:stop", run_id)
    }

    /// Store a new run with `status=running, shouldStop=false` and return its record.
    pub async fn create(&self, request: RunRequest) -> WorkflowResult<RunRecord> {
        let record = RunRecord::new(uuid::Uuid::new_v4().to_string(), request);
        let stored = StoredRun {
            request: record.request.clone(),
            status: record.status,
            created_at: record.created_at,
        };
        self.store
            .put(
                &Self::run_key(&record.run_id),
                encode(&stored)?,
                Ttl::After(self.ttl),
            )
            .await?;
        self.store
            .put(
                &Self::stop_key(&record.run_id),
                STOP_CLEAR.to_string(),
                Ttl::After(self.ttl),
            )
            .await?;
        info!(run_id = %record.run_id, "Registered run");
        Ok(record)
    }

    pub async fn get(&self, run_id: &str) -> WorkflowResult<Option<RunRecord>> {
        let Some(raw) = self.store.get(&Self::run_key(run_id)).await? else {
            return Ok(None);
        };
        let stored: StoredRun = decode(&raw)?;
        let should_stop = self.stop_flag(run_id).await?;
        Ok(Some(RunRecord {
            run_id: run_id.to_string(),
            request: stored.request,
            status: stored.status,
            should_stop,
            created_at: stored.created_at,
        }))
    }

    /// Set the stop flag. Idempotent; fails only if the run is unknown.
    pub async fn request_stop(&self, run_id: &str) -> WorkflowResult<()> {
        if self.store.get(&Self::run_key(run_id)).await?.is_none() {
            return Err(WorkflowError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        self.store
            .put(&Self::stop_key(run_id), STOP_SET.to_string(), Ttl::Keep)
            .await?;
        info!(run_id, "Stop requested");
        Ok(())
    }

    pub async fn stop_flag(&self, run_id: &str) -> WorkflowResult<bool> {
        Ok(self
            .store
            .get(&Self::stop_key(run_id))
            .await?
            .is_some_and(|v| v == STOP_SET))
    }

    /// Record the terminal status. Only the first terminal transition sticks.
    pub async fn finish(&self, run_id: &str, status: RunStatus) -> WorkflowResult<()> {
        let key = Self::run_key(run_id);
        let Some(raw) = self.store.get(&key).await? else {
            warn!(run_id, %status, "Run expired before its terminal status was recorded");
            return Ok(());
        };
        let mut stored: StoredRun = decode(&raw)?;
        if stored.status.is_terminal() {
            debug!(run_id, current = %stored.status, requested = %status, "Run already terminal");
            return Ok(());
        }
        stored.status = status;
        self.store.put(&key, encode(&stored)?, Ttl::Keep).await?;
        info!(run_id, %status, "Run finished");
        Ok(())
    }

    /// Cancellation predicate bound to one run, for handing to the engine.
    pub fn cancellation(&self, run_id: &str) -> RegistryCancellation {
        RegistryCancellation {
            registry: self.clone(),
            run_id: run_id.to_string(),
        }
    }
}

/// Reads the registry stop flag on each check.
pub struct RegistryCancellation {
    registry: RunRegistry,
    run_id: String,
}

#[async_trait]
impl CancellationCheck for RegistryCancellation {
    async fn is_cancelled(&self) -> bool {
        match self.registry.stop_flag(&self.run_id).await {
            Ok(flag) => flag,
            Err(e) => {
                warn!(run_id = %self.run_id, error = %e, "Could not read stop flag, continuing");
                false
            }
        }
    }
}

fn encode(stored: &StoredRun) -> WorkflowResult<String> {
    serde_json::to_string(stored)
        .map_err(|e| WorkflowError::Registry(format!("Failed to encode run record: {}", e)))
}

fn decode(raw: &str) -> WorkflowResult<StoredRun> {
    serde_json::from_str(raw)
        .map_err(|e| WorkflowError::Registry(format!("Corrupt run record: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::store::MemoryKvStore;
    use checkloop_common::RunConfig;

    fn registry(ttl: Duration) -> RunRegistry {
        RunRegistry::new(Arc::new(MemoryKvStore::new()), ttl)
    }

    fn request() -> RunRequest {
        RunRequest {
            generation_prompt: "make a deck".into(),
            review_prompt: "check the deck".into(),
            guidelines: String::new(),
            inputs: vec![],
            references: vec![],
            config: RunConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_create_starts_running_without_stop() {
        let reg = registry(Duration::from_secs(60));
        let record = reg.create(request()).await.unwrap();
        let fetched = reg.get(&record.run_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Running);
        assert!(!fetched.should_stop);
        assert_eq!(fetched.request, request());
    }

    #[tokio::test]
    async fn test_request_stop_is_idempotent() {
        let reg = registry(Duration::from_secs(60));
        let record = reg.create(request()).await.unwrap();
        reg.request_stop(&record.run_id).await.unwrap();
        reg.request_stop(&record.run_id).await.unwrap();
        assert!(reg.stop_flag(&record.run_id).await.unwrap());
        assert!(reg.cancellation(&record.run_id).is_cancelled().await);
    }

    #[tokio::test]
    async fn test_request_stop_unknown_run() {
        let reg = registry(Duration::from_secs(60));
        let err = reg.request_stop("nope").await.unwrap_err();
        assert!(matches!(err, WorkflowError::RunNotFound { .. }));
    }

    #[tokio::test]
    async fn test_finish_is_monotonic() {
        let reg = registry(Duration::from_secs(60));
        let record = reg.create(request()).await.unwrap();
        reg.finish(&record.run_id, RunStatus::Stopped).await.unwrap();
        reg.finish(&record.run_id, RunStatus::Completed).await.unwrap();
        let fetched = reg.get(&record.run_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Stopped);
    }

    #[tokio::test]
    async fn test_stop_and_finish_do_not_clobber_each_other() {
        let reg = registry(Duration::from_secs(60));
        let record = reg.create(request()).await.unwrap();
        reg.finish(&record.run_id, RunStatus::Completed).await.unwrap();
        reg.request_stop(&record.run_id).await.unwrap();
        let fetched = reg.get(&record.run_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Completed);
        assert!(fetched.should_stop);
    }

    #[tokio::test]
    async fn test_records_expire_after_ttl() {
        let reg = registry(Duration::from_millis(20));
        let record = reg.create(request()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(reg.get(&record.run_id).await.unwrap().is_none());
        assert!(!reg.cancellation(&record.run_id).is_cancelled().await);
        // finishing an expired run is tolerated
        reg.finish(&record.run_id, RunStatus::Completed).await.unwrap();
    }
}
