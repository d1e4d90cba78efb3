//! Wires configuration into the collaborators, the registry and the engine.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use checkloop_common::{RunRecord, RunRequest, RunStatus, WorkflowEvent};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::collab::{
    ConversionService, FileRegistry, HttpArtifactFetcher, HttpConversionService, KvFileRegistry,
    MemoryObjectStore, ObjectStore, PreviewRenderer,
};
use crate::config::{Config, EngineMode};
use crate::errors::{WorkflowError, WorkflowResult};
use crate::generation::{HttpGenerationClient, PollSettings};
use crate::http::{HttpClient, RetryPolicy};
use crate::registry::{KvStore, MemoryKvStore, RunRegistry};
use crate::review::{ChatReviewClient, ReviewSettings};
use crate::workflow::{
    EventSink, IterationController, MakerCheckerEngine, RunOutcome, ScriptedSteps, WorkflowEngine,
};

/// Path under the server's public URL where stored objects are served.
pub const OBJECTS_ROUTE: &str = "/api/objects";

/// Reject a request that cannot start a run.
pub fn validate_request(request: &RunRequest) -> WorkflowResult<()> {
    if request.inputs.is_empty() {
        return Err(WorkflowError::Validation(
            "At least one input file is required".to_string(),
        ));
    }
    if request.generation_prompt.trim().is_empty() {
        return Err(WorkflowError::Validation(
            "generationPrompt must not be empty".to_string(),
        ));
    }
    if request.review_prompt.trim().is_empty() {
        return Err(WorkflowError::Validation(
            "reviewPrompt must not be empty".to_string(),
        ));
    }
    request.config.validate().map_err(WorkflowError::Validation)
}

/// Everything a process needs to accept and drive runs.
pub struct Runtime {
    pub config: Config,
    pub registry: RunRegistry,
    pub files: Arc<dyn FileRegistry>,
    pub objects: Arc<dyn ObjectStore>,
    kv: Arc<MemoryKvStore>,
    previews: Arc<PreviewRenderer>,
    engine: Arc<dyn WorkflowEngine>,
}

impl Runtime {
    pub fn build(config: Config) -> Result<Self> {
        config.ensure_valid()?;

        let kv = Arc::new(MemoryKvStore::new());
        let kv_dyn: Arc<dyn KvStore> = kv.clone();
        let registry = RunRegistry::new(kv_dyn.clone(), config.registry_ttl());
        let files: Arc<dyn FileRegistry> =
            Arc::new(KvFileRegistry::new(kv_dyn, config.registry_ttl()));
        let objects: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new(format!(
            "{}{}",
            config.server.public_base(),
            OBJECTS_ROUTE
        )));

        let previews = Arc::new(Self::build_previews(&config, objects.clone())?);
        let engine = Self::build_engine(&config, objects.clone(), previews.clone())?;
        info!(mode = %config.engine.mode, previews = previews.is_enabled(), "Runtime ready");

        Ok(Self {
            config,
            registry,
            files,
            objects,
            kv,
            previews,
            engine,
        })
    }

    fn build_previews(config: &Config, objects: Arc<dyn ObjectStore>) -> WorkflowResult<PreviewRenderer> {
        let timeout = Duration::from_secs(config.conversion.request_timeout_secs);
        let converter = match &config.conversion.base_url {
            Some(url) => {
                let http = HttpClient::new("conversion", timeout, RetryPolicy::default(), None)?;
                let service: Arc<dyn ConversionService> = Arc::new(HttpConversionService::new(
                    http,
                    url,
                    config.conversion.max_preview_pages,
                ));
                Some(service)
            }
            None => None,
        };
        let fetch_http = HttpClient::new("artifact-fetch", timeout, RetryPolicy::default(), None)?;
        Ok(PreviewRenderer::new(
            converter,
            Arc::new(HttpArtifactFetcher::new(fetch_http)),
            objects,
            config.artifact_ttl(),
        ))
    }

    fn build_engine(
        config: &Config,
        objects: Arc<dyn ObjectStore>,
        previews: Arc<PreviewRenderer>,
    ) -> Result<Arc<dyn WorkflowEngine>> {
        match config.engine.mode {
            EngineMode::Scripted => Ok(Arc::new(MakerCheckerEngine::new(ScriptedSteps::new(
                objects,
                Duration::from_millis(config.engine.scripted_delay_ms),
                config.engine.scripted_pass_on,
                config.artifact_ttl(),
            )))),
            EngineMode::Live => {
                let gen_cfg = &config.generation;
                let review_cfg = &config.review;
                let (Some(gen_url), Some(review_url)) = (&gen_cfg.base_url, &review_cfg.base_url)
                else {
                    anyhow::bail!("Live mode requires generation.base_url and review.base_url");
                };

                let gen_http = HttpClient::new(
                    "generation",
                    Duration::from_secs(gen_cfg.request_timeout_secs),
                    gen_cfg.retry.policy(),
                    gen_cfg.api_key.clone(),
                )?;
                let generator = HttpGenerationClient::new(
                    gen_http,
                    gen_url,
                    PollSettings {
                        output_format: gen_cfg.output_format.clone(),
                        poll_interval: Duration::from_millis(gen_cfg.poll_interval_ms),
                        max_poll_attempts: gen_cfg.max_poll_attempts,
                        not_found_retries: gen_cfg.not_found_retries,
                        not_found_backoff: Duration::from_millis(gen_cfg.not_found_backoff_ms),
                        markers: gen_cfg.markers.clone(),
                    },
                );

                let review_http = HttpClient::new(
                    "review",
                    Duration::from_secs(review_cfg.request_timeout_secs),
                    review_cfg.retry.policy(),
                    review_cfg.api_key.clone(),
                )?;
                let reviewer = ChatReviewClient::new(
                    review_http,
                    review_url,
                    ReviewSettings {
                        model: review_cfg.model.clone(),
                        supports_documents: review_cfg.supports_documents,
                    },
                );

                let controller =
                    IterationController::new(Arc::new(generator), Arc::new(reviewer), previews);
                Ok(Arc::new(MakerCheckerEngine::new(controller)))
            }
        }
    }

    /// Periodically evict expired registry entries.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.kv
            .spawn_sweeper(Duration::from_secs(self.config.registry.sweep_interval_secs))
    }

    /// Validate and register a new run.
    pub async fn submit(&self, request: RunRequest) -> WorkflowResult<RunRecord> {
        validate_request(&request)?;
        self.registry.create(request).await
    }

    /// Run the engine for a registered run and record its terminal status.
    ///
    /// Events go to `sink`; the stop flag in the registry is the cancellation
    /// source. Superseded previews are removed once the run is over.
    pub async fn drive(&self, run_id: &str, sink: &dyn EventSink) -> WorkflowResult<RunOutcome> {
        let record = match self.registry.get(run_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                let err = WorkflowError::RunNotFound {
                    run_id: run_id.to_string(),
                };
                sink.emit(WorkflowEvent::Error {
                    message: err.to_string(),
                    iteration: 0,
                });
                return Err(err);
            }
            Err(e) => {
                sink.emit(WorkflowEvent::Error {
                    message: e.to_string(),
                    iteration: 0,
                });
                return Err(e);
            }
        };
        let cancel = self.registry.cancellation(run_id);
        let result = self.engine.run(run_id, &record.request, sink, &cancel).await;

        let (status, keep) = match &result {
            Ok(outcome) => (
                outcome.status,
                outcome
                    .state
                    .final_artifact
                    .as_ref()
                    .map(|_| outcome.state.current_iteration),
            ),
            Err(_) => (RunStatus::Failed, None),
        };
        if let Err(e) = self.registry.finish(run_id, status).await {
            warn!(run_id, error = %e, "Failed to record terminal status");
        }
        self.previews.cleanup(run_id, keep).await;
        result
    }
}
