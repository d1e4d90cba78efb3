use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::select::{PathMarkers, outputs_fingerprint, select_primary};
use super::wire::{
    AttachmentPayload, ContinueTaskBody, CreateTaskBody, CreatedTask, TaskSnapshot, TaskStatus,
};
use super::{GenerationClient, GenerationOutput, GenerationRequest};
use crate::errors::{WorkflowError, WorkflowResult};
use crate::http::HttpClient;

/// Polling and selection policy for [`HttpGenerationClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    /// Requested output kind, as a file extension (e.g. `pptx`).
    pub output_format: String,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    /// 404s tolerated right after creating or continuing a task.
    pub not_found_retries: u32,
    pub not_found_backoff: Duration,
    pub markers: PathMarkers,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            output_format: "pptx".to_string(),
            poll_interval: Duration::from_secs(3),
            max_poll_attempts: 200,
            not_found_retries: 5,
            not_found_backoff: Duration::from_secs(2),
            markers: PathMarkers::default(),
        }
    }
}

/// Client for a task-based generation API.
///
/// `POST /tasks` creates a task, `POST /tasks/{id}/messages` continues it,
/// `GET /tasks/{id}` reports its status and outputs.
pub struct HttpGenerationClient {
    http: HttpClient,
    base_url: String,
    settings: PollSettings,
}

impl HttpGenerationClient {
    pub fn new(http: HttpClient, base_url: &str, settings: PollSettings) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            settings,
        }
    }

    async fn create_task(&self, prompt: &str, attachments: &[AttachmentPayload]) -> WorkflowResult<String> {
        let url = format!("{}/tasks", self.base_url);
        let created: CreatedTask = self
            .http
            .send_json(|c| {
                c.post(&url).json(&CreateTaskBody {
                    prompt,
                    attachments: attachments.to_vec(),
                    output_format: &self.settings.output_format,
                })
            })
            .await?;
        if created.task_id.trim().is_empty() {
            return Err(WorkflowError::invalid_response(
                self.http.service(),
                "task creation returned an empty task id",
            ));
        }
        info!(task_id = %created.task_id, "Created generation task");
        Ok(created.task_id)
    }

    async fn continue_task(
        &self,
        task_id: &str,
        prompt: &str,
        attachments: &[AttachmentPayload],
    ) -> WorkflowResult<()> {
        let url = format!("{}/tasks/{}/messages", self.base_url, task_id);
        self.http
            .execute(|c| {
                c.post(&url).json(&ContinueTaskBody {
                    prompt,
                    attachments: attachments.to_vec(),
                })
            })
            .await?;
        info!(task_id, "Continued generation task");
        Ok(())
    }

    async fn fetch_task(&self, task_id: &str) -> WorkflowResult<TaskSnapshot> {
        let url = format!("{}/tasks/{}", self.base_url, task_id);
        self.http.send_json(|c| c.get(&url)).await
    }

    /// Poll until the task completes with an output set whose fingerprint
    /// differs from `previous`, returning the snapshot and its fingerprint.
    async fn await_outputs(
        &self,
        task_id: &str,
        previous: Option<&str>,
    ) -> WorkflowResult<(TaskSnapshot, String)> {
        let service = self.http.service();
        let mut attempts = 0u32;
        let mut not_found = 0u32;
        let mut seen = false;
        let mut stale_completion = false;

        while attempts < self.settings.max_poll_attempts {
            match self.fetch_task(task_id).await {
                Ok(snapshot) => {
                    seen = true;
                    attempts += 1;
                    match snapshot.status {
                        TaskStatus::Failed => {
                            return Err(WorkflowError::UpstreamTaskFailed {
                                task_id: task_id.to_string(),
                                message: snapshot
                                    .error
                                    .unwrap_or_else(|| "task reported failure".to_string()),
                            });
                        }
                        TaskStatus::Completed => {
                            let fp = outputs_fingerprint(&snapshot.outputs);
                            if previous.is_some_and(|p| p == fp) {
                                stale_completion = true;
                                debug!(task_id, attempt = attempts, "Task completed with unchanged outputs, still waiting");
                            } else {
                                debug!(task_id, attempt = attempts, outputs = snapshot.outputs.len(), "Task completed");
                                return Ok((snapshot, fp));
                            }
                        }
                        TaskStatus::Pending | TaskStatus::Running | TaskStatus::Unknown => {
                            debug!(task_id, attempt = attempts, status = ?snapshot.status, "Task in progress");
                        }
                    }
                    tokio::time::sleep(self.settings.poll_interval).await;
                }
                Err(WorkflowError::NotFoundTransient { .. }) if !seen => {
                    if not_found >= self.settings.not_found_retries {
                        return Err(WorkflowError::timeout(
                            service,
                            format!(
                                "task {} still not visible after {} lookups",
                                task_id,
                                not_found + 1
                            ),
                        ));
                    }
                    not_found += 1;
                    warn!(task_id, retry = not_found, "Task not visible yet, backing off");
                    tokio::time::sleep(self.settings.not_found_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }

        let reason = if stale_completion {
            "task completed but never produced new outputs"
        } else {
            "task did not complete"
        };
        Err(WorkflowError::timeout(
            service,
            format!("{} within {} polls ({})", reason, attempts, task_id),
        ))
    }

    fn export_prompt(&self) -> String {
        let ext = self.settings.output_format.trim_start_matches('.');
        format!(
            "Export the final result as a .{} file and attach it to this conversation. Do not change the content.",
            ext
        )
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn generate(&self, request: GenerationRequest) -> WorkflowResult<GenerationOutput> {
        let attachments: Vec<AttachmentPayload> =
            request.attachments.iter().map(AttachmentPayload::from).collect();

        let task_id = match request.continuation_handle {
            Some(handle) => {
                self.continue_task(&handle, &request.prompt, &attachments).await?;
                handle
            }
            None => self.create_task(&request.prompt, &attachments).await?,
        };

        let (snapshot, fp) = self
            .await_outputs(&task_id, request.previous_fingerprint.as_deref())
            .await?;
        let kind = &self.settings.output_format;
        if let Some(artifact) = select_primary(&snapshot.outputs, &request.input_names, kind, &self.settings.markers) {
            return Ok(GenerationOutput {
                artifact,
                handle: task_id,
                fingerprint: fp,
            });
        }

        info!(task_id = %task_id, kind = %kind, outputs = snapshot.outputs.len(), "No primary output found, requesting export");
        self.continue_task(&task_id, &self.export_prompt(), &[]).await?;
        // accepted as soon as the export completes; no freshness check
        let (exported, export_fp) = self.await_outputs(&task_id, None).await?;
        let artifact = select_primary(&exported.outputs, &request.input_names, kind, &self.settings.markers)
            .ok_or_else(|| {
                WorkflowError::invalid_response(
                    self.http.service(),
                    format!("task {} produced no .{} output even after export", task_id, kind),
                )
            })?;
        Ok(GenerationOutput {
            artifact,
            handle: task_id,
            fingerprint: export_fp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RetryPolicy;
    use axum::{
        Json, Router,
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        routing::{get, post},
    };
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    /// Scripted fake of the task API: each GET pops the next response,
    /// repeating the last one when the script runs out.
    #[derive(Default)]
    struct FakeTasks {
        script: Vec<(StatusCode, Value)>,
        gets: usize,
        created: Vec<Value>,
        messages: Vec<Value>,
    }

    type Shared = Arc<Mutex<FakeTasks>>;

    async fn spawn(fake: Shared) -> String {
        let app = Router::new()
            .route(
                "/tasks",
                post(|State(s): State<Shared>, Json(body): Json<Value>| async move {
                    s.lock().unwrap().created.push(body);
                    Json(json!({"taskId": "task-1"}))
                }),
            )
            .route(
                "/tasks/{id}",
                get(|State(s): State<Shared>, Path(_id): Path<String>| async move {
                    let mut fake = s.lock().unwrap();
                    let idx = fake.gets.min(fake.script.len() - 1);
                    fake.gets += 1;
                    let (status, body) = fake.script[idx].clone();
                    (status, Json(body)).into_response()
                }),
            )
            .route(
                "/tasks/{id}/messages",
                post(|State(s): State<Shared>, Json(body): Json<Value>| async move {
                    s.lock().unwrap().messages.push(body);
                    Json(json!({"ok": true}))
                }),
            )
            .with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base: &str) -> HttpGenerationClient {
        let http = HttpClient::new("generation", Duration::from_secs(5), RetryPolicy::none(), None).unwrap();
        HttpGenerationClient::new(
            http,
            base,
            PollSettings {
                poll_interval: Duration::from_millis(5),
                max_poll_attempts: 10,
                not_found_retries: 2,
                not_found_backoff: Duration::from_millis(5),
                ..Default::default()
            },
        )
    }

    fn completed(urls: &[&str]) -> (StatusCode, Value) {
        let outputs: Vec<Value> = urls
            .iter()
            .map(|u| json!({"url": u, "path": "/sandbox/outputs/x"}))
            .collect();
        (StatusCode::OK, json!({"status": "completed", "outputs": outputs}))
    }

    fn running() -> (StatusCode, Value) {
        (StatusCode::OK, json!({"status": "running"}))
    }

    fn not_found() -> (StatusCode, Value) {
        (StatusCode::NOT_FOUND, json!({"error": "no such task"}))
    }

    fn fake(script: Vec<(StatusCode, Value)>) -> Shared {
        Arc::new(Mutex::new(FakeTasks {
            script,
            ..Default::default()
        }))
    }

    fn first_request() -> GenerationRequest {
        GenerationRequest {
            prompt: "Make a deck".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_creates_task_and_polls_to_completion() {
        let state = fake(vec![running(), running(), completed(&["https://g/deck.pptx"])]);
        let base = spawn(state.clone()).await;
        let out = client(&base).generate(first_request()).await.unwrap();
        assert_eq!(out.handle, "task-1");
        assert_eq!(out.artifact.name, "deck.pptx");
        assert_eq!(out.fingerprint, "https://g/deck.pptx");
        let fake = state.lock().unwrap();
        assert_eq!(fake.created.len(), 1);
        assert_eq!(fake.created[0]["outputFormat"], "pptx");
        assert_eq!(fake.gets, 3);
    }

    #[tokio::test]
    async fn test_failed_task_is_fatal() {
        let state = fake(vec![(StatusCode::OK, json!({"status": "failed", "error": "quota"}))]);
        let base = spawn(state).await;
        let err = client(&base).generate(first_request()).await.unwrap_err();
        match err {
            WorkflowError::UpstreamTaskFailed { task_id, message } => {
                assert_eq!(task_id, "task-1");
                assert_eq!(message, "quota");
            }
            other => panic!("Expected UpstreamTaskFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_absorbs_initial_not_found() {
        let state = fake(vec![not_found(), not_found(), completed(&["https://g/deck.pptx"])]);
        let base = spawn(state).await;
        assert!(client(&base).generate(first_request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_persistent_not_found_becomes_timeout() {
        let state = fake(vec![not_found()]);
        let base = spawn(state.clone()).await;
        let err = client(&base).generate(first_request()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::UpstreamTimeout { .. }));
        assert_eq!(state.lock().unwrap().gets, 3);
    }

    #[tokio::test]
    async fn test_not_found_after_task_seen_is_fatal() {
        let state = fake(vec![running(), not_found()]);
        let base = spawn(state).await;
        let err = client(&base).generate(first_request()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFoundTransient { .. }));
    }

    #[tokio::test]
    async fn test_continuation_waits_for_new_fingerprint() {
        let state = fake(vec![
            completed(&["https://g/deck.pptx"]),
            completed(&["https://g/deck.pptx"]),
            completed(&["https://g/deck.pptx", "https://g/deck-v2.pptx"]),
        ]);
        let base = spawn(state.clone()).await;
        let out = client(&base)
            .generate(GenerationRequest {
                prompt: "Fix slide 3".into(),
                continuation_handle: Some("task-1".into()),
                previous_fingerprint: Some("https://g/deck.pptx".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(out.handle, "task-1");
        assert_eq!(out.artifact.name, "deck-v2.pptx");
        let fake = state.lock().unwrap();
        assert!(fake.created.is_empty());
        assert_eq!(fake.messages.len(), 1);
        assert_eq!(fake.messages[0]["prompt"], "Fix slide 3");
        assert_eq!(fake.gets, 3);
    }

    #[tokio::test]
    async fn test_unchanged_fingerprint_times_out() {
        let state = fake(vec![completed(&["https://g/deck.pptx"])]);
        let base = spawn(state).await;
        let err = client(&base)
            .generate(GenerationRequest {
                prompt: "again".into(),
                continuation_handle: Some("task-1".into()),
                previous_fingerprint: Some("https://g/deck.pptx".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        match err {
            WorkflowError::UpstreamTimeout { message, .. } => assert!(message.contains("never produced new outputs")),
            other => panic!("Expected UpstreamTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_export_fallback_when_kind_missing() {
        let state = fake(vec![
            completed(&["https://g/outline.md"]),
            completed(&["https://g/outline.md", "https://g/deck.pptx"]),
        ]);
        let base = spawn(state.clone()).await;
        let out = client(&base).generate(first_request()).await.unwrap();
        assert_eq!(out.artifact.name, "deck.pptx");
        assert_eq!(out.fingerprint, "https://g/deck.pptx|https://g/outline.md");
        let fake = state.lock().unwrap();
        assert_eq!(fake.messages.len(), 1);
        assert!(fake.messages[0]["prompt"].as_str().unwrap().contains(".pptx"));
    }

    #[tokio::test]
    async fn test_export_without_result_is_invalid_response() {
        let state = fake(vec![completed(&["https://g/outline.md"])]);
        let base = spawn(state).await;
        let err = client(&base).generate(first_request()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::UpstreamInvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_echoed_input_not_selected() {
        let state = fake(vec![completed(&["https://g/template.pptx"])]);
        let base = spawn(state.clone()).await;
        let mut request = first_request();
        request.input_names = vec!["template.pptx".into()];
        // only the echoed template exists, so an export is requested and still finds nothing new
        let err = client(&base).generate(request).await.unwrap_err();
        assert!(matches!(err, WorkflowError::UpstreamInvalidResponse { .. }));
        assert_eq!(state.lock().unwrap().messages.len(), 1);
    }
}
