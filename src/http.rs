//! Shared HTTP plumbing for the upstream services.
//!
//! Every outbound call goes through [`HttpClient::execute`], which applies a
//! hard per-request timeout and retries transient failures (timeouts,
//! transport errors, 429 and 5xx) with bounded exponential backoff. Status
//! codes are mapped into [`WorkflowError`] so callers never see raw reqwest
//! errors.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::errors::{WorkflowError, WorkflowResult};
use crate::util::truncate;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body excerpt carried into an error message.
const ERROR_BODY_LIMIT: usize = 300;

/// Client-call level retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (1-based): initial * 2^(retry-1), capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Thin wrapper over a shared `reqwest::Client` bound to one upstream service.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    service: &'static str,
    timeout: Duration,
    retry: RetryPolicy,
    api_key: Option<String>,
}

impl HttpClient {
    pub fn new(
        service: &'static str,
        timeout: Duration,
        retry: RetryPolicy,
        api_key: Option<String>,
    ) -> WorkflowResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| WorkflowError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            service,
            timeout,
            retry,
            api_key,
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Send a request built by `build`, retrying transient failures.
    ///
    /// `build` is invoked once per attempt so request bodies never need cloning.
    /// Returns the response only for 2xx statuses.
    pub async fn execute<F>(&self, build: F) -> WorkflowResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut retry = 0u32;
        loop {
            let mut request = build(&self.client).timeout(self.timeout);
            if let Some(ref key) = self.api_key {
                request = request.bearer_auth(key);
            }

            debug!(service = self.service, attempt = retry + 1, "Sending request");
            let result = match request.send().await {
                Ok(response) => self.check_status(response).await,
                Err(e) if e.is_timeout() => Err(WorkflowError::timeout(
                    self.service,
                    format!("no response within {}s", self.timeout.as_secs_f32()),
                )),
                Err(e) => Err(WorkflowError::Transport {
                    service: self.service,
                    message: e.to_string(),
                }),
            };

            match result {
                Err(err) if err.is_retryable() && retry < self.retry.max_retries => {
                    retry += 1;
                    let delay = self.retry.backoff(retry);
                    warn!(
                        service = self.service,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient upstream failure, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    /// Send a request and decode the JSON body. Decoding failures are never retried.
    pub async fn send_json<T, F>(&self, build: F) -> WorkflowResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.execute(build).await?;
        let body = response.text().await.map_err(|e| WorkflowError::Transport {
            service: self.service,
            message: format!("failed to read response body: {}", e),
        })?;
        serde_json::from_str(&body).map_err(|e| {
            WorkflowError::invalid_response(
                self.service,
                format!("{} (body: {})", e, truncate(&body, ERROR_BODY_LIMIT)),
            )
        })
    }

    /// Send a request and return the raw body bytes.
    pub async fn send_bytes<F>(&self, build: F) -> WorkflowResult<Vec<u8>>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.execute(build).await?;
        read_bytes(self.service, response).await
    }

    async fn check_status(&self, response: Response) -> WorkflowResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        Err(map_status(self.service, status, &url, &body))
    }
}

/// Read a response body into memory.
pub async fn read_bytes(service: &'static str, response: Response) -> WorkflowResult<Vec<u8>> {
    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| WorkflowError::Transport {
            service,
            message: format!("failed to read response body: {}", e),
        })
}

fn map_status(service: &'static str, status: StatusCode, path: &str, body: &str) -> WorkflowError {
    if status == StatusCode::NOT_FOUND {
        return WorkflowError::NotFoundTransient {
            service,
            resource: path.to_string(),
        };
    }
    WorkflowError::Upstream {
        service,
        status: status.as_u16(),
        message: truncate(body.trim(), ERROR_BODY_LIMIT),
    }
}
