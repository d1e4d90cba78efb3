//! Typed error hierarchy for checkloop.
//!
//! `WorkflowError` covers every failure a run can hit, from submission
//! validation through upstream client failures to registry problems. Clients
//! consult [`WorkflowError::is_retryable`] to decide whether a call is worth
//! repeating; everything above the clients treats an error as fatal for the run.

use thiserror::Error;

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Bad submission input, rejected before a run is created.
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{service} timed out: {message}")]
    UpstreamTimeout {
        service: &'static str,
        message: String,
    },

    /// Malformed or unparseable payload. Never retried.
    #[error("{service} returned an invalid response: {message}")]
    UpstreamInvalidResponse {
        service: &'static str,
        message: String,
    },

    #[error("Generation task {task_id} failed: {message}")]
    UpstreamTaskFailed { task_id: String, message: String },

    /// Eventual-consistency 404 from an upstream lookup.
    #[error("{service} could not find {resource}")]
    NotFoundTransient {
        service: &'static str,
        resource: String,
    },

    /// Non-success HTTP status other than 404.
    #[error("{service} request failed with status {status}: {message}")]
    Upstream {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service} transport error: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    /// Ordering invariant violated, e.g. checker invoked without an artifact.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Run {run_id} not found")]
    RunNotFound { run_id: String },

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WorkflowError {
    /// Whether a client may repeat the call that produced this error.
    ///
    /// Timeouts, transport failures, 429 and 5xx are transient. Everything
    /// else, including invalid payloads and 404s, is not retried here; the
    /// generation client applies its own not-found window on top.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UpstreamTimeout { .. } | Self::Transport { .. } => true,
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn invalid_response(service: &'static str, message: impl Into<String>) -> Self {
        Self::UpstreamInvalidResponse {
            service,
            message: message.into(),
        }
    }

    pub fn timeout(service: &'static str, message: impl Into<String>) -> Self {
        Self::UpstreamTimeout {
            service,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(WorkflowError::timeout("generation", "slow").is_retryable());
        assert!(
            WorkflowError::Transport {
                service: "review",
                message: "reset".into()
            }
            .is_retryable()
        );
        for status in [429u16, 500, 502, 503] {
            let err = WorkflowError::Upstream {
                service: "generation",
                status,
                message: String::new(),
            };
            assert!(err.is_retryable(), "status {} should be retryable", status);
        }
    }

    #[test]
    fn test_permanent_errors_are_not_retryable() {
        assert!(!WorkflowError::invalid_response("review", "no json").is_retryable());
        assert!(
            !WorkflowError::Upstream {
                service: "generation",
                status: 400,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(
            !WorkflowError::NotFoundTransient {
                service: "generation",
                resource: "task t1".into()
            }
            .is_retryable()
        );
        assert!(!WorkflowError::PreconditionFailed("x".into()).is_retryable());
        assert!(
            !WorkflowError::UpstreamTaskFailed {
                task_id: "t".into(),
                message: "m".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_messages_carry_context() {
        let err = WorkflowError::UpstreamTaskFailed {
            task_id: "task-9".into(),
            message: "quota".into(),
        };
        assert!(err.to_string().contains("task-9"));
        assert!(err.to_string().contains("quota"));

        let err = WorkflowError::RunNotFound {
            run_id: "r-1".into(),
        };
        assert_eq!(err.to_string(), "Run r-1 not found");
    }

    #[test]
    fn test_implements_std_error() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&WorkflowError::Validation("x".into()));
    }
}
