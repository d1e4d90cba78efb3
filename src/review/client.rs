use async_trait::async_trait;
use checkloop_common::{Artifact, Verdict, dedupe_by_identity};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::parse::parse_verdict;
use super::{ReviewClient, ReviewRequest};
use crate::errors::{WorkflowError, WorkflowResult};
use crate::http::HttpClient;

const SYSTEM_PROMPT: &str = "You are a meticulous reviewer. Evaluate the attached output against the \
criteria you are given and answer with a single JSON object.";

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewSettings {
    pub model: String,
    /// Whether the judge accepts document and image attachments. When false,
    /// artifacts are described in text instead.
    pub supports_documents: bool,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            supports_documents: true,
        }
    }
}

/// Judge client speaking the OpenAI-compatible `POST /chat/completions` API.
pub struct ChatReviewClient {
    http: HttpClient,
    base_url: String,
    settings: ReviewSettings,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

enum Attachability {
    Image,
    Document,
    Unsupported,
}

fn attachability(artifact: &Artifact) -> Attachability {
    let mime = artifact.mime_type.clone().or_else(|| {
        mime_guess::from_path(&artifact.name)
            .first()
            .map(|m| m.essence_str().to_string())
    });
    match mime.as_deref() {
        Some(m) if m.starts_with("image/") => Attachability::Image,
        Some("application/pdf") => Attachability::Document,
        Some(m) if m.starts_with("text/") => Attachability::Document,
        _ => Attachability::Unsupported,
    }
}

fn describe(label: &str, artifact: &Artifact) -> String {
    let size = artifact
        .size_bytes
        .map(|s| format!(", {} bytes", s))
        .unwrap_or_default();
    format!("{}: {}{} ({})", label, artifact.name, size, artifact.url)
}

impl ChatReviewClient {
    pub fn new(http: HttpClient, base_url: &str, settings: ReviewSettings) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            settings,
        }
    }

    fn part(&self, label: &str, artifact: &Artifact) -> Value {
        if !self.settings.supports_documents {
            return json!({"type": "text", "text": describe(label, artifact)});
        }
        match attachability(artifact) {
            Attachability::Image => json!({
                "type": "image_url",
                "image_url": {"url": artifact.url},
            }),
            Attachability::Document => json!({
                "type": "file",
                "file": {"filename": artifact.name, "file_url": artifact.url},
            }),
            Attachability::Unsupported => json!({"type": "text", "text": describe(label, artifact)}),
        }
    }

    /// Build the chat payload. References are de-duplicated by identity and
    /// never repeat the primary artifact.
    fn build_body(&self, request: &ReviewRequest) -> Value {
        let primary_key = request.primary.identity_key();
        let references: Vec<Artifact> = dedupe_by_identity(request.references.iter().cloned())
            .into_iter()
            .filter(|a| a.identity_key() != primary_key)
            .collect();

        let mut content = vec![
            json!({"type": "text", "text": request.prompt}),
            self.part("Output under review", &request.primary),
        ];
        if !references.is_empty() {
            content.push(json!({"type": "text", "text": "Supporting inputs and references:"}));
            content.extend(references.iter().map(|r| self.part("Reference", r)));
        }

        json!({
            "model": self.settings.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": content},
            ],
        })
    }
}

#[async_trait]
impl ReviewClient for ChatReviewClient {
    async fn review(&self, request: ReviewRequest) -> WorkflowResult<Verdict> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&request);
        let response: ChatResponse = self.http.send_json(|c| c.post(&url).json(&body)).await?;
        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| WorkflowError::invalid_response(self.http.service(), "reply has no message content"))?;
        let verdict = parse_verdict(self.http.service(), &reply)?;
        debug!(passed = verdict.passed, confidence = verdict.confidence, issues = verdict.issues.len(), "Parsed verdict");
        Ok(verdict)
    }
}
