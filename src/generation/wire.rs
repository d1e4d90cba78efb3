use checkloop_common::Artifact;
use checkloop_common::seq;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentPayload {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl From<&Artifact> for AttachmentPayload {
    fn from(artifact: &Artifact) -> Self {
        Self {
            name: artifact.name.clone(),
            url: artifact.url.clone(),
            mime_type: artifact.mime_type.clone(),
        }
    }
}

/// `POST {base}/tasks`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskBody<'a> {
    pub prompt: &'a str,
    pub attachments: Vec<AttachmentPayload>,
    pub output_format: &'a str,
}

/// `POST {base}/tasks/{id}/messages`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueTaskBody<'a> {
    pub prompt: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTask {
    #[serde(alias = "id")]
    pub task_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Anything else the service reports is treated as still in progress.
    #[serde(other)]
    Unknown,
}

/// A file attached to a task, either generated or echoed back from the inputs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutput {
    #[serde(default)]
    pub id: Option<String>,
    pub url: String,
    #[serde(default, alias = "name")]
    pub filename: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Storage path on the service side. Marks generated vs uploaded files.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

impl TaskOutput {
    /// Filename, falling back to the last url segment.
    pub fn file_name(&self) -> String {
        match &self.filename {
            Some(name) if !name.is_empty() => name.clone(),
            _ => {
                let path = self.url.split(['?', '#']).next().unwrap_or(&self.url);
                path.rsplit('/').next().unwrap_or(path).to_string()
            }
        }
    }

    pub fn to_artifact(&self) -> Artifact {
        Artifact {
            id: self.id.clone(),
            name: self.file_name(),
            url: self.url.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.size_bytes,
        }
    }
}

/// `GET {base}/tasks/{id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "seq::ordered")]
    pub outputs: Vec<TaskOutput>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_tolerates_unknown_status_and_keyed_outputs() {
        let snap: TaskSnapshot = serde_json::from_value(json!({
            "status": "queued",
            "outputs": {"0": {"url": "https://g/a.pptx"}, "length": 1}
        }))
        .unwrap();
        assert_eq!(snap.status, TaskStatus::Unknown);
        assert_eq!(snap.outputs.len(), 1);
        assert_eq!(snap.outputs[0].file_name(), "a.pptx");
    }

    #[test]
    fn test_created_task_accepts_id_alias() {
        let created: CreatedTask = serde_json::from_value(json!({"id": "t-1"})).unwrap();
        assert_eq!(created.task_id, "t-1");
    }

    #[test]
    fn test_file_name_strips_query() {
        let out = TaskOutput {
            id: None,
            url: "https://g/files/deck.pptx?sig=abc".into(),
            filename: None,
            mime_type: None,
            path: None,
            size_bytes: None,
        };
        assert_eq!(out.to_artifact().name, "deck.pptx");
    }
}
