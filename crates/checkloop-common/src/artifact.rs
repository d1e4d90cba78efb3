use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::seq;

/// A retrievable document: an input file, a reference sample, or a generated output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            url: url.into(),
            mime_type: None,
            size_bytes: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    /// Identity used for de-duplication: id, else url, else name.
    ///
    /// Keys are namespaced so an id never collides with a url of the same text.
    pub fn identity_key(&self) -> String {
        match (&self.id, self.url.is_empty()) {
            (Some(id), _) if !id.is_empty() => format!("id:{}", id),
            (_, false) => format!("url:{}", self.url),
            _ => format!("name:{}", self.name),
        }
    }

    /// Lower-cased file extension of the artifact name, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.name.rsplit('/').next().unwrap_or(&self.name);
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// Keep the first artifact for each identity key, preserving order.
pub fn dedupe_by_identity(artifacts: impl IntoIterator<Item = Artifact>) -> Vec<Artifact> {
    let mut seen = HashSet::new();
    artifacts
        .into_iter()
        .filter(|a| seen.insert(a.identity_key()))
        .collect()
}

/// The output of one maker call together with its derived renditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputArtifact {
    pub artifact: Artifact,
    /// Converted rendition (typically PDF) preferred by the checker when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate: Option<Artifact>,
    #[serde(default, deserialize_with = "seq::ordered")]
    pub thumbnail_urls: Vec<String>,
}

impl OutputArtifact {
    pub fn new(artifact: Artifact) -> Self {
        Self {
            artifact,
            alternate: None,
            thumbnail_urls: Vec::new(),
        }
    }

    /// The rendition the checker should review.
    pub fn review_target(&self) -> &Artifact {
        self.alternate.as_ref().unwrap_or(&self.artifact)
    }

    /// Stable identifier reported to observers: the artifact id, else its url.
    pub fn display_id(&self) -> &str {
        self.artifact.id.as_deref().unwrap_or(&self.artifact.url)
    }
}
