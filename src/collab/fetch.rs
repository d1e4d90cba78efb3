use async_trait::async_trait;
use checkloop_common::Artifact;

use crate::errors::WorkflowResult;
use crate::http::HttpClient;

/// Downloads artifact contents so they can be converted.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, artifact: &Artifact) -> WorkflowResult<Vec<u8>>;
}

pub struct HttpArtifactFetcher {
    http: HttpClient,
}

impl HttpArtifactFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch(&self, artifact: &Artifact) -> WorkflowResult<Vec<u8>> {
        self.http.send_bytes(|c| c.get(&artifact.url)).await
    }
}
