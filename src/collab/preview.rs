//! Derived renditions of generated artifacts.
//!
//! After each maker call the generated document is converted to PDF (the
//! checker reviews that rendition when present) and rendered into thumbnail
//! images for observers. Conversion is optional: without a backend, or when
//! any step fails, the artifact is passed through untouched.

use std::sync::Arc;
use std::time::Duration;

use checkloop_common::{Artifact, OutputArtifact};
use futures::future::try_join_all;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::convert::{ConversionService, PDF_MIME};
use super::fetch::ArtifactFetcher;
use super::storage::ObjectStore;
use crate::errors::WorkflowResult;

pub struct PreviewRenderer {
    converter: Option<Arc<dyn ConversionService>>,
    fetcher: Arc<dyn ArtifactFetcher>,
    store: Arc<dyn ObjectStore>,
    ttl: Duration,
}

impl PreviewRenderer {
    pub fn new(
        converter: Option<Arc<dyn ConversionService>>,
        fetcher: Arc<dyn ArtifactFetcher>,
        store: Arc<dyn ObjectStore>,
        ttl: Duration,
    ) -> Self {
        Self {
            converter,
            fetcher,
            store,
            ttl,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.converter.is_some()
    }

    fn iteration_prefix(run_id: &str, iteration: u32) -> String {
        format!("runs/{}/iter-{}/", run_id, iteration)
    }

    /// Attach a PDF alternate and thumbnails to `artifact`. Never fails.
    pub async fn render(&self, run_id: &str, iteration: u32, artifact: Artifact) -> OutputArtifact {
        let Some(converter) = self.converter.as_ref() else {
            return OutputArtifact::new(artifact);
        };
        match self.try_render(converter.as_ref(), run_id, iteration, &artifact).await {
            Ok((alternate, thumbnail_urls)) => OutputArtifact {
                artifact,
                alternate,
                thumbnail_urls,
            },
            Err(e) => {
                warn!(run_id, iteration, error = %e, "Preview rendering failed, continuing without previews");
                OutputArtifact::new(artifact)
            }
        }
    }

    async fn try_render(
        &self,
        converter: &dyn ConversionService,
        run_id: &str,
        iteration: u32,
        artifact: &Artifact,
    ) -> WorkflowResult<(Option<Artifact>, Vec<String>)> {
        let source = self.fetcher.fetch(artifact).await?;
        let prefix = Self::iteration_prefix(run_id, iteration);
        let is_pdf = artifact.mime_type.as_deref() == Some(PDF_MIME)
            || artifact.extension().as_deref() == Some("pdf");

        let (pdf, alternate) = if is_pdf {
            (source, None)
        } else {
            let mime = artifact
                .mime_type
                .clone()
                .or_else(|| {
                    mime_guess::from_path(&artifact.name)
                        .first()
                        .map(|m| m.essence_str().to_string())
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let rendition = converter.to_pdf(source, &mime).await?;
            let stem = artifact
                .name
                .rsplit_once('.')
                .map(|(stem, _)| stem)
                .unwrap_or(&artifact.name);
            let name = format!("{}.pdf", stem);
            let size = rendition.bytes.len() as u64;
            let url = self
                .store
                .put(
                    rendition.bytes.clone(),
                    &format!("{}{}", prefix, name),
                    PDF_MIME,
                    self.ttl,
                )
                .await?;
            let alternate = Artifact::new(name, url)
                .with_mime_type(PDF_MIME)
                .with_size(size);
            (rendition.bytes, Some(alternate))
        };

        let images = converter.to_images(pdf).await?;
        let uploads = images.into_iter().enumerate().map(|(idx, image)| {
            let digest = Sha256::digest(&image);
            let path = format!("{}page-{}-{:x}.png", prefix, idx + 1, digest);
            async move { self.store.put(image, &path, "image/png", self.ttl).await }
        });
        let thumbnail_urls = try_join_all(uploads).await?;
        debug!(run_id, iteration, thumbnails = thumbnail_urls.len(), "Rendered previews");
        Ok((alternate, thumbnail_urls))
    }

    /// Delete previews of every iteration except `keep_iteration`. Best effort.
    pub async fn cleanup(&self, run_id: &str, keep_iteration: Option<u32>) {
        if !self.is_enabled() {
            return;
        }
        let run_prefix = format!("runs/{}/", run_id);
        let keep = keep_iteration.map(|n| Self::iteration_prefix(run_id, n));
        let urls = match self.store.list_by_prefix(&run_prefix).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!(run_id, error = %e, "Could not list previews for cleanup");
                return;
            }
        };
        let mut removed = 0usize;
        for url in urls {
            if keep.as_ref().is_some_and(|k| url.contains(k.as_str())) {
                continue;
            }
            match self.store.delete(&url).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(run_id, %url, error = %e, "Failed to delete preview"),
            }
        }
        debug!(run_id, removed, "Cleaned up superseded previews");
    }
}
