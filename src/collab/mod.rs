//! Collaborators around the maker and checker: file registration, blob
//! storage, document conversion, and preview rendering.

pub mod convert;
pub mod fetch;
pub mod files;
pub mod preview;
pub mod storage;

pub use convert::{ConversionService, HttpConversionService, PDF_MIME, PdfRendition};
pub use fetch::{ArtifactFetcher, HttpArtifactFetcher};
pub use files::{FileRegistry, KvFileRegistry};
pub use preview::PreviewRenderer;
pub use storage::{MemoryObjectStore, ObjectStore, StoredObject};

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use checkloop_common::Artifact;

    use super::{ArtifactFetcher, ConversionService, PDF_MIME, PdfRendition};
    use crate::errors::{WorkflowError, WorkflowResult};

    pub struct StaticFetcher(pub Vec<u8>);

    #[async_trait]
    impl ArtifactFetcher for StaticFetcher {
        async fn fetch(&self, _artifact: &Artifact) -> WorkflowResult<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    pub struct StubConverter {
        pub pages: usize,
    }

    #[async_trait]
    impl ConversionService for StubConverter {
        async fn to_pdf(&self, bytes: Vec<u8>, _mime_type: &str) -> WorkflowResult<PdfRendition> {
            let mut pdf = b"%PDF-".to_vec();
            pdf.extend(bytes);
            Ok(PdfRendition {
                bytes: pdf,
                mime_type: PDF_MIME.to_string(),
                page_count: self.pages as u32,
            })
        }

        async fn to_images(&self, _pdf: Vec<u8>) -> WorkflowResult<Vec<Vec<u8>>> {
            Ok((1..=self.pages).map(|p| format!("png-{}", p).into_bytes()).collect())
        }
    }

    pub struct FailingConverter;

    #[async_trait]
    impl ConversionService for FailingConverter {
        async fn to_pdf(&self, _bytes: Vec<u8>, _mime_type: &str) -> WorkflowResult<PdfRendition> {
            Err(WorkflowError::Upstream {
                service: "conversion",
                status: 503,
                message: "unavailable".to_string(),
            })
        }

        async fn to_images(&self, _pdf: Vec<u8>) -> WorkflowResult<Vec<Vec<u8>>> {
            Err(WorkflowError::Upstream {
                service: "conversion",
                status: 503,
                message: "unavailable".to_string(),
            })
        }
    }
}
