use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::errors::{WorkflowError, WorkflowResult};
use crate::http::{HttpClient, read_bytes};

pub const PDF_MIME: &str = "application/pdf";

/// Header carrying the page count of a converted PDF.
const PAGE_COUNT_HEADER: &str = "x-page-count";

/// A document converted to PDF.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfRendition {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub page_count: u32,
}

/// Document conversion backend used for review fidelity and preview thumbnails.
#[async_trait]
pub trait ConversionService: Send + Sync {
    async fn to_pdf(&self, bytes: Vec<u8>, mime_type: &str) -> WorkflowResult<PdfRendition>;

    /// Render each page of a PDF to a PNG image, in page order.
    async fn to_images(&self, pdf: Vec<u8>) -> WorkflowResult<Vec<Vec<u8>>>;
}

/// Conversion over HTTP.
///
/// - `POST {base}/pdf` with the source bytes returns the PDF body and an
///   `x-page-count` header
/// - `POST {base}/images?page=N` with the PDF returns page N as PNG, 404 past the end
pub struct HttpConversionService {
    http: HttpClient,
    base_url: String,
    max_pages: u32,
}

impl HttpConversionService {
    pub fn new(http: HttpClient, base_url: &str, max_pages: u32) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_pages,
        }
    }
}

#[async_trait]
impl ConversionService for HttpConversionService {
    async fn to_pdf(&self, bytes: Vec<u8>, mime_type: &str) -> WorkflowResult<PdfRendition> {
        let url = format!("{}/pdf", self.base_url);
        let response = self
            .http
            .execute(|c| {
                c.post(&url)
                    .header(CONTENT_TYPE, mime_type)
                    .body(bytes.clone())
            })
            .await?;
        let page_count = response
            .headers()
            .get(PAGE_COUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(0);
        let pdf = read_bytes(self.http.service(), response).await?;
        if pdf.is_empty() {
            return Err(WorkflowError::invalid_response(
                self.http.service(),
                "conversion returned an empty document",
            ));
        }
        Ok(PdfRendition {
            bytes: pdf,
            mime_type: PDF_MIME.to_string(),
            page_count,
        })
    }

    async fn to_images(&self, pdf: Vec<u8>) -> WorkflowResult<Vec<Vec<u8>>> {
        let mut pages = Vec::new();
        for page in 1..=self.max_pages {
            let url = format!("{}/images", self.base_url);
            let result = self
                .http
                .send_bytes(|c| {
                    c.post(&url)
                        .query(&[("page", page)])
                        .header(CONTENT_TYPE, PDF_MIME)
                        .body(pdf.clone())
                })
                .await;
            match result {
                Ok(image) => pages.push(image),
                Err(WorkflowError::NotFoundTransient { .. }) => break,
                Err(e) => return Err(e),
            }
        }
        debug!(pages = pages.len(), "Rendered preview pages");
        Ok(pages)
    }
}
