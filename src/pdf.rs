//! PDF download and first/last page text extraction.
//!
//! The PDF is written to a temporary file that is removed when the
//! extraction finishes, whether it succeeds or not. Every failure is logged
//! and reported as "no text" so one bad document never stops a batch.

use crate::error::{Result, ScrapeError};
use crate::http::{build_http_client, HttpConfig};
use async_trait::async_trait;
use lopdf::Document;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Text of the first and last page of a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageText {
    pub first: String,
    pub last: String,
    pub page_count: usize,
}

impl PageText {
    /// True when first and last page are the same page
    pub fn is_single_page(&self) -> bool {
        self.page_count <= 1
    }
}

/// Source of page text for a PDF URL. `None` means no text is available.
#[async_trait]
pub trait PageTextSource: Send + Sync {
    async fn page_text(&self, pdf_url: &str) -> Option<PageText>;
}

/// Downloads PDFs over HTTP and extracts page text with `lopdf`
pub struct PdfTextExtractor {
    client: reqwest::Client,
}

impl PdfTextExtractor {
    pub fn new(http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(http)?,
        })
    }

    async fn download(&self, pdf_url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(pdf_url)
            .header("Accept", "application/pdf,*/*")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ScrapeError::Api {
                code: response.status().as_u16() as i32,
                message: format!("PDF download failed: {}", response.status()),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn try_page_text(&self, pdf_url: &str) -> Result<PageText> {
        let bytes = self.download(pdf_url).await?;
        debug!(url = pdf_url, bytes = bytes.len(), "Downloaded PDF");
        extract_from_bytes(&bytes)
    }
}

#[async_trait]
impl PageTextSource for PdfTextExtractor {
    async fn page_text(&self, pdf_url: &str) -> Option<PageText> {
        match self.try_page_text(pdf_url).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(url = pdf_url, error = %e, "Error processing PDF");
                None
            }
        }
    }
}

/// Write bytes to a scoped temporary file and extract its page text
pub fn extract_from_bytes(bytes: &[u8]) -> Result<PageText> {
    extract_from_bytes_in(bytes, &std::env::temp_dir())
}

/// Same as [`extract_from_bytes`] with the temporary file placed in `dir`
pub fn extract_from_bytes_in(bytes: &[u8], dir: &Path) -> Result<PageText> {
    let mut temp = tempfile::Builder::new()
        .prefix("rustismir-")
        .suffix(".pdf")
        .tempfile_in(dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;

    // On error the NamedTempFile drop removes the file
    let text = extract_first_last(temp.path())?;

    if let Err(e) = temp.close() {
        warn!(error = %e, "Failed to remove temporary PDF");
    }
    Ok(text)
}

/// Extract text of the first and last page of the PDF at `path`
pub fn extract_first_last(path: &Path) -> Result<PageText> {
    let doc = Document::load(path).map_err(|e| ScrapeError::Pdf(e.to_string()))?;

    let pages = doc.get_pages();
    let (first_num, last_num) = match (pages.keys().next(), pages.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(ScrapeError::Pdf("document has no pages".to_string())),
    };

    let first = doc
        .extract_text(&[first_num])
        .map_err(|e| ScrapeError::Pdf(e.to_string()))?;
    let last = if last_num == first_num {
        first.clone()
    } else {
        doc.extract_text(&[last_num])
            .map_err(|e| ScrapeError::Pdf(e.to_string()))?
    };

    Ok(PageText {
        first,
        last,
        page_count: pages.len(),
    })
}
