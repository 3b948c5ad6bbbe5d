//! Conference page and DOI landing page link resolution.
//!
//! All assumptions about page structure live here: the proceedings index
//! lists one paper per `<tr>` with the DOI link first and the PDF link
//! second, and a landing page advertises its PDF through
//! `<link rel="alternate" type="application/pdf">`.

use crate::error::{Result, ScrapeError};
use crate::http::{build_http_client, HttpConfig};
use crate::zenodo::record_id_from_doi;
use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

/// One row of the conference index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperLink {
    pub doi_url: String,
    /// Direct PDF link from the index, if the row had one
    pub pdf_url: Option<String>,
    /// Zenodo record id when the DOI link is a `doi.org` Zenodo link
    pub record_id: Option<u64>,
}

/// Page-structure boundary used by the pipeline
#[async_trait]
pub trait LinkResolver: Send + Sync {
    /// List the paper rows on a conference index page
    async fn list_papers(&self, page_url: &str) -> Result<Vec<PaperLink>>;

    /// Find the PDF link advertised by a landing page
    async fn resolve_pdf_url(&self, landing_url: &str) -> Result<Option<String>>;
}

/// Resolver that fetches pages over HTTP and parses them with `scraper`
pub struct HtmlLinkResolver {
    client: reqwest::Client,
}

impl HtmlLinkResolver {
    pub fn new(http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(http)?,
        })
    }

    /// Fetch page content, following redirects; returns the final URL and body
    async fn fetch_page(&self, url: &str) -> Result<(Url, String)> {
        let response = self
            .client
            .get(url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Api {
                code: status.as_u16() as i32,
                message: format!("HTTP error: {}", status),
            });
        }

        let final_url = response.url().clone();
        let body = response.text().await?;
        Ok((final_url, body))
    }
}

#[async_trait]
impl LinkResolver for HtmlLinkResolver {
    async fn list_papers(&self, page_url: &str) -> Result<Vec<PaperLink>> {
        let (base, html) = self.fetch_page(page_url).await?;
        let papers = parse_paper_rows(&html, &base)?;
        info!(url = page_url, count = papers.len(), "Parsed conference table");
        Ok(papers)
    }

    async fn resolve_pdf_url(&self, landing_url: &str) -> Result<Option<String>> {
        let (base, html) = self.fetch_page(landing_url).await?;
        let pdf_url = parse_pdf_link(&html, &base)?;
        debug!(landing = landing_url, pdf = ?pdf_url, "Resolved PDF link");
        Ok(pdf_url)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScrapeError::Parse(e.to_string()))
}

/// Resolve an `href` against the page it was found on
fn absolute(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok().map(String::from)
}

/// Parse the conference index table.
///
/// Rows without any anchor are ignored. The record id is only set for
/// `doi.org` Zenodo links.
pub fn parse_paper_rows(html: &str, base: &Url) -> Result<Vec<PaperLink>> {
    let document = Html::parse_document(html);
    let row_selector = selector("table tbody tr")?;
    let link_selector = selector("a")?;

    let mut papers = Vec::new();
    for row in document.select(&row_selector) {
        let mut hrefs = row
            .select(&link_selector)
            .map(|a| a.value().attr("href").and_then(|h| absolute(base, h)));

        let doi_url = match hrefs.next().flatten() {
            Some(url) => url,
            None => continue,
        };
        let pdf_url = hrefs.next().flatten();

        papers.push(PaperLink {
            record_id: record_id_from_doi(&doi_url),
            doi_url,
            pdf_url,
        });
    }

    Ok(papers)
}

/// Parse `<link rel="alternate" type="application/pdf" href=...>`
pub fn parse_pdf_link(html: &str, base: &Url) -> Result<Option<String>> {
    let document = Html::parse_document(html);
    let link_selector = selector(r#"link[rel="alternate"][type="application/pdf"]"#)?;

    Ok(document
        .select(&link_selector)
        .filter_map(|link| link.value().attr("href"))
        .find_map(|href| absolute(base, href)))
}
