//! Zenodo records API client.
//!
//! ISMIR proceedings are hosted on Zenodo; each paper's DOI encodes its
//! numeric record id (`10.5281/zenodo.<id>`). Failures here are not
//! retried and propagate to the caller.

use crate::error::{OptionExt, Result, ScrapeError};
use crate::http::{build_http_client, HttpConfig};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::debug;

/// Zenodo API base URL
pub const ZENODO_API_URL: &str = "https://zenodo.org/api";

/// One paper's metadata as hosted on Zenodo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: u64,
    pub title: String,
    /// Author names in listed order
    pub authors: Vec<String>,
    pub abstract_text: String,
    pub year: i32,
    pub doi_url: String,
}

/// Source of record metadata keyed by numeric id
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_record(&self, record_id: u64) -> Result<Record>;
}

/// Zenodo API Response Types
#[derive(Debug, Deserialize)]
struct ZenodoResponse {
    doi_url: String,
    metadata: ZenodoMetadata,
}

#[derive(Debug, Deserialize)]
struct ZenodoMetadata {
    title: String,
    creators: Vec<ZenodoCreator>,
    #[serde(default)]
    description: String,
    publication_date: String,
}

#[derive(Debug, Deserialize)]
struct ZenodoCreator {
    name: String,
}

/// Zenodo records client
pub struct ZenodoClient {
    client: reqwest::Client,
    base_url: String,
}

impl ZenodoClient {
    pub fn new(base_url: impl Into<String>, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(http)?,
            base_url: base_url.into(),
        })
    }

    fn record_url(&self, record_id: u64) -> String {
        format!("{}/records/{}", self.base_url.trim_end_matches('/'), record_id)
    }
}

#[async_trait]
impl MetadataSource for ZenodoClient {
    async fn fetch_record(&self, record_id: u64) -> Result<Record> {
        let url = self.record_url(record_id);
        debug!(record_id = record_id, url = %url, "Fetching Zenodo record");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ScrapeError::Api {
                code: response.status().as_u16() as i32,
                message: format!("Zenodo API error for record {}: {}", record_id, response.status()),
            });
        }

        let body = response.text().await?;
        parse_record(record_id, &body)
    }
}

/// Parse a Zenodo record JSON body
pub fn parse_record(record_id: u64, body: &str) -> Result<Record> {
    let data: ZenodoResponse = serde_json::from_str(body)?;
    let year = parse_year(&data.metadata.publication_date)?;

    Ok(Record {
        id: record_id,
        title: data.metadata.title,
        authors: data.metadata.creators.into_iter().map(|c| c.name).collect(),
        abstract_text: data.metadata.description,
        year,
        doi_url: data.doi_url,
    })
}

/// Year from the first four characters of a publication date
pub fn parse_year(publication_date: &str) -> Result<i32> {
    publication_date
        .get(..4)
        .and_then(|y| y.parse().ok())
        .ok_or_parse(&format!("Invalid publication date: {:?}", publication_date))
}

fn zenodo_id_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"zenodo\.(\d+)").ok()).as_ref()
}

/// Zenodo record id from a `doi.org` link, `None` for any other link
pub fn record_id_from_doi(doi_link: &str) -> Option<u64> {
    if !doi_link.contains("doi.org") {
        return None;
    }
    zenodo_id_regex()?
        .captures(doi_link)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
