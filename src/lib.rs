//! # rustismir
//!
//! ISMIR proceedings scraper - Zenodo metadata, PDF text and LLM affiliation extraction
//!
//! ## Modules
//!
//! - [`resolver`] - Conference index and DOI landing page link resolution
//! - [`zenodo`] - Zenodo records API client
//! - [`pdf`] - PDF download and first/last page text extraction
//! - [`affiliations`] - LLM-based affiliation inference with retry
//! - [`literal`] - Parser for the model's mapping literal
//! - [`pipeline`] - Scrape and post-process orchestration
//! - [`table`] - CSV output table
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustismir::affiliations::OpenAiChat;
//! use rustismir::http::HttpConfig;
//! use rustismir::pdf::PdfTextExtractor;
//! use rustismir::pipeline::Pipeline;
//! use rustismir::resolver::HtmlLinkResolver;
//! use rustismir::zenodo::{ZenodoClient, ZENODO_API_URL};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let http = HttpConfig::default();
//!     let pipeline: Pipeline<_, _, _, OpenAiChat> = Pipeline::new(
//!         HtmlLinkResolver::new(&http)?,
//!         ZenodoClient::new(ZENODO_API_URL, &http)?,
//!         PdfTextExtractor::new(&http)?,
//!         None,
//!     );
//!     let table = pipeline
//!         .scrape_conference("https://ismir.net/conferences/ismir2004.html")
//!         .await?;
//!     println!("Scraped {} papers", table.len());
//!     Ok(())
//! }
//! ```

pub mod affiliations;
pub mod error;
pub mod http;
pub mod literal;
pub mod pdf;
pub mod pipeline;
pub mod prompts;
pub mod resolver;
pub mod retry;
pub mod table;
pub mod zenodo;

pub use error::{Result, ScrapeError};
