//! rustismir - ISMIR proceedings scraper
//!
//! Scrapes ISMIR conference index pages, fetches each paper's metadata from
//! Zenodo and optionally asks a language model for author affiliations.
//!
//! ## Usage
//!
//! ### Scrape
//! ```bash
//! rustismir scrape https://ismir.net/conferences/ismir2004.html --output data
//! ```
//!
//! ### Post-process
//! ```bash
//! OPENAI_API_KEY=... rustismir postprocess --data-dir data
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rustismir::affiliations::{
    AffiliationExtractor, LlmConfig, OpenAiChat, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL,
};
use rustismir::http::HttpConfig;
use rustismir::pdf::PdfTextExtractor;
use rustismir::pipeline::Pipeline;
use rustismir::resolver::HtmlLinkResolver;
use rustismir::retry::{RetryPolicy, DEFAULT_DELAY_SECS, DEFAULT_MAX_ATTEMPTS};
use rustismir::table::year_from_url;
use rustismir::zenodo::{ZenodoClient, ZENODO_API_URL};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// ISMIR proceedings pages scraped when no URL is given (2000-2005, 2021)
const DEFAULT_URLS: &[&str] = &[
    "https://ismir.net/conferences/ismir2000.html",
    "https://ismir.net/conferences/ismir2001.html",
    "https://ismir.net/conferences/ismir2002.html",
    "https://ismir.net/conferences/ismir2003.html",
    "https://ismir.net/conferences/ismir2004.html",
    "https://ismir.net/conferences/ismir2005.html",
    "https://ismir.net/conferences/ismir2021.html",
];

type IsmirPipeline = Pipeline<HtmlLinkResolver, ZenodoClient, PdfTextExtractor, OpenAiChat>;

// ============================================================================
// CLI Definition
// ============================================================================

/// ISMIR proceedings scraper with LLM affiliation extraction
#[derive(Parser)]
#[command(name = "rustismir")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape conference index pages into one CSV table per year
    Scrape {
        /// Conference index URLs (defaults to ISMIR 2000-2005 and 2021)
        urls: Vec<String>,

        /// Output directory
        #[arg(short, long, default_value = "data")]
        output: PathBuf,

        /// Table file prefix: `{prefix}_{year}.csv`
        #[arg(long, default_value = "ismir")]
        prefix: String,

        /// Run affiliation inference on each PDF during the scrape
        #[arg(long)]
        with_affiliations: bool,

        #[command(flatten)]
        net: NetArgs,

        #[command(flatten)]
        llm: LlmArgs,
    },

    /// Fill the affiliations column of existing tables
    Postprocess {
        /// Table file names inside the data directory (defaults to every .csv)
        files: Vec<String>,

        /// Directory holding the tables
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Keep rows whose affiliations column is already filled
        #[arg(long)]
        skip_populated: bool,

        #[command(flatten)]
        net: NetArgs,

        #[command(flatten)]
        llm: LlmArgs,
    },
}

#[derive(Args)]
struct NetArgs {
    /// Zenodo API base URL
    #[arg(long, default_value = ZENODO_API_URL)]
    zenodo_url: String,

    /// HTTP request timeout in seconds (no timeout by default)
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Args)]
struct LlmArgs {
    /// LLM API base URL
    #[arg(long, default_value = DEFAULT_LLM_BASE_URL)]
    llm_base_url: String,

    /// LLM API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    llm_key: Option<String>,

    /// LLM model name
    #[arg(long, default_value = DEFAULT_LLM_MODEL)]
    llm_model: String,

    /// Attempts per LLM call before giving up
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Fixed delay between LLM attempts in seconds
    #[arg(long, default_value_t = DEFAULT_DELAY_SECS)]
    retry_delay_secs: u64,
}

impl LlmArgs {
    fn extractor(&self, http: &HttpConfig) -> Result<AffiliationExtractor<OpenAiChat>> {
        let api_key = self
            .llm_key
            .clone()
            .context("LLM API key missing: set OPENAI_API_KEY or pass --llm-key")?;

        let config = LlmConfig {
            base_url: self.llm_base_url.clone(),
            model: self.llm_model.clone(),
            ..LlmConfig::new(api_key)
        };
        let retry = RetryPolicy::new(self.max_attempts, Duration::from_secs(self.retry_delay_secs));

        Ok(AffiliationExtractor::new(OpenAiChat::new(config, http)?, retry))
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    match cli.command {
        Commands::Scrape {
            urls,
            output,
            prefix,
            with_affiliations,
            net,
            llm,
        } => {
            let llm = with_affiliations.then_some(&llm);
            run_scrape(urls, &output, &prefix, &net, llm).await
        }
        Commands::Postprocess {
            files,
            data_dir,
            skip_populated,
            net,
            llm,
        } => run_postprocess(files, &data_dir, skip_populated, &net, &llm).await,
    }
}

fn build_pipeline(net: &NetArgs, llm: Option<&LlmArgs>) -> Result<IsmirPipeline> {
    let http = HttpConfig::with_timeout_secs(net.timeout_secs);
    let extractor = llm.map(|args| args.extractor(&http)).transpose()?;

    Ok(Pipeline::new(
        HtmlLinkResolver::new(&http)?,
        ZenodoClient::new(net.zenodo_url.clone(), &http)?,
        PdfTextExtractor::new(&http)?,
        extractor,
    ))
}

// ============================================================================
// Scrape
// ============================================================================

async fn run_scrape(
    urls: Vec<String>,
    output: &Path,
    prefix: &str,
    net: &NetArgs,
    llm: Option<&LlmArgs>,
) -> Result<()> {
    let urls = if urls.is_empty() {
        DEFAULT_URLS.iter().map(|u| u.to_string()).collect()
    } else {
        urls
    };
    let pipeline = build_pipeline(net, llm)?;

    println!("Output folder: {}", output.display());
    for url in &urls {
        println!("\n--- Scraping papers for year: {} ---", year_from_url(url));

        let path = pipeline
            .scrape_to_file(url, output, prefix)
            .await
            .with_context(|| format!("Failed to scrape {}", url))?;

        println!("Saved: {}", path.display());
    }

    info!(pages = urls.len(), "Scrape complete");
    Ok(())
}

// ============================================================================
// Post-process
// ============================================================================

async fn run_postprocess(
    files: Vec<String>,
    data_dir: &Path,
    skip_populated: bool,
    net: &NetArgs,
    llm: &LlmArgs,
) -> Result<()> {
    let paths = if files.is_empty() {
        list_tables(data_dir)?
    } else {
        files.iter().map(|f| data_dir.join(f)).collect()
    };

    if paths.is_empty() {
        println!("No tables found in {}", data_dir.display());
        return Ok(());
    }

    let pipeline = build_pipeline(net, Some(llm))?;

    for (idx, path) in paths.iter().enumerate() {
        println!(
            "\n--- Postprocessing {} ({}/{}) ---",
            path.display(),
            idx + 1,
            paths.len()
        );

        let rows = pipeline
            .postprocess_file(path, skip_populated)
            .await
            .with_context(|| format!("Failed to postprocess {}", path.display()))?;

        println!("Finished processing: {} ({} rows)", path.display(), rows);
    }

    Ok(())
}

/// Every `.csv` file in `dir`, sorted by name
fn list_tables(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read data directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
