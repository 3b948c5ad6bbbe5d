//! Scrape and post-process orchestration.
//!
//! Each record moves through PDF link resolution, text extraction and
//! affiliation inference. Any of those steps may degrade to an empty value;
//! none of them aborts the batch. Only the metadata fetch is fatal.

use crate::affiliations::{AffiliationExtractor, AffiliationMap, ChatModel};
use crate::error::{Result, ScrapeError};
use crate::pdf::PageTextSource;
use crate::resolver::{LinkResolver, PaperLink};
use crate::table::{table_path, year_from_url, Row, Table};
use crate::zenodo::MetadataSource;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A paper with a known record id and, if found, its PDF link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaper {
    pub record_id: u64,
    pub doi_url: String,
    pub pdf_url: Option<String>,
}

/// Infer affiliations for one PDF.
///
/// The first page is tried first; the last page is only tried when the first
/// page produced a valid but empty mapping. A failed inference on the first
/// page does not fall back.
pub async fn infer_affiliations<P, C>(
    pages: &P,
    extractor: &AffiliationExtractor<C>,
    pdf_url: &str,
) -> AffiliationMap
where
    P: PageTextSource,
    C: ChatModel,
{
    let Some(text) = pages.page_text(pdf_url).await else {
        return AffiliationMap::new();
    };

    match extractor.extract(&text.first).await {
        Some(map) if !map.is_empty() => map,
        Some(_) if text.is_single_page() => {
            debug!(url = pdf_url, "Single-page document, no last-page fallback");
            AffiliationMap::new()
        }
        Some(_) => {
            debug!(url = pdf_url, "First page has no affiliations, trying last page");
            extractor.extract(&text.last).await.unwrap_or_default()
        }
        None => {
            warn!(url = pdf_url, "Affiliation inference failed, leaving empty");
            AffiliationMap::new()
        }
    }
}

/// Sequential scraping pipeline over pluggable collaborators
pub struct Pipeline<L, M, P, C> {
    resolver: L,
    metadata: M,
    pages: P,
    affiliations: Option<AffiliationExtractor<C>>,
}

impl<L, M, P, C> Pipeline<L, M, P, C>
where
    L: LinkResolver,
    M: MetadataSource,
    P: PageTextSource,
    C: ChatModel,
{
    /// `affiliations` may be `None` for a scrape without the LLM stage
    pub fn new(
        resolver: L,
        metadata: M,
        pages: P,
        affiliations: Option<AffiliationExtractor<C>>,
    ) -> Self {
        Self {
            resolver,
            metadata,
            pages,
            affiliations,
        }
    }

    fn extractor(&self) -> Result<&AffiliationExtractor<C>> {
        self.affiliations
            .as_ref()
            .ok_or_else(|| ScrapeError::Config("LLM affiliation stage is not configured".to_string()))
    }

    /// List a conference page and resolve each paper's PDF link.
    ///
    /// Rows without a Zenodo DOI are skipped. A repeated record id keeps its
    /// first position and takes the newer PDF link.
    pub async fn collect_papers(&self, page_url: &str) -> Result<Vec<ResolvedPaper>> {
        let links = self.resolver.list_papers(page_url).await?;
        let mut papers: Vec<ResolvedPaper> = Vec::with_capacity(links.len());

        for link in links {
            let PaperLink {
                doi_url,
                pdf_url,
                record_id,
            } = link;

            let Some(record_id) = record_id else {
                info!(link = %doi_url, "No doi.org link found, skipping paper");
                continue;
            };

            let pdf_url = match pdf_url {
                Some(url) => Some(url),
                None => self.resolve_pdf(&doi_url).await,
            };

            match papers.iter_mut().find(|p| p.record_id == record_id) {
                Some(existing) => existing.pdf_url = pdf_url,
                None => papers.push(ResolvedPaper {
                    record_id,
                    doi_url,
                    pdf_url,
                }),
            }
        }

        Ok(papers)
    }

    /// PDF link from a landing page; failures are logged and yield `None`
    async fn resolve_pdf(&self, landing_url: &str) -> Option<String> {
        debug!(landing = landing_url, "Resolving PDF link from landing page");
        match self.resolver.resolve_pdf_url(landing_url).await {
            Ok(Some(url)) => Some(url),
            Ok(None) => {
                warn!(landing = landing_url, "No PDF link on landing page");
                None
            }
            Err(e) => {
                warn!(landing = landing_url, error = %e, "Failed to retrieve PDF link");
                None
            }
        }
    }

    /// Scrape one conference page into a table.
    ///
    /// When the affiliation stage is configured it runs inline on each
    /// paper's PDF; otherwise the affiliations column is left empty.
    pub async fn scrape_conference(&self, page_url: &str) -> Result<Table> {
        info!(url = page_url, "Extracting metadata");
        let papers = self.collect_papers(page_url).await?;
        let total = papers.len();

        let mut table = Table::new();
        for (idx, paper) in papers.iter().enumerate() {
            info!(
                record_id = paper.record_id,
                index = idx + 1,
                total = total,
                "Parsing record"
            );
            let record = self.metadata.fetch_record(paper.record_id).await?;

            let affiliations = match (&self.affiliations, &paper.pdf_url) {
                (Some(extractor), Some(pdf_url)) => {
                    infer_affiliations(&self.pages, extractor, pdf_url).await.format()
                }
                _ => String::new(),
            };

            table.push(Row::from_record(&record, affiliations));
        }

        info!(url = page_url, rows = table.len(), "Conference scraped");
        Ok(table)
    }

    /// Scrape a conference page and write `{dir}/{prefix}_{year}.csv`
    pub async fn scrape_to_file(&self, page_url: &str, dir: &Path, prefix: &str) -> Result<PathBuf> {
        let year = year_from_url(page_url);
        info!(year = %year, "Scraping conference papers");

        let table = self.scrape_conference(page_url).await?;
        std::fs::create_dir_all(dir)?;
        let path = table_path(dir, prefix, &year);
        table.write_csv(&path)?;
        Ok(path)
    }

    /// Affiliations for a paper given its DOI landing page
    pub async fn affiliations_for_landing(&self, doi_url: &str) -> Result<AffiliationMap> {
        let extractor = self.extractor()?;
        let map = match self.resolve_pdf(doi_url).await {
            Some(pdf_url) => infer_affiliations(&self.pages, extractor, &pdf_url).await,
            None => AffiliationMap::new(),
        };
        Ok(map)
    }

    /// Rebuild a table with a freshly inferred affiliations column.
    ///
    /// With `skip_populated`, rows that already carry affiliations are kept as is.
    pub async fn postprocess_table(&self, table: &Table, skip_populated: bool) -> Result<Table> {
        self.extractor()?;
        let total = table.len();

        let mut out = Table::new();
        for (idx, row) in table.rows().iter().enumerate() {
            if skip_populated && !row.affiliations.trim().is_empty() {
                debug!(link = %row.link, "Affiliations already present, skipping");
                out.push(row.clone());
                continue;
            }

            info!(
                link = %row.link,
                index = idx + 1,
                total = total,
                "Getting affiliations"
            );
            let map = self.affiliations_for_landing(&row.link).await?;
            out.push(row.with_affiliations(map.format()));
        }

        Ok(out)
    }

    /// Load, enrich and overwrite a table file; returns the row count
    pub async fn postprocess_file(&self, path: &Path, skip_populated: bool) -> Result<usize> {
        info!(path = %path.display(), "Generating affiliations");
        let table = Table::read_csv(path)?;
        let updated = self.postprocess_table(&table, skip_populated).await?;
        updated.write_csv(path)?;
        info!(path = %path.display(), "Finished processing");
        Ok(updated.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::PageText;
    use crate::retry::RetryPolicy;
    use crate::zenodo::Record;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MockResolver {
        papers: Vec<PaperLink>,
        landing: HashMap<String, String>,
        resolved: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LinkResolver for MockResolver {
        async fn list_papers(&self, _page_url: &str) -> Result<Vec<PaperLink>> {
            Ok(self.papers.clone())
        }

        async fn resolve_pdf_url(&self, landing_url: &str) -> Result<Option<String>> {
            self.resolved.lock().expect("lock").push(landing_url.to_string());
            if landing_url.contains("broken") {
                return Err(ScrapeError::Parse("page layout changed".to_string()));
            }
            Ok(self.landing.get(landing_url).cloned())
        }
    }

    #[derive(Default)]
    struct MockMetadata {
        records: HashMap<u64, Record>,
    }

    #[async_trait]
    impl MetadataSource for MockMetadata {
        async fn fetch_record(&self, record_id: u64) -> Result<Record> {
            self.records
                .get(&record_id)
                .cloned()
                .ok_or_else(|| ScrapeError::Parse(format!("malformed record {}", record_id)))
        }
    }

    #[derive(Default)]
    struct MockPages {
        texts: HashMap<String, PageText>,
    }

    #[async_trait]
    impl PageTextSource for MockPages {
        async fn page_text(&self, pdf_url: &str) -> Option<PageText> {
            self.texts.get(pdf_url).cloned()
        }
    }

    /// Replies keyed by page text; unknown text is a call error
    #[derive(Default)]
    struct MockModel {
        replies: HashMap<String, String>,
        seen: Mutex<Vec<String>>,
    }

    impl MockModel {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().map(|s| s.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl ChatModel for MockModel {
        async fn complete(&self, _system: &str, user: &str) -> Result<String> {
            self.seen.lock().expect("lock").push(user.to_string());
            self.replies.get(user).cloned().ok_or_else(|| ScrapeError::Api {
                code: 429,
                message: "rate limited".to_string(),
            })
        }
    }

    type TestPipeline = Pipeline<MockResolver, MockMetadata, MockPages, MockModel>;

    fn record(id: u64, authors: &[&str]) -> Record {
        Record {
            id,
            title: format!("Paper {}", id),
            authors: authors.iter().map(|a| a.to_string()).collect(),
            abstract_text: format!("Abstract {}", id),
            year: 2004,
            doi_url: format!("https://doi.org/10.5281/zenodo.{}", id),
        }
    }

    fn link(id: Option<u64>, doi: &str, pdf: Option<&str>) -> PaperLink {
        PaperLink {
            doi_url: doi.to_string(),
            pdf_url: pdf.map(String::from),
            record_id: id,
        }
    }

    fn pages(first: &str, last: &str, page_count: usize) -> PageText {
        PageText {
            first: first.to_string(),
            last: last.to_string(),
            page_count,
        }
    }

    fn extractor(replies: &[(&str, &str)]) -> AffiliationExtractor<MockModel> {
        let model = MockModel {
            replies: replies
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        };
        AffiliationExtractor::new(model, RetryPolicy::new(3, Duration::ZERO))
    }

    fn row(link: &str, affiliations: &str) -> Row {
        Row {
            authors: "A;B".to_string(),
            title: "T".to_string(),
            year: 2001,
            link: link.to_string(),
            affiliations: affiliations.to_string(),
            abstract_text: String::new(),
        }
    }

    #[tokio::test]
    async fn test_scrape_skips_missing_ids_and_resolves_pdf() -> Result<()> {
        let resolver = MockResolver {
            papers: vec![
                link(Some(1), "https://doi.org/10.5281/zenodo.1", Some("https://x/1.pdf")),
                link(None, "http://example.org/no-doi", Some("https://x/n.pdf")),
                link(Some(2), "https://doi.org/10.5281/zenodo.2", None),
            ],
            landing: HashMap::from([(
                "https://doi.org/10.5281/zenodo.2".to_string(),
                "https://x/2.pdf".to_string(),
            )]),
            ..Default::default()
        };
        let metadata = MockMetadata {
            records: HashMap::from([(1, record(1, &["A", "B"])), (2, record(2, &["C"]))]),
        };
        let pipeline: TestPipeline = Pipeline::new(resolver, metadata, MockPages::default(), None);

        let papers = pipeline.collect_papers("https://ismir.net/conferences/ismir2004.html").await?;
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[1].pdf_url.as_deref(), Some("https://x/2.pdf"));

        let table = pipeline.scrape_conference("https://ismir.net/conferences/ismir2004.html").await?;
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].authors, "A;B");
        assert_eq!(table.rows()[0].affiliations, "");
        assert_eq!(table.rows()[1].title, "Paper 2");
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_record_keeps_first_position() -> Result<()> {
        let resolver = MockResolver {
            papers: vec![
                link(Some(1), "https://doi.org/10.5281/zenodo.1", Some("https://x/old.pdf")),
                link(Some(2), "https://doi.org/10.5281/zenodo.2", Some("https://x/2.pdf")),
                link(Some(1), "https://doi.org/10.5281/zenodo.1", Some("https://x/new.pdf")),
            ],
            ..Default::default()
        };
        let pipeline: TestPipeline =
            Pipeline::new(resolver, MockMetadata::default(), MockPages::default(), None);

        let papers = pipeline.collect_papers("page").await?;
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].record_id, 1);
        assert_eq!(papers[0].pdf_url.as_deref(), Some("https://x/new.pdf"));
        Ok(())
    }

    #[tokio::test]
    async fn test_landing_failure_degrades_to_missing_pdf() -> Result<()> {
        let resolver = MockResolver {
            papers: vec![link(Some(3), "https://doi.org/10.5281/zenodo.3/broken", None)],
            ..Default::default()
        };
        let pipeline: TestPipeline =
            Pipeline::new(resolver, MockMetadata::default(), MockPages::default(), None);

        let papers = pipeline.collect_papers("page").await?;
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].pdf_url, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_metadata_failure_aborts_scrape() {
        let resolver = MockResolver {
            papers: vec![link(Some(9), "https://doi.org/10.5281/zenodo.9", Some("https://x/9.pdf"))],
            ..Default::default()
        };
        let pipeline: TestPipeline =
            Pipeline::new(resolver, MockMetadata::default(), MockPages::default(), None);

        assert!(pipeline.scrape_conference("page").await.is_err());
    }

    #[tokio::test]
    async fn test_scrape_inline_affiliations() -> Result<()> {
        let resolver = MockResolver {
            papers: vec![link(Some(1), "https://doi.org/10.5281/zenodo.1", Some("https://x/1.pdf"))],
            ..Default::default()
        };
        let metadata = MockMetadata {
            records: HashMap::from([(1, record(1, &["A", "B"]))]),
        };
        let pages = MockPages {
            texts: HashMap::from([("https://x/1.pdf".to_string(), pages("P1", "P9", 9))]),
        };
        let pipeline = Pipeline::new(
            resolver,
            metadata,
            pages,
            Some(extractor(&[("P1", r#"{"A": "X", "B": ""}"#)])),
        );

        let table = pipeline.scrape_conference("page").await?;
        assert_eq!(table.rows()[0].affiliations, "A, X;B, ");
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_first_page_falls_back_to_last() {
        let source = MockPages {
            texts: HashMap::from([("pdf".to_string(), pages("FIRST", "LAST", 4))]),
        };
        let ex = extractor(&[("FIRST", "{}"), ("LAST", r#"{"A": "X"}"#)]);

        let map = infer_affiliations(&source, &ex, "pdf").await;
        assert_eq!(map.get("A"), Some("X"));
        assert_eq!(ex.model().seen(), vec!["FIRST", "LAST"]);
    }

    #[tokio::test]
    async fn test_empty_on_both_pages_settles_on_empty() {
        let source = MockPages {
            texts: HashMap::from([("pdf".to_string(), pages("FIRST", "LAST", 4))]),
        };
        let ex = extractor(&[("FIRST", "{ }"), ("LAST", "{}")]);

        assert!(infer_affiliations(&source, &ex, "pdf").await.is_empty());
        assert_eq!(ex.model().seen().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_first_page_does_not_fall_back() {
        let source = MockPages {
            texts: HashMap::from([("pdf".to_string(), pages("FIRST", "LAST", 4))]),
        };
        let ex = extractor(&[("FIRST", "Sorry, I cannot help"), ("LAST", r#"{"A": "X"}"#)]);

        assert!(infer_affiliations(&source, &ex, "pdf").await.is_empty());
        assert_eq!(ex.model().seen(), vec!["FIRST", "FIRST", "FIRST"]);
    }

    #[tokio::test]
    async fn test_single_page_does_not_repeat_call() {
        let source = MockPages {
            texts: HashMap::from([("pdf".to_string(), pages("ONLY", "ONLY", 1))]),
        };
        let ex = extractor(&[("ONLY", "{}")]);

        assert!(infer_affiliations(&source, &ex, "pdf").await.is_empty());
        assert_eq!(ex.model().seen().len(), 1);
    }

    #[tokio::test]
    async fn test_postprocess_bad_pdf_does_not_stop_batch() -> Result<()> {
        let resolver = MockResolver {
            landing: HashMap::from([
                ("https://doi.org/bad".to_string(), "https://x/bad.pdf".to_string()),
                ("https://doi.org/good".to_string(), "https://x/good.pdf".to_string()),
            ]),
            ..Default::default()
        };
        // bad.pdf has no entry: the extractor reports no text
        let pages = MockPages {
            texts: HashMap::from([("https://x/good.pdf".to_string(), pages("G1", "G2", 2))]),
        };
        let pipeline = Pipeline::new(
            resolver,
            MockMetadata::default(),
            pages,
            Some(extractor(&[("G1", r#"{"A": "X", "B": ""}"#)])),
        );

        let table: Table = vec![row("https://doi.org/bad", ""), row("https://doi.org/good", "")]
            .into_iter()
            .collect();
        let out = pipeline.postprocess_table(&table, false).await?;

        assert_eq!(out.len(), 2);
        assert_eq!(out.rows()[0].affiliations, "");
        assert_eq!(out.rows()[1].affiliations, "A, X;B, ");
        assert_eq!(out.rows()[1].title, "T");
        Ok(())
    }

    #[tokio::test]
    async fn test_postprocess_skip_populated() -> Result<()> {
        let pipeline = Pipeline::new(
            MockResolver::default(),
            MockMetadata::default(),
            MockPages::default(),
            Some(extractor(&[])),
        );
        let table: Table = vec![row("https://doi.org/done", "A, X")].into_iter().collect();

        let out = pipeline.postprocess_table(&table, true).await?;
        assert_eq!(out.rows()[0].affiliations, "A, X");
        assert!(pipeline.resolver.resolved.lock().expect("lock").is_empty());

        let out = pipeline.postprocess_table(&table, false).await?;
        assert_eq!(out.rows()[0].affiliations, "");
        Ok(())
    }

    #[tokio::test]
    async fn test_postprocess_requires_llm_stage() {
        let pipeline: TestPipeline = Pipeline::new(
            MockResolver::default(),
            MockMetadata::default(),
            MockPages::default(),
            None,
        );
        let result = pipeline.postprocess_table(&Table::new(), false).await;
        assert!(matches!(result, Err(ScrapeError::Config(_))));
    }

    #[tokio::test]
    async fn test_scrape_and_postprocess_files() -> Result<()> {
        let dir = TempDir::new()?;
        let resolver = MockResolver {
            papers: vec![link(Some(1), "https://doi.org/10.5281/zenodo.1", Some("https://x/1.pdf"))],
            landing: HashMap::from([(
                "https://doi.org/10.5281/zenodo.1".to_string(),
                "https://x/1.pdf".to_string(),
            )]),
            ..Default::default()
        };
        let metadata = MockMetadata {
            records: HashMap::from([(1, record(1, &["A", "B"]))]),
        };
        let pages = MockPages {
            texts: HashMap::from([("https://x/1.pdf".to_string(), pages("", "P2", 2))]),
        };
        let pipeline = Pipeline::new(
            resolver,
            metadata,
            pages,
            Some(extractor(&[("P2", r#"{"B": "Queen Mary"}"#)])),
        );

        // Scrape without inline inference, then enrich in a second pass
        let scrape_only: TestPipeline = Pipeline::new(
            MockResolver {
                papers: pipeline.resolver.papers.clone(),
                ..Default::default()
            },
            MockMetadata {
                records: pipeline.metadata.records.clone(),
            },
            MockPages::default(),
            None,
        );
        let path = scrape_only
            .scrape_to_file("https://ismir.net/conferences/ismir2004.html", dir.path(), "ismir")
            .await?;
        assert_eq!(path, dir.path().join("ismir_2004.csv"));

        assert_eq!(pipeline.postprocess_file(&path, false).await?, 1);
        let table = Table::read_csv(&path)?;
        assert_eq!(table.rows()[0].affiliations, "B, Queen Mary");
        assert_eq!(table.rows()[0].authors, "A;B");
        Ok(())
    }
}
