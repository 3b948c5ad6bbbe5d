//! Output table: one row per paper, persisted as CSV.

use crate::error::Result;
use crate::zenodo::Record;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// CSV column order for table output
pub const TABLE_COLUMNS: &[&str] = &[
    "Authors",
    "Title",
    "Year",
    "Link",
    "Authors with Affiliations",
    "Abstract",
];

/// One paper in the output table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Author names joined by `;`
    #[serde(rename = "Authors")]
    pub authors: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Year")]
    pub year: i32,
    /// DOI URL of the paper
    #[serde(rename = "Link")]
    pub link: String,
    /// `"name, affiliation"` pairs joined by `;`
    #[serde(rename = "Authors with Affiliations", default)]
    pub affiliations: String,
    #[serde(rename = "Abstract", default)]
    pub abstract_text: String,
}

impl Row {
    pub fn from_record(record: &Record, affiliations: impl Into<String>) -> Self {
        Self {
            authors: format_authors(&record.authors),
            title: record.title.clone(),
            year: record.year,
            link: record.doi_url.clone(),
            affiliations: affiliations.into(),
            abstract_text: record.abstract_text.clone(),
        }
    }

    /// Copy of this row with the affiliations column replaced
    pub fn with_affiliations(&self, affiliations: impl Into<String>) -> Self {
        Self {
            affiliations: affiliations.into(),
            ..self.clone()
        }
    }
}

/// Join author names with `;`, preserving order
pub fn format_authors(authors: &[String]) -> String {
    authors.join(";")
}

/// Ordered collection of rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Load a table; columns not in [`TABLE_COLUMNS`] (such as an index) are ignored
    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;

        let rows = rdr
            .deserialize::<Row>()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        info!(path = %path.display(), rows = rows.len(), "Loaded table");
        Ok(Self { rows })
    }

    /// Write the table with its header, creating parent directories
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;

        wtr.write_record(TABLE_COLUMNS)?;
        for row in &self.rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;

        info!(path = %path.display(), rows = self.rows.len(), "Saved table");
        Ok(())
    }
}

impl FromIterator<Row> for Table {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// Conference year from an index URL such as `.../ismir2004.html`
pub fn year_from_url(url: &str) -> String {
    let segment = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let stem = segment.split('.').next().unwrap_or_default();
    let skip = stem.chars().count().saturating_sub(4);
    stem.chars().skip(skip).collect()
}

/// Output path `{dir}/{prefix}_{year}.csv`
pub fn table_path(dir: &Path, prefix: &str, year: &str) -> PathBuf {
    dir.join(format!("{}_{}.csv", prefix, year))
}
