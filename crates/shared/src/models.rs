//! Data models for the tagger.
//!
//! This module defines the records persisted by the ledger and the
//! normalized series metadata every catalog resolves to.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// External catalog a piece of metadata came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CatalogSource {
    AniList,
    MangaUpdates,
    #[serde(rename = "MAL")]
    Mal,
    Fakku,
    NHentai,
}

impl CatalogSource {
    /// Fixed trust order used when walking catalog results
    pub const PRIORITY: [CatalogSource; 5] = [
        CatalogSource::AniList,
        CatalogSource::MangaUpdates,
        CatalogSource::Mal,
        CatalogSource::Fakku,
        CatalogSource::NHentai,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogSource::AniList => "AniList",
            CatalogSource::MangaUpdates => "MangaUpdates",
            CatalogSource::Mal => "MAL",
            CatalogSource::Fakku => "Fakku",
            CatalogSource::NHentai => "NHentai",
        }
    }

    /// Adult catalogs get routed to the adult library when one is configured
    pub fn is_adult(&self) -> bool {
        matches!(self, CatalogSource::Fakku | CatalogSource::NHentai)
    }
}

impl std::fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CatalogSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AniList" => Ok(CatalogSource::AniList),
            "MangaUpdates" => Ok(CatalogSource::MangaUpdates),
            "MAL" => Ok(CatalogSource::Mal),
            "Fakku" => Ok(CatalogSource::Fakku),
            "NHentai" => Ok(CatalogSource::NHentai),
            _ => Err(anyhow::anyhow!("Invalid catalog source: {}", s)),
        }
    }
}

/// Staff credits grouped by the role ComicInfo cares about
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Staff {
    pub story: Vec<String>,
    pub art: Vec<String>,
    pub cover: Vec<String>,
}

/// Series metadata resolved from one catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedMetadata {
    pub id: Option<i64>,          // Database ID (None before insertion)

    /// Title the series was searched under (directory or filename derived)
    pub search_value: String,

    // Titles
    pub series_title: String,
    pub series_title_eng: Option<String>,
    pub series_title_jap: Option<String>,
    pub alternate_titles: Vec<String>,

    pub status: Option<String>,
    pub kind: Option<String>,     // Manga, Doujinshi, One-shot, ...
    pub description: Option<String>,
    pub staff: Staff,
    pub genres: Vec<String>,
    pub serializations: Vec<String>,
    pub publish_date: Option<NaiveDate>,
    pub page_count: Option<u32>,
    pub url: Option<String>,

    // Provenance
    pub source: CatalogSource,
    pub source_id: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

/// One durably recorded rename decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessedFileRecord {
    pub id: i64,
    pub series_title: String,
    pub chapter_number: String,
    pub original_filename: String,
    pub target_filename: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rename decision to be recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProcessedFile {
    pub series_title: String,
    pub chapter_number: String,
    pub original_filename: String,
    pub target_filename: String,
}
