//! MangaUpdates catalog (REST API v1).

use super::client::HttpClient;
use super::types::{CandidateMatch, Catalog, CatalogError};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use shared::config::CatalogsConfig;
use shared::{CatalogSource, ResolvedMetadata, Staff};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    record: SeriesRecord,
}

#[derive(Debug, Deserialize)]
struct SeriesRecord {
    series_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct Series {
    series_id: i64,
    title: String,
    url: Option<String>,
    #[serde(default)]
    associated: Vec<Associated>,
    description: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    year: Option<String>,
    status: Option<String>,
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    authors: Vec<Author>,
    #[serde(default)]
    publications: Vec<Publication>,
}

#[derive(Debug, Deserialize)]
struct Associated {
    title: String,
}

#[derive(Debug, Deserialize)]
struct Genre {
    genre: String,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: String,
    #[serde(rename = "type")]
    role: String,
}

#[derive(Debug, Deserialize)]
struct Publication {
    publication_name: String,
}

impl Series {
    fn into_metadata(self, search_value: &str) -> ResolvedMetadata {
        let mut staff = Staff::default();
        for author in self.authors {
            match author.role.as_str() {
                "Author" => staff.story.push(author.name),
                "Artist" => staff.art.push(author.name),
                _ => {}
            }
        }

        let publish_date = self
            .year
            .as_deref()
            .and_then(|year| year.trim().parse::<i32>().ok())
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1));

        ResolvedMetadata {
            id: None,
            search_value: search_value.to_string(),
            series_title: self.title,
            series_title_eng: None,
            series_title_jap: None,
            alternate_titles: self.associated.into_iter().map(|a| a.title).collect(),
            status: self.status,
            kind: self.kind,
            description: self.description,
            staff,
            genres: self.genres.into_iter().map(|g| g.genre).collect(),
            serializations: self
                .publications
                .into_iter()
                .map(|p| p.publication_name)
                .collect(),
            publish_date,
            page_count: None,
            url: self.url,
            source: CatalogSource::MangaUpdates,
            source_id: Some(self.series_id.to_string()),
            scraped_at: Utc::now(),
        }
    }
}

/// MangaUpdates client
pub struct MangaUpdatesClient {
    http: HttpClient,
}

impl MangaUpdatesClient {
    pub fn new(catalogs: &CatalogsConfig) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(&catalogs.mangaupdates, catalogs)?,
        })
    }
}

#[async_trait]
impl Catalog for MangaUpdatesClient {
    fn source(&self) -> CatalogSource {
        CatalogSource::MangaUpdates
    }

    async fn search(&self, title: &str) -> Result<Vec<CandidateMatch>, CatalogError> {
        let response: SearchResponse = self
            .http
            .post_json("/series/search", &json!({ "search": title, "perpage": 50 }))
            .await?;

        let candidates: Vec<_> = response
            .results
            .into_iter()
            .map(|r| {
                CandidateMatch::listed(
                    CatalogSource::MangaUpdates,
                    r.record.series_id.to_string(),
                    r.record.title,
                )
            })
            .collect();

        debug!(query = title, count = candidates.len(), "MangaUpdates search complete");
        Ok(candidates)
    }

    async fn fetch(&self, candidate: &CandidateMatch) -> Result<ResolvedMetadata, CatalogError> {
        let series: Series = self
            .http
            .get_json(&format!("/series/{}", candidate.source_id))
            .await?;
        Ok(series.into_metadata(&candidate.title))
    }
}
