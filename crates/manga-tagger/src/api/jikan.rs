//! MyAnimeList catalog through the Jikan v4 API.

use super::client::HttpClient;
use super::types::{CandidateMatch, Catalog, CatalogError};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::config::CatalogsConfig;
use shared::{CatalogSource, ResolvedMetadata, Staff};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct DataResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct MangaSummary {
    mal_id: i64,
    title: String,
    title_english: Option<String>,
    title_japanese: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MangaDetails {
    mal_id: i64,
    url: Option<String>,
    title: String,
    title_english: Option<String>,
    title_japanese: Option<String>,
    #[serde(default)]
    title_synonyms: Vec<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    status: Option<String>,
    synopsis: Option<String>,
    published: Option<Published>,
    #[serde(default)]
    authors: Vec<NamedEntry>,
    #[serde(default)]
    serializations: Vec<NamedEntry>,
    #[serde(default)]
    genres: Vec<NamedEntry>,
    #[serde(default)]
    themes: Vec<NamedEntry>,
    #[serde(default)]
    demographics: Vec<NamedEntry>,
}

#[derive(Debug, Deserialize)]
struct Published {
    from: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    name: String,
}

fn names(entries: Vec<NamedEntry>) -> Vec<String> {
    entries.into_iter().map(|e| e.name).collect()
}

impl MangaDetails {
    fn into_metadata(self, search_value: &str) -> ResolvedMetadata {
        // MAL does not split authors by role
        let authors = names(self.authors);
        let mut genres = names(self.genres);
        genres.extend(names(self.themes));
        genres.extend(names(self.demographics));

        ResolvedMetadata {
            id: None,
            search_value: search_value.to_string(),
            series_title: self.title,
            series_title_eng: self.title_english,
            series_title_jap: self.title_japanese,
            alternate_titles: self.title_synonyms,
            status: self.status,
            kind: self.kind,
            description: self.synopsis,
            staff: Staff {
                story: authors.clone(),
                art: authors,
                cover: Vec::new(),
            },
            genres,
            serializations: names(self.serializations),
            publish_date: self.published.and_then(|p| p.from).map(|d| d.date_naive()),
            page_count: None,
            url: self
                .url
                .or_else(|| Some(format!("https://myanimelist.net/manga/{}", self.mal_id))),
            source: CatalogSource::Mal,
            source_id: Some(self.mal_id.to_string()),
            scraped_at: Utc::now(),
        }
    }
}

/// Jikan client for MyAnimeList
pub struct JikanClient {
    http: HttpClient,
}

impl JikanClient {
    pub fn new(catalogs: &CatalogsConfig) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(&catalogs.mal, catalogs)?,
        })
    }
}

#[async_trait]
impl Catalog for JikanClient {
    fn source(&self) -> CatalogSource {
        CatalogSource::Mal
    }

    async fn search(&self, title: &str) -> Result<Vec<CandidateMatch>, CatalogError> {
        let response: DataResponse<Vec<MangaSummary>> = self
            .http
            .get_json_query("/manga", &[("q", title), ("limit", "25")])
            .await?;

        let candidates: Vec<_> = response
            .data
            .into_iter()
            .map(|m| {
                CandidateMatch::listed(CatalogSource::Mal, m.mal_id.to_string(), m.title)
                    .with_alternate_titles(m.title_english.into_iter().chain(m.title_japanese))
            })
            .collect();

        debug!(query = title, count = candidates.len(), "MAL search complete");
        Ok(candidates)
    }

    async fn fetch(&self, candidate: &CandidateMatch) -> Result<ResolvedMetadata, CatalogError> {
        let response: DataResponse<MangaDetails> = self
            .http
            .get_json(&format!("/manga/{}/full", candidate.source_id))
            .await?;
        Ok(response.data.into_metadata(&candidate.title))
    }
}
