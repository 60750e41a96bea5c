//! NHentai catalog (JSON gallery API).

use super::client::HttpClient;
use super::types::{CandidateMatch, Catalog, CatalogError};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use shared::config::CatalogsConfig;
use shared::{CatalogSource, ResolvedMetadata, Staff};
use tracing::debug;

/// Domain fragments that break NHentai's search
const QUERY_NOISE: [&str; 2] = [".us", ".com"];

static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]+\]").expect("valid pattern"));
static PARENTHESIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^)]+)\)").expect("valid pattern"));

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<Gallery>,
}

#[derive(Debug, Deserialize)]
struct Gallery {
    #[serde(deserialize_with = "id_as_string")]
    id: String,
    title: GalleryTitle,
    #[serde(default)]
    num_pages: Option<u32>,
    #[serde(default)]
    upload_date: Option<i64>,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct GalleryTitle {
    english: Option<String>,
    japanese: Option<String>,
    pretty: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    #[serde(rename = "type")]
    kind: String,
    name: String,
}

/// Gallery ids arrive as numbers from search and strings from some mirrors
fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(i64),
        Text(String),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Number(n) => n.to_string(),
        Id::Text(s) => s,
    })
}

fn clean_query(title: &str) -> String {
    QUERY_NOISE
        .iter()
        .fold(title.to_string(), |query, noise| query.replace(noise, ""))
}

/// Title without `[circle]` and `(parody)` groups
fn clean_title(title: &str) -> String {
    let cleaned = BRACKETED.replace_all(title, "");
    PARENTHESIZED.replace_all(&cleaned, "").trim().to_string()
}

impl Gallery {
    fn display_title(&self) -> Option<String> {
        self.title
            .english
            .clone()
            .or_else(|| self.title.pretty.clone())
            .or_else(|| self.title.japanese.clone())
    }

    fn into_metadata(self, base_url: &str, candidate_title: &str, search_value: &str) -> ResolvedMetadata {
        let tagged = |kind: &str| -> Vec<String> {
            self.tags
                .iter()
                .filter(|t| t.kind == kind)
                .map(|t| t.name.clone())
                .collect()
        };

        let artists: Vec<String> = tagged("artist")
            .iter()
            .map(|a| crate::parser::title_case(a))
            .collect();
        let genres = tagged("tag");

        // First parenthesized group outside brackets names the parody/serialization
        let without_brackets = BRACKETED.replace_all(candidate_title, "");
        let serializations = PARENTHESIZED
            .captures(&without_brackets)
            .map(|c| vec![c[1].trim().to_string()])
            .unwrap_or_default();

        ResolvedMetadata {
            id: None,
            search_value: search_value.to_string(),
            series_title: clean_title(candidate_title),
            series_title_eng: None,
            series_title_jap: None,
            alternate_titles: self.title.japanese.into_iter().collect(),
            status: Some("Finished".to_string()),
            kind: Some("Doujinshi".to_string()),
            description: None,
            staff: Staff {
                story: artists.clone(),
                art: artists,
                cover: Vec::new(),
            },
            genres,
            serializations,
            publish_date: self
                .upload_date
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
                .map(|d| d.date_naive()),
            page_count: self.num_pages,
            url: Some(format!("{}/g/{}/", base_url, self.id)),
            source: CatalogSource::NHentai,
            source_id: Some(self.id),
            scraped_at: Utc::now(),
        }
    }
}

/// NHentai client
pub struct NHentaiClient {
    http: HttpClient,
}

impl NHentaiClient {
    pub fn new(catalogs: &CatalogsConfig) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(&catalogs.nhentai, catalogs)?,
        })
    }
}

#[async_trait]
impl Catalog for NHentaiClient {
    fn source(&self) -> CatalogSource {
        CatalogSource::NHentai
    }

    async fn search(&self, title: &str) -> Result<Vec<CandidateMatch>, CatalogError> {
        let query = clean_query(title);
        let response: SearchResponse = self
            .http
            .get_json_query(
                "/api/galleries/search",
                &[("query", query.as_str()), ("sort", "popular"), ("page", "1")],
            )
            .await?;

        let candidates: Vec<_> = response
            .result
            .into_iter()
            .filter_map(|gallery| {
                let title = gallery.display_title()?;
                Some(CandidateMatch::listed(CatalogSource::NHentai, gallery.id, title))
            })
            .collect();

        debug!(query = %query, count = candidates.len(), "NHentai search complete");
        Ok(candidates)
    }

    async fn fetch(&self, candidate: &CandidateMatch) -> Result<ResolvedMetadata, CatalogError> {
        let gallery: Gallery = self
            .http
            .get_json(&format!("/api/gallery/{}", candidate.source_id))
            .await?;
        Ok(gallery.into_metadata(self.http.base_url(), &candidate.title, &candidate.title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_query() {
        assert_eq!(clean_query("Hatsukoi Scans.com Title"), "Hatsukoi Scans Title");
        assert_eq!(clean_query("Title"), "Title");
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("[Circle (Artist)] Summer Days (Original)"), "Summer Days");
    }

    #[test]
    fn test_gallery_into_metadata() {
        let body = r#"{
            "id": 177013,
            "title": {"english": "[Circle] Summer Days (Original)", "japanese": "夏の日", "pretty": "Summer Days"},
            "num_pages": 30,
            "upload_date": 1500000000,
            "tags": [
                {"id": 1, "type": "artist", "name": "some artist"},
                {"id": 2, "type": "tag", "name": "romance"},
                {"id": 3, "type": "language", "name": "english"}
            ]
        }"#;
        let gallery: Gallery = serde_json::from_str(body).unwrap();
        let title = gallery.display_title().unwrap();
        let metadata = gallery.into_metadata("https://nhentai.net", &title, "Summer Days");

        assert_eq!(metadata.series_title, "Summer Days");
        assert_eq!(metadata.serializations, vec!["Original"]);
        assert_eq!(metadata.staff.art, vec!["Some Artist"]);
        assert_eq!(metadata.genres, vec!["romance"]);
        assert_eq!(metadata.page_count, Some(30));
        assert_eq!(metadata.url.as_deref(), Some("https://nhentai.net/g/177013/"));
        assert_eq!(metadata.source_id.as_deref(), Some("177013"));
    }

    #[test]
    fn test_string_ids() {
        let body = r#"{"result":[{"id":"42","title":{"english":null,"japanese":null,"pretty":"P"}}]}"#;
        let response: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.result[0].id, "42");
        assert_eq!(response.result[0].display_title().as_deref(), Some("P"));
    }
}
