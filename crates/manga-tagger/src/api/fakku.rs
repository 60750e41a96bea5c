//! Fakku catalog.
//!
//! Fakku has no search API. The candidate URL is built from the title and
//! probed; metadata is scraped from the page itself.

use super::client::HttpClient;
use super::types::{CandidateMatch, CandidateSignal, Catalog, CatalogError};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use shared::config::CatalogsConfig;
use shared::{CatalogSource, ResolvedMetadata, Staff};
use tracing::debug;

/// Page title Fakku serves for missing works
const MISSING_PAGE_TITLE: &str = "Error Message";

static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]+\]").expect("valid pattern"));
static PARENTHESIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]+\)").expect("valid pattern"));
static PAGE_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid pattern"));
static DESCRIPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<meta\s+name="description"\s+content="([^"]*)""#).expect("valid pattern")
});
static PAGES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+)\s*pages").expect("valid pattern"));
static TAG_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<a[^>]+href="/tags/[^"]+"[^>]*>([^<]+)</a>"#).expect("valid pattern"));
static ARTIST_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<a[^>]+href="/artists/[^"]+"[^>]*>([^<]+)</a>"#).expect("valid pattern")
});

/// `[Circle] Title (Parody)` becomes `Title-english`
fn slug(title: &str) -> String {
    let stripped = BRACKETED.replace_all(title, "");
    let stripped = PARENTHESIZED.replace_all(&stripped, "");
    format!("{}-english", stripped.trim().replace(' ', "-"))
}

fn page_title(html: &str) -> Option<String> {
    PAGE_TITLE
        .captures(html)
        .map(|c| c[1].trim().to_string())
}

fn captured(regex: &Regex, html: &str) -> Vec<String> {
    regex
        .captures_iter(html)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_page(html: &str, url: &str, search_value: &str) -> ResolvedMetadata {
    let series_title = page_title(html)
        .map(|t| t.split(" Hentai by").next().unwrap_or_default().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| search_value.to_string());

    let artists = captured(&ARTIST_LINK, html);

    ResolvedMetadata {
        id: None,
        search_value: search_value.to_string(),
        series_title,
        series_title_eng: None,
        series_title_jap: None,
        alternate_titles: Vec::new(),
        status: Some("Finished".to_string()),
        kind: Some("Doujinshi".to_string()),
        description: DESCRIPTION.captures(html).map(|c| c[1].trim().to_string()),
        staff: Staff {
            story: artists.clone(),
            art: artists,
            cover: Vec::new(),
        },
        genres: captured(&TAG_LINK, html),
        serializations: vec!["FAKKU".to_string()],
        publish_date: None,
        page_count: PAGES.captures(html).and_then(|c| c[1].parse().ok()),
        url: Some(url.to_string()),
        source: CatalogSource::Fakku,
        source_id: None,
        scraped_at: Utc::now(),
    }
}

/// Fakku client
pub struct FakkuClient {
    http: HttpClient,
}

impl FakkuClient {
    pub fn new(catalogs: &CatalogsConfig) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(&catalogs.fakku, catalogs)?,
        })
    }
}

#[async_trait]
impl Catalog for FakkuClient {
    fn source(&self) -> CatalogSource {
        CatalogSource::Fakku
    }

    async fn search(&self, title: &str) -> Result<Vec<CandidateMatch>, CatalogError> {
        let url = self.http.url(&format!("/hentai/{}", slug(title)));
        let exists = match self.http.get_page(&url).await? {
            Some(html) => page_title(&html).as_deref() != Some(MISSING_PAGE_TITLE),
            None => false,
        };

        debug!(url = %url, exists = exists, "Fakku probe complete");

        let mut candidate = CandidateMatch::listed(CatalogSource::Fakku, url, title);
        candidate.signal = CandidateSignal::PageExists(exists);
        Ok(vec![candidate])
    }

    async fn fetch(&self, candidate: &CandidateMatch) -> Result<ResolvedMetadata, CatalogError> {
        let html = self
            .http
            .get_page(&candidate.source_id)
            .await?
            .ok_or_else(|| CatalogError::Parse(format!("Fakku page vanished: {}", candidate.source_id)))?;
        Ok(parse_page(&html, &candidate.source_id, &candidate.title))
    }
}
