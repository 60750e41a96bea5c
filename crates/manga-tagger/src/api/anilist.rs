//! AniList GraphQL catalog.

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

const SEARCH_QUERY: &str = r#"
query ($search: String, $page: Int, $perPage: Int) {
  Page (page: $page, perPage: $perPage) {
    media (type: MANGA, search: $search) {
      id
      title { romaji english native }
      synonyms
    }
  }
}
"#;

const MEDIA_QUERY: &str = r#"
query ($id: Int) {
  Media (id: $id, type: MANGA) {
    id
    format
    status
    description
    genres
    synonyms
    siteUrl
    title { romaji english native }
    startDate { year month day }
    staff { edges { role node { name { full } } } }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQLError>,
}

#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(rename = "Page")]
    page: PageData,
}

#[derive(Debug, Deserialize)]
struct PageData {
    media: Vec<MediaSummary>,
}

#[derive(Debug, Deserialize)]
struct MediaSummary {
    id: i64,
    title: TitleData,
    #[serde(default)]
    synonyms: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MediaData {
    #[serde(rename = "Media")]
    media: Media,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Media {
    id: i64,
    format: Option<String>,
    status: Option<String>,
    description: Option<String>,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    synonyms: Vec<String>,
    site_url: Option<String>,
    title: TitleData,
    start_date: Option<DateData>,
    staff: Option<StaffConnection>,
}

#[derive(Debug, Deserialize)]
struct TitleData {
    romaji: Option<String>,
    english: Option<String>,
    native: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DateData {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct StaffConnection {
    #[serde(default)]
    edges: Vec<StaffEdge>,
}

#[derive(Debug, Deserialize)]
struct StaffEdge {
    role: Option<String>,
    node: StaffNode,
}

#[derive(Debug, Deserialize)]
struct StaffNode {
    name: StaffName,
}

#[derive(Debug, Deserialize)]
struct StaffName {
    full: Option<String>,
}

impl TitleData {
    /// Non-null titles, romaji first
    fn variants(&self) -> Vec<String> {
        [&self.romaji, &self.english, &self.native]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

impl DateData {
    fn to_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year?, self.month.unwrap_or(1), self.day.unwrap_or(1))
    }
}

/// Sort AniList staff roles into ComicInfo credits
fn staff_from(connection: Option<StaffConnection>) -> Staff {
    let mut staff = Staff::default();
    for edge in connection.map(|c| c.edges).unwrap_or_default() {
        let (Some(role), Some(name)) = (edge.role, edge.node.name.full) else {
            continue;
        };
        let role = role.to_lowercase();
        if role.contains("story") {
            staff.story.push(name.clone());
        }
        if role.contains("art") {
            staff.art.push(name.clone());
        }
        if role.contains("cover") {
            staff.cover.push(name);
        }
    }
    staff
}

/// AniList client
pub struct AniListClient {
    http: HttpClient,
}

impl AniListClient {
    pub fn new(catalogs: &CatalogsConfig) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(&catalogs.anilist, catalogs)?,
        })
    }

    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, CatalogError> {
        let body = json!({ "query": query, "variables": variables });
        let response: GraphQLResponse<T> = self.http.post_json("", &body).await?;
        if let Some(error) = response.errors.first() {
            return Err(CatalogError::Parse(format!("GraphQL error: {}", error.message)));
        }
        response
            .data
            .ok_or_else(|| CatalogError::Parse("GraphQL response without data".to_string()))
    }
}

#[async_trait]
impl Catalog for AniListClient {
    fn source(&self) -> CatalogSource {
        CatalogSource::AniList
    }

    async fn search(&self, title: &str) -> Result<Vec<CandidateMatch>, CatalogError> {
        let data: SearchData = self
            .query(SEARCH_QUERY, json!({ "search": title, "page": 1, "perPage": 50 }))
            .await?;

        let candidates: Vec<_> = data
            .page
            .media
            .into_iter()
            .filter_map(|media| {
                let mut titles = media.title.variants().into_iter();
                let primary = titles.next()?;
                Some(
                    CandidateMatch::listed(CatalogSource::AniList, media.id.to_string(), primary)
                        .with_alternate_titles(titles.chain(media.synonyms)),
                )
            })
            .collect();

        debug!(query = title, count = candidates.len(), "AniList search complete");
        Ok(candidates)
    }

    async fn fetch(&self, candidate: &CandidateMatch) -> Result<ResolvedMetadata, CatalogError> {
        let id: i64 = candidate
            .source_id
            .parse()
            .map_err(|_| CatalogError::Parse(format!("Invalid AniList id: {}", candidate.source_id)))?;
        let data: MediaData = self.query(MEDIA_QUERY, json!({ "id": id })).await?;
        let media = data.media;

        let series_title = media
            .title
            .romaji
            .clone()
            .or_else(|| media.title.english.clone())
            .unwrap_or_else(|| candidate.title.clone());

        Ok(ResolvedMetadata {
            id: None,
            search_value: candidate.title.clone(),
            series_title,
            series_title_eng: media.title.english,
            series_title_jap: media.title.native,
            alternate_titles: media.synonyms,
            status: media.status,
            kind: media.format,
            description: media.description,
            staff: staff_from(media.staff),
            genres: media.genres,
            serializations: Vec::new(),
            publish_date: media.start_date.as_ref().and_then(DateData::to_date),
            page_count: None,
            url: media.site_url,
            source: CatalogSource::AniList,
            source_id: Some(media.id.to_string()),
            scraped_at: Utc::now(),
        })
    }
}
