//! Types shared by every catalog client.

use crate::similarity::{partial_ratio, token_set_ratio};
use async_trait::async_trait;
use shared::{CatalogSource, ResolvedMetadata};
use thiserror::Error;

/// Catalog request failures
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog kept answering 429 after every retry
    #[error("Rate limited by catalog: {0}")]
    RateLimited(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to parse catalog response: {0}")]
    Parse(String),
}

impl CatalogError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CatalogError::RateLimited(_))
    }
}

/// How a catalog vouches for a candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateSignal {
    /// Returned by a title search
    Listed,
    /// Looked up by constructed URL; whether the page was there
    PageExists(bool),
}

/// One search hit, before its full record is fetched
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMatch {
    pub source: CatalogSource,
    /// Catalog-native id (a URL for catalogs probed by URL)
    pub source_id: String,
    pub title: String,
    /// Localized titles and synonyms
    pub alternate_titles: Vec<String>,
    pub signal: CandidateSignal,
}

impl CandidateMatch {
    pub fn listed(source: CatalogSource, source_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source,
            source_id: source_id.into(),
            title: title.into(),
            alternate_titles: Vec::new(),
            signal: CandidateSignal::Listed,
        }
    }

    pub fn with_alternate_titles(mut self, titles: impl IntoIterator<Item = String>) -> Self {
        self.alternate_titles.extend(titles);
        self
    }

    /// Primary title followed by every alternate
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.title.as_str()).chain(self.alternate_titles.iter().map(String::as_str))
    }
}

/// Threshold for the mainstream catalogs
pub const STRICT_THRESHOLD: f64 = 0.9;

/// Threshold for NHentai, including fallback queries
pub const LENIENT_THRESHOLD: f64 = 0.8;

/// Per-catalog rule deciding whether a candidate is the queried series
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Acceptance {
    /// Similarity against the primary title, or every title variant
    Similarity { threshold: f64, all_titles: bool },
    /// The probed page exists
    PageExists,
    /// Similarity, or a full partial match when the incoming path is too long
    SimilarityOrPartial { threshold: f64 },
}

impl Acceptance {
    pub fn for_source(source: CatalogSource) -> Self {
        match source {
            CatalogSource::AniList => Acceptance::Similarity {
                threshold: STRICT_THRESHOLD,
                all_titles: true,
            },
            CatalogSource::MangaUpdates | CatalogSource::Mal => Acceptance::Similarity {
                threshold: STRICT_THRESHOLD,
                all_titles: false,
            },
            CatalogSource::Fakku => Acceptance::PageExists,
            CatalogSource::NHentai => Acceptance::SimilarityOrPartial {
                threshold: LENIENT_THRESHOLD,
            },
        }
    }

    /// `path_too_long` is whether the incoming file's path is longer than the configured limit
    pub fn accepts(&self, query: &str, candidate: &CandidateMatch, path_too_long: bool) -> bool {
        match *self {
            Acceptance::Similarity { threshold, all_titles } => {
                if all_titles {
                    candidate
                        .titles()
                        .any(|title| token_set_ratio(query, title) >= threshold)
                } else {
                    token_set_ratio(query, &candidate.title) >= threshold
                }
            }
            Acceptance::PageExists => candidate.signal == CandidateSignal::PageExists(true),
            Acceptance::SimilarityOrPartial { threshold } => {
                token_set_ratio(query, &candidate.title) >= threshold
                    || (path_too_long && partial_ratio(query, &candidate.title) >= 1.0)
            }
        }
    }
}

/// A searchable source of series metadata
#[async_trait]
pub trait Catalog: Send + Sync {
    fn source(&self) -> CatalogSource;

    /// Candidates for a title, in the catalog's own order
    async fn search(&self, title: &str) -> Result<Vec<CandidateMatch>, CatalogError>;

    /// Full record for an accepted candidate
    async fn fetch(&self, candidate: &CandidateMatch) -> Result<ResolvedMetadata, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anilist_checks_every_variant() {
        let rule = Acceptance::for_source(CatalogSource::AniList);
        let candidate = CandidateMatch::listed(CatalogSource::AniList, "1", "Shingeki no Kyojin")
            .with_alternate_titles(["Attack on Titan".to_string()]);
        assert!(rule.accepts("Attack on Titan", &candidate, false));
        assert!(!rule.accepts("Vinland Saga", &candidate, false));
    }

    #[test]
    fn test_title_only_catalogs_ignore_variants() {
        let rule = Acceptance::for_source(CatalogSource::MangaUpdates);
        let candidate = CandidateMatch::listed(CatalogSource::MangaUpdates, "1", "Shingeki no Kyojin")
            .with_alternate_titles(["Attack on Titan".to_string()]);
        assert!(!rule.accepts("Attack on Titan", &candidate, false));
        assert!(rule.accepts("shingeki no kyojin", &candidate, false));
    }

    #[test]
    fn test_page_probe() {
        let rule = Acceptance::for_source(CatalogSource::Fakku);
        let mut candidate = CandidateMatch::listed(CatalogSource::Fakku, "url", "Anything");
        assert!(!rule.accepts("Unrelated", &candidate, false));
        candidate.signal = CandidateSignal::PageExists(true);
        assert!(rule.accepts("Unrelated", &candidate, false));
    }

    #[test]
    fn test_partial_match_only_for_long_paths() {
        let rule = Acceptance::for_source(CatalogSource::NHentai);
        let candidate = CandidateMatch::listed(
            CatalogSource::NHentai,
            "1",
            "[Circle] A Very Long Title That Got Cut Off Somewhere In The Middle (Original)",
        );
        let query = "ry Long Ti";
        assert!(!rule.accepts(query, &candidate, false));
        assert!(rule.accepts(query, &candidate, true));
    }
}
