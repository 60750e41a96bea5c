//! Ranked multi-catalog metadata resolution.

use crate::api::{Acceptance, CandidateMatch, Catalog, CatalogError, LENIENT_THRESHOLD};
use crate::error::TaggerError;
use crate::similarity::token_set_ratio;
use anyhow::{Context, Result};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use shared::{CatalogSource, ResolvedMetadata};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Pause before the single retry after MAL rate limits us
pub const MAL_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);

/// Title rewrites tried against NHentai when no catalog matched
static FALLBACK_TRANSFORMS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(\w)([A-Z])", "${1} ${2}"),
        (r"[ ][,]", ","),
        (r"[.]", ""),
        (r"([^ ]+)[']([^ ]+)", ""),
        (r"([^ ]+)[.]([^ ]+)", ""),
        (r"[ ][-]([^ ]+)", " ${1}"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("valid transform"), replacement))
    .collect()
});

/// Index combinations of `n` items, by size then lexicographically
fn combinations(n: usize) -> Vec<Vec<usize>> {
    let mut all = Vec::new();
    for size in 1..=n {
        let mut indices: Vec<usize> = (0..size).collect();
        loop {
            all.push(indices.clone());
            // Advance the rightmost index that still has room
            let Some(i) = (0..size).rev().find(|&i| indices[i] < n - size + i) else {
                break;
            };
            indices[i] += 1;
            for j in i + 1..size {
                indices[j] = indices[j - 1] + 1;
            }
        }
    }
    all
}

/// Distinct rewritten titles, one per transform combination
pub fn fallback_queries(title: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    seen.insert(title.to_string());

    combinations(FALLBACK_TRANSFORMS.len())
        .into_iter()
        .filter_map(|combination| {
            let rewritten = combination.iter().fold(title.to_string(), |text, &i| {
                let (pattern, replacement) = &FALLBACK_TRANSFORMS[i];
                pattern.replace_all(&text, *replacement).into_owned()
            });
            let rewritten = rewritten.trim().to_string();
            (!rewritten.is_empty() && seen.insert(rewritten.clone())).then_some(rewritten)
        })
        .collect()
}

/// Resolves a series title against the catalogs in trust order
pub struct Resolver {
    catalogs: Vec<Arc<dyn Catalog>>,
    path_length_limit: usize,
    rate_limit_backoff: Duration,
}

impl Resolver {
    pub fn new(catalogs: Vec<Arc<dyn Catalog>>, path_length_limit: usize) -> Self {
        Self {
            catalogs,
            path_length_limit,
            rate_limit_backoff: MAL_RATE_LIMIT_BACKOFF,
        }
    }

    /// Override the MAL rate-limit pause
    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    fn catalog(&self, source: CatalogSource) -> Option<&Arc<dyn Catalog>> {
        self.catalogs.iter().find(|c| c.source() == source)
    }

    /// Whether the path exceeds the configured limit, in characters
    fn path_too_long(&self, file_path: &Path) -> bool {
        file_path.to_string_lossy().chars().count() > self.path_length_limit
    }

    fn retries_rate_limit(source: CatalogSource, error: &CatalogError) -> bool {
        source == CatalogSource::Mal && error.is_rate_limited()
    }

    /// Search one catalog; failures degrade to no candidates
    async fn search_catalog(&self, catalog: &dyn Catalog, title: &str) -> Vec<CandidateMatch> {
        let source = catalog.source();
        let result = match catalog.search(title).await {
            Err(e) if Self::retries_rate_limit(source, &e) => {
                warn!(
                    source = %source,
                    backoff_secs = self.rate_limit_backoff.as_secs(),
                    "Catalog rate limit breached, backing off before retrying"
                );
                sleep(self.rate_limit_backoff).await;
                catalog.search(title).await
            }
            other => other,
        };

        match result {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(source = %source, query = title, error = %e, "Catalog search failed");
                Vec::new()
            }
        }
    }

    async fn fetch(&self, catalog: &dyn Catalog, candidate: &CandidateMatch) -> Result<ResolvedMetadata> {
        let source = catalog.source();
        let result = match catalog.fetch(candidate).await {
            Err(e) if Self::retries_rate_limit(source, &e) => {
                warn!(
                    source = %source,
                    backoff_secs = self.rate_limit_backoff.as_secs(),
                    "Catalog rate limit breached, backing off before retrying"
                );
                sleep(self.rate_limit_backoff).await;
                catalog.fetch(candidate).await
            }
            other => other,
        };
        result.with_context(|| {
            format!("Failed to fetch {} record {}", source, candidate.source_id)
        })
    }

    async fn accept(
        &self,
        catalog: &dyn Catalog,
        candidate: &CandidateMatch,
        series_title: &str,
    ) -> Result<ResolvedMetadata> {
        info!(
            series_title = series_title,
            source = %candidate.source,
            source_id = %candidate.source_id,
            candidate_title = %candidate.title,
            "Accepted catalog match"
        );
        let mut metadata = self.fetch(catalog, candidate).await?;
        metadata.search_value = series_title.to_string();
        Ok(metadata)
    }

    /// Resolve a series title
    ///
    /// `file_path` is the incoming chapter's path; its length switches on the
    /// partial-title rule for NHentai. Fails with `TaggerError::MangaNotFound`
    /// when no catalog and no fallback query yields a match.
    pub async fn resolve(&self, series_title: &str, file_path: &Path) -> Result<ResolvedMetadata> {
        let path_too_long = self.path_too_long(file_path);

        let searches = self.catalogs.iter().map(|catalog| async move {
            (
                catalog.source(),
                self.search_catalog(catalog.as_ref(), series_title).await,
            )
        });
        let results = join_all(searches).await;

        for source in CatalogSource::PRIORITY {
            let rule = Acceptance::for_source(source);
            let Some((_, candidates)) = results.iter().find(|(s, _)| *s == source) else {
                continue;
            };
            debug!(source = %source, count = candidates.len(), "Checking candidates");

            if let Some(candidate) = candidates
                .iter()
                .find(|c| rule.accepts(series_title, c, path_too_long))
            {
                if let Some(catalog) = self.catalog(source) {
                    return self.accept(catalog.as_ref(), candidate, series_title).await;
                }
            }
        }

        if let Some(nhentai) = self.catalog(CatalogSource::NHentai) {
            let queries = fallback_queries(series_title);
            info!(
                series_title = series_title,
                queries = queries.len(),
                "No direct match, trying rewritten titles"
            );
            for query in queries {
                let candidates = self.search_catalog(nhentai.as_ref(), &query).await;
                if let Some(candidate) = candidates
                    .iter()
                    .find(|c| token_set_ratio(series_title, &c.title) >= LENIENT_THRESHOLD)
                {
                    debug!(query = %query, "Rewritten title matched");
                    return self.accept(nhentai.as_ref(), candidate, series_title).await;
                }
            }
        }

        warn!(series_title = series_title, "No catalog matched");
        Err(TaggerError::MangaNotFound(series_title.to_string()).into())
    }
}
