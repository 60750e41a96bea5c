//! In-memory catalog used by the resolver and pipeline tests.

use crate::api::{CandidateMatch, Catalog, CatalogError};
use async_trait::async_trait;
use chrono::Utc;
use shared::{CatalogSource, ResolvedMetadata};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Canned catalog; clones share their call counters
#[derive(Clone)]
pub struct FakeCatalog {
    source: CatalogSource,
    results: HashMap<String, Vec<CandidateMatch>>,
    failing: bool,
    failing_fetch: bool,
    delay: Option<Duration>,
    rate_limited: Arc<AtomicUsize>,
    searches: Arc<AtomicUsize>,
    fetches: Arc<AtomicUsize>,
}

impl FakeCatalog {
    pub fn new(source: CatalogSource) -> Self {
        Self {
            source,
            results: HashMap::new(),
            failing: false,
            failing_fetch: false,
            delay: None,
            rate_limited: Arc::new(AtomicUsize::new(0)),
            searches: Arc::new(AtomicUsize::new(0)),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answer `query` with listed candidates carrying these titles
    pub fn with_results(self, query: &str, titles: Vec<&str>) -> Self {
        let source = self.source;
        let candidates = titles
            .into_iter()
            .enumerate()
            .map(|(i, title)| CandidateMatch::listed(source, (i + 1).to_string(), title))
            .collect();
        self.with_candidates(query, candidates)
    }

    pub fn with_candidates(mut self, query: &str, candidates: Vec<CandidateMatch>) -> Self {
        self.results.insert(query.to_string(), candidates);
        self
    }

    /// Every search fails with a server error
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Every fetch fails with a parse error
    pub fn failing_fetch(mut self) -> Self {
        self.failing_fetch = true;
        self
    }

    /// The first `times` searches are rate limited
    pub fn rate_limited_times(self, times: usize) -> Self {
        self.rate_limited.store(times, Ordering::SeqCst);
        self
    }

    /// Searches take this long
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    fn source(&self) -> CatalogSource {
        self.source
    }

    async fn search(&self, title: &str) -> Result<Vec<CandidateMatch>, CatalogError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(CatalogError::Status {
                url: format!("fake://{}", self.source),
                status: 500,
            });
        }
        let limited = self
            .rate_limited
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return Err(CatalogError::RateLimited(format!("fake://{}", self.source)));
        }
        Ok(self.results.get(title).cloned().unwrap_or_default())
    }

    async fn fetch(&self, candidate: &CandidateMatch) -> Result<ResolvedMetadata, CatalogError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing_fetch {
            return Err(CatalogError::Parse("truncated record".to_string()));
        }
        Ok(ResolvedMetadata {
            id: None,
            search_value: candidate.title.clone(),
            series_title: candidate.title.clone(),
            series_title_eng: None,
            series_title_jap: None,
            alternate_titles: candidate.alternate_titles.clone(),
            status: None,
            kind: Some("Manga".to_string()),
            description: Some(format!("{} from {}", candidate.title, self.source)),
            staff: Default::default(),
            genres: vec!["Action".to_string()],
            serializations: Vec::new(),
            publish_date: None,
            page_count: None,
            url: None,
            source: self.source,
            source_id: Some(candidate.source_id.clone()),
            scraped_at: Utc::now(),
        })
    }
}
