//! Catalog clients.
//!
//! Each external catalog sits behind the `Catalog` trait and owns its own
//! rate-limited HTTP client.

pub mod anilist;
pub mod client;
pub mod fakku;
pub mod jikan;
pub mod mangaupdates;
pub mod nhentai;
pub mod rate_limiter;
pub mod types;

pub use anilist::AniListClient;
pub use client::HttpClient;
pub use fakku::FakkuClient;
pub use jikan::JikanClient;
pub use mangaupdates::MangaUpdatesClient;
pub use nhentai::NHentaiClient;
pub use rate_limiter::RateLimiter;
pub use types::*;

use anyhow::Result;
use shared::config::CatalogsConfig;
use std::sync::Arc;

/// Build every configured catalog client, in priority order
pub fn build_catalogs(config: &CatalogsConfig) -> Result<Vec<Arc<dyn Catalog>>> {
    Ok(vec![
        Arc::new(AniListClient::new(config)?),
        Arc::new(MangaUpdatesClient::new(config)?),
        Arc::new(JikanClient::new(config)?),
        Arc::new(FakkuClient::new(config)?),
        Arc::new(NHentaiClient::new(config)?),
    ])
}
