//! HTTP plumbing shared by the catalog clients: pacing, retries, JSON.

use super::rate_limiter::RateLimiter;
use super::types::CatalogError;
use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use shared::config::{CatalogsConfig, EndpointConfig};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("manga-tagger/", env!("CARGO_PKG_VERSION"));

/// Rate-limited HTTP client bound to one catalog
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    rate_limiter: Mutex<RateLimiter>,
    max_retries: u32,
    retry_delay_ms: u64,
}

impl HttpClient {
    pub fn new(endpoint: &EndpointConfig, catalogs: &CatalogsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(catalogs.timeout_seconds))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            rate_limiter: Mutex::new(RateLimiter::from_config(&endpoint.rate_limit)),
            max_retries: catalogs.max_retries,
            retry_delay_ms: catalogs.retry_delay_ms,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(2u64.saturating_pow(attempt)))
    }

    /// Send with pacing and retries
    ///
    /// Server errors and transport failures are retried with exponential
    /// backoff; other client errors are returned to the caller as-is.
    async fn send(&self, url: &str, build: impl Fn() -> RequestBuilder) -> Result<Response, CatalogError> {
        for attempt in 0..=self.max_retries {
            self.rate_limiter.lock().await.acquire().await;

            debug!(url = %url, attempt = attempt + 1, "Making catalog request");

            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        if attempt == self.max_retries {
                            warn!(url = %url, "Still rate limited after all retries");
                            return Err(CatalogError::RateLimited(url.to_string()));
                        }
                        let delay = self.backoff(attempt);
                        warn!(url = %url, delay_ms = delay.as_millis() as u64, "Rate limited by server, waiting");
                        sleep(delay).await;
                    } else if status.is_server_error() {
                        warn!(url = %url, status = %status, "Request failed");
                        if attempt == self.max_retries {
                            return Err(CatalogError::Status {
                                url: url.to_string(),
                                status: status.as_u16(),
                            });
                        }
                        sleep(self.backoff(attempt)).await;
                    } else {
                        return Ok(response);
                    }
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Request error");
                    if attempt == self.max_retries {
                        return Err(CatalogError::Http(e));
                    }
                    sleep(self.backoff(attempt)).await;
                }
            }
        }

        Err(CatalogError::Parse(format!("No request attempted for {}", url)))
    }

    async fn json<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, CatalogError> {
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.json::<T>().await.map_err(|e| {
            warn!(url = %url, error = %e, "Failed to parse response");
            CatalogError::Parse(e.to_string())
        })
    }

    /// GET an endpoint relative to the base URL and decode JSON
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, CatalogError> {
        let url = self.url(endpoint);
        let response = self.send(&url, || self.client.get(&url)).await?;
        Self::json(&url, response).await
    }

    /// GET with query parameters and decode JSON
    pub async fn get_json_query<T, Q>(&self, endpoint: &str, query: &Q) -> Result<T, CatalogError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.url(endpoint);
        let response = self.send(&url, || self.client.get(&url).query(query)).await?;
        Self::json(&url, response).await
    }

    /// POST a JSON body and decode the JSON reply
    pub async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T, CatalogError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(endpoint);
        let response = self.send(&url, || self.client.post(&url).json(body)).await?;
        Self::json(&url, response).await
    }

    /// Fetch an HTML page; `None` when it does not exist
    pub async fn get_page(&self, url: &str) -> Result<Option<String>, CatalogError> {
        let response = self.send(url, || self.client.get(url)).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(CatalogError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(Some(response.text().await?))
    }
}
