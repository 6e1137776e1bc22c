/// TMDB API provider
///
/// Fetches discovery, trending, and detail records from themoviedb.org.
/// Requests retry with bounded exponential backoff on rate limits, server
/// errors, and transport failures; other client errors fail fast.
use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::models::TmdbMovie;
use crate::services::providers::MetadataProvider;

const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE_SECS: u64 = 1;

/// Envelope around TMDB list endpoints (`/discover/movie`, `/trending/...`)
#[derive(Debug, Deserialize)]
struct PageResponse {
    #[serde(default)]
    results: Vec<TmdbMovie>,
}

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    timeout: Duration,
    backoff_base: Duration,
}

impl TmdbProvider {
    pub fn new(api_key: String, api_url: String, timeout: Duration) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url,
            timeout,
            backoff_base: Duration::from_secs(BACKOFF_BASE_SECS),
        }
    }

    #[cfg(test)]
    fn with_backoff(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// GET with a hard per-request timeout and retries. 429 and 5xx back off
    /// 1s, 2s, 4s; other 4xx are returned immediately since retrying cannot
    /// fix them. A hung connection surfaces as a timeout and retries too.
    async fn get_with_retry(&self, url: &str, query: &[(&str, &str)]) -> AppResult<reqwest::Response> {
        let mut attempt = 0;
        loop {
            let result = self
                .http_client
                .get(url)
                .query(&[("api_key", self.api_key.as_str())])
                .query(query)
                .timeout(self.timeout)
                .send()
                .await;

            let reason = match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if !(status.as_u16() == 429 || status.is_server_error()) {
                        return Err(AppError::Upstream(format!(
                            "TMDB returned status {}",
                            status
                        )));
                    }
                    format!("status {}", status)
                }
                Err(e) => format!("transport error: {}", e),
            };

            if attempt >= MAX_RETRIES {
                return Err(AppError::Upstream(format!(
                    "TMDB request failed after {} retries ({})",
                    MAX_RETRIES, reason
                )));
            }

            let delay = self.backoff_base * (1u32 << attempt);
            tracing::warn!(
                url = %url,
                attempt = attempt + 1,
                delay_secs = delay.as_secs(),
                reason = %reason,
                "TMDB request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn fetch_page(&self, url: &str, query: &[(&str, &str)]) -> AppResult<Vec<TmdbMovie>> {
        let response = self.get_with_retry(url, query).await?;
        let page: PageResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse TMDB response: {}", e)))?;
        Ok(page.results)
    }
}

#[async_trait::async_trait]
impl MetadataProvider for TmdbProvider {
    async fn discover(&self, page: u32) -> AppResult<Vec<TmdbMovie>> {
        let url = format!("{}/discover/movie", self.api_url);
        let page_param = page.to_string();
        let movies = self
            .fetch_page(
                &url,
                &[("sort_by", "popularity.desc"), ("page", page_param.as_str())],
            )
            .await?;

        tracing::info!(page = page, results = movies.len(), "TMDB discover fetched");
        Ok(movies)
    }

    async fn detail(&self, tmdb_id: i64) -> AppResult<TmdbMovie> {
        let url = format!("{}/movie/{}", self.api_url, tmdb_id);
        let response = self.get_with_retry(&url, &[]).await?;
        let movie: TmdbMovie = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse TMDB response: {}", e)))?;
        Ok(movie)
    }

    async fn trending(&self) -> AppResult<Vec<TmdbMovie>> {
        let url = format!("{}/trending/movie/week", self.api_url);
        let movies = self.fetch_page(&url, &[]).await?;

        tracing::info!(results = movies.len(), "TMDB trending fetched");
        Ok(movies)
    }
}
