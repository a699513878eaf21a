use async_trait::async_trait;
use thiserror::Error;

use platematch_core::Candidate;

/// Default discovery endpoint. Expects `?lat=..&lon=..` and returns a JSON
/// array of restaurant objects, each with at least an `id`.
pub const DEFAULT_DISCOVERY_URL: &str = "https://wolt-restaurant-api.herokuapp.com/discovery";

#[derive(Debug, Error)]
pub enum CandidateFetchError {
    #[error("candidate request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("candidate api returned status {0}")]
    UpstreamStatus(u16),

    #[error("failed to decode candidate payload: {0}")]
    Decode(String),
}

/// External restaurant lookup. The coordination core never calls this on the
/// swipe/chat path; the transport layer fetches and hands the result to
/// `set_candidates`. On error, no session is mutated.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn fetch(&self, lat: f64, lon: f64) -> Result<Vec<Candidate>, CandidateFetchError>;
}

/// Production source backed by the Wolt discovery API.
pub struct WoltSource {
    client: reqwest::Client,
    base_url: String,
}

impl WoltSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for WoltSource {
    fn default() -> Self {
        Self::new(DEFAULT_DISCOVERY_URL)
    }
}

#[async_trait]
impl CandidateSource for WoltSource {
    async fn fetch(&self, lat: f64, lon: f64) -> Result<Vec<Candidate>, CandidateFetchError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("lat", lat), ("lon", lon)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), url = %self.base_url, "candidate fetch failed upstream");
            return Err(CandidateFetchError::UpstreamStatus(status.as_u16()));
        }

        let body: serde_json::Value = resp.json().await?;
        let items = body
            .as_array()
            .ok_or_else(|| CandidateFetchError::Decode("expected a JSON array".into()))?;

        let candidates = items
            .iter()
            .map(|item| {
                serde_json::from_value(item.clone())
                    .map_err(|e| CandidateFetchError::Decode(e.to_string()))
            })
            .collect::<Result<Vec<Candidate>, _>>()?;

        tracing::debug!(count = candidates.len(), "candidates fetched");
        Ok(candidates)
    }
}
