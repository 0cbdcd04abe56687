//! HTTP client for the Codeforces API
//!
//! Every call goes through one rate limiter shared by all endpoints and is
//! retried on transport failures and call limit errors.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{header::ACCEPT_ENCODING, Client};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::error::{ApiError, ApiResult};
use super::{
    user_info_chunks, CodeforcesApi, ProblemsetQuery, ProblemsetResponse, Standings,
    StandingsQuery,
};
use crate::config::ApiConfig;
use crate::metrics;
use crate::models::{Contest, RatingChange, User};
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Response envelope shared by all API methods
#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

/// Codeforces API client
pub struct CodeforcesClient {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// API root, e.g. `https://codeforces.com/api/`
    base_url: Url,

    retry: RetryConfig,
}

impl CodeforcesClient {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Client` if the HTTP client cannot be created
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .gzip(true)
            .build()?;

        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        let base_url = Url::parse(&config.base_url)?;

        Ok(Self {
            client,
            rate_limiter,
            base_url,
            retry: RetryConfig::with_delays(
                config.max_tries,
                config.retry_base_delay_ms,
                config.retry_base_delay_ms.saturating_mul(8),
            ),
        })
    }

    /// Create a client against a custom API root, for tests with a mock server
    pub fn with_base_url(base_url: &str, mut config: ApiConfig) -> ApiResult<Self> {
        config.base_url = base_url.to_string();
        Self::new(&config)
    }

    /// Call `method` with form `params` and decode the `result` field
    pub async fn query<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> ApiResult<T> {
        let started = Instant::now();
        let result = with_retry_if(
            &self.retry,
            method,
            || self.query_once(method, params),
            ApiError::is_retryable,
        )
        .await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::record_api_request(method, outcome, started.elapsed().as_secs_f64());

        serde_json::from_value(result?).map_err(ApiError::from)
    }

    async fn query_once(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> ApiResult<serde_json::Value> {
        self.rate_limiter.until_ready().await;

        let url = self.base_url.join(method)?;
        tracing::info!(method, params = ?params, "Querying Codeforces API");

        let response = self
            .client
            .post(url)
            .header(ACCEPT_ENCODING, "gzip")
            .form(params)
            .send()
            .await
            .inspect_err(|e| tracing::error!(method, error = %e, "Request to Codeforces API failed"))?;

        let status = response.status();
        let body = response.bytes().await?;

        let envelope: Envelope = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(ApiError::Decode(e)),
            Err(_) => {
                tracing::warn!(method, status = status.as_u16(), "Codeforces API did not respond with JSON");
                return Err(ApiError::Http {
                    status: status.as_u16(),
                });
            }
        };

        if status.is_success() && envelope.status == "OK" {
            return Ok(envelope.result.unwrap_or(serde_json::Value::Null));
        }

        let comment = format!(
            "HTTP Error {}, {}",
            status.as_u16(),
            envelope.comment.unwrap_or_default()
        );
        tracing::warn!(method, comment = %comment, "Query to Codeforces API failed");
        Err(ApiError::from_comment(comment))
    }
}

#[async_trait]
impl CodeforcesApi for CodeforcesClient {
    async fn contest_list(&self, gym: Option<bool>) -> ApiResult<Vec<Contest>> {
        let params: Vec<(&str, String)> = gym.map(|g| ("gym", g.to_string())).into_iter().collect();
        self.query("contest.list", &params).await
    }

    async fn contest_rating_changes(&self, contest_id: i32) -> ApiResult<Vec<RatingChange>> {
        self.query("contest.ratingChanges", &[("contestId", contest_id.to_string())])
            .await
            .map_err(|e| e.for_contest(contest_id))
    }

    async fn contest_standings(&self, query: &StandingsQuery) -> ApiResult<Standings> {
        self.query("contest.standings", &query.params())
            .await
            .map_err(|e| e.for_contest(query.contest_id))
    }

    async fn problemset_problems(&self, query: &ProblemsetQuery) -> ApiResult<ProblemsetResponse> {
        self.query("problemset.problems", &query.params()).await
    }

    async fn user_info(&self, handles: &[String]) -> ApiResult<Vec<User>> {
        let chunks = user_info_chunks(handles);
        if chunks.len() > 1 {
            tracing::warn!(
                handles = handles.len(),
                requests = chunks.len(),
                "user.info request will be split"
            );
        }

        let mut users = Vec::with_capacity(handles.len());
        for chunk in chunks {
            let batch: Vec<User> = self
                .query("user.info", &[("handles", chunk.join(";"))])
                .await
                .map_err(|e| e.for_handles(&chunk))?;
            users.extend(batch);
        }

        tracing::info!(requested = handles.len(), returned = users.len(), "user.info completed");
        Ok(users)
    }

    async fn user_rated_list(&self, active_only: Option<bool>) -> ApiResult<Vec<User>> {
        let params: Vec<(&str, String)> = active_only
            .map(|a| ("activeOnly", a.to_string()))
            .into_iter()
            .collect();
        self.query("user.ratedList", &params).await
    }
}
