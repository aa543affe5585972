//! HTTP plumbing shared by the source adapters.
//!
//! Handles throttling, bearer credentials, one transparent token refresh per
//! attempt on 401, bounded retry, and status classification.

use super::auth::Credentials;
use super::retry::RetryPolicy;
use super::SourceError;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Default per-request timeout for source HTTP clients.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body kept in `SourceError::Api` messages.
const MAX_ERROR_BODY: usize = 200;

pub struct HttpSource {
    label: &'static str,
    client: Client,
    credentials: Credentials,
    retry: RetryPolicy,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpSource {
    pub fn new(
        label: &'static str,
        client: Client,
        credentials: Credentials,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            label,
            client,
            credentials,
            retry,
            min_interval: Duration::ZERO,
            last_request: Mutex::new(None),
        }
    }

    /// Space consecutive requests at least `interval` apart.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// GET `url` and decode a JSON body. A 404 answers `Ok(None)`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, SourceError> {
        self.retry
            .run(self.label, |_attempt| self.get_once(url, query))
            .await
    }

    /// Like [`get_json`](Self::get_json), with `check` run on every decoded
    /// body inside the retry loop. Services that report failures in a 200
    /// body use it so those failures are retried like status errors.
    pub async fn get_json_checked<T, F>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        check: F,
    ) -> Result<Option<T>, SourceError>
    where
        T: DeserializeOwned,
        F: Fn(T) -> Result<Option<T>, SourceError>,
    {
        let check = &check;
        self.retry
            .run(self.label, move |_attempt| async move {
                match self.get_once::<T>(url, query).await? {
                    Some(body) => check(body),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, SourceError> {
        let token = self.credentials.bearer().await?;
        let mut response = self.send(url, query, token.as_deref()).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            match self.credentials.refresh(token.as_deref()).await? {
                Some(fresh) => {
                    debug!(source = self.label, "Retrying request with refreshed token");
                    response = self.send(url, query, Some(&fresh)).await?;
                    if response.status() == StatusCode::UNAUTHORIZED {
                        return Err(SourceError::Unauthorized);
                    }
                }
                None => {
                    return Err(SourceError::Auth(format!(
                        "{} rejected the configured credentials",
                        self.label
                    )))
                }
            }
        }

        decode(response).await
    }

    async fn send(
        &self,
        url: &str,
        query: &[(&str, &str)],
        token: Option<&str>,
    ) -> Result<Response, SourceError> {
        self.throttle().await;

        let mut request = self.client.get(url).query(query);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        debug!(source = self.label, url, "GET");
        Ok(request.send().await?)
    }

    async fn throttle(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<Option<T>, SourceError> {
    let status = response.status();

    if status.is_success() {
        let bytes = response.bytes().await?;
        return serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| SourceError::InvalidResponse(e.to_string()));
    }

    match status {
        StatusCode::NOT_FOUND => Ok(None),
        StatusCode::TOO_MANY_REQUESTS => Err(SourceError::RateLimited),
        _ => {
            let mut message = response.text().await.unwrap_or_default();
            if message.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !message.is_char_boundary(cut) {
                    cut -= 1;
                }
                message.truncate(cut);
            }
            Err(SourceError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Build the shared reqwest client for a source.
pub fn build_client(user_agent: Option<&str>) -> Result<Client, SourceError> {
    let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);
    if let Some(user_agent) = user_agent {
        builder = builder.user_agent(user_agent.to_string());
    }
    builder
        .build()
        .map_err(|e| SourceError::Connection(format!("failed to build HTTP client: {}", e)))
}
