//! Credentials attached to outgoing source requests.

use super::SourceError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Tokens are renewed this long before the server-side expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// How a source authenticates.
pub enum Credentials {
    /// No authentication.
    None,
    /// Fixed bearer token.
    Static(String),
    /// OAuth2 client-credentials grant with a cached, renewable token.
    ClientCredentials(ClientCredentials),
}

impl Credentials {
    /// Bearer token for the next request, fetching one if none is cached.
    pub async fn bearer(&self) -> Result<Option<String>, SourceError> {
        match self {
            Credentials::None => Ok(None),
            Credentials::Static(token) => Ok(Some(token.clone())),
            Credentials::ClientCredentials(flow) => flow.token().await.map(Some),
        }
    }

    /// Replace a token the server rejected.
    ///
    /// Returns `None` when these credentials cannot be renewed.
    pub async fn refresh(&self, rejected: Option<&str>) -> Result<Option<String>, SourceError> {
        match self {
            Credentials::ClientCredentials(flow) => flow.refresh(rejected).await.map(Some),
            _ => Ok(None),
        }
    }
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

pub struct ClientCredentials {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<AccessToken>>,
    requests: std::sync::atomic::AtomicUsize,
}

impl ClientCredentials {
    pub fn new(
        client: Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            cached: Mutex::new(None),
            requests: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// How many times a token was requested from the token endpoint.
    pub fn token_requests(&self) -> usize {
        self.requests.load(std::sync::atomic::Ordering::Relaxed)
    }

    async fn token(&self) -> Result<String, SourceError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }
        let token = self.request_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn refresh(&self, rejected: Option<&str>) -> Result<String, SourceError> {
        let mut cached = self.cached.lock().await;
        // Another request may already have replaced the rejected token
        if let Some(token) = cached.as_ref() {
            if rejected != Some(token.value.as_str()) && token.is_fresh() {
                return Ok(token.value.clone());
            }
        }
        info!("Refreshing access token after authorization failure");
        let token = self.request_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn request_token(&self) -> Result<AccessToken, SourceError> {
        self.requests
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        debug!(url = %self.token_url, "Requesting client-credentials token");

        let basic = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response = self
            .client
            .post(&self.token_url)
            .header("Authorization", format!("Basic {}", basic))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Token request rejected: {}", body);
            return Err(if status.is_server_error() {
                SourceError::Api {
                    status: status.as_u16(),
                    message: body,
                }
            } else {
                SourceError::Auth(format!("token endpoint returned {}: {}", status, body))
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(format!("token response: {}", e)))?;

        Ok(AccessToken {
            value: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        })
    }
}
