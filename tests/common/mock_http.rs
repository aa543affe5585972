//! Mock upstream services on a random local port.
//!
//! Serves a Spotify-shaped API (client-credentials token endpoint, artist
//! lookups, search), a MusicBrainz-shaped artist search and a Last.fm-shaped
//! `artist.getinfo`, with knobs to inject 401, 429 and 5xx responses and
//! Last.fm error codes.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use catalog_enricher::config::{LastFmSettings, MusicBrainzSettings, SpotifySettings};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub const RADIOHEAD_SPOTIFY_ID: &str = "4Z8W4fKeB5YxbusRsdQVPb";
pub const RADIOHEAD_MBID: &str = "a74b1b7f-71a5-4011-9441-d0b5e4122711";
pub const CHER_MBID: &str = "bfcc6d75-a6a5-4bc6-8282-47aec8531818";
pub const LASTFM_API_KEY: &str = "test-lastfm-key";

#[derive(Default)]
pub struct MockState {
    pub token_requests: AtomicUsize,
    pub api_requests: AtomicUsize,
    /// Answer 401 to requests carrying the first token ever issued.
    pub reject_first_token: AtomicBool,
    /// Answer 401 to every API request.
    pub reject_all_tokens: AtomicBool,
    /// Number of upcoming API requests answered with 429.
    pub rate_limited: AtomicUsize,
    /// Number of upcoming API requests answered with 503.
    pub unavailable: AtomicUsize,
    pub last_user_agent: std::sync::Mutex<Option<String>>,
    /// Last.fm error codes answered, one per request, before normal replies.
    pub lastfm_errors: std::sync::Mutex<VecDeque<i64>>,
    pub last_api_key: std::sync::Mutex<Option<String>>,
}

impl MockState {
    pub fn queue_lastfm_errors(&self, codes: &[i64]) {
        self.lastfm_errors.lock().unwrap().extend(codes);
    }

    pub fn token_requests(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }

    pub fn api_requests(&self) -> usize {
        self.api_requests.load(Ordering::SeqCst)
    }
}

/// Consume one unit of an injected failure budget.
fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

async fn token(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_client"}))).into_response();
    }
    let n = state.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({
        "access_token": format!("token-{}", n),
        "token_type": "Bearer",
        "expires_in": 3600
    }))
    .into_response()
}

/// Shared gate for API endpoints: auth, then injected failures.
fn gate(state: &MockState, headers: &HeaderMap) -> Option<Response> {
    state.api_requests.fetch_add(1, Ordering::SeqCst);

    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let rejected = match bearer {
        None => true,
        Some(_) if state.reject_all_tokens.load(Ordering::SeqCst) => true,
        Some("token-1") => state.reject_first_token.load(Ordering::SeqCst),
        Some(_) => false,
    };
    if rejected {
        return Some(StatusCode::UNAUTHORIZED.into_response());
    }
    if take(&state.rate_limited) {
        return Some(StatusCode::TOO_MANY_REQUESTS.into_response());
    }
    if take(&state.unavailable) {
        return Some((StatusCode::SERVICE_UNAVAILABLE, "upstream overloaded").into_response());
    }
    None
}

fn radiohead() -> serde_json::Value {
    json!({
        "id": RADIOHEAD_SPOTIFY_ID,
        "name": "Radiohead",
        "genres": ["alternative rock", "art rock"],
        "popularity": 79,
        "images": [{"url": "https://i.scdn.co/image/radiohead", "height": 640, "width": 640}],
        "external_urls": {"spotify": "https://open.spotify.com/artist/4Z8W4fKeB5YxbusRsdQVPb"}
    })
}

async fn spotify_artist(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Some(response) = gate(&state, &headers) {
        return response;
    }
    if id == RADIOHEAD_SPOTIFY_ID {
        Json(radiohead()).into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(json!({"error": {"status": 404}}))).into_response()
    }
}

async fn spotify_search(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Some(response) = gate(&state, &headers) {
        return response;
    }
    let query = params.get("q").map(|q| q.to_lowercase()).unwrap_or_default();
    let items = if query.contains("radiohead") {
        vec![radiohead()]
    } else {
        vec![]
    };
    Json(json!({"artists": {"items": items}})).into_response()
}

async fn musicbrainz_artist_search(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.api_requests.fetch_add(1, Ordering::SeqCst);
    *state.last_user_agent.lock().unwrap() = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let query = params.get("query").cloned().unwrap_or_default();
    if !query.contains("\"Radiohead\"") {
        return Json(json!({"artists": []})).into_response();
    }
    Json(json!({
        "artists": [{
            "id": RADIOHEAD_MBID,
            "name": "Radiohead",
            "tags": [
                {"name": "british", "count": 3},
                {"name": "alternative rock", "count": 12}
            ],
            "relations": [
                {"type": "official homepage", "url": {"resource": "https://www.radiohead.com/"}}
            ]
        }]
    }))
    .into_response()
}

fn lastfm_error(code: i64, message: &str) -> Response {
    Json(json!({"error": code, "message": message, "links": []})).into_response()
}

/// Last.fm answers errors with a 200 and an `error` code in the body.
async fn lastfm(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.api_requests.fetch_add(1, Ordering::SeqCst);
    let api_key = params.get("api_key").cloned();
    *state.last_api_key.lock().unwrap() = api_key.clone();

    if api_key.as_deref() != Some(LASTFM_API_KEY) {
        return lastfm_error(10, "Invalid API key - You must be granted a valid key by last.fm");
    }
    if let Some(code) = state.lastfm_errors.lock().unwrap().pop_front() {
        return lastfm_error(code, "Injected failure");
    }

    let method = params.get("method").map(String::as_str);
    let artist = params.get("artist").map(|a| a.to_lowercase());
    if method != Some("artist.getinfo") || artist.as_deref() != Some("cher") {
        return lastfm_error(6, "The artist you supplied could not be found");
    }
    Json(json!({
        "artist": {
            "name": "Cher",
            "mbid": CHER_MBID,
            "url": "https://www.last.fm/music/Cher",
            "image": [
                {"#text": "https://lastfm.example/34s/cher.png", "size": "small"},
                {"#text": "https://lastfm.example/300x300/cher.png", "size": "extralarge"}
            ],
            "tags": {"tag": [{"name": "pop"}, {"name": "dance"}]}
        }
    }))
    .into_response()
}

/// Mock upstream server. Shuts down when dropped.
pub struct MockUpstream {
    pub base_url: String,
    pub state: Arc<MockState>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockUpstream {
    pub async fn spawn() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/api/token", post(token))
            .route("/v1/artists/{id}", get(spotify_artist))
            .route("/v1/search", get(spotify_search))
            .route("/ws/2/artist/", get(musicbrainz_artist_search))
            .route("/2.0/", get(lastfm))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Mock server failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            state,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn spotify_settings(&self) -> SpotifySettings {
        SpotifySettings {
            client_id: Some("test-client".to_string()),
            client_secret: Some("test-secret".to_string()),
            api_base: format!("{}/v1", self.base_url),
            token_url: format!("{}/api/token", self.base_url),
        }
    }

    pub fn musicbrainz_settings(&self) -> MusicBrainzSettings {
        MusicBrainzSettings {
            user_agent: "catalog-enricher-tests/0.0 (tests@example.com)".to_string(),
            api_base: format!("{}/ws/2", self.base_url),
            min_interval: Duration::from_millis(50),
        }
    }

    pub fn lastfm_settings(&self) -> LastFmSettings {
        LastFmSettings {
            api_key: Some(LASTFM_API_KEY.to_string()),
            api_base: format!("{}/2.0/", self.base_url),
            min_interval: Duration::from_millis(10),
        }
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
