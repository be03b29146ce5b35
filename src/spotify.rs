use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::catalog::ProviderError;
use crate::limiter::{retry_after_429, retry_after_error, RateGate};
use crate::types::{EntityKind, SecondaryId};

const ACCOUNTS_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

/// Spotify credentials and client knobs. The companion platform is far
/// more permissive than the primary catalog, so the gate spacing is only
/// a courtesy floor.
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub min_interval: Duration,
    pub max_retries: u32,
    pub request_timeout: Duration,
}

impl SpotifyConfig {
    /// Read credentials from `SPOTIFY_CLIENT_ID` / `SPOTIFY_CLIENT_SECRET`.
    /// Absent credentials disable the crosswalk rather than failing the run.
    pub fn from_env() -> Option<Self> {
        let client_id = std::env::var("SPOTIFY_CLIENT_ID").ok()?;
        let client_secret = std::env::var("SPOTIFY_CLIENT_SECRET").ok()?;
        if client_id.is_empty() || client_secret.is_empty() {
            return None;
        }
        Some(Self {
            client_id,
            client_secret,
            min_interval: Duration::from_millis(100),
            max_retries: 3,
            request_timeout: Duration::from_secs(10),
        })
    }
}

/// A parsed `open.spotify.com` entity reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpotifyRef {
    Track(String),
    Album(String),
    Artist(String),
}

impl SpotifyRef {
    /// The catalog entity kind this reference can crosswalk into.
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Self::Track(_) => EntityKind::Recording,
            Self::Album(_) => EntityKind::Release,
            Self::Artist(_) => EntityKind::Artist,
        }
    }
}

/// Parse an `open.spotify.com` URL into a typed reference. Locale path
/// prefixes (`/intl-fr/...`) and query strings are tolerated.
pub fn parse_open_url(url: &str) -> Option<SpotifyRef> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let rest = rest.strip_prefix("open.spotify.com/")?;
    let path = rest.split(['?', '#']).next().unwrap_or("");
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let mut kind = segments.next()?;
    if kind.starts_with("intl-") {
        kind = segments.next()?;
    }
    let id = segments.next()?;
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    match kind {
        "track" => Some(SpotifyRef::Track(id.to_string())),
        "album" => Some(SpotifyRef::Album(id.to_string())),
        "artist" => Some(SpotifyRef::Artist(id.to_string())),
        _ => None,
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Client-credentials Spotify Web API client, used only to pull secondary
/// identifiers (ISRC, UPC/EAN) out of referenced entities.
pub struct SpotifyClient {
    http: reqwest::Client,
    cfg: SpotifyConfig,
    gate: RateGate,
    token: tokio::sync::Mutex<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Default, Deserialize)]
struct WireExternalIds {
    isrc: Option<String>,
    upc: Option<String>,
    ean: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireTrack {
    #[serde(default)]
    external_ids: Option<WireExternalIds>,
}

#[derive(Debug, Deserialize)]
struct WireAlbum {
    #[serde(default)]
    external_ids: Option<WireExternalIds>,
}

impl SpotifyClient {
    pub fn new(cfg: SpotifyConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| ProviderError::Fatal(format!("HTTP client init failed: {e}")))?;
        Ok(Self {
            http,
            gate: RateGate::new(cfg.min_interval),
            cfg,
            token: tokio::sync::Mutex::new(None),
        })
    }

    /// Current bearer token, refreshed through the client-credentials flow
    /// when missing or within a minute of expiry.
    async fn bearer(&self) -> Result<String, ProviderError> {
        let mut slot = self.token.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.expires_at > Instant::now() + Duration::from_secs(60) {
                return Ok(cached.value.clone());
            }
        }
        let resp = self
            .http
            .post(ACCOUNTS_URL)
            .basic_auth(&self.cfg.client_id, Some(&self.cfg.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ProviderError::Retryable(format!("token request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(ProviderError::Fatal(format!(
                "token request rejected: HTTP {}",
                resp.status()
            )));
        }
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Fatal(format!("invalid token payload: {e}")))?;
        let value = token.access_token.clone();
        *slot = Some(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        debug!("refreshed access token");
        Ok(value)
    }

    async fn get_json(&self, path: &str) -> Result<Option<serde_json::Value>, ProviderError> {
        let url = format!("{API_BASE}/{path}");
        let mut attempt: u32 = 0;
        loop {
            self.gate.wait().await;
            let bearer = self.bearer().await?;
            let sent = self.http.get(&url).bearer_auth(bearer).send().await;
            match sent {
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    if status == StatusCode::UNAUTHORIZED {
                        // Token expired under us; drop it and retry.
                        *self.token.lock().await = None;
                        if attempt >= self.cfg.max_retries {
                            return Err(ProviderError::Retryable(
                                "authorization kept failing".to_string(),
                            ));
                        }
                        attempt += 1;
                        continue;
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        if attempt >= self.cfg.max_retries {
                            return Err(ProviderError::Retryable(format!(
                                "rate limited after {attempt} retries"
                            )));
                        }
                        let pause = retry_after_429(attempt);
                        warn!(%url, attempt, pause_s = pause.as_secs(), "rate limited (429), backing off");
                        tokio::time::sleep(pause).await;
                        attempt += 1;
                        continue;
                    }
                    if status.is_client_error() || status.is_server_error() {
                        if attempt >= self.cfg.max_retries {
                            return Err(ProviderError::Retryable(format!(
                                "HTTP {status} after {attempt} retries"
                            )));
                        }
                        let pause = retry_after_error(attempt);
                        warn!(%url, %status, attempt, "HTTP error, retrying");
                        tokio::time::sleep(pause).await;
                        attempt += 1;
                        continue;
                    }
                    return resp
                        .json()
                        .await
                        .map(Some)
                        .map_err(|e| ProviderError::Fatal(format!("invalid JSON from {url}: {e}")));
                }
                Err(e) => {
                    if attempt >= self.cfg.max_retries {
                        return Err(ProviderError::Retryable(format!(
                            "request failed after {attempt} retries: {e}"
                        )));
                    }
                    let pause = retry_after_error(attempt);
                    warn!(%url, error = %e, attempt, "request failed, retrying");
                    tokio::time::sleep(pause).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Pull the secondary unique identifier out of a referenced entity:
    /// ISRC for tracks, barcode (UPC, falling back to EAN) for albums.
    /// Artist references carry no such identifier.
    pub async fn secondary_id(
        &self,
        reference: &SpotifyRef,
    ) -> Result<Option<SecondaryId>, ProviderError> {
        match reference {
            SpotifyRef::Track(id) => {
                let Some(value) = self.get_json(&format!("tracks/{id}")).await? else {
                    return Ok(None);
                };
                let track: WireTrack = serde_json::from_value(value)
                    .map_err(|e| ProviderError::Fatal(format!("invalid track payload: {e}")))?;
                Ok(track
                    .external_ids
                    .and_then(|ids| ids.isrc)
                    .filter(|isrc| !isrc.is_empty())
                    .map(SecondaryId::Isrc))
            }
            SpotifyRef::Album(id) => {
                let Some(value) = self.get_json(&format!("albums/{id}")).await? else {
                    return Ok(None);
                };
                let album: WireAlbum = serde_json::from_value(value)
                    .map_err(|e| ProviderError::Fatal(format!("invalid album payload: {e}")))?;
                Ok(album
                    .external_ids
                    .and_then(|ids| ids.upc.or(ids.ean))
                    .filter(|code| !code.is_empty())
                    .map(SecondaryId::Barcode))
            }
            SpotifyRef::Artist(_) => Ok(None),
        }
    }
}
