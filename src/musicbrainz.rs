use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::catalog::{Catalog, ProviderError, SearchQuery};
use crate::config::CatalogConfig;
use crate::limiter::{retry_after_429, retry_after_error, RateGate};
use crate::types::{Candidate, ContainerRef, EntityKind, OwnerCredit, SecondaryId, TrackRef};

/// Rate-limited MusicBrainz `ws/2` client with a process-lifetime
/// memoization cache for detail records and per-owner group listings.
pub struct MusicBrainzClient {
    http: reqwest::Client,
    cfg: CatalogConfig,
    gate: RateGate,
    details: Mutex<HashMap<(EntityKind, String), Candidate>>,
    groups_by_owner: Mutex<HashMap<String, Vec<Candidate>>>,
}

impl MusicBrainzClient {
    pub fn new(cfg: CatalogConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| ProviderError::Fatal(format!("HTTP client init failed: {e}")))?;
        Ok(Self {
            http,
            gate: RateGate::new(cfg.min_interval),
            cfg,
            details: Mutex::new(HashMap::new()),
            groups_by_owner: Mutex::new(HashMap::new()),
        })
    }

    /// One GET with rate-gate spacing and the retry/backoff discipline:
    /// 429 backs off exponentially, other 4xx/5xx and network errors
    /// linearly, an expected 404 is an immediate `NotFound` miss.
    async fn get_json(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, ProviderError> {
        let url = format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path);
        let mut attempt: u32 = 0;
        loop {
            self.gate.wait().await;
            let sent = self
                .http
                .get(&url)
                .query(&[("fmt", "json")])
                .query(params)
                .send()
                .await;
            match sent {
                Ok(resp) => match status_action(resp.status(), attempt, self.cfg.max_retries) {
                    StatusAction::Miss => return Err(ProviderError::NotFound),
                    StatusAction::GiveUp(detail) => return Err(ProviderError::Retryable(detail)),
                    StatusAction::Backoff(pause) => {
                        warn!(%url, status = %resp.status(), attempt,
                            pause_ms = pause.as_millis() as u64, "transient HTTP status, backing off");
                        tokio::time::sleep(pause).await;
                        attempt += 1;
                    }
                    StatusAction::Proceed => {
                        return resp.json().await.map_err(|e| {
                            ProviderError::Fatal(format!("invalid JSON from {url}: {e}"))
                        });
                    }
                },
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

    fn cached_detail(&self, kind: EntityKind, id: &str) -> Option<Candidate> {
        let details = self.details.lock().ok()?;
        details.get(&(kind, id.to_string())).cloned()
    }

    fn store_detail(&self, candidate: &Candidate) {
        if let Ok(mut details) = self.details.lock() {
            details.insert((candidate.kind, candidate.id.clone()), candidate.clone());
        }
    }
}

/// Verdict on one HTTP status at retry number `attempt`.
#[derive(Debug, PartialEq)]
enum StatusAction {
    /// Success, parse the body.
    Proceed,
    /// Expected 404, an immediate miss, never retried.
    Miss,
    /// Transient status, sleep this long and try again.
    Backoff(std::time::Duration),
    /// Transient status with the retry budget spent.
    GiveUp(String),
}

fn status_action(status: StatusCode, attempt: u32, max_retries: u32) -> StatusAction {
    if status == StatusCode::NOT_FOUND {
        return StatusAction::Miss;
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return if attempt >= max_retries {
            StatusAction::GiveUp(format!("rate limited after {attempt} retries"))
        } else {
            StatusAction::Backoff(retry_after_429(attempt))
        };
    }
    if status.is_client_error() || status.is_server_error() {
        return if attempt >= max_retries {
            StatusAction::GiveUp(format!("HTTP {status} after {attempt} retries"))
        } else {
            StatusAction::Backoff(retry_after_error(attempt))
        };
    }
    StatusAction::Proceed
}

/// `inc=` parameter set per detail endpoint, trimmed from the upstream
/// defaults to what resolution actually consumes.
const fn detail_inc(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Artist => "aliases+url-rels",
        EntityKind::ReleaseGroup => "releases+artist-credits+aliases",
        EntityKind::Release => "artists+labels+recordings+release-groups+aliases",
        EntityKind::Recording => "artists+releases+release-groups+aliases+isrcs",
        EntityKind::Label => "aliases",
    }
}

const fn search_inc(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Recording => Some("artist-credits+aliases+releases"),
        EntityKind::Release => Some("artist-credits+aliases"),
        _ => None,
    }
}

/// Quote a value as a Lucene phrase, escaping embedded quotes.
fn lucene_phrase(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Unquoted Lucene term for partial matching; quotes would change the
/// query semantics, so they are dropped.
fn lucene_term(value: &str) -> String {
    value.replace('"', " ")
}

/// Build the structured search query for a kind. An owner id produces an
/// identifier-scoped query (`arid:`), preferred over free text because
/// free-text search on common titles returns excessive false positives.
fn build_query(kind: EntityKind, q: &SearchQuery) -> String {
    let mut parts: Vec<String> = Vec::new();
    match kind {
        EntityKind::Recording => {
            if let Some(arid) = &q.owner_id {
                // Partial title match: the scoped query already pins the
                // artist, and exact filtering happens in the scorer.
                parts.push(format!("recording:{}", lucene_term(&q.title)));
                parts.push(format!("arid:{arid}"));
            } else {
                parts.push(format!("recording:{}", lucene_phrase(&q.title)));
                if let Some(owner) = &q.owner_name {
                    parts.push(format!("artist:{}", lucene_phrase(owner)));
                }
            }
            if let Some(container) = &q.container_title {
                parts.push(format!("release:{}", lucene_phrase(container)));
            }
        }
        EntityKind::Release => {
            parts.push(format!("release:{}", lucene_phrase(&q.title)));
            if let Some(arid) = &q.owner_id {
                parts.push(format!("arid:{arid}"));
            } else if let Some(owner) = &q.owner_name {
                parts.push(format!("artist:{}", lucene_phrase(owner)));
            }
        }
        EntityKind::ReleaseGroup => {
            parts.push(format!("releasegroup:{}", lucene_phrase(&q.title)));
            if let Some(arid) = &q.owner_id {
                parts.push(format!("arid:{arid}"));
            }
        }
        // Names are selective enough for plain free text.
        EntityKind::Artist | EntityKind::Label => return q.title.clone(),
    }
    parts.join(" AND ")
}

// --- wire models -----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireAlias {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireArtistRef {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireArtistCredit {
    artist: Option<WireArtistRef>,
}

#[derive(Debug, Deserialize)]
struct WireLifeSpan {
    begin: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireArtist {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    aliases: Vec<WireAlias>,
    #[serde(rename = "life-span")]
    life_span: Option<WireLifeSpan>,
    score: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireReleaseGroup {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "primary-type")]
    primary_type: Option<String>,
    #[serde(rename = "secondary-types", default)]
    secondary_types: Vec<String>,
    #[serde(rename = "first-release-date")]
    first_release_date: Option<String>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<WireArtistCredit>,
    #[serde(default)]
    aliases: Vec<WireAlias>,
    #[serde(default)]
    releases: Vec<WireRelease>,
}

#[derive(Debug, Deserialize)]
struct WireArea {
    #[serde(rename = "iso-3166-1-codes", default)]
    iso_codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireReleaseEvent {
    date: Option<String>,
    area: Option<WireArea>,
}

#[derive(Debug, Deserialize)]
struct WireRecordingSlot {
    id: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct WireTrack {
    #[serde(default)]
    title: String,
    recording: Option<WireRecordingSlot>,
}

#[derive(Debug, Deserialize)]
struct WireMedium {
    #[serde(default)]
    tracks: Vec<WireTrack>,
}

#[derive(Debug, Deserialize)]
struct WireRelease {
    id: String,
    #[serde(default)]
    title: String,
    status: Option<String>,
    date: Option<String>,
    country: Option<String>,
    #[serde(rename = "release-group")]
    release_group: Option<Box<WireReleaseGroup>>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<WireArtistCredit>,
    #[serde(default)]
    aliases: Vec<WireAlias>,
    #[serde(default)]
    media: Vec<WireMedium>,
    #[serde(rename = "release-events", default)]
    release_events: Vec<WireReleaseEvent>,
    score: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireRecording {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<WireArtistCredit>,
    #[serde(default)]
    aliases: Vec<WireAlias>,
    #[serde(default)]
    releases: Vec<WireRelease>,
    #[serde(rename = "first-release-date")]
    first_release_date: Option<String>,
    score: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RecordingSearchResponse {
    #[serde(default)]
    recordings: Vec<WireRecording>,
}

#[derive(Debug, Deserialize)]
struct ReleaseSearchResponse {
    #[serde(default)]
    releases: Vec<WireRelease>,
}

#[derive(Debug, Deserialize)]
struct ArtistSearchResponse {
    #[serde(default)]
    artists: Vec<WireArtist>,
}

#[derive(Debug, Deserialize)]
struct LabelSearchResponse {
    #[serde(default)]
    labels: Vec<WireArtist>,
}

#[derive(Debug, Deserialize)]
struct ReleaseGroupSearchResponse {
    #[serde(rename = "release-groups", default)]
    release_groups: Vec<WireReleaseGroup>,
}

#[derive(Debug, Deserialize)]
struct ReleaseGroupBrowseResponse {
    #[serde(rename = "release-groups", default)]
    release_groups: Vec<WireReleaseGroup>,
    #[serde(rename = "release-group-count")]
    count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct IsrcResponse {
    #[serde(default)]
    recordings: Vec<WireRecording>,
}

// --- conversions -----------------------------------------------------------

fn alias_names(aliases: Vec<WireAlias>) -> Vec<String> {
    aliases.into_iter().map(|a| a.name).collect()
}

fn credit_owners(credits: &[WireArtistCredit]) -> Vec<OwnerCredit> {
    credits
        .iter()
        .filter_map(|c| c.artist.as_ref())
        .map(|a| OwnerCredit {
            id: a.id.clone(),
            name: a.name.clone(),
        })
        .collect()
}

fn credit_owner_ids(credits: &[WireArtistCredit]) -> Vec<String> {
    credits
        .iter()
        .filter_map(|c| c.artist.as_ref())
        .map(|a| a.id.clone())
        .collect()
}

impl WireRelease {
    /// Earliest known date: release date, else first release event, else
    /// the group's first-release date.
    fn best_date(&self) -> Option<String> {
        self.date
            .clone()
            .or_else(|| self.release_events.iter().find_map(|e| e.date.clone()))
            .or_else(|| {
                self.release_group
                    .as_ref()
                    .and_then(|g| g.first_release_date.clone())
            })
    }

    fn best_country(&self) -> Option<String> {
        self.country.clone().or_else(|| {
            self.release_events
                .iter()
                .filter_map(|e| e.area.as_ref())
                .find_map(|a| a.iso_codes.first().cloned())
        })
    }

    fn into_candidate(self) -> Candidate {
        let date = self.best_date();
        let country = self.best_country();
        let mut owners = credit_owners(&self.artist_credit);
        let mut containers = Vec::new();
        let mut category = None;
        let mut secondary_types = Vec::new();
        if let Some(group) = self.release_group {
            category = group.primary_type.clone();
            secondary_types = group.secondary_types.clone();
            if owners.is_empty() {
                owners = credit_owners(&group.artist_credit);
            }
            containers.push(ContainerRef {
                id: Some(group.id),
                title: Some(group.title),
                category: group.primary_type,
                secondary_types: group.secondary_types,
                owner_ids: credit_owner_ids(&group.artist_credit),
                date: group.first_release_date,
            });
        }
        let members = self
            .media
            .into_iter()
            .flat_map(|m| m.tracks)
            .map(|t| {
                let title = if t.title.is_empty() {
                    t.recording.as_ref().map(|r| r.title.clone()).unwrap_or_default()
                } else {
                    t.title
                };
                TrackRef {
                    recording_id: t.recording.map(|r| r.id),
                    title,
                }
            })
            .collect();
        Candidate {
            id: self.id,
            kind: EntityKind::Release,
            title: self.title,
            aliases: alias_names(self.aliases),
            category,
            secondary_types,
            status: self.status.map(|s| s.to_lowercase()),
            owners,
            containers,
            date,
            country,
            relevance: self.score,
            members,
        }
    }
}

impl WireRecording {
    fn into_candidate(self) -> Candidate {
        let containers = self
            .releases
            .iter()
            .map(|r| ContainerRef {
                id: Some(r.id.clone()),
                title: Some(r.title.clone()),
                category: r
                    .release_group
                    .as_ref()
                    .and_then(|g| g.primary_type.clone()),
                secondary_types: r
                    .release_group
                    .as_ref()
                    .map(|g| g.secondary_types.clone())
                    .unwrap_or_default(),
                owner_ids: credit_owner_ids(&r.artist_credit),
                date: r.best_date(),
            })
            .collect();
        Candidate {
            id: self.id,
            kind: EntityKind::Recording,
            title: self.title,
            aliases: alias_names(self.aliases),
            category: None,
            secondary_types: Vec::new(),
            status: None,
            owners: credit_owners(&self.artist_credit),
            containers,
            date: self.first_release_date,
            country: None,
            relevance: self.score,
            members: Vec::new(),
        }
    }
}

impl WireReleaseGroup {
    fn into_candidate(self) -> Candidate {
        Candidate {
            id: self.id,
            kind: EntityKind::ReleaseGroup,
            title: self.title,
            aliases: alias_names(self.aliases),
            category: self.primary_type,
            secondary_types: self.secondary_types,
            status: None,
            owners: credit_owners(&self.artist_credit),
            containers: Vec::new(),
            date: self.first_release_date,
            country: None,
            relevance: None,
            members: Vec::new(),
        }
    }
}

impl WireArtist {
    fn into_candidate(self, kind: EntityKind) -> Candidate {
        Candidate {
            id: self.id,
            kind,
            title: self.name,
            aliases: alias_names(self.aliases),
            category: self.kind.map(|t| t.to_lowercase()),
            secondary_types: Vec::new(),
            status: None,
            owners: Vec::new(),
            containers: Vec::new(),
            date: self.life_span.and_then(|l| l.begin),
            country: None,
            relevance: self.score,
            members: Vec::new(),
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
    what: &str,
) -> Result<T, ProviderError> {
    serde_json::from_value(value)
        .map_err(|e| ProviderError::Fatal(format!("unexpected {what} payload: {e}")))
}

fn parse_detail(kind: EntityKind, value: serde_json::Value) -> Result<Candidate, ProviderError> {
    Ok(match kind {
        EntityKind::Artist | EntityKind::Label => {
            parse::<WireArtist>(value, kind.as_str())?.into_candidate(kind)
        }
        EntityKind::ReleaseGroup => parse::<WireReleaseGroup>(value, "release-group")?.into_candidate(),
        EntityKind::Release => parse::<WireRelease>(value, "release")?.into_candidate(),
        EntityKind::Recording => parse::<WireRecording>(value, "recording")?.into_candidate(),
    })
}

#[async_trait]
impl Catalog for MusicBrainzClient {
    async fn detail(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> Result<Option<Candidate>, ProviderError> {
        if let Some(hit) = self.cached_detail(kind, id) {
            debug!(%kind, id, "detail cache hit");
            return Ok(Some(hit));
        }
        let path = format!("{}/{id}", kind.as_str());
        let params = [("inc", detail_inc(kind).to_string())];
        match self.get_json(&path, &params).await {
            Ok(value) => {
                let candidate = parse_detail(kind, value)?;
                self.store_detail(&candidate);
                Ok(Some(candidate))
            }
            Err(ProviderError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn search(
        &self,
        kind: EntityKind,
        query: &SearchQuery,
    ) -> Result<Vec<Candidate>, ProviderError> {
        let mut params = vec![
            ("query", build_query(kind, query)),
            ("limit", query.limit.to_string()),
        ];
        if let Some(inc) = search_inc(kind) {
            params.push(("inc", inc.to_string()));
        }
        let value = self.get_json(kind.as_str(), &params).await?;
        Ok(match kind {
            EntityKind::Recording => parse::<RecordingSearchResponse>(value, "recording search")?
                .recordings
                .into_iter()
                .map(WireRecording::into_candidate)
                .collect(),
            EntityKind::Release => parse::<ReleaseSearchResponse>(value, "release search")?
                .releases
                .into_iter()
                .map(WireRelease::into_candidate)
                .collect(),
            EntityKind::ReleaseGroup => {
                parse::<ReleaseGroupSearchResponse>(value, "release-group search")?
                    .release_groups
                    .into_iter()
                    .map(WireReleaseGroup::into_candidate)
                    .collect()
            }
            EntityKind::Artist => parse::<ArtistSearchResponse>(value, "artist search")?
                .artists
                .into_iter()
                .map(|a| a.into_candidate(EntityKind::Artist))
                .collect(),
            EntityKind::Label => parse::<LabelSearchResponse>(value, "label search")?
                .labels
                .into_iter()
                .map(|l| l.into_candidate(EntityKind::Label))
                .collect(),
        })
    }

    async fn lookup_secondary(
        &self,
        id: &SecondaryId,
    ) -> Result<Option<Candidate>, ProviderError> {
        match id {
            SecondaryId::Isrc(code) => {
                let path = format!("isrc/{code}");
                let params = [("inc", detail_inc(EntityKind::Recording).to_string())];
                match self.get_json(&path, &params).await {
                    Ok(value) => {
                        let parsed: IsrcResponse = parse(value, "isrc lookup")?;
                        Ok(parsed
                            .recordings
                            .into_iter()
                            .next()
                            .map(WireRecording::into_candidate))
                    }
                    Err(ProviderError::NotFound) => Ok(None),
                    Err(e) => Err(e),
                }
            }
            SecondaryId::Barcode(code) => {
                let params = vec![
                    ("query", format!("barcode:{}", lucene_term(code))),
                    ("limit", "5".to_string()),
                    ("inc", "artist-credits+aliases".to_string()),
                ];
                let value = self.get_json("release", &params).await?;
                let parsed: ReleaseSearchResponse = parse(value, "barcode lookup")?;
                Ok(parsed
                    .releases
                    .into_iter()
                    .next()
                    .map(WireRelease::into_candidate))
            }
        }
    }

    async fn lookup_external_url(
        &self,
        kind: EntityKind,
        url: &str,
    ) -> Result<Option<Candidate>, ProviderError> {
        let params = vec![
            ("query", format!("url:{}", lucene_phrase(url))),
            ("limit", "5".to_string()),
        ];
        let value = self.get_json(kind.as_str(), &params).await?;
        Ok(match kind {
            EntityKind::Artist => parse::<ArtistSearchResponse>(value, "artist url lookup")?
                .artists
                .into_iter()
                .next()
                .map(|a| a.into_candidate(EntityKind::Artist)),
            EntityKind::Label => parse::<LabelSearchResponse>(value, "label url lookup")?
                .labels
                .into_iter()
                .next()
                .map(|l| l.into_candidate(EntityKind::Label)),
            _ => None,
        })
    }

    async fn owner_groups(&self, owner_id: &str) -> Result<Vec<Candidate>, ProviderError> {
        if let Ok(cache) = self.groups_by_owner.lock() {
            if let Some(groups) = cache.get(owner_id) {
                debug!(owner_id, "owner group cache hit");
                return Ok(groups.clone());
            }
        }
        let mut groups: Vec<Candidate> = Vec::new();
        let mut offset: u32 = 0;
        const BATCH: u32 = 100;
        loop {
            let params = vec![
                ("artist", owner_id.to_string()),
                ("type", "album".to_string()),
                ("limit", BATCH.to_string()),
                ("offset", offset.to_string()),
            ];
            let value = self.get_json("release-group", &params).await?;
            let page: ReleaseGroupBrowseResponse = parse(value, "release-group browse")?;
            let fetched = page.release_groups.len() as u32;
            groups.extend(
                page.release_groups
                    .into_iter()
                    .map(WireReleaseGroup::into_candidate),
            );
            if fetched == 0 {
                break;
            }
            offset += fetched;
            match page.count {
                Some(count) if offset < count => continue,
                _ => break,
            }
        }
        if let Ok(mut cache) = self.groups_by_owner.lock() {
            cache.insert(owner_id.to_string(), groups.clone());
        }
        Ok(groups)
    }

    async fn group_releases(&self, group_id: &str) -> Result<Vec<Candidate>, ProviderError> {
        let path = format!("release-group/{group_id}");
        let params = [("inc", "releases+artist-credits+aliases".to_string())];
        let value = match self.get_json(&path, &params).await {
            Ok(v) => v,
            Err(ProviderError::NotFound) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let group: WireReleaseGroup = parse(value, "release-group")?;
        let meta = ContainerRef {
            id: Some(group.id.clone()),
            title: Some(group.title.clone()),
            category: group.primary_type.clone(),
            secondary_types: group.secondary_types.clone(),
            owner_ids: credit_owner_ids(&group.artist_credit),
            date: group.first_release_date.clone(),
        };
        Ok(group
            .releases
            .into_iter()
            .map(|r| {
                let mut candidate = r.into_candidate();
                // Releases inside a group payload omit the group ref;
                // backfill category and container from the group itself.
                if candidate.category.is_none() {
                    candidate.category = meta.category.clone();
                    candidate.secondary_types = meta.secondary_types.clone();
                }
                if candidate.containers.is_empty() {
                    candidate.containers.push(meta.clone());
                }
                if candidate.owners.is_empty() {
                    candidate.owners = meta
                        .owner_ids
                        .iter()
                        .map(|id| OwnerCredit {
                            id: id.clone(),
                            name: String::new(),
                        })
                        .collect();
                }
                candidate
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rate_limited_twice_then_success_follows_the_schedule() {
        let max_retries = 3;
        assert_eq!(
            status_action(StatusCode::TOO_MANY_REQUESTS, 0, max_retries),
            StatusAction::Backoff(Duration::from_secs(2))
        );
        assert_eq!(
            status_action(StatusCode::TOO_MANY_REQUESTS, 1, max_retries),
            StatusAction::Backoff(Duration::from_secs(3))
        );
        assert_eq!(
            status_action(StatusCode::OK, 2, max_retries),
            StatusAction::Proceed
        );
    }

    #[test]
    fn missing_record_is_never_retried() {
        // A 404 is a miss at every attempt, even with retry budget left.
        for attempt in 0..4 {
            assert_eq!(
                status_action(StatusCode::NOT_FOUND, attempt, 3),
                StatusAction::Miss
            );
        }
    }

    #[test]
    fn transient_statuses_back_off_linearly_until_the_budget_is_spent() {
        assert_eq!(
            status_action(StatusCode::SERVICE_UNAVAILABLE, 0, 3),
            StatusAction::Backoff(Duration::from_millis(1000))
        );
        assert_eq!(
            status_action(StatusCode::SERVICE_UNAVAILABLE, 1, 3),
            StatusAction::Backoff(Duration::from_millis(1500))
        );
        assert!(matches!(
            status_action(StatusCode::SERVICE_UNAVAILABLE, 3, 3),
            StatusAction::GiveUp(_)
        ));
        assert!(matches!(
            status_action(StatusCode::TOO_MANY_REQUESTS, 3, 3),
            StatusAction::GiveUp(_)
        ));
    }

    #[test]
    fn scoped_query_prefers_owner_id() {
        let q = SearchQuery {
            title: "Exit Music (For a Film)".into(),
            owner_name: Some("Radiohead".into()),
            owner_id: Some("a74b1b7f-71a5-4011-9441-d0b5e4122711".into()),
            container_title: None,
            limit: 50,
        };
        let query = build_query(EntityKind::Recording, &q);
        assert!(query.contains("arid:a74b1b7f-71a5-4011-9441-d0b5e4122711"));
        assert!(!query.contains("artist:"), "owner id must replace free-text owner");
    }

    #[test]
    fn free_text_query_quotes_title_and_owner() {
        let q = SearchQuery {
            title: "Creep".into(),
            owner_name: Some("Radiohead".into()),
            owner_id: None,
            container_title: Some("Pablo Honey".into()),
            limit: 50,
        };
        let query = build_query(EntityKind::Recording, &q);
        assert_eq!(
            query,
            "recording:\"Creep\" AND artist:\"Radiohead\" AND release:\"Pablo Honey\""
        );
    }

    #[test]
    fn phrase_escapes_embedded_quotes() {
        assert_eq!(lucene_phrase(r#"The "Best" Of"#), r#""The \"Best\" Of""#);
    }

    #[test]
    fn artist_queries_stay_free_text() {
        let q = SearchQuery {
            title: "Radiohead".into(),
            limit: 5,
            ..SearchQuery::default()
        };
        assert_eq!(build_query(EntityKind::Artist, &q), "Radiohead");
    }

    #[test]
    fn recording_payload_maps_credits_aliases_and_releases() {
        let value = serde_json::json!({
            "id": "rec-1",
            "title": "新世界より",
            "score": 97,
            "aliases": [{"name": "New Genesis"}],
            "artist-credit": [{"artist": {"id": "art-1", "name": "Ado"}}],
            "first-release-date": "2022-06-10",
            "releases": [{
                "id": "rel-1",
                "title": "Uta's Songs",
                "status": "Official",
                "date": "2022-08-10",
                "artist-credit": [{"artist": {"id": "art-1", "name": "Ado"}}],
                "release-group": {
                    "id": "rg-1",
                    "title": "Uta's Songs",
                    "primary-type": "Album",
                    "secondary-types": ["Soundtrack"]
                }
            }]
        });
        let candidate = parse_detail(EntityKind::Recording, value).unwrap();
        assert_eq!(candidate.id, "rec-1");
        assert_eq!(candidate.aliases, vec!["New Genesis"]);
        assert_eq!(candidate.owners.len(), 1);
        assert_eq!(candidate.owners[0].id, "art-1");
        assert_eq!(candidate.relevance, Some(97));
        assert_eq!(candidate.containers.len(), 1);
        let container = &candidate.containers[0];
        assert_eq!(container.category.as_deref(), Some("Album"));
        assert_eq!(container.secondary_types, vec!["Soundtrack"]);
        assert_eq!(container.owner_ids, vec!["art-1"]);
    }

    #[test]
    fn release_payload_maps_tracklist_and_event_fallbacks() {
        let value = serde_json::json!({
            "id": "rel-9",
            "title": "OK Computer",
            "status": "Official",
            "release-events": [
                {"date": "1997-06-16", "area": {"iso-3166-1-codes": ["GB"]}}
            ],
            "media": [{
                "tracks": [
                    {"title": "Airbag", "recording": {"id": "rec-a", "title": "Airbag"}},
                    {"title": "", "recording": {"id": "rec-b", "title": "Paranoid Android"}}
                ]
            }]
        });
        let candidate = parse_detail(EntityKind::Release, value).unwrap();
        assert_eq!(candidate.date.as_deref(), Some("1997-06-16"));
        assert_eq!(candidate.country.as_deref(), Some("GB"));
        assert_eq!(candidate.status.as_deref(), Some("official"));
        assert_eq!(candidate.members.len(), 2);
        assert_eq!(candidate.members[1].title, "Paranoid Android");
        assert_eq!(candidate.members[1].recording_id.as_deref(), Some("rec-b"));
    }

    #[test]
    fn browse_response_tolerates_missing_fields() {
        let value = serde_json::json!({
            "release-groups": [
                {"id": "rg-1", "title": "The Bends", "primary-type": "Album"},
                {"id": "rg-2", "title": "Live Tapes"}
            ],
            "release-group-count": 2
        });
        let page: ReleaseGroupBrowseResponse = serde_json::from_value(value).unwrap();
        assert_eq!(page.release_groups.len(), 2);
        assert_eq!(page.count, Some(2));
        assert!(page.release_groups[1].primary_type.is_none());
    }
}
