use std::fmt;

use serde::{Deserialize, Serialize};

/// Catalog entity kind, mirroring the MusicBrainz core entities this
/// resolver knows how to disambiguate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Artist,
    ReleaseGroup,
    Release,
    Recording,
    Label,
}

impl EntityKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Artist => "artist",
            Self::ReleaseGroup => "release-group",
            Self::Release => "release",
            Self::Recording => "recording",
            Self::Label => "label",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "artist" => Some(Self::Artist),
            "release-group" => Some(Self::ReleaseGroup),
            "release" | "album" => Some(Self::Release),
            "recording" | "song" | "track" => Some(Self::Recording),
            "label" => Some(Self::Label),
            _ => None,
        }
    }

    /// Default result page size for fuzzy search. Free-text search on
    /// common song/album titles needs a wide page to contain the right
    /// candidate; artist and label names are far more selective.
    pub const fn default_search_limit(&self) -> u32 {
        match self {
            Self::Artist | Self::Label => 5,
            Self::ReleaseGroup => 25,
            Self::Release | Self::Recording => 50,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A secondary unique identifier from a companion platform, usable for a
/// direct crosswalk lookup instead of fuzzy search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecondaryId {
    /// International Standard Recording Code, identifies a recording.
    Isrc(String),
    /// UPC/EAN barcode, identifies a release.
    Barcode(String),
}

/// Optional disambiguation hints carried by a reference query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hints {
    /// Owning artist name (free text).
    pub owner_name: Option<String>,
    /// Owning artist canonical id. When present, ownership verification
    /// is mandatory: same-titled works by other artists are discarded.
    pub owner_id: Option<String>,
    /// Title of the parent collection the match should belong to
    /// (e.g. the album containing a song).
    pub container_title: Option<String>,
    /// Canonical id of the preferred parent collection.
    pub container_id: Option<String>,
    /// A previously stored canonical id to reuse.
    pub existing_id: Option<String>,
    /// Secondary unique identifier for a direct crosswalk lookup.
    pub secondary_id: Option<SecondaryId>,
    /// Companion-platform URL (open.spotify.com) to crosswalk through.
    pub external_url: Option<String>,
}

/// A free-text reference to resolve against the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceQuery {
    pub title: String,
    pub kind: EntityKind,
    #[serde(default)]
    pub hints: Hints,
}

impl ReferenceQuery {
    pub fn new(title: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            title: title.into(),
            kind,
            hints: Hints::default(),
        }
    }
}

/// A credited owner (artist) on a candidate record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerCredit {
    pub id: String,
    pub name: String,
}

/// A parent grouping a candidate belongs to: for a recording these are
/// the releases it appears on, for a release its release group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerRef {
    pub id: Option<String>,
    pub title: Option<String>,
    /// Primary type of the container's group ("album", "single", ...).
    pub category: Option<String>,
    pub secondary_types: Vec<String>,
    /// Canonical ids of the container's credited owners.
    pub owner_ids: Vec<String>,
    pub date: Option<String>,
}

/// A track slot on a release detail record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRef {
    pub recording_id: Option<String>,
    pub title: String,
}

/// One candidate record from the catalog, normalized across entity kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub kind: EntityKind,
    pub title: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Primary type / category ("album", "single", "person", ...).
    pub category: Option<String>,
    #[serde(default)]
    pub secondary_types: Vec<String>,
    /// Release status ("official", "bootleg", ...), when applicable.
    pub status: Option<String>,
    #[serde(default)]
    pub owners: Vec<OwnerCredit>,
    #[serde(default)]
    pub containers: Vec<ContainerRef>,
    /// Earliest known date, possibly partial (YYYY or YYYY-MM).
    pub date: Option<String>,
    pub country: Option<String>,
    /// Provider search relevance (0-100), present on search results only.
    pub relevance: Option<u32>,
    /// Tracklist, present on release detail records only.
    #[serde(default)]
    pub members: Vec<TrackRef>,
}

impl Candidate {
    /// Minimal candidate carrying nothing but identity; used when a detail
    /// fetch fails after a track slot already pinned the canonical id.
    pub fn bare(id: impl Into<String>, kind: EntityKind, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            aliases: Vec::new(),
            category: None,
            secondary_types: Vec::new(),
            status: None,
            owners: Vec::new(),
            containers: Vec::new(),
            date: None,
            country: None,
            relevance: None,
            members: Vec::new(),
        }
    }

    pub fn owned_by(&self, owner_id: &str) -> bool {
        self.owners.iter().any(|o| o.id == owner_id)
            || self
                .containers
                .iter()
                .any(|c| c.owner_ids.iter().any(|id| id == owner_id))
    }
}

/// How a match was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    /// A previously stored canonical id was reused.
    IdReuse,
    /// A secondary unique identifier resolved directly.
    Crosswalk,
    /// The candidate's primary title matched token-for-token.
    ExactTitle,
    /// One of the candidate's aliases matched token-for-token.
    Alias,
    /// Best-effort weighted similarity band (no exact match existed).
    Similarity,
}

impl MatchReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IdReuse => "id_reuse",
            Self::Crosswalk => "crosswalk",
            Self::ExactTitle => "exact_title",
            Self::Alias => "alias",
            Self::Similarity => "similarity",
        }
    }
}

/// The single successful outcome of a resolution call.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub candidate: Candidate,
    pub score: i64,
    pub reason: MatchReason,
    /// Whether ownership verification against an owner hint succeeded.
    /// False when no owner hint was available to verify against.
    pub verified: bool,
}

/// Why a resolution ultimately failed after all strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// No candidate was found by any strategy.
    NotFound,
    /// Exact-title candidates existed but none passed ownership
    /// verification.
    NoVerifiedCandidate,
    /// A provider stayed unavailable through retry exhaustion.
    ProviderUnavailable,
}

impl FailureReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NoVerifiedCandidate => "no_verified_candidate",
            Self::ProviderUnavailable => "provider_unavailable",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure surfaced to the caller. The engine mutates no
/// external state, so a failure never leaves partial writes behind.
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("resolution failed ({reason}): {detail}")]
pub struct ResolutionFailed {
    pub reason: FailureReason,
    pub detail: String,
}
