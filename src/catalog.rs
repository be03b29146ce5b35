use async_trait::async_trait;

use crate::types::{Candidate, EntityKind, SecondaryId};

/// Typed provider failure, so callers branch on the variant rather than
/// parsing messages. An expected 404 is a `NotFound` miss, never retried;
/// `Retryable` means the retry budget was exhausted on a transient
/// condition (429, 5xx, network); `Fatal` is a non-transient defect
/// (bad configuration, unparseable payload).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("not found")]
    NotFound,
    #[error("provider unavailable: {0}")]
    Retryable(String),
    #[error("{0}")]
    Fatal(String),
}

/// Structured search input built from a reference query. When `owner_id`
/// is set the provider issues an identifier-scoped query; free-text
/// owner/container names are attached as quoted clauses.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub title: String,
    pub owner_name: Option<String>,
    pub owner_id: Option<String>,
    pub container_title: Option<String>,
    pub limit: u32,
}

/// Seam over the primary catalog provider. The production implementation
/// is [`crate::musicbrainz::MusicBrainzClient`]; tests substitute a stub
/// with call counters.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Full record for a canonical id. `Ok(None)` is an expected miss.
    async fn detail(&self, kind: EntityKind, id: &str)
        -> Result<Option<Candidate>, ProviderError>;

    /// Bounded fuzzy search returning at most `query.limit` candidates.
    async fn search(
        &self,
        kind: EntityKind,
        query: &SearchQuery,
    ) -> Result<Vec<Candidate>, ProviderError>;

    /// Direct lookup by secondary unique identifier (ISRC / barcode).
    async fn lookup_secondary(&self, id: &SecondaryId)
        -> Result<Option<Candidate>, ProviderError>;

    /// Find the record carrying a companion-platform URL relationship.
    async fn lookup_external_url(
        &self,
        kind: EntityKind,
        url: &str,
    ) -> Result<Option<Candidate>, ProviderError>;

    /// All top-level collections (release groups) credited to an owner.
    async fn owner_groups(&self, owner_id: &str) -> Result<Vec<Candidate>, ProviderError>;

    /// Release summaries belonging to one release group.
    async fn group_releases(&self, group_id: &str) -> Result<Vec<Candidate>, ProviderError>;
}
