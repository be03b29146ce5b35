use std::time::Duration;

/// Explicit configuration for the primary catalog client. Nothing here is
/// global; a client owns its config for the lifetime of a sync run.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Minimum spacing between requests. MusicBrainz allows one request
    /// per second for anonymous clients.
    pub min_interval: Duration,
    /// Retries per request on transient failures before giving up.
    pub max_retries: u32,
    pub request_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://musicbrainz.org/ws/2".to_string(),
            user_agent: format!("mbresolve/{}", env!("CARGO_PKG_VERSION")),
            min_interval: Duration::from_millis(1000),
            max_retries: 3,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Per-resolution knobs passed to the orchestrator.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Re-run ownership/container verification even when an existing
    /// canonical id resolves.
    pub reverify_existing: bool,
    /// Maximum owner collections the hierarchical walk may inspect.
    pub walk_budget: usize,
    /// Override the per-kind default search page size.
    pub search_limit: Option<u32>,
    /// Concurrent resolutions in `resolve_many`.
    pub workers: usize,
}

/// Soft upper bound on concurrent workers, to respect provider limits
/// even when one gate serializes the actual requests.
pub const MAX_WORKERS: usize = 8;

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            reverify_existing: false,
            walk_budget: 20,
            search_limit: None,
            workers: 3,
        }
    }
}
