use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::catalog::{Catalog, ProviderError};
use crate::config::{ResolveOptions, MAX_WORKERS};
use crate::crosswalk;
use crate::score::{self, SelectOutcome};
use crate::search;
use crate::spotify::SpotifyClient;
use crate::types::{
    FailureReason, MatchReason, MatchResult, ReferenceQuery, ResolutionFailed,
};
use crate::walker;

/// Resolution strategies in cost order. Each step either settles the
/// query or hands off to the next; a provider outage in one step is
/// soft-failed so cheaper evidence elsewhere can still settle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    ReuseExistingId,
    Crosswalk,
    DirectSearch,
    HierarchicalWalk,
    Failed,
}

/// Orchestrates the strategy chain over a shared catalog client, so every
/// resolution in a run shares one rate gate and one memoization cache.
#[derive(Clone)]
pub struct Resolver {
    catalog: Arc<dyn Catalog>,
    spotify: Option<Arc<SpotifyClient>>,
    opts: ResolveOptions,
}

impl Resolver {
    pub fn new(catalog: Arc<dyn Catalog>, opts: ResolveOptions) -> Self {
        Self {
            catalog,
            spotify: None,
            opts,
        }
    }

    pub fn with_spotify(mut self, client: SpotifyClient) -> Self {
        self.spotify = Some(Arc::new(client));
        self
    }

    /// Run one reference through the strategy chain to a terminal state.
    pub async fn resolve(&self, query: &ReferenceQuery) -> Result<MatchResult, ResolutionFailed> {
        let mut transient: Option<String> = None;
        let mut had_unverified = false;
        let mut step = Step::ReuseExistingId;
        loop {
            step = match step {
                Step::ReuseExistingId => {
                    match self.reuse_existing(query).await {
                        Ok(Some(m)) => return Ok(settled(query, m)),
                        Ok(None) => {}
                        Err(e) => soft_fail(&mut transient, "id reuse", &e),
                    }
                    Step::Crosswalk
                }
                Step::Crosswalk => {
                    match crosswalk::resolve(self.catalog.as_ref(), self.spotify.as_deref(), query)
                        .await
                    {
                        Ok(Some(m)) => return Ok(settled(query, m)),
                        Ok(None) => {}
                        Err(e) => soft_fail(&mut transient, "crosswalk", &e),
                    }
                    Step::DirectSearch
                }
                Step::DirectSearch => {
                    match search::direct_search(self.catalog.as_ref(), query, &self.opts).await {
                        Ok(SelectOutcome::Accepted(m)) => return Ok(settled(query, m)),
                        Ok(SelectOutcome::NoVerifiedCandidate) => had_unverified = true,
                        Ok(SelectOutcome::NoMatch) => {}
                        Err(e) => soft_fail(&mut transient, "search", &e),
                    }
                    Step::HierarchicalWalk
                }
                Step::HierarchicalWalk => {
                    match walker::walk(self.catalog.as_ref(), query, &self.opts).await {
                        Ok(Some(m)) => return Ok(settled(query, m)),
                        Ok(None) => {}
                        Err(e) => soft_fail(&mut transient, "walk", &e),
                    }
                    Step::Failed
                }
                Step::Failed => {
                    let (reason, detail) = if let Some(detail) = transient {
                        (FailureReason::ProviderUnavailable, detail)
                    } else if had_unverified {
                        (
                            FailureReason::NoVerifiedCandidate,
                            format!(
                                "candidates for '{}' matched by title but none passed ownership verification",
                                query.title
                            ),
                        )
                    } else {
                        (
                            FailureReason::NotFound,
                            format!("no candidate found for '{}'", query.title),
                        )
                    };
                    info!(title = %query.title, %reason, "resolution failed");
                    return Err(ResolutionFailed { reason, detail });
                }
            };
        }
    }

    /// Resolve a batch concurrently, bounded by `opts.workers` (clamped to
    /// [`MAX_WORKERS`]). Output order matches input order; one failure
    /// never aborts the rest of the batch.
    pub async fn resolve_many(
        &self,
        queries: Vec<ReferenceQuery>,
    ) -> Vec<Result<MatchResult, ResolutionFailed>> {
        let total = queries.len();
        let workers = self.opts.workers.clamp(1, MAX_WORKERS);
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut set = JoinSet::new();
        for (index, query) in queries.into_iter().enumerate() {
            let resolver = self.clone();
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, resolver.resolve(&query).await)
            });
        }

        let mut results: Vec<Option<Result<MatchResult, ResolutionFailed>>> =
            (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => error!(error = %e, "resolution task aborted"),
            }
        }
        results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(ResolutionFailed {
                        reason: FailureReason::ProviderUnavailable,
                        detail: "resolution task aborted".to_string(),
                    })
                })
            })
            .collect()
    }

    /// A stored canonical id short-circuits everything when it still
    /// resolves. With `reverify_existing` an owner hint is re-checked
    /// first, and a failing id is discarded rather than trusted.
    async fn reuse_existing(
        &self,
        query: &ReferenceQuery,
    ) -> Result<Option<MatchResult>, ProviderError> {
        let Some(existing) = &query.hints.existing_id else {
            return Ok(None);
        };
        let Some(candidate) = self.catalog.detail(query.kind, existing).await? else {
            warn!(id = %existing, "stored id no longer resolves, falling back");
            return Ok(None);
        };
        let mut verified = false;
        if self.opts.reverify_existing {
            if let Some(owner) = &query.hints.owner_id {
                if !score::candidate_owned_by(self.catalog.as_ref(), &candidate, owner).await? {
                    warn!(id = %existing, "stored id failed ownership re-verification, discarding");
                    return Ok(None);
                }
                verified = true;
            }
        }
        Ok(Some(MatchResult {
            score: score::similarity(&query.title, &candidate),
            candidate,
            reason: MatchReason::IdReuse,
            verified,
        }))
    }
}

fn settled(query: &ReferenceQuery, result: MatchResult) -> MatchResult {
    info!(
        title = %query.title,
        id = %result.candidate.id,
        reason = result.reason.as_str(),
        verified = result.verified,
        "resolved"
    );
    result
}

/// Record a strategy-level provider failure and keep going. The detail is
/// kept so a fully failed resolution can report the outage instead of a
/// misleading plain miss.
fn soft_fail(transient: &mut Option<String>, strategy: &str, err: &ProviderError) {
    warn!(strategy, error = %err, "strategy failed, trying next");
    if transient.is_none() {
        *transient = Some(format!("{strategy}: {err}"));
    }
}
