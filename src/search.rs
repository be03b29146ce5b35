use tracing::{debug, warn};

use crate::catalog::{Catalog, ProviderError, SearchQuery};
use crate::config::ResolveOptions;
use crate::score::{self, SelectOutcome};
use crate::types::ReferenceQuery;

/// Fuzzy-search the catalog for a reference and rank the results.
///
/// The first pass scopes the search with every hint available. When the
/// query carried an owner hint and the scoped page contains no token-exact
/// candidate, one widened free-text pass runs and unseen results are
/// merged; the provider's relevance ranking sometimes buries the right
/// record under an owner clause it indexes differently.
pub async fn direct_search(
    catalog: &dyn Catalog,
    query: &ReferenceQuery,
    opts: &ResolveOptions,
) -> Result<SelectOutcome, ProviderError> {
    let limit = opts
        .search_limit
        .unwrap_or_else(|| query.kind.default_search_limit());
    let scoped = SearchQuery {
        title: query.title.clone(),
        owner_name: query.hints.owner_name.clone(),
        owner_id: query.hints.owner_id.clone(),
        container_title: query.hints.container_title.clone(),
        limit,
    };
    let mut candidates = catalog.search(query.kind, &scoped).await?;
    debug!(kind = %query.kind, count = candidates.len(), "scoped search");

    let owner_hinted = query.hints.owner_id.is_some() || query.hints.owner_name.is_some();
    let has_exact = candidates
        .iter()
        .any(|c| score::title_match_reason(&query.title, c).is_some());
    if owner_hinted && !has_exact {
        let free = SearchQuery {
            title: query.title.clone(),
            limit,
            ..SearchQuery::default()
        };
        // Widening is best effort; the scoped page is still usable if the
        // retry fails.
        match catalog.search(query.kind, &free).await {
            Ok(widened) => {
                let seen: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
                let fresh = widened
                    .into_iter()
                    .filter(|c| !seen.contains(&c.id))
                    .collect::<Vec<_>>();
                debug!(count = fresh.len(), "free-text retry merged");
                candidates.extend(fresh);
            }
            Err(err) => warn!(error = %err, "free-text retry failed"),
        }
    }

    score::select(catalog, query, candidates).await
}
