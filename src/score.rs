use tracing::debug;

use crate::catalog::{Catalog, ProviderError};
use crate::normalize::{normalize_title, title_tokens, titles_match_exactly};
use crate::types::{Candidate, EntityKind, Hints, MatchReason, MatchResult, ReferenceQuery};

/// Secondary group types that disqualify a container from counting as
/// the canonical category for its kind.
pub const NON_CANONICAL_SECONDARY: &[&str] =
    &["live", "compilation", "soundtrack", "remix", "dj-mix"];

/// Outcome of ranking one candidate set.
#[derive(Debug)]
pub enum SelectOutcome {
    Accepted(MatchResult),
    /// Title-matching candidates existed but none passed ownership
    /// verification.
    NoVerifiedCandidate,
    NoMatch,
}

/// Token-exact title comparison against the primary title and every
/// alias. Returns which of the two matched.
pub fn title_match_reason(query_title: &str, candidate: &Candidate) -> Option<MatchReason> {
    if titles_match_exactly(query_title, &candidate.title) {
        return Some(MatchReason::ExactTitle);
    }
    if candidate
        .aliases
        .iter()
        .any(|alias| titles_match_exactly(query_title, alias))
    {
        return Some(MatchReason::Alias);
    }
    None
}

/// Minimum similarity for the best-effort band to accept a candidate at
/// all; below this, a non-exact candidate is noise.
pub const SIMILARITY_FLOOR: i64 = 60;

/// Deterministic similarity score of a candidate against the query
/// title. Token-exact matches score a base of 200 so that no non-exact
/// candidate (band maximum 165) can ever outscore them; the non-exact
/// band uses containment (80/60), token-overlap ratio (up to 40), and
/// category/status/relevance bonuses (up to 45).
pub fn similarity(query_title: &str, candidate: &Candidate) -> i64 {
    let mut score: i64 = if title_match_reason(query_title, candidate).is_some() {
        200
    } else {
        let qn = normalize_title(query_title);
        let cn = normalize_title(&candidate.title);
        if !qn.is_empty() && cn.contains(&qn) {
            80
        } else if !cn.is_empty() && qn.contains(&cn) {
            60
        } else {
            0
        }
    };

    let query_tokens: std::collections::HashSet<String> =
        title_tokens(query_title).into_iter().collect();
    let candidate_tokens: std::collections::HashSet<String> =
        title_tokens(&candidate.title).into_iter().collect();
    if !query_tokens.is_empty() && !candidate_tokens.is_empty() {
        let overlap = query_tokens.intersection(&candidate_tokens).count() as f64;
        let union = query_tokens.union(&candidate_tokens).count() as f64;
        score += (overlap / union * 40.0).round() as i64;
    }

    if has_canonical_category(candidate) {
        score += 25;
    }
    if candidate.status.as_deref() == Some("official") {
        score += 10;
    }
    score += i64::from(candidate.relevance.unwrap_or(0).min(100)) / 10;
    score
}

fn is_non_canonical_secondary(secondary_types: &[String]) -> bool {
    secondary_types
        .iter()
        .any(|t| NON_CANONICAL_SECONDARY.contains(&t.to_ascii_lowercase().as_str()))
}

fn has_canonical_category(candidate: &Candidate) -> bool {
    match candidate.kind {
        EntityKind::Release | EntityKind::ReleaseGroup => {
            candidate
                .category
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case("album"))
                && !is_non_canonical_secondary(&candidate.secondary_types)
        }
        EntityKind::Recording => candidate.containers.iter().any(|c| {
            c.category
                .as_deref()
                .is_some_and(|cat| cat.eq_ignore_ascii_case("album"))
                && !is_non_canonical_secondary(&c.secondary_types)
        }),
        EntityKind::Artist | EntityKind::Label => false,
    }
}

fn category_rank(category: Option<&str>, secondary_types: &[String], owner_ok: bool) -> u8 {
    match category.map(str::to_ascii_lowercase).as_deref() {
        Some("album") if owner_ok => {
            if is_non_canonical_secondary(secondary_types) {
                2
            } else {
                3
            }
        }
        Some("single") => 1,
        _ => 0,
    }
}

/// Rank how well a candidate's containers satisfy the container hints:
/// exact container match (4) > canonical category owned by the target
/// owner (3) > owned secondary category (2) > single (1) > nothing (0).
pub fn container_rank(candidate: &Candidate, hints: &Hints) -> u8 {
    let mut best = 0u8;
    for container in &candidate.containers {
        if let Some(want) = &hints.container_id {
            if container.id.as_deref() == Some(want.as_str()) {
                return 4;
            }
        }
        if let (Some(want), Some(title)) = (&hints.container_title, &container.title) {
            if titles_match_exactly(want, title) {
                return 4;
            }
        }
        let owner_ok = match &hints.owner_id {
            Some(owner) => {
                container.owner_ids.is_empty() || container.owner_ids.iter().any(|id| id == owner)
            }
            None => true,
        };
        best = best.max(category_rank(
            container.category.as_deref(),
            &container.secondary_types,
            owner_ok,
        ));
    }
    // Releases and groups carry their own category.
    if matches!(
        candidate.kind,
        EntityKind::Release | EntityKind::ReleaseGroup
    ) {
        best = best.max(category_rank(
            candidate.category.as_deref(),
            &candidate.secondary_types,
            true,
        ));
    }
    best
}

/// Sortable form of a possibly-partial date. Partial dates sort to the
/// end of their period so a full date in the same period wins a tie;
/// unknown dates sort last.
pub fn date_sort_key(date: Option<&str>) -> String {
    const UNKNOWN: &str = "9999-12-31";
    let Some(date) = date else {
        return UNKNOWN.to_string();
    };
    let parts: Vec<&str> = date.split('-').collect();
    match parts.as_slice() {
        [year] if year.len() == 4 => format!("{year}-12-31"),
        [year, month] if year.len() == 4 => {
            format!("{year}-{}-{}", pad2(month), end_of_month(month))
        }
        [year, month, day, ..] if year.len() == 4 => {
            format!("{year}-{}-{}", pad2(month), pad2(day))
        }
        _ => UNKNOWN.to_string(),
    }
}

fn pad2(part: &str) -> String {
    if part.len() == 1 {
        format!("0{part}")
    } else {
        part.to_string()
    }
}

fn end_of_month(month: &str) -> &'static str {
    match pad2(month).as_str() {
        "01" | "03" | "05" | "07" | "08" | "10" | "12" => "31",
        "04" | "06" | "09" | "11" => "30",
        _ => "28",
    }
}

/// Verify a candidate's credited relations against the owner hint. Search
/// payloads often omit credits, so an empty credit list triggers one
/// (memoized) detail fetch before the candidate is judged.
pub async fn candidate_owned_by(
    catalog: &dyn Catalog,
    candidate: &Candidate,
    owner_id: &str,
) -> Result<bool, ProviderError> {
    if candidate.owned_by(owner_id) {
        return Ok(true);
    }
    if candidate.owners.is_empty() {
        if let Some(full) = catalog.detail(candidate.kind, &candidate.id).await? {
            return Ok(full.owned_by(owner_id));
        }
    }
    Ok(false)
}

/// Rank a candidate set and pick the single best verified candidate.
///
/// Exact token matches always form the pool when any exist; the weighted
/// similarity band is a fallback only. An owner hint makes ownership
/// verification mandatory: non-owned candidates are discarded outright,
/// never merely down-ranked.
pub async fn select(
    catalog: &dyn Catalog,
    query: &ReferenceQuery,
    candidates: Vec<Candidate>,
) -> Result<SelectOutcome, ProviderError> {
    let mut exact: Vec<(MatchReason, Candidate)> = Vec::new();
    let mut rest: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if let Some(reason) = title_match_reason(&query.title, &candidate) {
            exact.push((reason, candidate));
        } else if candidate.aliases.is_empty() {
            // Search results may omit aliases entirely; the detail record
            // is authoritative for alias matching.
            match catalog.detail(candidate.kind, &candidate.id).await? {
                Some(full) => {
                    if let Some(reason) = title_match_reason(&query.title, &full) {
                        exact.push((reason, full));
                    } else {
                        rest.push(full);
                    }
                }
                None => rest.push(candidate),
            }
        } else {
            rest.push(candidate);
        }
    }

    let pool: Vec<(MatchReason, Candidate)> = if exact.is_empty() {
        rest.into_iter()
            .filter(|c| similarity(&query.title, c) >= SIMILARITY_FLOOR)
            .map(|c| (MatchReason::Similarity, c))
            .collect()
    } else {
        exact
    };
    if pool.is_empty() {
        return Ok(SelectOutcome::NoMatch);
    }

    let mut verified: Vec<(MatchReason, Candidate, bool)> = Vec::new();
    for (reason, candidate) in pool {
        match &query.hints.owner_id {
            Some(owner) => {
                if candidate_owned_by(catalog, &candidate, owner).await? {
                    verified.push((reason, candidate, true));
                } else {
                    debug!(id = %candidate.id, title = %candidate.title,
                        "discarding candidate not credited to owner");
                }
            }
            None => verified.push((reason, candidate, false)),
        }
    }
    if verified.is_empty() {
        return Ok(SelectOutcome::NoVerifiedCandidate);
    }

    verified.sort_by(|a, b| {
        container_rank(&b.1, &query.hints)
            .cmp(&container_rank(&a.1, &query.hints))
            .then_with(|| {
                date_sort_key(a.1.date.as_deref()).cmp(&date_sort_key(b.1.date.as_deref()))
            })
            .then_with(|| a.1.title.to_lowercase().cmp(&b.1.title.to_lowercase()))
    });
    let (reason, candidate, was_verified) = verified.swap_remove(0);
    let score = similarity(&query.title, &candidate);
    Ok(SelectOutcome::Accepted(MatchResult {
        candidate,
        score,
        reason,
        verified: was_verified,
    }))
}
