use tracing::{debug, info};

use crate::catalog::{Catalog, ProviderError};
use crate::config::ResolveOptions;
use crate::normalize::{normalize_title, titles_match_exactly};
use crate::score::{self, date_sort_key};
use crate::types::{Candidate, EntityKind, MatchReason, MatchResult, ReferenceQuery};

/// Group secondary types the walk never descends into. Live takes,
/// compilations and soundtracks recycle canonical recordings under the
/// same titles and would shadow the canonical match.
pub const EXCLUDED_SECONDARY: &[&str] = score::NON_CANONICAL_SECONDARY;

/// Last-resort strategy: instead of searching for the reference itself,
/// walk the owner's discography top-down. Browse the owner's release
/// groups, visit the most promising ones first, pick each group's best
/// release, and look for the reference inside it.
///
/// Requires an owner id; every match is owner-verified by construction.
/// `budget` caps how many groups get their releases fetched.
pub async fn walk(
    catalog: &dyn Catalog,
    query: &ReferenceQuery,
    opts: &ResolveOptions,
) -> Result<Option<MatchResult>, ProviderError> {
    let Some(owner_id) = query.hints.owner_id.clone() else {
        return Ok(None);
    };
    if !matches!(
        query.kind,
        EntityKind::Recording | EntityKind::Release | EntityKind::ReleaseGroup
    ) {
        return Ok(None);
    }

    let mut budget = opts.walk_budget;

    // A pinned container is always worth one fetch before the browse.
    if let Some(container_id) = &query.hints.container_id {
        if query.kind == EntityKind::Recording && budget > 0 {
            budget -= 1;
            let releases = catalog.group_releases(container_id).await?;
            if let Some(best) = best_release(releases) {
                if let Some(hit) = match_in_release(catalog, query, &best).await? {
                    return Ok(Some(hit));
                }
            }
        }
    }

    let groups = catalog.owner_groups(&owner_id).await?;
    debug!(owner = %owner_id, groups = groups.len(), "browsing owner discography");
    let wanted = match query.kind {
        EntityKind::Recording => query.hints.container_title.as_deref(),
        _ => Some(query.title.as_str()),
    };

    for group in prioritize(groups, wanted) {
        if query.hints.container_id.as_deref() == Some(group.id.as_str()) {
            continue; // already visited
        }
        if group
            .secondary_types
            .iter()
            .any(|t| EXCLUDED_SECONDARY.contains(&t.to_ascii_lowercase().as_str()))
        {
            continue;
        }
        if matches!(query.kind, EntityKind::Release | EntityKind::ReleaseGroup) {
            // The group title itself is the thing to match; a fetch is
            // only warranted once it does.
            let Some(reason) = score::title_match_reason(&query.title, &group) else {
                continue;
            };
            if query.kind == EntityKind::ReleaseGroup {
                info!(group = %group.id, "matched release group by walk");
                return Ok(Some(accept(query, reason, group)));
            }
            if budget == 0 {
                break;
            }
            budget -= 1;
            let releases = catalog.group_releases(&group.id).await?;
            if let Some(best) = best_release(releases) {
                info!(release = %best.id, "matched release by walk");
                return Ok(Some(accept(query, reason, best)));
            }
            continue;
        }

        if budget == 0 {
            break;
        }
        budget -= 1;
        let releases = catalog.group_releases(&group.id).await?;
        if let Some(best) = best_release(releases) {
            if let Some(hit) = match_in_release(catalog, query, &best).await? {
                return Ok(Some(hit));
            }
        }
    }

    Ok(None)
}

/// Stable-order prioritization: exact wanted-title matches jump to the
/// front, substring matches next, browse order breaks ties.
fn prioritize(groups: Vec<Candidate>, wanted: Option<&str>) -> Vec<Candidate> {
    let wanted_norm = wanted.map(normalize_title).filter(|w| !w.is_empty());
    let mut scored: Vec<(i64, usize, Candidate)> = groups
        .into_iter()
        .enumerate()
        .map(|(index, group)| {
            let mut boost = 0i64;
            if let Some(w) = &wanted_norm {
                let g = normalize_title(&group.title);
                if g == *w {
                    boost = 1000;
                } else if !g.is_empty() && (g.contains(w.as_str()) || w.contains(g.as_str())) {
                    boost = 100;
                }
            }
            (boost, index, group)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored.into_iter().map(|(_, _, g)| g).collect()
}

fn release_score(release: &Candidate) -> i64 {
    let mut score = 0i64;
    if release.status.as_deref() == Some("official") {
        score += 500;
    }
    // Worldwide and US releases carry the canonical tracklists most often.
    match release.country.as_deref() {
        Some("US") => score += 200,
        Some("XW") => score += 100,
        _ => {}
    }
    if release
        .category
        .as_deref()
        .is_some_and(|c| c.eq_ignore_ascii_case("album"))
    {
        score += 50;
    }
    score
}

/// Pick the release most likely to carry the canonical tracklist:
/// official first, preferred countries next, earliest date breaks ties.
fn best_release(mut releases: Vec<Candidate>) -> Option<Candidate> {
    releases.sort_by(|a, b| {
        release_score(b)
            .cmp(&release_score(a))
            .then_with(|| date_sort_key(a.date.as_deref()).cmp(&date_sort_key(b.date.as_deref())))
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
    });
    releases.into_iter().next()
}

/// Find the queried recording on one release's tracklist. An exact track
/// title pins the recording id directly; otherwise each recording's
/// aliases are checked through (memoized) detail fetches.
async fn match_in_release(
    catalog: &dyn Catalog,
    query: &ReferenceQuery,
    release: &Candidate,
) -> Result<Option<MatchResult>, ProviderError> {
    for track in &release.members {
        if !titles_match_exactly(&query.title, &track.title) {
            continue;
        }
        let Some(recording_id) = &track.recording_id else {
            continue;
        };
        let candidate = match catalog.detail(EntityKind::Recording, recording_id).await? {
            Some(full) => full,
            // The track slot already pinned the id; a detail miss does not
            // unmake the match.
            None => Candidate::bare(recording_id, EntityKind::Recording, &track.title),
        };
        info!(recording = %candidate.id, release = %release.id, "matched track by walk");
        return Ok(Some(accept(query, MatchReason::ExactTitle, candidate)));
    }

    for track in &release.members {
        let Some(recording_id) = &track.recording_id else {
            continue;
        };
        if let Some(full) = catalog.detail(EntityKind::Recording, recording_id).await? {
            if full
                .aliases
                .iter()
                .any(|alias| titles_match_exactly(&query.title, alias))
            {
                info!(recording = %full.id, release = %release.id, "matched track alias by walk");
                return Ok(Some(accept(query, MatchReason::Alias, full)));
            }
        }
    }
    Ok(None)
}

fn accept(query: &ReferenceQuery, reason: MatchReason, candidate: Candidate) -> MatchResult {
    MatchResult {
        score: score::similarity(&query.title, &candidate),
        candidate,
        reason,
        verified: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{group, recording, release, StubCatalog};
    use crate::types::TrackRef;
    use std::sync::atomic::Ordering;

    fn release_with_tracks(id: &str, title: &str, tracks: &[(&str, &str)]) -> Candidate {
        let mut r = release(id, title);
        r.status = Some("official".into());
        r.members = tracks
            .iter()
            .map(|(rid, t)| TrackRef {
                recording_id: Some((*rid).to_string()),
                title: (*t).to_string(),
            })
            .collect();
        r
    }

    fn walk_query(title: &str, kind: EntityKind) -> ReferenceQuery {
        let mut q = ReferenceQuery::new(title, kind);
        q.hints.owner_id = Some("a1".into());
        q
    }

    #[tokio::test]
    async fn finds_track_inside_owner_discography() {
        let catalog = StubCatalog::new();
        catalog.put_owner_groups("a1", vec![group("rg1", "Pablo Honey")]);
        catalog.put_group_releases(
            "rg1",
            vec![release_with_tracks(
                "rel1",
                "Pablo Honey",
                &[("r-you", "You"), ("r-creep", "Creep")],
            )],
        );
        catalog.put_detail(recording("r-creep", "Creep"));

        let hit = walk(
            &catalog,
            &walk_query("Creep", EntityKind::Recording),
            &ResolveOptions::default(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(hit.candidate.id, "r-creep");
        assert_eq!(hit.reason, MatchReason::ExactTitle);
        assert!(hit.verified);
    }

    #[tokio::test]
    async fn alias_pass_matches_retitled_tracks() {
        // Track slot carries the original-script title; the alias lives
        // only on the recording detail record.
        let catalog = StubCatalog::new();
        catalog.put_owner_groups("a1", vec![group("rg1", "Uta's Songs")]);
        catalog.put_group_releases(
            "rg1",
            vec![release_with_tracks("rel1", "Uta's Songs", &[("r-nw", "新世界より")])],
        );
        let mut full = recording("r-nw", "新世界より");
        full.aliases.push("New Genesis".into());
        catalog.put_detail(full);

        let hit = walk(
            &catalog,
            &walk_query("New Genesis", EntityKind::Recording),
            &ResolveOptions::default(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(hit.candidate.id, "r-nw");
        assert_eq!(hit.reason, MatchReason::Alias);
        assert!(hit.verified);
    }

    #[tokio::test]
    async fn exact_track_match_survives_detail_miss() {
        let catalog = StubCatalog::new();
        catalog.put_owner_groups("a1", vec![group("rg1", "Pablo Honey")]);
        catalog.put_group_releases(
            "rg1",
            vec![release_with_tracks("rel1", "Pablo Honey", &[("r-creep", "Creep")])],
        );

        let hit = walk(
            &catalog,
            &walk_query("Creep", EntityKind::Recording),
            &ResolveOptions::default(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(hit.candidate.id, "r-creep");
    }

    #[tokio::test]
    async fn container_title_hint_prioritizes_its_group() {
        let catalog = StubCatalog::new();
        catalog.put_owner_groups(
            "a1",
            vec![
                group("rg-other", "OK Computer"),
                group("rg-wanted", "The Bends"),
            ],
        );
        catalog.put_group_releases(
            "rg-wanted",
            vec![release_with_tracks("rel1", "The Bends", &[("r-just", "Just")])],
        );
        catalog.put_detail(recording("r-just", "Just"));

        let mut query = walk_query("Just", EntityKind::Recording);
        query.hints.container_title = Some("The Bends".into());
        let hit = walk(&catalog, &query, &ResolveOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.candidate.id, "r-just");
        // The wanted group was visited first; the other was never fetched.
        assert_eq!(catalog.group_release_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn budget_caps_group_fetches() {
        let catalog = StubCatalog::new();
        let groups: Vec<Candidate> = (0..10).map(|i| group(&format!("rg{i}"), "Misc")).collect();
        catalog.put_owner_groups("a1", groups);
        for i in 0..10 {
            catalog.put_group_releases(
                &format!("rg{i}"),
                vec![release_with_tracks(
                    &format!("rel{i}"),
                    "Misc",
                    &[("r-x", "Nothing Relevant")],
                )],
            );
        }

        let opts = ResolveOptions {
            walk_budget: 3,
            ..ResolveOptions::default()
        };
        let miss = walk(&catalog, &walk_query("Creep", EntityKind::Recording), &opts)
            .await
            .unwrap();
        assert!(miss.is_none());
        assert_eq!(catalog.group_release_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn excluded_secondary_groups_are_skipped() {
        let catalog = StubCatalog::new();
        let mut live = group("rg-live", "Live Tapes");
        live.secondary_types.push("Live".into());
        catalog.put_owner_groups("a1", vec![live]);
        catalog.put_group_releases(
            "rg-live",
            vec![release_with_tracks("rel1", "Live Tapes", &[("r-creep", "Creep")])],
        );

        let miss = walk(
            &catalog,
            &walk_query("Creep", EntityKind::Recording),
            &ResolveOptions::default(),
        )
        .await
        .unwrap();
        assert!(miss.is_none());
        assert_eq!(catalog.group_release_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pinned_container_is_fetched_first() {
        let catalog = StubCatalog::new();
        catalog.put_owner_groups("a1", vec![group("rg1", "Pablo Honey")]);
        catalog.put_group_releases(
            "rg-pinned",
            vec![release_with_tracks("rel9", "B-Sides", &[("r-creep", "Creep")])],
        );

        let mut query = walk_query("Creep", EntityKind::Recording);
        query.hints.container_id = Some("rg-pinned".into());
        let hit = walk(&catalog, &query, &ResolveOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.candidate.id, "r-creep");
        assert_eq!(catalog.group_release_calls.load(Ordering::SeqCst), 1);
        assert_eq!(catalog.owner_group_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn release_query_matches_group_title() {
        let catalog = StubCatalog::new();
        catalog.put_owner_groups("a1", vec![group("rg1", "The Bends")]);
        let mut us = release("rel-us", "The Bends");
        us.status = Some("official".into());
        us.country = Some("US".into());
        let mut bootleg = release("rel-boot", "The Bends");
        bootleg.status = Some("bootleg".into());
        catalog.put_group_releases("rg1", vec![bootleg, us]);

        let hit = walk(
            &catalog,
            &walk_query("The Bends", EntityKind::Release),
            &ResolveOptions::default(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(hit.candidate.id, "rel-us");
    }

    #[tokio::test]
    async fn release_group_query_needs_no_release_fetch() {
        let catalog = StubCatalog::new();
        catalog.put_owner_groups("a1", vec![group("rg1", "The Bends")]);

        let hit = walk(
            &catalog,
            &walk_query("The Bends", EntityKind::ReleaseGroup),
            &ResolveOptions::default(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(hit.candidate.id, "rg1");
        assert_eq!(catalog.group_release_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_owner_hint_disables_the_walk() {
        let catalog = StubCatalog::new();
        let query = ReferenceQuery::new("Creep", EntityKind::Recording);
        let miss = walk(&catalog, &query, &ResolveOptions::default())
            .await
            .unwrap();
        assert!(miss.is_none());
        assert_eq!(catalog.owner_group_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn best_release_prefers_official_then_country_then_date() {
        let mut a = release("a", "X");
        a.status = Some("official".into());
        a.country = Some("GB".into());
        a.date = Some("1995".into());
        let mut b = release("b", "X");
        b.status = Some("official".into());
        b.country = Some("US".into());
        b.date = Some("1996".into());
        let mut c = release("c", "X");
        c.status = Some("bootleg".into());
        c.country = Some("US".into());

        let best = best_release(vec![a, b, c]).unwrap();
        assert_eq!(best.id, "b");
    }
}
