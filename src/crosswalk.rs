use tracing::{debug, warn};

use crate::catalog::{Catalog, ProviderError};
use crate::score;
use crate::spotify::{self, SpotifyClient, SpotifyRef};
use crate::types::{EntityKind, MatchReason, MatchResult, ReferenceQuery};

/// Resolve a reference through secondary unique identifiers before any
/// fuzzy search runs. A hit is authoritative: identifier registries are
/// one-to-one, so the match is marked verified without an ownership pass.
///
/// `Ok(None)` means the strategy does not apply or missed; the caller
/// falls through to search.
pub async fn resolve(
    catalog: &dyn Catalog,
    spotify: Option<&SpotifyClient>,
    query: &ReferenceQuery,
) -> Result<Option<MatchResult>, ProviderError> {
    if let Some(secondary) = &query.hints.secondary_id {
        if let Some(candidate) = catalog.lookup_secondary(secondary).await? {
            debug!(id = %candidate.id, "secondary identifier resolved directly");
            return Ok(Some(accept(query, candidate)));
        }
        return Ok(None);
    }

    let Some(url) = &query.hints.external_url else {
        return Ok(None);
    };
    let Some(reference) = spotify::parse_open_url(url) else {
        warn!(%url, "unrecognized companion URL, ignoring hint");
        return Ok(None);
    };
    if reference.entity_kind() != query.kind {
        warn!(%url, kind = %query.kind, "companion URL kind mismatch, ignoring hint");
        return Ok(None);
    }

    match reference {
        // Artist pages carry no secondary identifier; the catalog itself
        // indexes URL relationships.
        SpotifyRef::Artist(_) => {
            if let Some(candidate) = catalog.lookup_external_url(EntityKind::Artist, url).await? {
                return Ok(Some(accept(query, candidate)));
            }
            Ok(None)
        }
        SpotifyRef::Track(_) | SpotifyRef::Album(_) => {
            let Some(client) = spotify else {
                debug!("no companion credentials, skipping URL crosswalk");
                return Ok(None);
            };
            let Some(secondary) = client.secondary_id(&reference).await? else {
                return Ok(None);
            };
            match catalog.lookup_secondary(&secondary).await? {
                Some(candidate) => Ok(Some(accept(query, candidate))),
                None => Ok(None),
            }
        }
    }
}

fn accept(query: &ReferenceQuery, candidate: crate::types::Candidate) -> MatchResult {
    MatchResult {
        score: score::similarity(&query.title, &candidate),
        candidate,
        reason: MatchReason::Crosswalk,
        verified: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{artist, owned, recording, release, StubCatalog};
    use crate::types::SecondaryId;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn isrc_hit_skips_search_entirely() {
        let catalog = StubCatalog::new();
        let mut query = ReferenceQuery::new("Creep", EntityKind::Recording);
        query.hints.secondary_id = Some(SecondaryId::Isrc("GBAYE9200113".into()));
        catalog.put_secondary(
            "GBAYE9200113",
            owned(recording("r1", "Creep"), "a1", "Radiohead"),
        );

        let hit = resolve(&catalog, None, &query).await.unwrap().unwrap();
        assert_eq!(hit.candidate.id, "r1");
        assert_eq!(hit.reason, MatchReason::Crosswalk);
        assert!(hit.verified);
        assert_eq!(catalog.search_calls.load(Ordering::SeqCst), 0);
        assert_eq!(catalog.secondary_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn barcode_miss_falls_through() {
        let catalog = StubCatalog::new();
        let mut query = ReferenceQuery::new("The Bends", EntityKind::Release);
        query.hints.secondary_id = Some(SecondaryId::Barcode("724383862528".into()));

        assert!(resolve(&catalog, None, &query).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn artist_url_resolves_through_catalog_url_index() {
        let catalog = StubCatalog::new();
        let url = "https://open.spotify.com/artist/4Z8W4fKeB5YxbusRsdQVPb";
        let mut query = ReferenceQuery::new("Radiohead", EntityKind::Artist);
        query.hints.external_url = Some(url.into());
        catalog.put_url(url, artist("a1", "Radiohead"));

        let hit = resolve(&catalog, None, &query).await.unwrap().unwrap();
        assert_eq!(hit.candidate.id, "a1");
        assert_eq!(hit.reason, MatchReason::Crosswalk);
    }

    #[tokio::test]
    async fn url_kind_mismatch_is_ignored() {
        let catalog = StubCatalog::new();
        let mut query = ReferenceQuery::new("The Bends", EntityKind::Release);
        query.hints.external_url =
            Some("https://open.spotify.com/track/11dFghVXANMlKmJXsNCbNl".into());
        catalog.put_url(
            "https://open.spotify.com/track/11dFghVXANMlKmJXsNCbNl",
            release("rel1", "The Bends"),
        );

        assert!(resolve(&catalog, None, &query).await.unwrap().is_none());
        assert_eq!(catalog.url_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn track_url_without_credentials_is_skipped() {
        let catalog = StubCatalog::new();
        let mut query = ReferenceQuery::new("Creep", EntityKind::Recording);
        query.hints.external_url =
            Some("https://open.spotify.com/track/11dFghVXANMlKmJXsNCbNl".into());

        assert!(resolve(&catalog, None, &query).await.unwrap().is_none());
        assert_eq!(catalog.secondary_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_identifier_hints_means_not_applicable() {
        let catalog = StubCatalog::new();
        let query = ReferenceQuery::new("Creep", EntityKind::Recording);
        assert!(resolve(&catalog, None, &query).await.unwrap().is_none());
    }
}
