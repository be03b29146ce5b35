//! In-memory catalog stub and candidate builders shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::catalog::{Catalog, ProviderError, SearchQuery};
use crate::types::{Candidate, EntityKind, OwnerCredit, SecondaryId};

/// Scripted catalog with per-operation call counters, so tests can assert
/// not just what resolved but which lookups were (and were not) made.
#[derive(Default)]
pub struct StubCatalog {
    details: Mutex<HashMap<(EntityKind, String), Candidate>>,
    scoped_search: Mutex<HashMap<EntityKind, Vec<Candidate>>>,
    free_search: Mutex<HashMap<EntityKind, Vec<Candidate>>>,
    secondary: Mutex<HashMap<String, Candidate>>,
    url_hits: Mutex<HashMap<String, Candidate>>,
    owner_groups: Mutex<HashMap<String, Vec<Candidate>>>,
    group_releases: Mutex<HashMap<String, Vec<Candidate>>>,
    fail_next_search: Mutex<Option<ProviderError>>,

    pub detail_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    pub secondary_calls: AtomicUsize,
    pub url_calls: AtomicUsize,
    pub owner_group_calls: AtomicUsize,
    pub group_release_calls: AtomicUsize,
}

impl StubCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_detail(&self, candidate: Candidate) {
        self.details
            .lock()
            .unwrap()
            .insert((candidate.kind, candidate.id.clone()), candidate);
    }

    /// Script results for both scoped and free-text searches of a kind.
    pub fn put_search(&self, kind: EntityKind, results: Vec<Candidate>) {
        self.scoped_search
            .lock()
            .unwrap()
            .insert(kind, results.clone());
        self.free_search.lock().unwrap().insert(kind, results);
    }

    /// Script results returned only when the search is owner-scoped.
    pub fn put_scoped_search(&self, kind: EntityKind, results: Vec<Candidate>) {
        self.scoped_search.lock().unwrap().insert(kind, results);
    }

    /// Script results returned only for free-text (unscoped) searches.
    pub fn put_free_search(&self, kind: EntityKind, results: Vec<Candidate>) {
        self.free_search.lock().unwrap().insert(kind, results);
    }

    pub fn put_secondary(&self, code: &str, candidate: Candidate) {
        self.secondary
            .lock()
            .unwrap()
            .insert(code.to_string(), candidate);
    }

    pub fn put_url(&self, url: &str, candidate: Candidate) {
        self.url_hits
            .lock()
            .unwrap()
            .insert(url.to_string(), candidate);
    }

    pub fn put_owner_groups(&self, owner_id: &str, groups: Vec<Candidate>) {
        self.owner_groups
            .lock()
            .unwrap()
            .insert(owner_id.to_string(), groups);
    }

    pub fn put_group_releases(&self, group_id: &str, releases: Vec<Candidate>) {
        self.group_releases
            .lock()
            .unwrap()
            .insert(group_id.to_string(), releases);
    }

    /// Make the next `search` call fail with the given error.
    pub fn fail_next_search(&self, err: ProviderError) {
        *self.fail_next_search.lock().unwrap() = Some(err);
    }
}

#[async_trait]
impl Catalog for StubCatalog {
    async fn detail(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> Result<Option<Candidate>, ProviderError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .details
            .lock()
            .unwrap()
            .get(&(kind, id.to_string()))
            .cloned())
    }

    async fn search(
        &self,
        kind: EntityKind,
        query: &SearchQuery,
    ) -> Result<Vec<Candidate>, ProviderError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_next_search.lock().unwrap().take() {
            return Err(err);
        }
        let table = if query.owner_id.is_some() {
            &self.scoped_search
        } else {
            &self.free_search
        };
        let mut results = table
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_default();
        results.truncate(query.limit as usize);
        Ok(results)
    }

    async fn lookup_secondary(
        &self,
        id: &SecondaryId,
    ) -> Result<Option<Candidate>, ProviderError> {
        self.secondary_calls.fetch_add(1, Ordering::SeqCst);
        let code = match id {
            SecondaryId::Isrc(code) | SecondaryId::Barcode(code) => code,
        };
        Ok(self.secondary.lock().unwrap().get(code).cloned())
    }

    async fn lookup_external_url(
        &self,
        _kind: EntityKind,
        url: &str,
    ) -> Result<Option<Candidate>, ProviderError> {
        self.url_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.url_hits.lock().unwrap().get(url).cloned())
    }

    async fn owner_groups(&self, owner_id: &str) -> Result<Vec<Candidate>, ProviderError> {
        self.owner_group_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .owner_groups
            .lock()
            .unwrap()
            .get(owner_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn group_releases(&self, group_id: &str) -> Result<Vec<Candidate>, ProviderError> {
        self.group_release_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .group_releases
            .lock()
            .unwrap()
            .get(group_id)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn recording(id: &str, title: &str) -> Candidate {
    Candidate::bare(id, EntityKind::Recording, title)
}

pub fn release(id: &str, title: &str) -> Candidate {
    Candidate::bare(id, EntityKind::Release, title)
}

pub fn group(id: &str, title: &str) -> Candidate {
    let mut c = Candidate::bare(id, EntityKind::ReleaseGroup, title);
    c.category = Some("album".into());
    c
}

pub fn artist(id: &str, name: &str) -> Candidate {
    Candidate::bare(id, EntityKind::Artist, name)
}

pub fn owned(mut candidate: Candidate, owner_id: &str, owner_name: &str) -> Candidate {
    candidate.owners.push(OwnerCredit {
        id: owner_id.into(),
        name: owner_name.into(),
    });
    candidate
}
