//! Lifecycle store: the arena holding consent/payment parents and their
//! authorisations, keyed by opaque string ids.
//!
//! Every read boundary returns [`Lookup`]: an absent record is an explicit
//! `NotFound`, never a silently defaulted fresh one. Writes are version
//! guarded: callers quote the version they read, and a mismatch yields
//! [`StoreError::Conflict`] so the whole stage can be retried against fresh
//! state.

use crate::model::{Authorisation, Parent, Versioned};
use async_trait::async_trait;
use dashmap::DashMap;
use sca_spi::ParentKind;
use thiserror::Error;

/// Result of a store lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    /// Converts into an `Option`, discarding the not-found marker.
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }
}

/// Store-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The quoted version is stale; another writer got there first.
    #[error("version conflict on {0}")]
    Conflict(String),

    /// Insert with an id that already exists.
    #[error("duplicate id {0}")]
    Duplicate(String),

    /// Update of a record that does not exist.
    #[error("no such record {0}")]
    Missing(String),
}

/// Atomic read-modify-write surface over the persisted aggregate.
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    async fn insert_parent(&self, parent: Parent) -> Result<(), StoreError>;
    async fn get_parent(&self, id: &str) -> Lookup<Versioned<Parent>>;
    /// Compare-and-swap write of a parent record.
    async fn update_parent(&self, expected_version: u64, parent: Parent)
        -> Result<(), StoreError>;

    async fn insert_authorisation(&self, authorisation: Authorisation) -> Result<(), StoreError>;
    async fn get_authorisation(&self, id: &str) -> Lookup<Versioned<Authorisation>>;
    /// Compare-and-swap write of an authorisation record.
    async fn update_authorisation(
        &self,
        expected_version: u64,
        authorisation: Authorisation,
    ) -> Result<(), StoreError>;

    /// All authorisations attached to a parent, in insertion order.
    async fn authorisations_for_parent(&self, parent_id: &str) -> Vec<Authorisation>;

    /// All parents of the given kind created for a TPP + PSU pair. Used to
    /// terminate superseded consents.
    async fn parents_for_tpp_psu(
        &self,
        tpp_authorisation_number: &str,
        psu_id: &str,
        kind: ParentKind,
    ) -> Vec<Parent>;
}

/// In-memory store over concurrent maps. The shipped implementation; a
/// relational mapping lives behind the same trait outside this core.
#[derive(Default)]
pub struct InMemoryLifecycleStore {
    parents: DashMap<String, Versioned<Parent>>,
    authorisations: DashMap<String, Versioned<Authorisation>>,
    /// Preserves authorisation creation order per parent.
    parent_index: DashMap<String, Vec<String>>,
}

impl InMemoryLifecycleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LifecycleStore for InMemoryLifecycleStore {
    async fn insert_parent(&self, parent: Parent) -> Result<(), StoreError> {
        let id = parent.id.clone();
        match self.parents.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::Duplicate(id)),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Versioned {
                    value: parent,
                    version: 0,
                });
                Ok(())
            }
        }
    }

    async fn get_parent(&self, id: &str) -> Lookup<Versioned<Parent>> {
        match self.parents.get(id) {
            Some(record) => Lookup::Found(record.clone()),
            None => Lookup::NotFound,
        }
    }

    async fn update_parent(
        &self,
        expected_version: u64,
        parent: Parent,
    ) -> Result<(), StoreError> {
        let id = parent.id.clone();
        let mut record = self
            .parents
            .get_mut(&id)
            .ok_or_else(|| StoreError::Missing(id.clone()))?;
        if record.version != expected_version {
            return Err(StoreError::Conflict(id));
        }
        record.value = parent;
        record.version += 1;
        Ok(())
    }

    async fn insert_authorisation(&self, authorisation: Authorisation) -> Result<(), StoreError> {
        let id = authorisation.id.clone();
        let parent_id = authorisation.parent_id.clone();
        match self.authorisations.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => return Err(StoreError::Duplicate(id)),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Versioned {
                    value: authorisation,
                    version: 0,
                });
            }
        }
        self.parent_index.entry(parent_id).or_default().push(id);
        Ok(())
    }

    async fn get_authorisation(&self, id: &str) -> Lookup<Versioned<Authorisation>> {
        match self.authorisations.get(id) {
            Some(record) => Lookup::Found(record.clone()),
            None => Lookup::NotFound,
        }
    }

    async fn update_authorisation(
        &self,
        expected_version: u64,
        authorisation: Authorisation,
    ) -> Result<(), StoreError> {
        let id = authorisation.id.clone();
        let mut record = self
            .authorisations
            .get_mut(&id)
            .ok_or_else(|| StoreError::Missing(id.clone()))?;
        if record.version != expected_version {
            return Err(StoreError::Conflict(id));
        }
        record.value = authorisation;
        record.version += 1;
        Ok(())
    }

    async fn authorisations_for_parent(&self, parent_id: &str) -> Vec<Authorisation> {
        let ids = match self.parent_index.get(parent_id) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };
        ids.iter()
            .filter_map(|id| self.authorisations.get(id).map(|r| r.value.clone()))
            .collect()
    }

    async fn parents_for_tpp_psu(
        &self,
        tpp_authorisation_number: &str,
        psu_id: &str,
        kind: ParentKind,
    ) -> Vec<Parent> {
        self.parents
            .iter()
            .filter(|record| {
                let parent = &record.value;
                parent.kind == kind
                    && parent.tpp.authorisation_number == tpp_authorisation_number
                    && parent.knows_psu(psu_id)
            })
            .map(|record| record.value.clone())
            .collect()
    }
}
