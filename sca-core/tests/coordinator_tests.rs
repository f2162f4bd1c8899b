//! Aggregate consent-status derivation against the in-memory store.

mod common;

use common::*;
use sca_core::model::Authorisation;
use sca_core::status::ConsentStatusCoordinator;
use sca_core::store::{InMemoryLifecycleStore, LifecycleStore};
use sca_spi::{ConsentStatus, ParentKind, ScaStatus};
use std::sync::Arc;

struct Fixture {
    store: Arc<InMemoryLifecycleStore>,
    coordinator: ConsentStatusCoordinator,
}

fn fixture() -> Fixture {
    let store = Arc::new(InMemoryLifecycleStore::new());
    let coordinator = ConsentStatusCoordinator::new(store.clone());
    Fixture { store, coordinator }
}

async fn seed_authorisations(f: &Fixture, parent_id: &str, statuses: &[ScaStatus]) {
    for (i, status) in statuses.iter().enumerate() {
        let mut auth = Authorisation::new(format!("a{}", i), parent_id, ParentKind::Consent);
        auth.sca_status = *status;
        f.store.insert_authorisation(auth).await.unwrap();
    }
}

#[tokio::test]
async fn all_signatures_in_makes_the_consent_valid() {
    let f = fixture();
    f.store.insert_parent(consent("c1", &[PSU])).await.unwrap();
    seed_authorisations(&f, "c1", &[ScaStatus::Finalised, ScaStatus::Exempted]).await;

    assert_eq!(
        f.coordinator.recompute_parent_status("c1").await.unwrap(),
        ConsentStatus::Valid
    );
}

#[tokio::test]
async fn recompute_is_idempotent() {
    let f = fixture();
    f.store.insert_parent(consent("c1", &[PSU])).await.unwrap();
    seed_authorisations(&f, "c1", &[ScaStatus::Finalised]).await;

    f.coordinator.recompute_parent_status("c1").await.unwrap();
    let version_after_first = f.store.get_parent("c1").await.found().unwrap().version;

    f.coordinator.recompute_parent_status("c1").await.unwrap();
    let version_after_second = f.store.get_parent("c1").await.found().unwrap().version;
    assert_eq!(version_after_first, version_after_second);
}

#[tokio::test]
async fn failed_with_pending_sibling_keeps_the_consent_open() {
    let f = fixture();
    f.store.insert_parent(consent("c1", &[PSU, PSU2])).await.unwrap();
    seed_authorisations(&f, "c1", &[ScaStatus::Failed, ScaStatus::PsuIdentified]).await;

    assert_eq!(
        f.coordinator.recompute_parent_status("c1").await.unwrap(),
        ConsentStatus::Received
    );
}

#[tokio::test]
async fn multilevel_consent_stays_partial_on_a_single_signature() {
    let f = fixture();
    let mut parent = consent("c1", &[PSU, PSU2]);
    parent.multilevel_sca_required = true;
    f.store.insert_parent(parent).await.unwrap();
    seed_authorisations(&f, "c1", &[ScaStatus::Finalised]).await;

    assert_eq!(
        f.coordinator.recompute_parent_status("c1").await.unwrap(),
        ConsentStatus::PartiallyAuthorised
    );
}

#[tokio::test]
async fn terminal_consents_are_never_recomputed() {
    let f = fixture();
    let mut parent = consent("c1", &[PSU]);
    parent.status = ConsentStatus::RevokedByPsu;
    f.store.insert_parent(parent).await.unwrap();
    seed_authorisations(&f, "c1", &[ScaStatus::Finalised]).await;

    assert_eq!(
        f.coordinator.recompute_parent_status("c1").await.unwrap(),
        ConsentStatus::RevokedByPsu
    );
}

#[tokio::test]
async fn multilevel_latch_is_one_way() {
    let f = fixture();
    f.store.insert_parent(consent("c1", &[PSU])).await.unwrap();

    f.coordinator
        .set_multilevel_sca_required("c1", true)
        .await
        .unwrap();
    assert!(f.store.get_parent("c1").await.found().unwrap().value.multilevel_sca_required);

    // An unset never clears the latch.
    f.coordinator
        .set_multilevel_sca_required("c1", false)
        .await
        .unwrap();
    assert!(f.store.get_parent("c1").await.found().unwrap().value.multilevel_sca_required);
}

#[tokio::test]
async fn multilevel_latch_is_rejected_once_terminal() {
    let f = fixture();
    let mut parent = consent("c1", &[PSU]);
    parent.status = ConsentStatus::Rejected;
    f.store.insert_parent(parent).await.unwrap();

    f.coordinator
        .set_multilevel_sca_required("c1", true)
        .await
        .unwrap();
    let persisted = f.store.get_parent("c1").await.found().unwrap().value;
    assert!(!persisted.multilevel_sca_required);
    assert_eq!(persisted.status, ConsentStatus::Rejected);
}

#[tokio::test]
async fn reported_status_is_ignored_once_terminal() {
    let f = fixture();
    let mut parent = consent("c1", &[PSU]);
    parent.status = ConsentStatus::Expired;
    f.store.insert_parent(parent).await.unwrap();

    f.coordinator
        .apply_reported_status("c1", ConsentStatus::Valid)
        .await
        .unwrap();
    assert_eq!(
        f.store.get_parent("c1").await.found().unwrap().value.status,
        ConsentStatus::Expired
    );
}

#[tokio::test]
async fn superseded_consents_terminate_exactly_once() {
    let f = fixture();
    f.store.insert_parent(consent("c-old", &[PSU])).await.unwrap();
    f.store.insert_parent(consent("c-new", &[PSU])).await.unwrap();
    // A payment of the same TPP+PSU is out of scope for supersession.
    f.store.insert_parent(payment("p1", &[PSU])).await.unwrap();

    let terminated = f
        .coordinator
        .terminate_superseded_consents("c-new")
        .await
        .unwrap();
    assert_eq!(terminated, vec!["c-old".to_string()]);
    assert_eq!(
        f.store.get_parent("c-old").await.found().unwrap().value.status,
        ConsentStatus::TerminatedByTpp
    );
    assert_eq!(
        f.store.get_parent("p1").await.found().unwrap().value.status,
        ConsentStatus::Received
    );

    // Second invocation finds nothing left to terminate.
    let terminated = f
        .coordinator
        .terminate_superseded_consents("c-new")
        .await
        .unwrap();
    assert!(terminated.is_empty());
}

#[tokio::test]
async fn supersession_spares_other_psus_consents() {
    let f = fixture();
    f.store.insert_parent(consent("c-other", &[PSU2])).await.unwrap();
    f.store.insert_parent(consent("c-new", &[PSU])).await.unwrap();

    let terminated = f
        .coordinator
        .terminate_superseded_consents("c-new")
        .await
        .unwrap();
    assert!(terminated.is_empty());
    assert_eq!(
        f.store.get_parent("c-other").await.found().unwrap().value.status,
        ConsentStatus::Received
    );
}
