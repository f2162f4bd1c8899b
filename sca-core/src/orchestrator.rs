//! The authorisation state machine driver.
//!
//! An inbound update is processed as: snapshot the authorisation and its
//! parent out of the store (versions included), resolve the SCA approach,
//! dispatch to the stage handler for the current `(state, approach)` pair,
//! and apply the handler's outcome with a compare-and-swap write. No lock
//! is held across the bank adapter call; if the snapshot went stale while
//! the handler ran, the write is rejected and the whole stage is retried
//! against fresh state, up to the profile's retry bound. At most one
//! transition becomes visible per call; partial results are never
//! persisted.
//!
//! Stage handlers never throw across this boundary: business and technical
//! faults arrive as `Failed` transitions, and a panicking handler is caught
//! and converted to a technical failure.

use crate::config::BankProfile;
use crate::error::{codes, Error, ErrorDetail, ResourceKind, Result};
use crate::model::{Authorisation, Parent, Versioned};
use crate::resolver::ScaApproachResolver;
use crate::stage::{self, StageContext, StageOutcome, UpdateRequest};
use crate::status::ConsentStatusCoordinator;
use crate::store::{LifecycleStore, Lookup, StoreError};
use futures::FutureExt;
use sca_spi::{
    AdapterError, AuthenticationObject, AuthorisationAdapter, ChallengeData, ConsentStatus,
    ParentKind, PsuIdData, ScaApproach, ScaStatus, SpiContextData,
};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// What a processed update left behind: the persisted authorisation state
/// plus the transient response data (challenge, PSU message) of this call.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub authorisation_id: String,
    pub parent_id: String,
    pub sca_status: ScaStatus,
    pub sca_approach: Option<ScaApproach>,
    pub chosen_sca_method: Option<AuthenticationObject>,
    pub available_sca_methods: Option<Vec<AuthenticationObject>>,
    pub challenge_data: Option<ChallengeData>,
    pub psu_message: Option<String>,
    pub parent_status: Option<ConsentStatus>,
    pub error: Option<ErrorDetail>,
}

impl UpdateOutcome {
    fn from_parts(
        authorisation: &Authorisation,
        parent_status: Option<ConsentStatus>,
        outcome: Option<&StageOutcome>,
    ) -> Self {
        Self {
            authorisation_id: authorisation.id.clone(),
            parent_id: authorisation.parent_id.clone(),
            sca_status: authorisation.sca_status,
            sca_approach: authorisation.sca_approach,
            chosen_sca_method: authorisation.chosen_sca_method.clone(),
            available_sca_methods: authorisation.available_sca_methods.clone(),
            challenge_data: outcome.and_then(|o| o.challenge_data.clone()),
            psu_message: outcome.and_then(|o| o.psu_message.clone()),
            parent_status,
            error: authorisation
                .error
                .clone()
                .or_else(|| outcome.and_then(|o| o.error.clone())),
        }
    }
}

/// Drives authorisations through the SCA state machine for one bank
/// profile.
pub struct AuthorisationOrchestrator {
    store: Arc<dyn LifecycleStore>,
    adapter: Arc<dyn AuthorisationAdapter>,
    resolver: ScaApproachResolver,
    coordinator: ConsentStatusCoordinator,
    profile: BankProfile,
}

impl AuthorisationOrchestrator {
    pub fn new(
        store: Arc<dyn LifecycleStore>,
        adapter: Arc<dyn AuthorisationAdapter>,
        profile: BankProfile,
    ) -> Self {
        let resolver = ScaApproachResolver::new(profile.default_approach, store.clone());
        let coordinator = ConsentStatusCoordinator::new(store.clone());
        Self {
            store,
            adapter,
            resolver,
            coordinator,
            profile,
        }
    }

    /// The approach resolver for this bank profile.
    pub fn resolver(&self) -> &ScaApproachResolver {
        &self.resolver
    }

    /// The status coordinator bound to the same store.
    pub fn coordinator(&self) -> &ConsentStatusCoordinator {
        &self.coordinator
    }

    // -----------------------------------------------------------------
    // Authorisation creation
    // -----------------------------------------------------------------

    /// Creates a fresh authorisation against an existing parent, binding
    /// the bank-default approach. A second authorisation for a different
    /// PSU latches the parent's multilevel flag.
    pub async fn start_authorisation(
        &self,
        parent_id: &str,
        expected_kind: ParentKind,
        psu: Option<PsuIdData>,
    ) -> Result<Authorisation> {
        let resource = resource_for(expected_kind);
        let parent = match self.store.get_parent(parent_id).await {
            Lookup::Found(record) => record.value,
            Lookup::NotFound => return Err(Error::not_found(resource, parent_id)),
        };
        if parent.kind != expected_kind {
            return Err(Error::not_found(resource, parent_id));
        }
        if parent.status.is_terminal() {
            return Err(Error::Business {
                code: codes::STATUS_INVALID.to_string(),
                message: format!("parent {} is already {}", parent_id, parent.status),
            });
        }
        if let Some(psu) = &psu {
            if !parent.knows_psu(&psu.psu_id) {
                return Err(Error::Format {
                    code: codes::FORMAT_ERROR_UNKNOWN_PSU,
                    message: format!("psu {} is not attached to parent {}", psu.psu_id, parent_id),
                });
            }
        }

        let mut authorisation =
            Authorisation::new(Uuid::new_v4().to_string(), parent_id, parent.kind);
        authorisation.psu_id = psu.as_ref().map(|p| p.psu_id.clone());
        authorisation.sca_approach = Some(self.resolver.resolve_default());
        self.store
            .insert_authorisation(authorisation.clone())
            .await
            .map_err(store_fault)?;

        // Scanned after the insert so two racing starts each see the
        // other's record; the latch itself is idempotent.
        let siblings = self.store.authorisations_for_parent(parent_id).await;
        let distinct_psus: HashSet<&str> = siblings
            .iter()
            .filter_map(|a| a.psu_id.as_deref())
            .collect();
        if distinct_psus.len() > 1 {
            self.coordinator
                .set_multilevel_sca_required(parent_id, true)
                .await?;
        }

        debug!(
            "authorisation {} started for parent {} ({})",
            authorisation.id, parent_id, parent.kind
        );
        Ok(authorisation)
    }

    // -----------------------------------------------------------------
    // Inbound updates
    // -----------------------------------------------------------------

    /// Processes one inbound update (PSU identification, credentials,
    /// method choice or confirmation data) against an authorisation.
    pub async fn update_authorisation(&self, request: UpdateRequest) -> Result<UpdateOutcome> {
        let mut conflicts = 0u32;
        loop {
            let snapshot = match self.store.get_authorisation(&request.authorisation_id).await {
                Lookup::Found(record) => record,
                Lookup::NotFound => {
                    return Err(Error::not_found(
                        ResourceKind::Authorisation,
                        &request.authorisation_id,
                    ))
                }
            };
            let authorisation = snapshot.value.clone();

            // An authorisation addressed under a foreign parent does not
            // resolve.
            if !request.parent_id.is_empty() && request.parent_id != authorisation.parent_id {
                return Err(Error::not_found(
                    ResourceKind::Authorisation,
                    &request.authorisation_id,
                ));
            }

            let parent = match self.store.get_parent(&authorisation.parent_id).await {
                Lookup::Found(record) => record.value,
                Lookup::NotFound => {
                    if authorisation.sca_status.is_terminal() {
                        return Ok(UpdateOutcome::from_parts(&authorisation, None, None));
                    }
                    match self.fail_missing_parent(&snapshot).await {
                        Ok(outcome) => return Ok(outcome),
                        Err(Retry) => {
                            conflicts = self.count_conflict(conflicts)?;
                            continue;
                        }
                    }
                }
            };

            // Terminal immutability: the persisted snapshot is the answer.
            if authorisation.sca_status.is_terminal() {
                return Ok(UpdateOutcome::from_parts(
                    &authorisation,
                    Some(parent.status),
                    None,
                ));
            }

            // A terminal parent whose definitive payload no longer matches
            // its creation-time checksum is surfaced, never acted upon.
            if parent.status.is_terminal() && parent.checksum != parent.payload_checksum() {
                return Err(Error::ChecksumConflict(parent.id));
            }

            let approach = authorisation
                .sca_approach
                .unwrap_or_else(|| self.resolver.resolve_default());
            let ctx = StageContext {
                parent: &parent,
                authorisation: &authorisation,
                approach,
                profile: &self.profile,
                spi_ctx: self.spi_context(&parent, request.psu_data.clone()),
                object: parent.to_spi_object(),
            };

            // Panics in a handler must not escape the orchestrator; they
            // become a technical Failed transition.
            let outcome = match AssertUnwindSafe(dispatch(&ctx, &request, self.adapter.as_ref()))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        "stage handler panicked for authorisation {}",
                        authorisation.id
                    );
                    StageOutcome::failed(ErrorDetail::technical("stage handler aborted"))
                }
            };

            let updated = apply_outcome(&authorisation, approach, &outcome);

            if outcome.next_status.is_none() && updated == authorisation {
                // Format guard tripped: nothing to persist.
                return Ok(UpdateOutcome::from_parts(
                    &authorisation,
                    Some(parent.status),
                    Some(&outcome),
                ));
            }

            match self
                .store
                .update_authorisation(snapshot.version, updated.clone())
                .await
            {
                Ok(()) => {
                    let parent_status = self.apply_side_effects(&parent, &updated, &outcome).await?;
                    if let Some(next) = outcome.next_status {
                        debug!(
                            "authorisation {} transitioned {} -> {}",
                            updated.id, authorisation.sca_status, next
                        );
                    }
                    return Ok(UpdateOutcome::from_parts(
                        &updated,
                        Some(parent_status),
                        Some(&outcome),
                    ));
                }
                Err(StoreError::Conflict(_)) => {
                    conflicts = self.count_conflict(conflicts)?;
                    debug!(
                        "authorisation {} update conflicted, retrying stage",
                        request.authorisation_id
                    );
                }
                Err(e) => return Err(store_fault(e)),
            }
        }
    }

    /// Polls the bank for an out-of-band (redirect/decoupled) authorisation
    /// and applies a reported terminal status. Non-terminal reports leave
    /// the persisted state untouched; status is monotonic and never
    /// regresses.
    pub async fn refresh_sca_status(&self, authorisation_id: &str) -> Result<UpdateOutcome> {
        let mut conflicts = 0u32;
        loop {
            let snapshot = match self.store.get_authorisation(authorisation_id).await {
                Lookup::Found(record) => record,
                Lookup::NotFound => {
                    return Err(Error::not_found(ResourceKind::Authorisation, authorisation_id))
                }
            };
            let authorisation = snapshot.value.clone();

            let parent = match self.store.get_parent(&authorisation.parent_id).await {
                Lookup::Found(record) => record.value,
                Lookup::NotFound => {
                    if authorisation.sca_status.is_terminal() {
                        return Ok(UpdateOutcome::from_parts(&authorisation, None, None));
                    }
                    match self.fail_missing_parent(&snapshot).await {
                        Ok(outcome) => return Ok(outcome),
                        Err(Retry) => {
                            conflicts = self.count_conflict(conflicts)?;
                            continue;
                        }
                    }
                }
            };

            if authorisation.sca_status.is_terminal() {
                return Ok(UpdateOutcome::from_parts(
                    &authorisation,
                    Some(parent.status),
                    None,
                ));
            }

            // Same definitive-payload guard as the inbound-update path.
            if parent.status.is_terminal() && parent.checksum != parent.payload_checksum() {
                return Err(Error::ChecksumConflict(parent.id));
            }

            let reported = self
                .adapter
                .get_sca_status(
                    &self.spi_context(&parent, None),
                    authorisation.sca_status,
                    authorisation_id,
                    &parent.to_spi_object(),
                )
                .await
                .map_err(adapter_fault)?;

            let outcome = match reported.status {
                ScaStatus::Finalised | ScaStatus::Exempted => {
                    let mut outcome = StageOutcome::transition(reported.status);
                    outcome.psu_message = reported.psu_message.clone();
                    outcome.terminate_superseded = true;
                    outcome
                }
                ScaStatus::Failed => {
                    let mut outcome = StageOutcome::failed(ErrorDetail::new(
                        crate::error::ErrorKind::BusinessRejection,
                        codes::SCA_INVALID,
                        reported
                            .psu_message
                            .clone()
                            .unwrap_or_else(|| "authorisation failed at the bank".to_string()),
                    ));
                    outcome.psu_message = reported.psu_message.clone();
                    outcome
                }
                _ => {
                    return Ok(UpdateOutcome::from_parts(
                        &authorisation,
                        Some(parent.status),
                        None,
                    ))
                }
            };

            let approach = authorisation
                .sca_approach
                .unwrap_or_else(|| self.resolver.resolve_default());
            let updated = apply_outcome(&authorisation, approach, &outcome);
            match self
                .store
                .update_authorisation(snapshot.version, updated.clone())
                .await
            {
                Ok(()) => {
                    let parent_status = self.apply_side_effects(&parent, &updated, &outcome).await?;
                    return Ok(UpdateOutcome::from_parts(
                        &updated,
                        Some(parent_status),
                        Some(&outcome),
                    ));
                }
                Err(StoreError::Conflict(_)) => {
                    conflicts = self.count_conflict(conflicts)?;
                }
                Err(e) => return Err(store_fault(e)),
            }
        }
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn spi_context(&self, parent: &Parent, psu_data: Option<PsuIdData>) -> SpiContextData {
        SpiContextData {
            psu_data,
            tpp_info: parent.tpp.clone(),
            request_id: Uuid::new_v4().to_string(),
        }
    }

    fn count_conflict(&self, conflicts: u32) -> Result<u32> {
        let conflicts = conflicts + 1;
        if conflicts > self.profile.stage_retry_limit {
            return Err(Error::Technical(
                "optimistic retries exhausted for authorisation update".to_string(),
            ));
        }
        Ok(conflicts)
    }

    /// Marks an authorisation failed because its parent does not resolve.
    async fn fail_missing_parent(
        &self,
        snapshot: &Versioned<Authorisation>,
    ) -> std::result::Result<UpdateOutcome, Retry> {
        let authorisation = &snapshot.value;
        let detail = ErrorDetail::not_found(
            resource_for(authorisation.parent_kind),
            &authorisation.parent_id,
        );
        warn!(
            "authorisation {} references unknown parent {}",
            authorisation.id, authorisation.parent_id
        );
        let mut updated = authorisation.clone();
        updated.sca_status = ScaStatus::Failed;
        updated.error = Some(detail);
        if updated.sca_approach.is_none() {
            updated.sca_approach = Some(self.resolver.resolve_default());
        }
        match self
            .store
            .update_authorisation(snapshot.version, updated.clone())
            .await
        {
            Ok(()) => Ok(UpdateOutcome::from_parts(&updated, None, None)),
            Err(_) => Err(Retry),
        }
    }

    /// Runs the coordinator hooks mandated by a persisted outcome and
    /// returns the parent's resulting aggregate status.
    async fn apply_side_effects(
        &self,
        parent: &Parent,
        updated: &Authorisation,
        outcome: &StageOutcome,
    ) -> Result<ConsentStatus> {
        if outcome.set_multilevel {
            self.coordinator
                .set_multilevel_sca_required(&parent.id, true)
                .await?;
        }
        if let Some(status) = outcome.parent_status {
            self.coordinator
                .apply_reported_status(&parent.id, status)
                .await?;
        }
        let parent_status = if updated.sca_status.is_terminal() {
            self.coordinator.recompute_parent_status(&parent.id).await?
        } else {
            parent.status
        };
        if outcome.terminate_superseded
            && updated.sca_status.is_success_terminal()
            && parent.kind == ParentKind::Consent
        {
            self.coordinator
                .terminate_superseded_consents(&parent.id)
                .await?;
        }
        Ok(parent_status)
    }
}

/// Marker for "the CAS write lost, run the stage again".
struct Retry;

/// Explicit dispatch table keyed by (state, approach). Kept exhaustive so
/// a new state or approach variant fails to compile until routed.
async fn dispatch(
    ctx: &StageContext<'_>,
    request: &UpdateRequest,
    adapter: &dyn AuthorisationAdapter,
) -> StageOutcome {
    use ScaApproach::{Decoupled, Embedded, Redirect};
    use ScaStatus::*;

    match (ctx.authorisation.sca_status, ctx.approach) {
        (Received, Embedded) | (Received, Redirect) | (Received, Decoupled) => {
            stage::received::handle(ctx, request, adapter).await
        }
        // Started belongs to the out-of-band hand-off; an inbound update on
        // it is routed like Received (the redirect page may still identify).
        (Started, Embedded) | (Started, Redirect) | (Started, Decoupled) => {
            stage::received::handle(ctx, request, adapter).await
        }
        (PsuIdentified, Embedded) | (PsuIdentified, Redirect) | (PsuIdentified, Decoupled) => {
            stage::identified::handle(ctx, request, adapter).await
        }
        (PsuAuthenticated, Embedded) | (PsuAuthenticated, Redirect) | (PsuAuthenticated, Decoupled) => {
            stage::authenticated::handle(ctx, request, adapter).await
        }
        (ScaMethodSelected, Embedded) | (ScaMethodSelected, Redirect) | (ScaMethodSelected, Decoupled) => {
            stage::method_selected::handle(ctx, request, adapter).await
        }
        // Terminal statuses never reach this table at runtime: the
        // orchestrator returns the persisted snapshot before dispatching.
        // The arms only keep the match exhaustive.
        (Finalised, _) | (Failed, _) | (Exempted, _) => StageOutcome::no_op(),
    }
}

/// Builds the post-transition authorisation record from a snapshot and a
/// stage outcome. The approach is bound on first persistence; a decoupled
/// rebind goes through the exactly-once guard on the record.
fn apply_outcome(
    authorisation: &Authorisation,
    approach: ScaApproach,
    outcome: &StageOutcome,
) -> Authorisation {
    let mut updated = authorisation.clone();
    if let Some(psu_id) = &outcome.bind_psu {
        updated.psu_id = Some(psu_id.clone());
    }
    if updated.sca_approach.is_none() {
        updated.sca_approach = Some(approach);
    }
    if outcome.rebind_decoupled {
        updated.rebind_decoupled();
    }
    if let Some(method) = &outcome.chosen_method {
        updated.chosen_sca_method = Some(method.clone());
    }
    if let Some(methods) = &outcome.available_methods {
        updated.available_sca_methods = Some(methods.clone());
    }
    if let Some(next) = outcome.next_status {
        updated.sca_status = next;
        updated.error = if next == ScaStatus::Failed {
            outcome.error.clone()
        } else {
            None
        };
    }
    updated
}

fn resource_for(kind: ParentKind) -> ResourceKind {
    match kind {
        ParentKind::Consent => ResourceKind::Consent,
        ParentKind::Payment | ParentKind::Cancellation => ResourceKind::Payment,
    }
}

fn store_fault(err: StoreError) -> Error {
    Error::Technical(err.to_string())
}

fn adapter_fault(err: AdapterError) -> Error {
    match err {
        AdapterError::Business { code, message } => Error::Business { code, message },
        AdapterError::Technical { code, message } => {
            Error::Technical(format!("[{}] {}", code, message))
        }
    }
}
