//! Consent/payment aggregate status coordination.
//!
//! The parent's `status` and `multilevel_sca_required` are mutated only
//! here. Every write runs an optimistic retry loop: read the versioned
//! record, derive the new value, compare-and-swap, and reconcile on
//! conflict. All operations are idempotent: calling them again once the
//! parent is settled changes nothing observable.

use crate::error::{Error, ResourceKind, Result};
use crate::model::Parent;
use crate::store::{LifecycleStore, Lookup, StoreError};
use sca_spi::{ConsentStatus, ParentKind, ScaStatus};
use std::sync::Arc;
use tracing::{debug, warn};

/// Bound on CAS reconciliation attempts before giving up.
const RECONCILE_LIMIT: u32 = 8;

/// Derives and persists the aggregate parent status from the set of
/// per-PSU authorisation outcomes.
pub struct ConsentStatusCoordinator {
    store: Arc<dyn LifecycleStore>,
}

impl ConsentStatusCoordinator {
    pub fn new(store: Arc<dyn LifecycleStore>) -> Self {
        Self { store }
    }

    /// Recomputes the parent status from its authorisations and persists it
    /// when it changed.
    ///
    /// - VALID iff all currently-required authorisations are
    ///   success-terminal. A parent latched multilevel requires at least two
    ///   signatures, so a single finalised authorisation keeps it
    ///   PARTIALLY_AUTHORISED until the second one lands.
    /// - PARTIALLY_AUTHORISED iff some but not all are success-terminal.
    /// - REJECTED iff at least one FAILED while none succeeded and no
    ///   non-terminal authorisation remains.
    ///
    /// Idempotent; a no-op once the parent is terminal.
    pub async fn recompute_parent_status(&self, parent_id: &str) -> Result<ConsentStatus> {
        for _ in 0..RECONCILE_LIMIT {
            let record = match self.store.get_parent(parent_id).await {
                Lookup::Found(record) => record,
                Lookup::NotFound => {
                    return Err(Error::not_found(ResourceKind::Consent, parent_id))
                }
            };
            let parent = record.value;
            if parent.status.is_terminal() {
                return Ok(parent.status);
            }

            let statuses: Vec<ScaStatus> = self
                .store
                .authorisations_for_parent(parent_id)
                .await
                .iter()
                .map(|a| a.sca_status)
                .collect();
            let computed = derive_status(&parent, &statuses);

            if computed == parent.status {
                return Ok(computed);
            }

            let mut updated = parent;
            updated.status = computed;
            match self.store.update_parent(record.version, updated).await {
                Ok(()) => {
                    debug!("parent {} status recomputed to {}", parent_id, computed);
                    return Ok(computed);
                }
                Err(StoreError::Conflict(_)) => continue,
                Err(e) => return Err(Error::Technical(e.to_string())),
            }
        }
        Err(Error::Technical(format!(
            "status reconciliation for parent {} did not converge",
            parent_id
        )))
    }

    /// Applies a bank-reported aggregate status (from SCA verification).
    /// No-op when the parent is already terminal or already carries it.
    pub async fn apply_reported_status(
        &self,
        parent_id: &str,
        status: ConsentStatus,
    ) -> Result<()> {
        for _ in 0..RECONCILE_LIMIT {
            let record = match self.store.get_parent(parent_id).await {
                Lookup::Found(record) => record,
                Lookup::NotFound => {
                    return Err(Error::not_found(ResourceKind::Consent, parent_id))
                }
            };
            if record.value.status.is_terminal() || record.value.status == status {
                return Ok(());
            }
            let mut updated = record.value;
            updated.status = status;
            match self.store.update_parent(record.version, updated).await {
                Ok(()) => return Ok(()),
                Err(StoreError::Conflict(_)) => continue,
                Err(e) => return Err(Error::Technical(e.to_string())),
            }
        }
        Err(Error::Technical(format!(
            "status write for parent {} did not converge",
            parent_id
        )))
    }

    /// One-way multilevel latch. `required = false` never clears an already
    /// latched flag, and a terminal parent is left untouched.
    pub async fn set_multilevel_sca_required(&self, parent_id: &str, required: bool) -> Result<()> {
        if !required {
            return Ok(());
        }
        for _ in 0..RECONCILE_LIMIT {
            let record = match self.store.get_parent(parent_id).await {
                Lookup::Found(record) => record,
                Lookup::NotFound => {
                    return Err(Error::not_found(ResourceKind::Consent, parent_id))
                }
            };
            if record.value.multilevel_sca_required {
                return Ok(());
            }
            if record.value.status.is_terminal() {
                warn!(
                    "ignoring multilevel latch for terminal parent {}",
                    parent_id
                );
                return Ok(());
            }
            let mut updated = record.value;
            updated.multilevel_sca_required = true;
            match self.store.update_parent(record.version, updated).await {
                Ok(()) => {
                    debug!("parent {} latched multilevel SCA", parent_id);
                    return Ok(());
                }
                Err(StoreError::Conflict(_)) => continue,
                Err(e) => return Err(Error::Technical(e.to_string())),
            }
        }
        Err(Error::Technical(format!(
            "multilevel latch for parent {} did not converge",
            parent_id
        )))
    }

    /// Terminates every other non-terminal consent of the same kind held by
    /// the same TPP for the same PSU(s). Invoked on the first successful
    /// finalisation of a new consent; idempotent by construction, since it
    /// only ever targets consents that are not yet terminal.
    ///
    /// Returns the ids it transitioned.
    pub async fn terminate_superseded_consents(&self, new_consent_id: &str) -> Result<Vec<String>> {
        let record = match self.store.get_parent(new_consent_id).await {
            Lookup::Found(record) => record,
            Lookup::NotFound => {
                return Err(Error::not_found(ResourceKind::Consent, new_consent_id))
            }
        };
        let new_consent = record.value;
        if new_consent.kind != ParentKind::Consent {
            return Ok(Vec::new());
        }

        let mut terminated = Vec::new();
        for psu in &new_consent.psu_data {
            let candidates = self
                .store
                .parents_for_tpp_psu(
                    &new_consent.tpp.authorisation_number,
                    &psu.psu_id,
                    ParentKind::Consent,
                )
                .await;
            for candidate in candidates {
                if candidate.id == new_consent.id || candidate.status.is_terminal() {
                    continue;
                }
                if self.terminate(&candidate.id).await? {
                    terminated.push(candidate.id);
                }
            }
        }
        if !terminated.is_empty() {
            debug!(
                "consent {} superseded {} prior consent(s)",
                new_consent_id,
                terminated.len()
            );
        }
        Ok(terminated)
    }

    async fn terminate(&self, parent_id: &str) -> Result<bool> {
        for _ in 0..RECONCILE_LIMIT {
            let record = match self.store.get_parent(parent_id).await {
                Lookup::Found(record) => record,
                // Raced with a delete; nothing to terminate.
                Lookup::NotFound => return Ok(false),
            };
            if record.value.status.is_terminal() {
                return Ok(false);
            }
            let mut updated = record.value;
            updated.status = ConsentStatus::TerminatedByTpp;
            match self.store.update_parent(record.version, updated).await {
                Ok(()) => return Ok(true),
                Err(StoreError::Conflict(_)) => continue,
                Err(e) => return Err(Error::Technical(e.to_string())),
            }
        }
        Err(Error::Technical(format!(
            "termination of parent {} did not converge",
            parent_id
        )))
    }
}

/// Pure aggregation rule over the authorisation statuses of one parent.
fn derive_status(parent: &Parent, statuses: &[ScaStatus]) -> ConsentStatus {
    if statuses.is_empty() {
        return parent.status;
    }
    let success = statuses.iter().filter(|s| s.is_success_terminal()).count();
    let failed = statuses.iter().filter(|s| **s == ScaStatus::Failed).count();
    let pending = statuses.len() - success - failed;

    // A multilevel parent needs at least two independent signatures, even
    // if only one authorisation exists so far.
    let required = if parent.multilevel_sca_required {
        statuses.len().max(2)
    } else {
        statuses.len()
    };

    if success == required {
        ConsentStatus::Valid
    } else if success > 0 {
        ConsentStatus::PartiallyAuthorised
    } else if failed > 0 && pending == 0 {
        ConsentStatus::Rejected
    } else {
        parent.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AccessScope;
    use sca_spi::{PsuIdData, TppInfo};

    fn parent(multilevel: bool) -> Parent {
        let mut p = Parent::new(
            "c1",
            ParentKind::Consent,
            TppInfo {
                authorisation_number: "PSDDE-BAFIN-000001".to_string(),
                name: None,
            },
            vec![PsuIdData::new("anton.brueckner")],
            AccessScope::AllAvailableAccounts,
            "all-accounts",
        );
        p.multilevel_sca_required = multilevel;
        p
    }

    #[test]
    fn all_success_is_valid() {
        assert_eq!(
            derive_status(&parent(false), &[ScaStatus::Finalised, ScaStatus::Exempted]),
            ConsentStatus::Valid
        );
    }

    #[test]
    fn some_success_is_partially_authorised() {
        assert_eq!(
            derive_status(&parent(false), &[ScaStatus::Finalised, ScaStatus::Received]),
            ConsentStatus::PartiallyAuthorised
        );
        // Even a failed sibling keeps the partial state while one succeeded.
        assert_eq!(
            derive_status(&parent(false), &[ScaStatus::Finalised, ScaStatus::Failed]),
            ConsentStatus::PartiallyAuthorised
        );
    }

    #[test]
    fn failure_with_no_success_and_no_pending_is_rejected() {
        assert_eq!(
            derive_status(&parent(false), &[ScaStatus::Failed]),
            ConsentStatus::Rejected
        );
        assert_eq!(
            derive_status(&parent(false), &[ScaStatus::Failed, ScaStatus::Failed]),
            ConsentStatus::Rejected
        );
    }

    #[test]
    fn failure_with_pending_sibling_stays_put() {
        assert_eq!(
            derive_status(&parent(false), &[ScaStatus::Failed, ScaStatus::Received]),
            ConsentStatus::Received
        );
    }

    #[test]
    fn multilevel_single_signature_is_only_partial() {
        assert_eq!(
            derive_status(&parent(true), &[ScaStatus::Finalised]),
            ConsentStatus::PartiallyAuthorised
        );
        assert_eq!(
            derive_status(&parent(true), &[ScaStatus::Finalised, ScaStatus::Finalised]),
            ConsentStatus::Valid
        );
    }

    #[test]
    fn no_authorisations_changes_nothing() {
        assert_eq!(derive_status(&parent(false), &[]), ConsentStatus::Received);
    }
}
