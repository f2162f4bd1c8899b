//! Persisted aggregates of the authorisation engine.
//!
//! The store is an arena keyed by opaque string ids: an [`Authorisation`]
//! refers to its parent by `parent_id`, never by reference, so there are no
//! ownership cycles between consent, authorisation and PSU data.

use crate::error::ErrorDetail;
use chrono::{DateTime, Utc};
use sca_spi::{
    AuthenticationObject, ConsentStatus, ParentKind, PsuIdData, ScaApproach, ScaStatus,
    SpiBusinessObject, TppInfo,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Parent (consent / payment)
// ---------------------------------------------------------------------------

/// Which accounts a consent (or payment debtor selection) addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessScope {
    /// Exactly one account, by identifier.
    SingleAccount(String),
    /// An explicit account list.
    Accounts(Vec<String>),
    /// Global access to all accounts available to the PSU.
    AllAvailableAccounts,
}

/// The parent business object an authorisation authenticates access to.
/// Structurally identical for consents and payments in this core.
///
/// The business payload (access scope, product, creation timestamp, PSU
/// set, TPP) is immutable after creation; only `status` and
/// `multilevel_sca_required` may change, and only through the status
/// coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parent {
    pub id: String,
    pub kind: ParentKind,
    pub tpp: TppInfo,
    /// PSUs attached at creation. An authorisation's psu-id must match one
    /// of these once identification occurs.
    pub psu_data: Vec<PsuIdData>,
    pub access: AccessScope,
    pub product: String,
    pub created_at: DateTime<Utc>,
    pub status: ConsentStatus,
    pub multilevel_sca_required: bool,
    /// Digest of the immutable payload, fixed at creation. Checked against
    /// a recomputation once the parent is terminal to detect updates racing
    /// a definitive-field change.
    pub checksum: String,
}

impl Parent {
    pub fn new(
        id: impl Into<String>,
        kind: ParentKind,
        tpp: TppInfo,
        psu_data: Vec<PsuIdData>,
        access: AccessScope,
        product: impl Into<String>,
    ) -> Self {
        let mut parent = Self {
            id: id.into(),
            kind,
            tpp,
            psu_data,
            access,
            product: product.into(),
            created_at: Utc::now(),
            status: ConsentStatus::Received,
            multilevel_sca_required: false,
            checksum: String::new(),
        };
        parent.checksum = parent.payload_checksum();
        parent
    }

    /// Digest over the definitive (immutable) payload fields.
    pub fn payload_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        hasher.update(self.kind.to_string().as_bytes());
        hasher.update(self.tpp.authorisation_number.as_bytes());
        hasher.update(self.product.as_bytes());
        hasher.update(self.created_at.to_rfc3339().as_bytes());
        match &self.access {
            AccessScope::SingleAccount(account) => {
                hasher.update(b"single");
                hasher.update(account.as_bytes());
            }
            AccessScope::Accounts(accounts) => {
                hasher.update(b"list");
                for account in accounts {
                    hasher.update(account.as_bytes());
                }
            }
            AccessScope::AllAvailableAccounts => hasher.update(b"allAvailableAccounts"),
        }
        for psu in &self.psu_data {
            hasher.update(psu.psu_id.as_bytes());
        }
        hex_digest(hasher)
    }

    /// Whether the given psu-id belongs to this parent's PSU set.
    pub fn knows_psu(&self, psu_id: &str) -> bool {
        self.psu_data.iter().any(|psu| psu.psu_id == psu_id)
    }

    /// Read-only projection handed across the SPI boundary.
    pub fn to_spi_object(&self) -> SpiBusinessObject {
        SpiBusinessObject {
            id: self.id.clone(),
            kind: self.kind,
            payload: json!({
                "product": self.product,
                "access": self.access,
                "createdAt": self.created_at.to_rfc3339(),
            }),
            multilevel_sca_required: self.multilevel_sca_required,
        }
    }
}

fn hex_digest(hasher: Sha256) -> String {
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

// ---------------------------------------------------------------------------
// Authorisation
// ---------------------------------------------------------------------------

/// One PSU's authentication session against a parent object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorisation {
    pub id: String,
    pub parent_id: String,
    pub parent_kind: ParentKind,
    /// Bound on identification; must match one of the parent's PsuData
    /// entries.
    pub psu_id: Option<String>,
    pub sca_status: ScaStatus,
    /// None until the first persisted transition binds the bank default.
    pub sca_approach: Option<ScaApproach>,
    pub chosen_sca_method: Option<AuthenticationObject>,
    /// Ordered as enumerated by the bank; None until enumeration happened.
    pub available_sca_methods: Option<Vec<AuthenticationObject>>,
    /// Expected redirect confirmation code when the intermediary validates
    /// it itself.
    pub confirmation_code: Option<String>,
    /// Failure descriptor, set together with the `Failed` status.
    pub error: Option<ErrorDetail>,
}

impl Authorisation {
    pub fn new(
        id: impl Into<String>,
        parent_id: impl Into<String>,
        parent_kind: ParentKind,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            parent_kind,
            psu_id: None,
            sca_status: ScaStatus::Received,
            sca_approach: None,
            chosen_sca_method: None,
            available_sca_methods: None,
            confirmation_code: None,
            error: None,
        }
    }

    /// Rebind the approach to DECOUPLED. Legal exactly once, from any
    /// non-decoupled binding; returns false (and changes nothing) if the
    /// authorisation is already decoupled.
    pub fn rebind_decoupled(&mut self) -> bool {
        if self.sca_approach == Some(ScaApproach::Decoupled) {
            return false;
        }
        self.sca_approach = Some(ScaApproach::Decoupled);
        true
    }

    /// Whether `method_id` is a member of the enumerated method list.
    pub fn offers_method(&self, method_id: &str) -> Option<&AuthenticationObject> {
        self.available_sca_methods
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|m| m.authentication_method_id == method_id)
    }
}

// ---------------------------------------------------------------------------
// Versioned wrapper for optimistic concurrency
// ---------------------------------------------------------------------------

/// A record plus the version the store handed it out at. Writes must quote
/// the version back; a mismatch means another update won the race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent() -> Parent {
        Parent::new(
            "consent-1",
            ParentKind::Consent,
            TppInfo {
                authorisation_number: "PSDDE-BAFIN-000001".to_string(),
                name: None,
            },
            vec![PsuIdData::new("anton.brueckner")],
            AccessScope::AllAvailableAccounts,
            "all-accounts",
        )
    }

    #[test]
    fn checksum_is_stable_and_detects_payload_changes() {
        let p = parent();
        assert_eq!(p.checksum, p.payload_checksum());

        let mut tampered = p.clone();
        tampered.product = "payments".to_string();
        assert_ne!(tampered.checksum, tampered.payload_checksum());

        // Mutable fields do not participate.
        let mut status_changed = p;
        status_changed.status = ConsentStatus::Valid;
        status_changed.multilevel_sca_required = true;
        assert_eq!(status_changed.checksum, status_changed.payload_checksum());
    }

    #[test]
    fn psu_membership() {
        let p = parent();
        assert!(p.knows_psu("anton.brueckner"));
        assert!(!p.knows_psu("max.musterman"));
    }

    #[test]
    fn decoupled_rebind_is_exactly_once() {
        let mut auth = Authorisation::new("auth-1", "consent-1", ParentKind::Consent);
        auth.sca_approach = Some(ScaApproach::Redirect);

        assert!(auth.rebind_decoupled());
        assert_eq!(auth.sca_approach, Some(ScaApproach::Decoupled));
        // Second rebind is a no-op.
        assert!(!auth.rebind_decoupled());
        assert_eq!(auth.sca_approach, Some(ScaApproach::Decoupled));
    }

    #[test]
    fn method_membership_lookup() {
        let mut auth = Authorisation::new("auth-1", "consent-1", ParentKind::Consent);
        assert!(auth.offers_method("sms").is_none());

        auth.available_sca_methods = Some(vec![AuthenticationObject {
            authentication_method_id: "sms".to_string(),
            authentication_type: "SMS_OTP".to_string(),
            name: None,
            decoupled: false,
        }]);
        assert!(auth.offers_method("sms").is_some());
        assert!(auth.offers_method("photo").is_none());
    }
}
