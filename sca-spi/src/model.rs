//! Shared status model for consents, payments and their authorisations.
//!
//! These enumerations are closed by design: the engine dispatches on them
//! exhaustively, so a new variant is a compile-time event everywhere it
//! matters, not a runtime surprise.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// SCA status
// ---------------------------------------------------------------------------

/// Status of a single authorisation (one PSU's authentication session
/// against a consent or payment).
///
/// The lifecycle is monotonic:
/// `Received → PsuIdentified → PsuAuthenticated → ScaMethodSelected →
/// {Finalised | Failed | Exempted}`. Terminal states accept no further
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScaStatus {
    /// Authorisation created, nothing submitted yet.
    Received,
    /// The PSU has been identified (psu-id bound to the authorisation).
    PsuIdentified,
    /// Bank-side authentication succeeded and more than one SCA method is
    /// available; the PSU must now choose one.
    PsuAuthenticated,
    /// An SCA method has been selected and a challenge was issued; the PSU
    /// must submit the confirmation data.
    ScaMethodSelected,
    /// Authorisation handed off to an out-of-band flow (redirect page); the
    /// engine only receives a Finalised/Failed callback for it.
    Started,
    /// Authorisation completed successfully. Terminal.
    Finalised,
    /// Authorisation failed (wrong credentials, rejected confirmation,
    /// technical fault). Terminal.
    Failed,
    /// The bank exempted this authorisation from SCA (zero methods
    /// required). Counts as success. Terminal.
    Exempted,
}

impl ScaStatus {
    /// Returns true if no further transitions are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScaStatus::Finalised | ScaStatus::Failed | ScaStatus::Exempted
        )
    }

    /// Returns true for the success-terminal states.
    pub fn is_success_terminal(&self) -> bool {
        matches!(self, ScaStatus::Finalised | ScaStatus::Exempted)
    }
}

impl fmt::Display for ScaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaStatus::Received => write!(f, "received"),
            ScaStatus::PsuIdentified => write!(f, "psuIdentified"),
            ScaStatus::PsuAuthenticated => write!(f, "psuAuthenticated"),
            ScaStatus::ScaMethodSelected => write!(f, "scaMethodSelected"),
            ScaStatus::Started => write!(f, "started"),
            ScaStatus::Finalised => write!(f, "finalised"),
            ScaStatus::Failed => write!(f, "failed"),
            ScaStatus::Exempted => write!(f, "exempted"),
        }
    }
}

impl FromStr for ScaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(ScaStatus::Received),
            "psuIdentified" => Ok(ScaStatus::PsuIdentified),
            "psuAuthenticated" => Ok(ScaStatus::PsuAuthenticated),
            "scaMethodSelected" => Ok(ScaStatus::ScaMethodSelected),
            "started" => Ok(ScaStatus::Started),
            "finalised" => Ok(ScaStatus::Finalised),
            "failed" => Ok(ScaStatus::Failed),
            "exempted" => Ok(ScaStatus::Exempted),
            other => Err(format!("unknown sca status: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// SCA approach
// ---------------------------------------------------------------------------

/// How the SCA challenge is delivered to the PSU.
///
/// An authorisation's approach is bound once and is immutable afterwards,
/// with a single exception: selecting an SCA method flagged as decoupled
/// rebinds the authorisation to `Decoupled` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScaApproach {
    /// The PSU is redirected to a bank-hosted authentication page; the
    /// engine sees only the final callback.
    Redirect,
    /// The whole flow (credentials, method choice, challenge) runs through
    /// the intermediary's API.
    Embedded,
    /// The challenge is delivered on a separate device/channel and the
    /// result is notified asynchronously.
    Decoupled,
}

impl fmt::Display for ScaApproach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaApproach::Redirect => write!(f, "REDIRECT"),
            ScaApproach::Embedded => write!(f, "EMBEDDED"),
            ScaApproach::Decoupled => write!(f, "DECOUPLED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Consent / payment status
// ---------------------------------------------------------------------------

/// Aggregate status of the parent business object (consent or payment).
///
/// Derived from the set of per-PSU authorisation outcomes; mutated only
/// through the status coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentStatus {
    Received,
    Valid,
    PartiallyAuthorised,
    Rejected,
    RevokedByPsu,
    TerminatedByTpp,
    Expired,
}

impl ConsentStatus {
    /// Terminal parent statuses admit no further status changes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConsentStatus::Rejected
                | ConsentStatus::RevokedByPsu
                | ConsentStatus::TerminatedByTpp
                | ConsentStatus::Expired
        )
    }
}

impl fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsentStatus::Received => write!(f, "received"),
            ConsentStatus::Valid => write!(f, "valid"),
            ConsentStatus::PartiallyAuthorised => write!(f, "partiallyAuthorised"),
            ConsentStatus::Rejected => write!(f, "rejected"),
            ConsentStatus::RevokedByPsu => write!(f, "revokedByPsu"),
            ConsentStatus::TerminatedByTpp => write!(f, "terminatedByTpp"),
            ConsentStatus::Expired => write!(f, "expired"),
        }
    }
}

// ---------------------------------------------------------------------------
// Parent kind
// ---------------------------------------------------------------------------

/// The kind of business object an authorisation authenticates access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParentKind {
    Consent,
    Payment,
    Cancellation,
}

impl fmt::Display for ParentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParentKind::Consent => write!(f, "CONSENT"),
            ParentKind::Payment => write!(f, "PAYMENT"),
            ParentKind::Cancellation => write!(f, "CANCELLATION"),
        }
    }
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Identity tuple of a Payment Service User.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PsuIdData {
    pub psu_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psu_id_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psu_corporate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psu_corporate_id_type: Option<String>,
}

impl PsuIdData {
    /// Convenience constructor for the common single-id case.
    pub fn new(psu_id: impl Into<String>) -> Self {
        Self {
            psu_id: psu_id.into(),
            psu_id_type: None,
            psu_corporate_id: None,
            psu_corporate_id_type: None,
        }
    }
}

/// Authorisation-number-keyed identity of the requesting third party.
/// Read-only for the orchestration core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TppInfo {
    pub authorisation_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// SCA methods and challenges
// ---------------------------------------------------------------------------

/// One SCA method offered by the bank (SMS OTP, photo TAN, push, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationObject {
    /// Bank-assigned identifier the PSU selects by.
    pub authentication_method_id: String,
    /// Method category as reported by the bank, e.g. `SMS_OTP`.
    pub authentication_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// True if this method completes on a separate device/channel.
    #[serde(default)]
    pub decoupled: bool,
}

/// Challenge payload returned when an authorisation code is requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub data: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_information: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_max_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_format: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(ScaStatus::Finalised.is_terminal());
        assert!(ScaStatus::Failed.is_terminal());
        assert!(ScaStatus::Exempted.is_terminal());
        assert!(!ScaStatus::Received.is_terminal());
        assert!(!ScaStatus::ScaMethodSelected.is_terminal());
    }

    #[test]
    fn success_terminal_excludes_failed() {
        assert!(ScaStatus::Finalised.is_success_terminal());
        assert!(ScaStatus::Exempted.is_success_terminal());
        assert!(!ScaStatus::Failed.is_success_terminal());
    }

    #[test]
    fn sca_status_round_trips_through_display() {
        for status in [
            ScaStatus::Received,
            ScaStatus::PsuIdentified,
            ScaStatus::PsuAuthenticated,
            ScaStatus::ScaMethodSelected,
            ScaStatus::Started,
            ScaStatus::Finalised,
            ScaStatus::Failed,
            ScaStatus::Exempted,
        ] {
            assert_eq!(status.to_string().parse::<ScaStatus>(), Ok(status));
        }
        assert!("bogus".parse::<ScaStatus>().is_err());
    }

    #[test]
    fn consent_terminal_statuses() {
        assert!(ConsentStatus::TerminatedByTpp.is_terminal());
        assert!(ConsentStatus::Rejected.is_terminal());
        assert!(!ConsentStatus::Valid.is_terminal());
        assert!(!ConsentStatus::PartiallyAuthorised.is_terminal());
    }
}
