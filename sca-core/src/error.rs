//! Error handling for the orchestration engine.
//!
//! Two distinct surfaces exist here. [`Error`] is what the orchestrator
//! returns to its caller, only for conditions the caller must act on
//! (unknown authorisation, checksum conflict, exhausted retries).
//! [`ErrorDetail`] is the structured descriptor attached to an authorisation
//! that transitioned to `Failed`: business and technical faults never cross
//! the orchestrator boundary as `Err`, they become state.

use sca_spi::AdapterError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Machine-readable message codes, aligned with the PSD2 error catalogue.
pub mod codes {
    pub const CONSENT_UNKNOWN: &str = "CONSENT_UNKNOWN";
    pub const PAYMENT_UNKNOWN: &str = "PAYMENT_UNKNOWN";
    pub const AUTHORISATION_UNKNOWN: &str = "AUTHORISATION_UNKNOWN";
    pub const FORMAT_ERROR_NO_PSU: &str = "FORMAT_ERROR_NO_PSU";
    pub const FORMAT_ERROR_NO_CREDENTIALS: &str = "FORMAT_ERROR_NO_CREDENTIALS";
    pub const FORMAT_ERROR_UNKNOWN_PSU: &str = "FORMAT_ERROR_UNKNOWN_PSU";
    pub const PSU_CREDENTIALS_INVALID: &str = "PSU_CREDENTIALS_INVALID";
    pub const SCA_METHOD_UNKNOWN: &str = "SCA_METHOD_UNKNOWN";
    pub const SCA_INVALID: &str = "SCA_INVALID";
    pub const STATUS_INVALID: &str = "STATUS_INVALID";
    pub const TECHNICAL_ERROR: &str = "TECHNICAL_ERROR";
}

/// What kind of record a [`Error::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    Consent,
    Payment,
    Authorisation,
}

impl ResourceKind {
    /// The message code reported for a missing record of this kind.
    pub fn code(&self) -> &'static str {
        match self {
            ResourceKind::Consent => codes::CONSENT_UNKNOWN,
            ResourceKind::Payment => codes::PAYMENT_UNKNOWN,
            ResourceKind::Authorisation => codes::AUTHORISATION_UNKNOWN,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error types surfaced to the orchestrator's caller.
#[derive(Error, Debug)]
pub enum Error {
    /// The addressed record does not resolve.
    #[error("{kind}: {id}")]
    NotFound { kind: ResourceKind, id: String },

    /// Malformed input that no stage can act on.
    #[error("format error [{code}]: {message}")]
    Format { code: &'static str, message: String },

    /// Explicit business rejection outside any stage transition (e.g. an
    /// authorisation started against an already-terminal parent).
    #[error("business rejection [{code}]: {message}")]
    Business { code: String, message: String },

    /// Internal or connectivity fault.
    #[error("technical error: {0}")]
    Technical(String),

    /// The parent's definitive fields changed after it reached a terminal
    /// status; the update is surfaced rather than applied.
    #[error("definitive fields of parent {0} changed after terminal status")]
    ChecksumConflict(String),
}

impl Error {
    pub fn not_found(kind: ResourceKind, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Result type for the orchestration engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failure recorded on a `Failed` authorisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Format,
    BusinessRejection,
    Technical,
}

/// Structured failure descriptor carried by a `Failed` authorisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: ResourceKind, id: &str) -> Self {
        Self::new(
            ErrorKind::NotFound,
            kind.code(),
            format!("no such record: {}", id),
        )
    }

    pub fn technical(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Technical, codes::TECHNICAL_ERROR, message)
    }
}

impl From<AdapterError> for ErrorDetail {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Business { code, message } => {
                ErrorDetail::new(ErrorKind::BusinessRejection, code, message)
            }
            AdapterError::Technical { code, message } => {
                ErrorDetail::new(ErrorKind::Technical, code, message)
            }
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_errors_map_onto_detail_kinds() {
        let detail: ErrorDetail =
            AdapterError::business(codes::PSU_CREDENTIALS_INVALID, "wrong password").into();
        assert_eq!(detail.kind, ErrorKind::BusinessRejection);
        assert_eq!(detail.code, codes::PSU_CREDENTIALS_INVALID);

        let detail: ErrorDetail = AdapterError::technical("TIMEOUT", "deadline exceeded").into();
        assert_eq!(detail.kind, ErrorKind::Technical);
    }

    #[test]
    fn not_found_codes() {
        assert_eq!(ResourceKind::Consent.code(), "CONSENT_UNKNOWN");
        assert_eq!(ResourceKind::Payment.code(), "PAYMENT_UNKNOWN");
        assert_eq!(ResourceKind::Authorisation.code(), "AUTHORISATION_UNKNOWN");
    }
}
