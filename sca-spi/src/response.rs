//! Tri-state adapter result model.
//!
//! Every adapter call either succeeds with a payload, is declined by the
//! bank for a business reason, or fails technically (network fault, timeout,
//! malformed bank response). The engine maps business errors to a `Failed`
//! authorisation carrying the bank's reason, and technical errors to a
//! `Failed` authorisation with a generic technical code.

use thiserror::Error;

/// Result of a bank-side adapter call.
pub type SpiResult<T> = Result<T, AdapterError>;

/// The two failure classes an adapter may report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// The bank explicitly declined the operation (wrong credentials, wrong
    /// confirmation code, unsupported method, ...).
    #[error("business rejection [{code}]: {message}")]
    Business { code: String, message: String },

    /// Connectivity or bank-side fault. Never retried by the engine.
    #[error("technical error [{code}]: {message}")]
    Technical { code: String, message: String },
}

impl AdapterError {
    pub fn business(code: impl Into<String>, message: impl Into<String>) -> Self {
        AdapterError::Business {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn technical(code: impl Into<String>, message: impl Into<String>) -> Self {
        AdapterError::Technical {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns true for the business-rejection class.
    pub fn is_business(&self) -> bool {
        matches!(self, AdapterError::Business { .. })
    }

    /// The bank-supplied or generic error code.
    pub fn code(&self) -> &str {
        match self {
            AdapterError::Business { code, .. } | AdapterError::Technical { code, .. } => code,
        }
    }
}
