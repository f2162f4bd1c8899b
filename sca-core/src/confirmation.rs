//! Redirect-flow confirmation code validation.
//!
//! Used only when the intermediary validates the code itself
//! ([`ConfirmationCodeMode::Internal`](crate::config::ConfirmationCodeMode)).
//! When the bank performs the validation, the stage handler calls
//! `check_confirmation_code_at_bank` on the adapter and this component is
//! not involved at all.

use subtle::ConstantTimeEq;
use tracing::debug;

/// Constant-time confirmation code check.
pub struct ConfirmationCodeValidator;

impl ConfirmationCodeValidator {
    /// Compares the submitted code against the expected one in constant
    /// time. Length differences short-circuit inside `ct_eq` without
    /// leaking position information.
    pub fn check_internally(authorisation_id: &str, submitted: &str, expected: &str) -> bool {
        let matched: bool = submitted
            .as_bytes()
            .ct_eq(expected.as_bytes())
            .into();
        debug!(
            "confirmation code check for authorisation {}: {}",
            authorisation_id,
            if matched { "matched" } else { "mismatch" }
        );
        matched
    }
}
