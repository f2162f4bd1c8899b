//! Bank (ASPSP) profile configuration.
//!
//! The profile is an explicit value passed into the orchestrator, never
//! process-wide state, so several bank configurations can coexist in one
//! process and in tests.

use crate::model::{AccessScope, Parent};
use sca_spi::{ParentKind, ScaApproach};
use serde::{Deserialize, Serialize};

/// Who validates the redirect-flow confirmation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationCodeMode {
    /// The intermediary holds the expected code and compares in constant
    /// time.
    Internal,
    /// The bank owns the code; validation is delegated over the SPI.
    BankValidated,
}

/// Static per-deployment bank configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankProfile {
    /// Approach used for authorisations that have none bound yet.
    pub default_approach: ScaApproach,
    /// Whether an all-available-accounts consent may skip SCA entirely for
    /// a single pre-known PSU.
    pub one_factor_global_access: bool,
    /// Same shortcut for consents addressing exactly one account.
    pub one_factor_single_account: bool,
    /// Redirect confirmation-code validation mode.
    pub confirmation_code_mode: ConfirmationCodeMode,
    /// Bound on optimistic-concurrency retries of a whole stage handler.
    pub stage_retry_limit: u32,
}

impl Default for BankProfile {
    fn default() -> Self {
        Self {
            default_approach: ScaApproach::Embedded,
            one_factor_global_access: false,
            one_factor_single_account: false,
            confirmation_code_mode: ConfirmationCodeMode::Internal,
            stage_retry_limit: 3,
        }
    }
}

impl BankProfile {
    /// One-factor eligibility: a consent with exactly one PsuData entry
    /// whose access scope the bank configured as requiring no further SCA.
    pub fn one_factor_eligible(&self, parent: &Parent) -> bool {
        if parent.kind != ParentKind::Consent || parent.psu_data.len() != 1 {
            return false;
        }
        match &parent.access {
            AccessScope::AllAvailableAccounts => self.one_factor_global_access,
            AccessScope::SingleAccount(_) => self.one_factor_single_account,
            AccessScope::Accounts(accounts) => {
                accounts.len() == 1 && self.one_factor_single_account
            }
        }
    }
}
