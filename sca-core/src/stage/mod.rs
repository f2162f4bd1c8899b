//! Stage handlers: one per non-terminal authorisation state.
//!
//! A handler is a total function from (snapshot of the persisted state,
//! inbound update request) to a [`StageOutcome`]: the next status plus
//! side-effect instructions. Handlers call the bank adapter where the
//! transition requires bank-side validation, but they never write to the
//! store: persistence, approach binding and the consent-status hooks are
//! applied by the orchestrator, which retries the whole handler when its
//! snapshot turns out stale.
//!
//! Business and technical failures never surface as `Err` from a handler;
//! they are encoded as a `Failed` transition (or a no-transition format
//! error) in the outcome.

pub mod authenticated;
pub mod identified;
pub mod method_selected;
pub mod received;

use crate::config::BankProfile;
use crate::error::ErrorDetail;
use crate::model::{Authorisation, Parent};
use sca_spi::{
    AuthenticationObject, ChallengeData, ConsentStatus, PsuIdData, ScaStatus, SpiBusinessObject,
    SpiContextData,
};
use serde::{Deserialize, Serialize};

/// An inbound TPP update against one authorisation. Which fields are
/// meaningful depends on the authorisation's current state: PSU data for
/// identification, a password for authentication, a method id for
/// selection, confirmation data for the final step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub parent_id: String,
    pub authorisation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psu_data: Option<PsuIdData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_method_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_code: Option<String>,
}

/// Read-only snapshot a handler works against. Cloned out of the store
/// before any adapter call; no lock is held while a handler runs.
pub struct StageContext<'a> {
    pub parent: &'a Parent,
    pub authorisation: &'a Authorisation,
    pub approach: sca_spi::ScaApproach,
    pub profile: &'a BankProfile,
    pub spi_ctx: SpiContextData,
    pub object: SpiBusinessObject,
}

impl StageContext<'_> {
    /// The PSU this update acts for: the one in the request, else the one
    /// already bound to the authorisation.
    pub fn effective_psu(&self, request: &UpdateRequest) -> Option<PsuIdData> {
        request
            .psu_data
            .clone()
            .or_else(|| self.authorisation.psu_id.clone().map(PsuIdData::new))
    }
}

/// Next state plus side-effect instructions, applied atomically by the
/// orchestrator.
#[derive(Debug, Clone, Default)]
pub struct StageOutcome {
    /// New SCA status; `None` means no transition (the request failed a
    /// format guard and the state is unchanged).
    pub next_status: Option<ScaStatus>,
    /// Bind this psu-id to the authorisation.
    pub bind_psu: Option<String>,
    /// Rebind the approach to DECOUPLED (legal exactly once).
    pub rebind_decoupled: bool,
    pub chosen_method: Option<AuthenticationObject>,
    /// Enumerated method list to persist, bank order preserved.
    pub available_methods: Option<Vec<AuthenticationObject>>,
    pub challenge_data: Option<ChallengeData>,
    /// Message to relay to the PSU (decoupled flows).
    pub psu_message: Option<String>,
    /// Aggregate parent status reported by the bank or mandated by a
    /// shortcut; applied before the terminal recomputation.
    pub parent_status: Option<ConsentStatus>,
    /// Latch multilevel SCA on the parent.
    pub set_multilevel: bool,
    /// Terminate superseded consents of the same TPP+PSU pair.
    pub terminate_superseded: bool,
    /// Failure descriptor; persisted with a `Failed` transition, or
    /// returned without one for format guards.
    pub error: Option<ErrorDetail>,
}

impl StageOutcome {
    /// Plain transition to `status`.
    pub fn transition(status: ScaStatus) -> Self {
        Self {
            next_status: Some(status),
            ..Self::default()
        }
    }

    /// Transition to `Failed` carrying the failure descriptor.
    pub fn failed(detail: ErrorDetail) -> Self {
        Self {
            next_status: Some(ScaStatus::Failed),
            error: Some(detail),
            ..Self::default()
        }
    }

    /// No transition; the request was malformed for this stage.
    pub fn format_error(detail: ErrorDetail) -> Self {
        Self {
            error: Some(detail),
            ..Self::default()
        }
    }

    /// No transition and no error.
    pub fn no_op() -> Self {
        Self::default()
    }
}

/// Shared embedded-approach continuation: ask the bank for an authorisation
/// code for `method_id` and move to `SCAMETHODSELECTED` carrying the issued
/// challenge. Used both for explicit method selection and for the
/// auto-selection of a single available method.
pub(crate) async fn proceed_embedded(
    ctx: &StageContext<'_>,
    adapter: &dyn sca_spi::AuthorisationAdapter,
    method_id: &str,
) -> StageOutcome {
    match adapter
        .request_authorisation_code(&ctx.spi_ctx, method_id, &ctx.object)
        .await
    {
        Ok(result) => {
            let mut outcome = StageOutcome::transition(ScaStatus::ScaMethodSelected);
            outcome.chosen_method = Some(result.selected_method);
            outcome.challenge_data = Some(result.challenge_data);
            outcome
        }
        Err(err) => {
            tracing::warn!(
                "authorisation {}: authorisation code request errored: {}",
                ctx.authorisation.id,
                err
            );
            StageOutcome::failed(err.into())
        }
    }
}
