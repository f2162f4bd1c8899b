//! Stage handler for `RECEIVED`.
//!
//! Two triggers arrive here: PSU identification (psu data without
//! credentials) and a combined identification-plus-authentication update
//! (credentials present). The latter is delegated to the
//! [`identified`](super::identified) stage logic, mirroring the lifecycle
//! where identification and authentication land in one request.

use super::{identified, StageContext, StageOutcome, UpdateRequest};
use crate::error::{codes, ErrorDetail, ErrorKind};
use sca_spi::{AuthorisationAdapter, ConsentStatus, ScaStatus};
use tracing::debug;

pub async fn handle(
    ctx: &StageContext<'_>,
    request: &UpdateRequest,
    adapter: &dyn AuthorisationAdapter,
) -> StageOutcome {
    if request.password.is_some() {
        return identified::handle(ctx, request, adapter).await;
    }
    apply_identification(ctx, request)
}

/// Bind the PSU to the authorisation, or finalise outright when the bank
/// profile marks this parent as one-factor eligible.
fn apply_identification(ctx: &StageContext<'_>, request: &UpdateRequest) -> StageOutcome {
    let psu = match ctx.effective_psu(request) {
        Some(psu) => psu,
        None => {
            return StageOutcome::format_error(ErrorDetail::new(
                ErrorKind::Format,
                codes::FORMAT_ERROR_NO_PSU,
                "no PSU data available in request",
            ))
        }
    };

    // Identity must match the parent's PsuData set; a mismatch is a hard
    // failure, not a retryable condition.
    if !ctx.parent.knows_psu(&psu.psu_id) {
        return StageOutcome::failed(ErrorDetail::new(
            ErrorKind::Format,
            codes::FORMAT_ERROR_UNKNOWN_PSU,
            format!(
                "psu {} is not attached to parent {}",
                psu.psu_id, ctx.parent.id
            ),
        ));
    }

    if ctx.profile.one_factor_eligible(ctx.parent) {
        debug!(
            "authorisation {}: one-factor shortcut, finalising on identification",
            ctx.authorisation.id
        );
        let mut outcome = StageOutcome::transition(ScaStatus::Finalised);
        outcome.bind_psu = Some(psu.psu_id);
        outcome.parent_status = Some(ConsentStatus::Valid);
        outcome.terminate_superseded = true;
        return outcome;
    }

    let mut outcome = StageOutcome::transition(ScaStatus::PsuIdentified);
    outcome.bind_psu = Some(psu.psu_id);
    outcome
}
