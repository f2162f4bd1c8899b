//! Stage handler for `SCAMETHODSELECTED`: the PSU submits the confirmation
//! for the issued challenge.
//!
//! Under the REDIRECT approach this is the confirmation-code step, checked
//! internally in constant time or delegated to the bank, depending on the
//! profile. Under EMBEDDED/DECOUPLED the submitted data is the OTP/TAN,
//! verified by the bank, which also reports the resulting aggregate parent
//! status.

use super::{StageContext, StageOutcome, UpdateRequest};
use crate::config::ConfirmationCodeMode;
use crate::confirmation::ConfirmationCodeValidator;
use crate::error::{codes, ErrorDetail, ErrorKind};
use sca_spi::{AuthorisationAdapter, ConsentStatus, ScaApproach, ScaConfirmation, ScaStatus};
use tracing::warn;

pub async fn handle(
    ctx: &StageContext<'_>,
    request: &UpdateRequest,
    adapter: &dyn AuthorisationAdapter,
) -> StageOutcome {
    let submitted = match request.confirmation_code.as_deref() {
        Some(code) if !code.is_empty() => code,
        _ => {
            return StageOutcome::format_error(ErrorDetail::new(
                ErrorKind::Format,
                codes::SCA_INVALID,
                "no confirmation data in request",
            ))
        }
    };

    match ctx.approach {
        ScaApproach::Redirect => confirm_redirect(ctx, adapter, submitted).await,
        ScaApproach::Embedded | ScaApproach::Decoupled => {
            verify_with_bank(ctx, adapter, submitted).await
        }
    }
}

async fn confirm_redirect(
    ctx: &StageContext<'_>,
    adapter: &dyn AuthorisationAdapter,
    submitted: &str,
) -> StageOutcome {
    match ctx.profile.confirmation_code_mode {
        ConfirmationCodeMode::Internal => {
            let expected = ctx.authorisation.confirmation_code.as_deref().unwrap_or("");
            if ConfirmationCodeValidator::check_internally(
                &ctx.authorisation.id,
                submitted,
                expected,
            ) {
                finalised_outcome(None)
            } else {
                StageOutcome::failed(ErrorDetail::new(
                    ErrorKind::BusinessRejection,
                    codes::SCA_INVALID,
                    "confirmation code mismatch",
                ))
            }
        }
        ConfirmationCodeMode::BankValidated => {
            match adapter
                .check_confirmation_code_at_bank(&ctx.spi_ctx, submitted, &ctx.authorisation.id)
                .await
            {
                Ok(result) if result.matched => finalised_outcome(result.parent_status),
                Ok(_) => StageOutcome::failed(ErrorDetail::new(
                    ErrorKind::BusinessRejection,
                    codes::SCA_INVALID,
                    "confirmation code rejected by the bank",
                )),
                Err(err) => {
                    warn!(
                        "authorisation {}: bank confirmation check errored: {}",
                        ctx.authorisation.id, err
                    );
                    StageOutcome::failed(err.into())
                }
            }
        }
    }
}

async fn verify_with_bank(
    ctx: &StageContext<'_>,
    adapter: &dyn AuthorisationAdapter,
    submitted: &str,
) -> StageOutcome {
    let confirmation = ScaConfirmation {
        authorisation_id: ctx.authorisation.id.clone(),
        parent_id: ctx.parent.id.clone(),
        psu_id: ctx.authorisation.psu_id.clone().unwrap_or_default(),
        confirmation_data: submitted.to_string(),
    };

    match adapter
        .verify_sca_authorisation(&ctx.spi_ctx, &confirmation, &ctx.object)
        .await
    {
        Ok(result) => {
            let mut outcome = finalised_outcome(Some(result.parent_status));
            // The bank signalling a partial authorisation on a parent not
            // yet flagged multilevel means more signatures are required.
            if result.parent_status == ConsentStatus::PartiallyAuthorised
                && !ctx.parent.multilevel_sca_required
            {
                outcome.set_multilevel = true;
            }
            outcome
        }
        Err(err) => {
            warn!(
                "authorisation {}: SCA verification errored: {}",
                ctx.authorisation.id, err
            );
            StageOutcome::failed(err.into())
        }
    }
}

fn finalised_outcome(parent_status: Option<ConsentStatus>) -> StageOutcome {
    let mut outcome = StageOutcome::transition(ScaStatus::Finalised);
    outcome.parent_status = parent_status;
    outcome.terminate_superseded = true;
    outcome
}
