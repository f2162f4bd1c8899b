//! Stage handler for `PSUIDENTIFIED`: bank-side authentication followed by
//! the method-count branch.
//!
//! After successful authentication the available-methods enumeration
//! decides the next state, in this order: one-factor shortcut, zero methods
//! (SCA exemption), exactly one decoupled method, exactly one embedded
//! method (auto-selection), several methods (PSU must choose).

use super::{StageContext, StageOutcome, UpdateRequest};
use crate::error::{codes, ErrorDetail, ErrorKind};
use sca_spi::{AuthorisationAdapter, ConsentStatus, PsuAuthorisationStatus, ScaStatus};
use tracing::{debug, warn};

pub async fn handle(
    ctx: &StageContext<'_>,
    request: &UpdateRequest,
    adapter: &dyn AuthorisationAdapter,
) -> StageOutcome {
    let psu = match ctx.effective_psu(request) {
        Some(psu) => psu,
        None => {
            return StageOutcome::format_error(ErrorDetail::new(
                ErrorKind::Format,
                codes::FORMAT_ERROR_NO_PSU,
                "no PSU data available for authentication",
            ))
        }
    };
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
    let password = match request.password.as_deref() {
        Some(password) => password,
        None => {
            return StageOutcome::format_error(ErrorDetail::new(
                ErrorKind::Format,
                codes::FORMAT_ERROR_NO_CREDENTIALS,
                "no credentials available in request",
            ))
        }
    };

    let auth_result = match adapter
        .authenticate_psu(
            &ctx.spi_ctx,
            &ctx.authorisation.id,
            &psu,
            password,
            &ctx.object,
        )
        .await
    {
        Ok(result) => result,
        Err(err) => {
            warn!(
                "authorisation {}: PSU authentication errored: {}",
                ctx.authorisation.id, err
            );
            return StageOutcome::failed(err.into());
        }
    };

    if auth_result.status == PsuAuthorisationStatus::Failure {
        return StageOutcome::failed(ErrorDetail::new(
            ErrorKind::BusinessRejection,
            codes::PSU_CREDENTIALS_INVALID,
            "PSU credentials invalid",
        ));
    }

    if ctx.profile.one_factor_eligible(ctx.parent) {
        debug!(
            "authorisation {}: one-factor shortcut after authentication",
            ctx.authorisation.id
        );
        let mut outcome = StageOutcome::transition(ScaStatus::Finalised);
        outcome.bind_psu = Some(psu.psu_id);
        outcome.parent_status = Some(ConsentStatus::Valid);
        outcome.terminate_superseded = true;
        return outcome;
    }

    let methods = match adapter
        .list_available_sca_methods(&ctx.spi_ctx, &ctx.object)
        .await
    {
        Ok(methods) => methods,
        Err(err) => {
            warn!(
                "authorisation {}: SCA method enumeration errored: {}",
                ctx.authorisation.id, err
            );
            return StageOutcome::failed(err.into());
        }
    };

    let mut outcome = match methods.len() {
        // The bank requires no further SCA factor at all.
        0 => {
            debug!(
                "authorisation {}: zero SCA methods, exempted",
                ctx.authorisation.id
            );
            let mut outcome = StageOutcome::transition(ScaStatus::Exempted);
            outcome.terminate_superseded = true;
            outcome
        }
        1 if methods[0].decoupled => {
            let method = methods[0].clone();
            let mut outcome =
                proceed_decoupled(ctx, adapter, &method.authentication_method_id).await;
            outcome.chosen_method = Some(method);
            outcome.with_available_methods(methods)
        }
        1 => super::proceed_embedded(ctx, adapter, &methods[0].authentication_method_id)
            .await
            .with_available_methods(methods),
        _ => {
            let mut outcome = StageOutcome::transition(ScaStatus::PsuAuthenticated);
            outcome.available_methods = Some(methods);
            outcome
        }
    };
    outcome.bind_psu = Some(psu.psu_id);
    outcome
}

/// Rebind to DECOUPLED and kick off the out-of-band flow. Per the
/// transition table a successful notification maps to FINALISED (the bank
/// completes the authorisation on the second device and confirms via the
/// status callback); a declined or failed notification maps to FAILED.
pub(super) async fn proceed_decoupled(
    ctx: &StageContext<'_>,
    adapter: &dyn AuthorisationAdapter,
    method_id: &str,
) -> StageOutcome {
    match adapter
        .notify_decoupled_start(&ctx.spi_ctx, &ctx.authorisation.id, method_id, &ctx.object)
        .await
    {
        Ok(result) => {
            let mut outcome = StageOutcome::transition(ScaStatus::Finalised);
            outcome.rebind_decoupled = true;
            outcome.psu_message = result.psu_message;
            outcome.terminate_superseded = true;
            outcome
        }
        Err(err) => {
            warn!(
                "authorisation {}: decoupled start rejected: {}",
                ctx.authorisation.id, err
            );
            let mut outcome = StageOutcome::failed(err.into());
            outcome.rebind_decoupled = true;
            outcome
        }
    }
}

trait WithMethods {
    fn with_available_methods(self, methods: Vec<sca_spi::AuthenticationObject>) -> Self;
}

impl WithMethods for StageOutcome {
    fn with_available_methods(mut self, methods: Vec<sca_spi::AuthenticationObject>) -> Self {
        if self.available_methods.is_none() {
            self.available_methods = Some(methods);
        }
        self
    }
}
