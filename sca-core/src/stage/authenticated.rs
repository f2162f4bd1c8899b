//! Stage handler for `PSUAUTHENTICATED`: the PSU chooses one of the
//! enumerated SCA methods.

use super::{identified, StageContext, StageOutcome, UpdateRequest};
use crate::error::{codes, ErrorDetail, ErrorKind};
use sca_spi::AuthorisationAdapter;

pub async fn handle(
    ctx: &StageContext<'_>,
    request: &UpdateRequest,
    adapter: &dyn AuthorisationAdapter,
) -> StageOutcome {
    let method_id = match request.authentication_method_id.as_deref() {
        Some(method_id) => method_id,
        None => {
            return StageOutcome::format_error(ErrorDetail::new(
                ErrorKind::Format,
                codes::SCA_METHOD_UNKNOWN,
                "no authentication method id in request",
            ))
        }
    };

    // The chosen method must be a member of the list enumerated for this
    // authorisation. A wrong id is retryable: the state is unchanged and
    // the PSU may pick again.
    let method = match ctx.authorisation.offers_method(method_id) {
        Some(method) => method.clone(),
        None => {
            return StageOutcome::format_error(ErrorDetail::new(
                ErrorKind::Format,
                codes::SCA_METHOD_UNKNOWN,
                format!("method {} is not among the available SCA methods", method_id),
            ))
        }
    };

    if method.decoupled {
        let mut outcome =
            identified::proceed_decoupled(ctx, adapter, &method.authentication_method_id).await;
        outcome.chosen_method = Some(method);
        return outcome;
    }

    super::proceed_embedded(ctx, adapter, &method.authentication_method_id).await
}
