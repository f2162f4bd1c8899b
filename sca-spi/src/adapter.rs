//! The bank-side authorisation adapter contract.
//!
//! One implementation exists per connected bank (or per mock in tests). The
//! engine treats every method as a blocking network round trip: it never
//! holds a lock on the authorisation aggregate across a call, and it maps
//! any [`AdapterError`](crate::AdapterError) onto a `Failed` transition
//! rather than propagating it.

use crate::model::{AuthenticationObject, ChallengeData, ConsentStatus, ParentKind, PsuIdData, ScaStatus, TppInfo};
use crate::response::SpiResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request-scoped context handed to every adapter call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiContextData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psu_data: Option<PsuIdData>,
    pub tpp_info: TppInfo,
    /// Correlation id of the inbound TPP request.
    pub request_id: String,
}

/// Opaque snapshot of the parent business object handed across the SPI
/// boundary. The engine owns the aggregate; the adapter only ever sees this
/// read-only projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiBusinessObject {
    pub id: String,
    pub kind: ParentKind,
    /// The immutable business payload (requested access, product, ...) as
    /// the bank connector expects it.
    pub payload: serde_json::Value,
    pub multilevel_sca_required: bool,
}

/// Outcome of a PSU credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PsuAuthorisationStatus {
    Success,
    Failure,
}

/// Payload of [`AuthorisationAdapter::authenticate_psu`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsuAuthorisationResult {
    pub status: PsuAuthorisationStatus,
}

/// Payload of [`AuthorisationAdapter::request_authorisation_code`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorisationCodeResult {
    /// The method the challenge was issued for (echoes an auto-selected
    /// method back to the engine).
    pub selected_method: AuthenticationObject,
    pub challenge_data: ChallengeData,
}

/// Payload of [`AuthorisationAdapter::notify_decoupled_start`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoupledStartResult {
    /// Message to present to the PSU ("confirm in your banking app").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psu_message: Option<String>,
}

/// Payload of [`AuthorisationAdapter::get_sca_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaStatusResult {
    pub status: ScaStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psu_message: Option<String>,
}

/// The PSU's submitted SCA confirmation, forwarded to the bank for
/// verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaConfirmation {
    pub authorisation_id: String,
    pub parent_id: String,
    pub psu_id: String,
    /// The OTP/TAN the PSU entered.
    pub confirmation_data: String,
}

/// Payload of [`AuthorisationAdapter::verify_sca_authorisation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyScaResult {
    /// The aggregate status the bank considers the parent to have after this
    /// verification (e.g. `PARTIALLY_AUTHORISED` when further signatures are
    /// outstanding).
    pub parent_status: ConsentStatus,
}

/// Payload of [`AuthorisationAdapter::check_confirmation_code_at_bank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationCodeResult {
    pub matched: bool,
    /// Parent status the bank reports alongside a matched code, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_status: Option<ConsentStatus>,
}

/// Bank-side SPI consumed by the orchestration engine.
///
/// Structurally identical for consents, payments and cancellations; the
/// [`SpiBusinessObject::kind`] field tells the connector which flavour it is
/// handling.
#[async_trait]
pub trait AuthorisationAdapter: Send + Sync {
    /// Verify the PSU's credentials with the bank.
    async fn authenticate_psu(
        &self,
        ctx: &SpiContextData,
        authorisation_id: &str,
        psu: &PsuIdData,
        credential: &str,
        object: &SpiBusinessObject,
    ) -> SpiResult<PsuAuthorisationResult>;

    /// Enumerate the SCA methods the bank offers for this PSU and object.
    /// The returned order is meaningful and must be preserved.
    async fn list_available_sca_methods(
        &self,
        ctx: &SpiContextData,
        object: &SpiBusinessObject,
    ) -> SpiResult<Vec<AuthenticationObject>>;

    /// Ask the bank to issue an authorisation code (challenge) for the given
    /// method.
    async fn request_authorisation_code(
        &self,
        ctx: &SpiContextData,
        method_id: &str,
        object: &SpiBusinessObject,
    ) -> SpiResult<AuthorisationCodeResult>;

    /// Kick off a decoupled flow on the PSU's second device. Banks that do
    /// not support the method answer with a business error.
    async fn notify_decoupled_start(
        &self,
        ctx: &SpiContextData,
        authorisation_id: &str,
        method_id: &str,
        object: &SpiBusinessObject,
    ) -> SpiResult<DecoupledStartResult>;

    /// Poll the bank for the current status of an out-of-band authorisation.
    async fn get_sca_status(
        &self,
        ctx: &SpiContextData,
        current_status: ScaStatus,
        authorisation_id: &str,
        object: &SpiBusinessObject,
    ) -> SpiResult<ScaStatusResult>;

    /// Verify the PSU's submitted SCA confirmation (embedded/decoupled
    /// flows) and learn the resulting aggregate parent status.
    async fn verify_sca_authorisation(
        &self,
        ctx: &SpiContextData,
        confirmation: &ScaConfirmation,
        object: &SpiBusinessObject,
    ) -> SpiResult<VerifyScaResult>;

    /// Let the bank check a redirect-flow confirmation code itself (used
    /// when the bank, not the intermediary, owns the expected code).
    async fn check_confirmation_code_at_bank(
        &self,
        ctx: &SpiContextData,
        code: &str,
        authorisation_id: &str,
    ) -> SpiResult<ConfirmationCodeResult>;
}
