//! SPI boundary for the SCA orchestration core.
//!
//! This crate defines everything that crosses the line between the
//! orchestration engine (`sca-core`) and a bank-side connector: the closed
//! status model shared by both sides, the identity types for PSUs and TPPs,
//! the SCA method/challenge payloads, and the [`AuthorisationAdapter`]
//! contract itself.
//!
//! The adapter is the only place where real bank communication happens.
//! Every call is a potentially slow network operation and returns a
//! tri-state result: success with a payload, an explicit business rejection,
//! or a technical fault (see [`AdapterError`]). The engine never retries a
//! technical fault on its own; retry policy belongs to the connector or to
//! the caller.

pub mod adapter;
pub mod model;
pub mod response;

pub use adapter::{
    AuthorisationAdapter, AuthorisationCodeResult, ConfirmationCodeResult, DecoupledStartResult,
    PsuAuthorisationResult, PsuAuthorisationStatus, ScaConfirmation, ScaStatusResult,
    SpiBusinessObject, SpiContextData, VerifyScaResult,
};
pub use model::{
    AuthenticationObject, ChallengeData, ConsentStatus, ParentKind, PsuIdData, ScaApproach,
    ScaStatus, TppInfo,
};
pub use response::{AdapterError, SpiResult};
