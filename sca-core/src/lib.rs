//! Consent and payment SCA orchestration core.
//!
//! This crate drives Strong Customer Authentication for the business
//! objects of an open-banking intermediary: consents, payments and payment
//! cancellations. Each parent object carries one authorisation per signing
//! PSU; the [`orchestrator::AuthorisationOrchestrator`] moves every
//! authorisation through the SCA state machine (embedded, redirect or
//! decoupled approach) by dispatching inbound updates to per-state stage
//! handlers and persisting exactly one transition per call.
//!
//! Bank-specific behaviour lives behind the
//! [`sca_spi::AuthorisationAdapter`] trait; the aggregate consent/payment
//! status is derived from the per-PSU outcomes by the
//! [`status::ConsentStatusCoordinator`].
//!
//! # Example
//!
//! ```no_run
//! use sca_core::config::BankProfile;
//! use sca_core::orchestrator::AuthorisationOrchestrator;
//! use sca_core::store::InMemoryLifecycleStore;
//! use std::sync::Arc;
//!
//! # fn adapter() -> Arc<dyn sca_spi::AuthorisationAdapter> { unimplemented!() }
//! let store = Arc::new(InMemoryLifecycleStore::new());
//! let orchestrator = AuthorisationOrchestrator::new(store, adapter(), BankProfile::default());
//! ```

pub mod config;
pub mod confirmation;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod resolver;
pub mod stage;
pub mod status;
pub mod store;

pub use config::{BankProfile, ConfirmationCodeMode};
pub use error::{Error, ErrorDetail, ErrorKind, ResourceKind, Result};
pub use model::{AccessScope, Authorisation, Parent, Versioned};
pub use orchestrator::{AuthorisationOrchestrator, UpdateOutcome};
pub use resolver::{ApproachResolution, ScaApproachResolver};
pub use stage::{StageOutcome, UpdateRequest};
pub use status::ConsentStatusCoordinator;
pub use store::{InMemoryLifecycleStore, LifecycleStore, Lookup, StoreError};
