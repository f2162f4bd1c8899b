//! Shared fixtures for the integration tests: a scriptable bank adapter
//! and consent/payment builders.

// Each integration test binary compiles its own copy; not every test uses
// every fixture.
#![allow(dead_code)]

use sca_core::config::BankProfile;
use sca_core::model::{AccessScope, Parent};
use sca_core::orchestrator::AuthorisationOrchestrator;
use sca_core::store::InMemoryLifecycleStore;
use sca_spi::{
    AdapterError, AuthenticationObject, AuthorisationAdapter, AuthorisationCodeResult,
    ChallengeData, ConfirmationCodeResult, ConsentStatus, DecoupledStartResult, ParentKind,
    PsuAuthorisationResult, PsuAuthorisationStatus, PsuIdData, ScaConfirmation, ScaStatus,
    ScaStatusResult, SpiBusinessObject, SpiContextData, SpiResult, TppInfo, VerifyScaResult,
};
use std::sync::{Arc, Mutex};

pub const TPP: &str = "PSDDE-BAFIN-000001";
pub const PSU: &str = "anton.brueckner";
pub const PSU2: &str = "max.musterman";

pub fn sms_method() -> AuthenticationObject {
    AuthenticationObject {
        authentication_method_id: "sms".to_string(),
        authentication_type: "SMS_OTP".to_string(),
        name: Some("SMS OTP".to_string()),
        decoupled: false,
    }
}

pub fn photo_method() -> AuthenticationObject {
    AuthenticationObject {
        authentication_method_id: "photo".to_string(),
        authentication_type: "PHOTO_OTP".to_string(),
        name: Some("Photo TAN".to_string()),
        decoupled: false,
    }
}

pub fn push_method() -> AuthenticationObject {
    AuthenticationObject {
        authentication_method_id: "push".to_string(),
        authentication_type: "PUSH_OTP".to_string(),
        name: Some("Banking app".to_string()),
        decoupled: true,
    }
}

/// Scriptable bank adapter. Every response is a slot the test can rewrite
/// mid-flow; every call is appended to `calls` for order assertions.
pub struct MockAdapter {
    pub authenticate: Mutex<SpiResult<PsuAuthorisationResult>>,
    pub methods: Mutex<SpiResult<Vec<AuthenticationObject>>>,
    pub code: Mutex<SpiResult<AuthorisationCodeResult>>,
    pub decoupled: Mutex<SpiResult<DecoupledStartResult>>,
    pub sca_status: Mutex<SpiResult<ScaStatusResult>>,
    pub verify: Mutex<SpiResult<VerifyScaResult>>,
    pub confirmation: Mutex<SpiResult<ConfirmationCodeResult>>,
    pub calls: Mutex<Vec<String>>,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self {
            authenticate: Mutex::new(Ok(PsuAuthorisationResult {
                status: PsuAuthorisationStatus::Success,
            })),
            methods: Mutex::new(Ok(vec![sms_method(), photo_method()])),
            code: Mutex::new(Ok(AuthorisationCodeResult {
                selected_method: sms_method(),
                challenge_data: ChallengeData {
                    additional_information: Some("enter the OTP sent to your phone".to_string()),
                    ..ChallengeData::default()
                },
            })),
            decoupled: Mutex::new(Ok(DecoupledStartResult {
                psu_message: Some("confirm in your banking app".to_string()),
            })),
            sca_status: Mutex::new(Ok(ScaStatusResult {
                status: ScaStatus::Started,
                psu_message: None,
            })),
            verify: Mutex::new(Ok(VerifyScaResult {
                parent_status: ConsentStatus::Valid,
            })),
            confirmation: Mutex::new(Ok(ConfirmationCodeResult {
                matched: true,
                parent_status: Some(ConsentStatus::Valid),
            })),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockAdapter {
    pub fn set_methods(&self, methods: Vec<AuthenticationObject>) {
        *self.methods.lock().unwrap() = Ok(methods);
    }

    pub fn set_authenticate_failure(&self) {
        *self.authenticate.lock().unwrap() = Ok(PsuAuthorisationResult {
            status: PsuAuthorisationStatus::Failure,
        });
    }

    pub fn set_verify(&self, result: SpiResult<VerifyScaResult>) {
        *self.verify.lock().unwrap() = result;
    }

    pub fn set_sca_status(&self, result: SpiResult<ScaStatusResult>) {
        *self.sca_status.lock().unwrap() = result;
    }

    pub fn set_decoupled(&self, result: SpiResult<DecoupledStartResult>) {
        *self.decoupled.lock().unwrap() = result;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }
}

#[async_trait::async_trait]
impl AuthorisationAdapter for MockAdapter {
    async fn authenticate_psu(
        &self,
        _ctx: &SpiContextData,
        _authorisation_id: &str,
        _psu: &PsuIdData,
        _credential: &str,
        _object: &SpiBusinessObject,
    ) -> SpiResult<PsuAuthorisationResult> {
        self.record("authenticate_psu");
        self.authenticate.lock().unwrap().clone()
    }

    async fn list_available_sca_methods(
        &self,
        _ctx: &SpiContextData,
        _object: &SpiBusinessObject,
    ) -> SpiResult<Vec<AuthenticationObject>> {
        self.record("list_available_sca_methods");
        self.methods.lock().unwrap().clone()
    }

    async fn request_authorisation_code(
        &self,
        _ctx: &SpiContextData,
        method_id: &str,
        _object: &SpiBusinessObject,
    ) -> SpiResult<AuthorisationCodeResult> {
        self.record(&format!("request_authorisation_code:{}", method_id));
        self.code.lock().unwrap().clone()
    }

    async fn notify_decoupled_start(
        &self,
        _ctx: &SpiContextData,
        _authorisation_id: &str,
        method_id: &str,
        _object: &SpiBusinessObject,
    ) -> SpiResult<DecoupledStartResult> {
        self.record(&format!("notify_decoupled_start:{}", method_id));
        self.decoupled.lock().unwrap().clone()
    }

    async fn get_sca_status(
        &self,
        _ctx: &SpiContextData,
        _current_status: ScaStatus,
        _authorisation_id: &str,
        _object: &SpiBusinessObject,
    ) -> SpiResult<ScaStatusResult> {
        self.record("get_sca_status");
        self.sca_status.lock().unwrap().clone()
    }

    async fn verify_sca_authorisation(
        &self,
        _ctx: &SpiContextData,
        _confirmation: &ScaConfirmation,
        _object: &SpiBusinessObject,
    ) -> SpiResult<VerifyScaResult> {
        self.record("verify_sca_authorisation");
        self.verify.lock().unwrap().clone()
    }

    async fn check_confirmation_code_at_bank(
        &self,
        _ctx: &SpiContextData,
        _code: &str,
        _authorisation_id: &str,
    ) -> SpiResult<ConfirmationCodeResult> {
        self.record("check_confirmation_code_at_bank");
        self.confirmation.lock().unwrap().clone()
    }
}

#[allow(dead_code)]
pub fn technical(message: &str) -> AdapterError {
    AdapterError::technical("TECHNICAL_ERROR", message)
}

pub fn tpp() -> TppInfo {
    TppInfo {
        authorisation_number: TPP.to_string(),
        name: Some("Example TPP".to_string()),
    }
}

pub fn consent(id: &str, psu_ids: &[&str]) -> Parent {
    Parent::new(
        id,
        ParentKind::Consent,
        tpp(),
        psu_ids.iter().map(|p| PsuIdData::new(*p)).collect(),
        AccessScope::AllAvailableAccounts,
        "all-accounts",
    )
}

pub fn payment(id: &str, psu_ids: &[&str]) -> Parent {
    Parent::new(
        id,
        ParentKind::Payment,
        tpp(),
        psu_ids.iter().map(|p| PsuIdData::new(*p)).collect(),
        AccessScope::SingleAccount("DE89370400440532013000".to_string()),
        "sepa-credit-transfers",
    )
}

/// Store + adapter + orchestrator wired for one bank profile.
pub struct Harness {
    pub store: Arc<InMemoryLifecycleStore>,
    pub adapter: Arc<MockAdapter>,
    pub orchestrator: AuthorisationOrchestrator,
}

pub fn harness(profile: BankProfile) -> Harness {
    let store = Arc::new(InMemoryLifecycleStore::new());
    let adapter = Arc::new(MockAdapter::default());
    let orchestrator =
        AuthorisationOrchestrator::new(store.clone(), adapter.clone(), profile);
    Harness {
        store,
        adapter,
        orchestrator,
    }
}
