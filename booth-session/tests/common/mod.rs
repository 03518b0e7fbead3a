//! Test doubles for session manager tests

#![allow(dead_code)]

use async_trait::async_trait;
use booth_client::{AuthBackend, AuthResponse, ProfileResponse, RawProfile};
use booth_core::{
    network_error, BoothError, BoothResult, ErrorContext, Registration,
};
use booth_session::{MemorySessionStore, SessionStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Ways a fake endpoint can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Transport error, nothing reached the backend
    Network,
    /// 401 from the backend
    Unauthorized,
    /// 500 from the backend
    ServerError,
    /// 200 with `success: false`
    NotSuccess,
}

impl Failure {
    fn into_error(self, operation: &str) -> BoothError {
        match self {
            Failure::Network => network_error!(format!("{} unreachable", operation), "fake_backend"),
            Failure::Unauthorized => BoothError::Authentication {
                message: "Not authorized to access this route".to_string(),
                context: ErrorContext::new("fake_backend").with_operation(operation),
            },
            Failure::ServerError | Failure::NotSuccess => BoothError::Api {
                message: "Internal Server Error".to_string(),
                status: 500,
                context: ErrorContext::new("fake_backend").with_operation(operation),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeAccount {
    pub password: String,
    pub token: String,
    pub profile: RawProfile,
}

/// In-memory auth backend with scriptable failures
#[derive(Default)]
pub struct FakeBackend {
    accounts: Mutex<HashMap<String, FakeAccount>>,
    login_body: Mutex<Option<AuthResponse>>,
    login_failure: Mutex<Option<Failure>>,
    me_failure: Mutex<Option<Failure>>,
    logout_failure: Mutex<Option<Failure>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    me_gates: Mutex<HashMap<String, Arc<Notify>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that knows Ann (`a@x.com` / `secret`, token `T1`, admin)
    pub fn with_ann() -> Self {
        let backend = Self::new();
        backend.add_account("a@x.com", "secret", "T1", ann_profile());
        backend
    }

    pub fn add_account(&self, email: &str, password: &str, token: &str, profile: RawProfile) {
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            FakeAccount {
                password: password.to_string(),
                token: token.to_string(),
                profile,
            },
        );
    }

    pub fn set_profile(&self, email: &str, profile: RawProfile) {
        if let Some(account) = self.accounts.lock().unwrap().get_mut(email) {
            account.profile = profile;
        }
    }

    /// Answer every login with this body, whatever the credentials
    pub fn set_login_body(&self, body: AuthResponse) {
        *self.login_body.lock().unwrap() = Some(body);
    }

    pub fn fail_login(&self, failure: Failure) {
        *self.login_failure.lock().unwrap() = Some(failure);
    }

    pub fn fail_me(&self, failure: Option<Failure>) {
        *self.me_failure.lock().unwrap() = failure;
    }

    pub fn fail_logout(&self, failure: Failure) {
        *self.logout_failure.lock().unwrap() = Some(failure);
    }

    /// Hold logins for `email` until the returned handle is notified
    pub fn gate_login(&self, email: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(email.to_string(), gate.clone());
        gate
    }

    /// Hold profile lookups for `token` until the returned handle is notified
    pub fn gate_me(&self, token: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.me_gates
            .lock()
            .unwrap()
            .insert(token.to_string(), gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AuthBackend for FakeBackend {
    async fn login(&self, email: &str, password: &str) -> BoothResult<AuthResponse> {
        self.record(format!("login {}", email));

        let gate = self.gates.lock().unwrap().get(email).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if let Some(failure) = *self.login_failure.lock().unwrap() {
            return Err(failure.into_error("login"));
        }
        if let Some(body) = self.login_body.lock().unwrap().clone() {
            return Ok(body);
        }

        let account = self.accounts.lock().unwrap().get(email).cloned();
        match account {
            Some(account) if account.password == password => Ok(AuthResponse {
                success: true,
                token: Some(account.token),
                ..Default::default()
            }),
            _ => Err(BoothError::Authentication {
                message: "Invalid credentials".to_string(),
                context: ErrorContext::new("fake_backend").with_operation("login"),
            }),
        }
    }

    async fn current_user(&self, token: &str) -> BoothResult<ProfileResponse> {
        self.record(format!("me {}", token));

        let gate = self.me_gates.lock().unwrap().get(token).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        match *self.me_failure.lock().unwrap() {
            Some(Failure::NotSuccess) => {
                return Ok(ProfileResponse {
                    success: false,
                    data: None,
                    message: Some("User not found".to_string()),
                })
            }
            Some(failure) => return Err(failure.into_error("current_user")),
            None => {}
        }

        let profile = self
            .accounts
            .lock()
            .unwrap()
            .values()
            .find(|account| account.token == token)
            .map(|account| account.profile.clone());

        match profile {
            Some(profile) => Ok(ProfileResponse {
                success: true,
                data: Some(profile),
                message: None,
            }),
            None => Err(Failure::Unauthorized.into_error("current_user")),
        }
    }

    async fn logout(&self, token: &str) -> BoothResult<()> {
        self.record(format!("logout {}", token));

        match *self.logout_failure.lock().unwrap() {
            Some(failure) => Err(failure.into_error("logout")),
            None => Ok(()),
        }
    }

    async fn register(&self, registration: &Registration) -> BoothResult<AuthResponse> {
        self.record(format!("register {}", registration.email));

        if self.accounts.lock().unwrap().contains_key(&registration.email) {
            return Ok(AuthResponse {
                success: false,
                message: Some("Email already registered".to_string()),
                ..Default::default()
            });
        }

        let id = format!("u{}", self.accounts.lock().unwrap().len() + 1);
        let token = format!("T-{}", id);
        let profile = RawProfile {
            object_id: Some(id),
            name: Some(registration.name.clone()),
            email: Some(registration.email.clone()),
            role: Some(registration.role.to_string()),
            tel: Some(registration.tel.clone()),
            ..Default::default()
        };
        self.add_account(
            &registration.email,
            &registration.password,
            &token,
            profile.clone(),
        );

        Ok(AuthResponse {
            success: true,
            token: Some(token),
            profile,
            ..Default::default()
        })
    }
}

pub fn ann_profile() -> RawProfile {
    RawProfile {
        object_id: Some("u1".to_string()),
        name: Some("Ann".to_string()),
        email: Some("a@x.com".to_string()),
        role: Some("admin".to_string()),
        tel: Some("0812345678".to_string()),
        created_at: Some("2025-01-15T08:30:00.000Z".to_string()),
        ..Default::default()
    }
}

/// Memory store whose writes can be switched off
#[derive(Default)]
pub struct FlakyStore {
    inner: MemorySessionStore,
    fail_writes: AtomicBool,
    fail_removes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    fn storage_error(operation: &str) -> BoothError {
        BoothError::Storage {
            message: "disk full".to_string(),
            source: None,
            context: ErrorContext::new("flaky_store").with_operation(operation),
        }
    }
}

impl SessionStore for FlakyStore {
    fn get(&self, key: &str) -> BoothResult<Option<String>> {
        self.inner.get(key)
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> BoothResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::storage_error("set_all"));
        }
        self.inner.set_all(entries)
    }

    fn remove_all(&self, keys: &[&str]) -> BoothResult<()> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(Self::storage_error("remove_all"));
        }
        self.inner.remove_all(keys)
    }
}
