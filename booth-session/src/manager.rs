//! Session Manager - single owner of the login session
//!
//! Holds the current [`Session`], persists it through a [`SessionStore`] and
//! publishes every change on a watch channel. Commits write storage first and
//! publish second, under one lock, so observers only see durable states.

use booth_client::{AuthBackend, AuthResponse, RawProfile};
use booth_core::{
    log_operation_error, log_operation_start, log_operation_success, protocol_error,
    validation_error, BoothError, BoothResult, ErrorContext, Registration, Session, User,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::normalize::{decode_stored_user, encode_stored_user, normalize_profile};
use crate::store::{SessionStore, TOKEN_KEY, USER_KEY};

/// Owns the login session of one client
pub struct SessionManager {
    backend: Arc<dyn AuthBackend>,
    store: Arc<dyn SessionStore>,
    /// Latest published snapshot
    state: watch::Sender<Session>,
    /// Bumped whenever the session changes hands; stale async results are discarded
    generation: AtomicU64,
    /// Serializes store writes together with their publish
    commit_lock: Mutex<()>,
}

impl SessionManager {
    /// Create a manager in the `Uninitialized` state. Call [`restore`](Self::restore) next.
    pub fn new(backend: Arc<dyn AuthBackend>, store: Arc<dyn SessionStore>) -> Self {
        let (state, _) = watch::channel(Session::uninitialized());

        Self {
            backend,
            store,
            state,
            generation: AtomicU64::new(0),
            commit_lock: Mutex::new(()),
        }
    }

    /// Snapshot of the current session
    pub fn current_session(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receive every published session. Each value is a complete snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Load the persisted session.
    ///
    /// Never fails: anything unusable in storage is removed and the session
    /// becomes anonymous.
    pub fn restore(&self) -> Session {
        let _guard = self.lock_commits();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(Session::restoring());

        let session = match self.load_persisted() {
            Ok(Some((user, token))) => {
                info!(user_id = %user.id, "Restored stored session");
                Session::authenticated(user, token)
            }
            Ok(None) => {
                debug!("No complete stored session");
                self.clear_store();
                Session::anonymous()
            }
            Err(e) => {
                warn!(error = %e, "Discarding unusable stored session");
                self.clear_store();
                Session::anonymous()
            }
        };

        self.state.send_replace(session.clone());
        session
    }

    /// Log in with email and password and make the result the current session
    pub async fn login(&self, email: &str, password: &str) -> BoothResult<Session> {
        let email = email.trim();
        if email.is_empty() {
            return Err(validation_error!(
                "Email is required",
                "email",
                "session_manager"
            ));
        }
        if password.is_empty() {
            return Err(validation_error!(
                "Password is required",
                "password",
                "session_manager"
            ));
        }
        self.ensure_restored("login")?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        log_operation_start!("login", generation = generation);

        let result = self
            .authenticate(email, password)
            .await
            .and_then(|(user, token)| self.commit_authenticated(generation, "login", user, token));

        match &result {
            Ok(session) => {
                log_operation_success!(
                    "login",
                    user_id = %session.user().map(|u| u.id.as_str()).unwrap_or_default()
                );
            }
            Err(e) => log_failure("login", e),
        }
        result
    }

    /// Clear the session locally and tell the backend in the background.
    ///
    /// The local change is complete when this returns. The returned handle
    /// resolves when the backend notification finished; dropping it detaches
    /// the task. Returns `None` when there was nothing to notify or no tokio
    /// runtime is running.
    pub fn logout(&self) -> Option<JoinHandle<()>> {
        let previous = {
            let _guard = self.lock_commits();
            let previous = self.state.borrow().clone();
            if previous.is_loading() {
                debug!("Ignoring logout before restore");
                return None;
            }

            self.generation.fetch_add(1, Ordering::SeqCst);
            self.clear_store();
            self.state.send_replace(Session::anonymous());
            previous
        };

        let token = previous.token()?.to_string();
        info!(
            user_id = %previous.user().map(|u| u.id.as_str()).unwrap_or_default(),
            "Logged out"
        );

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                debug!("No async runtime, skipping backend logout");
                return None;
            }
        };

        let backend = Arc::clone(&self.backend);
        Some(runtime.spawn(async move {
            match backend.logout(&token).await {
                Ok(()) => debug!("Backend acknowledged logout"),
                Err(e) => warn!(error = %e, "Backend logout failed, local session already cleared"),
            }
        }))
    }

    /// Re-read the profile of the logged-in user.
    ///
    /// A rejected token ends the session. Network trouble or a malformed
    /// answer leaves the session as it is and returns the error. Without a
    /// session this does nothing. Fails with `Superseded` when a login or
    /// logout changed the session while the profile was being fetched.
    pub async fn refresh(&self) -> BoothResult<Session> {
        let (current, generation) = {
            let _guard = self.lock_commits();
            (
                self.current_session(),
                self.generation.load(Ordering::SeqCst),
            )
        };
        let Some(token) = current.token().map(str::to_string) else {
            debug!("Nothing to refresh");
            return Ok(current);
        };
        let previous_email = current.user().map(|user| user.email.clone());

        let result = match self.fetch_profile(&token).await {
            Ok(raw) => normalize_profile(&raw, previous_email.as_deref())
                .and_then(|user| self.commit_authenticated(generation, "refresh", user, token)),
            Err(e @ BoothError::Authentication { .. }) => {
                warn!(error = %e, "Backend rejected the session token");
                self.expire(generation)
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            log_failure("refresh", e);
        }
        result
    }

    /// Create an account. The current session is left untouched.
    pub async fn register(&self, registration: &Registration) -> BoothResult<AuthResponse> {
        for (field, value) in [
            ("name", registration.name.as_str()),
            ("email", registration.email.as_str()),
            ("password", registration.password.as_str()),
        ] {
            if value.trim().is_empty() {
                return Err(validation_error!(
                    format!("{} is required", field),
                    field,
                    "session_manager"
                ));
            }
        }

        log_operation_start!("register", email = %registration.email);
        let response = self.backend.register(registration).await?;
        if !response.success {
            return Err(BoothError::Authentication {
                message: response
                    .message
                    .clone()
                    .unwrap_or_else(|| "Registration failed".to_string()),
                context: ErrorContext::new("session_manager").with_operation("register"),
            });
        }

        log_operation_success!("register", email = %registration.email);
        Ok(response)
    }

    /// Login plus profile lookup, without touching any state
    async fn authenticate(&self, email: &str, password: &str) -> BoothResult<(User, String)> {
        let response = self.backend.login(email, password).await?;
        if !response.success {
            return Err(BoothError::Authentication {
                message: response
                    .message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "Login failed".to_string()),
                context: ErrorContext::new("session_manager")
                    .with_operation("login")
                    .with_suggestion("Check the email address and password"),
            });
        }

        let token = response
            .bearer_token()
            .ok_or_else(|| protocol_error!("Login response carried no token", "session_manager"))?
            .to_string();

        let raw = match self.fetch_profile(&token).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Profile lookup failed, using identity from login response");
                response.embedded_profile().ok_or_else(|| {
                    protocol_error!(
                        "Login response carried no user identity",
                        "session_manager"
                    )
                })?
            }
        };

        let user = normalize_profile(&raw, Some(email))?;
        Ok((user, token))
    }

    /// `GET /auth/me`, requiring a profile with an id
    async fn fetch_profile(&self, token: &str) -> BoothResult<RawProfile> {
        let response = self.backend.current_user(token).await?;
        if !response.success {
            return Err(BoothError::Authentication {
                message: response
                    .message
                    .unwrap_or_else(|| "Session is no longer valid".to_string()),
                context: ErrorContext::new("session_manager").with_operation("current_user"),
            });
        }

        match response.data {
            Some(profile) if profile.identifier().is_some() => Ok(profile),
            _ => Err(protocol_error!(
                "Profile response carried no user id",
                "session_manager"
            )),
        }
    }

    fn commit_authenticated(
        &self,
        generation: u64,
        operation: &str,
        user: User,
        token: String,
    ) -> BoothResult<Session> {
        let user_json = encode_stored_user(&user)?;

        let _guard = self.lock_commits();
        self.check_generation(generation, operation)?;
        self.store
            .set_all(&[(TOKEN_KEY, token.as_str()), (USER_KEY, user_json.as_str())])?;
        // Anything still in flight was started against the replaced session
        self.generation.fetch_add(1, Ordering::SeqCst);

        let session = Session::authenticated(user, token);
        self.state.send_replace(session.clone());
        Ok(session)
    }

    /// End a session whose token the backend no longer accepts
    fn expire(&self, generation: u64) -> BoothResult<Session> {
        let _guard = self.lock_commits();
        self.check_generation(generation, "refresh")?;

        self.generation.fetch_add(1, Ordering::SeqCst);
        self.clear_store();
        let session = Session::anonymous();
        self.state.send_replace(session.clone());
        Ok(session)
    }

    fn check_generation(&self, generation: u64, operation: &str) -> BoothResult<()> {
        if self.generation.load(Ordering::SeqCst) == generation {
            return Ok(());
        }

        debug!(operation, "Discarding result of superseded operation");
        Err(BoothError::Superseded {
            operation: operation.to_string(),
            context: ErrorContext::new("session_manager").with_operation(operation),
        })
    }

    fn ensure_restored(&self, operation: &str) -> BoothResult<()> {
        if self.state.borrow().is_loading() {
            return Err(BoothError::Validation {
                message: "Session has not been restored yet".to_string(),
                field: None,
                context: ErrorContext::new("session_manager")
                    .with_operation(operation)
                    .with_suggestion("Call restore() before logging in"),
            });
        }
        Ok(())
    }

    fn load_persisted(&self) -> BoothResult<Option<(User, String)>> {
        let token = self.store.get(TOKEN_KEY)?;
        let user = self.store.get(USER_KEY)?;

        match (token, user) {
            (Some(token), Some(user)) if !token.trim().is_empty() => {
                Ok(Some((decode_stored_user(&user)?, token)))
            }
            _ => Ok(None),
        }
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.remove_all(&[TOKEN_KEY, USER_KEY]) {
            e.log();
        }
    }

    fn lock_commits(&self) -> MutexGuard<'_, ()> {
        self.commit_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn log_failure(operation: &str, error: &BoothError) {
    if error.is_routine() {
        warn!(operation, error = %error, "Operation did not complete");
    } else {
        log_operation_error!(operation, error);
    }
}
