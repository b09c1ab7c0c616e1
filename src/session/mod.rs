//! The single authenticated backend session.
//!
//! [`SessionManager`] is the only component that issues authentication
//! commands on the backend. Everything else reads its state through
//! [`SessionManager::require_session`] or a [`SessionManager::subscribe`]
//! receiver.

pub mod credentials;
pub mod types;

use crate::backend::{AccountKind, AuthFailure, AuthGrant, CatalogBackend, LoginRequest};
use crate::error::{GatewayError, GatewayResult};
use chrono::Utc;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

pub use credentials::{CredentialStore, SavedSession};
pub use types::{AuthState, LoginOutcome, LoginResult, SessionInfo};

pub struct SessionManager {
    backend: Arc<dyn CatalogBackend>,
    credentials: RwLock<CredentialStore>,
    session: RwLock<Option<SessionInfo>>,
    state: watch::Sender<AuthState>,
    /// Held for the whole of a login, relogin or logout.
    login_gate: Mutex<()>,
    auth_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn CatalogBackend>,
        credentials: CredentialStore,
        auth_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::LoggedOut);
        Self {
            backend,
            credentials: RwLock::new(credentials),
            session: RwLock::new(None),
            state,
            login_gate: Mutex::new(()),
            auth_timeout,
        }
    }

    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state() == AuthState::LoggedIn
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// The live session, or `NotAuthenticated` in any state but `LoggedIn`.
    pub fn require_session(&self) -> GatewayResult<SessionInfo> {
        if !self.is_logged_in() {
            return Err(GatewayError::NotAuthenticated);
        }
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(GatewayError::NotAuthenticated)
    }

    pub fn credential_dir(&self) -> PathBuf {
        self.store().dir().to_path_buf()
    }

    /// Points the credential store at `path`, creating it if needed.
    pub fn set_credential_location(&self, path: &Path) -> bool {
        match CredentialStore::open(path) {
            Ok(store) => {
                info!(path = %path.display(), "Credential location changed");
                *self
                    .credentials
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = store;
                true
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Cannot use credential location");
                false
            }
        }
    }

    /// True if the last user has a readable, well-formed saved token.
    pub fn relogin_available(&self) -> bool {
        match self.store().load_saved(None) {
            Ok(saved) => saved.is_some(),
            Err(err) => {
                warn!(error = %err, "Failed to read saved session");
                false
            }
        }
    }

    pub async fn login(&self, request: LoginRequest) -> GatewayResult<LoginOutcome> {
        let _gate = self
            .login_gate
            .try_lock()
            .map_err(|_| GatewayError::LoginInProgress)?;

        info!(user = %request.user, "Logging in");
        self.set_state(AuthState::Authenticating);
        let result = self
            .with_auth_timeout(self.backend.authenticate(&request))
            .await;
        Ok(self.complete(result))
    }

    /// Resumes the saved session of `account`, or of the last user.
    pub async fn relogin_from_saved(&self, account: Option<&str>) -> GatewayResult<LoginOutcome> {
        let _gate = self
            .login_gate
            .try_lock()
            .map_err(|_| GatewayError::LoginInProgress)?;

        let loaded = self.store().load_saved(account);
        let saved = match loaded {
            Ok(Some(saved)) => saved,
            Ok(None) => {
                info!(account = ?account, "No saved session");
                return Ok(LoginOutcome::no_saved_session());
            }
            Err(err) => {
                warn!(error = %err, "Failed to read saved session");
                return Ok(LoginOutcome::no_saved_session());
            }
        };

        info!(account = %saved.account, "Resuming saved session");
        self.set_state(AuthState::Authenticating);
        let result = self
            .with_auth_timeout(self.backend.resume(&saved.account, &saved.token))
            .await;
        Ok(self.complete(result))
    }

    /// Tears down the session. Waits for an in-flight login to finish first.
    pub async fn logout(&self) {
        let _gate = self.login_gate.lock().await;
        let previous = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if self.state() != AuthState::LoggedOut {
            self.backend.disconnect().await;
            self.set_state(AuthState::LoggedOut);
        }
        if let Some(session) = previous {
            info!(account = %session.account, "Logged out");
        }
    }

    /// Records a transport loss. Only a live session can be disconnected; the
    /// next login or relogin is the retry path.
    pub fn mark_disconnected(&self, reason: &str) {
        let changed = self.state.send_if_modified(|state| {
            if *state == AuthState::LoggedIn {
                *state = AuthState::Disconnected;
                true
            } else {
                false
            }
        });
        if changed {
            self.session
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            warn!(reason, "Backend connection lost");
        }
    }

    fn store(&self) -> CredentialStore {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, next: AuthState) {
        self.state.send_if_modified(|state| {
            let changed = *state != next;
            *state = next;
            changed
        });
        debug!(state = ?next, "Session state");
    }

    async fn with_auth_timeout<F>(&self, call: F) -> Result<AuthGrant, AuthFailure>
    where
        F: Future<Output = Result<AuthGrant, AuthFailure>>,
    {
        match tokio::time::timeout(self.auth_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AuthFailure::Network(format!(
                "authentication timed out after {}s",
                self.auth_timeout.as_secs_f64()
            ))),
        }
    }

    fn complete(&self, result: Result<AuthGrant, AuthFailure>) -> LoginOutcome {
        match result {
            Ok(grant) => {
                // Anonymous sessions have nothing worth resuming.
                if grant.kind == AccountKind::Individual {
                    if let Err(err) = self.store().save(&grant.account, &grant.session_token) {
                        warn!(
                            account = %grant.account,
                            error = %err,
                            "Failed to persist session token"
                        );
                    }
                }
                *self
                    .session
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(SessionInfo {
                    account: grant.account.clone(),
                    kind: grant.kind,
                    authenticated_at: Utc::now(),
                });
                self.set_state(AuthState::LoggedIn);
                info!(account = %grant.account, kind = ?grant.kind, "Logged in");
                LoginOutcome::ok(grant.account)
            }
            Err(failure) => {
                self.session
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                let next = match failure {
                    AuthFailure::Network(_) => AuthState::Disconnected,
                    _ => AuthState::LoggedOut,
                };
                self.set_state(next);
                warn!(error = %failure, "Authentication failed");
                LoginOutcome::from_failure(&failure)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
