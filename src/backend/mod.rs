//! Remote catalog/licensing backend.
//!
//! The wire protocol to the real distribution network is not implemented
//! here; the gateway only talks to a [`CatalogBackend`]. [`FixtureBackend`]
//! serves accounts and documents from a local file.

pub mod fixture;

use crate::catalog::{ItemId, ProductInfo, ProductQuery};
use crate::error::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio::sync::broadcast;

pub use fixture::{FixtureBackend, FixtureData};

/// Parameters of a login attempt.
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Previously issued session token, used instead of a password.
    #[serde(default)]
    pub login_key: Option<String>,
    /// Code sent by e-mail guard.
    #[serde(default)]
    pub auth_code: Option<String>,
    /// Code from a mobile authenticator.
    #[serde(default)]
    pub two_factor_code: Option<String>,
    #[serde(default)]
    pub login_id: Option<u32>,
}

impl LoginRequest {
    pub fn with_password(user: &str, password: &str) -> Self {
        Self {
            user: user.to_string(),
            password: Some(password.to_string()),
            ..Self::default()
        }
    }
}

// Secrets never reach the logs.
impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("login_key", &self.login_key.as_ref().map(|_| "<redacted>"))
            .field("auth_code", &self.auth_code.is_some())
            .field("two_factor_code", &self.two_factor_code.is_some())
            .field("login_id", &self.login_id)
            .finish()
    }
}

/// Whether a session belongs to a personal account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    #[default]
    Individual,
    Anonymous,
}

/// Successful authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub account: String,
    pub kind: AccountKind,
    /// Opaque token that can resume the session later.
    pub session_token: String,
}

/// Why the backend refused an authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("two-factor code required")]
    Needs2FA,
    #[error("too many login attempts")]
    RateLimited,
    #[error("network error: {0}")]
    Network(String),
}

impl From<AuthFailure> for GatewayError {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::InvalidCredentials => GatewayError::InvalidCredentials,
            AuthFailure::Needs2FA => GatewayError::Needs2FA,
            AuthFailure::RateLimited => GatewayError::RateLimited,
            AuthFailure::Network(message) => GatewayError::NetworkError(message),
        }
    }
}

/// Failure of a licensing or catalog call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    Remote(String),
}

impl From<BackendError> for GatewayError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Network(message) => GatewayError::NetworkError(message),
            BackendError::Remote(message) => GatewayError::RemoteError(message),
        }
    }
}

/// Licenses held by an account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LicenseList {
    pub apps: BTreeSet<ItemId>,
    pub packages: BTreeSet<ItemId>,
}

/// Asynchronous notifications from the backend connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// The transport dropped.
    Disconnected { reason: String },
    /// Catalog data changed upstream; cached product info is outdated.
    ChangesDetected {
        apps: Vec<ItemId>,
        packages: Vec<ItemId>,
    },
}

/// The remote authentication, licensing and catalog service.
///
/// Only the session manager calls the authentication methods.
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    async fn authenticate(&self, request: &LoginRequest) -> Result<AuthGrant, AuthFailure>;

    /// Resumes a session from a previously issued token.
    async fn resume(&self, account: &str, token: &str) -> Result<AuthGrant, AuthFailure>;

    async fn disconnect(&self);

    async fn fetch_licenses(&self, account: &str) -> Result<LicenseList, BackendError>;

    async fn fetch_product_info(&self, query: &ProductQuery)
        -> Result<ProductInfo, BackendError>;

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_debug_redacts_secrets() {
        let mut request = LoginRequest::with_password("alice", "hunter2");
        request.login_key = Some("secret-token".to_string());
        let debug = format!("{:?}", request);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn test_login_request_rejects_unknown_fields() {
        let value = serde_json::json!({"user": "alice", "pasword": "x"});
        assert!(serde_json::from_value::<LoginRequest>(value).is_err());
    }

    #[test]
    fn test_failures_map_to_taxonomy() {
        assert_eq!(
            GatewayError::from(AuthFailure::Needs2FA),
            GatewayError::Needs2FA
        );
        assert_eq!(
            GatewayError::from(BackendError::Remote("boom".into())),
            GatewayError::RemoteError("boom".into())
        );
    }
}
