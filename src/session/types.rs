//! Session state and login outcome types.

use crate::backend::{AccountKind, AuthFailure};
use crate::error::{GatewayError, GatewayResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authentication state of the single backend session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    LoggedOut,
    Authenticating,
    LoggedIn,
    /// The transport dropped after a successful login.
    Disconnected,
}

/// The live, authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub account: String,
    pub kind: AccountKind,
    pub authenticated_at: DateTime<Utc>,
}

impl SessionInfo {
    pub fn is_anonymous(&self) -> bool {
        self.kind == AccountKind::Anonymous
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginResult {
    Ok,
    InvalidCredentials,
    #[serde(rename = "needs_2fa")]
    Needs2fa,
    RateLimited,
    NetworkError,
    NoSavedSession,
}

/// Result of a login or relogin attempt, as returned to RPC clients.
///
/// Refusals are outcomes rather than errors: the call itself succeeded and
/// the client decides what to prompt for next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginOutcome {
    pub result: LoginResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LoginOutcome {
    pub fn ok(account: impl Into<String>) -> Self {
        Self {
            result: LoginResult::Ok,
            account: Some(account.into()),
            message: None,
        }
    }

    pub fn no_saved_session() -> Self {
        Self {
            result: LoginResult::NoSavedSession,
            account: None,
            message: None,
        }
    }

    pub fn from_failure(failure: &AuthFailure) -> Self {
        let (result, message) = match failure {
            AuthFailure::InvalidCredentials => (LoginResult::InvalidCredentials, None),
            AuthFailure::Needs2FA => (LoginResult::Needs2fa, None),
            AuthFailure::RateLimited => (LoginResult::RateLimited, None),
            AuthFailure::Network(message) => (LoginResult::NetworkError, Some(message.clone())),
        };
        Self {
            result,
            account: None,
            message,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result == LoginResult::Ok
    }

    /// Converts a refusal into the matching error, yielding the account name
    /// on success.
    pub fn into_result(self) -> GatewayResult<String> {
        match self.result {
            LoginResult::Ok => Ok(self.account.unwrap_or_default()),
            LoginResult::InvalidCredentials => Err(GatewayError::InvalidCredentials),
            LoginResult::Needs2fa => Err(GatewayError::Needs2FA),
            LoginResult::RateLimited => Err(GatewayError::RateLimited),
            LoginResult::NetworkError => Err(GatewayError::NetworkError(
                self.message.unwrap_or_default(),
            )),
            LoginResult::NoSavedSession => Err(GatewayError::NoSavedSession),
        }
    }
}
