//! Error taxonomy shared by every gateway component.
//!
//! Components convert backend and transport failures into these variants at
//! their boundary; the RPC layer is the only place they are turned into wire
//! errors (see [`GatewayError::code`]).

use crate::rpc::protocol::error_codes;
use std::time::Duration;

/// Errors surfaced by gateway operations.
///
/// `Clone` because a single failed catalog fetch is handed to every caller
/// that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("two-factor code required")]
    Needs2FA,
    #[error("rate limited by backend")]
    RateLimited,
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("remote error: {0}")]
    RemoteError(String),
    #[error("remote call timed out after {}s", .0.as_secs_f64())]
    RemoteTimeout(Duration),
    #[error("no saved session")]
    NoSavedSession,
    #[error("login already in progress")]
    LoginInProgress,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("entitlements have not been refreshed for this session")]
    EntitlementsStale,
    #[error("no license available for app {0}")]
    NotEntitled(u32),
    #[error("invalid vdf: {0}")]
    Vdf(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => error_codes::INVALID_PARAMS,
            Self::NotAuthenticated => error_codes::NOT_AUTHENTICATED,
            Self::InvalidCredentials => error_codes::INVALID_CREDENTIALS,
            Self::Needs2FA => error_codes::NEEDS_2FA,
            Self::RateLimited => error_codes::RATE_LIMITED,
            Self::NetworkError(_) => error_codes::NETWORK_ERROR,
            Self::RemoteError(_) => error_codes::REMOTE_ERROR,
            Self::RemoteTimeout(_) => error_codes::REMOTE_TIMEOUT,
            Self::NoSavedSession => error_codes::NO_SAVED_SESSION,
            Self::LoginInProgress => error_codes::LOGIN_IN_PROGRESS,
            Self::EntitlementsStale => error_codes::ENTITLEMENTS_STALE,
            Self::NotEntitled(_) => error_codes::NOT_ENTITLED,
            Self::Vdf(_) | Self::Io(_) => error_codes::FILE_ERROR,
            Self::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    /// Stable machine-readable name, sent as `error.data.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "NotAuthenticated",
            Self::InvalidCredentials => "InvalidCredentials",
            Self::Needs2FA => "Needs2FA",
            Self::RateLimited => "RateLimited",
            Self::NetworkError(_) => "NetworkError",
            Self::RemoteError(_) => "RemoteError",
            Self::RemoteTimeout(_) => "RemoteTimeout",
            Self::NoSavedSession => "NoSavedSession",
            Self::LoginInProgress => "LoginInProgress",
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::MethodNotFound(_) => "MethodNotFound",
            Self::InvalidParams(_) => "InvalidParams",
            Self::EntitlementsStale => "EntitlementsStale",
            Self::NotEntitled(_) => "NotEntitled",
            Self::Vdf(_) => "Vdf",
            Self::Io(_) => "Io",
            Self::Internal(_) => "Internal",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
