//! Typed requests for every RPC method.
//!
//! Params may be positional (`[..]`) or named (`{..}`). Positional params are
//! mapped onto the method's parameter names in order; `null` entries count as
//! omitted. Unknown named params are rejected.

use crate::backend::LoginRequest;
use crate::catalog::{ItemId, ProductQuery};
use crate::error::{GatewayError, GatewayResult};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

/// Every method name the gateway answers to.
pub const METHODS: &[&str] = &[
    "is_logged_in",
    "set_credential_location",
    "relogin_available",
    "relogin",
    "login",
    "logout",
    "get_product_info",
    "get_product_name",
    "list_apps",
    "load_vdf",
];

const LOGIN_PARAMS: &[&str] = &[
    "user",
    "password",
    "login_key",
    "auth_code",
    "two_factor_code",
    "login_id",
];

const PRODUCT_INFO_PARAMS: &[&str] = &[
    "apps",
    "packages",
    "meta_data_only",
    "raw",
    "auto_access_tokens",
    "timeout",
    "games_only",
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductInfoParams {
    #[serde(default, deserialize_with = "item_ids")]
    pub apps: Vec<ItemId>,
    #[serde(default, deserialize_with = "item_ids")]
    pub packages: Vec<ItemId>,
    #[serde(default)]
    pub meta_data_only: bool,
    /// Forces untouched backend documents even when `games_only` is set.
    #[serde(default)]
    pub raw: bool,
    #[serde(default = "default_true")]
    pub auto_access_tokens: bool,
    /// Seconds to wait for the backend.
    #[serde(default)]
    pub timeout: Option<f64>,
    /// Return only the `common` section of game apps.
    #[serde(default)]
    pub games_only: bool,
}

impl Default for ProductInfoParams {
    fn default() -> Self {
        Self {
            apps: Vec::new(),
            packages: Vec::new(),
            meta_data_only: false,
            raw: false,
            auto_access_tokens: true,
            timeout: None,
            games_only: false,
        }
    }
}

impl ProductInfoParams {
    pub fn query(&self) -> ProductQuery {
        ProductQuery::new(self.apps.iter().copied(), self.packages.iter().copied())
            .with_meta_data_only(self.meta_data_only)
            .with_auto_access_tokens(self.auto_access_tokens)
    }

    /// Whether documents are reduced to the `common` sections of games.
    pub fn reduces_documents(&self) -> bool {
        self.games_only && !self.raw && !self.meta_data_only
    }

    pub fn wait(&self) -> GatewayResult<Option<Duration>> {
        self.timeout.map(seconds).transpose()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoParams {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PathParams {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProductNameParams {
    #[serde(deserialize_with = "item_ids")]
    apps: Vec<ItemId>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReloginParams {
    #[serde(default)]
    user: Option<String>,
}

/// A validated call to one gateway operation.
#[derive(Debug, Clone)]
pub enum GatewayRequest {
    IsLoggedIn,
    SetCredentialLocation { path: PathBuf },
    ReloginAvailable,
    Relogin { user: Option<String> },
    Login(LoginRequest),
    Logout,
    GetProductInfo(ProductInfoParams),
    GetProductName { apps: Vec<ItemId> },
    ListApps,
    LoadVdf { path: PathBuf },
}

impl GatewayRequest {
    pub fn parse(method: &str, params: Option<Value>) -> GatewayResult<Self> {
        let request = match method {
            "is_logged_in" => {
                decode::<NoParams>(params, &[])?;
                Self::IsLoggedIn
            }
            "set_credential_location" => {
                let PathParams { path } = decode(params, &["path"])?;
                Self::SetCredentialLocation { path }
            }
            "relogin_available" => {
                decode::<NoParams>(params, &[])?;
                Self::ReloginAvailable
            }
            "relogin" => {
                let ReloginParams { user } = decode(params, &["user"])?;
                Self::Relogin { user }
            }
            "login" => Self::Login(decode(params, LOGIN_PARAMS)?),
            "logout" => {
                decode::<NoParams>(params, &[])?;
                Self::Logout
            }
            "get_product_info" => {
                let params: ProductInfoParams = decode(params, PRODUCT_INFO_PARAMS)?;
                params.wait()?;
                Self::GetProductInfo(params)
            }
            "get_product_name" => {
                let ProductNameParams { apps } = decode(params, &["apps"])?;
                Self::GetProductName { apps }
            }
            "list_apps" => {
                decode::<NoParams>(params, &[])?;
                Self::ListApps
            }
            "load_vdf" => {
                let PathParams { path } = decode(params, &["path"])?;
                Self::LoadVdf { path }
            }
            other => return Err(GatewayError::MethodNotFound(other.to_string())),
        };
        Ok(request)
    }

    pub fn method(&self) -> &'static str {
        match self {
            Self::IsLoggedIn => "is_logged_in",
            Self::SetCredentialLocation { .. } => "set_credential_location",
            Self::ReloginAvailable => "relogin_available",
            Self::Relogin { .. } => "relogin",
            Self::Login(_) => "login",
            Self::Logout => "logout",
            Self::GetProductInfo(_) => "get_product_info",
            Self::GetProductName { .. } => "get_product_name",
            Self::ListApps => "list_apps",
            Self::LoadVdf { .. } => "load_vdf",
        }
    }
}

fn decode<T: DeserializeOwned>(params: Option<Value>, names: &[&str]) -> GatewayResult<T> {
    let named = match params {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(Value::Array(values)) => {
            if values.len() > names.len() {
                return Err(GatewayError::InvalidParams(format!(
                    "expected at most {} positional params, got {}",
                    names.len(),
                    values.len()
                )));
            }
            names
                .iter()
                .zip(values)
                .filter(|(_, value)| !value.is_null())
                .map(|(name, value)| (name.to_string(), value))
                .collect()
        }
        Some(_) => {
            return Err(GatewayError::InvalidParams(
                "params must be an array or an object".to_string(),
            ))
        }
    };
    serde_json::from_value(Value::Object(named))
        .map_err(|err| GatewayError::InvalidParams(err.to_string()))
}

fn default_true() -> bool {
    true
}

fn seconds(value: f64) -> GatewayResult<Duration> {
    if !(value.is_finite() && value > 0.0) {
        return Err(GatewayError::InvalidParams(format!(
            "timeout must be a positive number of seconds, got {}",
            value
        )));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|err| GatewayError::InvalidParams(format!("invalid timeout: {}", err)))
}

/// Item IDs as numbers or numeric strings.
fn item_ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<ItemId>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(ItemId),
        Text(String),
    }

    Vec::<RawId>::deserialize(deserializer)?
        .into_iter()
        .map(|raw| match raw {
            RawId::Number(id) => Ok(id),
            RawId::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("invalid item id: {:?}", text))),
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/methods_tests.rs"]
mod tests;
