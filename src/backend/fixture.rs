//! File-driven backend for local development and tests.
//!
//! A fixture file lists accounts (with credentials and licenses) and the
//! app/package documents the catalog serves. Session tokens are
//! self-describing so a token saved by one process can resume in another.

use super::{
    AccountKind, AuthFailure, AuthGrant, BackendError, BackendEvent, CatalogBackend, LicenseList,
    LoginRequest,
};
use crate::catalog::{ItemId, ProductInfo, ProductQuery};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

/// Consecutive failed logins after which an account is rate limited.
const MAX_FAILED_ATTEMPTS: u32 = 5;

const EVENT_CHANNEL_CAPACITY: usize = 64;

const TOKEN_NONCE_BYTES: usize = 16;

/// Contents of a fixture file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureData {
    #[serde(default)]
    pub accounts: Vec<FixtureAccount>,
    #[serde(default)]
    pub apps: BTreeMap<ItemId, Value>,
    #[serde(default)]
    pub packages: BTreeMap<ItemId, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureAccount {
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    /// When set, password logins must also carry this code.
    #[serde(default)]
    pub two_factor_code: Option<String>,
    /// Anonymous accounts log in without a password and hold no licenses.
    #[serde(default)]
    pub anonymous: bool,
    #[serde(default)]
    pub apps: BTreeSet<ItemId>,
    #[serde(default)]
    pub packages: BTreeSet<ItemId>,
}

pub struct FixtureBackend {
    data: FixtureData,
    events: broadcast::Sender<BackendEvent>,
    failed_attempts: Mutex<HashMap<String, u32>>,
    injected_failures: Mutex<VecDeque<BackendError>>,
    fetch_delay: Mutex<Duration>,
    auth_delay: Mutex<Duration>,
    product_fetches: AtomicUsize,
    license_fetches: AtomicUsize,
    connected: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FixtureBackend {
    pub fn new(data: FixtureData) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            data,
            events,
            failed_attempts: Mutex::new(HashMap::new()),
            injected_failures: Mutex::new(VecDeque::new()),
            fetch_delay: Mutex::new(Duration::ZERO),
            auth_delay: Mutex::new(Duration::ZERO),
            product_fetches: AtomicUsize::new(0),
            license_fetches: AtomicUsize::new(0),
            connected: AtomicBool::new(false),
        }
    }

    /// Loads a fixture file. `.json` files are read as JSON, anything else
    /// as YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture file: {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let data: FixtureData = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse fixture file: {}", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse fixture file: {}", path.display()))?
        };
        tracing::info!(
            path = %path.display(),
            accounts = data.accounts.len(),
            apps = data.apps.len(),
            packages = data.packages.len(),
            "Loaded backend fixture"
        );
        Ok(Self::new(data))
    }

    /// Delays every product-info fetch, so concurrent callers overlap.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *lock(&self.fetch_delay) = delay;
    }

    /// Delays every authentication and resume call.
    pub fn set_auth_delay(&self, delay: Duration) {
        *lock(&self.auth_delay) = delay;
    }

    /// Makes the next product-info fetch fail with `error`.
    pub fn fail_next_fetch(&self, error: BackendError) {
        lock(&self.injected_failures).push_back(error);
    }

    pub fn product_fetch_count(&self) -> usize {
        self.product_fetches.load(Ordering::SeqCst)
    }

    pub fn license_fetch_count(&self) -> usize {
        self.license_fetches.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Publishes a backend event to every subscriber.
    pub fn emit(&self, event: BackendEvent) {
        if let BackendEvent::Disconnected { .. } = event {
            self.connected.store(false, Ordering::SeqCst);
        }
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn find_account(&self, user: &str) -> Option<&FixtureAccount> {
        self.data
            .accounts
            .iter()
            .find(|account| account.user.eq_ignore_ascii_case(user))
    }

    fn record_failure(&self, user: &str) {
        *lock(&self.failed_attempts)
            .entry(user.to_lowercase())
            .or_insert(0) += 1;
    }

    fn is_rate_limited(&self, user: &str) -> bool {
        lock(&self.failed_attempts)
            .get(&user.to_lowercase())
            .is_some_and(|count| *count >= MAX_FAILED_ATTEMPTS)
    }

    async fn auth_pause(&self) {
        let delay = *lock(&self.auth_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn grant(&self, account: &FixtureAccount, session_token: String) -> AuthGrant {
        lock(&self.failed_attempts).remove(&account.user.to_lowercase());
        self.connected.store(true, Ordering::SeqCst);
        AuthGrant {
            account: account.user.clone(),
            kind: if account.anonymous {
                AccountKind::Anonymous
            } else {
                AccountKind::Individual
            },
            session_token,
        }
    }
}

/// Issues a token of the form `base64url("<account>:<hex nonce>")`.
fn issue_token(account: &str) -> String {
    let nonce: [u8; TOKEN_NONCE_BYTES] = rand::thread_rng().gen();
    let nonce_hex: String = nonce.iter().map(|b| format!("{:02x}", b)).collect();
    URL_SAFE_NO_PAD.encode(format!("{}:{}", account, nonce_hex))
}

/// Account a token was issued to, if it is one of ours.
fn token_account(token: &str) -> Option<String> {
    let decoded = URL_SAFE_NO_PAD.decode(token.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (account, nonce) = text.rsplit_once(':')?;
    let nonce_ok =
        nonce.len() == TOKEN_NONCE_BYTES * 2 && nonce.chars().all(|c| c.is_ascii_hexdigit());
    (nonce_ok && !account.is_empty()).then(|| account.to_string())
}

/// Strips a document down to its change number.
fn metadata_only(document: &Value) -> Value {
    let change_number = document
        .get("_change_number")
        .cloned()
        .unwrap_or(Value::from(0));
    serde_json::json!({ "_change_number": change_number })
}

#[async_trait]
impl CatalogBackend for FixtureBackend {
    async fn authenticate(&self, request: &LoginRequest) -> Result<AuthGrant, AuthFailure> {
        self.auth_pause().await;
        let Some(account) = self.find_account(&request.user) else {
            self.record_failure(&request.user);
            return Err(AuthFailure::InvalidCredentials);
        };

        if self.is_rate_limited(&account.user) {
            return Err(AuthFailure::RateLimited);
        }

        if account.anonymous {
            return Ok(self.grant(account, issue_token(&account.user)));
        }

        if let Some(key) = &request.login_key {
            return match token_account(key) {
                Some(owner) if owner.eq_ignore_ascii_case(&account.user) => {
                    Ok(self.grant(account, key.clone()))
                }
                _ => {
                    self.record_failure(&account.user);
                    Err(AuthFailure::InvalidCredentials)
                }
            };
        }

        if request.password.as_deref() != account.password.as_deref() {
            self.record_failure(&account.user);
            return Err(AuthFailure::InvalidCredentials);
        }

        if let Some(expected) = &account.two_factor_code {
            match &request.two_factor_code {
                None => return Err(AuthFailure::Needs2FA),
                Some(given) if given != expected => {
                    self.record_failure(&account.user);
                    return Err(AuthFailure::InvalidCredentials);
                }
                Some(_) => {}
            }
        }

        Ok(self.grant(account, issue_token(&account.user)))
    }

    async fn resume(&self, account: &str, token: &str) -> Result<AuthGrant, AuthFailure> {
        self.auth_pause().await;
        let Some(fixture_account) = self.find_account(account) else {
            return Err(AuthFailure::InvalidCredentials);
        };
        match token_account(token) {
            Some(owner) if owner.eq_ignore_ascii_case(&fixture_account.user) => {
                Ok(self.grant(fixture_account, token.to_string()))
            }
            _ => Err(AuthFailure::InvalidCredentials),
        }
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn fetch_licenses(&self, account: &str) -> Result<LicenseList, BackendError> {
        self.license_fetches.fetch_add(1, Ordering::SeqCst);
        let fixture_account = self
            .find_account(account)
            .ok_or_else(|| BackendError::Remote(format!("unknown account: {}", account)))?;
        Ok(LicenseList {
            apps: fixture_account.apps.clone(),
            packages: fixture_account.packages.clone(),
        })
    }

    async fn fetch_product_info(
        &self,
        query: &ProductQuery,
    ) -> Result<ProductInfo, BackendError> {
        self.product_fetches.fetch_add(1, Ordering::SeqCst);

        let delay = *lock(&self.fetch_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let injected = lock(&self.injected_failures).pop_front();
        if let Some(error) = injected {
            return Err(error);
        }

        let pick = |source: &BTreeMap<ItemId, Value>,
                    ids: &BTreeSet<ItemId>|
         -> BTreeMap<ItemId, Value> {
            ids.iter()
                .filter_map(|id| {
                    let document = source.get(id)?;
                    let document = if query.meta_data_only {
                        metadata_only(document)
                    } else {
                        document.clone()
                    };
                    Some((*id, document))
                })
                .collect()
        };

        Ok(ProductInfo {
            apps: pick(&self.data.apps, &query.apps),
            packages: pick(&self.data.packages, &query.packages),
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/fixture_tests.rs"]
mod tests;
