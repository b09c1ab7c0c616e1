//! Entitlements of the live session.
//!
//! Membership checks never refresh implicitly: [`LicenseResolver::is_entitled`]
//! fails with `EntitlementsStale` until [`LicenseResolver::ensure_fresh`] or
//! [`LicenseResolver::refresh_entitlements`] has produced a fresh set for the
//! current account.

use crate::backend::{AccountKind, CatalogBackend};
use crate::catalog::ItemId;
use crate::error::{GatewayError, GatewayResult};
use crate::session::{SessionInfo, SessionManager};
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Items one account is licensed for, as of `fetched_at`.
#[derive(Debug, Clone)]
pub struct EntitlementSet {
    pub account: String,
    pub kind: AccountKind,
    pub apps: BTreeSet<ItemId>,
    pub packages: BTreeSet<ItemId>,
    pub fetched_at: Instant,
}

impl EntitlementSet {
    fn anonymous(account: &str) -> Self {
        Self {
            account: account.to_string(),
            kind: AccountKind::Anonymous,
            apps: BTreeSet::new(),
            packages: BTreeSet::new(),
            fetched_at: Instant::now(),
        }
    }

    /// Anonymous sets never go stale.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.kind == AccountKind::Anonymous || self.fetched_at.elapsed() < max_age
    }
}

pub struct LicenseResolver {
    session: Arc<SessionManager>,
    backend: Arc<dyn CatalogBackend>,
    max_age: Duration,
    fetch_timeout: Duration,
    current: RwLock<Option<Arc<EntitlementSet>>>,
    refresh_lock: Mutex<()>,
}

impl LicenseResolver {
    pub fn new(
        session: Arc<SessionManager>,
        backend: Arc<dyn CatalogBackend>,
        max_age: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            session,
            backend,
            max_age,
            fetch_timeout,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Replaces the entitlement set with a fresh one from the backend.
    pub async fn refresh_entitlements(&self) -> GatewayResult<Arc<EntitlementSet>> {
        let session = self.session.require_session()?;
        let _guard = self.refresh_lock.lock().await;
        self.refresh_for(&session).await
    }

    /// The current set, refreshed first if missing or stale.
    pub async fn ensure_fresh(&self) -> GatewayResult<Arc<EntitlementSet>> {
        let session = self.session.require_session()?;
        if let Some(set) = self.usable(&session) {
            return Ok(set);
        }
        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(set) = self.usable(&session) {
            return Ok(set);
        }
        self.refresh_for(&session).await
    }

    /// Whether the live session may query `app`.
    pub fn is_entitled(&self, app: ItemId) -> GatewayResult<bool> {
        let session = self.session.require_session()?;
        if session.is_anonymous() {
            return Ok(false);
        }
        let set = self
            .usable(&session)
            .ok_or(GatewayError::EntitlementsStale)?;
        Ok(set.apps.contains(&app))
    }

    /// Sorted app IDs the live session is licensed for.
    pub async fn licensed_app_ids(&self) -> GatewayResult<Vec<ItemId>> {
        let set = self.ensure_fresh().await?;
        Ok(set.apps.iter().copied().collect())
    }

    pub fn current(&self) -> Option<Arc<EntitlementSet>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn invalidate(&self) {
        let dropped = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(set) = dropped {
            debug!(account = %set.account, "Entitlements invalidated");
        }
    }

    fn usable(&self, session: &SessionInfo) -> Option<Arc<EntitlementSet>> {
        self.current()
            .filter(|set| set.account == session.account && set.is_fresh(self.max_age))
    }

    async fn refresh_for(&self, session: &SessionInfo) -> GatewayResult<Arc<EntitlementSet>> {
        let set = if session.is_anonymous() {
            EntitlementSet::anonymous(&session.account)
        } else {
            let licenses = tokio::time::timeout(
                self.fetch_timeout,
                self.backend.fetch_licenses(&session.account),
            )
            .await
            .map_err(|_| GatewayError::RemoteTimeout(self.fetch_timeout))?
            .map_err(GatewayError::from)?;
            EntitlementSet {
                account: session.account.clone(),
                kind: session.kind,
                apps: licenses.apps,
                packages: licenses.packages,
                fetched_at: Instant::now(),
            }
        };

        // The session may have ended or changed hands during the fetch.
        let live = self.session.require_session()?;
        if live.account != session.account {
            return Err(GatewayError::NotAuthenticated);
        }

        let set = Arc::new(set);
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(set.clone());
        info!(
            account = %set.account,
            apps = set.apps.len(),
            packages = set.packages.len(),
            "Entitlements refreshed"
        );
        Ok(set)
    }
}
