//! Process-wide gateway state and the operations RPC methods map onto.
//!
//! One [`GatewayContext`] is built at startup and shared (behind an `Arc`)
//! with every connection and request task.

use crate::backend::{BackendEvent, CatalogBackend, LoginRequest};
use crate::catalog::{filter, CatalogCache, ItemId, ProductQuery};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::license::LicenseResolver;
use crate::rpc::methods::ProductInfoParams;
use crate::session::{CredentialStore, LoginOutcome, SessionManager};
use crate::vdf;
use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct GatewayContext {
    backend: Arc<dyn CatalogBackend>,
    session: Arc<SessionManager>,
    licenses: LicenseResolver,
    cache: CatalogCache,
}

impl GatewayContext {
    pub fn new(config: &GatewayConfig, backend: Arc<dyn CatalogBackend>) -> Result<Arc<Self>> {
        let credential_dir = config.credentials.resolve_location()?;
        let store = CredentialStore::open(&credential_dir)?;
        debug!(dir = %credential_dir.display(), "Credential store opened");

        let session = Arc::new(SessionManager::new(
            Arc::clone(&backend),
            store,
            config.backend.auth_timeout(),
        ));
        let licenses = LicenseResolver::new(
            Arc::clone(&session),
            Arc::clone(&backend),
            config.licenses.max_age(),
            config.licenses.wait_timeout(),
        );
        let cache = CatalogCache::new(
            Arc::clone(&backend),
            config.cache.ttl(),
            config.cache.fetch_timeout(),
        );

        Ok(Arc::new(Self {
            backend,
            session,
            licenses,
            cache,
        }))
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn licenses(&self) -> &LicenseResolver {
        &self.licenses
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }

    /// Forwards backend events into session and cache state until the
    /// context is dropped.
    pub fn spawn_event_pump(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.backend.subscribe();
        let context: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let event = events.recv().await;
                let Some(context) = context.upgrade() else {
                    break;
                };
                match event {
                    Ok(event) => context.handle_event(event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Backend events dropped; invalidating cached state");
                        context.cache.invalidate_all();
                        context.licenses.invalidate();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Backend event pump stopped");
        })
    }

    pub fn handle_event(&self, event: BackendEvent) {
        match event {
            BackendEvent::Disconnected { reason } => {
                self.session.mark_disconnected(&reason);
                self.licenses.invalidate();
            }
            BackendEvent::ChangesDetected { apps, packages } => {
                info!(
                    apps = apps.len(),
                    packages = packages.len(),
                    "Catalog changes detected"
                );
                self.cache.invalidate_all();
                self.licenses.invalidate();
            }
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_logged_in()
    }

    pub fn set_credential_location(&self, path: &Path) -> bool {
        self.session.set_credential_location(path)
    }

    pub fn relogin_available(&self) -> bool {
        self.session.relogin_available()
    }

    pub async fn relogin(&self, user: Option<&str>) -> GatewayResult<LoginOutcome> {
        self.session.relogin_from_saved(user).await
    }

    pub async fn login(&self, request: LoginRequest) -> GatewayResult<LoginOutcome> {
        self.session.login(request).await
    }

    pub async fn logout(&self) {
        self.session.logout().await;
        self.licenses.invalidate();
    }

    /// App documents for the requested items, keyed by app ID.
    ///
    /// Packages take part in the backend query but only app documents are
    /// returned. Documents come back as the backend sent them unless the
    /// caller asks for `games_only`.
    pub async fn get_product_info(
        &self,
        params: &ProductInfoParams,
    ) -> GatewayResult<BTreeMap<ItemId, Value>> {
        self.session.require_session()?;
        let query = params.query();
        if query.is_empty() {
            return Ok(BTreeMap::new());
        }
        let info = self.cache.get_metadata(&query, params.wait()?).await?;
        if params.reduces_documents() {
            Ok(filter::game_common_sections(&info))
        } else {
            Ok(info.apps.clone())
        }
    }

    /// Display names of the requested apps that are games.
    pub async fn get_product_name(
        &self,
        apps: &[ItemId],
    ) -> GatewayResult<BTreeMap<ItemId, String>> {
        self.session.require_session()?;
        let query = ProductQuery::apps(apps.iter().copied());
        if query.is_empty() {
            return Ok(BTreeMap::new());
        }
        let info = self.cache.get_metadata(&query, None).await?;
        Ok(filter::game_names(&info))
    }

    pub async fn list_apps(&self) -> GatewayResult<Vec<ItemId>> {
        self.licenses.licensed_app_ids().await
    }

    pub async fn load_vdf(&self, path: PathBuf) -> GatewayResult<Value> {
        tokio::task::spawn_blocking(move || vdf::load(&path))
            .await
            .map_err(|err| GatewayError::Internal(format!("vdf task failed: {}", err)))?
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
