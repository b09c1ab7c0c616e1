//! Product-info cache with per-key fetch coalescing.
//!
//! Every exact [`ProductQuery`] has at most one backend fetch in flight.
//! Callers that miss the cache while a fetch is running join it and receive
//! the same outcome. Fetches run in their own task, so a caller giving up
//! (timeout, closed connection) never cancels work other callers wait on.

use super::{ProductInfo, ProductQuery};
use crate::backend::CatalogBackend;
use crate::error::{GatewayError, GatewayResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

type SharedFetch = Shared<BoxFuture<'static, GatewayResult<Arc<ProductInfo>>>>;

/// What a cached fetch returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Success,
    /// The backend knew none of the requested items.
    Empty,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
}

struct CacheEntry {
    info: Arc<ProductInfo>,
    outcome: CacheOutcome,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<ProductQuery, CacheEntry>,
    in_flight: HashMap<ProductQuery, SharedFetch>,
    /// Bumped by `invalidate_all`; fetches started under an older generation
    /// do not write back.
    generation: u64,
}

#[derive(Clone)]
pub struct CatalogCache {
    backend: Arc<dyn CatalogBackend>,
    ttl: Duration,
    fetch_timeout: Duration,
    state: Arc<Mutex<CacheState>>,
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CatalogCache {
    pub fn new(backend: Arc<dyn CatalogBackend>, ttl: Duration, fetch_timeout: Duration) -> Self {
        Self {
            backend,
            ttl,
            fetch_timeout,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Product info for `query`, from cache when fresh.
    ///
    /// `wait` bounds how long this caller waits (default: the configured
    /// fetch timeout). Backend failures are returned to every waiter but
    /// never cached.
    pub async fn get_metadata(
        &self,
        query: &ProductQuery,
        wait: Option<Duration>,
    ) -> GatewayResult<Arc<ProductInfo>> {
        let wait = wait.unwrap_or(self.fetch_timeout);

        let fetch = {
            let mut state = lock(&self.state);
            if let Some(entry) = state.entries.get(query) {
                if entry.fetched_at.elapsed() < self.ttl {
                    debug!(
                        apps = query.apps.len(),
                        packages = query.packages.len(),
                        "Catalog cache hit"
                    );
                    return Ok(entry.info.clone());
                }
                state.entries.remove(query);
            }
            match state.in_flight.get(query).cloned() {
                Some(fetch) => {
                    debug!(apps = query.apps.len(), "Joining in-flight catalog fetch");
                    fetch
                }
                None => self.start_fetch(&mut state, query.clone()),
            }
        };

        match tokio::time::timeout(wait, fetch).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_secs = wait.as_secs_f64(), "Gave up waiting for catalog fetch");
                Err(GatewayError::RemoteTimeout(wait))
            }
        }
    }

    /// Drops every entry and detaches in-flight fetches from the cache.
    pub fn invalidate_all(&self) {
        let mut state = lock(&self.state);
        let dropped = state.entries.len();
        state.entries.clear();
        state.in_flight.clear();
        state.generation += 1;
        info!(dropped, "Catalog cache invalidated");
    }

    pub fn stats(&self) -> CacheStats {
        let state = lock(&self.state);
        CacheStats {
            entries: state.entries.len(),
            in_flight: state.in_flight.len(),
        }
    }

    /// Outcome of the cached entry for `query`, if one is held.
    pub fn outcome(&self, query: &ProductQuery) -> Option<CacheOutcome> {
        lock(&self.state).entries.get(query).map(|entry| entry.outcome)
    }

    fn start_fetch(&self, state: &mut CacheState, query: ProductQuery) -> SharedFetch {
        let ttl = self.ttl;
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.fetched_at.elapsed() < ttl);
        let expired = before - state.entries.len();
        if expired > 0 {
            debug!(expired, "Dropped expired catalog entries");
        }

        let generation = state.generation;
        let backend = Arc::clone(&self.backend);
        let cache_state = Arc::clone(&self.state);
        let fetch_timeout = self.fetch_timeout;
        let key = query.clone();

        debug!(
            apps = query.apps.len(),
            packages = query.packages.len(),
            "Fetching product info"
        );

        let task = tokio::spawn(async move {
            let result =
                match tokio::time::timeout(fetch_timeout, backend.fetch_product_info(&query)).await
                {
                    Ok(Ok(info)) => Ok(Arc::new(info)),
                    Ok(Err(err)) => Err(GatewayError::from(err)),
                    Err(_) => Err(GatewayError::RemoteTimeout(fetch_timeout)),
                };

            let mut state = lock(&cache_state);
            if state.generation == generation {
                state.in_flight.remove(&query);
                match &result {
                    Ok(info) => {
                        let outcome = if info.is_empty() {
                            CacheOutcome::Empty
                        } else {
                            CacheOutcome::Success
                        };
                        state.entries.insert(
                            query,
                            CacheEntry {
                                info: info.clone(),
                                outcome,
                                fetched_at: Instant::now(),
                            },
                        );
                    }
                    Err(err) => warn!(error = %err, "Product info fetch failed"),
                }
            }
            result
        });

        let shared = async move {
            task.await.unwrap_or_else(|err| {
                Err(GatewayError::Internal(format!(
                    "catalog fetch task failed: {}",
                    err
                )))
            })
        }
        .boxed()
        .shared();

        state.in_flight.insert(key, shared.clone());
        shared
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
