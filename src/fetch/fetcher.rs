use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::outcome::{AttemptOutcome, Disposition, PoolAction};
use super::page_size::PageSizeTable;
use super::selection::{Route, SelectionPolicy};
use super::transport::InventoryTransport;
use crate::config::FetchConfig;
use crate::error::{RelayError, Result};
use crate::models::{InventoryRequest, Proxy};
use crate::proxy::ProxyPool;

/// Runs the bounded retry loop for one inventory request
pub struct ResilientFetcher {
    pool: Arc<ProxyPool>,
    transport: Arc<dyn InventoryTransport>,
    base_url: Url,
    max_attempts: u32,
    policy: SelectionPolicy,
    page_sizes: PageSizeTable,
    /// Pool generation the transport's client cache was last pruned for
    pruned_generation: AtomicU64,
}

impl ResilientFetcher {
    pub fn new(
        pool: Arc<ProxyPool>,
        transport: Arc<dyn InventoryTransport>,
        config: &FetchConfig,
    ) -> Self {
        Self {
            pool,
            transport,
            base_url: config.base_url.clone(),
            max_attempts: config.max_attempts.max(1),
            policy: config.selection_policy,
            page_sizes: config.page_sizes.clone(),
            pruned_generation: AtomicU64::new(0),
        }
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `{base}/{steam_id}/{app_id}/{context_id}?l=english&count={n}`
    pub fn inventory_url(&self, request: &InventoryRequest) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RelayError::InvalidConfig(format!("cannot extend {}", self.base_url)))?
            .pop_if_empty()
            .push(&request.steam_id)
            .push(&request.app_id.to_string())
            .push(&request.context_id.to_string());

        url.query_pairs_mut()
            .clear()
            .append_pair("l", "english")
            .append_pair("count", &self.page_sizes.count_for(request.app_id).to_string());

        Ok(url)
    }

    /// Fetch one inventory, returning the first 200 JSON payload.
    ///
    /// Fails with `TargetRejected` as soon as the target answers with a
    /// status other than 200/407/429, with `NoProxiesAvailable` when a
    /// proxied attempt finds the pool empty, and with `AttemptsExhausted`
    /// once the budget is spent.
    #[instrument(skip(self), fields(request = %request))]
    pub async fn fetch(&self, request: &InventoryRequest) -> Result<Value> {
        let url = self.inventory_url(request)?;

        for attempt in 0..self.max_attempts {
            let route = self.policy.route(attempt, self.max_attempts);
            let proxy = match route {
                Route::Direct => None,
                Route::RandomProxy => Some(self.pool.pick_random().await?),
                Route::WorkingProxy => Some(self.pool.pick_working().await?),
            };

            if proxy.is_some() {
                self.prune_transport();
            }

            match &proxy {
                Some(p) => debug!(attempt, route = ?route, proxy = %p, "Fetching inventory via proxy"),
                None => debug!(attempt, "Fetching inventory directly"),
            }

            let outcome = match self.transport.get(&url, proxy.as_ref()).await {
                Ok(response) => AttemptOutcome::from_response(response),
                Err(e) => AttemptOutcome::Transport(e.to_string()),
            };

            if let Some(p) = &proxy {
                self.apply(&outcome, p);
            }

            match (outcome.disposition(), outcome) {
                (Disposition::Done, AttemptOutcome::Success(payload)) => {
                    info!(attempt, proxied = proxy.is_some(), "Fetched inventory");
                    return Ok(payload);
                }
                (Disposition::Abandon, AttemptOutcome::TargetRejected(status)) => {
                    warn!(attempt, status = status.as_u16(), "Target rejected request, giving up");
                    return Err(RelayError::TargetRejected {
                        status: status.as_u16(),
                    });
                }
                (_, AttemptOutcome::Transport(e)) => {
                    debug!(attempt, error = %e, "Attempt failed");
                }
                (_, other) => {
                    warn!(attempt, outcome = other.label(), "Attempt failed");
                }
            }
        }

        warn!(attempts = self.max_attempts, "Attempt budget exhausted");
        Err(RelayError::AttemptsExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Drop transport state for proxies a refresh left out of the pool
    fn prune_transport(&self) {
        let generation = self.pool.generation();
        if self.pruned_generation.swap(generation, Ordering::AcqRel) == generation {
            return;
        }

        let pool = &self.pool;
        self.transport.retain(&|proxy| pool.contains(proxy));
    }

    fn apply(&self, outcome: &AttemptOutcome, proxy: &Proxy) {
        match outcome.pool_action() {
            PoolAction::None => {}
            PoolAction::MarkWorking => self.pool.mark_working(proxy),
            PoolAction::MarkCooldown => self.pool.mark_cooldown(proxy),
            PoolAction::Evict => {
                self.pool.evict(proxy);
                self.transport.forget(proxy);
            }
        }
    }
}
