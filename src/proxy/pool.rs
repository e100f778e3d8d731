//! Proxy pool
//!
//! Holds the current proxy snapshot and two derived sets:
//! - working: proxies that succeeded since their last failure
//! - cooldown: quarantined proxies with the instant they were quarantined
//!
//! All three live behind a single mutex and are never touched across an
//! await point. Refreshes are single-flight: a separate async gate
//! serialises callers, and a caller that waited behind another refresh
//! takes that refresh's result instead of calling the provider again.
//! After a failed refresh, a stale but non-empty snapshot keeps serving
//! picks and the provider is not retried until the backoff has passed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::seq::{IteratorRandom, SliceRandom};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::source::ProxySource;
use crate::config::PoolConfig;
use crate::error::{RelayError, Result};
use crate::models::{PoolStats, Proxy, ProxyListSnapshot};

#[derive(Debug, Default)]
struct PoolState {
    snapshot: Option<ProxyListSnapshot>,
    working: HashSet<Proxy>,
    cooldown: HashMap<Proxy, Instant>,
    last_refresh_error: Option<String>,
    last_failed_refresh: Option<Instant>,
    /// Completed provider calls, successful or not
    refresh_attempts: u64,
    /// Installed snapshots
    generation: u64,
}

enum Staleness {
    Fresh,
    Stale,
    /// Stale, but the last refresh failed too recently to retry
    BackingOff(String),
}

impl PoolState {
    fn in_snapshot(&self, proxy: &Proxy) -> bool {
        self.snapshot.as_ref().is_some_and(|s| s.contains(proxy))
    }

    fn staleness(&self, config: &PoolConfig) -> Staleness {
        let Some(snapshot) = &self.snapshot else {
            return Staleness::Stale;
        };
        if !snapshot.is_stale(config.refresh_interval) {
            return Staleness::Fresh;
        }

        if !snapshot.is_empty() {
            if let (Some(failed_at), Some(error)) =
                (self.last_failed_refresh, &self.last_refresh_error)
            {
                if failed_at.elapsed() < config.refresh_retry_backoff {
                    return Staleness::BackingOff(error.clone());
                }
            }
        }

        Staleness::Stale
    }

    /// Result of the most recent provider call
    fn last_refresh_result(&self) -> Result<()> {
        match &self.last_refresh_error {
            Some(error) => Err(RelayError::RefreshFailed(error.clone())),
            None => Ok(()),
        }
    }

    fn sweep(&mut self, cooldown_period: std::time::Duration) -> usize {
        let now = Instant::now();
        let before = self.cooldown.len();
        self.cooldown
            .retain(|_, quarantined_at| now.duration_since(*quarantined_at) < cooldown_period);
        before - self.cooldown.len()
    }

    fn install(&mut self, snapshot: ProxyListSnapshot) {
        self.working.retain(|p| snapshot.contains(p));
        self.cooldown.retain(|p, _| snapshot.contains(p));
        self.snapshot = Some(snapshot);
        self.last_refresh_error = None;
        self.last_failed_refresh = None;
        self.generation += 1;
    }
}

/// Shared pool of leased proxies
pub struct ProxyPool {
    source: Arc<dyn ProxySource>,
    config: PoolConfig,
    state: Mutex<PoolState>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl ProxyPool {
    pub fn new(source: Arc<dyn ProxySource>, config: PoolConfig) -> Self {
        Self {
            source,
            config,
            state: Mutex::new(PoolState::default()),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Fetch a new snapshot if none exists or the current one is too old.
    ///
    /// A failed refresh leaves the previous snapshot in place and returns
    /// the error. Callers queued behind an in-flight refresh share its
    /// result. While a non-empty snapshot is cached, a failed refresh is
    /// not retried until `refresh_retry_backoff` has elapsed; calls in
    /// that window return `RefreshFailed` without contacting the provider.
    #[instrument(skip(self))]
    pub async fn refresh_if_stale(&self) -> Result<()> {
        let seen_attempts = {
            let state = self.state.lock();
            match state.staleness(&self.config) {
                Staleness::Fresh => return Ok(()),
                Staleness::BackingOff(error) => return Err(RelayError::RefreshFailed(error)),
                Staleness::Stale => state.refresh_attempts,
            }
        };

        let _gate = self.refresh_gate.lock().await;

        {
            let state = self.state.lock();
            // Another caller refreshed while we waited on the gate.
            if state.refresh_attempts != seen_attempts {
                return state.last_refresh_result();
            }
        }

        debug!("Proxy snapshot missing or stale, refreshing");

        let result = match self.source.fetch_all().await {
            Ok(proxies) if proxies.is_empty() => Err(RelayError::ProxySource(
                "provider returned no proxies".into(),
            )),
            other => other,
        };

        let mut state = self.state.lock();
        state.refresh_attempts += 1;
        match result {
            Ok(proxies) => {
                let snapshot = ProxyListSnapshot::new(proxies);
                info!("Installed proxy snapshot with {} proxies", snapshot.len());
                state.install(snapshot);
                Ok(())
            }
            Err(e) => {
                let kept = state.snapshot.as_ref().map_or(0, ProxyListSnapshot::len);
                warn!("Proxy refresh failed, keeping {} cached proxies: {}", kept, e);
                state.last_refresh_error = Some(e.to_string());
                state.last_failed_refresh = Some(Instant::now());
                Err(e)
            }
        }
    }

    /// Uniformly random proxy from the snapshot, skipping quarantined ones
    /// unless nothing else is left.
    pub async fn pick_random(&self) -> Result<Proxy> {
        if let Err(e) = self.refresh_if_stale().await {
            debug!("Continuing with cached snapshot: {}", e);
        }

        let mut state = self.state.lock();
        let swept = state.sweep(self.config.cooldown_period);
        if swept > 0 {
            debug!("Released {} proxies from cooldown", swept);
        }

        let snapshot = state
            .snapshot
            .as_ref()
            .filter(|s| !s.is_empty())
            .ok_or(RelayError::NoProxiesAvailable)?;

        let mut rng = rand::thread_rng();
        let rested = snapshot
            .proxies()
            .iter()
            .filter(|p| !state.cooldown.contains_key(*p))
            .choose(&mut rng);

        rested
            .or_else(|| snapshot.proxies().choose(&mut rng))
            .cloned()
            .ok_or(RelayError::NoProxiesAvailable)
    }

    /// Random proxy from the working set, or `pick_random` when it is empty
    pub async fn pick_working(&self) -> Result<Proxy> {
        let known_good = {
            let state = self.state.lock();
            state.working.iter().choose(&mut rand::thread_rng()).cloned()
        };

        match known_good {
            Some(proxy) => Ok(proxy),
            None => self.pick_random().await,
        }
    }

    /// Permanently drop a proxy until the next full refresh
    pub fn evict(&self, proxy: &Proxy) -> bool {
        let mut state = self.state.lock();
        state.working.remove(proxy);
        state.cooldown.remove(proxy);
        let removed = state
            .snapshot
            .as_mut()
            .is_some_and(|snapshot| snapshot.remove(proxy));

        if removed {
            info!(proxy = %proxy, "Evicted proxy");
        }
        removed
    }

    /// Record a success: the proxy joins the working set and leaves cooldown
    pub fn mark_working(&self, proxy: &Proxy) {
        let mut state = self.state.lock();
        if !state.in_snapshot(proxy) {
            debug!(proxy = %proxy, "Ignoring success for proxy outside the snapshot");
            return;
        }

        state.cooldown.remove(proxy);
        state.working.insert(proxy.clone());
    }

    /// Quarantine a proxy and drop it from the working set
    pub fn mark_cooldown(&self, proxy: &Proxy) {
        let mut state = self.state.lock();
        if !state.in_snapshot(proxy) {
            debug!(proxy = %proxy, "Ignoring cooldown for proxy outside the snapshot");
            return;
        }

        state.working.remove(proxy);
        let now = Instant::now();
        if self.config.extend_cooldown {
            state.cooldown.insert(proxy.clone(), now);
        } else {
            state.cooldown.entry(proxy.clone()).or_insert(now);
        }
    }

    /// Drop cooldown entries older than the cooldown period
    pub fn sweep_expired_cooldowns(&self) -> usize {
        self.state.lock().sweep(self.config.cooldown_period)
    }

    pub fn contains(&self, proxy: &Proxy) -> bool {
        self.state.lock().in_snapshot(proxy)
    }

    pub fn is_working(&self, proxy: &Proxy) -> bool {
        self.state.lock().working.contains(proxy)
    }

    pub fn is_cooling_down(&self, proxy: &Proxy) -> bool {
        self.state.lock().cooldown.contains_key(proxy)
    }

    /// Bumped every time a new snapshot is installed
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            total_proxies: state.snapshot.as_ref().map_or(0, ProxyListSnapshot::len),
            working_proxies: state.working.len(),
            cooldown_proxies: state.cooldown.len(),
            fetched_at: state.snapshot.as_ref().map(|s| s.fetched_at_utc),
            last_refresh_error: state.last_refresh_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::source::fakes::ScriptedSource;
    use std::time::Duration;

    const A: &str = "http://u:p@10.0.0.1:8001";
    const B: &str = "http://u:p@10.0.0.2:8002";
    const C: &str = "http://u:p@10.0.0.3:8003";

    fn pool_with(source: ScriptedSource) -> (ProxyPool, Arc<ScriptedSource>) {
        let source = Arc::new(source);
        (
            ProxyPool::new(source.clone(), PoolConfig::default()),
            source,
        )
    }

    fn proxy(s: &str) -> Proxy {
        Proxy::new(s)
    }

    #[tokio::test]
    async fn test_first_pick_loads_snapshot() {
        let (pool, source) = pool_with(ScriptedSource::fixed(vec![A, B]));

        let picked = pool.pick_random().await.unwrap();
        assert!(picked == proxy(A) || picked == proxy(B));
        assert_eq!(source.calls(), 1);
        assert_eq!(pool.stats().total_proxies, 2);
    }

    #[tokio::test]
    async fn test_empty_pool_reports_no_proxies() {
        let (pool, _) = pool_with(ScriptedSource::fixed(vec![]));

        let err = pool.pick_random().await.unwrap_err();
        assert!(matches!(err, RelayError::NoProxiesAvailable));
        assert!(pool.stats().last_refresh_error.is_some());
    }

    #[tokio::test]
    async fn test_working_and_cooldown_are_exclusive() {
        let (pool, _) = pool_with(ScriptedSource::fixed(vec![A, B]));
        pool.refresh_if_stale().await.unwrap();
        let a = proxy(A);

        let sequence = [true, false, false, true, true, false, true];
        for mark_good in sequence {
            if mark_good {
                pool.mark_working(&a);
            } else {
                pool.mark_cooldown(&a);
            }
            assert_ne!(pool.is_working(&a), pool.is_cooling_down(&a));
            assert_eq!(pool.is_working(&a), mark_good);
        }
    }

    #[tokio::test]
    async fn test_concurrent_marks_stay_consistent() {
        let (pool, _) = pool_with(ScriptedSource::fixed(vec![A]));
        pool.refresh_if_stale().await.unwrap();
        let pool = Arc::new(pool);
        let a = proxy(A);

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let pool = pool.clone();
                let a = a.clone();
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        pool.mark_working(&a);
                    } else {
                        pool.mark_cooldown(&a);
                    }
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }

        assert_ne!(pool.is_working(&a), pool.is_cooling_down(&a));
    }

    #[tokio::test]
    async fn test_evict_removes_from_every_set() {
        let (pool, _) = pool_with(ScriptedSource::fixed(vec![A, B]));
        pool.refresh_if_stale().await.unwrap();
        let a = proxy(A);

        pool.mark_working(&a);
        assert!(pool.evict(&a));
        assert!(!pool.contains(&a));
        assert!(!pool.is_working(&a));
        assert!(!pool.is_cooling_down(&a));

        // Marks on an evicted proxy must not resurrect it.
        pool.mark_cooldown(&a);
        pool.mark_working(&a);
        assert!(!pool.is_working(&a));
        assert!(!pool.is_cooling_down(&a));

        for _ in 0..50 {
            assert_eq!(pool.pick_random().await.unwrap(), proxy(B));
            assert_eq!(pool.pick_working().await.unwrap(), proxy(B));
        }
    }

    #[tokio::test]
    async fn test_evicted_proxy_returns_with_next_snapshot() {
        let mut config = PoolConfig::default();
        config.refresh_interval = Duration::from_secs(60);
        let source = Arc::new(ScriptedSource::fixed(vec![A]));
        let pool = ProxyPool::new(source.clone(), config);

        tokio::time::pause();
        pool.refresh_if_stale().await.unwrap();
        pool.evict(&proxy(A));
        assert!(matches!(
            pool.pick_random().await,
            Err(RelayError::NoProxiesAvailable)
        ));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(pool.pick_random().await.unwrap(), proxy(A));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_cooldowns_swept_before_pick() {
        let (pool, _) = pool_with(ScriptedSource::fixed(vec![A, B]));
        pool.refresh_if_stale().await.unwrap();
        let a = proxy(A);

        pool.mark_cooldown(&a);
        tokio::time::advance(Duration::from_secs(29 * 60)).await;
        pool.pick_random().await.unwrap();
        assert!(pool.is_cooling_down(&a));

        tokio::time::advance(Duration::from_secs(60)).await;
        pool.pick_random().await.unwrap();
        assert!(!pool.is_cooling_down(&a));
        assert_eq!(pool.stats().cooldown_proxies, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requarantine_keeps_original_timestamp_by_default() {
        let (pool, _) = pool_with(ScriptedSource::fixed(vec![A]));
        pool.refresh_if_stale().await.unwrap();
        let a = proxy(A);

        pool.mark_cooldown(&a);
        tokio::time::advance(Duration::from_secs(20 * 60)).await;
        pool.mark_cooldown(&a);
        tokio::time::advance(Duration::from_secs(11 * 60)).await;

        assert_eq!(pool.sweep_expired_cooldowns(), 1);
        assert!(!pool.is_cooling_down(&a));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requarantine_extends_when_configured() {
        let config = PoolConfig {
            extend_cooldown: true,
            ..PoolConfig::default()
        };
        let pool = ProxyPool::new(Arc::new(ScriptedSource::fixed(vec![A])), config);
        pool.refresh_if_stale().await.unwrap();
        let a = proxy(A);

        pool.mark_cooldown(&a);
        tokio::time::advance(Duration::from_secs(20 * 60)).await;
        pool.mark_cooldown(&a);
        tokio::time::advance(Duration::from_secs(11 * 60)).await;

        assert_eq!(pool.sweep_expired_cooldowns(), 0);
        assert!(pool.is_cooling_down(&a));
    }

    #[tokio::test]
    async fn test_mark_working_lifts_cooldown() {
        let (pool, _) = pool_with(ScriptedSource::fixed(vec![A]));
        pool.refresh_if_stale().await.unwrap();
        let a = proxy(A);

        pool.mark_cooldown(&a);
        pool.mark_working(&a);
        assert!(pool.is_working(&a));
        assert!(!pool.is_cooling_down(&a));
    }

    #[tokio::test]
    async fn test_pick_random_prefers_rested_proxies() {
        let (pool, _) = pool_with(ScriptedSource::fixed(vec![A, B, C]));
        pool.refresh_if_stale().await.unwrap();

        pool.mark_cooldown(&proxy(A));
        pool.mark_cooldown(&proxy(B));
        for _ in 0..50 {
            assert_eq!(pool.pick_random().await.unwrap(), proxy(C));
        }

        // Everything quarantined: fall back to the whole snapshot.
        pool.mark_cooldown(&proxy(C));
        let picked = pool.pick_random().await.unwrap();
        assert!(pool.contains(&picked));
    }

    #[tokio::test]
    async fn test_pick_working_uses_working_set() {
        let (pool, _) = pool_with(ScriptedSource::fixed(vec![A, B, C]));
        pool.refresh_if_stale().await.unwrap();

        pool.mark_working(&proxy(B));
        for _ in 0..50 {
            assert_eq!(pool.pick_working().await.unwrap(), proxy(B));
        }
    }

    #[tokio::test]
    async fn test_pick_working_falls_back_to_random() {
        let (pool, source) = pool_with(ScriptedSource::fixed(vec![A]));

        assert_eq!(pool.pick_working().await.unwrap(), proxy(A));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_old_snapshot() {
        let source = ScriptedSource::new(vec![Some(vec![A, B]), None, Some(vec![])]);
        let (pool, source) = pool_with(source);
        pool.refresh_if_stale().await.unwrap();

        tokio::time::advance(Duration::from_secs(12 * 60 * 60 + 1)).await;
        assert!(matches!(
            pool.refresh_if_stale().await,
            Err(RelayError::ProxySource(_))
        ));
        assert_eq!(pool.stats().total_proxies, 2);
        assert!(pool.stats().last_refresh_error.is_some());

        // Within the backoff the provider is left alone.
        assert!(matches!(
            pool.refresh_if_stale().await,
            Err(RelayError::RefreshFailed(_))
        ));
        assert_eq!(source.calls(), 2);

        // An empty provider list is a failure too.
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(pool.refresh_if_stale().await.is_err());
        assert_eq!(pool.stats().total_proxies, 2);

        // Degraded mode: picks still succeed from the stale snapshot.
        let picked = pool.pick_random().await.unwrap();
        assert!(picked == proxy(A) || picked == proxy(B));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_is_shared_by_waiting_picks() {
        let source = ScriptedSource::new(vec![Some(vec![A, B]), None])
            .with_delay(Duration::from_secs(5));
        let (pool, source) = pool_with(source);
        pool.refresh_if_stale().await.unwrap();
        let pool = Arc::new(pool);

        tokio::time::advance(Duration::from_secs(12 * 60 * 60 + 1)).await;
        let started = Instant::now();
        let picks = (0..16).map(|_| {
            let pool = pool.clone();
            async move { pool.pick_random().await }
        });
        for result in futures::future::join_all(picks).await {
            assert!(result.is_ok());
        }

        assert_eq!(source.calls(), 2);
        assert!(started.elapsed() < Duration::from_secs(6));

        pool.pick_random().await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_retried_after_backoff() {
        let source = ScriptedSource::new(vec![Some(vec![A]), None, Some(vec![B])]);
        let (pool, source) = pool_with(source);
        pool.refresh_if_stale().await.unwrap();

        tokio::time::advance(Duration::from_secs(12 * 60 * 60 + 1)).await;
        assert_eq!(pool.pick_random().await.unwrap(), proxy(A));
        assert_eq!(source.calls(), 2);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(pool.pick_random().await.unwrap(), proxy(A));
        assert_eq!(source.calls(), 2);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(pool.pick_random().await.unwrap(), proxy(B));
        assert_eq!(source.calls(), 3);
        assert!(pool.stats().last_refresh_error.is_none());
    }

    #[tokio::test]
    async fn test_empty_pool_does_not_back_off() {
        let source = ScriptedSource::new(vec![None, Some(vec![A])]);
        let (pool, source) = pool_with(source);

        assert!(pool.pick_random().await.is_err());
        assert_eq!(pool.pick_random().await.unwrap(), proxy(A));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_counts_installed_snapshots() {
        let source = ScriptedSource::new(vec![Some(vec![A]), None, Some(vec![B])]);
        let (pool, _) = pool_with(source);
        assert_eq!(pool.generation(), 0);

        pool.refresh_if_stale().await.unwrap();
        assert_eq!(pool.generation(), 1);

        tokio::time::advance(Duration::from_secs(12 * 60 * 60 + 1)).await;
        assert!(pool.refresh_if_stale().await.is_err());
        assert_eq!(pool.generation(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        pool.refresh_if_stale().await.unwrap();
        assert_eq!(pool.generation(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_prunes_derived_sets() {
        let source = ScriptedSource::new(vec![Some(vec![A, B]), Some(vec![B, C])]);
        let (pool, _) = pool_with(source);
        pool.refresh_if_stale().await.unwrap();

        pool.mark_working(&proxy(A));
        pool.mark_cooldown(&proxy(B));

        tokio::time::advance(Duration::from_secs(12 * 60 * 60 + 1)).await;
        pool.refresh_if_stale().await.unwrap();

        assert!(!pool.contains(&proxy(A)));
        assert!(!pool.is_working(&proxy(A)));
        assert!(pool.is_cooling_down(&proxy(B)));
        assert!(pool.stats().last_refresh_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refresh_is_single_flight() {
        let source = ScriptedSource::fixed(vec![A, B]).with_delay(Duration::from_millis(500));
        let (pool, source) = pool_with(source);
        let pool = Arc::new(pool);

        let picks = (0..16).map(|_| {
            let pool = pool.clone();
            async move { pool.pick_random().await }
        });
        for result in futures::future::join_all(picks).await {
            assert!(result.is_ok());
        }

        assert_eq!(source.calls(), 1);
    }
}
