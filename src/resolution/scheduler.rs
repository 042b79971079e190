//! Concurrent resolution of latest versions for a batch of applications
//!
//! A fixed pool of workers pulls applications from a shared queue. For each
//! application the registry's strategies are tried in order:
//!
//! - `NotFound` / `ParseFailure`: next strategy
//! - `RateLimited`: exponential backoff, same strategy, up to the retry budget
//! - `Timeout` / `NetworkFailure`: retry the same strategy, then next strategy
//!
//! The whole batch runs under one deadline. Applications still in flight when
//! it expires are reported as [`ResolutionOutcome::TimedOut`]; finished ones
//! keep their outcome.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use indexmap::{IndexMap, IndexSet};
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::config::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BATCH_DEADLINE_MS, DEFAULT_FETCH_TIMEOUT_MS,
    DEFAULT_NETWORK_RETRIES, DEFAULT_PER_HOST_LIMIT, DEFAULT_RATE_LIMIT_RETRIES,
    DEFAULT_RATE_WINDOW_MS, DEFAULT_WORKERS,
};
use crate::error::FetchError;
use crate::inventory::ApplicationIdentity;
use crate::resolution::cache::ResolutionCache;
use crate::resolution::outcome::{ResolutionOutcome, UnresolvedReason};
use crate::resolution::rate_limit::HostRateLimiter;
use crate::source::{Fetcher, SourceRegistry, SourceStrategy, StrategyKind};

/// Upper bound on the backoff exponent
const MAX_BACKOFF_SHIFT: u32 = 16;

/// Validated scheduler tunables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionSettings {
    pub workers: usize,
    pub per_host_limit: usize,
    pub rate_window: Duration,
    pub fetch_timeout: Duration,
    pub batch_deadline: Duration,
    pub rate_limit_retries: u32,
    pub network_retries: u32,
    pub backoff_base: Duration,
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            per_host_limit: DEFAULT_PER_HOST_LIMIT,
            rate_window: Duration::from_millis(DEFAULT_RATE_WINDOW_MS),
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            batch_deadline: Duration::from_millis(DEFAULT_BATCH_DEADLINE_MS),
            rate_limit_retries: DEFAULT_RATE_LIMIT_RETRIES,
            network_retries: DEFAULT_NETWORK_RETRIES,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
        }
    }
}

pub struct Resolver {
    registry: Arc<SourceRegistry>,
    fetchers: HashMap<StrategyKind, Arc<dyn Fetcher>>,
    limiter: HostRateLimiter,
    settings: ResolutionSettings,
    cache: Option<ResolutionCache>,
}

impl Resolver {
    pub fn new(
        registry: Arc<SourceRegistry>,
        fetchers: HashMap<StrategyKind, Arc<dyn Fetcher>>,
        settings: ResolutionSettings,
    ) -> Self {
        Self {
            registry,
            fetchers,
            limiter: HostRateLimiter::new(settings.per_host_limit, settings.rate_window),
            settings,
            cache: None,
        }
    }

    /// Consult and fill `cache` during resolution
    pub fn with_cache(mut self, cache: ResolutionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Resolve every application in `batch`.
    ///
    /// The returned map holds exactly one entry per distinct application, in
    /// batch order, whatever happened to it.
    pub async fn resolve(
        &self,
        batch: &[ApplicationIdentity],
    ) -> IndexMap<ApplicationIdentity, ResolutionOutcome> {
        let apps: IndexSet<ApplicationIdentity> = batch.iter().cloned().collect();
        if apps.is_empty() {
            return IndexMap::new();
        }

        let deadline = Instant::now() + self.settings.batch_deadline;
        let queue = Mutex::new(apps.iter().cloned().collect::<VecDeque<_>>());
        let results = Mutex::new(HashMap::with_capacity(apps.len()));
        let worker_count = self.settings.workers.min(apps.len());

        info!(
            "Resolving {} applications with {} workers",
            apps.len(),
            worker_count
        );

        let workers = (0..worker_count).map(|_| self.work(&queue, &results, deadline));
        if timeout_at(deadline, join_all(workers)).await.is_err() {
            warn!(
                "Batch deadline of {:?} expired, unfinished applications timed out",
                self.settings.batch_deadline
            );
        }

        let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
        apps.into_iter()
            .map(|app| {
                let outcome = results
                    .remove(&app)
                    .unwrap_or(ResolutionOutcome::TimedOut);
                (app, outcome)
            })
            .collect()
    }

    async fn work(
        &self,
        queue: &Mutex<VecDeque<ApplicationIdentity>>,
        results: &Mutex<HashMap<ApplicationIdentity, ResolutionOutcome>>,
        deadline: Instant,
    ) {
        loop {
            let next = queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(app) = next else {
                break;
            };

            let outcome = self.resolve_app(&app, deadline).await;
            results
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(app, outcome);
        }
    }

    async fn resolve_app(&self, app: &ApplicationIdentity, deadline: Instant) -> ResolutionOutcome {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.lookup(app.key())) {
            return hit;
        }

        let strategies = self.registry.strategies_for(app);
        if strategies.is_empty() {
            info!("No source configured for {}", app.key());
            return ResolutionOutcome::Unresolved(UnresolvedReason::NoStrategy);
        }

        let mut last_reason = UnresolvedReason::NoStrategy;
        for strategy in &strategies {
            let kind = strategy.kind();
            let Some(fetcher) = self.fetchers.get(&kind) else {
                warn!("No fetcher registered for {} sources", kind.as_str());
                last_reason = UnresolvedReason::NoFetcher { kind };
                continue;
            };

            match self.run_strategy(fetcher.as_ref(), app, strategy, deadline).await {
                Ok(raw) => {
                    debug!("Resolved {} to {} via {}", app.key(), raw, kind.as_str());
                    let outcome = ResolutionOutcome::resolved(&raw, kind);
                    if let Some(cache) = &self.cache {
                        cache.record(app.key(), &outcome);
                    }
                    return outcome;
                }
                Err(error) => {
                    if Instant::now() >= deadline {
                        return ResolutionOutcome::TimedOut;
                    }
                    debug!(
                        "{} source failed for {}: {}, trying next",
                        kind.as_str(),
                        app.key(),
                        error
                    );
                    last_reason = UnresolvedReason::Fetch { error };
                }
            }
        }

        info!("Could not resolve {}: {}", app.key(), last_reason);
        ResolutionOutcome::Unresolved(last_reason)
    }

    /// Run one strategy with its retry budget
    async fn run_strategy(
        &self,
        fetcher: &dyn Fetcher,
        app: &ApplicationIdentity,
        strategy: &SourceStrategy,
        deadline: Instant,
    ) -> Result<String, FetchError> {
        let host = strategy.host();
        let mut rate_limited = 0;
        let mut network_failures = 0;

        loop {
            self.limiter.acquire(&host).await;

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(FetchError::Timeout);
            }
            let fetch_timeout = self.settings.fetch_timeout.min(remaining);

            let error = match timeout(fetch_timeout, fetcher.fetch(app, strategy, fetch_timeout))
                .await
            {
                Ok(Ok(raw)) => return Ok(raw),
                Ok(Err(error)) => error,
                Err(_) => FetchError::Timeout,
            };

            match &error {
                FetchError::RateLimited { retry_after_secs }
                    if rate_limited < self.settings.rate_limit_retries =>
                {
                    let wait = self.backoff(rate_limited, *retry_after_secs);
                    if Instant::now() + wait >= deadline {
                        info!(
                            "Rate limited by {}, backoff of {:?} exceeds batch deadline",
                            host, wait
                        );
                        return Err(error);
                    }
                    rate_limited += 1;
                    warn!(
                        "Rate limited by {} for {}, retry {} in {:?}",
                        host,
                        app.key(),
                        rate_limited,
                        wait
                    );
                    sleep(wait).await;
                }
                FetchError::Timeout | FetchError::NetworkFailure(_)
                    if network_failures < self.settings.network_retries =>
                {
                    network_failures += 1;
                    debug!("Retrying {} for {} after: {}", host, app.key(), error);
                }
                _ => return Err(error),
            }
        }
    }

    /// `base * 2^attempt`, never shorter than the server's Retry-After
    fn backoff(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        let exponential = self
            .settings
            .backoff_base
            .saturating_mul(1 << attempt.min(MAX_BACKOFF_SHIFT));
        let requested = Duration::from_secs(retry_after_secs.unwrap_or(0));
        exponential.max(requested)
    }
}
