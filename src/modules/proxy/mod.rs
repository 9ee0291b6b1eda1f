//! Proxy pool sourcing, validation, and selection.
//!
//! Downloads candidate proxies from public plaintext lists, probes them in
//! bounded concurrent batches against an echo endpoint, and serves the working
//! subset to callers. The validated pool is persisted to a local JSON cache so
//! restarts within the freshness window skip the scrape entirely.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::transport::{StealthHttpClient, StealthRequest};

static PROXY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{2,5})$").expect("proxy pattern")
});

/// Default public proxy-list sources, all plaintext `ip:port` per line.
pub const DEFAULT_PROXY_SOURCES: &[&str] = &[
    "https://api.proxyscrape.com/v2/?request=get&protocol=http&timeout=10000&country=all&ssl=all&anonymity=all",
    "https://www.proxy-list.download/api/v1/get?type=http",
    "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/http.txt",
    "https://raw.githubusercontent.com/ShiftyTR/Proxy-List/master/http.txt",
    "https://raw.githubusercontent.com/monosans/proxy-list/main/proxies/http.txt",
];

/// What the echo endpoint revealed about the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnonymityLevel {
    #[default]
    Unknown,
    Anonymous,
    Transparent,
}

/// One known proxy endpoint. Identity is the `address` string; records are
/// never deleted, only flagged non-working.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub address: String,
    pub working: Option<bool>,
    pub last_checked: Option<DateTime<Utc>>,
    pub response_time_ms: Option<u64>,
    #[serde(default)]
    pub anonymity: AnonymityLevel,
}

impl ProxyRecord {
    fn candidate(address: String) -> Self {
        Self {
            address,
            working: None,
            last_checked: None,
            response_time_ms: None,
            anonymity: AnonymityLevel::Unknown,
        }
    }
}

/// On-disk cache layout: `{proxies, lastUpdated, workingCount}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProxyCacheFile {
    proxies: Vec<ProxyRecord>,
    last_updated: DateTime<Utc>,
    working_count: usize,
}

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct ProxyPoolConfig {
    pub sources: Vec<String>,
    pub cache_path: PathBuf,
    /// Echo endpoint that reflects the caller's apparent origin IP.
    pub probe_url: String,
    pub fetch_timeout: Duration,
    pub probe_timeout: Duration,
    pub batch_size: usize,
    pub refresh_interval: Duration,
    pub cache_ttl: Duration,
    /// Proxies faster than this are eligible for the fast bucket.
    pub fast_threshold_ms: u64,
    /// How many of the fastest proxies `pick` samples from.
    pub fast_pool_size: usize,
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        Self {
            sources: DEFAULT_PROXY_SOURCES.iter().map(|s| s.to_string()).collect(),
            cache_path: PathBuf::from("data/proxies.json"),
            probe_url: "http://httpbin.org/ip".to_string(),
            fetch_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            batch_size: 50,
            refresh_interval: Duration::from_secs(30 * 60),
            cache_ttl: Duration::from_secs(60 * 60),
            fast_threshold_ms: 3000,
            fast_pool_size: 10,
        }
    }
}

/// Non-fatal pool errors. Fetch and probe failures never surface here; they
/// are logged and degrade the pool instead.
#[derive(Debug, Error)]
pub enum ProxyPoolError {
    #[error("cache read failed: {0}")]
    CacheRead(#[source] std::io::Error),
    #[error("cache write failed: {0}")]
    CacheWrite(#[source] std::io::Error),
    #[error("cache parse failed: {0}")]
    CacheParse(#[from] serde_json::Error),
}

/// Counters surfaced to the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyPoolStats {
    pub total: usize,
    pub working: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub average_response_time_ms: u64,
}

#[derive(Debug, Default)]
struct PoolState {
    proxies: Vec<ProxyRecord>,
    working: Vec<String>,
    round_robin_cursor: usize,
    last_updated: Option<DateTime<Utc>>,
}

impl PoolState {
    fn recompute_working(&mut self) {
        self.working = self
            .proxies
            .iter()
            .filter(|p| p.working == Some(true))
            .map(|p| p.address.clone())
            .collect();
        if self.working.is_empty() {
            self.round_robin_cursor = 0;
        } else {
            self.round_robin_cursor %= self.working.len();
        }
    }

    fn record_mut(&mut self, address: &str) -> Option<&mut ProxyRecord> {
        self.proxies.iter_mut().find(|p| p.address == address)
    }
}

/// Managed set of candidate and validated outbound HTTP relays.
///
/// Constructed once per process and shared behind an `Arc`; a background
/// refresher keeps it current without blocking `pick` callers.
pub struct ProxyPool {
    config: ProxyPoolConfig,
    transport: Arc<dyn StealthHttpClient>,
    state: RwLock<PoolState>,
    rng: StdMutex<StdRng>,
}

impl ProxyPool {
    pub fn new(config: ProxyPoolConfig, transport: Arc<dyn StealthHttpClient>) -> Self {
        Self {
            config,
            transport,
            state: RwLock::new(PoolState::default()),
            rng: StdMutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic selection randomness for tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdMutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn config(&self) -> &ProxyPoolConfig {
        &self.config
    }

    /// Startup path: reuse the cache when it is fresh, otherwise run a full
    /// refresh + validation pass.
    pub async fn ensure_ready(&self, cancel: &CancellationToken) {
        match self.load_cache() {
            Ok(true) => {
                let stats = self.stats();
                log::info!(
                    "proxy cache loaded: {} proxies, {} working",
                    stats.total,
                    stats.working
                );
            }
            Ok(false) => {
                self.refresh().await;
                self.validate(cancel).await;
            }
            Err(err) => {
                log::warn!("proxy cache unavailable, falling back to fresh fetch: {err}");
                self.refresh().await;
                self.validate(cancel).await;
            }
        }
    }

    /// Fetch all configured sources and merge the results into the candidate
    /// set. A failing source is logged and skipped; partial results are fine.
    pub async fn refresh(&self) {
        let mut fetched = HashSet::new();
        let mut sources_ok = 0usize;

        for source in &self.config.sources {
            match self
                .transport
                .fetch_text(source, self.config.fetch_timeout)
                .await
            {
                Ok(body) => {
                    let before = fetched.len();
                    for address in parse_proxy_list(&body) {
                        fetched.insert(address);
                    }
                    sources_ok += 1;
                    log::debug!("source {source}: {} new candidates", fetched.len() - before);
                }
                Err(err) => {
                    log::warn!("proxy source fetch failed ({source}): {err}");
                }
            }
        }

        let mut state = self.state.write().expect("proxy pool lock poisoned");
        let known: HashSet<String> = state.proxies.iter().map(|p| p.address.clone()).collect();
        let mut added = 0usize;
        for address in fetched {
            if !known.contains(&address) {
                state.proxies.push(ProxyRecord::candidate(address));
                added += 1;
            }
        }
        state.last_updated = Some(Utc::now());
        log::info!(
            "proxy refresh: {sources_ok}/{} sources, {added} new candidates, {} total",
            self.config.sources.len(),
            state.proxies.len()
        );
        drop(state);

        if let Err(err) = self.save_cache() {
            log::warn!("proxy cache write failed: {err}");
        }
    }

    /// Probe every candidate through the echo endpoint in bounded concurrent
    /// batches. Cancellation is honored between batches, never mid-probe.
    pub async fn validate(&self, cancel: &CancellationToken) {
        let addresses: Vec<String> = {
            let state = self.state.read().expect("proxy pool lock poisoned");
            state.proxies.iter().map(|p| p.address.clone()).collect()
        };
        if addresses.is_empty() {
            return;
        }

        let probe_url = match Url::parse(&self.config.probe_url) {
            Ok(url) => url,
            Err(err) => {
                log::warn!("invalid probe url {}: {err}", self.config.probe_url);
                return;
            }
        };

        let mut checked = 0usize;
        for batch in addresses.chunks(self.config.batch_size.max(1)) {
            if cancel.is_cancelled() {
                log::info!("proxy validation cancelled after {checked} probes");
                break;
            }

            let mut probes = JoinSet::new();
            for address in batch {
                let transport = self.transport.clone();
                let address = address.clone();
                let request = StealthRequest::get(probe_url.clone())
                    .with_proxy(Some(address.clone()))
                    .with_timeout(self.config.probe_timeout);
                probes.spawn(async move {
                    let started = std::time::Instant::now();
                    let outcome = transport.execute(&request).await;
                    (address, started.elapsed(), outcome)
                });
            }

            while let Some(joined) = probes.join_next().await {
                let Ok((address, elapsed, outcome)) = joined else {
                    continue;
                };
                let mut state = self.state.write().expect("proxy pool lock poisoned");
                if let Some(record) = state.record_mut(&address) {
                    record.last_checked = Some(Utc::now());
                    match outcome {
                        Ok(response) => {
                            record.working = Some(true);
                            record.response_time_ms = Some(elapsed.as_millis() as u64);
                            record.anonymity = infer_anonymity(&response.text());
                        }
                        Err(err) => {
                            record.working = Some(false);
                            record.response_time_ms = None;
                            log::debug!("probe failed for {address}: {err}");
                        }
                    }
                }
            }

            checked += batch.len();
            let mut state = self.state.write().expect("proxy pool lock poisoned");
            state.recompute_working();
            log::debug!("validated {checked}/{} proxies", addresses.len());
        }

        let working = self.working_count();
        log::info!(
            "proxy validation done: {working} working of {}",
            addresses.len()
        );

        if let Err(err) = self.save_cache() {
            log::warn!("proxy cache write failed: {err}");
        }
    }

    /// Speed-biased selection: uniform over the `fast_pool_size` fastest
    /// proxies under the fast threshold, falling back to uniform over all
    /// working proxies. `None` means no proxy is available, not an error.
    pub fn pick(&self) -> Option<ProxyRecord> {
        let state = self.state.read().expect("proxy pool lock poisoned");
        if state.working.is_empty() {
            return None;
        }

        let mut fast: Vec<&ProxyRecord> = state
            .proxies
            .iter()
            .filter(|p| {
                p.working == Some(true)
                    && p.response_time_ms
                        .is_some_and(|ms| ms < self.config.fast_threshold_ms)
            })
            .collect();
        fast.sort_by_key(|p| p.response_time_ms.unwrap_or(u64::MAX));
        fast.truncate(self.config.fast_pool_size);

        let mut rng = self.rng.lock().expect("rng lock poisoned");
        if !fast.is_empty() {
            return fast.choose(&mut *rng).map(|p| (*p).clone());
        }

        let address = state.working.choose(&mut *rng)?.clone();
        state.proxies.iter().find(|p| p.address == address).cloned()
    }

    /// Sequential cursor over the working set for callers wanting an even
    /// spread instead of speed-biased sampling.
    pub fn pick_round_robin(&self) -> Option<ProxyRecord> {
        let mut state = self.state.write().expect("proxy pool lock poisoned");
        if state.working.is_empty() {
            return None;
        }
        let cursor = state.round_robin_cursor % state.working.len();
        state.round_robin_cursor = (cursor + 1) % state.working.len();
        let address = state.working[cursor].clone();
        state.proxies.iter().find(|p| p.address == address).cloned()
    }

    /// Immediately demote a proxy that failed a live request outside the
    /// validation pass.
    pub fn mark_failed(&self, address: &str) {
        let mut state = self.state.write().expect("proxy pool lock poisoned");
        if let Some(record) = state.record_mut(address) {
            record.working = Some(false);
            record.last_checked = Some(Utc::now());
        }
        state.recompute_working();
        log::debug!("proxy {address} marked non-working");
    }

    pub fn working_count(&self) -> usize {
        let state = self.state.read().expect("proxy pool lock poisoned");
        state.working.len()
    }

    pub fn stats(&self) -> ProxyPoolStats {
        let state = self.state.read().expect("proxy pool lock poisoned");
        let working: Vec<&ProxyRecord> = state
            .proxies
            .iter()
            .filter(|p| p.working == Some(true))
            .collect();
        let average = if working.is_empty() {
            0
        } else {
            working
                .iter()
                .filter_map(|p| p.response_time_ms)
                .sum::<u64>()
                / working.len() as u64
        };
        ProxyPoolStats {
            total: state.proxies.len(),
            working: working.len(),
            last_updated: state.last_updated,
            average_response_time_ms: average,
        }
    }

    /// Spawn the recurring refresh + validation task. The returned handle
    /// completes once the token is cancelled, so shutdown is deterministic.
    pub fn spawn_refresher(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(pool.config.refresh_interval) => {
                        log::info!("periodic proxy refresh");
                        pool.refresh().await;
                        pool.validate(&cancel).await;
                    }
                }
            }
            log::debug!("proxy refresher stopped");
        })
    }

    /// Load the cache file; `Ok(true)` when it was fresh and applied.
    pub fn load_cache(&self) -> Result<bool, ProxyPoolError> {
        let raw = match std::fs::read_to_string(&self.config.cache_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(ProxyPoolError::CacheRead(err)),
        };
        let cache: ProxyCacheFile = serde_json::from_str(&raw)?;

        let age = Utc::now().signed_duration_since(cache.last_updated);
        let ttl = chrono::Duration::from_std(self.config.cache_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        if age > ttl {
            return Ok(false);
        }

        let mut state = self.state.write().expect("proxy pool lock poisoned");
        state.proxies = cache.proxies;
        state.last_updated = Some(cache.last_updated);
        state.recompute_working();
        Ok(true)
    }

    /// Atomic cache write: a uniquely-named temp file in the same directory,
    /// then rename. A concurrent reader never observes a partial file, and
    /// concurrent writers (background refresher plus a foreground validation
    /// pass) never share a temp file.
    pub fn save_cache(&self) -> Result<(), ProxyPoolError> {
        let (proxies, working, last_updated) = {
            let state = self.state.read().expect("proxy pool lock poisoned");
            (
                state.proxies.clone(),
                state.working.len(),
                state.last_updated.unwrap_or_else(Utc::now),
            )
        };
        let cache = ProxyCacheFile {
            proxies,
            last_updated,
            working_count: working,
        };
        let serialized = serde_json::to_string_pretty(&cache)?;

        let parent = self
            .config
            .cache_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(ProxyPoolError::CacheWrite)?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(parent).map_err(ProxyPoolError::CacheWrite)?;
        tmp.write_all(serialized.as_bytes())
            .map_err(ProxyPoolError::CacheWrite)?;
        tmp.persist(&self.config.cache_path)
            .map_err(|err| ProxyPoolError::CacheWrite(err.error))?;
        Ok(())
    }

    /// Replace the candidate set directly. Intended for tests and for callers
    /// that bring their own proxy list instead of the public sources.
    pub fn load_records(&self, records: Vec<ProxyRecord>) {
        let mut state = self.state.write().expect("proxy pool lock poisoned");
        state.proxies = records;
        state.last_updated = Some(Utc::now());
        state.recompute_working();
    }
}

impl std::fmt::Debug for ProxyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().expect("proxy pool lock poisoned");
        f.debug_struct("ProxyPool")
            .field("total", &state.proxies.len())
            .field("working", &state.working.len())
            .finish()
    }
}

/// Parse a plaintext proxy list, dropping anything that is not a strict
/// `ip:port` line.
pub fn parse_proxy_list(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| PROXY_LINE.is_match(line))
        .map(|line| line.to_string())
        .collect()
}

/// The echo endpoint reports every hop it saw; a comma in the origin means
/// the caller's real address leaked alongside the proxy's.
fn infer_anonymity(body: &str) -> AnonymityLevel {
    let origin = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("origin").and_then(|o| o.as_str()).map(str::to_string));
    match origin {
        Some(origin) if origin.contains(',') => AnonymityLevel::Transparent,
        Some(_) => AnonymityLevel::Anonymous,
        None => AnonymityLevel::Unknown,
    }
}
