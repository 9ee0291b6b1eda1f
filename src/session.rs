//! High level session orchestration.
//!
//! Wires the proxy pool, identity generator, and pacing simulator into a
//! single controller that gates every outbound call behind rotation policy,
//! assembles stealth headers, and exposes the simulated engagement entry
//! points consumed by the orchestration layer.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, Local, Timelike, Utc, Weekday};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::modules::behavior::{BehaviorConfig, BehaviorSimulator, WatchAction};
use crate::modules::events::{
    ActionEvent, EventDispatcher, EventHandler, LoggingHandler, PostResponseEvent, PreRequestEvent,
    ProxyFailedEvent, RotationEvent, SessionEvent,
};
use crate::modules::identity::{FingerprintSummary, IdentityGenerator, IdentityProfile};
use crate::modules::proxy::{ProxyPool, ProxyPoolConfig, ProxyPoolStats};
use crate::transport::{
    ReqwestStealthClient, StealthHttpClient, StealthRequest, StealthResponse, TransportError,
};

/// Result alias used across the session layer.
pub type StealthResult<T> = Result<T, StealthError>;

/// Terminal errors for a single stealth action. Degraded conditions (no
/// proxy, single-source fetch failures) never surface here.
#[derive(Debug, Error)]
pub enum StealthError {
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("request failed: {0}")]
    Transport(#[from] TransportError),
}

/// Fixed peak hours observed on the target platform.
const PEAK_HOURS: &[u32] = &[9, 12, 15, 19, 21];

fn weekday_multiplier(day: Weekday) -> f64 {
    match day {
        Weekday::Mon => 0.8,
        Weekday::Tue => 0.9,
        Weekday::Wed => 1.0,
        Weekday::Thu => 0.95,
        Weekday::Fri => 0.85,
        Weekday::Sat => 0.7,
        Weekday::Sun => 0.6,
    }
}

/// Advisory traffic-timing recommendation; never blocks a request.
#[derive(Debug, Clone, Serialize)]
pub struct TimeRecommendation {
    pub optimal: bool,
    pub score: f64,
    pub recommendation: &'static str,
}

/// Pure scoring over the peak-hour and weekday tables.
pub fn optimal_time_at(hour: u32, weekday: Weekday) -> TimeRecommendation {
    let peak = PEAK_HOURS.contains(&hour);
    let score = if peak { 0.8 } else { 0.4 } * weekday_multiplier(weekday);
    TimeRecommendation {
        optimal: score > 0.6,
        score,
        recommendation: if score > 0.6 {
            "Good time for activity"
        } else {
            "Consider waiting for peak hours"
        },
    }
}

/// Per-session counters; replaced wholesale on every rotation with freshly
/// randomized thresholds. The jitter is part of the anti-detection contract.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub started_at: DateTime<Utc>,
    pub request_count: u32,
    pub rotation_interval: Duration,
    pub last_rotation: Instant,
    pub last_rotation_at: DateTime<Utc>,
    pub max_requests: u32,
    pub histogram: ResponseHistogram,
    pub total_response_time: Duration,
}

impl SessionState {
    fn fresh(rng: &mut StdRng, interval_range: (Duration, Duration)) -> Self {
        let lo = interval_range.0.min(interval_range.1).as_millis() as u64;
        let hi = interval_range.0.max(interval_range.1).as_millis() as u64;
        let interval = if lo >= hi { lo } else { rng.gen_range(lo..hi) };
        Self {
            started_at: Utc::now(),
            request_count: 0,
            rotation_interval: Duration::from_millis(interval),
            last_rotation: Instant::now(),
            last_rotation_at: Utc::now(),
            max_requests: rng.gen_range(20..70),
            histogram: ResponseHistogram::default(),
            total_response_time: Duration::ZERO,
        }
    }

    fn record_response(&mut self, status: u16, latency: Duration) {
        self.request_count += 1;
        self.histogram.record(status);
        self.total_response_time += latency;
    }
}

/// Response counts by status class.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ResponseHistogram {
    pub r2xx: u32,
    pub r3xx: u32,
    pub r4xx: u32,
    pub r5xx: u32,
}

impl ResponseHistogram {
    fn record(&mut self, status: u16) {
        match status / 100 {
            2 => self.r2xx += 1,
            3 => self.r3xx += 1,
            4 => self.r4xx += 1,
            5 => self.r5xx += 1,
            _ => {}
        }
    }
}

/// Per-request options for [`StealthSession::make_stealth_request`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    /// Overrides the session-level request timeout when set.
    pub timeout: Option<Duration>,
    /// Wait a human-like delay before dispatch. Callers that already paced
    /// themselves (typing, pre-action delays) turn this off.
    pub pre_request_delay: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            pre_request_delay: true,
        }
    }
}

impl RequestOptions {
    pub fn post_json(value: serde_json::Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("application/json"),
        );
        Self {
            method: Method::POST,
            headers,
            body: Some(value.to_string().into_bytes()),
            ..Default::default()
        }
    }
}

/// Decides whether a simulated platform action counts as a success.
///
/// The watch/like/comment endpoints are placeholders, so the verdict is
/// injected rather than hard-coded; the default is a random gate.
pub trait OutcomePredicate: Send + Sync {
    fn judge(&self, response: &StealthResponse) -> bool;
}

/// Default predicate: succeed at a fixed rate, seedable for tests.
pub struct RandomOutcome {
    success_rate: f64,
    rng: StdMutex<StdRng>,
}

impl RandomOutcome {
    pub fn new(success_rate: f64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
            rng: StdMutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(success_rate: f64, seed: u64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
            rng: StdMutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl OutcomePredicate for RandomOutcome {
    fn judge(&self, _response: &StealthResponse) -> bool {
        let mut rng = self.rng.lock().expect("rng lock poisoned");
        rng.gen_bool(self.success_rate)
    }
}

/// Outcome of one watch-plan segment.
#[derive(Debug, Clone, Serialize)]
pub struct WatchOutcome {
    pub segment_start: u64,
    pub action: WatchAction,
    pub completed: bool,
}

/// Result of a simulated like/comment. Expected failures are reported here
/// instead of raised, so a batch can continue past them.
#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    pub success: bool,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub comment: Option<String>,
}

/// Stats surface consumed by the dashboard/monitor layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session: SessionSummary,
    pub proxy: ProxyPoolStats,
    pub behavior: FingerprintSummary,
    pub timing: TimeRecommendation,
    pub anti_detection: AntiDetectionSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub uptime_ms: u64,
    pub requests: u32,
    pub last_rotation: DateTime<Utc>,
    pub next_rotation: DateTime<Utc>,
    pub histogram: ResponseHistogram,
    pub average_response_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AntiDetectionSummary {
    pub rotation_interval_minutes: f64,
    pub max_requests_per_session: u32,
    pub current_fingerprint: String,
}

/// Session-level configuration.
#[derive(Debug, Clone)]
pub struct StealthConfig {
    pub proxy: ProxyPoolConfig,
    pub behavior: BehaviorConfig,
    pub request_timeout: Duration,
    /// Range of the optional delay before each stealth request.
    pub pre_request_delay: (Duration, Duration),
    /// Range of the forced pause during rotation, so an identity switch is
    /// never instantaneous.
    pub rotation_delay: (Duration, Duration),
    /// Range the per-session rotation interval is drawn from at each
    /// rotation.
    pub rotation_interval_range: (Duration, Duration),
}

impl Default for StealthConfig {
    fn default() -> Self {
        Self {
            proxy: ProxyPoolConfig::default(),
            behavior: BehaviorConfig::default(),
            request_timeout: Duration::from_secs(15),
            pre_request_delay: (Duration::from_millis(500), Duration::from_millis(2000)),
            rotation_delay: (Duration::from_millis(2000), Duration::from_millis(5000)),
            rotation_interval_range: (Duration::from_secs(600), Duration::from_secs(1200)),
        }
    }
}

/// Fluent builder for [`StealthSession`].
pub struct StealthSessionBuilder {
    config: StealthConfig,
    transport: Option<Arc<dyn StealthHttpClient>>,
    pool: Option<Arc<ProxyPool>>,
    outcome: Option<Arc<dyn OutcomePredicate>>,
    handlers: Vec<Arc<dyn EventHandler>>,
    cancel: Option<CancellationToken>,
    seed: Option<u64>,
}

impl StealthSessionBuilder {
    pub fn new() -> Self {
        Self {
            config: StealthConfig::default(),
            transport: None,
            pool: None,
            outcome: None,
            handlers: Vec::new(),
            cancel: None,
            seed: None,
        }
    }

    pub fn with_config(mut self, config: StealthConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn StealthHttpClient>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share an existing pool across sessions instead of building a private
    /// one from the config.
    pub fn with_proxy_pool(mut self, pool: Arc<ProxyPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_outcome_predicate(mut self, outcome: Arc<dyn OutcomePredicate>) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Pin every random decision the session makes.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> StealthSession {
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestStealthClient::new()));
        let pool = self.pool.unwrap_or_else(|| {
            Arc::new(ProxyPool::new(self.config.proxy.clone(), transport.clone()))
        });
        let outcome = self
            .outcome
            .unwrap_or_else(|| Arc::new(RandomOutcome::new(0.9)));

        let mut events = EventDispatcher::new();
        events.register_handler(Arc::new(LoggingHandler));
        for handler in self.handlers {
            events.register_handler(handler);
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut identity = match self.seed {
            Some(seed) => IdentityGenerator::with_seed(seed.wrapping_add(1)),
            None => IdentityGenerator::new(),
        };
        let behavior = match self.seed {
            Some(seed) => BehaviorSimulator::with_seed(self.config.behavior.clone(), seed.wrapping_add(2)),
            None => BehaviorSimulator::new(self.config.behavior.clone()),
        };

        let profile = identity.generate();
        let state = SessionState::fresh(&mut rng, self.config.rotation_interval_range);

        StealthSession {
            config: self.config,
            transport,
            pool,
            outcome,
            events: Arc::new(events),
            cancel: self.cancel.unwrap_or_default(),
            started_at: Utc::now(),
            identity,
            behavior,
            profile,
            state,
            rng,
        }
    }
}

impl Default for StealthSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Session-rotation controller and single entry point for stealth traffic.
///
/// Owns exactly one current [`IdentityProfile`] and one [`SessionState`];
/// both are replaced wholesale on rotation. Rotation always completes before
/// any request proceeds.
pub struct StealthSession {
    config: StealthConfig,
    transport: Arc<dyn StealthHttpClient>,
    pool: Arc<ProxyPool>,
    outcome: Arc<dyn OutcomePredicate>,
    events: Arc<EventDispatcher>,
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
    identity: IdentityGenerator,
    behavior: BehaviorSimulator,
    profile: IdentityProfile,
    state: SessionState,
    rng: StdRng,
}

impl StealthSession {
    pub fn builder() -> StealthSessionBuilder {
        StealthSessionBuilder::new()
    }

    pub fn new() -> Self {
        StealthSessionBuilder::new().build()
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    pub fn profile(&self) -> &IdentityProfile {
        &self.profile
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Warm the proxy pool (cache or full refresh) and start the recurring
    /// background refresher tied to this session's cancellation token.
    pub async fn start(&self) -> tokio::task::JoinHandle<()> {
        self.pool.ensure_ready(&self.cancel).await;
        self.pool.spawn_refresher(self.cancel.clone())
    }

    /// Rotate if either the time or the volume threshold has been crossed.
    pub async fn check_rotation_needs(&mut self) {
        let time_due = self.state.last_rotation.elapsed() > self.state.rotation_interval;
        let volume_due = self.state.request_count >= self.state.max_requests;
        if time_due || volume_due {
            log::info!(
                "rotation due (time={time_due}, volume={volume_due}), rotating session"
            );
            self.rotate().await;
        }
    }

    /// Force a rotation, e.g. from an admin action.
    pub async fn rotate_session(&mut self) {
        self.rotate().await;
    }

    async fn rotate(&mut self) {
        let served = self.state.request_count;
        let age = self.state.last_rotation.elapsed();

        self.profile = self.identity.generate();
        self.state = SessionState::fresh(&mut self.rng, self.config.rotation_interval_range);

        self.events.dispatch(SessionEvent::Rotation(RotationEvent {
            requests_served: served,
            session_age: age,
            new_fingerprint: self.profile.canvas.hash.clone(),
            timestamp: Utc::now(),
        }));

        // An instantaneous identity switch is itself a signature.
        let (min, max) = self.config.rotation_delay;
        let pause = self.behavior.human_delay(min, max);
        sleep(pause).await;
    }

    /// Assemble a fully-specified outbound request: proxy routing, identity
    /// headers, browser-consistent client hints, and randomized
    /// network-quality hints.
    pub fn build_request(&mut self, url: Url, options: &RequestOptions) -> StealthRequest {
        let proxy = self.pool.pick();
        if proxy.is_none() {
            log::warn!("no proxy available, proceeding with direct connection");
            self.events.dispatch(SessionEvent::Degraded {
                url: url.clone(),
                timestamp: Utc::now(),
            });
        }

        let mut headers = self.profile.to_http_headers();
        set_header(&mut headers, "sec-ch-ua", &self.profile.sec_ch_ua());
        set_header(
            &mut headers,
            "sec-ch-ua-mobile",
            if self.profile.is_mobile() { "?1" } else { "?0" },
        );
        set_header(
            &mut headers,
            "sec-ch-ua-platform",
            &format!("\"{}\"", self.profile.browser.os.platform_label()),
        );
        set_header(
            &mut headers,
            "viewport-width",
            &self.profile.screen.width.to_string(),
        );

        // Network-quality hints are re-rolled per request; a perfectly
        // stable link is its own fingerprint.
        let device_memory = *["2", "4", "8"].choose(&mut self.rng).expect("choices");
        set_header(&mut headers, "device-memory", device_memory);
        set_header(
            &mut headers,
            "downlink",
            &format!("{:.1}", self.rng.gen_range(1.0..11.0)),
        );
        set_header(
            &mut headers,
            "rtt",
            &self.rng.gen_range(50u32..150).to_string(),
        );
        let ect = *["4g", "3g"].choose(&mut self.rng).expect("choices");
        set_header(&mut headers, "ect", ect);
        if self.rng.gen_bool(0.1) {
            set_header(&mut headers, "save-data", "on");
        }

        for (name, value) in options.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }

        StealthRequest {
            method: options.method.clone(),
            url,
            headers,
            body: options.body.clone(),
            proxy: proxy.map(|p| p.address),
            timeout: options.timeout.unwrap_or(self.config.request_timeout),
        }
    }

    /// Rotation-gated, paced, proxied request with a single retry through a
    /// different proxy when the pool has alternatives.
    pub async fn make_stealth_request(
        &mut self,
        url: &str,
        options: RequestOptions,
    ) -> StealthResult<StealthResponse> {
        let url = Url::parse(url)?;
        self.check_rotation_needs().await;

        if options.pre_request_delay {
            let (min, max) = self.config.pre_request_delay;
            let pause = self.behavior.human_delay(min, max);
            sleep(pause).await;
        }

        let request = self.build_request(url.clone(), &options);
        match self.dispatch(&request).await {
            Ok(response) => Ok(response),
            Err(err) => {
                let Some(failed_proxy) = request.proxy.clone() else {
                    // Direct connections have nothing left to rotate through.
                    return Err(err.into());
                };

                self.pool.mark_failed(&failed_proxy);
                self.events
                    .dispatch(SessionEvent::ProxyFailed(ProxyFailedEvent {
                        address: failed_proxy.clone(),
                        error: err.to_string(),
                        timestamp: Utc::now(),
                    }));

                if self.pool.working_count() == 0 {
                    return Err(err.into());
                }

                log::info!("retrying through a different proxy after: {err}");
                let retry = self.build_request(url, &options);
                debug_assert_ne!(retry.proxy.as_deref(), Some(failed_proxy.as_str()));
                self.dispatch(&retry).await.map_err(Into::into)
            }
        }
    }

    async fn dispatch(&mut self, request: &StealthRequest) -> Result<StealthResponse, TransportError> {
        self.events.dispatch(SessionEvent::PreRequest(PreRequestEvent {
            url: request.url.clone(),
            method: request.method.clone(),
            proxy: request.proxy.clone(),
            timestamp: Utc::now(),
        }));

        let started = Instant::now();
        let response = self.transport.execute(request).await?;
        let latency = started.elapsed();

        self.state.record_response(response.status, latency);
        self.events
            .dispatch(SessionEvent::PostResponse(PostResponseEvent {
                url: response.url.clone(),
                status: response.status,
                latency,
                timestamp: Utc::now(),
            }));
        Ok(response)
    }

    /// Walk a segment-based watch plan, sleeping through each segment and
    /// acting out pauses and seeks. Cancellation is honored between segments.
    pub async fn simulate_video_watch(&mut self, url: &str, duration_secs: u64) -> Vec<WatchOutcome> {
        log::info!("starting watch simulation for {duration_secs}s");
        let plan = self.behavior.watch_plan(duration_secs);
        let mut outcomes = Vec::with_capacity(plan.len());

        for segment in plan {
            if self.cancel.is_cancelled() {
                log::info!("watch simulation cancelled at segment {}s", segment.start);
                outcomes.push(WatchOutcome {
                    segment_start: segment.start,
                    action: segment.action,
                    completed: false,
                });
                break;
            }

            sleep(self.behavior.segment_watch_time(&segment)).await;
            if let Some(pause) = segment.extra_pause {
                sleep(pause).await;
            }

            match segment.action {
                WatchAction::Pause => {
                    let pause = self
                        .behavior
                        .human_delay(Duration::from_millis(1000), Duration::from_millis(3000));
                    sleep(pause).await;
                }
                WatchAction::Seek => {
                    let pause = self
                        .behavior
                        .human_delay(Duration::from_millis(500), Duration::from_millis(1500));
                    sleep(pause).await;
                }
                _ => {}
            }

            outcomes.push(WatchOutcome {
                segment_start: segment.start,
                action: segment.action,
                completed: true,
            });
        }

        self.events.dispatch(SessionEvent::Action(ActionEvent {
            kind: "watch".into(),
            success: outcomes.iter().all(|o| o.completed),
            timestamp: Utc::now(),
        }));
        let _ = url; // watch pacing never touches the network in simulation
        outcomes
    }

    /// Simulated like: pre-action pause, then a stealth POST. Failures are
    /// reported, not raised.
    pub async fn simulate_like(&mut self, url: &str) -> ActionReport {
        let pause = self
            .behavior
            .human_delay(Duration::from_millis(1000), Duration::from_millis(5000));
        sleep(pause).await;

        let mut options = RequestOptions::post_json(serde_json::json!({ "action": "like" }));
        options.pre_request_delay = false;
        self.run_action("like", url, options, None).await
    }

    /// Simulated comment: typed character by character with realistic
    /// cadence, a submit pause, then a stealth POST carrying the text.
    pub async fn simulate_comment(&mut self, url: &str, text: &str) -> ActionReport {
        for keystroke in self.behavior.typing_pattern(text) {
            if self.cancel.is_cancelled() {
                break;
            }
            sleep(keystroke.delay).await;
        }
        let pause = self
            .behavior
            .human_delay(Duration::from_millis(500), Duration::from_millis(2000));
        sleep(pause).await;

        let mut options = RequestOptions::post_json(serde_json::json!({
            "action": "comment",
            "text": text,
            "timestamp": Utc::now().timestamp_millis(),
        }));
        options.pre_request_delay = false;
        self.run_action("comment", url, options, Some(text.to_string()))
            .await
    }

    async fn run_action(
        &mut self,
        kind: &str,
        url: &str,
        options: RequestOptions,
        comment: Option<String>,
    ) -> ActionReport {
        let report = match self.make_stealth_request(url, options).await {
            Ok(response) => {
                let success = self.outcome.judge(&response);
                ActionReport {
                    success,
                    status: Some(response.status),
                    error: None,
                    comment,
                }
            }
            Err(err) => ActionReport {
                success: false,
                status: None,
                error: Some(err.to_string()),
                comment,
            },
        };

        self.events.dispatch(SessionEvent::Action(ActionEvent {
            kind: kind.to_string(),
            success: report.success,
            timestamp: Utc::now(),
        }));
        report
    }

    /// Advisory check against the fixed peak-hour and weekday tables.
    pub fn is_optimal_time(&self) -> TimeRecommendation {
        let now = Local::now();
        optimal_time_at(now.hour(), now.weekday())
    }

    /// Aggregate view for dashboards and the health endpoint.
    pub fn stats(&self) -> SessionStats {
        let uptime = Utc::now().signed_duration_since(self.started_at);
        let interval = chrono::Duration::from_std(self.state.rotation_interval)
            .unwrap_or_else(|_| chrono::Duration::minutes(15));
        let average = if self.state.request_count == 0 {
            0
        } else {
            self.state.total_response_time.as_millis() as u64 / self.state.request_count as u64
        };

        SessionStats {
            session: SessionSummary {
                uptime_ms: uptime.num_milliseconds().max(0) as u64,
                requests: self.state.request_count,
                last_rotation: self.state.last_rotation_at,
                next_rotation: self.state.last_rotation_at + interval,
                histogram: self.state.histogram,
                average_response_time_ms: average,
            },
            proxy: self.pool.stats(),
            behavior: self.profile.to_fingerprint(),
            timing: self.is_optimal_time(),
            anti_detection: AntiDetectionSummary {
                rotation_interval_minutes: self.state.rotation_interval.as_secs_f64() / 60.0,
                max_requests_per_session: self.state.max_requests,
                current_fingerprint: self.profile.canvas.hash.clone(),
            },
        }
    }
}

impl Default for StealthSession {
    fn default() -> Self {
        Self::new()
    }
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    let name = HeaderName::from_static(name);
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_hour_midweek_is_optimal() {
        let rec = optimal_time_at(15, Weekday::Wed);
        assert!(rec.optimal);
        assert!((rec.score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn off_hours_are_not_optimal() {
        let rec = optimal_time_at(3, Weekday::Sun);
        assert!(!rec.optimal);
        assert!(rec.score < 0.3);
    }

    #[test]
    fn saturday_peak_still_below_threshold() {
        // 0.8 * 0.7 = 0.56, under the 0.6 bar.
        let rec = optimal_time_at(19, Weekday::Sat);
        assert!(!rec.optimal);
    }

    #[test]
    fn histogram_buckets_by_status_class() {
        let mut histogram = ResponseHistogram::default();
        histogram.record(200);
        histogram.record(204);
        histogram.record(301);
        histogram.record(404);
        histogram.record(503);
        assert_eq!(histogram.r2xx, 2);
        assert_eq!(histogram.r3xx, 1);
        assert_eq!(histogram.r4xx, 1);
        assert_eq!(histogram.r5xx, 1);
    }

    #[test]
    fn fresh_state_thresholds_are_in_contract_range() {
        let mut rng = StdRng::seed_from_u64(11);
        let range = StealthConfig::default().rotation_interval_range;
        for _ in 0..100 {
            let state = SessionState::fresh(&mut rng, range);
            assert!((20..70).contains(&state.max_requests));
            assert!(state.rotation_interval >= Duration::from_secs(600));
            assert!(state.rotation_interval < Duration::from_secs(1200));
        }
    }

    #[test]
    fn degenerate_interval_range_is_taken_literally() {
        let mut rng = StdRng::seed_from_u64(13);
        let state = SessionState::fresh(&mut rng, (Duration::ZERO, Duration::ZERO));
        assert_eq!(state.rotation_interval, Duration::ZERO);
    }
}
