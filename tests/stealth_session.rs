use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use http::HeaderMap;
use stealthkit::modules::proxy::AnonymityLevel;
use stealthkit::{
    BehaviorConfig, ProxyPool, ProxyPoolConfig, ProxyRecord, RandomOutcome, RequestOptions,
    StealthConfig, StealthHttpClient, StealthRequest, StealthResponse, StealthSession,
    TransportError,
};
use tokio_util::sync::CancellationToken;

fn ok_response(request: &StealthRequest, body: &str) -> StealthResponse {
    StealthResponse {
        status: 200,
        headers: HeaderMap::new(),
        body: Bytes::from(body.to_string()),
        url: request.url.clone(),
    }
}

fn record(address: &str, working: bool, ms: Option<u64>) -> ProxyRecord {
    ProxyRecord {
        address: address.to_string(),
        working: Some(working),
        last_checked: Some(Utc::now()),
        response_time_ms: ms,
        anonymity: AnonymityLevel::Unknown,
    }
}

/// Collapse every behavioral wait so the flow tests run instantly.
fn instant_config(cache_dir: &std::path::Path) -> StealthConfig {
    StealthConfig {
        proxy: ProxyPoolConfig {
            cache_path: cache_dir.join("proxies.json"),
            ..Default::default()
        },
        behavior: BehaviorConfig {
            time_dilation: 0.0,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Succeeds for everything; counts list fetches and executed requests.
struct CountingTransport {
    fetches: AtomicUsize,
    requests: AtomicUsize,
}

impl CountingTransport {
    fn new() -> Self {
        Self {
            fetches: AtomicUsize::new(0),
            requests: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StealthHttpClient for CountingTransport {
    async fn fetch_text(&self, _url: &str, _timeout: Duration) -> Result<String, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok("8.8.8.8:3128\n".to_string())
    }

    async fn execute(&self, request: &StealthRequest) -> Result<StealthResponse, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(ok_response(request, r#"{"origin": "8.8.8.8"}"#))
    }
}

/// Fails any request routed through one specific proxy address.
struct FlakyTransport {
    fail_address: String,
}

#[async_trait]
impl StealthHttpClient for FlakyTransport {
    async fn fetch_text(&self, _url: &str, _timeout: Duration) -> Result<String, TransportError> {
        Ok(String::new())
    }

    async fn execute(&self, request: &StealthRequest) -> Result<StealthResponse, TransportError> {
        if request.proxy.as_deref() == Some(self.fail_address.as_str()) {
            return Err(TransportError::Connect("connection reset".into()));
        }
        Ok(ok_response(request, "ok"))
    }
}

fn shared_pool(
    config: &StealthConfig,
    transport: Arc<dyn StealthHttpClient>,
    records: Vec<ProxyRecord>,
) -> Arc<ProxyPool> {
    let pool = Arc::new(ProxyPool::new(config.proxy.clone(), transport).with_seed(5));
    pool.load_records(records);
    pool
}

#[tokio::test]
async fn session_rotates_after_request_budget() {
    let dir = tempfile::tempdir().unwrap();
    let config = instant_config(dir.path());
    let transport = Arc::new(CountingTransport::new());
    let pool = shared_pool(
        &config,
        transport.clone(),
        vec![record("1.1.1.1:80", true, Some(100))],
    );

    let mut session = StealthSession::builder()
        .with_config(config)
        .with_transport(transport)
        .with_proxy_pool(pool)
        .with_seed(42)
        .build();

    let budget = session.state().max_requests;
    let first_fingerprint = session.profile().canvas.hash.clone();
    assert!((20..70).contains(&budget));

    for _ in 0..budget {
        session
            .make_stealth_request("https://example.com/watch", RequestOptions::default())
            .await
            .unwrap();
    }
    assert_eq!(session.state().request_count, budget);
    assert_eq!(session.profile().canvas.hash, first_fingerprint);

    // The budget is exhausted, so the next request must rotate first.
    session
        .make_stealth_request("https://example.com/watch", RequestOptions::default())
        .await
        .unwrap();
    assert_ne!(session.profile().canvas.hash, first_fingerprint);
    assert_eq!(session.state().request_count, 1);
}

#[tokio::test]
async fn session_rotates_on_elapsed_interval() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = instant_config(dir.path());
    // A zero-width interval makes the time threshold due immediately.
    config.rotation_interval_range = (Duration::ZERO, Duration::ZERO);
    let transport = Arc::new(CountingTransport::new());
    let pool = shared_pool(
        &config,
        transport.clone(),
        vec![record("1.1.1.1:80", true, Some(100))],
    );

    let mut session = StealthSession::builder()
        .with_config(config)
        .with_transport(transport)
        .with_proxy_pool(pool)
        .with_seed(23)
        .build();

    let first_fingerprint = session.profile().canvas.hash.clone();
    assert_eq!(session.state().request_count, 0);
    tokio::time::sleep(Duration::from_millis(10)).await;

    // No request budget has been spent; only elapsed time forces this.
    session
        .make_stealth_request("https://example.com/watch", RequestOptions::default())
        .await
        .unwrap();
    assert_ne!(session.profile().canvas.hash, first_fingerprint);
    assert_eq!(session.state().request_count, 1);
}

#[tokio::test]
async fn failed_proxy_is_demoted_and_request_retried() {
    let dir = tempfile::tempdir().unwrap();
    let config = instant_config(dir.path());
    let transport = Arc::new(FlakyTransport {
        fail_address: "1.1.1.1:80".to_string(),
    });
    // Only the failing proxy is under the fast threshold, so the first pick
    // always routes through it; the retry has to fall back to the slow one.
    let pool = shared_pool(
        &config,
        transport.clone(),
        vec![
            record("1.1.1.1:80", true, Some(100)),
            record("2.2.2.2:80", true, Some(4000)),
        ],
    );

    let mut session = StealthSession::builder()
        .with_config(config)
        .with_transport(transport)
        .with_proxy_pool(pool.clone())
        .with_seed(7)
        .build();

    let response = session
        .make_stealth_request("https://example.com/feed", RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(response.status, 200);

    assert_eq!(pool.working_count(), 1);
    assert_eq!(pool.pick().unwrap().address, "2.2.2.2:80");
}

#[tokio::test]
async fn request_fails_when_no_alternative_proxy_remains() {
    let dir = tempfile::tempdir().unwrap();
    let config = instant_config(dir.path());
    let transport = Arc::new(FlakyTransport {
        fail_address: "1.1.1.1:80".to_string(),
    });
    let pool = shared_pool(
        &config,
        transport.clone(),
        vec![record("1.1.1.1:80", true, Some(100))],
    );

    let mut session = StealthSession::builder()
        .with_config(config)
        .with_transport(transport)
        .with_proxy_pool(pool.clone())
        .with_seed(7)
        .build();

    let result = session
        .make_stealth_request("https://example.com/feed", RequestOptions::default())
        .await;
    assert!(result.is_err());
    assert_eq!(pool.working_count(), 0);
}

/// Probe harness for the validation pass: one dead proxy, one anonymous, one
/// transparent.
struct ProbeTransport;

#[async_trait]
impl StealthHttpClient for ProbeTransport {
    async fn fetch_text(&self, _url: &str, _timeout: Duration) -> Result<String, TransportError> {
        Ok(String::new())
    }

    async fn execute(&self, request: &StealthRequest) -> Result<StealthResponse, TransportError> {
        match request.proxy.as_deref() {
            Some("1.1.1.1:80") => Err(TransportError::Timeout(request.timeout)),
            Some("2.2.2.2:80") => Ok(ok_response(request, r#"{"origin": "2.2.2.2"}"#)),
            Some("3.3.3.3:80") => {
                Ok(ok_response(request, r#"{"origin": "3.3.3.3, 198.51.100.7"}"#))
            }
            other => Err(TransportError::Connect(format!("unexpected proxy {other:?}"))),
        }
    }
}

#[tokio::test]
async fn validation_classifies_probe_results() {
    let dir = tempfile::tempdir().unwrap();
    let config = ProxyPoolConfig {
        cache_path: dir.path().join("proxies.json"),
        ..Default::default()
    };
    let pool = ProxyPool::new(config.clone(), Arc::new(ProbeTransport));
    pool.load_records(vec![
        ProxyRecord {
            address: "1.1.1.1:80".into(),
            working: None,
            last_checked: None,
            response_time_ms: None,
            anonymity: AnonymityLevel::Unknown,
        },
        ProxyRecord {
            address: "2.2.2.2:80".into(),
            working: None,
            last_checked: None,
            response_time_ms: None,
            anonymity: AnonymityLevel::Unknown,
        },
        ProxyRecord {
            address: "3.3.3.3:80".into(),
            working: None,
            last_checked: None,
            response_time_ms: None,
            anonymity: AnonymityLevel::Unknown,
        },
    ]);

    pool.validate(&CancellationToken::new()).await;
    assert_eq!(pool.working_count(), 2);

    // The validation pass persists its verdicts; inspect them via the cache.
    let raw = std::fs::read_to_string(&config.cache_path).unwrap();
    let cache: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(cache["workingCount"], 2);
    let by_address = |addr: &str| -> serde_json::Value {
        cache["proxies"]
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["address"] == addr)
            .cloned()
            .unwrap()
    };
    assert_eq!(by_address("1.1.1.1:80")["working"], false);
    assert_eq!(by_address("2.2.2.2:80")["anonymity"], "anonymous");
    assert_eq!(by_address("3.3.3.3:80")["anonymity"], "transparent");
}

#[tokio::test]
async fn fresh_cache_skips_source_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let config = ProxyPoolConfig {
        cache_path: dir.path().join("proxies.json"),
        ..Default::default()
    };

    let seed_pool = ProxyPool::new(config.clone(), Arc::new(CountingTransport::new()));
    seed_pool.load_records(vec![record("1.1.1.1:80", true, Some(120))]);
    seed_pool.save_cache().unwrap();

    let transport = Arc::new(CountingTransport::new());
    let pool = ProxyPool::new(config, transport.clone());
    pool.ensure_ready(&CancellationToken::new()).await;

    assert_eq!(transport.fetches.load(Ordering::SeqCst), 0);
    assert_eq!(pool.working_count(), 1);
}

#[tokio::test]
async fn simulated_actions_report_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let config = instant_config(dir.path());
    let transport = Arc::new(CountingTransport::new());
    let pool = shared_pool(
        &config,
        transport.clone(),
        vec![record("1.1.1.1:80", true, Some(100))],
    );

    let mut session = StealthSession::builder()
        .with_config(config)
        .with_transport(transport)
        .with_proxy_pool(pool)
        .with_outcome_predicate(Arc::new(RandomOutcome::with_seed(1.0, 3)))
        .with_seed(11)
        .build();

    let like = session.simulate_like("https://example.com/videos/1/like").await;
    assert!(like.success);
    assert_eq!(like.status, Some(200));
    assert!(like.error.is_none());

    let comment = session
        .simulate_comment("https://example.com/videos/1/comments", "Great video!")
        .await;
    assert!(comment.success);
    assert_eq!(comment.comment.as_deref(), Some("Great video!"));
}

#[tokio::test]
async fn watch_simulation_covers_every_segment() {
    let dir = tempfile::tempdir().unwrap();
    let config = instant_config(dir.path());
    let transport = Arc::new(CountingTransport::new());
    let pool = shared_pool(
        &config,
        transport.clone(),
        vec![record("1.1.1.1:80", true, Some(100))],
    );

    let mut session = StealthSession::builder()
        .with_config(config)
        .with_transport(transport)
        .with_proxy_pool(pool)
        .with_seed(13)
        .build();

    let outcomes = session
        .simulate_video_watch("https://example.com/videos/1", 45)
        .await;
    assert_eq!(outcomes.len(), 5);
    assert!(outcomes.iter().all(|o| o.completed));
    assert_eq!(outcomes[0].segment_start, 0);
    assert_eq!(outcomes[4].segment_start, 40);
}

#[tokio::test]
async fn cancelled_watch_stops_at_segment_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let config = instant_config(dir.path());
    let transport = Arc::new(CountingTransport::new());
    let pool = shared_pool(
        &config,
        transport.clone(),
        vec![record("1.1.1.1:80", true, Some(100))],
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut session = StealthSession::builder()
        .with_config(config)
        .with_transport(transport)
        .with_proxy_pool(pool)
        .with_cancellation_token(cancel)
        .with_seed(17)
        .build();

    let outcomes = session
        .simulate_video_watch("https://example.com/videos/1", 60)
        .await;
    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].completed);
}

#[tokio::test]
async fn stats_reflect_session_activity() {
    let dir = tempfile::tempdir().unwrap();
    let config = instant_config(dir.path());
    let transport = Arc::new(CountingTransport::new());
    let pool = shared_pool(
        &config,
        transport.clone(),
        vec![record("1.1.1.1:80", true, Some(100))],
    );

    let mut session = StealthSession::builder()
        .with_config(config)
        .with_transport(transport)
        .with_proxy_pool(pool)
        .with_seed(19)
        .build();

    for _ in 0..3 {
        session
            .make_stealth_request("https://example.com/feed", RequestOptions::default())
            .await
            .unwrap();
    }

    let stats = session.stats();
    assert_eq!(stats.session.requests, 3);
    assert_eq!(stats.session.histogram.r2xx, 3);
    assert_eq!(stats.proxy.working, 1);
    assert_eq!(
        stats.anti_detection.current_fingerprint,
        session.profile().canvas.hash
    );
    assert!(stats.anti_detection.rotation_interval_minutes >= 10.0);
    assert!(stats.anti_detection.rotation_interval_minutes < 20.0);

    // The whole surface must serialize for the monitoring endpoint.
    let json = serde_json::to_value(&stats).unwrap();
    assert!(json["session"]["histogram"]["r2xx"].is_number());
    assert!(json["timing"]["score"].is_number());
}
