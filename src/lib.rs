//! # stealthkit
//!
//! Anti-detection toolkit for simulated browser traffic: rotating proxy
//! pools, internally-consistent synthetic identities, human-like pacing, and
//! a session controller that ties them together behind one request path.
//!
//! All network effects are simulated against placeholder endpoints; the crate
//! demonstrates the techniques without driving real platform traffic.
//!
//! ## Example
//!
//! ```no_run
//! use stealthkit::{RequestOptions, StealthSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = StealthSession::builder().build();
//!     let refresher = session.start().await;
//!
//!     let response = session
//!         .make_stealth_request("https://example.com/watch", RequestOptions::default())
//!         .await?;
//!     println!("status: {}", response.status);
//!
//!     let outcomes = session.simulate_video_watch("https://example.com/watch", 60).await;
//!     println!("watched {} segments", outcomes.len());
//!
//!     refresher.abort();
//!     Ok(())
//! }
//! ```

mod session;

pub mod modules;
pub mod transport;

pub use crate::session::{
    ActionReport,
    AntiDetectionSummary,
    OutcomePredicate,
    RandomOutcome,
    RequestOptions,
    ResponseHistogram,
    SessionState,
    SessionStats,
    SessionSummary,
    StealthConfig,
    StealthError,
    StealthResult,
    StealthSession,
    StealthSessionBuilder,
    TimeRecommendation,
    WatchOutcome,
    optimal_time_at,
};

pub use crate::transport::{
    ReqwestStealthClient,
    StealthHttpClient,
    StealthRequest,
    StealthResponse,
    TransportError,
};

pub use crate::modules::{
    AnonymityLevel,
    BehaviorConfig,
    BehaviorSimulator,
    BrowserFamily,
    BrowserInfo,
    EventDispatcher,
    EventHandler,
    FingerprintSummary,
    IdentityGenerator,
    IdentityProfile,
    Keystroke,
    LoggingHandler,
    ProxyPool,
    ProxyPoolConfig,
    ProxyPoolError,
    ProxyPoolStats,
    ProxyRecord,
    SessionEvent,
    WatchAction,
    WatchSegment,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
