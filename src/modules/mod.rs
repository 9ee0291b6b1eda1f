//! Anti-detection building blocks
//!
//! Proxy sourcing and rotation, synthetic browser identities, human-like
//! pacing, and the session event channel. The session controller composes
//! these; each is also usable standalone.

pub mod behavior;
pub mod events;
pub mod identity;
pub mod proxy;

// Re-export commonly used types
pub use behavior::{
    BehaviorConfig,
    BehaviorSimulator,
    Keystroke,
    WatchAction,
    WatchSegment,
    char_multiplier,
};
pub use events::{
    ActionEvent, EventDispatcher, EventHandler, LoggingHandler, PostResponseEvent,
    PreRequestEvent, ProxyFailedEvent, RotationEvent, SessionEvent,
};
pub use identity::{
    BrowserFamily,
    BrowserInfo,
    CanvasFingerprint,
    FingerprintSummary,
    IdentityGenerator,
    IdentityProfile,
    Os,
    ScreenInfo,
    TimezoneInfo,
    WebRtcFingerprint,
    derive_browser_info,
};
pub use proxy::{
    AnonymityLevel,
    DEFAULT_PROXY_SOURCES,
    ProxyPool,
    ProxyPoolConfig,
    ProxyPoolError,
    ProxyPoolStats,
    ProxyRecord,
    parse_proxy_list,
};
