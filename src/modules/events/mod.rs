//! Session event channel.
//!
//! Broadcasts rotation, request, and proxy activity to registered handlers.
//! Dashboard and monitor layers subscribe here for push updates; the default
//! handler just logs.

use chrono::{DateTime, Utc};
use http::Method;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Identity/session rotation.
#[derive(Debug, Clone)]
pub struct RotationEvent {
    pub requests_served: u32,
    pub session_age: Duration,
    pub new_fingerprint: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PreRequestEvent {
    pub url: Url,
    pub method: Method,
    pub proxy: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PostResponseEvent {
    pub url: Url,
    pub status: u16,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

/// A live request failed through a proxy; the pool demoted it.
#[derive(Debug, Clone)]
pub struct ProxyFailedEvent {
    pub address: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Simulated engagement action finished.
#[derive(Debug, Clone)]
pub struct ActionEvent {
    pub kind: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Rotation(RotationEvent),
    PreRequest(PreRequestEvent),
    PostResponse(PostResponseEvent),
    ProxyFailed(ProxyFailedEvent),
    /// No proxy was available; the request went out directly.
    Degraded { url: Url, timestamp: DateTime<Utc> },
    Action(ActionEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &SessionEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: SessionEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Rotation(rotation) => {
                log::info!(
                    "session rotated after {} requests ({:.0}s), fingerprint {}",
                    rotation.requests_served,
                    rotation.session_age.as_secs_f64(),
                    rotation.new_fingerprint
                );
            }
            SessionEvent::PreRequest(pre) => {
                log::debug!(
                    "-> {} {} via {}",
                    pre.method,
                    pre.url,
                    pre.proxy.as_deref().unwrap_or("direct")
                );
            }
            SessionEvent::PostResponse(post) => {
                log::debug!(
                    "<- {} -> {} ({:.2}s)",
                    post.url,
                    post.status,
                    post.latency.as_secs_f64()
                );
            }
            SessionEvent::ProxyFailed(failed) => {
                log::warn!("proxy {} failed in use: {}", failed.address, failed.error);
            }
            SessionEvent::Degraded { url, .. } => {
                log::warn!("no proxy available, direct connection to {url}");
            }
            SessionEvent::Action(action) => {
                log::info!("action {} success={}", action.kind, action.success);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl EventHandler for Counter {
        fn handle(&self, _event: &SessionEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn dispatches_to_all_handlers() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register_handler(counter.clone());
        dispatcher.register_handler(Arc::new(LoggingHandler));

        dispatcher.dispatch(SessionEvent::Action(ActionEvent {
            kind: "like".into(),
            success: true,
            timestamp: Utc::now(),
        }));
        dispatcher.dispatch(SessionEvent::Degraded {
            url: Url::parse("https://example.com/watch").unwrap(),
            timestamp: Utc::now(),
        });

        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
