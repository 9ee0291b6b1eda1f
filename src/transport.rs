//! HTTP transport seam for stealth requests and proxy probes.
//!
//! Provides a thin adapter around `reqwest::Client` that converts between the
//! shared HTTP representations used by the session layer and the concrete
//! transport. Clients are cached per proxy endpoint so repeated requests
//! through the same relay reuse connections and cookie jars.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

/// Errors surfaced by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("proxy endpoint rejected: {0}")]
    Proxy(String),
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Fully-specified outbound request assembled by the session layer.
///
/// `proxy` is a bare `host:port` address; `None` means a direct connection
/// (degraded-stealth mode).
#[derive(Debug, Clone)]
pub struct StealthRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl StealthRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
            proxy: None,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Read-only response handed back to the session layer.
#[derive(Debug, Clone)]
pub struct StealthResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: Url,
}

impl StealthResponse {
    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport abstraction so the pool and session layers can be exercised with
/// an in-memory client in tests.
#[async_trait]
pub trait StealthHttpClient: Send + Sync {
    /// Plain GET returning the body as text. Used for proxy-list downloads.
    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, TransportError>;

    /// Execute a fully-assembled stealth request.
    async fn execute(&self, request: &StealthRequest) -> Result<StealthResponse, TransportError>;
}

/// Reqwest-backed transport with one client per proxy endpoint.
pub struct ReqwestStealthClient {
    clients: Mutex<HashMap<Option<String>, reqwest::Client>>,
}

impl ReqwestStealthClient {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn client(&self, proxy: Option<&str>) -> Result<reqwest::Client, TransportError> {
        let mut guard = self.clients.lock().await;
        let key = proxy.map(|p| p.to_string());
        if let Some(client) = guard.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::Client::builder().cookie_store(true);
        if let Some(endpoint) = proxy {
            let scheme = if endpoint.contains("://") {
                endpoint.to_string()
            } else {
                format!("http://{endpoint}")
            };
            let proxy = reqwest::Proxy::all(&scheme)
                .map_err(|err| TransportError::Proxy(err.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        guard.insert(key, client.clone());
        Ok(client)
    }
}

impl Default for ReqwestStealthClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StealthHttpClient for ReqwestStealthClient {
    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, TransportError> {
        let client = self.client(None).await?;
        let response = client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| classify(err, timeout))?;
        response
            .text()
            .await
            .map_err(|err| TransportError::Body(err.to_string()))
    }

    async fn execute(&self, request: &StealthRequest) -> Result<StealthResponse, TransportError> {
        let client = self.client(request.proxy.as_deref()).await?;
        let headers = convert_headers(&request.headers)?;

        let mut builder = client
            .request(request.method.clone(), request.url.clone())
            .headers(headers)
            .timeout(request.timeout);
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|err| classify(err, request.timeout))?;

        let status = response.status().as_u16();
        let url = response.url().clone();
        let headers = convert_back_headers(response.headers())?;
        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::Body(err.to_string()))?;

        Ok(StealthResponse {
            status,
            headers,
            body,
            url,
        })
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Connect(err.to_string())
    }
}

fn convert_headers(headers: &HeaderMap) -> Result<reqwest::header::HeaderMap, TransportError> {
    let mut map = reqwest::header::HeaderMap::new();
    for (name, value) in headers.iter() {
        let name = reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes())
            .map_err(|err| TransportError::InvalidRequest(err.to_string()))?;
        let value = reqwest::header::HeaderValue::from_bytes(value.as_bytes())
            .map_err(|err| TransportError::InvalidRequest(err.to_string()))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn convert_back_headers(map: &reqwest::header::HeaderMap) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();
    for (name, value) in map.iter() {
        let name = http::HeaderName::from_bytes(name.as_str().as_bytes())
            .map_err(|err| TransportError::Body(err.to_string()))?;
        let value = http::HeaderValue::from_bytes(value.as_bytes())
            .map_err(|err| TransportError::Body(err.to_string()))?;
        headers.insert(name, value);
    }
    Ok(headers)
}
