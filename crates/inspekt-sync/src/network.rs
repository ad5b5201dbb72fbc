//! # Network Seam
//!
//! Every outbound request of the sync layer goes through [`Fetcher`]: reads
//! the engine forwards, mutations the replayer sends, connectivity probes.
//!
//! A fetcher returns `Ok` for any HTTP response, whatever its status. `Err`
//! means the request never produced a response (transport failure, timeout).
//! Callers decide what a non-2xx status means for them.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use inspekt_core::{HttpRequest, HttpResponse};

use crate::error::{SyncError, SyncResult};

/// Request headers that describe the inbound hop and must not be forwarded.
const HOP_BY_HOP: [&str; 6] = [
    "host",
    "connection",
    "content-length",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
];

/// Performs HTTP requests on behalf of the worker.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &HttpRequest) -> SyncResult<HttpResponse>;
}

// =============================================================================
// reqwest implementation
// =============================================================================

/// [`Fetcher`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Creates a fetcher with an overall per-request timeout.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("inspekt-worker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(HttpFetcher { client, timeout })
    }

    fn map_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.timeout.as_millis() as u64)
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &HttpRequest) -> SyncResult<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| SyncError::InvalidMessage(format!("method {}: {e}", request.method)))?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            if HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|e| self.map_error(e))?.to_vec();

        debug!(method = %request.method, url = %request.url, status, "Fetched");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

// =============================================================================
// Scripted fetcher for tests
// =============================================================================

#[cfg(any(test, feature = "testing"))]
pub use mock::{MockFetcher, MockReply};

#[cfg(any(test, feature = "testing"))]
mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Mutex, MutexGuard};

    /// Scripted outcome of one request.
    #[derive(Debug, Clone)]
    pub enum MockReply {
        Respond(HttpResponse),
        /// Transport failure.
        Fail(String),
        /// Respond after a delay.
        Delayed(Duration, HttpResponse),
    }

    impl MockReply {
        pub fn ok(body: impl Into<Vec<u8>>) -> Self {
            MockReply::Respond(HttpResponse::new(200, body))
        }

        pub fn status(status: u16) -> Self {
            MockReply::Respond(HttpResponse::new(status, Vec::new()))
        }
    }

    #[derive(Debug, Default)]
    struct MockState {
        routes: HashMap<String, MockReply>,
        queued: HashMap<String, VecDeque<MockReply>>,
        calls: Vec<(String, Option<Vec<u8>>)>,
        offline: bool,
    }

    /// In-memory [`Fetcher`] keyed by `"METHOD url"`.
    ///
    /// One-shot replies (`once`) are consumed before the persistent reply
    /// (`on`). Unscripted requests get a 404. Every call is recorded, in
    /// order, including failed ones.
    #[derive(Debug, Default)]
    pub struct MockFetcher {
        state: Mutex<MockState>,
    }

    impl MockFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        fn state(&self) -> MutexGuard<'_, MockState> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }

        fn key(method: &str, url: &str) -> String {
            format!("{} {}", method.to_ascii_uppercase(), url)
        }

        /// Persistent reply for every matching request.
        pub fn on(&self, method: &str, url: &str, reply: MockReply) -> &Self {
            self.state().routes.insert(Self::key(method, url), reply);
            self
        }

        /// Reply for the next matching request only.
        pub fn once(&self, method: &str, url: &str, reply: MockReply) -> &Self {
            self.state()
                .queued
                .entry(Self::key(method, url))
                .or_default()
                .push_back(reply);
            self
        }

        /// Makes every request fail at the transport level.
        pub fn set_offline(&self, offline: bool) {
            self.state().offline = offline;
        }

        /// `"METHOD url"` of every request so far.
        pub fn calls(&self) -> Vec<String> {
            self.state().calls.iter().map(|(k, _)| k.clone()).collect()
        }

        /// Body of every request so far.
        pub fn bodies(&self) -> Vec<Option<Vec<u8>>> {
            self.state().calls.iter().map(|(_, b)| b.clone()).collect()
        }

        pub fn call_count(&self) -> usize {
            self.state().calls.len()
        }

        /// Requests made to one `"METHOD url"`.
        pub fn calls_to(&self, method: &str, url: &str) -> usize {
            let key = Self::key(method, url);
            self.state().calls.iter().filter(|(k, _)| *k == key).count()
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch(&self, request: &HttpRequest) -> SyncResult<HttpResponse> {
            let key = Self::key(request.method.as_str(), request.url.as_str());

            let reply = {
                let mut state = self.state();
                state.calls.push((key.clone(), request.body.clone()));
                if state.offline {
                    return Err(SyncError::Network("network unreachable".into()));
                }
                let queued = state.queued.get_mut(&key).and_then(VecDeque::pop_front);
                queued.or_else(|| state.routes.get(&key).cloned())
            };

            match reply {
                Some(MockReply::Respond(response)) => Ok(response),
                Some(MockReply::Fail(message)) => Err(SyncError::Network(message)),
                Some(MockReply::Delayed(delay, response)) => {
                    tokio::time::sleep(delay).await;
                    Ok(response)
                }
                None => Ok(HttpResponse::new(404, "Not Found")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_once_then_persistent() {
        let mock = MockFetcher::new();
        mock.on("GET", "https://app.test/a", MockReply::ok("steady"))
            .once("GET", "https://app.test/a", MockReply::ok("first"));

        let req = HttpRequest::get("https://app.test/a").unwrap();
        assert_eq!(mock.fetch(&req).await.unwrap().body, b"first".to_vec());
        assert_eq!(mock.fetch(&req).await.unwrap().body, b"steady".to_vec());
        assert_eq!(mock.calls_to("GET", "https://app.test/a"), 2);
    }

    #[tokio::test]
    async fn test_mock_unscripted_and_offline() {
        let mock = MockFetcher::new();
        let req = HttpRequest::get("https://app.test/missing").unwrap();
        assert_eq!(mock.fetch(&req).await.unwrap().status, 404);

        mock.set_offline(true);
        let err = mock.fetch(&req).await.unwrap_err();
        assert!(err.is_network());
        assert_eq!(mock.call_count(), 2);
    }

    #[test]
    fn test_http_fetcher_builds() {
        assert!(HttpFetcher::new(Duration::from_secs(5)).is_ok());
    }
}
