//! # Cache Strategy Engine
//!
//! Decides, per intercepted request, whether to answer from a cache
//! generation, the network, or a fallback.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          handle_fetch()                                 │
//! │                                                                         │
//! │  select_policy(request)                                                │
//! │     │                                                                   │
//! │     ├── Passthrough ─────────────► caller fetches directly             │
//! │     │                                                                   │
//! │     ├── StaleWhileRevalidate(gen)                                      │
//! │     │      hit  ──► cached response now, refresh in a detached task    │
//! │     │      miss ──► network; cache on 2xx; transport error forwarded   │
//! │     │                                                                   │
//! │     └── NetworkFirst (navigations)                                     │
//! │            network vs. timer                                           │
//! │              won  ──► response (cached in dynamic on 2xx)              │
//! │              lost ──► exact cached entry                               │
//! │                       ──► offline page (shell)                         │
//! │                       ──► synthetic 503                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cache reads and writes never fail a request: errors are logged and the
//! request continues as a miss or an uncached response.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use inspekt_core::cache::select_policy;
use inspekt_core::{CacheKind, CachePolicy, GenerationNames, HttpRequest, HttpResponse};
use inspekt_db::CacheRepository;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::network::Fetcher;

// =============================================================================
// Outcomes
// =============================================================================

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    OfflinePage,
    /// Built by the engine; only the navigation fallback does this.
    Synthetic,
}

/// Result of intercepting one request.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Response {
        response: HttpResponse,
        source: ResponseSource,
    },
    /// Not intercepted; the caller sends it to the network as-is.
    Passthrough,
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            FetchOutcome::Response { response, .. } => Some(response),
            FetchOutcome::Passthrough => None,
        }
    }

    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            FetchOutcome::Response { source, .. } => Some(*source),
            FetchOutcome::Passthrough => None,
        }
    }
}

/// What installation precached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Shell entries stored, offline page included.
    pub cached: usize,
    /// Shell asset paths that could not be fetched or stored.
    pub failed: Vec<String>,
    /// Whether the new worker asks to activate without waiting.
    pub skip_waiting: bool,
}

// =============================================================================
// Engine
// =============================================================================

struct EngineInner {
    caches: CacheRepository,
    fetcher: Arc<dyn Fetcher>,
    names: GenerationNames,
    api_prefix: String,
    origin: url::Url,
    shell_assets: Vec<String>,
    offline_page: String,
    offline_request: HttpRequest,
    navigation_timeout: Duration,
}

/// Cheaply cloneable handle to the cache engine.
#[derive(Clone)]
pub struct CacheEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("version", &self.inner.names.version())
            .field("origin", &self.inner.origin.as_str())
            .finish()
    }
}

impl CacheEngine {
    pub fn new(
        config: &SyncConfig,
        caches: CacheRepository,
        fetcher: Arc<dyn Fetcher>,
    ) -> SyncResult<Self> {
        let origin = config.origin_url()?;
        let offline_request = HttpRequest::get(config.url_for(&config.cache.offline_page)?.as_str())?;

        Ok(CacheEngine {
            inner: Arc::new(EngineInner {
                caches,
                fetcher,
                names: GenerationNames::new(config.cache.version.clone()),
                api_prefix: config.remote.api_prefix.clone(),
                origin,
                shell_assets: config.cache.shell_assets.clone(),
                offline_page: config.cache.offline_page.clone(),
                offline_request,
                navigation_timeout: config.cache.navigation_timeout(),
            }),
        })
    }

    /// Current cache version token.
    pub fn version(&self) -> &str {
        self.inner.names.version()
    }

    /// The three current generation names.
    pub fn generation_names(&self) -> &GenerationNames {
        &self.inner.names
    }

    pub fn origin(&self) -> &url::Url {
        &self.inner.origin
    }

    // =========================================================================
    // Interception
    // =========================================================================

    /// Interception entry point.
    ///
    /// ## Errors
    /// Only a stale-while-revalidate miss whose network leg fails returns
    /// `Err`; the error is the transport failure, forwarded unchanged.
    pub async fn handle_fetch(&self, request: HttpRequest) -> SyncResult<FetchOutcome> {
        match select_policy(&request, &self.inner.api_prefix) {
            CachePolicy::Passthrough => Ok(FetchOutcome::Passthrough),
            CachePolicy::StaleWhileRevalidate(kind) => {
                self.stale_while_revalidate(kind, request).await
            }
            CachePolicy::NetworkFirst => Ok(self.network_first(request).await),
        }
    }

    async fn stale_while_revalidate(
        &self,
        kind: CacheKind,
        request: HttpRequest,
    ) -> SyncResult<FetchOutcome> {
        let generation = self.inner.names.name(kind);

        if let Some(cached) = self.lookup(generation, &request).await {
            debug!(url = %request.url, generation, "Cache hit, revalidating");
            self.spawn_revalidate(kind, request);
            return Ok(FetchOutcome::Response {
                response: cached,
                source: ResponseSource::Cache,
            });
        }

        let response = self.inner.fetcher.fetch(&request).await?;
        self.store(generation, &request, &response).await;

        Ok(FetchOutcome::Response {
            response,
            source: ResponseSource::Network,
        })
    }

    fn spawn_revalidate(&self, kind: CacheKind, request: HttpRequest) {
        let engine = self.clone();
        tokio::spawn(async move {
            let generation = engine.inner.names.name(kind);
            match engine.inner.fetcher.fetch(&request).await {
                Ok(response) => engine.store(generation, &request, &response).await,
                Err(e) => debug!(url = %request.url, error = %e, "Revalidation failed"),
            }
        });
    }

    async fn network_first(&self, request: HttpRequest) -> FetchOutcome {
        let dynamic = self.inner.names.name(CacheKind::Dynamic);
        let timeout = self.inner.navigation_timeout;

        // A detached task: losing the race drops only the handle, the request
        // runs to completion and its result is ignored.
        let fetcher = Arc::clone(&self.inner.fetcher);
        let network_request = request.clone();
        let mut network =
            tokio::spawn(async move { fetcher.fetch(&network_request).await });

        let result = tokio::select! {
            joined = &mut network => match joined {
                Ok(result) => result,
                Err(e) => Err(SyncError::Internal(format!("fetch task: {e}"))),
            },
            _ = tokio::time::sleep(timeout) => {
                Err(SyncError::Timeout(timeout.as_millis() as u64))
            }
        };

        match result {
            Ok(response) => {
                self.store(dynamic, &request, &response).await;
                return FetchOutcome::Response {
                    response,
                    source: ResponseSource::Network,
                };
            }
            Err(e) => debug!(url = %request.url, error = %e, "Navigation fell back"),
        }

        for kind in [CacheKind::Dynamic, CacheKind::Shell] {
            if let Some(cached) = self.lookup(self.inner.names.name(kind), &request).await {
                return FetchOutcome::Response {
                    response: cached,
                    source: ResponseSource::Cache,
                };
            }
        }

        let shell = self.inner.names.name(CacheKind::Shell);
        if let Some(page) = self.lookup(shell, &self.inner.offline_request).await {
            return FetchOutcome::Response {
                response: page,
                source: ResponseSource::OfflinePage,
            };
        }

        FetchOutcome::Response {
            response: HttpResponse::service_unavailable(),
            source: ResponseSource::Synthetic,
        }
    }

    async fn lookup(&self, generation: &str, request: &HttpRequest) -> Option<HttpResponse> {
        match self
            .inner
            .caches
            .match_entry(generation, &request.cache_key())
            .await
        {
            Ok(hit) => hit.map(|entry| entry.response),
            Err(e) => {
                warn!(generation, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Stores a 2xx response; anything else is ignored.
    async fn store(&self, generation: &str, request: &HttpRequest, response: &HttpResponse) {
        if !response.is_success() {
            return;
        }
        if let Err(e) = self.try_store(generation, request, response).await {
            warn!(generation, url = %request.url, error = %e, "Cache write failed");
        }
    }

    async fn try_store(
        &self,
        generation: &str,
        request: &HttpRequest,
        response: &HttpResponse,
    ) -> SyncResult<()> {
        self.inner
            .caches
            .put(
                generation,
                &request.cache_key(),
                request.url.as_str(),
                request.url.path(),
                response,
            )
            .await
            .map_err(|e| SyncError::CacheWrite(e.to_string()))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Precaches the app shell.
    ///
    /// The offline page goes first and must succeed; the remaining assets
    /// are best-effort.
    pub async fn install(&self) -> SyncResult<InstallReport> {
        let shell = self.inner.names.name(CacheKind::Shell);
        self.inner
            .caches
            .open(shell)
            .await
            .map_err(|e| SyncError::InstallFailed(e.to_string()))?;

        self.precache(shell, &self.inner.offline_request)
            .await
            .map_err(|e| {
                SyncError::InstallFailed(format!("{}: {}", self.inner.offline_page, e))
            })?;

        let mut report = InstallReport {
            cached: 1,
            failed: Vec::new(),
            skip_waiting: true,
        };

        for asset in &self.inner.shell_assets {
            if *asset == self.inner.offline_page {
                continue;
            }
            let result = match self.inner.origin.join(asset) {
                Ok(url) => match HttpRequest::get(url.as_str()) {
                    Ok(request) => self.precache(shell, &request).await,
                    Err(e) => Err(e.into()),
                },
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(()) => report.cached += 1,
                Err(e) => {
                    warn!(asset = %asset, error = %e, "Failed to precache shell asset");
                    report.failed.push(asset.clone());
                }
            }
        }

        info!(
            generation = shell,
            cached = report.cached,
            failed = report.failed.len(),
            "Shell precached"
        );
        Ok(report)
    }

    async fn precache(&self, generation: &str, request: &HttpRequest) -> SyncResult<()> {
        let response = self.inner.fetcher.fetch(request).await?;
        if !response.is_success() {
            return Err(SyncError::HttpStatus {
                status: response.status,
                url: request.url.to_string(),
            });
        }
        self.try_store(generation, request, &response).await
    }

    /// Deletes every generation outside the current set.
    ///
    /// ## Returns
    /// Names of the pruned generations.
    pub async fn activate(&self) -> SyncResult<Vec<String>> {
        let mut pruned = Vec::new();
        for name in self.inner.caches.list_generations().await? {
            if self.inner.names.contains(&name) {
                continue;
            }
            match self.inner.caches.delete_generation(&name).await {
                Ok(_) => pruned.push(name),
                Err(e) => warn!(generation = %name, error = %e, "Failed to prune generation"),
            }
        }

        if !pruned.is_empty() {
            info!(pruned = ?pruned, "Stale cache generations pruned");
        }
        Ok(pruned)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Drops cached API reads under any of the given path prefixes.
    ///
    /// ## Returns
    /// Number of removed entries. Failures are logged and count as zero.
    pub async fn invalidate_api(&self, prefixes: &[String]) -> u64 {
        let api = self.inner.names.name(CacheKind::Api);
        let mut removed = 0;
        for prefix in prefixes {
            match self.inner.caches.delete_by_path_prefix(api, prefix).await {
                Ok(n) => removed += n,
                Err(e) => warn!(prefix = %prefix, error = %e, "Cache invalidation failed"),
            }
        }
        if removed > 0 {
            debug!(removed, prefixes = ?prefixes, "API cache invalidated");
        }
        removed
    }

    /// Deletes every cache generation.
    pub async fn clear_all(&self) -> SyncResult<u64> {
        let deleted = self.inner.caches.delete_all().await?;
        info!(deleted, "All cache generations cleared");
        Ok(deleted)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{MockFetcher, MockReply};
    use inspekt_db::{Database, DbConfig};

    const ORIGIN: &str = "https://app.test";

    fn config(version: &str) -> SyncConfig {
        let mut config = SyncConfig::default();
        config.remote.origin = ORIGIN.into();
        config.cache.version = version.into();
        config.cache.shell_assets = vec!["/".into(), "/app.js".into(), "/offline.html".into()];
        config.cache.navigation_timeout_ms = 100;
        config
    }

    async fn setup(version: &str) -> (CacheEngine, Arc<MockFetcher>, CacheRepository) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mock = Arc::new(MockFetcher::new());
        let engine = CacheEngine::new(&config(version), db.caches(), mock.clone()).unwrap();
        (engine, mock, db.caches())
    }

    fn url(path: &str) -> String {
        format!("{ORIGIN}{path}")
    }

    async fn wait_for<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_passthrough_for_mutations() {
        let (engine, mock, _) = setup("v1").await;
        let req = HttpRequest::get(&url("/api/inspections"))
            .unwrap()
            .with_method(inspekt_core::HttpMethod::Post);

        assert_eq!(engine.handle_fetch(req).await.unwrap(), FetchOutcome::Passthrough);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_swr_miss_then_hit() {
        let (engine, mock, caches) = setup("v1").await;
        let forms = url("/api/forms");
        mock.once("GET", &forms, MockReply::ok("v1-body"))
            .on("GET", &forms, MockReply::ok("v2-body"));

        let first = engine.handle_fetch(HttpRequest::get(&forms).unwrap()).await.unwrap();
        assert_eq!(first.source(), Some(ResponseSource::Network));
        assert_eq!(first.response().unwrap().body, b"v1-body".to_vec());

        // Hit serves the cached copy even though the network has moved on
        let second = engine.handle_fetch(HttpRequest::get(&forms).unwrap()).await.unwrap();
        assert_eq!(second.source(), Some(ResponseSource::Cache));
        assert_eq!(second.response().unwrap().body, b"v1-body".to_vec());

        // ...and the background refresh overwrites it
        let key = HttpRequest::get(&forms).unwrap().cache_key();
        wait_for(|| {
            let caches = caches.clone();
            let key = key.clone();
            async move {
                caches
                    .match_entry("inspekt-api-v1", &key)
                    .await
                    .unwrap()
                    .map(|e| e.response.body == b"v2-body".to_vec())
                    .unwrap_or(false)
            }
        })
        .await;
    }

    #[tokio::test]
    async fn test_swr_is_idempotent_on_hits() {
        let (engine, mock, _) = setup("v1").await;
        let forms = url("/api/forms");
        mock.on("GET", &forms, MockReply::ok("same"));

        engine.handle_fetch(HttpRequest::get(&forms).unwrap()).await.unwrap();
        let a = engine.handle_fetch(HttpRequest::get(&forms).unwrap()).await.unwrap();
        let b = engine.handle_fetch(HttpRequest::get(&forms).unwrap()).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(a.source(), Some(ResponseSource::Cache));
    }

    #[tokio::test]
    async fn test_swr_failed_revalidation_keeps_entry() {
        let (engine, mock, caches) = setup("v1").await;
        let asset = url("/assets/logo.png");
        mock.once("GET", &asset, MockReply::ok("png"))
            .on("GET", &asset, MockReply::Fail("reset".into()));

        engine.handle_fetch(HttpRequest::get(&asset).unwrap()).await.unwrap();
        let hit = engine.handle_fetch(HttpRequest::get(&asset).unwrap()).await.unwrap();
        assert_eq!(hit.source(), Some(ResponseSource::Cache));

        wait_for(|| {
            let mock = mock.clone();
            let asset = asset.clone();
            async move { mock.calls_to("GET", &asset) == 2 }
        })
        .await;

        let key = HttpRequest::get(&asset).unwrap().cache_key();
        let entry = caches.match_entry("inspekt-dynamic-v1", &key).await.unwrap().unwrap();
        assert_eq!(entry.response.body, b"png".to_vec());
    }

    #[tokio::test]
    async fn test_swr_error_status_revalidation_keeps_entry() {
        let (engine, mock, caches) = setup("v1").await;
        let forms = url("/api/forms");
        mock.once("GET", &forms, MockReply::ok("fresh"))
            .on("GET", &forms, MockReply::Respond(HttpResponse::new(503, "down")));

        engine.handle_fetch(HttpRequest::get(&forms).unwrap()).await.unwrap();
        let hit = engine.handle_fetch(HttpRequest::get(&forms).unwrap()).await.unwrap();
        assert_eq!(hit.source(), Some(ResponseSource::Cache));

        wait_for(|| {
            let mock = mock.clone();
            let forms = forms.clone();
            async move { mock.calls_to("GET", &forms) == 2 }
        })
        .await;
        // Let the revalidation task finish its store attempt
        tokio::time::sleep(Duration::from_millis(20)).await;

        let key = HttpRequest::get(&forms).unwrap().cache_key();
        let entry = caches.match_entry("inspekt-api-v1", &key).await.unwrap().unwrap();
        assert_eq!(entry.response.status, 200);
        assert_eq!(entry.response.body, b"fresh".to_vec());
    }

    #[tokio::test]
    async fn test_swr_miss_forwards_network_error() {
        let (engine, mock, caches) = setup("v1").await;
        mock.set_offline(true);

        let err = engine
            .handle_fetch(HttpRequest::get(&url("/api/forms")).unwrap())
            .await
            .unwrap_err();
        assert!(err.is_network());
        assert_eq!(caches.entry_count("inspekt-api-v1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_non_success_is_never_cached() {
        let (engine, mock, caches) = setup("v1").await;
        let api = url("/api/forms");
        let asset = url("/assets/app.css");
        let page = url("/inspections");
        mock.on("GET", &api, MockReply::status(500))
            .on("GET", &asset, MockReply::status(404))
            .on("GET", &page, MockReply::status(502));

        let r = engine.handle_fetch(HttpRequest::get(&api).unwrap()).await.unwrap();
        assert_eq!(r.response().unwrap().status, 500);
        let r = engine.handle_fetch(HttpRequest::get(&asset).unwrap()).await.unwrap();
        assert_eq!(r.response().unwrap().status, 404);
        let r = engine.handle_fetch(HttpRequest::navigate(&page).unwrap()).await.unwrap();
        assert_eq!(r.response().unwrap().status, 502);
        assert_eq!(r.source(), Some(ResponseSource::Network));

        for gen in engine.generation_names().all() {
            assert_eq!(caches.entry_count(gen).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_navigation_success_is_cached() {
        let (engine, mock, caches) = setup("v1").await;
        let page = url("/inspections/42");
        mock.on("GET", &page, MockReply::ok("<html>42</html>"));

        let r = engine.handle_fetch(HttpRequest::navigate(&page).unwrap()).await.unwrap();
        assert_eq!(r.source(), Some(ResponseSource::Network));
        assert_eq!(caches.entry_count("inspekt-dynamic-v1").await.unwrap(), 1);

        // Offline now: the exact cached entry is served
        mock.set_offline(true);
        let r = engine.handle_fetch(HttpRequest::navigate(&page).unwrap()).await.unwrap();
        assert_eq!(r.source(), Some(ResponseSource::Cache));
        assert_eq!(r.response().unwrap().body, b"<html>42</html>".to_vec());
    }

    #[tokio::test]
    async fn test_navigation_timeout_falls_back_to_offline_page() {
        let (engine, mock, _) = setup("v1").await;
        mock.on("GET", &url("/offline.html"), MockReply::ok("offline"));
        engine.install().await.unwrap();

        let slow = url("/reports");
        mock.on(
            "GET",
            &slow,
            MockReply::Delayed(Duration::from_millis(500), HttpResponse::new(200, "late")),
        );

        let r = engine.handle_fetch(HttpRequest::navigate(&slow).unwrap()).await.unwrap();
        assert_eq!(r.source(), Some(ResponseSource::OfflinePage));
        assert_eq!(r.response().unwrap().body, b"offline".to_vec());
    }

    #[tokio::test]
    async fn test_navigation_without_fallbacks_is_503() {
        let (engine, mock, caches) = setup("v1").await;
        mock.set_offline(true);

        let r = engine
            .handle_fetch(HttpRequest::navigate(&url("/anything")).unwrap())
            .await
            .unwrap();
        assert_eq!(r.source(), Some(ResponseSource::Synthetic));
        assert_eq!(r.response().unwrap().status, 503);
        assert_eq!(caches.entry_count("inspekt-dynamic-v1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_install_is_best_effort_for_assets() {
        let (engine, mock, caches) = setup("v1").await;
        mock.on("GET", &url("/offline.html"), MockReply::ok("offline"))
            .on("GET", &url("/"), MockReply::ok("index"));
        // /app.js is unscripted and 404s

        let report = engine.install().await.unwrap();
        assert_eq!(report.cached, 2);
        assert_eq!(report.failed, vec!["/app.js".to_string()]);
        assert!(report.skip_waiting);
        assert_eq!(caches.entry_count("inspekt-shell-v1").await.unwrap(), 2);
        // The offline page is fetched once even though it is also listed
        assert_eq!(mock.calls_to("GET", &url("/offline.html")), 1);
    }

    #[tokio::test]
    async fn test_install_fails_without_offline_page() {
        let (engine, mock, _) = setup("v1").await;
        mock.on("GET", &url("/"), MockReply::ok("index"));

        let err = engine.install().await.unwrap_err();
        assert!(matches!(err, SyncError::InstallFailed(ref m) if m.contains("/offline.html")));
    }

    #[tokio::test]
    async fn test_activate_prunes_old_versions() {
        let (engine, _, caches) = setup("v2").await;
        for gen in [
            "inspekt-shell-v1",
            "inspekt-api-v1",
            "inspekt-shell-v2",
            "inspekt-api-v2",
            "inspekt-dynamic-v2",
            "other-cache",
        ] {
            caches.open(gen).await.unwrap();
        }

        let mut pruned = engine.activate().await.unwrap();
        pruned.sort();
        assert_eq!(pruned, vec!["inspekt-api-v1", "inspekt-shell-v1", "other-cache"]);

        let mut kept = caches.list_generations().await.unwrap();
        kept.sort();
        assert_eq!(kept, vec!["inspekt-api-v2", "inspekt-dynamic-v2", "inspekt-shell-v2"]);
    }

    #[tokio::test]
    async fn test_invalidate_api() {
        let (engine, mock, caches) = setup("v1").await;
        for path in ["/api/inspections", "/api/inspections/7", "/api/forms"] {
            mock.on("GET", &url(path), MockReply::ok("x"));
            engine.handle_fetch(HttpRequest::get(&url(path)).unwrap()).await.unwrap();
        }

        let removed = engine.invalidate_api(&["/api/inspections".to_string()]).await;
        assert_eq!(removed, 2);
        assert_eq!(caches.entry_count("inspekt-api-v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let (engine, mock, caches) = setup("v1").await;
        mock.on("GET", &url("/api/forms"), MockReply::ok("x"));
        engine.handle_fetch(HttpRequest::get(&url("/api/forms")).unwrap()).await.unwrap();

        assert_eq!(engine.clear_all().await.unwrap(), 1);
        assert!(caches.list_generations().await.unwrap().is_empty());
        assert_eq!(engine.version(), "v1");
    }
}
