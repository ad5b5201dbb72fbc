//! # Cache Policy
//!
//! Pure decision logic for the cache strategy engine: which policy applies to
//! a request, and which generation names are current.
//!
//! ## Policy Selection (first match wins)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Policy Selection                                  │
//! │                                                                         │
//! │  1. method != GET or scheme not http(s)  ──► Passthrough               │
//! │  2. path starts with API prefix          ──► StaleWhileRevalidate(Api) │
//! │  3. mode == navigate                     ──► NetworkFirst              │
//! │  4. everything else                      ──► StaleWhileRevalidate      │
//! │                                              (Dynamic)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Generation Naming
//! `inspekt-shell-v3`, `inspekt-dynamic-v3`, `inspekt-api-v3`. Bumping the
//! version token makes every older generation stale; activation prunes them.

use serde::{Deserialize, Serialize};

use crate::http::{HttpMethod, HttpRequest};
use crate::CACHE_NAME_PREFIX;

/// The three concurrent cache generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// Precached app-shell assets.
    Shell,
    /// General runtime GET responses.
    Dynamic,
    /// Responses from the remote data API.
    Api,
}

impl CacheKind {
    pub const ALL: [CacheKind; 3] = [CacheKind::Shell, CacheKind::Dynamic, CacheKind::Api];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Shell => "shell",
            CacheKind::Dynamic => "dynamic",
            CacheKind::Api => "api",
        }
    }
}

impl std::fmt::Display for CacheKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current generation names for one version token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationNames {
    version: String,
    shell: String,
    dynamic: String,
    api: String,
}

impl GenerationNames {
    pub fn new(version: impl Into<String>) -> Self {
        let version = version.into();
        let name = |kind: CacheKind| format!("{}-{}-{}", CACHE_NAME_PREFIX, kind, version);
        GenerationNames {
            shell: name(CacheKind::Shell),
            dynamic: name(CacheKind::Dynamic),
            api: name(CacheKind::Api),
            version,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn name(&self, kind: CacheKind) -> &str {
        match kind {
            CacheKind::Shell => &self.shell,
            CacheKind::Dynamic => &self.dynamic,
            CacheKind::Api => &self.api,
        }
    }

    /// The allowed set; anything else is pruned on activation.
    pub fn all(&self) -> [&str; 3] {
        [self.shell.as_str(), self.dynamic.as_str(), self.api.as_str()]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.all().contains(&name)
    }
}

/// Caching policy chosen for one intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Not intercepted; straight to network.
    Passthrough,
    /// Serve cached copy now, refresh in the background.
    StaleWhileRevalidate(CacheKind),
    /// Race network against the navigation timeout, then fall back.
    NetworkFirst,
}

/// Picks the policy for a request.
pub fn select_policy(request: &HttpRequest, api_prefix: &str) -> CachePolicy {
    if request.method != HttpMethod::Get || !request.is_http() {
        return CachePolicy::Passthrough;
    }

    if is_api_path(request.url.path(), api_prefix) {
        return CachePolicy::StaleWhileRevalidate(CacheKind::Api);
    }

    if request.is_navigation() {
        return CachePolicy::NetworkFirst;
    }

    CachePolicy::StaleWhileRevalidate(CacheKind::Dynamic)
}

/// True if `path` is under the API prefix. `/api/` matches `/api` and
/// `/api/forms` but not `/apiary`.
pub fn is_api_path(path: &str, api_prefix: &str) -> bool {
    let prefix = api_prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }
    path == prefix || path.starts_with(&format!("{}/", prefix))
}

/// Joins the API prefix and a relative segment into a path prefix used for
/// invalidation, e.g. (`/api/`, `inspections`) -> `/api/inspections`.
pub fn api_path(api_prefix: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        api_prefix.trim_end_matches('/'),
        segment.trim_start_matches('/')
    )
}
