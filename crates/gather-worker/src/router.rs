//! Request classification and the per-class caching strategies.
//!
//! Every intercepted request is classified once (first match wins) and
//! handled by the strategy for its class. The router never surfaces a raw
//! network failure: each class has an offline fallback, down to a
//! synthesized 503. Cache writes are best-effort throughout — a storage
//! failure is logged and the triggering request still gets its answer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use url::Url;

use crate::cache::{cache_name, CacheError, CacheRole, CacheStorage, CachedEntry};
use crate::config::RouterConfig;
use crate::fetch::{Destination, FetchRequest, FetchResponse, Fetcher};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg"];
const STATIC_EXTENSIONS: &[&str] = &["html", "css", "js", "ico", "woff", "woff2"];

/// Which strategy a request takes, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Image,
    Api,
    Critical,
    StaticAsset,
    Navigation,
    Other,
}

pub struct Router<F, S> {
    config: Arc<RouterConfig>,
    fetcher: Arc<F>,
    storage: Arc<S>,
    skip_waiting: Arc<AtomicBool>,
}

impl<F, S> Clone for Router<F, S> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            fetcher: Arc::clone(&self.fetcher),
            storage: Arc::clone(&self.storage),
            skip_waiting: Arc::clone(&self.skip_waiting),
        }
    }
}

impl<F, S> Router<F, S>
where
    F: Fetcher + 'static,
    S: CacheStorage + 'static,
{
    #[must_use]
    pub fn new(config: RouterConfig, fetcher: Arc<F>, storage: Arc<S>) -> Self {
        Self {
            config: Arc::new(config),
            fetcher,
            storage,
            skip_waiting: Arc::new(AtomicBool::new(false)),
        }
    }

    /// First matching class wins: image, API, critical bootstrap file,
    /// static asset, navigation, then the cache-first default.
    #[must_use]
    pub fn classify(&self, request: &FetchRequest) -> RequestClass {
        let Ok(url) = Url::parse(&request.url) else {
            return RequestClass::Other;
        };
        let host = url.host_str().unwrap_or_default();
        let path = url.path();

        if request.destination == Destination::Image || has_extension(path, IMAGE_EXTENSIONS) {
            return RequestClass::Image;
        }
        if self.config.api_hosts.iter().any(|h| h == host)
            || self
                .config
                .api_path_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return RequestClass::Api;
        }
        if self.config.manifest.critical.iter().any(|p| p == path) {
            return RequestClass::Critical;
        }
        if matches!(
            request.destination,
            Destination::Script | Destination::Style
        ) || has_extension(path, STATIC_EXTENSIONS)
            || self
                .config
                .static_path_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
            || self.config.cdn_hosts.iter().any(|h| h == host)
        {
            return RequestClass::StaticAsset;
        }
        if request.destination == Destination::Document || path == "/" {
            return RequestClass::Navigation;
        }
        RequestClass::Other
    }

    /// Answer a request from cache, network, or a blend. Never fails:
    /// the worst outcome is a synthesized offline response.
    pub async fn handle(&self, request: FetchRequest) -> FetchResponse {
        if !request.is_get() {
            // Non-GET traffic is never cached, only forwarded
            return match self.fetcher.fetch(request.clone()).await {
                Ok(response) => response,
                Err(error) => {
                    tracing::debug!("{} {} failed offline: {error}", request.method, request.url);
                    self.offline_fallback(&request)
                }
            };
        }
        match self.classify(&request) {
            RequestClass::Image => self.image(&request).await,
            RequestClass::Api => self.api(&request).await,
            RequestClass::Critical => self.cache_first(CacheRole::Static, &request).await,
            RequestClass::StaticAsset => self.stale_while_revalidate(&request).await,
            RequestClass::Navigation => self.network_first(&request).await,
            RequestClass::Other => self.cache_first(CacheRole::Dynamic, &request).await,
        }
    }

    /// Cached forever within a generation; a failed fetch yields an
    /// empty 200 so image slots never render broken.
    async fn image(&self, request: &FetchRequest) -> FetchResponse {
        let cache = self.cache_for(CacheRole::Image);
        if let Some(cached) = self.lookup(&cache, &request.url) {
            return cached;
        }
        match self.fetcher.fetch(request.clone()).await {
            Ok(response) => {
                self.store(&cache, request, &response);
                response
            }
            Err(error) => {
                tracing::debug!("Image fetch failed for {}: {error}", request.url);
                FetchResponse::empty_ok()
            }
        }
    }

    /// Network raced against a fixed timeout; losers fall back to the
    /// most recent cached copy, then to a synthesized 503.
    async fn api(&self, request: &FetchRequest) -> FetchResponse {
        let cache = self.cache_for(CacheRole::Api);
        let attempt =
            tokio::time::timeout(self.config.api_timeout, self.fetcher.fetch(request.clone()))
                .await;
        match attempt {
            Ok(Ok(response)) => {
                self.store(&cache, request, &response);
                response
            }
            Ok(Err(error)) => {
                tracing::debug!("API fetch failed for {}: {error}", request.url);
                self.lookup(&cache, &request.url)
                    .unwrap_or_else(FetchResponse::offline_json)
            }
            Err(_elapsed) => {
                tracing::debug!("API fetch timed out for {}", request.url);
                self.lookup(&cache, &request.url)
                    .unwrap_or_else(FetchResponse::offline_json)
            }
        }
    }

    /// Serve the cached copy immediately and refresh it in the
    /// background; the revalidation is never awaited by the caller.
    async fn stale_while_revalidate(&self, request: &FetchRequest) -> FetchResponse {
        let cache = self.cache_for(CacheRole::Dynamic);
        if let Some(cached) = self.lookup(&cache, &request.url) {
            self.spawn_revalidate(request.clone());
            return cached;
        }
        match self.fetcher.fetch(request.clone()).await {
            Ok(response) => {
                self.store(&cache, request, &response);
                response
            }
            Err(error) => {
                tracing::debug!("Asset fetch failed for {}: {error}", request.url);
                self.offline_fallback(request)
            }
        }
    }

    async fn network_first(&self, request: &FetchRequest) -> FetchResponse {
        let cache = self.cache_for(CacheRole::Dynamic);
        match self.fetcher.fetch(request.clone()).await {
            Ok(response) => {
                self.store(&cache, request, &response);
                response
            }
            Err(error) => {
                tracing::debug!("Navigation fetch failed for {}: {error}", request.url);
                if let Some(cached) = self.lookup(&cache, &request.url) {
                    return cached;
                }
                self.shell().unwrap_or_else(FetchResponse::offline_json)
            }
        }
    }

    async fn cache_first(&self, role: CacheRole, request: &FetchRequest) -> FetchResponse {
        let cache = self.cache_for(role);
        if let Some(cached) = self.lookup(&cache, &request.url) {
            return cached;
        }
        match self.fetcher.fetch(request.clone()).await {
            Ok(response) => {
                self.store(&cache, request, &response);
                response
            }
            Err(error) => {
                tracing::debug!("Fetch failed for {}: {error}", request.url);
                self.offline_fallback(request)
            }
        }
    }

    fn spawn_revalidate(&self, request: FetchRequest) {
        let fetcher = Arc::clone(&self.fetcher);
        let storage = Arc::clone(&self.storage);
        let cache = self.cache_for(CacheRole::Dynamic);
        tokio::spawn(async move {
            match fetcher.fetch(request.clone()).await {
                Ok(response) if response.is_success() => {
                    if let Err(error) =
                        storage.put(&cache, &request.url, CachedEntry::new(response))
                    {
                        tracing::warn!("Revalidate write failed for {}: {error}", request.url);
                    }
                }
                Ok(response) => {
                    tracing::debug!("Revalidate got HTTP {} for {}", response.status, request.url);
                }
                Err(error) => {
                    tracing::debug!("Revalidate failed for {}: {error}", request.url);
                }
            }
        });
    }

    /// Fetch and cache the critical manifest, then warm the secondary
    /// manifest in the background. Individual file failures are logged
    /// and skipped. Returns how many critical entries were cached.
    pub async fn install(&self) -> usize {
        let cached = self
            .precache(self.config.manifest.critical.clone(), CacheRole::Static, false)
            .await;
        tracing::info!("Installed with {cached} critical entries cached");

        let router = self.clone();
        tokio::spawn(async move {
            let warmed = router
                .precache(
                    router.config.manifest.secondary.clone(),
                    CacheRole::Dynamic,
                    false,
                )
                .await;
            tracing::debug!("Warmed {warmed} secondary entries");
        });
        cached
    }

    /// Delete every cache not among the four current generation names.
    /// Returns the names that were removed.
    pub fn activate(&self) -> Result<Vec<String>, CacheError> {
        let current: Vec<String> = CacheRole::ALL
            .iter()
            .map(|role| self.cache_for(*role))
            .collect();
        let mut deleted = Vec::new();
        for name in self.storage.cache_names()? {
            if !current.contains(&name) {
                self.storage.delete_cache(&name)?;
                tracing::info!("Deleted stale cache generation {name}");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Drop and rebuild the static and dynamic generations, fetching
    /// every manifest entry with a cache-busted URL.
    pub async fn force_update_cache(&self) -> Result<usize, CacheError> {
        for role in [CacheRole::Static, CacheRole::Dynamic] {
            self.storage.delete_cache(&self.cache_for(role))?;
        }
        let mut rebuilt = self
            .precache(self.config.manifest.critical.clone(), CacheRole::Static, true)
            .await;
        rebuilt += self
            .precache(
                self.config.manifest.secondary.clone(),
                CacheRole::Dynamic,
                true,
            )
            .await;
        Ok(rebuilt)
    }

    /// Entries across every cache generation
    pub fn cache_size(&self) -> Result<usize, CacheError> {
        self.storage.entry_count()
    }

    pub fn clear_all(&self) -> Result<(), CacheError> {
        for name in self.storage.cache_names()? {
            self.storage.delete_cache(&name)?;
        }
        Ok(())
    }

    pub fn request_skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    async fn precache(&self, paths: Vec<String>, role: CacheRole, bust: bool) -> usize {
        let cache = self.cache_for(role);
        let mut cached = 0;
        for path in paths {
            let key = self.absolute_url(&path);
            let fetch_url = if bust { cache_busted(&key) } else { key.clone() };
            match self.fetcher.fetch(FetchRequest::get(fetch_url)).await {
                Ok(response) if response.is_success() => {
                    match self.storage.put(&cache, &key, CachedEntry::new(response)) {
                        Ok(()) => cached += 1,
                        Err(error) => {
                            tracing::warn!("Precache write failed for {key}: {error}");
                        }
                    }
                }
                Ok(response) => {
                    tracing::warn!("Precache skipped {key}: HTTP {}", response.status);
                }
                Err(error) => {
                    tracing::warn!("Precache skipped {key}: {error}");
                }
            }
        }
        cached
    }

    fn cache_for(&self, role: CacheRole) -> String {
        cache_name(&self.config.version, role)
    }

    fn lookup(&self, cache: &str, key: &str) -> Option<FetchResponse> {
        match self.storage.get(cache, key) {
            Ok(entry) => entry.map(|entry| entry.response),
            Err(error) => {
                tracing::warn!("Cache read failed for {key}: {error}");
                None
            }
        }
    }

    // Best-effort: only successful GET responses are cached, and a
    // storage failure never fails the request.
    fn store(&self, cache: &str, request: &FetchRequest, response: &FetchResponse) {
        if !request.is_get() || !response.is_success() {
            return;
        }
        let entry = CachedEntry::new(response.clone());
        if let Err(error) = self.storage.put(cache, &request.url, entry) {
            tracing::warn!("Cache write failed for {}: {error}", request.url);
        }
    }

    fn shell(&self) -> Option<FetchResponse> {
        let cache = self.cache_for(CacheRole::Static);
        let key = self.absolute_url(&self.config.shell_path);
        self.lookup(&cache, &key)
    }

    fn offline_fallback(&self, request: &FetchRequest) -> FetchResponse {
        match request.destination {
            Destination::Document => self.shell().unwrap_or_else(FetchResponse::offline_json),
            Destination::Image => FetchResponse::empty_ok(),
            _ => FetchResponse::offline_json(),
        }
    }

    fn absolute_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        match Url::parse(&self.config.origin).and_then(|base| base.join(path)) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}{path}", self.config.origin),
        }
    }
}

fn has_extension(path: &str, extensions: &[&str]) -> bool {
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

fn cache_busted(url: &str) -> String {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}cacheBust={stamp}")
}
