//! Response caching for read endpoints
//!
//! Entries are keyed by [`cache_key`]: the request path with repeated and
//! trailing slashes removed, plus the query pairs in sorted order, so
//! `/venues?page=2&limit=10` and `/venues/?limit=10&page=2` share an entry.
//!
//! [`ResponseCache`] is the storage seam; [`MemoryCache`] keeps entries in a
//! concurrent map with a TTL per entry. [`cache_middleware`] serves
//! anonymous `GET` requests from a cache and fills it on `200 OK`.
//!
//! Layer the cache inside the compression middleware so that cached bodies
//! are stored uncompressed.

use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use regex::Regex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Response header reporting `hit` or `miss`
pub const X_CACHE: &str = "x-cache";

static REPEATED_SLASHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("/{2,}").expect("slash regex is valid"));

/// Canonical form of a request path
///
/// ```ignore
/// normalize_path("//venues///42/") // -> "/venues/42"
/// ```
pub fn normalize_path(path: &str) -> String {
    let collapsed = REPEATED_SLASHES.replace_all(path, "/");
    let trimmed = collapsed.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Cache key for a request URI
pub fn cache_key(uri: &Uri) -> String {
    let path = normalize_path(uri.path());
    let mut pairs: Vec<&str> = uri
        .query()
        .map(|q| q.split('&').filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    if pairs.is_empty() {
        return path;
    }
    pairs.sort_unstable();
    format!("{}?{}", path, pairs.join("&"))
}

/// A stored response
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        *response.headers_mut() = self.headers;
        response
    }
}

/// Storage for cached responses
pub trait ResponseCache: Send + Sync {
    /// Fetch a live entry
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<CachedResponse>>> + Send;

    /// Store an entry for `ttl`
    fn set(
        &self,
        key: &str,
        value: CachedResponse,
        ttl: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove an entry, reporting whether one was present
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;
}

#[derive(Debug)]
struct Entry {
    value: CachedResponse,
    expires_at: Instant,
}

/// In-process cache with per-entry expiry
///
/// Expired entries are dropped when read, in bulk by
/// [`purge_expired`](Self::purge_expired), or periodically by a task from
/// [`spawn_purger`](Self::spawn_purger).
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Purge expired entries every `every` until `cancel` fires
    ///
    /// ```rust,ignore
    /// let cache = MemoryCache::new();
    /// let purger = cache.spawn_purger(Duration::from_secs(60), shutdown.child_token());
    /// ```
    pub fn spawn_purger(&self, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => {
                        tracing::debug!("Response cache purger stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            tracing::debug!(
                                purged,
                                remaining = cache.len(),
                                "Purged expired cache entries"
                            );
                        }
                    }
                }
            }
        })
    }

    /// Drop all entries for a path, whatever their query string
    pub fn invalidate_path(&self, path: &str) -> usize {
        let path = normalize_path(path);
        let before = self.entries.len();
        self.entries.retain(|key, _| {
            let key_path = key.split_once('?').map_or(key.as_str(), |(p, _)| p);
            key_path != path
        });
        before.saturating_sub(self.entries.len())
    }
}

impl ResponseCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CachedResponse>> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }

        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: CachedResponse, ttl: Duration) -> Result<()> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| Error::Internal(format!("Cache TTL out of range: {:?}", ttl)))?;
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }
}

/// A cache plus the TTL applied to entries it stores
#[derive(Debug, Clone)]
pub struct CachedRoutes<C> {
    pub cache: C,
    pub ttl: Duration,
}

impl<C> CachedRoutes<C> {
    pub fn new(cache: C, ttl: Duration) -> Self {
        Self { cache, ttl }
    }
}

/// Middleware serving anonymous `GET` requests from a cache
///
/// Requests carrying an `Authorization` header bypass the cache. Cache
/// failures are logged and the request is served normally.
pub async fn cache_middleware<C>(
    State(routes): State<Arc<CachedRoutes<C>>>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, Error>
where
    C: ResponseCache + 'static,
{
    if request.method() != Method::GET || request.headers().contains_key(header::AUTHORIZATION) {
        return Ok(next.run(request).await);
    }

    let key = cache_key(request.uri());
    match routes.cache.get(&key).await {
        Ok(Some(hit)) => {
            tracing::debug!(key = %key, "Response cache hit");
            let mut response = hit.into_response();
            response
                .headers_mut()
                .insert(X_CACHE, HeaderValue::from_static("hit"));
            return Ok(response);
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(key = %key, error = %e, "Response cache read failed"),
    }

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return Ok(response);
    }

    let (mut parts, body) = response.into_parts();
    let body = to_bytes(body, usize::MAX)
        .await
        .map_err(|e| Error::Internal(format!("Failed to buffer response body: {}", e)))?;

    let entry = CachedResponse {
        status: parts.status,
        headers: parts.headers.clone(),
        body: body.clone(),
    };
    if let Err(e) = routes.cache.set(&key, entry, routes.ttl).await {
        tracing::warn!(key = %key, error = %e, "Response cache write failed");
    }

    parts
        .headers
        .insert(X_CACHE, HeaderValue::from_static("miss"));
    Ok(Response::from_parts(parts, Body::from(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn entry(body: &'static str) -> CachedResponse {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        CachedResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/venues"), "/venues");
        assert_eq!(normalize_path("/venues/"), "/venues");
        assert_eq!(normalize_path("//venues///42/"), "/venues/42");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn test_cache_key_sorts_query() {
        let a: Uri = "/venues?page=2&limit=10".parse().unwrap();
        let b: Uri = "/venues/?limit=10&page=2".parse().unwrap();
        assert_eq!(cache_key(&a), cache_key(&b));
        assert_eq!(cache_key(&a), "/venues?limit=10&page=2");

        let c: Uri = "/venues?page=3&limit=10".parse().unwrap();
        assert_ne!(cache_key(&a), cache_key(&c));

        let bare: Uri = "/venues?&".parse().unwrap();
        assert_eq!(cache_key(&bare), "/venues");
    }

    #[tokio::test]
    async fn test_memory_cache_get_set_delete() {
        let cache = MemoryCache::new();
        assert!(cache.get("/venues").await.unwrap().is_none());

        cache
            .set("/venues", entry("[]"), Duration::from_secs(60))
            .await
            .unwrap();
        let hit = cache.get("/venues").await.unwrap().unwrap();
        assert_eq!(hit.body, Bytes::from_static(b"[]"));

        assert!(cache.delete("/venues").await.unwrap());
        assert!(!cache.delete("/venues").await.unwrap());
        assert!(cache.get("/venues").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_are_dropped() {
        let cache = MemoryCache::new();
        cache.set("/a", entry("1"), Duration::ZERO).await.unwrap();
        cache.set("/b", entry("2"), Duration::ZERO).await.unwrap();
        cache
            .set("/c", entry("3"), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(cache.get("/a").await.unwrap().is_none());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_purger_drops_stale_entries_without_reads() {
        let cache = MemoryCache::new();
        cache
            .set("/gigs", entry("[]"), Duration::from_millis(10))
            .await
            .unwrap();
        cache
            .set("/venues", entry("[]"), Duration::from_secs(60))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let purger = cache.spawn_purger(Duration::from_millis(5), cancel.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.len(), 1);
        assert!(cache.get("/venues").await.unwrap().is_some());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), purger)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalidate_path() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("/venues?page=1", entry("1"), ttl).await.unwrap();
        cache.set("/venues?page=2", entry("2"), ttl).await.unwrap();
        cache.set("/venues", entry("3"), ttl).await.unwrap();
        cache.set("/gigs", entry("4"), ttl).await.unwrap();

        assert_eq!(cache.invalidate_path("/venues/"), 3);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_middleware_serves_repeat_requests_from_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let routes = Arc::new(CachedRoutes::new(MemoryCache::new(), Duration::from_secs(60)));

        let app = Router::new()
            .route(
                "/venues",
                get(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        "[]"
                    }
                }),
            )
            .layer(middleware::from_fn_with_state(
                routes,
                cache_middleware::<MemoryCache>,
            ));

        let get_venues = |uri: &str, authorized: bool| {
            let mut builder = Request::builder().uri(uri);
            if authorized {
                builder = builder.header(header::AUTHORIZATION, "Bearer t");
            }
            builder.body(Body::empty()).unwrap()
        };

        let first = app
            .clone()
            .oneshot(get_venues("/venues?page=1&limit=5", false))
            .await
            .unwrap();
        assert_eq!(first.headers()[X_CACHE], "miss");

        let second = app
            .clone()
            .oneshot(get_venues("/venues?limit=5&page=1", false))
            .await
            .unwrap();
        assert_eq!(second.headers()[X_CACHE], "hit");
        let body = to_bytes(second.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"[]");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let authorized = app
            .oneshot(get_venues("/venues?page=1&limit=5", true))
            .await
            .unwrap();
        assert!(authorized.headers().get(X_CACHE).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
