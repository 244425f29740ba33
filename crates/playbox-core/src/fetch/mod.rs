//! Deduplicating cache for remote module fetches.
//!
//! Each URL maps to a shared once-cell: the first requester performs the
//! fetch, concurrent requesters for the same URL block on the same cell and
//! receive the same result. After a redirect the final URL is recorded as an
//! extra key. Failed fetches are evicted so the next build retries them.

mod http;

pub use http::HttpFetcher;

use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use thiserror::Error;
use tracing::debug;

/// A fetched remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// URL the content was finally served from, after redirects.
    pub url: String,
    pub body: String,
    pub content_type: Option<String>,
}

/// Remote fetch failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not create HTTP client: {0}")]
    Client(String),
}

impl FetchError {
    /// The URL that failed, when there is one.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Request { url, .. } | Self::Status { url, .. } => Some(url),
            Self::Client(_) => None,
        }
    }
}

/// Something that can fetch a URL. Blocking; called from build threads.
pub trait RemoteFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Fetched, FetchError>;
}

type Cell = Arc<OnceLock<Result<Arc<Fetched>, FetchError>>>;

/// URL-keyed fetch cache shared by every module of every build in a session.
pub struct FetchCache {
    fetcher: Box<dyn RemoteFetcher>,
    entries: Mutex<FxHashMap<String, Cell>>,
}

impl std::fmt::Debug for FetchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl FetchCache {
    #[must_use]
    pub fn new(fetcher: impl RemoteFetcher + 'static) -> Self {
        Self {
            fetcher: Box::new(fetcher),
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Cache backed by a real HTTP client.
    pub fn http() -> Result<Self, FetchError> {
        Ok(Self::new(HttpFetcher::new()?))
    }

    /// Fetch `url`, joining an in-flight or completed request for the same URL.
    pub fn get(&self, url: &str) -> Result<Arc<Fetched>, FetchError> {
        let cell = self
            .lock()
            .entry(url.to_string())
            .or_default()
            .clone();

        let result = cell
            .get_or_init(|| {
                debug!(url, "Fetching");
                self.fetcher.fetch(url).map(Arc::new)
            })
            .clone();

        match &result {
            Ok(fetched) if fetched.url != url => {
                self.lock().entry(fetched.url.clone()).or_insert_with(|| {
                    let alias = OnceLock::new();
                    let _ = alias.set(Ok(Arc::clone(fetched)));
                    Arc::new(alias)
                });
            }
            Ok(_) => {}
            Err(_) => {
                let mut entries = self.lock();
                if entries.get(url).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                    entries.remove(url);
                }
            }
        }
        result
    }

    /// Final URL of a completed fetch, for resolving the module's own imports.
    #[must_use]
    pub fn final_url(&self, url: &str) -> Option<String> {
        let cell = self.lock().get(url).cloned()?;
        match cell.get()? {
            Ok(fetched) => Some(fetched.url.clone()),
            Err(_) => None,
        }
    }

    /// Number of cached keys (including redirect aliases).
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FxHashMap<String, Cell>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts requests; `/slow` sleeps, `/moved` redirects, `/fail` fails once.
    #[derive(Default)]
    struct CountingFetcher {
        calls: Arc<AtomicUsize>,
    }

    impl RemoteFetcher for CountingFetcher {
        fn fetch(&self, url: &str) -> Result<Fetched, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if url.ends_with("/slow") {
                std::thread::sleep(Duration::from_millis(50));
            }
            if url.ends_with("/fail") && n == 0 {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 503,
                });
            }
            let final_url = if url.ends_with("/moved") {
                url.replace("/moved", "/target")
            } else {
                url.to_string()
            };
            Ok(Fetched {
                url: final_url,
                body: format!("// {url}"),
                content_type: None,
            })
        }
    }

    fn cache() -> (FetchCache, Arc<AtomicUsize>) {
        let fetcher = CountingFetcher::default();
        let calls = Arc::clone(&fetcher.calls);
        (FetchCache::new(fetcher), calls)
    }

    #[test]
    fn test_concurrent_requests_share_one_fetch() {
        let (cache, calls) = cache();
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get("https://cdn.test/slow").unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().body, "// https://cdn.test/slow");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_redirect_target_is_an_extra_key() {
        let (cache, calls) = cache();
        let fetched = cache.get("https://cdn.test/moved").unwrap();
        assert_eq!(fetched.url, "https://cdn.test/target");
        assert_eq!(
            cache.final_url("https://cdn.test/moved").as_deref(),
            Some("https://cdn.test/target")
        );

        cache.get("https://cdn.test/target").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failures_are_evicted_and_retried() {
        let (cache, calls) = cache();
        let err = cache.get("https://cdn.test/fail").unwrap_err();
        assert_eq!(err.url(), Some("https://cdn.test/fail"));
        assert!(cache.is_empty());

        assert!(cache.get("https://cdn.test/fail").is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
