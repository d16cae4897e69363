//! Content-addressed result cache
//!
//! Results are cached in an external byte-addressable key-value store under
//! keys derived purely from the request: `"<namespace>:<hex>"`, where the hex
//! digits are the first 64 bits of a BLAKE3 digest over the request's bincode
//! encoding. Values are bincode too — measured on a representative graph
//! response this came to roughly 260 KiB against 1.44 MiB of plain JSON.
//!
//! The cache is strictly opportunistic:
//! - backend failures are logged and treated as a miss on `get`, ignored on
//!   `put` — a broken store degrades to recomputation, never to a request
//!   failure;
//! - a value that no longer decodes (schema drift between builds) is a miss;
//! - no expiry is set; the backend may evict at will.
//!
//! Two simultaneous misses for one key both compute and both write. That is
//! fine: values are pure functions of their keys, so the writes agree.
//!
//! The `"version"` key records the upstream data release the entries were
//! computed under. When the kernel reports a different release the whole
//! store is flushed before anything else is read, so stale entries are
//! unreachable by construction.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info, warn};

use crate::ItcError;

/// Key that records the upstream data release for version gating.
pub const VERSION_KEY: &str = "version";

/// Failures of the key-value backend. Always swallowed by the callers in
/// this crate; carried only for logging.
#[derive(Debug, thiserror::Error)]
pub enum KvsError {
    /// The store could not be reached.
    #[error("cache transport: {0}")]
    Transport(String),
    /// The store answered with something unusable.
    #[error("cache backend: {0}")]
    Backend(String),
}

/// The three operations the cache consumes from its backend.
#[allow(async_fn_in_trait)]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value; `None` on a clean miss.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvsError>;
    /// Store a value, no expiry.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), KvsError>;
    /// Drop every key. Used only by version gating.
    async fn flush_all(&self) -> Result<(), KvsError>;
}

// ============================================================================
// Upstash-style Redis REST backend
// ============================================================================

#[derive(Deserialize)]
struct UpstashResp<T> {
    result: T,
}

/// Redis reached over its REST facade; values travel base64-encoded.
#[derive(Clone)]
pub struct Kvs {
    url: String,
    token: String,
    http: reqwest::Client,
}

impl Kvs {
    /// Build from the REST endpoint and bearer token.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut url = url.into();
        while url.ends_with('/') {
            url.pop();
        }
        Self { url, token: token.into(), http: reqwest::Client::new() }
    }

    #[inline]
    fn auth(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        rb.header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
    }
}

impl KeyValueStore for Kvs {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvsError> {
        let url = format!("{}/get/{}", self.url, key);
        let res = self
            .auth(self.http.get(&url))
            .send()
            .await
            .map_err(|e| KvsError::Transport(e.to_string()))?;
        let status = res.status();
        let text = res.text().await.map_err(|e| KvsError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(KvsError::Backend(format!("GET {key} {status} {text}")));
        }
        let parsed: UpstashResp<Option<serde_json::Value>> =
            serde_json::from_str(&text).map_err(|e| KvsError::Backend(e.to_string()))?;
        let encoded = match parsed.result {
            None => return Ok(None),
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
        };
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map(Some)
            .map_err(|e| KvsError::Backend(format!("value for {key} is not base64: {e}")))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), KvsError> {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(value);
        let url = format!("{}/set/{}", self.url, key);
        let body = serde_json::to_string(&[encoded]).map_err(|e| KvsError::Backend(e.to_string()))?;
        let res = self
            .auth(self.http.post(&url))
            .body(body)
            .send()
            .await
            .map_err(|e| KvsError::Transport(e.to_string()))?;
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(KvsError::Backend(format!("SET {key} {status} {text}")));
        }
        Ok(())
    }

    async fn flush_all(&self) -> Result<(), KvsError> {
        let url = format!("{}/flushdb", self.url);
        let res = self
            .auth(self.http.post(&url))
            .send()
            .await
            .map_err(|e| KvsError::Transport(e.to_string()))?;
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(KvsError::Backend(format!("FLUSHDB {status} {text}")));
        }
        Ok(())
    }
}

// ============================================================================
// In-memory backend (dev runs without a cache URL, and tests)
// ============================================================================

/// Process-local store; contents die with the process.
#[derive(Default)]
pub struct MemKvs {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemKvs {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemKvs {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvsError> {
        Ok(self.entries.read().expect("mem kvs lock").get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), KvsError> {
        self.entries.write().expect("mem kvs lock").insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn flush_all(&self) -> Result<(), KvsError> {
        self.entries.write().expect("mem kvs lock").clear();
        Ok(())
    }
}

/// The backend chosen at startup.
pub enum CacheStore {
    /// External Redis REST store.
    Upstash(Kvs),
    /// Process-local fallback.
    Memory(MemKvs),
}

impl KeyValueStore for CacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvsError> {
        match self {
            CacheStore::Upstash(k) => k.get(key).await,
            CacheStore::Memory(m) => m.get(key).await,
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), KvsError> {
        match self {
            CacheStore::Upstash(k) => k.put(key, value).await,
            CacheStore::Memory(m) => m.put(key, value).await,
        }
    }

    async fn flush_all(&self) -> Result<(), KvsError> {
        match self {
            CacheStore::Upstash(k) => k.flush_all().await,
            CacheStore::Memory(m) => m.flush_all().await,
        }
    }
}

// ============================================================================
// Keys
// ============================================================================

/// Result kind prefix; distinct prefixes keep the three result shapes from
/// ever decoding into each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Namespace {
    /// Spectroscopy graph results.
    SpecGraph,
    /// Spectroscopy integration-time results.
    SpecTime,
    /// Imaging integration-time results.
    ImgTime,
}

impl Namespace {
    /// The prefix as it appears in keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::SpecGraph => "spec-graph",
            Namespace::SpecTime => "spec-time",
            Namespace::ImgTime => "img-time",
        }
    }
}

/// Derive the cache key for a normalised request: namespace, colon, then the
/// first 64 bits of `blake3(bincode(request))` in lowercase hex.
pub fn request_key<R: Serialize>(namespace: Namespace, request: &R) -> String {
    let bytes = bincode::serialize(request).expect("request encoding is infallible");
    let digest = blake3::hash(&bytes);
    format!("{}:{}", namespace.as_str(), hex::encode(&digest.as_bytes()[..8]))
}

// ============================================================================
// Result cache
// ============================================================================

/// Binary get-or-compute cache over any [`KeyValueStore`].
pub struct ResultCache<K> {
    store: K,
}

/// Last data release seen by this process; skips a store read per request
/// once the release is known.
#[derive(Default)]
pub struct VersionTracker {
    last: RwLock<Option<String>>,
}

impl VersionTracker {
    fn matches(&self, version: &str) -> bool {
        self.last.read().expect("version lock").as_deref() == Some(version)
    }

    fn record(&self, version: &str) {
        *self.last.write().expect("version lock") = Some(version.to_string());
    }
}

impl<K: KeyValueStore> ResultCache<K> {
    /// Wrap a backend.
    pub fn new(store: K) -> Self {
        Self { store }
    }

    /// Look the request up; on a miss (including backend errors and decode
    /// failures) await `compute`, store its encoding, and return it. Store
    /// problems never fail the request.
    pub async fn get_or_invoke<R, V, Fut>(
        &self,
        namespace: Namespace,
        request: &R,
        compute: Fut,
    ) -> Result<V, ItcError>
    where
        R: Serialize,
        V: Serialize + DeserializeOwned,
        Fut: std::future::Future<Output = Result<V, ItcError>>,
    {
        let key = request_key(namespace, request);
        match self.store.get(&key).await {
            Ok(Some(bytes)) => match bincode::deserialize::<V>(&bytes) {
                Ok(value) => {
                    debug!(%key, "cache hit");
                    return Ok(value);
                }
                Err(e) => debug!(%key, "cached bytes no longer decode ({e}), recomputing"),
            },
            Ok(None) => debug!(%key, "cache miss"),
            Err(e) => warn!(%key, "cache get failed, treating as miss: {e}"),
        }

        let value = compute.await?;
        match bincode::serialize(&value) {
            Ok(bytes) => {
                if let Err(e) = self.store.put(&key, &bytes).await {
                    warn!(%key, "cache put failed, result not stored: {e}");
                }
            }
            Err(e) => warn!(%key, "result not encodable, not stored: {e}"),
        }
        Ok(value)
    }

    /// Gate the store on the upstream data release: on a change, flush
    /// everything and record the new release at [`VERSION_KEY`]. Backend
    /// failures are logged and swallowed.
    pub async fn ensure_version(&self, tracker: &VersionTracker, current: &str) {
        if tracker.matches(current) {
            return;
        }
        let stored = match self.store.get(VERSION_KEY).await {
            Ok(bytes) => bytes.map(|b| String::from_utf8_lossy(&b).into_owned()),
            Err(e) => {
                warn!("cache version read failed: {e}");
                return;
            }
        };
        if stored.as_deref() == Some(current) {
            tracker.record(current);
            return;
        }
        info!(
            old = stored.as_deref().unwrap_or("<none>"),
            new = current,
            "upstream data version changed, flushing result cache"
        );
        if let Err(e) = self.store.flush_all().await {
            warn!("cache flush failed: {e}");
            return;
        }
        if let Err(e) = self.store.put(VERSION_KEY, current.as_bytes()).await {
            warn!("cache version write failed: {e}");
            return;
        }
        tracker.record(current);
    }
}

// ============================================================================
// Tests
// ============================================================================
