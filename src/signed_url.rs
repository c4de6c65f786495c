//! Signed image URL cache with request coalescing
//!
//! Image objects live in a private bucket and are shown through
//! time-limited signed URLs. The cache keeps each URL until shortly before
//! the store says it expires and makes sure that concurrent requests for
//! the same image issue a single signing call.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::ClientOptions;
use crate::storage_path::resolve_storage_path;
use crate::store::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    item_id: String,
    raw_ref: String,
    user_id: Option<String>,
}

struct Entry {
    url: String,
    expires_at: Instant,
    last_used: u64,
}

#[derive(Default)]
struct Entries {
    map: HashMap<CacheKey, Entry>,
    tick: u64,
}

impl Entries {
    fn lookup(&mut self, key: &CacheKey, now: Instant) -> Option<String> {
        self.tick += 1;
        let tick = self.tick;
        let expired = match self.map.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.last_used = tick;
                return Some(entry.url.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.map.remove(key);
        }
        None
    }

    fn insert(&mut self, key: CacheKey, url: String, expires_at: Instant, capacity: usize) {
        if capacity == 0 {
            return;
        }
        if !self.map.contains_key(&key) && self.map.len() >= capacity {
            let now = Instant::now();
            self.map.retain(|_, entry| entry.expires_at > now);
        }
        while !self.map.contains_key(&key) && self.map.len() >= capacity {
            let oldest = self
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(oldest) => {
                    debug!("evicting signed url for {}", oldest.item_id);
                    self.map.remove(&oldest);
                }
                None => break,
            }
        }
        self.tick += 1;
        self.map.insert(
            key,
            Entry {
                url,
                expires_at,
                last_used: self.tick,
            },
        );
    }
}

type Pending = Shared<BoxFuture<'static, Option<String>>>;

struct Inner {
    objects: Arc<dyn ObjectStore>,
    ttl: Duration,
    margin: Duration,
    capacity: usize,
    entries: Mutex<Entries>,
    in_flight: Mutex<HashMap<CacheKey, Pending>>,
}

/// Process-wide cache of signed URLs, shared by cloning.
#[derive(Clone)]
pub struct SignedUrlCache {
    inner: Arc<Inner>,
}

impl SignedUrlCache {
    pub fn new(objects: Arc<dyn ObjectStore>, options: &ClientOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                objects,
                ttl: options.signed_url_ttl,
                margin: options.signed_url_margin,
                capacity: options.signed_url_cache_capacity,
                entries: Mutex::new(Entries::default()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// A displayable URL for the image `raw_ref` of item `item_id`.
    ///
    /// Returns `None` for an empty reference or when signing fails. Failures
    /// are logged and not cached, so the next call retries.
    pub async fn resolve(&self, item_id: &str, raw_ref: &str, user_id: Option<&str>) -> Option<String> {
        let key = CacheKey {
            item_id: item_id.to_string(),
            raw_ref: raw_ref.to_string(),
            user_id: user_id.map(str::to_string),
        };

        if let Some(url) = self.inner.entries.lock().await.lookup(&key, Instant::now()) {
            return Some(url);
        }

        let pending = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.get(&key) {
                Some(pending) => pending.clone(),
                None => {
                    let trimmed = raw_ref.trim();
                    if trimmed.is_empty() {
                        return None;
                    }
                    if trimmed.starts_with("http") {
                        return Some(trimmed.to_string());
                    }
                    // A request may have finished since the first lookup.
                    if let Some(url) = self.inner.entries.lock().await.lookup(&key, Instant::now()) {
                        return Some(url);
                    }

                    let pending = sign(self.inner.clone(), key.clone()).boxed().shared();
                    in_flight.insert(key, pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Forget every URL cached for one item.
    pub async fn invalidate_item(&self, item_id: &str) {
        self.inner
            .entries
            .lock()
            .await
            .map
            .retain(|key, _| key.item_id != item_id);
    }

    pub async fn clear(&self) {
        self.inner.entries.lock().await.map.clear();
    }

    /// Number of cached URLs, expired ones included until evicted.
    pub async fn len(&self) -> usize {
        self.inner.entries.lock().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

async fn sign(inner: Arc<Inner>, key: CacheKey) -> Option<String> {
    let path = resolve_storage_path(&key.raw_ref, key.user_id.as_deref());
    let result = inner.objects.create_signed_url(&path, inner.ttl).await;

    let url = match result {
        Ok(signed) => {
            let expires_at = Instant::now() + signed.expires_in.saturating_sub(inner.margin);
            inner
                .entries
                .lock()
                .await
                .insert(key.clone(), signed.url.clone(), expires_at, inner.capacity);
            Some(signed.url)
        }
        Err(e) => {
            warn!("could not sign {} for item {}: {}", path, key.item_id, e);
            None
        }
    };

    inner.in_flight.lock().await.remove(&key);
    url
}
