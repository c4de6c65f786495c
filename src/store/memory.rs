//! In-process backend with the same predicate semantics as the hosted one
//!
//! Used by the test suites and for running the core without a network.
//! Besides the trait operations it exposes a few hooks to inject
//! failures and to hold toy queries in flight.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

use super::{CatalogStore, ObjectStore, SignedUrl};
use crate::error::{Error, Result};
use crate::filters::{FacetValues, FilterSpec};
use crate::models::{NewTheme, NewToy, Theme, Toy, ToyChanges};

/// Theme and toy rows kept in memory.
#[derive(Default)]
pub struct MemoryStore {
    themes: RwLock<Vec<Theme>>,
    toys: RwLock<Vec<Toy>>,
    failing: AtomicBool,
    hold_fetches: AtomicBool,
    held_arrived: Notify,
    held_release: Notify,
    count_queries: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a theme row as is.
    pub async fn seed_theme(&self, theme: Theme) {
        let mut themes = self.themes.write().await;
        themes.retain(|t| t.id != theme.id);
        themes.push(theme);
    }

    /// Insert or replace a toy row as is.
    pub async fn seed_toy(&self, toy: Toy) {
        let mut toys = self.toys.write().await;
        match toys.iter_mut().find(|t| t.id == toy.id) {
            Some(existing) => *existing = toy,
            None => toys.push(toy),
        }
    }

    pub async fn toys(&self) -> Vec<Toy> {
        self.toys.read().await.clone()
    }

    /// Make every following operation fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Park the next toy queries until [`MemoryStore::release_held_fetches`].
    pub fn hold_fetches(&self, hold: bool) {
        self.hold_fetches.store(hold, Ordering::SeqCst);
    }

    /// Wait until a toy query is parked.
    pub async fn wait_for_held_fetch(&self) {
        self.held_arrived.notified().await;
    }

    pub fn release_held_fetches(&self) {
        self.held_release.notify_one();
    }

    /// Number of count queries answered so far.
    pub fn count_queries(&self) -> usize {
        self.count_queries.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::backend("store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_themes(&self, user_id: &str) -> Result<Vec<Theme>> {
        self.check()?;
        let mut themes: Vec<Theme> = self
            .themes
            .read()
            .await
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        themes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(themes)
    }

    async fn find_themes_by_name(&self, user_id: &str, name: &str) -> Result<Vec<Theme>> {
        let wanted = name.to_lowercase();
        Ok(self
            .list_themes(user_id)
            .await?
            .into_iter()
            .filter(|t| t.name.to_lowercase() == wanted)
            .collect())
    }

    async fn insert_theme(&self, theme: &NewTheme) -> Result<Theme> {
        self.check()?;
        let row = Theme {
            id: Uuid::new_v4(),
            name: theme.name.clone(),
            image: theme.image.clone(),
            user_id: theme.user_id.clone(),
            created_at: Utc::now(),
        };
        self.themes.write().await.push(row.clone());
        Ok(row)
    }

    async fn delete_theme(&self, theme_id: Uuid) -> Result<()> {
        self.check()?;
        self.themes.write().await.retain(|t| t.id != theme_id);
        self.toys.write().await.retain(|t| t.theme_id != theme_id);
        Ok(())
    }

    async fn fetch_toys(&self, theme_id: Uuid, spec: &FilterSpec) -> Result<Vec<Toy>> {
        if self.hold_fetches.load(Ordering::SeqCst) {
            debug!("holding toy query for theme {}", theme_id);
            self.held_arrived.notify_one();
            self.held_release.notified().await;
        }
        self.check()?;
        Ok(self
            .toys
            .read()
            .await
            .iter()
            .filter(|t| t.theme_id == theme_id && spec.matches(t))
            .cloned()
            .collect())
    }

    async fn count_toys(&self, theme_id: Uuid, spec: &FilterSpec) -> Result<u64> {
        self.check()?;
        self.count_queries.fetch_add(1, Ordering::SeqCst);
        let count = self
            .toys
            .read()
            .await
            .iter()
            .filter(|t| t.theme_id == theme_id && spec.matches(t))
            .count();
        Ok(count as u64)
    }

    async fn facet_values(&self, theme_id: Uuid) -> Result<FacetValues> {
        self.check()?;
        let toys = self.toys.read().await;
        Ok(FacetValues::from_toys(
            toys.iter().filter(|t| t.theme_id == theme_id),
        ))
    }

    async fn insert_toy(&self, toy: &NewToy) -> Result<Toy> {
        self.check()?;
        let row = Toy {
            id: Uuid::new_v4(),
            theme_id: toy.theme_id,
            user_id: toy.user_id.clone(),
            name: toy.name.clone(),
            size: toy.size.clone(),
            nb_pieces: toy.nb_pieces,
            number: toy.number.clone(),
            is_exposed: toy.is_exposed,
            is_soon: toy.is_soon,
            photo_url: toy.photo_url.clone(),
            category: toy.category.clone(),
            studio: toy.studio.clone(),
            release_date: toy.release_date,
            created_at: Utc::now(),
        };
        self.toys.write().await.push(row.clone());
        Ok(row)
    }

    async fn update_toy(&self, toy_id: Uuid, changes: &ToyChanges) -> Result<Toy> {
        self.check()?;
        let mut toys = self.toys.write().await;
        let toy = toys
            .iter_mut()
            .find(|t| t.id == toy_id)
            .ok_or_else(|| Error::not_found(format!("toy {}", toy_id)))?;
        *toy = changes.apply_to(toy);
        Ok(toy.clone())
    }

    async fn delete_toy(&self, toy_id: Uuid) -> Result<()> {
        self.check()?;
        self.toys.write().await.retain(|t| t.id != toy_id);
        Ok(())
    }
}

/// Objects kept in memory; signed URLs are `memory://{path}?v={n}`.
#[derive(Default)]
pub struct MemoryObjects {
    objects: RwLock<HashMap<String, Bytes>>,
    granted_lifetime: RwLock<Option<Duration>>,
    signing_delay: RwLock<Option<Duration>>,
    failing: AtomicBool,
    sign_calls: AtomicUsize,
}

impl MemoryObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `lifetime` regardless of the requested one.
    pub async fn grant_lifetime(&self, lifetime: Duration) {
        *self.granted_lifetime.write().await = Some(lifetime);
    }

    /// Sleep this long inside every signing call.
    pub async fn set_signing_delay(&self, delay: Duration) {
        *self.signing_delay.write().await = Some(delay);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of signing calls received so far.
    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.objects.read().await.contains_key(path)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjects {
    async fn create_signed_url(&self, path: &str, ttl: Duration) -> Result<SignedUrl> {
        let call = self.sign_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.signing_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::backend(format!("cannot sign {}", path)));
        }
        let expires_in = self.granted_lifetime.read().await.unwrap_or(ttl);
        Ok(SignedUrl {
            url: format!("memory://{}?v={}", path, call),
            expires_in,
        })
    }

    async fn upload(&self, path: &str, bytes: Bytes, _content_type: Option<&str>) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::backend(format!("cannot upload {}", path)));
        }
        self.objects.write().await.insert(path.to_string(), bytes);
        Ok(path.to_string())
    }

    async fn remove(&self, paths: &[String]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::backend("cannot remove objects"));
        }
        let mut objects = self.objects.write().await;
        for path in paths {
            objects.remove(path);
        }
        Ok(())
    }
}
