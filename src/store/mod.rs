//! Backend seams of the catalog core
//!
//! The core never talks HTTP directly. Rows go through a [`CatalogStore`],
//! images through an [`ObjectStore`] and the acting user comes from a
//! [`SessionProvider`]. [`supabase`] implements them over the hosted
//! backend, [`memory`] in process.

pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::filters::{FacetValues, FilterSpec};
use crate::models::{NewTheme, NewToy, Theme, Toy, ToyChanges};

pub use memory::{MemoryObjects, MemoryStore};
pub use supabase::{SupabaseObjects, SupabaseStore};

/// Row access for themes and toys.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// The user's themes, oldest first.
    async fn list_themes(&self, user_id: &str) -> Result<Vec<Theme>>;

    /// The user's themes whose name equals `name` ignoring case, oldest first.
    async fn find_themes_by_name(&self, user_id: &str, name: &str) -> Result<Vec<Theme>>;

    async fn insert_theme(&self, theme: &NewTheme) -> Result<Theme>;

    async fn delete_theme(&self, theme_id: Uuid) -> Result<()>;

    /// Toys of a theme matching `spec`, in no particular order.
    async fn fetch_toys(&self, theme_id: Uuid, spec: &FilterSpec) -> Result<Vec<Toy>>;

    /// Number of toys of a theme matching `spec`.
    async fn count_toys(&self, theme_id: Uuid, spec: &FilterSpec) -> Result<u64>;

    /// Distinct categories, studios and release years of a theme.
    async fn facet_values(&self, theme_id: Uuid) -> Result<FacetValues>;

    async fn insert_toy(&self, toy: &NewToy) -> Result<Toy>;

    async fn update_toy(&self, toy_id: Uuid, changes: &ToyChanges) -> Result<Toy>;

    async fn delete_toy(&self, toy_id: Uuid) -> Result<()>;
}

/// A signed URL and the lifetime the store granted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_in: Duration,
}

/// Image object access.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn create_signed_url(&self, path: &str, ttl: Duration) -> Result<SignedUrl>;

    /// Store `bytes` at `path`, replacing any existing object. Returns the stored path.
    async fn upload(&self, path: &str, bytes: Bytes, content_type: Option<&str>) -> Result<String>;

    async fn remove(&self, paths: &[String]) -> Result<()>;
}

/// Source of the acting user.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The signed-in user's id, `None` without a session.
    async fn current_user_id(&self) -> Result<Option<String>>;
}

#[async_trait]
impl SessionProvider for toyverse_auth::Auth {
    async fn current_user_id(&self) -> Result<Option<String>> {
        match self.get_session().await {
            Some(session) => Ok(Some(session.user_id()?)),
            None => Ok(None),
        }
    }
}

/// A fixed user, for tools and tests that bypass sign-in.
#[derive(Debug, Clone, Default)]
pub struct StaticSession(pub Option<String>);

impl StaticSession {
    pub fn signed_in(user_id: &str) -> Self {
        Self(Some(user_id.to_string()))
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn current_user_id(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}
