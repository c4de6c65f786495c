//! ToyVerse catalog core
//!
//! Themes, toys and their images for a personal collection catalog backed
//! by a hosted Supabase project: theme lookup by slug, cross-filtered facet
//! counts, sorting, pagination and cached signed image URLs.

pub mod catalog;
pub mod config;
pub mod error;
pub mod filters;
pub mod models;
pub mod pagination;
pub mod signed_url;
pub mod slug;
pub mod sort;
pub mod storage_path;
pub mod store;
pub mod themes;

use bytes::Bytes;
use log::{info, warn};
use reqwest::Client;
use std::sync::Arc;
use toyverse_auth::Auth;

use crate::catalog::{Backends, ThemeView};
use crate::config::{ClientOptions, SupabaseConfig};
use crate::error::{Error, Result};
use crate::filters::FilterSpec;
use crate::models::{NewTheme, Theme};
use crate::signed_url::SignedUrlCache;
use crate::storage_path::{image_object_path, ImageKind};
use crate::store::{CatalogStore, ObjectStore, SessionProvider, SupabaseObjects, SupabaseStore};

/// The main entry point of the catalog core
pub struct ToyVerse {
    /// Client options
    pub options: ClientOptions,
    backends: Backends,
    auth: Option<Auth>,
}

impl ToyVerse {
    /// Create a client for a hosted project
    ///
    /// # Example
    ///
    /// ```
    /// use toyverse::{ToyVerse, config::{ClientOptions, SupabaseConfig}};
    ///
    /// let config = SupabaseConfig::new("https://your-project-url.supabase.co", "your-anon-key".to_string()).unwrap();
    /// let toyverse = ToyVerse::new(&config, ClientOptions::default()).unwrap();
    /// ```
    pub fn new(config: &SupabaseConfig, options: ClientOptions) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        let base_url = config.base_url();
        let auth = Auth::new(base_url, &config.anon_key, http_client.clone());
        let store = SupabaseStore::new(base_url, &config.anon_key, http_client.clone())
            .with_auth(auth.clone());
        let objects = SupabaseObjects::new(
            base_url,
            &config.anon_key,
            &options.storage_bucket,
            http_client,
        )
        .with_auth(auth.clone());

        let mut toyverse = Self::with_backends(
            Arc::new(store),
            Arc::new(objects),
            Arc::new(auth.clone()),
            options,
        );
        toyverse.auth = Some(auth);
        Ok(toyverse)
    }

    /// Create a client over arbitrary backends, e.g. [`store::memory`]
    pub fn with_backends(
        store: Arc<dyn CatalogStore>,
        objects: Arc<dyn ObjectStore>,
        session: Arc<dyn SessionProvider>,
        options: ClientOptions,
    ) -> Self {
        let urls = SignedUrlCache::new(objects.clone(), &options);
        Self {
            options,
            backends: Backends {
                store,
                objects,
                session,
                urls,
            },
            auth: None,
        }
    }

    /// The auth client, when connected to a hosted project
    pub fn auth(&self) -> Option<&Auth> {
        self.auth.as_ref()
    }

    /// The signed URL cache shared by every view of this client
    pub fn signed_urls(&self) -> &SignedUrlCache {
        &self.backends.urls
    }

    /// The signed-in user's id
    pub async fn current_user_id(&self) -> Result<String> {
        self.backends.require_user().await
    }

    /// The signed-in user's themes, oldest first
    pub async fn list_themes(&self) -> Result<Vec<Theme>> {
        let user_id = self.current_user_id().await?;
        self.backends.store.list_themes(&user_id).await
    }

    /// Resolve a URL slug to one of the signed-in user's themes
    pub async fn theme_by_slug(&self, slug: &str) -> Result<Theme> {
        let user_id = self.current_user_id().await?;
        themes::find_theme_by_slug(self.backends.store.as_ref(), &user_id, slug)
            .await?
            .ok_or_else(|| Error::not_found(format!("theme {:?}", slug)))
    }

    /// Create a theme owned by the signed-in user
    pub async fn create_theme(&self, name: &str, image: Option<String>) -> Result<Theme> {
        let user_id = self.current_user_id().await?;
        let theme = NewTheme {
            name: name.trim().to_string(),
            image: image.filter(|i| !i.trim().is_empty()),
            user_id,
        };
        theme.validate()?;

        let created = self.backends.store.insert_theme(&theme).await?;
        info!("created theme {} ({})", created.name, created.slug());
        Ok(created)
    }

    /// Delete a theme with its toys, their images and the cover image
    pub async fn delete_theme(&self, theme: &Theme) -> Result<()> {
        let toys = self
            .backends
            .store
            .fetch_toys(theme.id, &FilterSpec::default())
            .await?;
        self.backends.store.delete_theme(theme.id).await?;

        let urls = &self.backends.urls;
        urls.invalidate_item(&theme.id.to_string()).await;
        for toy in &toys {
            urls.invalidate_item(&toy.id.to_string()).await;
        }
        let images = toys
            .iter()
            .map(|toy| (toy.photo_url.as_deref(), toy.user_id.as_str()))
            .chain([(theme.image.as_deref(), theme.user_id.as_str())]);
        self.backends.remove_images(images).await;
        info!("deleted theme {} with {} toys", theme.id, toys.len());
        Ok(())
    }

    /// Displayable URL of a theme's cover image
    pub async fn theme_image_url(&self, theme: &Theme) -> Option<String> {
        let raw_ref = theme.image.as_deref().unwrap_or_default();
        self.backends
            .urls
            .resolve(&theme.id.to_string(), raw_ref, Some(&theme.user_id))
            .await
    }

    /// A grid over the toys of `theme`; call [`ThemeView::refresh`] to load it
    pub fn open_theme(&self, theme: Theme) -> ThemeView {
        ThemeView::new(theme, self.backends.clone(), self.options.toys_per_page)
    }

    /// Store an image under the signed-in user's folder, replacing any object
    /// at the same path. Returns the reference to save on the record.
    pub async fn upload_image(&self, kind: ImageKind, file_name: &str, bytes: Bytes) -> Result<String> {
        if bytes.is_empty() {
            return Err(Error::validation("image is empty"));
        }
        let user_id = self.current_user_id().await?;
        let path = image_object_path(&user_id, kind, file_name);
        let content_type = content_type_for(file_name);
        if content_type.is_none() {
            warn!("unknown image type for {}, storing as octet-stream", file_name);
        }

        let stored = self
            .backends
            .objects
            .upload(&path, bytes, content_type)
            .await?;
        info!("uploaded {}", stored);
        Ok(stored)
    }
}

fn content_type_for(file_name: &str) -> Option<&'static str> {
    let extension = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "avif" => Some("image/avif"),
        _ => None,
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::catalog::{GridPage, ThemeView, ToyCard};
    pub use crate::config::{ClientOptions, SupabaseConfig};
    pub use crate::error::{Error, Result};
    pub use crate::filters::{FacetValue, FilterCounts, FilterSpec, PieceRange, Refresh, ViewStatus};
    pub use crate::models::{NewToy, Theme, Toy, ToyChanges};
    pub use crate::sort::ToySort;
    pub use crate::storage_path::ImageKind;
    pub use crate::ToyVerse;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for("a.PNG"), Some("image/png"));
        assert_eq!(content_type_for("photo.final.jpeg"), Some("image/jpeg"));
        assert_eq!(content_type_for("notes.txt"), None);
        assert_eq!(content_type_for("noextension"), None);
    }

    #[test]
    fn new_client_builds_hosted_backends() {
        let config = SupabaseConfig::new("http://localhost:54321", "anon".to_string()).unwrap();
        let toyverse = ToyVerse::new(&config, ClientOptions::default()).unwrap();
        assert!(toyverse.auth().is_some());
        assert_eq!(toyverse.options.toys_per_page, 24);
    }
}
