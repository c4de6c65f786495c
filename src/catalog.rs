//! The toy grid of one theme and the mutations that feed it
//!
//! A [`ThemeView`] composes the filter engine, free-text search, sorting,
//! pagination and signed image URLs into [`GridPage`]s. Writes go through
//! the view so the counts are adjusted optimistically and the affected
//! cached URLs are dropped before the authoritative refresh.

use futures_util::future::join_all;
use log::{info, warn};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::filters::{
    FacetValues, FilterCounts, FilterSpec, PieceRange, Refresh, ToyFilterEngine, ViewStatus,
};
use crate::models::{NewToy, Theme, Toy, ToyChanges};
use crate::pagination::{clamp_page, Paginator};
use crate::signed_url::SignedUrlCache;
use crate::sort::{sort_toys, ToySort};
use crate::storage_path::resolve_storage_path;
use crate::store::{CatalogStore, ObjectStore, SessionProvider};

/// A toy with its displayable image URL, if any.
#[derive(Debug, Clone)]
pub struct ToyCard {
    pub toy: Toy,
    pub image_url: Option<String>,
}

/// One rendered page of the grid.
#[derive(Debug, Clone)]
pub struct GridPage {
    pub cards: Vec<ToyCard>,
    /// Current page after clamping, 1-indexed
    pub page: usize,
    pub total_pages: usize,
    /// Toys matching filters and search, across all pages
    pub total_items: usize,
    pub facets: FacetValues,
    pub counts: FilterCounts,
    pub status: ViewStatus,
    pub last_error: Option<String>,
}

/// Backends shared by every view of one client.
#[derive(Clone)]
pub(crate) struct Backends {
    pub store: Arc<dyn CatalogStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub session: Arc<dyn SessionProvider>,
    pub urls: SignedUrlCache,
}

impl Backends {
    pub async fn require_user(&self) -> Result<String> {
        self.session
            .current_user_id()
            .await?
            .ok_or(Error::Unauthenticated)
    }

    /// Best-effort removal of a stored image; absolute URLs are not ours to delete.
    pub async fn remove_image(&self, raw_ref: Option<&str>, user_id: &str) {
        self.remove_images([(raw_ref, user_id)]).await;
    }

    /// Best-effort removal of several stored images in one call.
    pub async fn remove_images<'a, I>(&self, images: I)
    where
        I: IntoIterator<Item = (Option<&'a str>, &'a str)>,
    {
        let paths: Vec<String> = images
            .into_iter()
            .filter_map(|(raw_ref, user_id)| {
                let raw_ref = raw_ref.map(str::trim).filter(|r| !r.is_empty())?;
                if raw_ref.starts_with("http") {
                    return None;
                }
                Some(resolve_storage_path(raw_ref, Some(user_id)))
            })
            .collect();
        if paths.is_empty() {
            return;
        }
        if let Err(e) = self.objects.remove(&paths).await {
            warn!("could not remove images {}: {}", paths.join(", "), e);
        }
    }
}

/// The filtered, searched, sorted and paged toys of one theme.
pub struct ThemeView {
    theme: Theme,
    engine: ToyFilterEngine,
    backends: Backends,
    paginator: Paginator,
    sort: Option<ToySort>,
    search: String,
}

impl ThemeView {
    pub(crate) fn new(theme: Theme, backends: Backends, per_page: usize) -> Self {
        let engine = ToyFilterEngine::new(backends.store.clone(), theme.id);
        Self {
            theme,
            engine,
            backends,
            paginator: Paginator::new(per_page),
            sort: None,
            search: String::new(),
        }
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn engine(&self) -> &ToyFilterEngine {
        &self.engine
    }

    pub fn sort(&self) -> Option<ToySort> {
        self.sort
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn current_page(&self) -> usize {
        self.paginator.page()
    }

    /// Load toys and counts for the current filters.
    pub async fn refresh(&self) -> Refresh {
        self.engine.refresh().await
    }

    pub async fn toggle_category(&mut self, value: &str) -> Refresh {
        self.paginator.reset();
        self.engine.toggle_category(value).await
    }

    pub async fn toggle_studio(&mut self, value: &str) -> Refresh {
        self.paginator.reset();
        self.engine.toggle_studio(value).await
    }

    pub async fn set_piece_range(&mut self, range: Option<PieceRange>) -> Refresh {
        self.paginator.reset();
        self.engine.set_piece_range(range).await
    }

    pub async fn set_release_year(&mut self, year: Option<i32>) -> Refresh {
        self.paginator.reset();
        self.engine.set_release_year(year).await
    }

    pub async fn set_exposed(&mut self, exposed: Option<bool>) -> Refresh {
        self.paginator.reset();
        self.engine.set_exposed(exposed).await
    }

    pub async fn set_wishlist(&mut self, wishlist: Option<bool>) -> Refresh {
        self.paginator.reset();
        self.engine.set_wishlist(wishlist).await
    }

    pub async fn replace_filters(&mut self, filters: FilterSpec) -> Refresh {
        self.paginator.reset();
        self.engine.replace_filters(filters).await
    }

    pub async fn reset_filters(&mut self) -> Refresh {
        self.paginator.reset();
        self.engine.reset_filters().await
    }

    pub fn set_sort(&mut self, sort: Option<ToySort>) {
        self.paginator.reset();
        self.sort = sort;
    }

    /// Case-insensitive substring match on name or number; empty shows all.
    pub fn set_search(&mut self, query: &str) {
        self.paginator.reset();
        self.search = query.trim().to_lowercase();
    }

    pub fn set_per_page(&mut self, per_page: usize) {
        self.paginator.set_per_page(per_page);
    }

    pub async fn go_to_page(&mut self, page: usize) {
        let len = self.visible_toys().await.len();
        self.paginator.go_to(page, len);
    }

    pub async fn next_page(&mut self) {
        let len = self.visible_toys().await.len();
        self.paginator.next(len);
    }

    pub fn previous_page(&mut self) {
        self.paginator.previous();
    }

    /// Matching toys after search and sort, before pagination.
    pub async fn visible_toys(&self) -> Vec<Toy> {
        let snapshot = self.engine.snapshot().await;
        self.arrange(snapshot.toys)
    }

    fn arrange(&self, toys: Vec<Toy>) -> Vec<Toy> {
        let mut toys: Vec<Toy> = if self.search.is_empty() {
            toys
        } else {
            toys.into_iter()
                .filter(|toy| matches_search(toy, &self.search))
                .collect()
        };
        if let Some(sort) = self.sort {
            sort_toys(&mut toys, sort);
        }
        toys
    }

    /// The current page with signed image URLs resolved concurrently.
    pub async fn page(&self) -> GridPage {
        let snapshot = self.engine.snapshot().await;
        let toys = self.arrange(snapshot.toys);
        let page_toys = self.paginator.slice(&toys);

        let acting_user = match self.backends.session.current_user_id().await {
            Ok(user) => user,
            Err(e) => {
                warn!("could not read the session: {}", e);
                None
            }
        };

        let urls = join_all(page_toys.iter().map(|toy| {
            let user_id = acting_user.as_deref().unwrap_or(&toy.user_id);
            let item_id = toy.id.to_string();
            let raw_ref = toy.photo_url.clone().unwrap_or_default();
            async move {
                self.backends
                    .urls
                    .resolve(&item_id, &raw_ref, Some(user_id))
                    .await
            }
        }))
        .await;

        let cards = page_toys
            .iter()
            .cloned()
            .zip(urls)
            .map(|(toy, image_url)| ToyCard { toy, image_url })
            .collect();

        let total_pages = self.paginator.total_pages(toys.len());
        GridPage {
            cards,
            page: clamp_page(self.paginator.page(), total_pages),
            total_pages,
            total_items: toys.len(),
            facets: snapshot.facets,
            counts: snapshot.counts,
            status: snapshot.status,
            last_error: snapshot.last_error,
        }
    }

    /// Add a toy to this theme.
    ///
    /// The draft is validated before anything is sent; its theme and owner
    /// are taken from the view and the session.
    pub async fn create_toy(&self, draft: NewToy) -> Result<Toy> {
        draft.validate()?;
        let user_id = self.backends.require_user().await?;
        let draft = NewToy {
            theme_id: self.theme.id,
            user_id,
            ..draft.normalized()
        };

        let created = self.backends.store.insert_toy(&draft).await?;
        info!("created toy {} in theme {}", created.id, self.theme.id);

        self.engine.apply_optimistic_update(None, &created).await;
        self.engine.refresh().await;
        Ok(created)
    }

    /// Replace the editable fields of `previous`.
    pub async fn update_toy(&self, previous: &Toy, changes: ToyChanges) -> Result<Toy> {
        changes.validate()?;
        let changes = changes.normalized();

        let updated = self.backends.store.update_toy(previous.id, &changes).await?;
        info!("updated toy {}", updated.id);

        self.engine
            .apply_optimistic_update(Some(previous), &updated)
            .await;
        self.backends.urls.invalidate_item(&updated.id.to_string()).await;
        if previous.photo_url != updated.photo_url {
            self.backends
                .remove_image(previous.photo_url.as_deref(), &previous.user_id)
                .await;
        }
        self.engine.refresh().await;
        Ok(updated)
    }

    /// Delete a toy and its stored image. A failed image removal is only logged.
    pub async fn delete_toy(&self, toy: &Toy) -> Result<()> {
        self.backends.store.delete_toy(toy.id).await?;
        info!("deleted toy {}", toy.id);

        self.engine.apply_optimistic_removal(toy).await;
        self.backends.urls.invalidate_item(&toy.id.to_string()).await;
        self.backends
            .remove_image(toy.photo_url.as_deref(), &toy.user_id)
            .await;
        self.engine.refresh().await;
        Ok(())
    }
}

fn matches_search(toy: &Toy, query: &str) -> bool {
    toy.name.to_lowercase().contains(query)
        || toy
            .number
            .as_ref()
            .map_or(false, |number| number.to_lowercase().contains(query))
}
