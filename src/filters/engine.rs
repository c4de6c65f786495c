use futures_util::future::{try_join, try_join_all};
use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{FacetValues, FilterCounts, FilterSpec, PieceRange};
use crate::error::Result;
use crate::models::Toy;
use crate::sort::sort_by_number;
use crate::store::CatalogStore;

/// Lifecycle of a theme view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewStatus {
    /// Nothing loaded yet
    Idle,
    /// At least one refresh is in flight
    Loading,
    /// Last refresh finished, successfully or not
    Ready,
}

/// Outcome of a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// The results were stored in the view
    Applied,
    /// A newer request was issued meanwhile; the results were dropped
    Superseded,
    /// The query failed; the view kept its previous data
    Failed,
}

impl Refresh {
    fn and(self, other: Refresh) -> Refresh {
        match (self, other) {
            (Refresh::Failed, _) | (_, Refresh::Failed) => Refresh::Failed,
            (Refresh::Superseded, _) | (_, Refresh::Superseded) => Refresh::Superseded,
            _ => Refresh::Applied,
        }
    }
}

/// Point-in-time copy of a view's state.
#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    pub status: ViewStatus,
    pub spec: FilterSpec,
    /// Matching toys ordered by number
    pub toys: Vec<Toy>,
    pub facets: FacetValues,
    pub counts: FilterCounts,
    pub last_error: Option<String>,
}

struct EngineState {
    status: ViewStatus,
    in_flight: usize,
    spec: FilterSpec,
    toys: Vec<Toy>,
    facets: FacetValues,
    counts: FilterCounts,
    last_error: Option<String>,
}

/// Filter state, matching toys and facet counts of one theme.
///
/// Every toy fetch and count fetch takes a ticket from its own counter.
/// A response is stored only if no newer ticket of the same kind was
/// issued while it was in flight, so rapid filter changes settle on the
/// last selection regardless of response order.
///
/// Optimistic writes do not take tickets. A response that was in flight
/// during a write is reloaded instead, so the latest fetch still lands.
pub struct ToyFilterEngine {
    store: Arc<dyn CatalogStore>,
    theme_id: Uuid,
    state: Mutex<EngineState>,
    toys_seq: AtomicU64,
    counts_seq: AtomicU64,
    writes: AtomicU64,
}

impl ToyFilterEngine {
    pub fn new(store: Arc<dyn CatalogStore>, theme_id: Uuid) -> Self {
        Self {
            store,
            theme_id,
            state: Mutex::new(EngineState {
                status: ViewStatus::Idle,
                in_flight: 0,
                spec: FilterSpec::default(),
                toys: Vec::new(),
                facets: FacetValues::default(),
                counts: FilterCounts::default(),
                last_error: None,
            }),
            toys_seq: AtomicU64::new(0),
            counts_seq: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn theme_id(&self) -> Uuid {
        self.theme_id
    }

    pub async fn spec(&self) -> FilterSpec {
        self.state.lock().await.spec.clone()
    }

    pub async fn toggle_category(&self, value: &str) -> Refresh {
        self.update_spec(|spec| spec.toggle_category(value)).await
    }

    pub async fn toggle_studio(&self, value: &str) -> Refresh {
        self.update_spec(|spec| spec.toggle_studio(value)).await
    }

    pub async fn set_piece_range(&self, range: Option<PieceRange>) -> Refresh {
        self.update_spec(|spec| spec.pieces = range).await
    }

    pub async fn set_release_year(&self, year: Option<i32>) -> Refresh {
        self.update_spec(|spec| spec.release_year = year).await
    }

    pub async fn set_exposed(&self, exposed: Option<bool>) -> Refresh {
        self.update_spec(|spec| spec.exposed = exposed).await
    }

    pub async fn set_wishlist(&self, wishlist: Option<bool>) -> Refresh {
        self.update_spec(|spec| spec.wishlist = wishlist).await
    }

    /// Replace every filter at once.
    pub async fn replace_filters(&self, filters: FilterSpec) -> Refresh {
        self.update_spec(|spec| *spec = filters).await
    }

    pub async fn reset_filters(&self) -> Refresh {
        self.update_spec(|spec| *spec = FilterSpec::default()).await
    }

    async fn update_spec<F>(&self, change: F) -> Refresh
    where
        F: FnOnce(&mut FilterSpec),
    {
        {
            let mut state = self.state.lock().await;
            change(&mut state.spec);
        }
        self.refresh().await
    }

    /// Toys matching the current filters, ordered by number.
    pub async fn fetch_toys(&self) -> Result<Vec<Toy>> {
        let spec = self.spec().await;
        self.fetch_toys_for(&spec).await
    }

    async fn fetch_toys_for(&self, spec: &FilterSpec) -> Result<Vec<Toy>> {
        let mut toys = self.store.fetch_toys(self.theme_id, spec).await?;
        sort_by_number(&mut toys);
        Ok(toys)
    }

    /// Facet values and cross-filtered counts for the current filters.
    pub async fn fetch_counts(&self) -> Result<(FacetValues, FilterCounts)> {
        let spec = self.spec().await;
        self.fetch_counts_for(&spec).await
    }

    async fn fetch_counts_for(&self, spec: &FilterSpec) -> Result<(FacetValues, FilterCounts)> {
        let facets = self.store.facet_values(self.theme_id).await?;
        let values = facets.all_values();

        let per_value = values.iter().map(|value| {
            let narrowed = spec.for_facet(value);
            async move { self.store.count_toys(self.theme_id, &narrowed).await }
        });
        let unfiltered = FilterSpec::default();
        let (counts, total) = try_join(
            try_join_all(per_value),
            self.store.count_toys(self.theme_id, &unfiltered),
        )
        .await?;

        let mut filter_counts = FilterCounts {
            total,
            ..FilterCounts::default()
        };
        for (value, count) in values.iter().zip(counts) {
            filter_counts.set(value, count);
        }
        Ok((facets, filter_counts))
    }

    /// Reload toys and counts concurrently.
    pub async fn refresh(&self) -> Refresh {
        self.begin().await;
        let (toys, counts) = tokio::join!(self.reload_toys(), self.reload_counts());
        self.finish().await;
        toys.and(counts)
    }

    /// Reload only the counts, replacing any optimistic adjustments.
    pub async fn refresh_counts(&self) -> Refresh {
        self.begin().await;
        let outcome = self.reload_counts().await;
        self.finish().await;
        outcome
    }

    async fn begin(&self) {
        let mut state = self.state.lock().await;
        state.in_flight += 1;
        state.status = ViewStatus::Loading;
        state.last_error = None;
    }

    async fn finish(&self) {
        let mut state = self.state.lock().await;
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            state.status = ViewStatus::Ready;
        }
    }

    async fn reload_toys(&self) -> Refresh {
        let (ticket, mut spec, mut writes) = {
            let state = self.state.lock().await;
            let ticket = self.toys_seq.fetch_add(1, Ordering::SeqCst) + 1;
            (ticket, state.spec.clone(), self.writes.load(Ordering::SeqCst))
        };

        loop {
            let result = self.fetch_toys_for(&spec).await;

            let mut state = self.state.lock().await;
            if ticket != self.toys_seq.load(Ordering::SeqCst) {
                debug!("dropping stale toy list #{} for theme {}", ticket, self.theme_id);
                return Refresh::Superseded;
            }
            let current_writes = self.writes.load(Ordering::SeqCst);
            if writes != current_writes {
                debug!("toy list #{} for theme {} predates a write, reloading", ticket, self.theme_id);
                spec = state.spec.clone();
                writes = current_writes;
                continue;
            }
            return match result {
                Ok(toys) => {
                    state.toys = toys;
                    Refresh::Applied
                }
                Err(e) => {
                    warn!("failed to load toys of theme {}: {}", self.theme_id, e);
                    state.last_error = Some(e.to_string());
                    Refresh::Failed
                }
            };
        }
    }

    async fn reload_counts(&self) -> Refresh {
        let (ticket, mut spec, mut writes) = {
            let state = self.state.lock().await;
            let ticket = self.counts_seq.fetch_add(1, Ordering::SeqCst) + 1;
            (ticket, state.spec.clone(), self.writes.load(Ordering::SeqCst))
        };

        loop {
            let result = self.fetch_counts_for(&spec).await;

            let mut state = self.state.lock().await;
            if ticket != self.counts_seq.load(Ordering::SeqCst) {
                debug!("dropping stale counts #{} for theme {}", ticket, self.theme_id);
                return Refresh::Superseded;
            }
            let current_writes = self.writes.load(Ordering::SeqCst);
            if writes != current_writes {
                debug!("counts #{} for theme {} predate a write, reloading", ticket, self.theme_id);
                spec = state.spec.clone();
                writes = current_writes;
                continue;
            }
            return match result {
                Ok((facets, counts)) => {
                    state.facets = facets;
                    state.counts = counts;
                    Refresh::Applied
                }
                Err(e) => {
                    warn!("failed to load counts of theme {}: {}", self.theme_id, e);
                    state.last_error = Some(e.to_string());
                    Refresh::Failed
                }
            };
        }
    }

    /// Reflect a created (`previous = None`) or edited toy without a round trip.
    ///
    /// Requests in flight at this point are reloaded when they return, since
    /// their results may predate the write.
    pub async fn apply_optimistic_update(&self, previous: Option<&Toy>, current: &Toy) {
        let mut guard = self.state.lock().await;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let state = &mut *guard;

        state.facets.observe(current);
        state
            .counts
            .apply_change(&state.spec, &state.facets, previous, Some(current));

        state.toys.retain(|toy| toy.id != current.id);
        if state.spec.matches(current) {
            state.toys.push(current.clone());
            sort_by_number(&mut state.toys);
        }
    }

    /// Reflect a deleted toy without a round trip.
    pub async fn apply_optimistic_removal(&self, removed: &Toy) {
        let mut guard = self.state.lock().await;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let state = &mut *guard;

        state
            .counts
            .apply_change(&state.spec, &state.facets, Some(removed), None);
        state.toys.retain(|toy| toy.id != removed.id);
    }

    pub async fn snapshot(&self) -> ViewSnapshot {
        let state = self.state.lock().await;
        ViewSnapshot {
            status: state.status,
            spec: state.spec.clone(),
            toys: state.toys.clone(),
            facets: state.facets.clone(),
            counts: state.counts.clone(),
            last_error: state.last_error.clone(),
        }
    }
}
