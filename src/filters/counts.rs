use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::{FacetValue, FilterSpec, PieceRange};
use crate::models::Toy;

/// Distinct category, studio and release-year values present in a theme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FacetValues {
    pub categories: BTreeSet<String>,
    pub studios: BTreeSet<String>,
    pub release_years: BTreeSet<i32>,
}

impl FacetValues {
    pub fn from_toys<'a>(toys: impl IntoIterator<Item = &'a Toy>) -> Self {
        let mut values = Self::default();
        for toy in toys {
            values.observe(toy);
        }
        values
    }

    /// Record the toy's values; returns true if any was new.
    pub fn observe(&mut self, toy: &Toy) -> bool {
        let mut changed = false;
        if let Some(category) = &toy.category {
            changed |= self.categories.insert(category.clone());
        }
        if let Some(studio) = &toy.studio {
            changed |= self.studios.insert(studio.clone());
        }
        if let Some(year) = toy.release_date {
            changed |= self.release_years.insert(year);
        }
        changed
    }

    /// Every countable facet value, including the fixed piece buckets and
    /// both states of the boolean flags.
    pub fn all_values(&self) -> Vec<FacetValue> {
        let mut values: Vec<FacetValue> = Vec::new();
        values.extend(self.categories.iter().cloned().map(FacetValue::Category));
        values.extend(self.studios.iter().cloned().map(FacetValue::Studio));
        values.extend(PieceRange::ALL.into_iter().map(FacetValue::Pieces));
        values.extend(self.release_years.iter().copied().map(FacetValue::ReleaseYear));
        for flag in [true, false] {
            values.push(FacetValue::Exposed(flag));
            values.push(FacetValue::Wishlist(flag));
        }
        values
    }
}

/// Cross-filtered counts for every facet value plus the unfiltered total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterCounts {
    pub categories: BTreeMap<String, u64>,
    pub studios: BTreeMap<String, u64>,
    pub pieces: BTreeMap<PieceRange, u64>,
    pub release_years: BTreeMap<i32, u64>,
    pub exposed: FlagCounts,
    pub wishlist: FlagCounts,
    pub total: u64,
}

/// Counts for both states of a boolean flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlagCounts {
    pub yes: u64,
    pub no: u64,
}

impl FlagCounts {
    pub fn get(&self, flag: bool) -> u64 {
        if flag {
            self.yes
        } else {
            self.no
        }
    }

    fn slot(&mut self, flag: bool) -> &mut u64 {
        if flag {
            &mut self.yes
        } else {
            &mut self.no
        }
    }
}

impl FilterCounts {
    pub fn get(&self, value: &FacetValue) -> u64 {
        let count = match value {
            FacetValue::Category(category) => self.categories.get(category),
            FacetValue::Studio(studio) => self.studios.get(studio),
            FacetValue::Pieces(range) => self.pieces.get(range),
            FacetValue::ReleaseYear(year) => self.release_years.get(year),
            FacetValue::Exposed(flag) => return self.exposed.get(*flag),
            FacetValue::Wishlist(flag) => return self.wishlist.get(*flag),
        };
        count.copied().unwrap_or(0)
    }

    pub fn set(&mut self, value: &FacetValue, count: u64) {
        *self.slot(value) = count;
    }

    /// Counts a backend would report for `toys` under `spec`.
    pub fn compute(spec: &FilterSpec, facets: &FacetValues, toys: &[Toy]) -> Self {
        let mut counts = FilterCounts {
            total: toys.len() as u64,
            ..FilterCounts::default()
        };
        for value in facets.all_values() {
            let narrowed = spec.for_facet(&value);
            let count = toys.iter().filter(|toy| narrowed.matches(toy)).count();
            counts.set(&value, count as u64);
        }
        counts
    }

    /// Move one toy's contribution from `previous` to `current`.
    ///
    /// `previous = None` is a creation, `current = None` a removal. For
    /// every known facet value the old version is subtracted and the new
    /// one added exactly when it matches that value's cross-filter spec,
    /// so a single edit touching several facets at once stays exact.
    pub fn apply_change(
        &mut self,
        spec: &FilterSpec,
        facets: &FacetValues,
        previous: Option<&Toy>,
        current: Option<&Toy>,
    ) {
        for value in facets.all_values() {
            let narrowed = spec.for_facet(&value);
            let before = previous.map_or(false, |toy| narrowed.matches(toy));
            let after = current.map_or(false, |toy| narrowed.matches(toy));
            let slot = self.slot(&value);
            match (before, after) {
                (true, false) => *slot = slot.saturating_sub(1),
                (false, true) => *slot += 1,
                _ => {}
            }
        }

        match (previous, current) {
            (None, Some(_)) => self.total += 1,
            (Some(_), None) => self.total = self.total.saturating_sub(1),
            _ => {}
        }
    }

    fn slot(&mut self, value: &FacetValue) -> &mut u64 {
        match value {
            FacetValue::Category(category) => self.categories.entry(category.clone()).or_insert(0),
            FacetValue::Studio(studio) => self.studios.entry(studio.clone()).or_insert(0),
            FacetValue::Pieces(range) => self.pieces.entry(*range).or_insert(0),
            FacetValue::ReleaseYear(year) => self.release_years.entry(*year).or_insert(0),
            FacetValue::Exposed(flag) => self.exposed.slot(*flag),
            FacetValue::Wishlist(flag) => self.wishlist.slot(*flag),
        }
    }
}
