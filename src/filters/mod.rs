//! Toy filtering, cross-filtered facet counts and the per-theme filter engine
//!
//! Selections within one facet are OR-ed, facets are AND-ed together. A
//! facet count answers "how many toys would match if this value were the
//! only selection of its facet, keeping every other facet as it is".

mod counts;
mod engine;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::models::Toy;

pub use counts::{FacetValues, FilterCounts};
pub use engine::{Refresh, ToyFilterEngine, ViewSnapshot, ViewStatus};

/// Fixed piece-count buckets. Bounds are inclusive; the last one is open.
///
/// Changing this table changes the meaning of any stored filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PieceRange {
    #[serde(rename = "0-200")]
    UpTo200,
    #[serde(rename = "201-500")]
    From201To500,
    #[serde(rename = "501-1000")]
    From501To1000,
    #[serde(rename = "1001-1999")]
    From1001To1999,
    #[serde(rename = "2000+")]
    From2000,
}

impl PieceRange {
    pub const ALL: [PieceRange; 5] = [
        PieceRange::UpTo200,
        PieceRange::From201To500,
        PieceRange::From501To1000,
        PieceRange::From1001To1999,
        PieceRange::From2000,
    ];

    /// Inclusive lower bound and optional inclusive upper bound.
    pub fn bounds(&self) -> (i32, Option<i32>) {
        match self {
            PieceRange::UpTo200 => (0, Some(200)),
            PieceRange::From201To500 => (201, Some(500)),
            PieceRange::From501To1000 => (501, Some(1000)),
            PieceRange::From1001To1999 => (1001, Some(1999)),
            PieceRange::From2000 => (2000, None),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PieceRange::UpTo200 => "0-200",
            PieceRange::From201To500 => "201-500",
            PieceRange::From501To1000 => "501-1000",
            PieceRange::From1001To1999 => "1001-1999",
            PieceRange::From2000 => "2000+",
        }
    }

    pub fn contains(&self, nb_pieces: i32) -> bool {
        let (min, max) = self.bounds();
        nb_pieces >= min && max.map_or(true, |max| nb_pieces <= max)
    }

    /// The bucket of a piece count, `None` for negative counts.
    pub fn of(nb_pieces: i32) -> Option<PieceRange> {
        Self::ALL.into_iter().find(|range| range.contains(nb_pieces))
    }
}

impl fmt::Display for PieceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PieceRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|range| range.label() == s.trim())
            .ok_or_else(|| Error::validation(format!("unknown piece range {:?}", s)))
    }
}

/// One value of one facet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FacetValue {
    Category(String),
    Studio(String),
    Pieces(PieceRange),
    ReleaseYear(i32),
    Exposed(bool),
    Wishlist(bool),
}

/// The active filters of one theme view. `None` flags mean "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub categories: BTreeSet<String>,
    pub studios: BTreeSet<String>,
    pub pieces: Option<PieceRange>,
    pub release_year: Option<i32>,
    pub exposed: Option<bool>,
    pub wishlist: Option<bool>,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        *self == FilterSpec::default()
    }

    /// Add the category if absent, remove it if present.
    pub fn toggle_category(&mut self, value: &str) {
        toggle(&mut self.categories, value);
    }

    /// Add the studio if absent, remove it if present.
    pub fn toggle_studio(&mut self, value: &str) {
        toggle(&mut self.studios, value);
    }

    /// Client-side evaluation of the predicate the data store applies.
    pub fn matches(&self, toy: &Toy) -> bool {
        if !self.categories.is_empty()
            && !toy
                .category
                .as_ref()
                .map_or(false, |c| self.categories.contains(c))
        {
            return false;
        }
        if !self.studios.is_empty()
            && !toy
                .studio
                .as_ref()
                .map_or(false, |s| self.studios.contains(s))
        {
            return false;
        }
        if let Some(range) = self.pieces {
            if !toy.nb_pieces.map_or(false, |n| range.contains(n)) {
                return false;
            }
        }
        if let Some(year) = self.release_year {
            if toy.release_date != Some(year) {
                return false;
            }
        }
        if let Some(exposed) = self.exposed {
            if toy.is_exposed != exposed {
                return false;
            }
        }
        if let Some(wishlist) = self.wishlist {
            if toy.is_soon != wishlist {
                return false;
            }
        }
        true
    }

    /// Every other facet unchanged, `value`'s facet narrowed to `value` alone.
    pub fn for_facet(&self, value: &FacetValue) -> FilterSpec {
        let mut spec = self.clone();
        match value {
            FacetValue::Category(category) => {
                spec.categories = BTreeSet::from([category.clone()]);
            }
            FacetValue::Studio(studio) => {
                spec.studios = BTreeSet::from([studio.clone()]);
            }
            FacetValue::Pieces(range) => spec.pieces = Some(*range),
            FacetValue::ReleaseYear(year) => spec.release_year = Some(*year),
            FacetValue::Exposed(exposed) => spec.exposed = Some(*exposed),
            FacetValue::Wishlist(wishlist) => spec.wishlist = Some(*wishlist),
        }
        spec
    }
}

fn toggle(set: &mut BTreeSet<String>, value: &str) {
    if !set.remove(value) {
        set.insert(value.to_string());
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    pub fn toy(name: &str) -> Toy {
        Toy {
            id: Uuid::new_v4(),
            theme_id: Uuid::nil(),
            user_id: "u".to_string(),
            name: name.to_string(),
            size: None,
            nb_pieces: None,
            number: None,
            is_exposed: false,
            is_soon: false,
            photo_url: None,
            category: None,
            studio: None,
            release_date: None,
            created_at: Utc::now(),
        }
    }

    pub fn full(
        name: &str,
        category: Option<&str>,
        studio: Option<&str>,
        pieces: Option<i32>,
        year: Option<i32>,
        exposed: bool,
    ) -> Toy {
        Toy {
            category: category.map(str::to_string),
            studio: studio.map(str::to_string),
            nb_pieces: pieces,
            release_date: year,
            is_exposed: exposed,
            ..toy(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{full, toy};
    use super::*;

    #[test]
    fn piece_buckets_have_inclusive_edges() {
        assert_eq!(PieceRange::of(0), Some(PieceRange::UpTo200));
        assert_eq!(PieceRange::of(200), Some(PieceRange::UpTo200));
        assert_eq!(PieceRange::of(201), Some(PieceRange::From201To500));
        assert_eq!(PieceRange::of(1999), Some(PieceRange::From1001To1999));
        assert_eq!(PieceRange::of(2000), Some(PieceRange::From2000));
        assert_eq!(PieceRange::of(250_000), Some(PieceRange::From2000));
        assert_eq!(PieceRange::of(-1), None);
    }

    #[test]
    fn piece_buckets_do_not_overlap() {
        for n in 0..3000 {
            let hits = PieceRange::ALL.iter().filter(|r| r.contains(n)).count();
            assert_eq!(hits, 1, "{} pieces falls in {} buckets", n, hits);
        }
    }

    #[test]
    fn piece_range_labels_round_trip() {
        for range in PieceRange::ALL {
            assert_eq!(range.label().parse::<PieceRange>().unwrap(), range);
        }
        assert!("0-100".parse::<PieceRange>().is_err());
    }

    #[test]
    fn toggles_are_symmetric_difference() {
        let mut spec = FilterSpec::default();
        spec.toggle_category("Castle");
        spec.toggle_category("Space");
        spec.toggle_category("Castle");
        assert_eq!(spec.categories, BTreeSet::from(["Space".to_string()]));

        spec.toggle_category("Space");
        assert!(spec.is_empty());
    }

    #[test]
    fn or_within_facet_and_across_facets() {
        let mut spec = FilterSpec::default();
        spec.toggle_category("Castle");
        spec.toggle_category("Space");
        spec.exposed = Some(true);

        assert!(spec.matches(&full("a", Some("Castle"), None, None, None, true)));
        assert!(spec.matches(&full("b", Some("Space"), None, None, None, true)));
        assert!(!spec.matches(&full("c", Some("Castle"), None, None, None, false)));
        assert!(!spec.matches(&full("d", None, None, None, None, true)));
    }

    #[test]
    fn missing_values_never_match_an_active_facet() {
        let spec = FilterSpec {
            pieces: Some(PieceRange::UpTo200),
            ..FilterSpec::default()
        };
        assert!(!spec.matches(&toy("no pieces")));

        let spec = FilterSpec {
            release_year: Some(2020),
            ..FilterSpec::default()
        };
        assert!(!spec.matches(&toy("undated")));
        assert!(FilterSpec::default().matches(&toy("anything")));
    }

    #[test]
    fn wishlist_tri_state() {
        let mut wished = toy("wished");
        wished.is_soon = true;
        let owned = toy("owned");

        let mut spec = FilterSpec::default();
        assert!(spec.matches(&wished) && spec.matches(&owned));

        spec.wishlist = Some(true);
        assert!(spec.matches(&wished) && !spec.matches(&owned));

        spec.wishlist = Some(false);
        assert!(!spec.matches(&wished) && spec.matches(&owned));
    }

    #[test]
    fn for_facet_replaces_only_that_facet() {
        let mut spec = FilterSpec::default();
        spec.toggle_category("Castle");
        spec.toggle_studio("Lucasfilm");
        spec.pieces = Some(PieceRange::From2000);

        let narrowed = spec.for_facet(&FacetValue::Category("Space".to_string()));
        assert_eq!(narrowed.categories, BTreeSet::from(["Space".to_string()]));
        assert_eq!(narrowed.studios, spec.studios);
        assert_eq!(narrowed.pieces, spec.pieces);

        let narrowed = spec.for_facet(&FacetValue::Pieces(PieceRange::UpTo200));
        assert_eq!(narrowed.pieces, Some(PieceRange::UpTo200));
        assert_eq!(narrowed.categories, spec.categories);
    }
}
