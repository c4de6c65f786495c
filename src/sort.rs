//! Grid ordering criteria

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::models::Toy;

/// How the toy grid is ordered before pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToySort {
    AddedAsc,
    AddedDesc,
    ReleaseAsc,
    ReleaseDesc,
}

impl ToySort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToySort::AddedAsc => "added_asc",
            ToySort::AddedDesc => "added_desc",
            ToySort::ReleaseAsc => "release_asc",
            ToySort::ReleaseDesc => "release_desc",
        }
    }

    /// Comparator for this criterion.
    ///
    /// Toys without a release year come after every dated toy in both
    /// release directions.
    pub fn compare(&self, a: &Toy, b: &Toy) -> Ordering {
        match self {
            ToySort::AddedAsc => a.created_at.cmp(&b.created_at),
            ToySort::AddedDesc => b.created_at.cmp(&a.created_at),
            ToySort::ReleaseAsc => unknown_last(a.release_date, b.release_date, |x, y| x.cmp(&y)),
            ToySort::ReleaseDesc => unknown_last(a.release_date, b.release_date, |x, y| y.cmp(&x)),
        }
    }
}

impl fmt::Display for ToySort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToySort {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added_asc" => Ok(ToySort::AddedAsc),
            "added_desc" => Ok(ToySort::AddedDesc),
            "release_asc" => Ok(ToySort::ReleaseAsc),
            "release_desc" => Ok(ToySort::ReleaseDesc),
            other => Err(Error::validation(format!("unknown sort order {:?}", other))),
        }
    }
}

fn unknown_last<F>(a: Option<i32>, b: Option<i32>, cmp: F) -> Ordering
where
    F: Fn(i32, i32) -> Ordering,
{
    match (a, b) {
        (Some(x), Some(y)) => cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable in-place sort; equal toys keep their incoming (number) order.
pub fn sort_toys(toys: &mut [Toy], sort: ToySort) {
    toys.sort_by(|a, b| sort.compare(a, b));
}

/// Order by the free-text `number` field.
///
/// Integers sort numerically and before non-numeric codes, which sort
/// lexicographically; toys without a number go last.
pub fn compare_numbers(a: Option<&str>, b: Option<&str>) -> Ordering {
    let key = |n: Option<&str>| -> (u8, i64, String) {
        match n.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => match n.parse::<i64>() {
                Ok(value) => (0, value, String::new()),
                Err(_) => (1, 0, n.to_string()),
            },
            None => (2, 0, String::new()),
        }
    };
    key(a).cmp(&key(b))
}

/// Stable sort by `number`, see [`compare_numbers`].
pub fn sort_by_number(toys: &mut [Toy]) {
    toys.sort_by(|a, b| compare_numbers(a.number.as_deref(), b.number.as_deref()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn toy(name: &str, release: Option<i32>, day: u32, number: Option<&str>) -> Toy {
        Toy {
            id: Uuid::new_v4(),
            theme_id: Uuid::nil(),
            user_id: "u".to_string(),
            name: name.to_string(),
            size: None,
            nb_pieces: None,
            number: number.map(str::to_string),
            is_exposed: false,
            is_soon: false,
            photo_url: None,
            category: None,
            studio: None,
            release_date: release,
            created_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        }
    }

    fn releases(toys: &[Toy]) -> Vec<Option<i32>> {
        toys.iter().map(|t| t.release_date).collect()
    }

    #[test]
    fn unknown_release_years_sort_last_both_ways() {
        let mut toys = vec![
            toy("a", Some(2020), 1, None),
            toy("b", None, 2, None),
            toy("c", Some(2015), 3, None),
        ];

        sort_toys(&mut toys, ToySort::ReleaseDesc);
        assert_eq!(releases(&toys), vec![Some(2020), Some(2015), None]);

        sort_toys(&mut toys, ToySort::ReleaseAsc);
        assert_eq!(releases(&toys), vec![Some(2015), Some(2020), None]);
    }

    #[test]
    fn added_order_uses_creation_time() {
        let mut toys = vec![toy("b", None, 2, None), toy("a", None, 1, None), toy("c", None, 3, None)];

        sort_toys(&mut toys, ToySort::AddedDesc);
        let names: Vec<_> = toys.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);

        sort_toys(&mut toys, ToySort::AddedAsc);
        let names: Vec<_> = toys.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn numbers_sort_numerically_then_text_then_missing() {
        let mut toys = vec![
            toy("none", None, 1, None),
            toy("ten", None, 1, Some("10")),
            toy("code", None, 1, Some("A-7")),
            toy("two", None, 1, Some("2")),
            toy("blank", None, 1, Some("  ")),
            toy("code2", None, 1, Some("B-1")),
        ];

        sort_by_number(&mut toys);
        let names: Vec<_> = toys.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["two", "ten", "code", "code2", "none", "blank"]);
    }

    #[test]
    fn parses_criteria() {
        assert_eq!("release_desc".parse::<ToySort>().unwrap(), ToySort::ReleaseDesc);
        assert_eq!(ToySort::AddedAsc.to_string(), "added_asc");
        assert!(matches!("newest".parse::<ToySort>(), Err(Error::Validation(_))));
    }
}
