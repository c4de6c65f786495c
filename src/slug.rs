//! Conversion between display names and URL-safe identifiers
//!
//! `to_slug` is deterministic but lossy: case and accents cannot be
//! recovered, so `slug_to_probable_name` is only a guess used as a first
//! lookup key.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lowercase, strip diacritics, keep `[a-z0-9]`, join words with single hyphens.
pub fn to_slug(name: &str) -> String {
    let stripped: String = name
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect();

    stripped
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Best-effort display name for a slug: `"chateau-medieval"` -> `"Chateau Medieval"`.
pub fn slug_to_probable_name(slug: &str) -> String {
    slug.split('-')
        .filter(|token| !token.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
