//! Theme lookup by URL slug

use log::debug;

use crate::error::Result;
use crate::models::Theme;
use crate::slug::{slug_to_probable_name, to_slug};
use crate::store::CatalogStore;

/// The user's theme whose name slugifies to `slug`.
///
/// The name guessed from the slug is tried first as a case-insensitive
/// name match. Since the guess cannot restore accents or punctuation, a
/// miss falls back to scanning every theme of the user in creation order.
/// When several themes share a slug the oldest wins.
pub async fn find_theme_by_slug(
    store: &dyn CatalogStore,
    user_id: &str,
    slug: &str,
) -> Result<Option<Theme>> {
    let slug = to_slug(slug);
    if slug.is_empty() {
        return Ok(None);
    }

    let guess = slug_to_probable_name(&slug);
    let by_name = store.find_themes_by_name(user_id, &guess).await?;
    if let Some(theme) = by_name.into_iter().find(|theme| theme.slug() == slug) {
        return Ok(Some(theme));
    }

    debug!("no theme named {:?}, scanning all themes for slug {}", guess, slug);
    let themes = store.list_themes(user_id).await?;
    Ok(themes.into_iter().find(|theme| theme.slug() == slug))
}
