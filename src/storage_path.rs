//! Mapping stored image references to object-storage paths
//!
//! Image references written over the life of the catalog follow several
//! layouts: absolute URLs, `toys/...` or `theme/...` paths, legacy
//! `{uuid}/file` paths and bare file names. `resolve_storage_path` maps
//! all of them to the path the object is believed to live at. It never
//! fails; a wrong guess surfaces later as a failed signing call.

use uuid::Uuid;

/// Root segments that already denote a full object path.
const KNOWN_ROOTS: [&str; 4] = ["toys/", "toy/", "theme/", "themes/"];

/// Which kind of record an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Toy,
    Theme,
}

impl ImageKind {
    fn root(self) -> &'static str {
        match self {
            ImageKind::Toy => "toys",
            ImageKind::Theme => "theme",
        }
    }
}

/// Canonical object path for a stored image reference.
pub fn resolve_storage_path(raw_ref: &str, user_id: Option<&str>) -> String {
    let trimmed = raw_ref.trim();
    if trimmed.starts_with("http") {
        return trimmed.to_string();
    }

    let cleaned = trimmed.trim_start_matches('/');
    if KNOWN_ROOTS.iter().any(|root| cleaned.starts_with(root)) {
        return cleaned.to_string();
    }

    if starts_with_uuid_segment(cleaned) {
        return format!("toys/{}", cleaned);
    }

    match user_id.filter(|id| !id.is_empty()) {
        Some(user_id) if cleaned.to_lowercase().contains("theme") => {
            format!("theme/{}/{}", user_id, cleaned)
        }
        Some(user_id) => format!("toys/{}/{}", user_id, cleaned),
        None => cleaned.to_string(),
    }
}

/// Path for a newly uploaded image: `{root}/{user}/{uuid}-{file}`.
pub fn image_object_path(user_id: &str, kind: ImageKind, file_name: &str) -> String {
    let file_name = sanitize_file_name(file_name);
    format!("{}/{}/{}-{}", kind.root(), user_id, Uuid::new_v4(), file_name)
}

fn starts_with_uuid_segment(path: &str) -> bool {
    match path.split_once('/') {
        Some((first, rest)) => !rest.is_empty() && Uuid::parse_str(first).is_ok(),
        None => false,
    }
}

fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches(['.', '_']).is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: &str = "8d0f6b5e-1c1e-4d6f-9a39-3f0f6c1b2a10";

    #[test]
    fn absolute_urls_are_untouched() {
        let url = "https://cdn.example.com/toys/a.png";
        assert_eq!(resolve_storage_path(url, Some(USER)), url);
    }

    #[test]
    fn known_roots_are_untouched() {
        assert_eq!(resolve_storage_path("toys/u/a.png", Some(USER)), "toys/u/a.png");
        assert_eq!(resolve_storage_path("/theme/u/b.png", Some(USER)), "theme/u/b.png");
        assert_eq!(resolve_storage_path("themes/u/c.png", None), "themes/u/c.png");
    }

    #[test]
    fn legacy_uuid_prefix_gets_toys_root() {
        let raw = format!("{}/castle.png", USER);
        assert_eq!(
            resolve_storage_path(&raw, None),
            format!("toys/{}/castle.png", USER)
        );
    }

    #[test]
    fn bare_names_use_user_folder() {
        assert_eq!(
            resolve_storage_path("castle.png", Some(USER)),
            format!("toys/{}/castle.png", USER)
        );
        assert_eq!(
            resolve_storage_path("Theme-cover.png", Some(USER)),
            format!("theme/{}/Theme-cover.png", USER)
        );
    }

    #[test]
    fn bare_names_without_user_are_returned_clean() {
        assert_eq!(resolve_storage_path("  /castle.png ", None), "castle.png");
        assert_eq!(resolve_storage_path("castle.png", Some("")), "castle.png");
    }

    #[test]
    fn upload_paths_are_canonical() {
        let path = image_object_path("u1", ImageKind::Toy, "../My Photo (1).JPG");
        assert!(path.starts_with("toys/u1/"));
        assert!(path.ends_with("-My_Photo__1_.JPG"));
        assert_eq!(resolve_storage_path(&path, Some("other")), path);

        let path = image_object_path("u1", ImageKind::Theme, "...");
        assert!(path.starts_with("theme/u1/"));
        assert!(path.ends_with("-image"));
    }
}
