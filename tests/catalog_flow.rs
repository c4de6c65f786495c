use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::join_all;
use tokio_test::{assert_err, assert_ok};
use toyverse::filters::{FacetValue, FilterCounts, FilterSpec, PieceRange};
use toyverse::prelude::*;
use toyverse::store::{CatalogStore, MemoryObjects, MemoryStore, StaticSession};

struct Fixture {
    toyverse: ToyVerse,
    store: Arc<MemoryStore>,
    objects: Arc<MemoryObjects>,
}

fn fixture(user: Option<&str>) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let objects = Arc::new(MemoryObjects::new());
    let session = StaticSession(user.map(str::to_string));
    let toyverse = ToyVerse::with_backends(
        store.clone(),
        objects.clone(),
        Arc::new(session),
        ClientOptions::default().with_toys_per_page(3),
    );
    Fixture {
        toyverse,
        store,
        objects,
    }
}

fn draft(name: &str, category: Option<&str>, studio: Option<&str>, pieces: Option<i32>) -> NewToy {
    NewToy {
        name: name.to_string(),
        category: category.map(str::to_string),
        studio: studio.map(str::to_string),
        nb_pieces: pieces,
        ..NewToy::default()
    }
}

#[tokio::test]
async fn medieval_castle_scenario() {
    let f = fixture(Some("user-1"));

    let theme = f.toyverse.create_theme("Château Médiéval", None).await.unwrap();
    assert_eq!(theme.slug(), "chateau-medieval");

    let resolved = f.toyverse.theme_by_slug("chateau-medieval").await.unwrap();
    assert_eq!(resolved.id, theme.id);

    let view = f.toyverse.open_theme(resolved);
    view.refresh().await;

    let rejected = view.create_toy(draft("Catapult", None, None, Some(-1))).await;
    assert!(matches!(rejected, Err(Error::Validation(_))));
    assert!(f.store.toys().await.is_empty());

    assert_ok!(view.create_toy(draft("Keep", None, None, Some(150))).await);

    let page = view.page().await;
    let counts = &page.counts;
    assert_eq!(counts.get(&FacetValue::Pieces(PieceRange::UpTo200)), 1);
    assert!(counts.categories.values().all(|&n| n == 0));
    assert!(page.facets.categories.is_empty());
    assert_eq!(counts.total, 1);
}

#[tokio::test]
async fn cross_filter_counts_match_direct_queries() {
    let f = fixture(Some("user-1"));
    let theme = f.toyverse.create_theme("Space", None).await.unwrap();
    let mut view = f.toyverse.open_theme(theme.clone());
    view.refresh().await;

    let toys = [
        ("Shuttle", Some("Vehicles"), Some("Lego"), Some(1200)),
        ("Station", Some("Bases"), Some("Lego"), Some(2400)),
        ("Rover", Some("Vehicles"), Some("Playmobil"), Some(90)),
        ("Probe", None, Some("Cobi"), Some(300)),
        ("Lander", Some("Vehicles"), None, None),
    ];
    for (name, category, studio, pieces) in toys {
        view.create_toy(draft(name, category, studio, pieces))
            .await
            .unwrap();
    }

    view.toggle_category("Vehicles").await;
    view.toggle_studio("Lego").await;
    view.toggle_studio("Playmobil").await;

    let page = view.page().await;
    let spec = view.engine().spec().await;
    for value in page.facets.all_values() {
        let expected = f
            .store
            .count_toys(theme.id, &spec.for_facet(&value))
            .await
            .unwrap();
        assert_eq!(page.counts.get(&value), expected, "{:?}", value);
    }

    // The selected category is not narrowed by itself.
    assert_eq!(page.counts.get(&FacetValue::Category("Bases".into())), 1);
    assert_eq!(page.total_items, 2);
}

#[tokio::test]
async fn optimistic_counts_converge_with_authoritative_counts() {
    let f = fixture(Some("user-1"));
    let theme = f.toyverse.create_theme("Trains", None).await.unwrap();
    let mut view = f.toyverse.open_theme(theme);
    view.refresh().await;

    let steam = view
        .create_toy(draft("Steam", Some("Engines"), Some("Lego"), Some(450)))
        .await
        .unwrap();
    view.create_toy(draft("Depot", Some("Buildings"), Some("Lego"), Some(1500)))
        .await
        .unwrap();
    view.set_piece_range(Some(PieceRange::From201To500)).await;

    // One edit touching category, studio, pieces and flags at once.
    let mut changes = ToyChanges::from(&steam);
    changes.category = Some("Buildings".to_string());
    changes.studio = Some("Brio".to_string());
    changes.nb_pieces = Some(1800);
    changes.is_exposed = true;
    let updated = f.store.update_toy(steam.id, &changes).await.unwrap();

    view.engine()
        .apply_optimistic_update(Some(&steam), &updated)
        .await;
    let optimistic = view.engine().snapshot().await.counts;

    let (facets, authoritative): (_, FilterCounts) = view.engine().fetch_counts().await.unwrap();
    for value in facets.all_values() {
        assert_eq!(optimistic.get(&value), authoritative.get(&value), "{:?}", value);
    }
    assert_eq!(optimistic.total, authoritative.total);
}

#[tokio::test]
async fn concurrent_page_renders_sign_each_image_once() {
    let f = fixture(Some("user-1"));
    let theme = f.toyverse.create_theme("Ships", None).await.unwrap();
    let view = f.toyverse.open_theme(theme);
    view.refresh().await;

    let photo = f
        .toyverse
        .upload_image(ImageKind::Toy, "galleon.png", Bytes::from_static(b"png"))
        .await
        .unwrap();
    assert!(photo.starts_with("toys/user-1/"));
    assert!(f.objects.contains(&photo).await);

    let mut galleon = draft("Galleon", None, None, Some(700));
    galleon.photo_url = Some(photo);
    view.create_toy(galleon).await.unwrap();
    view.create_toy(draft("Raft", None, None, None)).await.unwrap();

    f.objects.set_signing_delay(Duration::from_millis(20)).await;
    let pages = join_all((0..5).map(|_| view.page())).await;

    // Only the galleon has an image; the raft has nothing to sign.
    assert_eq!(f.objects.sign_calls(), 1);
    for page in &pages {
        let urls: Vec<_> = page.cards.iter().map(|c| c.image_url.clone()).collect();
        assert_eq!(urls.iter().filter(|u| u.is_some()).count(), 1);
        assert_eq!(urls, pages[0].cards.iter().map(|c| c.image_url.clone()).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn pagination_follows_filters() {
    let f = fixture(Some("user-1"));
    let theme = f.toyverse.create_theme("Bricks", None).await.unwrap();
    let mut view = f.toyverse.open_theme(theme);
    view.refresh().await;

    for i in 1..=7 {
        let mut toy = draft(&format!("Set {}", i), Some(if i % 2 == 0 { "Even" } else { "Odd" }), None, Some(i * 10));
        toy.number = Some(i.to_string());
        view.create_toy(toy).await.unwrap();
    }

    view.go_to_page(3).await;
    let page = view.page().await;
    assert_eq!(page.page, 3);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.cards.len(), 1);

    view.toggle_category("Even").await;
    let page = view.page().await;
    assert_eq!(page.page, 1);
    assert_eq!(page.total_items, 3);
    assert_eq!(page.total_pages, 1);

    view.next_page().await;
    assert_eq!(view.current_page(), 1);
}

#[tokio::test]
async fn wishlist_filter_offers_the_false_state() {
    let f = fixture(Some("user-1"));
    let theme = f.toyverse.create_theme("Figures", None).await.unwrap();
    let mut view = f.toyverse.open_theme(theme);

    let mut wished = draft("Knight", Some("Medieval"), None, Some(12));
    wished.is_soon = true;
    view.create_toy(wished).await.unwrap();
    view.create_toy(draft("Archer", Some("Medieval"), None, Some(10)))
        .await
        .unwrap();

    let filters = FilterSpec {
        wishlist: Some(false),
        ..FilterSpec::default()
    };
    assert_eq!(view.replace_filters(filters).await, Refresh::Applied);
    let page = view.page().await;
    assert_eq!(page.cards.len(), 1);
    assert_eq!(page.cards[0].toy.name, "Archer");
    assert_eq!(page.counts.get(&FacetValue::Wishlist(true)), 1);
    assert_eq!(page.counts.get(&FacetValue::Wishlist(false)), 1);
}

#[tokio::test]
async fn signed_out_users_cannot_read_or_write() {
    let f = fixture(None);

    assert!(matches!(f.toyverse.list_themes().await, Err(Error::Unauthenticated)));
    assert_err!(f.toyverse.create_theme("Pirates", None).await);
    assert_err!(
        f.toyverse
            .upload_image(ImageKind::Theme, "cover.png", Bytes::from_static(b"png"))
            .await
    );
}

#[tokio::test]
async fn unknown_slugs_are_not_found() {
    let f = fixture(Some("user-1"));
    f.toyverse.create_theme("Pirates", None).await.unwrap();

    assert!(matches!(
        f.toyverse.theme_by_slug("ninjas").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn deleting_a_theme_removes_its_cover() {
    let f = fixture(Some("user-1"));
    let cover = f
        .toyverse
        .upload_image(ImageKind::Theme, "cover.jpg", Bytes::from_static(b"jpg"))
        .await
        .unwrap();
    assert!(cover.starts_with("theme/user-1/"));

    let theme = f
        .toyverse
        .create_theme("Pirates", Some(cover.clone()))
        .await
        .unwrap();
    assert!(f.toyverse.theme_image_url(&theme).await.is_some());

    f.toyverse.delete_theme(&theme).await.unwrap();
    assert!(!f.objects.contains(&cover).await);
    assert!(f.toyverse.list_themes().await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_theme_removes_its_toy_images() {
    let f = fixture(Some("user-1"));
    let theme = f.toyverse.create_theme("Pirates", None).await.unwrap();
    let view = f.toyverse.open_theme(theme.clone());
    view.refresh().await;

    let photo = f
        .toyverse
        .upload_image(ImageKind::Toy, "ship.png", Bytes::from_static(b"png"))
        .await
        .unwrap();
    let mut ship = draft("Ship", Some("Boats"), None, Some(600));
    ship.photo_url = Some(photo.clone());
    view.create_toy(ship).await.unwrap();
    assert_eq!(f.toyverse.signed_urls().len().await, 0);
    assert!(view.page().await.cards[0].image_url.is_some());
    assert_eq!(f.toyverse.signed_urls().len().await, 1);

    f.toyverse.delete_theme(&theme).await.unwrap();
    assert!(!f.objects.contains(&photo).await);
    assert!(f.store.toys().await.is_empty());
    assert!(f.toyverse.signed_urls().is_empty().await);
}

#[tokio::test]
async fn blank_theme_names_are_rejected_before_the_store() {
    let f = fixture(Some("user-1"));
    f.store.set_failing(true);

    let result = f.toyverse.create_theme("   ", None).await;
    assert!(matches!(result, Err(Error::Validation(_))));

    f.store.set_failing(false);
    assert!(f.toyverse.list_themes().await.unwrap().is_empty());
}
