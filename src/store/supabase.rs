//! Hosted backend: PostgREST tables and Storage bucket
//!
//! Requests carry the signed-in user's access token when there is one so
//! row-level security applies, and fall back to the anon key otherwise.

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use toyverse_auth::Auth;
use toyverse_postgrest::{escape_like, PostgrestClient, SortOrder};
use toyverse_storage::{FileOptions, StorageClient};
use uuid::Uuid;

use super::{CatalogStore, ObjectStore, SignedUrl};
use crate::error::{Error, Result};
use crate::filters::{FacetValues, FilterSpec};
use crate::models::{NewTheme, NewToy, Theme, Toy, ToyChanges};

const THEMES: &str = "themes";
const TOYS: &str = "toys";

async fn access_token(auth: Option<&Auth>) -> Option<String> {
    match auth {
        Some(auth) => auth.get_session().await.map(|s| s.access_token),
        None => None,
    }
}

/// [`CatalogStore`] over the `themes` and `toys` tables.
#[derive(Clone)]
pub struct SupabaseStore {
    base_url: String,
    api_key: String,
    http_client: Client,
    auth: Option<Auth>,
}

impl SupabaseStore {
    pub fn new(base_url: &str, api_key: &str, http_client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http_client,
            auth: None,
        }
    }

    /// Authorize requests with the session held by `auth`.
    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    async fn from(&self, table: &str) -> Result<PostgrestClient> {
        let client = PostgrestClient::new(
            &self.base_url,
            &self.api_key,
            table,
            self.http_client.clone(),
        )?;
        match access_token(self.auth.as_ref()).await {
            Some(token) => Ok(client.with_auth(&token)?),
            None => Ok(client),
        }
    }

    async fn toys_matching(&self, theme_id: Uuid, spec: &FilterSpec) -> Result<PostgrestClient> {
        let query = self.from(TOYS).await?;
        Ok(apply_filters(query, theme_id, spec))
    }
}

/// Translate a filter spec into PostgREST predicates on the `toys` table.
pub fn apply_filters(query: PostgrestClient, theme_id: Uuid, spec: &FilterSpec) -> PostgrestClient {
    let mut query = query.eq("theme_id", &theme_id.to_string());

    if !spec.categories.is_empty() {
        let values: Vec<&str> = spec.categories.iter().map(String::as_str).collect();
        query = query.in_list("category", &values);
    }
    if !spec.studios.is_empty() {
        let values: Vec<&str> = spec.studios.iter().map(String::as_str).collect();
        query = query.in_list("studio", &values);
    }
    if let Some(range) = spec.pieces {
        let (min, max) = range.bounds();
        query = query.gte("nb_pieces", &min.to_string());
        if let Some(max) = max {
            query = query.lte("nb_pieces", &max.to_string());
        }
    }
    if let Some(year) = spec.release_year {
        query = query.eq("release_date", &year.to_string());
    }
    if let Some(exposed) = spec.exposed {
        query = query.is("is_exposed", &exposed.to_string());
    }
    if let Some(wishlist) = spec.wishlist {
        query = query.is("is_soon", &wishlist.to_string());
    }
    query
}

#[derive(Deserialize)]
struct FacetRow {
    category: Option<String>,
    studio: Option<String>,
    release_date: Option<i32>,
}

fn first_row<T>(rows: Vec<T>, what: &str) -> Result<T> {
    rows.into_iter()
        .next()
        .ok_or_else(|| Error::not_found(format!("{} returned no row", what)))
}

#[async_trait]
impl CatalogStore for SupabaseStore {
    async fn list_themes(&self, user_id: &str) -> Result<Vec<Theme>> {
        let rows = self
            .from(THEMES)
            .await?
            .select("*")
            .eq("user_id", user_id)
            .order("created_at", SortOrder::Ascending)
            .execute::<Theme>()
            .await?;
        Ok(rows)
    }

    async fn find_themes_by_name(&self, user_id: &str, name: &str) -> Result<Vec<Theme>> {
        let rows = self
            .from(THEMES)
            .await?
            .select("*")
            .eq("user_id", user_id)
            .ilike("name", &escape_like(name))
            .order("created_at", SortOrder::Ascending)
            .execute::<Theme>()
            .await?;
        Ok(rows)
    }

    async fn insert_theme(&self, theme: &NewTheme) -> Result<Theme> {
        let rows = self
            .from(THEMES)
            .await?
            .insert::<_, Theme>(theme)
            .await?;
        first_row(rows, "theme insert")
    }

    async fn delete_theme(&self, theme_id: Uuid) -> Result<()> {
        let id = theme_id.to_string();
        self.from(TOYS).await?.eq("theme_id", &id).delete().await?;
        self.from(THEMES).await?.eq("id", &id).delete().await?;
        Ok(())
    }

    async fn fetch_toys(&self, theme_id: Uuid, spec: &FilterSpec) -> Result<Vec<Toy>> {
        let rows = self
            .toys_matching(theme_id, spec)
            .await?
            .select("*")
            .execute::<Toy>()
            .await?;
        debug!("theme {}: {} toys match", theme_id, rows.len());
        Ok(rows)
    }

    async fn count_toys(&self, theme_id: Uuid, spec: &FilterSpec) -> Result<u64> {
        let count = self
            .toys_matching(theme_id, spec)
            .await?
            .select("id")
            .count()
            .await?;
        Ok(count)
    }

    async fn facet_values(&self, theme_id: Uuid) -> Result<FacetValues> {
        let rows = self
            .from(TOYS)
            .await?
            .select("category,studio,release_date")
            .eq("theme_id", &theme_id.to_string())
            .execute::<FacetRow>()
            .await?;

        let mut values = FacetValues::default();
        for row in rows {
            if let Some(category) = row.category.filter(|c| !c.is_empty()) {
                values.categories.insert(category);
            }
            if let Some(studio) = row.studio.filter(|s| !s.is_empty()) {
                values.studios.insert(studio);
            }
            if let Some(year) = row.release_date {
                values.release_years.insert(year);
            }
        }
        Ok(values)
    }

    async fn insert_toy(&self, toy: &NewToy) -> Result<Toy> {
        let rows = self.from(TOYS).await?.insert::<_, Toy>(toy).await?;
        first_row(rows, "toy insert")
    }

    async fn update_toy(&self, toy_id: Uuid, changes: &ToyChanges) -> Result<Toy> {
        let rows = self
            .from(TOYS)
            .await?
            .eq("id", &toy_id.to_string())
            .update::<_, Toy>(changes)
            .await?;
        first_row(rows, &format!("update of toy {}", toy_id))
    }

    async fn delete_toy(&self, toy_id: Uuid) -> Result<()> {
        self.from(TOYS)
            .await?
            .eq("id", &toy_id.to_string())
            .delete()
            .await?;
        Ok(())
    }
}

/// [`ObjectStore`] over one Storage bucket.
#[derive(Clone)]
pub struct SupabaseObjects {
    base_url: String,
    api_key: String,
    bucket: String,
    http_client: Client,
    auth: Option<Auth>,
}

impl SupabaseObjects {
    pub fn new(base_url: &str, api_key: &str, bucket: &str, http_client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            bucket: bucket.to_string(),
            http_client,
            auth: None,
        }
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    async fn client(&self) -> StorageClient {
        let client = StorageClient::new(&self.base_url, &self.api_key, self.http_client.clone());
        match access_token(self.auth.as_ref()).await {
            Some(token) => client.with_auth(&token),
            None => client,
        }
    }
}

#[async_trait]
impl ObjectStore for SupabaseObjects {
    async fn create_signed_url(&self, path: &str, ttl: Duration) -> Result<SignedUrl> {
        let client = self.client().await;
        let url = client
            .from(&self.bucket)
            .create_signed_url(path, ttl.as_secs())
            .await?;
        Ok(SignedUrl {
            url,
            expires_in: ttl,
        })
    }

    async fn upload(&self, path: &str, bytes: Bytes, content_type: Option<&str>) -> Result<String> {
        let mut options = FileOptions::new().with_upsert(true);
        if let Some(content_type) = content_type {
            options = options.with_content_type(content_type);
        }
        let client = self.client().await;
        let uploaded = client.from(&self.bucket).upload(path, bytes, options).await?;
        debug!("stored object {}", uploaded.key);
        Ok(path.to_string())
    }

    async fn remove(&self, paths: &[String]) -> Result<()> {
        let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
        let client = self.client().await;
        client.from(&self.bucket).remove(&paths).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::PieceRange;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn theme_id() -> Uuid {
        Uuid::parse_str("0f8fad5b-d9cb-469f-a165-70867728950e").unwrap()
    }

    fn toy_row(name: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "theme_id": theme_id(),
            "user_id": "u1",
            "name": name,
            "nb_pieces": 320,
            "number": "7",
            "is_exposed": true,
            "is_soon": false,
            "category": "Castle",
            "studio": "Lego",
            "release_date": 2021,
            "created_at": "2024-03-01T10:00:00Z"
        })
    }

    #[test]
    fn filters_become_postgrest_predicates() {
        let mut spec = FilterSpec::default();
        spec.toggle_category("Castle");
        spec.toggle_category("Space");
        spec.pieces = Some(PieceRange::From201To500);
        spec.exposed = Some(false);

        let query = PostgrestClient::new("http://localhost", "key", "toys", Client::new()).unwrap();
        let query = apply_filters(query, theme_id(), &spec);

        let params = query.query_params();
        assert!(params.contains(&("theme_id".into(), format!("eq.{}", theme_id()))));
        assert!(params.contains(&("category".into(), "in.(\"Castle\",\"Space\")".into())));
        assert!(params.contains(&("nb_pieces".into(), "gte.201".into())));
        assert!(params.contains(&("nb_pieces".into(), "lte.500".into())));
        assert!(params.contains(&("is_exposed".into(), "is.false".into())));
        assert!(!params.iter().any(|(k, _)| k == "studio" || k == "is_soon"));
    }

    #[test]
    fn open_bucket_has_no_upper_bound() {
        let spec = FilterSpec {
            pieces: Some(PieceRange::From2000),
            ..FilterSpec::default()
        };
        let query = PostgrestClient::new("http://localhost", "key", "toys", Client::new()).unwrap();
        let query = apply_filters(query, theme_id(), &spec);
        let pieces: Vec<_> = query
            .query_params()
            .iter()
            .filter(|(k, _)| k == "nb_pieces")
            .collect();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].1, "gte.2000");
    }

    #[tokio::test]
    async fn fetches_and_counts_toys() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/toys"))
            .and(query_param("studio", "in.(\"Lego\")"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([toy_row("Keep")])))
            .mount(&mock_server)
            .await;

        Mock::given(method("HEAD"))
            .and(path("/rest/v1/toys"))
            .and(header("prefer", "count=exact"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Range", "0-0/17"))
            .mount(&mock_server)
            .await;

        let store = SupabaseStore::new(&mock_server.uri(), "anon", Client::new());
        let mut spec = FilterSpec::default();
        spec.toggle_studio("Lego");

        let toys = store.fetch_toys(theme_id(), &spec).await.unwrap();
        assert_eq!(toys.len(), 1);
        assert_eq!(toys[0].name, "Keep");
        assert_eq!(toys[0].nb_pieces, Some(320));

        assert_eq!(store.count_toys(theme_id(), &spec).await.unwrap(), 17);
    }

    #[tokio::test]
    async fn facet_values_skip_missing_columns() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/toys"))
            .and(query_param("select", "category,studio,release_date"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"category": "Castle", "studio": "Lego", "release_date": 2020},
                {"category": null, "studio": "Lego", "release_date": null},
                {"category": "Space", "studio": null, "release_date": 1999}
            ])))
            .mount(&mock_server)
            .await;

        let store = SupabaseStore::new(&mock_server.uri(), "anon", Client::new());
        let values = store.facet_values(theme_id()).await.unwrap();

        assert_eq!(values.categories.len(), 2);
        assert_eq!(values.studios.len(), 1);
        assert!(values.release_years.contains(&1999));
    }

    #[tokio::test]
    async fn update_without_row_is_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/toys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let store = SupabaseStore::new(&mock_server.uri(), "anon", Client::new());
        let changes = ToyChanges {
            name: "Keep".to_string(),
            ..ToyChanges::default()
        };
        let result = store.update_toy(Uuid::new_v4(), &changes).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn signs_and_uploads_objects() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/storage/v1/object/sign/toyverse/toys/u1/a.png"))
            .and(body_json(json!({"expiresIn": 600})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "signedURL": "/object/sign/toyverse/toys/u1/a.png?token=t"
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/storage/v1/object/toyverse/toys/u1/b.png"))
            .and(header("x-upsert", "true"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"Key": "toyverse/toys/u1/b.png"})),
            )
            .mount(&mock_server)
            .await;

        let objects = SupabaseObjects::new(&mock_server.uri(), "anon", "toyverse", Client::new());

        let signed = objects
            .create_signed_url("toys/u1/a.png", Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(
            signed.url,
            format!("{}/storage/v1/object/sign/toyverse/toys/u1/a.png?token=t", mock_server.uri())
        );
        assert_eq!(signed.expires_in, Duration::from_secs(600));

        let stored = objects
            .upload("toys/u1/b.png", Bytes::from_static(b"png"), Some("image/png"))
            .await
            .unwrap();
        assert_eq!(stored, "toys/u1/b.png");
    }
}
