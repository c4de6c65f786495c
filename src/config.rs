//! Configuration for the ToyVerse client

use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Connection settings for the hosted backend.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: Url,
    pub anon_key: String,
}

impl SupabaseConfig {
    /// Creates a new configuration, validating the URL.
    pub fn new(url_str: &str, anon_key: String) -> Result<Self> {
        let url = Url::parse(url_str)?;
        if anon_key.is_empty() {
            return Err(Error::config("anon_key cannot be empty"));
        }
        Ok(Self { url, anon_key })
    }

    /// Reads `SUPABASE_URL` and `SUPABASE_ANON_KEY`.
    pub fn from_env() -> Result<Self> {
        let url_str = env::var("SUPABASE_URL")
            .map_err(|_| Error::config("SUPABASE_URL environment variable not found"))?;
        let anon_key = env::var("SUPABASE_ANON_KEY")
            .map_err(|_| Error::config("SUPABASE_ANON_KEY environment variable not found"))?;
        Self::new(&url_str, anon_key)
    }

    /// Base URL without the trailing slash `Url` adds.
    pub fn base_url(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }
}

/// Tunables for the catalog core
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Bucket holding toy and theme images
    pub storage_bucket: String,

    /// Lifetime requested for signed image URLs
    pub signed_url_ttl: Duration,

    /// Subtracted from the granted lifetime before a cached URL is reused
    pub signed_url_margin: Duration,

    /// Maximum number of cached signed URLs
    pub signed_url_cache_capacity: usize,

    /// Toys per grid page
    pub toys_per_page: usize,

    /// The request timeout
    pub request_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            storage_bucket: "toyverse".to_string(),
            signed_url_ttl: Duration::from_secs(3600),
            signed_url_margin: Duration::from_secs(60),
            signed_url_cache_capacity: 512,
            toys_per_page: 24,
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ClientOptions {
    /// Defaults overlaid with any `TOYVERSE_*` variables that are set.
    ///
    /// Recognised: `TOYVERSE_STORAGE_BUCKET`, `TOYVERSE_SIGNED_URL_TTL_SECS`,
    /// `TOYVERSE_SIGNED_URL_MARGIN_SECS`, `TOYVERSE_SIGNED_URL_CACHE_CAPACITY`,
    /// `TOYVERSE_TOYS_PER_PAGE`, `TOYVERSE_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let mut options = Self::default();

        if let Ok(bucket) = env::var("TOYVERSE_STORAGE_BUCKET") {
            options.storage_bucket = bucket;
        }
        if let Some(secs) = env_number::<u64>("TOYVERSE_SIGNED_URL_TTL_SECS")? {
            options.signed_url_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_number::<u64>("TOYVERSE_SIGNED_URL_MARGIN_SECS")? {
            options.signed_url_margin = Duration::from_secs(secs);
        }
        if let Some(capacity) = env_number::<usize>("TOYVERSE_SIGNED_URL_CACHE_CAPACITY")? {
            options.signed_url_cache_capacity = capacity;
        }
        if let Some(per_page) = env_number::<usize>("TOYVERSE_TOYS_PER_PAGE")? {
            options.toys_per_page = per_page;
        }
        if let Some(secs) = env_number::<u64>("TOYVERSE_REQUEST_TIMEOUT_SECS")? {
            options.request_timeout = if secs == 0 {
                None
            } else {
                Some(Duration::from_secs(secs))
            };
        }

        Ok(options)
    }

    /// Set the storage bucket
    pub fn with_storage_bucket(mut self, value: &str) -> Self {
        self.storage_bucket = value.to_string();
        self
    }

    /// Set the signed URL lifetime
    pub fn with_signed_url_ttl(mut self, value: Duration) -> Self {
        self.signed_url_ttl = value;
        self
    }

    /// Set the signed URL safety margin
    pub fn with_signed_url_margin(mut self, value: Duration) -> Self {
        self.signed_url_margin = value;
        self
    }

    /// Set the signed URL cache capacity
    pub fn with_signed_url_cache_capacity(mut self, value: usize) -> Self {
        self.signed_url_cache_capacity = value;
        self
    }

    /// Set the number of toys per page
    pub fn with_toys_per_page(mut self, value: usize) -> Self {
        self.toys_per_page = value;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }
}

fn env_number<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::config(format!("{} must be a number, got {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}
