//! Object storage client for ToyVerse
//!
//! This crate talks to the Supabase Storage API: it issues signed URLs,
//! uploads raw bytes and removes objects from a bucket.

use bytes::Bytes;
use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// 結果型
pub type Result<T> = std::result::Result<T, StorageError>;

/// エラー型
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Invalid object path: {0}")]
    InvalidPath(String),
}

/// ファイルアップロードオプション
#[derive(Debug, Clone, Serialize, Default)]
pub struct FileOptions {
    pub cache_control: Option<String>,
    pub content_type: Option<String>,
    pub upsert: bool,
}

impl FileOptions {
    /// 新しいファイルオプションを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// コンテンツタイプを設定
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    /// アップサートを設定
    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

/// アップロード結果
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedObject {
    /// `bucket/path` of the stored object
    #[serde(rename = "Key")]
    pub key: String,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

/// ストレージクライアント
#[derive(Debug, Clone)]
pub struct StorageClient {
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    http_client: Client,
}

/// ストレージバケットクライアント
pub struct StorageBucketClient<'a> {
    parent: &'a StorageClient,
    bucket_id: String,
}

impl StorageClient {
    /// 新しいストレージクライアントを作成
    pub fn new(base_url: &str, api_key: &str, http_client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token: None,
            http_client,
        }
    }

    /// ユーザーのアクセストークンを設定
    pub fn with_auth(mut self, token: &str) -> Self {
        self.access_token = Some(token.to_string());
        self
    }

    /// バケットを指定
    pub fn from<'a>(&'a self, bucket_id: &str) -> StorageBucketClient<'a> {
        StorageBucketClient {
            parent: self,
            bucket_id: bucket_id.to_string(),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    fn object_url(&self, prefix: &[&str], path: &str) -> Result<Url> {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(StorageError::InvalidPath(path.to_string()));
        }

        let mut url = Url::parse(&format!("{}/storage/v1", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidPath(path.to_string()))?
            .extend(prefix)
            .extend(trimmed.split('/'));
        Ok(url)
    }
}

impl<'a> StorageBucketClient<'a> {
    /// バイト列をアップロード
    pub async fn upload(
        &self,
        path: &str,
        data: Bytes,
        options: FileOptions,
    ) -> Result<UploadedObject> {
        let url = self.parent.object_url(&["object", &self.bucket_id], path)?;
        debug!("uploading {} bytes to {}", data.len(), url);

        let content_type = options
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let cache_control = options.cache_control.unwrap_or_else(|| "3600".to_string());

        let request = self
            .parent
            .http_client
            .post(url)
            .header("Content-Type", content_type)
            .header("Cache-Control", cache_control)
            .header("x-upsert", options.upsert.to_string())
            .body(data);

        let response = check(self.parent.authorize(request).send().await?).await?;
        Ok(response.json::<UploadedObject>().await?)
    }

    /// ファイルを削除
    pub async fn remove(&self, paths: &[&str]) -> Result<()> {
        let url = format!(
            "{}/storage/v1/object/{}",
            self.parent.base_url, self.bucket_id
        );

        let payload = serde_json::json!({
            "prefixes": paths
        });

        let request = self.parent.http_client.delete(&url).json(&payload);
        check(self.parent.authorize(request).send().await?).await?;
        Ok(())
    }

    /// 公開URLを取得
    pub fn get_public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.parent.base_url,
            self.bucket_id,
            path.trim_start_matches('/')
        )
    }

    /// 署名付きURLを作成
    ///
    /// The API answers with a URL relative to `/storage/v1`; the returned
    /// string is always absolute.
    pub async fn create_signed_url(&self, path: &str, expires_in: u64) -> Result<String> {
        let url = self
            .parent
            .object_url(&["object", "sign", &self.bucket_id], path)?;

        let payload = serde_json::json!({
            "expiresIn": expires_in
        });

        let request = self.parent.http_client.post(url).json(&payload);
        let response = check(self.parent.authorize(request).send().await?).await?;
        let signed = response.json::<SignedUrlResponse>().await?;

        if signed.signed_url.starts_with("http") {
            return Ok(signed.signed_url);
        }

        let relative = signed.signed_url.trim_start_matches('/');
        Ok(format!("{}/storage/v1/{}", self.parent.base_url, relative))
    }
}

async fn check(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let error_text = response.text().await?;
    Err(StorageError::ApiError(format!("{}: {}", status, error_text)))
}
