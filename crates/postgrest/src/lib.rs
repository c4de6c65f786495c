//! PostgREST client for ToyVerse
//!
//! Thin query builder over the PostgREST HTTP API exposed by Supabase.
//!
//! # Features
//!
//! - `select` with repeatable filters (`eq`, `gte`, `lte`, `ilike`, `in`, `is`)
//! - Ordering and limits
//! - Exact row counts through `Prefer: count=exact`
//! - `insert`, `update`, `delete` returning the affected rows

use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

/// PostgREST APIエラーの詳細情報
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostgrestApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for PostgrestApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// エラー型
#[derive(Error, Debug)]
pub enum PostgrestError {
    #[error("API error: {details} (Status: {status})")]
    ApiError {
        details: PostgrestApiErrorDetails,
        status: StatusCode,
    },

    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApiError { message: String, status: StatusCode },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

/// ソート方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// PostgREST クライアント
///
/// Filters are kept as an ordered list so the same column can carry
/// several predicates (`nb_pieces=gte.201&nb_pieces=lte.500`).
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    base_url: String,
    table: String,
    http_client: Client,
    headers: HeaderMap,
    query_params: Vec<(String, String)>,
}

impl PostgrestClient {
    /// 新しい PostgREST クライアントを作成
    pub fn new(
        base_url: &str,
        api_key: &str,
        table: &str,
        http_client: Client,
    ) -> Result<Self, PostgrestError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key).map_err(|_| {
            PostgrestError::InvalidParameters("API key is not a valid header value".to_string())
        })?;
        headers.insert("apikey", key);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            http_client,
            headers,
            query_params: Vec::new(),
        })
    }

    /// ヘッダーを追加
    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, PostgrestError> {
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header value: {}", value))
        })?;
        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header name: {}", key))
        })?;

        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// 認証トークンを設定
    pub fn with_auth(self, token: &str) -> Result<Self, PostgrestError> {
        self.with_header("Authorization", &format!("Bearer {}", token))
    }

    /// 取得するカラムを指定
    pub fn select(mut self, columns: &str) -> Self {
        self.query_params.retain(|(key, _)| key != "select");
        self.query_params
            .push(("select".to_string(), columns.to_string()));
        self
    }

    fn filter(mut self, column: &str, expression: String) -> Self {
        self.query_params.push((column.to_string(), expression));
        self
    }

    /// 等価フィルター
    pub fn eq(self, column: &str, value: &str) -> Self {
        self.filter(column, format!("eq.{}", value))
    }

    /// 以上フィルター
    pub fn gte(self, column: &str, value: &str) -> Self {
        self.filter(column, format!("gte.{}", value))
    }

    /// 以下フィルター
    pub fn lte(self, column: &str, value: &str) -> Self {
        self.filter(column, format!("lte.{}", value))
    }

    /// ILIKE フィルター（大文字小文字を区別しない）
    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.filter(column, format!("ilike.{}", pattern))
    }

    /// IN フィルター
    ///
    /// Every value is double-quoted so commas and parentheses survive.
    pub fn in_list(self, column: &str, values: &[&str]) -> Self {
        let quoted: Vec<String> = values.iter().map(|v| quote_value(v)).collect();
        self.filter(column, format!("in.({})", quoted.join(",")))
    }

    /// IS フィルター (`null`, `true`, `false`)
    pub fn is(self, column: &str, value: &str) -> Self {
        self.filter(column, format!("is.{}", value))
    }

    /// ソート順を指定
    pub fn order(mut self, column: &str, order: SortOrder) -> Self {
        let order_str = match order {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        };
        self.query_params.retain(|(key, _)| key != "order");
        self.query_params
            .push(("order".to_string(), format!("{}.{}", column, order_str)));
        self
    }

    /// 取得件数を制限
    pub fn limit(mut self, count: u32) -> Self {
        self.query_params.retain(|(key, _)| key != "limit");
        self.query_params
            .push(("limit".to_string(), count.to_string()));
        self
    }

    /// 現在のクエリパラメータ
    pub fn query_params(&self) -> &[(String, String)] {
        &self.query_params
    }

    /// データを取得
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>, PostgrestError> {
        let response = self.send(Method::GET, self.headers.clone(), None).await?;

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }

    /// 条件に一致する行数を取得
    ///
    /// Issues a `HEAD` request with `Prefer: count=exact` and reads the
    /// total from the `Content-Range` header (`0-9/42` or `*/0`).
    pub async fn count(&self) -> Result<u64, PostgrestError> {
        let mut headers = self.headers.clone();
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_static("count=exact"),
        );

        let response = self.send(Method::HEAD, headers, None).await?;

        let range = response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                PostgrestError::DeserializationError("Missing Content-Range header".to_string())
            })?;

        parse_content_range_total(range)
    }

    /// データを挿入
    pub async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        values: &T,
    ) -> Result<Vec<R>, PostgrestError> {
        let body = serde_json::to_vec(values)?;
        let response = self
            .send(Method::POST, self.returning_headers(), Some(body))
            .await?;
        read_rows(response).await
    }

    /// データを更新
    pub async fn update<T: Serialize, R: DeserializeOwned>(
        &self,
        values: &T,
    ) -> Result<Vec<R>, PostgrestError> {
        let body = serde_json::to_vec(values)?;
        let response = self
            .send(Method::PATCH, self.returning_headers(), Some(body))
            .await?;
        read_rows(response).await
    }

    /// データを削除
    pub async fn delete(&self) -> Result<(), PostgrestError> {
        self.send(Method::DELETE, self.headers.clone(), None)
            .await?;
        Ok(())
    }

    fn returning_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_static("return=representation"),
        );
        headers
    }

    async fn send(
        &self,
        method: Method,
        headers: HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<Response, PostgrestError> {
        let url = self.build_url()?;
        debug!("{} {}", method, url);

        let mut request = self.http_client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());

        match serde_json::from_str::<PostgrestApiErrorDetails>(&error_text) {
            Ok(details) => Err(PostgrestError::ApiError { details, status }),
            Err(_) => Err(PostgrestError::UnparsedApiError {
                message: error_text,
                status,
            }),
        }
    }

    // URLを構築
    fn build_url(&self) -> Result<Url, PostgrestError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, self.table))?;
        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

/// Escape a value for use inside an `in.(...)` list.
fn quote_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Escape `%`, `_` and `\` so an `ilike` pattern matches literally.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn parse_content_range_total(range: &str) -> Result<u64, PostgrestError> {
    let total = range.rsplit('/').next().unwrap_or_default();
    total.trim().parse::<u64>().map_err(|_| {
        PostgrestError::DeserializationError(format!("Unexpected Content-Range: {}", range))
    })
}

async fn read_rows<R: DeserializeOwned>(response: Response) -> Result<Vec<R>, PostgrestError> {
    let body_text = response.text().await.map_err(|e| {
        PostgrestError::DeserializationError(format!("Failed to read response body: {}", e))
    })?;

    // 204 No Content
    if body_text.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str::<Vec<R>>(&body_text)
        .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
}
