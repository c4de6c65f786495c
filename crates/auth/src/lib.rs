//! Session client for ToyVerse
//!
//! Signs a user in against Supabase Auth and keeps the resulting session in
//! memory. The rest of the system only needs the acting user id, which is
//! read from the session's user record or, failing that, from the `sub`
//! claim of the access token.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::{info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// エラー型
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing session")]
    MissingSession,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

/// ユーザー情報
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// セッション情報
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub user: Option<User>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

impl Session {
    /// 操作ユーザーのIDを取得
    pub fn user_id(&self) -> Result<String, AuthError> {
        if let Some(user) = &self.user {
            return Ok(user.id.clone());
        }
        subject_from_token(&self.access_token)
    }
}

/// Read the `sub` claim without verifying the signature.
///
/// The token was issued to this client by the auth server; the signature is
/// checked by the database and storage services on every request.
pub fn subject_from_token(token: &str) -> Result<String, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
    Ok(data.claims.sub)
}

/// Auth クライアント
#[derive(Clone)]
pub struct Auth {
    url: String,
    key: String,
    http_client: Client,
    current_session: Arc<RwLock<Option<Session>>>,
}

impl Auth {
    /// 新しい Auth クライアントを作成
    pub fn new(url: &str, key: &str, http_client: Client) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http_client,
            current_session: Arc::new(RwLock::new(None)),
        }
    }

    /// メール・パスワードでログイン
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.url);

        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AuthError::ApiError(error_text));
        }

        let session: Session = response.json().await?;
        info!("signed in as {}", email);

        *self.current_session.write().await = Some(session.clone());
        Ok(session)
    }

    /// 現在のセッションを取得
    pub async fn get_session(&self) -> Option<Session> {
        self.current_session.read().await.clone()
    }

    /// セッションを設定
    pub async fn set_session(&self, session: Option<Session>) {
        *self.current_session.write().await = session;
    }

    /// サインアウト
    ///
    /// The local session is cleared even when the server call fails.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let session = self
            .current_session
            .write()
            .await
            .take()
            .ok_or(AuthError::MissingSession)?;

        let url = format!("{}/auth/v1/logout", self.url);
        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", session.access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            warn!("logout request failed: {}", error_text);
            return Err(AuthError::ApiError(error_text));
        }

        Ok(())
    }
}
