use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::debug;

use tvision_api::*;

use crate::error::{ApiError, Result};
use crate::reply::{AssistantReply, decode_reply};
use crate::upload::ImageUpload;

/// Typed HTTP client for the T-Vision backend.
///
/// Auth calls go to `{base}/auth/...`, chat calls to `{base}/api/chat/...`.
/// The backend has no token auth; the user id travels in paths and forms.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new client with the given base URL and timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create from an existing `reqwest::Client` (e.g. shared in tests).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth{}", self.base_url, path)
    }

    // ── Health ────────────────────────────────────────────────────────────

    pub async fn health(&self) -> Result<HealthResponse> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        parse_response(resp).await
    }

    // ── Auth ──────────────────────────────────────────────────────────────

    pub async fn login(&self, creds: &Credentials) -> Result<Identity> {
        debug!(username = %creds.username, "login");
        let resp = self
            .client
            .post(self.auth_url("/login"))
            .form(creds)
            .send()
            .await?;
        parse_response(resp).await
    }

    pub async fn register(&self, creds: &Credentials) -> Result<Identity> {
        debug!(username = %creds.username, "register");
        let resp = self
            .client
            .post(self.auth_url("/register"))
            .form(creds)
            .send()
            .await?;
        parse_response(resp).await
    }

    // ── Chat ──────────────────────────────────────────────────────────────

    /// Open a new backend session. Anonymous sessions are not persisted.
    pub async fn start_chat(&self, user_id: Option<i64>) -> Result<StartChatResponse> {
        let mut form = Form::new();
        if let Some(id) = user_id {
            form = form.text("user_id", id.to_string());
        }
        let resp = self
            .client
            .post(self.api_url("/chat/start"))
            .multipart(form)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// Send a chat message. The reply is read as raw bytes and resolved by
    /// its content type, see [`crate::reply::decode_reply`].
    pub async fn send_message(&self, req: &SendMessageRequest) -> Result<AssistantReply> {
        let resp = self
            .client
            .post(self.api_url("/chat/message"))
            .json(req)
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        let headers = resp.headers().clone();
        let body = resp.bytes().await?;
        decode_reply(&headers, body)
    }

    pub async fn upload_image(
        &self,
        session_id: &str,
        upload: &ImageUpload,
    ) -> Result<UploadResponse> {
        let part = Part::bytes(upload.bytes.to_vec())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.content_type)
            .map_err(|e| ApiError::InvalidUpload(format!("content type: {e}")))?;
        let form = Form::new()
            .text("session_id", session_id.to_string())
            .part("file", part);
        debug!(session_id, bytes = upload.bytes.len(), "upload image");
        let resp = self
            .client
            .post(self.api_url("/chat/upload"))
            .multipart(form)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// Session summaries for a user, most recent first.
    pub async fn history(&self, user_id: i64) -> Result<Vec<SessionSummary>> {
        let resp = self
            .client
            .get(self.api_url(&format!("/chat/history/{user_id}")))
            .send()
            .await?;
        parse_response(resp).await
    }

    /// Stored messages of one session, oldest first.
    pub async fn session_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        let resp = self
            .client
            .get(self.api_url(&session_path(session_id)))
            .send()
            .await?;
        parse_response(resp).await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.api_url(&session_path(session_id)))
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    pub async fn share_session(&self, session_id: &str) -> Result<ShareResponse> {
        let resp = self
            .client
            .post(self.api_url(&format!(
                "/chat/share/{}",
                urlencoding::encode(session_id)
            )))
            .send()
            .await?;
        parse_response(resp).await
    }
}

fn session_path(session_id: &str) -> String {
    format!("/chat/session/{}", urlencoding::encode(session_id))
}

/// Turn non-2xx responses into [`ApiError::Backend`], preferring the
/// structured `{"detail": ...}` message over the raw body.
async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .map(|b| b.message())
        .filter(|m| !m.is_empty())
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    Err(ApiError::Backend {
        status: status.as_u16(),
        detail,
    })
}

/// Parse an HTTP response: return the deserialized body on 2xx,
/// or a backend error carrying the status and detail.
async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let resp = ensure_success(resp).await?;
    let body = resp.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}
