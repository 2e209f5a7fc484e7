//! Wire types for the T-Vision backend.
//!
//! The backend exposes two surfaces: `/auth` (form-encoded login/register) and
//! `/api` (chat sessions). Every request/response body the client touches is
//! declared here so the client and its tests share one definition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ─── Shared Enums ────────────────────────────────────────────────────────────

/// Author of a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Auth ────────────────────────────────────────────────────────────────────

/// Form body for `POST /auth/login` and `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Authenticated user.
///
/// Login answers with the full user row (`id`, `username`, ...), register with
/// `user_id` + `username`; both land here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    #[serde(alias = "user_id")]
    pub id: i64,
    pub username: String,
}

impl Identity {
    /// First letter of the username, upper-cased, for compact avatars.
    pub fn initial(&self) -> char {
        self.username
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('?')
    }
}

// ─── Chat ────────────────────────────────────────────────────────────────────

/// Response of `POST /api/chat/start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartChatResponse {
    pub session_id: String,
    pub message: String,
}

/// JSON body of `POST /api/chat/message`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendMessageRequest {
    pub session_id: Option<String>,
    pub message: String,
}

/// JSON variant of the `POST /api/chat/message` reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextReply {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub action_taken: Option<String>,
}

/// Response of `POST /api/chat/upload`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadResponse {
    pub message: String,
    /// Label → probability in `0.0..=1.0`.
    #[serde(default)]
    pub probabilities: BTreeMap<String, f64>,
    #[serde(default)]
    pub recommended_action: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub available_actions: Vec<String>,
    #[serde(default)]
    pub details: Option<String>,
}

/// One entry of `GET /api/chat/history/{user_id}`, most recent first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl SessionSummary {
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => "Untitled",
        }
    }
}

/// One entry of `GET /api/chat/session/{id}`, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
}

/// Response of `POST /api/chat/share/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShareResponse {
    pub text: String,
}

// ─── Health ──────────────────────────────────────────────────────────────────

/// Response of the gateway `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub gateway: String,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.gateway == "healthy"
    }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Error body returned with non-2xx statuses (`{"detail": ...}`).
///
/// `detail` is a plain string for handled errors and a list of objects for
/// request validation failures.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}

impl ErrorBody {
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect::<Vec<_>>()
                .join("; "),
            other => other.to_string(),
        }
    }
}
