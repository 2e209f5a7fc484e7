//! Scripted in-process backend for controller tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;
use tvision_api::{
    Credentials, Identity, SendMessageRequest, SessionSummary, ShareResponse, StartChatResponse,
    StoredMessage, UploadResponse,
};
use tvision_api_client::{ApiError, AssistantReply, ImageUpload, Result};

use crate::backend::{ChatBackend, Clipboard};

pub const GREETING: &str = "Hello! I'm T-Vision. How can I help you today?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Endpoint {
    Login,
    Register,
    StartChat,
    SendMessage,
    Upload,
    History,
    SessionMessages,
    Delete,
    Share,
}

/// One recorded backend call with its most relevant argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub endpoint: Endpoint,
    pub arg: String,
}

#[derive(Default)]
struct Script {
    accounts: BTreeMap<String, (String, i64)>,
    history: Vec<SessionSummary>,
    sessions: BTreeMap<String, Vec<StoredMessage>>,
    replies: VecDeque<AssistantReply>,
    failing: BTreeSet<Endpoint>,
    next_session: u32,
    next_user: i64,
}

/// Backend double. Every call yields to the runtime once before answering,
/// so concurrently polled operations really overlap.
#[derive(Default)]
pub struct FakeBackend {
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
    reply_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_account(self, username: &str, password: &str, id: i64) -> Self {
        self.script()
            .accounts
            .insert(username.to_string(), (password.to_string(), id));
        self
    }

    pub fn with_history(self, sessions: Vec<SessionSummary>) -> Self {
        self.script().history = sessions;
        self
    }

    pub fn with_session(self, id: &str, messages: Vec<StoredMessage>) -> Self {
        self.script().sessions.insert(id.to_string(), messages);
        self
    }

    /// Queue the reply for the next `send_message`. Without one the fake
    /// echoes the prompt as text.
    pub fn with_reply(self, reply: AssistantReply) -> Self {
        self.script().replies.push_back(reply);
        self
    }

    pub fn failing(self, endpoint: Endpoint) -> Self {
        self.script().failing.insert(endpoint);
        self
    }

    /// Make `send_message` wait until the returned handle is notified.
    pub fn hold_replies(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.reply_gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, endpoint: Endpoint) -> usize {
        self.calls().iter().filter(|c| c.endpoint == endpoint).count()
    }

    async fn record(&self, endpoint: Endpoint, arg: impl Into<String>) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Call {
                endpoint,
                arg: arg.into(),
            });
        tokio::task::yield_now().await;
        if self.script().failing.contains(&endpoint) {
            return Err(ApiError::Backend {
                status: 500,
                detail: "Internal Server Error".to_string(),
            });
        }
        Ok(())
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::Backend {
        status: 404,
        detail: format!("{what} not found"),
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn login(&self, creds: &Credentials) -> Result<Identity> {
        self.record(Endpoint::Login, &creds.username).await?;
        match self.script().accounts.get(&creds.username) {
            Some((password, id)) if *password == creds.password => Ok(Identity {
                id: *id,
                username: creds.username.clone(),
            }),
            _ => Err(ApiError::Backend {
                status: 401,
                detail: "Invalid credentials".to_string(),
            }),
        }
    }

    async fn register(&self, creds: &Credentials) -> Result<Identity> {
        self.record(Endpoint::Register, &creds.username).await?;
        let mut script = self.script();
        if script.accounts.contains_key(&creds.username) {
            return Err(ApiError::Backend {
                status: 400,
                detail: "Username already exists".to_string(),
            });
        }
        script.next_user += 1;
        let id = script.next_user;
        script
            .accounts
            .insert(creds.username.clone(), (creds.password.clone(), id));
        Ok(Identity {
            id,
            username: creds.username.clone(),
        })
    }

    async fn start_chat(&self, user_id: Option<i64>) -> Result<StartChatResponse> {
        let arg = user_id.map(|id| id.to_string()).unwrap_or_default();
        self.record(Endpoint::StartChat, arg).await?;
        let mut script = self.script();
        script.next_session += 1;
        Ok(StartChatResponse {
            session_id: format!("session-{}", script.next_session),
            message: GREETING.to_string(),
        })
    }

    async fn send_message(&self, req: &SendMessageRequest) -> Result<AssistantReply> {
        let gate = self
            .reply_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.record(Endpoint::SendMessage, &req.message).await?;
        let queued = self.script().replies.pop_front();
        Ok(queued.unwrap_or_else(|| AssistantReply::Text {
            message: format!("You said: {}", req.message),
        }))
    }

    async fn upload_image(
        &self,
        session_id: &str,
        upload: &ImageUpload,
    ) -> Result<UploadResponse> {
        self.record(Endpoint::Upload, format!("{session_id}:{}", upload.file_name))
            .await?;
        Ok(UploadResponse {
            message: "I've analyzed your image.".to_string(),
            probabilities: BTreeMap::from([
                ("is_document".to_string(), 0.12),
                ("is_photo".to_string(), 0.88),
            ]),
            recommended_action: Some("caption".to_string()),
            confidence: Some(0.88),
            available_actions: vec!["caption".to_string(), "ocr".to_string()],
            details: None,
        })
    }

    async fn history(&self, user_id: i64) -> Result<Vec<SessionSummary>> {
        self.record(Endpoint::History, user_id.to_string()).await?;
        Ok(self.script().history.clone())
    }

    async fn session_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        self.record(Endpoint::SessionMessages, session_id).await?;
        self.script()
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| not_found("Session"))
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.record(Endpoint::Delete, session_id).await?;
        let mut script = self.script();
        script.history.retain(|s| s.id != session_id);
        script.sessions.remove(session_id);
        Ok(())
    }

    async fn share_session(&self, session_id: &str) -> Result<ShareResponse> {
        self.record(Endpoint::Share, session_id).await?;
        Ok(ShareResponse {
            text: format!("Conversation with T-Vision AI:\n\n[{session_id}]"),
        })
    }
}

/// Clipboard that keeps the last copied text.
#[derive(Default)]
pub struct MemoryClipboard {
    contents: Mutex<Option<String>>,
    broken: bool,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clipboard whose every copy fails.
    pub fn broken() -> Self {
        Self {
            contents: Mutex::new(None),
            broken: true,
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Clipboard for MemoryClipboard {
    fn copy(&self, text: &str) -> std::io::Result<()> {
        if self.broken {
            return Err(std::io::Error::other("no clipboard available"));
        }
        *self.contents.lock().unwrap_or_else(PoisonError::into_inner) = Some(text.to_string());
        Ok(())
    }
}

pub fn summary(id: &str, title: &str) -> SessionSummary {
    SessionSummary {
        id: id.to_string(),
        title: Some(title.to_string()),
        updated_at: Some("2024-05-01 10:00:00".to_string()),
    }
}
