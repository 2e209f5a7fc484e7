//! Sync controller: performs backend I/O and feeds the results back into
//! [`ChatState`] as events.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info, warn};
use tvision_api::{Credentials, Identity, SendMessageRequest};
use tvision_api_client::{ApiError, ImageUpload};
use tvision_local_store::KeyValueStore;
use tvision_runtime_config::Theme;

use crate::backend::{ChatBackend, Clipboard, Confirm};
use crate::message::ImageRef;
use crate::session::SessionStore;
use crate::state::{ChatEvent, ChatState, Notice, Rejection, Ticket, Transition};

pub const DELETE_PROMPT: &str = "Are you sure you want to delete this chat?";
pub const SHARE_COPIED_TEXT: &str = "Conversation copied to clipboard!";
pub const SHARE_FAILED_TEXT: &str = "Failed to share";
pub const LOGIN_FAILED_TEXT: &str = "Login failed";
pub const REGISTER_FAILED_TEXT: &str = "Registration failed";

/// Inline error for the login/register form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct FormError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Cancelled,
    Deleted { was_active: bool },
    Failed,
}

/// Canned prompts offered after an image upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickAction {
    Caption,
    Ocr,
    Recolor,
    Mask,
}

impl QuickAction {
    pub const ALL: [QuickAction; 4] = [Self::Caption, Self::Ocr, Self::Recolor, Self::Mask];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Caption => "caption",
            Self::Ocr => "ocr",
            Self::Recolor => "recolor",
            Self::Mask => "mask",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            Self::Caption => "Describe this image",
            Self::Ocr => "Extract text",
            Self::Recolor => "Recolor",
            Self::Mask => "Create mask",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

/// What a request needs to know about the state it was accepted in.
struct Accepted {
    ticket: Ticket,
    session: Option<String>,
    user_id: Option<i64>,
}

pub struct SyncController<B> {
    backend: B,
    sessions: SessionStore,
    state: Mutex<ChatState>,
}

impl<B: ChatBackend> SyncController<B> {
    pub fn new(backend: B, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            sessions: SessionStore::new(store),
            state: Mutex::new(ChatState::default()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.sessions
    }

    fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> ChatState {
        self.lock().clone()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&ChatState) -> R) -> R {
        f(&self.lock())
    }

    pub fn take_notices(&self) -> Vec<Notice> {
        self.lock().take_notices()
    }

    /// Apply one event and persist the shown session id if it moved.
    fn dispatch(&self, event: ChatEvent) -> Transition {
        self.dispatch_with(event, |_| ()).0
    }

    /// Like [`Self::dispatch`], also reading `f` off the state under the same
    /// lock.
    fn dispatch_with<R>(
        &self,
        event: ChatEvent,
        f: impl FnOnce(&ChatState) -> R,
    ) -> (Transition, R) {
        // Only the timeline's session is settled; a pending load's target is
        // not persisted until its messages arrive.
        let (transition, moved, read) = {
            let mut state = self.lock();
            let before = state.timeline().session().map(str::to_string);
            let transition = state.apply(event);
            let after = state.timeline().session().map(str::to_string);
            let read = f(&state);
            (transition, (before != after).then_some(after), read)
        };
        if let Some(active) = moved
            && let Err(e) = self.sessions.set_active_session(active.as_deref())
        {
            warn!("failed to persist active session: {e}");
        }
        (transition, read)
    }

    /// Dispatch a request event; `Err` carries the transition when it did
    /// not begin.
    fn request(&self, event: ChatEvent) -> Result<Accepted, Transition> {
        let (transition, (session, user_id)) = self.dispatch_with(event, |s| {
            (
                s.active_session().map(str::to_string),
                s.identity().map(|i| i.id),
            )
        });
        match transition {
            Transition::Began(ticket) => Ok(Accepted {
                ticket,
                session,
                user_id,
            }),
            other => {
                debug!(?other, "request not started");
                Err(other)
            }
        }
    }

    fn notify(&self, notice: Notice) {
        self.dispatch(ChatEvent::Notify(notice));
    }

    // ── Identity ──────────────────────────────────────────────────────

    /// Bring back the persisted identity and session on startup. Without an
    /// identity the persisted anonymous session is reopened, or a new one
    /// started.
    pub async fn restore(&self) {
        let preferred = self.sessions.active_session();
        match self.restore_identity() {
            Some(_) => {
                self.on_identity_loaded(preferred.as_deref()).await;
            }
            None => {
                if let Some(id) = preferred {
                    self.load_session(&id).await;
                }
                if self.with_state(|s| s.active_session().is_none()) {
                    self.start_new_chat().await;
                }
            }
        }
    }

    /// Load the persisted identity into state without touching the backend.
    pub fn restore_identity(&self) -> Option<Identity> {
        let identity = self.sessions.load_identity()?;
        info!(user = %identity.username, "restored identity");
        self.dispatch(ChatEvent::IdentityLoaded(identity.clone()));
        Some(identity)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Identity, FormError> {
        let creds = Credentials {
            username: username.trim().to_string(),
            password: password.to_string(),
        };
        match self.backend.login(&creds).await {
            Ok(identity) => {
                self.establish(identity.clone()).await;
                Ok(identity)
            }
            Err(e) => Err(form_error(&e, LOGIN_FAILED_TEXT)),
        }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<Identity, FormError> {
        let creds = Credentials {
            username: username.trim().to_string(),
            password: password.to_string(),
        };
        match self.backend.register(&creds).await {
            Ok(identity) => {
                self.establish(identity.clone()).await;
                Ok(identity)
            }
            Err(e) => Err(form_error(&e, REGISTER_FAILED_TEXT)),
        }
    }

    async fn establish(&self, identity: Identity) {
        if let Err(e) = self.sessions.save_identity(&identity) {
            warn!("failed to persist identity: {e}");
        }
        info!(user = %identity.username, "logged in");
        self.dispatch(ChatEvent::IdentityLoaded(identity));
        self.on_identity_loaded(None).await;
    }

    /// Forget the identity. In-flight completions become stale.
    pub fn logout(&self) {
        self.dispatch(ChatEvent::LoggedOut);
        if let Err(e) = self.sessions.clear_identity() {
            warn!("failed to clear stored identity: {e}");
        }
    }

    /// Refresh history, then make sure some session is shown: `preferred`
    /// if it is still in history, else the most recent one, else a new chat.
    pub async fn on_identity_loaded(&self, preferred: Option<&str>) {
        if self.with_state(|s| s.identity().is_none()) {
            return;
        }
        self.refresh_history().await;
        if self.with_state(|s| s.active_session().is_some()) {
            return;
        }
        let target = self.with_state(|s| {
            let history = s.history();
            preferred
                .and_then(|id| history.get(id))
                .or_else(|| history.most_recent())
                .map(|summary| summary.id.clone())
        });
        match target {
            Some(id) => {
                self.load_session(&id).await;
            }
            None => {
                self.start_new_chat().await;
            }
        }
    }

    /// Replace the History Index with the backend's list. Returns whether
    /// the refresh landed.
    pub async fn refresh_history(&self) -> bool {
        let Some(user_id) = self.with_state(|s| s.identity().map(|i| i.id)) else {
            return false;
        };
        match self.backend.history(user_id).await {
            Ok(sessions) => {
                // Identity may have changed while the request was in flight.
                if self.with_state(|s| s.identity().map(|i| i.id)) != Some(user_id) {
                    return false;
                }
                debug!(count = sessions.len(), "history refreshed");
                self.dispatch(ChatEvent::HistoryRefreshed(sessions));
                true
            }
            Err(e) => {
                warn!("failed to load chat history: {e}");
                self.notify(Notice::alert(format!("Failed to load chat history: {e}")));
                false
            }
        }
    }

    // ── Sessions ──────────────────────────────────────────────────────

    pub async fn start_new_chat(&self) -> Transition {
        let accepted = match self.request(ChatEvent::StartRequested) {
            Ok(a) => a,
            Err(t) => return t,
        };
        let (event, succeeded) = match self.backend.start_chat(accepted.user_id).await {
            Ok(resp) => (
                ChatEvent::StartSucceeded {
                    ticket: accepted.ticket,
                    session_id: resp.session_id,
                    greeting: resp.message,
                    at: Utc::now(),
                },
                true,
            ),
            Err(e) => {
                warn!("failed to start chat: {e}");
                (
                    ChatEvent::StartFailed {
                        ticket: accepted.ticket,
                        at: Utc::now(),
                    },
                    false,
                )
            }
        };
        let transition = self.dispatch(event);
        if succeeded && transition == Transition::Applied && accepted.user_id.is_some() {
            self.refresh_history().await;
        }
        transition
    }

    pub async fn load_session(&self, session_id: &str) -> Transition {
        let accepted = match self.request(ChatEvent::LoadRequested {
            session_id: session_id.to_string(),
        }) {
            Ok(a) => a,
            Err(t) => return t,
        };
        let event = match self.backend.session_messages(session_id).await {
            Ok(messages) => ChatEvent::LoadSucceeded {
                ticket: accepted.ticket,
                messages,
                at: Utc::now(),
            },
            Err(e) => {
                warn!(session_id, "failed to load session: {e}");
                ChatEvent::LoadFailed {
                    ticket: accepted.ticket,
                    error: e.to_string(),
                }
            }
        };
        self.dispatch(event)
    }

    /// Ask first, then delete on the backend. History only changes once the
    /// backend confirmed. Deleting the shown session, or the persisted one
    /// when nothing is shown yet, opens a new one.
    pub async fn delete_session(&self, session_id: &str, confirm: &impl Confirm) -> DeleteOutcome {
        if !confirm.confirm(DELETE_PROMPT) {
            return DeleteOutcome::Cancelled;
        }
        if let Err(e) = self.backend.delete_session(session_id).await {
            warn!(session_id, "failed to delete session: {e}");
            self.notify(Notice::alert(format!("Failed to delete chat: {e}")));
            return DeleteOutcome::Failed;
        }
        let shown = self.with_state(|s| s.active_session().map(str::to_string));
        let persisted = self.sessions.active_session();
        let was_active = match shown.as_deref() {
            Some(active) => active == session_id,
            None => persisted.as_deref() == Some(session_id),
        };
        self.dispatch(ChatEvent::SessionDeleted {
            session_id: session_id.to_string(),
        });
        if persisted.as_deref() == Some(session_id)
            && let Err(e) = self.sessions.set_active_session(None)
        {
            warn!("failed to clear active session: {e}");
        }
        if was_active {
            self.start_new_chat().await;
        }
        DeleteOutcome::Deleted { was_active }
    }

    /// Fetch the export text and put it on the clipboard.
    pub async fn share_session(&self, session_id: &str, clipboard: &dyn Clipboard) -> Option<String> {
        let text = match self.backend.share_session(session_id).await {
            Ok(resp) => resp.text,
            Err(e) => {
                warn!(session_id, "failed to export session: {e}");
                self.notify(Notice::alert(SHARE_FAILED_TEXT));
                return None;
            }
        };
        if let Err(e) = clipboard.copy(&text) {
            warn!("clipboard copy failed: {e}");
            self.notify(Notice::alert(SHARE_FAILED_TEXT));
            return None;
        }
        self.notify(Notice::info(SHARE_COPIED_TEXT));
        Some(text)
    }

    // ── Messages ──────────────────────────────────────────────────────

    pub async fn send_message(&self, text: &str) -> Transition {
        let accepted = match self.request(ChatEvent::SendRequested {
            text: text.to_string(),
            at: Utc::now(),
        }) {
            Ok(a) => a,
            Err(t) => return t,
        };
        let request = SendMessageRequest {
            session_id: accepted.session,
            message: text.trim().to_string(),
        };
        let event = match self.backend.send_message(&request).await {
            Ok(reply) => ChatEvent::ReplyReceived {
                ticket: accepted.ticket,
                reply,
                at: Utc::now(),
            },
            Err(e) => {
                warn!("failed to send message: {e}");
                ChatEvent::SendFailed {
                    ticket: accepted.ticket,
                    at: Utc::now(),
                }
            }
        };
        self.dispatch(event)
    }

    /// Upload an already validated image; `preview` is what the optimistic
    /// user message shows.
    pub async fn upload_image(&self, upload: ImageUpload, preview: ImageRef) -> Transition {
        let accepted = match self.request(ChatEvent::UploadRequested {
            preview,
            at: Utc::now(),
        }) {
            Ok(a) => a,
            Err(t) => return t,
        };
        let result = match accepted.session.as_deref() {
            Some(session_id) => self.backend.upload_image(session_id, &upload).await,
            None => Err(ApiError::InvalidUpload("no active session".to_string())),
        };
        let event = match result {
            Ok(resp) => ChatEvent::UploadSucceeded {
                ticket: accepted.ticket,
                message: resp.message,
                probabilities: resp.probabilities,
                at: Utc::now(),
            },
            Err(e) => {
                warn!(file = %upload.file_name, "failed to upload image: {e}");
                ChatEvent::UploadFailed {
                    ticket: accepted.ticket,
                    at: Utc::now(),
                }
            }
        };
        self.dispatch(event)
    }

    /// Read, validate and upload an image file.
    pub async fn upload_file(&self, path: &Path) -> Transition {
        if let Err(r) = self.with_state(ChatState::upload_gate) {
            return Transition::Rejected(r);
        }
        let upload = match ImageUpload::from_path(path).await {
            Ok(upload) => upload,
            Err(e) => {
                let reason = match e {
                    ApiError::InvalidUpload(reason) => reason,
                    other => other.to_string(),
                };
                self.notify(Notice::alert(reason.clone()));
                return Transition::Rejected(Rejection::InvalidFile(reason));
            }
        };
        self.upload_image(upload, ImageRef::Local(path.to_path_buf()))
            .await
    }

    pub async fn quick_action(&self, action: QuickAction) -> Transition {
        if self.with_state(|s| s.current_image().is_none()) {
            return Transition::Rejected(Rejection::NoCurrentImage);
        }
        self.send_message(action.prompt()).await
    }

    // ── Preferences ───────────────────────────────────────────────────

    pub fn theme(&self, default: Theme) -> Theme {
        self.sessions.theme(default)
    }

    pub fn toggle_theme(&self, default: Theme) -> Theme {
        let next = self.sessions.theme(default).toggled();
        if let Err(e) = self.sessions.set_theme(next) {
            warn!("failed to persist theme: {e}");
        }
        next
    }
}

fn form_error(e: &ApiError, fallback: &str) -> FormError {
    FormError(e.detail().unwrap_or(fallback).to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use bytes::Bytes;
    use tvision_api::{Role, StoredMessage};
    use tvision_api_client::AssistantReply;
    use tvision_local_store::{MemoryStore, SESSION_KEY, USER_KEY};

    use super::*;
    use crate::message::{CONNECTION_FAILED_TEXT, SEND_FAILED_TEXT, UPLOAD_FAILED_TEXT};
    use crate::state::{NoticeLevel, Operation};
    use crate::testing::{Endpoint, FakeBackend, GREETING, MemoryClipboard, summary};

    fn controller(backend: FakeBackend) -> (Arc<MemoryStore>, SyncController<FakeBackend>) {
        let store = Arc::new(MemoryStore::new());
        let ctl = SyncController::new(backend, store.clone());
        (store, ctl)
    }

    fn stored(role: Role, content: &str) -> StoredMessage {
        StoredMessage {
            role,
            content: Some(content.to_string()),
            timestamp: Some("2024-05-01 10:00:00".to_string()),
            image_path: None,
        }
    }

    fn texts(ctl: &SyncController<FakeBackend>) -> Vec<Option<String>> {
        ctl.with_state(|s| {
            s.timeline()
                .messages()
                .iter()
                .map(|m| m.text().map(str::to_string))
                .collect()
        })
    }

    fn yes(_: &str) -> bool {
        true
    }

    fn no(_: &str) -> bool {
        false
    }

    fn png_upload() -> ImageUpload {
        ImageUpload::from_bytes("cat.png", "image/png", Bytes::from_static(b"\x89PNG")).unwrap()
    }

    #[tokio::test]
    async fn start_new_chat_shows_greeting() {
        let (store, ctl) = controller(FakeBackend::new());
        assert_eq!(ctl.start_new_chat().await, Transition::Applied);
        assert_eq!(
            ctl.with_state(|s| s.active_session().map(str::to_string)),
            Some("session-1".to_string())
        );
        assert_eq!(texts(&ctl), vec![Some(GREETING.to_string())]);
        assert_eq!(store.get(SESSION_KEY).unwrap().as_deref(), Some("session-1"));
    }

    #[tokio::test]
    async fn start_failure_shows_connection_message() {
        let (_, ctl) = controller(FakeBackend::new().failing(Endpoint::StartChat));
        ctl.start_new_chat().await;
        let state = ctl.snapshot();
        assert_eq!(state.active_session(), None);
        assert_eq!(texts(&ctl), vec![Some(CONNECTION_FAILED_TEXT.to_string())]);
        assert!(!state.is_busy());
    }

    #[tokio::test]
    async fn concurrent_starts_only_one_reaches_backend() {
        let (_, ctl) = controller(FakeBackend::new());
        let (a, b) = tokio::join!(ctl.start_new_chat(), ctl.start_new_chat());
        assert_eq!(a, Transition::Applied);
        assert_eq!(b, Transition::Rejected(Rejection::Busy(Operation::Starting)));
        assert_eq!(ctl.backend().count(Endpoint::StartChat), 1);
        assert_eq!(ctl.with_state(|s| s.timeline().len()), 1);
    }

    #[tokio::test]
    async fn user_message_appears_before_reply_arrives() {
        let (_, ctl) = controller(FakeBackend::new());
        ctl.start_new_chat().await;
        let gate = ctl.backend().hold_replies();

        let send = ctl.send_message("What is in this picture?");
        tokio::pin!(send);
        assert!(
            tokio::time::timeout(Duration::from_millis(20), &mut send)
                .await
                .is_err()
        );
        assert_eq!(
            texts(&ctl),
            vec![
                Some(GREETING.to_string()),
                Some("What is in this picture?".to_string())
            ]
        );
        assert_eq!(ctl.with_state(|s| s.phase()), crate::state::Phase::Busy(Operation::Sending));

        gate.notify_one();
        assert_eq!(send.await, Transition::Applied);
        assert_eq!(ctl.with_state(|s| s.timeline().len()), 3);
    }

    #[tokio::test]
    async fn text_reply_scenario() {
        let backend = FakeBackend::new().with_reply(AssistantReply::Text {
            message: "hi".to_string(),
        });
        let (_, ctl) = controller(backend);
        ctl.start_new_chat().await;
        ctl.send_message("hello").await;
        assert_eq!(
            texts(&ctl),
            vec![
                Some(GREETING.to_string()),
                Some("hello".to_string()),
                Some("hi".to_string())
            ]
        );
        let calls = ctl.backend().calls();
        assert_eq!(calls.last().map(|c| c.arg.as_str()), Some("hello"));
    }

    #[tokio::test]
    async fn image_reply_with_caption_scenario() {
        let backend = FakeBackend::new().with_reply(AssistantReply::Image {
            bytes: Bytes::from_static(b"\x89PNG"),
            content_type: "image/png".to_string(),
            caption: Some("Here you go".to_string()),
        });
        let (_, ctl) = controller(backend);
        ctl.start_new_chat().await;
        ctl.send_message("recolor it").await;
        let state = ctl.snapshot();
        let msgs = state.timeline().messages();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[2].text(), Some("Here you go"));
        assert_eq!(msgs[3].role(), Role::Assistant);
        assert!(msgs[3].downloadable());
        assert!(matches!(msgs[3].image(), Some(ImageRef::Inline { .. })));
    }

    #[tokio::test]
    async fn send_failure_appends_error_and_keeps_prompt() {
        let (_, ctl) = controller(FakeBackend::new().failing(Endpoint::SendMessage));
        ctl.start_new_chat().await;
        ctl.send_message("hello").await;
        assert_eq!(
            texts(&ctl)[1..],
            [Some("hello".to_string()), Some(SEND_FAILED_TEXT.to_string())]
        );
    }

    #[tokio::test]
    async fn blank_send_touches_nothing() {
        let (_, ctl) = controller(FakeBackend::new());
        ctl.start_new_chat().await;
        assert_eq!(
            ctl.send_message("   ").await,
            Transition::Rejected(Rejection::EmptyMessage)
        );
        assert_eq!(ctl.backend().count(Endpoint::SendMessage), 0);
    }

    #[tokio::test]
    async fn identity_with_history_loads_most_recent_session() {
        let backend = FakeBackend::new()
            .with_account("ana", "pw", 7)
            .with_history(vec![summary("1", "First")])
            .with_session("1", vec![stored(Role::User, "a"), stored(Role::Assistant, "b")]);
        let (store, ctl) = controller(backend);

        ctl.login("ana", "pw").await.unwrap();

        assert_eq!(ctl.backend().count(Endpoint::SessionMessages), 1);
        assert_eq!(ctl.backend().count(Endpoint::StartChat), 0);
        let state = ctl.snapshot();
        assert_eq!(state.active_session(), Some("1"));
        assert_eq!(state.timeline().session(), Some("1"));
        assert_eq!(state.history().len(), 1);
        assert!(store.get(USER_KEY).unwrap().is_some());
    }

    #[tokio::test]
    async fn identity_with_empty_history_starts_new_chat() {
        let backend = FakeBackend::new().with_account("ana", "pw", 7);
        let (_, ctl) = controller(backend);

        ctl.login("ana", "pw").await.unwrap();

        assert_eq!(ctl.backend().count(Endpoint::StartChat), 1);
        assert_eq!(ctl.backend().count(Endpoint::SessionMessages), 0);
        let start = ctl
            .backend()
            .calls()
            .into_iter()
            .find(|c| c.endpoint == Endpoint::StartChat)
            .unwrap();
        assert_eq!(start.arg, "7");
    }

    #[tokio::test]
    async fn restore_prefers_persisted_session() {
        let backend = FakeBackend::new()
            .with_history(vec![summary("2", "Newest"), summary("1", "Older")])
            .with_session("1", vec![stored(Role::User, "old")])
            .with_session("2", vec![stored(Role::User, "new")]);
        let (store, ctl) = controller(backend);
        store.set(USER_KEY, r#"{"id":7,"username":"ana"}"#).unwrap();
        store.set(SESSION_KEY, "1").unwrap();

        ctl.restore().await;

        assert_eq!(ctl.with_state(|s| s.timeline().session().map(str::to_string)), Some("1".into()));
        assert_eq!(texts(&ctl), vec![Some("old".to_string())]);
    }

    #[tokio::test]
    async fn restore_without_identity_starts_anonymous_chat() {
        let (_, ctl) = controller(FakeBackend::new());
        ctl.restore().await;
        assert_eq!(ctl.backend().calls()[0].endpoint, Endpoint::StartChat);
        assert_eq!(ctl.backend().calls()[0].arg, "");
        assert_eq!(ctl.backend().count(Endpoint::History), 0);
    }

    #[tokio::test]
    async fn restore_reopens_anonymous_session() {
        let backend = FakeBackend::new().with_session("anon-1", vec![stored(Role::User, "hey")]);
        let (store, ctl) = controller(backend);
        store.set(SESSION_KEY, "anon-1").unwrap();

        ctl.restore().await;

        assert_eq!(texts(&ctl), vec![Some("hey".to_string())]);
        assert_eq!(ctl.backend().count(Endpoint::StartChat), 0);
    }

    #[tokio::test]
    async fn restore_with_vanished_session_starts_over() {
        let (store, ctl) = controller(FakeBackend::new());
        store.set(SESSION_KEY, "gone").unwrap();

        ctl.restore().await;

        assert_eq!(ctl.backend().count(Endpoint::StartChat), 1);
        assert_eq!(store.get(SESSION_KEY).unwrap().as_deref(), Some("session-1"));
    }

    #[tokio::test]
    async fn history_failure_alerts_and_starts_new_chat() {
        let backend = FakeBackend::new()
            .with_account("ana", "pw", 7)
            .failing(Endpoint::History);
        let (_, ctl) = controller(backend);
        ctl.login("ana", "pw").await.unwrap();
        let notices = ctl.take_notices();
        assert!(notices.iter().any(|n| n.level == NoticeLevel::Alert));
        assert!(ctl.with_state(|s| s.active_session().is_some()));
    }

    #[tokio::test]
    async fn login_failure_returns_backend_detail() {
        let (store, ctl) = controller(FakeBackend::new().with_account("ana", "pw", 7));
        let err = ctl.login("ana", "wrong").await.unwrap_err();
        assert_eq!(err, FormError("Invalid credentials".to_string()));
        assert!(ctl.with_state(|s| s.identity().is_none()));
        assert!(store.is_empty());
    }

    #[test]
    fn detail_less_failure_uses_generic_text() {
        let err = ApiError::InvalidUpload("x".into());
        assert_eq!(
            form_error(&err, LOGIN_FAILED_TEXT),
            FormError(LOGIN_FAILED_TEXT.to_string())
        );
    }

    #[tokio::test]
    async fn register_then_duplicate_is_rejected() {
        let (_, ctl) = controller(FakeBackend::new());
        let identity = ctl.register("bo", "pw").await.unwrap();
        assert_eq!(identity.username, "bo");
        ctl.logout();
        let err = ctl.register("bo", "pw").await.unwrap_err();
        assert_eq!(err.0, "Username already exists");
    }

    #[tokio::test]
    async fn logout_clears_state_but_keeps_theme() {
        let (store, ctl) = controller(FakeBackend::new().with_account("ana", "pw", 7));
        ctl.login("ana", "pw").await.unwrap();
        assert_eq!(ctl.toggle_theme(Theme::Light), Theme::Dark);

        ctl.logout();

        let state = ctl.snapshot();
        assert!(state.identity().is_none());
        assert!(state.active_session().is_none());
        assert!(state.timeline().is_empty());
        assert!(state.history().is_empty());
        assert_eq!(store.get(USER_KEY).unwrap(), None);
        assert_eq!(store.get(SESSION_KEY).unwrap(), None);
        assert_eq!(ctl.theme(Theme::Light), Theme::Dark);
    }

    #[tokio::test]
    async fn load_success_replaces_timeline() {
        let backend = FakeBackend::new().with_session("s-9", vec![stored(Role::User, "earlier")]);
        let (_, ctl) = controller(backend);
        ctl.start_new_chat().await;
        assert_eq!(ctl.load_session("s-9").await, Transition::Applied);
        assert_eq!(texts(&ctl), vec![Some("earlier".to_string())]);
        assert_eq!(
            ctl.with_state(|s| s.timeline().session().map(str::to_string)),
            Some("s-9".to_string())
        );
    }

    #[tokio::test]
    async fn load_failure_reverts_to_shown_session() {
        let (store, ctl) = controller(FakeBackend::new());
        ctl.start_new_chat().await;
        ctl.load_session("missing").await;
        let state = ctl.snapshot();
        assert_eq!(state.active_session(), Some("session-1"));
        assert_eq!(state.timeline().len(), 1);
        assert_eq!(store.get(SESSION_KEY).unwrap().as_deref(), Some("session-1"));
        assert_eq!(state.notices()[0].level, NoticeLevel::Alert);
    }

    #[tokio::test]
    async fn failed_open_keeps_persisted_session() {
        let (store, ctl) = controller(FakeBackend::new());
        store.set(SESSION_KEY, "keep").unwrap();

        assert_eq!(ctl.load_session("bad-id").await, Transition::Applied);

        assert_eq!(ctl.with_state(|s| s.active_session().map(str::to_string)), None);
        assert_eq!(store.get(SESSION_KEY).unwrap().as_deref(), Some("keep"));
    }

    #[tokio::test]
    async fn pending_load_is_not_persisted() {
        let backend = FakeBackend::new().with_session("s-9", vec![stored(Role::User, "earlier")]);
        let (store, ctl) = controller(backend);
        store.set(SESSION_KEY, "keep").unwrap();

        let (loaded, while_loading) = tokio::join!(ctl.load_session("s-9"), async {
            store.get(SESSION_KEY).unwrap()
        });

        assert_eq!(loaded, Transition::Applied);
        assert_eq!(while_loading.as_deref(), Some("keep"));
        assert_eq!(store.get(SESSION_KEY).unwrap().as_deref(), Some("s-9"));
    }

    #[tokio::test]
    async fn deleting_persisted_session_before_restore_starts_new_chat() {
        let (store, ctl) = controller(FakeBackend::new());
        store.set(SESSION_KEY, "old").unwrap();

        assert_eq!(
            ctl.delete_session("old", &yes).await,
            DeleteOutcome::Deleted { was_active: true }
        );
        assert_eq!(ctl.backend().count(Endpoint::StartChat), 1);
        assert_eq!(store.get(SESSION_KEY).unwrap().as_deref(), Some("session-1"));
    }

    #[tokio::test]
    async fn deleting_other_session_before_restore_makes_no_chat() {
        let (store, ctl) = controller(FakeBackend::new());
        store.set(SESSION_KEY, "keep").unwrap();

        assert_eq!(
            ctl.delete_session("other", &yes).await,
            DeleteOutcome::Deleted { was_active: false }
        );
        assert_eq!(ctl.backend().count(Endpoint::StartChat), 0);
        assert_eq!(store.get(SESSION_KEY).unwrap().as_deref(), Some("keep"));
    }

    #[tokio::test]
    async fn delete_cancelled_makes_no_call() {
        let (_, ctl) = controller(FakeBackend::new());
        assert_eq!(ctl.delete_session("1", &no).await, DeleteOutcome::Cancelled);
        assert_eq!(ctl.backend().count(Endpoint::Delete), 0);
    }

    #[tokio::test]
    async fn delete_failure_keeps_history_entry() {
        let backend = FakeBackend::new()
            .with_account("ana", "pw", 7)
            .with_history(vec![summary("1", "First"), summary("2", "Second")])
            .with_session("1", vec![stored(Role::User, "a")])
            .failing(Endpoint::Delete);
        let (_, ctl) = controller(backend);
        ctl.login("ana", "pw").await.unwrap();

        assert_eq!(ctl.delete_session("2", &yes).await, DeleteOutcome::Failed);
        assert_eq!(ctl.with_state(|s| s.history().len()), 2);
        assert!(ctl.with_state(|s| s.history().contains("2")));
    }

    #[tokio::test]
    async fn deleting_active_session_starts_new_chat() {
        let backend = FakeBackend::new()
            .with_account("ana", "pw", 7)
            .with_history(vec![summary("1", "First")])
            .with_session("1", vec![stored(Role::User, "a")]);
        let (_, ctl) = controller(backend);
        ctl.login("ana", "pw").await.unwrap();

        assert_eq!(
            ctl.delete_session("1", &yes).await,
            DeleteOutcome::Deleted { was_active: true }
        );
        let state = ctl.snapshot();
        assert!(!state.history().contains("1"));
        assert_eq!(state.active_session(), Some("session-1"));
        assert_eq!(texts(&ctl), vec![Some(GREETING.to_string())]);
    }

    #[tokio::test]
    async fn deleting_other_session_keeps_timeline() {
        let backend = FakeBackend::new()
            .with_account("ana", "pw", 7)
            .with_history(vec![summary("1", "First"), summary("2", "Second")])
            .with_session("1", vec![stored(Role::User, "a")]);
        let (_, ctl) = controller(backend);
        ctl.login("ana", "pw").await.unwrap();

        assert_eq!(
            ctl.delete_session("2", &|_: &str| true).await,
            DeleteOutcome::Deleted { was_active: false }
        );
        assert_eq!(texts(&ctl), vec![Some("a".to_string())]);
        assert_eq!(ctl.backend().count(Endpoint::StartChat), 0);
    }

    #[tokio::test]
    async fn share_copies_text_and_notifies() {
        let (_, ctl) = controller(FakeBackend::new());
        let clipboard = MemoryClipboard::new();
        let text = ctl.share_session("s-1", &clipboard).await.unwrap();
        assert!(text.starts_with("Conversation with T-Vision AI:"));
        assert_eq!(clipboard.contents(), Some(text));
        assert_eq!(ctl.take_notices(), vec![Notice::info(SHARE_COPIED_TEXT)]);
    }

    #[tokio::test]
    async fn share_failure_is_alert_only() {
        let (_, ctl) = controller(FakeBackend::new());
        ctl.start_new_chat().await;
        let before = ctl.with_state(|s| s.timeline().revision());
        assert!(ctl.share_session("s-1", &MemoryClipboard::broken()).await.is_none());
        assert_eq!(ctl.take_notices(), vec![Notice::alert(SHARE_FAILED_TEXT)]);
        assert_eq!(ctl.with_state(|s| s.timeline().revision()), before);
    }

    #[tokio::test]
    async fn upload_without_session_is_rejected() {
        let (_, ctl) = controller(FakeBackend::new());
        let out = ctl
            .upload_image(png_upload(), ImageRef::Local("cat.png".into()))
            .await;
        assert_eq!(out, Transition::Rejected(Rejection::NoActiveSession));
        assert_eq!(ctl.backend().count(Endpoint::Upload), 0);
    }

    #[tokio::test]
    async fn upload_records_classification_and_enables_quick_actions() {
        let (_, ctl) = controller(FakeBackend::new());
        ctl.start_new_chat().await;
        assert_eq!(
            ctl.quick_action(QuickAction::Ocr).await,
            Transition::Rejected(Rejection::NoCurrentImage)
        );

        ctl.upload_image(png_upload(), ImageRef::Local("cat.png".into()))
            .await;
        let state = ctl.snapshot();
        let last = state.timeline().last().unwrap();
        assert_eq!(last.classification().and_then(|c| c.get("is_photo")), Some(0.88));
        assert!(state.quick_actions_available());
        assert_eq!(ctl.backend().calls().last().unwrap().arg, "session-1:cat.png");

        ctl.quick_action(QuickAction::Ocr).await;
        assert_eq!(ctl.backend().calls().last().unwrap().arg, "Extract text");
    }

    #[tokio::test]
    async fn upload_failure_clears_hint() {
        let (_, ctl) = controller(FakeBackend::new().failing(Endpoint::Upload));
        ctl.start_new_chat().await;
        ctl.upload_image(png_upload(), ImageRef::Local("cat.png".into()))
            .await;
        assert_eq!(
            texts(&ctl).last().cloned().flatten().as_deref(),
            Some(UPLOAD_FAILED_TEXT)
        );
        assert!(ctl.with_state(|s| s.current_image().is_none()));
    }

    #[tokio::test]
    async fn upload_file_rejects_non_images() {
        let (_, ctl) = controller(FakeBackend::new());
        ctl.start_new_chat().await;
        let out = ctl.upload_file(Path::new("notes.txt")).await;
        assert_eq!(
            out,
            Transition::Rejected(Rejection::InvalidFile("Please upload an image file".into()))
        );
        assert_eq!(ctl.backend().count(Endpoint::Upload), 0);
        assert_eq!(ctl.with_state(|s| s.timeline().len()), 1);
    }

    #[test]
    fn quick_action_prompts() {
        assert_eq!(QuickAction::parse("OCR"), Some(QuickAction::Ocr));
        assert_eq!(QuickAction::parse("blur"), None);
        let prompts: BTreeMap<_, _> = QuickAction::ALL
            .iter()
            .map(|a| (a.as_str(), a.prompt()))
            .collect();
        assert_eq!(prompts["caption"], "Describe this image");
        assert_eq!(prompts["mask"], "Create mask");
    }
}
