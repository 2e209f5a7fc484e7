//! Chat state container.
//!
//! Every change to identity, active session, timeline and history goes
//! through [`ChatState::apply`]. Requests (`*Requested`) pass the busy gate
//! and hand out a [`Ticket`]; completions carry the ticket back and are
//! dropped as stale if the state moved on in between (logout, deletion of the
//! active session). Failures are absorbed into timeline messages or notices,
//! so every path ends back in [`Phase::Idle`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;
use tvision_api::{Identity, SessionSummary, StoredMessage};
use tvision_api_client::AssistantReply;

use crate::history::HistoryIndex;
use crate::message::{
    CONNECTION_FAILED_TEXT, Classification, ImageRef, Message, SEND_FAILED_TEXT,
    UPLOAD_FAILED_TEXT,
};
use crate::timeline::Timeline;

/// Mutating operations guarded by the busy flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Starting,
    Loading,
    Sending,
    Uploading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Busy(Operation),
}

/// Proof that a request was accepted. Completions must present it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    operation: Operation,
    generation: u64,
}

impl Ticket {
    pub fn operation(&self) -> Operation {
        self.operation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Busy(Operation),
    EmptyMessage,
    NoActiveSession,
    NoCurrentImage,
    InvalidFile(String),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Busy(op) => write!(f, "busy ({op:?})"),
            Self::EmptyMessage => f.write_str("message is empty"),
            Self::NoActiveSession => f.write_str("no active session"),
            Self::NoCurrentImage => f.write_str("no image uploaded yet"),
            Self::InvalidFile(reason) => f.write_str(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Began(Ticket),
    Applied,
    Rejected(Rejection),
    Stale,
}

impl Transition {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Alert,
}

/// Transient user-facing message (toast/alert), not part of the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn alert(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Alert,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    IdentityLoaded(Identity),
    LoggedOut,
    HistoryRefreshed(Vec<SessionSummary>),
    /// Backend confirmed deletion of a session.
    SessionDeleted {
        session_id: String,
    },

    StartRequested,
    StartSucceeded {
        ticket: Ticket,
        session_id: String,
        greeting: String,
        at: DateTime<Utc>,
    },
    StartFailed {
        ticket: Ticket,
        at: DateTime<Utc>,
    },

    LoadRequested {
        session_id: String,
    },
    LoadSucceeded {
        ticket: Ticket,
        messages: Vec<StoredMessage>,
        at: DateTime<Utc>,
    },
    LoadFailed {
        ticket: Ticket,
        error: String,
    },

    SendRequested {
        text: String,
        at: DateTime<Utc>,
    },
    ReplyReceived {
        ticket: Ticket,
        reply: AssistantReply,
        at: DateTime<Utc>,
    },
    SendFailed {
        ticket: Ticket,
        at: DateTime<Utc>,
    },

    UploadRequested {
        preview: ImageRef,
        at: DateTime<Utc>,
    },
    UploadSucceeded {
        ticket: Ticket,
        message: String,
        probabilities: BTreeMap<String, f64>,
        at: DateTime<Utc>,
    },
    UploadFailed {
        ticket: Ticket,
        at: DateTime<Utc>,
    },

    Notify(Notice),
}

#[derive(Debug, Clone, Default)]
pub struct ChatState {
    identity: Option<Identity>,
    active_session: Option<String>,
    timeline: Timeline,
    history: HistoryIndex,
    phase: Phase,
    generation: u64,
    current_image: Option<ImageRef>,
    classification: Option<Classification>,
    notices: Vec<Notice>,
}

impl ChatState {
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn active_session(&self) -> Option<&str> {
        self.active_session.as_deref()
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn history(&self) -> &HistoryIndex {
        &self.history
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Last uploaded image of this session; drives the quick-action offer.
    pub fn current_image(&self) -> Option<&ImageRef> {
        self.current_image.as_ref()
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Quick actions apply to the current image and only while idle.
    pub fn quick_actions_available(&self) -> bool {
        self.current_image.is_some() && !self.is_busy()
    }

    fn gate(&self) -> Result<(), Rejection> {
        match self.phase {
            Phase::Idle => Ok(()),
            Phase::Busy(op) => Err(Rejection::Busy(op)),
        }
    }

    /// Checks an upload would pass, without changing anything.
    pub fn upload_gate(&self) -> Result<(), Rejection> {
        if self.active_session.is_none() {
            return Err(Rejection::NoActiveSession);
        }
        self.gate()
    }

    fn begin(&mut self, operation: Operation) -> Transition {
        self.generation += 1;
        self.phase = Phase::Busy(operation);
        debug!(?operation, generation = self.generation, "begin");
        Transition::Began(Ticket {
            operation,
            generation: self.generation,
        })
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation && self.phase == Phase::Busy(ticket.operation)
    }

    fn finish(&mut self) -> Transition {
        self.phase = Phase::Idle;
        Transition::Applied
    }

    /// Invalidate in-flight work without waiting for it.
    fn abandon_in_flight(&mut self) {
        self.generation += 1;
        self.phase = Phase::Idle;
    }

    pub fn apply(&mut self, event: ChatEvent) -> Transition {
        match event {
            ChatEvent::IdentityLoaded(identity) => {
                self.identity = Some(identity);
                Transition::Applied
            }
            ChatEvent::LoggedOut => {
                self.abandon_in_flight();
                self.identity = None;
                self.active_session = None;
                self.timeline.clear();
                self.history.clear();
                self.current_image = None;
                self.classification = None;
                Transition::Applied
            }
            ChatEvent::HistoryRefreshed(sessions) => {
                self.history.replace(sessions);
                Transition::Applied
            }
            ChatEvent::SessionDeleted { session_id } => {
                self.history.remove(&session_id);
                if self.active_session.as_deref() == Some(session_id.as_str()) {
                    self.abandon_in_flight();
                    self.active_session = None;
                    self.timeline.clear();
                    self.current_image = None;
                    self.classification = None;
                }
                Transition::Applied
            }

            // ── Start ─────────────────────────────────────────────────
            ChatEvent::StartRequested => match self.gate() {
                Ok(()) => self.begin(Operation::Starting),
                Err(r) => Transition::Rejected(r),
            },
            ChatEvent::StartSucceeded {
                ticket,
                session_id,
                greeting,
                at,
            } => {
                if !self.is_current(&ticket) {
                    return Transition::Stale;
                }
                self.active_session = Some(session_id.clone());
                self.timeline
                    .reset_with(Some(session_id), Message::assistant_text(greeting, at));
                self.current_image = None;
                self.classification = None;
                self.finish()
            }
            ChatEvent::StartFailed { ticket, at } => {
                if !self.is_current(&ticket) {
                    return Transition::Stale;
                }
                self.active_session = None;
                self.timeline
                    .reset_with(None, Message::assistant_text(CONNECTION_FAILED_TEXT, at));
                self.current_image = None;
                self.classification = None;
                self.finish()
            }

            // ── Load ──────────────────────────────────────────────────
            ChatEvent::LoadRequested { session_id } => match self.gate() {
                Ok(()) => {
                    self.active_session = Some(session_id);
                    self.begin(Operation::Loading)
                }
                Err(r) => Transition::Rejected(r),
            },
            ChatEvent::LoadSucceeded {
                ticket,
                messages,
                at,
            } => {
                if !self.is_current(&ticket) {
                    return Transition::Stale;
                }
                let messages = messages
                    .into_iter()
                    .filter_map(|m| Message::from_stored(m, at))
                    .collect();
                self.timeline.replace(self.active_session.clone(), messages);
                self.current_image = None;
                self.classification = None;
                self.finish()
            }
            ChatEvent::LoadFailed { ticket, error } => {
                if !self.is_current(&ticket) {
                    return Transition::Stale;
                }
                // Point back at the session the timeline still shows.
                self.active_session = self.timeline.session().map(str::to_string);
                self.notices
                    .push(Notice::alert(format!("Failed to load chat: {error}")));
                self.finish()
            }

            // ── Send ──────────────────────────────────────────────────
            ChatEvent::SendRequested { text, at } => {
                let text = text.trim();
                if text.is_empty() {
                    return Transition::Rejected(Rejection::EmptyMessage);
                }
                if let Err(r) = self.gate() {
                    return Transition::Rejected(r);
                }
                self.timeline.push(Message::user_text(text, at));
                self.begin(Operation::Sending)
            }
            ChatEvent::ReplyReceived { ticket, reply, at } => {
                if !self.is_current(&ticket) {
                    return Transition::Stale;
                }
                match reply {
                    AssistantReply::Text { message } => {
                        self.timeline.push(Message::assistant_text(message, at));
                    }
                    AssistantReply::Image {
                        bytes,
                        content_type,
                        caption,
                    } => {
                        if let Some(caption) = caption {
                            self.timeline.push(Message::assistant_text(caption, at));
                        }
                        self.timeline
                            .push(Message::generated_image(bytes, content_type, at));
                    }
                }
                self.finish()
            }
            ChatEvent::SendFailed { ticket, at } => {
                if !self.is_current(&ticket) {
                    return Transition::Stale;
                }
                self.timeline
                    .push(Message::assistant_text(SEND_FAILED_TEXT, at));
                self.finish()
            }

            // ── Upload ────────────────────────────────────────────────
            ChatEvent::UploadRequested { preview, at } => {
                if let Err(r) = self.upload_gate() {
                    return Transition::Rejected(r);
                }
                self.current_image = Some(preview.clone());
                self.timeline.push(Message::user_image(preview, at));
                self.begin(Operation::Uploading)
            }
            ChatEvent::UploadSucceeded {
                ticket,
                message,
                probabilities,
                at,
            } => {
                if !self.is_current(&ticket) {
                    return Transition::Stale;
                }
                let classification = Classification::new(probabilities);
                self.classification = Some(classification.clone());
                self.timeline
                    .push(Message::classified(message, classification, at));
                self.finish()
            }
            ChatEvent::UploadFailed { ticket, at } => {
                if !self.is_current(&ticket) {
                    return Transition::Stale;
                }
                self.timeline
                    .push(Message::assistant_text(UPLOAD_FAILED_TEXT, at));
                self.current_image = None;
                self.finish()
            }

            ChatEvent::Notify(notice) => {
                self.notices.push(notice);
                Transition::Applied
            }
        }
    }
}
