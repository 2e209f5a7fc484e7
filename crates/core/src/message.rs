use std::collections::BTreeMap;
use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;
use tvision_api::{Role, StoredMessage};

/// Shown when a new session cannot be opened.
pub const CONNECTION_FAILED_TEXT: &str =
    "❌ Failed to connect to server. Please ensure the backend is running.";
/// Shown when a chat message gets no usable reply.
pub const SEND_FAILED_TEXT: &str = "❌ Sorry, I encountered an error. Please try again.";
/// Shown when an image upload fails.
pub const UPLOAD_FAILED_TEXT: &str = "❌ Failed to upload image. Please try again.";

/// Where the bytes of a message image live.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageRef {
    /// A file on this machine (upload preview).
    Local(PathBuf),
    /// Bytes received from the backend (generated image).
    Inline { bytes: Bytes, content_type: String },
    /// A path recorded by the backend in stored history.
    Remote(String),
}

impl ImageRef {
    pub fn describe(&self) -> String {
        match self {
            Self::Local(path) => path.display().to_string(),
            Self::Inline {
                bytes,
                content_type,
            } => format!("{content_type}, {} bytes", bytes.len()),
            Self::Remote(path) => path.clone(),
        }
    }
}

/// Label → probability map returned by image classification.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Classification(BTreeMap<String, f64>);

impl Classification {
    pub fn new(probabilities: BTreeMap<String, f64>) -> Self {
        Self(probabilities)
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.0.get(label).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `(label, whole percent)` pairs for display. An `is_` prefix is dropped
    /// and probabilities are clamped to `0.0..=1.0`.
    pub fn badges(&self) -> Vec<(String, u32)> {
        self.0
            .iter()
            .map(|(label, p)| {
                let label = label.strip_prefix("is_").unwrap_or(label).to_string();
                let pct = (p.clamp(0.0, 1.0) * 100.0).round() as u32;
                (label, pct)
            })
            .collect()
    }

    /// Highest-probability label, if any.
    pub fn top(&self) -> Option<(&str, f64)> {
        self.0
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(label, p)| (label.as_str(), *p))
    }
}

/// One entry of the timeline. Immutable once built; every constructor
/// guarantees at least one of text or image is present.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    role: Role,
    text: Option<String>,
    image: Option<ImageRef>,
    downloadable: bool,
    classification: Option<Classification>,
    timestamp: DateTime<Utc>,
}

impl Message {
    fn build(role: Role, text: Option<String>, image: Option<ImageRef>, at: DateTime<Utc>) -> Self {
        Self {
            role,
            text,
            image,
            downloadable: false,
            classification: None,
            timestamp: at,
        }
    }

    pub fn user_text(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::build(Role::User, Some(text.into()), None, at)
    }

    pub fn assistant_text(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::build(Role::Assistant, Some(text.into()), None, at)
    }

    pub fn user_image(image: ImageRef, at: DateTime<Utc>) -> Self {
        Self::build(Role::User, None, Some(image), at)
    }

    /// Image produced by the backend; offered for download.
    pub fn generated_image(bytes: Bytes, content_type: impl Into<String>, at: DateTime<Utc>) -> Self {
        let image = ImageRef::Inline {
            bytes,
            content_type: content_type.into(),
        };
        Self {
            downloadable: true,
            ..Self::build(Role::Assistant, None, Some(image), at)
        }
    }

    /// Assistant answer to an image upload.
    pub fn classified(
        text: impl Into<String>,
        classification: Classification,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            classification: Some(classification),
            ..Self::build(Role::Assistant, Some(text.into()), None, at)
        }
    }

    /// Map a stored backend message. Entries with neither content nor image
    /// are dropped; unparsable timestamps fall back to `fallback`.
    pub fn from_stored(stored: StoredMessage, fallback: DateTime<Utc>) -> Option<Self> {
        let text = stored.content.filter(|c| !c.is_empty());
        let image = stored
            .image_path
            .filter(|p| !p.is_empty())
            .map(ImageRef::Remote);
        if text.is_none() && image.is_none() {
            return None;
        }
        let at = stored
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(fallback);
        Some(Self::build(stored.role, text, image, at))
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn image(&self) -> Option<&ImageRef> {
        self.image.as_ref()
    }

    pub fn downloadable(&self) -> bool {
        self.downloadable
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Parse backend timestamps: RFC 3339, or SQLite `YYYY-MM-DD HH:MM:SS[.f]`
/// read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    debug!(raw, "unparsable timestamp");
    None
}
