//! Disambiguation of the polymorphic `POST /api/chat/message` reply.
//!
//! The backend answers a chat message either with JSON (`{"message": ...}`) or
//! with the raw bytes of a generated image. The body is always read as bytes
//! first and only the `content-type` header decides how to interpret it.

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use tracing::debug;
use tvision_api::TextReply;

use crate::error::Result;

/// Percent-encoded, human-readable caption sent alongside image replies.
pub const CAPTION_HEADER: &str = "x-message";

/// Assistant reply to a chat message, with the wire shape already resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantReply {
    Image {
        bytes: Bytes,
        content_type: String,
        caption: Option<String>,
    },
    Text {
        message: String,
    },
}

impl AssistantReply {
    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }
}

/// Resolve a successful reply body into an [`AssistantReply`].
///
/// `image/*` content types keep the bytes untouched. Anything else, including
/// a missing header, is decoded as UTF-8 text and parsed as JSON; a parse
/// failure is returned as [`crate::ApiError::Decode`].
pub fn decode_reply(headers: &HeaderMap, body: Bytes) -> Result<AssistantReply> {
    let content_type = header_text(headers, CONTENT_TYPE.as_str()).unwrap_or_default();

    if is_image_content_type(&content_type) {
        let caption = header_text(headers, CAPTION_HEADER).map(|raw| decode_caption(&raw));
        debug!(
            content_type = %content_type,
            bytes = body.len(),
            has_caption = caption.is_some(),
            "image reply"
        );
        return Ok(AssistantReply::Image {
            bytes: body,
            content_type,
            caption,
        });
    }

    let text = String::from_utf8_lossy(&body);
    let reply: TextReply = serde_json::from_str(&text)?;
    Ok(AssistantReply::Text {
        message: reply.message,
    })
}

pub fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with("image/")
}

/// Percent-decode a caption header. Malformed input keeps the raw text.
pub fn decode_caption(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            debug!("caption header is not valid percent-encoded UTF-8: {e}");
            raw.to_string()
        }
    }
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}
