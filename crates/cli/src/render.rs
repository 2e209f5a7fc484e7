//! Plain-terminal rendering of timelines, history and notices.

use std::path::{Path, PathBuf};

use chrono::Local;
use tvision_api::Role;
use tvision_core::{Classification, HistoryIndex, ImageRef, Message, Notice, NoticeLevel};
use tvision_runtime_config::Theme;

/// ANSI styling for one theme. Empty codes when colors are off.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    user: &'static str,
    assistant: &'static str,
    dim: &'static str,
    alert: &'static str,
    reset: &'static str,
}

impl Palette {
    pub fn plain() -> Self {
        Self {
            user: "",
            assistant: "",
            dim: "",
            alert: "",
            reset: "",
        }
    }

    /// Honors `NO_COLOR`.
    pub fn for_theme(theme: Theme) -> Self {
        if std::env::var_os("NO_COLOR").is_some() {
            return Self::plain();
        }
        match theme {
            Theme::Light => Self {
                user: "\x1b[34m",
                assistant: "\x1b[35m",
                dim: "\x1b[90m",
                alert: "\x1b[31m",
                reset: "\x1b[0m",
            },
            Theme::Dark => Self {
                user: "\x1b[96m",
                assistant: "\x1b[95m",
                dim: "\x1b[37m",
                alert: "\x1b[91m",
                reset: "\x1b[0m",
            },
        }
    }
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Assistant => "T-Vision",
    }
}

/// `document 12% · photo 88%`
pub fn format_badges(classification: &Classification) -> String {
    classification
        .badges()
        .into_iter()
        .map(|(label, pct)| format!("{label} {pct}%"))
        .collect::<Vec<_>>()
        .join(" · ")
}

pub fn format_message(message: &Message, palette: &Palette) -> String {
    let color = match message.role() {
        Role::User => palette.user,
        Role::Assistant => palette.assistant,
    };
    let time = message.timestamp().with_timezone(&Local).format("%H:%M");
    let mut out = format!(
        "{}[{time}]{} {color}{}{}:",
        palette.dim,
        palette.reset,
        speaker(message.role()),
        palette.reset
    );
    if let Some(text) = message.text() {
        out.push(' ');
        out.push_str(&text.replace('\n', "\n    "));
    }
    if let Some(image) = message.image() {
        let label = match image {
            ImageRef::Local(_) => "image",
            ImageRef::Inline { .. } => "generated image",
            ImageRef::Remote(_) => "stored image",
        };
        out.push_str(&format!(
            "\n    {}[{label}: {}]{}",
            palette.dim,
            image.describe(),
            palette.reset
        ));
    }
    if let Some(classification) = message.classification().filter(|c| !c.is_empty()) {
        out.push_str(&format!(
            "\n    {}{}{}",
            palette.dim,
            format_badges(classification),
            palette.reset
        ));
    }
    out
}

pub fn print_messages(messages: &[Message], palette: &Palette) {
    for message in messages {
        println!("{}", format_message(message, palette));
    }
}

pub fn print_notices(notices: Vec<Notice>, palette: &Palette) {
    for notice in notices {
        match notice.level {
            NoticeLevel::Info => println!("{}", notice.message),
            NoticeLevel::Alert => {
                eprintln!("{}{}{}", palette.alert, notice.message, palette.reset)
            }
        }
    }
}

pub fn format_history(history: &HistoryIndex, active: Option<&str>) -> Vec<String> {
    history
        .sessions()
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let marker = if Some(s.id.as_str()) == active { '*' } else { ' ' };
            let updated = s.updated_at.as_deref().unwrap_or("-");
            format!(
                "{marker} {:>2}. {:<40} {updated}  ({})",
                i + 1,
                s.display_title(),
                s.id
            )
        })
        .collect()
}

/// First free path for `name` inside `dir`: `name`, then `stem-1.ext`, ...
pub fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    (1..)
        .map(|n| match &ext {
            Some(ext) => dir.join(format!("{stem}-{n}.{ext}")),
            None => dir.join(format!("{stem}-{n}")),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Write every downloadable image among `messages` into `dir`.
pub fn save_images(messages: &[Message], dir: &Path, name: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut saved = Vec::new();
    for message in messages.iter().filter(|m| m.downloadable()) {
        if let Some(ImageRef::Inline { bytes, .. }) = message.image() {
            let path = unique_path(dir, name);
            std::fs::write(&path, bytes)?;
            saved.push(path);
        }
    }
    Ok(saved)
}
