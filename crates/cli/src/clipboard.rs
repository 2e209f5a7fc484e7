use std::io::Write;
use std::process::{Command, Stdio};

use tvision_core::Clipboard;

/// Clipboard backed by the platform's copy tool.
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn copy(&self, text: &str) -> std::io::Result<()> {
        let mut last_err = None;
        for &(program, args) in CANDIDATES {
            match pipe_to(program, args, text) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(program, "clipboard tool failed: {e}");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| std::io::Error::other("no clipboard tool for this platform")))
    }
}

#[cfg(target_os = "macos")]
const CANDIDATES: &[(&str, &[&str])] = &[("pbcopy", &[])];

#[cfg(target_os = "linux")]
const CANDIDATES: &[(&str, &[&str])] = &[
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
    ("xsel", &["--clipboard", "--input"]),
];

#[cfg(target_os = "windows")]
const CANDIDATES: &[(&str, &[&str])] = &[("clip", &[])];

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
const CANDIDATES: &[(&str, &[&str])] = &[];

fn pipe_to(program: &str, args: &[&str], text: &str) -> std::io::Result<()> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(text.as_bytes()),
        None => Ok(()),
    };
    // stdin is closed by now; always reap the child, even after a failed write.
    let status = child.wait()?;
    if !status.success() {
        return Err(std::io::Error::other(format!("{program} exited with {status}")));
    }
    written
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn tool_exit_status_is_reported() {
        assert!(pipe_to("cat", &[], "hello").is_ok());
        let err = pipe_to("false", &[], "hello").unwrap_err();
        assert!(err.to_string().contains("false exited with"));
    }

    #[test]
    fn child_closing_stdin_early_is_still_reaped() {
        let text = "x".repeat(1 << 20);
        let err = pipe_to("sh", &["-c", "exec 0<&-; exit 3"], &text).unwrap_err();
        assert!(err.to_string().contains("exited with"), "{err}");
    }

    #[test]
    fn missing_tool_is_an_error() {
        assert!(pipe_to("tvision-no-such-clipboard-tool", &[], "x").is_err());
    }
}
