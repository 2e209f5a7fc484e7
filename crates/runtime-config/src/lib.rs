//! Client configuration types.
//!
//! The CLI reads `tvision.toml` from the platform config directory. Every
//! field has a default so a missing or partial file is always usable.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "tvision.toml";
/// File holding persisted client state (identity, theme).
pub const STATE_FILE_NAME: &str = "state.json";
/// Environment variable overriding `server.url`.
pub const SERVER_URL_ENV: &str = "TVISION_SERVER_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine a home directory")]
    NoHome,

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level client configuration (persisted as `tvision.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub ui: UiSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    /// Gateway base URL; `/auth` and `/api` are appended.
    #[serde(default = "default_server_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UiSettings {
    /// Theme used until the user toggles one explicitly.
    #[serde(default)]
    pub default_theme: Theme,
    /// File name for downloaded result images.
    #[serde(default = "default_download_name")]
    pub download_name: String,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            default_theme: Theme::default(),
            download_name: default_download_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StorageSettings {
    /// Override for the state file; defaults to the platform data dir.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            _ => None,
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_server_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_download_name() -> String {
    "tvision-result.png".to_string()
}

// ── Paths ───────────────────────────────────────────────────────────────

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("ai", "T-Code", "tvision").ok_or(ConfigError::NoHome)
}

pub fn config_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Location of the persisted client state, honoring `storage.state_file`.
pub fn state_path(config: &ClientConfig) -> Result<PathBuf> {
    if let Some(ref path) = config.storage.state_file {
        return Ok(path.clone());
    }
    Ok(project_dirs()?.data_dir().join(STATE_FILE_NAME))
}

// ── File I/O ────────────────────────────────────────────────────────────

/// Load config from `path`. A missing file yields defaults.
pub fn load_config(path: &Path) -> Result<ClientConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ClientConfig::default()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let mut config: ClientConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    apply_compat_fallbacks(&mut config);
    Ok(config)
}

pub fn save_config(path: &Path, config: &ClientConfig) -> Result<()> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(write_err)
}

/// Normalize values that would make the client unusable.
/// Returns true when any field was updated.
pub fn apply_compat_fallbacks(config: &mut ClientConfig) -> bool {
    let mut changed = false;

    let trimmed = config.server.url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        config.server.url = default_server_url();
        changed = true;
    } else if trimmed != config.server.url {
        config.server.url = trimmed.to_string();
        changed = true;
    }

    if config.server.timeout_secs == 0 {
        config.server.timeout_secs = default_timeout_secs();
        changed = true;
    }

    if config.ui.download_name.trim().is_empty() {
        config.ui.download_name = default_download_name();
        changed = true;
    }

    changed
}

/// Apply environment overrides through `lookup` (usually `std::env::var`).
pub fn apply_env_overrides<F>(config: &mut ClientConfig, lookup: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(SERVER_URL_ENV) {
        Some(url) if !url.trim().is_empty() => {
            config.server.url = url;
            apply_compat_fallbacks(config);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg: ClientConfig = toml::from_str("").expect("parse toml");
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.server.url, "http://localhost:8000");
        assert_eq!(cfg.server.timeout_secs, 30);
        assert_eq!(cfg.ui.default_theme, Theme::Light);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: ClientConfig = toml::from_str(
            r#"
[server]
url = "http://192.168.1.20:8000"

[ui]
default_theme = "dark"
"#,
        )
        .expect("parse toml");
        assert_eq!(cfg.server.url, "http://192.168.1.20:8000");
        assert_eq!(cfg.server.timeout_secs, 30);
        assert_eq!(cfg.ui.default_theme, Theme::Dark);
        assert_eq!(cfg.ui.download_name, "tvision-result.png");
    }

    #[test]
    fn compat_fallbacks_fix_unusable_values() {
        let mut cfg = ClientConfig::default();
        cfg.server.url = "http://host:8000///".to_string();
        cfg.server.timeout_secs = 0;

        assert!(apply_compat_fallbacks(&mut cfg));
        assert_eq!(cfg.server.url, "http://host:8000");
        assert_eq!(cfg.server.timeout_secs, 30);
        assert!(!apply_compat_fallbacks(&mut cfg));
    }

    #[test]
    fn env_override_replaces_server_url() {
        let mut cfg = ClientConfig::default();
        let changed = apply_env_overrides(&mut cfg, |key| {
            (key == SERVER_URL_ENV).then(|| "http://gateway:9000/".to_string())
        });
        assert!(changed);
        assert_eq!(cfg.server.url, "http://gateway:9000");

        let unchanged = apply_env_overrides(&mut cfg, |_| None);
        assert!(!unchanged);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("conf").join(CONFIG_FILE_NAME);

        let mut cfg = ClientConfig::default();
        cfg.server.url = "http://example:8000".to_string();
        cfg.ui.default_theme = Theme::Dark;
        save_config(&path, &cfg).expect("save");

        assert_eq!(load_config(&path).expect("load"), cfg);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&dir.path().join("nope.toml")).expect("load");
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn theme_toggle_and_parse() {
        assert_eq!(Theme::Light.toggled(), Theme::Dark);
        assert_eq!(Theme::parse("dark"), Some(Theme::Dark));
        assert_eq!(Theme::parse("sepia"), None);
    }
}
