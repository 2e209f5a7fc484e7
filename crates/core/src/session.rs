//! Persisted identity, active session id and theme.

use std::sync::Arc;

use tracing::warn;
use tvision_api::Identity;
use tvision_local_store::{
    KeyValueStore, Result, SESSION_KEY, THEME_KEY, USER_KEY, load_json, save_json,
};
use tvision_runtime_config::Theme;

#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Persisted identity. A value that no longer parses is removed and
    /// treated as logged out.
    pub fn load_identity(&self) -> Option<Identity> {
        match load_json::<Identity>(self.store.as_ref(), USER_KEY) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("discarding unreadable stored identity: {e}");
                if let Err(e) = self.store.remove(USER_KEY) {
                    warn!("failed to remove stored identity: {e}");
                }
                None
            }
        }
    }

    pub fn save_identity(&self, identity: &Identity) -> Result<()> {
        save_json(self.store.as_ref(), USER_KEY, identity)
    }

    /// Forget the identity and the active session. The theme stays.
    pub fn clear_identity(&self) -> Result<()> {
        self.store.remove(USER_KEY)?;
        self.store.remove(SESSION_KEY)
    }

    pub fn active_session(&self) -> Option<String> {
        match self.store.get(SESSION_KEY) {
            Ok(id) => id.filter(|id| !id.is_empty()),
            Err(e) => {
                warn!("failed to read active session: {e}");
                None
            }
        }
    }

    pub fn set_active_session(&self, id: Option<&str>) -> Result<()> {
        match id {
            Some(id) => self.store.set(SESSION_KEY, id),
            None => self.store.remove(SESSION_KEY),
        }
    }

    /// Stored theme, or `default` when none was chosen yet.
    pub fn theme(&self, default: Theme) -> Theme {
        match self.store.get(THEME_KEY) {
            Ok(Some(raw)) => Theme::parse(&raw).unwrap_or(default),
            Ok(None) => default,
            Err(e) => {
                warn!("failed to read theme: {e}");
                default
            }
        }
    }

    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        self.store.set(THEME_KEY, theme.as_str())
    }
}
