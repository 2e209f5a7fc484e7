use tvision_api::SessionSummary;

/// Session summaries of the current identity, in backend order (most recent
/// first). Refreshes replace the whole set; there is no incremental merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryIndex {
    sessions: Vec<SessionSummary>,
}

impl HistoryIndex {
    pub fn sessions(&self) -> &[SessionSummary] {
        &self.sessions
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// First entry as delivered by the backend; no client-side sorting.
    pub fn most_recent(&self) -> Option<&SessionSummary> {
        self.sessions.first()
    }

    pub fn get(&self, id: &str) -> Option<&SessionSummary> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn replace(&mut self, sessions: Vec<SessionSummary>) {
        self.sessions = sessions;
    }

    /// Drop one entry locally. Only called after the backend confirmed
    /// the deletion.
    pub(crate) fn remove(&mut self, id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        self.sessions.len() != before
    }

    pub(crate) fn clear(&mut self) {
        self.sessions.clear();
    }
}
