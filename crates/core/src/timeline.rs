use crate::message::Message;

/// Ordered messages of exactly one session.
///
/// The session id and the contents only ever change together, so a renderer
/// never sees messages from two sessions at once. `revision` bumps on every
/// mutation and is what views watch to re-render or scroll to the latest entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    session: Option<String>,
    messages: Vec<Message>,
    revision: u64,
}

impl Timeline {
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.revision += 1;
    }

    /// Swap in another session's messages wholesale.
    pub(crate) fn replace(&mut self, session: Option<String>, messages: Vec<Message>) {
        self.session = session;
        self.messages = messages;
        self.revision += 1;
    }

    pub(crate) fn reset_with(&mut self, session: Option<String>, message: Message) {
        self.replace(session, vec![message]);
    }

    pub(crate) fn clear(&mut self) {
        self.replace(None, Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn replace_swaps_session_and_messages_together() {
        let mut t = Timeline::default();
        t.reset_with(Some("a".into()), Message::assistant_text("hi", Utc::now()));
        t.push(Message::user_text("one", Utc::now()));
        assert_eq!(t.len(), 2);

        t.replace(
            Some("b".into()),
            vec![Message::assistant_text("other", Utc::now())],
        );
        assert_eq!(t.session(), Some("b"));
        assert_eq!(t.len(), 1);
        assert_eq!(t.messages()[0].text(), Some("other"));
    }

    #[test]
    fn every_mutation_bumps_revision() {
        let mut t = Timeline::default();
        let r0 = t.revision();
        t.push(Message::user_text("x", Utc::now()));
        t.clear();
        assert_eq!(t.revision(), r0 + 2);
        assert!(t.is_empty());
        assert_eq!(t.session(), None);
    }
}
