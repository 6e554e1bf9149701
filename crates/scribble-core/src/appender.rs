//! Applies an exchange to the active session.
//!
//! The appender owns the trailing model message while a reply is being
//! produced. Every mutation is written through to the session store.

use tracing::warn;

use crate::sessions::{InlineImage, Message, SessionStore};

/// Lifecycle of a single user/model exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    UserSent,
    AwaitingFirstFragment,
    Streaming,
    Finalized,
    ErrorFinalized,
}

impl ExchangeState {
    /// True while a reply is pending or streaming.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            ExchangeState::AwaitingFirstFragment | ExchangeState::Streaming
        )
    }
}

/// Writes one exchange into a session.
pub struct Appender<'a> {
    store: &'a mut SessionStore,
    session_id: String,
    state: ExchangeState,
    body: String,
}

impl<'a> Appender<'a> {
    pub fn new(store: &'a mut SessionStore, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
            state: ExchangeState::Idle,
            body: String::new(),
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn is_in_progress(&self) -> bool {
        self.state.is_in_progress()
    }

    /// Cumulative text received so far.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Pushes the user's message.
    pub fn append_user(&mut self, text: &str) {
        self.push(Message::user(text));
        self.state = ExchangeState::UserSent;
    }

    /// Pushes an empty model message that subsequent fragments fill in.
    pub fn begin_model_reply(&mut self) {
        self.body.clear();
        self.push(Message::model(""));
        self.state = ExchangeState::AwaitingFirstFragment;
    }

    /// Appends a fragment and rewrites the trailing message with the
    /// cumulative body. Returns the body.
    pub fn on_fragment(&mut self, fragment: &str) -> &str {
        if !self.is_in_progress() {
            warn!(state = ?self.state, "fragment outside of a pending reply, ignoring");
            return &self.body;
        }

        self.body.push_str(fragment);
        self.state = ExchangeState::Streaming;

        let body = self.body.clone();
        self.patch_trailing(|message| message.text = body);
        &self.body
    }

    /// Finalizes the reply, attaching an image if there is one.
    pub fn complete_reply(&mut self, image: Option<InlineImage>) {
        if !self.is_in_progress() {
            warn!(state = ?self.state, "no pending reply to complete");
            return;
        }

        if image.is_some() {
            self.patch_trailing(|message| message.image = image);
        }
        self.state = ExchangeState::Finalized;
    }

    /// Finalizes the exchange with an apology.
    ///
    /// An untouched placeholder is replaced; text that already streamed is
    /// kept and the apology is added as a separate message.
    pub fn fail(&mut self, apology: &str) {
        match self.state {
            ExchangeState::AwaitingFirstFragment => {
                let apology = apology.to_string();
                self.patch_trailing(|message| message.text = apology);
            }
            ExchangeState::Streaming | ExchangeState::UserSent => {
                self.push(Message::model(apology));
            }
            ExchangeState::Idle | ExchangeState::Finalized | ExchangeState::ErrorFinalized => {
                warn!(state = ?self.state, "no pending exchange to fail");
                return;
            }
        }
        self.state = ExchangeState::ErrorFinalized;
    }

    /// The trailing message of the session, if any.
    pub fn trailing(&self) -> Option<&Message> {
        self.store
            .get(&self.session_id)
            .and_then(|session| session.messages.last())
    }

    fn push(&mut self, message: Message) {
        let pushed = self.store.modify(&self.session_id, |session| {
            session.messages.push(message);
            session.touch();
        });
        if pushed.is_none() {
            warn!(session = %self.session_id, "session vanished during exchange");
        }
    }

    fn patch_trailing(&mut self, f: impl FnOnce(&mut Message)) {
        let patched = self.store.modify(&self.session_id, |session| {
            if let Some(message) = session.messages.last_mut() {
                f(message);
            }
            session.touch();
        });
        if patched.is_none() {
            warn!(session = %self.session_id, "session vanished during exchange");
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::{TempDir, tempdir};

    use super::*;
    use crate::sessions::{GREETING, Role};

    fn store_with_session() -> (TempDir, SessionStore, String) {
        let dir = tempdir().unwrap();
        let mut store = SessionStore::open(dir.path().join("sessions.json"));
        let id = store.create().id.clone();
        (dir, store, id)
    }

    #[test]
    fn trailing_body_is_concatenation_of_fragments() {
        let (_dir, mut store, id) = store_with_session();
        let fragments = ["the ", "cat ", "sat", "", " on ", "the ", "cat"];

        let mut appender = Appender::new(&mut store, &id);
        appender.append_user("tell me a story");
        appender.begin_model_reply();
        for fragment in fragments {
            appender.on_fragment(fragment);
        }
        appender.complete_reply(None);

        assert_eq!(appender.state(), ExchangeState::Finalized);
        let trailing = appender.trailing().unwrap();
        assert_eq!(trailing.role, Role::Model);
        assert_eq!(trailing.text, fragments.concat());
    }

    #[test]
    fn state_machine_reports_progress_only_while_pending() {
        let (_dir, mut store, id) = store_with_session();
        let mut appender = Appender::new(&mut store, &id);

        assert!(!appender.is_in_progress());
        appender.append_user("hi");
        assert_eq!(appender.state(), ExchangeState::UserSent);
        assert!(!appender.is_in_progress());

        appender.begin_model_reply();
        assert_eq!(appender.state(), ExchangeState::AwaitingFirstFragment);
        assert!(appender.is_in_progress());

        appender.on_fragment("hello");
        assert_eq!(appender.state(), ExchangeState::Streaming);
        assert!(appender.is_in_progress());

        appender.complete_reply(None);
        assert!(!appender.is_in_progress());
        assert_eq!(appender.state(), ExchangeState::Finalized);
    }

    #[test]
    fn every_mutation_is_persisted() {
        let (dir, mut store, id) = store_with_session();
        let path = dir.path().join("sessions.json");

        let mut appender = Appender::new(&mut store, &id);
        appender.append_user("hi");
        appender.begin_model_reply();
        appender.on_fragment("hel");

        let on_disk = SessionStore::load(&path);
        let messages = &on_disk[0].messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].text, "hel");
    }

    #[test]
    fn fail_before_first_fragment_replaces_placeholder() {
        let (_dir, mut store, id) = store_with_session();
        let mut appender = Appender::new(&mut store, &id);
        appender.append_user("hi");
        appender.begin_model_reply();
        appender.fail("oops... lead broke. try again!");

        assert_eq!(appender.state(), ExchangeState::ErrorFinalized);
        let messages = &store.get(&id).unwrap().messages;
        assert_eq!(
            messages,
            &vec![
                Message::model(GREETING),
                Message::user("hi"),
                Message::model("oops... lead broke. try again!"),
            ]
        );
    }

    #[test]
    fn fail_after_streaming_keeps_partial_text() {
        let (_dir, mut store, id) = store_with_session();
        let mut appender = Appender::new(&mut store, &id);
        appender.append_user("hi");
        appender.begin_model_reply();
        appender.on_fragment("half a sen");
        appender.fail("oops... lead broke. try again!");

        let messages = &store.get(&id).unwrap().messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].text, "half a sen");
        assert_eq!(messages[3].text, "oops... lead broke. try again!");
    }

    #[test]
    fn complete_reply_attaches_image() {
        let (_dir, mut store, id) = store_with_session();
        let image = InlineImage::from_bytes("image/png", &[1, 2, 3]);

        let mut appender = Appender::new(&mut store, &id);
        appender.append_user("draw");
        appender.begin_model_reply();
        appender.on_fragment("here is your doodle!");
        appender.complete_reply(Some(image.clone()));

        let trailing = appender.trailing().unwrap();
        assert_eq!(trailing.image.as_ref(), Some(&image));
    }

    #[test]
    fn fragments_after_completion_are_ignored() {
        let (_dir, mut store, id) = store_with_session();
        let mut appender = Appender::new(&mut store, &id);
        appender.append_user("hi");
        appender.begin_model_reply();
        appender.on_fragment("done");
        appender.complete_reply(None);
        appender.on_fragment(" extra");

        assert_eq!(appender.trailing().unwrap().text, "done");
    }
}
