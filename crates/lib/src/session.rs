//! Chat session identity and the ordered message transcript.
//!
//! A session is created when the chat screen opens and replaced wholesale on "new chat".
//! The transcript is append-only; insertion order is the conversation order.

use chrono::{DateTime, Local};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;
use std::path::PathBuf;

/// Length of a generated session id.
pub const SESSION_ID_LEN: usize = 10;

/// Assistant message every fresh session starts with.
pub const GREETING: &str = "Hello! How can I help you today?";

/// Opaque session identifier sent with every chat request (10 alphanumeric characters, case-sensitive).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single transcript entry: either a text bubble or an image bubble.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub text: Option<String>,
    pub image_path: Option<PathBuf>,
    pub is_user: bool,
    pub timestamp: DateTime<Local>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image_path: None,
            is_user: true,
            timestamp: Local::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image_path: None,
            is_user: false,
            timestamp: Local::now(),
        }
    }

    /// Image (or file) bubble sent by the user.
    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self {
            text: None,
            image_path: Some(path.into()),
            is_user: true,
            timestamp: Local::now(),
        }
    }
}

/// A session: id and ordered message history.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    messages: Vec<Message>,
}

impl Session {
    /// Start a fresh session: new id, transcript seeded with the greeting.
    pub fn start() -> Self {
        let id = SessionId::generate();
        log::info!("session {} started", id);
        Self {
            id,
            messages: vec![Message::assistant(GREETING)],
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }
}
