//! Remote chat endpoint: request/reply types, error taxonomy, and the backend seam.
//!
//! The endpoint is `POST <base-url>/chat` with `{"input", "session_id"}`; it answers
//! `{"output"}` on success and may answer `{"error"}` on failure.

mod http;

pub use http::HttpChatBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const TIMEOUT_TEXT: &str =
    "The server took too long to respond. Please check your connection and try again.";
pub const SERVER_ERROR_TEXT: &str = "Server error. Please try again later.";
pub const UNREACHABLE_TEXT: &str = "Unable to contact the server. Please try again later.";

/// File extensions the endpoint accepts for multipart uploads.
pub const UPLOAD_EXTENSIONS: &[&str] = &[
    "pdf", "docx", "doc", "csv", "json", "xml", "txt", "jpg", "jpeg", "png", "gif", "bmp", "tiff",
    "mp4", "avi", "mov", "wmv", "flv", "webm", "mp3", "wav", "aac", "flac", "ogg", "wma",
];

/// True if the file's extension is in [`UPLOAD_EXTENSIONS`] (case-insensitive).
pub fn is_uploadable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| UPLOAD_EXTENSIONS.contains(&e.as_str()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub input: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatReply {
    pub output: String,
    /// Present when the request carried a file.
    #[serde(default)]
    pub file_info: Option<FileInfo>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    pub content_type: String,
    #[serde(default)]
    pub processed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("chat request timed out")]
    Timeout,
    #[error("chat server returned {status}")]
    Status { status: u16, message: Option<String> },
    #[error("chat request failed: {0}")]
    Request(reqwest::Error),
    #[error("malformed chat response: {0}")]
    Malformed(String),
    #[error("reading attachment {}: {source}", path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout
        } else {
            ExchangeError::Request(err)
        }
    }
}

impl ExchangeError {
    /// The assistant text shown in place of a reply. Every failure maps to exactly one text.
    pub fn fallback_text(&self) -> String {
        match self {
            ExchangeError::Timeout => TIMEOUT_TEXT.to_string(),
            ExchangeError::Status {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            ExchangeError::Status { status, .. } if *status >= 500 => SERVER_ERROR_TEXT.to_string(),
            _ => UNREACHABLE_TEXT.to_string(),
        }
    }
}

/// Sends one exchange to the remote assistant.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, ExchangeError>;

    /// Same exchange with a file attached (multipart upload).
    async fn chat_with_file(
        &self,
        request: &ChatRequest,
        file: &Path,
    ) -> Result<ChatReply, ExchangeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16, message: Option<&str>) -> ExchangeError {
        ExchangeError::Status {
            status,
            message: message.map(String::from),
        }
    }

    #[test]
    fn timeout_has_its_own_text() {
        assert_eq!(ExchangeError::Timeout.fallback_text(), TIMEOUT_TEXT);
    }

    #[test]
    fn server_error_surfaces_error_field() {
        assert_eq!(
            status(500, Some("vector store unavailable")).fallback_text(),
            "vector store unavailable"
        );
        assert_eq!(
            status(400, Some("No input data provided")).fallback_text(),
            "No input data provided"
        );
    }

    #[test]
    fn server_error_without_field_is_generic() {
        assert_eq!(status(500, None).fallback_text(), SERVER_ERROR_TEXT);
        assert_eq!(status(502, Some("  ")).fallback_text(), SERVER_ERROR_TEXT);
    }

    #[test]
    fn everything_else_is_unreachable() {
        assert_eq!(status(404, None).fallback_text(), UNREACHABLE_TEXT);
        assert_eq!(
            ExchangeError::Malformed("missing field `output`".into()).fallback_text(),
            UNREACHABLE_TEXT
        );
        let io = ExchangeError::Attachment {
            path: PathBuf::from("/missing.pdf"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(io.fallback_text(), UNREACHABLE_TEXT);
    }

    #[test]
    fn request_serializes_snake_case_session_id() {
        let req = ChatRequest {
            input: "Hello".into(),
            session_id: "aB3dE6gH9j".into(),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({ "input": "Hello", "session_id": "aB3dE6gH9j" })
        );
    }

    #[test]
    fn reply_file_info_is_optional() {
        let reply: ChatReply = serde_json::from_str(r#"{"output":"Hi there"}"#).unwrap();
        assert_eq!(reply.output, "Hi there");
        assert!(reply.file_info.is_none());

        let reply: ChatReply = serde_json::from_str(
            r#"{"output":"A cat.","file_info":{"filename":"cat.png","content_type":"image","processed":true}}"#,
        )
        .unwrap();
        assert_eq!(reply.file_info.unwrap().content_type, "image");
    }

    #[test]
    fn uploadable_extensions() {
        assert!(is_uploadable(Path::new("report.PDF")));
        assert!(is_uploadable(Path::new("/tmp/photo.jpeg")));
        assert!(!is_uploadable(Path::new("archive.zip")));
        assert!(!is_uploadable(Path::new("README")));
    }
}
