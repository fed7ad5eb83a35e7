//! HTTP client for the chat endpoint (http://127.0.0.1:5000 by default).

use super::{ChatBackend, ChatReply, ChatRequest, ExchangeError};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Client for `POST /chat`, JSON or multipart.
#[derive(Clone)]
pub struct HttpChatBackend {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

impl HttpChatBackend {
    /// `receive_timeout` bounds the whole request; a timed out request maps to [`ExchangeError::Timeout`].
    pub fn new(base_url: impl Into<String>, receive_timeout: Duration) -> Result<Self, ExchangeError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(receive_timeout)
            .build()
            .map_err(ExchangeError::Request)?;
        Ok(Self { base_url, client })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat", self.base_url)
    }

    async fn decode(res: reqwest::Response) -> Result<ChatReply, ExchangeError> {
        let status = res.status();
        let body = res.bytes().await?;
        if status.is_success() {
            return serde_json::from_slice(&body)
                .map_err(|e| ExchangeError::Malformed(e.to_string()));
        }
        let message = serde_json::from_slice::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error);
        Err(ExchangeError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, ExchangeError> {
        log::debug!("POST {} (session {})", self.chat_url(), request.session_id);
        let res = self.client.post(self.chat_url()).json(request).send().await?;
        Self::decode(res).await
    }

    async fn chat_with_file(
        &self,
        request: &ChatRequest,
        file: &Path,
    ) -> Result<ChatReply, ExchangeError> {
        let bytes = tokio::fs::read(file)
            .await
            .map_err(|source| ExchangeError::Attachment {
                path: file.to_path_buf(),
                source,
            })?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let form = Form::new()
            .text("input", request.input.clone())
            .text("session_id", request.session_id.clone())
            .part("file", Part::bytes(bytes).file_name(file_name));
        log::debug!(
            "POST {} multipart {} (session {})",
            self.chat_url(),
            file.display(),
            request.session_id
        );
        let res = self.client.post(self.chat_url()).multipart(form).send().await?;
        Self::decode(res).await
    }
}
