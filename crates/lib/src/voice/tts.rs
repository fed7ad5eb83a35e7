//! HTTP text-to-speech client. Posts reply text and gets encoded audio bytes back.

use super::{SpeechSynthesizer, VoiceError};
use crate::config::TtsConfig;
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

pub struct HttpSynthesizer {
    base_url: String,
    model: String,
    encoding: String,
    container: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpSynthesizer {
    pub fn new(config: &TtsConfig, api_key: Option<String>) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            encoding: config.encoding.clone(),
            container: config.container.clone(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    /// POST /v1/speak with the voice model and output format as query parameters.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| VoiceError::Synthesis("no text-to-speech api key configured".into()))?;
        let url = format!("{}/v1/speak", self.base_url);
        let res = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", api_key))
            .query(&[
                ("model", self.model.as_str()),
                ("encoding", self.encoding.as_str()),
                ("container", self.container.as_str()),
            ])
            .json(&SpeakRequest { text })
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Synthesis(format!("{} {}", status, body)));
        }
        let audio = res.bytes().await?;
        if audio.is_empty() {
            return Err(VoiceError::Synthesis("empty audio response".into()));
        }
        Ok(audio.to_vec())
    }
}
