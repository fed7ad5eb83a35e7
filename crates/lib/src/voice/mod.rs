//! Voice input and output.
//!
//! Input: a speech-to-text engine streams partial and final transcripts into a bounded
//! listen session ([`VoiceCapture`]). Output: a synthesizer turns reply text into audio bytes
//! and an audio sink plays them ([`Speaker`]).

mod capture;
mod console;
mod player;
mod tts;

pub use capture::{CaptureOutcome, CloseReason, VoiceCapture, VoiceCaptureState, VoiceEvent};
pub use console::ConsoleSpeechEngine;
pub use player::CommandPlayer;
pub use tts::HttpSynthesizer;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("speech engine unavailable: {0}")]
    Unavailable(String),
    #[error("speech engine error: {0}")]
    Engine(String),
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
    #[error("speech request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("audio playback failed: {0}")]
    Playback(String),
    #[error("audio io: {0}")]
    Io(#[from] std::io::Error),
}

/// Callback from the speech engine during a listen session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// Incremental transcript; may be revised by later events.
    Partial(String),
    Final(String),
    Status(String),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenMode {
    /// Short utterance, engine ends on a pause.
    #[default]
    Confirmation,
    Dictation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenOptions {
    pub mode: ListenMode,
    pub listen_for: Duration,
    pub partial_results: bool,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            mode: ListenMode::Confirmation,
            listen_for: Duration::from_secs(10),
            partial_results: true,
        }
    }
}

/// Speech-to-text engine.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Prepare the engine (permissions, model load). Called once per successful init.
    async fn initialize(&self) -> Result<(), VoiceError>;
    /// Begin a listen session; events arrive on the returned channel until stopped.
    async fn listen(&self, options: ListenOptions) -> Result<mpsc::Receiver<SpeechEvent>, VoiceError>;
    fn stop(&self);
    fn is_listening(&self) -> bool;
}

/// Text-to-speech: reply text in, encoded audio bytes out.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError>;
}

/// Local audio output.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, audio: &[u8]) -> Result<(), VoiceError>;
    /// Stop any active playback and free playback resources.
    async fn release(&self);
}

/// Receives the finalized transcript of a capture. Returns false when the transcript was
/// not taken (e.g. a reply is still pending).
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn submit_transcript(&self, text: &str) -> bool;
}

/// Reads reply text aloud.
pub struct Speaker {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
}

impl Speaker {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, sink: Arc<dyn AudioSink>) -> Self {
        Self { synthesizer, sink }
    }

    pub async fn speak(&self, text: &str) -> Result<(), VoiceError> {
        let audio = self.synthesizer.synthesize(text).await?;
        log::debug!("playing {} bytes of synthesized audio", audio.len());
        self.sink.play(&audio).await
    }

    pub async fn release(&self) {
        self.sink.release().await;
    }
}
