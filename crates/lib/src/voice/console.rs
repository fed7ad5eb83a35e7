//! Speech engine fed by typed lines, for terminals without a microphone.
//!
//! While a listen session is active, each non-blank line is "heard" and extends the partial
//! transcript; a blank line ends the utterance and emits it as the final transcript. A blank
//! line before anything was heard is swallowed and the session keeps listening.

use super::{ListenOptions, SpeechEngine, SpeechEvent, VoiceError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

struct Utterance {
    tx: mpsc::Sender<SpeechEvent>,
    heard: Vec<String>,
    partial_results: bool,
}

#[derive(Default)]
pub struct ConsoleSpeechEngine {
    listening: AtomicBool,
    active: Mutex<Option<Utterance>>,
}

impl ConsoleSpeechEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn active(&self) -> MutexGuard<'_, Option<Utterance>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Feed one typed line. Returns false when no session is listening, so the caller can
    /// treat the line as ordinary input.
    pub fn push_line(&self, line: &str) -> bool {
        let mut active = self.active();
        let Some(utterance) = active.as_mut() else {
            return false;
        };
        let line = line.trim();
        if line.is_empty() {
            if utterance.heard.is_empty() {
                return true;
            }
            let text = utterance.heard.join(" ");
            let _ = utterance.tx.try_send(SpeechEvent::Final(text));
            *active = None;
            self.listening.store(false, Ordering::SeqCst);
            return true;
        }
        utterance.heard.push(line.to_string());
        if utterance.partial_results {
            let _ = utterance
                .tx
                .try_send(SpeechEvent::Partial(utterance.heard.join(" ")));
        }
        true
    }
}

#[async_trait]
impl SpeechEngine for ConsoleSpeechEngine {
    async fn initialize(&self) -> Result<(), VoiceError> {
        log::debug!("console speech engine ready");
        Ok(())
    }

    async fn listen(
        &self,
        options: ListenOptions,
    ) -> Result<mpsc::Receiver<SpeechEvent>, VoiceError> {
        let (tx, rx) = mpsc::channel(32);
        let _ = tx.try_send(SpeechEvent::Status("listening".to_string()));
        *self.active() = Some(Utterance {
            tx,
            heard: Vec::new(),
            partial_results: options.partial_results,
        });
        self.listening.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    fn stop(&self) {
        *self.active() = None;
        self.listening.store(false, Ordering::SeqCst);
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }
}
