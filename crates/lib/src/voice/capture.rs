//! Bounded-duration voice capture.
//!
//! Lifecycle: Idle -> Listening -> (Finalizing | TimedOut) -> Idle.
//! - Start while Listening is a no-op.
//! - Engine init is lazy and memoized on success; a failed init aborts to Idle with no dialog.
//! - A final, non-empty transcript and the listen timer race; the capture dialog's close guard
//!   lets exactly one of them act. The loser observes the dialog already closed and does nothing.
//! - Closing the dialog (finalize, timeout, dismissal or drop) always stops the engine if it is
//!   still listening and clears the listening state.

use super::{ListenOptions, SpeechEngine, SpeechEvent, TranscriptSink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{broadcast, watch, Notify, OnceCell};

/// What the capture dialog shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceCaptureState {
    pub is_listening: bool,
    pub partial_transcript: String,
    pub finalized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Finalized,
    TimedOut,
    Dismissed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    DialogOpened,
    Partial(String),
    DialogClosed(CloseReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Final transcript handed to the sink.
    Submitted(String),
    /// Final transcript the sink did not take, e.g. because a reply was still pending.
    NotSent(String),
    TimedOut,
    Dismissed,
    AlreadyListening,
    EngineUnavailable(String),
}

pub struct VoiceCapture {
    engine: Arc<dyn SpeechEngine>,
    options: ListenOptions,
    ready: OnceCell<()>,
    listening: AtomicBool,
    dismissed: AtomicBool,
    dismiss: Notify,
    state: watch::Sender<VoiceCaptureState>,
    events: broadcast::Sender<VoiceEvent>,
}

/// Clears the listening flag on every exit path of [`VoiceCapture::run`].
struct ListeningFlag<'a>(&'a AtomicBool);

impl Drop for ListeningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One open capture dialog. `close` acts at most once; dropping the dialog closes it.
struct CaptureDialog<'a> {
    capture: &'a VoiceCapture,
    closed: OnceLock<CloseReason>,
}

impl<'a> CaptureDialog<'a> {
    fn open(capture: &'a VoiceCapture) -> Self {
        capture.state.send_replace(VoiceCaptureState {
            is_listening: true,
            ..Default::default()
        });
        let _ = capture.events.send(VoiceEvent::DialogOpened);
        Self {
            capture,
            closed: OnceLock::new(),
        }
    }

    /// First caller wins and runs cleanup; later callers get false.
    fn close(&self, reason: CloseReason) -> bool {
        if self.closed.set(reason).is_err() {
            return false;
        }
        if self.capture.engine.is_listening() {
            self.capture.engine.stop();
        }
        self.capture.state.send_modify(|s| s.is_listening = false);
        let _ = self.capture.events.send(VoiceEvent::DialogClosed(reason));
        log::debug!("voice capture dialog closed: {:?}", reason);
        true
    }
}

impl Drop for CaptureDialog<'_> {
    fn drop(&mut self) {
        self.close(CloseReason::Dismissed);
    }
}

impl VoiceCapture {
    pub fn new(engine: Arc<dyn SpeechEngine>, options: ListenOptions) -> Self {
        let (state, _) = watch::channel(VoiceCaptureState::default());
        let (events, _) = broadcast::channel(64);
        Self {
            engine,
            options,
            ready: OnceCell::new(),
            listening: AtomicBool::new(false),
            dismissed: AtomicBool::new(false),
            dismiss: Notify::new(),
            state,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VoiceEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> VoiceCaptureState {
        self.state.borrow().clone()
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// User closed the dialog. No-op when nothing is listening.
    pub fn dismiss(&self) {
        if self.is_listening() {
            self.dismissed.store(true, Ordering::SeqCst);
            self.dismiss.notify_one();
        }
    }

    /// Screen teardown: close any open dialog and make sure the engine is stopped.
    pub fn shutdown(&self) {
        self.dismiss();
        if self.engine.is_listening() {
            self.engine.stop();
        }
    }

    /// Run one capture to completion. A final transcript is handed to `sink` exactly once.
    pub async fn run(&self, sink: &dyn TranscriptSink) -> CaptureOutcome {
        if self.listening.swap(true, Ordering::SeqCst) {
            log::debug!("voice capture already listening, ignoring start");
            return CaptureOutcome::AlreadyListening;
        }
        let _flag = ListeningFlag(&self.listening);
        self.dismissed.store(false, Ordering::SeqCst);

        if let Err(e) = self.ready.get_or_try_init(|| self.engine.initialize()).await {
            log::warn!("speech engine initialization failed: {}", e);
            return CaptureOutcome::EngineUnavailable(e.to_string());
        }
        let mut speech = match self.engine.listen(self.options).await {
            Ok(rx) => rx,
            Err(e) => {
                log::warn!("speech engine failed to start listening: {}", e);
                return CaptureOutcome::EngineUnavailable(e.to_string());
            }
        };

        let dialog = CaptureDialog::open(self);
        let timer = tokio::time::sleep(self.options.listen_for);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = &mut timer => {
                    dialog.close(CloseReason::TimedOut);
                    return CaptureOutcome::TimedOut;
                }
                _ = self.dismiss.notified() => {
                    if self.dismissed.swap(false, Ordering::SeqCst) {
                        dialog.close(CloseReason::Dismissed);
                        return CaptureOutcome::Dismissed;
                    }
                }
                event = speech.recv() => match event {
                    Some(SpeechEvent::Partial(text)) => {
                        self.state.send_modify(|s| s.partial_transcript = text.clone());
                        let _ = self.events.send(VoiceEvent::Partial(text));
                    }
                    Some(SpeechEvent::Final(text)) => {
                        let text = text.trim().to_string();
                        if text.is_empty() {
                            continue;
                        }
                        self.state.send_modify(|s| {
                            s.partial_transcript = text.clone();
                            s.finalized = true;
                        });
                        dialog.close(CloseReason::Finalized);
                        if sink.submit_transcript(&text).await {
                            return CaptureOutcome::Submitted(text);
                        }
                        log::debug!("voice transcript was not taken");
                        return CaptureOutcome::NotSent(text);
                    }
                    Some(SpeechEvent::Status(status)) => log::debug!("speech status: {}", status),
                    Some(SpeechEvent::Error(e)) => log::warn!("speech error: {}", e),
                    None => {
                        log::debug!("speech engine ended without a transcript");
                        dialog.close(CloseReason::TimedOut);
                        return CaptureOutcome::TimedOut;
                    }
                }
            }
        }
    }
}
