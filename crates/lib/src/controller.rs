//! Chat screen controller.
//!
//! A single task owns the session, the transcript, the pending flag and the attachment menu.
//! Views talk to it through a cloneable [`ChatHandle`] and watch [`ChatEvent`]s.
//!
//! One exchange is in flight per session. Each request carries a [`Ticket`]; a completion whose
//! ticket is not the current in-flight ticket (older request, or a session replaced by
//! "new chat") is dropped.

use crate::attachments::{self, IntakeOutcome, Picker};
use crate::endpoint::{is_uploadable, ChatBackend, ChatReply, ChatRequest, ExchangeError};
use crate::notice::Notice;
use crate::session::{Message, Session, SessionId};
use crate::voice::{Speaker, TranscriptSink};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{self, JoinHandle, JoinSet};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    SessionStarted(SessionId),
    MessageAppended(Message),
    PendingChanged(bool),
    MenuChanged(bool),
    Notice(Notice),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatSnapshot {
    pub session_id: SessionId,
    pub messages: Vec<Message>,
    pub pending: bool,
    pub menu_open: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// User message appended and request issued.
    Sent,
    /// Blank input; nothing happened.
    Ignored,
    /// A reply is still pending; nothing appended.
    Busy,
    /// File type the endpoint does not accept.
    Unsupported,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat controller has shut down")]
    Closed,
}

/// Identifies one request: the session it was issued in and its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Ticket {
    session: SessionId,
    seq: u64,
}

struct Completion {
    ticket: Ticket,
    voice: bool,
    result: Result<ChatReply, ExchangeError>,
}

#[derive(Debug, Clone, Copy)]
enum MenuOp {
    Open,
    Close,
    Toggle,
}

enum Command {
    Submit {
        text: String,
        voice: bool,
        ack: oneshot::Sender<SubmitOutcome>,
    },
    SubmitFile {
        path: PathBuf,
        caption: String,
        ack: oneshot::Sender<SubmitOutcome>,
    },
    NewChat {
        ack: oneshot::Sender<SessionId>,
    },
    Append {
        message: Message,
        ack: oneshot::Sender<()>,
    },
    Notify {
        notice: Notice,
        ack: oneshot::Sender<()>,
    },
    Menu {
        op: MenuOp,
        ack: oneshot::Sender<bool>,
    },
    Snapshot {
        ack: oneshot::Sender<ChatSnapshot>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Builder for the controller task.
pub struct ChatController {
    backend: Arc<dyn ChatBackend>,
    speaker: Option<Arc<Speaker>>,
    receive_timeout: Duration,
}

impl ChatController {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            speaker: None,
            receive_timeout: Duration::from_secs(30),
        }
    }

    /// Read voice-initiated replies aloud.
    pub fn with_speaker(mut self, speaker: Arc<Speaker>) -> Self {
        self.speaker = Some(speaker);
        self
    }

    /// Upper bound on one exchange; after it the timeout fallback is shown.
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Start a session and spawn the controller task. The task ends on `shutdown` or when
    /// every handle is dropped.
    pub fn spawn(self) -> (ChatHandle, JoinHandle<()>) {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let state = ChatState {
            backend: self.backend,
            speaker: self.speaker,
            receive_timeout: self.receive_timeout,
            events: events.clone(),
            session: Session::start(),
            in_flight: None,
            in_flight_task: None,
            next_seq: 0,
            menu_open: false,
            exchanges: JoinSet::new(),
            playback: JoinSet::new(),
        };
        let task = tokio::spawn(state.run(rx));
        (ChatHandle { commands, events }, task)
    }
}

struct ChatState {
    backend: Arc<dyn ChatBackend>,
    speaker: Option<Arc<Speaker>>,
    receive_timeout: Duration,
    events: broadcast::Sender<ChatEvent>,
    session: Session,
    in_flight: Option<Ticket>,
    /// Task running the in-flight exchange; a panic in any other task is not ours to answer.
    in_flight_task: Option<task::Id>,
    next_seq: u64,
    menu_open: bool,
    exchanges: JoinSet<Completion>,
    playback: JoinSet<()>,
}

impl ChatState {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.emit(ChatEvent::SessionStarted(self.session.id().clone()));
        let mut shutdown_ack = None;
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Shutdown { ack }) => {
                        shutdown_ack = Some(ack);
                        break;
                    }
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                Some(joined) = self.exchanges.join_next(), if !self.exchanges.is_empty() => match joined {
                    Ok(done) => self.complete(done),
                    Err(e) if e.is_cancelled() => log::debug!("exchange task cancelled"),
                    Err(e) => {
                        log::warn!("exchange task failed: {}", e);
                        if self.in_flight_task == Some(e.id()) {
                            self.in_flight = None;
                            self.in_flight_task = None;
                            self.append(Message::assistant(crate::endpoint::UNREACHABLE_TEXT));
                            self.emit(ChatEvent::PendingChanged(false));
                        }
                    }
                },
                Some(joined) = self.playback.join_next(), if !self.playback.is_empty() => {
                    if let Err(e) = joined {
                        if !e.is_cancelled() {
                            log::warn!("playback task failed: {}", e);
                        }
                    }
                }
            }
        }
        self.teardown().await;
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Submit { text, voice, ack } => {
                let outcome = self.submit(&text, voice);
                let _ = ack.send(outcome);
            }
            Command::SubmitFile { path, caption, ack } => {
                let outcome = self.submit_file(path, caption);
                let _ = ack.send(outcome);
            }
            Command::NewChat { ack } => {
                let id = self.new_chat();
                let _ = ack.send(id);
            }
            Command::Append { message, ack } => {
                self.append(message);
                let _ = ack.send(());
            }
            Command::Notify { notice, ack } => {
                self.emit(ChatEvent::Notice(notice));
                let _ = ack.send(());
            }
            Command::Menu { op, ack } => {
                let open = self.menu(op);
                let _ = ack.send(open);
            }
            Command::Snapshot { ack } => {
                let _ = ack.send(self.snapshot());
            }
            Command::Shutdown { ack } => {
                let _ = ack.send(());
            }
        }
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    fn append(&mut self, message: Message) {
        self.session.push(message.clone());
        self.emit(ChatEvent::MessageAppended(message));
    }

    fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            session_id: self.session.id().clone(),
            messages: self.session.messages().to_vec(),
            pending: self.in_flight.is_some(),
            menu_open: self.menu_open,
        }
    }

    /// Claim the in-flight slot. Returns None (and tells the user) when a reply is pending.
    fn issue(&mut self) -> Option<Ticket> {
        if self.in_flight.is_some() {
            log::debug!("submission rejected, reply pending");
            self.emit(ChatEvent::Notice(Notice::ReplyPending));
            return None;
        }
        self.next_seq += 1;
        let ticket = Ticket {
            session: self.session.id().clone(),
            seq: self.next_seq,
        };
        self.in_flight = Some(ticket.clone());
        Some(ticket)
    }

    fn submit(&mut self, text: &str, voice: bool) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SubmitOutcome::Ignored;
        }
        let Some(ticket) = self.issue() else {
            return SubmitOutcome::Busy;
        };
        self.append(Message::user(text));
        self.emit(ChatEvent::PendingChanged(true));

        let request = ChatRequest {
            input: text.to_string(),
            session_id: ticket.session.to_string(),
        };
        log::debug!("issuing exchange {} for session {}", ticket.seq, ticket.session);
        let backend = self.backend.clone();
        let limit = self.receive_timeout;
        let exchange = self.exchanges.spawn(async move {
            let result = match tokio::time::timeout(limit, backend.chat(&request)).await {
                Ok(result) => result,
                Err(_) => Err(ExchangeError::Timeout),
            };
            Completion {
                ticket,
                voice,
                result,
            }
        });
        self.in_flight_task = Some(exchange.id());
        SubmitOutcome::Sent
    }

    fn submit_file(&mut self, path: PathBuf, caption: String) -> SubmitOutcome {
        if !is_uploadable(&path) {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            self.emit(ChatEvent::Notice(Notice::UnsupportedFile(name)));
            return SubmitOutcome::Unsupported;
        }
        let Some(ticket) = self.issue() else {
            return SubmitOutcome::Busy;
        };
        self.append(Message::image(path.clone()));
        self.emit(ChatEvent::PendingChanged(true));

        let request = ChatRequest {
            input: caption.trim().to_string(),
            session_id: ticket.session.to_string(),
        };
        log::debug!(
            "issuing upload exchange {} for session {}: {}",
            ticket.seq,
            ticket.session,
            path.display()
        );
        let backend = self.backend.clone();
        let limit = self.receive_timeout;
        let exchange = self.exchanges.spawn(async move {
            let result =
                match tokio::time::timeout(limit, backend.chat_with_file(&request, &path)).await {
                    Ok(result) => result,
                    Err(_) => Err(ExchangeError::Timeout),
                };
            Completion {
                ticket,
                voice: false,
                result,
            }
        });
        self.in_flight_task = Some(exchange.id());
        SubmitOutcome::Sent
    }

    fn complete(&mut self, done: Completion) {
        if self.in_flight.as_ref() != Some(&done.ticket) {
            log::debug!(
                "discarding stale reply {} for session {}",
                done.ticket.seq,
                done.ticket.session
            );
            return;
        }
        self.in_flight = None;
        self.in_flight_task = None;
        match done.result {
            Ok(reply) => {
                log::debug!("exchange {} completed", done.ticket.seq);
                if let Some(info) = &reply.file_info {
                    log::debug!(
                        "server received {} ({}, processed: {})",
                        info.filename,
                        info.content_type,
                        info.processed
                    );
                }
                self.append(Message::assistant(reply.output.clone()));
                if done.voice {
                    self.speak(reply.output);
                }
            }
            Err(e) => {
                log::warn!("exchange {} failed, showing fallback: {}", done.ticket.seq, e);
                self.append(Message::assistant(e.fallback_text()));
            }
        }
        self.emit(ChatEvent::PendingChanged(false));
    }

    /// Playback runs on its own task; failures only get logged.
    fn speak(&mut self, text: String) {
        let Some(speaker) = self.speaker.clone() else {
            return;
        };
        self.playback.spawn(async move {
            if let Err(e) = speaker.speak(&text).await {
                log::warn!("voice reply playback failed: {}", e);
            }
        });
    }

    fn new_chat(&mut self) -> SessionId {
        self.exchanges.abort_all();
        let was_pending = self.in_flight.take().is_some();
        self.in_flight_task = None;
        self.session = Session::start();
        let id = self.session.id().clone();
        self.emit(ChatEvent::SessionStarted(id.clone()));
        if was_pending {
            self.emit(ChatEvent::PendingChanged(false));
        }
        id
    }

    fn menu(&mut self, op: MenuOp) -> bool {
        let open = match op {
            MenuOp::Open => true,
            MenuOp::Close => false,
            MenuOp::Toggle => !self.menu_open,
        };
        if open != self.menu_open {
            self.menu_open = open;
            self.emit(ChatEvent::MenuChanged(open));
        }
        open
    }

    async fn teardown(&mut self) {
        self.exchanges.abort_all();
        self.playback.abort_all();
        self.menu_open = false;
        if let Some(speaker) = &self.speaker {
            speaker.release().await;
        }
        log::debug!("chat controller for session {} stopped", self.session.id());
    }
}

/// Cloneable view-side handle to the controller task.
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<ChatEvent>,
}

impl ChatHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ChatError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| ChatError::Closed)?;
        rx.await.map_err(|_| ChatError::Closed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Send a typed (`voice = false`) or spoken (`voice = true`) message.
    pub async fn submit(
        &self,
        text: impl Into<String>,
        voice: bool,
    ) -> Result<SubmitOutcome, ChatError> {
        let text = text.into();
        self.request(|ack| Command::Submit { text, voice, ack }).await
    }

    /// Upload a file with an optional caption.
    pub async fn submit_file(
        &self,
        path: impl Into<PathBuf>,
        caption: impl Into<String>,
    ) -> Result<SubmitOutcome, ChatError> {
        let path = path.into();
        let caption = caption.into();
        self.request(|ack| Command::SubmitFile { path, caption, ack })
            .await
    }

    /// Replace the session; any pending reply is discarded.
    pub async fn new_chat(&self) -> Result<SessionId, ChatError> {
        self.request(|ack| Command::NewChat { ack }).await
    }

    /// Close the menu and run one pick. The pick itself runs on the caller's task.
    pub async fn attach(&self, picker: &Picker) -> Result<IntakeOutcome, ChatError> {
        self.close_menu().await?;
        let outcome = attachments::pick(picker).await;
        match &outcome {
            IntakeOutcome::Append(message) => {
                let message = message.clone();
                self.request(|ack| Command::Append { message, ack }).await?;
            }
            IntakeOutcome::Notice(notice) => {
                let notice = notice.clone();
                self.request(|ack| Command::Notify { notice, ack }).await?;
            }
            IntakeOutcome::Cancelled => log::debug!("{} pick cancelled", picker.name()),
        }
        Ok(outcome)
    }

    pub async fn open_menu(&self) -> Result<bool, ChatError> {
        self.request(|ack| Command::Menu {
            op: MenuOp::Open,
            ack,
        })
        .await
    }

    pub async fn close_menu(&self) -> Result<bool, ChatError> {
        self.request(|ack| Command::Menu {
            op: MenuOp::Close,
            ack,
        })
        .await
    }

    /// Returns whether the menu is open afterwards.
    pub async fn toggle_menu(&self) -> Result<bool, ChatError> {
        self.request(|ack| Command::Menu {
            op: MenuOp::Toggle,
            ack,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<ChatSnapshot, ChatError> {
        self.request(|ack| Command::Snapshot { ack }).await
    }

    /// Abort in-flight work, release audio and stop the task.
    pub async fn shutdown(&self) -> Result<(), ChatError> {
        self.request(|ack| Command::Shutdown { ack }).await
    }
}

#[async_trait]
impl TranscriptSink for ChatHandle {
    async fn submit_transcript(&self, text: &str) -> bool {
        match self.submit(text, true).await {
            Ok(SubmitOutcome::Sent) => true,
            Ok(outcome) => {
                log::debug!("voice transcript not sent: {:?}", outcome);
                false
            }
            Err(e) => {
                log::warn!("voice transcript dropped: {}", e);
                false
            }
        }
    }
}
