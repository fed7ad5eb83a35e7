use chatbot::attachments::{GoogleDriveClient, PathPicker, Picker, StaticToken};
use chatbot::auth::{self, EmailIdentity, LoginStore};
use chatbot::config::{self, Config};
use chatbot::controller::{ChatController, ChatEvent, ChatHandle, SubmitOutcome};
use chatbot::prefs::Prefs;
use chatbot::voice::{
    CaptureOutcome, CommandPlayer, ConsoleSpeechEngine, HttpSynthesizer, ListenMode,
    ListenOptions, Speaker, VoiceCapture, VoiceEvent,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "chatbot")]
#[command(about = "Terminal client for the chatbot endpoint", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: CHATBOT_CONFIG_PATH or ~/.chatbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Sign in with an email address. Prompts when --email is not given; an empty answer cancels.
    Login {
        /// Config file path (default: CHATBOT_CONFIG_PATH or ~/.chatbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Email address to sign in with
        #[arg(long, value_name = "ADDRESS")]
        email: Option<String>,
    },

    /// Sign out and forget the stored email.
    Logout {
        /// Config file path (default: CHATBOT_CONFIG_PATH or ~/.chatbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Show sign-in state and the resolved endpoint.
    Status {
        /// Config file path (default: CHATBOT_CONFIG_PATH or ~/.chatbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Chat with the assistant (interactive). Type /help for commands.
    Chat {
        /// Config file path (default: CHATBOT_CONFIG_PATH or ~/.chatbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("chatbot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Login { config, email }) => {
            if let Err(e) = run_login(config, email).await {
                log::error!("login failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Logout { config }) => {
            if let Err(e) = run_logout(config).await {
                log::error!("logout failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Status { config }) => {
            if let Err(e) = run_status(config).await {
                log::error!("status failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config }) => {
            if let Err(e) = run_chat(config).await {
                log::error!("chat failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(config::default_config_path);
    let dir = chatbot::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn login_store(config_path: Option<PathBuf>) -> anyhow::Result<(Config, LoginStore)> {
    let (config, path) = config::load_config(config_path)?;
    let prefs = Prefs::load(config::prefs_path(&path)).await;
    Ok((config, LoginStore::new(prefs)))
}

async fn prompt_line(prompt: &str) -> anyhow::Result<Option<String>> {
    use std::io::Write;
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    Ok(lines.next_line().await?)
}

async fn run_login(config_path: Option<PathBuf>, email: Option<String>) -> anyhow::Result<()> {
    let (_config, store) = login_store(config_path).await?;
    let email = match email {
        Some(email) => Some(email),
        None => prompt_line("email: ").await?,
    };
    match auth::sign_in(&EmailIdentity::new(email), &store).await {
        Ok(state) => {
            println!(
                "signed in as {}",
                state.user_email.as_deref().unwrap_or("(unknown)")
            );
        }
        Err(notice) => println!("{}", notice),
    }
    Ok(())
}

async fn run_logout(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (_config, store) = login_store(config_path).await?;
    auth::sign_out(&EmailIdentity::new(None), &store).await?;
    println!("signed out");
    Ok(())
}

async fn run_status(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, store) = login_store(config_path).await?;
    let state = store.state().await;
    match state.user_email {
        Some(email) if state.is_logged_in => println!("signed in as {}", email),
        _ if state.is_logged_in => println!("signed in"),
        _ => println!("not signed in"),
    }
    println!("endpoint: {}", config::resolve_endpoint_url(&config));
    println!(
        "spoken replies: {}",
        if speaker(&config).is_some() { "on" } else { "off" }
    );
    Ok(())
}

/// Spoken replies need the setting on, an API key and a player binary.
fn speaker(config: &Config) -> Option<Arc<Speaker>> {
    if !config.voice.speak_replies {
        return None;
    }
    let api_key = config::resolve_tts_api_key(config)?;
    let player = CommandPlayer::from_config(&config.audio)?.with_extension(&config.tts.container);
    let synthesizer = HttpSynthesizer::new(&config.tts, Some(api_key));
    Some(Arc::new(Speaker::new(Arc::new(synthesizer), Arc::new(player))))
}

const HELP: &str = "\
commands:
  /voice            speak (type what you say, blank line to finish)
  /cancel           close the voice dialog
  /attach <path>    attach a local image or file
  /drive            pick from Google Drive
  /onedrive         pick from OneDrive
  /upload <path> [caption]
                    send a file to the assistant
  /menu             toggle the attachment menu
  /new              start a new chat
  /history          print the transcript
  /quit             leave";

fn print_event(event: &ChatEvent) {
    match event {
        ChatEvent::SessionStarted(id) => println!("-- session {} --", id),
        ChatEvent::MessageAppended(message) => {
            let who = if message.is_user { "you" } else { "bot" };
            match (&message.text, &message.image_path) {
                (Some(text), _) => println!("{}: {}", who, text),
                (None, Some(path)) => println!("{}: [file {}]", who, path.display()),
                (None, None) => {}
            }
        }
        ChatEvent::PendingChanged(true) => println!("bot is typing..."),
        ChatEvent::PendingChanged(false) => {}
        ChatEvent::MenuChanged(true) => println!("attach: /attach <path>  /drive  /onedrive"),
        ChatEvent::MenuChanged(false) => {}
        ChatEvent::Notice(notice) => println!("! {}", notice),
    }
}

fn print_voice_event(event: &VoiceEvent) {
    match event {
        VoiceEvent::DialogOpened => println!("[listening: type what you say, blank line to finish]"),
        VoiceEvent::Partial(text) => println!("[heard] {}", text),
        VoiceEvent::DialogClosed(reason) => log::debug!("voice dialog closed: {:?}", reason),
    }
}

fn split_command(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    }
}

async fn run_chat(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, store) = login_store(config_path).await?;
    if !store.state().await.is_logged_in {
        anyhow::bail!("not signed in; run `chatbot login` first");
    }

    let endpoint = config::resolve_endpoint_url(&config);
    let backend = chatbot::endpoint::HttpChatBackend::new(
        endpoint.clone(),
        config.endpoint.receive_timeout(),
    )?;
    let mut controller = ChatController::new(Arc::new(backend))
        .with_receive_timeout(config.endpoint.receive_timeout());
    if let Some(speaker) = speaker(&config) {
        controller = controller.with_speaker(speaker);
    }
    let (handle, controller_task) = controller.spawn();
    log::info!("chatting with {}", endpoint);

    let engine = Arc::new(ConsoleSpeechEngine::new());
    let capture = Arc::new(VoiceCapture::new(
        engine.clone(),
        ListenOptions {
            mode: ListenMode::Confirmation,
            listen_for: config.voice.listen_for(),
            partial_results: config.voice.partial_results,
        },
    ));
    let drive = Arc::new(GoogleDriveClient::new(
        config.drive.base_url.clone(),
        Box::new(StaticToken(config::resolve_drive_token(&config))),
    ));

    let mut chat_events = handle.subscribe();
    let chat_printer = tokio::spawn(async move {
        while let Ok(event) = chat_events.recv().await {
            print_event(&event);
        }
    });
    let mut voice_events = capture.subscribe();
    let voice_printer = tokio::spawn(async move {
        while let Ok(event) = voice_events.recv().await {
            print_voice_event(&event);
        }
    });

    for message in handle.snapshot().await?.messages {
        print_event(&ChatEvent::MessageAppended(message));
    }
    println!("type /help for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if engine.push_line(&line) {
            continue;
        }
        let input = line.trim();
        if !input.starts_with('/') {
            if handle.submit(input, false).await? == SubmitOutcome::Ignored {
                log::debug!("blank input ignored");
            }
            continue;
        }
        let (cmd, rest) = split_command(input);
        match cmd {
            "/quit" | "/exit" => break,
            "/help" => println!("{}", HELP),
            "/new" => {
                handle.new_chat().await?;
            }
            "/voice" => spawn_capture(capture.clone(), handle.clone()),
            "/cancel" => capture.dismiss(),
            "/menu" => {
                handle.toggle_menu().await?;
            }
            "/attach" => {
                let path = (!rest.is_empty()).then(|| PathBuf::from(rest));
                let picker = Picker::Local(Arc::new(PathPicker::new(path)));
                handle.attach(&picker).await?;
            }
            "/drive" => {
                handle.attach(&Picker::CloudDrive(drive.clone())).await?;
            }
            "/onedrive" => {
                handle.attach(&Picker::one_drive()).await?;
            }
            "/upload" => {
                let (path, caption) = split_command(rest);
                if path.is_empty() {
                    println!("usage: /upload <path> [caption]");
                } else {
                    handle.submit_file(path, caption).await?;
                }
            }
            "/history" => {
                let snapshot = handle.snapshot().await?;
                println!("-- session {} --", snapshot.session_id);
                for message in snapshot.messages {
                    print_event(&ChatEvent::MessageAppended(message));
                }
            }
            other => println!("unknown command {}; type /help", other),
        }
    }

    capture.shutdown();
    handle.shutdown().await?;
    let _ = controller_task.await;
    chat_printer.abort();
    voice_printer.abort();
    Ok(())
}

fn spawn_capture(capture: Arc<VoiceCapture>, handle: ChatHandle) {
    tokio::spawn(async move {
        match capture.run(&handle).await {
            CaptureOutcome::Submitted(text) => log::debug!("voice submitted: {}", text),
            CaptureOutcome::NotSent(_) => {
                println!("[voice message not sent: still waiting for a reply]")
            }
            CaptureOutcome::TimedOut => println!("[no speech heard]"),
            CaptureOutcome::Dismissed => println!("[voice cancelled]"),
            CaptureOutcome::AlreadyListening => println!("[already listening]"),
            CaptureOutcome::EngineUnavailable(e) => println!("! voice input unavailable: {}", e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn every_config_flag_documents_its_default() {
        let cli = Cli::command();
        for name in ["init", "login", "logout", "status", "chat"] {
            let sub = cli.find_subcommand(name).unwrap();
            let config = sub
                .get_arguments()
                .find(|a| a.get_id() == "config")
                .unwrap();
            let help = config.get_help().map(|h| h.to_string()).unwrap_or_default();
            assert!(help.contains("CHATBOT_CONFIG_PATH"), "{} --config: {:?}", name, help);
        }
    }
}
