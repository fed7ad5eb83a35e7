//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.chatbot/config.json`) and environment.
//! Every field has a default so an empty `{}` file is a complete config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Remote chat endpoint.
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Voice capture settings.
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Text-to-speech service used for spoken replies.
    #[serde(default)]
    pub tts: TtsConfig,

    /// Local audio player.
    #[serde(default)]
    pub audio: AudioConfig,

    /// Cloud drive file picking.
    #[serde(default)]
    pub drive: DriveConfig,
}

/// Chat endpoint base URL and receive timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    /// Base URL; `/chat` is appended. Overridden by CHATBOT_ENDPOINT_URL env.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Seconds to wait for a reply before showing the timeout notice (default 30).
    #[serde(default = "default_receive_timeout_secs")]
    pub receive_timeout_secs: u64,
}

fn default_receive_timeout_secs() -> u64 {
    30
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            receive_timeout_secs: default_receive_timeout_secs(),
        }
    }
}

impl EndpointConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs.max(1))
    }
}

/// Voice capture: listen window and whether replies to spoken prompts are read aloud.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    /// Maximum listen duration in seconds (default 10).
    #[serde(default = "default_listen_secs")]
    pub listen_secs: u64,

    /// Ask the engine for partial transcripts (default true).
    #[serde(default = "default_true")]
    pub partial_results: bool,

    /// Speak the assistant reply to a voice prompt (default true). Needs tts.apiKey and audio.player.
    #[serde(default = "default_true")]
    pub speak_replies: bool,
}

fn default_listen_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            listen_secs: default_listen_secs(),
            partial_results: true,
            speak_replies: true,
        }
    }
}

impl VoiceConfig {
    pub fn listen_for(&self) -> Duration {
        Duration::from_secs(self.listen_secs.max(1))
    }
}

/// Text-to-speech request settings: voice model and audio encoding/container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsConfig {
    #[serde(default = "default_tts_base_url")]
    pub base_url: String,
    #[serde(default = "default_tts_model")]
    pub model: String,
    #[serde(default = "default_tts_encoding")]
    pub encoding: String,
    #[serde(default = "default_tts_container")]
    pub container: String,
    /// API key. Overridden by CHATBOT_TTS_API_KEY env.
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_tts_base_url() -> String {
    "https://api.deepgram.com".to_string()
}

fn default_tts_model() -> String {
    "aura-asteria-en".to_string()
}

fn default_tts_encoding() -> String {
    "linear16".to_string()
}

fn default_tts_container() -> String {
    "wav".to_string()
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: default_tts_base_url(),
            model: default_tts_model(),
            encoding: default_tts_encoding(),
            container: default_tts_container(),
            api_key: None,
        }
    }
}

/// Audio player binary used to play synthesized replies (e.g. "aplay", "ffplay").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
    #[serde(default)]
    pub player: Option<String>,
    /// Arguments passed before the audio file path (e.g. ["-nodisp", "-autoexit"] for ffplay).
    #[serde(default)]
    pub player_args: Vec<String>,
}

/// Cloud drive listing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveConfig {
    #[serde(default = "default_drive_base_url")]
    pub base_url: String,
    /// OAuth access token with drive read-only scope. Overridden by CHATBOT_DRIVE_TOKEN env.
    #[serde(default)]
    pub access_token: Option<String>,
}

fn default_drive_base_url() -> String {
    "https://www.googleapis.com".to_string()
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            base_url: default_drive_base_url(),
            access_token: None,
        }
    }
}

const DEFAULT_ENDPOINT_URL: &str = "http://127.0.0.1:5000";

/// Env value wins over the config value; blank values on either side count as unset.
fn env_or_config(var: &str, configured: Option<&String>) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            configured
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the chat endpoint base URL: env CHATBOT_ENDPOINT_URL overrides config.
pub fn resolve_endpoint_url(config: &Config) -> String {
    env_or_config("CHATBOT_ENDPOINT_URL", config.endpoint.base_url.as_ref())
        .unwrap_or_else(|| DEFAULT_ENDPOINT_URL.to_string())
}

/// Resolve the text-to-speech API key: env CHATBOT_TTS_API_KEY overrides config.
pub fn resolve_tts_api_key(config: &Config) -> Option<String> {
    env_or_config("CHATBOT_TTS_API_KEY", config.tts.api_key.as_ref())
}

/// Resolve the drive access token: env CHATBOT_DRIVE_TOKEN overrides config.
pub fn resolve_drive_token(config: &Config) -> Option<String> {
    env_or_config("CHATBOT_DRIVE_TOKEN", config.drive.access_token.as_ref())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("CHATBOT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".chatbot").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Local key-value store lives next to the config file.
pub fn prefs_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join("prefs.json")
}

/// Load config from the given path, or the default path (or CHATBOT_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
