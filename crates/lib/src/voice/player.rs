//! Plays synthesized audio through an external player binary.
//!
//! Audio is written to a scratch file that is removed when playback ends. The player runs as
//! `program args... <file>` with no shell in between.

use super::{AudioSink, VoiceError};
use crate::config::AudioConfig;
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::sync::Notify;

/// Removed on drop.
struct ScratchFile(PathBuf);

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            log::debug!("failed to remove {}: {}", self.0.display(), e);
        }
    }
}

pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
    extension: String,
    scratch_dir: PathBuf,
    stop: Notify,
}

impl CommandPlayer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            extension: "wav".to_string(),
            scratch_dir: std::env::temp_dir(),
            stop: Notify::new(),
        }
    }

    /// None when no player is configured.
    pub fn from_config(config: &AudioConfig) -> Option<Self> {
        let program = config.player.as_deref().map(str::trim).filter(|p| !p.is_empty())?;
        Some(Self::new(program, config.player_args.clone()))
    }

    /// File extension for scratch files, matching the synthesized container format.
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.scratch_dir = dir.as_ref().to_path_buf();
        self
    }

    fn scratch_path(&self) -> PathBuf {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        self.scratch_dir
            .join(format!("chatbot-reply-{}.{}", suffix, self.extension))
    }
}

#[async_trait]
impl AudioSink for CommandPlayer {
    async fn play(&self, audio: &[u8]) -> Result<(), VoiceError> {
        let scratch = ScratchFile(self.scratch_path());
        tokio::fs::write(&scratch.0, audio).await?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&scratch.0)
            .kill_on_drop(true)
            .spawn()?;
        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    Ok(())
                } else {
                    Err(VoiceError::Playback(format!("{} exited with {}", self.program, status)))
                }
            }
            _ = self.stop.notified() => {
                log::debug!("playback stopped");
                if let Err(e) = child.kill().await {
                    log::debug!("failed to kill player: {}", e);
                }
                Ok(())
            }
        }
    }

    async fn release(&self) {
        self.stop.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("chatbot-player-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn leftover_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn unset_or_blank_player_means_no_playback() {
        assert!(CommandPlayer::from_config(&AudioConfig::default()).is_none());
        let blank = AudioConfig {
            player: Some("  ".into()),
            player_args: Vec::new(),
        };
        assert!(CommandPlayer::from_config(&blank).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_playback_removes_scratch_file() {
        let dir = scratch_dir();
        let player = CommandPlayer::new("true", Vec::new()).with_scratch_dir(&dir);
        player.play(b"RIFF").await.unwrap();
        assert_eq!(leftover_files(&dir), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_player_is_a_playback_error() {
        let dir = scratch_dir();
        let player = CommandPlayer::new("false", Vec::new()).with_scratch_dir(&dir);
        let err = player.play(b"RIFF").await.unwrap_err();
        assert!(matches!(err, VoiceError::Playback(_)));
        assert_eq!(leftover_files(&dir), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_player_binary_is_an_io_error() {
        let dir = scratch_dir();
        let player =
            CommandPlayer::new("chatbot-no-such-player", Vec::new()).with_scratch_dir(&dir);
        let err = player.play(b"RIFF").await.unwrap_err();
        assert!(matches!(err, VoiceError::Io(_)));
        assert_eq!(leftover_files(&dir), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn release_stops_active_playback() {
        let dir = scratch_dir();
        let player = CommandPlayer::new(
            "sh",
            vec!["-c".into(), "sleep 5".into(), "player".into()],
        )
        .with_scratch_dir(&dir);

        let started = std::time::Instant::now();
        let (res, _) = tokio::join!(player.play(b"RIFF"), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            player.release().await;
        });
        assert!(res.is_ok());
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(leftover_files(&dir), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
