//! Attachment intake: local file/gallery picking and cloud drive picking.
//!
//! Each provider is a [`Picker`] variant carrying its capability, so adding a provider is a
//! variant addition. Intake produces a transcript entry, a notice, or nothing.

mod drive;

pub use drive::{
    AccessTokenSource, DriveError, DriveFile, DriveFiles, GoogleDriveClient, StaticToken,
    DRIVE_FIELDS, DRIVE_QUERY,
};

use crate::notice::Notice;
use crate::session::Message;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// OS-level file or gallery picker. `Ok(None)` means the user cancelled.
#[async_trait]
pub trait FilePicker: Send + Sync {
    async fn pick_file(&self) -> Result<Option<PathBuf>, String>;
}

/// A path already chosen in the view (e.g. typed at the prompt). Must point at an existing file.
pub struct PathPicker {
    path: Option<PathBuf>,
}

impl PathPicker {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl FilePicker for PathPicker {
    async fn pick_file(&self) -> Result<Option<PathBuf>, String> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(Some(path.clone())),
            Ok(_) => Err(format!("{} is not a file", path.display())),
            Err(e) => Err(format!("{}: {}", path.display(), e)),
        }
    }
}

#[derive(Clone)]
pub enum Picker {
    Local(Arc<dyn FilePicker>),
    CloudDrive(Arc<dyn DriveFiles>),
    Unimplemented(String),
}

impl Picker {
    pub fn one_drive() -> Self {
        Picker::Unimplemented("OneDrive".to_string())
    }

    pub fn name(&self) -> &str {
        match self {
            Picker::Local(_) => "local",
            Picker::CloudDrive(_) => "Google Drive",
            Picker::Unimplemented(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    Append(Message),
    Notice(Notice),
    Cancelled,
}

/// Transcript text for a file picked from the drive.
pub fn drive_summary(file: &DriveFile) -> String {
    match &file.web_view_link {
        Some(link) => format!("Picked from Google Drive: {}\n{}", file.name, link),
        None => format!("Picked from Google Drive: {}", file.name),
    }
}

/// Run one pick. Never fails; errors become notices.
pub async fn pick(picker: &Picker) -> IntakeOutcome {
    match picker {
        Picker::Local(local) => match local.pick_file().await {
            Ok(Some(path)) => IntakeOutcome::Append(Message::image(path)),
            Ok(None) => IntakeOutcome::Cancelled,
            Err(e) => {
                log::warn!("local pick failed: {}", e);
                IntakeOutcome::Notice(Notice::PickFailed(e))
            }
        },
        Picker::CloudDrive(drive) => match drive.list_files().await {
            Ok(files) => match files.first() {
                Some(first) => IntakeOutcome::Append(Message::user(drive_summary(first))),
                None => IntakeOutcome::Notice(Notice::NoFilesFound),
            },
            Err(e) => {
                log::warn!("drive pick failed: {}", e);
                IntakeOutcome::Notice(Notice::PickFailed(e.to_string()))
            }
        },
        Picker::Unimplemented(name) => IntakeOutcome::Notice(Notice::NotImplemented(name.clone())),
    }
}
