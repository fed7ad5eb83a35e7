//! Google Drive file listing (read-only scope): PDFs and images.

use async_trait::async_trait;
use serde::Deserialize;

/// Listing filter: PDFs and any image type.
pub const DRIVE_QUERY: &str = "mimeType='application/pdf' or mimeType contains 'image/'";
/// Fields requested per file.
pub const DRIVE_FIELDS: &str = "files(id,name,mimeType,webViewLink,thumbnailLink)";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub web_view_link: Option<String>,
    #[serde(default)]
    pub thumbnail_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("drive authentication failed: {0}")]
    Auth(String),
    #[error("drive request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("drive api error: {0}")]
    Api(String),
}

/// Lists candidate files from a cloud drive.
#[async_trait]
pub trait DriveFiles: Send + Sync {
    async fn list_files(&self) -> Result<Vec<DriveFile>, DriveError>;
}

/// Supplies an OAuth access token for the drive API.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, DriveError>;
}

/// Token taken from config or environment; None means the user never authorized drive access.
pub struct StaticToken(pub Option<String>);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, DriveError> {
        self.0
            .clone()
            .ok_or_else(|| DriveError::Auth("no drive access token configured".to_string()))
    }
}

/// Client for the Drive v3 `files.list` call.
pub struct GoogleDriveClient {
    base_url: String,
    tokens: Box<dyn AccessTokenSource>,
    client: reqwest::Client,
}

impl GoogleDriveClient {
    pub fn new(base_url: impl Into<String>, tokens: Box<dyn AccessTokenSource>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl DriveFiles for GoogleDriveClient {
    /// GET /drive/v3/files. One round trip, no retry.
    async fn list_files(&self) -> Result<Vec<DriveFile>, DriveError> {
        let token = self.tokens.access_token().await?;
        let url = format!("{}/drive/v3/files", self.base_url);
        let res = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[("q", DRIVE_QUERY), ("fields", DRIVE_FIELDS)])
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(DriveError::Api(format!("{} {}", status, body)));
        }
        let list: FileList = res.json().await?;
        Ok(list.files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_list_parses_camel_case() {
        let list: FileList = serde_json::from_str(
            r#"{"files":[{"id":"1","name":"notes.pdf","mimeType":"application/pdf","webViewLink":"https://drive.example/1"}]}"#,
        )
        .unwrap();
        assert_eq!(list.files.len(), 1);
        assert_eq!(list.files[0].mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(list.files[0].web_view_link.as_deref(), Some("https://drive.example/1"));
        assert!(list.files[0].thumbnail_link.is_none());
    }

    #[test]
    fn empty_listing_has_no_files_key() {
        let list: FileList = serde_json::from_str("{}").unwrap();
        assert!(list.files.is_empty());
    }

    #[tokio::test]
    async fn missing_token_is_an_auth_error() {
        let err = StaticToken(None).access_token().await.unwrap_err();
        assert!(matches!(err, DriveError::Auth(_)));
    }
}
