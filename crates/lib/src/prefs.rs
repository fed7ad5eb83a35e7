//! Local preferences: a small JSON key-value file of bool and string values.
//!
//! Loaded once at start; every change is written through to disk.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

pub struct Prefs {
    path: PathBuf,
    values: RwLock<Map<String, Value>>,
}

impl Prefs {
    /// Load from path; a missing or unreadable file starts empty.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match tokio::fs::read_to_string(&path).await {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                log::warn!("ignoring unreadable prefs {}: {}", path.display(), e);
                Map::new()
            }),
            Err(_) => Map::new(),
        };
        Self {
            path,
            values: RwLock::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.read().await.get(key).and_then(Value::as_bool)
    }

    pub async fn get_string(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .await
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.update(|values| {
            values.insert(key.to_string(), Value::Bool(value));
        })
        .await
    }

    pub async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.update(|values| {
            values.insert(key.to_string(), Value::String(value.to_string()));
        })
        .await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.update(|values| {
            values.remove(key);
        })
        .await
    }

    async fn update(&self, change: impl FnOnce(&mut Map<String, Value>)) -> Result<()> {
        let mut values = self.values.write().await;
        change(&mut values);
        let json = serde_json::to_string_pretty(&*values)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("writing prefs to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_prefs_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("chatbot-prefs-{}", uuid::Uuid::new_v4()))
            .join("prefs.json")
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let prefs = Prefs::load(temp_prefs_path()).await;
        assert_eq!(prefs.get_bool("isLoggedIn").await, None);
        assert_eq!(prefs.get_string("userEmail").await, None);
    }

    #[tokio::test]
    async fn changes_are_written_through() {
        let path = temp_prefs_path();
        let prefs = Prefs::load(&path).await;
        prefs.set_bool("isLoggedIn", true).await.unwrap();
        prefs.set_string("userEmail", "ada@example.com").await.unwrap();

        let reloaded = Prefs::load(&path).await;
        assert_eq!(reloaded.get_bool("isLoggedIn").await, Some(true));
        assert_eq!(
            reloaded.get_string("userEmail").await.as_deref(),
            Some("ada@example.com")
        );

        reloaded.remove("userEmail").await.unwrap();
        let again = Prefs::load(&path).await;
        assert_eq!(again.get_string("userEmail").await, None);
        assert_eq!(again.get_bool("isLoggedIn").await, Some(true));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn wrong_type_reads_as_missing() {
        let path = temp_prefs_path();
        let prefs = Prefs::load(&path).await;
        prefs.set_string("isLoggedIn", "yes").await.unwrap();
        assert_eq!(prefs.get_bool("isLoggedIn").await, None);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let path = temp_prefs_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();
        let prefs = Prefs::load(&path).await;
        assert_eq!(prefs.get_bool("isLoggedIn").await, None);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
