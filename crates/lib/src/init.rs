//! Initialize the configuration directory: create ~/.chatbot and a default config.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with `{}` if missing.
///
/// Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, b"{}")
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_default_config_once() {
        let dir = std::env::temp_dir().join(format!("chatbot-init-test-{}", uuid::Uuid::new_v4()));
        let config_path = dir.join("nested").join("config.json");

        let created = init_config_dir(&config_path).unwrap();
        assert_eq!(created, dir.join("nested"));
        assert_eq!(std::fs::read_to_string(&config_path).unwrap(), "{}");

        std::fs::write(&config_path, r#"{"voice":{"listenSecs":3}}"#).unwrap();
        init_config_dir(&config_path).unwrap();
        assert!(std::fs::read_to_string(&config_path).unwrap().contains("listenSecs"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
