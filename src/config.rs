use crate::catalog::DEFAULT_CATALOG_URL;
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub library_root: Option<PathBuf>,
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,
    #[serde(default = "default_catalog_timeout_secs")]
    pub catalog_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            library_root: None,
            catalog_url: default_catalog_url(),
            catalog_timeout_secs: default_catalog_timeout_secs(),
        }
    }
}

impl AppConfig {
    pub fn load_or_create() -> Result<Self> {
        let base_dir = base_data_dir()?;
        Self::load_or_create_in(&base_dir)
    }

    pub fn load_or_create_in(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).context("create app data dir")?;
        let path = dir.join(CONFIG_FILE);
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read app config")?;
            let config: AppConfig = serde_json::from_str(&raw)
                .with_context(|| format!("parse app config {}", path.display()))?;
            return Ok(config);
        }

        let config = AppConfig::default();
        config.save_in(dir)?;
        Ok(config)
    }

    pub fn save_in(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).context("create app data dir")?;
        let raw = serde_json::to_string_pretty(self).context("serialize app config")?;
        fs::write(dir.join(CONFIG_FILE), raw).context("write app config")?;
        Ok(())
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog_timeout_secs.max(1))
    }
}

fn default_catalog_url() -> String {
    DEFAULT_CATALOG_URL.to_string()
}

fn default_catalog_timeout_secs() -> u64 {
    10
}

fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("manifestsmith"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_load_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load_or_create_in(dir.path()).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(dir.path().join(CONFIG_FILE).exists());
        assert_eq!(config.catalog_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{ "library_root": "/games/steam" }"#,
        )
        .unwrap();
        let config = AppConfig::load_or_create_in(dir.path()).unwrap();
        assert_eq!(config.library_root, Some(PathBuf::from("/games/steam")));
        assert_eq!(config.catalog_url, DEFAULT_CATALOG_URL);
        assert_eq!(config.catalog_timeout_secs, 10);
    }

    #[test]
    fn saved_config_is_reloaded() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig {
            library_root: None,
            catalog_url: "http://localhost/apps.json".to_string(),
            catalog_timeout_secs: 3,
        };
        config.save_in(dir.path()).unwrap();
        assert_eq!(AppConfig::load_or_create_in(dir.path()).unwrap(), config);
    }

    #[test]
    fn broken_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{").unwrap();
        let err = AppConfig::load_or_create_in(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("parse app config"));
    }
}
