use std::path::{Path, PathBuf};

use crm_auth::CrmConfig;
use crm_auth::config::env_vars;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

const SETTINGS_FILE: &str = "config.toml";

/// Contents of the optional `config.toml`.
///
/// Environment variables take precedence over every value here.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `local` or `hosted`
    pub deployment: Option<String>,
    pub auth_url: Option<String>,
    pub api_url: Option<String>,
}

impl Settings {
    /// Platform location of the settings file
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let proj_dirs = ProjectDirs::from("", "", "crm-client")
            .ok_or(SettingsError::ProjectDirectoriesUnavailable)?;
        Ok(proj_dirs.config_dir().join(SETTINGS_FILE))
    }

    /// Read settings; a missing file yields the defaults
    #[instrument(level = "debug")]
    pub async fn load(path: &Path) -> Result<Self, SettingsError> {
        if tokio::fs::metadata(path).await.is_err() {
            debug!("No settings file at {}", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            SettingsError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            }
        })?;

        let settings = toml::from_str(&content).map_err(|e| SettingsError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    fn value_for(&self, key: &str) -> Option<String> {
        match key {
            env_vars::DEPLOYMENT => self.deployment.clone(),
            env_vars::AUTH_URL => self.auth_url.clone(),
            env_vars::API_URL => self.api_url.clone(),
            _ => None,
        }
    }

    /// Layer `env` over these settings over the built-in defaults
    pub fn resolve<F>(&self, env: F) -> crm_auth::Result<CrmConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        CrmConfig::from_lookup(|key| env(key).or_else(|| self.value_for(key)))
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Project directories are unavailable (unsupported OS or missing home directory)")]
    ProjectDirectoriesUnavailable,

    #[error("Failed to read settings file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file '{path}': {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
