//! Configuration loader
//!
//! Loads configuration from an optional `.env` file and environment
//! variables, then validates it.

use std::path::Path;

use super::dto::ServerConfigDto;
use super::error::{ConfigError, Result};
use super::validator::validate_server_config;

/// Configuration loader
///
/// Values from the `.env` file are injected into the process environment
/// before the DTO is built, so explicit environment variables set by the
/// operator still win over file contents.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Optional path to a .env file
    env_file_path: Option<std::path::PathBuf>,
}

impl ConfigLoader {
    /// Create a new ConfigLoader
    ///
    /// # Example
    ///
    /// ```
    /// use jobbot_shared::config::ConfigLoader;
    ///
    /// // Without .env file
    /// let loader = ConfigLoader::new(None);
    ///
    /// // With .env file
    /// let loader = ConfigLoader::new(Some(".env".into()));
    /// ```
    pub fn new(env_file_path: Option<std::path::PathBuf>) -> Self {
        Self { env_file_path }
    }

    /// Load and validate the server configuration
    pub fn load_server_config(&self) -> Result<ServerConfigDto> {
        if let Some(path) = &self.env_file_path {
            self.load_env_file(path)?;
        }

        let config = ServerConfigDto::from_env()?;
        validate_server_config(&config)?;

        Ok(config)
    }

    fn load_env_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(ConfigError::EnvFileLoad {
                path: path.to_path_buf(),
                reason: "file not found".to_string(),
            });
        }

        dotenv::from_path(path).map_err(|e| ConfigError::EnvFileLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(())
    }
}
