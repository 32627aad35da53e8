use std::path::PathBuf;

/// Errors raised while loading or validating configuration
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load env file {path}: {reason}")]
    EnvFileLoad { path: PathBuf, reason: String },

    #[error("Invalid value for {var}: {reason}")]
    InvalidVar { var: String, reason: String },

    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
