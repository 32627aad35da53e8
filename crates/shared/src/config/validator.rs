use super::dto::ServerConfigDto;
use super::error::{ConfigError, Result};

/// Validates a loaded server configuration.
///
/// Catches values that parse fine but cannot work at runtime, so the
/// process fails at startup instead of misbehaving later.
pub fn validate_server_config(config: &ServerConfigDto) -> Result<()> {
    if config.database.pool_size == 0 {
        return Err(ConfigError::Invalid {
            reason: "database pool_size must be greater than 0".to_string(),
        });
    }

    if let Some(url) = &config.database.url {
        if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
            return Err(ConfigError::Invalid {
                reason: format!("unsupported database url scheme: {}", url),
            });
        }
    }

    if config.reaper.enabled {
        if config.reaper.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "reaper tick interval must be greater than 0".to_string(),
            });
        }
        // A lease shorter than the sweep interval would re-queue live jobs
        if config.reaper.lease_timeout_secs <= config.reaper.tick_interval_secs {
            return Err(ConfigError::Invalid {
                reason: "lease timeout must exceed the reaper tick interval".to_string(),
            });
        }
        if config.reaper.batch_size == 0 {
            return Err(ConfigError::Invalid {
                reason: "reaper batch size must be greater than 0".to_string(),
            });
        }
    }

    Ok(())
}
