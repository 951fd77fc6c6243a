//! Server configuration from the environment.

use std::net::SocketAddr;
use thiserror::Error;

const DEFAULT_BIND: &str = "0.0.0.0:3030";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid bind address: {0}")]
    Bind(String),
    #[error("Invalid session entry (expected token:user): {0}")]
    Session(String),
}

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Pre-issued bearer tokens and the user each one authenticates.
    pub sessions: Vec<(String, String)>,
}

impl ServerConfig {
    /// Read `INKBOARD_BIND` and `INKBOARD_SESSIONS` (`token:user,token:user`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_values(
            std::env::var("INKBOARD_BIND").ok().as_deref(),
            std::env::var("INKBOARD_SESSIONS").ok().as_deref(),
        )
    }

    pub fn from_values(bind: Option<&str>, sessions: Option<&str>) -> Result<Self, ConfigError> {
        let bind = bind.unwrap_or(DEFAULT_BIND);
        let bind = bind.parse().map_err(|_| ConfigError::Bind(bind.to_string()))?;
        let sessions = sessions
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.split_once(':') {
                Some((token, user)) if !token.is_empty() && !user.is_empty() => {
                    Ok((token.to_string(), user.to_string()))
                }
                _ => Err(ConfigError::Session(entry.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { bind, sessions })
    }
}
