//! Voice Controller configuration.
//!
//! Configuration is loaded from environment variables; every variable has
//! a default so the engine starts with no environment at all. Values that
//! fail to parse fall back to their default; values that parse but would
//! be unsound (zero timeouts, zero capacity) are rejected.

use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default maximum concurrent sessions before initiate sheds load.
pub const DEFAULT_MAX_SESSIONS: u32 = 1000;

/// Default time a call may sit unanswered before it expires to rejected.
pub const DEFAULT_PENDING_CALL_TIMEOUT_SECONDS: u64 = 30;

/// Default time a terminal session keeps answering before it is reaped.
pub const DEFAULT_ENDED_SESSION_LINGER_SECONDS: u64 = 60;

/// Default (and maximum) history page size.
pub const DEFAULT_HISTORY_PAGE_LIMIT: usize = 50;

/// Default instance ID prefix.
pub const DEFAULT_VC_ID_PREFIX: &str = "vc";

/// Voice Controller configuration.
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Unique identifier for this controller instance.
    pub instance_id: String,

    /// Maximum concurrent sessions this controller will host.
    pub max_sessions: u32,

    /// Seconds a pending call waits for an answer before expiring.
    pub pending_call_timeout_seconds: u64,

    /// Seconds a terminal session lingers (answering `InvalidState`)
    /// before its actor stops and is reaped.
    pub ended_session_linger_seconds: u64,

    /// Cap on history page size.
    pub history_page_limit: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let health_bind_address = vars
            .get("VC_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let max_sessions = vars
            .get("VC_MAX_SESSIONS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_SESSIONS);
        if max_sessions == 0 {
            return Err(ConfigError::InvalidValue(
                "VC_MAX_SESSIONS must be greater than zero".to_string(),
            ));
        }

        let pending_call_timeout_seconds = vars
            .get("VC_PENDING_CALL_TIMEOUT_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PENDING_CALL_TIMEOUT_SECONDS);
        if pending_call_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "VC_PENDING_CALL_TIMEOUT_SECONDS must be greater than zero".to_string(),
            ));
        }

        // Zero linger is sound: terminal sessions are reaped on the next
        // sweep.
        let ended_session_linger_seconds = vars
            .get("VC_ENDED_SESSION_LINGER_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_ENDED_SESSION_LINGER_SECONDS);

        let history_page_limit = vars
            .get("VC_HISTORY_PAGE_LIMIT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HISTORY_PAGE_LIMIT);
        if history_page_limit == 0 {
            return Err(ConfigError::InvalidValue(
                "VC_HISTORY_PAGE_LIMIT must be greater than zero".to_string(),
            ));
        }

        // Generate instance ID
        let instance_id = vars.get("VC_ID").cloned().unwrap_or_else(|| {
            let hostname = vars
                .get("HOSTNAME")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_VC_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            health_bind_address,
            instance_id,
            max_sessions,
            pending_call_timeout_seconds,
            ended_session_linger_seconds,
            history_page_limit,
        })
    }
}
