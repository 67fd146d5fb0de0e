//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// The Gemini endpoint that speaks the OpenAI chat completions protocol.
pub const GEMINI_OPENAI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub generation_api_key: Option<String>,
    pub generation_api_base: String,
    pub phrase_model: String,
    pub chat_model: String,
    pub phrase_budget: Duration,
    pub chat_timeout: Duration,
    pub cors_origin: String,
    /// Token accepted as `dev-user` when running on the in-memory store.
    pub dev_session_token: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Generation Service ---
        // Gemini by default; an OpenAI key works with an OpenAI base URL.
        let generation_api_key = lookup("GEMINI_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        let generation_api_base =
            lookup("GENERATION_API_BASE").unwrap_or_else(|| GEMINI_OPENAI_BASE.to_string());
        let phrase_model =
            lookup("PHRASE_MODEL").unwrap_or_else(|| "gemini-1.5-flash".to_string());
        let chat_model = lookup("CHAT_MODEL").unwrap_or_else(|| "gemini-1.5-flash".to_string());

        // --- Execution Budgets ---
        let phrase_budget = parse_secs(&lookup, "PHRASE_BUDGET_SECS", 10)?;
        let chat_timeout = parse_secs(&lookup, "CHAT_TIMEOUT_SECS", 10)?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        let dev_session_token = lookup("DEV_SESSION_TOKEN").filter(|t| !t.trim().is_empty());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            generation_api_key,
            generation_api_base,
            phrase_model,
            chat_model,
            phrase_budget,
            chat_timeout,
            cors_origin,
            dev_session_token,
        })
    }
}

fn parse_secs<F>(lookup: &F, key: &str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(Duration::from_secs(default)),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(0) => Err(ConfigError::InvalidValue(
                key.to_string(),
                "must be at least one second".to_string(),
            )),
            Ok(secs) => Ok(Duration::from_secs(secs)),
            Err(e) => Err(ConfigError::InvalidValue(key.to_string(), e.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert!(config.database_url.is_none());
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.generation_api_base, GEMINI_OPENAI_BASE);
        assert_eq!(config.phrase_model, "gemini-1.5-flash");
        assert_eq!(config.phrase_budget, Duration::from_secs(10));
        assert_eq!(config.chat_timeout, Duration::from_secs(10));
    }

    #[test]
    fn gemini_key_wins_over_openai_key() {
        let config = config_from(&[("GEMINI_API_KEY", "g"), ("OPENAI_API_KEY", "o")]).unwrap();
        assert_eq!(config.generation_api_key.as_deref(), Some("g"));

        let config = config_from(&[("OPENAI_API_KEY", "o")]).unwrap();
        assert_eq!(config.generation_api_key.as_deref(), Some("o"));
    }

    #[test]
    fn budgets_are_parsed_in_seconds() {
        let config =
            config_from(&[("PHRASE_BUDGET_SECS", "4"), ("CHAT_TIMEOUT_SECS", "7")]).unwrap();
        assert_eq!(config.phrase_budget, Duration::from_secs(4));
        assert_eq!(config.chat_timeout, Duration::from_secs(7));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            config_from(&[("BIND_ADDRESS", "nowhere")]),
            Err(ConfigError::InvalidValue(key, _)) if key == "BIND_ADDRESS"
        ));
        assert!(matches!(
            config_from(&[("PHRASE_BUDGET_SECS", "0")]),
            Err(ConfigError::InvalidValue(key, _)) if key == "PHRASE_BUDGET_SECS"
        ));
        assert!(matches!(
            config_from(&[("RUST_LOG", "loud")]),
            Err(ConfigError::InvalidValue(key, _)) if key == "RUST_LOG"
        ));
    }

    #[test]
    fn blank_database_url_means_in_memory() {
        let config = config_from(&[("DATABASE_URL", "  ")]).unwrap();
        assert!(config.database_url.is_none());
    }

    #[test]
    fn dev_session_token_is_optional() {
        assert!(config_from(&[]).unwrap().dev_session_token.is_none());
        let config = config_from(&[("DEV_SESSION_TOKEN", "letmein")]).unwrap();
        assert_eq!(config.dev_session_token.as_deref(), Some("letmein"));
    }
}
