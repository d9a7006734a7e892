//! Process configuration.
//!
//! Only the bot token comes from the environment. The monitored server and
//! the upstream URLs are fixed for this bot; [`BotConfig`] still carries them
//! as fields so tests can point the clients at a local mock server.

use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// The Minecraft server this bot reports on.
pub const SERVER_HOST: &str = "sunchipsmc.com";

/// mcsrvstat.us v3. The host is appended as the last path segment.
pub const STATUS_API_BASE: &str = "https://api.mcsrvstat.us/3";

/// Crafatar avatar renderer, keyed by player UUID.
pub const AVATAR_API_BASE: &str = "https://crafatar.com/avatars";

/// NameMC profile pages, keyed by player UUID.
pub const PROFILE_BASE: &str = "https://namemc.com/profile";

pub const COMMAND_PREFIX: &str = "!";

pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Upper bound for any single status or avatar request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const TOKEN_VAR: &str = "DISCORD_TOKEN";

/// Older deployments of this bot used this name.
const LEGACY_TOKEN_VAR: &str = "DISCORD_BOT_TOKEN";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    MissingToken(&'static str),
    #[error("{0} environment variable is empty")]
    EmptyToken(&'static str),
}

// ---------------------------------------------------------------------------
// BotConfig
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct BotConfig {
    pub token: String,
    pub host: String,
    pub status_api_base: String,
    pub avatar_api_base: String,
    pub profile_base: String,
    pub command_prefix: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl BotConfig {
    /// Build a config with the production defaults and the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            host: SERVER_HOST.to_string(),
            status_api_base: STATUS_API_BASE.to_string(),
            avatar_api_base: AVATAR_API_BASE.to_string(),
            profile_base: PROFILE_BASE.to_string(),
            command_prefix: COMMAND_PREFIX.to_string(),
            poll_interval: POLL_INTERVAL,
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    /// Load `.env` (if present) and read the token from the environment.
    ///
    /// `DISCORD_TOKEN` wins; `DISCORD_BOT_TOKEN` is read when it is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = lookup(TOKEN_VAR)
            .or_else(|| lookup(LEGACY_TOKEN_VAR))
            .ok_or(ConfigError::MissingToken(TOKEN_VAR))?;
        let token = token.trim();
        if token.is_empty() {
            return Err(ConfigError::EmptyToken(TOKEN_VAR));
        }
        Ok(Self::new(token))
    }

    /// Full status endpoint for the configured host.
    pub fn status_url(&self) -> String {
        format!(
            "{}/{}",
            self.status_api_base.trim_end_matches('/'),
            self.host
        )
    }
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("host", &self.host)
            .field("status_api_base", &self.status_api_base)
            .field("poll_interval", &self.poll_interval)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
