//! Client for the mcsrvstat.us server-status API and the Crafatar avatar API.
//!
//! Every request carries an explicit timeout. Errors are collapsed into
//! [`StatusError`], whose [`StatusError::user_message`] is the only text that
//! ever reaches a Discord channel.

use std::time::Duration;

use base64::Engine;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::BotConfig;

const USER_AGENT: &str = concat!(
    "mcstatus-bot/",
    env!("CARGO_PKG_VERSION"),
    " (Discord status bot)"
);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("status request timed out")]
    Timeout,
    #[error("status request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("status API returned 404 for this server")]
    NotFound,
    #[error("status API returned HTTP {0}")]
    Upstream(u16),
    #[error("malformed status response: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("status response is missing `{0}`")]
    MissingField(&'static str),
}

impl StatusError {
    /// Fixed, sanitized text suitable for an end-user channel.
    pub fn user_message(&self) -> &'static str {
        match self {
            StatusError::Timeout => {
                "The server status service took too long to respond. Please try again later."
            }
            StatusError::Transport(_) => {
                "Couldn't reach the server status service. Please try again later."
            }
            StatusError::NotFound => "The server status service doesn't know about this server.",
            StatusError::Upstream(_) => {
                "The server status service is having trouble right now. Please try again later."
            }
            StatusError::Parse(_) | StatusError::MissingField(_) => {
                "The server status service returned an unexpected response."
            }
        }
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StatusError::Timeout
        } else {
            StatusError::Transport(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Response model
// ---------------------------------------------------------------------------

/// The parsed status document.
///
/// Only `online` is required; which other absences matter is up to the
/// caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerStatus {
    pub online: bool,
    pub players: Option<Players>,
    pub motd: Option<Motd>,
    pub version: Option<String>,
    pub ip: Option<String>,
    pub port: Option<u16>,
    /// `data:image/png;base64,...`
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Players {
    pub online: u32,
    pub max: u32,
    #[serde(default)]
    pub list: Vec<PlayerEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerEntry {
    pub name: String,
    pub uuid: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Motd {
    #[serde(default)]
    pub clean: Vec<String>,
}

impl Motd {
    /// Cleaned MOTD lines joined with single spaces.
    pub fn joined(&self) -> String {
        self.clean.join(" ")
    }
}

impl ServerStatus {
    pub fn from_slice(body: &[u8]) -> Result<Self, StatusError> {
        serde_json::from_slice(body).map_err(StatusError::Parse)
    }

    /// Reduce the document to the fields the presence line needs.
    ///
    /// An online server without a `players` object is malformed.
    pub fn snapshot(&self) -> Result<ServerStatusSnapshot, StatusError> {
        if !self.online {
            return Ok(ServerStatusSnapshot::Offline);
        }
        let players = self
            .players
            .as_ref()
            .ok_or(StatusError::MissingField("players"))?;
        Ok(ServerStatusSnapshot::Online {
            players_online: players.online,
            players_max: players.max,
        })
    }

    /// Decode the base64 PNG from the `icon` data URI, if there is one.
    pub fn icon_png(&self) -> Option<Vec<u8>> {
        let icon = self.icon.as_deref()?;
        let (_, encoded) = icon.split_once(',')?;
        match base64::engine::general_purpose::STANDARD.decode(encoded.trim()) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "server icon is not valid base64");
                None
            }
        }
    }
}

/// The transient per-tick view of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatusSnapshot {
    Online { players_online: u32, players_max: u32 },
    Offline,
}

// ---------------------------------------------------------------------------
// StatusClient
// ---------------------------------------------------------------------------

/// Fetches status documents and avatars.
///
/// Cheap to clone (`reqwest::Client` is an `Arc` internally).
#[derive(Debug, Clone)]
pub struct StatusClient {
    client: reqwest::Client,
    status_url: String,
    avatar_api_base: String,
}

impl StatusClient {
    pub fn new(config: &BotConfig) -> Result<Self, StatusError> {
        Self::with_timeout(
            config.status_url(),
            config.avatar_api_base.clone(),
            config.request_timeout,
        )
    }

    pub fn with_timeout(
        status_url: impl Into<String>,
        avatar_api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StatusError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(StatusError::Transport)?;
        Ok(Self {
            client,
            status_url: status_url.into(),
            avatar_api_base: avatar_api_base.into(),
        })
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    /// One round trip to the status endpoint.
    pub async fn fetch(&self) -> Result<ServerStatus, StatusError> {
        let resp = self
            .client
            .get(&self.status_url)
            .send()
            .await
            .map_err(StatusError::from_reqwest)?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StatusError::NotFound);
        }
        if !status.is_success() {
            return Err(StatusError::Upstream(status.as_u16()));
        }

        let body = resp.bytes().await.map_err(StatusError::from_reqwest)?;
        ServerStatus::from_slice(&body)
    }

    pub fn avatar_url(&self, uuid: &str) -> String {
        format!(
            "{}/{}?size=64&overlay=true",
            self.avatar_api_base.trim_end_matches('/'),
            uuid
        )
    }

    /// Fetch a 64px avatar PNG. `Ok(None)` when the renderer answers non-200.
    pub async fn fetch_avatar(&self, uuid: &str) -> Result<Option<Vec<u8>>, StatusError> {
        let resp = self
            .client
            .get(self.avatar_url(uuid))
            .send()
            .await
            .map_err(StatusError::from_reqwest)?;

        if resp.status() != reqwest::StatusCode::OK {
            debug!(uuid, status = resp.status().as_u16(), "avatar unavailable");
            return Ok(None);
        }

        let body = resp.bytes().await.map_err(StatusError::from_reqwest)?;
        Ok(Some(body.to_vec()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
