//! The status poller: keeps the bot's presence in step with the server.
//!
//! Each tick fetches the status document, reduces it to a
//! [`ServerStatusSnapshot`], renders a one-line presence and publishes it as
//! a *Watching* activity. A failed tick leaves the previous presence in
//! place; the loop logs the error and waits for the next tick.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::gateway::GatewayError;
use crate::mcstatus::{ServerStatusSnapshot, StatusClient, StatusError};
use crate::types::ActivityType;

pub const OFFLINE_PRESENCE: &str = "🔴 Server Offline";

/// Anything that can display a presence line for the bot.
#[async_trait]
pub trait PresenceSink: Send + Sync {
    async fn set_presence(&self, text: &str, kind: ActivityType) -> Result<(), GatewayError>;
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Status(#[from] StatusError),
    #[error("failed to publish presence: {0}")]
    Publish(#[from] GatewayError),
}

/// Render the presence line for a snapshot.
pub fn presence_text(snapshot: &ServerStatusSnapshot, host: &str) -> String {
    match snapshot {
        ServerStatusSnapshot::Online { players_online, .. } => {
            format!("🟢 {} players online @ {}", players_online, host)
        }
        ServerStatusSnapshot::Offline => OFFLINE_PRESENCE.to_string(),
    }
}

pub struct StatusPoller<S> {
    status: StatusClient,
    sink: S,
    host: String,
    period: Duration,
    initial_delay: Duration,
}

impl<S: PresenceSink + 'static> StatusPoller<S> {
    pub fn new(status: StatusClient, sink: S, host: impl Into<String>, period: Duration) -> Self {
        Self {
            status,
            sink,
            host: host.into(),
            period,
            initial_delay: Duration::ZERO,
        }
    }

    /// Delay the first tick instead of firing it immediately.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// One fetch → format → publish cycle. Returns the published line.
    pub async fn tick(&self) -> Result<String, PollError> {
        let snapshot = self.status.fetch().await?.snapshot()?;
        let text = presence_text(&snapshot, &self.host);
        self.sink.set_presence(&text, ActivityType::Watching).await?;
        Ok(text)
    }

    /// Spawn the periodic task. Runs for the lifetime of the runtime.
    ///
    /// Ticks are anchored to the start instant, so a slow fetch does not push
    /// later ticks back; a tick that overruns a whole period is skipped.
    pub fn start(self) -> JoinHandle<()> {
        info!(
            period_s = self.period.as_secs(),
            url = self.status.status_url(),
            "starting status poller"
        );
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut interval = tokio::time::interval_at(Instant::now() + self.initial_delay, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            match self.tick().await {
                Ok(text) => debug!(presence = %text, "presence updated"),
                Err(e) => warn!(error = %e, "error updating status"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
