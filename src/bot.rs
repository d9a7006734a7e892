//! Wiring: gateway events in, poller and command tasks out.
//!
//! [`run`] connects to the gateway and drives the event loop. READY starts
//! the [`StatusPoller`] (once per process, READY repeats after a
//! re-identify). Every MESSAGE_CREATE from a human gets its own task running
//! [`commands::dispatch`] against a shared [`BotContext`].

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::commands::{self, Messenger};
use crate::config::{BotConfig, ConfigError};
use crate::events::GatewayEvent;
use crate::gateway::{self, GatewayConfig};
use crate::http::{DiscordHttpClient, HttpError};
use crate::mcstatus::{StatusClient, StatusError};
use crate::poller::{PresenceSink, StatusPoller};
use crate::types::*;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build Discord client: {0}")]
    Http(#[from] HttpError),
    #[error("failed to build status client: {0}")]
    Status(#[from] StatusError),
    #[error("gateway connection closed for good")]
    GatewayClosed,
}

// ---------------------------------------------------------------------------
// Shared context
// ---------------------------------------------------------------------------

/// Everything a command handler needs, built once and shared behind an `Arc`.
#[derive(Debug)]
pub struct BotContext<M = DiscordHttpClient> {
    pub messenger: M,
    pub status: StatusClient,
    pub config: BotConfig,
}

impl<M: Messenger> BotContext<M> {
    pub fn new(messenger: M, config: BotConfig) -> Result<Self, StatusError> {
        Ok(Self {
            messenger,
            status: StatusClient::new(&config)?,
            config,
        })
    }
}

// ---------------------------------------------------------------------------
// Gateway intents
// ---------------------------------------------------------------------------

/// GUILDS | GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT
pub fn gateway_intents() -> Intents {
    Intents::GUILDS | Intents::GUILD_MESSAGES | Intents::DIRECT_MESSAGES | Intents::MESSAGE_CONTENT
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

struct EventLoop<M, S> {
    ctx: Arc<BotContext<M>>,
    sink: S,
    poller: Option<JoinHandle<()>>,
}

impl<M, S> EventLoop<M, S>
where
    M: Messenger + 'static,
    S: PresenceSink + Clone + 'static,
{
    fn new(ctx: Arc<BotContext<M>>, sink: S) -> Self {
        Self {
            ctx,
            sink,
            poller: None,
        }
    }

    fn handle(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::Ready(ready) => self.on_ready(ready),

            GatewayEvent::Resumed => debug!("session resumed"),

            GatewayEvent::MessageCreate(msg) => {
                if msg.is_from_bot() {
                    return;
                }
                let ctx = Arc::clone(&self.ctx);
                tokio::spawn(async move { commands::dispatch(&ctx, &msg).await });
            }

            // Handled inside the gateway driver.
            GatewayEvent::HeartbeatAck
            | GatewayEvent::HeartbeatRequest
            | GatewayEvent::Reconnect
            | GatewayEvent::InvalidSession(_) => {}

            GatewayEvent::Unknown { event_name, op } => {
                trace!(event = ?event_name, op, "unhandled gateway event");
            }
        }
    }

    fn on_ready(&mut self, ready: ReadyEvent) {
        info!(user = %ready.user.tag(), guilds = ready.guilds.len(), "bot is ready!");

        if let Some(handle) = &self.poller {
            if !handle.is_finished() {
                debug!("status poller already running");
                return;
            }
            warn!("status poller had stopped, restarting");
        }

        let poller = StatusPoller::new(
            self.ctx.status.clone(),
            self.sink.clone(),
            self.ctx.config.host.clone(),
            self.ctx.config.poll_interval,
        );
        self.poller = Some(poller.start());
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Connect and run until the gateway gives up.
///
/// Only returns on a setup failure or once the gateway driver has stopped
/// (fatal close code or too many failed reconnects).
pub async fn run(config: BotConfig) -> Result<(), BotError> {
    info!(?config, "starting bot");

    let http = DiscordHttpClient::new(config.token.clone())?;
    let ctx = Arc::new(BotContext::new(http, config.clone())?);

    let mut gw = gateway::connect(GatewayConfig {
        token: config.token,
        intents: gateway_intents(),
    });

    let mut event_loop = EventLoop::new(ctx, gw.sender.clone());
    while let Some(event) = gw.events.recv().await {
        event_loop.handle(event);
    }

    if let Some(poller) = event_loop.poller.take() {
        poller.abort();
    }
    if let Err(e) = gw.driver.await {
        error!(error = %e, "gateway driver panicked");
    }
    Err(BotError::GatewayClosed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
