//! A Discord bot that reports the status of the SunchipsMC Minecraft server.
//!
//! The bot shows a live "Watching 🟢 N players online" presence, refreshed
//! every minute by [`poller::StatusPoller`], and answers `!status`,
//! `!players`, `!motd` and `!help` in chat.
//!
//! Transport lives in [`gateway`] (WebSocket) and [`http`] (REST); the status
//! API client is in [`mcstatus`]. [`bot::run`] wires them together.

pub mod bot;
pub mod commands;
pub mod config;
pub mod events;
pub mod gateway;
pub mod http;
pub mod mcstatus;
pub mod poller;
pub mod types;

pub use bot::{run, BotContext, BotError};
pub use config::BotConfig;
