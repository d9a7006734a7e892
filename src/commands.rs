//! Prefix commands: `!status`, `!players`, `!motd` and `!help`.
//!
//! Every command does its own status fetch. Status API failures are reported
//! to the channel with [`StatusError::user_message`]; REST failures are
//! returned to [`dispatch`], which logs them.

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::bot::BotContext;
use crate::http::HttpError;
use crate::mcstatus::{Players, ServerStatus, StatusError};
use crate::types::*;

pub const OFFLINE_REPLY: &str = "The server is currently offline.";
pub const NO_PLAYERS_REPLY: &str = "No players are online.";
pub const NO_MOTD_REPLY: &str = "MOTD is not available.";

pub const STATUS_COLOR: u32 = 0x2ECC71;
pub const PLAYER_COLOR: u32 = 0x3498DB;

const ICON_FILENAME: &str = "server_icon.png";

/// Discord allows 1024 characters per embed field value.
const FIELD_VALUE_LIMIT: usize = 1024;

/// Sends messages to a channel.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, channel_id: &str, msg: CreateMessage) -> Result<(), HttpError>;

    async fn send_message_with_files(
        &self,
        channel_id: &str,
        msg: CreateMessage,
        files: Vec<FileAttachment>,
    ) -> Result<(), HttpError>;
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Status,
    Players,
    Motd,
    Help,
}

impl Command {
    /// Parse the first word of `content` after `prefix`.
    ///
    /// Returns `None` for ordinary chat and for unknown commands. Trailing
    /// arguments are ignored.
    pub fn parse(content: &str, prefix: &str) -> Option<Self> {
        let rest = content.trim_start().strip_prefix(prefix)?;
        let word = rest.split_whitespace().next()?;
        // "! status" is chat, not a command.
        if !rest.starts_with(word) {
            return None;
        }
        match word {
            "status" => Some(Command::Status),
            "players" => Some(Command::Players),
            "motd" => Some(Command::Motd),
            "help" => Some(Command::Help),
            other => {
                debug!(command = other, "ignoring unknown command");
                None
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Status => "status",
            Command::Players => "players",
            Command::Motd => "motd",
            Command::Help => "help",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Command::Status => "Show the server status, version and who is online",
            Command::Players => "List online players with their avatars",
            Command::Motd => "Show the server's message of the day",
            Command::Help => "Show this message",
        }
    }

    const ALL: [Command; 4] = [
        Command::Status,
        Command::Players,
        Command::Motd,
        Command::Help,
    ];
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Run the command in `msg`, if there is one.
pub async fn dispatch<M: Messenger>(ctx: &BotContext<M>, msg: &Message) {
    let Some(command) = Command::parse(&msg.content, &ctx.config.command_prefix) else {
        return;
    };

    info!(
        command = command.name(),
        author = %msg.author.tag(),
        channel_id = %msg.channel_id,
        guild_id = ?msg.guild_id,
        "handling command"
    );

    let channel_id = msg.channel_id.as_str();
    let result = match command {
        Command::Status => status(ctx, channel_id).await,
        Command::Players => players(ctx, channel_id).await,
        Command::Motd => motd(ctx, channel_id).await,
        Command::Help => help(ctx, channel_id).await,
    };

    if let Err(e) = result {
        error!(command = command.name(), error = %e, "failed to send reply");
    }
}

async fn say<M: Messenger>(ctx: &BotContext<M>, channel_id: &str, text: &str) -> Result<(), HttpError> {
    ctx.messenger
        .send_message(channel_id, CreateMessage::new().content(text))
        .await
}

/// Fetch the status document, or tell the channel why we couldn't.
async fn fetch_status<M: Messenger>(
    ctx: &BotContext<M>,
    channel_id: &str,
    command: Command,
) -> Result<Option<ServerStatus>, HttpError> {
    match ctx.status.fetch().await {
        Ok(status) => Ok(Some(status)),
        Err(e) => {
            report(ctx, channel_id, command, &e).await?;
            Ok(None)
        }
    }
}

async fn report<M: Messenger>(
    ctx: &BotContext<M>,
    channel_id: &str,
    command: Command,
    err: &StatusError,
) -> Result<(), HttpError> {
    warn!(command = command.name(), error = %err, "status lookup failed");
    say(ctx, channel_id, err.user_message()).await
}

// ---------------------------------------------------------------------------
// !status
// ---------------------------------------------------------------------------

async fn status<M: Messenger>(ctx: &BotContext<M>, channel_id: &str) -> Result<(), HttpError> {
    let Some(status) = fetch_status(ctx, channel_id, Command::Status).await? else {
        return Ok(());
    };
    if !status.online {
        return say(ctx, channel_id, OFFLINE_REPLY).await;
    }
    let Some(players) = status.players.as_ref() else {
        return report(ctx, channel_id, Command::Status, &StatusError::MissingField("players")).await;
    };

    let embed = status_embed(&status, players, &ctx.config.host);
    match status.icon_png() {
        Some(png) => {
            let icon = FileAttachment::png(ICON_FILENAME, png);
            let msg = CreateMessage::new().embed(embed.thumbnail(icon.attachment_url()));
            ctx.messenger
                .send_message_with_files(channel_id, msg, vec![icon])
                .await
        }
        None => {
            ctx.messenger
                .send_message(channel_id, CreateMessage::new().embed(embed))
                .await
        }
    }
}

fn status_embed(status: &ServerStatus, players: &Players, host: &str) -> Embed {
    let motd = status
        .motd
        .as_ref()
        .map(|m| m.joined())
        .unwrap_or_else(|| "Unknown".to_string());
    let names = players
        .list
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    Embed::new()
        .title("SunchipsMC Server Status")
        .color(STATUS_COLOR)
        .field("MOTD", truncate_field(non_empty(motd, "Unknown")), false)
        .field(
            "Version",
            status.version.as_deref().unwrap_or("Unknown"),
            true,
        )
        .field("Players", format!("{}/{}", players.online, players.max), true)
        .field(
            "Online Players",
            truncate_field(non_empty(names, "None")),
            false,
        )
        .field("Server Address", host, false)
        .field("IP", status.ip.as_deref().unwrap_or("Unknown"), true)
        .field(
            "Port",
            status
                .port
                .map(|p| p.to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            true,
        )
        .timestamp(chrono::Utc::now().to_rfc3339())
}

/// Discord rejects embed fields with empty values.
fn non_empty(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

/// Cut `value` to fit in an embed field, marking the cut with `…`.
fn truncate_field(value: String) -> String {
    if value.chars().count() <= FIELD_VALUE_LIMIT {
        return value;
    }
    let mut cut: String = value.chars().take(FIELD_VALUE_LIMIT - 1).collect();
    cut.push('…');
    cut
}

// ---------------------------------------------------------------------------
// !players
// ---------------------------------------------------------------------------

async fn players<M: Messenger>(ctx: &BotContext<M>, channel_id: &str) -> Result<(), HttpError> {
    let Some(status) = fetch_status(ctx, channel_id, Command::Players).await? else {
        return Ok(());
    };
    if !status.online {
        return say(ctx, channel_id, OFFLINE_REPLY).await;
    }
    let Some(players) = status.players.as_ref() else {
        return report(ctx, channel_id, Command::Players, &StatusError::MissingField("players")).await;
    };
    if players.list.is_empty() {
        return say(ctx, channel_id, NO_PLAYERS_REPLY).await;
    }

    let summary = Embed::new()
        .title("Player Count")
        .description(format!(
            "Currently, {} players are online.",
            players.list.len()
        ))
        .color(STATUS_COLOR);
    ctx.messenger
        .send_message(channel_id, CreateMessage::new().embed(summary))
        .await?;

    for player in &players.list {
        let png = match ctx.status.fetch_avatar(&player.uuid).await {
            Ok(Some(png)) => png,
            Ok(None) => continue,
            Err(e) => {
                debug!(player = %player.name, error = %e, "skipping player without avatar");
                continue;
            }
        };

        let avatar = FileAttachment::png(format!("{}.png", player.name), png);
        let embed = Embed::new()
            .title(player.name.as_str())
            .color(PLAYER_COLOR)
            .image(avatar.attachment_url())
            .field(
                "Profile",
                format!(
                    "[View Profile]({}/{})",
                    ctx.config.profile_base.trim_end_matches('/'),
                    player.uuid
                ),
                false,
            );
        ctx.messenger
            .send_message_with_files(channel_id, CreateMessage::new().embed(embed), vec![avatar])
            .await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// !motd
// ---------------------------------------------------------------------------

async fn motd<M: Messenger>(ctx: &BotContext<M>, channel_id: &str) -> Result<(), HttpError> {
    let Some(status) = fetch_status(ctx, channel_id, Command::Motd).await? else {
        return Ok(());
    };
    let text = status
        .motd
        .map(|motd| motd.joined())
        .filter(|joined| !joined.trim().is_empty());
    match text {
        Some(text) => say(ctx, channel_id, &format!("Server MOTD: {}", text)).await,
        None => say(ctx, channel_id, NO_MOTD_REPLY).await,
    }
}

// ---------------------------------------------------------------------------
// !help
// ---------------------------------------------------------------------------

async fn help<M: Messenger>(ctx: &BotContext<M>, channel_id: &str) -> Result<(), HttpError> {
    say(ctx, channel_id, &help_text(&ctx.config.command_prefix)).await
}

fn help_text(prefix: &str) -> String {
    let mut text = String::from("**Commands**\n");
    for command in Command::ALL {
        text.push_str(&format!(
            "`{}{}` {}\n",
            prefix,
            command.name(),
            command.description()
        ));
    }
    text
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Sent {
        channel_id: String,
        msg: CreateMessage,
        files: Vec<FileAttachment>,
    }

    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<Sent>>,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send_message(&self, channel_id: &str, msg: CreateMessage) -> Result<(), HttpError> {
            self.send_message_with_files(channel_id, msg, Vec::new()).await
        }

        async fn send_message_with_files(
            &self,
            channel_id: &str,
            msg: CreateMessage,
            files: Vec<FileAttachment>,
        ) -> Result<(), HttpError> {
            self.sent.lock().unwrap().push(Sent {
                channel_id: channel_id.to_string(),
                msg,
                files,
            });
            Ok(())
        }
    }

    fn context(server: &mockito::Server) -> BotContext<RecordingMessenger> {
        let mut config = BotConfig::new("tok");
        config.status_api_base = format!("{}/3", server.url());
        config.avatar_api_base = format!("{}/avatars", server.url());
        BotContext::new(RecordingMessenger::default(), config).unwrap()
    }

    fn sent(ctx: &BotContext<RecordingMessenger>) -> Vec<Sent> {
        ctx.messenger.sent.lock().unwrap().clone()
    }

    fn message(content: &str) -> Message {
        serde_json::from_value(serde_json::json!({
            "id": "1",
            "channel_id": "chan",
            "author": { "id": "2", "username": "steve" },
            "content": content,
        }))
        .unwrap()
    }

    async fn serve_status(server: &mut mockito::Server, body: &str) {
        server
            .mock("GET", "/3/sunchipsmc.com")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;
    }

    fn text_of(sent: &Sent) -> &str {
        sent.msg.content.as_deref().unwrap_or_default()
    }

    fn embed_of(sent: &Sent) -> &Embed {
        &sent.msg.embeds.as_ref().unwrap()[0]
    }

    // -- parsing --

    #[test]
    fn parses_known_commands() {
        assert_eq!(Command::parse("!status", "!"), Some(Command::Status));
        assert_eq!(Command::parse("!players", "!"), Some(Command::Players));
        assert_eq!(Command::parse("!motd", "!"), Some(Command::Motd));
        assert_eq!(Command::parse("!help", "!"), Some(Command::Help));
        assert_eq!(Command::parse("  !status please", "!"), Some(Command::Status));
    }

    #[test]
    fn ignores_chat_and_unknown_commands() {
        assert_eq!(Command::parse("status", "!"), None);
        assert_eq!(Command::parse("what is the !status", "!"), None);
        assert_eq!(Command::parse("!", "!"), None);
        assert_eq!(Command::parse("! status", "!"), None);
        assert_eq!(Command::parse("!roll", "!"), None);
        assert_eq!(Command::parse("!STATUS", "!"), None);
        assert_eq!(Command::parse("!statusx", "!"), None);
    }

    #[test]
    fn help_lists_every_command() {
        let text = help_text("!");
        for command in Command::ALL {
            assert!(text.contains(&format!("`!{}`", command.name())));
        }
    }

    // -- !status --

    #[tokio::test]
    async fn status_embed_has_all_fields() {
        let mut server = mockito::Server::new_async().await;
        serve_status(
            &mut server,
            r#"{
                "online": true, "ip": "203.0.113.5", "port": 25565, "version": "Paper 1.21.1",
                "motd": {"clean": ["Welcome to", "SunchipsMC"]},
                "players": {"online": 2, "max": 20, "list": [
                    {"name": "Steve", "uuid": "u1"}, {"name": "Alex", "uuid": "u2"}
                ]}
            }"#,
        )
        .await;

        let ctx = context(&server);
        dispatch(&ctx, &message("!status")).await;

        let sent = sent(&ctx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel_id, "chan");
        assert!(sent[0].files.is_empty());

        let embed = embed_of(&sent[0]);
        assert_eq!(embed.title.as_deref(), Some("SunchipsMC Server Status"));
        assert_eq!(embed.color, Some(0x2ECC71));
        assert_eq!(embed.field_value("MOTD"), Some("Welcome to SunchipsMC"));
        assert_eq!(embed.field_value("Version"), Some("Paper 1.21.1"));
        assert_eq!(embed.field_value("Players"), Some("2/20"));
        assert_eq!(embed.field_value("Online Players"), Some("Steve, Alex"));
        assert_eq!(embed.field_value("Server Address"), Some("sunchipsmc.com"));
        assert_eq!(embed.field_value("IP"), Some("203.0.113.5"));
        assert_eq!(embed.field_value("Port"), Some("25565"));
        assert!(embed.thumbnail.is_none());
    }

    #[tokio::test]
    async fn status_fills_in_missing_optional_fields() {
        let mut server = mockito::Server::new_async().await;
        serve_status(
            &mut server,
            r#"{"online": true, "players": {"online": 0, "max": 20}}"#,
        )
        .await;

        let ctx = context(&server);
        dispatch(&ctx, &message("!status")).await;

        let sent = sent(&ctx);
        let embed = embed_of(&sent[0]);
        assert_eq!(embed.field_value("MOTD"), Some("Unknown"));
        assert_eq!(embed.field_value("Version"), Some("Unknown"));
        assert_eq!(embed.field_value("Online Players"), Some("None"));
    }

    #[test]
    fn long_field_values_are_cut_to_the_discord_limit() {
        let short = "Steve, Alex".to_string();
        assert_eq!(truncate_field(short.clone()), short);

        let exact = "x".repeat(FIELD_VALUE_LIMIT);
        assert_eq!(truncate_field(exact.clone()), exact);

        let long = "é".repeat(FIELD_VALUE_LIMIT + 50);
        let cut = truncate_field(long);
        assert_eq!(cut.chars().count(), FIELD_VALUE_LIMIT);
        assert!(cut.ends_with('…'));
    }

    #[tokio::test]
    async fn status_with_many_players_stays_within_field_limit() {
        let list: Vec<_> = (0..200)
            .map(|i| serde_json::json!({ "name": format!("Player_{:04}", i), "uuid": format!("u{}", i) }))
            .collect();
        let body = serde_json::json!({
            "online": true,
            "players": { "online": 200, "max": 500, "list": list },
        });
        let mut server = mockito::Server::new_async().await;
        serve_status(&mut server, &body.to_string()).await;

        let ctx = context(&server);
        dispatch(&ctx, &message("!status")).await;

        let sent = sent(&ctx);
        let names = embed_of(&sent[0]).field_value("Online Players").unwrap();
        assert!(names.chars().count() <= 1024);
        assert!(names.starts_with("Player_0000, Player_0001"));
        assert!(names.ends_with('…'));
    }

    #[tokio::test]
    async fn status_attaches_decoded_icon() {
        let mut server = mockito::Server::new_async().await;
        serve_status(
            &mut server,
            r#"{"online": true, "players": {"online": 0, "max": 20},
                "icon": "data:image/png;base64,iVBORw0KGgo="}"#,
        )
        .await;

        let ctx = context(&server);
        dispatch(&ctx, &message("!status")).await;

        let sent = sent(&ctx);
        assert_eq!(sent[0].files.len(), 1);
        assert_eq!(sent[0].files[0].filename, "server_icon.png");
        assert_eq!(&sent[0].files[0].data[1..4], b"PNG");
        assert_eq!(
            embed_of(&sent[0]).thumbnail.as_ref().map(|t| t.url.as_str()),
            Some("attachment://server_icon.png")
        );
    }

    #[tokio::test]
    async fn status_with_bad_icon_still_sends_embed() {
        let mut server = mockito::Server::new_async().await;
        serve_status(
            &mut server,
            r#"{"online": true, "players": {"online": 0, "max": 20}, "icon": "garbage"}"#,
        )
        .await;

        let ctx = context(&server);
        dispatch(&ctx, &message("!status")).await;

        let sent = sent(&ctx);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].files.is_empty());
        assert!(embed_of(&sent[0]).thumbnail.is_none());
    }

    #[tokio::test]
    async fn status_offline_replies_with_text() {
        let mut server = mockito::Server::new_async().await;
        serve_status(&mut server, r#"{"online": false}"#).await;

        let ctx = context(&server);
        dispatch(&ctx, &message("!status")).await;
        assert_eq!(text_of(&sent(&ctx)[0]), OFFLINE_REPLY);
    }

    #[tokio::test]
    async fn status_failure_reply_is_sanitized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/3/sunchipsmc.com")
            .with_status(502)
            .with_body("upstream exploded at 10.0.0.3")
            .create_async()
            .await;

        let ctx = context(&server);
        dispatch(&ctx, &message("!status")).await;

        let sent = sent(&ctx);
        let text = text_of(&sent[0]);
        assert_eq!(text, StatusError::Upstream(502).user_message());
        assert!(!text.contains("502"));
        assert!(!text.contains("10.0.0.3"));
    }

    #[tokio::test]
    async fn status_online_without_players_is_reported() {
        let mut server = mockito::Server::new_async().await;
        serve_status(&mut server, r#"{"online": true}"#).await;

        let ctx = context(&server);
        dispatch(&ctx, &message("!status")).await;
        assert_eq!(
            text_of(&sent(&ctx)[0]),
            "The server status service returned an unexpected response."
        );
    }

    // -- !players --

    #[tokio::test]
    async fn players_sends_summary_then_one_embed_per_avatar() {
        let mut server = mockito::Server::new_async().await;
        serve_status(
            &mut server,
            r#"{"online": true, "players": {"online": 3, "max": 20, "list": [
                {"name": "Steve", "uuid": "u-steve"},
                {"name": "Ghost", "uuid": "u-ghost"},
                {"name": "Alex", "uuid": "u-alex"}
            ]}}"#,
        )
        .await;
        for (uuid, status) in [("u-steve", 200), ("u-ghost", 404), ("u-alex", 200)] {
            server
                .mock("GET", format!("/avatars/{}", uuid).as_str())
                .match_query(mockito::Matcher::AllOf(vec![
                    mockito::Matcher::UrlEncoded("size".into(), "64".into()),
                    mockito::Matcher::UrlEncoded("overlay".into(), "true".into()),
                ]))
                .with_status(status)
                .with_body([0x89u8, b'P', b'N', b'G'])
                .create_async()
                .await;
        }

        let ctx = context(&server);
        dispatch(&ctx, &message("!players")).await;

        let sent = sent(&ctx);
        assert_eq!(sent.len(), 3, "summary + two avatars, ghost skipped");

        let summary = embed_of(&sent[0]);
        assert_eq!(summary.title.as_deref(), Some("Player Count"));
        assert_eq!(
            summary.description.as_deref(),
            Some("Currently, 3 players are online.")
        );
        assert_eq!(summary.color, Some(0x2ECC71));

        let steve = embed_of(&sent[1]);
        assert_eq!(steve.title.as_deref(), Some("Steve"));
        assert_eq!(steve.color, Some(0x3498DB));
        assert_eq!(
            steve.image.as_ref().map(|i| i.url.as_str()),
            Some("attachment://Steve.png")
        );
        assert_eq!(
            steve.field_value("Profile"),
            Some("[View Profile](https://namemc.com/profile/u-steve)")
        );
        assert_eq!(sent[1].files[0].filename, "Steve.png");

        assert_eq!(embed_of(&sent[2]).title.as_deref(), Some("Alex"));
    }

    #[tokio::test]
    async fn players_with_empty_list() {
        let mut server = mockito::Server::new_async().await;
        serve_status(
            &mut server,
            r#"{"online": true, "players": {"online": 0, "max": 20}}"#,
        )
        .await;

        let ctx = context(&server);
        dispatch(&ctx, &message("!players")).await;
        assert_eq!(text_of(&sent(&ctx)[0]), NO_PLAYERS_REPLY);
    }

    #[tokio::test]
    async fn players_offline() {
        let mut server = mockito::Server::new_async().await;
        serve_status(&mut server, r#"{"online": false}"#).await;

        let ctx = context(&server);
        dispatch(&ctx, &message("!players")).await;
        assert_eq!(text_of(&sent(&ctx)[0]), OFFLINE_REPLY);
    }

    // -- !motd --

    #[tokio::test]
    async fn motd_joins_clean_lines() {
        let mut server = mockito::Server::new_async().await;
        serve_status(
            &mut server,
            r#"{"online": true, "motd": {"clean": ["Sun", "Chips"]}}"#,
        )
        .await;

        let ctx = context(&server);
        dispatch(&ctx, &message("!motd")).await;
        assert_eq!(text_of(&sent(&ctx)[0]), "Server MOTD: Sun Chips");
    }

    #[tokio::test]
    async fn motd_ignores_online_flag() {
        let mut server = mockito::Server::new_async().await;
        serve_status(
            &mut server,
            r#"{"online": false, "motd": {"clean": ["Back soon"]}}"#,
        )
        .await;

        let ctx = context(&server);
        dispatch(&ctx, &message("!motd")).await;
        assert_eq!(text_of(&sent(&ctx)[0]), "Server MOTD: Back soon");
    }

    #[tokio::test]
    async fn motd_with_no_lines_is_not_available() {
        for body in [
            r#"{"online": true, "motd": {"clean": []}}"#,
            r#"{"online": true, "motd": {}}"#,
            r#"{"online": true, "motd": {"clean": ["  "]}}"#,
        ] {
            let mut server = mockito::Server::new_async().await;
            serve_status(&mut server, body).await;

            let ctx = context(&server);
            dispatch(&ctx, &message("!motd")).await;
            assert_eq!(text_of(&sent(&ctx)[0]), NO_MOTD_REPLY);
        }
    }

    #[tokio::test]
    async fn motd_missing() {
        let mut server = mockito::Server::new_async().await;
        serve_status(&mut server, r#"{"online": true}"#).await;

        let ctx = context(&server);
        dispatch(&ctx, &message("!motd")).await;
        assert_eq!(text_of(&sent(&ctx)[0]), NO_MOTD_REPLY);
    }

    // -- misc --

    #[tokio::test]
    async fn chat_sends_nothing_and_fetches_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let ctx = context(&server);
        dispatch(&ctx, &message("hello everyone")).await;
        dispatch(&ctx, &message("!unknown")).await;
        dispatch(&ctx, &message("!help")).await;

        let sent = sent(&ctx);
        assert_eq!(sent.len(), 1);
        assert!(text_of(&sent[0]).contains("`!status`"));
        mock.assert_async().await;
    }
}
