//! HTTP client for the Discord REST API.
//!
//! All outbound REST calls go through [`DiscordHttpClient`] so that auth
//! headers, rate-limit back-off, and error handling live in one place.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_lock::Mutex;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use thiserror::Error;
use tracing::{debug, warn};

use crate::commands::Messenger;
use crate::types::*;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const BASE_URL: &str = "https://discord.com/api/v10";
const USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/sunchipsmc/mcstatus-bot, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);
const MAX_RETRIES: u32 = 5;
const MAX_BACKOFF: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Rate-limit tracker (per-bucket)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct BucketState {
    remaining: u32,
    resets_at: Instant,
}

#[derive(Debug, Default)]
struct RateLimiter {
    /// Route-key → bucket id mapping.
    route_buckets: HashMap<String, String>,
    /// Bucket id → state.
    buckets: HashMap<String, BucketState>,
    /// No requests may be sent until this instant.
    global_until: Option<Instant>,
}

impl RateLimiter {
    /// How long to wait before sending on `route_key`, if at all.
    fn delay_for(&self, route_key: &str, now: Instant) -> Option<Duration> {
        if let Some(until) = self.global_until {
            if until > now {
                return Some(until - now);
            }
        }

        let bucket_id = self.route_buckets.get(route_key)?;
        let state = self.buckets.get(bucket_id)?;

        if state.remaining == 0 && state.resets_at > now {
            return Some(state.resets_at - now);
        }

        None
    }

    fn update(&mut self, route_key: &str, info: &RateLimitInfo, now: Instant) {
        let reset_after = info
            .reset_after
            .map(|s| Duration::from_secs_f64(s.clamp(0.0, MAX_BACKOFF.as_secs_f64())));

        if info.is_global {
            if let Some(after) = reset_after {
                self.global_until = Some(now + after);
            }
        }

        if let Some(ref bucket) = info.bucket {
            self.route_buckets
                .insert(route_key.to_string(), bucket.clone());
            self.buckets.insert(
                bucket.clone(),
                BucketState {
                    remaining: info.remaining.unwrap_or(1),
                    resets_at: now + reset_after.unwrap_or(Duration::from_secs(1)),
                },
            );
        }
    }
}

fn parse_rate_limit_headers(headers: &HeaderMap) -> RateLimitInfo {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    RateLimitInfo {
        remaining: header("x-ratelimit-remaining").and_then(|s| s.parse().ok()),
        reset_after: header("x-ratelimit-reset-after").and_then(|s| s.parse().ok()),
        bucket: header("x-ratelimit-bucket").map(str::to_string),
        is_global: header("x-ratelimit-global") == Some("true"),
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HttpError {
    /// Non-success status from Discord.
    #[error("Discord API error {status} on {route}: {body}")]
    Api {
        status: u16,
        body: String,
        route: String,
    },
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("serialisation error: {0}")]
    Serde(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// DiscordHttpClient
// ---------------------------------------------------------------------------

/// A thin, rate-limit–aware HTTP client for the Discord REST API.
///
/// Cheap to clone (internals are behind `Arc`).
#[derive(Clone)]
pub struct DiscordHttpClient {
    token: String,
    base_url: String,
    client: reqwest::Client,
    limiter: Arc<Mutex<RateLimiter>>,
}

impl DiscordHttpClient {
    pub fn new(token: impl Into<String>) -> Result<Self, HttpError> {
        Self::with_base_url(token, BASE_URL)
    }

    /// Point the client somewhere other than discord.com (tests).
    pub fn with_base_url(
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            token: token.into(),
            base_url: base_url.into(),
            client,
            limiter: Arc::new(Mutex::new(RateLimiter::default())),
        })
    }

    async fn wait_for_bucket(&self, route_key: &str) {
        let delay = self.limiter.lock().await.delay_for(route_key, Instant::now());
        if let Some(delay) = delay {
            let delay = delay.min(MAX_BACKOFF);
            debug!(
                route = route_key,
                delay_ms = delay.as_millis() as u64,
                "rate-limit pre-emptive backoff"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// The single send path everything funnels through.
    ///
    /// `build` is called once per attempt because multipart bodies can't be
    /// replayed. `route_key` is a template like
    /// `POST /channels/{channel_id}/messages` used for bucketing.
    async fn execute(
        &self,
        route_key: &str,
        build: impl Fn(&reqwest::Client) -> Result<reqwest::RequestBuilder, HttpError>,
    ) -> Result<Vec<u8>, HttpError> {
        for attempt in 0..=MAX_RETRIES {
            self.wait_for_bucket(route_key).await;

            let resp = build(&self.client)?
                .header("authorization", format!("Bot {}", self.token))
                .send()
                .await?;

            let status = resp.status();
            let rl_info = parse_rate_limit_headers(resp.headers());
            self.limiter
                .lock()
                .await
                .update(route_key, &rl_info, Instant::now());

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RETRIES {
                let retry_after = rl_info.reset_after.unwrap_or(1.0).clamp(0.0, 60.0);
                warn!(
                    route = route_key,
                    attempt,
                    retry_after_s = retry_after,
                    global = rl_info.is_global,
                    "rate-limited by Discord, backing off"
                );
                tokio::time::sleep(Duration::from_secs_f64(retry_after)).await;
                continue;
            }

            let bytes = resp.bytes().await?;
            if status.is_success() {
                return Ok(bytes.to_vec());
            }

            return Err(HttpError::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
                route: route_key.to_string(),
            });
        }

        Err(HttpError::Api {
            status: 429,
            body: "rate-limited after max retries".to_string(),
            route: route_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Send a rich message (content, embeds, reply) to a channel.
    pub async fn create_message(
        &self,
        channel_id: &str,
        msg: &CreateMessage,
    ) -> Result<Message, HttpError> {
        let url = self.url(&format!("channels/{}/messages", channel_id));
        let route_key = format!("POST /channels/{}/messages", channel_id);
        let body = serde_json::to_value(msg)?;

        let bytes = self
            .execute(&route_key, |client| Ok(client.post(&url).json(&body)))
            .await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Send a message with one or more uploaded files.
    ///
    /// The body goes in `payload_json`; each file is a `files[n]` part
    /// referenced from the body's `attachments` array.
    pub async fn create_message_with_files(
        &self,
        channel_id: &str,
        msg: &CreateMessage,
        files: &[FileAttachment],
    ) -> Result<Message, HttpError> {
        let url = self.url(&format!("channels/{}/messages", channel_id));
        let route_key = format!("POST /channels/{}/messages", channel_id);
        let payload_json = serde_json::to_string(&with_attachment_refs(msg, files))?;

        let bytes = self
            .execute(&route_key, |client| {
                let form = multipart_form(&payload_json, files)?;
                Ok(client.post(&url).multipart(form))
            })
            .await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl std::fmt::Debug for DiscordHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordHttpClient")
            .field("token", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl Messenger for DiscordHttpClient {
    async fn send_message(&self, channel_id: &str, msg: CreateMessage) -> Result<(), HttpError> {
        let sent = self.create_message(channel_id, &msg).await?;
        debug!(message_id = %sent.id, channel_id, "message sent");
        Ok(())
    }

    async fn send_message_with_files(
        &self,
        channel_id: &str,
        msg: CreateMessage,
        files: Vec<FileAttachment>,
    ) -> Result<(), HttpError> {
        let sent = self.create_message_with_files(channel_id, &msg, &files).await?;
        debug!(
            message_id = %sent.id,
            channel_id,
            files = files.len(),
            "message sent"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn with_attachment_refs(msg: &CreateMessage, files: &[FileAttachment]) -> CreateMessage {
    let mut msg = msg.clone();
    msg.attachments = Some(
        files
            .iter()
            .enumerate()
            .map(|(i, f)| AttachmentRef {
                id: i as u64,
                filename: f.filename.clone(),
            })
            .collect(),
    );
    msg
}

fn multipart_form(payload_json: &str, files: &[FileAttachment]) -> Result<Form, HttpError> {
    let payload = Part::text(payload_json.to_string()).mime_str("application/json")?;
    let mut form = Form::new().part("payload_json", payload);
    for (i, file) in files.iter().enumerate() {
        let part = Part::bytes(file.data.clone())
            .file_name(file.filename.clone())
            .mime_str(file.content_type)?;
        form = form.part(format!("files[{}]", i), part);
    }
    Ok(form)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
