//! Typed gateway events.
//!
//! The gateway module deserialises dispatch payloads into this enum so the
//! rest of the bot can pattern-match on strongly-typed data.

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::types::*;

/// A fully-parsed event coming off the Discord gateway.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// We've successfully identified, bot is ready.
    Ready(ReadyEvent),

    /// A resumed session replayed missed events (no new READY follows).
    Resumed,

    /// A message was created in a channel we can see.
    MessageCreate(Message),

    /// Heartbeat ACK from the gateway (op 11).
    HeartbeatAck,

    /// The gateway is asking us to heartbeat immediately (op 1).
    HeartbeatRequest,

    /// Gateway told us to reconnect (op 7).
    Reconnect,

    /// Session has been invalidated (op 9). `true` means resumable.
    InvalidSession(bool),

    /// Anything without a typed variant.
    Unknown {
        event_name: Option<String>,
        op: u8,
    },
}

impl GatewayEvent {
    /// Convert a raw [`GatewayPayload`] into a typed event.
    ///
    /// Never fails; unrecognised or malformed events become
    /// [`GatewayEvent::Unknown`].
    pub fn from_payload(payload: GatewayPayload) -> Self {
        match payload.op {
            0 => Self::parse_dispatch(payload.t, payload.d),
            1 => GatewayEvent::HeartbeatRequest,
            7 => GatewayEvent::Reconnect,
            9 => {
                let resumable = payload
                    .d
                    .as_ref()
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                GatewayEvent::InvalidSession(resumable)
            }
            11 => GatewayEvent::HeartbeatAck,
            op => GatewayEvent::Unknown {
                event_name: payload.t,
                op,
            },
        }
    }

    fn parse_dispatch(event_name: Option<String>, data: Option<serde_json::Value>) -> Self {
        let Some(name) = event_name else {
            return GatewayEvent::Unknown {
                event_name: None,
                op: 0,
            };
        };

        // RESUMED carries no data worth parsing.
        if name == "RESUMED" {
            return GatewayEvent::Resumed;
        }

        let Some(d) = data else {
            return GatewayEvent::Unknown {
                event_name: Some(name),
                op: 0,
            };
        };

        match name.as_str() {
            "READY" => parse_typed(&name, d, GatewayEvent::Ready),
            "MESSAGE_CREATE" => parse_typed(&name, d, GatewayEvent::MessageCreate),
            _ => GatewayEvent::Unknown {
                event_name: Some(name),
                op: 0,
            },
        }
    }
}

fn parse_typed<T: DeserializeOwned>(
    name: &str,
    data: serde_json::Value,
    wrap: impl FnOnce(T) -> GatewayEvent,
) -> GatewayEvent {
    match serde_json::from_value::<T>(data) {
        Ok(value) => wrap(value),
        Err(e) => {
            warn!(event = name, error = %e, "failed to parse dispatch payload");
            GatewayEvent::Unknown {
                event_name: Some(name.to_string()),
                op: 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> GatewayPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn ready_dispatch_is_typed() {
        let event = GatewayEvent::from_payload(payload(json!({
            "op": 0,
            "s": 1,
            "t": "READY",
            "d": {
                "v": 10,
                "user": { "id": "42", "username": "statusbot", "bot": true },
                "session_id": "abc",
                "resume_gateway_url": "wss://resume.example",
                "guilds": [{ "id": "7", "unavailable": true }],
                "application": { "id": "42", "flags": 0 },
            },
        })));
        match event {
            GatewayEvent::Ready(ready) => {
                assert_eq!(ready.session_id, "abc");
                assert_eq!(ready.guilds.len(), 1);
                assert!(ready.user.bot);
            }
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[test]
    fn message_create_is_typed() {
        let event = GatewayEvent::from_payload(payload(json!({
            "op": 0,
            "s": 2,
            "t": "MESSAGE_CREATE",
            "d": {
                "id": "100",
                "channel_id": "200",
                "author": { "id": "300", "username": "notch" },
                "content": "!players",
            },
        })));
        assert!(matches!(event, GatewayEvent::MessageCreate(m) if m.content == "!players"));
    }

    #[test]
    fn malformed_dispatch_becomes_unknown() {
        let event = GatewayEvent::from_payload(payload(json!({
            "op": 0,
            "t": "MESSAGE_CREATE",
            "d": { "id": "100" },
        })));
        assert!(matches!(
            event,
            GatewayEvent::Unknown { event_name: Some(ref n), op: 0 } if n == "MESSAGE_CREATE"
        ));
    }

    #[test]
    fn control_opcodes_map_to_variants() {
        let hb = GatewayEvent::from_payload(payload(json!({ "op": 1, "d": null })));
        assert!(matches!(hb, GatewayEvent::HeartbeatRequest));

        let ack = GatewayEvent::from_payload(payload(json!({ "op": 11 })));
        assert!(matches!(ack, GatewayEvent::HeartbeatAck));

        let reconnect = GatewayEvent::from_payload(payload(json!({ "op": 7, "d": null })));
        assert!(matches!(reconnect, GatewayEvent::Reconnect));
    }

    #[test]
    fn invalid_session_carries_resumable_flag() {
        let yes = GatewayEvent::from_payload(payload(json!({ "op": 9, "d": true })));
        assert!(matches!(yes, GatewayEvent::InvalidSession(true)));

        let no = GatewayEvent::from_payload(payload(json!({ "op": 9, "d": false })));
        assert!(matches!(no, GatewayEvent::InvalidSession(false)));
    }

    #[test]
    fn untyped_dispatch_keeps_its_name() {
        let event = GatewayEvent::from_payload(payload(json!({
            "op": 0,
            "t": "GUILD_CREATE",
            "d": {},
        })));
        assert!(matches!(
            event,
            GatewayEvent::Unknown { event_name: Some(ref n), .. } if n == "GUILD_CREATE"
        ));
    }
}
