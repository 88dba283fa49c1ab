//! Socket.IO v5 over Engine.IO v4, websocket transport only.
//!
//! Engine.IO packets are text frames whose first character is the packet type.
//! Socket.IO packets ride inside Engine.IO `message` (`4`) packets, so an event
//! on the default namespace reads `42["order:new",{...}]`. The crate's frames
//! are `{"event","data"}` envelopes; this module translates at the edge.

use serde_json::{json, Value};
use thiserror::Error;

/// Path and query the Socket.IO server answers websocket upgrades on.
pub const ENGINE_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// Engine.IO `pong`, the answer to a server `ping`.
pub const PONG: &str = "3";

/// Socket.IO `CONNECT` to the default namespace.
pub const CONNECT: &str = "40";

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("empty packet")]
    Empty,

    #[error("malformed event packet: {0}")]
    MalformedEvent(String),

    #[error("outbound frame is not an event envelope")]
    NotAnEnvelope,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO handshake carrying the session parameters.
    Open,
    /// Engine.IO `close`.
    Close,
    Ping,
    Pong,
    /// Socket.IO namespace connect acknowledgement.
    Connected,
    /// The server refused the namespace connect.
    ConnectError(String),
    /// Socket.IO namespace disconnect.
    Disconnected,
    /// An event, already converted to the crate's envelope.
    Event(String),
    /// Upgrade probes, noops, acks and binary packets. None of them carry
    /// anything the channel consumes.
    Ignored,
}

/// Builds the websocket endpoint from the socket host root.
pub fn endpoint(root: &str) -> String {
    if root.contains("/socket.io/") {
        return root.to_string();
    }
    format!("{}{ENGINE_PATH}", root.trim_end_matches('/'))
}

pub fn decode(text: &str) -> Result<Packet, CodecError> {
    let mut chars = text.chars();
    let engine = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();

    Ok(match engine {
        '0' => Packet::Open,
        '1' => Packet::Close,
        '2' => Packet::Ping,
        '3' => Packet::Pong,
        '4' => decode_message(rest)?,
        _ => Packet::Ignored,
    })
}

fn decode_message(text: &str) -> Result<Packet, CodecError> {
    let mut chars = text.chars();
    let Some(kind) = chars.next() else {
        return Ok(Packet::Ignored);
    };
    let body = strip_namespace(chars.as_str());

    Ok(match kind {
        '0' => Packet::Connected,
        '1' => Packet::Disconnected,
        '2' => Packet::Event(event_envelope(body)?),
        '4' => Packet::ConnectError(body.to_string()),
        _ => Packet::Ignored,
    })
}

/// Drops a `/namespace,` prefix. Only the default namespace is joined, but a
/// server may still name it.
fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        if let Some((_, rest)) = body.split_once(',') {
            return rest;
        }
    }
    body
}

fn event_envelope(body: &str) -> Result<String, CodecError> {
    let payload = body.trim_start_matches(|c: char| c.is_ascii_digit());
    let args: Vec<Value> = serde_json::from_str(payload)
        .map_err(|err| CodecError::MalformedEvent(err.to_string()))?;

    let mut args = args.into_iter();
    let event = match args.next() {
        Some(Value::String(event)) => event,
        _ => return Err(CodecError::MalformedEvent("missing event name".to_string())),
    };
    let data = args.next().unwrap_or(Value::Null);

    Ok(json!({ "event": event, "data": data }).to_string())
}

/// Wraps an envelope as a Socket.IO event packet.
pub fn encode_event(envelope: &str) -> Result<String, CodecError> {
    let mut value: Value = serde_json::from_str(envelope).map_err(|_| CodecError::NotAnEnvelope)?;
    let event = match value.get_mut("event").map(Value::take) {
        Some(Value::String(event)) => event,
        _ => return Err(CodecError::NotAnEnvelope),
    };
    let args = match value.get_mut("data").map(Value::take) {
        None | Some(Value::Null) => json!([event]),
        Some(data) => json!([event, data]),
    };
    Ok(format!("42{args}"))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{decode, encode_event, endpoint, CodecError, Packet};

    fn envelope(packet: Packet) -> Value {
        match packet {
            Packet::Event(frame) => serde_json::from_str(&frame).unwrap(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn endpoint_targets_the_engine_path() {
        assert_eq!(
            endpoint("ws://localhost:3001/"),
            "ws://localhost:3001/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            endpoint("wss://api.example.uz/socket.io/?EIO=4&transport=websocket"),
            "wss://api.example.uz/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn engine_control_packets() {
        assert_eq!(
            decode(r#"0{"sid":"abc","pingInterval":25000,"pingTimeout":20000}"#).unwrap(),
            Packet::Open
        );
        assert_eq!(decode("2").unwrap(), Packet::Ping);
        assert_eq!(decode("1").unwrap(), Packet::Close);
        assert_eq!(decode("6").unwrap(), Packet::Ignored);
        assert_eq!(decode(""), Err(CodecError::Empty));
    }

    #[test]
    fn namespace_packets() {
        assert_eq!(decode(r#"40{"sid":"xyz"}"#).unwrap(), Packet::Connected);
        assert_eq!(decode("41").unwrap(), Packet::Disconnected);
        assert_eq!(
            decode(r#"44{"message":"not authorized"}"#).unwrap(),
            Packet::ConnectError(r#"{"message":"not authorized"}"#.to_string())
        );
    }

    #[test]
    fn events_become_envelopes() {
        assert_eq!(
            envelope(decode(r#"42["order:new",{"orderId":"O1","eta":12}]"#).unwrap()),
            json!({ "event": "order:new", "data": { "orderId": "O1", "eta": 12 } })
        );
        assert_eq!(
            envelope(decode(r#"42["order:taken"]"#).unwrap()),
            json!({ "event": "order:taken", "data": null })
        );
        assert_eq!(
            envelope(decode(r#"42/,17["order:updated",{"status":"arrived"}]"#).unwrap()),
            json!({ "event": "order:updated", "data": { "status": "arrived" } })
        );
        assert!(matches!(
            decode(r#"42{"event":"order:new"}"#),
            Err(CodecError::MalformedEvent(_))
        ));
    }

    #[test]
    fn envelopes_become_event_packets() {
        assert_eq!(
            encode_event(r#"{"event":"order:accept","data":{"orderId":"O1"}}"#).unwrap(),
            r#"42["order:accept",{"orderId":"O1"}]"#
        );
        assert_eq!(encode_event(r#"{"event":"ping"}"#).unwrap(), r#"42["ping"]"#);
        assert_eq!(encode_event("[1,2]"), Err(CodecError::NotAnEnvelope));
    }
}
