//! Wire protocol between the browser client and the relay.
//!
//! Text frames carry JSON events `{"event": "...", "data": ...}`; binary
//! frames are `binary-stream` media chunks.
//!
//! | event           | direction | data                              |
//! |-----------------|-----------|-----------------------------------|
//! | `start-stream`  | in        | `{ destination_base, key }`       |
//! | `stop-stream`   | in        | none                              |
//! | `stream-status` | out       | `started`, `ended`, `stopped`, `error:<message>` |

use axum::extract::ws::Message;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::session::StreamStatus;

/// Payload of `start-stream`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StartStream {
    #[serde(alias = "rtmpUrl", alias = "destinationBase")]
    pub destination_base: String,
    pub key: String,
}

/// Control events sent as JSON text frames.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
enum ClientMessage {
    StartStream(StartStream),
    StopStream,
}

/// Events the relay sends to its client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    StreamStatus(StreamStatus),
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

/// One inbound event for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    StartStream(StartStream),
    BinaryStream(Bytes),
    StopStream,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed event: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Parse a JSON control event.
pub fn parse_text(text: &str) -> Result<InboundEvent, ProtocolError> {
    let message: ClientMessage = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
    Ok(match message {
        ClientMessage::StartStream(start) => InboundEvent::StartStream(start),
        ClientMessage::StopStream => InboundEvent::StopStream,
    })
}

/// Result of decoding one WebSocket frame.
#[derive(Debug)]
pub enum Frame {
    Event(InboundEvent),
    /// Ping/pong; axum answers pings itself.
    Control,
    Close,
}

pub fn decode(message: Message) -> Result<Frame, ProtocolError> {
    match message {
        Message::Binary(bytes) => Ok(Frame::Event(InboundEvent::BinaryStream(bytes))),
        Message::Text(text) => parse_text(text.as_str()).map(Frame::Event),
        Message::Ping(_) | Message::Pong(_) => Ok(Frame::Control),
        Message::Close(_) => Ok(Frame::Close),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_stream() {
        let event = parse_text(
            r#"{"event":"start-stream","data":{"destination_base":"rtmp://x/app","key":"k1"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            InboundEvent::StartStream(StartStream {
                destination_base: "rtmp://x/app".into(),
                key: "k1".into(),
            })
        );
    }

    #[test]
    fn accepts_rtmp_url_alias() {
        let event =
            parse_text(r#"{"event":"start-stream","data":{"rtmpUrl":"rtmp://y","key":"k"}}"#)
                .unwrap();
        assert!(matches!(event, InboundEvent::StartStream(s) if s.destination_base == "rtmp://y"));
    }

    #[test]
    fn parses_stop_stream_with_or_without_data() {
        assert_eq!(parse_text(r#"{"event":"stop-stream"}"#).unwrap(), InboundEvent::StopStream);
        assert_eq!(
            parse_text(r#"{"event":"stop-stream","data":null}"#).unwrap(),
            InboundEvent::StopStream
        );
    }

    #[test]
    fn rejects_unknown_and_malformed_events() {
        assert!(matches!(
            parse_text(r#"{"event":"launch-missiles"}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(parse_text("not json").is_err());
        assert!(parse_text(r#"{"event":"start-stream","data":{"key":"k"}}"#).is_err());
    }

    #[test]
    fn binary_frames_are_chunks() {
        let frame = decode(Message::Binary(Bytes::from_static(b"\x1a\x45"))).unwrap();
        assert!(matches!(
            frame,
            Frame::Event(InboundEvent::BinaryStream(b)) if b.as_ref() == b"\x1a\x45"
        ));
    }

    #[test]
    fn close_and_ping_frames() {
        assert!(matches!(decode(Message::Close(None)).unwrap(), Frame::Close));
        assert!(matches!(
            decode(Message::Ping(Bytes::new())).unwrap(),
            Frame::Control
        ));
    }

    #[test]
    fn encodes_stream_status() {
        let json = ServerMessage::StreamStatus(StreamStatus::Started).to_json().unwrap();
        assert_eq!(json, r#"{"event":"stream-status","data":"started"}"#);

        let json = ServerMessage::StreamStatus(StreamStatus::Error("x".into()))
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"event":"stream-status","data":"error:x"}"#);
    }
}
