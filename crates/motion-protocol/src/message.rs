use serde_json::{Map, Value};

use crate::error::{json_type_name, DecodeError};
use crate::DEFAULT_REPEAT_COUNT;

/// JSON key carrying the message type on every device frame.
pub const MSG_TYPE_FIELD: &str = "msgType";

// -- Inbound frames --

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    Heartbeat,
    /// Any type this bridge does not act on (kept for logging)
    Other(String),
    /// Frame had no usable `msgType`
    Missing,
}

impl MessageType {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) if s == "Heartbeat" => Self::Heartbeat,
            Some(Value::String(s)) => Self::Other(s.clone()),
            Some(Value::Null) | None => Self::Missing,
            Some(other) => Self::Other(other.to_string()),
        }
    }
}

/// A decoded device frame: its type plus the whole JSON object.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub msg_type: MessageType,
    pub body: Map<String, Value>,
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(body) => Ok(Self {
                msg_type: MessageType::from_value(body.get(MSG_TYPE_FIELD)),
                body,
            }),
            other => Err(DecodeError::NotAnObject {
                found: json_type_name(&other),
            }),
        }
    }
}

// -- Outbound requests --

/// A JSON request plus the number of times it is put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    payload: String,
    repeat_count: u32,
}

impl OutboundPacket {
    /// A repeat count of zero is raised to one; every packet is sent at least once.
    pub fn new(payload: impl Into<String>, repeat_count: u32) -> Self {
        Self {
            payload: payload.into(),
            repeat_count: repeat_count.max(1),
        }
    }

    pub fn with_default_repeat(payload: impl Into<String>) -> Self {
        Self::new(payload, DEFAULT_REPEAT_COUNT)
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.payload.as_bytes()
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_heartbeat_type() {
        let msg = InboundMessage::parse(r#"{"msgType":"Heartbeat","mac":"aa"}"#).unwrap();
        assert_eq!(msg.msg_type, MessageType::Heartbeat);
        assert_eq!(msg.body["mac"], "aa");
    }

    #[test]
    fn unknown_and_missing_types() {
        let other = InboundMessage::parse(r#"{"msgType":"ReadDeviceAck"}"#).unwrap();
        assert_eq!(other.msg_type, MessageType::Other("ReadDeviceAck".into()));

        let missing = InboundMessage::parse(r#"{"mac":"aa"}"#).unwrap();
        assert_eq!(missing.msg_type, MessageType::Missing);

        let numeric = InboundMessage::parse(r#"{"msgType":7}"#).unwrap();
        assert_eq!(numeric.msg_type, MessageType::Other("7".into()));
    }

    #[test]
    fn rejects_non_objects() {
        assert!(matches!(
            InboundMessage::parse("[1,2,3]"),
            Err(DecodeError::NotAnObject { found: "array" })
        ));
        assert!(matches!(
            InboundMessage::parse("not json"),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn repeat_count_defaults_and_floor() {
        assert_eq!(OutboundPacket::with_default_repeat("{}").repeat_count(), 3);
        assert_eq!(OutboundPacket::new("{}", 0).repeat_count(), 1);
        assert_eq!(OutboundPacket::new("{}", 7).repeat_count(), 7);
    }
}
