use thiserror::Error;

/// Errors raised while decoding an inbound datagram or applying it to a device.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Payload is not valid JSON
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload parsed, but the top level is not an object
    #[error("expected a JSON object, got {found}")]
    NotAnObject { found: &'static str },

    /// A known field carries a value of the wrong JSON type
    #[error("field `{field}` has the wrong type (expected {expected})")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    /// Heartbeat cannot be routed to a device without its MAC
    #[error("heartbeat carries no `mac` field")]
    MissingMac,
}

/// Name of a JSON value's type, for error messages.
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;

    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
