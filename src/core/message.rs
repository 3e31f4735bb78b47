use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::WELCOME_MESSAGE_TYPE;
use crate::error::{Result, RelayError};

/// An application event relayed between clients.
///
/// The relay imposes no schema beyond "a JSON object": fields are kept in
/// the order the sender wrote them and re-encoded without an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelayMessage(Map<String, Value>);

impl RelayMessage {
    /// Decode a raw text payload
    pub fn decode(raw: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(raw)? {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(RelayError::MessageParseError(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Encode to the wire representation
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// The optional `type` field senders use to label events
    pub fn event_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }
}

/// Handshake sent to a client right after it connects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Welcome {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl Welcome {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: WELCOME_MESSAGE_TYPE.to_string(),
            message: message.into(),
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_is_reencoded_verbatim() {
        let raw = r#"{"z":3,"x":1,"nested":{"b":[1,2],"a":null}}"#;
        let msg = RelayMessage::decode(raw).unwrap();
        assert_eq!(msg.encode().unwrap(), raw);
    }

    #[test]
    fn test_malformed_payload_is_rejected() {
        let err = RelayMessage::decode("not-json").unwrap_err();
        assert!(matches!(err, RelayError::MessageParseError(_)));
    }

    #[test]
    fn test_non_object_json_is_rejected() {
        for raw in ["42", "\"motion\"", "[1,2,3]", "null"] {
            assert!(RelayMessage::decode(raw).is_err(), "accepted {}", raw);
        }
    }

    #[test]
    fn test_event_type() {
        let msg = RelayMessage::decode(r#"{"type":"motion","x":0.5}"#).unwrap();
        assert_eq!(msg.event_type(), Some("motion"));
        let untyped = RelayMessage::decode(r#"{"x":0.5}"#).unwrap();
        assert_eq!(untyped.event_type(), None);
    }

    #[test]
    fn test_welcome_shape() {
        let encoded = Welcome::new("hello").encode().unwrap();
        assert_eq!(encoded, r#"{"type":"welcome","message":"hello"}"#);
    }
}
