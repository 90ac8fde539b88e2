use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::MeshError;
use crate::types::{now_ms, DEFAULT_PRIORITY, HANDSHAKE_TYPE};

/// The JSON message record routed by the mesh.
///
/// The mesh reads only `type` and `to`; everything else is opaque. Every
/// field is optional on the wire, and unknown fields survive a round trip
/// in `extra`. Text fields accept any JSON value: a non-string is read as
/// its JSON text (`null` as empty), and a non-string `to` counts as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender-generated identifier (`<from>_<unix millis>` by convention).
    #[serde(default, deserialize_with = "any_text")]
    pub message_id: String,

    /// ISO-8601 local time at the sender.
    #[serde(default, deserialize_with = "any_text")]
    pub timestamp: String,

    /// Sending agent name.
    #[serde(default, deserialize_with = "any_text")]
    pub from: String,

    /// Destination agent name. Required for everything but handshakes.
    #[serde(
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub to: Option<String>,

    /// Message type. Only [`HANDSHAKE_TYPE`] means anything to the mesh.
    #[serde(default, rename = "type", deserialize_with = "any_text")]
    pub msg_type: String,

    #[serde(default = "default_priority", deserialize_with = "priority_text")]
    pub priority: String,

    /// Application payload (arbitrary JSON).
    #[serde(default)]
    pub content: Value,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_priority() -> String {
    DEFAULT_PRIORITY.to_string()
}

fn any_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn priority_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let text = any_text(deserializer)?;
    Ok(if text.is_empty() { default_priority() } else { text })
}

fn string_or_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

impl Envelope {
    /// Build a routed message stamped with an id and the current time.
    pub fn new(from: &str, to: &str, msg_type: &str, content: Value) -> Self {
        Self {
            message_id: format!("{from}_{}", now_ms()),
            timestamp: local_timestamp(),
            from: from.to_string(),
            to: Some(to.to_string()),
            msg_type: msg_type.to_string(),
            priority: default_priority(),
            content,
            extra: Map::new(),
        }
    }

    /// Build the handshake an agent sends right after connecting.
    pub fn handshake(from: &str) -> Self {
        let mut envelope = Self::new(from, "", HANDSHAKE_TYPE, Value::Null);
        envelope.to = None;
        envelope
    }

    pub fn with_priority(mut self, priority: &str) -> Self {
        self.priority = priority.to_string();
        self
    }

    pub fn is_handshake(&self) -> bool {
        self.msg_type == HANDSHAKE_TYPE
    }

    /// The destination agent, if present and non-empty.
    pub fn destination(&self) -> Option<&str> {
        self.to.as_deref().filter(|to| !to.is_empty())
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes. Anything other than a JSON object is rejected.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MeshError> {
        let value: Value = serde_json::from_slice(data)?;
        if !value.is_object() {
            return Err(MeshError::InvalidEnvelope {
                reason: "payload is not a JSON object".into(),
            });
        }
        Ok(serde_json::from_value(value)?)
    }
}

fn local_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_agent_message() {
        let json = r#"{
            "message_id": "alice_1708000000000",
            "timestamp": "2024-02-15T12:00:00.000000",
            "from": "alice",
            "to": "bob",
            "type": "request",
            "priority": "HIGH",
            "content": {"msg": "ping"}
        }"#;

        let envelope = Envelope::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(envelope.destination(), Some("bob"));
        assert_eq!(envelope.msg_type, "request");
        assert_eq!(envelope.priority, "HIGH");
        assert_eq!(envelope.content["msg"], "ping");
        assert!(!envelope.is_handshake());
    }

    #[test]
    fn missing_fields_default() {
        let envelope = Envelope::from_bytes(br#"{"to": "bob"}"#).unwrap();
        assert_eq!(envelope.priority, DEFAULT_PRIORITY);
        assert!(envelope.message_id.is_empty());
        assert_eq!(envelope.content, Value::Null);
    }

    #[test]
    fn empty_destination_is_none() {
        let envelope = Envelope::from_bytes(br#"{"to": "", "type": "request"}"#).unwrap();
        assert_eq!(envelope.destination(), None);

        let envelope = Envelope::from_bytes(br#"{"type": "request"}"#).unwrap();
        assert_eq!(envelope.destination(), None);
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(Envelope::from_bytes(b"[1, 2, 3]").is_err());
        assert!(Envelope::from_bytes(b"\"bob\"").is_err());
        assert!(Envelope::from_bytes(b"not json").is_err());
    }

    #[test]
    fn non_string_text_fields_are_accepted() {
        let envelope = Envelope::from_bytes(
            br#"{"timestamp": 1708000000.5, "from": "alice", "to": "bob", "type": "test", "priority": 1}"#,
        )
        .unwrap();
        assert_eq!(envelope.timestamp, "1708000000.5");
        assert_eq!(envelope.priority, "1");
        assert_eq!(envelope.destination(), Some("bob"));

        let envelope =
            Envelope::from_bytes(br#"{"from": null, "to": "bob", "type": "request", "priority": null}"#).unwrap();
        assert_eq!(envelope.from, "");
        assert_eq!(envelope.priority, DEFAULT_PRIORITY);
        assert_eq!(envelope.destination(), Some("bob"));
    }

    #[test]
    fn non_string_destination_is_absent() {
        let envelope = Envelope::from_bytes(br#"{"to": 42, "type": "request"}"#).unwrap();
        assert_eq!(envelope.destination(), None);

        let envelope = Envelope::from_bytes(br#"{"to": {"name": "bob"}, "type": 7}"#).unwrap();
        assert_eq!(envelope.destination(), None);
        assert!(!envelope.is_handshake());
    }

    #[test]
    fn unknown_fields_are_kept() {
        let envelope =
            Envelope::from_bytes(br#"{"to": "bob", "type": "x", "metadata": {"tier": "A"}}"#).unwrap();
        assert_eq!(envelope.extra["metadata"]["tier"], "A");

        let bytes = envelope.to_bytes().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["metadata"]["tier"], "A");
    }

    #[test]
    fn new_stamps_id_and_priority() {
        let envelope = Envelope::new("alice", "bob", "request", serde_json::json!({"msg": "ping"}));
        assert!(envelope.message_id.starts_with("alice_"));
        assert_eq!(envelope.priority, DEFAULT_PRIORITY);
        assert_eq!(envelope.destination(), Some("bob"));
        assert!(!envelope.timestamp.is_empty());
    }

    #[test]
    fn handshake_has_no_destination() {
        let envelope = Envelope::handshake("alice");
        assert!(envelope.is_handshake());
        assert_eq!(envelope.destination(), None);

        let serialized = serde_json::to_string(&envelope).unwrap();
        assert!(!serialized.contains("\"to\""));
        assert!(serialized.contains("\"type\":\"handshake\""));
    }
}
