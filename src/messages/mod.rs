//! The wire message catalog and its self-describing MessagePack codec.
//!
//! Every frame payload decodes to a msgpack map carrying at least a `type`
//! string key. Known types decode into [`Message`]; anything else is only
//! acceptable once the session has reached the task phase, where it's
//! handed off opaquely via [`decode_task_payload`].

mod catalog;

pub use catalog::{
    Auth, ClientAuth, ClientHello, Disconnected, DropResponder, Key, NewInitiator, NewResponder,
    SendError, ServerAuth, ServerHello, Token,
};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SaltyError;

const KNOWN_TYPES: &[&str] = &[
    "server-hello",
    "client-hello",
    "client-auth",
    "server-auth",
    "new-initiator",
    "new-responder",
    "send-error",
    "disconnected",
    "token",
    "key",
    "auth",
    "drop-responder",
];

/// Any decoded, type-recognized signaling message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Message {
    ServerHello(ServerHello),
    ClientHello(ClientHello),
    ClientAuth(ClientAuth),
    ServerAuth(ServerAuth),
    NewInitiator(NewInitiator),
    NewResponder(NewResponder),
    SendError(SendError),
    Disconnected(Disconnected),
    Token(Token),
    Key(Key),
    Auth(Auth),
    DropResponder(DropResponder),
}

impl Message {
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::ServerHello(_) => "server-hello",
            Message::ClientHello(_) => "client-hello",
            Message::ClientAuth(_) => "client-auth",
            Message::ServerAuth(_) => "server-auth",
            Message::NewInitiator(_) => "new-initiator",
            Message::NewResponder(_) => "new-responder",
            Message::SendError(_) => "send-error",
            Message::Disconnected(_) => "disconnected",
            Message::Token(_) => "token",
            Message::Key(_) => "key",
            Message::Auth(_) => "auth",
            Message::DropResponder(_) => "drop-responder",
        }
    }

    /// Field-level validation for whichever variant this is.
    pub fn validate(&self) -> Result<(), SaltyError> {
        match self {
            Message::ServerHello(m) => m.validate(),
            Message::ClientHello(m) => m.validate(),
            Message::ClientAuth(m) => m.validate(),
            Message::ServerAuth(m) => m.validate(),
            Message::NewInitiator(m) => m.validate(),
            Message::NewResponder(m) => m.validate(),
            Message::SendError(m) => m.validate(),
            Message::Disconnected(m) => m.validate(),
            Message::Token(m) => m.validate(),
            Message::Key(m) => m.validate(),
            Message::Auth(m) => m.validate(),
            Message::DropResponder(m) => m.validate(),
        }
    }

    pub fn to_msgpack(&self) -> Vec<u8> {
        rmp_serde::to_vec_named(self).expect("message catalog types always serialize")
    }

    /// Decode and validate bytes as one of the known catalog types. Fails
    /// closed: an unrecognized `type` is always an error here, regardless
    /// of signaling phase. Use [`decode_task_payload`] for the task phase's
    /// opaque message types.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, SaltyError> {
        let type_name = peek_type_name(bytes)?;
        if !KNOWN_TYPES.contains(&type_name.as_str()) {
            return Err(SaltyError::serialization(format!(
                "Unknown message type: {}",
                type_name
            )));
        }
        let message: Message = rmp_serde::from_slice(bytes)
            .map_err(|e| SaltyError::serialization(format!("cannot decode {} message: {}", type_name, e)))?;
        message.validate()?;
        Ok(message)
    }
}

/// A decoded opaque task message: the `type` string plus every other
/// top-level field, left as raw msgpack values for the task to interpret.
#[derive(Debug, Clone)]
pub struct TaskMessage {
    pub msg_type: String,
    pub data: HashMap<String, rmpv::Value>,
}

/// Decode a frame payload without requiring its `type` to be in the known
/// catalog. Used once a session is in the task phase, where message
/// vocabulary belongs to the negotiated task, not the signaling core.
pub fn decode_task_payload(bytes: &[u8]) -> Result<TaskMessage, SaltyError> {
    let msg_type = peek_type_name(bytes)?;
    let value: rmpv::Value = rmp_serde::from_slice(bytes)
        .map_err(|e| SaltyError::serialization(format!("cannot decode task message: {}", e)))?;
    let map = value
        .as_map()
        .expect("peek_type_name already confirmed this decodes to a map");
    let data = map
        .iter()
        .filter(|(k, _)| k.as_str() != Some("type"))
        .filter_map(|(k, v)| k.as_str().map(|s| (s.to_string(), v.clone())))
        .collect();
    Ok(TaskMessage { msg_type, data })
}

/// Encode an outgoing opaque task message: a `type` plus whatever fields
/// the task wants to send, with no catalog validation applied.
pub fn encode_task_payload(msg_type: &str, data: &HashMap<String, rmpv::Value>) -> Vec<u8> {
    let mut entries: Vec<(rmpv::Value, rmpv::Value)> = vec![(
        rmpv::Value::String("type".to_string().into()),
        rmpv::Value::String(msg_type.to_string().into()),
    )];
    for (key, value) in data {
        entries.push((rmpv::Value::String(key.clone().into()), value.clone()));
    }
    rmp_serde::to_vec(&rmpv::Value::Map(entries)).expect("rmpv::Value always serializes")
}

/// Pack a task's data map into the `rmpv::Value::Map` shape `auth.data`
/// nests it under the task's own name as.
pub fn map_to_value(data: &HashMap<String, rmpv::Value>) -> rmpv::Value {
    rmpv::Value::Map(data.iter().map(|(k, v)| (rmpv::Value::String(k.clone().into()), v.clone())).collect())
}

/// The inverse of [`map_to_value`]: pull a nested task data map back out.
/// An absent or non-map value is treated as an empty map.
pub fn value_to_map(value: Option<&rmpv::Value>) -> HashMap<String, rmpv::Value> {
    match value.and_then(|v| v.as_map()) {
        Some(entries) => entries
            .iter()
            .filter_map(|(k, v)| k.as_str().map(|s| (s.to_string(), v.clone())))
            .collect(),
        None => HashMap::new(),
    }
}

/// Checks whether a decoded task message's type belongs to the signaling
/// core's own vocabulary (meaning it must be dispatched there even inside
/// the task phase) rather than to the running task.
pub fn is_core_type(type_name: &str) -> bool {
    matches!(type_name, "send-error" | "disconnected" | "new-initiator" | "new-responder")
}

fn peek_type_name(bytes: &[u8]) -> Result<String, SaltyError> {
    let value: rmpv::Value = rmp_serde::from_slice(bytes)
        .map_err(|e| SaltyError::serialization(format!("deserialization failure: {}", e)))?;
    let map = value
        .as_map()
        .ok_or_else(|| SaltyError::serialization("Message does not contain a type field"))?;
    let type_value = map
        .iter()
        .find(|(k, _)| k.as_str() == Some("type"))
        .map(|(_, v)| v)
        .ok_or_else(|| SaltyError::serialization("Message does not contain a type field"))?;
    type_value
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| SaltyError::serialization("Message type must be a string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_hello_round_trips() {
        let msg = Message::ServerHello(ServerHello { key: vec![9u8; 32] });
        let bytes = msg.to_msgpack();
        let decoded = Message::from_msgpack(&bytes).unwrap();
        match decoded {
            Message::ServerHello(m) => assert_eq!(m.key, vec![9u8; 32]),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn server_hello_rejects_wrong_key_length() {
        let msg = Message::ServerHello(ServerHello { key: vec![9u8; 31] });
        let bytes = msg.to_msgpack();
        assert!(Message::from_msgpack(&bytes).is_err());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let value = rmpv::Value::Map(vec![(
            rmpv::Value::String("type".into()),
            rmpv::Value::String("smoke-signal".into()),
        )]);
        let bytes = rmp_serde::to_vec(&value).unwrap();
        let err = Message::from_msgpack(&bytes).unwrap_err();
        assert!(err.to_string().contains("Unknown message type: smoke-signal"));
    }

    #[test]
    fn missing_type_field_is_rejected() {
        let value = rmpv::Value::Map(vec![(
            rmpv::Value::String("key".into()),
            rmpv::Value::Binary(vec![1, 2, 3]),
        )]);
        let bytes = rmp_serde::to_vec(&value).unwrap();
        let err = Message::from_msgpack(&bytes).unwrap_err();
        assert!(err.to_string().contains("does not contain a type field"));
    }

    #[test]
    fn non_string_type_field_is_rejected() {
        let value = rmpv::Value::Map(vec![(rmpv::Value::String("type".into()), rmpv::Value::from(5))]);
        let bytes = rmp_serde::to_vec(&value).unwrap();
        let err = Message::from_msgpack(&bytes).unwrap_err();
        assert!(err.to_string().contains("type must be a string"));
    }

    #[test]
    fn auth_requires_task_or_tasks() {
        let msg = Auth {
            your_cookie: vec![0u8; 16],
            task: None,
            tasks: None,
            data: HashMap::new(),
        };
        assert!(msg.validate().is_err());
    }

    #[test]
    fn task_payload_is_decoded_opaquely_regardless_of_type() {
        let value = rmpv::Value::Map(vec![
            (rmpv::Value::String("type".into()), rmpv::Value::String("frobnicate".into())),
            (rmpv::Value::String("value".into()), rmpv::Value::from(42)),
        ]);
        let bytes = rmp_serde::to_vec(&value).unwrap();
        let decoded = decode_task_payload(&bytes).unwrap();
        assert_eq!(decoded.msg_type, "frobnicate");
        assert!(!is_core_type(&decoded.msg_type));
        assert_eq!(decoded.data.get("value").and_then(|v| v.as_i64()), Some(42));
    }
}
