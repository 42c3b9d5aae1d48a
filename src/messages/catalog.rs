//! The message catalog: one struct per signaling message type, plus the
//! field-level validation each must pass before the signaling state
//! machine ever sees it (key lengths, cookie length, responder id range).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cookie::COOKIE_BYTES;
use crate::error::SaltyError;
use crate::keystore::PUBLIC_KEY_BYTES;

fn check_len(name: &str, field: &str, bytes: &[u8], expected: usize) -> Result<(), SaltyError> {
    if bytes.len() != expected {
        return Err(SaltyError::validation(format!(
            "{}.{} must be {} bytes, got {}",
            name,
            field,
            expected,
            bytes.len()
        )));
    }
    Ok(())
}

/// Server's long-term public key. Sent unencrypted as the very first frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerHello {
    #[serde(with = "serde_bytes")]
    pub key: Vec<u8>,
}

impl ServerHello {
    pub fn validate(&self) -> Result<(), SaltyError> {
        check_len("server-hello", "key", &self.key, PUBLIC_KEY_BYTES)
    }
}

/// Sent by the responder only, carrying its own permanent public key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientHello {
    #[serde(with = "serde_bytes")]
    pub key: Vec<u8>,
}

impl ClientHello {
    pub fn validate(&self) -> Result<(), SaltyError> {
        check_len("client-hello", "key", &self.key, PUBLIC_KEY_BYTES)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientAuth {
    #[serde(with = "serde_bytes")]
    pub your_cookie: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subprotocols: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping_interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_bytes")]
    pub your_key: Option<Vec<u8>>,
}

impl ClientAuth {
    pub fn validate(&self) -> Result<(), SaltyError> {
        check_len("client-auth", "your_cookie", &self.your_cookie, COOKIE_BYTES)?;
        if let Some(ref key) = self.your_key {
            check_len("client-auth", "your_key", key, PUBLIC_KEY_BYTES)?;
        }
        Ok(())
    }
}

/// `server-auth`. Field presence differs by recipient role: `responders`
/// only makes sense for the initiator, `initiator_connected` only for a
/// responder. Both are optional here; the signaling layer enforces which
/// one must be present for a given role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerAuth {
    #[serde(with = "serde_bytes")]
    pub your_cookie: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_bytes")]
    pub signed_keys: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responders: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator_connected: Option<bool>,
}

impl ServerAuth {
    pub fn validate(&self) -> Result<(), SaltyError> {
        check_len("server-auth", "your_cookie", &self.your_cookie, COOKIE_BYTES)?;
        if let Some(ref ids) = self.responders {
            for id in ids {
                if !(0x02..=0xff).contains(id) {
                    return Err(SaltyError::validation(format!(
                        "server-auth.responders contains out-of-range id {}",
                        id
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInitiator {}

impl NewInitiator {
    pub fn validate(&self) -> Result<(), SaltyError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewResponder {
    pub id: u8,
}

impl NewResponder {
    pub fn validate(&self) -> Result<(), SaltyError> {
        if !(0x02..=0xff).contains(&self.id) {
            return Err(SaltyError::validation(format!(
                "new-responder.id {} is out of the responder range",
                self.id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendError {
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,
}

impl SendError {
    pub fn validate(&self) -> Result<(), SaltyError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disconnected {
    pub id: u8,
}

impl Disconnected {
    pub fn validate(&self) -> Result<(), SaltyError> {
        Ok(())
    }
}

/// Client -> server, sent by the initiator once a responder has completed
/// the peer handshake, telling the server to drop every other candidate's
/// connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropResponder {
    pub id: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<u16>,
}

impl DropResponder {
    pub fn validate(&self) -> Result<(), SaltyError> {
        if !(0x02..=0xff).contains(&self.id) {
            return Err(SaltyError::validation(format!(
                "drop-responder.id {} is out of the responder range",
                self.id
            )));
        }
        Ok(())
    }
}

/// Responder -> initiator, carrying the responder's permanent public key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    #[serde(with = "serde_bytes")]
    pub key: Vec<u8>,
}

impl Token {
    pub fn validate(&self) -> Result<(), SaltyError> {
        check_len("token", "key", &self.key, PUBLIC_KEY_BYTES)
    }
}

/// Sent by both sides during the peer handshake, carrying a session
/// public key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    #[serde(with = "serde_bytes")]
    pub key: Vec<u8>,
}

impl Key {
    pub fn validate(&self) -> Result<(), SaltyError> {
        check_len("key", "key", &self.key, PUBLIC_KEY_BYTES)
    }
}

/// Sent by both sides to close out the peer handshake. `task` is used by
/// the initiator (single chosen task), `tasks` by the responder (ordered
/// list of supported tasks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auth {
    #[serde(with = "serde_bytes")]
    pub your_cookie: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<String>>,
    #[serde(default)]
    pub data: HashMap<String, rmpv::Value>,
}

impl Auth {
    pub fn validate(&self) -> Result<(), SaltyError> {
        check_len("auth", "your_cookie", &self.your_cookie, COOKIE_BYTES)?;
        if self.task.is_none() && self.tasks.is_none() {
            return Err(SaltyError::validation("auth must carry either task or tasks"));
        }
        if let Some(ref tasks) = self.tasks {
            if tasks.is_empty() {
                return Err(SaltyError::validation("auth.tasks must not be empty"));
            }
        }
        Ok(())
    }
}
