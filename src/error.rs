//! Error kinds for the signaling core.
//!
//! Every variant here corresponds to one of the error kinds from the
//! protocol design: validation, serialization, protocol, crypto, key,
//! internal and connection errors. Handling an inbound frame never lets
//! one of these escape to the transport callback directly -- they are
//! always translated into a [`CloseCode`](crate::close_code::CloseCode)
//! by [`reset_connection`](crate::protocol::signaling::Signaling::reset_connection).

use thiserror::Error;

use crate::close_code::CloseCode;
use crate::protocol::types::Role;

/// All ways the signaling core can fail.
#[derive(Debug, Error)]
pub enum SaltyError {
    /// Malformed message content (wrong field type, out-of-range value, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// Codec failure, or a `type` field that is missing/not a string/unknown.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Violates the state machine or framing contract.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// MAC failure or key mismatch while encrypting/decrypting.
    #[error("crypto error: {context}")]
    Crypto {
        context: &'static str,
        /// Set when this is the very first key message the initiator received
        /// from a peer -- changes the close code to `INITIATOR_COULD_NOT_DECRYPT`.
        first_key: bool,
    },

    /// A supplied key had the wrong length.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A local invariant was violated (e.g. session key absent when required).
    #[error("internal error: {0}")]
    Internal(String),

    /// The transport layer failed to connect or send.
    #[error("connection error: {0}")]
    Connection(String),
}

impl SaltyError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        SaltyError::Validation(msg.into())
    }

    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        SaltyError::Serialization(msg.into())
    }

    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        SaltyError::Protocol(msg.into())
    }

    pub fn crypto(context: &'static str) -> Self {
        SaltyError::Crypto { context, first_key: false }
    }

    pub fn crypto_first_key(context: &'static str) -> Self {
        SaltyError::Crypto { context, first_key: true }
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        SaltyError::Internal(msg.into())
    }

    /// Map this error to the close code it forces a `reset_connection` with.
    ///
    /// `ConnectionError` has no mapping: it never reaches
    /// `reset_connection`, it is surfaced to the application and the
    /// global state moves to `Error` directly.
    pub fn close_code(&self, role: Role) -> Option<CloseCode> {
        match self {
            SaltyError::Validation(_)
            | SaltyError::Serialization(_)
            | SaltyError::Protocol(_)
            | SaltyError::InvalidKey(_) => Some(CloseCode::ProtocolError),
            SaltyError::Crypto { first_key, .. } => {
                if *first_key && role == Role::Initiator {
                    Some(CloseCode::InitiatorCouldNotDecrypt)
                } else {
                    Some(CloseCode::ProtocolError)
                }
            }
            SaltyError::Internal(_) => Some(CloseCode::InternalError),
            SaltyError::Connection(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SaltyError>;
