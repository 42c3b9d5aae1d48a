//! Connection configuration, validated up front so misconfiguration
//! surfaces before a socket is ever opened.

use std::time::Duration;

use crate::error::SaltyError;
use crate::keystore::{AuthToken, PublicKey};

const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_MAX_CONNECT_ATTEMPTS: u32 = 3;

/// Role-specific peer configuration. A responder must authenticate to
/// exactly one initiator, either a fresh one (by public key + one-time
/// auth token, distributed out of band) or a previously trusted one (by
/// public key alone, skipping the token handshake).
pub enum PeerConfig {
    Initiator {
        /// Responder permanent keys this initiator already trusts from a
        /// prior session. A responder presenting one of these skips the
        /// auth-token exchange.
        responder_trusted_keys: Vec<PublicKey>,
        /// The one-time token handed out of band to the one untrusted
        /// responder allowed to connect. `None` if only trusted
        /// responders are expected.
        auth_token: Option<AuthToken>,
    },
    Responder {
        /// Set for a first-time connection to an untrusted initiator.
        initiator_pubkey_and_token: Option<(PublicKey, AuthToken)>,
        /// Set for a reconnection to a previously trusted initiator.
        initiator_trusted_key: Option<PublicKey>,
    },
}

/// Top-level connection configuration.
pub struct SaltyConfig {
    pub ping_interval: Duration,
    pub connect_timeout: Duration,
    pub max_connect_attempts: u32,
    /// Pin the server's long-term public key, rejecting any other.
    pub expected_server_key: Option<PublicKey>,
    pub peer: PeerConfig,
}

impl SaltyConfig {
    /// Build a config for the initiator role.
    pub fn new_initiator(
        expected_server_key: Option<PublicKey>,
        responder_trusted_keys: Vec<PublicKey>,
        auth_token: Option<AuthToken>,
    ) -> Self {
        SaltyConfig {
            ping_interval: DEFAULT_PING_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_connect_attempts: DEFAULT_MAX_CONNECT_ATTEMPTS,
            expected_server_key,
            peer: PeerConfig::Initiator { responder_trusted_keys, auth_token },
        }
    }

    /// Build a config for the responder role, authenticating to an
    /// untrusted initiator via its public key and a one-time auth token.
    pub fn new_responder_untrusted(
        expected_server_key: Option<PublicKey>,
        initiator_pubkey: PublicKey,
        auth_token: AuthToken,
    ) -> Self {
        SaltyConfig {
            ping_interval: DEFAULT_PING_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_connect_attempts: DEFAULT_MAX_CONNECT_ATTEMPTS,
            expected_server_key,
            peer: PeerConfig::Responder {
                initiator_pubkey_and_token: Some((initiator_pubkey, auth_token)),
                initiator_trusted_key: None,
            },
        }
    }

    /// Build a config for the responder role, reconnecting to a
    /// previously trusted initiator by permanent key alone.
    pub fn new_responder_trusted(expected_server_key: Option<PublicKey>, initiator_trusted_key: PublicKey) -> Self {
        SaltyConfig {
            ping_interval: DEFAULT_PING_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_connect_attempts: DEFAULT_MAX_CONNECT_ATTEMPTS,
            expected_server_key,
            peer: PeerConfig::Responder {
                initiator_pubkey_and_token: None,
                initiator_trusted_key: Some(initiator_trusted_key),
            },
        }
    }

    /// Checks the responder XOR invariant: exactly one of
    /// `initiator_pubkey_and_token` / `initiator_trusted_key` must be set.
    /// Always holds for configs built through the constructors above;
    /// exists so a config assembled by hand (e.g. deserialized from an
    /// application's own settings file) can be checked before use.
    pub fn validate(&self) -> Result<(), SaltyError> {
        if let PeerConfig::Responder { initiator_pubkey_and_token, initiator_trusted_key } = &self.peer {
            match (initiator_pubkey_and_token, initiator_trusted_key) {
                (Some(_), Some(_)) => {
                    return Err(SaltyError::validation(
                        "responder config must set exactly one of initiator_pubkey_and_token or initiator_trusted_key, not both",
                    ));
                }
                (None, None) => {
                    return Err(SaltyError::validation(
                        "responder config must set one of initiator_pubkey_and_token or initiator_trusted_key",
                    ));
                }
                _ => {}
            }
        }
        if self.max_connect_attempts == 0 {
            return Err(SaltyError::validation("max_connect_attempts must be at least 1"));
        }
        Ok(())
    }
}
