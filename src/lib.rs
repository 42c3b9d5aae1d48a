//! `saltyrtc-core`: an end-to-end encrypted signaling protocol core for
//! bootstrapping WebRTC peer connections through an untrusted relay
//! server.
//!
//! The crate owns the wire protocol and the signaling state machine; it
//! never opens a socket itself. Embedders implement [`Transport`] over
//! whatever WebSocket client they already have and drive the state
//! machine by feeding inbound frames to
//! [`Signaling::handle_incoming`](protocol::Signaling::handle_incoming).

#[macro_use]
extern crate nom;

#[macro_use]
mod binary_io;

pub mod boxes;
pub mod close_code;
pub mod config;
pub mod cookie;
pub mod csn;
pub mod error;
pub mod events;
pub mod keystore;
pub mod messages;
pub mod nonce;
pub mod protocol;
pub mod task;
pub mod transport;

pub use close_code::CloseCode;
pub use config::{PeerConfig, SaltyConfig};
pub use error::SaltyError;
pub use events::{Event, EventHandler};
pub use keystore::{AuthToken, CryptoProvider, KeyStore, PublicKey, SecretKey, SodiumCrypto};
pub use protocol::{HandleAction, Role, Signaling, SignalingState};
pub use task::Task;
pub use transport::Transport;
