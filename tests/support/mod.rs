//! Shared test harness: a minimal stand-in for the relay server and for
//! whichever peer the test isn't directly exercising. None of this is a
//! full second `Signaling` instance -- each helper builds exactly the
//! frame bytes the real counterpart would have produced, so tests can
//! assert on one side's outbound sequence without running two state
//! machines in lockstep.

#![allow(dead_code)]

use std::collections::HashMap;

use saltyrtc_core::boxes::{ByteBox, Envelope, OpenBox};
use saltyrtc_core::close_code::CloseCode;
use saltyrtc_core::cookie::Cookie;
use saltyrtc_core::csn::OutgoingCsn;
use saltyrtc_core::error::SaltyError;
use saltyrtc_core::keystore::{CryptoProvider, KeyStore, PublicKey, SecretKey, SharedKeyStore, SodiumCrypto};
use saltyrtc_core::messages::{Message, ServerAuth, ServerHello, TaskMessage};
use saltyrtc_core::nonce::{Address, Nonce};
use saltyrtc_core::protocol::HandleAction;
use saltyrtc_core::task::Task;

/// A task that records what it's told and never rejects anything. Used on
/// whichever side the test isn't inspecting message-by-message.
pub struct RecordingTask {
    name: String,
    pub received: Vec<TaskMessage>,
    pub handshake_done: bool,
    pub closed_with: Option<CloseCode>,
}

impl RecordingTask {
    pub fn new(name: &str) -> Self {
        RecordingTask { name: name.to_string(), received: Vec::new(), handshake_done: false, closed_with: None }
    }
}

impl Task for RecordingTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_message_types(&self) -> &[&str] {
        &["echo"]
    }

    fn init(&mut self, _data: &HashMap<String, rmpv::Value>) -> Result<(), SaltyError> {
        Ok(())
    }

    fn data_for_auth(&self) -> HashMap<String, rmpv::Value> {
        HashMap::new()
    }

    fn on_peer_handshake_done(&mut self) {
        self.handshake_done = true;
    }

    fn on_task_message(&mut self, message: TaskMessage) {
        self.received.push(message);
    }

    fn close(&mut self, reason: CloseCode) {
        self.closed_with = Some(reason);
    }
}

pub fn task(name: &str) -> Box<dyn Task> {
    Box::new(RecordingTask::new(name))
}

/// Stands in for the relay server: owns a server keypair and the per-client
/// cookie/CSN bookkeeping needed to produce plausible `server-hello` and
/// `server-auth` frames.
pub struct ServerSim {
    pub provider: SodiumCrypto,
    pub keystore: KeyStore,
    pub cookie: Cookie,
    csn: OutgoingCsn,
}

impl ServerSim {
    pub fn new() -> Self {
        let provider = SodiumCrypto;
        let keystore = KeyStore::new(&provider);
        ServerSim { provider, keystore, cookie: Cookie::random(), csn: OutgoingCsn::new() }
    }

    pub fn public_key(&self) -> PublicKey {
        *self.keystore.public_key()
    }

    pub fn shared_with(&self, client_pk: PublicKey) -> SharedKeyStore {
        SharedKeyStore::new(self.keystore.secret_key().clone(), client_pk)
    }

    pub fn hello_frame(&mut self) -> Vec<u8> {
        let csn = self.csn.next().unwrap();
        let nonce = Nonce::new(self.cookie, Address::SERVER, Address::SERVER, csn);
        let msg = Message::ServerHello(ServerHello { key: self.keystore.public_key().as_bytes().to_vec() });
        OpenBox::new(msg, nonce).encode().into_bytes()
    }

    pub fn auth_frame(&mut self, shared: &SharedKeyStore, destination: Address, body: ServerAuth) -> Vec<u8> {
        let csn = self.csn.next().unwrap();
        let nonce = Nonce::new(self.cookie, Address::SERVER, destination, csn);
        OpenBox::new(Message::ServerAuth(body), nonce).seal(&self.provider, &Envelope::Server(shared)).into_bytes()
    }

    /// Build an arbitrary server-originated push frame (`new-initiator`,
    /// `new-responder`, `send-error`, `disconnected`), boxed under the
    /// server envelope.
    pub fn push_frame(&mut self, shared: &SharedKeyStore, destination: Address, message: Message) -> Vec<u8> {
        let csn = self.csn.next().unwrap();
        let nonce = Nonce::new(self.cookie, Address::SERVER, destination, csn);
        OpenBox::new(message, nonce).seal(&self.provider, &Envelope::Server(shared)).into_bytes()
    }
}

/// Pull every `Reply` frame's raw bytes out of one batch of actions, in
/// order, discarding notifications/close/task actions.
pub fn replies(actions: &[HandleAction]) -> Vec<ByteBox> {
    actions
        .iter()
        .filter_map(|a| match a {
            HandleAction::Reply(bbox) => Some(bbox.clone()),
            _ => None,
        })
        .collect()
}

pub fn decode_cleartext(bbox: ByteBox) -> Message {
    bbox.decode().expect("cleartext frame decodes").message
}

pub fn decode_sealed(bbox: ByteBox, provider: &dyn CryptoProvider, envelope: &Envelope) -> Message {
    bbox.unseal(provider, envelope).expect("frame decrypts under the expected envelope").message
}

/// A stand-in peer identity: a permanent keypair plus the session keypair
/// generated once the peer handshake starts, enough to build and decrypt
/// frames as if this were a real counterpart.
pub struct PeerIdentity {
    pub provider: SodiumCrypto,
    pub public_key: PublicKey,
    pub secret_key: SecretKey,
    pub cookie: Cookie,
    csn: OutgoingCsn,
    pub session_public_key: Option<PublicKey>,
    pub session_secret_key: Option<SecretKey>,
}

impl PeerIdentity {
    pub fn new() -> Self {
        let provider = SodiumCrypto;
        let (public_key, secret_key) = provider.keypair();
        PeerIdentity {
            provider,
            public_key,
            secret_key,
            cookie: Cookie::random(),
            csn: OutgoingCsn::new(),
            session_public_key: None,
            session_secret_key: None,
        }
    }

    pub fn generate_session_keypair(&mut self) {
        let (pk, sk) = self.provider.keypair();
        self.session_public_key = Some(pk);
        self.session_secret_key = Some(sk);
    }

    pub fn next_csn(&mut self) -> saltyrtc_core::csn::CombinedSequenceNumber {
        self.csn.next().unwrap()
    }

    pub fn permanent_shared_with(&self, peer_pk: PublicKey) -> SharedKeyStore {
        SharedKeyStore::new(self.secret_key.clone(), peer_pk)
    }

    pub fn session_shared_with(&self, peer_session_pk: PublicKey) -> SharedKeyStore {
        SharedKeyStore::new(
            self.session_secret_key.clone().expect("session keypair generated before use"),
            peer_session_pk,
        )
    }
}
