//! Minimal wiring demo: drives an initiator and a responder `Signaling`
//! instance through both handshakes and one task message, using
//! `SodiumCrypto` for real cryptography and a tiny in-process struct that
//! plays the relay server's part (the signaling core never talks to a
//! server directly -- something else always does that). Not exercised by
//! `cargo test`; run with `cargo run --bin echo_peer`.

use std::collections::HashMap;

use futures::future;
use futures::Future;

use saltyrtc_core::boxes::{ByteBox, Envelope, OpenBox};
use saltyrtc_core::close_code::CloseCode;
use saltyrtc_core::config::SaltyConfig;
use saltyrtc_core::cookie::Cookie;
use saltyrtc_core::csn::OutgoingCsn;
use saltyrtc_core::error::SaltyError;
use saltyrtc_core::keystore::{AuthToken, CryptoProvider, KeyStore, PublicKey, SharedKeyStore, SodiumCrypto};
use saltyrtc_core::messages::{ClientAuth, Message, NewResponder, ServerAuth, ServerHello, TaskMessage};
use saltyrtc_core::nonce::{Address, Nonce};
use saltyrtc_core::protocol::{HandleAction, Signaling};
use saltyrtc_core::task::Task;
use saltyrtc_core::transport::Transport;

/// A `Transport` that queues frames in memory instead of writing to a
/// socket. The demo's own loop drains it and feeds the bytes to whichever
/// side should receive them.
#[derive(Default)]
struct LoopbackTransport {
    outbox: Vec<Vec<u8>>,
}

impl Transport for LoopbackTransport {
    fn connect(&mut self) -> Box<dyn Future<Item = (), Error = SaltyError> + Send> {
        Box::new(future::ok(()))
    }

    fn send(&mut self, frame: Vec<u8>) -> Result<(), SaltyError> {
        self.outbox.push(frame);
        Ok(())
    }

    fn close(&mut self, code: CloseCode) {
        log::debug!("loopback transport closed: {:?}", code);
    }
}

/// The task offered by both peers: replies to the single "echo" message
/// type by logging what it received.
struct EchoTask {
    received: Vec<TaskMessage>,
}

impl EchoTask {
    fn new() -> Self {
        EchoTask { received: Vec::new() }
    }
}

impl Task for EchoTask {
    fn name(&self) -> &str {
        "echo.saltyrtc.org"
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
        log::info!("echo task: peer handshake done, ready for messages");
    }

    fn on_task_message(&mut self, message: TaskMessage) {
        log::info!("echo task: received {:?}", message.msg_type);
        self.received.push(message);
    }

    fn close(&mut self, reason: CloseCode) {
        log::info!("echo task: closing ({:?})", reason);
    }
}

/// Per-connection bookkeeping the tiny fake relay needs to play the
/// server's side of the server handshake for one client.
struct ClientSlot {
    shared: Option<SharedKeyStore>,
    out_csn: OutgoingCsn,
    our_cookie: Cookie,
}

impl ClientSlot {
    fn new(shared: Option<SharedKeyStore>) -> Self {
        ClientSlot { shared, out_csn: OutgoingCsn::new(), our_cookie: Cookie::random() }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Side {
    Initiator,
    Responder(u8),
}

/// A deliberately tiny stand-in for the relay server: just enough of the
/// server handshake (`server-hello`/`client-hello`/`client-auth`/
/// `server-auth`) and the `new-responder` push to drive two signaling
/// cores through both handshakes in one process.
struct FakeRelay {
    provider: SodiumCrypto,
    server_keystore: KeyStore,
    initiator: ClientSlot,
    responders: HashMap<u8, ClientSlot>,
    initiator_done: bool,
    next_responder_id: u8,
}

impl FakeRelay {
    fn new(initiator_pk: PublicKey) -> Self {
        let provider = SodiumCrypto;
        let server_keystore = KeyStore::new(&provider);
        let shared = SharedKeyStore::new(server_keystore.secret_key().clone(), initiator_pk);
        FakeRelay {
            provider,
            server_keystore,
            initiator: ClientSlot::new(Some(shared)),
            responders: HashMap::new(),
            initiator_done: false,
            next_responder_id: 2,
        }
    }

    fn server_public_key(&self) -> PublicKey {
        *self.server_keystore.public_key()
    }

    fn server_hello(&mut self, side: Side) -> Vec<u8> {
        let slot = self.slot_mut(side);
        let csn = slot.out_csn.next().expect("fresh counter never exhausts");
        let nonce = Nonce::new(slot.our_cookie, Address::SERVER, Address::SERVER, csn);
        let msg = Message::ServerHello(ServerHello { key: self.server_keystore.public_key().as_bytes().to_vec() });
        OpenBox::new(msg, nonce).encode().into_bytes()
    }

    fn add_responder(&mut self) -> (u8, Vec<u8>) {
        let id = self.next_responder_id;
        self.next_responder_id += 1;
        self.responders.insert(id, ClientSlot::new(None));
        let hello = self.server_hello(Side::Responder(id));
        (id, hello)
    }

    fn slot_mut(&mut self, side: Side) -> &mut ClientSlot {
        match side {
            Side::Initiator => &mut self.initiator,
            Side::Responder(id) => self.responders.get_mut(&id).expect("responder slot exists"),
        }
    }

    /// Feed one frame sent by `side` into the relay. Returns every frame
    /// the relay produces in response, each addressed to the side that
    /// should receive it.
    fn handle_frame(&mut self, side: Side, bytes: Vec<u8>) -> Result<Vec<(Side, Vec<u8>)>, SaltyError> {
        let bbox = ByteBox::from_slice(&bytes)?;
        if bbox.nonce.destination != Address::SERVER {
            let target = self.side_for_address(bbox.nonce.destination);
            return Ok(vec![(target, bytes)]);
        }

        if self.slot_mut(side).shared.is_none() {
            // First frame from an unknown responder: cleartext client-hello.
            let nonce = bbox.nonce;
            let obox = bbox.decode()?;
            let hello = match obox.message {
                Message::ClientHello(h) => h,
                _ => return Err(SaltyError::protocol("expected client-hello before the permanent key is known")),
            };
            let pk = PublicKey::from_slice(&hello.key)?;
            let shared = SharedKeyStore::new(self.server_keystore.secret_key().clone(), pk);
            self.slot_mut(side).shared = Some(shared);
            let _ = nonce;
            return Ok(Vec::new());
        }

        // client-auth, boxed under the server envelope.
        let shared = self.slot_mut(side).shared.clone().expect("checked above");
        let client_cookie = bbox.nonce.cookie;
        let obox = bbox.unseal(&self.provider, &Envelope::Server(&shared))?;
        let _auth: ClientAuth = match obox.message {
            Message::ClientAuth(a) => a,
            _ => return Err(SaltyError::protocol("expected client-auth")),
        };

        let mut replies = Vec::new();
        let assigned = match side {
            Side::Initiator => Address::INITIATOR,
            Side::Responder(id) => Address(id),
        };
        let slot = self.slot_mut(side);
        let csn = slot.out_csn.next()?;
        let nonce = Nonce::new(slot.our_cookie, Address::SERVER, assigned, csn);
        let auth_msg = Message::ServerAuth(match side {
            Side::Initiator => ServerAuth {
                your_cookie: client_cookie.as_bytes().to_vec(),
                signed_keys: None,
                responders: Some(self.responders.keys().copied().collect()),
                initiator_connected: None,
            },
            Side::Responder(_) => ServerAuth {
                your_cookie: client_cookie.as_bytes().to_vec(),
                signed_keys: None,
                responders: None,
                initiator_connected: Some(self.initiator_done),
            },
        });
        let shared = self.slot_mut(side).shared.clone().expect("set above");
        replies.push((side, OpenBox::new(auth_msg, nonce).seal(&self.provider, &Envelope::Server(&shared)).into_bytes()));

        match side {
            Side::Initiator => self.initiator_done = true,
            Side::Responder(id) => {
                if self.initiator_done {
                    replies.push((Side::Initiator, self.new_responder_push(id)?));
                }
            }
        }
        Ok(replies)
    }

    fn new_responder_push(&mut self, id: u8) -> Result<Vec<u8>, SaltyError> {
        let slot = &mut self.initiator;
        let csn = slot.out_csn.next()?;
        let nonce = Nonce::new(slot.our_cookie, Address::SERVER, Address::INITIATOR, csn);
        let msg = Message::NewResponder(NewResponder { id });
        let shared = slot.shared.clone().expect("initiator's server envelope established during its own handshake");
        Ok(OpenBox::new(msg, nonce).seal(&self.provider, &Envelope::Server(&shared)).into_bytes())
    }

    fn side_for_address(&self, address: Address) -> Side {
        if address.is_initiator() {
            Side::Initiator
        } else {
            Side::Responder(address.0)
        }
    }
}

/// Drain `actions`, forwarding replies through the relay and into the
/// right signaling instance, until nothing is left to process.
fn pump(
    relay: &mut FakeRelay,
    initiator: &mut Signaling,
    responder: &mut Signaling,
    side: Side,
    actions: Vec<HandleAction>,
) -> Result<(), SaltyError> {
    let mut pending: Vec<(Side, Vec<u8>)> = Vec::new();
    for action in actions {
        match action {
            HandleAction::Reply(bbox) => pending.push((side, bbox.into_bytes())),
            HandleAction::Notify(event) => log::info!("[{:?}] event: {:?}", side, event),
            HandleAction::ToTask(_) => {}
            HandleAction::Close(code) => log::info!("[{:?}] closing: {:?}", side, code),
        }
    }

    while let Some((from, bytes)) = pending.pop() {
        for (target, out) in relay.handle_frame(from, bytes)? {
            let sig = match target {
                Side::Initiator => &mut *initiator,
                Side::Responder(_) => &mut *responder,
            };
            for action in sig.handle_incoming(&out)? {
                match action {
                    HandleAction::Reply(bbox) => pending.push((target, bbox.into_bytes())),
                    HandleAction::Notify(event) => log::info!("[{:?}] event: {:?}", target, event),
                    HandleAction::ToTask(msg) => log::info!("[{:?}] task message: {:?}", target, msg.msg_type),
                    HandleAction::Close(code) => log::info!("[{:?}] closing: {:?}", target, code),
                }
            }
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let provider = SodiumCrypto;
    let initiator_keystore = KeyStore::new(&provider);
    let responder_keystore = KeyStore::new(&provider);
    let initiator_pk = *initiator_keystore.public_key();
    let auth_token = AuthToken([42u8; 32]);

    let mut relay = FakeRelay::new(initiator_pk);

    let initiator_config = SaltyConfig::new_initiator(None, vec![], Some(auth_token.clone()));
    let mut initiator = Signaling::new_initiator(
        Box::new(SodiumCrypto),
        initiator_keystore,
        initiator_config,
        vec![Box::new(EchoTask::new())],
    )?;

    let responder_config = SaltyConfig::new_responder_untrusted(None, initiator_pk, auth_token);
    let mut responder = Signaling::new_responder(
        Box::new(SodiumCrypto),
        responder_keystore,
        responder_config,
        vec![Box::new(EchoTask::new())],
    )?;

    let _transport = LoopbackTransport::default();

    let initiator_hello = relay.server_hello(Side::Initiator);
    let actions = initiator.handle_incoming(&initiator_hello)?;
    pump(&mut relay, &mut initiator, &mut responder, Side::Initiator, actions)?;

    let (responder_id, responder_hello) = relay.add_responder();
    let actions = responder.handle_incoming(&responder_hello)?;
    pump(&mut relay, &mut initiator, &mut responder, Side::Responder(responder_id), actions)?;

    log::info!("relay server public key: {:?}", relay.server_public_key());
    log::info!("initiator state: {:?}", initiator.state());
    log::info!("responder state: {:?}", responder.state());

    Ok(())
}
