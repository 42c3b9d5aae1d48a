//! The shared signaling state machine: phase transitions, packet
//! build/parse, the server handshake (role-symmetric), and post-handshake
//! dispatch. Role-specific peer handshake logic lives in
//! [`crate::protocol::initiator`] and [`crate::protocol::responder`].

use std::collections::HashMap;

use log::{debug, info, trace, warn};

use crate::boxes::{ByteBox, Envelope, OpenBox};
use crate::close_code::CloseCode;
use crate::config::SaltyConfig;
use crate::error::SaltyError;
use crate::events::{Event, EventHandler, EventRegistry};
use crate::keystore::{CryptoProvider, KeyStore, PublicKey, SharedKeyStore};
use crate::messages::{self, ClientAuth, ClientHello, Message, ServerAuth};
use crate::nonce::{Address, Nonce};
use crate::protocol::initiator;
use crate::protocol::peer::{InitiatorContext, ResponderContext, ServerContext};
use crate::protocol::responder;
use crate::protocol::types::{HandleAction, Role, ServerHandshakeState, SignalingState};
use crate::task::Task;

pub struct Signaling {
    pub(crate) provider: Box<dyn CryptoProvider>,
    pub(crate) keystore: KeyStore,
    pub(crate) config: SaltyConfig,
    pub(crate) role: Role,
    pub(crate) state: SignalingState,
    pub(crate) our_address: Address,
    pub(crate) server: ServerContext,
    pub(crate) server_permanent_key: Option<PublicKey>,
    pub(crate) initiator: Option<InitiatorContext>,
    pub(crate) responders: HashMap<u8, ResponderContext>,
    pub(crate) active_responder: Option<u8>,
    pub(crate) tasks: Vec<Box<dyn Task>>,
    pub(crate) task: Option<Box<dyn Task>>,
    pub(crate) events: EventRegistry,
}

impl Signaling {
    pub fn new_initiator(
        provider: Box<dyn CryptoProvider>,
        keystore: KeyStore,
        config: SaltyConfig,
        tasks: Vec<Box<dyn Task>>,
    ) -> Result<Self, SaltyError> {
        config.validate()?;
        if !matches!(&config.peer, crate::config::PeerConfig::Initiator { .. }) {
            return Err(SaltyError::internal("initiator signaling requires an initiator peer config"));
        }
        Ok(Signaling::new(provider, keystore, config, Role::Initiator, tasks))
    }

    pub fn new_responder(
        provider: Box<dyn CryptoProvider>,
        keystore: KeyStore,
        config: SaltyConfig,
        tasks: Vec<Box<dyn Task>>,
    ) -> Result<Self, SaltyError> {
        config.validate()?;
        if !matches!(&config.peer, crate::config::PeerConfig::Responder { .. }) {
            return Err(SaltyError::internal("responder signaling requires a responder peer config"));
        }
        Ok(Signaling::new(provider, keystore, config, Role::Responder, tasks))
    }

    fn new(provider: Box<dyn CryptoProvider>, keystore: KeyStore, config: SaltyConfig, role: Role, tasks: Vec<Box<dyn Task>>) -> Self {
        Signaling {
            provider,
            keystore,
            config,
            role,
            state: SignalingState::New,
            our_address: Address::SERVER,
            server: ServerContext::new(),
            server_permanent_key: None,
            initiator: None,
            responders: HashMap::new(),
            active_responder: None,
            tasks,
            task: None,
            events: EventRegistry::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SignalingState {
        self.state
    }

    pub fn register_event_handler(&mut self, handler: Box<dyn EventHandler>) {
        self.events.register(handler);
    }

    /// Process one inbound frame. Errors encountered while handling the
    /// frame never propagate; they are converted to a `reset_connection`
    /// and surfaced as `HandleAction`s in the returned vector instead.
    pub fn handle_incoming(&mut self, bytes: &[u8]) -> Result<Vec<HandleAction>, SaltyError> {
        trace!("handle_incoming: {} bytes in state {:?}", bytes.len(), self.state);
        match self.process_incoming(bytes) {
            Ok(actions) => Ok(actions),
            Err(err) => match err.close_code(self.role) {
                Some(code) => {
                    warn!("resetting connection after {}: {:?}", err, code);
                    Ok(self.reset_connection(code))
                }
                None => {
                    warn!("connection-level error, no close code applies: {}", err);
                    self.state = SignalingState::Error;
                    let event = Event::ConnectionLost(err.to_string());
                    self.events.dispatch(&event);
                    Ok(vec![HandleAction::Notify(event)])
                }
            },
        }
    }

    /// Send opaque task data through the running task's session envelope.
    pub fn handle_task_send(&mut self, msg_type: &str, data: HashMap<String, rmpv::Value>) -> Result<HandleAction, SaltyError> {
        if self.state != SignalingState::Task {
            return Err(SaltyError::internal("cannot send task data before the task phase"));
        }
        let payload = messages::encode_task_payload(msg_type, &data);
        let (peer_address, csn, cookie, shared_key) = match self.role {
            Role::Initiator => {
                let addr = self.active_responder.ok_or_else(|| SaltyError::internal("no active responder"))?;
                let ctx = self.responders.get_mut(&addr).ok_or_else(|| SaltyError::internal("active responder record missing"))?;
                let csn = ctx.outgoing_csn.next()?;
                let shared = ctx.session_shared_key.clone().ok_or_else(|| SaltyError::internal("session key not established"))?;
                (ctx.address, csn, ctx.cookies.ours, shared)
            }
            Role::Responder => {
                let ctx = self.initiator.as_mut().ok_or_else(|| SaltyError::internal("no initiator record"))?;
                let csn = ctx.outgoing_csn.next()?;
                let shared = ctx.session_shared_key.clone().ok_or_else(|| SaltyError::internal("session key not established"))?;
                (ctx.address, csn, ctx.cookies.ours, shared)
            }
        };
        let nonce = Nonce::new(cookie, self.our_address, peer_address, csn);
        let ciphertext = shared_key.encrypt(self.provider.as_ref(), &nonce.encode(), &payload);
        Ok(HandleAction::Reply(ByteBox::new(ciphertext, nonce)))
    }

    /// Application-initiated disconnect.
    pub fn close(&mut self, code: CloseCode) -> Vec<HandleAction> {
        self.reset_connection(code)
    }

    fn process_incoming(&mut self, bytes: &[u8]) -> Result<Vec<HandleAction>, SaltyError> {
        let bbox = ByteBox::from_slice(bytes)?;
        match self.state {
            SignalingState::New | SignalingState::WsConnecting => {
                trace!("{:?} -> {:?}", self.state, SignalingState::ServerHandshake);
                self.state = SignalingState::ServerHandshake;
                self.process_server_handshake(bbox)
            }
            SignalingState::ServerHandshake => self.process_server_handshake(bbox),
            SignalingState::PeerHandshake => self.process_peer_handshake(bbox),
            SignalingState::Task => self.process_task_frame(bbox),
            SignalingState::Closing | SignalingState::Closed | SignalingState::Error => {
                Err(SaltyError::protocol("frame received after session end"))
            }
        }
    }

    fn process_server_handshake(&mut self, bbox: ByteBox) -> Result<Vec<HandleAction>, SaltyError> {
        let nonce = bbox.nonce;
        if nonce.source != Address::SERVER {
            return Err(SaltyError::protocol("server handshake frame must originate from the server"));
        }
        match self.server.handshake_state {
            ServerHandshakeState::New | ServerHandshakeState::HelloSent => {
                if nonce.destination != Address::SERVER {
                    return Err(SaltyError::protocol("unexpected destination before address assignment"));
                }
                self.server.incoming_csn.validate(nonce.csn)?;
                let obox = bbox.decode()?;
                let hello = match obox.message {
                    Message::ServerHello(h) => h,
                    _ => return Err(SaltyError::protocol("expected server-hello")),
                };
                debug!("received server-hello");
                let server_key = PublicKey::from_slice(&hello.key)?;
                self.server_permanent_key = Some(server_key);
                self.server.permanent_shared_key = Some(SharedKeyStore::new(self.keystore.secret_key().clone(), server_key));
                self.server.cookie_pair = Some(crate::cookie::CookiePair::new(nonce.cookie));

                let mut actions = Vec::new();
                if self.role == Role::Responder {
                    actions.push(self.send_client_hello()?);
                    self.server.handshake_state = ServerHandshakeState::HelloSent;
                }
                actions.push(self.send_client_auth()?);
                self.server.handshake_state = ServerHandshakeState::AuthSent;
                Ok(actions)
            }
            ServerHandshakeState::AuthSent => {
                if nonce.destination != self.our_address && self.our_address != Address::SERVER {
                    return Err(SaltyError::protocol("server-auth destination does not match our assigned address"));
                }
                self.server.incoming_csn.validate(nonce.csn)?;
                let shared = self.server.permanent_shared_key.clone().expect("set when server-hello arrived");
                let obox = bbox.unseal(self.provider.as_ref(), &Envelope::Server(&shared))?;
                let auth = match obox.message {
                    Message::ServerAuth(a) => a,
                    _ => return Err(SaltyError::protocol("expected server-auth")),
                };
                debug!("received server-auth");
                self.handle_server_auth(nonce, auth)
            }
            ServerHandshakeState::Done => Err(SaltyError::protocol("unexpected frame: server handshake already complete")),
        }
    }

    fn send_client_hello(&mut self) -> Result<HandleAction, SaltyError> {
        let csn = self.server.outgoing_csn.next()?;
        let cookie = self.server.cookie_pair.as_ref().expect("drawn right after server-hello").ours;
        let nonce = Nonce::new(cookie, Address::SERVER, Address::SERVER, csn);
        let msg = Message::ClientHello(ClientHello { key: self.keystore.public_key().as_bytes().to_vec() });
        Ok(HandleAction::Reply(OpenBox::new(msg, nonce).encode()))
    }

    fn send_client_auth(&mut self) -> Result<HandleAction, SaltyError> {
        let csn = self.server.outgoing_csn.next()?;
        let pair = self.server.cookie_pair.as_ref().expect("drawn right after server-hello");
        let nonce = Nonce::new(pair.ours, Address::SERVER, Address::SERVER, csn);
        let your_key = match (&self.role, &self.config.peer) {
            (Role::Responder, crate::config::PeerConfig::Responder { initiator_trusted_key: Some(key), .. }) => {
                Some(key.as_bytes().to_vec())
            }
            _ => None,
        };
        let msg = Message::ClientAuth(ClientAuth {
            your_cookie: pair.theirs.as_bytes().to_vec(),
            subprotocols: Some(vec!["saltyrtc-1.0".to_string()]),
            ping_interval: Some(self.config.ping_interval.as_secs() as u32),
            your_key,
        });
        let shared = self.server.permanent_shared_key.as_ref().expect("set right after server-hello");
        Ok(HandleAction::Reply(OpenBox::new(msg, nonce).seal(self.provider.as_ref(), &Envelope::Server(shared))))
    }

    fn handle_server_auth(&mut self, nonce: Nonce, auth: ServerAuth) -> Result<Vec<HandleAction>, SaltyError> {
        let pair = self.server.cookie_pair.as_ref().expect("set right after server-hello");
        if auth.your_cookie != pair.ours.as_bytes().to_vec() {
            return Err(SaltyError::protocol("server-auth.your_cookie does not match"));
        }
        if let Some(expected) = self.config.expected_server_key {
            let signed = auth
                .signed_keys
                .as_ref()
                .ok_or_else(|| SaltyError::protocol("server pinned but server-auth carries no signed_keys"))?;
            let shared = SharedKeyStore::new(self.keystore.secret_key().clone(), expected);
            let plaintext = shared.decrypt(self.provider.as_ref(), &nonce.encode(), signed)?;
            if plaintext.len() != 64 || plaintext[32..64].to_vec() != self.keystore.public_key().as_bytes().to_vec() {
                return Err(SaltyError::protocol("signed_keys verification failed"));
            }
        }

        self.our_address = nonce.destination;
        match self.role {
            Role::Initiator => {
                if self.our_address != Address::INITIATOR {
                    return Err(SaltyError::protocol("server assigned a non-initiator address to the initiator"));
                }
                let ids = auth
                    .responders
                    .ok_or_else(|| SaltyError::protocol("server-auth to initiator must carry responders"))?;
                for id in ids {
                    self.responders.entry(id).or_insert_with(|| ResponderContext::new(Address(id)));
                }
            }
            Role::Responder => {
                if !self.our_address.is_responder() {
                    return Err(SaltyError::protocol("server assigned a non-responder address to the responder"));
                }
                let connected = auth
                    .initiator_connected
                    .ok_or_else(|| SaltyError::protocol("server-auth to responder must carry initiator_connected"))?;
                if connected {
                    self.initiator = Some(InitiatorContext::new());
                }
            }
        }

        self.server.handshake_state = ServerHandshakeState::Done;
        info!("server handshake done, assigned address {:?}", self.our_address);
        trace!("{:?} -> {:?}", self.state, SignalingState::PeerHandshake);
        self.state = SignalingState::PeerHandshake;
        self.events.dispatch(&Event::ServerHandshakeDone);
        let mut actions = vec![HandleAction::Notify(Event::ServerHandshakeDone)];
        actions.extend(self.init_peer_handshake()?);
        Ok(actions)
    }

    fn init_peer_handshake(&mut self) -> Result<Vec<HandleAction>, SaltyError> {
        match self.role {
            Role::Initiator => Ok(initiator::bootstrap(self)),
            Role::Responder => {
                if self.initiator.is_some() {
                    responder::init_peer_handshake(self)
                } else {
                    Ok(Vec::new())
                }
            }
        }
    }

    fn process_peer_handshake(&mut self, bbox: ByteBox) -> Result<Vec<HandleAction>, SaltyError> {
        let nonce = bbox.nonce;
        if nonce.source == Address::SERVER {
            return self.process_server_push(bbox);
        }
        match self.role {
            Role::Responder => responder::handle_frame(self, bbox),
            Role::Initiator => initiator::handle_frame(self, bbox),
        }
    }

    fn process_task_frame(&mut self, bbox: ByteBox) -> Result<Vec<HandleAction>, SaltyError> {
        let nonce = bbox.nonce;
        if nonce.source == Address::SERVER {
            return self.process_server_push(bbox);
        }
        let (peer_csn_ok, shared_key, expected_source) = match self.role {
            Role::Initiator => {
                let addr = self.active_responder.ok_or_else(|| SaltyError::protocol("no active responder in task phase"))?;
                let ctx = self.responders.get_mut(&addr).ok_or_else(|| SaltyError::internal("active responder record missing"))?;
                ctx.incoming_csn.validate(nonce.csn)?;
                ctx.cookies.observe(nonce.cookie)?;
                (true, ctx.session_shared_key.clone(), ctx.address)
            }
            Role::Responder => {
                let ctx = self.initiator.as_mut().ok_or_else(|| SaltyError::internal("no initiator record"))?;
                ctx.incoming_csn.validate(nonce.csn)?;
                ctx.cookies.observe(nonce.cookie)?;
                (true, ctx.session_shared_key.clone(), ctx.address)
            }
        };
        let _ = peer_csn_ok;
        if nonce.source != expected_source {
            return Err(SaltyError::protocol("task frame source does not match the negotiated peer"));
        }
        let shared = shared_key.ok_or_else(|| SaltyError::internal("session key missing in task phase"))?;
        let plaintext = shared.decrypt(self.provider.as_ref(), &nonce.encode(), &bbox.bytes)?;
        let task_msg = messages::decode_task_payload(&plaintext)?;

        let supported = self
            .task
            .as_ref()
            .map(|t| t.supported_message_types().iter().any(|t| *t == task_msg.msg_type))
            .unwrap_or(false);
        if !supported {
            return Err(SaltyError::protocol(format!("task message type {} not supported", task_msg.msg_type)));
        }
        if let Some(task) = self.task.as_mut() {
            task.on_task_message(task_msg.clone());
        }
        Ok(vec![HandleAction::ToTask(task_msg)])
    }

    fn process_server_push(&mut self, bbox: ByteBox) -> Result<Vec<HandleAction>, SaltyError> {
        self.server.incoming_csn.validate(bbox.nonce.csn)?;
        let shared = self.server.permanent_shared_key.clone().ok_or_else(|| SaltyError::internal("server key missing"))?;
        let obox = bbox.unseal(self.provider.as_ref(), &Envelope::Server(&shared))?;
        match obox.message {
            Message::NewInitiator(_) => match self.role {
                Role::Responder => responder::handle_new_initiator(self),
                Role::Initiator => Err(SaltyError::protocol("new-initiator received by an initiator")),
            },
            Message::NewResponder(msg) => match self.role {
                Role::Initiator => initiator::handle_new_responder(self, msg.id),
                Role::Responder => Err(SaltyError::protocol("new-responder received by a responder")),
            },
            Message::SendError(_) => {
                self.events.dispatch(&Event::PeerDisconnected);
                Err(SaltyError::protocol("server reported send-error: signaling connection lost"))
            }
            Message::Disconnected(_) => {
                self.events.dispatch(&Event::PeerDisconnected);
                Ok(vec![HandleAction::Notify(Event::PeerDisconnected)])
            }
            _ => Err(SaltyError::protocol("unexpected message type from server")),
        }
    }

    /// §4.8: transition to `CLOSING`, notify the task, clear session
    /// state, transition to `CLOSED`, unless the close code is
    /// `HANDOVER`, in which case the task keeps driving the channel.
    pub(crate) fn reset_connection(&mut self, code: CloseCode) -> Vec<HandleAction> {
        info!("reset_connection: {:?}", code);
        self.state = SignalingState::Closing;
        let mut actions = vec![HandleAction::Close(code), HandleAction::Notify(Event::Closing(code))];
        if let Some(task) = self.task.as_mut() {
            task.close(code);
        }
        self.events.dispatch(&Event::Closing(code));

        if code == CloseCode::Handover {
            debug!("handover close code: staying in the task phase on a data channel");
            self.state = SignalingState::Task;
            return actions;
        }

        self.initiator = None;
        self.responders.clear();
        self.active_responder = None;
        self.task = None;
        self.state = SignalingState::Closed;
        trace!("{:?}", self.state);
        self.events.dispatch(&Event::Closed);
        actions.push(HandleAction::Notify(Event::Closed));
        actions
    }
}
