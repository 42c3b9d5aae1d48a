//! Open and sealed envelopes: a message plus its nonce, before and after
//! encryption. Mirrors the open-box/byte-box split of the reference
//! saltyrtc client, generalized to the four envelope kinds the protocol
//! actually uses (cleartext, server, peer-permanent, peer-session,
//! auth-token).

use crate::error::SaltyError;
use crate::keystore::{AuthToken, CryptoProvider, SharedKeyStore};
use crate::messages::Message;
use crate::nonce::{Nonce, NONCE_BYTES as FRAME_NONCE_BYTES};

/// Which key material a frame is wrapped with. Chosen by the signaling
/// layer according to which handshake phase produced the message.
pub enum Envelope<'a> {
    /// Server-hello only: sent as plain msgpack bytes, no encryption.
    Cleartext,
    /// Server handshake messages after server-hello: boxed with our
    /// permanent key and the server's permanent key.
    Server(&'a SharedKeyStore),
    /// `token`/`key` during the peer handshake: boxed with our permanent
    /// key and the peer's permanent key.
    PeerPermanent(&'a SharedKeyStore),
    /// `auth` and everything in the task phase: boxed with our session
    /// key and the peer's session key.
    PeerSession(&'a SharedKeyStore),
    /// The responder's `token` message alone: secretboxed with the
    /// one-use auth token shared out of band.
    AuthToken(&'a AuthToken),
}

/// An unencrypted message paired with the nonce it will be (or was) sent
/// under.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenBox {
    pub message: Message,
    pub nonce: Nonce,
}

impl OpenBox {
    pub fn new(message: Message, nonce: Nonce) -> Self {
        OpenBox { message, nonce }
    }

    /// Encode without encryption. Only valid for `server-hello`.
    pub fn encode(self) -> ByteBox {
        let bytes = self.message.to_msgpack();
        ByteBox::new(bytes, self.nonce)
    }

    /// Encrypt under the given envelope kind.
    pub fn seal(self, provider: &dyn CryptoProvider, envelope: &Envelope) -> ByteBox {
        let plaintext = self.message.to_msgpack();
        let nonce_bytes = self.nonce.encode();
        let bytes = match envelope {
            Envelope::Cleartext => plaintext,
            Envelope::Server(shared) | Envelope::PeerPermanent(shared) | Envelope::PeerSession(shared) => {
                shared.encrypt(provider, &nonce_bytes, &plaintext)
            }
            Envelope::AuthToken(token) => provider.secretbox_encrypt(token, &nonce_bytes, &plaintext),
        };
        ByteBox::new(bytes, self.nonce)
    }
}

/// A nonce plus message bytes, possibly still encrypted.
#[derive(Debug, Clone, PartialEq)]
pub struct ByteBox {
    pub bytes: Vec<u8>,
    pub nonce: Nonce,
}

impl ByteBox {
    pub fn new(bytes: Vec<u8>, nonce: Nonce) -> Self {
        ByteBox { bytes, nonce }
    }

    /// Split a raw frame into its leading nonce and trailing payload.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SaltyError> {
        if bytes.len() <= FRAME_NONCE_BYTES {
            return Err(SaltyError::serialization("message is too short"));
        }
        let nonce = Nonce::decode(&bytes[..FRAME_NONCE_BYTES])?;
        Ok(ByteBox::new(bytes[FRAME_NONCE_BYTES..].to_vec(), nonce))
    }

    /// Decode without decryption. Only valid for `server-hello`.
    pub fn decode(self) -> Result<OpenBox, SaltyError> {
        let message = Message::from_msgpack(&self.bytes)?;
        Ok(OpenBox::new(message, self.nonce))
    }

    /// Decrypt under the given envelope kind, then decode the resulting
    /// plaintext as a catalog message.
    pub fn unseal(self, provider: &dyn CryptoProvider, envelope: &Envelope) -> Result<OpenBox, SaltyError> {
        let nonce_bytes = self.nonce.encode();
        let plaintext = match envelope {
            Envelope::Cleartext => self.bytes,
            Envelope::Server(shared) | Envelope::PeerPermanent(shared) | Envelope::PeerSession(shared) => {
                shared.decrypt(provider, &nonce_bytes, &self.bytes)?
            }
            Envelope::AuthToken(token) => provider.secretbox_decrypt(token, &nonce_bytes, &self.bytes)?,
        };
        let message = Message::from_msgpack(&plaintext)?;
        Ok(OpenBox::new(message, self.nonce))
    }

    pub fn into_bytes(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FRAME_NONCE_BYTES + self.bytes.len());
        bytes.extend_from_slice(&self.nonce.encode());
        bytes.extend(self.bytes);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::Cookie;
    use crate::csn::CombinedSequenceNumber;
    use crate::keystore::SodiumCrypto;
    use crate::messages::ServerHello;
    use crate::nonce::Address;

    fn test_nonce() -> Nonce {
        Nonce::new(
            Cookie([1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]),
            Address(17),
            Address(18),
            CombinedSequenceNumber { overflow: 258, sequence: 50_595_078 },
        )
    }

    #[test]
    fn byte_box_from_slice_rejects_too_short() {
        assert!(ByteBox::from_slice(&[0u8; 24]).is_err());
        assert!(ByteBox::from_slice(&[0u8; 10]).is_err());
    }

    #[test]
    fn cleartext_round_trip() {
        let msg = Message::ServerHello(ServerHello { key: vec![1u8; 32] });
        let obox = OpenBox::new(msg, test_nonce());
        let bbox = obox.encode();
        let bytes = bbox.into_bytes();

        let parsed = ByteBox::from_slice(&bytes).unwrap();
        let decoded = parsed.decode().unwrap();
        assert_eq!(decoded.message.type_name(), "server-hello");
    }

    #[test]
    fn peer_permanent_envelope_round_trip() {
        let provider = SodiumCrypto;
        let (pk_a, sk_a) = provider.keypair();
        let (pk_b, sk_b) = provider.keypair();

        let shared_tx = SharedKeyStore::new(sk_a, pk_b);
        let shared_rx = SharedKeyStore::new(sk_b, pk_a);

        let msg = Message::Token(crate::messages::Token { key: vec![7u8; 32] });
        let obox = OpenBox::new(msg, test_nonce());
        let bbox = obox.seal(&provider, &Envelope::PeerPermanent(&shared_tx));

        let decoded = bbox.unseal(&provider, &Envelope::PeerPermanent(&shared_rx)).unwrap();
        match decoded.message {
            Message::Token(t) => assert_eq!(t.key, vec![7u8; 32]),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn auth_token_envelope_round_trip() {
        let provider = SodiumCrypto;
        let token = AuthToken([4u8; 32]);
        let msg = Message::Token(crate::messages::Token { key: vec![9u8; 32] });
        let obox = OpenBox::new(msg, test_nonce());
        let bbox = obox.seal(&provider, &Envelope::AuthToken(&token));

        let decoded = bbox.unseal(&provider, &Envelope::AuthToken(&token)).unwrap();
        assert_eq!(decoded.message.type_name(), "token");
    }

    #[test]
    fn wrong_key_fails_to_unseal() {
        let provider = SodiumCrypto;
        let (pk_a, sk_a) = provider.keypair();
        let (_pk_b, sk_b) = provider.keypair();
        let (pk_wrong, _sk_wrong) = provider.keypair();

        let shared_tx = SharedKeyStore::new(sk_a, pk_wrong);
        let shared_rx = SharedKeyStore::new(sk_b, pk_a);

        let msg = Message::Token(crate::messages::Token { key: vec![1u8; 32] });
        let obox = OpenBox::new(msg, test_nonce());
        let bbox = obox.seal(&provider, &Envelope::PeerPermanent(&shared_tx));

        assert!(bbox.unseal(&provider, &Envelope::PeerPermanent(&shared_rx)).is_err());
    }
}
