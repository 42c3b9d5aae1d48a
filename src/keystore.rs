//! Key material: long-term keypairs, auth tokens, and the pluggable crypto
//! provider boundary described in the protocol's external interfaces.

use sodiumoxide::crypto::box_ as nacl_box;
use sodiumoxide::crypto::secretbox as nacl_secretbox;

use crate::error::SaltyError;

pub const PUBLIC_KEY_BYTES: usize = 32;
pub const SECRET_KEY_BYTES: usize = 32;
pub const SYMMETRIC_KEY_BYTES: usize = 32;
pub const NONCE_BYTES: usize = 24;

/// A NaCl box public key. Used both for long-term permanent keys and for
/// ephemeral per-session keys -- the protocol distinguishes those by
/// context, not by type.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct PublicKey(pub [u8; PUBLIC_KEY_BYTES]);

impl PublicKey {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SaltyError> {
        if bytes.len() != PUBLIC_KEY_BYTES {
            return Err(SaltyError::InvalidKey(format!(
                "public key must be {} bytes, got {}",
                PUBLIC_KEY_BYTES,
                bytes.len()
            )));
        }
        let mut arr = [0u8; PUBLIC_KEY_BYTES];
        arr.copy_from_slice(bytes);
        Ok(PublicKey(arr))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_BYTES] {
        &self.0
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", data_encoding::HEXLOWER.encode(&self.0))
    }
}

/// A NaCl box secret key. Never printed.
#[derive(Clone)]
pub struct SecretKey(pub [u8; SECRET_KEY_BYTES]);

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey(<redacted>)")
    }
}

/// Ephemeral per-session keys share the same representation as the
/// permanent ones -- the protocol only distinguishes them by which
/// handshake phase they're used in.
pub type SessionPublicKey = PublicKey;
pub type SessionSecretKey = SecretKey;

/// A one-use 32-byte symmetric key, shared out-of-band, used exactly once
/// for the responder's `token` message.
#[derive(Clone)]
pub struct AuthToken(pub [u8; SYMMETRIC_KEY_BYTES]);

impl AuthToken {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SaltyError> {
        if bytes.len() != SYMMETRIC_KEY_BYTES {
            return Err(SaltyError::InvalidKey(format!(
                "auth token must be {} bytes, got {}",
                SYMMETRIC_KEY_BYTES,
                bytes.len()
            )));
        }
        let mut arr = [0u8; SYMMETRIC_KEY_BYTES];
        arr.copy_from_slice(bytes);
        Ok(AuthToken(arr))
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthToken(<redacted>)")
    }
}

/// The cryptographic primitive provider the core is built against. The
/// default implementation ([`SodiumCrypto`]) wraps `sodiumoxide`, the
/// teacher crate's own crypto dependency; anything else implementing the
/// NaCl box/secretbox contract can be substituted.
pub trait CryptoProvider {
    fn keypair(&self) -> (PublicKey, SecretKey);
    fn box_encrypt(&self, our_sk: &SecretKey, peer_pk: &PublicKey, nonce: &[u8; NONCE_BYTES], plaintext: &[u8]) -> Vec<u8>;
    fn box_decrypt(&self, our_sk: &SecretKey, peer_pk: &PublicKey, nonce: &[u8; NONCE_BYTES], ciphertext: &[u8]) -> Result<Vec<u8>, SaltyError>;
    fn secretbox_encrypt(&self, key: &AuthToken, nonce: &[u8; NONCE_BYTES], plaintext: &[u8]) -> Vec<u8>;
    fn secretbox_decrypt(&self, key: &AuthToken, nonce: &[u8; NONCE_BYTES], ciphertext: &[u8]) -> Result<Vec<u8>, SaltyError>;
}

/// The default [`CryptoProvider`], backed by `sodiumoxide`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SodiumCrypto;

impl CryptoProvider for SodiumCrypto {
    fn keypair(&self) -> (PublicKey, SecretKey) {
        let (pk, sk) = nacl_box::gen_keypair();
        (PublicKey(pk.0), SecretKey(sk.0))
    }

    fn box_encrypt(&self, our_sk: &SecretKey, peer_pk: &PublicKey, nonce: &[u8; NONCE_BYTES], plaintext: &[u8]) -> Vec<u8> {
        let sk = nacl_box::SecretKey(our_sk.0);
        let pk = nacl_box::PublicKey(peer_pk.0);
        let n = nacl_box::Nonce(*nonce);
        nacl_box::seal(plaintext, &n, &pk, &sk)
    }

    fn box_decrypt(&self, our_sk: &SecretKey, peer_pk: &PublicKey, nonce: &[u8; NONCE_BYTES], ciphertext: &[u8]) -> Result<Vec<u8>, SaltyError> {
        let sk = nacl_box::SecretKey(our_sk.0);
        let pk = nacl_box::PublicKey(peer_pk.0);
        let n = nacl_box::Nonce(*nonce);
        nacl_box::open(ciphertext, &n, &pk, &sk).map_err(|_| SaltyError::crypto("box authentication failed"))
    }

    fn secretbox_encrypt(&self, key: &AuthToken, nonce: &[u8; NONCE_BYTES], plaintext: &[u8]) -> Vec<u8> {
        let k = nacl_secretbox::Key(key.0);
        let n = nacl_secretbox::Nonce(*nonce);
        nacl_secretbox::seal(plaintext, &n, &k)
    }

    fn secretbox_decrypt(&self, key: &AuthToken, nonce: &[u8; NONCE_BYTES], ciphertext: &[u8]) -> Result<Vec<u8>, SaltyError> {
        let k = nacl_secretbox::Key(key.0);
        let n = nacl_secretbox::Nonce(*nonce);
        nacl_secretbox::open(ciphertext, &n, &k).map_err(|_| SaltyError::crypto("secretbox authentication failed"))
    }
}

/// Our own long-term keypair, plus whichever crypto provider backs it.
pub struct KeyStore {
    public_key: PublicKey,
    secret_key: SecretKey,
}

impl KeyStore {
    /// Generate a fresh permanent keypair.
    pub fn new(provider: &dyn CryptoProvider) -> Self {
        let (public_key, secret_key) = provider.keypair();
        KeyStore { public_key, secret_key }
    }

    pub fn from_keypair(public_key: PublicKey, secret_key: SecretKey) -> Self {
        KeyStore { public_key, secret_key }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }
}

/// A pairing of our secret key with a known peer public key, used to
/// encrypt/decrypt a box envelope without re-threading both keys through
/// every call site. This is the "permanent-shared-key cache" named in the
/// data model -- cheap to build, so it's recomputed per peer record
/// rather than literally memoizing a NaCl precomputed key.
#[derive(Clone)]
pub struct SharedKeyStore {
    our_secret_key: SecretKey,
    peer_public_key: PublicKey,
}

impl SharedKeyStore {
    pub fn new(our_secret_key: SecretKey, peer_public_key: PublicKey) -> Self {
        SharedKeyStore { our_secret_key, peer_public_key }
    }

    pub fn peer_public_key(&self) -> &PublicKey {
        &self.peer_public_key
    }

    pub fn encrypt(&self, provider: &dyn CryptoProvider, nonce: &[u8; NONCE_BYTES], plaintext: &[u8]) -> Vec<u8> {
        provider.box_encrypt(&self.our_secret_key, &self.peer_public_key, nonce, plaintext)
    }

    pub fn decrypt(&self, provider: &dyn CryptoProvider, nonce: &[u8; NONCE_BYTES], ciphertext: &[u8]) -> Result<Vec<u8>, SaltyError> {
        provider.box_decrypt(&self.our_secret_key, &self.peer_public_key, nonce, ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_round_trip() {
        let provider = SodiumCrypto;
        let (pk_a, sk_a) = provider.keypair();
        let (pk_b, sk_b) = provider.keypair();
        let nonce = [7u8; NONCE_BYTES];
        let plaintext = b"hello saltyrtc";

        let ciphertext = provider.box_encrypt(&sk_a, &pk_b, &nonce, plaintext);
        let decrypted = provider.box_decrypt(&sk_b, &pk_a, &nonce, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn box_encrypt_is_deterministic_for_same_key_and_nonce() {
        let provider = SodiumCrypto;
        let (pk_b, sk_a) = (PublicKey([1u8; 32]), SecretKey([2u8; 32]));
        let nonce = [9u8; NONCE_BYTES];
        let a = provider.box_encrypt(&sk_a, &pk_b, &nonce, b"same");
        let b = provider.box_encrypt(&sk_a, &pk_b, &nonce, b"same");
        assert_eq!(a, b);
    }

    #[test]
    fn secretbox_round_trip() {
        let provider = SodiumCrypto;
        let token = AuthToken([3u8; SYMMETRIC_KEY_BYTES]);
        let nonce = [5u8; NONCE_BYTES];
        let plaintext = b"token payload";

        let ciphertext = provider.secretbox_encrypt(&token, &nonce, plaintext);
        let decrypted = provider.secretbox_decrypt(&token, &nonce, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn box_decrypt_rejects_tampering() {
        let provider = SodiumCrypto;
        let (pk_a, sk_a) = provider.keypair();
        let (pk_b, sk_b) = provider.keypair();
        let nonce = [1u8; NONCE_BYTES];
        let mut ciphertext = provider.box_encrypt(&sk_a, &pk_b, &nonce, b"hello");
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xff;
        assert!(provider.box_decrypt(&sk_b, &pk_a, &nonce, &ciphertext).is_err());
    }
}
