//! The 24-byte nonce: `cookie[16] || source[1] || destination[1] ||
//! overflow_be[2] || sequence_be[4]`.
//!
//! Decoding is written as a `nom` grammar in the teacher's style (see
//! `binary_io.rs`), since this is the one place in the core that still
//! benefits from a declarative fixed-width parser the way the teacher's
//! TCP packet framing did.

use nom::{be_u16, be_u32, be_u8};

use crate::binary_io::{NomFromBytes, ToBytes};
use crate::cookie::Cookie;
use crate::csn::CombinedSequenceNumber;
use crate::error::SaltyError;

pub const NONCE_BYTES: usize = 24;

/// A one-byte protocol address. `0x00` is the server, `0x01` is always the
/// initiator, `0x02..=0xff` are responder slots.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Address(pub u8);

impl Address {
    pub const SERVER: Address = Address(0x00);
    pub const INITIATOR: Address = Address(0x01);

    pub fn is_server(self) -> bool {
        self.0 == 0x00
    }

    pub fn is_initiator(self) -> bool {
        self.0 == 0x01
    }

    pub fn is_responder(self) -> bool {
        self.0 >= 0x02
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address(0x{:02x})", self.0)
    }
}

/// The fixed-layout nonce prefixed to every frame on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Nonce {
    pub cookie: Cookie,
    pub source: Address,
    pub destination: Address,
    pub csn: CombinedSequenceNumber,
}

impl Nonce {
    pub fn new(cookie: Cookie, source: Address, destination: Address, csn: CombinedSequenceNumber) -> Self {
        Nonce { cookie, source, destination, csn }
    }

    pub fn encode(self) -> [u8; NONCE_BYTES] {
        let mut buf = [0u8; NONCE_BYTES];
        buf[0..16].copy_from_slice(self.cookie.as_bytes());
        buf[16] = self.source.0;
        buf[17] = self.destination.0;
        buf[18..24].copy_from_slice(&self.csn.to_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SaltyError> {
        if bytes.len() != NONCE_BYTES {
            return Err(SaltyError::serialization(format!(
                "invalid nonce length: expected {}, got {}",
                NONCE_BYTES,
                bytes.len()
            )));
        }
        Nonce::nom_from_bytes(bytes)
            .ok_or_else(|| SaltyError::serialization("malformed nonce"))
    }
}

nom_from_bytes!(Nonce, do_parse!(
    cookie: call!(Cookie::nom_parse_bytes) >>
    source: be_u8 >>
    destination: be_u8 >>
    overflow: be_u16 >>
    sequence: be_u32 >>
    (Nonce {
        cookie,
        source: Address(source),
        destination: Address(destination),
        csn: CombinedSequenceNumber { overflow, sequence },
    })
));

to_bytes!(Nonce, result, self {
    result.extend_from_slice(&self.encode());
});

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::Arbitrary;

    fn sample_nonce() -> Nonce {
        Nonce::new(
            Cookie([1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]),
            Address(17),
            Address(18),
            CombinedSequenceNumber { overflow: 258, sequence: 50_595_078 },
        )
    }

    #[test]
    fn encode_decode_round_trip() {
        let nonce = sample_nonce();
        let bytes = nonce.encode();
        let decoded = Nonce::decode(&bytes).unwrap();
        assert_eq!(nonce, decoded);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(Nonce::decode(&[0u8; 23]).is_err());
        assert!(Nonce::decode(&[0u8; 25]).is_err());
    }

    #[test]
    fn address_classification() {
        assert!(Address::SERVER.is_server());
        assert!(Address::INITIATOR.is_initiator());
        assert!(Address(2).is_responder());
        assert!(Address(0xff).is_responder());
        assert!(!Address(1).is_responder());
    }

    #[test]
    fn layout_matches_spec_byte_offsets() {
        let nonce = sample_nonce();
        let bytes = nonce.encode();
        assert_eq!(&bytes[0..16], nonce.cookie.as_bytes());
        assert_eq!(bytes[16], 17);
        assert_eq!(bytes[17], 18);
        assert_eq!(&bytes[18..24], &nonce.csn.to_bytes()[..]);
    }

    impl quickcheck::Arbitrary for Nonce {
        fn arbitrary<G: quickcheck::Gen>(g: &mut G) -> Self {
            let mut cookie_bytes = [0u8; 16];
            for b in cookie_bytes.iter_mut() {
                *b = u8::arbitrary(g);
            }
            Nonce::new(
                Cookie(cookie_bytes),
                Address(u8::arbitrary(g)),
                Address(u8::arbitrary(g)),
                CombinedSequenceNumber { overflow: u16::arbitrary(g), sequence: u32::arbitrary(g) },
            )
        }
    }

    quickcheck::quickcheck! {
        /// §8 "Round trips / laws": `nonce_decode(nonce_encode(n)) == n` for every `n`.
        fn prop_nonce_round_trips(nonce: Nonce) -> bool {
            Nonce::decode(&nonce.encode()).unwrap() == nonce
        }
    }
}
