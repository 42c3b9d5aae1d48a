//! Combined sequence numbers: a 48-bit `(overflow:16 || sequence:32)`
//! counter that orders packets per (peer, direction).

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use rand::RngCore;

use crate::error::SaltyError;

pub const CSN_BYTES: usize = 6;

/// A single `(overflow, sequence)` pair. Field declaration order matters:
/// the derived `Ord` compares `overflow` before `sequence`, which is
/// exactly the lexicographic ordering the protocol requires.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub struct CombinedSequenceNumber {
    pub overflow: u16,
    pub sequence: u32,
}

impl CombinedSequenceNumber {
    pub fn to_bytes(self) -> [u8; CSN_BYTES] {
        let mut buf = [0u8; CSN_BYTES];
        {
            let mut w: &mut [u8] = &mut buf;
            w.write_u16::<BigEndian>(self.overflow).expect("fixed-size buffer");
            w.write_u32::<BigEndian>(self.sequence).expect("fixed-size buffer");
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != CSN_BYTES {
            return None;
        }
        let mut r = bytes;
        let overflow = r.read_u16::<BigEndian>().ok()?;
        let sequence = r.read_u32::<BigEndian>().ok()?;
        Some(CombinedSequenceNumber { overflow, sequence })
    }
}

/// Generates the strictly-advancing sequence of CSNs this side stamps on
/// its own outgoing packets to one peer.
#[derive(Clone, Copy, Debug)]
pub struct OutgoingCsn {
    current: CombinedSequenceNumber,
    used: bool,
}

impl OutgoingCsn {
    /// A fresh generator: random 32-bit sequence, overflow zero.
    pub fn new() -> Self {
        let sequence = rand::thread_rng().next_u32();
        OutgoingCsn {
            current: CombinedSequenceNumber { overflow: 0, sequence },
            used: false,
        }
    }

    /// The CSN to stamp on the next outgoing packet. Advances the
    /// internal counter for next time (post-increment), except on the
    /// very first call where the freshly-drawn value is used as-is.
    pub fn next(&mut self) -> Result<CombinedSequenceNumber, SaltyError> {
        if !self.used {
            self.used = true;
            return Ok(self.current);
        }
        self.advance()?;
        Ok(self.current)
    }

    fn advance(&mut self) -> Result<(), SaltyError> {
        if self.current.sequence == u32::max_value() {
            if self.current.overflow == u16::max_value() {
                return Err(SaltyError::internal(
                    "combined sequence number exhausted: overflow and sequence both saturated",
                ));
            }
            self.current.overflow += 1;
            self.current.sequence = 0;
        } else {
            self.current.sequence += 1;
        }
        Ok(())
    }
}

impl Default for OutgoingCsn {
    fn default() -> Self {
        OutgoingCsn::new()
    }
}

/// Validates that each inbound CSN from one peer strictly increases over
/// the last one seen. The first packet just seeds the tracker.
#[derive(Clone, Copy, Debug, Default)]
pub struct IncomingCsnTracker {
    last: Option<CombinedSequenceNumber>,
}

impl IncomingCsnTracker {
    pub fn new() -> Self {
        IncomingCsnTracker { last: None }
    }

    pub fn validate(&mut self, csn: CombinedSequenceNumber) -> Result<(), SaltyError> {
        if let Some(last) = self.last {
            if csn <= last {
                return Err(SaltyError::protocol(
                    "combined sequence number did not strictly increase",
                ));
            }
        }
        self.last = Some(csn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::Arbitrary;

    #[test]
    fn round_trip() {
        let csn = CombinedSequenceNumber { overflow: 258, sequence: 50_595_078 };
        let bytes = csn.to_bytes();
        assert_eq!(CombinedSequenceNumber::from_bytes(&bytes), Some(csn));
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = CombinedSequenceNumber { overflow: 0, sequence: u32::max_value() };
        let b = CombinedSequenceNumber { overflow: 1, sequence: 0 };
        assert!(a < b);
    }

    #[test]
    fn outgoing_csn_rolls_sequence_into_overflow() {
        let mut csn = OutgoingCsn {
            current: CombinedSequenceNumber { overflow: 0, sequence: u32::max_value() },
            used: true,
        };
        let next = csn.next().unwrap();
        assert_eq!(next, CombinedSequenceNumber { overflow: 1, sequence: 0 });
    }

    #[test]
    fn outgoing_csn_exhaustion_is_fatal() {
        let mut csn = OutgoingCsn {
            current: CombinedSequenceNumber {
                overflow: u16::max_value(),
                sequence: u32::max_value(),
            },
            used: true,
        };
        assert!(csn.next().is_err());
    }

    #[test]
    fn first_call_does_not_advance() {
        let mut csn = OutgoingCsn::new();
        let first = csn.next().unwrap();
        assert_eq!(first, csn.current);
    }

    #[test]
    fn incoming_tracker_rejects_replay_and_regression() {
        let mut tracker = IncomingCsnTracker::new();
        let first = CombinedSequenceNumber { overflow: 0, sequence: 5 };
        tracker.validate(first).unwrap();
        // Exact replay.
        assert!(tracker.validate(first).is_err());
        // Regression.
        let lower = CombinedSequenceNumber { overflow: 0, sequence: 4 };
        assert!(tracker.validate(lower).is_err());
        // Strict advance is fine.
        let next = CombinedSequenceNumber { overflow: 0, sequence: 6 };
        assert!(tracker.validate(next).is_ok());
    }

    impl quickcheck::Arbitrary for CombinedSequenceNumber {
        fn arbitrary<G: quickcheck::Gen>(g: &mut G) -> Self {
            CombinedSequenceNumber { overflow: u16::arbitrary(g), sequence: u32::arbitrary(g) }
        }
    }

    quickcheck::quickcheck! {
        /// Byte round trip for every `(overflow, sequence)` pair.
        fn prop_csn_bytes_round_trip(csn: CombinedSequenceNumber) -> bool {
            CombinedSequenceNumber::from_bytes(&csn.to_bytes()) == Some(csn)
        }

        /// §8: a tracker seeded with `first` accepts any strictly greater CSN
        /// and rejects any `<=` one.
        fn prop_incoming_tracker_is_strict(first: CombinedSequenceNumber, other: CombinedSequenceNumber) -> bool {
            let mut tracker = IncomingCsnTracker::new();
            tracker.validate(first).unwrap();
            let accepted = tracker.validate(other).is_ok();
            accepted == (other > first)
        }
    }
}
