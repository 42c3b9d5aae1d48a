//! WebSocket close code taxonomy used when tearing down a connection.

/// Close codes the signaling core may ask the transport to close with, plus
/// the ones it may observe the transport close with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CloseCode {
    /// `1000` -- normal closure, requested by the application.
    ClosingNormal,
    /// `1001` -- endpoint is going away (e.g. page navigation).
    GoingAway,
    /// `1002` -- generic WebSocket protocol error.
    ProtocolError,
    /// `1006` -- abnormal closure. Transport-only: never sent on purpose,
    /// only ever observed.
    Abnormal,
    /// `3000` -- the server's responder slot table for this path is full.
    PathFull,
    /// `3001` -- SaltyRTC-level protocol error.
    SaltyProtocolError,
    /// `3002` -- local invariant violated.
    InternalError,
    /// `3003` -- channel handed over to a data channel.
    Handover,
    /// `3004` -- the initiator dropped this responder in favor of another.
    DroppedByInitiator,
    /// `3005` -- the initiator could not decrypt the responder's first key message.
    InitiatorCouldNotDecrypt,
    /// `3006` -- no task name is shared between initiator and responder.
    NoSharedTask,
}

impl CloseCode {
    pub fn code(self) -> u16 {
        match self {
            CloseCode::ClosingNormal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::Abnormal => 1006,
            CloseCode::PathFull => 3000,
            CloseCode::SaltyProtocolError => 3001,
            CloseCode::InternalError => 3002,
            CloseCode::Handover => 3003,
            CloseCode::DroppedByInitiator => 3004,
            CloseCode::InitiatorCouldNotDecrypt => 3005,
            CloseCode::NoSharedTask => 3006,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1000 => CloseCode::ClosingNormal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1006 => CloseCode::Abnormal,
            3000 => CloseCode::PathFull,
            3001 => CloseCode::SaltyProtocolError,
            3002 => CloseCode::InternalError,
            3003 => CloseCode::Handover,
            3004 => CloseCode::DroppedByInitiator,
            3005 => CloseCode::InitiatorCouldNotDecrypt,
            3006 => CloseCode::NoSharedTask,
            _ => return None,
        })
    }

    /// True for close codes that only ever arise from the transport itself,
    /// never something the core asks the transport to send.
    pub fn is_transport_only(self) -> bool {
        matches!(self, CloseCode::Abnormal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_codes() {
        let all = [
            CloseCode::ClosingNormal,
            CloseCode::GoingAway,
            CloseCode::ProtocolError,
            CloseCode::Abnormal,
            CloseCode::PathFull,
            CloseCode::SaltyProtocolError,
            CloseCode::InternalError,
            CloseCode::Handover,
            CloseCode::DroppedByInitiator,
            CloseCode::InitiatorCouldNotDecrypt,
            CloseCode::NoSharedTask,
        ];
        for code in all.iter() {
            assert_eq!(CloseCode::from_code(code.code()), Some(*code));
        }
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(CloseCode::from_code(9999), None);
    }

    #[test]
    fn only_abnormal_is_transport_only() {
        assert!(CloseCode::Abnormal.is_transport_only());
        assert!(!CloseCode::ProtocolError.is_transport_only());
    }
}
