//! The transport boundary: how frames actually reach the relay server.
//! The signaling core never owns a socket; it only builds and consumes
//! `ByteBox`es and relies on a `Transport` implementation to move bytes.

use futures::Future;

use crate::close_code::CloseCode;
use crate::error::SaltyError;

/// A duplex binary frame channel to the signaling relay server.
///
/// Implementations wrap whatever WebSocket client the embedding
/// application already uses; the core only ever calls `connect` once per
/// session and then pushes/pulls whole frames.
pub trait Transport {
    /// Open the connection. Resolves once the transport is ready to send
    /// and receive frames, or fails with a connection-level error.
    fn connect(&mut self) -> Box<dyn Future<Item = (), Error = SaltyError> + Send>;

    /// Queue one frame for sending. Frames are sent in the order queued.
    fn send(&mut self, frame: Vec<u8>) -> Result<(), SaltyError>;

    /// Close the underlying connection with the given close code.
    fn close(&mut self, code: CloseCode);
}
