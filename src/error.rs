//! Error taxonomy for session establishment and messaging.

use thiserror::Error;

use crate::session::SessionId;

/// Errors that can occur while establishing sessions or exchanging messages.
///
/// Every failure is surfaced to the immediate caller; nothing is retried
/// internally, and a failed handshake never registers a session.
#[derive(Error, Debug)]
pub enum SottoError {
    /// Stream open, read, or write failure. Fatal to the current operation.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Malformed or incomplete wire record, or a corrupt message frame.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The peer replied with an unexpected record type or omitted a
    /// required field - a declined-session condition.
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// RSA decryption of a received key half failed.
    #[error("failed to unwrap peer key half")]
    KeyUnwrapFailed,

    /// An incoming message names a session that was never registered.
    #[error("no session registered for {0}")]
    UnknownSession(SessionId),

    /// RSA keypair generation or wrapping failure.
    #[error("rsa failure: {0}")]
    Key(#[from] rsa::Error),
}
