//! Session state: identifiers, messages, and the session bundle.
//!
//! A [`Session`] owns the symmetric cipher derived from the handshake and
//! an append-only message history. The [`SessionId`] is deterministic:
//! both peers hash the same ordered host pair and arrive at the same
//! 8-byte value without ever transmitting it.

use std::fmt;
use std::sync::Mutex;

use cast5::cipher::KeyInit;
use cast5::Cast5;
use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};

use crate::error::SottoError;
use crate::SECRET_LEN;

/// Width of a session identifier in bytes.
pub const SESSION_ID_LEN: usize = 8;

/// Deterministic 8-byte session identifier.
///
/// Derived as the first 8 bytes of SHA-256 over the connecting peer's host
/// concatenated with the accepting peer's host (ports excluded). The
/// argument order is fixed by role, not by which side computes it, so the
/// initiator's `derive(local, remote)` and the responder's
/// `derive(remote, local)` agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Derive the identifier for a session between two hosts.
    ///
    /// `connecting_host` is always the dialing side, `accepting_host` the
    /// listening side, regardless of which peer runs this function.
    pub fn derive(connecting_host: &str, accepting_host: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(connecting_host.as_bytes());
        hasher.update(accepting_host.as_bytes());
        let digest = hasher.finalize();
        let mut raw = [0u8; SESSION_ID_LEN];
        raw.copy_from_slice(&digest[..SESSION_ID_LEN]);
        SessionId(u64::from_be_bytes(raw))
    }

    /// Reconstruct an identifier from its wire integer form.
    pub fn from_wire(raw: i64) -> Self {
        SessionId(raw as u64)
    }

    /// The identifier as a bencode integer (bit-cast, value-preserving).
    pub fn to_wire(self) -> i64 {
        self.0 as i64
    }

    /// The identifier's 8 raw bytes, big-endian.
    pub fn as_bytes(self) -> [u8; SESSION_ID_LEN] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A single sent or received message.
///
/// The timestamp is local wall-clock time and is never transmitted;
/// `content` holds the plaintext - ciphertext exists only on the wire.
#[derive(Debug, Clone)]
pub struct Message {
    /// The session this message belongs to.
    pub session: SessionId,
    /// Local time of composition or receipt.
    pub timestamp: DateTime<Local>,
    /// Plaintext content.
    pub content: String,
}

impl Message {
    /// Create a message stamped with the current local time.
    pub fn now(session: SessionId, content: impl Into<String>) -> Self {
        Self {
            session,
            timestamp: Local::now(),
            content: content.into(),
        }
    }
}

/// An established messaging session with one remote peer.
///
/// Constructed only by a successful handshake. The cipher is immutable and
/// its block operations take `&self`, so concurrent sends and receives on
/// the same session cannot corrupt each other; the history has its own
/// lock and appends in completion order.
pub struct Session {
    id: SessionId,
    cipher: Cast5,
    peer: String,
    history: Mutex<Vec<Message>>,
}

impl Session {
    /// Build a session from an assembled 16-byte secret.
    pub(crate) fn new(id: SessionId, secret: &[u8; SECRET_LEN], peer: String) -> Result<Self, SottoError> {
        let cipher = Cast5::new_from_slice(secret)
            .map_err(|_| SottoError::ProtocolViolation("session secret has wrong length".into()))?;
        Ok(Self {
            id,
            cipher,
            peer,
            history: Mutex::new(Vec::new()),
        })
    }

    /// The session identifier shared with the peer.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Host of the remote participant.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub(crate) fn cipher(&self) -> &Cast5 {
        &self.cipher
    }

    /// Append a message to the history.
    pub(crate) fn push_history(&self, message: Message) {
        self.history.lock().unwrap().push(message);
    }

    /// Snapshot of the message history, oldest first.
    pub fn history(&self) -> Vec<Message> {
        self.history.lock().unwrap().clone()
    }

    /// Number of messages exchanged on this session so far.
    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap().len()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("history_len", &self.history_len())
            .finish_non_exhaustive()
    }
}
