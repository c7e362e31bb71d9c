//! # Sotto - pairwise encrypted messaging sessions
//!
//! Sotto lets two peers establish a shared symmetric session over TCP
//! without any pre-shared secret, then exchange confidential text messages
//! over that session.
//!
//! ## Overview
//!
//! - The initiator dials the responder and both run a two-round handshake:
//!   each side contributes one 8-byte half of the 16-byte session secret,
//!   wrapped under the other side's RSA public key (OAEP/SHA-256)
//! - Both peers derive the **same** 8-byte session identifier from the
//!   ordered pair of endpoint hosts, so neither side has to transmit it
//! - Message content is enciphered with CAST5 in independent 8-byte
//!   blocks over a length-prefixed, zero-padded plaintext
//! - Wire records are bencode dictionaries, decoded straight off the stream
//!
//! ## Security Model
//!
//! The handshake trusts whatever public key the peer presents. There is
//! **no authentication** of peer identity - this is trust-on-first-use by
//! design and callers who need identity verification must layer it on top.
//! Blocks are enciphered independently (no chaining), so equal plaintext
//! blocks produce equal ciphertext blocks.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sotto::{establish_outbound, send, MemoryKeyStore, MemoryRegistry};
//!
//! # async fn run() -> Result<(), sotto::SottoError> {
//! let keystore = Arc::new(MemoryKeyStore::new());
//! let registry = Arc::new(MemoryRegistry::new());
//!
//! let session = establish_outbound("10.0.0.2", &*keystore, &*registry).await?;
//! send(&session, "hello").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`handshake`]: session establishment (initiator and responder)
//! - [`messaging`]: send/receive over an established session
//! - [`frame`]: block-cipher framing of message content
//! - [`wire`]: bencode wire records
//! - [`keystore`], [`registry`], [`session`]: identity and session state

/// Protocol version string carried in handshake records.
pub const PROTOCOL_VERSION: &str = "0.2";

/// Well-known TCP port for inbound handshakes and messages.
pub const DEFAULT_PORT: u16 = 8081;

/// Length of the assembled symmetric session secret.
pub const SECRET_LEN: usize = 16;

/// Length of each peer's contribution to the session secret.
pub const HALF_KEY_LEN: usize = 8;

pub mod error;
pub mod frame;
pub mod handshake;
pub mod keystore;
pub mod messaging;
pub mod registry;
pub mod session;
pub mod wire;

// Re-export commonly used types at the crate root
pub use error::SottoError;
pub use handshake::{accept_inbound, establish_outbound, establish_outbound_port, initiate, respond};
pub use keystore::{KeyStore, MemoryKeyStore, DEFAULT_KEY_BITS};
pub use messaging::{receive, send, send_over, send_to, serve_connection, Inbound};
pub use registry::{MemoryRegistry, SessionRegistry};
pub use session::{Message, Session, SessionId};
