//! Session establishment: the two-round key-exchange dialogue.
//!
//! Both peers contribute one 8-byte half of the 16-byte session secret,
//! each half crossing the wire only wrapped under the other side's RSA
//! public key:
//!
//! 1. Initiator sends NEW SESSION with its public modulus and exponent
//! 2. Responder replies OKAY with its own public key and a wrapped half
//! 3. Initiator replies OKAY with its wrapped half
//! 4. Both assemble the secret - responder's half first, initiator's
//!    second - key the cipher, and register the session
//!
//! The session identifier is never transmitted: each side derives it from
//! the ordered (connecting host, accepting host) pair observed on its own
//! socket.
//!
//! The peer's public key is taken entirely on trust; no identity
//! verification is performed at this layer. Any failure aborts the
//! handshake with a typed error and registers nothing; retry policy
//! belongs to the caller.

use std::sync::Arc;

use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::SottoError;
use crate::keystore::{self, KeyStore};
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionId};
use crate::wire::{self, HandshakeRecord, NEW_SESSION, OKAY};
use crate::{DEFAULT_PORT, HALF_KEY_LEN, SECRET_LEN};

/// Dial `remote` on the well-known port and run the initiator side.
///
/// On success the session is registered and returned; the connection is
/// closed either way.
pub async fn establish_outbound(
    remote: &str,
    keystore: &dyn KeyStore,
    registry: &dyn SessionRegistry,
) -> Result<Arc<Session>, SottoError> {
    establish_outbound_port(remote, DEFAULT_PORT, keystore, registry).await
}

/// Like [`establish_outbound`] with an explicit port.
pub async fn establish_outbound_port(
    remote: &str,
    port: u16,
    keystore: &dyn KeyStore,
    registry: &dyn SessionRegistry,
) -> Result<Arc<Session>, SottoError> {
    let mut stream = TcpStream::connect((remote, port)).await?;
    let connecting = stream.local_addr()?.ip().to_string();
    let accepting = stream.peer_addr()?.ip().to_string();

    let result = initiate(&mut stream, &connecting, &accepting, keystore, registry).await;
    let _ = stream.shutdown().await;
    result
}

/// Run the responder side on an accepted connection.
///
/// The stream is always shut down on exit, success or failure.
pub async fn accept_inbound(
    mut stream: TcpStream,
    keystore: &dyn KeyStore,
    registry: &dyn SessionRegistry,
) -> Result<Arc<Session>, SottoError> {
    let connecting = stream.peer_addr()?.ip().to_string();
    let accepting = stream.local_addr()?.ip().to_string();

    let result = respond(&mut stream, &connecting, &accepting, keystore, registry).await;
    let _ = stream.shutdown().await;
    result
}

/// Initiator side of the exchange over an already-open stream.
///
/// `connecting_host` is this side's own host, `accepting_host` the peer's.
pub async fn initiate<S>(
    stream: &mut S,
    connecting_host: &str,
    accepting_host: &str,
    keystore: &dyn KeyStore,
    registry: &dyn SessionRegistry,
) -> Result<Arc<Session>, SottoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let key = keystore.keypair()?;
    let public = key.to_public_key();
    let id = SessionId::derive(connecting_host, accepting_host);
    debug!(%id, peer = accepting_host, "opening session");

    let request = HandshakeRecord::new_session(public.n().to_str_radix(10), exponent(&public)?);
    wire::write_record(stream, &request.to_bytes()?).await?;

    let response = HandshakeRecord::from_bytes(&wire::read_record(stream).await?)?;
    if response.kind != OKAY {
        return Err(SottoError::HandshakeRejected(format!(
            "peer replied {:?}",
            response.kind
        )));
    }
    let peer_key = peer_public_key(&response)?;
    let wrapped = required_half(&response)?;

    let mut secret = [0u8; SECRET_LEN];
    // Responder's half occupies bytes 0..8 on both sides.
    let their_half = keystore::unwrap_half(&key, wrapped)?;
    secret[..HALF_KEY_LEN].copy_from_slice(&check_half(&their_half)?);

    let own_half = keystore::fresh_half();
    secret[HALF_KEY_LEN..].copy_from_slice(&own_half);
    let wrapped_own = keystore::wrap_half(&peer_key, &own_half)?;

    // Final OKAY carries only the half - the peer already has our key.
    let reply = HandshakeRecord::okay(None, wrapped_own);
    wire::write_record(stream, &reply.to_bytes()?).await?;

    let session = Arc::new(Session::new(id, &secret, accepting_host.to_string())?);
    registry.add(session.clone());
    info!(%id, peer = accepting_host, "session established");
    Ok(session)
}

/// Responder side of the exchange over an already-open stream.
///
/// `connecting_host` is the peer's host, `accepting_host` this side's own.
pub async fn respond<S>(
    stream: &mut S,
    connecting_host: &str,
    accepting_host: &str,
    keystore: &dyn KeyStore,
    registry: &dyn SessionRegistry,
) -> Result<Arc<Session>, SottoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = HandshakeRecord::from_bytes(&wire::read_record(stream).await?)?;
    respond_parsed(request, stream, connecting_host, accepting_host, keystore, registry).await
}

/// Responder continuation once the opening record is already parsed.
pub(crate) async fn respond_parsed<S>(
    request: HandshakeRecord,
    stream: &mut S,
    connecting_host: &str,
    accepting_host: &str,
    keystore: &dyn KeyStore,
    registry: &dyn SessionRegistry,
) -> Result<Arc<Session>, SottoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if request.kind != NEW_SESSION {
        return Err(SottoError::HandshakeRejected(format!(
            "expected new-session record, got {:?}",
            request.kind
        )));
    }
    let peer_key = peer_public_key(&request)?;

    let key = keystore.keypair()?;
    let public = key.to_public_key();
    // Same ordered pair as the initiator: connecting host first.
    let id = SessionId::derive(connecting_host, accepting_host);
    debug!(%id, peer = connecting_host, "accepting session");

    let mut secret = [0u8; SECRET_LEN];
    let own_half = keystore::fresh_half();
    secret[..HALF_KEY_LEN].copy_from_slice(&own_half);
    let wrapped_own = keystore::wrap_half(&peer_key, &own_half)?;

    let response = HandshakeRecord::okay(
        Some((public.n().to_str_radix(10), exponent(&public)?)),
        wrapped_own,
    );
    wire::write_record(stream, &response.to_bytes()?).await?;

    let reply = HandshakeRecord::from_bytes(&wire::read_record(stream).await?)?;
    if reply.kind != OKAY {
        return Err(SottoError::HandshakeRejected(format!(
            "peer replied {:?}",
            reply.kind
        )));
    }
    let wrapped = required_half(&reply)?;
    let their_half = keystore::unwrap_half(&key, wrapped)?;
    secret[HALF_KEY_LEN..].copy_from_slice(&check_half(&their_half)?);

    let session = Arc::new(Session::new(id, &secret, connecting_host.to_string())?);
    registry.add(session.clone());
    info!(%id, peer = connecting_host, "session established");
    Ok(session)
}

/// Reconstruct the peer's public key from a record's modulus and exponent.
fn peer_public_key(record: &HandshakeRecord) -> Result<RsaPublicKey, SottoError> {
    let modulus = record
        .modulus
        .as_deref()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| SottoError::HandshakeRejected("record missing public modulus".into()))?;
    let exponent = record
        .exponent
        .filter(|&e| e != 0)
        .ok_or_else(|| SottoError::HandshakeRejected("record missing public exponent".into()))?;

    let n = BigUint::parse_bytes(modulus.as_bytes(), 10)
        .ok_or_else(|| SottoError::ProtocolViolation("modulus is not a decimal integer".into()))?;
    RsaPublicKey::new(n, BigUint::from(exponent))
        .map_err(|e| SottoError::ProtocolViolation(format!("unusable public key: {e}")))
}

/// The wrapped key half a record must carry.
fn required_half(record: &HandshakeRecord) -> Result<&[u8], SottoError> {
    match record.half_key.as_ref() {
        Some(k) if !k.is_empty() => Ok(k.as_slice()),
        _ => Err(SottoError::HandshakeRejected("record missing key half".into())),
    }
}

/// An unwrapped half must be exactly 8 bytes.
fn check_half(half: &[u8]) -> Result<[u8; HALF_KEY_LEN], SottoError> {
    half.try_into().map_err(|_| {
        SottoError::ProtocolViolation(format!("key half has length {}", half.len()))
    })
}

/// A key's public exponent as the wire integer.
fn exponent(public: &RsaPublicKey) -> Result<u32, SottoError> {
    public
        .e()
        .to_str_radix(10)
        .parse()
        .map_err(|_| SottoError::ProtocolViolation("public exponent exceeds wire range".into()))
}
