//! Sending and receiving messages over established sessions.
//!
//! Each outbound message travels on its own short-lived stream; inbound
//! streams carry either a handshake opening or a single message record,
//! and [`serve_connection`] dispatches between the two for accept loops.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::SottoError;
use crate::frame;
use crate::handshake;
use crate::keystore::KeyStore;
use crate::registry::SessionRegistry;
use crate::session::{Message, Session};
use crate::wire::{self, HandshakeRecord, MessageRecord};
use crate::DEFAULT_PORT;

/// What a freshly accepted connection turned out to carry.
pub enum Inbound {
    /// The peer opened a handshake; the session is now established.
    Established(Arc<Session>),
    /// The peer delivered a message on an existing session.
    Delivered {
        /// The session the message arrived on.
        session: Arc<Session>,
        /// Decrypted message content.
        plaintext: String,
    },
}

/// Encrypt and send one message, dialing the session's peer on the
/// well-known port.
///
/// The plaintext is appended to the session history once the wire write
/// succeeds.
pub async fn send(session: &Session, plaintext: &str) -> Result<(), SottoError> {
    send_to(session, DEFAULT_PORT, plaintext).await
}

/// Like [`send`] with an explicit port.
pub async fn send_to(session: &Session, port: u16, plaintext: &str) -> Result<(), SottoError> {
    let mut stream = TcpStream::connect((session.peer(), port)).await?;
    let result = send_over(session, &mut stream, plaintext).await;
    let _ = stream.shutdown().await;
    result
}

/// Encrypt and send one message over a caller-supplied stream.
pub async fn send_over<S>(
    session: &Session,
    stream: &mut S,
    plaintext: &str,
) -> Result<(), SottoError>
where
    S: AsyncWrite + Unpin,
{
    let ciphertext = frame::seal(session.cipher(), plaintext)?;
    let record = MessageRecord::new(session.id(), ciphertext);
    wire::write_record(stream, &record.to_bytes()?).await?;

    session.push_history(Message::now(session.id(), plaintext));
    debug!(id = %session.id(), chars = plaintext.len(), "message sent");
    Ok(())
}

/// Read one message record off a stream, locate its session, and decrypt.
///
/// The plaintext is appended to the session history; a record naming an
/// unregistered session is discarded with [`SottoError::UnknownSession`].
pub async fn receive<S>(
    stream: &mut S,
    registry: &dyn SessionRegistry,
) -> Result<(Arc<Session>, String), SottoError>
where
    S: AsyncRead + Unpin,
{
    let record = MessageRecord::from_bytes(&wire::read_record(stream).await?)?;
    receive_parsed(record, registry)
}

fn receive_parsed(
    record: MessageRecord,
    registry: &dyn SessionRegistry,
) -> Result<(Arc<Session>, String), SottoError> {
    let id = record.session_id();
    let session = registry
        .by_id(id)
        .ok_or(SottoError::UnknownSession(id))?;

    let plaintext = frame::open(session.cipher(), &record.ciphertext)?;
    session.push_history(Message::now(id, plaintext.clone()));
    debug!(%id, chars = plaintext.len(), "message received");
    Ok((session, plaintext))
}

/// Handle one accepted connection, whichever record type it opens with.
///
/// Reads the first record and either runs the responder handshake or
/// delivers a message. The stream is shut down on exit either way -
/// inbound streams are single-purpose.
pub async fn serve_connection(
    mut stream: TcpStream,
    keystore: &dyn KeyStore,
    registry: &dyn SessionRegistry,
) -> Result<Inbound, SottoError> {
    let connecting = stream.peer_addr()?.ip().to_string();
    let accepting = stream.local_addr()?.ip().to_string();

    let result = async {
        let raw = wire::read_record(&mut stream).await?;
        match HandshakeRecord::from_bytes(&raw) {
            Ok(request) => {
                let session = handshake::respond_parsed(
                    request,
                    &mut stream,
                    &connecting,
                    &accepting,
                    keystore,
                    registry,
                )
                .await?;
                Ok(Inbound::Established(session))
            }
            Err(_) => {
                let record = MessageRecord::from_bytes(&raw)?;
                let (session, plaintext) = receive_parsed(record, registry)?;
                Ok(Inbound::Delivered { session, plaintext })
            }
        }
    }
    .await;
    let _ = stream.shutdown().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use crate::session::SessionId;
    use crate::SECRET_LEN;

    fn registered(registry: &MemoryRegistry) -> Arc<Session> {
        let id = SessionId::derive("10.0.0.1", "10.0.0.2");
        let session =
            Arc::new(Session::new(id, &[3u8; SECRET_LEN], "10.0.0.2".to_string()).unwrap());
        registry.add(session.clone());
        session
    }

    #[tokio::test]
    async fn test_send_then_receive_roundtrip() {
        let sender_reg = MemoryRegistry::new();
        let receiver_reg = MemoryRegistry::new();
        // Same secret on both ends, as a completed handshake leaves it.
        let sent_on = registered(&sender_reg);
        let received_on = registered(&receiver_reg);

        let mut wire_buf = Vec::new();
        send_over(&sent_on, &mut wire_buf, "hello").await.unwrap();
        assert_eq!(sent_on.history_len(), 1);
        assert_eq!(sent_on.history()[0].content, "hello");

        let (session, plaintext) = receive(&mut wire_buf.as_slice(), &receiver_reg)
            .await
            .unwrap();
        assert_eq!(plaintext, "hello");
        assert_eq!(session.history_len(), 1);
        assert_eq!(session.history()[0].content, "hello");
    }

    #[tokio::test]
    async fn test_unknown_session_is_surfaced() {
        let sender_reg = MemoryRegistry::new();
        let session = registered(&sender_reg);

        let mut wire_buf = Vec::new();
        send_over(&session, &mut wire_buf, "hello").await.unwrap();

        // The receiving side never saw this handshake.
        let empty = MemoryRegistry::new();
        let result = receive(&mut wire_buf.as_slice(), &empty).await;
        assert!(matches!(result, Err(SottoError::UnknownSession(id)) if id == session.id()));
    }

    #[tokio::test]
    async fn test_mismatched_secret_fails_to_open() {
        let sender_reg = MemoryRegistry::new();
        let session = registered(&sender_reg);

        let mut wire_buf = Vec::new();
        send_over(&session, &mut wire_buf, "hello").await.unwrap();

        // Same id, different secret.
        let receiver_reg = MemoryRegistry::new();
        let other = Arc::new(
            Session::new(session.id(), &[9u8; SECRET_LEN], "10.0.0.1".to_string()).unwrap(),
        );
        receiver_reg.add(other);

        let result = receive(&mut wire_buf.as_slice(), &receiver_reg).await;
        assert!(matches!(result, Err(SottoError::ProtocolViolation(_))));
    }
}
