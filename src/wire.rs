//! Bencode wire records.
//!
//! Two record shapes cross the wire: [`HandshakeRecord`] during session
//! establishment and [`MessageRecord`] for encrypted messages. Both are
//! bencode dictionaries with single-letter tags. Bencode is
//! self-delimiting, so records are decoded straight off the stream with no
//! outer length prefix; [`read_record`] scans exactly one value.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::SottoError;
use crate::session::SessionId;
use crate::PROTOCOL_VERSION;

/// Record type opening a handshake.
pub const NEW_SESSION: &str = "NEW SESSION";
/// Record type accepting a handshake round.
pub const OKAY: &str = "OKAY";

/// Upper bound on a single wire record. Senders enforce the same bound on
/// sealed frames, so an oversized message fails fast locally instead of
/// being rejected by the peer's record scanner.
pub const MAX_RECORD_LEN: usize = 1024 * 1024;

/// One round of the session-establishment dialogue.
///
/// Not every field is populated in every round: the opening NEW SESSION
/// carries the initiator's public key and no half, the responder's OKAY
/// carries both its key and a wrapped half, and the final OKAY carries
/// only a wrapped half.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRecord {
    /// Protocol version string.
    #[serde(rename = "v")]
    pub version: String,
    /// Record type: [`NEW_SESSION`] or [`OKAY`].
    #[serde(rename = "t")]
    pub kind: String,
    /// RSA public modulus as a decimal string (exact, arbitrary precision).
    #[serde(rename = "m", default, skip_serializing_if = "Option::is_none")]
    pub modulus: Option<String>,
    /// RSA public exponent.
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub exponent: Option<u32>,
    /// One 8-byte session key half, wrapped under the receiver's key.
    #[serde(rename = "k", default, skip_serializing_if = "Option::is_none")]
    pub half_key: Option<ByteBuf>,
}

impl HandshakeRecord {
    /// Serialize to bencode bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SottoError> {
        serde_bencode::to_bytes(self)
            .map_err(|e| SottoError::ProtocolViolation(format!("encoding handshake record: {e}")))
    }

    /// Deserialize from bencode bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SottoError> {
        serde_bencode::from_bytes(bytes)
            .map_err(|e| SottoError::ProtocolViolation(format!("bad handshake record: {e}")))
    }

    /// The opening record of a handshake: version, type, public key.
    pub fn new_session(modulus: String, exponent: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            kind: NEW_SESSION.to_string(),
            modulus: Some(modulus),
            exponent: Some(exponent),
            half_key: None,
        }
    }

    /// An accepting record carrying a wrapped key half, optionally with
    /// the sender's public key.
    pub fn okay(public_key: Option<(String, u32)>, half_key: Vec<u8>) -> Self {
        let (modulus, exponent) = match public_key {
            Some((m, e)) => (Some(m), Some(e)),
            None => (None, None),
        };
        Self {
            version: PROTOCOL_VERSION.to_string(),
            kind: OKAY.to_string(),
            modulus,
            exponent,
            half_key: Some(ByteBuf::from(half_key)),
        }
    }
}

/// An encrypted message record.
///
/// The timestamp is deliberately absent: it is local metadata and never
/// serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Session identifier in wire integer form.
    #[serde(rename = "sid")]
    pub session: i64,
    /// Message content, enciphered by the session's frame codec.
    #[serde(rename = "c")]
    pub ciphertext: ByteBuf,
}

impl MessageRecord {
    /// Build a record for a session's ciphertext.
    pub fn new(id: SessionId, ciphertext: Vec<u8>) -> Self {
        Self {
            session: id.to_wire(),
            ciphertext: ByteBuf::from(ciphertext),
        }
    }

    /// The session identifier this record names.
    pub fn session_id(&self) -> SessionId {
        SessionId::from_wire(self.session)
    }

    /// Serialize to bencode bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SottoError> {
        serde_bencode::to_bytes(self)
            .map_err(|e| SottoError::ProtocolViolation(format!("encoding message record: {e}")))
    }

    /// Deserialize from bencode bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SottoError> {
        serde_bencode::from_bytes(bytes)
            .map_err(|e| SottoError::ProtocolViolation(format!("bad message record: {e}")))
    }
}

/// Write one encoded record to the stream.
pub async fn write_record<W: AsyncWrite + Unpin>(
    writer: &mut W,
    bytes: &[u8],
) -> Result<(), SottoError> {
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read exactly one bencode value off the stream.
///
/// Tracks container nesting and string lengths to find the record
/// boundary, returning the raw bytes for the caller to decode. A closed
/// stream mid-record surfaces as a transport error.
pub async fn read_record<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, SottoError> {
    let mut buf = Vec::new();
    let mut depth = 0usize;
    loop {
        let byte = reader.read_u8().await?;
        buf.push(byte);
        match byte {
            b'd' | b'l' => depth += 1,
            b'i' => {
                read_int_body(reader, &mut buf).await?;
                if depth == 0 {
                    return Ok(buf);
                }
            }
            b'0'..=b'9' => {
                read_string_body(reader, &mut buf, byte).await?;
                if depth == 0 {
                    return Ok(buf);
                }
            }
            b'e' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| SottoError::ProtocolViolation("unbalanced record".into()))?;
                if depth == 0 {
                    return Ok(buf);
                }
            }
            other => {
                return Err(SottoError::ProtocolViolation(format!(
                    "unexpected byte {other:#04x} in record"
                )))
            }
        }
        if buf.len() > MAX_RECORD_LEN {
            return Err(SottoError::ProtocolViolation("record too large".into()));
        }
    }
}

/// Consume the digits and terminating `e` of an integer.
async fn read_int_body<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> Result<(), SottoError> {
    loop {
        let byte = reader.read_u8().await?;
        buf.push(byte);
        match byte {
            b'e' => return Ok(()),
            b'-' | b'0'..=b'9' => {}
            other => {
                return Err(SottoError::ProtocolViolation(format!(
                    "unexpected byte {other:#04x} in integer"
                )))
            }
        }
        if buf.len() > MAX_RECORD_LEN {
            return Err(SottoError::ProtocolViolation("record too large".into()));
        }
    }
}

/// Consume the rest of a `<len>:<bytes>` string whose first length digit
/// was already read.
async fn read_string_body<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    first: u8,
) -> Result<(), SottoError> {
    let mut len = (first - b'0') as usize;
    loop {
        let byte = reader.read_u8().await?;
        buf.push(byte);
        match byte {
            b'0'..=b'9' => {
                len = len * 10 + (byte - b'0') as usize;
                if len > MAX_RECORD_LEN {
                    return Err(SottoError::ProtocolViolation("record too large".into()));
                }
            }
            b':' => break,
            other => {
                return Err(SottoError::ProtocolViolation(format!(
                    "unexpected byte {other:#04x} in string length"
                )))
            }
        }
    }
    let start = buf.len();
    buf.resize(start + len, 0);
    reader.read_exact(&mut buf[start..]).await?;
    Ok(())
}
