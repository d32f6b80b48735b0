// ABOUTME: Shared wire codec layer for the CMPP, SGIP and SMGP dialects
// ABOUTME: Encodable/Decodable traits, the 12-byte header and bounds-checked field helpers

use bytes::{Buf, BufMut, Bytes, BytesMut};
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::io::Cursor;
use thiserror::Error;

/// Largest packet any dialect accepts (CMPP v3.0 submit ceiling).
pub const MAX_PACKET: u32 = 3335;

/// 12-byte header shared by CMPP and SMGP.
///
/// SGIP carries a 20-byte header with a sequence triple, see
/// [`crate::sgip::SgipHeader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PduHeader<C> {
    pub total_length: u32,
    pub command_id: C,
    pub sequence_id: u32,
}

impl<C> PduHeader<C>
where
    C: Copy + Into<u32> + TryFrom<u32>,
{
    pub const SIZE: usize = 12;

    /// Decode the header and validate the length bounds and command id
    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        if buf.remaining() < Self::SIZE {
            return Err(CodecError::Incomplete);
        }

        let total_length = buf.get_u32();
        let command_id_raw = buf.get_u32();
        let command_id = C::try_from(command_id_raw)
            .map_err(|_| CodecError::InvalidCommandId(command_id_raw))?;
        let sequence_id = buf.get_u32();

        check_length(total_length, Self::SIZE)?;

        Ok(PduHeader {
            total_length,
            command_id,
            sequence_id,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.total_length);
        buf.put_u32(self.command_id.into());
        buf.put_u32(self.sequence_id);
    }
}

/// Trait for PDUs that can be written to the wire
pub trait Encodable {
    /// Write the full PDU, header included
    fn encode(&self, buf: &mut BytesMut);

    /// Exact number of bytes `encode` writes
    fn encoded_size(&self) -> usize;

    /// Encode into a buffer sized to `encoded_size` and patch the length word.
    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_size());
        self.encode(&mut buf);

        if buf.len() >= 4 {
            let length = buf.len() as u32;
            buf[0..4].copy_from_slice(&length.to_be_bytes());
        }

        buf.freeze()
    }
}

/// Trait for PDUs that can be read back from the wire
pub trait Decodable: Sized {
    type Header;

    /// Raw command id this PDU answers to
    fn command_id() -> u32;

    /// Decode the body that follows `header`. `version` is the negotiated
    /// protocol version; PDUs whose layout does not depend on it ignore it.
    fn decode(
        header: Self::Header,
        buf: &mut Cursor<&[u8]>,
        version: u8,
    ) -> Result<Self, CodecError>;
}

type DecoderFn<H, F> =
    Box<dyn Fn(H, &mut Cursor<&[u8]>, u8) -> Result<F, CodecError> + Send + Sync>;

/// Command id to decoder table for one dialect's frame type `F`.
pub struct PduRegistry<H, F> {
    decoders: HashMap<u32, DecoderFn<H, F>>,
}

impl<H, F> PduRegistry<H, F> {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register `T` and the frame variant that wraps it
    pub fn register_pdu<T, C>(&mut self, frame_constructor: C)
    where
        T: Decodable<Header = H> + 'static,
        C: Fn(T) -> F + Send + Sync + 'static,
    {
        let decoder = Box::new(move |header: H, buf: &mut Cursor<&[u8]>, version: u8| {
            let pdu = T::decode(header, buf, version)?;
            Ok(frame_constructor(pdu))
        });
        self.decoders.insert(T::command_id(), decoder);
    }

    /// Decode the body for `command_id`, or `None` when nothing is registered
    /// for it.
    pub fn decode_pdu(
        &self,
        command_id: u32,
        header: H,
        buf: &mut Cursor<&[u8]>,
        version: u8,
    ) -> Option<Result<F, CodecError>> {
        self.decoders
            .get(&command_id)
            .map(|decoder| decoder(header, buf, version))
    }

    pub fn is_registered(&self, command_id: u32) -> bool {
        self.decoders.contains_key(&command_id)
    }
}

impl<H, F> Default for PduRegistry<H, F> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Incomplete PDU: need more data")]
    Incomplete,

    #[error("Invalid command_id: {0:#x}")]
    InvalidCommandId(u32),

    #[error("Invalid PDU length: {length}, must be {min}-{max}")]
    InvalidPduLength { length: u32, min: u32, max: u32 },

    #[error("Unexpected command_id: expected {expected:#x}, got {actual:#x}")]
    UnexpectedCommandId { expected: u32, actual: u32 },

    #[error("PDU declares {declared} bytes but its fields span {consumed}")]
    LengthMismatch { declared: u32, consumed: u64 },

    #[error("Field '{field}' validation failed: {reason}")]
    FieldValidation { field: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reject lengths outside `[header_len, MAX_PACKET]`.
pub fn check_length(total_length: u32, header_len: usize) -> Result<(), CodecError> {
    if total_length < header_len as u32 || total_length > MAX_PACKET {
        return Err(CodecError::InvalidPduLength {
            length: total_length,
            min: header_len as u32,
            max: MAX_PACKET,
        });
    }
    Ok(())
}

/// Fail with `UnexpectedCommandId` unless `actual` is `expected`.
pub fn expect_command(expected: u32, actual: u32) -> Result<(), CodecError> {
    if expected != actual {
        return Err(CodecError::UnexpectedCommandId { expected, actual });
    }
    Ok(())
}

/// Peek the length and command words without advancing the cursor
pub fn peek_prefix(buf: &Cursor<&[u8]>) -> Option<(u32, u32)> {
    let rest = buf.get_ref().get(buf.position() as usize..)?;
    if rest.len() < 8 {
        return None;
    }
    let length = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
    let command = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]);
    Some((length, command))
}

pub fn decode_u8(buf: &mut Cursor<&[u8]>) -> Result<u8, CodecError> {
    if buf.remaining() < 1 {
        return Err(CodecError::Incomplete);
    }
    Ok(buf.get_u8())
}

pub fn decode_u16(buf: &mut Cursor<&[u8]>) -> Result<u16, CodecError> {
    if buf.remaining() < 2 {
        return Err(CodecError::Incomplete);
    }
    Ok(buf.get_u16())
}

pub fn decode_u32(buf: &mut Cursor<&[u8]>) -> Result<u32, CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::Incomplete);
    }
    Ok(buf.get_u32())
}

pub fn decode_u64(buf: &mut Cursor<&[u8]>) -> Result<u64, CodecError> {
    if buf.remaining() < 8 {
        return Err(CodecError::Incomplete);
    }
    Ok(buf.get_u64())
}

/// Read `len` raw bytes
pub fn decode_bytes(buf: &mut Cursor<&[u8]>, len: usize) -> Result<Bytes, CodecError> {
    if buf.remaining() < len {
        return Err(CodecError::Incomplete);
    }
    Ok(buf.copy_to_bytes(len))
}

/// Read a fixed-size byte array (digests, BCD message ids)
pub fn decode_array<const N: usize>(buf: &mut Cursor<&[u8]>) -> Result<[u8; N], CodecError> {
    if buf.remaining() < N {
        return Err(CodecError::Incomplete);
    }
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

/// Read a fixed-width octet string.
///
/// The field is NUL padded on the wire. Bytes from the first NUL on are
/// dropped; invalid UTF-8 is replaced, not rejected.
pub fn decode_octets(buf: &mut Cursor<&[u8]>, width: usize) -> Result<String, CodecError> {
    if buf.remaining() < width {
        return Err(CodecError::Incomplete);
    }
    let start = buf.position() as usize;
    let raw = &buf.get_ref()[start..start + width];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(width);
    let value = String::from_utf8_lossy(&raw[..end]).trim_end().to_string();
    buf.advance(width);
    Ok(value)
}

/// Write `value` into a fixed-width, NUL padded field, truncating if needed
pub fn encode_octets(buf: &mut BytesMut, value: &str, width: usize) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(width);
    buf.put_slice(&bytes[..len]);
    buf.put_bytes(0, width - len);
}

/// Fail with `LengthMismatch` unless the cursor sits exactly at the end of
/// the declared packet.
pub fn check_consumed(buf: &Cursor<&[u8]>, declared: u32) -> Result<(), CodecError> {
    if buf.position() != declared as u64 {
        return Err(CodecError::LengthMismatch {
            declared,
            consumed: buf.position(),
        });
    }
    Ok(())
}

/// MD5 over the concatenation of `parts`
pub fn md5_digest(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 16];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Login authenticator used by CMPP (`padding` = 9) and SMGP (`padding` = 7):
/// `MD5(client_id || padding × 0x00 || secret || %010d timestamp)`.
pub fn login_digest(client_id: &str, padding: usize, secret: &str, timestamp: u32) -> [u8; 16] {
    let zeros = vec![0u8; padding];
    let stamp = format!("{timestamp:010}");
    md5_digest(&[
        client_id.as_bytes(),
        &zeros,
        secret.as_bytes(),
        stamp.as_bytes(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octets_are_padded_and_trimmed() {
        let mut buf = BytesMut::new();
        encode_octets(&mut buf, "hello", 10);
        assert_eq!(buf.as_ref(), b"hello\0\0\0\0\0");

        let mut cursor = Cursor::new(buf.as_ref());
        assert_eq!(decode_octets(&mut cursor, 10).unwrap(), "hello");
        assert_eq!(cursor.position(), 10);
    }

    #[test]
    fn octets_truncate_on_encode() {
        let mut buf = BytesMut::new();
        encode_octets(&mut buf, "1064899103013", 6);
        assert_eq!(buf.as_ref(), b"106489");
    }

    #[test]
    fn short_buffers_report_incomplete() {
        let data = [0u8; 3];
        let mut cursor = Cursor::new(&data[..]);
        assert!(matches!(decode_u32(&mut cursor), Err(CodecError::Incomplete)));
        assert!(matches!(decode_octets(&mut cursor, 6), Err(CodecError::Incomplete)));
        assert!(matches!(decode_array::<16>(&mut cursor), Err(CodecError::Incomplete)));
    }

    #[test]
    fn length_bounds_are_enforced() {
        assert!(check_length(12, 12).is_ok());
        assert!(check_length(MAX_PACKET, 12).is_ok());
        assert!(matches!(
            check_length(11, 12),
            Err(CodecError::InvalidPduLength { length: 11, .. })
        ));
        assert!(matches!(
            check_length(MAX_PACKET + 1, 20),
            Err(CodecError::InvalidPduLength { min: 20, .. })
        ));
    }

    #[test]
    fn login_digest_depends_on_every_input() {
        let base = login_digest("123456", 9, "888888", 1021080510);
        assert_eq!(base, login_digest("123456", 9, "888888", 1021080510));
        assert_ne!(base, login_digest("123457", 9, "888888", 1021080510));
        assert_ne!(base, login_digest("123456", 9, "888889", 1021080510));
        assert_ne!(base, login_digest("123456", 9, "888888", 1021080511));
        assert_ne!(base, login_digest("123456", 7, "888888", 1021080510));
    }

    #[test]
    fn peek_prefix_needs_eight_bytes() {
        let data = [0, 0, 0, 12, 0, 0, 0, 8, 0, 0, 0, 1];
        let cursor = Cursor::new(&data[..]);
        assert_eq!(peek_prefix(&cursor), Some((12, 8)));

        let short = Cursor::new(&data[..7]);
        assert_eq!(peek_prefix(&short), None);
    }
}
