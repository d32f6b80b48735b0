// ABOUTME: Binds a wire dialect (CMPP, SGIP, SMGP) to the generic framing layer
// ABOUTME: Two-phase packet check: header bounds and command id first, full body second

use crate::auth::Isp;
use crate::codec::{self, CodecError};
use bytes::Bytes;
use std::fmt::Debug;
use std::io::Cursor;

/// A gateway wire dialect.
///
/// Implemented by the zero-sized markers [`crate::cmpp::Cmpp`],
/// [`crate::sgip::Sgip`] and [`crate::smgp::Smgp`].
pub trait Protocol: Send + Sync + 'static {
    /// Decoded PDU sum type for this dialect
    type Frame: Clone + Debug + Send + Sync + 'static;

    const ISP: Isp;

    /// Fixed header length (12 for CMPP/SMGP, 20 for SGIP)
    const HEADER_LEN: usize;

    /// Whether `command_id` belongs to the dialect's command set
    fn is_known_command(command_id: u32) -> bool;

    /// Decode one complete packet (header included). `buf` holds exactly the
    /// bytes of that packet.
    fn decode_frame(buf: &mut Cursor<&[u8]>, version: u8) -> Result<Self::Frame, CodecError>;

    fn encode_frame(frame: &Self::Frame) -> Bytes;

    /// Raw command id of a decoded frame
    fn command_of(frame: &Self::Frame) -> u32;

    /// Printable sequence of a frame (decimal, or the SGIP triple)
    fn sequence_of(frame: &Self::Frame) -> String;

    fn is_response(frame: &Self::Frame) -> bool {
        Self::command_of(frame) & 0x8000_0000 != 0
    }

    /// Check whether `buf` starts with a complete, plausible packet.
    ///
    /// Returns `Ok(None)` while more bytes are needed, `Ok(Some(len))` once
    /// the whole packet is buffered. A length outside
    /// `[HEADER_LEN, MAX_PACKET]` or an unknown command id is an error and
    /// the connection must be dropped.
    fn check(buf: &[u8]) -> Result<Option<usize>, CodecError> {
        if buf.len() < Self::HEADER_LEN {
            return Ok(None);
        }

        let cursor = Cursor::new(buf);
        let Some((length, command_id)) = codec::peek_prefix(&cursor) else {
            return Ok(None);
        };

        codec::check_length(length, Self::HEADER_LEN)?;
        if !Self::is_known_command(command_id) {
            return Err(CodecError::InvalidCommandId(command_id));
        }

        if buf.len() < length as usize {
            return Ok(None);
        }
        Ok(Some(length as usize))
    }

    /// Decode a packet previously accepted by [`Protocol::check`] and make
    /// sure the PDU consumed exactly the declared length.
    fn parse(packet: &[u8], version: u8) -> Result<Self::Frame, CodecError> {
        let mut cursor = Cursor::new(packet);
        let frame = Self::decode_frame(&mut cursor, version)?;
        codec::check_consumed(&cursor, packet.len() as u32)?;
        Ok(frame)
    }
}
