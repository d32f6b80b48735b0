use crate::codec::{self, CodecError};
use crate::sequence::SequenceTriple;
use crate::sgip::CommandId;
use bytes::{Buf, BufMut, BytesMut};
use std::io::Cursor;

/// 20-byte SGIP header: length, command, then the three-word sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SgipHeader {
    pub total_length: u32,
    pub command_id: CommandId,
    pub sequence: SequenceTriple,
}

impl SgipHeader {
    pub const SIZE: usize = 20;

    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        if buf.remaining() < Self::SIZE {
            return Err(CodecError::Incomplete);
        }

        let total_length = buf.get_u32();
        let command_id_raw = buf.get_u32();
        let command_id = CommandId::try_from(command_id_raw)
            .map_err(|_| CodecError::InvalidCommandId(command_id_raw))?;
        let sequence = SequenceTriple {
            node_id: buf.get_u32(),
            timestamp: buf.get_u32(),
            counter: buf.get_u32(),
        };

        codec::check_length(total_length, Self::SIZE)?;

        Ok(SgipHeader {
            total_length,
            command_id,
            sequence,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.total_length);
        buf.put_u32(self.command_id.into());
        buf.put_u32(self.sequence.node_id);
        buf.put_u32(self.sequence.timestamp);
        buf.put_u32(self.sequence.counter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_carries_all_three_sequence_words() {
        let header = SgipHeader {
            total_length: 20,
            command_id: CommandId::Unbind,
            sequence: SequenceTriple {
                node_id: 3053112345,
                timestamp: 1021080510,
                counter: 7,
            },
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), 20);

        let mut cursor = Cursor::new(buf.as_ref());
        assert_eq!(SgipHeader::decode(&mut cursor).unwrap(), header);
    }

    #[test]
    fn short_length_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(12);
        buf.put_u32(1);
        buf.put_bytes(0, 12);
        let mut cursor = Cursor::new(buf.as_ref());
        assert!(matches!(
            SgipHeader::decode(&mut cursor),
            Err(CodecError::InvalidPduLength { length: 12, min: 20, .. })
        ));
    }
}
