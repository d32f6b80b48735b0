// ABOUTME: CMPP link maintenance PDUs: active test and terminate with their responses
// ABOUTME: All are bare headers except ACTIVE_TEST_RESP, which carries one reserved byte

use crate::cmpp::{CommandId, Header};
use crate::codec::{self, CodecError, Decodable, Encodable};
use bytes::{BufMut, BytesMut};
use std::io::Cursor;

/// CMPP_ACTIVE_TEST
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveTest {
    pub sequence_id: u32,
}

impl_header_only_pdu!(ActiveTest, CommandId, CommandId::ActiveTest);

impl ActiveTest {
    pub fn to_response(&self) -> ActiveTestResp {
        ActiveTestResp {
            sequence_id: self.sequence_id,
            reserved: 0,
        }
    }
}

/// CMPP_ACTIVE_TEST_RESP
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveTestResp {
    pub sequence_id: u32,
    pub reserved: u8,
}

impl ActiveTestResp {
    pub const LEN: u32 = 13;
}

impl Decodable for ActiveTestResp {
    type Header = Header;

    fn command_id() -> u32 {
        CommandId::ActiveTestResp.into()
    }

    fn decode(header: Header, buf: &mut Cursor<&[u8]>, _version: u8) -> Result<Self, CodecError> {
        codec::expect_command(Self::command_id(), header.command_id.into())?;
        Ok(ActiveTestResp {
            sequence_id: header.sequence_id,
            reserved: codec::decode_u8(buf)?,
        })
    }
}

impl Encodable for ActiveTestResp {
    fn encode(&self, buf: &mut BytesMut) {
        Header {
            total_length: Self::LEN,
            command_id: CommandId::ActiveTestResp,
            sequence_id: self.sequence_id,
        }
        .encode(buf);
        buf.put_u8(self.reserved);
    }

    fn encoded_size(&self) -> usize {
        Self::LEN as usize
    }
}

/// CMPP_TERMINATE
#[derive(Clone, Debug, PartialEq)]
pub struct Terminate {
    pub sequence_id: u32,
}

impl_header_only_pdu!(Terminate, CommandId, CommandId::Terminate);

impl Terminate {
    pub fn to_response(&self) -> TerminateResp {
        TerminateResp::new(self.sequence_id)
    }
}

/// CMPP_TERMINATE_RESP
#[derive(Clone, Debug, PartialEq)]
pub struct TerminateResp {
    pub sequence_id: u32,
}

impl_header_only_pdu!(TerminateResp, CommandId, CommandId::TerminateResp);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_test_response_has_reserved_byte() {
        let probe = ActiveTest::new(11);
        assert_eq!(probe.to_bytes().len(), 12);

        let resp = probe.to_response();
        let bytes = resp.to_bytes();
        assert_eq!(bytes.len(), 13);

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = Header::decode(&mut cursor).unwrap();
        let decoded = ActiveTestResp::decode(header, &mut cursor, 0x30).unwrap();
        assert_eq!(decoded.sequence_id, 11);
    }

    #[test]
    fn terminate_rejects_wrong_command() {
        let bytes = ActiveTest::new(1).to_bytes();
        let mut cursor = Cursor::new(bytes.as_ref());
        let header = Header::decode(&mut cursor).unwrap();
        assert!(matches!(
            Terminate::decode(header, &mut cursor, 0x30),
            Err(CodecError::UnexpectedCommandId { expected: 2, actual: 8 })
        ));
    }
}
