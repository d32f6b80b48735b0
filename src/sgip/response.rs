// ABOUTME: SGIP response PDUs: every *_RESP body is a one-byte result plus 8 reserved bytes
// ABOUTME: A local macro stamps out the four identical shapes

use crate::codec::{self, CodecError, Decodable, Encodable};
use crate::sequence::SequenceTriple;
use crate::sgip::{CommandId, SgipHeader};
use bytes::{BufMut, BytesMut};
use std::io::Cursor;

macro_rules! result_pdu {
    ($(#[$doc:meta])* $pdu:ident, $command:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $pdu {
            pub sequence: SequenceTriple,
            pub result: u8,
        }

        impl $pdu {
            pub const LEN: u32 = SgipHeader::SIZE as u32 + 9;

            pub fn new(sequence: SequenceTriple, result: u8) -> Self {
                $pdu { sequence, result }
            }
        }

        impl Decodable for $pdu {
            type Header = SgipHeader;

            fn command_id() -> u32 {
                u32::from($command)
            }

            fn decode(
                header: SgipHeader,
                buf: &mut Cursor<&[u8]>,
                _version: u8,
            ) -> Result<Self, CodecError> {
                codec::expect_command(Self::command_id(), header.command_id.into())?;
                let result = codec::decode_u8(buf)?;
                codec::decode_bytes(buf, 8)?;
                Ok($pdu {
                    sequence: header.sequence,
                    result,
                })
            }
        }

        impl Encodable for $pdu {
            fn encode(&self, buf: &mut BytesMut) {
                SgipHeader {
                    total_length: Self::LEN,
                    command_id: $command,
                    sequence: self.sequence,
                }
                .encode(buf);
                buf.put_u8(self.result);
                buf.put_bytes(0, 8);
            }

            fn encoded_size(&self) -> usize {
                Self::LEN as usize
            }
        }
    };
}

result_pdu!(
    /// SGIP_BIND_RESP
    BindResp,
    CommandId::BindResp
);
result_pdu!(
    /// SGIP_SUBMIT_RESP; the sequence echoes the submit and doubles as its message id
    SubmitResp,
    CommandId::SubmitResp
);
result_pdu!(
    /// SGIP_DELIVER_RESP
    DeliverResp,
    CommandId::DeliverResp
);
result_pdu!(
    /// SGIP_REPORT_RESP
    ReportResp,
    CommandId::ReportResp
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responses_are_29_bytes() {
        let sequence = SequenceTriple {
            node_id: 1,
            timestamp: 1021080510,
            counter: 2,
        };
        let resp = SubmitResp::new(sequence, 33);
        let bytes = resp.to_bytes();
        assert_eq!(bytes.len(), 29);

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = SgipHeader::decode(&mut cursor).unwrap();
        assert_eq!(SubmitResp::decode(header, &mut cursor, 0x12).unwrap(), resp);
        assert_eq!(cursor.position(), 29);
    }
}
