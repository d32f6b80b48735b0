use crate::codec::{self, CodecError, Decodable, Encodable};
use crate::sequence::SequenceTriple;
use crate::sgip::{CommandId, ReportResp, SgipHeader};
use bytes::{BufMut, BytesMut};
use std::io::Cursor;

pub const STATE_DELIVERED: u8 = 0;
pub const STATE_PENDING: u8 = 1;
pub const STATE_FAILED: u8 = 2;

/// SGIP_REPORT: outcome of an earlier submit, matched by its sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    pub sequence: SequenceTriple,
    /// Sequence of the submit (or forwarded deliver) being reported on
    pub submit_sequence: SequenceTriple,
    /// 0 submit, 1 forwarded deliver
    pub report_type: u8,
    pub user_number: String,
    pub state: u8,
    /// Only meaningful when `state` is 2
    pub error_code: u8,
}

impl Report {
    pub const LEN: u32 = 64;

    /// `DELIVRD`-style token for trackers shared with the other dialects
    pub fn stat(&self) -> &'static str {
        match self.state {
            STATE_DELIVERED => "DELIVRD",
            STATE_PENDING => "ACCEPTD",
            _ => "UNDELIV",
        }
    }

    pub fn to_response(&self, result: u8) -> ReportResp {
        ReportResp::new(self.sequence, result)
    }
}

impl Decodable for Report {
    type Header = SgipHeader;

    fn command_id() -> u32 {
        CommandId::Report.into()
    }

    fn decode(header: SgipHeader, buf: &mut Cursor<&[u8]>, _version: u8) -> Result<Self, CodecError> {
        codec::expect_command(Self::command_id(), header.command_id.into())?;
        let submit_sequence = SequenceTriple {
            node_id: codec::decode_u32(buf)?,
            timestamp: codec::decode_u32(buf)?,
            counter: codec::decode_u32(buf)?,
        };
        let report_type = codec::decode_u8(buf)?;
        let user_number = codec::decode_octets(buf, 21)?;
        let state = codec::decode_u8(buf)?;
        let error_code = codec::decode_u8(buf)?;
        codec::decode_bytes(buf, 8)?;
        Ok(Report {
            sequence: header.sequence,
            submit_sequence,
            report_type,
            user_number,
            state,
            error_code,
        })
    }
}

impl Encodable for Report {
    fn encode(&self, buf: &mut BytesMut) {
        SgipHeader {
            total_length: Self::LEN,
            command_id: CommandId::Report,
            sequence: self.sequence,
        }
        .encode(buf);
        buf.put_u32(self.submit_sequence.node_id);
        buf.put_u32(self.submit_sequence.timestamp);
        buf.put_u32(self.submit_sequence.counter);
        buf.put_u8(self.report_type);
        codec::encode_octets(buf, &self.user_number, 21);
        buf.put_u8(self.state);
        buf.put_u8(self.error_code);
        buf.put_bytes(0, 8);
    }

    fn encoded_size(&self) -> usize {
        Self::LEN as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_is_64_bytes_and_keeps_submit_triple() {
        let report = Report {
            sequence: SequenceTriple { node_id: 1, timestamp: 1021080510, counter: 9 },
            submit_sequence: SequenceTriple { node_id: 2, timestamp: 1021080509, counter: 3 },
            report_type: 0,
            user_number: "8613800138000".into(),
            state: STATE_FAILED,
            error_code: 25,
        };
        let bytes = report.to_bytes();
        assert_eq!(bytes.len(), 64);

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = SgipHeader::decode(&mut cursor).unwrap();
        let decoded = Report::decode(header, &mut cursor, 0x12).unwrap();
        assert_eq!(decoded, report);
        assert_eq!(decoded.stat(), "UNDELIV");
    }
}
