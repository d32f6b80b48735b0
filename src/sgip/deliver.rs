use crate::auth::ClientAuthRecord;
use crate::codec::{self, CodecError, Decodable, Encodable};
use crate::datatypes::{self, MO_WIDE_CHARS, MOCK_MO_PHONE, MsgFormat};
use crate::sequence::{SequenceTriple, Sequences};
use crate::sgip::{CommandId, DeliverResp, SgipHeader};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::Cursor;

/// SGIP_DELIVER: mobile-originated text only; reports use SGIP_REPORT.
#[derive(Clone, Debug, PartialEq)]
pub struct Deliver {
    pub sequence: SequenceTriple,
    pub user_number: String,
    pub sp_number: String,
    pub tp_pid: u8,
    pub tp_udhi: u8,
    pub message_coding: u8,
    pub content: Bytes,
}

impl Deliver {
    pub const BASE_LEN: usize = 77;

    /// Simulated MO from [`MOCK_MO_PHONE`]. `sub_no` is appended to the
    /// display number unless it already starts with it.
    pub fn mock_mo(
        record: &ClientAuthRecord,
        sub_no: &str,
        text: &str,
        seqs: &Sequences,
    ) -> Result<Self, CodecError> {
        let sp_number = if sub_no.starts_with(&record.sms_display_no) {
            sub_no.to_string()
        } else {
            format!("{}{}", record.sms_display_no, sub_no)
        };
        let format = MsgFormat::detect(text, MsgFormat::Ucs2);
        let content = datatypes::encode_truncated(text, format, MO_WIDE_CHARS)?;

        Ok(Deliver {
            sequence: seqs.triple.next_val(),
            user_number: MOCK_MO_PHONE.to_string(),
            sp_number,
            tp_pid: 0,
            tp_udhi: 0,
            message_coding: format.into(),
            content,
        })
    }

    pub fn text(&self) -> String {
        datatypes::decode_text(datatypes::strip_udh(&self.content), self.message_coding)
    }

    pub fn to_response(&self, result: u8) -> DeliverResp {
        DeliverResp::new(self.sequence, result)
    }
}

impl Decodable for Deliver {
    type Header = SgipHeader;

    fn command_id() -> u32 {
        CommandId::Deliver.into()
    }

    fn decode(header: SgipHeader, buf: &mut Cursor<&[u8]>, _version: u8) -> Result<Self, CodecError> {
        codec::expect_command(Self::command_id(), header.command_id.into())?;
        let user_number = codec::decode_octets(buf, 21)?;
        let sp_number = codec::decode_octets(buf, 21)?;
        let tp_pid = codec::decode_u8(buf)?;
        let tp_udhi = codec::decode_u8(buf)?;
        let message_coding = codec::decode_u8(buf)?;
        let length = codec::decode_u32(buf)? as usize;
        let content = codec::decode_bytes(buf, length)?;
        codec::decode_bytes(buf, 8)?;
        Ok(Deliver {
            sequence: header.sequence,
            user_number,
            sp_number,
            tp_pid,
            tp_udhi,
            message_coding,
            content,
        })
    }
}

impl Encodable for Deliver {
    fn encode(&self, buf: &mut BytesMut) {
        SgipHeader {
            total_length: self.encoded_size() as u32,
            command_id: CommandId::Deliver,
            sequence: self.sequence,
        }
        .encode(buf);
        codec::encode_octets(buf, &self.user_number, 21);
        codec::encode_octets(buf, &self.sp_number, 21);
        buf.put_u8(self.tp_pid);
        buf.put_u8(self.tp_udhi);
        buf.put_u8(self.message_coding);
        buf.put_u32(self.content.len() as u32);
        buf.put_slice(&self.content);
        buf.put_bytes(0, 8);
    }

    fn encoded_size(&self) -> usize {
        Self::BASE_LEN + self.content.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Isp;

    #[test]
    fn mock_mo_prefixes_display_number_once() {
        let seqs = Sequences::default();
        let record = ClientAuthRecord::new(Isp::Sgip, "3053112345", "secret", 0x12)
            .with_display_no("10655");

        let plain = Deliver::mock_mo(&record, "01", "TD", &seqs).unwrap();
        assert_eq!(plain.sp_number, "1065501");
        let prefixed = Deliver::mock_mo(&record, "1065502", "TD", &seqs).unwrap();
        assert_eq!(prefixed.sp_number, "1065502");

        let bytes = plain.to_bytes();
        assert_eq!(bytes.len(), 77 + 2);
        let mut cursor = Cursor::new(bytes.as_ref());
        let header = SgipHeader::decode(&mut cursor).unwrap();
        let decoded = Deliver::decode(header, &mut cursor, 0x12).unwrap();
        assert_eq!(decoded.text(), "TD");
        assert_eq!(decoded.user_number, MOCK_MO_PHONE);
    }
}
