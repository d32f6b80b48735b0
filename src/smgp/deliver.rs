use crate::auth::ClientAuthRecord;
use crate::codec::{self, CodecError, Decodable, Encodable};
use crate::datatypes::{self, MO_WIDE_CHARS, MOCK_MO_PHONE, MsgFormat, TlvList, timestamp};
use crate::sequence::{Sequences, bcd_to_string};
use crate::smgp::submit::decode_trailing_tlvs;
use crate::smgp::{CommandId, Header};
use bytes::{BufMut, Bytes, BytesMut};
use chrono::Local;
use std::io::Cursor;

/// Status report carried as text inside an SMGP_DELIVER:
/// `id:<10 raw bytes> sub:001 dlvrd:001 submit date:<yyMMddHHmm> done
/// date:<yyMMddHHmm> stat:<7> err:<3> text:<20>`
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    /// BCD msg id of the original submit
    pub id: [u8; 10],
    pub sub: String,
    pub dlvrd: String,
    pub submit_date: String,
    pub done_date: String,
    pub stat: String,
    pub err: String,
    pub text: String,
}

const SUB: &[u8] = b" sub:";
const DLVRD: &[u8] = b" dlvrd:";
const SUBMIT_DATE: &[u8] = b" submit date:";
const DONE_DATE: &[u8] = b" done date:";
const STAT: &[u8] = b" stat:";
const ERR: &[u8] = b" err:";
const TEXT: &[u8] = b" text:";

impl Report {
    pub const LEN: usize = 122;

    /// Simulated report. `seed % 1000` in 1..=10 selects that error code,
    /// anything else is a successful delivery.
    pub fn mock(id: [u8; 10], submit_date: String, done_date: String, seed: u32) -> Self {
        let err = match seed % 1000 {
            code @ 1..=10 => format!("{code:03}"),
            _ => "000".to_string(),
        };
        Report {
            id,
            sub: "001".to_string(),
            dlvrd: "001".to_string(),
            submit_date,
            done_date,
            stat: stat_for_error(&err).to_string(),
            err,
            text: String::new(),
        }
    }

    /// Tracking key of the submit this report answers
    pub fn id_string(&self) -> String {
        bcd_to_string(&self.id)
    }

    fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        codec::decode_bytes(buf, 3)?;
        let id = codec::decode_array::<10>(buf)?;
        let mut field = |label: &[u8], width: usize| -> Result<String, CodecError> {
            codec::decode_bytes(buf, label.len())?;
            codec::decode_octets(buf, width)
        };
        Ok(Report {
            id,
            sub: field(SUB, 3)?,
            dlvrd: field(DLVRD, 3)?,
            submit_date: field(SUBMIT_DATE, 10)?,
            done_date: field(DONE_DATE, 10)?,
            stat: field(STAT, 7)?,
            err: field(ERR, 3)?,
            text: field(TEXT, 20)?,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(b"id:");
        buf.put_slice(&self.id);
        for (label, value, width) in [
            (SUB, &self.sub, 3),
            (DLVRD, &self.dlvrd, 3),
            (SUBMIT_DATE, &self.submit_date, 10),
            (DONE_DATE, &self.done_date, 10),
            (STAT, &self.stat, 7),
            (ERR, &self.err, 3),
            (TEXT, &self.text, 20),
        ] {
            buf.put_slice(label);
            codec::encode_octets(buf, value, width);
        }
    }
}

/// Map a three-digit report error code to its stat token
pub fn stat_for_error(err: &str) -> &'static str {
    match err {
        "000" => "DELIVRD",
        "001" | "002" | "007" => "EXPIRED",
        "003" | "004" | "005" | "006" | "008" | "009" | "010" => "UNDELIV",
        _ => "UNKNOWN",
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DeliverContent {
    Text(Bytes),
    Report(Report),
}

/// SMGP_DELIVER: mobile-originated text or a status report.
#[derive(Clone, Debug, PartialEq)]
pub struct Deliver {
    pub sequence_id: u32,
    pub msg_id: [u8; 10],
    pub msg_format: u8,
    /// `yyyyMMddHHmmss`
    pub recv_time: String,
    pub src_term_id: String,
    pub dest_term_id: String,
    pub content: DeliverContent,
    pub tlvs: TlvList,
}

impl Deliver {
    pub const BASE_LEN: usize = 89;

    /// Simulated MO from [`MOCK_MO_PHONE`]; text is truncated, never
    /// segmented.
    pub fn mock_mo(
        record: &ClientAuthRecord,
        sub_no: &str,
        text: &str,
        seqs: &Sequences,
    ) -> Result<Self, CodecError> {
        let format = MsgFormat::detect(text, MsgFormat::Gbk);
        let payload = datatypes::encode_truncated(text, format, MO_WIDE_CHARS)?;

        Ok(Deliver {
            sequence_id: seqs.seq32.next_val(),
            msg_id: seqs.bcd.next_val(),
            msg_format: format.into(),
            recv_time: timestamp::receive_stamp(&Local::now()),
            src_term_id: MOCK_MO_PHONE.to_string(),
            dest_term_id: format!("{}{}", record.sms_display_no, sub_no),
            content: DeliverContent::Text(payload),
            tlvs: TlvList::new(),
        })
    }

    pub fn is_report(&self) -> u8 {
        match self.content {
            DeliverContent::Report(_) => 1,
            DeliverContent::Text(_) => 0,
        }
    }

    pub fn report(&self) -> Option<&Report> {
        match &self.content {
            DeliverContent::Report(report) => Some(report),
            DeliverContent::Text(_) => None,
        }
    }

    pub fn text(&self) -> Option<String> {
        match &self.content {
            DeliverContent::Text(raw) => Some(datatypes::decode_text(
                datatypes::strip_udh(raw),
                self.msg_format,
            )),
            DeliverContent::Report(_) => None,
        }
    }

    pub fn to_response(&self, status: u32) -> DeliverResp {
        DeliverResp {
            sequence_id: self.sequence_id,
            msg_id: self.msg_id,
            status,
        }
    }

    fn msg_length(&self) -> usize {
        match &self.content {
            DeliverContent::Text(raw) => raw.len(),
            DeliverContent::Report(_) => Report::LEN,
        }
    }
}

impl Decodable for Deliver {
    type Header = Header;

    fn command_id() -> u32 {
        CommandId::Deliver.into()
    }

    fn decode(header: Header, buf: &mut Cursor<&[u8]>, _version: u8) -> Result<Self, CodecError> {
        codec::expect_command(Self::command_id(), header.command_id.into())?;

        let msg_id = codec::decode_array::<10>(buf)?;
        let is_report = codec::decode_u8(buf)?;
        let msg_format = codec::decode_u8(buf)?;
        let recv_time = codec::decode_octets(buf, 14)?;
        let src_term_id = codec::decode_octets(buf, 21)?;
        let dest_term_id = codec::decode_octets(buf, 21)?;
        let msg_length = codec::decode_u8(buf)? as usize;

        let content = if is_report == 1 {
            if msg_length != Report::LEN {
                return Err(CodecError::FieldValidation {
                    field: "msg_length",
                    reason: format!("status report must be {} bytes, got {msg_length}", Report::LEN),
                });
            }
            DeliverContent::Report(Report::decode(buf)?)
        } else {
            DeliverContent::Text(codec::decode_bytes(buf, msg_length)?)
        };
        codec::decode_bytes(buf, 8)?;
        let tlvs = decode_trailing_tlvs(buf, header.total_length)?;

        Ok(Deliver {
            sequence_id: header.sequence_id,
            msg_id,
            msg_format,
            recv_time,
            src_term_id,
            dest_term_id,
            content,
            tlvs,
        })
    }
}

impl Encodable for Deliver {
    fn encode(&self, buf: &mut BytesMut) {
        Header {
            total_length: self.encoded_size() as u32,
            command_id: CommandId::Deliver,
            sequence_id: self.sequence_id,
        }
        .encode(buf);

        buf.put_slice(&self.msg_id);
        buf.put_u8(self.is_report());
        buf.put_u8(self.msg_format);
        codec::encode_octets(buf, &self.recv_time, 14);
        codec::encode_octets(buf, &self.src_term_id, 21);
        codec::encode_octets(buf, &self.dest_term_id, 21);
        buf.put_u8(self.msg_length() as u8);
        match &self.content {
            DeliverContent::Text(raw) => buf.put_slice(raw),
            DeliverContent::Report(report) => report.encode(buf),
        }
        buf.put_bytes(0, 8);
        self.tlvs.encode(buf);
    }

    fn encoded_size(&self) -> usize {
        Self::BASE_LEN + self.msg_length() + self.tlvs.encoded_size()
    }
}

/// SMGP_DELIVER_RESP
#[derive(Clone, Debug, PartialEq)]
pub struct DeliverResp {
    pub sequence_id: u32,
    pub msg_id: [u8; 10],
    pub status: u32,
}

impl DeliverResp {
    pub const LEN: u32 = 26;
}

impl Decodable for DeliverResp {
    type Header = Header;

    fn command_id() -> u32 {
        CommandId::DeliverResp.into()
    }

    fn decode(header: Header, buf: &mut Cursor<&[u8]>, _version: u8) -> Result<Self, CodecError> {
        codec::expect_command(Self::command_id(), header.command_id.into())?;
        Ok(DeliverResp {
            sequence_id: header.sequence_id,
            msg_id: codec::decode_array::<10>(buf)?,
            status: codec::decode_u32(buf)?,
        })
    }
}

impl Encodable for DeliverResp {
    fn encode(&self, buf: &mut BytesMut) {
        Header {
            total_length: Self::LEN,
            command_id: CommandId::DeliverResp,
            sequence_id: self.sequence_id,
        }
        .encode(buf);
        buf.put_slice(&self.msg_id);
        buf.put_u32(self.status);
    }

    fn encoded_size(&self) -> usize {
        Self::LEN as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Isp;
    use crate::smgp::V30;

    fn decode(bytes: &[u8]) -> Deliver {
        let mut cursor = Cursor::new(bytes);
        let header = Header::decode(&mut cursor).unwrap();
        let deliver = Deliver::decode(header, &mut cursor, V30).unwrap();
        codec::check_consumed(&cursor, bytes.len() as u32).unwrap();
        deliver
    }

    #[test]
    fn error_codes_map_to_stat_tokens() {
        assert_eq!(stat_for_error("000"), "DELIVRD");
        assert_eq!(stat_for_error("007"), "EXPIRED");
        assert_eq!(stat_for_error("010"), "UNDELIV");
        assert_eq!(stat_for_error("999"), "UNKNOWN");

        let report = Report::mock([0; 10], String::new(), String::new(), 2004);
        assert_eq!(report.err, "004");
        assert_eq!(report.stat, "UNDELIV");
    }

    #[test]
    fn report_text_layout_is_122_bytes() {
        let id = [0x00, 0x00, 0x01, 0x10, 0x21, 0x08, 0x05, 0x00, 0x00, 0x42];
        let report = Report::mock(id, "2310210805".into(), "2310210806".into(), 0);
        let mut buf = BytesMut::new();
        report.encode(&mut buf);
        assert_eq!(buf.len(), Report::LEN);
        assert_eq!(&buf[..3], b"id:");
        assert_eq!(&buf[13..21], b" sub:001");
        assert_eq!(&buf[buf.len() - 26..buf.len() - 20], b" text:");

        let mut cursor = Cursor::new(buf.as_ref());
        let decoded = Report::decode(&mut cursor).unwrap();
        assert_eq!(decoded, report);
        assert_eq!(decoded.id_string(), "00000110210805000042");
    }

    #[test]
    fn mobile_originated_gbk_is_truncated() {
        let record = ClientAuthRecord::new(Isp::Smgp, "12345678", "pwd", V30).with_display_no("10690001");
        let seqs = Sequences::default();
        let deliver = Deliver::mock_mo(&record, "9", &"好".repeat(80), &seqs).unwrap();

        assert_eq!(deliver.dest_term_id, "106900019");
        assert_eq!(deliver.msg_format, 15);
        assert_eq!(deliver.msg_length(), 140);
        let decoded = decode(&deliver.to_bytes());
        assert_eq!(decoded.text().unwrap(), "好".repeat(70));
        assert_eq!(decoded.recv_time.len(), 14);
    }

    #[test]
    fn report_with_wrong_length_is_rejected() {
        let record = ClientAuthRecord::new(Isp::Smgp, "12345678", "pwd", V30);
        let seqs = Sequences::default();
        let mut bytes = BytesMut::from(Deliver::mock_mo(&record, "", "hi", &seqs).unwrap().to_bytes().as_ref());
        bytes[22] = 1;

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = Header::decode(&mut cursor).unwrap();
        assert!(matches!(
            Deliver::decode(header, &mut cursor, V30),
            Err(CodecError::FieldValidation { field: "msg_length", .. })
        ));
    }

    #[test]
    fn response_echoes_msg_id() {
        let record = ClientAuthRecord::new(Isp::Smgp, "12345678", "pwd", V30);
        let seqs = Sequences::default();
        let deliver = Deliver::mock_mo(&record, "", "hi", &seqs).unwrap();
        let resp = deliver.to_response(0);
        assert_eq!(resp.msg_id, deliver.msg_id);
        assert_eq!(resp.to_bytes().len(), 26);
    }
}
