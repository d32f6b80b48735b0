use crate::auth::ClientAuthRecord;
use crate::cmpp::submit::terminal_width;
use crate::cmpp::{CommandId, Header, is_v3};
use crate::codec::{self, CodecError, Decodable, Encodable};
use crate::datatypes::{self, MO_WIDE_CHARS, MOCK_MO_PHONE, MsgFormat};
use crate::sequence::Sequences;
use bytes::{BufMut, Bytes, BytesMut};
use std::io::Cursor;

/// Status report embedded in a CMPP_DELIVER (60 bytes).
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    /// Msg_Id the gateway returned in CMPP_SUBMIT_RESP
    pub msg_id: u64,
    /// 7-character outcome such as `DELIVRD`
    pub stat: String,
    /// `yyMMddHHmm`
    pub submit_time: String,
    /// `yyMMddHHmm`
    pub done_time: String,
    pub dest_terminal_id: String,
    pub smsc_sequence: u32,
}

impl Report {
    pub const LEN: usize = 60;

    /// A report whose outcome is picked from `smsc_sequence % 100`, so most
    /// simulated messages are delivered and a few hit each failure token.
    pub fn mock(
        msg_id: u64,
        dest_terminal_id: &str,
        submit_time: String,
        done_time: String,
        smsc_sequence: u32,
    ) -> Self {
        Report {
            msg_id,
            stat: mock_stat(smsc_sequence).to_string(),
            submit_time,
            done_time,
            dest_terminal_id: dest_terminal_id.to_string(),
            smsc_sequence,
        }
    }

    fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Ok(Report {
            msg_id: codec::decode_u64(buf)?,
            stat: codec::decode_octets(buf, 7)?,
            submit_time: codec::decode_octets(buf, 10)?,
            done_time: codec::decode_octets(buf, 10)?,
            dest_terminal_id: codec::decode_octets(buf, 21)?,
            smsc_sequence: codec::decode_u32(buf)?,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.msg_id);
        codec::encode_octets(buf, &self.stat, 7);
        codec::encode_octets(buf, &self.submit_time, 10);
        codec::encode_octets(buf, &self.done_time, 10);
        codec::encode_octets(buf, &self.dest_terminal_id, 21);
        buf.put_u32(self.smsc_sequence);
    }
}

fn mock_stat(smsc_sequence: u32) -> &'static str {
    match smsc_sequence % 100 {
        99 => "REJECTD",
        88 => "UNKNOWN",
        77 => "ACCEPTD",
        66 => "UNDELIV",
        55 => "DELETED",
        44 => "EXPIRED",
        33 => "MA:0000",
        22 => "MB:0000",
        11 => "CA:0000",
        10 => "CB:0000",
        _ => "DELIVRD",
    }
}

/// Payload of a deliver: user text, or a status report when
/// `registered_delivery` is 1.
#[derive(Clone, Debug, PartialEq)]
pub enum DeliverContent {
    Text(Bytes),
    Report(Report),
}

/// CMPP_DELIVER: mobile-originated text or a status report.
#[derive(Clone, Debug, PartialEq)]
pub struct Deliver {
    pub sequence_id: u32,
    pub version: u8,
    pub msg_id: u64,
    pub dest_id: String,
    pub service_id: String,
    pub tp_pid: u8,
    pub tp_udhi: u8,
    pub msg_fmt: u8,
    pub src_terminal_id: String,
    /// 3.0 only
    pub src_terminal_type: u8,
    pub content: DeliverContent,
    /// 3.0 only
    pub link_id: String,
}

impl Deliver {
    pub fn base_len(version: u8) -> usize {
        if is_v3(version) { 109 } else { 85 }
    }

    /// Simulated mobile-originated message from [`MOCK_MO_PHONE`] to the
    /// SP's display number plus `sub_no`. Long text is truncated, never
    /// segmented.
    pub fn mock_mo(
        record: &ClientAuthRecord,
        sub_no: &str,
        text: &str,
        seqs: &Sequences,
    ) -> Result<Self, CodecError> {
        let format = MsgFormat::detect(text, MsgFormat::Ucs2);
        let payload = datatypes::encode_truncated(text, format, MO_WIDE_CHARS)?;

        Ok(Deliver {
            sequence_id: seqs.seq32.next_val(),
            version: record.version,
            msg_id: seqs.seq64.next_val(),
            dest_id: format!("{}{}", record.sms_display_no, sub_no),
            service_id: record.service_id.clone(),
            tp_pid: 0,
            tp_udhi: 0,
            msg_fmt: format.into(),
            src_terminal_id: MOCK_MO_PHONE.to_string(),
            src_terminal_type: 0,
            content: DeliverContent::Text(payload),
            link_id: String::new(),
        })
    }

    pub fn registered_delivery(&self) -> u8 {
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

    /// Decoded user text; `None` for reports
    pub fn text(&self) -> Option<String> {
        match &self.content {
            DeliverContent::Text(raw) => Some(datatypes::decode_text(
                datatypes::strip_udh(raw),
                self.msg_fmt,
            )),
            DeliverContent::Report(_) => None,
        }
    }

    pub fn to_response(&self, result: u32) -> DeliverResp {
        DeliverResp {
            sequence_id: self.sequence_id,
            version: self.version,
            msg_id: self.msg_id,
            result,
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

    fn decode(header: Header, buf: &mut Cursor<&[u8]>, version: u8) -> Result<Self, CodecError> {
        codec::expect_command(Self::command_id(), header.command_id.into())?;
        let v3 = is_v3(version);

        let msg_id = codec::decode_u64(buf)?;
        let dest_id = codec::decode_octets(buf, 21)?;
        let service_id = codec::decode_octets(buf, 10)?;
        let tp_pid = codec::decode_u8(buf)?;
        let tp_udhi = codec::decode_u8(buf)?;
        let msg_fmt = codec::decode_u8(buf)?;
        let src_terminal_id = codec::decode_octets(buf, terminal_width(version))?;
        let src_terminal_type = if v3 { codec::decode_u8(buf)? } else { 0 };
        let registered_delivery = codec::decode_u8(buf)?;
        let msg_length = codec::decode_u8(buf)? as usize;

        let content = if registered_delivery == 1 {
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

        let link_id = if v3 {
            codec::decode_octets(buf, 20)?
        } else {
            codec::decode_bytes(buf, 8)?;
            String::new()
        };

        Ok(Deliver {
            sequence_id: header.sequence_id,
            version,
            msg_id,
            dest_id,
            service_id,
            tp_pid,
            tp_udhi,
            msg_fmt,
            src_terminal_id,
            src_terminal_type,
            content,
            link_id,
        })
    }
}

impl Encodable for Deliver {
    fn encode(&self, buf: &mut BytesMut) {
        let v3 = is_v3(self.version);

        Header {
            total_length: self.encoded_size() as u32,
            command_id: CommandId::Deliver,
            sequence_id: self.sequence_id,
        }
        .encode(buf);

        buf.put_u64(self.msg_id);
        codec::encode_octets(buf, &self.dest_id, 21);
        codec::encode_octets(buf, &self.service_id, 10);
        buf.put_u8(self.tp_pid);
        buf.put_u8(self.tp_udhi);
        buf.put_u8(self.msg_fmt);
        codec::encode_octets(buf, &self.src_terminal_id, terminal_width(self.version));
        if v3 {
            buf.put_u8(self.src_terminal_type);
        }
        buf.put_u8(self.registered_delivery());
        buf.put_u8(self.msg_length() as u8);
        match &self.content {
            DeliverContent::Text(raw) => buf.put_slice(raw),
            DeliverContent::Report(report) => report.encode(buf),
        }
        if v3 {
            codec::encode_octets(buf, &self.link_id, 20);
        } else {
            buf.put_bytes(0, 8);
        }
    }

    fn encoded_size(&self) -> usize {
        Self::base_len(self.version) + self.msg_length()
    }
}

/// CMPP_DELIVER_RESP: echoes the deliver's msg id with a result.
#[derive(Clone, Debug, PartialEq)]
pub struct DeliverResp {
    pub sequence_id: u32,
    pub version: u8,
    pub msg_id: u64,
    pub result: u32,
}

impl DeliverResp {
    pub const LEN_V3: u32 = 24;
    pub const LEN_V2: u32 = 21;
}

impl Decodable for DeliverResp {
    type Header = Header;

    fn command_id() -> u32 {
        CommandId::DeliverResp.into()
    }

    fn decode(header: Header, buf: &mut Cursor<&[u8]>, version: u8) -> Result<Self, CodecError> {
        codec::expect_command(Self::command_id(), header.command_id.into())?;
        let msg_id = codec::decode_u64(buf)?;
        let result = match header.total_length {
            Self::LEN_V3 => codec::decode_u32(buf)?,
            _ => codec::decode_u8(buf)? as u32,
        };
        Ok(DeliverResp {
            sequence_id: header.sequence_id,
            version,
            msg_id,
            result,
        })
    }
}

impl Encodable for DeliverResp {
    fn encode(&self, buf: &mut BytesMut) {
        Header {
            total_length: self.encoded_size() as u32,
            command_id: CommandId::DeliverResp,
            sequence_id: self.sequence_id,
        }
        .encode(buf);
        buf.put_u64(self.msg_id);
        if is_v3(self.version) {
            buf.put_u32(self.result);
        } else {
            buf.put_u8(self.result as u8);
        }
    }

    fn encoded_size(&self) -> usize {
        if is_v3(self.version) {
            Self::LEN_V3 as usize
        } else {
            Self::LEN_V2 as usize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Isp;
    use crate::cmpp::{V20, V30};

    fn decode(bytes: &[u8], version: u8) -> Deliver {
        let mut cursor = Cursor::new(bytes);
        let header = Header::decode(&mut cursor).unwrap();
        let deliver = Deliver::decode(header, &mut cursor, version).unwrap();
        codec::check_consumed(&cursor, bytes.len() as u32).unwrap();
        deliver
    }

    #[test]
    fn mock_stat_follows_sequence_suffix() {
        assert_eq!(mock_stat(1299), "REJECTD");
        assert_eq!(mock_stat(310), "CB:0000");
        assert_eq!(mock_stat(12345), "DELIVRD");
    }

    #[test]
    fn mobile_originated_text_is_truncated_to_one_packet() {
        let record = ClientAuthRecord::new(Isp::Cmpp, "123456", "888888", V30)
            .with_display_no("1064899")
            .with_service_id("MI0001");
        let seqs = Sequences::default();
        let text = "回".repeat(90);
        let deliver = Deliver::mock_mo(&record, "01", &text, &seqs).unwrap();

        assert_eq!(deliver.dest_id, "106489901");
        assert_eq!(deliver.src_terminal_id, MOCK_MO_PHONE);
        assert_eq!(deliver.msg_length(), 140);

        let decoded = decode(&deliver.to_bytes(), V30);
        assert_eq!(decoded.text().unwrap(), "回".repeat(70));
    }

    #[test]
    fn v2_report_is_recognised_by_flag() {
        let report = Report::mock(99, "13800138000", "2310210805".into(), "2310210806".into(), 44);
        let deliver = Deliver {
            sequence_id: 3,
            version: V20,
            msg_id: 1,
            dest_id: "1064899".into(),
            service_id: "MI0001".into(),
            tp_pid: 0,
            tp_udhi: 0,
            msg_fmt: 0,
            src_terminal_id: "13800138000".into(),
            src_terminal_type: 0,
            content: DeliverContent::Report(report.clone()),
            link_id: String::new(),
        };
        let bytes = deliver.to_bytes();
        assert_eq!(bytes.len(), 85 + 60);

        let decoded = decode(&bytes, V20);
        assert_eq!(decoded.report(), Some(&report));
        assert_eq!(decoded.report().unwrap().stat, "EXPIRED");
        assert!(decoded.text().is_none());
    }

    #[test]
    fn response_echoes_msg_id() {
        let seqs = Sequences::default();
        let record = ClientAuthRecord::new(Isp::Cmpp, "123456", "888888", V20);
        let deliver = Deliver::mock_mo(&record, "", "hi", &seqs).unwrap();
        let resp = deliver.to_response(0);
        assert_eq!(resp.msg_id, deliver.msg_id);
        assert_eq!(resp.sequence_id, deliver.sequence_id);
        assert_eq!(resp.to_bytes().len(), 21);
    }
}
