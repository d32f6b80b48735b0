use crate::auth::ClientAuthRecord;
use crate::cmpp::{CommandId, Deliver, Header, Report, is_v3};
use crate::codec::{self, CodecError, Decodable, Encodable};
use crate::datatypes::{self, MsgFormat, MtOptions, timestamp};
use crate::sequence::Sequences;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::Local;
use std::io::Cursor;
use std::time::Duration;

/// Most destinations one submit may carry
pub const MAX_DESTINATIONS: usize = 100;

/// CMPP_SUBMIT: one mobile-terminated message segment.
///
/// Terminal id fields are 32 bytes wide in 3.0 and 21 in 2.x; the trailer is
/// a 20-byte link id in 3.0 and 8 reserved bytes in 2.x.
#[derive(Clone, Debug, PartialEq)]
pub struct Submit {
    pub sequence_id: u32,
    /// Negotiated version, decides the layout. Not itself on the wire.
    pub version: u8,

    pub msg_id: u64,
    pub pk_total: u8,
    /// 1-based
    pub pk_number: u8,
    pub registered_delivery: u8,
    pub msg_level: u8,
    pub service_id: String,
    pub fee_user_type: u8,
    pub fee_terminal_id: String,
    /// 3.0 only
    pub fee_terminal_type: u8,
    pub tp_pid: u8,
    pub tp_udhi: u8,
    pub msg_fmt: u8,
    pub msg_src: String,
    pub fee_type: String,
    pub fee_code: String,
    pub valid_time: String,
    pub at_time: String,
    pub src_id: String,
    pub dest_terminal_ids: Vec<String>,
    /// 3.0 only
    pub dest_terminal_type: u8,
    pub msg_content: Bytes,
    /// 3.0 only
    pub link_id: String,
}

pub(crate) fn terminal_width(version: u8) -> usize {
    if is_v3(version) { 32 } else { 21 }
}

impl Submit {
    /// Fixed part of the packet, header included
    pub fn base_len(version: u8) -> usize {
        if is_v3(version) { 163 } else { 138 }
    }

    /// Build the submits for one logical message.
    ///
    /// Content over the single-packet cap becomes several TP-UDHI segments.
    /// The first segment carries `sequence_id`; the rest draw fresh ids from
    /// `seqs`.
    pub fn build(
        record: &ClientAuthRecord,
        phones: &[String],
        content: &str,
        options: &MtOptions,
        sequence_id: u32,
        seqs: &Sequences,
    ) -> Result<Vec<Submit>, CodecError> {
        if phones.is_empty() || phones.len() > MAX_DESTINATIONS {
            return Err(CodecError::FieldValidation {
                field: "dest_terminal_id",
                reason: format!("{} destinations, expected 1-{MAX_DESTINATIONS}", phones.len()),
            });
        }

        let mt = options.resolve(record);
        let format = MsgFormat::detect(content, MsgFormat::Ucs2);
        let segments = datatypes::encode_segments(content, format)?;
        let pk_total = segments.len() as u8;

        let template = Submit {
            sequence_id,
            version: record.version,
            msg_id: 0,
            pk_total,
            pk_number: 1,
            registered_delivery: mt.need_report,
            msg_level: mt.msg_level,
            service_id: mt.service_id,
            fee_user_type: mt.fee_user_type,
            fee_terminal_id: mt.fee_terminal_id,
            fee_terminal_type: mt.fee_terminal_type,
            tp_pid: 0,
            tp_udhi: u8::from(pk_total > 1),
            msg_fmt: format.into(),
            msg_src: record.client_id.clone(),
            fee_type: mt.fee_type,
            fee_code: mt.fee_code,
            valid_time: mt.valid_time,
            at_time: mt.at_time,
            src_id: mt.src_id,
            dest_terminal_ids: phones.to_vec(),
            dest_terminal_type: 0,
            msg_content: Bytes::new(),
            link_id: mt.link_id,
        };

        let submits = segments
            .into_iter()
            .enumerate()
            .map(|(index, segment)| {
                let mut submit = template.clone();
                if index > 0 {
                    submit.sequence_id = seqs.seq32.next_val();
                }
                submit.pk_number = index as u8 + 1;
                submit.msg_content = segment;
                submit
            })
            .collect();
        Ok(submits)
    }

    /// Message text with any concatenation header removed
    pub fn text(&self) -> String {
        datatypes::decode_text(datatypes::strip_udh(&self.msg_content), self.msg_fmt)
    }

    /// Reply with `result`; a gateway message id is only drawn on success.
    pub fn to_response(&self, result: u32, seqs: &Sequences) -> SubmitResp {
        SubmitResp {
            sequence_id: self.sequence_id,
            version: self.version,
            msg_id: if result == 0 { seqs.seq64.next_val() } else { 0 },
            result,
        }
    }

    /// The status report a gateway sends back for this submit once the
    /// handset has (notionally) received it.
    pub fn to_delivery_report(&self, msg_id: u64, seqs: &Sequences) -> Deliver {
        let now = Local::now();
        let dest = self.dest_terminal_ids.first().cloned().unwrap_or_default();
        let report = Report::mock(
            msg_id,
            &dest,
            timestamp::report_stamp(&now),
            timestamp::report_stamp(&timestamp::after(&now, Duration::from_secs(10))),
            seqs.seq32.next_val(),
        );

        Deliver {
            sequence_id: seqs.seq32.next_val(),
            version: self.version,
            msg_id: seqs.seq64.next_val(),
            dest_id: self.src_id.clone(),
            service_id: self.service_id.clone(),
            tp_pid: 0,
            tp_udhi: 0,
            msg_fmt: 0,
            src_terminal_id: dest,
            src_terminal_type: self.dest_terminal_type,
            content: crate::cmpp::DeliverContent::Report(report),
            link_id: String::new(),
        }
    }

    fn wire_len(&self) -> usize {
        Self::base_len(self.version)
            + self.dest_terminal_ids.len() * terminal_width(self.version)
            + self.msg_content.len()
    }
}

impl Decodable for Submit {
    type Header = Header;

    fn command_id() -> u32 {
        CommandId::Submit.into()
    }

    fn decode(header: Header, buf: &mut Cursor<&[u8]>, version: u8) -> Result<Self, CodecError> {
        codec::expect_command(Self::command_id(), header.command_id.into())?;
        let v3 = is_v3(version);
        let width = terminal_width(version);

        let msg_id = codec::decode_u64(buf)?;
        let pk_total = codec::decode_u8(buf)?;
        let pk_number = codec::decode_u8(buf)?;
        let registered_delivery = codec::decode_u8(buf)?;
        let msg_level = codec::decode_u8(buf)?;
        let service_id = codec::decode_octets(buf, 10)?;
        let fee_user_type = codec::decode_u8(buf)?;
        let fee_terminal_id = codec::decode_octets(buf, width)?;
        let fee_terminal_type = if v3 { codec::decode_u8(buf)? } else { 0 };
        let tp_pid = codec::decode_u8(buf)?;
        let tp_udhi = codec::decode_u8(buf)?;
        let msg_fmt = codec::decode_u8(buf)?;
        let msg_src = codec::decode_octets(buf, 6)?;
        let fee_type = codec::decode_octets(buf, 2)?;
        let fee_code = codec::decode_octets(buf, 6)?;
        let valid_time = codec::decode_octets(buf, 17)?;
        let at_time = codec::decode_octets(buf, 17)?;
        let src_id = codec::decode_octets(buf, 21)?;

        let dest_count = codec::decode_u8(buf)? as usize;
        let dest_terminal_ids = (0..dest_count)
            .map(|_| codec::decode_octets(buf, width))
            .collect::<Result<Vec<_>, _>>()?;
        let dest_terminal_type = if v3 { codec::decode_u8(buf)? } else { 0 };

        let msg_length = codec::decode_u8(buf)? as usize;
        let msg_content = codec::decode_bytes(buf, msg_length)?;

        let link_id = if v3 {
            codec::decode_octets(buf, 20)?
        } else {
            codec::decode_bytes(buf, 8)?;
            String::new()
        };

        Ok(Submit {
            sequence_id: header.sequence_id,
            version,
            msg_id,
            pk_total,
            pk_number,
            registered_delivery,
            msg_level,
            service_id,
            fee_user_type,
            fee_terminal_id,
            fee_terminal_type,
            tp_pid,
            tp_udhi,
            msg_fmt,
            msg_src,
            fee_type,
            fee_code,
            valid_time,
            at_time,
            src_id,
            dest_terminal_ids,
            dest_terminal_type,
            msg_content,
            link_id,
        })
    }
}

impl Encodable for Submit {
    fn encode(&self, buf: &mut BytesMut) {
        let v3 = is_v3(self.version);
        let width = terminal_width(self.version);

        Header {
            total_length: self.wire_len() as u32,
            command_id: CommandId::Submit,
            sequence_id: self.sequence_id,
        }
        .encode(buf);

        buf.put_u64(self.msg_id);
        buf.put_u8(self.pk_total);
        buf.put_u8(self.pk_number);
        buf.put_u8(self.registered_delivery);
        buf.put_u8(self.msg_level);
        codec::encode_octets(buf, &self.service_id, 10);
        buf.put_u8(self.fee_user_type);
        codec::encode_octets(buf, &self.fee_terminal_id, width);
        if v3 {
            buf.put_u8(self.fee_terminal_type);
        }
        buf.put_u8(self.tp_pid);
        buf.put_u8(self.tp_udhi);
        buf.put_u8(self.msg_fmt);
        codec::encode_octets(buf, &self.msg_src, 6);
        codec::encode_octets(buf, &self.fee_type, 2);
        codec::encode_octets(buf, &self.fee_code, 6);
        codec::encode_octets(buf, &self.valid_time, 17);
        codec::encode_octets(buf, &self.at_time, 17);
        codec::encode_octets(buf, &self.src_id, 21);
        buf.put_u8(self.dest_terminal_ids.len() as u8);
        for dest in &self.dest_terminal_ids {
            codec::encode_octets(buf, dest, width);
        }
        if v3 {
            buf.put_u8(self.dest_terminal_type);
        }
        buf.put_u8(self.msg_content.len() as u8);
        buf.put_slice(&self.msg_content);
        if v3 {
            codec::encode_octets(buf, &self.link_id, 20);
        } else {
            buf.put_bytes(0, 8);
        }
    }

    fn encoded_size(&self) -> usize {
        self.wire_len()
    }
}

/// CMPP_SUBMIT_RESP: gateway message id plus result (4 bytes in 3.0, 1 in 2.x).
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitResp {
    pub sequence_id: u32,
    pub version: u8,
    pub msg_id: u64,
    pub result: u32,
}

impl SubmitResp {
    pub const LEN_V3: u32 = 24;
    pub const LEN_V2: u32 = 21;
}

impl Decodable for SubmitResp {
    type Header = Header;

    fn command_id() -> u32 {
        CommandId::SubmitResp.into()
    }

    fn decode(header: Header, buf: &mut Cursor<&[u8]>, version: u8) -> Result<Self, CodecError> {
        codec::expect_command(Self::command_id(), header.command_id.into())?;
        let msg_id = codec::decode_u64(buf)?;
        let result = match header.total_length {
            Self::LEN_V3 => codec::decode_u32(buf)?,
            _ => codec::decode_u8(buf)? as u32,
        };
        Ok(SubmitResp {
            sequence_id: header.sequence_id,
            version,
            msg_id,
            result,
        })
    }
}

impl Encodable for SubmitResp {
    fn encode(&self, buf: &mut BytesMut) {
        Header {
            total_length: self.encoded_size() as u32,
            command_id: CommandId::SubmitResp,
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
