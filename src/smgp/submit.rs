use crate::auth::ClientAuthRecord;
use crate::codec::{self, CodecError, Decodable, Encodable};
use crate::datatypes::{self, MsgFormat, MtOptions, TlvList, timestamp};
use crate::sequence::{Sequences, bcd_to_string};
use crate::smgp::{CommandId, Deliver, DeliverContent, Header, Report, tag};
use bytes::{BufMut, Bytes, BytesMut};
use chrono::Local;
use std::io::Cursor;
use std::time::Duration;

/// Most destinations one submit may carry
pub const MAX_DEST_TERMINALS: usize = 100;

/// `MsgType` for an ordinary MT message
pub const MSG_TYPE_MT: u8 = 6;

/// SMGP_SUBMIT. Long-message metadata travels in TLVs after the fixed body.
#[derive(Clone, Debug, PartialEq)]
pub struct Submit {
    pub sequence_id: u32,
    pub version: u8,
    pub msg_type: u8,
    pub need_report: u8,
    pub priority: u8,
    pub service_id: String,
    pub fee_type: String,
    pub fee_code: String,
    pub fixed_fee: String,
    pub msg_format: u8,
    pub valid_time: String,
    pub at_time: String,
    pub src_term_id: String,
    pub charge_term_id: String,
    pub dest_term_ids: Vec<String>,
    pub msg_content: Bytes,
    pub tlvs: TlvList,
}

impl Submit {
    /// Fixed part of the packet, header included
    pub const BASE_LEN: usize = 126;

    /// Build the submits for one logical message; see
    /// [`crate::cmpp::Submit::build`] for the sequence numbering rule.
    pub fn build(
        record: &ClientAuthRecord,
        phones: &[String],
        content: &str,
        options: &MtOptions,
        sequence_id: u32,
        seqs: &Sequences,
    ) -> Result<Vec<Submit>, CodecError> {
        if phones.is_empty() || phones.len() > MAX_DEST_TERMINALS {
            return Err(CodecError::FieldValidation {
                field: "dest_term_id",
                reason: format!("{} destinations, expected 1-{MAX_DEST_TERMINALS}", phones.len()),
            });
        }

        let mt = options.resolve(record);
        let format = MsgFormat::detect(content, MsgFormat::Gbk);
        let segments = datatypes::encode_segments(content, format)?;
        let pk_total = segments.len() as u8;

        let mut base_tlvs = TlvList::new();
        if !mt.link_id.is_empty() {
            base_tlvs.add_str(tag::LINK_ID, &mt.link_id);
        }

        let template = Submit {
            sequence_id,
            version: record.version,
            msg_type: MSG_TYPE_MT,
            need_report: mt.need_report,
            priority: mt.msg_level,
            service_id: mt.service_id,
            fee_type: mt.fee_type,
            fee_code: mt.fee_code,
            fixed_fee: record.fixed_fee.clone(),
            msg_format: format.into(),
            valid_time: mt.valid_time,
            at_time: mt.at_time,
            src_term_id: mt.src_id,
            charge_term_id: mt.fee_terminal_id,
            dest_term_ids: phones.to_vec(),
            msg_content: Bytes::new(),
            tlvs: base_tlvs,
        };

        let submits = segments
            .into_iter()
            .enumerate()
            .map(|(index, segment)| {
                let mut submit = template.clone();
                if index > 0 {
                    submit.sequence_id = seqs.seq32.next_val();
                }
                if pk_total > 1 {
                    submit.tlvs.add_u8(tag::TP_PID, 0);
                    submit.tlvs.add_u8(tag::TP_UDHI, 1);
                    submit.tlvs.add_u8(tag::PK_TOTAL, pk_total);
                    submit.tlvs.add_u8(tag::PK_NUMBER, index as u8 + 1);
                }
                submit.msg_content = segment;
                submit
            })
            .collect();
        Ok(submits)
    }

    pub fn pk_total(&self) -> u8 {
        self.tlvs.get_u8(tag::PK_TOTAL).unwrap_or(1)
    }

    pub fn pk_number(&self) -> u8 {
        self.tlvs.get_u8(tag::PK_NUMBER).unwrap_or(1)
    }

    pub fn text(&self) -> String {
        datatypes::decode_text(datatypes::strip_udh(&self.msg_content), self.msg_format)
    }

    /// Reply with `status`; a BCD message id is only drawn on success.
    pub fn to_response(&self, status: u32, seqs: &Sequences) -> SubmitResp {
        SubmitResp {
            sequence_id: self.sequence_id,
            msg_id: if status == 0 { seqs.bcd.next_val() } else { [0u8; 10] },
            status,
        }
    }

    /// Status report for this submit, addressed back to its sender.
    pub fn to_delivery_report(&self, msg_id: [u8; 10], seqs: &Sequences) -> Deliver {
        let now = Local::now();
        let report = Report::mock(
            msg_id,
            timestamp::report_stamp(&now),
            timestamp::report_stamp(&timestamp::after(&now, Duration::from_secs(60))),
            seqs.seq32.next_val(),
        );

        Deliver {
            sequence_id: seqs.seq32.next_val(),
            msg_id: seqs.bcd.next_val(),
            msg_format: 0,
            recv_time: timestamp::receive_stamp(&now),
            src_term_id: self.dest_term_ids.first().cloned().unwrap_or_default(),
            dest_term_id: self.src_term_id.clone(),
            content: DeliverContent::Report(report),
            tlvs: TlvList::new(),
        }
    }

    fn wire_len(&self) -> usize {
        Self::BASE_LEN + self.dest_term_ids.len() * 21 + self.msg_content.len() + self.tlvs.encoded_size()
    }
}

impl Decodable for Submit {
    type Header = Header;

    fn command_id() -> u32 {
        CommandId::Submit.into()
    }

    fn decode(header: Header, buf: &mut Cursor<&[u8]>, version: u8) -> Result<Self, CodecError> {
        codec::expect_command(Self::command_id(), header.command_id.into())?;

        let msg_type = codec::decode_u8(buf)?;
        let need_report = codec::decode_u8(buf)?;
        let priority = codec::decode_u8(buf)?;
        let service_id = codec::decode_octets(buf, 10)?;
        let fee_type = codec::decode_octets(buf, 2)?;
        let fee_code = codec::decode_octets(buf, 6)?;
        let fixed_fee = codec::decode_octets(buf, 6)?;
        let msg_format = codec::decode_u8(buf)?;
        let valid_time = codec::decode_octets(buf, 17)?;
        let at_time = codec::decode_octets(buf, 17)?;
        let src_term_id = codec::decode_octets(buf, 21)?;
        let charge_term_id = codec::decode_octets(buf, 21)?;

        let dest_count = codec::decode_u8(buf)? as usize;
        let dest_term_ids = (0..dest_count)
            .map(|_| codec::decode_octets(buf, 21))
            .collect::<Result<Vec<_>, _>>()?;

        let msg_length = codec::decode_u8(buf)? as usize;
        let msg_content = codec::decode_bytes(buf, msg_length)?;
        codec::decode_bytes(buf, 8)?;
        let tlvs = decode_trailing_tlvs(buf, header.total_length)?;

        Ok(Submit {
            sequence_id: header.sequence_id,
            version,
            msg_type,
            need_report,
            priority,
            service_id,
            fee_type,
            fee_code,
            fixed_fee,
            msg_format,
            valid_time,
            at_time,
            src_term_id,
            charge_term_id,
            dest_term_ids,
            msg_content,
            tlvs,
        })
    }
}

/// TLVs fill whatever the declared length leaves after the fixed body.
pub(crate) fn decode_trailing_tlvs(
    buf: &mut Cursor<&[u8]>,
    total_length: u32,
) -> Result<TlvList, CodecError> {
    let remaining = (total_length as u64).saturating_sub(buf.position()) as usize;
    if remaining == 0 {
        return Ok(TlvList::new());
    }
    let raw = codec::decode_bytes(buf, remaining)?;
    let mut cursor = Cursor::new(raw.as_ref());
    TlvList::decode(&mut cursor)
}

impl Encodable for Submit {
    fn encode(&self, buf: &mut BytesMut) {
        Header {
            total_length: self.wire_len() as u32,
            command_id: CommandId::Submit,
            sequence_id: self.sequence_id,
        }
        .encode(buf);

        buf.put_u8(self.msg_type);
        buf.put_u8(self.need_report);
        buf.put_u8(self.priority);
        codec::encode_octets(buf, &self.service_id, 10);
        codec::encode_octets(buf, &self.fee_type, 2);
        codec::encode_octets(buf, &self.fee_code, 6);
        codec::encode_octets(buf, &self.fixed_fee, 6);
        buf.put_u8(self.msg_format);
        codec::encode_octets(buf, &self.valid_time, 17);
        codec::encode_octets(buf, &self.at_time, 17);
        codec::encode_octets(buf, &self.src_term_id, 21);
        codec::encode_octets(buf, &self.charge_term_id, 21);
        buf.put_u8(self.dest_term_ids.len() as u8);
        for dest in &self.dest_term_ids {
            codec::encode_octets(buf, dest, 21);
        }
        buf.put_u8(self.msg_content.len() as u8);
        buf.put_slice(&self.msg_content);
        buf.put_bytes(0, 8);
        self.tlvs.encode(buf);
    }

    fn encoded_size(&self) -> usize {
        self.wire_len()
    }
}

/// SMGP_SUBMIT_RESP: 10-byte BCD message id plus status.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitResp {
    pub sequence_id: u32,
    pub msg_id: [u8; 10],
    pub status: u32,
}

impl SubmitResp {
    pub const LEN: u32 = 26;

    /// Message id as the 20 decimal digits it encodes
    pub fn msg_id_string(&self) -> String {
        bcd_to_string(&self.msg_id)
    }
}

impl Decodable for SubmitResp {
    type Header = Header;

    fn command_id() -> u32 {
        CommandId::SubmitResp.into()
    }

    fn decode(header: Header, buf: &mut Cursor<&[u8]>, _version: u8) -> Result<Self, CodecError> {
        codec::expect_command(Self::command_id(), header.command_id.into())?;
        Ok(SubmitResp {
            sequence_id: header.sequence_id,
            msg_id: codec::decode_array::<10>(buf)?,
            status: codec::decode_u32(buf)?,
        })
    }
}

impl Encodable for SubmitResp {
    fn encode(&self, buf: &mut BytesMut) {
        Header {
            total_length: Self::LEN,
            command_id: CommandId::SubmitResp,
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
