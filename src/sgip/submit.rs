use crate::auth::ClientAuthRecord;
use crate::codec::{self, CodecError, Decodable, Encodable};
use crate::datatypes::{self, MsgFormat, MtOptions};
use crate::sequence::{SequenceTriple, Sequences};
use crate::sgip::{CommandId, Report, SgipHeader, SubmitResp};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::Cursor;

pub const MAX_USERS: usize = 100;

/// Default "reason for MT" flag: 2, neither MO-triggered nor on-demand
pub const MORELATETO_MT_DEFAULT: u8 = 2;

/// SGIP_SUBMIT
#[derive(Clone, Debug, PartialEq)]
pub struct Submit {
    pub sequence: SequenceTriple,
    pub sp_number: String,
    /// Empty means the receiving user pays
    pub charge_number: String,
    pub user_numbers: Vec<String>,
    pub corp_id: String,
    pub service_type: String,
    pub fee_type: u8,
    pub fee_value: String,
    pub given_value: String,
    pub agent_flag: u8,
    pub morelateto_mt_flag: u8,
    pub priority: u8,
    /// `yyMMddHHmmss032+`
    pub expire_time: String,
    pub schedule_time: String,
    pub report_flag: u8,
    pub tp_pid: u8,
    pub tp_udhi: u8,
    pub message_coding: u8,
    pub message_type: u8,
    pub content: Bytes,
}

impl Submit {
    pub const BASE_LEN: usize = 143;

    /// Build the submits for one logical message; see
    /// [`crate::cmpp::Submit::build`] for the segmentation rules.
    pub fn build(
        record: &ClientAuthRecord,
        phones: &[String],
        text: &str,
        options: &MtOptions,
        sequence: SequenceTriple,
        seqs: &Sequences,
    ) -> Result<Vec<Submit>, CodecError> {
        if phones.is_empty() || phones.len() > MAX_USERS {
            return Err(CodecError::FieldValidation {
                field: "user_number",
                reason: format!("{} destinations, expected 1-{MAX_USERS}", phones.len()),
            });
        }

        let mt = options.resolve(record);
        let format = MsgFormat::detect(text, MsgFormat::Ucs2);
        let segments = datatypes::encode_segments(text, format)?;
        let corp_id = record
            .client_id
            .get(5..)
            .filter(|tail| !tail.is_empty())
            .unwrap_or(&record.client_id)
            .to_string();

        let template = Submit {
            sequence,
            sp_number: mt.src_id,
            charge_number: mt.fee_terminal_id,
            user_numbers: phones.to_vec(),
            corp_id,
            service_type: mt.service_id,
            fee_type: mt.fee_type.parse().unwrap_or(0),
            fee_value: mt.fee_code,
            given_value: String::new(),
            agent_flag: 0,
            morelateto_mt_flag: MORELATETO_MT_DEFAULT,
            priority: mt.msg_level,
            expire_time: mt.valid_time,
            schedule_time: mt.at_time,
            report_flag: mt.need_report,
            tp_pid: 0,
            tp_udhi: u8::from(segments.len() > 1),
            message_coding: format.into(),
            message_type: 0,
            content: Bytes::new(),
        };

        let submits = segments
            .into_iter()
            .enumerate()
            .map(|(index, segment)| {
                let mut submit = template.clone();
                if index > 0 {
                    submit.sequence = seqs.triple.next_val();
                }
                submit.content = segment;
                submit
            })
            .collect();
        Ok(submits)
    }

    pub fn text(&self) -> String {
        datatypes::decode_text(datatypes::strip_udh(&self.content), self.message_coding)
    }

    pub fn to_response(&self, result: u8) -> SubmitResp {
        SubmitResp::new(self.sequence, result)
    }

    /// Report for this submit addressed to its first user. `state` is
    /// 0 delivered, 1 pending, 2 failed.
    pub fn to_report(&self, state: u8, error_code: u8, seqs: &Sequences) -> Report {
        Report {
            sequence: seqs.triple.next_val(),
            submit_sequence: self.sequence,
            report_type: 0,
            user_number: self.user_numbers.first().cloned().unwrap_or_default(),
            state,
            error_code,
        }
    }

    fn wire_len(&self) -> usize {
        Self::BASE_LEN + self.user_numbers.len() * 21 + self.content.len()
    }
}

impl Decodable for Submit {
    type Header = SgipHeader;

    fn command_id() -> u32 {
        CommandId::Submit.into()
    }

    fn decode(header: SgipHeader, buf: &mut Cursor<&[u8]>, _version: u8) -> Result<Self, CodecError> {
        codec::expect_command(Self::command_id(), header.command_id.into())?;

        let sp_number = codec::decode_octets(buf, 21)?;
        let charge_number = codec::decode_octets(buf, 21)?;
        let user_count = codec::decode_u8(buf)? as usize;
        let user_numbers = (0..user_count)
            .map(|_| codec::decode_octets(buf, 21))
            .collect::<Result<Vec<_>, _>>()?;
        let corp_id = codec::decode_octets(buf, 5)?;
        let service_type = codec::decode_octets(buf, 10)?;
        let fee_type = codec::decode_u8(buf)?;
        let fee_value = codec::decode_octets(buf, 6)?;
        let given_value = codec::decode_octets(buf, 6)?;
        let agent_flag = codec::decode_u8(buf)?;
        let morelateto_mt_flag = codec::decode_u8(buf)?;
        let priority = codec::decode_u8(buf)?;
        let expire_time = codec::decode_octets(buf, 16)?;
        let schedule_time = codec::decode_octets(buf, 16)?;
        let report_flag = codec::decode_u8(buf)?;
        let tp_pid = codec::decode_u8(buf)?;
        let tp_udhi = codec::decode_u8(buf)?;
        let message_coding = codec::decode_u8(buf)?;
        let message_type = codec::decode_u8(buf)?;
        let message_length = codec::decode_u32(buf)? as usize;
        let content = codec::decode_bytes(buf, message_length)?;
        codec::decode_bytes(buf, 8)?;

        Ok(Submit {
            sequence: header.sequence,
            sp_number,
            charge_number,
            user_numbers,
            corp_id,
            service_type,
            fee_type,
            fee_value,
            given_value,
            agent_flag,
            morelateto_mt_flag,
            priority,
            expire_time,
            schedule_time,
            report_flag,
            tp_pid,
            tp_udhi,
            message_coding,
            message_type,
            content,
        })
    }
}

impl Encodable for Submit {
    fn encode(&self, buf: &mut BytesMut) {
        SgipHeader {
            total_length: self.wire_len() as u32,
            command_id: CommandId::Submit,
            sequence: self.sequence,
        }
        .encode(buf);

        codec::encode_octets(buf, &self.sp_number, 21);
        codec::encode_octets(buf, &self.charge_number, 21);
        buf.put_u8(self.user_numbers.len() as u8);
        for user in &self.user_numbers {
            codec::encode_octets(buf, user, 21);
        }
        codec::encode_octets(buf, &self.corp_id, 5);
        codec::encode_octets(buf, &self.service_type, 10);
        buf.put_u8(self.fee_type);
        codec::encode_octets(buf, &self.fee_value, 6);
        codec::encode_octets(buf, &self.given_value, 6);
        buf.put_u8(self.agent_flag);
        buf.put_u8(self.morelateto_mt_flag);
        buf.put_u8(self.priority);
        codec::encode_octets(buf, &self.expire_time, 16);
        codec::encode_octets(buf, &self.schedule_time, 16);
        buf.put_u8(self.report_flag);
        buf.put_u8(self.tp_pid);
        buf.put_u8(self.tp_udhi);
        buf.put_u8(self.message_coding);
        buf.put_u8(self.message_type);
        buf.put_u32(self.content.len() as u32);
        buf.put_slice(&self.content);
        buf.put_bytes(0, 8);
    }

    fn encoded_size(&self) -> usize {
        self.wire_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Isp;

    fn record() -> ClientAuthRecord {
        ClientAuthRecord::new(Isp::Sgip, "3053112345", "secret", 0x12)
            .with_display_no("10655")
            .with_service_id("SVC01")
    }

    #[test]
    fn submit_decodes_and_derives_corp_id() {
        let seqs = Sequences::default();
        let phones = vec!["8613800138000".to_string()];
        let options = MtOptions::new().sp_sub_no("99");
        let submit = Submit::build(&record(), &phones, "你好", &options, seqs.triple.next_val(), &seqs)
            .unwrap()
            .remove(0);
        assert_eq!(submit.corp_id, "12345");
        assert_eq!(submit.sp_number, "1065599");
        assert_eq!(submit.morelateto_mt_flag, 2);
        assert_eq!(submit.expire_time.len(), 16);

        let bytes = submit.to_bytes();
        assert_eq!(bytes.len(), 143 + 21 + 4);

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = SgipHeader::decode(&mut cursor).unwrap();
        let decoded = Submit::decode(header, &mut cursor, 0x12).unwrap();
        assert_eq!(decoded, submit);
        assert_eq!(decoded.text(), "你好");
    }

    #[test]
    fn short_client_id_is_its_own_corp_id() {
        let seqs = Sequences::default();
        let record = ClientAuthRecord::new(Isp::Sgip, "12345", "secret", 0x12);
        let phones = vec!["8613800138000".to_string()];
        let submit = Submit::build(&record, &phones, "hi", &MtOptions::new(), seqs.triple.next_val(), &seqs)
            .unwrap()
            .remove(0);
        assert_eq!(submit.corp_id, "12345");
    }

    #[test]
    fn long_text_gets_fresh_triples_after_the_first() {
        let seqs = Sequences::default();
        let phones = vec!["8613800138000".to_string()];
        let first = seqs.triple.next_val();
        let submits =
            Submit::build(&record(), &phones, &"中".repeat(100), &MtOptions::new(), first, &seqs)
                .unwrap();
        assert_eq!(submits.len(), 2);
        assert_eq!(submits[0].sequence, first);
        assert_ne!(submits[1].sequence, first);
        assert!(submits.iter().all(|s| s.tp_udhi == 1 && s.content.len() <= 140));
    }

    #[test]
    fn report_refers_to_submit_sequence() {
        let seqs = Sequences::default();
        let phones = vec!["8613800138000".to_string()];
        let submit = Submit::build(&record(), &phones, "hi", &MtOptions::new(), seqs.triple.next_val(), &seqs)
            .unwrap()
            .remove(0);
        let report = submit.to_report(0, 0, &seqs);
        assert_eq!(report.submit_sequence, submit.sequence);
        assert_eq!(report.user_number, "8613800138000");
    }
}
