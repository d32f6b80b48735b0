use crate::auth::ClientAuthRecord;
use crate::codec::{self, CodecError, Decodable, Encodable};
use crate::sequence::SequenceTriple;
use crate::sgip::{BindResp, CommandId, SgipHeader, Status};
use bytes::{BufMut, BytesMut};
use std::io::Cursor;

/// SP connecting to the SMG to send commands
pub const LOGIN_SP_TO_SMG: u8 = 1;
/// SMG connecting to the SP to deliver commands
pub const LOGIN_SMG_TO_SP: u8 = 2;

/// SGIP_BIND. Credentials travel in clear text.
#[derive(Clone, Debug, PartialEq)]
pub struct Bind {
    pub sequence: SequenceTriple,
    pub login_type: u8,
    pub login_name: String,
    pub login_password: String,
}

impl Bind {
    pub const LEN: u32 = 61;

    pub fn new(record: &ClientAuthRecord, sequence: SequenceTriple) -> Self {
        Bind {
            sequence,
            login_type: LOGIN_SP_TO_SMG,
            login_name: record.client_id.clone(),
            login_password: record.shared_secret.clone(),
        }
    }

    /// Plain name and password comparison
    pub fn check(&self, record: Option<&ClientAuthRecord>) -> Status {
        match record {
            Some(record)
                if record.client_id == self.login_name
                    && record.shared_secret == self.login_password =>
            {
                Status::Ok
            }
            _ => Status::IllegalLogin,
        }
    }

    pub fn to_response(&self, result: u8) -> BindResp {
        BindResp::new(self.sequence, result)
    }
}

impl Decodable for Bind {
    type Header = SgipHeader;

    fn command_id() -> u32 {
        CommandId::Bind.into()
    }

    fn decode(header: SgipHeader, buf: &mut Cursor<&[u8]>, _version: u8) -> Result<Self, CodecError> {
        codec::expect_command(Self::command_id(), header.command_id.into())?;
        let login_type = codec::decode_u8(buf)?;
        let login_name = codec::decode_octets(buf, 16)?;
        let login_password = codec::decode_octets(buf, 16)?;
        codec::decode_bytes(buf, 8)?;
        Ok(Bind {
            sequence: header.sequence,
            login_type,
            login_name,
            login_password,
        })
    }
}

impl Encodable for Bind {
    fn encode(&self, buf: &mut BytesMut) {
        SgipHeader {
            total_length: Self::LEN,
            command_id: CommandId::Bind,
            sequence: self.sequence,
        }
        .encode(buf);
        buf.put_u8(self.login_type);
        codec::encode_octets(buf, &self.login_name, 16);
        codec::encode_octets(buf, &self.login_password, 16);
        buf.put_bytes(0, 8);
    }

    fn encoded_size(&self) -> usize {
        Self::LEN as usize
    }
}

/// SGIP_UNBIND
#[derive(Clone, Debug, PartialEq)]
pub struct Unbind {
    pub sequence: SequenceTriple,
}

impl_header_only_pdu!(sgip Unbind, CommandId::Unbind);

impl Unbind {
    pub fn to_response(&self) -> UnbindResp {
        UnbindResp::new(self.sequence)
    }
}

/// SGIP_UNBIND_RESP
#[derive(Clone, Debug, PartialEq)]
pub struct UnbindResp {
    pub sequence: SequenceTriple,
}

impl_header_only_pdu!(sgip UnbindResp, CommandId::UnbindResp);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Isp;
    use crate::sequence::TripleSequence;

    fn record() -> ClientAuthRecord {
        ClientAuthRecord::new(Isp::Sgip, "3053112345", "secret", 0x12)
    }

    #[test]
    fn bind_is_61_bytes_and_decodes() {
        let seq = TripleSequence::new(3053112345);
        let bind = Bind::new(&record(), seq.next_val());
        let bytes = bind.to_bytes();
        assert_eq!(bytes.len(), 61);

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = SgipHeader::decode(&mut cursor).unwrap();
        let decoded = Bind::decode(header, &mut cursor, 0x12).unwrap();
        assert_eq!(decoded, bind);
        assert_eq!(decoded.check(Some(&record())), Status::Ok);
    }

    #[test]
    fn wrong_password_or_unknown_client_is_illegal_login() {
        let seq = TripleSequence::new(1);
        let mut bind = Bind::new(&record(), seq.next_val());
        assert_eq!(bind.check(None), Status::IllegalLogin);
        bind.login_password = "nope".into();
        assert_eq!(bind.check(Some(&record())), Status::IllegalLogin);
    }

    #[test]
    fn unbind_echoes_sequence() {
        let seq = TripleSequence::new(1);
        let unbind = Unbind::new(seq.next_val());
        assert_eq!(unbind.to_bytes().len(), 20);
        assert_eq!(unbind.to_response().sequence, unbind.sequence);
    }
}
