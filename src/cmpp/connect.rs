use crate::auth::ClientAuthRecord;
use crate::cmpp::{CommandId, ConnectStatus, Header, is_v3, major_match};
use crate::codec::{self, CodecError, Decodable, Encodable};
use bytes::{BufMut, BytesMut};
use chrono::Local;
use std::io::Cursor;
use tracing::debug;

/// CMPP_CONNECT: the SP's login request.
#[derive(Clone, Debug, PartialEq)]
pub struct Connect {
    pub sequence_id: u32,

    /// SP id (6 octets)
    pub source_addr: String,

    /// `MD5(source_addr + 9 × 0x00 + secret + timestamp)`
    pub authenticator_source: [u8; 16],

    /// High nibble major, low nibble minor (0x30 for 3.0)
    pub version: u8,

    /// `MMDDHHMMSS` as an integer
    pub timestamp: u32,
}

impl Connect {
    pub const LEN: u32 = 39;

    /// Build a login for `record` stamped with the current local time.
    pub fn new(record: &ClientAuthRecord, sequence_id: u32) -> Self {
        let timestamp = crate::datatypes::timestamp::mmddhhmmss(&Local::now());
        Self::with_timestamp(record, sequence_id, timestamp)
    }

    pub fn with_timestamp(record: &ClientAuthRecord, sequence_id: u32, timestamp: u32) -> Self {
        Connect {
            sequence_id,
            source_addr: record.client_id.clone(),
            authenticator_source: codec::login_digest(
                &record.client_id,
                9,
                &record.shared_secret,
                timestamp,
            ),
            version: record.version,
            timestamp,
        }
    }

    /// Authenticate against the record the server holds for `source_addr`.
    pub fn check(&self, record: Option<&ClientAuthRecord>) -> ConnectStatus {
        let Some(record) = record else {
            return ConnectStatus::InvalidSourceAddr;
        };
        if !major_match(self.version, record.version) {
            return ConnectStatus::VersionTooHigh;
        }

        let expected = codec::login_digest(
            &record.client_id,
            9,
            &record.shared_secret,
            self.timestamp,
        );
        debug!(
            client_id = %self.source_addr,
            received = ?self.authenticator_source,
            computed = ?expected,
            "checking connect authenticator"
        );
        if expected == self.authenticator_source {
            ConnectStatus::Ok
        } else {
            ConnectStatus::AuthFailed
        }
    }

    /// Build the reply. `secret` is only used when `status` is 0.
    pub fn to_response(&self, status: u32, secret: &str) -> ConnectResp {
        let authenticator_ismg = if status == 0 {
            let status_bytes = status.to_be_bytes();
            let status_field: &[u8] = if is_v3(self.version) {
                &status_bytes
            } else {
                &status_bytes[3..]
            };
            codec::md5_digest(&[
                status_field,
                self.source_addr.as_bytes(),
                secret.as_bytes(),
            ])
        } else {
            [0u8; 16]
        };

        ConnectResp {
            sequence_id: self.sequence_id,
            status,
            authenticator_ismg,
            version: self.version,
        }
    }
}

impl Decodable for Connect {
    type Header = Header;

    fn command_id() -> u32 {
        CommandId::Connect.into()
    }

    fn decode(header: Header, buf: &mut Cursor<&[u8]>, _version: u8) -> Result<Self, CodecError> {
        codec::expect_command(Self::command_id(), header.command_id.into())?;

        Ok(Connect {
            sequence_id: header.sequence_id,
            source_addr: codec::decode_octets(buf, 6)?,
            authenticator_source: codec::decode_array::<16>(buf)?,
            version: codec::decode_u8(buf)?,
            timestamp: codec::decode_u32(buf)?,
        })
    }
}

impl Encodable for Connect {
    fn encode(&self, buf: &mut BytesMut) {
        Header {
            total_length: Self::LEN,
            command_id: CommandId::Connect,
            sequence_id: self.sequence_id,
        }
        .encode(buf);
        codec::encode_octets(buf, &self.source_addr, 6);
        buf.put_slice(&self.authenticator_source);
        buf.put_u8(self.version);
        buf.put_u32(self.timestamp);
    }

    fn encoded_size(&self) -> usize {
        Self::LEN as usize
    }
}

/// CMPP_CONNECT_RESP. The status word is 4 bytes in 3.0 and 1 byte in 2.x.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectResp {
    pub sequence_id: u32,
    pub status: u32,
    /// `MD5(status + source_addr + secret)` on success, zeros otherwise
    pub authenticator_ismg: [u8; 16],
    pub version: u8,
}

impl ConnectResp {
    pub const LEN_V3: u32 = 33;
    pub const LEN_V2: u32 = 30;

    fn wire_len(&self) -> u32 {
        if is_v3(self.version) {
            Self::LEN_V3
        } else {
            Self::LEN_V2
        }
    }

    /// Client-side check of the gateway authenticator.
    pub fn verify(&self, client_id: &str, secret: &str) -> bool {
        if self.status != 0 {
            return false;
        }
        let status_bytes = self.status.to_be_bytes();
        let status_field: &[u8] = if is_v3(self.version) {
            &status_bytes
        } else {
            &status_bytes[3..]
        };
        codec::md5_digest(&[status_field, client_id.as_bytes(), secret.as_bytes()])
            == self.authenticator_ismg
    }
}

impl Decodable for ConnectResp {
    type Header = Header;

    fn command_id() -> u32 {
        CommandId::ConnectResp.into()
    }

    fn decode(header: Header, buf: &mut Cursor<&[u8]>, _version: u8) -> Result<Self, CodecError> {
        codec::expect_command(Self::command_id(), header.command_id.into())?;

        let status = match header.total_length {
            Self::LEN_V3 => codec::decode_u32(buf)?,
            Self::LEN_V2 => codec::decode_u8(buf)? as u32,
            length => {
                return Err(CodecError::InvalidPduLength {
                    length,
                    min: Self::LEN_V2,
                    max: Self::LEN_V3,
                });
            }
        };

        Ok(ConnectResp {
            sequence_id: header.sequence_id,
            status,
            authenticator_ismg: codec::decode_array::<16>(buf)?,
            version: codec::decode_u8(buf)?,
        })
    }
}

impl Encodable for ConnectResp {
    fn encode(&self, buf: &mut BytesMut) {
        Header {
            total_length: self.wire_len(),
            command_id: CommandId::ConnectResp,
            sequence_id: self.sequence_id,
        }
        .encode(buf);
        if is_v3(self.version) {
            buf.put_u32(self.status);
        } else {
            buf.put_u8(self.status as u8);
        }
        buf.put_slice(&self.authenticator_ismg);
        buf.put_u8(self.version);
    }

    fn encoded_size(&self) -> usize {
        self.wire_len() as usize
    }
}
