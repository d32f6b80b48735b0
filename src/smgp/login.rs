use crate::auth::ClientAuthRecord;
use crate::codec::{self, CodecError, Decodable, Encodable};
use crate::smgp::{CommandId, Header, Status, major_match};
use bytes::{BufMut, BytesMut};
use chrono::Local;
use std::io::Cursor;
use tracing::debug;

/// Login mode: 0 send only, 1 receive only, 2 transmit
pub const LOGIN_MODE_TRANSMIT: u8 = 2;

/// SMGP_LOGIN
#[derive(Clone, Debug, PartialEq)]
pub struct Login {
    pub sequence_id: u32,
    /// 8 octets
    pub client_id: String,
    /// `MD5(client_id + 7 × 0x00 + secret + timestamp)`
    pub authenticator_client: [u8; 16],
    pub login_mode: u8,
    pub timestamp: u32,
    pub version: u8,
}

impl Login {
    pub const LEN: u32 = 42;

    pub fn new(record: &ClientAuthRecord, sequence_id: u32) -> Self {
        let timestamp = crate::datatypes::timestamp::mmddhhmmss(&Local::now());
        Self::with_timestamp(record, sequence_id, timestamp)
    }

    pub fn with_timestamp(record: &ClientAuthRecord, sequence_id: u32, timestamp: u32) -> Self {
        Login {
            sequence_id,
            client_id: record.client_id.clone(),
            authenticator_client: codec::login_digest(
                &record.client_id,
                7,
                &record.shared_secret,
                timestamp,
            ),
            login_mode: LOGIN_MODE_TRANSMIT,
            timestamp,
            version: record.version,
        }
    }

    /// An unknown client fails the same way as a wrong secret.
    pub fn check(&self, record: Option<&ClientAuthRecord>) -> Status {
        let Some(record) = record else {
            return Status::AuthFailed;
        };
        if !major_match(self.version, record.version) {
            return Status::VersionTooHigh;
        }

        let expected =
            codec::login_digest(&record.client_id, 7, &record.shared_secret, self.timestamp);
        debug!(
            client_id = %self.client_id,
            received = ?self.authenticator_client,
            computed = ?expected,
            "checking login authenticator"
        );
        if expected == self.authenticator_client {
            Status::Ok
        } else {
            Status::AuthFailed
        }
    }

    pub fn to_response(&self, status: u32, secret: &str) -> LoginResp {
        let authenticator_server = if status == 0 {
            server_digest(status, &self.client_id, secret)
        } else {
            [0u8; 16]
        };
        LoginResp {
            sequence_id: self.sequence_id,
            status,
            authenticator_server,
            version: self.version,
        }
    }
}

/// The status enters the digest as a single byte even though it is a
/// 4-byte word on the wire.
fn server_digest(status: u32, client_id: &str, secret: &str) -> [u8; 16] {
    codec::md5_digest(&[&[status as u8], client_id.as_bytes(), secret.as_bytes()])
}

impl Decodable for Login {
    type Header = Header;

    fn command_id() -> u32 {
        CommandId::Login.into()
    }

    fn decode(header: Header, buf: &mut Cursor<&[u8]>, _version: u8) -> Result<Self, CodecError> {
        codec::expect_command(Self::command_id(), header.command_id.into())?;

        Ok(Login {
            sequence_id: header.sequence_id,
            client_id: codec::decode_octets(buf, 8)?,
            authenticator_client: codec::decode_array::<16>(buf)?,
            login_mode: codec::decode_u8(buf)?,
            timestamp: codec::decode_u32(buf)?,
            version: codec::decode_u8(buf)?,
        })
    }
}

impl Encodable for Login {
    fn encode(&self, buf: &mut BytesMut) {
        Header {
            total_length: Self::LEN,
            command_id: CommandId::Login,
            sequence_id: self.sequence_id,
        }
        .encode(buf);
        codec::encode_octets(buf, &self.client_id, 8);
        buf.put_slice(&self.authenticator_client);
        buf.put_u8(self.login_mode);
        buf.put_u32(self.timestamp);
        buf.put_u8(self.version);
    }

    fn encoded_size(&self) -> usize {
        Self::LEN as usize
    }
}

/// SMGP_LOGIN_RESP
#[derive(Clone, Debug, PartialEq)]
pub struct LoginResp {
    pub sequence_id: u32,
    pub status: u32,
    pub authenticator_server: [u8; 16],
    pub version: u8,
}

impl LoginResp {
    pub const LEN: u32 = 33;

    pub fn verify(&self, client_id: &str, secret: &str) -> bool {
        self.status == 0 && server_digest(self.status, client_id, secret) == self.authenticator_server
    }
}

impl Decodable for LoginResp {
    type Header = Header;

    fn command_id() -> u32 {
        CommandId::LoginResp.into()
    }

    fn decode(header: Header, buf: &mut Cursor<&[u8]>, _version: u8) -> Result<Self, CodecError> {
        codec::expect_command(Self::command_id(), header.command_id.into())?;

        Ok(LoginResp {
            sequence_id: header.sequence_id,
            status: codec::decode_u32(buf)?,
            authenticator_server: codec::decode_array::<16>(buf)?,
            version: codec::decode_u8(buf)?,
        })
    }
}

impl Encodable for LoginResp {
    fn encode(&self, buf: &mut BytesMut) {
        Header {
            total_length: Self::LEN,
            command_id: CommandId::LoginResp,
            sequence_id: self.sequence_id,
        }
        .encode(buf);
        buf.put_u32(self.status);
        buf.put_slice(&self.authenticator_server);
        buf.put_u8(self.version);
    }

    fn encoded_size(&self) -> usize {
        Self::LEN as usize
    }
}
