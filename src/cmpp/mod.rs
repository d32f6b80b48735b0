// ABOUTME: China Mobile CMPP 2.0/2.1/3.0 wire dialect
// ABOUTME: PDU types, the decoded Frame sum type and its Protocol binding

mod command_id;
mod connect;
mod deliver;
mod link;
pub mod status;
mod submit;

pub use command_id::CommandId;
pub use connect::{Connect, ConnectResp};
pub use deliver::{Deliver, DeliverContent, DeliverResp, Report};
pub use link::{ActiveTest, ActiveTestResp, Terminate, TerminateResp};
pub use status::{ConnectStatus, DeliverStatus, SubmitStatus};
pub use submit::{MAX_DESTINATIONS, Submit, SubmitResp};

use crate::auth::Isp;
use crate::codec::{self, CodecError, Encodable, PduHeader, PduRegistry};
use crate::protocol::Protocol;
use bytes::Bytes;
use std::io::Cursor;
use std::sync::LazyLock;
use tracing::warn;

pub const V20: u8 = 0x20;
pub const V21: u8 = 0x21;
pub const V30: u8 = 0x30;

pub type Header = PduHeader<CommandId>;

/// 3.0 layout (wide terminal ids, 4-byte status words)
pub fn is_v3(version: u8) -> bool {
    major_match(version, V30)
}

/// Compare the major nibble only
pub fn major_match(a: u8, b: u8) -> bool {
    a & 0xF0 == b & 0xF0
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Connect(Connect),
    ConnectResp(ConnectResp),
    Terminate(Terminate),
    TerminateResp(TerminateResp),
    Submit(Box<Submit>),
    SubmitResp(SubmitResp),
    Deliver(Box<Deliver>),
    DeliverResp(DeliverResp),
    ActiveTest(ActiveTest),
    ActiveTestResp(ActiveTestResp),

    /// Known but unhandled commands (query, cancel, forward)
    Unknown { header: Header, body: Bytes },
}

impl Frame {
    pub fn command_id(&self) -> CommandId {
        match self {
            Frame::Connect(_) => CommandId::Connect,
            Frame::ConnectResp(_) => CommandId::ConnectResp,
            Frame::Terminate(_) => CommandId::Terminate,
            Frame::TerminateResp(_) => CommandId::TerminateResp,
            Frame::Submit(_) => CommandId::Submit,
            Frame::SubmitResp(_) => CommandId::SubmitResp,
            Frame::Deliver(_) => CommandId::Deliver,
            Frame::DeliverResp(_) => CommandId::DeliverResp,
            Frame::ActiveTest(_) => CommandId::ActiveTest,
            Frame::ActiveTestResp(_) => CommandId::ActiveTestResp,
            Frame::Unknown { header, .. } => header.command_id,
        }
    }

    pub fn sequence_id(&self) -> u32 {
        match self {
            Frame::Connect(pdu) => pdu.sequence_id,
            Frame::ConnectResp(pdu) => pdu.sequence_id,
            Frame::Terminate(pdu) => pdu.sequence_id,
            Frame::TerminateResp(pdu) => pdu.sequence_id,
            Frame::Submit(pdu) => pdu.sequence_id,
            Frame::SubmitResp(pdu) => pdu.sequence_id,
            Frame::Deliver(pdu) => pdu.sequence_id,
            Frame::DeliverResp(pdu) => pdu.sequence_id,
            Frame::ActiveTest(pdu) => pdu.sequence_id,
            Frame::ActiveTestResp(pdu) => pdu.sequence_id,
            Frame::Unknown { header, .. } => header.sequence_id,
        }
    }
}

static REGISTRY: LazyLock<PduRegistry<Header, Frame>> = LazyLock::new(|| {
    let mut registry = PduRegistry::new();
    registry.register_pdu::<Connect, _>(Frame::Connect);
    registry.register_pdu::<ConnectResp, _>(Frame::ConnectResp);
    registry.register_pdu::<Terminate, _>(Frame::Terminate);
    registry.register_pdu::<TerminateResp, _>(Frame::TerminateResp);
    registry.register_pdu::<Submit, _>(|pdu| Frame::Submit(Box::new(pdu)));
    registry.register_pdu::<SubmitResp, _>(Frame::SubmitResp);
    registry.register_pdu::<Deliver, _>(|pdu| Frame::Deliver(Box::new(pdu)));
    registry.register_pdu::<DeliverResp, _>(Frame::DeliverResp);
    registry.register_pdu::<ActiveTest, _>(Frame::ActiveTest);
    registry.register_pdu::<ActiveTestResp, _>(Frame::ActiveTestResp);
    registry
});

/// Marker type binding CMPP to the framing layer
#[derive(Debug, Clone, Copy, Default)]
pub struct Cmpp;

impl Protocol for Cmpp {
    type Frame = Frame;

    const ISP: Isp = Isp::Cmpp;
    const HEADER_LEN: usize = Header::SIZE;

    fn is_known_command(command_id: u32) -> bool {
        CommandId::try_from(command_id).is_ok()
    }

    fn decode_frame(buf: &mut Cursor<&[u8]>, version: u8) -> Result<Frame, CodecError> {
        let header = Header::decode(buf)?;
        let command_id = u32::from(header.command_id);

        match REGISTRY.decode_pdu(command_id, header, buf, version) {
            Some(frame) => frame,
            None => {
                let body_len = header.total_length as usize - Header::SIZE;
                let body = codec::decode_bytes(buf, body_len)?;
                warn!("Unhandled CMPP command_id: {command_id:#x}, treating as opaque data");
                Ok(Frame::Unknown { header, body })
            }
        }
    }

    fn encode_frame(frame: &Frame) -> Bytes {
        match frame {
            Frame::Connect(pdu) => pdu.to_bytes(),
            Frame::ConnectResp(pdu) => pdu.to_bytes(),
            Frame::Terminate(pdu) => pdu.to_bytes(),
            Frame::TerminateResp(pdu) => pdu.to_bytes(),
            Frame::Submit(pdu) => pdu.to_bytes(),
            Frame::SubmitResp(pdu) => pdu.to_bytes(),
            Frame::Deliver(pdu) => pdu.to_bytes(),
            Frame::DeliverResp(pdu) => pdu.to_bytes(),
            Frame::ActiveTest(pdu) => pdu.to_bytes(),
            Frame::ActiveTestResp(pdu) => pdu.to_bytes(),
            Frame::Unknown { header, body } => {
                let mut buf = bytes::BytesMut::with_capacity(Header::SIZE + body.len());
                Header {
                    total_length: (Header::SIZE + body.len()) as u32,
                    ..*header
                }
                .encode(&mut buf);
                buf.extend_from_slice(body);
                buf.freeze()
            }
        }
    }

    fn command_of(frame: &Frame) -> u32 {
        frame.command_id().into()
    }

    fn sequence_of(frame: &Frame) -> String {
        frame.sequence_id().to_string()
    }
}
