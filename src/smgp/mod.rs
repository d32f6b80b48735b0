// ABOUTME: China Telecom SMGP 1.3/2.0/3.0 wire dialect
// ABOUTME: 12-byte header, BCD message ids, TLV trailers and text-form status reports

mod command_id;
mod deliver;
mod link;
mod login;
pub mod status;
mod submit;

pub use command_id::CommandId;
pub use deliver::{Deliver, DeliverContent, DeliverResp, Report, stat_for_error};
pub use link::{ActiveTest, ActiveTestResp, Exit, ExitResp};
pub use login::{LOGIN_MODE_TRANSMIT, Login, LoginResp};
pub use status::Status;
pub use submit::{MAX_DEST_TERMINALS, MSG_TYPE_MT, Submit, SubmitResp};

use crate::auth::Isp;
use crate::codec::{CodecError, Encodable, PduHeader, PduRegistry};
use crate::protocol::Protocol;
use bytes::Bytes;
use std::io::Cursor;
use std::sync::LazyLock;

pub const V30: u8 = 0x30;
pub const V20: u8 = 0x20;
pub const V13: u8 = 0x13;

pub type Header = PduHeader<CommandId>;

pub fn major_match(a: u8, b: u8) -> bool {
    a & 0xF0 == b & 0xF0
}

/// Optional parameter tags
pub mod tag {
    pub const TP_PID: u16 = 0x0001;
    pub const TP_UDHI: u16 = 0x0002;
    pub const LINK_ID: u16 = 0x0003;
    pub const CHARGE_USER_TYPE: u16 = 0x0004;
    pub const CHARGE_TERM_TYPE: u16 = 0x0005;
    pub const CHARGE_TERM_PSEUDO: u16 = 0x0006;
    pub const DEST_TERM_TYPE: u16 = 0x0007;
    pub const DEST_TERM_PSEUDO: u16 = 0x0008;
    pub const PK_TOTAL: u16 = 0x0009;
    pub const PK_NUMBER: u16 = 0x000A;
    pub const SUBMIT_MSG_TYPE: u16 = 0x000B;
    pub const SP_DEAL_RESULT: u16 = 0x000C;
    pub const SRC_TERM_TYPE: u16 = 0x000D;
    pub const SRC_TERM_PSEUDO: u16 = 0x000E;
    pub const NODES_COUNT: u16 = 0x000F;
    pub const MSG_SRC: u16 = 0x0010;
    pub const SRC_TYPE: u16 = 0x0011;
    pub const M_SERVICE_ID: u16 = 0x0012;
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Login(Login),
    LoginResp(LoginResp),
    Submit(Box<Submit>),
    SubmitResp(SubmitResp),
    Deliver(Box<Deliver>),
    DeliverResp(DeliverResp),
    ActiveTest(ActiveTest),
    ActiveTestResp(ActiveTestResp),
    Exit(Exit),
    ExitResp(ExitResp),
}

impl Frame {
    pub fn command_id(&self) -> CommandId {
        match self {
            Frame::Login(_) => CommandId::Login,
            Frame::LoginResp(_) => CommandId::LoginResp,
            Frame::Submit(_) => CommandId::Submit,
            Frame::SubmitResp(_) => CommandId::SubmitResp,
            Frame::Deliver(_) => CommandId::Deliver,
            Frame::DeliverResp(_) => CommandId::DeliverResp,
            Frame::ActiveTest(_) => CommandId::ActiveTest,
            Frame::ActiveTestResp(_) => CommandId::ActiveTestResp,
            Frame::Exit(_) => CommandId::Exit,
            Frame::ExitResp(_) => CommandId::ExitResp,
        }
    }

    pub fn sequence_id(&self) -> u32 {
        match self {
            Frame::Login(pdu) => pdu.sequence_id,
            Frame::LoginResp(pdu) => pdu.sequence_id,
            Frame::Submit(pdu) => pdu.sequence_id,
            Frame::SubmitResp(pdu) => pdu.sequence_id,
            Frame::Deliver(pdu) => pdu.sequence_id,
            Frame::DeliverResp(pdu) => pdu.sequence_id,
            Frame::ActiveTest(pdu) => pdu.sequence_id,
            Frame::ActiveTestResp(pdu) => pdu.sequence_id,
            Frame::Exit(pdu) => pdu.sequence_id,
            Frame::ExitResp(pdu) => pdu.sequence_id,
        }
    }
}

static REGISTRY: LazyLock<PduRegistry<Header, Frame>> = LazyLock::new(|| {
    let mut registry = PduRegistry::new();
    registry.register_pdu::<Login, _>(Frame::Login);
    registry.register_pdu::<LoginResp, _>(Frame::LoginResp);
    registry.register_pdu::<Submit, _>(|pdu| Frame::Submit(Box::new(pdu)));
    registry.register_pdu::<SubmitResp, _>(Frame::SubmitResp);
    registry.register_pdu::<Deliver, _>(|pdu| Frame::Deliver(Box::new(pdu)));
    registry.register_pdu::<DeliverResp, _>(Frame::DeliverResp);
    registry.register_pdu::<ActiveTest, _>(Frame::ActiveTest);
    registry.register_pdu::<ActiveTestResp, _>(Frame::ActiveTestResp);
    registry.register_pdu::<Exit, _>(Frame::Exit);
    registry.register_pdu::<ExitResp, _>(Frame::ExitResp);
    registry
});

/// Marker type binding SMGP to the framing layer
#[derive(Debug, Clone, Copy, Default)]
pub struct Smgp;

impl Protocol for Smgp {
    type Frame = Frame;

    const ISP: Isp = Isp::Smgp;
    const HEADER_LEN: usize = Header::SIZE;

    fn is_known_command(command_id: u32) -> bool {
        CommandId::try_from(command_id).is_ok()
    }

    fn decode_frame(buf: &mut Cursor<&[u8]>, version: u8) -> Result<Frame, CodecError> {
        let header = Header::decode(buf)?;
        let command_id = u32::from(header.command_id);
        REGISTRY
            .decode_pdu(command_id, header, buf, version)
            .unwrap_or(Err(CodecError::InvalidCommandId(command_id)))
    }

    fn encode_frame(frame: &Frame) -> Bytes {
        match frame {
            Frame::Login(pdu) => pdu.to_bytes(),
            Frame::LoginResp(pdu) => pdu.to_bytes(),
            Frame::Submit(pdu) => pdu.to_bytes(),
            Frame::SubmitResp(pdu) => pdu.to_bytes(),
            Frame::Deliver(pdu) => pdu.to_bytes(),
            Frame::DeliverResp(pdu) => pdu.to_bytes(),
            Frame::ActiveTest(pdu) => pdu.to_bytes(),
            Frame::ActiveTestResp(pdu) => pdu.to_bytes(),
            Frame::Exit(pdu) => pdu.to_bytes(),
            Frame::ExitResp(pdu) => pdu.to_bytes(),
        }
    }

    fn command_of(frame: &Frame) -> u32 {
        frame.command_id().into()
    }

    fn sequence_of(frame: &Frame) -> String {
        frame.sequence_id().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    #[test]
    fn unassigned_command_five_is_rejected() {
        let mut buf = bytes::BytesMut::new();
        buf.put_u32(12);
        buf.put_u32(5);
        buf.put_u32(1);
        assert!(matches!(Smgp::check(&buf), Err(CodecError::InvalidCommandId(5))));
    }

    #[test]
    fn exit_parses_and_answers() {
        let exit = Exit::new(17);
        let bytes = exit.to_bytes();
        assert_eq!(Smgp::check(&bytes).unwrap(), Some(12));

        let frame = Smgp::parse(&bytes, V30).unwrap();
        assert_eq!(frame, Frame::Exit(exit.clone()));
        let resp = Frame::ExitResp(exit.to_response());
        assert!(Smgp::is_response(&resp));
        assert_eq!(Smgp::sequence_of(&resp), "17");
    }

    #[test]
    fn version_majors() {
        assert!(major_match(V30, 0x31));
        assert!(!major_match(V30, V20));
        assert!(!major_match(V13, V20));
    }
}
