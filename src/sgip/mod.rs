// ABOUTME: China Unicom SGIP 1.2 wire dialect
// ABOUTME: 20-byte header with a node/time/counter sequence triple, clear-text bind, separate Report PDU

mod bind;
mod command_id;
mod deliver;
mod header;
mod report;
mod response;
pub mod status;
mod submit;

pub use bind::{Bind, LOGIN_SMG_TO_SP, LOGIN_SP_TO_SMG, Unbind, UnbindResp};
pub use command_id::CommandId;
pub use deliver::Deliver;
pub use header::SgipHeader;
pub use report::{Report, STATE_DELIVERED, STATE_FAILED, STATE_PENDING};
pub use response::{BindResp, DeliverResp, ReportResp, SubmitResp};
pub use status::Status;
pub use submit::{MAX_USERS, MORELATETO_MT_DEFAULT, Submit};

use crate::auth::Isp;
use crate::codec::{CodecError, Encodable, PduRegistry};
use crate::protocol::Protocol;
use crate::sequence::SequenceTriple;
use bytes::Bytes;
use std::io::Cursor;
use std::sync::LazyLock;

pub const V12: u8 = 0x12;

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Bind(Bind),
    BindResp(BindResp),
    Unbind(Unbind),
    UnbindResp(UnbindResp),
    Submit(Box<Submit>),
    SubmitResp(SubmitResp),
    Deliver(Box<Deliver>),
    DeliverResp(DeliverResp),
    Report(Report),
    ReportResp(ReportResp),
}

impl Frame {
    pub fn command_id(&self) -> CommandId {
        match self {
            Frame::Bind(_) => CommandId::Bind,
            Frame::BindResp(_) => CommandId::BindResp,
            Frame::Unbind(_) => CommandId::Unbind,
            Frame::UnbindResp(_) => CommandId::UnbindResp,
            Frame::Submit(_) => CommandId::Submit,
            Frame::SubmitResp(_) => CommandId::SubmitResp,
            Frame::Deliver(_) => CommandId::Deliver,
            Frame::DeliverResp(_) => CommandId::DeliverResp,
            Frame::Report(_) => CommandId::Report,
            Frame::ReportResp(_) => CommandId::ReportResp,
        }
    }

    pub fn sequence(&self) -> SequenceTriple {
        match self {
            Frame::Bind(pdu) => pdu.sequence,
            Frame::BindResp(pdu) => pdu.sequence,
            Frame::Unbind(pdu) => pdu.sequence,
            Frame::UnbindResp(pdu) => pdu.sequence,
            Frame::Submit(pdu) => pdu.sequence,
            Frame::SubmitResp(pdu) => pdu.sequence,
            Frame::Deliver(pdu) => pdu.sequence,
            Frame::DeliverResp(pdu) => pdu.sequence,
            Frame::Report(pdu) => pdu.sequence,
            Frame::ReportResp(pdu) => pdu.sequence,
        }
    }
}

static REGISTRY: LazyLock<PduRegistry<SgipHeader, Frame>> = LazyLock::new(|| {
    let mut registry = PduRegistry::new();
    registry.register_pdu::<Bind, _>(Frame::Bind);
    registry.register_pdu::<BindResp, _>(Frame::BindResp);
    registry.register_pdu::<Unbind, _>(Frame::Unbind);
    registry.register_pdu::<UnbindResp, _>(Frame::UnbindResp);
    registry.register_pdu::<Submit, _>(|pdu| Frame::Submit(Box::new(pdu)));
    registry.register_pdu::<SubmitResp, _>(Frame::SubmitResp);
    registry.register_pdu::<Deliver, _>(|pdu| Frame::Deliver(Box::new(pdu)));
    registry.register_pdu::<DeliverResp, _>(Frame::DeliverResp);
    registry.register_pdu::<Report, _>(Frame::Report);
    registry.register_pdu::<ReportResp, _>(Frame::ReportResp);
    registry
});

/// Marker type binding SGIP to the framing layer
#[derive(Debug, Clone, Copy, Default)]
pub struct Sgip;

impl Protocol for Sgip {
    type Frame = Frame;

    const ISP: Isp = Isp::Sgip;
    const HEADER_LEN: usize = SgipHeader::SIZE;

    fn is_known_command(command_id: u32) -> bool {
        CommandId::try_from(command_id).is_ok()
    }

    fn decode_frame(buf: &mut Cursor<&[u8]>, version: u8) -> Result<Frame, CodecError> {
        let header = SgipHeader::decode(buf)?;
        let command_id = u32::from(header.command_id);
        REGISTRY
            .decode_pdu(command_id, header, buf, version)
            .unwrap_or(Err(CodecError::InvalidCommandId(command_id)))
    }

    fn encode_frame(frame: &Frame) -> Bytes {
        match frame {
            Frame::Bind(pdu) => pdu.to_bytes(),
            Frame::BindResp(pdu) => pdu.to_bytes(),
            Frame::Unbind(pdu) => pdu.to_bytes(),
            Frame::UnbindResp(pdu) => pdu.to_bytes(),
            Frame::Submit(pdu) => pdu.to_bytes(),
            Frame::SubmitResp(pdu) => pdu.to_bytes(),
            Frame::Deliver(pdu) => pdu.to_bytes(),
            Frame::DeliverResp(pdu) => pdu.to_bytes(),
            Frame::Report(pdu) => pdu.to_bytes(),
            Frame::ReportResp(pdu) => pdu.to_bytes(),
        }
    }

    fn command_of(frame: &Frame) -> u32 {
        frame.command_id().into()
    }

    fn sequence_of(frame: &Frame) -> String {
        frame.sequence().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::TripleSequence;
    use bytes::BufMut;

    #[test]
    fn check_uses_twenty_byte_minimum() {
        let mut short = bytes::BytesMut::new();
        short.put_u32(12);
        short.put_u32(CommandId::Unbind.into());
        short.put_bytes(0, 12);
        assert!(matches!(
            Sgip::check(&short),
            Err(CodecError::InvalidPduLength { min: 20, .. })
        ));
    }

    #[test]
    fn frames_parse_through_registry() {
        let seq = TripleSequence::new(3053112345);
        let unbind = Unbind::new(seq.next_val());
        let bytes = unbind.to_bytes();

        assert_eq!(Sgip::check(&bytes).unwrap(), Some(20));
        let frame = Sgip::parse(&bytes, V12).unwrap();
        assert_eq!(frame, Frame::Unbind(unbind.clone()));
        assert_eq!(Sgip::sequence_of(&frame), unbind.sequence.to_string());
        assert!(!Sgip::is_response(&frame));
    }
}
