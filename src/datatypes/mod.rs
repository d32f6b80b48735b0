// ABOUTME: Field-level types shared by the three gateway dialects
// ABOUTME: Message text codings, protocol timestamps, SMGP TLVs and per-message submit options

mod mt_options;
mod text;
pub mod timestamp;
mod tlv;

pub use mt_options::{MtOptions, ResolvedMt};
pub use tlv::{Tlv, TlvList};
pub use text::{
    ASCII_SEGMENT_CAP, MO_WIDE_CHARS, MOCK_MO_PHONE, MsgFormat, UDH_LEN, WIDE_SEGMENT_CAP, decode_text, encode_segments,
    encode_text, encode_truncated, split_udhi, strip_udh,
};
