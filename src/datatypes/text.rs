// ABOUTME: Message text encodings (ASCII, UCS-2, GBK) and TP-UDHI long-message segmentation
// ABOUTME: Picks the narrowest coding for a text and splits oversize payloads into concatenated parts

use crate::codec::CodecError;
use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Per-segment payload cap for 7-bit/ASCII text
pub const ASCII_SEGMENT_CAP: usize = 160;
/// Per-segment payload cap for double-byte text
pub const WIDE_SEGMENT_CAP: usize = 140;
/// Size of the concatenation user-data header
pub const UDH_LEN: usize = 6;
/// Calling number used for simulated mobile-originated traffic
pub const MOCK_MO_PHONE: &str = "10011110000";
/// Mobile-originated text keeps at most this many double-byte characters
pub const MO_WIDE_CHARS: usize = 70;

/// `msg_fmt` / `message_coding` / `msg_format` field values
#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MsgFormat {
    Ascii = 0,
    Binary = 4,
    Ucs2 = 8,
    Gbk = 15,
}

impl MsgFormat {
    /// ASCII when every character fits in one byte, `wide` otherwise.
    pub fn detect(content: &str, wide: MsgFormat) -> MsgFormat {
        if content.is_ascii() {
            MsgFormat::Ascii
        } else {
            wide
        }
    }

    pub fn segment_cap(self) -> usize {
        match self {
            MsgFormat::Ascii => ASCII_SEGMENT_CAP,
            _ => WIDE_SEGMENT_CAP,
        }
    }
}

/// Encode `content` in the requested coding.
pub fn encode_text(content: &str, format: MsgFormat) -> Result<Bytes, CodecError> {
    match format {
        MsgFormat::Ascii | MsgFormat::Binary => Ok(Bytes::copy_from_slice(content.as_bytes())),
        MsgFormat::Ucs2 => {
            let mut buf = BytesMut::with_capacity(content.len() * 2);
            for unit in content.encode_utf16() {
                buf.put_u16(unit);
            }
            Ok(buf.freeze())
        }
        MsgFormat::Gbk => {
            let (encoded, _, had_errors) = encoding_rs::GBK.encode(content);
            if had_errors {
                return Err(CodecError::FieldValidation {
                    field: "msg_content",
                    reason: "text has characters outside GBK".to_string(),
                });
            }
            Ok(Bytes::copy_from_slice(&encoded))
        }
    }
}

/// Decode wire bytes given the raw coding byte. Unknown codings fall back to
/// lossy UTF-8.
pub fn decode_text(raw: &[u8], coding: u8) -> String {
    match MsgFormat::try_from(coding) {
        Ok(MsgFormat::Ucs2) => {
            let units: Vec<u16> = raw
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        Ok(MsgFormat::Gbk) => {
            let (decoded, _) = encoding_rs::GBK.decode_without_bom_handling(raw);
            decoded.into_owned()
        }
        _ => String::from_utf8_lossy(raw).into_owned(),
    }
}

/// Strip a concatenation header (`05 00 03 ..`) if present.
pub fn strip_udh(raw: &[u8]) -> &[u8] {
    if raw.len() >= UDH_LEN && raw[..3] == [0x05, 0x00, 0x03] {
        &raw[UDH_LEN..]
    } else {
        raw
    }
}

/// Split `content` into TP-UDHI segments no longer than `cap` bytes each.
///
/// Content that fits in one segment is returned untouched. Otherwise every
/// part is prefixed with `05 00 03 <group> <total> <index>` (index from 1)
/// and the group id is drawn at random per message.
pub fn split_udhi(content: &[u8], cap: usize) -> Result<Vec<Bytes>, CodecError> {
    if content.len() <= cap {
        return Ok(vec![Bytes::copy_from_slice(content)]);
    }

    let body_len = cap.saturating_sub(UDH_LEN);
    if body_len == 0 {
        return Err(CodecError::FieldValidation {
            field: "msg_content",
            reason: format!("segment cap {cap} leaves no room for payload"),
        });
    }

    let total = content.len().div_ceil(body_len);
    if total > u8::MAX as usize {
        return Err(CodecError::FieldValidation {
            field: "msg_content",
            reason: format!("{total} segments exceed the concatenation limit"),
        });
    }

    let group: u8 = rand::random();
    let segments = content
        .chunks(body_len)
        .enumerate()
        .map(|(index, chunk)| {
            let mut part = BytesMut::with_capacity(UDH_LEN + chunk.len());
            part.put_slice(&[0x05, 0x00, 0x03, group, total as u8, index as u8 + 1]);
            part.put_slice(chunk);
            part.freeze()
        })
        .collect();
    Ok(segments)
}

/// Encode and, if needed, segment `content` for a mobile-terminated submit.
pub fn encode_segments(content: &str, format: MsgFormat) -> Result<Vec<Bytes>, CodecError> {
    let encoded = encode_text(content, format)?;
    split_udhi(&encoded, format.segment_cap())
}

/// Encode mobile-originated text, truncating instead of segmenting.
/// Double-byte text keeps at most `wide_chars` characters; ASCII keeps at
/// most one segment's worth of bytes.
pub fn encode_truncated(content: &str, format: MsgFormat, wide_chars: usize) -> Result<Bytes, CodecError> {
    match format {
        MsgFormat::Ascii | MsgFormat::Binary => {
            let bytes = content.as_bytes();
            let len = bytes.len().min(ASCII_SEGMENT_CAP);
            Ok(Bytes::copy_from_slice(&bytes[..len]))
        }
        _ => {
            let clipped: String = content.chars().take(wide_chars).collect();
            let encoded = encode_text(&clipped, format)?;
            let len = encoded.len().min(WIDE_SEGMENT_CAP);
            Ok(encoded.slice(..len))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_narrowest_format() {
        assert_eq!(MsgFormat::detect("hello", MsgFormat::Ucs2), MsgFormat::Ascii);
        assert_eq!(MsgFormat::detect("你好", MsgFormat::Ucs2), MsgFormat::Ucs2);
        assert_eq!(MsgFormat::detect("你好", MsgFormat::Gbk), MsgFormat::Gbk);
    }

    #[test]
    fn ucs2_and_gbk_decode_back() {
        let text = "验证码 1234";
        let ucs2 = encode_text(text, MsgFormat::Ucs2).unwrap();
        assert_eq!(ucs2.len(), text.chars().count() * 2);
        assert_eq!(decode_text(&ucs2, 8), text);

        let gbk = encode_text(text, MsgFormat::Gbk).unwrap();
        assert_eq!(decode_text(&gbk, 15), text);
    }

    #[test]
    fn short_content_is_one_segment_without_header() {
        let parts = split_udhi(&[b'a'; 160], 160).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].len(), 160);
    }

    #[test]
    fn long_content_splits_under_cap_and_reassembles() {
        let content: Vec<u8> = (0..700u32).map(|i| (i % 251) as u8).collect();
        let parts = split_udhi(&content, 140).unwrap();
        assert_eq!(parts.len(), 6);

        let group = parts[0][3];
        let mut joined = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            assert!(part.len() <= 140);
            assert_eq!(&part[..3], &[0x05, 0x00, 0x03]);
            assert_eq!(part[3], group);
            assert_eq!(part[4] as usize, parts.len());
            assert_eq!(part[5] as usize, i + 1);
            joined.extend_from_slice(strip_udh(part));
        }
        assert_eq!(joined, content);
    }

    #[test]
    fn mobile_originated_text_is_truncated() {
        let long: String = "字".repeat(100);
        let bytes = encode_truncated(&long, MsgFormat::Ucs2, 70).unwrap();
        assert_eq!(bytes.len(), 140);

        let ascii = encode_truncated(&"x".repeat(200), MsgFormat::Ascii, 70).unwrap();
        assert_eq!(ascii.len(), 160);
    }
}
