use crate::codec::{self, CodecError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

/// Optional parameter trailing an SMGP submit or deliver
#[derive(Clone, Debug, PartialEq)]
pub struct Tlv {
    pub tag: u16,

    /// Length of `value` in octets, not counting the tag and length words
    pub length: u16,

    pub value: Bytes,
}

impl Tlv {
    pub fn new(tag: u16, value: impl Into<Bytes>) -> Self {
        let value = value.into();
        Tlv {
            tag,
            length: value.len() as u16,
            value,
        }
    }

    pub fn encoded_size(&self) -> usize {
        4 + self.value.len()
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.tag);
        buf.put_u16(self.length);
        buf.put_slice(&self.value);
    }

    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let tag = codec::decode_u16(buf)?;
        let length = codec::decode_u16(buf)?;
        let value = codec::decode_bytes(buf, length as usize)?;
        Ok(Tlv { tag, length, value })
    }
}

/// Ordered TLV list; lookups return the first match.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TlvList(Vec<Tlv>);

impl TlvList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tlv: Tlv) {
        self.0.push(tlv);
    }

    pub fn add_u8(&mut self, tag: u16, value: u8) {
        self.push(Tlv::new(tag, vec![value]));
    }

    pub fn add_str(&mut self, tag: u16, value: &str) {
        self.push(Tlv::new(tag, Bytes::copy_from_slice(value.as_bytes())));
    }

    pub fn get(&self, tag: u16) -> Option<&Tlv> {
        self.0.iter().find(|tlv| tlv.tag == tag)
    }

    pub fn get_u8(&self, tag: u16) -> Option<u8> {
        self.get(tag).and_then(|tlv| tlv.value.first().copied())
    }

    pub fn get_str(&self, tag: u16) -> Option<String> {
        self.get(tag)
            .map(|tlv| String::from_utf8_lossy(&tlv.value).trim_end_matches('\0').to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tlv> {
        self.0.iter()
    }

    pub fn encoded_size(&self) -> usize {
        self.0.iter().map(Tlv::encoded_size).sum()
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        for tlv in &self.0 {
            tlv.encode(buf);
        }
    }

    /// Read TLVs until the cursor is exhausted. A truncated trailing TLV is
    /// an error.
    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut list = TlvList::new();
        while buf.has_remaining() {
            list.push(Tlv::decode(buf)?);
        }
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_reads_until_exhausted() {
        let mut list = TlvList::new();
        list.add_u8(0x0009, 3);
        list.add_str(0x0003, "LINK");
        assert_eq!(list.encoded_size(), 5 + 8);

        let mut buf = BytesMut::new();
        list.encode(&mut buf);
        let mut cursor = Cursor::new(buf.as_ref());
        let decoded = TlvList::decode(&mut cursor).unwrap();
        assert_eq!(decoded.get_u8(0x0009), Some(3));
        assert_eq!(decoded.get_str(0x0003).as_deref(), Some("LINK"));
        assert_eq!(decoded.get(0x0001), None);
    }

    #[test]
    fn truncated_value_is_incomplete() {
        let data = [0x00, 0x01, 0x00, 0x04, 0xAA];
        let mut cursor = Cursor::new(&data[..]);
        assert!(matches!(TlvList::decode(&mut cursor), Err(CodecError::Incomplete)));
    }
}
