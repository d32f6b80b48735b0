// ABOUTME: This module provides macros to reduce boilerplate in gateway PDU implementations
// ABOUTME: Covers the header-only PDUs (heartbeats, terminate/exit/unbind and their responses)

/// Implements `Encodable`/`Decodable` for a PDU that is nothing but a header.
///
/// Two shapes are supported:
/// * `impl_header_only_pdu!(Pdu, CommandIdType, CommandIdType::Variant)` for
///   the 12-byte CMPP/SMGP header; the struct needs a `sequence_id: u32` field.
/// * `impl_header_only_pdu!(sgip Pdu, CommandId::Variant)` for the 20-byte
///   SGIP header; the struct needs a `sequence: SequenceTriple` field.
///
/// Any trailing body bytes are left unread so the framing layer reports
/// them as a length mismatch.
macro_rules! impl_header_only_pdu {
    ($pdu:ident, $cmd_ty:ty, $command:expr) => {
        impl $pdu {
            pub const LEN: u32 = $crate::codec::PduHeader::<$cmd_ty>::SIZE as u32;

            pub fn new(sequence_id: u32) -> Self {
                $pdu { sequence_id }
            }
        }

        impl $crate::codec::Decodable for $pdu {
            type Header = $crate::codec::PduHeader<$cmd_ty>;

            fn command_id() -> u32 {
                u32::from($command)
            }

            fn decode(
                header: Self::Header,
                _buf: &mut std::io::Cursor<&[u8]>,
                _version: u8,
            ) -> Result<Self, $crate::codec::CodecError> {
                $crate::codec::expect_command(Self::command_id(), header.command_id.into())?;
                Ok($pdu {
                    sequence_id: header.sequence_id,
                })
            }
        }

        impl $crate::codec::Encodable for $pdu {
            fn encode(&self, buf: &mut bytes::BytesMut) {
                $crate::codec::PduHeader {
                    total_length: Self::LEN,
                    command_id: $command,
                    sequence_id: self.sequence_id,
                }
                .encode(buf);
            }

            fn encoded_size(&self) -> usize {
                Self::LEN as usize
            }
        }
    };
    (sgip $pdu:ident, $command:expr) => {
        impl $pdu {
            pub const LEN: u32 = $crate::sgip::SgipHeader::SIZE as u32;

            pub fn new(sequence: $crate::sequence::SequenceTriple) -> Self {
                $pdu { sequence }
            }
        }

        impl $crate::codec::Decodable for $pdu {
            type Header = $crate::sgip::SgipHeader;

            fn command_id() -> u32 {
                u32::from($command)
            }

            fn decode(
                header: Self::Header,
                _buf: &mut std::io::Cursor<&[u8]>,
                _version: u8,
            ) -> Result<Self, $crate::codec::CodecError> {
                $crate::codec::expect_command(Self::command_id(), header.command_id.into())?;
                Ok($pdu {
                    sequence: header.sequence,
                })
            }
        }

        impl $crate::codec::Encodable for $pdu {
            fn encode(&self, buf: &mut bytes::BytesMut) {
                $crate::sgip::SgipHeader {
                    total_length: Self::LEN,
                    command_id: $command,
                    sequence: self.sequence,
                }
                .encode(buf);
            }

            fn encoded_size(&self) -> usize {
                Self::LEN as usize
            }
        }
    };
}
