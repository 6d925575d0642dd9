//! Wire framing for minefield messages.
//!
//! Every message on the wire is a frame:
//!
//! ```text
//! ┌──────────────┬──────┬───────────┐
//! │ type         │ u8   │  1 byte   │
//! ├──────────────┼──────┼───────────┤
//! │ flags        │ u8   │  1 byte   │
//! ├──────────────┼──────┼───────────┤
//! │ payload_len  │ u32  │  4 bytes  │
//! ├──────────────┼──────┼───────────┤
//! │ payload      │ [u8] │  N bytes  │
//! └──────────────┴──────┴───────────┘
//! ```
//!
//! All integers are big-endian. When the `HAS_ID` flag is set the payload
//! begins with a 4-byte correlation id; the id is part of `payload_len`.
//! Correlation ids only appear on the matchmaker↔launcher leg, where they
//! pair a forwarded request with its response.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CodecError, CodecResult, ProtocolError};

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = 6;

/// Upper bound on a frame payload. Protects the read loop against
/// unbounded allocation from a malformed or hostile length field; full
/// board snapshots are the largest expected payloads and stay far below
/// this.
pub const MAX_FRAME_PAYLOAD: u32 = 16 * 1024 * 1024;

bitflags! {
    /// Frame flags (header byte 1).
    ///
    /// - bit 0: `HAS_ID` - payload is prefixed by a 4-byte correlation id
    /// - bits 1-7: reserved
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FrameFlags: u8 {
        /// Payload carries a leading correlation id
        const HAS_ID = 0b0000_0001;
    }
}

/// Closed catalog of wire message types.
///
/// `0x01..` is the gameplay plane, `0xA0..` the service plane between
/// matchmaker and launchers, `0xC0..` the auth plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Move = 0x01,
    Text = 0x02,
    Board = 0x03,
    StartGame = 0x04,
    CellUpdate = 0x05,
    GameEnd = 0x07,
    GamemodeInfo = 0x08,

    SpawnServerRequest = 0xA0,
    SendGameServers = 0xA1,
    GetGameServers = 0xA2,
    ServerSpawned = 0xA3,

    RegisterPlayerRequest = 0xC0,
    RegisterPlayerResponse = 0xC1,
    AuthRequest = 0xC2,
    AuthResponse = 0xC3,
    ConnectToGameRequest = 0xC4,
    ConnectToGameResponse = 0xC5,
    AuthWithToken = 0xC6,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MessageType::Move),
            0x02 => Ok(MessageType::Text),
            0x03 => Ok(MessageType::Board),
            0x04 => Ok(MessageType::StartGame),
            0x05 => Ok(MessageType::CellUpdate),
            0x07 => Ok(MessageType::GameEnd),
            0x08 => Ok(MessageType::GamemodeInfo),
            0xA0 => Ok(MessageType::SpawnServerRequest),
            0xA1 => Ok(MessageType::SendGameServers),
            0xA2 => Ok(MessageType::GetGameServers),
            0xA3 => Ok(MessageType::ServerSpawned),
            0xC0 => Ok(MessageType::RegisterPlayerRequest),
            0xC1 => Ok(MessageType::RegisterPlayerResponse),
            0xC2 => Ok(MessageType::AuthRequest),
            0xC3 => Ok(MessageType::AuthResponse),
            0xC4 => Ok(MessageType::ConnectToGameRequest),
            0xC5 => Ok(MessageType::ConnectToGameResponse),
            0xC6 => Ok(MessageType::AuthWithToken),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

/// Assembles a complete frame: header, optional correlation id, payload.
pub fn encode_frame(msg_type: MessageType, request_id: Option<u32>, payload: &[u8]) -> Bytes {
    let id_len = if request_id.is_some() { 4 } else { 0 };
    let mut buf = BytesMut::with_capacity(HEADER_LEN + id_len + payload.len());
    buf.put_u8(msg_type as u8);
    let flags = if request_id.is_some() {
        FrameFlags::HAS_ID
    } else {
        FrameFlags::empty()
    };
    buf.put_u8(flags.bits());
    buf.put_u32((payload.len() + id_len) as u32);
    if let Some(id) = request_id {
        buf.put_u32(id);
    }
    buf.put_slice(payload);
    buf.freeze()
}

/// Parsed view over a raw frame buffer.
///
/// `payload` is the logical payload: the correlation id, when present,
/// has already been consumed into `request_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub msg_type: MessageType,
    pub request_id: Option<u32>,
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Validates the header against `expected` and splits the buffer.
    ///
    /// Checks, in order: total length covers the header, the type byte
    /// matches, the length field equals the remaining buffer, and - when
    /// `HAS_ID` is set - the payload holds at least the 4 id bytes.
    pub fn parse(data: &'a [u8], expected: MessageType) -> CodecResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(CodecError::ShortBuffer {
                need: HEADER_LEN,
                have: data.len(),
            });
        }
        if data[0] != expected as u8 {
            return Err(CodecError::WrongType {
                expected: expected as u8,
                actual: data[0],
            });
        }
        let declared = u32::from_be_bytes([data[2], data[3], data[4], data[5]]) as usize;
        let actual = data.len() - HEADER_LEN;
        if declared != actual {
            return Err(CodecError::LengthMismatch {
                expected: declared,
                actual,
            });
        }
        let flags = FrameFlags::from_bits_truncate(data[1]);
        let mut payload = &data[HEADER_LEN..];
        let request_id = if flags.contains(FrameFlags::HAS_ID) {
            if payload.len() < 4 {
                return Err(CodecError::ShortBuffer {
                    need: 4,
                    have: payload.len(),
                });
            }
            Some(payload.get_u32())
        } else {
            None
        };
        Ok(Frame {
            msg_type: expected,
            request_id,
            payload,
        })
    }

    /// The correlation id, or `MissingId` for decoders that require one.
    pub fn require_id(&self) -> CodecResult<u32> {
        self.request_id.ok_or(CodecError::MissingId)
    }
}

/// Checks that `buf` still holds at least `need` bytes.
pub(crate) fn need(buf: &[u8], need: usize) -> CodecResult<()> {
    if buf.len() < need {
        return Err(CodecError::ShortBuffer {
            need,
            have: buf.len(),
        });
    }
    Ok(())
}

/// Writes an `i32`-length-prefixed UTF-8 string.
pub(crate) fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_i32(s.len() as i32);
    buf.put_slice(s.as_bytes());
}

/// Reads an `i32`-length-prefixed UTF-8 string, advancing the cursor.
pub(crate) fn get_string(cur: &mut &[u8]) -> CodecResult<String> {
    need(*cur, 4)?;
    let len = cur.get_i32();
    if len < 0 {
        return Err(CodecError::PayloadMalformed(format!(
            "negative string length {len}"
        )));
    }
    let len = len as usize;
    need(*cur, len)?;
    let raw = cur[..len].to_vec();
    cur.advance(len);
    String::from_utf8(raw)
        .map_err(|_| CodecError::PayloadMalformed("string is not valid UTF-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_roundtrip_without_id() {
        let frame = encode_frame(MessageType::Text, None, b"hello");
        let parsed = Frame::parse(&frame, MessageType::Text).unwrap();
        assert_eq!(parsed.request_id, None);
        assert_eq!(parsed.payload, b"hello");
    }

    #[test]
    fn frame_roundtrip_with_id() {
        let frame = encode_frame(MessageType::GetGameServers, Some(77), &[]);
        let parsed = Frame::parse(&frame, MessageType::GetGameServers).unwrap();
        assert_eq!(parsed.request_id, Some(77));
        assert!(parsed.payload.is_empty());
    }

    #[test]
    fn header_length_field_covers_frame_remainder() {
        // Bytes 2..6, read big-endian, must equal len(frame) - 6 for
        // every encoded frame, id or not.
        for id in [None, Some(0xDEAD_BEEF)] {
            let frame = encode_frame(MessageType::SpawnServerRequest, id, b"lobby one");
            let declared =
                u32::from_be_bytes([frame[2], frame[3], frame[4], frame[5]]) as usize;
            assert_eq!(declared, frame.len() - HEADER_LEN);
        }
    }

    #[test]
    fn parse_rejects_short_buffer() {
        let err = Frame::parse(&[0x02, 0x00, 0x00], MessageType::Text).unwrap_err();
        assert!(matches!(err, CodecError::ShortBuffer { .. }));
    }

    #[test]
    fn parse_rejects_wrong_type() {
        let frame = encode_frame(MessageType::Text, None, b"hi");
        let err = Frame::parse(&frame, MessageType::Move).unwrap_err();
        assert_eq!(
            err,
            CodecError::WrongType {
                expected: 0x01,
                actual: 0x02
            }
        );
    }

    #[test]
    fn parse_rejects_length_mismatch() {
        let mut frame = encode_frame(MessageType::Text, None, b"hi").to_vec();
        frame[5] = 9;
        let err = Frame::parse(&frame, MessageType::Text).unwrap_err();
        assert!(matches!(err, CodecError::LengthMismatch { .. }));
    }

    #[test]
    fn parse_rejects_truncated_id() {
        // HAS_ID set but only two payload bytes.
        let frame = vec![0xA2, 0x01, 0x00, 0x00, 0x00, 0x02, 0xAB, 0xCD];
        let err = Frame::parse(&frame, MessageType::GetGameServers).unwrap_err();
        assert!(matches!(err, CodecError::ShortBuffer { .. }));
    }

    #[test]
    fn require_id_reports_missing() {
        let frame = encode_frame(MessageType::GetGameServers, None, &[]);
        let parsed = Frame::parse(&frame, MessageType::GetGameServers).unwrap();
        assert_eq!(parsed.require_id().unwrap_err(), CodecError::MissingId);
    }

    #[test]
    fn unknown_type_byte_is_rejected() {
        assert!(MessageType::try_from(0x6F).is_err());
        assert_eq!(
            MessageType::try_from(0xC6).unwrap(),
            MessageType::AuthWithToken
        );
    }

    #[test]
    fn string_roundtrip() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "minefield");
        let mut cur: &[u8] = &buf;
        assert_eq!(get_string(&mut cur).unwrap(), "minefield");
        assert!(cur.is_empty());
    }

    #[test]
    fn string_rejects_truncation() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "minefield");
        let mut cur: &[u8] = &buf[..6];
        assert!(matches!(
            get_string(&mut cur),
            Err(CodecError::ShortBuffer { .. })
        ));
    }
}
