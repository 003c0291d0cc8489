//! HTTP/2 frame layer: the 9-byte frame header and payload adjustments.

use crate::{HttpError, Result};

pub const FRAME_TYPE_DATA: u8 = 0x0;
pub const FRAME_TYPE_HEADERS: u8 = 0x1;
pub const FRAME_TYPE_PRIORITY: u8 = 0x2;
pub const FRAME_TYPE_RST_STREAM: u8 = 0x3;
pub const FRAME_TYPE_SETTINGS: u8 = 0x4;
pub const FRAME_TYPE_PUSH_PROMISE: u8 = 0x5;
pub const FRAME_TYPE_PING: u8 = 0x6;
pub const FRAME_TYPE_GOAWAY: u8 = 0x7;
pub const FRAME_TYPE_WINDOW_UPDATE: u8 = 0x8;
pub const FRAME_TYPE_CONTINUATION: u8 = 0x9;

pub const FLAG_END_STREAM: u8 = 0x1;
pub const FLAG_ACK: u8 = 0x1;
pub const FLAG_END_HEADERS: u8 = 0x4;
pub const FLAG_PADDED: u8 = 0x8;
pub const FLAG_PRIORITY: u8 = 0x20;

/// The fixed client connection preface.
pub const CONNECTION_PREFACE: &[u8; 24] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// SETTINGS parameter identifiers the session cares about.
pub const SETTINGS_INITIAL_WINDOW_SIZE: u16 = 0x4;
pub const SETTINGS_MAX_FRAME_SIZE: u16 = 0x5;

/// Decoded 9-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: usize,
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    /// Parses the fixed 9-byte header. The reserved bit of the stream id
    /// is masked off.
    pub fn parse(bytes: &[u8; 9]) -> Self {
        let length = ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | bytes[2] as usize;
        let stream_id = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) & 0x7fff_ffff;
        Self {
            length,
            frame_type: bytes[3],
            flags: bytes[4],
            stream_id,
        }
    }

    pub fn encode(&self) -> [u8; 9] {
        let mut out = [0u8; 9];
        out[0] = ((self.length >> 16) & 0xff) as u8;
        out[1] = ((self.length >> 8) & 0xff) as u8;
        out[2] = (self.length & 0xff) as u8;
        out[3] = self.frame_type;
        out[4] = self.flags;
        out[5..9].copy_from_slice(&(self.stream_id & 0x7fff_ffff).to_be_bytes());
        out
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// Strips the padding declaration and trailing pad bytes from a HEADERS or
/// DATA payload, and the 5-byte priority block from HEADERS.
pub fn strip_payload<'a>(header: &FrameHeader, payload: &'a [u8]) -> Result<&'a [u8]> {
    let mut body = payload;

    let pad_len = if header.has_flag(FLAG_PADDED) {
        if body.is_empty() {
            return Err(HttpError::Protocol("padded frame with no pad length".to_string()));
        }
        let pad = body[0] as usize;
        body = &body[1..];
        pad
    } else {
        0
    };

    if header.frame_type == FRAME_TYPE_HEADERS && header.has_flag(FLAG_PRIORITY) {
        if body.len() < 5 {
            return Err(HttpError::Protocol("truncated priority block".to_string()));
        }
        body = &body[5..];
    }

    if pad_len > body.len() {
        return Err(HttpError::Protocol("pad length exceeds payload".to_string()));
    }
    Ok(&body[..body.len() - pad_len])
}
