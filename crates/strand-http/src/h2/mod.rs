//! HTTP/2 codec (server side).
//!
//! A hand-rolled framed session. Interleaved frames are delivered into a
//! per-stream accumulation table keyed by stream id; a stream's entry
//! collects headers and payload fragments until its END_STREAM flag
//! arrives, at which point a complete [`HttpRequest`] is produced and the
//! entry is dropped. Header compression uses HPACK with the connection's
//! shared dynamic tables.
//!
//! The session owns both directions: reading requests also services
//! control frames (SETTINGS, PING, WINDOW_UPDATE), and writing a response
//! pumps incoming frames when the peer's flow-control window is exhausted.

use std::collections::{HashMap, VecDeque};

use bytes::{Bytes, BytesMut};
use hpack::{Decoder, Encoder};
use tracing::{debug, trace};

use crate::headers::Headers;
use crate::request::HttpRequest;
use crate::response::HttpResponse;
use crate::{HttpError, Result, Transport, Usage};

pub mod frame;

use frame::{
    strip_payload, FrameHeader, CONNECTION_PREFACE, FLAG_ACK, FLAG_END_HEADERS, FLAG_END_STREAM,
    FRAME_TYPE_CONTINUATION, FRAME_TYPE_DATA, FRAME_TYPE_GOAWAY, FRAME_TYPE_HEADERS,
    FRAME_TYPE_PING, FRAME_TYPE_PRIORITY, FRAME_TYPE_PUSH_PROMISE, FRAME_TYPE_RST_STREAM,
    FRAME_TYPE_SETTINGS, FRAME_TYPE_WINDOW_UPDATE, SETTINGS_INITIAL_WINDOW_SIZE,
    SETTINGS_MAX_FRAME_SIZE,
};

/// Maximum number of headers accepted on one stream.
pub const MAX_STREAM_HEADERS: usize = 100;

const DEFAULT_MAX_FRAME_SIZE: usize = 16_384;
const DEFAULT_WINDOW: i64 = 65_535;

/// Per-stream request accumulation state.
///
/// Exists from the first HEADERS frame for a stream id until the stream's
/// terminal transition, when it is consumed to build the request.
struct StreamAccum {
    headers: Headers,
    method: Option<String>,
    path: Option<String>,
    content_length: Option<usize>,
    payload: BytesMut,
    header_count: usize,
}

impl StreamAccum {
    fn new() -> Self {
        Self {
            headers: Headers::new(),
            method: None,
            path: None,
            content_length: None,
            payload: BytesMut::new(),
            header_count: 0,
        }
    }
}

/// Header block spanning HEADERS and CONTINUATION frames.
struct HeaderBlock {
    stream_id: u32,
    end_stream: bool,
    block: BytesMut,
}

/// One server-side HTTP/2 session per connection.
pub struct Http2Session<T: Transport> {
    usage: Usage,
    transport: T,
    decoder: Decoder<'static>,
    encoder: Encoder<'static>,
    streams: HashMap<u32, StreamAccum>,
    ready: VecDeque<HttpRequest>,
    // Flow-control state for response DATA frames.
    send_window: i64,
    stream_windows: HashMap<u32, i64>,
    initial_window: i64,
    peer_max_frame: usize,
    // Set while a header block awaits its CONTINUATION frames.
    pending_block: Option<HeaderBlock>,
}

impl<T: Transport> Http2Session<T> {
    /// Performs the server side of session establishment: validates the
    /// 24-byte client preface and sends the server SETTINGS frame. The
    /// client's SETTINGS frame is handled by the normal frame loop.
    pub fn accept(usage: Usage, mut transport: T) -> Result<Self> {
        let mut preface = [0u8; 24];
        transport.read_exact(&mut preface)?;
        if &preface != CONNECTION_PREFACE {
            return Err(HttpError::Protocol("bad connection preface".to_string()));
        }

        let mut session = Self {
            usage,
            transport,
            decoder: Decoder::new(),
            encoder: Encoder::new(),
            streams: HashMap::new(),
            ready: VecDeque::new(),
            send_window: DEFAULT_WINDOW,
            stream_windows: HashMap::new(),
            initial_window: DEFAULT_WINDOW,
            peer_max_frame: DEFAULT_MAX_FRAME_SIZE,
            pending_block: None,
        };
        session.send_frame(FRAME_TYPE_SETTINGS, 0, 0, &[])?;
        Ok(session)
    }

    /// Returns the next complete request, servicing frames until one is
    /// ready.
    pub fn read_request(&mut self) -> Result<HttpRequest> {
        loop {
            if let Some(request) = self.ready.pop_front() {
                return Ok(request);
            }
            self.pump_frame()?;
        }
    }

    /// Reads and dispatches exactly one frame.
    fn pump_frame(&mut self) -> Result<()> {
        let mut head = [0u8; 9];
        self.transport.read_exact(&mut head)?;
        let header = FrameHeader::parse(&head);

        if header.length > DEFAULT_MAX_FRAME_SIZE {
            return Err(HttpError::Protocol(format!(
                "frame of {} bytes exceeds the advertised maximum",
                header.length
            )));
        }
        let mut payload = vec![0u8; header.length];
        self.transport.read_exact(&mut payload)?;

        trace!(
            frame_type = header.frame_type,
            stream = header.stream_id,
            len = header.length,
            "frame received"
        );

        if let Some(pending) = &self.pending_block {
            if header.frame_type != FRAME_TYPE_CONTINUATION
                || header.stream_id != pending.stream_id
            {
                return Err(HttpError::Protocol(
                    "expected CONTINUATION for the open header block".to_string(),
                ));
            }
        }

        match header.frame_type {
            FRAME_TYPE_HEADERS => self.on_headers(&header, &payload),
            FRAME_TYPE_CONTINUATION => self.on_continuation(&header, &payload),
            FRAME_TYPE_DATA => self.on_data(&header, &payload),
            FRAME_TYPE_SETTINGS => self.on_settings(&header, &payload),
            FRAME_TYPE_PING => self.on_ping(&header, &payload),
            FRAME_TYPE_WINDOW_UPDATE => self.on_window_update(&header, &payload),
            FRAME_TYPE_RST_STREAM => {
                debug!(stream = header.stream_id, "stream reset by peer");
                self.streams.remove(&header.stream_id);
                self.stream_windows.remove(&header.stream_id);
                Ok(())
            }
            FRAME_TYPE_GOAWAY => Err(HttpError::Eof),
            FRAME_TYPE_PUSH_PROMISE => Err(HttpError::Protocol(
                "PUSH_PROMISE from a client".to_string(),
            )),
            // PRIORITY and extension frame types carry nothing we need.
            FRAME_TYPE_PRIORITY => Ok(()),
            _ => Ok(()),
        }
    }

    fn on_headers(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<()> {
        if header.stream_id == 0 {
            return Err(HttpError::Protocol("HEADERS on stream 0".to_string()));
        }
        let body = strip_payload(header, payload)?;
        let end_stream = header.has_flag(FLAG_END_STREAM);

        if header.has_flag(FLAG_END_HEADERS) {
            self.process_header_block(header.stream_id, body, end_stream)
        } else {
            self.pending_block = Some(HeaderBlock {
                stream_id: header.stream_id,
                end_stream,
                block: BytesMut::from(body),
            });
            Ok(())
        }
    }

    fn on_continuation(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<()> {
        let mut pending = self
            .pending_block
            .take()
            .ok_or_else(|| HttpError::Protocol("CONTINUATION without HEADERS".to_string()))?;
        pending.block.extend_from_slice(payload);

        if header.has_flag(FLAG_END_HEADERS) {
            let block = pending.block.freeze();
            self.process_header_block(pending.stream_id, &block, pending.end_stream)
        } else {
            self.pending_block = Some(pending);
            Ok(())
        }
    }

    /// Decodes a complete header block and delivers each header into the
    /// stream's accumulation entry, allocating it on first sight.
    fn process_header_block(
        &mut self,
        stream_id: u32,
        block: &[u8],
        end_stream: bool,
    ) -> Result<()> {
        let decoded = self
            .decoder
            .decode(block)
            .map_err(|e| HttpError::Protocol(format!("HPACK decode failed: {e:?}")))?;

        self.streams.entry(stream_id).or_insert_with(StreamAccum::new);
        self.stream_windows
            .entry(stream_id)
            .or_insert(self.initial_window);

        for (name, value) in decoded {
            self.deliver_header(stream_id, &name, &value)?;
        }

        if end_stream {
            self.complete_stream(stream_id)?;
        }
        Ok(())
    }

    /// Delivers one decoded header to a stream, tracking the pseudo-headers
    /// and the declared content length, and enforcing per-stream limits.
    fn deliver_header(&mut self, stream_id: u32, name: &[u8], value: &[u8]) -> Result<()> {
        let accum = self
            .streams
            .get_mut(&stream_id)
            .ok_or_else(|| HttpError::Protocol("header for unknown stream".to_string()))?;

        accum.header_count += 1;
        if accum.header_count > MAX_STREAM_HEADERS {
            return Err(HttpError::TooManyHeaders);
        }

        let name = String::from_utf8_lossy(name).to_ascii_lowercase();
        let value = String::from_utf8_lossy(value).into_owned();

        match name.as_str() {
            ":method" => accum.method = Some(value),
            ":path" => accum.path = Some(value),
            ":scheme" | ":authority" => {}
            "content-length" => {
                let length = value.trim().parse::<usize>().map_err(|_| {
                    HttpError::BadFormat(format!("bad content-length: {value}"))
                })?;
                if length > self.usage.max_payload() {
                    return Err(HttpError::PayloadTooLarge);
                }
                accum.content_length = Some(length);
                accum.payload.reserve(length);
                accum.headers.set(&name, value);
            }
            _ => accum.headers.set(&name, value),
        }
        Ok(())
    }

    fn on_data(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<()> {
        let body = strip_payload(header, payload)?;
        let accum = self
            .streams
            .get_mut(&header.stream_id)
            .ok_or_else(|| HttpError::Protocol("DATA for unknown stream".to_string()))?;

        let declared = accum.content_length.unwrap_or(0);
        if accum.payload.len() + body.len() > declared {
            return Err(HttpError::DataOverrun);
        }
        accum.payload.extend_from_slice(body);

        // Hand the consumed bytes back so the client's windows stay open.
        if header.length > 0 {
            let increment = (header.length as u32).to_be_bytes();
            self.send_frame(FRAME_TYPE_WINDOW_UPDATE, 0, 0, &increment)?;
            self.send_frame(FRAME_TYPE_WINDOW_UPDATE, 0, header.stream_id, &increment)?;
        }

        if header.has_flag(FLAG_END_STREAM) {
            self.complete_stream(header.stream_id)?;
        }
        Ok(())
    }

    /// The stream's terminal transition: consumes the accumulation entry
    /// and produces the request.
    fn complete_stream(&mut self, stream_id: u32) -> Result<()> {
        let accum = self
            .streams
            .remove(&stream_id)
            .ok_or_else(|| HttpError::Protocol("completing unknown stream".to_string()))?;

        let method = accum
            .method
            .ok_or_else(|| HttpError::Protocol("stream completed without :method".to_string()))?;
        let path = accum
            .path
            .ok_or_else(|| HttpError::Protocol("stream completed without :path".to_string()))?;

        trace!(stream = stream_id, method = %method, path = %path, "HTTP/2 request complete");
        let request = HttpRequest::new(
            stream_id,
            method,
            &path,
            accum.headers,
            accum.payload.freeze(),
        )?;
        self.ready.push_back(request);
        Ok(())
    }

    fn on_settings(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<()> {
        if header.has_flag(FLAG_ACK) {
            return Ok(());
        }
        if payload.len() % 6 != 0 {
            return Err(HttpError::Protocol("bad SETTINGS length".to_string()));
        }
        for entry in payload.chunks_exact(6) {
            let id = u16::from_be_bytes([entry[0], entry[1]]);
            let value = u32::from_be_bytes([entry[2], entry[3], entry[4], entry[5]]);
            match id {
                SETTINGS_INITIAL_WINDOW_SIZE => {
                    let new = value as i64;
                    let delta = new - self.initial_window;
                    self.initial_window = new;
                    for window in self.stream_windows.values_mut() {
                        *window += delta;
                    }
                }
                SETTINGS_MAX_FRAME_SIZE => {
                    self.peer_max_frame = (value as usize).clamp(16_384, 16_777_215);
                }
                _ => {}
            }
        }
        self.send_frame(FRAME_TYPE_SETTINGS, FLAG_ACK, 0, &[])
    }

    fn on_ping(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<()> {
        if header.has_flag(FLAG_ACK) {
            return Ok(());
        }
        if payload.len() != 8 {
            return Err(HttpError::Protocol("bad PING length".to_string()));
        }
        self.send_frame(FRAME_TYPE_PING, FLAG_ACK, 0, payload)
    }

    fn on_window_update(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<()> {
        if payload.len() != 4 {
            return Err(HttpError::Protocol("bad WINDOW_UPDATE length".to_string()));
        }
        let increment =
            (u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7fff_ffff)
                as i64;
        if header.stream_id == 0 {
            self.send_window += increment;
        } else if let Some(window) = self.stream_windows.get_mut(&header.stream_id) {
            *window += increment;
        }
        Ok(())
    }

    /// Writes one response: an HPACK-encoded header block (`:status`
    /// first), split across HEADERS/CONTINUATION as needed, then the body
    /// in DATA frames gated by both flow-control windows.
    pub fn write_response(&mut self, response: &HttpResponse) -> Result<()> {
        let stream_id = response.stream_id();
        let body = response.body_bytes();
        let headers = response.wire_headers(self.usage, body.len());

        let mut fields: Vec<(Vec<u8>, Vec<u8>)> =
            vec![(b":status".to_vec(), response.status().code().to_string().into_bytes())];
        for (name, value) in headers.iter() {
            fields.push((name.as_bytes().to_vec(), value.as_bytes().to_vec()));
        }
        let block = self
            .encoder
            .encode(fields.iter().map(|(n, v)| (n.as_slice(), v.as_slice())));

        self.write_header_block(stream_id, &block, body.is_empty())?;
        if !body.is_empty() {
            self.write_body(stream_id, &body)?;
        }
        self.transport.flush()?;

        self.stream_windows.remove(&stream_id);
        Ok(())
    }

    fn write_header_block(&mut self, stream_id: u32, block: &[u8], end_stream: bool) -> Result<()> {
        let stream_flag = if end_stream { FLAG_END_STREAM } else { 0 };
        let mut chunks = block.chunks(self.peer_max_frame).peekable();
        let mut first = true;

        // An empty body still needs the HEADERS frame itself.
        if block.is_empty() {
            return self.send_frame(
                FRAME_TYPE_HEADERS,
                FLAG_END_HEADERS | stream_flag,
                stream_id,
                &[],
            );
        }

        while let Some(chunk) = chunks.next() {
            let last = chunks.peek().is_none();
            let (frame_type, mut flags) = if first {
                (FRAME_TYPE_HEADERS, stream_flag)
            } else {
                (FRAME_TYPE_CONTINUATION, 0)
            };
            if last {
                flags |= FLAG_END_HEADERS;
            }
            self.send_frame(frame_type, flags, stream_id, chunk)?;
            first = false;
        }
        Ok(())
    }

    fn write_body(&mut self, stream_id: u32, body: &Bytes) -> Result<()> {
        let mut offset = 0;
        while offset < body.len() {
            let stream_window = self
                .stream_windows
                .get(&stream_id)
                .copied()
                .unwrap_or(self.initial_window);
            let window = self.send_window.min(stream_window).max(0) as usize;
            let allowed = window.min(self.peer_max_frame);

            if allowed == 0 {
                // Window exhausted: service frames until the peer opens it.
                self.pump_frame()?;
                continue;
            }

            let end = (offset + allowed).min(body.len());
            let last = end == body.len();
            let flags = if last { FLAG_END_STREAM } else { 0 };
            self.send_frame(FRAME_TYPE_DATA, flags, stream_id, &body[offset..end])?;

            let sent = (end - offset) as i64;
            self.send_window -= sent;
            if let Some(window) = self.stream_windows.get_mut(&stream_id) {
                *window -= sent;
            }
            offset = end;
        }
        Ok(())
    }

    fn send_frame(&mut self, frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Result<()> {
        let header = FrameHeader {
            length: payload.len(),
            frame_type,
            flags,
            stream_id,
        };
        self.transport.write_all(&header.encode())?;
        self.transport.write_all(payload)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Status;
    use crate::testing::MockTransport;

    fn frame_bytes(frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = FrameHeader {
            length: payload.len(),
            frame_type,
            flags,
            stream_id,
        }
        .encode()
        .to_vec();
        out.extend_from_slice(payload);
        out
    }

    fn encode_block(pairs: &[(&str, &str)]) -> Vec<u8> {
        let mut encoder = Encoder::new();
        let fields: Vec<(Vec<u8>, Vec<u8>)> = pairs
            .iter()
            .map(|(n, v)| (n.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect();
        encoder.encode(fields.iter().map(|(n, v)| (n.as_slice(), v.as_slice())))
    }

    /// Client preface plus an empty client SETTINGS frame.
    fn preamble() -> Vec<u8> {
        let mut out = CONNECTION_PREFACE.to_vec();
        out.extend_from_slice(&frame_bytes(FRAME_TYPE_SETTINGS, 0, 0, &[]));
        out
    }

    fn session(usage: Usage, input: Vec<u8>) -> Http2Session<MockTransport> {
        Http2Session::accept(usage, MockTransport::new(&input)).unwrap()
    }

    /// Parses `(type, flags, stream_id, payload)` tuples out of written
    /// bytes.
    fn parse_written(bytes: &[u8]) -> Vec<(u8, u8, u32, Vec<u8>)> {
        let mut frames = Vec::new();
        let mut i = 0;
        while i + 9 <= bytes.len() {
            let mut head = [0u8; 9];
            head.copy_from_slice(&bytes[i..i + 9]);
            let header = FrameHeader::parse(&head);
            let payload = bytes[i + 9..i + 9 + header.length].to_vec();
            frames.push((header.frame_type, header.flags, header.stream_id, payload));
            i += 9 + header.length;
        }
        frames
    }

    #[test]
    fn test_bad_preface_rejected() {
        let result = Http2Session::accept(
            Usage::Doh,
            MockTransport::new(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"),
        );
        assert!(matches!(result, Err(HttpError::Protocol(_))));
    }

    #[test]
    fn test_get_request_completes_on_headers_end_stream() {
        let mut input = preamble();
        let block = encode_block(&[
            (":method", "GET"),
            (":scheme", "https"),
            (":path", "/dns-query?dns=AAE"),
            (":authority", "example.net"),
        ]);
        input.extend_from_slice(&frame_bytes(
            FRAME_TYPE_HEADERS,
            FLAG_END_HEADERS | FLAG_END_STREAM,
            1,
            &block,
        ));

        let mut s = session(Usage::Doh, input);
        let req = s.read_request().unwrap();
        assert_eq!(req.stream_id(), 1);
        assert_eq!(req.method(), "GET");
        assert_eq!(req.url().path(), "/dns-query/");
        assert_eq!(req.url().parameter("dns"), Some("AAE"));
        assert!(req.payload().is_empty());

        // The client SETTINGS frame must have been acknowledged.
        let frames = parse_written(&s.transport.written());
        assert!(frames
            .iter()
            .any(|(t, f, _, _)| *t == FRAME_TYPE_SETTINGS && *f & FLAG_ACK != 0));
    }

    #[test]
    fn test_post_payload_reassembled_in_arrival_order() {
        let mut input = preamble();
        let block = encode_block(&[
            (":method", "POST"),
            (":path", "/dns-query"),
            ("content-length", "6"),
        ]);
        input.extend_from_slice(&frame_bytes(FRAME_TYPE_HEADERS, FLAG_END_HEADERS, 1, &block));
        input.extend_from_slice(&frame_bytes(FRAME_TYPE_DATA, 0, 1, b"abc"));
        input.extend_from_slice(&frame_bytes(FRAME_TYPE_DATA, FLAG_END_STREAM, 1, b"def"));

        let mut s = session(Usage::Doh, input);
        let req = s.read_request().unwrap();
        assert_eq!(req.method(), "POST");
        assert_eq!(req.payload().as_ref(), b"abcdef");
        assert_eq!(req.headers().get("content-length"), Some("6"));
    }

    #[test]
    fn test_method_and_path_from_last_seen_pseudo_headers() {
        let mut input = preamble();
        let block = encode_block(&[(":method", "POST"), (":path", "/a"), ("content-length", "2")]);
        input.extend_from_slice(&frame_bytes(FRAME_TYPE_HEADERS, FLAG_END_HEADERS, 3, &block));
        input.extend_from_slice(&frame_bytes(FRAME_TYPE_DATA, FLAG_END_STREAM, 3, b"hi"));

        let mut s = session(Usage::Api, input);
        let req = s.read_request().unwrap();
        assert_eq!(req.stream_id(), 3);
        assert_eq!(req.method(), "POST");
        assert_eq!(req.url().path(), "/a");
    }

    #[test]
    fn test_data_overrun_is_hard_error() {
        let mut input = preamble();
        let block = encode_block(&[(":method", "POST"), (":path", "/a"), ("content-length", "2")]);
        input.extend_from_slice(&frame_bytes(FRAME_TYPE_HEADERS, FLAG_END_HEADERS, 1, &block));
        input.extend_from_slice(&frame_bytes(FRAME_TYPE_DATA, FLAG_END_STREAM, 1, b"abc"));

        let mut s = session(Usage::Api, input);
        assert!(matches!(s.read_request(), Err(HttpError::DataOverrun)));
        // No request may have been constructed for the stream.
        assert!(s.ready.is_empty());
    }

    #[test]
    fn test_data_for_unknown_stream_rejected() {
        let mut input = preamble();
        input.extend_from_slice(&frame_bytes(FRAME_TYPE_DATA, FLAG_END_STREAM, 5, b"x"));

        let mut s = session(Usage::Api, input);
        assert!(matches!(s.read_request(), Err(HttpError::Protocol(_))));
    }

    #[test]
    fn test_declared_length_over_usage_cap() {
        let mut input = preamble();
        let block = encode_block(&[
            (":method", "POST"),
            (":path", "/dns-query"),
            ("content-length", "20000"),
        ]);
        input.extend_from_slice(&frame_bytes(
            FRAME_TYPE_HEADERS,
            FLAG_END_HEADERS | FLAG_END_STREAM,
            1,
            &block,
        ));

        let mut s = session(Usage::Doh, input);
        assert!(matches!(s.read_request(), Err(HttpError::PayloadTooLarge)));
    }

    #[test]
    fn test_too_many_headers_rejected() {
        let mut pairs: Vec<(String, String)> =
            vec![(":method".into(), "GET".into()), (":path".into(), "/".into())];
        for i in 0..MAX_STREAM_HEADERS {
            pairs.push((format!("x-h{i}"), "v".to_string()));
        }
        let borrowed: Vec<(&str, &str)> =
            pairs.iter().map(|(n, v)| (n.as_str(), v.as_str())).collect();
        let block = encode_block(&borrowed);

        let mut input = preamble();
        input.extend_from_slice(&frame_bytes(
            FRAME_TYPE_HEADERS,
            FLAG_END_HEADERS | FLAG_END_STREAM,
            1,
            &block,
        ));

        let mut s = session(Usage::Api, input);
        assert!(matches!(s.read_request(), Err(HttpError::TooManyHeaders)));
    }

    #[test]
    fn test_continuation_reassembly() {
        let block = encode_block(&[(":method", "GET"), (":path", "/a/b")]);
        let split = block.len() / 2;

        let mut input = preamble();
        input.extend_from_slice(&frame_bytes(
            FRAME_TYPE_HEADERS,
            FLAG_END_STREAM,
            1,
            &block[..split],
        ));
        input.extend_from_slice(&frame_bytes(
            FRAME_TYPE_CONTINUATION,
            FLAG_END_HEADERS,
            1,
            &block[split..],
        ));

        let mut s = session(Usage::Ui, input);
        let req = s.read_request().unwrap();
        assert_eq!(req.method(), "GET");
        assert_eq!(req.url().path(), "/a/b");
    }

    #[test]
    fn test_interleaved_frame_during_header_block_rejected() {
        let block = encode_block(&[(":method", "GET"), (":path", "/")]);

        let mut input = preamble();
        input.extend_from_slice(&frame_bytes(FRAME_TYPE_HEADERS, FLAG_END_STREAM, 1, &block));
        input.extend_from_slice(&frame_bytes(FRAME_TYPE_PING, 0, 0, &[0u8; 8]));

        let mut s = session(Usage::Api, input);
        assert!(matches!(s.read_request(), Err(HttpError::Protocol(_))));
    }

    #[test]
    fn test_missing_method_is_hard_error() {
        let mut input = preamble();
        let block = encode_block(&[(":path", "/a")]);
        input.extend_from_slice(&frame_bytes(
            FRAME_TYPE_HEADERS,
            FLAG_END_HEADERS | FLAG_END_STREAM,
            1,
            &block,
        ));

        let mut s = session(Usage::Api, input);
        assert!(matches!(s.read_request(), Err(HttpError::Protocol(_))));
    }

    #[test]
    fn test_ping_is_acked() {
        let mut input = preamble();
        input.extend_from_slice(&frame_bytes(FRAME_TYPE_PING, 0, 0, &[1, 2, 3, 4, 5, 6, 7, 8]));

        let mut s = session(Usage::Api, input);
        // Input runs out after the PING, so the read ends cleanly.
        assert!(matches!(s.read_request(), Err(HttpError::Eof)));

        let frames = parse_written(&s.transport.written());
        let ack = frames
            .iter()
            .find(|(t, f, _, _)| *t == FRAME_TYPE_PING && *f & FLAG_ACK != 0)
            .expect("PING ACK not sent");
        assert_eq!(ack.3, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_goaway_ends_session() {
        let mut input = preamble();
        input.extend_from_slice(&frame_bytes(FRAME_TYPE_GOAWAY, 0, 0, &[0u8; 8]));

        let mut s = session(Usage::Api, input);
        assert!(matches!(s.read_request(), Err(HttpError::Eof)));
    }

    #[test]
    fn test_rst_stream_drops_state() {
        let mut input = preamble();
        let block = encode_block(&[(":method", "POST"), (":path", "/a"), ("content-length", "4")]);
        input.extend_from_slice(&frame_bytes(FRAME_TYPE_HEADERS, FLAG_END_HEADERS, 1, &block));
        input.extend_from_slice(&frame_bytes(FRAME_TYPE_RST_STREAM, 0, 1, &[0u8; 4]));

        let mut s = session(Usage::Api, input);
        assert!(matches!(s.read_request(), Err(HttpError::Eof)));
        assert!(s.streams.is_empty());
    }

    #[test]
    fn test_write_response_frames() {
        let mut input = preamble();
        let block = encode_block(&[(":method", "GET"), (":path", "/dns-query?dns=AAE")]);
        input.extend_from_slice(&frame_bytes(
            FRAME_TYPE_HEADERS,
            FLAG_END_HEADERS | FLAG_END_STREAM,
            1,
            &block,
        ));

        let mut s = session(Usage::Doh, input);
        let req = s.read_request().unwrap();

        let res = HttpResponse::with_data(
            req.stream_id(),
            Status::OK,
            Bytes::from_static(b"\x00\x01\x02"),
            "",
        );
        s.write_response(&res).unwrap();

        let frames = parse_written(&s.transport.written());
        let headers_frame = frames
            .iter()
            .find(|(t, _, sid, _)| *t == FRAME_TYPE_HEADERS && *sid == 1)
            .expect("HEADERS frame not sent");
        assert!(headers_frame.1 & FLAG_END_HEADERS != 0);
        assert!(headers_frame.1 & FLAG_END_STREAM == 0);

        // :status must be the first decoded field.
        let mut decoder = Decoder::new();
        let decoded = decoder.decode(&headers_frame.3).unwrap();
        assert_eq!(decoded[0].0, b":status".to_vec());
        assert_eq!(decoded[0].1, b"200".to_vec());
        assert!(decoded
            .iter()
            .any(|(n, v)| n == b"content-type" && v == b"application/dns-message"));
        assert!(decoded.iter().any(|(n, v)| n == b"content-length" && v == b"3"));

        let data_frame = frames
            .iter()
            .find(|(t, _, sid, _)| *t == FRAME_TYPE_DATA && *sid == 1)
            .expect("DATA frame not sent");
        assert!(data_frame.1 & FLAG_END_STREAM != 0);
        assert_eq!(data_frame.3, vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_body_response_ends_stream_on_headers() {
        let mut input = preamble();
        let block = encode_block(&[(":method", "GET"), (":path", "/x")]);
        input.extend_from_slice(&frame_bytes(
            FRAME_TYPE_HEADERS,
            FLAG_END_HEADERS | FLAG_END_STREAM,
            1,
            &block,
        ));

        let mut s = session(Usage::Api, input);
        let req = s.read_request().unwrap();

        let res = HttpResponse::new(req.stream_id(), Status::NOT_FOUND);
        s.write_response(&res).unwrap();

        let frames = parse_written(&s.transport.written());
        let headers_frame = frames
            .iter()
            .find(|(t, _, sid, _)| *t == FRAME_TYPE_HEADERS && *sid == 1)
            .expect("HEADERS frame not sent");
        // A 404 still carries the JSON-less standard headers; the stream
        // must end on the HEADERS frame when there is no body.
        assert!(headers_frame.1 & FLAG_END_STREAM != 0);
        assert!(!frames.iter().any(|(t, _, _, _)| *t == FRAME_TYPE_DATA));
    }

    #[test]
    fn test_window_consumed_data_is_replenished() {
        let mut input = preamble();
        let block = encode_block(&[(":method", "POST"), (":path", "/a"), ("content-length", "3")]);
        input.extend_from_slice(&frame_bytes(FRAME_TYPE_HEADERS, FLAG_END_HEADERS, 1, &block));
        input.extend_from_slice(&frame_bytes(FRAME_TYPE_DATA, FLAG_END_STREAM, 1, b"abc"));

        let mut s = session(Usage::Api, input);
        s.read_request().unwrap();

        let frames = parse_written(&s.transport.written());
        let updates: Vec<_> = frames
            .iter()
            .filter(|(t, _, _, _)| *t == FRAME_TYPE_WINDOW_UPDATE)
            .collect();
        // One update for the connection, one for the stream.
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].2, 0);
        assert_eq!(updates[1].2, 1);
        assert_eq!(updates[0].3, 3u32.to_be_bytes().to_vec());
    }
}
