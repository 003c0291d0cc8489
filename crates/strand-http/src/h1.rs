//! HTTP/1.1 codec.
//!
//! Line-oriented request parsing and response serialization. Reads are one
//! byte at a time into a bounded line buffer; the transport's read timeout
//! covers the whole line.

use bytes::Bytes;
use tracing::trace;

use crate::headers::Headers;
use crate::request::HttpRequest;
use crate::response::HttpResponse;
use crate::{HttpError, Result, Transport, Usage, HTTP_MAX_HEADER_LINE};

pub struct Http1Codec<T: Transport> {
    usage: Usage,
    transport: T,
}

impl<T: Transport> Http1Codec<T> {
    pub fn new(usage: Usage, transport: T) -> Self {
        Self { usage, transport }
    }

    /// Reads one `\r\n`-terminated line, returned without the terminator.
    ///
    /// A line at the maximum length that is still unterminated is a
    /// distinct too-long condition. EOF before any byte of the line is a
    /// clean [`HttpError::Eof`]; EOF mid-line is a format error.
    fn read_line(&mut self) -> Result<String> {
        let mut line: Vec<u8> = Vec::with_capacity(128);
        let mut byte = [0u8; 1];
        loop {
            if line.len() >= HTTP_MAX_HEADER_LINE {
                return Err(HttpError::HeaderLineTooLong);
            }
            let n = self.transport.read(&mut byte)?;
            if n == 0 {
                if line.is_empty() {
                    return Err(HttpError::Eof);
                }
                return Err(HttpError::BadFormat("unterminated line".to_string()));
            }
            if byte[0] == b'\n' {
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return String::from_utf8(line)
                    .map_err(|_| HttpError::BadFormat("non-UTF8 header line".to_string()));
            }
            line.push(byte[0]);
        }
    }

    /// Reads one complete request: request line, headers, then exactly
    /// `content-length` bytes of payload.
    pub fn read_request(&mut self) -> Result<HttpRequest> {
        let request_line = self.read_line()?;

        let mut parts = request_line.split_whitespace();
        let (method, raw_url, version) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(m), Some(u), Some(v), None) => (m.to_string(), u.to_string(), v),
            _ => {
                return Err(HttpError::BadFormat(format!(
                    "bad request line: {request_line}"
                )))
            }
        };
        if version != "HTTP/1.1" && version != "HTTP/1.0" {
            return Err(HttpError::BadFormat(format!("bad version: {version}")));
        }

        let mut headers = Headers::new();
        let mut last_name: Option<String> = None;
        loop {
            // EOF between the request line and the blank line is a peer
            // that gave up mid-request, not a clean close.
            let line = match self.read_line() {
                Err(HttpError::Eof) => {
                    return Err(HttpError::BadFormat(
                        "connection closed mid-request".to_string(),
                    ))
                }
                other => other?,
            };
            if line.is_empty() {
                break;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                // Continuation line: folded onto the previous header.
                let name = last_name.as_deref().ok_or_else(|| {
                    HttpError::BadFormat("continuation before any header".to_string())
                })?;
                let existing = headers.get(name).unwrap_or_default().to_string();
                headers.set(name, format!("{} {}", existing, line.trim()));
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| HttpError::BadFormat(format!("bad header line: {line}")))?;
            let name = name.trim().to_ascii_lowercase();
            headers.set(&name, value.trim().to_string());
            last_name = Some(name);
        }

        let content_length = match headers.get("content-length") {
            None => 0,
            Some(v) => v
                .parse::<usize>()
                .map_err(|_| HttpError::BadFormat(format!("bad content-length: {v}")))?,
        };
        if content_length > self.usage.max_payload() {
            return Err(HttpError::PayloadTooLarge);
        }

        let mut payload = vec![0u8; content_length];
        if content_length > 0 {
            match self.transport.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(HttpError::BadFormat(
                        "connection closed mid-payload".to_string(),
                    ))
                }
                Err(e) => return Err(e.into()),
            }
        }

        trace!(method = %method, url = %raw_url, len = content_length, "HTTP/1.1 request");
        HttpRequest::new(0, method, &raw_url, headers, Bytes::from(payload))
    }

    /// Serializes one response: status line, headers, blank line, body.
    pub fn write_response(&mut self, response: &HttpResponse) -> Result<()> {
        let body = response.body_bytes();
        let headers = response.wire_headers(self.usage, body.len());

        let mut wire = Vec::with_capacity(256 + body.len());
        wire.extend_from_slice(format!("HTTP/1.1 {}\r\n", response.status()).as_bytes());
        for (name, value) in headers.iter() {
            wire.extend_from_slice(name.as_bytes());
            wire.extend_from_slice(b": ");
            wire.extend_from_slice(value.as_bytes());
            wire.extend_from_slice(b"\r\n");
        }
        wire.extend_from_slice(b"\r\n");
        wire.extend_from_slice(&body);

        self.transport.write_all(&wire)?;
        self.transport.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Status;
    use crate::testing::MockTransport;
    use serde_json::json;

    fn codec(usage: Usage, input: &[u8]) -> Http1Codec<MockTransport> {
        Http1Codec::new(usage, MockTransport::new(input))
    }

    #[test]
    fn test_read_simple_get() {
        let mut c = codec(
            Usage::Api,
            b"GET /zones?id=3 HTTP/1.1\r\nHost: localhost\r\nConnection: keep-alive\r\n\r\n",
        );
        let req = c.read_request().unwrap();
        assert_eq!(req.method(), "GET");
        assert_eq!(req.url().path(), "/zones/");
        assert_eq!(req.url().parameter("id"), Some("3"));
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert!(!req.close_connection());
        assert!(req.payload().is_empty());
    }

    #[test]
    fn test_read_post_with_payload() {
        let mut c = codec(
            Usage::Doh,
            b"POST /dns-query HTTP/1.1\r\nContent-Length: 4\r\n\r\n\x00\x01\x02\x03",
        );
        let req = c.read_request().unwrap();
        assert_eq!(req.method(), "POST");
        assert_eq!(req.payload().as_ref(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_clean_eof_before_request() {
        let mut c = codec(Usage::Api, b"");
        assert!(matches!(c.read_request(), Err(HttpError::Eof)));
    }

    #[test]
    fn test_eof_mid_request_is_bad_format() {
        let mut c = codec(Usage::Api, b"GET / HTTP/1.1\r\nHost: x\r\n");
        assert!(matches!(c.read_request(), Err(HttpError::BadFormat(_))));
    }

    #[test]
    fn test_bad_request_line() {
        let mut c = codec(Usage::Api, b"GET /\r\n\r\n");
        assert!(matches!(c.read_request(), Err(HttpError::BadFormat(_))));
    }

    #[test]
    fn test_bad_version() {
        let mut c = codec(Usage::Api, b"GET / HTTP/0.9\r\n\r\n");
        assert!(matches!(c.read_request(), Err(HttpError::BadFormat(_))));
    }

    #[test]
    fn test_over_long_line() {
        let mut input = Vec::from(&b"GET /"[..]);
        input.extend(std::iter::repeat(b'a').take(HTTP_MAX_HEADER_LINE));
        input.extend_from_slice(b" HTTP/1.1\r\n\r\n");
        let mut c = codec(Usage::Api, &input);
        assert!(matches!(
            c.read_request(),
            Err(HttpError::HeaderLineTooLong)
        ));
    }

    #[test]
    fn test_line_under_limit_returned_without_terminator() {
        let mut input = Vec::from(&b"GET /x HTTP/1.1\r\nx-pad: "[..]);
        input.extend(std::iter::repeat(b'b').take(1000));
        input.extend_from_slice(b"\r\n\r\n");
        let mut c = codec(Usage::Api, &input);
        let req = c.read_request().unwrap();
        let value = req.headers().get("x-pad").unwrap();
        assert_eq!(value.len(), 1000);
        assert!(!value.ends_with('\r'));
    }

    #[test]
    fn test_declared_length_over_cap() {
        let mut c = codec(
            Usage::Doh,
            b"POST /dns-query HTTP/1.1\r\nContent-Length: 20000\r\n\r\n",
        );
        assert!(matches!(c.read_request(), Err(HttpError::PayloadTooLarge)));
    }

    #[test]
    fn test_continuation_lines_folded() {
        let mut c = codec(
            Usage::Api,
            b"GET / HTTP/1.1\r\nx-long: part1\r\n part2\r\n\r\n",
        );
        let req = c.read_request().unwrap();
        assert_eq!(req.headers().get("x-long"), Some("part1 part2"));
    }

    #[test]
    fn test_api_response_content_length_is_json_size() {
        let value = json!({"k": "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"});
        let res = HttpResponse::with_json(0, Status::OK, value);
        assert_eq!(res.body_bytes().len(), 42);

        let mut c = codec(Usage::Api, b"");
        c.write_response(&res).unwrap();
        let wire = String::from_utf8(c.transport_written()).unwrap();

        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("content-length: 42\r\n"));
        assert!(wire.contains("content-type: application/json\r\n"));
        assert!(wire.ends_with("\r\n\r\n{\"k\":\"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\"}"));
    }

    #[test]
    fn test_unknown_status_reason() {
        let res = HttpResponse::new(0, Status(299));
        let mut c = codec(Usage::Ui, b"");
        c.write_response(&res).unwrap();
        let wire = String::from_utf8(c.transport_written()).unwrap();
        assert!(wire.starts_with("HTTP/1.1 299 Unknown Status\r\n"));
    }

    impl Http1Codec<MockTransport> {
        fn transport_written(&self) -> Vec<u8> {
            self.transport.written()
        }
    }
}
