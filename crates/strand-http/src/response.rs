//! HTTP response model.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::headers::Headers;
use crate::Usage;

/// Name reported in the `server` header.
pub const SERVER_NAME: &str = "Strand-DNS";

/// Numeric HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u16);

impl Status {
    pub const OK: Status = Status(200);
    pub const BAD_REQUEST: Status = Status(400);
    pub const UNAUTHORIZED: Status = Status(401);
    pub const NOT_FOUND: Status = Status(404);
    pub const METHOD_NOT_ALLOWED: Status = Status(405);
    pub const TIMEOUT: Status = Status(408);
    pub const ENTITY_TOO_LARGE: Status = Status(413);
    pub const HEADER_FIELDS_TOO_LARGE: Status = Status(431);
    pub const INTERNAL_SERVER_ERROR: Status = Status(500);
    pub const NOT_IMPLEMENTED: Status = Status(501);

    /// Fixed reason phrase for the status line.
    pub const fn reason(&self) -> &'static str {
        match self.0 {
            200 => "OK",
            400 => "Bad Request",
            401 => "Unauthorized",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            413 => "Request Entity Too Large",
            431 => "Request Header Fields Too Large",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            _ => "Unknown Status",
        }
    }

    pub const fn code(&self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.0, self.reason())
    }
}

/// Response body. Structured and opaque payloads are mutually exclusive by
/// construction.
#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    Data(Bytes),
}

/// A response under construction.
///
/// Built once by a handler; headers may be added up to transmission, the
/// body never changes after construction.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    stream_id: u32,
    status: Status,
    headers: Headers,
    body: Body,
    content_type: Option<String>,
}

impl HttpResponse {
    /// An empty-bodied response.
    pub fn new(stream_id: u32, status: Status) -> Self {
        Self {
            stream_id,
            status,
            headers: Headers::new(),
            body: Body::Empty,
            content_type: None,
        }
    }

    /// A response carrying a JSON body.
    pub fn with_json(stream_id: u32, status: Status, value: serde_json::Value) -> Self {
        Self {
            stream_id,
            status,
            headers: Headers::new(),
            body: Body::Json(value),
            content_type: None,
        }
    }

    /// A response carrying an opaque byte body and its content type.
    pub fn with_data(
        stream_id: u32,
        status: Status,
        data: Bytes,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            stream_id,
            status,
            headers: Headers::new(),
            body: Body::Data(data),
            content_type: Some(content_type.into()),
        }
    }

    /// A JSON error body describing a failed request.
    pub fn error(stream_id: u32, status: Status, description: &str) -> Self {
        Self::with_json(
            stream_id,
            status,
            json!({
                "status": status.code(),
                "description": description,
            }),
        )
    }

    /// Adds a header. Later standard headers of the same name win.
    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The body as wire bytes. JSON bodies are serialized here, so the
    /// returned length is the `content-length` the codecs must declare.
    pub fn body_bytes(&self) -> Bytes {
        match &self.body {
            Body::Empty => Bytes::new(),
            Body::Json(v) => Bytes::from(v.to_string().into_bytes()),
            Body::Data(b) => b.clone(),
        }
    }

    /// The complete header set to put on the wire: handler-supplied headers
    /// plus the standard and usage-mode headers.
    pub fn wire_headers(&self, usage: Usage, body_len: usize) -> Headers {
        let mut headers = self.headers.clone();

        let now = http_date(Utc::now());
        headers.set("server", SERVER_NAME);
        headers.set("date", now.clone());
        headers.set("expires", now);

        match usage {
            Usage::Doh => {
                headers.set("content-type", "application/dns-message");
                headers.set("access-control-allow-origin", "*");
            }
            Usage::Api => {
                headers.set("content-type", "application/json");
                headers.set("www-authenticate", "Basic realm=\"Strand DNS\"");
                headers.set("cache-control", "no-cache");
                headers.set("access-control-allow-origin", "*");
            }
            Usage::Ui => {
                // Static content changes rarely.
                headers.set("cache-control", "max-age=86400");
                if let Some(ct) = &self.content_type {
                    headers.set("content-type", ct.clone());
                }
            }
        }

        headers.set("content-length", body_len.to_string());
        headers
    }
}

/// Formats an instant in RFC 7231 HTTP-date form.
pub fn http_date(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
