//! # Strand HTTP layer
//!
//! Wire codecs and message model for the Strand listeners:
//!
//! - **HTTP/1.1 codec**: line-oriented request parser and response serializer
//! - **HTTP/2 codec**: hand-rolled framed server session with per-stream
//!   request reassembly and HPACK header compression
//! - **Facade**: [`HttpConn`] selects the codec from the negotiated
//!   application protocol and exposes a uniform read-request/write-response
//!   contract
//!
//! The codecs are deliberately minimal: one server-side request/response
//! exchange model, no trailers, no server push, no upgrade paths. Payload
//! limits depend on the connection's [`Usage`] mode.

use std::io::{self, Read, Write};
use std::time::Duration;

use thiserror::Error;

pub mod h1;
pub mod h2;
pub mod headers;
pub mod request;
pub mod response;
pub mod url;

#[cfg(test)]
pub(crate) mod testing;

pub use headers::Headers;
pub use request::HttpRequest;
pub use response::{Body, HttpResponse, Status};
pub use url::{Url, UrlError};

/// Maximum accepted length of a single HTTP/1.1 line, request line included.
pub const HTTP_MAX_HEADER_LINE: usize = 8192;

/// HTTP error types.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("malformed request: {0}")]
    BadFormat(String),

    #[error("header line exceeds maximum length")]
    HeaderLineTooLong,

    #[error("too many headers on one stream")]
    TooManyHeaders,

    #[error("payload exceeds the limit for this usage")]
    PayloadTooLarge,

    #[error("data received past the declared content length")]
    DataOverrun,

    #[error(transparent)]
    Url(#[from] UrlError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unrecognized negotiated protocol: {0}")]
    UnknownProtocol(String),

    #[error("read timed out")]
    Timeout,

    #[error("end of stream")]
    Eof,

    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for HttpError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => HttpError::Timeout,
            io::ErrorKind::UnexpectedEof => HttpError::Eof,
            _ => HttpError::Io(e),
        }
    }
}

impl HttpError {
    /// The status to report to the client, where one can still be formed.
    ///
    /// `None` means the connection is simply closed without a response
    /// (timeouts and clean end-of-stream are not application errors).
    pub fn status(&self) -> Option<Status> {
        match self {
            HttpError::BadFormat(_) | HttpError::Url(_) => Some(Status::BAD_REQUEST),
            HttpError::HeaderLineTooLong | HttpError::TooManyHeaders => {
                Some(Status::HEADER_FIELDS_TOO_LARGE)
            }
            HttpError::PayloadTooLarge | HttpError::DataOverrun => Some(Status::ENTITY_TOO_LARGE),
            HttpError::Protocol(_) | HttpError::UnknownProtocol(_) | HttpError::Io(_) => {
                Some(Status::INTERNAL_SERVER_ERROR)
            }
            HttpError::Timeout | HttpError::Eof => None,
        }
    }
}

/// Result type for HTTP operations.
pub type Result<T> = std::result::Result<T, HttpError>;

/// What a connection is used for. Selects payload limits and the standard
/// response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    /// Management API: JSON bodies.
    Api,
    /// DNS over HTTPS: small binary DNS messages.
    Doh,
    /// Static UI content.
    Ui,
}

impl Usage {
    /// Largest request payload accepted in this mode.
    pub const fn max_payload(&self) -> usize {
        match self {
            // DNS messages are small; anything bigger is abuse.
            Usage::Doh => 16 * 1024,
            Usage::Api | Usage::Ui => 1024 * 1024,
        }
    }

    /// Returns the usage name.
    pub const fn name(&self) -> &'static str {
        match self {
            Usage::Api => "api",
            Usage::Doh => "doh",
            Usage::Ui => "ui",
        }
    }
}

impl std::fmt::Display for Usage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Application protocol negotiated at the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppProtocol {
    Http1,
    Http2,
}

impl AppProtocol {
    /// Maps an ALPN protocol identifier to a codec kind.
    ///
    /// No ALPN (plaintext, or a client that did not negotiate) means
    /// HTTP/1.1. Anything other than `h2`/`http/1.1` is a hard error.
    pub fn from_alpn(alpn: Option<&[u8]>) -> Result<Self> {
        match alpn {
            None | Some(b"http/1.1") => Ok(AppProtocol::Http1),
            Some(b"h2") => Ok(AppProtocol::Http2),
            Some(other) => Err(HttpError::UnknownProtocol(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }

    /// Returns the protocol name.
    pub const fn name(&self) -> &'static str {
        match self {
            AppProtocol::Http1 => "HTTP/1.1",
            AppProtocol::Http2 => "HTTP/2",
        }
    }
}

impl std::fmt::Display for AppProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Byte transport a codec runs over.
///
/// Implemented by plain TCP and TLS-wrapped streams. The read timeout
/// applies to every blocking read the codecs make.
pub trait Transport: Read + Write + Send {
    /// Sets the timeout for subsequent reads.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;
}

enum Codec<T: Transport> {
    Http1(h1::Http1Codec<T>),
    Http2(h2::Http2Session<T>),
}

/// Per-connection protocol facade.
///
/// Built once per accepted connection from the negotiated protocol; callers
/// read requests and write responses without caring which codec is under it.
pub struct HttpConn<T: Transport> {
    protocol: AppProtocol,
    codec: Codec<T>,
}

impl<T: Transport> HttpConn<T> {
    /// Wraps a transport in the codec matching the negotiated protocol.
    ///
    /// For HTTP/2 this performs the server side of the connection preface
    /// exchange before returning.
    pub fn new(
        usage: Usage,
        protocol: AppProtocol,
        mut transport: T,
        timeout: Duration,
    ) -> Result<Self> {
        transport.set_read_timeout(Some(timeout))?;
        let codec = match protocol {
            AppProtocol::Http1 => Codec::Http1(h1::Http1Codec::new(usage, transport)),
            AppProtocol::Http2 => Codec::Http2(h2::Http2Session::accept(usage, transport)?),
        };
        Ok(Self { protocol, codec })
    }

    /// Reads the next complete request off the connection.
    pub fn read_request(&mut self) -> Result<HttpRequest> {
        match &mut self.codec {
            Codec::Http1(c) => c.read_request(),
            Codec::Http2(s) => s.read_request(),
        }
    }

    /// Writes one response, including the standard headers for the usage
    /// mode.
    pub fn write_response(&mut self, response: &HttpResponse) -> Result<()> {
        match &mut self.codec {
            Codec::Http1(c) => c.write_response(response),
            Codec::Http2(s) => s.write_response(response),
        }
    }

    /// The negotiated protocol this connection speaks.
    pub fn protocol(&self) -> AppProtocol {
        self.protocol
    }
}
