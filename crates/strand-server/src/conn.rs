//! Accepted connection wrapper.
//!
//! A [`Conn`] is a plain or TLS-wrapped TCP stream plus the application
//! protocol negotiated for it. The TLS handshake is completed before the
//! connection is handed to a pooled handler, so the handler can read the
//! negotiated ALPN protocol synchronously.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use rustls::{ServerConnection, StreamOwned};
use strand_http::{AppProtocol, HttpError, Transport};

use crate::{Result, ServerError};

/// One accepted client connection.
pub enum Conn {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ServerConnection, TcpStream>>),
}

impl Conn {
    /// Wraps a plaintext stream.
    pub fn plain(stream: TcpStream) -> Self {
        Conn::Plain(stream)
    }

    /// Wraps a stream in TLS and drives the handshake to completion.
    ///
    /// The stream's read timeout bounds the handshake, so a stalled client
    /// cannot hold the accept path.
    pub fn tls(stream: TcpStream, config: Arc<rustls::ServerConfig>) -> Result<Self> {
        let mut session = ServerConnection::new(config)
            .map_err(|e| ServerError::Tls(format!("failed to start TLS session: {e}")))?;

        let mut stream = stream;
        while session.is_handshaking() {
            session
                .complete_io(&mut stream)
                .map_err(|e| ServerError::Tls(format!("TLS handshake failed: {e}")))?;
        }

        Ok(Conn::Tls(Box::new(StreamOwned::new(session, stream))))
    }

    /// The application protocol negotiated for this connection.
    ///
    /// Plaintext connections are HTTP/1.1; TLS connections map their ALPN
    /// result.
    pub fn protocol(&self) -> std::result::Result<AppProtocol, HttpError> {
        match self {
            Conn::Plain(_) => Ok(AppProtocol::Http1),
            Conn::Tls(stream) => AppProtocol::from_alpn(stream.conn.alpn_protocol()),
        }
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Conn::Plain(stream) => stream.peer_addr(),
            Conn::Tls(stream) => stream.sock.peer_addr(),
        }
    }
}

impl Read for Conn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Conn::Plain(stream) => stream.read(buf),
            Conn::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for Conn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Conn::Plain(stream) => stream.write(buf),
            Conn::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Conn::Plain(stream) => stream.flush(),
            Conn::Tls(stream) => stream.flush(),
        }
    }
}

impl Transport for Conn {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Conn::Plain(stream) => stream.set_read_timeout(timeout),
            Conn::Tls(stream) => stream.sock.set_read_timeout(timeout),
        }
    }
}
