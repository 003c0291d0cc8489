//! TCP listener and accept path.

use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::CertificateDer;
use socket2::{Domain, Socket, Type};
use strand_core::{HandlerPool, RunFlag};
use tracing::{debug, error, info};

use crate::conn::Conn;
use crate::{Result, ServerError};

/// ALPN protocol identifiers offered during the TLS handshake.
const ALPN_H2: &[u8] = b"h2";
const ALPN_HTTP11: &[u8] = b"http/1.1";

/// How often the accept loop wakes to re-check the run-state.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Loads TLS configuration from PEM certificate and key files, with ALPN
/// offering HTTP/2 and an HTTP/1.1 fallback.
pub fn load_tls_config<P: AsRef<Path>>(
    cert_path: P,
    key_path: P,
) -> Result<Arc<rustls::ServerConfig>> {
    let cert_file = std::fs::File::open(cert_path.as_ref())
        .map_err(|e| ServerError::Tls(format!("failed to open certificate file: {e}")))?;
    let mut cert_reader = std::io::BufReader::new(cert_file);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Tls(format!("failed to parse certificates: {e}")))?;

    if certs.is_empty() {
        return Err(ServerError::Tls("no certificates found in file".into()));
    }

    let key_file = std::fs::File::open(key_path.as_ref())
        .map_err(|e| ServerError::Tls(format!("failed to open key file: {e}")))?;
    let mut key_reader = std::io::BufReader::new(key_file);
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| ServerError::Tls(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| ServerError::Tls("no private key found in file".into()))?;

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Tls(format!("failed to build TLS config: {e}")))?;

    config.alpn_protocols = vec![ALPN_H2.to_vec(), ALPN_HTTP11.to_vec()];

    Ok(Arc::new(config))
}

/// One bound listening socket plus its accept loop.
pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,
    tls: Option<Arc<rustls::ServerConfig>>,
    client_timeout: Duration,
    run: RunFlag,
}

impl Listener {
    /// Binds a listening socket with reuse-addr (and reuse-port on unix)
    /// set, non-blocking so the accept loop can observe shutdown.
    pub fn bind(
        addr: SocketAddr,
        tls: Option<Arc<rustls::ServerConfig>>,
        client_timeout: Duration,
        run: RunFlag,
    ) -> Result<Self> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;

        #[cfg(unix)]
        socket.set_reuse_port(true)?;

        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1024)?;

        let listener: TcpListener = socket.into();
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            tls,
            client_timeout,
            run,
        })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections and hands each to an idle pooled handler until
    /// shutdown.
    ///
    /// `assign` is the producer-side hand-off, typically
    /// `|handler, conn| handler.serve(conn)`.
    pub fn run<H, F>(self, pool: Arc<HandlerPool<H>>, assign: F)
    where
        H: Send + Sync + 'static,
        F: Fn(&Arc<H>, Conn),
    {
        info!(addr = %self.local_addr, tls = self.tls.is_some(), "listener started");

        loop {
            if self.run.is_shutdown() {
                info!(addr = %self.local_addr, "listener stopping");
                return;
            }

            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL);
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "error accepting connection");
                    continue;
                }
            };

            let conn = match self.prepare(stream) {
                Ok(conn) => conn,
                Err(e) => {
                    debug!(error = %e, client = %peer, "connection setup failed");
                    continue;
                }
            };

            // Wait for an idle handler in bounded slices so a saturated
            // pool does not mask a shutdown request.
            let handler = loop {
                match pool.get() {
                    Ok(handler) => break handler,
                    Err(_) => {
                        if self.run.is_shutdown() {
                            info!(addr = %self.local_addr, "listener stopping");
                            return;
                        }
                    }
                }
            };

            debug!(client = %peer, "connection assigned");
            assign(&handler, conn);
        }
    }

    /// Switches an accepted socket to blocking reads with the configured
    /// timeout and completes TLS if this listener carries it.
    fn prepare(&self, stream: std::net::TcpStream) -> Result<Conn> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(self.client_timeout))?;

        match &self.tls {
            Some(config) => Conn::tls(stream, config.clone()),
            None => Ok(Conn::plain(stream)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn install_crypto_provider() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    fn generate_test_cert() -> (NamedTempFile, NamedTempFile) {
        use rcgen::{generate_simple_self_signed, CertifiedKey};

        let subject_alt_names = vec!["localhost".to_string(), "127.0.0.1".to_string()];
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(subject_alt_names).unwrap();

        let mut cert_file = NamedTempFile::new().unwrap();
        cert_file.write_all(cert.pem().as_bytes()).unwrap();

        let mut key_file = NamedTempFile::new().unwrap();
        key_file
            .write_all(key_pair.serialize_pem().as_bytes())
            .unwrap();

        (cert_file, key_file)
    }

    #[test]
    fn test_tls_config_alpn() {
        install_crypto_provider();
        let (cert_file, key_file) = generate_test_cert();
        let config = load_tls_config(cert_file.path(), key_file.path()).unwrap();

        assert!(config.alpn_protocols.contains(&ALPN_H2.to_vec()));
        assert!(config.alpn_protocols.contains(&ALPN_HTTP11.to_vec()));
    }

    #[test]
    fn test_missing_cert_file() {
        assert!(matches!(
            load_tls_config("/nonexistent/cert.pem", "/nonexistent/key.pem"),
            Err(ServerError::Tls(_))
        ));
    }

    #[test]
    fn test_bind_ephemeral_port() {
        let run = RunFlag::new();
        let listener = Listener::bind(
            "127.0.0.1:0".parse().unwrap(),
            None,
            Duration::from_secs(1),
            run,
        )
        .unwrap();
        assert!(listener.local_addr().port() > 0);
    }
}
