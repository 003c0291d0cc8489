//! # Strand DNS Server
//!
//! Connection handling for the Strand listeners.
//!
//! ## Architecture
//!
//! Each configured listener (DoH, management API, UI) owns a fixed pool of
//! connection handlers, each running a service loop in its own thread.
//! The accept path hands a connection to an idle handler; the handler
//! speaks HTTP/1.1 or HTTP/2 over it (as negotiated via ALPN), serves
//! requests until the connection ends, and recycles itself into the pool.
//!
//! DNS resolution itself lives behind the [`resolver::Resolver`] trait;
//! the DoH handler feeds it through a small bounded dispatch pool so that
//! shutdown never blocks on an in-flight resolution.

use thiserror::Error;

pub mod conn;
pub mod doh;
pub mod listener;
pub mod resolver;
pub mod server;
pub mod web;

pub use conn::Conn;
pub use doh::DohConnection;
pub use listener::Listener;
pub use resolver::{LoopbackResolver, MessageEnvelope, ResolveWorker, Resolver};
pub use server::Server;
pub use web::{NotFoundHandler, RequestHandler, WebConnection};

/// Server error types.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("HTTP error: {0}")]
    Http(#[from] strand_http::HttpError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("shutdown in progress")]
    Shutdown,
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
