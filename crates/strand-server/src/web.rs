//! API and UI connection handler.
//!
//! One handler type serves both the management API and the UI listener;
//! the usage mode picks the response headers and the injected
//! [`RequestHandler`] supplies the application logic. The REST resource
//! and static-content layers live outside this crate.

use std::net::IpAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use strand_core::{HandlerPool, RunFlag, WAIT_GRANULARITY};
use strand_http::{HttpConn, HttpError, HttpRequest, HttpResponse, Status, Usage};
use tracing::{debug, trace};

use crate::conn::Conn;

/// Application-level request handling, implemented by the API and UI
/// layers.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: &HttpRequest) -> HttpResponse;
}

/// Answers every request with 404. Stands in where no application layer
/// is wired up.
pub struct NotFoundHandler;

impl RequestHandler for NotFoundHandler {
    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        HttpResponse::error(request.stream_id(), Status::NOT_FOUND, "no such resource")
    }
}

struct Slot {
    conn: Option<Conn>,
    arrived: bool,
}

/// One pooled API/UI connection handler.
pub struct WebConnection {
    usage: Usage,
    run: RunFlag,
    client_timeout: Duration,
    allow: Vec<IpAddr>,
    slot: Mutex<Slot>,
    cond: Condvar,
    pool: Weak<HandlerPool<WebConnection>>,
    handler: Arc<dyn RequestHandler>,
}

impl WebConnection {
    /// Creates a handler bound to its owning pool.
    ///
    /// An empty `allow` list means no client restriction; localhost is
    /// always allowed as a recovery path.
    pub fn new(
        usage: Usage,
        run: RunFlag,
        client_timeout: Duration,
        allow: Vec<IpAddr>,
        handler: Arc<dyn RequestHandler>,
        pool: &Arc<HandlerPool<WebConnection>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            usage,
            run,
            client_timeout,
            allow,
            slot: Mutex::new(Slot {
                conn: None,
                arrived: false,
            }),
            cond: Condvar::new(),
            pool: Arc::downgrade(pool),
            handler,
        })
    }

    /// Producer-side hand-off, waking the service loop.
    pub fn serve(&self, conn: Conn) {
        let mut slot = self.slot.lock();
        slot.conn = Some(conn);
        slot.arrived = true;
        self.cond.notify_one();
    }

    fn done(self: &Arc<Self>) {
        {
            let mut slot = self.slot.lock();
            slot.conn = None;
            slot.arrived = false;
        }
        if let Some(pool) = self.pool.upgrade() {
            pool.put(self.clone());
        }
    }

    fn wait_for_connection(&self) -> Option<Conn> {
        let mut slot = self.slot.lock();
        while !slot.arrived {
            if self.cond.wait_for(&mut slot, WAIT_GRANULARITY).timed_out() && !slot.arrived {
                return None;
            }
        }
        slot.conn.take()
    }

    fn client_allowed(&self, addr: IpAddr) -> bool {
        addr.is_loopback() || self.allow.is_empty() || self.allow.contains(&addr)
    }

    /// The handler's service loop.
    pub fn run_loop(self: Arc<Self>) {
        loop {
            let conn = loop {
                match self.wait_for_connection() {
                    Some(conn) => break conn,
                    None => {
                        if self.run.is_shutdown() {
                            return;
                        }
                    }
                }
            };

            self.handle_connection(conn);
            self.done();

            if self.run.is_shutdown() {
                return;
            }
        }
    }

    fn handle_connection(&self, conn: Conn) {
        let peer = match conn.peer_addr() {
            Ok(peer) => peer,
            Err(e) => {
                debug!(error = %e, "peer address unavailable");
                return;
            }
        };
        if !self.client_allowed(peer.ip()) {
            debug!(client = %peer, usage = %self.usage, "client not in allow list");
            return;
        }
        let protocol = match conn.protocol() {
            Ok(protocol) => protocol,
            Err(e) => {
                debug!(error = %e, client = %peer, "protocol selection failed");
                return;
            }
        };
        let mut http = match HttpConn::new(self.usage, protocol, conn, self.client_timeout) {
            Ok(http) => http,
            Err(e) => {
                debug!(error = %e, client = %peer, "connection setup failed");
                return;
            }
        };

        loop {
            let request = match http.read_request() {
                Ok(request) => request,
                Err(HttpError::Timeout) | Err(HttpError::Eof) => return,
                Err(e) => {
                    // The request failed to decode; report it where a
                    // status can still be formed and end the connection.
                    if let Some(status) = e.status() {
                        let response = HttpResponse::error(0, status, &e.to_string());
                        let _ = http.write_response(&response);
                    }
                    debug!(error = %e, client = %peer, usage = %self.usage, "bad request");
                    return;
                }
            };

            trace!(client = %peer, method = request.method(), path = request.url().path(), "request");
            let close = request.close_connection();
            let response = self.handler.handle(&request);

            if let Err(e) = http.write_response(&response) {
                debug!(error = %e, client = %peer, "failed to write response");
                return;
            }

            if close || self.run.is_shutdown() {
                return;
            }
        }
    }
}
