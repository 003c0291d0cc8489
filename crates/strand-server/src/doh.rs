//! DoH connection handler.
//!
//! Each pooled handler owns a private dispatch pool with a single resolver
//! worker and queue/result capacities of one: the DoH endpoint
//! deliberately serializes resolution per connection. The handler's
//! service loop waits for an assigned connection, serves DoH requests over
//! it until timeout, EOF or shutdown, and recycles itself.

use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use data_encoding::BASE64URL_NOPAD;
use parking_lot::{Condvar, Mutex};
use strand_core::{DispatchPool, HandlerPool, RunFlag, WAIT_GRANULARITY};
use strand_http::{HttpConn, HttpError, HttpRequest, HttpResponse, Status, Usage};
use tracing::{debug, trace, warn};

use crate::conn::Conn;
use crate::resolver::{MessageEnvelope, ResolveWorker, Resolver};

/// Hand-off slot between the accept path and the handler's service loop.
struct Slot {
    conn: Option<Conn>,
    arrived: bool,
}

/// One pooled DoH connection handler.
pub struct DohConnection {
    run: RunFlag,
    client_timeout: Duration,
    slot: Mutex<Slot>,
    cond: Condvar,
    pool: Weak<HandlerPool<DohConnection>>,
    dispatch: DispatchPool<MessageEnvelope>,
}

impl DohConnection {
    /// Creates a handler bound to its owning pool, with its private
    /// single-worker resolution pool.
    pub fn new(
        run: RunFlag,
        client_timeout: Duration,
        resolver: Arc<dyn Resolver>,
        pool: &Arc<HandlerPool<DohConnection>>,
    ) -> Arc<Self> {
        let dispatch = DispatchPool::new("DoH resolver", run.clone(), 1, 1, 1, move |_| {
            ResolveWorker::new(resolver.clone())
        });
        Arc::new(Self {
            run,
            client_timeout,
            slot: Mutex::new(Slot {
                conn: None,
                arrived: false,
            }),
            cond: Condvar::new(),
            pool: Arc::downgrade(pool),
            dispatch,
        })
    }

    /// Producer-side hand-off: stores the connection, marks it arrived and
    /// wakes the service loop.
    pub fn serve(&self, conn: Conn) {
        let mut slot = self.slot.lock();
        slot.conn = Some(conn);
        slot.arrived = true;
        self.cond.notify_one();
    }

    /// Clears the hand-off state and returns this handler to the idle set.
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

    /// Waits one bounded slice for a connection. `None` on timeout; the
    /// caller re-checks the run-state and retries.
    fn wait_for_connection(&self) -> Option<Conn> {
        let mut slot = self.slot.lock();
        while !slot.arrived {
            if self.cond.wait_for(&mut slot, WAIT_GRANULARITY).timed_out() && !slot.arrived {
                return None;
            }
        }
        slot.conn.take()
    }

    /// The handler's service loop, run in its own thread for the process
    /// lifetime.
    pub fn run_loop(self: Arc<Self>) {
        loop {
            let conn = loop {
                match self.wait_for_connection() {
                    Some(conn) => break conn,
                    None => {
                        if self.run.is_shutdown() {
                            self.dispatch.join();
                            return;
                        }
                    }
                }
            };

            self.handle_connection(conn);
            self.done();

            if self.run.is_shutdown() {
                self.dispatch.join();
                return;
            }
        }
    }

    /// Serves DoH requests on one connection until it ends.
    fn handle_connection(&self, conn: Conn) {
        let peer = match conn.peer_addr() {
            Ok(peer) => peer,
            Err(e) => {
                debug!(error = %e, "peer address unavailable");
                return;
            }
        };
        let protocol = match conn.protocol() {
            Ok(protocol) => protocol,
            Err(e) => {
                debug!(error = %e, client = %peer, "protocol selection failed");
                return;
            }
        };
        let mut http = match HttpConn::new(Usage::Doh, protocol, conn, self.client_timeout) {
            Ok(http) => http,
            Err(e) => {
                debug!(error = %e, client = %peer, "DoH connection setup failed");
                return;
            }
        };

        loop {
            let request = match http.read_request() {
                Ok(request) => request,
                Err(HttpError::Timeout) | Err(HttpError::Eof) => return,
                Err(e) => {
                    if let Some(status) = e.status() {
                        let response = HttpResponse::error(0, status, &e.to_string());
                        let _ = http.write_response(&response);
                    }
                    debug!(error = %e, client = %peer, "bad DoH request");
                    return;
                }
            };
            trace!(client = %peer, method = request.method(), "DoH query received");

            let query = match extract_query(&request) {
                Ok(query) => query,
                Err(response) => {
                    let _ = http.write_response(&response);
                    return;
                }
            };

            let envelope = MessageEnvelope::new(query, peer);
            if !self.dispatch.enqueue(envelope) {
                // Shutdown refusal: discard the query and close.
                return;
            }

            let resolved = loop {
                match self.dispatch.dequeue() {
                    Ok(envelope) => break envelope,
                    Err(_) => {
                        if self.run.is_shutdown() {
                            return;
                        }
                    }
                }
            };

            let body = match resolved.response {
                Some(body) => body,
                None => {
                    warn!(client = %peer, "resolver returned no response");
                    let response = HttpResponse::error(
                        request.stream_id(),
                        Status::INTERNAL_SERVER_ERROR,
                        "resolution failed",
                    );
                    let _ = http.write_response(&response);
                    return;
                }
            };

            let mut response = HttpResponse::with_data(request.stream_id(), Status::OK, body, "");
            response.add_header(
                "cache-control",
                format!("private, max-age={}", resolved.min_ttl),
            );
            if let Err(e) = http.write_response(&response) {
                debug!(error = %e, client = %peer, "failed to write DoH response");
                return;
            }

            if self.run.is_shutdown() {
                return;
            }
        }
    }
}

/// Pulls the raw DNS query out of a DoH request: GET carries it
/// base64url-encoded in the `dns` parameter, POST carries it as the body.
/// Any other method is refused.
fn extract_query(request: &HttpRequest) -> std::result::Result<Bytes, HttpResponse> {
    match request.method() {
        "GET" => match request.url().parameter("dns") {
            Some(encoded) => BASE64URL_NOPAD
                .decode(encoded.as_bytes())
                .map(Bytes::from)
                .map_err(|_| {
                    HttpResponse::error(
                        request.stream_id(),
                        Status::BAD_REQUEST,
                        "invalid base64url in dns parameter",
                    )
                }),
            None => Err(HttpResponse::error(
                request.stream_id(),
                Status::BAD_REQUEST,
                "missing dns parameter",
            )),
        },
        "POST" => Ok(request.payload().clone()),
        _ => Err(HttpResponse::error(
            request.stream_id(),
            Status::METHOD_NOT_ALLOWED,
            "method not allowed",
        )),
    }
}
