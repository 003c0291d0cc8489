//! The resolver contract.
//!
//! DNS resolution is an external collaborator: the server only moves raw
//! message bytes in and out of it. [`MessageEnvelope`] is the unit of work
//! exchanged through the dispatch pool; [`ResolveWorker`] adapts a
//! [`Resolver`] to the pool's worker interface.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use strand_core::Worker;

/// A DNS query (and later its response) paired with the client it came
/// from.
#[derive(Debug, Clone)]
pub struct MessageEnvelope {
    /// Raw DNS query bytes.
    pub query: Bytes,

    /// Originating client endpoint.
    pub peer: SocketAddr,

    /// Raw response bytes, set by the resolver.
    pub response: Option<Bytes>,

    /// Minimum TTL across the response's answers, for cache-control.
    pub min_ttl: u32,
}

impl MessageEnvelope {
    /// A fresh, unresolved envelope.
    pub fn new(query: Bytes, peer: SocketAddr) -> Self {
        Self {
            query,
            peer,
            response: None,
            min_ttl: 0,
        }
    }
}

/// Resolves DNS messages. Implementations live outside this crate.
pub trait Resolver: Send + Sync {
    /// Consumes an envelope and returns it with `response` and `min_ttl`
    /// filled in.
    fn resolve(&self, envelope: MessageEnvelope) -> MessageEnvelope;
}

/// Adapts a [`Resolver`] to the dispatch pool's worker interface.
pub struct ResolveWorker {
    resolver: Arc<dyn Resolver>,
}

impl ResolveWorker {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self { resolver }
    }
}

impl Worker<MessageEnvelope> for ResolveWorker {
    fn process(&mut self, envelope: MessageEnvelope) -> MessageEnvelope {
        self.resolver.resolve(envelope)
    }
}

/// Echoes the query back as the response with a zero TTL. Stands in for a
/// real resolver in tests and unwired deployments.
pub struct LoopbackResolver;

impl Resolver for LoopbackResolver {
    fn resolve(&self, mut envelope: MessageEnvelope) -> MessageEnvelope {
        envelope.response = Some(envelope.query.clone());
        envelope.min_ttl = 0;
        envelope
    }
}
