//! Live connection tracking and snapshot fan-out
//!
//! This module owns the only collection shared between the simulation driver
//! and the per-connection tasks:
//! - Connection registration with an immediate catch-up snapshot
//! - Idempotent removal from either side
//! - Broadcast over a stable copy of the membership, with per-connection
//!   failure isolation
//!
//! Delivery never blocks and never retries. A connection whose outbound queue
//! is full simply misses that message; the next snapshot supersedes it. A
//! connection whose queue is closed is dropped from the registry.

use log::{debug, error, info, warn};
use pong_shared::{encode_server_message, CodecError, ServerMessage, StateSnapshot};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use thiserror::Error;

pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("outbound queue is full")]
    Full,
    #[error("connection is closed")]
    Closed,
    #[error("no such connection")]
    UnknownConnection,
    #[error("message could not be encoded")]
    Encode,
}

impl From<CodecError> for DeliveryError {
    fn from(_: CodecError) -> Self {
        DeliveryError::Encode
    }
}

/// Outbound half of a connection, as seen by the server core.
///
/// Implementations must not block: a message that cannot be queued right away
/// is reported as `Full`.
pub trait ConnectionSink: Send + Sync {
    fn try_send_text(&self, text: &str) -> Result<(), DeliveryError>;
    fn is_closed(&self) -> bool;
}

/// A registered client connection
pub struct Connection {
    /// Unique id assigned at handshake
    pub id: ConnectionId,
    /// Peer address, for logging
    pub addr: SocketAddr,
    pub connected_at: Instant,
    sink: Arc<dyn ConnectionSink>,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr, sink: Arc<dyn ConnectionSink>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            sink,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }

    fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        if self.sink.is_closed() {
            return Err(DeliveryError::Closed);
        }
        self.sink.try_send_text(text)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Per-broadcast delivery counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Skipped because the connection's queue was full.
    pub dropped: usize,
    /// Connections that failed and were unregistered.
    pub removed: Vec<ConnectionId>,
}

/// Registry of live connections.
///
/// Shared behind an `Arc` by the driver and every connection task. The lock is
/// only ever held for map operations, never while delivering.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    next_id: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, Connection>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, Connection>> {
        self.connections.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands out the id for a connection that just completed its handshake.
    pub fn allocate_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Adds a connection and sends it `snapshot` before it sees any broadcast.
    ///
    /// A connection that is already closed is not kept.
    pub fn register(
        &self,
        connection: Connection,
        snapshot: &StateSnapshot,
    ) -> Result<(), DeliveryError> {
        let text = encode_state(snapshot)?;
        let id = connection.id;
        let addr = connection.addr;

        match connection.deliver(&text) {
            Err(DeliveryError::Closed) => {
                debug!("Connection {} closed before registration", id);
                return Err(DeliveryError::Closed);
            }
            Err(e) => debug!("Catch-up snapshot for connection {} skipped: {}", id, e),
            Ok(()) => {}
        }

        let total = {
            let mut connections = self.write();
            connections.insert(id, connection);
            connections.len()
        };
        info!(
            "Connection {} registered from {} ({} connected)",
            id, addr, total
        );
        Ok(())
    }

    /// Removes a connection. Returns false if it was already gone.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.write().remove(&id);
        match removed {
            Some(connection) => {
                info!(
                    "Connection {} from {} unregistered after {:.1}s",
                    id,
                    connection.addr,
                    connection.connected_at.elapsed().as_secs_f32()
                );
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.read().contains_key(&id)
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Stable copy of the current membership, in id order.
    fn members(&self) -> Vec<(ConnectionId, Arc<dyn ConnectionSink>)> {
        let mut members: Vec<(ConnectionId, Arc<dyn ConnectionSink>)> = self
            .read()
            .values()
            .map(|connection| (connection.id, Arc::clone(&connection.sink)))
            .collect();
        members.sort_unstable_by_key(|(id, _)| *id);
        members
    }

    /// Sends one snapshot to every registered connection.
    pub fn broadcast(&self, snapshot: &StateSnapshot) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let members = self.members();
        if members.is_empty() {
            return report;
        }

        let text = match encode_state(snapshot) {
            Ok(text) => text,
            Err(_) => return report,
        };

        for (id, sink) in members {
            let result = if sink.is_closed() {
                Err(DeliveryError::Closed)
            } else {
                sink.try_send_text(&text)
            };

            match result {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::Full) => {
                    debug!("Connection {} is behind, snapshot {} dropped", id, snapshot.tick);
                    report.dropped += 1;
                }
                Err(e) => {
                    warn!("Broadcast to connection {} failed: {}", id, e);
                    report.removed.push(id);
                }
            }
        }

        for id in &report.removed {
            self.unregister(*id);
        }

        report
    }

    /// Sends a reply to a single connection.
    pub fn send_to(&self, id: ConnectionId, message: &ServerMessage) -> Result<(), DeliveryError> {
        let sink = match self.read().get(&id) {
            Some(connection) => Arc::clone(&connection.sink),
            None => return Err(DeliveryError::UnknownConnection),
        };

        let text = encode_server_message(message).map_err(|e| {
            error!("Failed to encode reply for connection {}: {}", id, e);
            DeliveryError::from(e)
        })?;

        let result = if sink.is_closed() {
            Err(DeliveryError::Closed)
        } else {
            sink.try_send_text(&text)
        };

        match result {
            Err(DeliveryError::Closed) => {
                warn!("Reply to connection {} failed, connection closed", id);
                self.unregister(id);
            }
            Err(DeliveryError::Full) => {
                debug!("Reply to connection {} dropped, queue full", id);
            }
            _ => {}
        }

        result
    }
}

fn encode_state(snapshot: &StateSnapshot) -> Result<String, DeliveryError> {
    encode_server_message(&ServerMessage::State(snapshot.clone())).map_err(|e| {
        error!("Failed to encode snapshot {}: {}", snapshot.tick, e);
        DeliveryError::from(e)
    })
}
