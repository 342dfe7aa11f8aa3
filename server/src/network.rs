//! Server network layer handling WebSocket connections
//!
//! Every accepted socket gets two tasks: a writer draining a bounded outbound
//! queue into the socket, and a reader forwarding decoded client messages to
//! the simulation driver. The writer queue doubles as the connection's
//! [`ConnectionSink`], so the driver never waits on a slow socket.

use crate::connections::{Connection, ConnectionId, ConnectionRegistry, ConnectionSink, DeliveryError};
use crate::driver::GameCommand;
use crate::error::ServerError;
use crate::session::{Dispatch, IgnoreReason, SessionHandler};
use futures_util::{SinkExt, Stream, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::{accept_async, tungstenite::Message};

impl ConnectionSink for mpsc::Sender<Message> {
    fn try_send_text(&self, text: &str) -> Result<(), DeliveryError> {
        self.try_send(Message::Text(text.to_string()))
            .map_err(|e| match e {
                TrySendError::Full(_) => DeliveryError::Full,
                TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }

    fn is_closed(&self) -> bool {
        mpsc::Sender::is_closed(self)
    }
}

/// Accepts WebSocket clients and wires them to the driver
pub struct WebSocketServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl WebSocketServer {
    pub async fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;
        info!("Server listening on ws://{}", local_addr);

        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept loop. Returns once the driver's command channel has closed.
    pub async fn run(
        self,
        registry: Arc<ConnectionRegistry>,
        commands: mpsc::Sender<GameCommand>,
        outbound_capacity: usize,
    ) -> Result<(), ServerError> {
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("{}", ServerError::Accept(e));
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            if commands.is_closed() {
                info!("Driver stopped, no longer accepting connections");
                return Ok(());
            }

            debug!("TCP connection from {}", addr);
            tokio::spawn(handle_connection(
                stream,
                addr,
                Arc::clone(&registry),
                commands.clone(),
                outbound_capacity.max(1),
            ));
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    commands: mpsc::Sender<GameCommand>,
    outbound_capacity: usize,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, ServerError::from(e));
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (outbound, mut outbound_rx) = mpsc::channel::<Message>(outbound_capacity);

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if let Err(e) = ws_sender.send(message).await {
                debug!("Write to {} failed: {}", addr, e);
                break;
            }
        }
    });

    let id = registry.allocate_id();
    let sink: Arc<dyn ConnectionSink> = Arc::new(outbound);
    let join = GameCommand::Join {
        connection: Connection::new(id, addr, sink),
    };
    if commands.send(join).await.is_err() {
        warn!("Driver gone, closing connection from {}", addr);
        writer.abort();
        return;
    }
    info!("Client {} connected from {}", id, addr);

    let handler = SessionHandler::new(id, commands);
    read_loop(&handler, &mut ws_receiver, addr).await;

    registry.unregister(id);
    writer.abort();
    info!("Client {} disconnected", id);
}

async fn read_loop<S>(handler: &SessionHandler, ws_receiver: &mut S, addr: SocketAddr)
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let id: ConnectionId = handler.id();
    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Dispatch::Ignored(IgnoreReason::DriverGone) = handler.dispatch(&text).await {
                    break;
                }
            }
            Ok(Message::Binary(data)) => {
                debug!("Ignoring {} byte binary frame from client {}", data.len(), id);
            }
            Ok(Message::Close(_)) => {
                debug!("Client {} at {} sent close", id, addr);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket error for client {} at {}: {}", id, addr, e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sender_sink_maps_queue_state() {
        let (tx, mut rx) = mpsc::channel::<Message>(1);

        assert_eq!(tx.try_send_text("a"), Ok(()));
        assert_eq!(tx.try_send_text("b"), Err(DeliveryError::Full));
        assert_eq!(rx.recv().await, Some(Message::Text("a".to_string())));
        assert!(!ConnectionSink::is_closed(&tx));

        drop(rx);
        assert!(ConnectionSink::is_closed(&tx));
        assert_eq!(tx.try_send_text("c"), Err(DeliveryError::Closed));
    }

    #[tokio::test]
    async fn test_bind_reports_local_addr() {
        let server = WebSocketServer::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_an_error() {
        let first = WebSocketServer::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let result = WebSocketServer::bind(first.local_addr()).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }
}
