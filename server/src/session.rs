//! Per-connection inbound message handling.
//!
//! Each text frame is decoded, validated and turned into a [`GameCommand`] for
//! the driver. Protocol problems are logged and skipped; they never close the
//! connection.

use crate::connections::ConnectionId;
use crate::driver::GameCommand;
use log::{debug, warn};
use pong_shared::{decode_client_message, ClientMessage, CodecError, PlayerId};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not JSON, not an object, or a known type with bad field types.
    Malformed,
    UnknownKind,
    /// `player` outside {1, 2}.
    InvalidPlayer,
    /// The driver has shut down.
    DriverGone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Forwarded(&'static str),
    Ignored(IgnoreReason),
}

pub struct SessionHandler {
    id: ConnectionId,
    commands: mpsc::Sender<GameCommand>,
}

impl SessionHandler {
    pub fn new(id: ConnectionId, commands: mpsc::Sender<GameCommand>) -> Self {
        Self { id, commands }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Handles one inbound text frame.
    pub async fn dispatch(&self, text: &str) -> Dispatch {
        let message = match decode_client_message(text) {
            Ok(message) => message,
            Err(CodecError::UnknownKind(kind)) => {
                warn!("Connection {} sent unknown message type {:?}", self.id, kind);
                return Dispatch::Ignored(IgnoreReason::UnknownKind);
            }
            Err(e) => {
                warn!("Connection {} sent a bad message: {}", self.id, e);
                return Dispatch::Ignored(IgnoreReason::Malformed);
            }
        };

        let kind = message.kind();
        let command = match self.to_command(message) {
            Ok(command) => command,
            Err(reason) => return Dispatch::Ignored(reason),
        };

        if self.commands.send(command).await.is_err() {
            debug!("Driver gone, dropping {} from connection {}", kind, self.id);
            return Dispatch::Ignored(IgnoreReason::DriverGone);
        }
        Dispatch::Forwarded(kind)
    }

    fn to_command(&self, message: ClientMessage) -> Result<GameCommand, IgnoreReason> {
        match message {
            ClientMessage::Reset => Ok(GameCommand::Reset),
            ClientMessage::GetState => Ok(GameCommand::GetState { from: self.id }),
            ClientMessage::Action { player, action } => Ok(GameCommand::SubmitInput {
                player: self.player(player)?,
                action,
            }),
            ClientMessage::Mode { player, mode } => Ok(GameCommand::SetMode {
                from: self.id,
                player: self.player(player)?,
                mode,
            }),
        }
    }

    fn player(&self, raw: i64) -> Result<PlayerId, IgnoreReason> {
        PlayerId::from_wire(raw).ok_or_else(|| {
            warn!("Connection {} named invalid player {}", self.id, raw);
            IgnoreReason::InvalidPlayer
        })
    }
}
