//! Wire protocol shared by the Pong server and its clients.
//!
//! Every message is one JSON object carried in a WebSocket text frame and
//! discriminated by its `"type"` field. Inbound messages are decoded leniently:
//! missing fields fall back to the defaults the protocol has always used, and
//! range checks are left to the server so that a sloppy client never loses its
//! connection over a bad value.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const WORLD_WIDTH: f32 = 1280.0;
pub const WORLD_HEIGHT: f32 = 960.0;
pub const PADDLE_WIDTH: f32 = 20.0;
pub const PADDLE_HEIGHT: f32 = 120.0;
pub const PADDLE_SPEED: f32 = 14.0;
pub const BALL_SIZE: f32 = 20.0;
pub const MAX_BALL_SPEED: f32 = 15.0;
/// Physics sub-steps applied per simulation step.
pub const STEP_REPEAT: u32 = 4;
pub const DEFAULT_TOP_SCORE: u32 = 20;

/// Discrete paddle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Action {
    #[default]
    Stay,
    Up,
    Down,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Stay, Action::Up, Action::Down];

    /// Maps a raw wire value to an action, coercing anything out of range to `Stay`.
    pub fn from_wire(raw: i64) -> Action {
        match raw {
            1 => Action::Up,
            2 => Action::Down,
            _ => Action::Stay,
        }
    }

    pub fn as_wire(self) -> u8 {
        match self {
            Action::Stay => 0,
            Action::Up => 1,
            Action::Down => 2,
        }
    }
}

impl From<Action> for u8 {
    fn from(action: Action) -> u8 {
        action.as_wire()
    }
}

impl TryFrom<u8> for Action {
    type Error = String;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Action::Stay),
            1 => Ok(Action::Up),
            2 => Ok(Action::Down),
            other => Err(format!("action {} out of range", other)),
        }
    }
}

/// One of the two controllable paddles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PlayerId {
    One,
    Two,
}

impl PlayerId {
    pub const BOTH: [PlayerId; 2] = [PlayerId::One, PlayerId::Two];

    pub fn from_wire(raw: i64) -> Option<PlayerId> {
        match raw {
            1 => Some(PlayerId::One),
            2 => Some(PlayerId::Two),
            _ => None,
        }
    }

    /// Zero-based slot index.
    pub fn index(self) -> usize {
        match self {
            PlayerId::One => 0,
            PlayerId::Two => 1,
        }
    }

    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }
}

impl From<PlayerId> for u8 {
    fn from(player: PlayerId) -> u8 {
        player.number()
    }
}

impl TryFrom<u8> for PlayerId {
    type Error = String;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        PlayerId::from_wire(raw as i64).ok_or_else(|| format!("player {} out of range", raw))
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "player {}", self.number())
    }
}

/// Who drives a paddle. Automated control is spelled `"ai"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlMode {
    #[serde(rename = "human")]
    Human,
    #[serde(rename = "ai")]
    Automated,
}

impl ControlMode {
    /// Returns `None` for any mode string this protocol version doesn't know.
    pub fn parse(raw: &str) -> Option<ControlMode> {
        match raw {
            "human" => Some(ControlMode::Human),
            "ai" => Some(ControlMode::Automated),
            _ => None,
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            ControlMode::Human => "human",
            ControlMode::Automated => "ai",
        }
    }
}

fn default_player() -> i64 {
    1
}

/// Accepts any JSON number for `action`. Integers outside the action range,
/// fractions and values too large for `i64` all become `Stay`.
fn lenient_action<'de, D>(deserializer: D) -> Result<Action, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => Ok(number.as_i64().map(Action::from_wire).unwrap_or_default()),
        Value::Null => Ok(Action::Stay),
        other => Err(serde::de::Error::custom(format!(
            "action must be a number, got {}",
            other
        ))),
    }
}

fn default_mode() -> String {
    ControlMode::Human.as_wire().to_string()
}

/// Messages sent from a client to the server.
///
/// `player` and `mode` are kept raw here; the server validates them so that
/// bad values can be ignored instead of failing the whole message. `action`
/// is coerced while decoding: any number that is not 0, 1 or 2 reads as `Stay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Reset,
    Action {
        #[serde(default = "default_player")]
        player: i64,
        #[serde(default, deserialize_with = "lenient_action")]
        action: Action,
    },
    Mode {
        #[serde(default = "default_player")]
        player: i64,
        #[serde(default = "default_mode")]
        mode: String,
    },
    GetState,
}

impl ClientMessage {
    pub const KINDS: [&'static str; 4] = ["reset", "action", "mode", "get_state"];

    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Reset => "reset",
            ClientMessage::Action { .. } => "action",
            ClientMessage::Mode { .. } => "mode",
            ClientMessage::GetState => "get_state",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BallState {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PaddleState {
    pub y: f32,
}

/// Immutable projection of the game at one tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Driver tick the snapshot was taken at. Never decreases on a connection.
    pub tick: u64,
    pub ball: BallState,
    pub paddle1: PaddleState,
    pub paddle2: PaddleState,
    pub score1: u32,
    pub score2: u32,
    pub done: bool,
}

/// Messages sent from the server to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    State(StateSnapshot),
    /// Acknowledges a mode change to the client that requested it.
    Mode { player: PlayerId, mode: ControlMode },
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message has no string \"type\" field")]
    MissingKind,
    #[error("unknown message type {0:?}")]
    UnknownKind(String),
}

/// Decodes one inbound text frame.
///
/// Unknown `"type"` values are reported separately from unparseable payloads
/// so the server can log them distinctly.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    let kind = match &value {
        Value::Object(map) => match map.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            _ => return Err(CodecError::MissingKind),
        },
        _ => return Err(CodecError::NotAnObject),
    };

    if !ClientMessage::KINDS.contains(&kind.as_str()) {
        return Err(CodecError::UnknownKind(kind));
    }

    Ok(serde_json::from_value(value)?)
}

pub fn encode_client_message(message: &ClientMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

pub fn encode_server_message(message: &ServerMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode_server_message(text: &str) -> Result<ServerMessage, CodecError> {
    Ok(serde_json::from_str(text)?)
}
