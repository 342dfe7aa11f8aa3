//! Server configuration.

use pong_shared::DEFAULT_TOP_SCORE;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Which automated controller backs `ai` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyKind {
    #[default]
    Tracking,
    /// No policy loaded; automated slots hold still.
    None,
}

impl FromStr for PolicyKind {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "tracking" => Ok(PolicyKind::Tracking),
            "none" => Ok(PolicyKind::None),
            other => Err(ConfigError::UnknownPolicy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("tick rate must be at least 1 Hz")]
    ZeroTickRate,
    #[error("broadcast interval must be at least 1 tick")]
    ZeroBroadcastInterval,
    #[error("top score must be at least 1")]
    ZeroTopScore,
    #[error("outbound capacity must be at least 1 message")]
    ZeroOutboundCapacity,
    #[error("command capacity must be at least 1 command")]
    ZeroCommandCapacity,
    #[error("unknown policy {0:?}, expected \"tracking\" or \"none\"")]
    UnknownPolicy(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Simulation steps per second.
    pub tick_rate: u32,
    /// A regular snapshot goes out every this many ticks.
    pub broadcast_interval: u64,
    pub top_score: u32,
    /// Messages a connection may have queued before it starts missing snapshots.
    pub outbound_capacity: usize,
    pub command_capacity: usize,
    /// Seeds the engine and policy RNGs when set.
    pub seed: Option<u64>,
    pub policy: PolicyKind,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8765)),
            tick_rate: 60,
            broadcast_interval: 2,
            top_score: DEFAULT_TOP_SCORE,
            outbound_capacity: 4,
            command_capacity: 1000,
            seed: None,
            policy: PolicyKind::Tracking,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.broadcast_interval == 0 {
            return Err(ConfigError::ZeroBroadcastInterval);
        }
        if self.top_score == 0 {
            return Err(ConfigError::ZeroTopScore);
        }
        if self.outbound_capacity == 0 {
            return Err(ConfigError::ZeroOutboundCapacity);
        }
        if self.command_capacity == 0 {
            return Err(ConfigError::ZeroCommandCapacity);
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate.max(1)))
    }
}
