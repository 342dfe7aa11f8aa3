//! Per-slot control mode.

use log::info;
use pong_shared::{ControlMode, PlayerId};

/// Outcome of a mode change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChange {
    Applied(ControlMode),
    /// The requested mode is not one this server understands.
    Ignored,
}

/// Which controller drives each paddle. Read once per tick by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlModeRegistry {
    modes: [ControlMode; 2],
}

impl Default for ControlModeRegistry {
    /// Player 1 starts as a human, player 2 as the bot.
    fn default() -> Self {
        Self::new(ControlMode::Human, ControlMode::Automated)
    }
}

impl ControlModeRegistry {
    pub fn new(player1: ControlMode, player2: ControlMode) -> Self {
        Self {
            modes: [player1, player2],
        }
    }

    pub fn get_mode(&self, player: PlayerId) -> ControlMode {
        self.modes[player.index()]
    }

    /// Applies a wire mode string. Unknown strings leave the slot unchanged.
    pub fn set_mode(&mut self, player: PlayerId, raw_mode: &str) -> ModeChange {
        match ControlMode::parse(raw_mode) {
            Some(mode) => {
                self.modes[player.index()] = mode;
                info!("{} now controlled by {}", player, mode.as_wire());
                ModeChange::Applied(mode)
            }
            None => ModeChange::Ignored,
        }
    }
}
