//! Resolves the authoritative action for each paddle.
//!
//! Human slots replay their latest submitted action every tick until a new one
//! arrives; nothing is consumed on read. Automated slots ask the policy, and
//! fall back to `Stay` when no policy is loaded.

use crate::game::Observation;
use crate::policy::Policy;
use log::warn;
use pong_shared::{Action, ControlMode, PlayerId};

/// Degraded decisions are logged on the first one and then every this many.
const DEGRADED_LOG_EVERY: u64 = 300;

/// Explicit record for one paddle's human input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayerSlot {
    pub pending_action: Action,
}

pub struct InputRouter {
    slots: [PlayerSlot; 2],
    policy: Option<Box<dyn Policy>>,
    degraded_decisions: u64,
}

impl InputRouter {
    pub fn new(policy: Option<Box<dyn Policy>>) -> Self {
        Self {
            slots: [PlayerSlot::default(); 2],
            policy,
            degraded_decisions: 0,
        }
    }

    pub fn has_policy(&self) -> bool {
        self.policy.is_some()
    }

    /// Replaces the pending action for `player`. Wire values are already
    /// coerced to an `Action` by the codec.
    pub fn submit_input(&mut self, player: PlayerId, action: Action) {
        self.slots[player.index()].pending_action = action;
    }

    pub fn pending_action(&self, player: PlayerId) -> Action {
        self.slots[player.index()].pending_action
    }

    pub fn resolve_action(
        &mut self,
        player: PlayerId,
        mode: ControlMode,
        observation: &Observation,
    ) -> Action {
        match mode {
            ControlMode::Human => self.pending_action(player),
            ControlMode::Automated => match self.policy.as_mut() {
                Some(policy) => policy.decide(observation, player, true),
                None => {
                    self.degraded_decisions += 1;
                    if self.degraded_decisions % DEGRADED_LOG_EVERY == 1 {
                        warn!(
                            "No automated policy loaded, {} held still ({} degraded decisions so far)",
                            player, self.degraded_decisions
                        );
                    }
                    Action::Stay
                }
            },
        }
    }

    pub fn degraded_decisions(&self) -> u64 {
        self.degraded_decisions
    }
}
