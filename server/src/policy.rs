//! Automated paddle controllers.

use crate::game::Observation;
use pong_shared::{Action, PlayerId, BALL_SIZE, PADDLE_HEIGHT};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Maps an observation to a discrete action for one paddle.
pub trait Policy: Send {
    fn name(&self) -> &str;

    /// `evaluation` disables any exploration the policy would otherwise do.
    fn decide(&mut self, observation: &Observation, player: PlayerId, evaluation: bool) -> Action;
}

/// Keeps the paddle center level with the ball center.
pub struct TrackingPolicy {
    dead_zone: f32,
    exploration: f64,
    rng: StdRng,
}

impl TrackingPolicy {
    pub const DEFAULT_DEAD_ZONE: f32 = 10.0;
    pub const DEFAULT_EXPLORATION: f64 = 0.05;

    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            dead_zone: Self::DEFAULT_DEAD_ZONE,
            exploration: Self::DEFAULT_EXPLORATION,
            rng,
        }
    }

    pub fn with_dead_zone(mut self, dead_zone: f32) -> Self {
        self.dead_zone = dead_zone;
        self
    }

    pub fn with_exploration(mut self, exploration: f64) -> Self {
        self.exploration = exploration.clamp(0.0, 1.0);
        self
    }
}

impl Policy for TrackingPolicy {
    fn name(&self) -> &str {
        "tracking"
    }

    fn decide(&mut self, observation: &Observation, player: PlayerId, evaluation: bool) -> Action {
        if !evaluation && self.rng.gen_bool(self.exploration) {
            return *Action::ALL.choose(&mut self.rng).unwrap_or(&Action::Stay);
        }

        let paddle_center = observation.paddle_y(player) + PADDLE_HEIGHT / 2.0;
        let ball_center = observation.ball_y + BALL_SIZE / 2.0;
        let offset = ball_center - paddle_center;

        if offset < -self.dead_zone {
            Action::Up
        } else if offset > self.dead_zone {
            Action::Down
        } else {
            Action::Stay
        }
    }
}
