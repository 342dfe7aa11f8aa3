//! The live game instance and the rules-engine contract it is built on.

use log::info;
use pong_shared::{Action, BallState, PaddleState, PlayerId, StateSnapshot};

/// What a rules engine exposes to controllers each tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Observation {
    pub ball_x: f32,
    pub ball_y: f32,
    pub ball_vx: f32,
    pub ball_vy: f32,
    pub paddle1_y: f32,
    pub paddle2_y: f32,
}

impl Observation {
    pub fn paddle_y(&self, player: PlayerId) -> f32 {
        match player {
            PlayerId::One => self.paddle1_y,
            PlayerId::Two => self.paddle2_y,
        }
    }
}

/// Readable game fields, used to build snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GameView {
    pub ball: BallState,
    pub paddle1_y: f32,
    pub paddle2_y: f32,
    pub score1: u32,
    pub score2: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepInfo {
    /// Set when the step ended a rally.
    pub scored: Option<PlayerId>,
}

/// Result of one engine step. The server only needs the state it leaves
/// behind, the rest is part of the engine's contract.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub observation: Observation,
    pub rewards: [f32; 2],
    pub done: bool,
    pub truncated: bool,
    pub info: StepInfo,
}

/// Ball/paddle kinematics, collisions and scoring.
pub trait RulesEngine: Send {
    fn observe(&self) -> Observation;
    fn step(&mut self, action1: Action, action2: Action) -> StepOutcome;
    fn reset(&mut self);
    fn view(&self) -> GameView;
}

/// The single game instance, owned by the simulation driver.
pub struct GameSession {
    engine: Box<dyn RulesEngine>,
    top_score: u32,
}

impl GameSession {
    pub fn new(engine: Box<dyn RulesEngine>, top_score: u32) -> Self {
        Self { engine, top_score }
    }

    pub fn top_score(&self) -> u32 {
        self.top_score
    }

    /// True once either score has reached the top score.
    pub fn is_done(&self) -> bool {
        let view = self.engine.view();
        view.score1 >= self.top_score || view.score2 >= self.top_score
    }

    pub fn observe(&self) -> Observation {
        self.engine.observe()
    }

    pub fn step(&mut self, action1: Action, action2: Action) -> StepOutcome {
        self.engine.step(action1, action2)
    }

    pub fn reset(&mut self) {
        self.engine.reset();
        info!("Game session reset");
    }

    pub fn view(&self) -> GameView {
        self.engine.view()
    }

    pub fn snapshot(&self, tick: u64) -> StateSnapshot {
        let view = self.engine.view();
        StateSnapshot {
            tick,
            ball: view.ball,
            paddle1: PaddleState { y: view.paddle1_y },
            paddle2: PaddleState { y: view.paddle2_y },
            score1: view.score1,
            score2: view.score2,
            done: view.score1 >= self.top_score || view.score2 >= self.top_score,
        }
    }
}
