//! Default Pong rules engine.
//!
//! Positions are top-left corners in pixels. Velocities are whole pixels per
//! sub-step and the ball is advanced one pixel at a time so it cannot tunnel
//! through a paddle. Player 1 defends the right edge, player 2 the left.

use crate::game::{GameView, Observation, RulesEngine, StepInfo, StepOutcome};
use pong_shared::{
    Action, BallState, PlayerId, BALL_SIZE, MAX_BALL_SPEED, PADDLE_HEIGHT, PADDLE_SPEED,
    PADDLE_WIDTH, STEP_REPEAT, WORLD_HEIGHT, WORLD_WIDTH,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const SERVE_SPEEDS: [f32; 3] = [4.0, 5.0, 6.0];
const SERVE_VERTICAL_SPEEDS: [f32; 6] = [-3.0, -2.0, -1.0, 1.0, 2.0, 3.0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paddle {
    pub x: f32,
    pub y: f32,
}

impl Paddle {
    fn new(x: f32) -> Self {
        Self {
            x,
            y: WORLD_HEIGHT / 2.0 - PADDLE_HEIGHT / 2.0,
        }
    }

    /// Moves by one paddle step unless that would leave the field.
    pub fn apply(&mut self, action: Action) {
        let new_y = match action {
            Action::Stay => return,
            Action::Up => self.y - PADDLE_SPEED,
            Action::Down => self.y + PADDLE_SPEED,
        };

        if (0.0..=WORLD_HEIGHT - PADDLE_HEIGHT).contains(&new_y) {
            self.y = new_y;
        }
    }

    /// AABB overlap with a ball whose top-left corner is at (x, y).
    pub fn overlaps(&self, x: f32, y: f32) -> bool {
        x < self.x + PADDLE_WIDTH
            && x + BALL_SIZE > self.x
            && y < self.y + PADDLE_HEIGHT
            && y + BALL_SIZE > self.y
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    last_serve_left: bool,
}

pub struct PongEngine {
    pub paddle1: Paddle,
    pub paddle2: Paddle,
    pub ball: Ball,
    pub score1: u32,
    pub score2: u32,
    top_score: u32,
    rng: StdRng,
}

impl PongEngine {
    /// Creates a fresh game. A seed makes serves reproducible.
    pub fn new(top_score: u32, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let last_serve_left = rng.gen_bool(0.5);

        let mut engine = Self {
            paddle1: Paddle::new(WORLD_WIDTH - 2.0 * (WORLD_WIDTH / 64.0)),
            paddle2: Paddle::new(WORLD_WIDTH / 64.0),
            ball: Ball {
                x: 0.0,
                y: 0.0,
                vx: 0.0,
                vy: 0.0,
                last_serve_left,
            },
            score1: 0,
            score2: 0,
            top_score,
            rng,
        };
        engine.serve();
        engine
    }

    /// Puts the ball back in the middle, alternating the serve direction.
    fn serve(&mut self) {
        let speed = *SERVE_SPEEDS.choose(&mut self.rng).unwrap_or(&SERVE_SPEEDS[0]);
        let vy = *SERVE_VERTICAL_SPEEDS
            .choose(&mut self.rng)
            .unwrap_or(&SERVE_VERTICAL_SPEEDS[0]);

        self.ball.last_serve_left = !self.ball.last_serve_left;
        self.ball.x = WORLD_WIDTH / 2.0;
        self.ball.y = WORLD_HEIGHT / 2.0;
        self.ball.vx = if self.ball.last_serve_left { -speed } else { speed };
        self.ball.vy = vy;
    }

    fn jitter(&mut self) -> f32 {
        if self.rng.gen_bool(0.5) {
            -1.0
        } else {
            1.0
        }
    }

    fn hits_paddle(&self, x: f32, y: f32) -> bool {
        self.paddle1.overlaps(x, y) || self.paddle2.overlaps(x, y)
    }

    /// Advances the ball by one sub-step, vertical axis first.
    fn move_ball(&mut self) {
        let x_step = if self.ball.vx > 0.0 { 1.0 } else { -1.0 };
        let y_step = if self.ball.vy > 0.0 { 1.0 } else { -1.0 };
        let mut new_x = self.ball.x;
        let mut new_y = self.ball.y;

        // A ball already inside a paddle is let through so it can escape.
        let early_collision = self.hits_paddle(self.ball.x, self.ball.y);

        for _ in 0..self.ball.vy.abs() as u32 {
            new_y += y_step;

            if !early_collision && (new_y < 0.0 || new_y > WORLD_HEIGHT - BALL_SIZE) {
                let jitter = self.jitter();
                self.ball.vy = (-self.ball.vy + jitter).clamp(-MAX_BALL_SPEED, MAX_BALL_SPEED);
                break;
            }

            if self.hits_paddle(new_x, new_y) {
                let jitter = self.jitter();
                self.ball.vy = (self.ball.vy + jitter).clamp(-MAX_BALL_SPEED, MAX_BALL_SPEED);
                break;
            }
        }

        for _ in 0..self.ball.vx.abs() as u32 {
            new_x += x_step;

            if !early_collision && self.hits_paddle(new_x, new_y) {
                let jitter = self.jitter();
                self.ball.vx = (-(self.ball.vx + x_step)).clamp(-MAX_BALL_SPEED, MAX_BALL_SPEED);
                self.ball.vy = (self.ball.vy + jitter).clamp(-MAX_BALL_SPEED, MAX_BALL_SPEED);
                break;
            }
        }

        self.ball.x = new_x;
        self.ball.y = new_y;
    }

    fn check_score(&mut self) -> Option<PlayerId> {
        let center = self.ball.x + BALL_SIZE / 2.0;
        let scorer = if center < 0.0 {
            self.score1 += 1;
            PlayerId::One
        } else if center > WORLD_WIDTH {
            self.score2 += 1;
            PlayerId::Two
        } else {
            return None;
        };

        self.serve();
        Some(scorer)
    }
}

impl RulesEngine for PongEngine {
    fn observe(&self) -> Observation {
        Observation {
            ball_x: self.ball.x,
            ball_y: self.ball.y,
            ball_vx: self.ball.vx,
            ball_vy: self.ball.vy,
            paddle1_y: self.paddle1.y,
            paddle2_y: self.paddle2.y,
        }
    }

    fn step(&mut self, action1: Action, action2: Action) -> StepOutcome {
        for _ in 0..STEP_REPEAT {
            self.paddle1.apply(action1);
            self.paddle2.apply(action2);
            self.move_ball();
        }

        let scored = self.check_score();
        let rewards = match scored {
            Some(PlayerId::One) => [1.0, -1.0],
            Some(PlayerId::Two) => [-1.0, 1.0],
            None => [0.0, 0.0],
        };

        StepOutcome {
            observation: self.observe(),
            rewards,
            done: self.score1 >= self.top_score || self.score2 >= self.top_score,
            truncated: false,
            info: StepInfo { scored },
        }
    }

    fn reset(&mut self) {
        self.paddle1 = Paddle::new(self.paddle1.x);
        self.paddle2 = Paddle::new(self.paddle2.x);
        self.score1 = 0;
        self.score2 = 0;
        self.serve();
    }

    fn view(&self) -> GameView {
        GameView {
            ball: BallState {
                x: self.ball.x,
                y: self.ball.y,
                vx: self.ball.vx,
                vy: self.ball.vy,
            },
            paddle1_y: self.paddle1.y,
            paddle2_y: self.paddle2.y,
            score1: self.score1,
            score2: self.score2,
        }
    }
}
