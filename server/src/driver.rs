//! Fixed-rate authoritative simulation loop
//!
//! The driver is the single owner of the game session, the control modes and
//! the pending human inputs. Connection tasks never touch them directly: they
//! send [`GameCommand`]s, which the driver applies while it waits for the next
//! tick boundary. Commands are therefore applied in arrival order, strictly
//! between ticks, and a mode change takes effect on the following tick.
//!
//! ## Tick
//! 1. If either score has reached the top score the driver holds: no step is
//!    taken but snapshots keep flowing. Only a reset leaves this state.
//! 2. Otherwise both actions are resolved and the engine steps once.
//! 3. The tick counter advances; every `broadcast_interval` ticks a snapshot
//!    is fanned out to all connections.
//! 4. The driver sleeps out the rest of the tick period. An overrun starts the
//!    next tick immediately without trying to catch up.

use crate::config::{PolicyKind, ServerConfig};
use crate::connections::{Connection, ConnectionId, ConnectionRegistry};
use crate::control_mode::{ControlModeRegistry, ModeChange};
use crate::game::GameSession;
use crate::input_router::InputRouter;
use crate::physics::PongEngine;
use crate::policy::{Policy, TrackingPolicy};
use log::{debug, info, warn};
use pong_shared::{Action, PlayerId, ServerMessage, StateSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Ticks between periodic stats lines.
const STATS_LOG_EVERY: u64 = 300;

/// Requests from connection tasks, applied by the driver between ticks.
#[derive(Debug)]
pub enum GameCommand {
    /// A connection finished its handshake and wants snapshots.
    Join { connection: Connection },
    Reset,
    /// Latest action for a human-controlled paddle.
    SubmitInput { player: PlayerId, action: Action },
    /// Raw wire mode; the ack goes back to `from` only if the mode was applied.
    SetMode {
        from: ConnectionId,
        player: PlayerId,
        mode: String,
    },
    GetState { from: ConnectionId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Stopped,
    Running,
    /// Game over: snapshots continue, stepping does not.
    TerminalHold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The driver is stopped; nothing happened.
    Idle,
    Stepped { broadcast: bool },
    Held { broadcast: bool },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub ticks: u64,
    pub steps: u64,
    pub held_ticks: u64,
    /// Regular, interval-driven broadcasts.
    pub broadcasts: u64,
    /// Out-of-band broadcasts forced by resets.
    pub reset_broadcasts: u64,
    pub resets: u64,
    pub degraded_decisions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    pub tick_period: Duration,
    pub broadcast_interval: u64,
}

impl From<&ServerConfig> for DriverConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            tick_period: config.tick_period(),
            broadcast_interval: config.broadcast_interval,
        }
    }
}

pub struct SimulationDriver {
    session: GameSession,
    modes: ControlModeRegistry,
    router: InputRouter,
    registry: Arc<ConnectionRegistry>,
    config: DriverConfig,
    state: DriverState,
    tick: u64,
    stats: DriverStats,
}

impl SimulationDriver {
    pub fn new(
        session: GameSession,
        router: InputRouter,
        registry: Arc<ConnectionRegistry>,
        config: DriverConfig,
    ) -> Self {
        Self {
            session,
            modes: ControlModeRegistry::default(),
            router,
            registry,
            config: DriverConfig {
                broadcast_interval: config.broadcast_interval.max(1),
                ..config
            },
            state: DriverState::Stopped,
            tick: 0,
            stats: DriverStats::default(),
        }
    }

    /// Builds a driver running the default Pong engine and the configured policy.
    pub fn from_config(config: &ServerConfig, registry: Arc<ConnectionRegistry>) -> Self {
        let engine = PongEngine::new(config.top_score, config.seed);
        let policy: Option<Box<dyn Policy>> = match config.policy {
            PolicyKind::Tracking => Some(Box::new(TrackingPolicy::new(config.seed))),
            PolicyKind::None => None,
        };
        match &policy {
            Some(policy) => info!("Automated slots use the {} policy", policy.name()),
            None => warn!("No automated policy loaded, ai slots will hold still"),
        }

        Self::new(
            GameSession::new(Box::new(engine), config.top_score),
            InputRouter::new(policy),
            registry,
            DriverConfig::from(config),
        )
    }

    pub fn with_modes(mut self, modes: ControlModeRegistry) -> Self {
        self.modes = modes;
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn modes(&self) -> &ControlModeRegistry {
        &self.modes
    }

    pub fn router(&self) -> &InputRouter {
        &self.router
    }

    pub fn stats(&self) -> DriverStats {
        DriverStats {
            degraded_decisions: self.router.degraded_decisions(),
            ..self.stats.clone()
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.session.snapshot(self.tick)
    }

    pub fn start(&mut self) {
        if self.state == DriverState::Stopped {
            self.state = DriverState::Running;
            info!(
                "Simulation started: {:.1} Hz, broadcasting every {} ticks",
                1.0 / self.config.tick_period.as_secs_f64(),
                self.config.broadcast_interval
            );
        }
    }

    pub fn stop(&mut self) {
        if self.state != DriverState::Stopped {
            self.state = DriverState::Stopped;
            info!("Simulation stopped after {} ticks", self.tick);
        }
    }

    /// Runs one tick without sleeping. A stopped driver does nothing.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state == DriverState::Stopped {
            return TickOutcome::Idle;
        }

        let stepped = if self.session.is_done() {
            if self.state != DriverState::TerminalHold {
                let view = self.session.view();
                info!(
                    "Top score {} reached ({}-{}), holding until reset",
                    self.session.top_score(),
                    view.score1,
                    view.score2
                );
            }
            self.state = DriverState::TerminalHold;
            self.stats.held_ticks += 1;
            false
        } else {
            self.state = DriverState::Running;
            self.step();
            true
        };

        self.tick += 1;
        self.stats.ticks += 1;

        let broadcast = self.tick % self.config.broadcast_interval == 0;
        if broadcast {
            self.registry.broadcast(&self.snapshot());
            self.stats.broadcasts += 1;
        }

        if self.tick % STATS_LOG_EVERY == 0 {
            let view = self.session.view();
            debug!(
                "Tick {}: {} connections, score {}-{}, {} degraded decisions",
                self.tick,
                self.registry.len(),
                view.score1,
                view.score2,
                self.router.degraded_decisions()
            );
        }

        if stepped {
            TickOutcome::Stepped { broadcast }
        } else {
            TickOutcome::Held { broadcast }
        }
    }

    fn step(&mut self) {
        let observation = self.session.observe();
        let action1 =
            self.router
                .resolve_action(PlayerId::One, self.modes.get_mode(PlayerId::One), &observation);
        let action2 =
            self.router
                .resolve_action(PlayerId::Two, self.modes.get_mode(PlayerId::Two), &observation);

        let outcome = self.session.step(action1, action2);
        self.stats.steps += 1;

        if let Some(scorer) = outcome.info.scored {
            let view = self.session.view();
            debug!("{} scored ({}-{})", scorer, view.score1, view.score2);
        }
    }

    /// Restarts the game and pushes the fresh state to every connection at once.
    pub fn reset(&mut self) {
        self.session.reset();
        self.stats.resets += 1;
        if self.state == DriverState::TerminalHold {
            self.state = DriverState::Running;
        }

        let report = self.registry.broadcast(&self.snapshot());
        self.stats.reset_broadcasts += 1;
        debug!(
            "Reset broadcast delivered to {} connections ({} dropped, {} removed)",
            report.delivered,
            report.dropped,
            report.removed.len()
        );
    }

    pub fn handle_command(&mut self, command: GameCommand) {
        match command {
            GameCommand::Join { connection } => {
                let id = connection.id;
                if let Err(e) = self.registry.register(connection, &self.snapshot()) {
                    debug!("Connection {} not registered: {}", id, e);
                }
            }
            GameCommand::Reset => self.reset(),
            GameCommand::SubmitInput { player, action } => {
                self.router.submit_input(player, action);
            }
            GameCommand::SetMode { from, player, mode } => {
                match self.modes.set_mode(player, &mode) {
                    ModeChange::Applied(mode) => {
                        let ack = ServerMessage::Mode { player, mode };
                        if let Err(e) = self.registry.send_to(from, &ack) {
                            debug!("Mode ack to connection {} not delivered: {}", from, e);
                        }
                    }
                    ModeChange::Ignored => {
                        warn!(
                            "Connection {} requested unsupported mode {:?} for {}, ignoring",
                            from, mode, player
                        );
                    }
                }
            }
            GameCommand::GetState { from } => {
                let reply = ServerMessage::State(self.snapshot());
                if let Err(e) = self.registry.send_to(from, &reply) {
                    debug!("State reply to connection {} not delivered: {}", from, e);
                }
            }
        }
    }

    /// Runs the tick loop until `stop` flips to true or its sender goes away.
    ///
    /// Commands are applied while waiting for the next tick boundary. Returns
    /// the driver so its final state can be inspected.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<GameCommand>,
        mut stop: watch::Receiver<bool>,
    ) -> Self {
        self.start();
        let mut commands_open = true;

        'ticks: loop {
            if *stop.borrow() {
                break;
            }

            let tick_start = Instant::now();
            self.tick();
            let deadline = tick_start + self.config.tick_period;

            loop {
                tokio::select! {
                    _ = sleep_until(deadline) => break,
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break 'ticks;
                        }
                    }
                    command = commands.recv(), if commands_open => match command {
                        Some(command) => self.handle_command(command),
                        None => commands_open = false,
                    },
                }
            }
        }

        self.stop();
        self
    }
}

/// Owner-side handle to a spawned driver.
pub struct DriverHandle {
    commands: mpsc::Sender<GameCommand>,
    stop: watch::Sender<bool>,
    task: JoinHandle<SimulationDriver>,
}

impl DriverHandle {
    /// Starts the driver's tick loop on the tokio runtime.
    pub fn spawn(driver: SimulationDriver, command_capacity: usize) -> Self {
        let (commands, command_rx) = mpsc::channel(command_capacity.max(1));
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(driver.run(command_rx, stop_rx));

        Self {
            commands,
            stop,
            task,
        }
    }

    pub fn commands(&self) -> mpsc::Sender<GameCommand> {
        self.commands.clone()
    }

    /// Asks the loop to exit; it does so within one tick period.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub async fn join(self) -> Result<SimulationDriver, tokio::task::JoinError> {
        self.task.await
    }

    pub async fn shutdown(self) -> Result<SimulationDriver, tokio::task::JoinError> {
        self.stop();
        self.join().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::tests::{connect, test_addr, RecordingSink};
    use crate::connections::{ConnectionSink, DeliveryError};
    use crate::game::tests::ScriptedEngine;
    use crate::game::GameView;
    use pong_shared::{Action, ControlMode};
    use std::sync::Mutex;

    type Steps = Arc<Mutex<Vec<(Action, Action)>>>;

    fn driver_with(
        engine: ScriptedEngine,
        top_score: u32,
        broadcast_interval: u64,
    ) -> (SimulationDriver, Arc<ConnectionRegistry>, Steps) {
        let steps = Arc::clone(&engine.steps);
        let registry = Arc::new(ConnectionRegistry::new());
        let driver = SimulationDriver::new(
            GameSession::new(Box::new(engine), top_score),
            InputRouter::new(None),
            Arc::clone(&registry),
            DriverConfig {
                tick_period: Duration::from_millis(10),
                broadcast_interval,
            },
        )
        .with_modes(ControlModeRegistry::new(ControlMode::Human, ControlMode::Human));
        (driver, registry, steps)
    }

    fn driver(broadcast_interval: u64) -> (SimulationDriver, Arc<ConnectionRegistry>, Steps) {
        driver_with(ScriptedEngine::default(), 20, broadcast_interval)
    }

    fn finished_engine(top_score: u32) -> ScriptedEngine {
        let mut engine = ScriptedEngine::default();
        engine.view = GameView {
            score1: top_score,
            score2: 3,
            ..GameView::default()
        };
        engine
    }

    #[test]
    fn test_starts_stopped() {
        let (mut driver, _, _) = driver(1);
        assert_eq!(driver.state(), DriverState::Stopped);
        driver.start();
        assert_eq!(driver.state(), DriverState::Running);
        driver.stop();
        assert_eq!(driver.state(), DriverState::Stopped);
    }

    #[test]
    fn test_tick_while_stopped_is_idle() {
        let (mut driver, registry, steps) = driver(1);
        let sink = RecordingSink::new();
        connect(&registry, &sink);

        assert_eq!(driver.tick(), TickOutcome::Idle);
        assert_eq!(driver.state(), DriverState::Stopped);
        assert_eq!(driver.tick_count(), 0);
        assert_eq!(driver.stats().ticks, 0);
        assert!(steps.lock().unwrap().is_empty());
        assert_eq!(sink.snapshots().len(), 1);

        driver.start();
        assert_eq!(driver.tick(), TickOutcome::Stepped { broadcast: true });
        driver.stop();
        assert_eq!(driver.tick(), TickOutcome::Idle);
        assert_eq!(driver.tick_count(), 1);
    }

    #[test]
    fn test_broadcast_cadence() {
        for (ticks, interval) in [(10u64, 3u64), (12, 4), (7, 1), (5, 8)] {
            let (mut driver, registry, _) = driver(interval);
            let sink = RecordingSink::new();
            connect(&registry, &sink);
            driver.start();

            for _ in 0..ticks {
                driver.tick();
            }

            assert_eq!(driver.stats().broadcasts, ticks / interval);
            // One catch-up snapshot plus the regular ones.
            assert_eq!(sink.snapshots().len() as u64, 1 + ticks / interval);
            let broadcast_ticks: Vec<u64> = sink.snapshots()[1..].iter().map(|s| s.tick).collect();
            assert!(broadcast_ticks.iter().all(|tick| tick % interval == 0));
        }
    }

    #[test]
    fn test_tick_steps_with_resolved_actions() {
        let (mut driver, _, steps) = driver(1);
        driver.start();
        driver.handle_command(GameCommand::SubmitInput {
            player: PlayerId::One,
            action: Action::Up,
        });

        for _ in 0..5 {
            assert_eq!(
                driver.tick(),
                TickOutcome::Stepped { broadcast: true }
            );
        }

        let steps = steps.lock().unwrap();
        assert_eq!(steps.len(), 5);
        assert!(steps.iter().all(|step| *step == (Action::Up, Action::Stay)));
    }

    #[test]
    fn test_stay_replaces_previous_action() {
        let (mut driver, _, steps) = driver(1);
        driver.start();
        driver.handle_command(GameCommand::SubmitInput {
            player: PlayerId::Two,
            action: Action::Down,
        });
        driver.handle_command(GameCommand::SubmitInput {
            player: PlayerId::Two,
            action: Action::Stay,
        });
        driver.tick();

        assert_eq!(steps.lock().unwrap()[0], (Action::Stay, Action::Stay));
    }

    #[test]
    fn test_mode_round_trip_restores_human_input() {
        let (mut driver, registry, steps) = driver(1);
        let sink = RecordingSink::new();
        let id = connect(&registry, &sink);
        driver.start();

        driver.handle_command(GameCommand::SubmitInput {
            player: PlayerId::One,
            action: Action::Down,
        });
        driver.tick();
        driver.handle_command(GameCommand::SetMode {
            from: id,
            player: PlayerId::One,
            mode: "ai".to_string(),
        });
        driver.tick();
        driver.handle_command(GameCommand::SetMode {
            from: id,
            player: PlayerId::One,
            mode: "human".to_string(),
        });
        driver.tick();

        let actions: Vec<Action> = steps.lock().unwrap().iter().map(|step| step.0).collect();
        // No policy is loaded, so the automated tick degrades to Stay.
        assert_eq!(actions, vec![Action::Down, Action::Stay, Action::Down]);
        assert_eq!(driver.stats().degraded_decisions, 1);
    }

    #[test]
    fn test_mode_ack_goes_only_to_requester() {
        let (mut driver, registry, _) = driver(1);
        let requester = RecordingSink::new();
        let other = RecordingSink::new();
        let id = connect(&registry, &requester);
        connect(&registry, &other);

        driver.handle_command(GameCommand::SetMode {
            from: id,
            player: PlayerId::Two,
            mode: "ai".to_string(),
        });

        assert_eq!(driver.modes().get_mode(PlayerId::Two), ControlMode::Automated);
        assert_eq!(
            requester.messages().last(),
            Some(&ServerMessage::Mode {
                player: PlayerId::Two,
                mode: ControlMode::Automated
            })
        );
        assert_eq!(other.messages().len(), 1);
    }

    #[test]
    fn test_unsupported_mode_is_ignored_without_ack() {
        let (mut driver, registry, _) = driver(1);
        let sink = RecordingSink::new();
        let id = connect(&registry, &sink);

        driver.handle_command(GameCommand::SetMode {
            from: id,
            player: PlayerId::One,
            mode: "robot".to_string(),
        });

        assert_eq!(driver.modes().get_mode(PlayerId::One), ControlMode::Human);
        assert_eq!(sink.messages().len(), 1);
    }

    #[test]
    fn test_get_state_replies_only_to_requester() {
        let (mut driver, registry, _) = driver(100);
        let requester = RecordingSink::new();
        let other = RecordingSink::new();
        let id = connect(&registry, &requester);
        connect(&registry, &other);
        driver.start();
        driver.tick();
        driver.tick();

        driver.handle_command(GameCommand::GetState { from: id });

        let replies = requester.snapshots();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[1].tick, 2);
        assert_eq!(other.snapshots().len(), 1);
    }

    #[test]
    fn test_join_registers_with_current_snapshot() {
        let (mut driver, registry, _) = driver(100);
        driver.start();
        for _ in 0..3 {
            driver.tick();
        }

        let sink = RecordingSink::new();
        let dyn_sink: Arc<dyn ConnectionSink> = sink.clone();
        let id = registry.allocate_id();
        driver.handle_command(GameCommand::Join {
            connection: Connection::new(id, test_addr(), dyn_sink),
        });

        assert!(registry.contains(id));
        let snapshots = sink.snapshots();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].tick, 3);
        assert_eq!(snapshots[0].ball.x, 3.0);
    }

    #[test]
    fn test_join_of_closed_connection_is_dropped() {
        let (mut driver, registry, _) = driver(1);
        let sink: Arc<dyn ConnectionSink> = RecordingSink::failing(DeliveryError::Closed);
        driver.handle_command(GameCommand::Join {
            connection: Connection::new(registry.allocate_id(), test_addr(), sink),
        });
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reset_broadcasts_once_to_everyone() {
        let mut engine = ScriptedEngine::default();
        engine.view.score1 = 4;
        engine.view.score2 = 6;
        let (mut driver, registry, _) = driver_with(engine, 20, 1000);
        let sinks: Vec<_> = (0..3).map(|_| RecordingSink::new()).collect();
        for sink in &sinks {
            connect(&registry, sink);
        }
        driver.start();
        driver.tick();

        driver.handle_command(GameCommand::Reset);

        let stats = driver.stats();
        assert_eq!(stats.resets, 1);
        assert_eq!(stats.reset_broadcasts, 1);
        assert_eq!(stats.broadcasts, 0);
        for sink in &sinks {
            let snapshots = sink.snapshots();
            assert_eq!(snapshots.len(), 2);
            assert_eq!((snapshots[1].score1, snapshots[1].score2), (0, 0));
        }
    }

    #[test]
    fn test_terminal_hold_until_reset() {
        let (mut driver, registry, steps) = driver_with(finished_engine(5), 5, 1);
        let sink = RecordingSink::new();
        connect(&registry, &sink);
        driver.start();

        for _ in 0..4 {
            assert_eq!(driver.tick(), TickOutcome::Held { broadcast: true });
            assert_eq!(driver.state(), DriverState::TerminalHold);
        }
        assert!(steps.lock().unwrap().is_empty());
        // Skip the catch-up snapshot the test connection was registered with.
        let held = sink.snapshots();
        assert_eq!(held.len(), 5);
        assert!(held[1..].iter().all(|s| s.done && s.ball.x == 0.0));
        assert_eq!(driver.stats().held_ticks, 4);

        driver.handle_command(GameCommand::Reset);
        assert_eq!(driver.state(), DriverState::Running);
        assert!(!sink.snapshots().last().unwrap().done);

        assert_eq!(driver.tick(), TickOutcome::Stepped { broadcast: true });
        assert_eq!(steps.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_held_ticks_follow_broadcast_interval() {
        let (mut driver, _, _) = driver_with(finished_engine(5), 5, 3);
        driver.start();
        let outcomes: Vec<TickOutcome> = (0..6).map(|_| driver.tick()).collect();
        assert_eq!(
            outcomes,
            vec![
                TickOutcome::Held { broadcast: false },
                TickOutcome::Held { broadcast: false },
                TickOutcome::Held { broadcast: true },
                TickOutcome::Held { broadcast: false },
                TickOutcome::Held { broadcast: false },
                TickOutcome::Held { broadcast: true },
            ]
        );
    }

    #[test]
    fn test_failed_connection_dropped_mid_run() {
        let (mut driver, registry, _) = driver(1);
        let healthy = RecordingSink::new();
        let broken = RecordingSink::new();
        connect(&registry, &healthy);
        let broken_id = connect(&registry, &broken);
        driver.start();

        driver.tick();
        broken.fail_with(Some(DeliveryError::Closed));
        driver.tick();
        driver.tick();

        assert!(!registry.contains(broken_id));
        assert_eq!(healthy.snapshots().len(), 4);
        assert_eq!(broken.snapshots().len(), 2);
    }

    #[test]
    fn test_from_config_builds_default_game() {
        let config = ServerConfig {
            seed: Some(11),
            policy: PolicyKind::None,
            ..ServerConfig::default()
        };
        let driver = SimulationDriver::from_config(&config, Arc::new(ConnectionRegistry::new()));

        assert_eq!(driver.session().top_score(), config.top_score);
        assert!(!driver.router().has_policy());
        assert_eq!(driver.modes().get_mode(PlayerId::One), ControlMode::Human);
        assert_eq!(driver.modes().get_mode(PlayerId::Two), ControlMode::Automated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_holds_tick_rate_and_stops() {
        let (driver, _, _) = driver(1);
        let handle = DriverHandle::spawn(driver, 16);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let driver = tokio::time::timeout(Duration::from_millis(20), handle.shutdown())
            .await
            .expect("driver did not stop within a tick")
            .unwrap();

        assert_eq!(driver.state(), DriverState::Stopped);
        let ticks = driver.stats().ticks;
        assert!((99..=101).contains(&ticks), "ran {} ticks", ticks);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_applies_commands_between_ticks() {
        let (driver, registry, steps) = driver(5);
        let handle = DriverHandle::spawn(driver, 16);
        let commands = handle.commands();

        let sink = RecordingSink::new();
        let dyn_sink: Arc<dyn ConnectionSink> = sink.clone();
        let id = registry.allocate_id();
        tokio_test::assert_ok!(
            commands
                .send(GameCommand::Join {
                    connection: Connection::new(id, test_addr(), dyn_sink),
                })
                .await
        );
        tokio_test::assert_ok!(
            commands
                .send(GameCommand::SubmitInput {
                    player: PlayerId::Two,
                    action: Action::Up,
                })
                .await
        );
        tokio_test::assert_ok!(commands.send(GameCommand::Reset).await);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let driver = handle.shutdown().await.unwrap();

        assert!(registry.contains(id));
        assert_eq!(driver.stats().resets, 1);
        assert_eq!(driver.router().pending_action(PlayerId::Two), Action::Up);
        assert_eq!(steps.lock().unwrap().last(), Some(&(Action::Stay, Action::Up)));

        let ticks: Vec<u64> = sink.snapshots().iter().map(|s| s.tick).collect();
        assert!(ticks.len() >= 3);
        assert!(ticks.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_driver() {
        let (driver, _, _) = driver(1);
        let (commands, command_rx) = mpsc::channel(4);
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(driver.run(command_rx, stop_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(stop);
        drop(commands);

        let driver = tokio::time::timeout(Duration::from_millis(20), task)
            .await
            .expect("driver did not stop")
            .unwrap();
        assert_eq!(driver.state(), DriverState::Stopped);
    }
}
