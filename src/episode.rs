//! One fitness evaluation: discover a worker, reset the game, let the policy play, score.
//!
//! The step loop only talks to a [`GameSession`], so it runs the same against a live
//! [`Worker`] connection and against a scripted session in tests.
//!
//! Failures before the first step (discovery, worker connect, reset sequence) abort the
//! episode with the worst fitness. Failures during a step only skip that step, unless the
//! connection is gone, in which case the episode is scored with the progress made so far.

use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, info, instrument, trace, warn};

use crate::configuration::Configuration;
use crate::discovery::discover;
use crate::endpoint::Endpoint;
use crate::error::EpisodeError;
use crate::game::{Action, GameState};
use crate::policy::Policy;
use crate::protocol::{messages, parse_game_state, Command, GameQuery};
use crate::transport::Client;

/// Fitness of an episode that made no progress, or never started. Lower is better.
pub const WORST_FITNESS: f64 = 1.0;

/// `1 / max_position_x` when Mario moved right of the origin, [`WORST_FITNESS`] otherwise.
pub fn fitness(max_position_x: i32) -> f64 {
    if max_position_x > 0 {
        1.0 / f64::from(max_position_x)
    } else {
        WORST_FITNESS
    }
}

/// The game as seen by the step loop.
pub trait GameSession {
    /// Query the current state.
    ///
    /// # Errors
    /// Transport or decode failure of this query.
    fn game_state(&mut self) -> Result<GameState, EpisodeError>;

    /// Press the key of `action`.
    ///
    /// # Errors
    /// Transport failure of this command.
    fn act(&mut self, action: Action) -> Result<(), EpisodeError>;
}

/// Live connection to the worker running the emulator.
#[derive(Debug)]
pub struct Worker {
    client: Client,
    config: Configuration,
}

impl Worker {
    /// Connect to `endpoint` and restart the level.
    ///
    /// Sends, in order: emulation speed, frame divisor, a `Right` press to leave the title
    /// screen, and a game reset.
    ///
    /// # Errors
    /// Connect or send failure; either aborts the episode.
    #[instrument(skip_all, fields(%endpoint))]
    pub fn reset(endpoint: &Endpoint, config: &Configuration) -> Result<Worker, EpisodeError> {
        let mut client = Client::connect(endpoint, config.connect_timeout)?;
        let sequence = [
            messages::config_speed(config.speed),
            messages::config_divisor(config.divisor),
            messages::press(Action::Right.key()),
            messages::game_reset(),
        ];
        for fragment in sequence {
            let mut envelope = messages::Envelope::new();
            envelope.append(&fragment);
            client.send(&envelope.wrap(), config.send_timeout)?;
        }
        debug!("game reset");
        Ok(Worker {
            client,
            config: *config,
        })
    }
}

impl GameSession for Worker {
    fn game_state(&mut self) -> Result<GameState, EpisodeError> {
        let reply = self.client.request(
            &Command::Game(GameQuery::Info).message(),
            self.config.send_timeout,
            self.config.receive_timeout,
        )?;
        Ok(parse_game_state(&reply)?)
    }

    fn act(&mut self, action: Action) -> Result<(), EpisodeError> {
        self.client.send(
            &Command::Press(action.key()).message(),
            self.config.send_timeout,
        )?;
        Ok(())
    }
}

/// Why an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Dead player state, or a degenerate tile view.
    Died,
    /// No forward progress for the configured number of steps.
    Stagnated,
    /// The step ceiling was reached.
    StepLimit,
    /// The worker connection was closed mid-episode.
    ConnectionLost,
    /// Discovery or reset failed, or the episode panicked.
    Aborted,
}

impl Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Termination::Died => "died",
            Termination::Stagnated => "stagnated",
            Termination::StepLimit => "step limit",
            Termination::ConnectionLost => "connection lost",
            Termination::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Per-episode bookkeeping of forward progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    max_position_x: i32,
    session_lives: i32,
    step_counter: u32,
    started: bool,
}

impl Progress {
    /// Take the reference position and lives from the first decoded state.
    ///
    /// Returns true only for the call that latched.
    pub fn latch(&mut self, state: &GameState) -> bool {
        if self.started {
            return false;
        }
        self.started = true;
        self.max_position_x = state.mario_x;
        self.session_lives = state.lives;
        true
    }

    /// Account for one completed step. Returns true when Mario got further right than ever,
    /// which resets the stagnation counter; any other step increments it.
    pub fn advance(&mut self, mario_x: i32) -> bool {
        if mario_x > self.max_position_x {
            self.max_position_x = mario_x;
            self.step_counter = 0;
            true
        } else {
            self.step_counter += 1;
            false
        }
    }

    /// Furthest x position seen.
    pub fn max_position_x(&self) -> i32 {
        self.max_position_x
    }

    /// Lives at the first observed step.
    pub fn session_lives(&self) -> i32 {
        self.session_lives
    }

    /// Observed steps since the last progress.
    pub fn step_counter(&self) -> u32 {
        self.step_counter
    }
}

/// Result of one episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeOutcome {
    /// Furthest x position reached.
    pub max_position_x: i32,
    /// Loop iterations, skipped ones included.
    pub steps: u64,
    /// Steps whose state was decoded.
    pub observed_steps: u64,
    /// Why the episode ended.
    pub termination: Termination,
}

impl EpisodeOutcome {
    /// Outcome of an episode that never reached the step loop.
    pub fn aborted() -> EpisodeOutcome {
        EpisodeOutcome {
            max_position_x: 0,
            steps: 0,
            observed_steps: 0,
            termination: Termination::Aborted,
        }
    }

    /// See [`fitness`].
    pub fn fitness(&self) -> f64 {
        fitness(self.max_position_x)
    }
}

fn is_dead(state: &GameState, config: &Configuration) -> bool {
    state.player_state == config.dead_state || state.tiles.sum() == config.degenerate_tile_sum
}

/// Drive `session` with `policy` until death, stagnation, the step ceiling, or loss of the
/// connection.
pub fn run_steps<S, P>(session: &mut S, policy: &mut P, config: &Configuration) -> EpisodeOutcome
where
    S: GameSession + ?Sized,
    P: Policy + ?Sized,
{
    let mut progress = Progress::default();
    let mut observed_steps = 0;
    let mut termination = Termination::StepLimit;
    let mut steps = 0;

    while steps < config.max_steps {
        steps += 1;

        let state = match session.game_state() {
            Ok(state) => state,
            Err(e) if e.is_transient() => {
                debug!(step = steps, "skipping step, no state: {e}");
                continue;
            }
            Err(e) => {
                warn!(step = steps, "worker lost: {e}");
                termination = Termination::ConnectionLost;
                break;
            }
        };
        observed_steps += 1;

        if progress.latch(&state) {
            debug!(x = state.mario_x, lives = state.lives, "episode started");
        }

        let output = policy.activate(&state.tiles.to_input());
        match Action::from_outputs(&output) {
            Some(action) => {
                trace!(step = steps, ?action, x = state.mario_x);
                match session.act(action) {
                    Ok(()) => {}
                    Err(e) if e.is_transient() => {
                        debug!(step = steps, "skipping step, action not sent: {e}");
                        continue;
                    }
                    Err(e) => {
                        warn!(step = steps, "worker lost: {e}");
                        termination = Termination::ConnectionLost;
                        break;
                    }
                }
            }
            None => trace!(step = steps, "no action bound to the policy output"),
        }

        if is_dead(&state, config) {
            debug!(step = steps, state = state.player_state, "mario died");
            termination = Termination::Died;
            break;
        }

        if progress.advance(state.mario_x) {
            trace!(step = steps, x = state.mario_x, "progress");
        } else if state.lives < progress.session_lives() {
            trace!(step = steps, lives = state.lives, "below starting lives");
        }

        if progress.step_counter() >= config.stagnation_limit {
            debug!(step = steps, "no progress for {} steps", config.stagnation_limit);
            termination = Termination::Stagnated;
            break;
        }
    }

    EpisodeOutcome {
        max_position_x: progress.max_position_x(),
        steps,
        observed_steps,
        termination,
    }
}

/// Runs complete episodes against one master endpoint.
#[derive(Debug, Clone)]
pub struct EpisodeRunner {
    master: Endpoint,
    config: Configuration,
}

impl EpisodeRunner {
    /// Runner for `master` with `config`.
    pub fn new(master: Endpoint, config: Configuration) -> EpisodeRunner {
        EpisodeRunner { master, config }
    }

    /// Master endpoint episodes are discovered through.
    pub fn master(&self) -> &Endpoint {
        &self.master
    }

    /// Play one episode with `policy`.
    ///
    /// Never fails: discovery and reset failures, as well as panics raised while playing,
    /// yield [`EpisodeOutcome::aborted`].
    #[instrument(skip_all, fields(master = %self.master))]
    pub fn evaluate<P: Policy + ?Sized>(&self, policy: &mut P) -> EpisodeOutcome {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.play(policy)));
        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!("episode aborted: {e}");
                EpisodeOutcome::aborted()
            }
            Err(_) => {
                error!("episode panicked, scoring it as aborted");
                EpisodeOutcome::aborted()
            }
        };
        info!(
            fitness = outcome.fitness(),
            max_x = outcome.max_position_x,
            steps = outcome.steps,
            termination = %outcome.termination,
            "episode finished"
        );
        outcome
    }

    /// Scalar fitness of `policy`, see [`fitness`].
    pub fn fitness<P: Policy + ?Sized>(&self, policy: &mut P) -> f64 {
        self.evaluate(policy).fitness()
    }

    fn play<P: Policy + ?Sized>(&self, policy: &mut P) -> Result<EpisodeOutcome, EpisodeError> {
        let endpoint = discover(&self.master, &self.config)?;
        let mut worker = Worker::reset(&endpoint, &self.config)?;
        Ok(run_steps(&mut worker, policy, &self.config))
    }
}
