//! # smb-eval
//!
//! Scores black-box decision policies by letting them play Super Mario Bros. on a remote
//! NES emulator server.
//!
//! It provides:
//! - A deadline-bounded TCP client for the server's line protocol ([`transport::Client`])
//! - Builders and decoders for the JSON commands and replies ([`protocol`])
//! - The per-episode control loop: discover a worker, reset, play, score ([`episode`])
//! - Concurrent evaluation of a whole population ([`Evaluator`])
//!
//! The policy itself is an external collaborator: anything implementing [`Policy`] can be
//! evaluated, from a NEAT genome to a plain closure.
//!
//! # Episode
//!
//! 1. Ask the master (a load balancer) for a worker endpoint.
//! 2. Connect to the worker, set maximum speed and a frame divisor of 2, nudge right and
//!    reset the level.
//! 3. Every step: query the game state, feed the 13×13 tile view plus a bias to the policy,
//!    press the key of the largest output.
//! 4. Stop when Mario dies or makes no progress for 70 steps.
//! 5. Fitness is `1 / furthest x` (lower is better), or `1` when nothing was achieved.
//!
//! # Usage Example
//!
//! ```no_run
//! use smb_eval::prelude::*;
//!
//! let config = Configuration::from_env();
//! let runner = EpisodeRunner::new(Endpoint::new("127.0.0.1", "4560"), config);
//!
//! // always run right
//! let mut policy = |_: &[f64]| vec![1.0, 0.0, 0.0, 0.0, 0.0];
//! let outcome = runner.evaluate(&mut policy);
//! println!("fitness {} ({})", outcome.fitness(), outcome.termination);
//! ```
//!
//! ## Failure handling
//!
//! - Discovery or reset failures abort the episode with the worst fitness.
//! - A failed query or action only skips the current step.
//! - A connection closed by an expired deadline ends the episode with the progress so far.
//! - A panic inside an episode is caught and scored as aborted.
#![warn(missing_docs)]

pub mod configuration;
pub mod discovery;
mod endpoint;
pub mod episode;
pub mod error;
pub mod evaluator;
pub mod game;
/// Global `tracing` subscriber setup.
pub mod logger;
pub mod policy;
pub mod protocol;
pub mod transport;

pub use anyhow;
pub use endpoint::Endpoint;
pub use evaluator::Evaluator;
pub use policy::Policy;

/// Commonly used types and traits for quick access.
///
/// ```rust
/// use smb_eval::prelude::*;
/// ```
pub mod prelude {
    pub use crate::configuration::Configuration;
    pub use crate::endpoint::Endpoint;
    pub use crate::episode::{EpisodeOutcome, EpisodeRunner, Termination};
    pub use crate::evaluator::Evaluator;
    pub use crate::game::{Action, GameState};
    pub use crate::policy::{LinearPolicy, Policy};
}
