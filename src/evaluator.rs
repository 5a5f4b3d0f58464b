//! Population evaluation.
//!
//! Each policy gets its own episode: its own discovery request, worker connection and
//! bookkeeping. Episodes run on a fixed number of scoped threads pulling from a shared
//! queue, and report back over a channel as they finish.

use std::sync::{mpsc, Mutex};
use std::thread;

use tracing::{debug, info, instrument, warn};

use crate::configuration::Configuration;
use crate::endpoint::Endpoint;
use crate::episode::{EpisodeOutcome, EpisodeRunner};
use crate::policy::Policy;

/// Evaluates many policies against one master endpoint.
#[derive(Debug, Clone)]
pub struct Evaluator {
    runner: EpisodeRunner,
    workers: usize,
}

impl Evaluator {
    /// Evaluator running one episode per physical CPU at a time.
    pub fn new(master: Endpoint, config: Configuration) -> Evaluator {
        Evaluator {
            runner: EpisodeRunner::new(master, config),
            workers: num_cpus::get_physical().max(1),
        }
    }

    /// Limit the number of episodes played concurrently. Zero is treated as one.
    pub fn with_workers(mut self, workers: usize) -> Evaluator {
        self.workers = workers.max(1);
        self
    }

    /// Number of concurrent episodes.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Play one episode per policy; outcomes are in population order.
    #[instrument(skip_all, fields(population = population.len(), workers = self.workers))]
    pub fn evaluate<P: Policy + Send>(&self, population: &mut [P]) -> Vec<EpisodeOutcome> {
        let total = population.len();
        let mut outcomes: Vec<Option<EpisodeOutcome>> = vec![None; total];
        let queue = Mutex::new(population.iter_mut().enumerate());
        let (tx_result, rx_result) = mpsc::channel();

        thread::scope(|scope| {
            for worker in 0..self.workers.min(total) {
                let tx_result = tx_result.clone();
                let queue = &queue;
                let runner = &self.runner;
                thread::Builder::new()
                    .name(format!("smb-episode-{worker}"))
                    .spawn_scoped(scope, move || loop {
                        // the guard is dropped before the episode starts
                        let Some((index, policy)) = queue.lock().ok().and_then(|mut q| q.next())
                        else {
                            break;
                        };
                        debug!(worker, index, "episode started");
                        let outcome = runner.evaluate(policy);
                        if tx_result.send((index, outcome)).is_err() {
                            break;
                        }
                    })
                    .map(drop)
                    .unwrap_or_else(|e| warn!("could not spawn episode thread: {e}"));
            }
            drop(tx_result);

            let mut done = 0;
            for (index, outcome) in rx_result {
                done += 1;
                info!(
                    index,
                    done,
                    total,
                    fitness = outcome.fitness(),
                    "policy evaluated"
                );
                outcomes[index] = Some(outcome);
            }
        });

        outcomes
            .into_iter()
            .map(|outcome| outcome.unwrap_or_else(EpisodeOutcome::aborted))
            .collect()
    }
}

/// Index and outcome of the fittest policy (lowest fitness), first one on ties.
pub fn best(outcomes: &[EpisodeOutcome]) -> Option<(usize, &EpisodeOutcome)> {
    outcomes
        .iter()
        .enumerate()
        .reduce(|best, candidate| {
            if candidate.1.fitness() < best.1.fitness() {
                candidate
            } else {
                best
            }
        })
}
