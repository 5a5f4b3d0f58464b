//! Evaluate a population of random linear policies against a running NES server.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use rand::{rngs::StdRng, SeedableRng};
use tracing::{error, info};

use smb_eval::evaluator::best;
use smb_eval::logger::init_logger;
use smb_eval::policy::{DEFAULT_INPUT_SIZE, OUTPUT_SIZE};
use smb_eval::prelude::*;

/// Score policies by playing Super Mario Bros. on a remote emulator
#[derive(Parser, Debug)]
#[command(name = "smb-eval")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Master (load balancer) host
    host: String,

    /// Master (load balancer) port
    port: String,

    /// Number of policies to evaluate
    #[arg(short, long, default_value = "16")]
    population: usize,

    /// Episodes played concurrently (default: physical CPU count)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Seed of the random policy weights
    #[arg(short, long, default_value = "1")]
    seed: u64,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = Configuration::from_env();
    init_logger(config.log())?;
    config.validate().context("invalid configuration")?;

    let mut evaluator = Evaluator::new(Endpoint::new(args.host, args.port), config);
    if let Some(workers) = args.workers {
        evaluator = evaluator.with_workers(workers);
    }

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut population: Vec<LinearPolicy> = (0..args.population)
        .map(|_| LinearPolicy::random(DEFAULT_INPUT_SIZE, OUTPUT_SIZE, &mut rng))
        .collect();

    info!(
        population = population.len(),
        workers = evaluator.workers(),
        "evaluating"
    );
    let outcomes = evaluator.evaluate(&mut population);

    for (index, outcome) in outcomes.iter().enumerate() {
        println!(
            "{index:>4}  fitness {:.6}  max x {:>5}  steps {:>6}  {}",
            outcome.fitness(),
            outcome.max_position_x,
            outcome.steps,
            outcome.termination
        );
    }
    if let Some((index, outcome)) = best(&outcomes) {
        println!(
            "best: policy {index} reached x = {} (fitness {:.6})",
            outcome.max_position_x,
            outcome.fitness()
        );
    }
    Ok(())
}
