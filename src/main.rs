use anyhow::Context;
use clap::Parser;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mcts_2048::config::load_config;
use mcts_2048::engine::{self as GameEngine, Board, Classic, GameEngine as _};
use mcts_2048::mcts::Mcts;

/// Play one game of 2048 with the single-threaded MCTS policy, printing every board.
#[derive(Debug, Parser)]
#[command(name = "mcts-2048", about = "Play 2048 with Monte Carlo Tree Search")]
struct Args {
    /// TOML config file (falls back to $MCTS_2048_CONFIG, then defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Iterations per move on top of one per legal move
    #[arg(long)]
    budget: Option<u32>,

    /// UCT exploration constant
    #[arg(long)]
    exploration: Option<f64>,

    /// Maximum random moves per rollout
    #[arg(long)]
    rollout_depth: Option<u32>,

    /// RNG seed; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many moves
    #[arg(long)]
    steps: Option<u64>,

    /// Print the search tree to this depth after every move
    #[arg(long)]
    dump_depth: Option<usize>,

    /// Only print the final summary
    #[arg(long)]
    quiet: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = load_config(args.config.as_deref()).context("loading config")?;
    if let Some(budget) = args.budget {
        cfg.rollout_budget = budget;
    }
    if let Some(c) = args.exploration {
        cfg.exploration_constant = c;
    }
    if let Some(depth) = args.rollout_depth {
        cfg.rollout_depth = depth;
    }
    cfg.validate().context("invalid search settings")?;

    let seed = args.seed.unwrap_or_else(|| rand::thread_rng().gen());
    info!(seed, budget = cfg.rollout_budget, c = cfg.exploration_constant, "starting game");
    GameEngine::new();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut mcts = Mcts::with_config(cfg);
    let mut board = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
    if !args.quiet {
        println!("{}", board);
    }

    let mut move_count = 0u64;
    let mut score = 0u64;
    let mut peak_nodes = 0u64;
    while args.steps.map_or(true, |limit| move_count < limit) {
        let tree = mcts.search(board, &mut rng)?;
        let Some(direction) = tree.best_move() else { break };
        if let Some(depth) = args.dump_depth {
            print!("{}", tree.render(depth));
        }
        peak_nodes = peak_nodes.max(tree.stats().nodes);
        let transition = Classic.apply(board, direction, &mut rng)?;
        board = transition.board;
        score += transition.reward as u64;
        move_count += 1;
        if !args.quiet {
            println!("{direction}  score: {score}");
            println!("{}", board);
        }
    }
    println!(
        "Moves made: {}, Score: {}, Highest tile: {}, Max nodes for a move: {}, Seed: {}",
        move_count,
        score,
        board.highest_tile(),
        peak_nodes,
        seed
    );
    Ok(())
}
