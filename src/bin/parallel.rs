use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use mcts_2048::config::load_config;
use mcts_2048::engine::{self as GameEngine, Board, Classic, GameEngine as _};
use mcts_2048::mcts::{MctsConfig, MctsParallel};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

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
    if let Some(threads) = args.threads {
        cfg.threads = threads;
    }
    if let Some(ms) = args.time_limit_ms {
        cfg.time_limit_ms = Some(ms);
    }
    cfg.validate().context("invalid search settings")?;
    GameEngine::new();

    let seed = args.seed.unwrap_or_else(|| rand::thread_rng().gen());
    info!(seed, games = args.games, threads = cfg.threads, "parallel runner started");
    let mut rng = StdRng::seed_from_u64(seed);
    for game in 1..=args.games {
        let summary = run_single_game(&cfg, &args, &mut rng)?;
        println!(
            "Game {}/{} | Moves: {} | moves/sec: {:.1} | score: {} | highest tile: {} | iterations: {}",
            game,
            args.games,
            summary.moves,
            summary.moves as f64 / summary.elapsed_s.max(1e-6),
            summary.score,
            summary.highest_tile,
            summary.iterations
        );
    }
    Ok(())
}

#[derive(Debug, Parser)]
#[command(name = "parallel", about = "Parallel 2048 MCTS runner")]
struct Args {
    /// TOML config file (falls back to $MCTS_2048_CONFIG, then defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Iterations per move on top of one per legal move
    #[arg(long)]
    budget: Option<u32>,

    /// Worker count; 0 uses every rayon thread
    #[arg(long)]
    threads: Option<usize>,

    /// Per-move wall-clock limit in milliseconds
    #[arg(long)]
    time_limit_ms: Option<u64>,

    /// Number of games to play
    #[arg(long, default_value_t = 1)]
    games: u32,

    /// RNG seed; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Suppress status line output
    #[arg(long)]
    quiet: bool,

    /// Stop once score >= this value
    #[arg(long)]
    stop_score: Option<u64>,

    /// Stop after this many moves
    #[arg(long)]
    steps: Option<u64>,

    /// Stop once highest tile >= this value
    #[arg(long)]
    stop_tile: Option<u32>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,
}

struct GameSummary {
    moves: u64,
    score: u64,
    highest_tile: u32,
    iterations: u64,
    elapsed_s: f64,
}

fn run_single_game(cfg: &MctsConfig, args: &Args, rng: &mut StdRng) -> anyhow::Result<GameSummary> {
    let start = Instant::now();
    let mut mcts = MctsParallel::with_config(cfg.clone());
    let mut board = Board::EMPTY.with_random_tile(rng).with_random_tile(rng);

    // Status line: moves/sec and score via indicatif
    let moves = Arc::new(AtomicU64::new(0));
    let score_atomic = Arc::new(AtomicU64::new(0));
    let stop = Arc::new(AtomicBool::new(false));
    let mut status_handle: Option<thread::JoinHandle<()>> = None;
    let mut pb_opt: Option<ProgressBar> = None;
    if !args.quiet {
        let moves_for_status = moves.clone();
        let score_for_status = score_atomic.clone();
        let stop_flag = stop.clone();
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner} {elapsed_precise} | Moves: {msg}")?
                .tick_chars("⠁⠃⠇⠧⠷⠿⠻⠟⠯⠷⠧⠇⠃"),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        let pb_bg = pb.clone();
        status_handle = Some(thread::spawn(move || {
            let start = Instant::now();
            while !stop_flag.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(250));
                let m = moves_for_status.load(Ordering::Relaxed);
                let rate = m as f64 / start.elapsed().as_secs_f64().max(1e-6);
                let s = score_for_status.load(Ordering::Relaxed);
                pb_bg.set_message(format!("{} | moves/sec: {:.1} | score: {}", m, rate, s));
            }
        }));
        pb_opt = Some(pb);
    }

    let mut move_count = 0u64;
    let mut score = 0u64;
    let mut iterations = 0u64;
    let outcome: anyhow::Result<()> = loop {
        if args.steps.is_some_and(|limit| move_count >= limit) {
            break Ok(());
        }
        let (direction, branches) = match mcts.best_move_with_branches(board, rng) {
            Ok(result) => result,
            Err(err) => break Err(err.into()),
        };
        let Some(direction) = direction else { break Ok(()) };
        debug!(move_count, %direction, ?branches, "move chosen");
        iterations += mcts.last_stats().iterations;
        let transition = match Classic.apply(board, direction, rng) {
            Ok(t) => t,
            Err(err) => break Err(anyhow::Error::from(err)),
        };
        board = transition.board;
        score += transition.reward as u64;
        move_count += 1;
        moves.fetch_add(1, Ordering::Relaxed);
        score_atomic.store(score, Ordering::Relaxed);
        if args.stop_tile.is_some_and(|target| board.highest_tile() >= target) {
            break Ok(());
        }
        if args.stop_score.is_some_and(|target| score >= target) {
            break Ok(());
        }
    };

    // Stop status thread before surfacing any search error
    stop.store(true, Ordering::Relaxed);
    if let Some(h) = status_handle {
        let _ = h.join();
    }
    if let Some(pb) = pb_opt {
        pb.finish_and_clear();
    }
    outcome?;

    Ok(GameSummary {
        moves: move_count,
        score,
        highest_tile: board.highest_tile(),
        iterations,
        elapsed_s: start.elapsed().as_secs_f64(),
    })
}
