//! Monte Carlo Tree Search policy (single-threaded and parallel) for 2048.
//!
//! Every iteration walks the search graph from the root (untried actions
//! first, then UCT), plays a short random rollout from where the walk
//! stopped, scores the final board with a positional heuristic and credits
//! the return to every edge on the walk. After the iteration budget the
//! most-visited root action is recommended.
//!
//! This module provides two policy implementations:
//! - [`Mcts`]: single-threaded, fully reproducible from a seeded RNG.
//! - [`MctsParallel`]: rayon workers sharing one tree behind a coarse lock.
//!
//! Boards are deduplicated by content, so the "tree" is a DAG held in a
//! [`StateRegistry`] arena that lives exactly as long as the returned
//! [`SearchTree`].
//!
//! Quick start
//! ```
//! use mcts_2048::engine::Board;
//! use mcts_2048::mcts::{recommend_move, Mcts, MctsConfig};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(123);
//! let b0 = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
//!
//! // One-shot helper: budget, exploration constant, seed
//! let mv = recommend_move(b0, 64, 50.0, 7).unwrap();
//! assert!(mv.is_some());
//!
//! // Reusable searcher with a custom config
//! let mut mcts = Mcts::with_config(MctsConfig::for_testing());
//! let tree = mcts.search(b0, &mut rng).unwrap();
//! assert_eq!(tree.best_move().is_some(), !b0.is_game_over());
//! ```

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ConfigError;
use crate::engine::{Board, EngineError, Move, MoveSet};

mod backprop;
mod heuristic;
mod node;
mod registry;
mod render;
mod rollout;
mod search_par;
mod search_seq;
mod tree_policy;

pub use heuristic::{evaluate, Features, HeuristicWeights};
pub use node::{EdgeStats, Node, NodeId};
pub use registry::StateRegistry;
pub use search_par::MctsParallel;
pub use search_seq::{Mcts, SearchTree};

/// Search knobs. Every field has a default, so a config file only needs the
/// fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MctsConfig {
    /// Iterations on top of one per initially untried root action.
    pub rollout_budget: u32,
    /// UCT exploration constant `C`. Rewards are raw merge scores, so this
    /// is on the order of tens, not ~1.
    pub exploration_constant: f64,
    /// Maximum random moves per rollout.
    pub rollout_depth: u32,
    /// Weight (lambda) of the rollout's accumulated merge reward in the leaf value.
    pub score_weight: f64,
    /// Concurrent pipelines for [`MctsParallel`]; 0 uses the rayon pool size.
    pub threads: usize,
    /// Optional wall-clock limit, checked between iterations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit_ms: Option<u64>,
    /// Leaf evaluator weights.
    pub heuristic: HeuristicWeights,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            rollout_budget: 500,
            exploration_constant: 50.0,
            rollout_depth: 80,
            score_weight: 0.1,
            threads: 0,
            time_limit_ms: None,
            heuristic: HeuristicWeights::default(),
        }
    }
}

impl MctsConfig {
    /// Small budget and short rollouts for tests and doctests.
    pub fn for_testing() -> Self {
        Self { rollout_budget: 48, rollout_depth: 12, ..Self::default() }
    }

    pub fn with_budget(mut self, rollout_budget: u32) -> Self {
        self.rollout_budget = rollout_budget;
        self
    }

    pub fn with_exploration(mut self, c: f64) -> Self {
        self.exploration_constant = c;
        self
    }

    pub fn with_rollout_depth(mut self, depth: u32) -> Self {
        self.rollout_depth = depth;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit_ms = Some(limit.as_millis() as u64);
        self
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_ms.map(Duration::from_millis)
    }

    /// Reject settings that would make UCT or the evaluator produce NaN.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite_non_negative = [
            ("exploration_constant", self.exploration_constant),
            ("score_weight", self.score_weight),
        ];
        for (name, value) in finite_non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must be finite and >= 0, got {value}")));
            }
        }
        let h = &self.heuristic;
        let weights = [h.empty_weight, h.monotonicity_weight, h.smoothness_weight, h.corner_weight, h.merge_weight];
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(ConfigError::Invalid("heuristic weights must be finite".to_string()));
        }
        let norms = [h.empty_norm, h.monotonicity_norm, h.smoothness_norm, h.merge_norm];
        if norms.iter().any(|n| !n.is_finite() || *n <= 0.0) {
            return Err(ConfigError::Invalid("heuristic normalizers must be finite and > 0".to_string()));
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SearchError {
    /// The tree asked the engine for a move it does not allow; the tree is corrupt.
    #[error("invalid action {mv} on board {board:?}")]
    InvalidAction { mv: Move, board: Board },
    /// UCT was evaluated on an edge nobody has visited.
    #[error("UCT evaluated on unvisited edge {mv} of board {board:?}")]
    DegenerateStatistics { mv: Move, board: Board },
    #[error("no selectable action on non-terminal board {board:?}")]
    NoSelectableAction { board: Board },
    #[error("engine error: {0}")]
    Engine(EngineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<EngineError> for SearchError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::IllegalMove { mv, board } => SearchError::InvalidAction { mv, board },
            other => SearchError::Engine(other),
        }
    }
}

/// Root statistics for one direction, in `[Up, Down, Left, Right]` order.
///
/// `legal` is false when the move is a no-op for the root board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchStats {
    pub dir: Move,
    pub visits: u32,
    pub mean_value: f64,
    pub legal: bool,
}

/// Counters for one search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub iterations: u64,
    /// Distinct boards registered.
    pub nodes: u64,
    /// Largest `nodes` over every search run by the same searcher.
    pub peak_nodes: u64,
    /// Longest tree-policy walk, in moves.
    pub max_depth: u32,
    /// Walks and rollouts stopped because a board repeated.
    pub cycle_cuts: u64,
    pub rollout_steps: u64,
}

impl SearchStats {
    pub(crate) fn record(&mut self, descent: &tree_policy::Descent, rollout: &rollout::Rollout) {
        self.iterations += 1;
        self.max_depth = self.max_depth.max(descent.path.len() as u32);
        self.cycle_cuts += descent.cycle_cut as u64 + rollout.cycle_cut as u64;
        self.rollout_steps += rollout.steps as u64;
    }
}

/// Recommend a move for `board` with a fresh, seeded single-threaded search.
///
/// Runs `rollout_budget` iterations plus one per legal root move, then
/// returns the most-visited root move. `Ok(None)` means no move is possible.
/// The whole search graph is dropped before returning.
///
/// ```
/// use mcts_2048::engine::Board;
/// use mcts_2048::mcts::recommend_move;
/// let stuck = Board::from_grid([[2, 4, 2, 4], [4, 2, 4, 2], [2, 4, 2, 4], [4, 2, 4, 2]]).unwrap();
/// assert_eq!(recommend_move(stuck, 100, 50.0, 1).unwrap(), None);
/// ```
pub fn recommend_move(
    board: Board,
    rollout_budget: u32,
    exploration_constant: f64,
    rng_seed: u64,
) -> Result<Option<Move>, SearchError> {
    let cfg = MctsConfig::default().with_budget(rollout_budget).with_exploration(exploration_constant);
    cfg.validate()?;
    let mut rng = StdRng::seed_from_u64(rng_seed);
    Mcts::with_config(cfg).best_move(board, &mut rng)
}

/// Build engine and heuristic tables ahead of the first search.
fn warm_engine_and_heuristics() {
    // Safe to call multiple times.
    crate::engine::new();
    heuristic::warm();
}

/// Uniformly random member of `set`.
fn pick_uniform<R: Rng + ?Sized>(set: MoveSet, rng: &mut R) -> Option<Move> {
    if set.is_empty() {
        return None;
    }
    set.nth(rng.gen_range(0..set.len()))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let cfg = MctsConfig::default();
        assert_eq!(cfg.rollout_budget, 500);
        assert_eq!(cfg.rollout_depth, 80);
        assert!((cfg.exploration_constant - 50.0).abs() < 1e-12);
        assert!((cfg.score_weight - 0.1).abs() < 1e-12);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let cfg = MctsConfig::default()
            .with_budget(10)
            .with_exploration(2.5)
            .with_rollout_depth(4)
            .with_threads(3)
            .with_time_limit(Duration::from_millis(250));
        assert_eq!(cfg.rollout_budget, 10);
        assert_eq!(cfg.rollout_depth, 4);
        assert_eq!(cfg.threads, 3);
        assert_eq!(cfg.time_limit(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn validate_rejects_bad_constants() {
        assert!(MctsConfig::default().with_exploration(f64::NAN).validate().is_err());
        assert!(MctsConfig::default().with_exploration(-1.0).validate().is_err());
        let mut cfg = MctsConfig::default();
        cfg.heuristic.merge_norm = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn illegal_move_maps_to_invalid_action() {
        let err = SearchError::from(EngineError::IllegalMove { mv: Move::Up, board: Board::EMPTY });
        assert!(matches!(err, SearchError::InvalidAction { mv: Move::Up, .. }));
    }

    #[test]
    fn recommend_move_rejects_nan_exploration() {
        let b = Board::from_grid([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]).unwrap();
        assert!(matches!(recommend_move(b, 4, f64::NAN, 0), Err(SearchError::Config(_))));
    }

    #[test]
    fn recommend_move_is_reproducible() {
        let b = Board::from_grid([[2, 4, 8, 0], [0, 2, 0, 0], [0, 0, 4, 0], [2, 0, 0, 0]]).unwrap();
        for seed in [1, 2, 3] {
            let first = recommend_move(b, 40, 50.0, seed).unwrap();
            let second = recommend_move(b, 40, 50.0, seed).unwrap();
            assert!(first.is_some());
            assert_eq!(first, second);
        }
    }

    #[test]
    fn single_legal_move_with_zero_budget() {
        // Only DOWN changes this board: column 0 holds one tile at the top,
        // everything else is packed against the top-left without merges.
        let b = Board::from_grid([[2, 4, 8, 16], [0; 4], [0; 4], [0; 4]]).unwrap();
        let legal = b.legal_moves();
        assert_eq!(legal.iter().collect::<Vec<_>>(), vec![Move::Down]);
        assert_eq!(recommend_move(b, 0, 50.0, 9).unwrap(), Some(Move::Down));
    }

    #[test]
    fn pick_uniform_covers_every_member() {
        let mut rng = StdRng::seed_from_u64(4);
        let set: MoveSet = [Move::Up, Move::Right].into_iter().collect();
        let mut counts = [0u32; 4];
        for _ in 0..200 {
            counts[pick_uniform(set, &mut rng).unwrap().index()] += 1;
        }
        assert!(counts[Move::Up.index()] > 50 && counts[Move::Right.index()] > 50);
        assert_eq!(counts[Move::Down.index()] + counts[Move::Left.index()], 0);
        assert_eq!(pick_uniform(MoveSet::EMPTY, &mut rng), None);
    }
}
