use ahash::RandomState as AHasher;
use rand::Rng;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, trace};

use crate::engine::{Board, Classic, GameEngine, Move};

use super::backprop::{backpropagate, most_visited};
use super::node::{Node, NodeId};
use super::registry::StateRegistry;
use super::rollout::rollout;
use super::tree_policy::descend;
use super::{warm_engine_and_heuristics, BranchStats, MctsConfig, SearchError, SearchStats};

/// Single-threaded MCTS.
///
/// A search is fully determined by the board, the config and the RNG state,
/// so a seeded [`rand::rngs::StdRng`] reproduces it exactly.
pub struct Mcts<E: GameEngine = Classic> {
    engine: E,
    cfg: MctsConfig,
    stats: SearchStats,
}

impl Mcts<Classic> {
    pub fn new() -> Self { Self::with_config(MctsConfig::default()) }

    pub fn with_config(cfg: MctsConfig) -> Self { Self::with_engine(Classic, cfg) }
}

impl Default for Mcts<Classic> {
    fn default() -> Self { Self::new() }
}

impl<E: GameEngine> Mcts<E> {
    /// Searcher over a custom engine. Warms the board and heuristic tables.
    pub fn with_engine(engine: E, cfg: MctsConfig) -> Self {
        warm_engine_and_heuristics();
        Self { engine, cfg, stats: SearchStats::default() }
    }

    #[inline]
    pub fn config(&self) -> &MctsConfig { &self.cfg }

    /// Run `rollout_budget + |untried root actions|` iterations from `board`.
    ///
    /// A terminal root skips the search; the returned tree then has a single
    /// node and no best move. With a time limit, the search may stop early,
    /// but never before every root action has been expanded once.
    pub fn search<R: Rng + ?Sized>(&mut self, board: Board, rng: &mut R) -> Result<SearchTree, SearchError> {
        self.cfg.validate()?;
        let mut registry = StateRegistry::new();
        let (root, _) = registry.get_or_create(&self.engine, board);
        let mut stats = SearchStats::default();
        if registry.get(root).is_terminal() {
            debug!(?board, "terminal root, search skipped");
            return Ok(self.finish(registry, root, stats));
        }

        let iterations = self.cfg.rollout_budget as u64 + registry.get(root).untried.len() as u64;
        let deadline = self.cfg.time_limit().map(|limit| Instant::now() + limit);
        let mut seen = HashSet::with_hasher(AHasher::new());
        for iteration in 0..iterations {
            if deadline.is_some_and(|d| Instant::now() >= d) && registry.get(root).untried.is_empty() {
                debug!(iteration, iterations, "time limit reached");
                break;
            }
            let descent = descend(&mut registry, root, &self.engine, self.cfg.exploration_constant, rng)?;
            let playout = rollout(&self.engine, descent.frontier, &self.cfg, rng, &mut seen)?;
            backpropagate(&mut registry, &descent.path, playout.value)?;
            trace!(
                iteration,
                depth = descent.path.len(),
                rollout_steps = playout.steps,
                value = playout.value,
                cycle_cut = descent.cycle_cut || playout.cycle_cut,
                "iteration done"
            );
            stats.record(&descent, &playout);
        }
        Ok(self.finish(registry, root, stats))
    }

    /// Most-visited root move after a fresh search; `None` if no move is possible.
    ///
    /// ```
    /// use mcts_2048::engine::Board;
    /// use mcts_2048::mcts::{Mcts, MctsConfig};
    /// use rand::{rngs::StdRng, SeedableRng};
    /// let mut rng = StdRng::seed_from_u64(7);
    /// let b = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
    /// let mut mcts = Mcts::with_config(MctsConfig::for_testing());
    /// assert!(mcts.best_move(b, &mut rng).unwrap().is_some());
    /// ```
    pub fn best_move<R: Rng + ?Sized>(&mut self, board: Board, rng: &mut R) -> Result<Option<Move>, SearchError> {
        Ok(self.search(board, rng)?.best_move())
    }

    /// Root statistics per direction after a fresh search, in `[Up, Down, Left, Right]` order.
    pub fn branch_stats<R: Rng + ?Sized>(&mut self, board: Board, rng: &mut R) -> Result<[BranchStats; 4], SearchError> {
        Ok(self.search(board, rng)?.branch_stats())
    }

    /// Statistics of the last search.
    #[inline]
    pub fn last_stats(&self) -> SearchStats { self.stats }

    #[inline]
    pub fn reset_stats(&mut self) { self.stats = SearchStats::default(); }

    fn finish(&mut self, registry: StateRegistry, root: NodeId, mut stats: SearchStats) -> SearchTree {
        stats.nodes = registry.len() as u64;
        stats.peak_nodes = self.stats.peak_nodes.max(stats.nodes);
        self.stats = stats;
        let tree = SearchTree::new(registry, root, stats);
        debug!(
            iterations = stats.iterations,
            nodes = stats.nodes,
            max_depth = stats.max_depth,
            cycle_cuts = stats.cycle_cuts,
            best = ?tree.best_move(),
            "search finished"
        );
        tree
    }
}

/// The graph built by one search, rooted at the searched board.
///
/// Owns every node; dropping it releases the whole search.
#[derive(Debug)]
pub struct SearchTree {
    registry: StateRegistry,
    root: NodeId,
    stats: SearchStats,
}

impl SearchTree {
    pub(crate) fn new(registry: StateRegistry, root: NodeId, stats: SearchStats) -> Self {
        Self { registry, root, stats }
    }

    #[inline]
    pub fn root(&self) -> &Node { self.registry.get(self.root) }

    #[inline]
    pub fn root_id(&self) -> NodeId { self.root }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node { self.registry.get(id) }

    #[inline]
    pub fn registry(&self) -> &StateRegistry { &self.registry }

    /// Most-visited root action, ties in `Up, Down, Left, Right` order.
    pub fn best_move(&self) -> Option<Move> { most_visited(self.root()) }

    /// Root edge statistics; illegal directions are reported with `legal = false`.
    pub fn branch_stats(&self) -> [BranchStats; 4] {
        let root = self.root();
        Move::ALL.map(|dir| match root.edge(dir) {
            Some(edge) => BranchStats { dir, visits: edge.visits, mean_value: edge.action_value(), legal: true },
            None => BranchStats { dir, visits: 0, mean_value: 0.0, legal: false },
        })
    }

    #[inline]
    pub fn stats(&self) -> SearchStats { self.stats }

    /// Distinct boards in the graph.
    #[inline]
    pub fn len(&self) -> usize { self.registry.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.registry.is_empty() }
}
