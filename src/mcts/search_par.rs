use ahash::RandomState as AHasher;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, trace};

use crate::engine::{Board, Classic, GameEngine, Move};

use super::backprop::backpropagate;
use super::node::NodeId;
use super::registry::StateRegistry;
use super::rollout::rollout;
use super::tree_policy::descend;
use super::{warm_engine_and_heuristics, BranchStats, MctsConfig, SearchError, SearchStats, SearchTree};

/// Parallel MCTS: rayon workers sharing one search graph behind a mutex.
///
/// Selection, expansion and backpropagation happen under the lock; rollouts
/// run outside it. Edges a walk is still travelling through carry a virtual
/// visit so concurrent walks see them as taken. Each worker draws from its
/// own RNG seeded from the caller's, but interleaving makes results vary
/// between runs unless `threads` is 1.
pub struct MctsParallel<E: GameEngine + Sync = Classic> {
    engine: E,
    cfg: MctsConfig,
    stats: SearchStats,
}

struct Shared {
    registry: StateRegistry,
    stats: SearchStats,
}

/// Everything a worker needs, borrowed for the length of one search.
struct Pipeline<'a, E> {
    engine: &'a E,
    cfg: &'a MctsConfig,
    root: NodeId,
    shared: &'a Mutex<Shared>,
    claimed: &'a AtomicU64,
    abort: &'a AtomicBool,
    iterations: u64,
    deadline: Option<Instant>,
}

impl MctsParallel<Classic> {
    pub fn new() -> Self { Self::with_config(MctsConfig::default()) }

    pub fn with_config(cfg: MctsConfig) -> Self { Self::with_engine(Classic, cfg) }
}

impl Default for MctsParallel<Classic> {
    fn default() -> Self { Self::new() }
}

impl<E: GameEngine + Sync> MctsParallel<E> {
    pub fn with_engine(engine: E, cfg: MctsConfig) -> Self {
        warm_engine_and_heuristics();
        Self { engine, cfg, stats: SearchStats::default() }
    }

    #[inline]
    pub fn config(&self) -> &MctsConfig { &self.cfg }

    /// Run the iteration budget across `cfg.threads` workers (0 = rayon pool size).
    ///
    /// ```
    /// use mcts_2048::engine::Board;
    /// use mcts_2048::mcts::{MctsConfig, MctsParallel};
    /// use rand::{rngs::StdRng, SeedableRng};
    /// let mut rng = StdRng::seed_from_u64(5);
    /// let b = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
    /// let mut mcts = MctsParallel::with_config(MctsConfig::for_testing().with_threads(2));
    /// let tree = mcts.search(b, &mut rng).unwrap();
    /// assert_eq!(tree.root().visit_count as u64, tree.stats().iterations);
    /// ```
    pub fn search<R: Rng + ?Sized>(&mut self, board: Board, rng: &mut R) -> Result<SearchTree, SearchError> {
        self.cfg.validate()?;
        let mut registry = StateRegistry::new();
        let (root, _) = registry.get_or_create(&self.engine, board);
        if registry.get(root).is_terminal() {
            debug!(?board, "terminal root, search skipped");
            return Ok(self.finish(registry, root, SearchStats::default()));
        }

        let iterations = self.cfg.rollout_budget as u64 + registry.get(root).untried.len() as u64;
        let threads = match self.cfg.threads {
            0 => rayon::current_num_threads(),
            n => n,
        };
        let workers = threads.min(iterations as usize).max(1);
        let seeds: Vec<u64> = (0..workers).map(|_| rng.gen()).collect();

        let shared = Mutex::new(Shared { registry, stats: SearchStats::default() });
        let claimed = AtomicU64::new(0);
        let abort = AtomicBool::new(false);
        let pipeline = Pipeline {
            engine: &self.engine,
            cfg: &self.cfg,
            root,
            shared: &shared,
            claimed: &claimed,
            abort: &abort,
            iterations,
            deadline: self.cfg.time_limit().map(|limit| Instant::now() + limit),
        };
        debug!(workers, iterations, "parallel search started");
        seeds.into_par_iter().map(|seed| pipeline.run(seed)).collect::<Result<Vec<()>, SearchError>>()?;

        let Shared { registry, stats } = shared.into_inner().unwrap_or_else(PoisonError::into_inner);
        Ok(self.finish(registry, root, stats))
    }

    /// Most-visited root move after a fresh search; `None` if no move is possible.
    pub fn best_move<R: Rng + ?Sized>(&mut self, board: Board, rng: &mut R) -> Result<Option<Move>, SearchError> {
        Ok(self.search(board, rng)?.best_move())
    }

    pub fn branch_stats<R: Rng + ?Sized>(&mut self, board: Board, rng: &mut R) -> Result<[BranchStats; 4], SearchError> {
        Ok(self.search(board, rng)?.branch_stats())
    }

    /// Best move and root statistics from a single search.
    pub fn best_move_with_branches<R: Rng + ?Sized>(
        &mut self,
        board: Board,
        rng: &mut R,
    ) -> Result<(Option<Move>, [BranchStats; 4]), SearchError> {
        let tree = self.search(board, rng)?;
        Ok((tree.best_move(), tree.branch_stats()))
    }

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
            "parallel search finished"
        );
        tree
    }
}

impl<E: GameEngine + Sync> Pipeline<'_, E> {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, seed: u64) -> Result<(), SearchError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut seen = HashSet::with_hasher(AHasher::new());
        loop {
            match self.iterate(&mut rng, &mut seen) {
                Ok(true) => {}
                Ok(false) => return Ok(()),
                Err(err) => {
                    self.abort.store(true, Ordering::Relaxed);
                    return Err(err);
                }
            }
        }
    }

    /// One select/expand, rollout, backprop pass. `Ok(false)` when this
    /// worker should stop.
    fn iterate(&self, rng: &mut StdRng, seen: &mut HashSet<u64, AHasher>) -> Result<bool, SearchError> {
        if self.abort.load(Ordering::Relaxed) {
            return Ok(false);
        }
        let iteration = self.claimed.fetch_add(1, Ordering::Relaxed);
        if iteration >= self.iterations {
            return Ok(false);
        }

        let descent = {
            let mut shared = self.lock();
            let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
            if expired && shared.registry.get(self.root).untried.is_empty() {
                trace!(iteration, "time limit reached");
                return Ok(false);
            }
            descend(&mut shared.registry, self.root, self.engine, self.cfg.exploration_constant, rng)?
        };

        let playout = rollout(self.engine, descent.frontier, self.cfg, rng, seen)?;

        let mut shared = self.lock();
        backpropagate(&mut shared.registry, &descent.path, playout.value)?;
        shared.stats.record(&descent, &playout);
        trace!(iteration, depth = descent.path.len(), value = playout.value, "iteration done");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcts::testing::LyingEngine;
    use std::time::Duration;

    fn assert_visit_invariants(tree: &SearchTree) {
        for (_, node) in tree.registry().iter() {
            let sum: u32 = node.edges().map(|(_, e)| e.visits).sum();
            assert_eq!(node.visit_count, sum);
            assert!(node.edges().all(|(_, e)| e.virtual_visits == 0));
        }
    }

    #[test]
    fn every_iteration_is_credited_once() {
        let b = Board::from_grid([[2, 0, 4, 0], [0, 2, 0, 0], [0; 4], [8, 0, 0, 2]]).unwrap();
        let cfg = MctsConfig::for_testing().with_budget(200).with_threads(4);
        let tree = MctsParallel::with_config(cfg).search(b, &mut StdRng::seed_from_u64(1)).unwrap();
        let expected = 200 + b.legal_moves().len() as u64;
        assert_eq!(tree.stats().iterations, expected);
        assert_eq!(tree.root().visit_count as u64, expected);
        assert!(tree.root().untried.is_empty());
        assert_visit_invariants(&tree);
    }

    #[test]
    fn single_worker_is_reproducible() {
        let b = Board::from_grid([[2, 2, 0, 0], [0, 4, 0, 0], [0; 4], [0; 4]]).unwrap();
        let cfg = MctsConfig::for_testing().with_threads(1);
        let first = MctsParallel::with_config(cfg.clone()).search(b, &mut StdRng::seed_from_u64(2)).unwrap();
        let second = MctsParallel::with_config(cfg).search(b, &mut StdRng::seed_from_u64(2)).unwrap();
        assert_eq!(first.branch_stats(), second.branch_stats());
        assert_eq!(first.stats(), second.stats());
    }

    #[test]
    fn terminal_root_and_forced_move() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut mcts = MctsParallel::with_config(MctsConfig::default().with_budget(0).with_threads(4));
        let stuck = Board::from_grid([[2, 4, 2, 4], [4, 2, 4, 2], [2, 4, 2, 4], [4, 2, 4, 2]]).unwrap();
        assert_eq!(mcts.best_move(stuck, &mut rng).unwrap(), None);
        let forced = Board::from_grid([[2, 4, 8, 16], [0; 4], [0; 4], [0; 4]]).unwrap();
        assert_eq!(mcts.best_move(forced, &mut rng).unwrap(), Some(Move::Down));
        assert_eq!(mcts.last_stats().iterations, 1);
    }

    #[test]
    fn prefers_the_big_merge() {
        let b = Board::from_grid([[512, 512, 0, 0], [2, 0, 0, 0], [0; 4], [0; 4]]).unwrap();
        let cfg = MctsConfig::default().with_budget(300).with_rollout_depth(10).with_threads(3);
        let (best, branches) =
            MctsParallel::with_config(cfg).best_move_with_branches(b, &mut StdRng::seed_from_u64(4)).unwrap();
        assert!(matches!(best, Some(Move::Left | Move::Right)), "{best:?}");
        assert!(!branches[Move::Up.index()].legal);
    }

    #[test]
    fn expired_deadline_still_expands_every_root_action() {
        let b = Board::from_grid([[2, 0, 0, 0], [0, 0, 4, 0], [0; 4], [0; 4]]).unwrap();
        let cfg = MctsConfig::default().with_budget(1_000_000).with_threads(4).with_time_limit(Duration::ZERO);
        let tree = MctsParallel::with_config(cfg).search(b, &mut StdRng::seed_from_u64(5)).unwrap();
        assert!(tree.root().untried.is_empty());
        assert!(tree.stats().iterations >= b.legal_moves().len() as u64);
        assert!(tree.stats().iterations < 1_000);
        assert_visit_invariants(&tree);
    }

    #[test]
    fn worker_error_aborts_the_search() {
        let mut mcts = MctsParallel::with_engine(LyingEngine, MctsConfig::for_testing().with_threads(4));
        let err = mcts.search(Board::EMPTY, &mut StdRng::seed_from_u64(6)).unwrap_err();
        assert!(matches!(err, SearchError::InvalidAction { .. }));
    }
}
