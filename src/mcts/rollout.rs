//! Default policy: a short uniformly random playout scored by the heuristic.

use ahash::RandomState as AHasher;
use rand::Rng;
use std::collections::HashSet;

use crate::engine::{Board, GameEngine};

use super::heuristic::evaluate;
use super::{pick_uniform, MctsConfig, SearchError};

/// Outcome of one playout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rollout {
    /// `score_weight * reward + evaluate(board)`.
    pub value: f64,
    /// Merge reward accumulated along the playout.
    pub reward: u64,
    pub steps: u32,
    /// Stopped because a board repeated.
    pub cycle_cut: bool,
    /// Board the playout ended on.
    pub board: Board,
}

/// Play up to `cfg.rollout_depth` random legal moves from `start`.
///
/// Stops early on a terminal board or a board already seen in this playout.
/// `seen` is scratch space; it is cleared on entry so callers can reuse it.
pub fn rollout<E: GameEngine, R: Rng + ?Sized>(
    engine: &E,
    start: Board,
    cfg: &MctsConfig,
    rng: &mut R,
    seen: &mut HashSet<u64, AHasher>,
) -> Result<Rollout, SearchError> {
    seen.clear();
    seen.insert(engine.canonical_key(start));
    let mut board = start;
    let mut reward = 0u64;
    let mut steps = 0;
    let mut cycle_cut = false;

    while steps < cfg.rollout_depth {
        let Some(mv) = pick_uniform(engine.legal_actions(board), rng) else { break };
        let transition = engine.apply(board, mv, rng)?;
        board = transition.board;
        reward += transition.reward as u64;
        steps += 1;
        if !seen.insert(engine.canonical_key(board)) {
            cycle_cut = true;
            break;
        }
    }

    let value = cfg.score_weight * reward as f64 + evaluate(board, &cfg.heuristic);
    Ok(Rollout { value, reward, steps, cycle_cut, board })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Classic;
    use crate::mcts::testing::{LyingEngine, ToggleEngine, A, B};
    use rand::{rngs::StdRng, SeedableRng};

    fn scratch() -> HashSet<u64, AHasher> {
        HashSet::with_hasher(AHasher::new())
    }

    #[test]
    fn zero_depth_is_pure_evaluation() {
        let mut rng = StdRng::seed_from_u64(1);
        let cfg = MctsConfig::default().with_rollout_depth(0);
        let b = Board::from_grid([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]).unwrap();
        let r = rollout(&Classic, b, &cfg, &mut rng, &mut scratch()).unwrap();
        assert_eq!(r.steps, 0);
        assert_eq!(r.reward, 0);
        assert_eq!(r.board, b);
        assert_eq!(r.value, evaluate(b, &cfg.heuristic));
    }

    #[test]
    fn terminal_start_stops_immediately() {
        let mut rng = StdRng::seed_from_u64(1);
        let b = Board::from_grid([[2, 4, 2, 4], [4, 2, 4, 2], [2, 4, 2, 4], [4, 2, 4, 2]]).unwrap();
        let r = rollout(&Classic, b, &MctsConfig::default(), &mut rng, &mut scratch()).unwrap();
        assert_eq!(r.steps, 0);
        assert!(!r.cycle_cut);
    }

    #[test]
    fn value_combines_reward_and_heuristic() {
        let mut rng = StdRng::seed_from_u64(21);
        let cfg = MctsConfig::default().with_rollout_depth(30);
        let b = Board::from_grid([[2, 2, 4, 8], [0, 2, 0, 0], [0; 4], [0; 4]]).unwrap();
        let r = rollout(&Classic, b, &cfg, &mut rng, &mut scratch()).unwrap();
        assert!(r.steps <= 30);
        assert!(r.steps == 30 || Classic.is_terminal(r.board));
        let expected = cfg.score_weight * r.reward as f64 + evaluate(r.board, &cfg.heuristic);
        assert!((r.value - expected).abs() < 1e-9);
    }

    #[test]
    fn same_seed_same_playout() {
        let cfg = MctsConfig::default();
        let b = Board::from_grid([[2, 0, 0, 4], [0; 4], [0, 0, 2, 0], [0; 4]]).unwrap();
        let first = rollout(&Classic, b, &cfg, &mut StdRng::seed_from_u64(5), &mut scratch()).unwrap();
        let second = rollout(&Classic, b, &cfg, &mut StdRng::seed_from_u64(5), &mut scratch()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn repeated_board_cuts_the_playout() {
        let mut rng = StdRng::seed_from_u64(3);
        let r = rollout(&ToggleEngine, A, &MctsConfig::default(), &mut rng, &mut scratch()).unwrap();
        // A -> B -> A
        assert_eq!(r.steps, 2);
        assert!(r.cycle_cut);
        assert_eq!(r.board, A);
        let r = rollout(&ToggleEngine, B, &MctsConfig::default(), &mut rng, &mut scratch()).unwrap();
        assert_eq!(r.board, B);
    }

    #[test]
    fn engine_rejection_propagates() {
        let mut rng = StdRng::seed_from_u64(3);
        let err = rollout(&LyingEngine, Board::EMPTY, &MctsConfig::default(), &mut rng, &mut scratch()).unwrap_err();
        assert!(matches!(err, SearchError::InvalidAction { .. }));
    }
}
