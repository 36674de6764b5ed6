//! Selection and expansion.
//!
//! The walk starts at the root and at every node either expands one untried
//! action (chosen uniformly, which ends the walk) or follows the UCT-best
//! action. It also stops on a terminal node, on a board registered for the
//! first time, or on a board already visited during this walk.

use rand::Rng;

use crate::engine::{Board, GameEngine, Move, MoveSet};

use super::node::{Node, NodeId};
use super::registry::StateRegistry;
use super::{pick_uniform, SearchError};

/// One move of a walk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub parent: NodeId,
    pub mv: Move,
    pub child: NodeId,
    /// Merge reward of the move.
    pub reward: u32,
}

/// Result of one walk.
#[derive(Debug, Clone)]
pub struct Descent {
    /// Root-to-frontier moves; empty only when the root itself is terminal.
    pub path: Vec<Step>,
    /// Board the rollout starts from.
    pub frontier: Board,
    /// The walk ended on a board it had already visited.
    pub cycle_cut: bool,
}

/// Walk from `root` to a frontier, expanding at most one action.
///
/// Every edge on the returned path carries one virtual visit; the matching
/// backpropagation removes it.
pub fn descend<E: GameEngine, R: Rng + ?Sized>(
    registry: &mut StateRegistry,
    root: NodeId,
    engine: &E,
    exploration: f64,
    rng: &mut R,
) -> Result<Descent, SearchError> {
    let mut path = Vec::new();
    let mut seen = vec![root];
    let mut current = root;
    let mut cycle_cut = false;

    loop {
        let node = registry.get(current);
        if node.is_terminal() {
            break;
        }
        let board = node.key();
        let expanding = !node.untried.is_empty();
        let mv = if expanding {
            let mv = pick_uniform(node.untried, rng).ok_or(SearchError::NoSelectableAction { board })?;
            registry.get_mut(current).untried.remove(mv);
            mv
        } else {
            uct_action(node, exploration, rng)?
        };

        let transition = engine.apply(board, mv, rng)?;
        let (child, created) = registry.get_or_create(engine, transition.board);
        let parent = registry.get_mut(current);
        parent.add_child(mv, child);
        parent.edge_mut(mv).ok_or(SearchError::InvalidAction { mv, board })?.virtual_visits += 1;
        path.push(Step { parent: current, mv, child, reward: transition.reward });
        current = child;

        if seen.contains(&child) {
            cycle_cut = true;
            break;
        }
        seen.push(child);
        if expanding || created {
            break;
        }
    }

    Ok(Descent { path, frontier: registry.get(current).key(), cycle_cut })
}

/// `argmax_a Q(a) + C * sqrt(ln N(s) / N(a))`, ties broken uniformly at random.
///
/// Only valid once every edge has been visited; an unvisited edge is a
/// [`SearchError::DegenerateStatistics`].
pub fn uct_action<R: Rng + ?Sized>(node: &Node, exploration: f64, rng: &mut R) -> Result<Move, SearchError> {
    let in_flight: u32 = node.edges().map(|(_, edge)| edge.virtual_visits).sum();
    let ln_parent = ((node.visit_count + in_flight) as f64).ln();
    let mut best = f64::NEG_INFINITY;
    let mut ties = MoveSet::EMPTY;
    for (mv, edge) in node.edges() {
        if edge.total_visits() == 0 {
            return Err(SearchError::DegenerateStatistics { mv, board: node.key() });
        }
        let score = edge.action_value() + exploration * (ln_parent / edge.total_visits() as f64).sqrt();
        if score > best {
            best = score;
            ties = MoveSet::EMPTY;
            ties.insert(mv);
        } else if score == best {
            ties.insert(mv);
        }
    }
    pick_uniform(ties, rng).ok_or(SearchError::NoSelectableAction { board: node.key() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Classic;
    use crate::mcts::testing::{LyingEngine, ToggleEngine, A, B};
    use rand::{rngs::StdRng, SeedableRng};

    fn visited(node: &mut Node, mv: Move, visits: u32, total: f64) {
        let edge = node.edge_mut(mv).unwrap();
        edge.visits = visits;
        edge.total_value = total;
        node.visit_count += visits;
    }

    #[test]
    fn first_walk_expands_one_untried_action() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut registry = StateRegistry::new();
        let b = Board::from_grid([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]).unwrap();
        let (root, _) = registry.get_or_create(&Classic, b);
        let descent = descend(&mut registry, root, &Classic, 50.0, &mut rng).unwrap();

        assert_eq!(descent.path.len(), 1);
        let step = descent.path[0];
        let root_node = registry.get(root);
        assert!(!root_node.untried.contains(step.mv));
        assert_eq!(root_node.untried.len(), root_node.legal().len() - 1);
        assert_eq!(root_node.children(step.mv), &[step.child]);
        assert_eq!(root_node.edge(step.mv).unwrap().virtual_visits, 1);
        assert_eq!(registry.get(step.child).key(), descent.frontier);
        assert!(!descent.cycle_cut);
    }

    #[test]
    fn terminal_root_yields_empty_path() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut registry = StateRegistry::new();
        let b = Board::from_grid([[2, 4, 2, 4], [4, 2, 4, 2], [2, 4, 2, 4], [4, 2, 4, 2]]).unwrap();
        let (root, _) = registry.get_or_create(&Classic, b);
        let descent = descend(&mut registry, root, &Classic, 50.0, &mut rng).unwrap();
        assert!(descent.path.is_empty());
        assert_eq!(descent.frontier, b);
    }

    #[test]
    fn uct_prefers_higher_mean_at_equal_visits() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut node = Node::new(Board::EMPTY, [Move::Up, Move::Left].into_iter().collect());
        visited(&mut node, Move::Up, 5, 50.0);
        visited(&mut node, Move::Left, 5, 10.0);
        assert_eq!(uct_action(&node, 1.0, &mut rng).unwrap(), Move::Up);
    }

    #[test]
    fn uct_explores_rarely_visited_edge() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut node = Node::new(Board::EMPTY, [Move::Up, Move::Left].into_iter().collect());
        visited(&mut node, Move::Up, 100, 1000.0);
        visited(&mut node, Move::Left, 1, 9.0);
        // Q(up)=10, Q(left)=9; with C=50 the bonus of the single-visit edge wins.
        assert_eq!(uct_action(&node, 50.0, &mut rng).unwrap(), Move::Left);
        assert_eq!(uct_action(&node, 0.0, &mut rng).unwrap(), Move::Up);
    }

    #[test]
    fn uct_breaks_exact_ties_randomly() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut node = Node::new(Board::EMPTY, MoveSet::ALL);
        for mv in Move::ALL {
            visited(&mut node, mv, 3, 6.0);
        }
        let mut counts = [0u32; 4];
        for _ in 0..400 {
            counts[uct_action(&node, 50.0, &mut rng).unwrap().index()] += 1;
        }
        assert!(counts.iter().all(|&c| c > 50), "{counts:?}");
    }

    #[test]
    fn uct_on_unvisited_edge_is_degenerate() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut node = Node::new(Board::EMPTY, [Move::Up, Move::Down].into_iter().collect());
        visited(&mut node, Move::Up, 2, 1.0);
        let err = uct_action(&node, 50.0, &mut rng).unwrap_err();
        assert!(matches!(err, SearchError::DegenerateStatistics { mv: Move::Down, .. }));
    }

    #[test]
    fn in_flight_visit_counts_for_uct() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut node = Node::new(Board::EMPTY, [Move::Up, Move::Down].into_iter().collect());
        visited(&mut node, Move::Up, 2, 1.0);
        node.edge_mut(Move::Down).unwrap().virtual_visits = 1;
        assert!(uct_action(&node, 50.0, &mut rng).is_ok());
    }

    #[test]
    fn walk_stops_when_a_board_repeats() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut registry = StateRegistry::new();
        let (root, _) = registry.get_or_create(&ToggleEngine, A);

        // Two expansions exhaust the root's untried moves; both land on B,
        // which is then expanded twice, back onto A.
        for _ in 0..4 {
            let descent = descend(&mut registry, root, &ToggleEngine, 1.0, &mut rng).unwrap();
            super::super::backprop::backpropagate(&mut registry, &descent.path, 0.0).unwrap();
        }
        assert_eq!(registry.len(), 2);

        // Now every edge is visited and A <-> B loops forever under UCT;
        // the guard ends the walk back at the root.
        let descent = descend(&mut registry, root, &ToggleEngine, 1.0, &mut rng).unwrap();
        assert!(descent.cycle_cut);
        assert_eq!(descent.frontier, A);
        assert_eq!(descent.path.len(), 2);
        assert_eq!(registry.get(descent.path[0].child).key(), B);
    }

    #[test]
    fn engine_rejection_aborts_walk() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut registry = StateRegistry::new();
        let (root, _) = registry.get_or_create(&LyingEngine, Board::EMPTY);
        let err = descend(&mut registry, root, &LyingEngine, 1.0, &mut rng).unwrap_err();
        assert!(matches!(err, SearchError::InvalidAction { board, .. } if board == Board::EMPTY));
    }
}
