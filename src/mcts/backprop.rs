//! Crediting a finished iteration and picking the final move.

use crate::engine::Move;

use super::node::Node;
use super::registry::StateRegistry;
use super::tree_policy::Step;
use super::SearchError;

/// Credit `leaf_value` back along `path`.
///
/// Walking from the frontier to the root, each edge receives the leaf value
/// plus the merge rewards of its own move and every move after it. The
/// parent's visit count grows with the edge's, and the walk's virtual visit
/// is released.
pub fn backpropagate(registry: &mut StateRegistry, path: &[Step], leaf_value: f64) -> Result<(), SearchError> {
    let mut ret = leaf_value;
    for step in path.iter().rev() {
        ret += step.reward as f64;
        let parent = registry.get_mut(step.parent);
        let board = parent.key();
        let edge = parent.edge_mut(step.mv).ok_or(SearchError::InvalidAction { mv: step.mv, board })?;
        edge.visits += 1;
        edge.total_value += ret;
        edge.virtual_visits = edge.virtual_visits.saturating_sub(1);
        parent.visit_count += 1;
    }
    Ok(())
}

/// Most-visited action; ties go to the earliest of Up, Down, Left, Right.
/// `None` for a node without edges.
pub fn most_visited(node: &Node) -> Option<Move> {
    let mut best: Option<(Move, u32)> = None;
    for (mv, edge) in node.edges() {
        if best.map_or(true, |(_, visits)| edge.visits > visits) {
            best = Some((mv, edge.visits));
        }
    }
    best.map(|(mv, _)| mv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Board, Classic, MoveSet};
    use crate::mcts::node::NodeId;

    fn chain() -> (StateRegistry, Vec<Step>) {
        let mut registry = StateRegistry::new();
        let b0 = Board::from_grid([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]).unwrap();
        let b1 = Board::from_grid([[4, 0, 0, 0], [0; 4], [0, 2, 0, 0], [0; 4]]).unwrap();
        let b2 = Board::from_grid([[4, 2, 0, 0], [0; 4], [0; 4], [0, 0, 0, 2]]).unwrap();
        let (n0, _) = registry.get_or_create(&Classic, b0);
        let (n1, _) = registry.get_or_create(&Classic, b1);
        let (n2, _) = registry.get_or_create(&Classic, b2);
        let path = vec![
            Step { parent: n0, mv: Move::Left, child: n1, reward: 4 },
            Step { parent: n1, mv: Move::Up, child: n2, reward: 0 },
        ];
        (registry, path)
    }

    #[test]
    fn return_accumulates_rewards_toward_the_root() {
        let (mut registry, path) = chain();
        backpropagate(&mut registry, &path, 10.0).unwrap();

        let deep = registry.get(path[1].parent).edge(Move::Up).unwrap();
        assert_eq!(deep.visits, 1);
        assert!((deep.total_value - 10.0).abs() < 1e-12);

        let root = registry.get(path[0].parent).edge(Move::Left).unwrap();
        assert_eq!(root.visits, 1);
        assert!((root.total_value - 14.0).abs() < 1e-12);
    }

    #[test]
    fn parent_visits_equal_sum_of_edge_visits() {
        let (mut registry, path) = chain();
        for leaf in [1.0, 2.0, 3.0] {
            backpropagate(&mut registry, &path, leaf).unwrap();
        }
        for (_, node) in registry.iter() {
            let sum: u32 = node.edges().map(|(_, e)| e.visits).sum();
            assert_eq!(node.visit_count, sum);
        }
        let root = registry.get(path[0].parent).edge(Move::Left).unwrap();
        assert!((root.action_value() - (2.0 + 4.0)).abs() < 1e-12);
    }

    #[test]
    fn releases_virtual_visits() {
        let (mut registry, path) = chain();
        for step in &path {
            registry.get_mut(step.parent).edge_mut(step.mv).unwrap().virtual_visits += 1;
        }
        backpropagate(&mut registry, &path, 0.0).unwrap();
        for step in &path {
            assert_eq!(registry.get(step.parent).edge(step.mv).unwrap().virtual_visits, 0);
        }
    }

    #[test]
    fn empty_path_is_a_no_op() {
        let (mut registry, _) = chain();
        backpropagate(&mut registry, &[], 5.0).unwrap();
        assert!(registry.iter().all(|(_, n)| n.visit_count == 0));
    }

    #[test]
    fn step_without_edge_is_rejected() {
        let (mut registry, _) = chain();
        // (2,2 / empty) has no UP edge: nothing moves.
        let bad = [Step { parent: NodeId(0), mv: Move::Up, child: NodeId(1), reward: 0 }];
        assert!(matches!(
            backpropagate(&mut registry, &bad, 0.0),
            Err(SearchError::InvalidAction { mv: Move::Up, .. })
        ));
    }

    #[test]
    fn most_visited_breaks_ties_in_canonical_order() {
        let mut node = Node::new(Board::EMPTY, MoveSet::ALL);
        for (mv, visits) in [(Move::Up, 3), (Move::Down, 7), (Move::Left, 7), (Move::Right, 1)] {
            node.edge_mut(mv).unwrap().visits = visits;
        }
        assert_eq!(most_visited(&node), Some(Move::Down));
        node.edge_mut(Move::Right).unwrap().visits = 8;
        assert_eq!(most_visited(&node), Some(Move::Right));
        assert_eq!(most_visited(&Node::new(Board::EMPTY, MoveSet::EMPTY)), None);
    }
}
