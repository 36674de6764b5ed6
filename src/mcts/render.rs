//! Text dump of a finished search, for debugging and the CLI's `--dump-depth`.

use std::fmt::Write;

use super::node::NodeId;
use super::SearchTree;

impl SearchTree {
    /// Depth-first listing of the graph from the root, `max_depth` moves deep.
    ///
    /// Actions appear in `Up, Down, Left, Right` order and children by board
    /// value, so the output depends only on the tree's contents. A node
    /// reachable along several paths is expanded the first time only.
    ///
    /// ```
    /// use mcts_2048::engine::Board;
    /// use mcts_2048::mcts::{Mcts, MctsConfig};
    /// use rand::{rngs::StdRng, SeedableRng};
    /// let b = Board::from_grid([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]).unwrap();
    /// let tree = Mcts::with_config(MctsConfig::for_testing()).search(b, &mut StdRng::seed_from_u64(1)).unwrap();
    /// let dump = tree.render(1);
    /// assert!(dump.starts_with("#0 "));
    /// assert!(dump.contains("LEFT"));
    /// ```
    pub fn render(&self, max_depth: usize) -> String {
        let mut out = String::new();
        let mut shown = vec![false; self.len()];
        self.render_node(self.root_id(), 0, max_depth, &mut shown, &mut out);
        out
    }

    fn render_node(&self, id: NodeId, depth: usize, max_depth: usize, shown: &mut [bool], out: &mut String) {
        let indent = "  ".repeat(depth * 2);
        let node = self.node(id);
        if shown[id.0 as usize] {
            let _ = writeln!(out, "{indent}#{} [seen]", id.0);
            return;
        }
        shown[id.0 as usize] = true;
        let _ = writeln!(
            out,
            "{indent}#{} {:?} N={} untried={:?}{}",
            id.0,
            node.key(),
            node.visit_count,
            node.untried,
            if node.is_terminal() { " terminal" } else { "" },
        );
        if depth >= max_depth {
            return;
        }
        for (mv, edge) in node.edges() {
            let children = node.children(mv);
            let _ = writeln!(
                out,
                "{indent}  {mv} n={} q={:.2} w={:.2} children={}",
                edge.visits,
                edge.action_value(),
                edge.total_value,
                children.len(),
            );
            let mut ordered = children.to_vec();
            ordered.sort_by_key(|&child| self.node(child).key().raw());
            for child in ordered {
                self.render_node(child, depth + 1, max_depth, shown, out);
            }
        }
    }
}
