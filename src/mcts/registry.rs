//! Board-keyed node arena for a single search.
//!
//! Nodes are stored contiguously and referenced by [`NodeId`]; the key map
//! guarantees one node per distinct board, which turns the search tree into
//! a DAG. Nothing points between nodes except ids, so dropping the registry
//! frees the whole graph at once.

use ahash::RandomState as AHasher;
use std::collections::HashMap;

use crate::engine::{Board, GameEngine};

use super::node::{Node, NodeId};

#[derive(Debug, Default)]
pub struct StateRegistry {
    nodes: Vec<Node>,
    index: HashMap<u64, NodeId, AHasher>,
}

impl StateRegistry {
    pub fn new() -> Self { Self::default() }

    /// Node for `board`, creating it on first sight.
    ///
    /// A new node gets one zeroed edge per legal action, all of them untried.
    /// Returns whether the node was created by this call.
    pub fn get_or_create<E: GameEngine>(&mut self, engine: &E, board: Board) -> (NodeId, bool) {
        let key = engine.canonical_key(board);
        if let Some(&id) = self.index.get(&key) {
            return (id, false);
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(board, engine.legal_actions(board)));
        self.index.insert(key, id);
        (id, true)
    }

    pub fn lookup<E: GameEngine>(&self, engine: &E, board: Board) -> Option<NodeId> {
        self.index.get(&engine.canonical_key(board)).copied()
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> &Node { &self.nodes[id.0 as usize] }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut Node { &mut self.nodes[id.0 as usize] }

    #[inline]
    pub fn len(&self) -> usize { self.nodes.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i as u32), node))
    }
}
