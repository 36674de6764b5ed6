//! Search-graph nodes and per-action edge statistics.
//!
//! A node stands for one distinct board. The statistics the search learns
//! from live on the edges: (node, action) pairs with their own visit counts
//! and accumulated returns.

use crate::engine::{Board, Move, MoveSet};

/// Index into the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Visit/value statistics of one (node, action) edge.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EdgeStats {
    /// N(s, a)
    pub visits: u32,
    /// Sum of the returns credited through this edge.
    pub total_value: f64,
    /// Walks currently passing through this edge whose return is not credited yet.
    pub virtual_visits: u32,
}

impl EdgeStats {
    /// Q(s, a) = total_value / visits, or 0 for an unvisited edge.
    #[inline]
    pub fn action_value(&self) -> f64 {
        if self.visits == 0 { 0.0 } else { self.total_value / self.visits as f64 }
    }

    /// Credited plus in-flight visits.
    #[inline]
    pub fn total_visits(&self) -> u32 {
        self.visits + self.virtual_visits
    }
}

/// One board in the search graph.
#[derive(Debug, Clone)]
pub struct Node {
    key: Board,
    /// N(s): incremented once per edge credit, so it always equals the sum of edge visits.
    pub visit_count: u32,
    /// Legal actions at construction; fixed for the node's lifetime.
    legal: MoveSet,
    edges: [Option<EdgeStats>; 4],
    /// Legal actions not expanded yet.
    pub untried: MoveSet,
    /// Boards reached through each action; several because of random spawns.
    children: [Vec<NodeId>; 4],
}

impl Node {
    pub fn new(key: Board, legal: MoveSet) -> Self {
        let mut edges = [None; 4];
        for mv in legal.iter() {
            edges[mv.index()] = Some(EdgeStats::default());
        }
        Self { key, visit_count: 0, legal, edges, untried: legal, children: Default::default() }
    }

    #[inline]
    pub fn key(&self) -> Board { self.key }

    /// Actions this node has edges for.
    #[inline]
    pub fn legal(&self) -> MoveSet { self.legal }

    /// Absorbing node: no legal actions.
    #[inline]
    pub fn is_terminal(&self) -> bool { self.legal.is_empty() }

    #[inline]
    pub fn edge(&self, mv: Move) -> Option<&EdgeStats> { self.edges[mv.index()].as_ref() }

    #[inline]
    pub fn edge_mut(&mut self, mv: Move) -> Option<&mut EdgeStats> { self.edges[mv.index()].as_mut() }

    /// Edges in canonical action order.
    pub fn edges(&self) -> impl Iterator<Item = (Move, &EdgeStats)> + '_ {
        Move::ALL.into_iter().filter_map(move |mv| self.edge(mv).map(|edge| (mv, edge)))
    }

    /// Boards seen after playing `mv` from here.
    #[inline]
    pub fn children(&self, mv: Move) -> &[NodeId] { &self.children[mv.index()] }

    /// Record that `mv` led to `child`. Duplicates are ignored.
    pub fn add_child(&mut self, mv: Move, child: NodeId) {
        let slot = &mut self.children[mv.index()];
        if !slot.contains(&child) {
            slot.push(child);
        }
    }
}
