use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::engine::{self as GameEngine, Board};

/// Weights and normalizers for the positional evaluator.
///
/// `value = empty_weight * empties / empty_norm
///        + monotonicity_weight * monotonicity / monotonicity_norm
///        - smoothness_weight * roughness / smoothness_norm
///        + corner_weight * [max tile in a corner]
///        + merge_weight * merges / merge_norm`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicWeights {
    pub empty_weight: f64,
    pub monotonicity_weight: f64,
    pub smoothness_weight: f64,
    pub corner_weight: f64,
    pub merge_weight: f64,
    pub empty_norm: f64,
    pub monotonicity_norm: f64,
    pub smoothness_norm: f64,
    pub merge_norm: f64,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        Self {
            empty_weight: 2.0,
            monotonicity_weight: 1.0,
            smoothness_weight: 1.0,
            corner_weight: 0.5,
            merge_weight: 0.5,
            empty_norm: 16.0,
            monotonicity_norm: 10.0,
            smoothness_norm: 20.0,
            merge_norm: 24.0,
        }
    }
}

/// Raw (unweighted, unnormalized) board features. All tile arithmetic is in
/// log2 space, i.e. on the stored exponents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Features {
    /// Zero cells (0..=16).
    pub empty: u32,
    /// Sum over the 8 lines of max(total increase, total decrease).
    pub monotonicity: u32,
    /// Sum of |log a - log b| over orthogonally adjacent nonzero pairs.
    pub roughness: u32,
    /// Orthogonally adjacent equal nonzero pairs (0..=24).
    pub merges: u32,
    /// The largest tile sits in a corner.
    pub max_in_corner: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct LineFeatures {
    empty: u8,
    monotonicity: u8,
    roughness: u8,
    merges: u8,
}

static LINE_FEATURES: OnceLock<Box<[LineFeatures]>> = OnceLock::new();

/// Build the line table now instead of on the first evaluation.
pub fn warm() {
    let _ = line_features();
}

fn line_features() -> &'static [LineFeatures] {
    LINE_FEATURES
        .get_or_init(|| {
            (0..0x1_0000u64).map(calc_line_features).collect::<Vec<_>>().into_boxed_slice()
        })
        .as_ref()
}

impl Features {
    /// Feature counts for `board`.
    ///
    /// Every feature except the corner test decomposes over rows and columns,
    /// so it is four row lookups plus four column lookups. Empties are only
    /// counted on rows.
    pub fn of(board: Board) -> Self {
        let table = line_features();
        let transposed = GameEngine::transpose(board.raw());
        let mut features = Features::default();
        for line_idx in 0..4 {
            let row = table[GameEngine::extract_line(board.raw(), line_idx) as usize];
            let col = table[GameEngine::extract_line(transposed, line_idx) as usize];
            features.empty += row.empty as u32;
            features.monotonicity += (row.monotonicity + col.monotonicity) as u32;
            features.roughness += (row.roughness + col.roughness) as u32;
            features.merges += (row.merges + col.merges) as u32;
        }
        features.max_in_corner = max_in_corner(board);
        features
    }
}

/// Heuristic value of a board. Pure: same board and weights, same value.
///
/// ```
/// use mcts_2048::engine::Board;
/// use mcts_2048::mcts::{evaluate, HeuristicWeights};
/// let b = Board::from_grid([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]).unwrap();
/// let w = HeuristicWeights::default();
/// assert_eq!(evaluate(b, &w), evaluate(b, &w));
/// ```
pub fn evaluate(board: Board, weights: &HeuristicWeights) -> f64 {
    let f = Features::of(board);
    let corner = if f.max_in_corner { 1.0 } else { 0.0 };
    weights.empty_weight * f.empty as f64 / weights.empty_norm
        + weights.monotonicity_weight * f.monotonicity as f64 / weights.monotonicity_norm
        - weights.smoothness_weight * f.roughness as f64 / weights.smoothness_norm
        + weights.corner_weight * corner
        + weights.merge_weight * f.merges as f64 / weights.merge_norm
}

fn calc_line_features(line: u64) -> LineFeatures {
    let tiles = GameEngine::line_to_vec(line);
    LineFeatures {
        empty: tiles.iter().filter(|&&t| t == 0).count() as u8,
        monotonicity: calc_monotonicity(&tiles),
        roughness: calc_roughness(&tiles),
        merges: calc_merges(&tiles),
    }
}

fn calc_monotonicity(line: &[u64]) -> u8 {
    let (mut increase, mut decrease) = (0, 0);
    for pair in line.windows(2) {
        if pair[0] < pair[1] {
            increase += pair[1] - pair[0];
        } else {
            decrease += pair[0] - pair[1];
        }
    }
    increase.max(decrease) as u8
}

fn calc_roughness(line: &[u64]) -> u8 {
    line.windows(2)
        .filter(|pair| pair[0] != 0 && pair[1] != 0)
        .map(|pair| pair[0].abs_diff(pair[1]))
        .sum::<u64>() as u8
}

fn calc_merges(line: &[u64]) -> u8 {
    line.windows(2).filter(|pair| pair[0] != 0 && pair[0] == pair[1]).count() as u8
}

fn max_in_corner(board: Board) -> bool {
    let max = (0..4)
        .flat_map(|row| (0..4).map(move |col| (row, col)))
        .map(|(row, col)| board.exponent(row, col))
        .max()
        .unwrap_or(0);
    [(0, 0), (0, 3), (3, 0), (3, 3)].iter().any(|&(row, col)| board.exponent(row, col) == max)
}
