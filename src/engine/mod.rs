//! Table-driven 2048 engine and the transition interface the search consumes.
//!
//! Rows are shifted through 65,536-entry lookup tables (one per direction)
//! which also carry the merge reward of every line, so a full move costs four
//! table reads. Columns reuse the row tables on the transposed board.
//!
//! The search never calls the board methods directly; it goes through
//! [`GameEngine`], implemented here by [`Classic`].

use rand::Rng;
use std::sync::OnceLock;

pub mod state;

pub use state::{Board, Move, MoveSet};

/// Largest exponent a nibble can hold (2^15 = 32768). Two such tiles never merge.
pub(crate) const MAX_EXPONENT: u64 = 15;

const LINE_TABLE_SIZE: usize = 0x1_0000; // 65,536 possible 16-bit lines

type BoardRaw = u64;
type Line = u64;
type Tile = u64;
type Reward = u32;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid tile {value} at row {row}, column {col}: expected 0 or a power of two in 2..=32768")]
    InvalidTile { row: usize, col: usize, value: u32 },
    #[error("move {mv} does not change board {board:?}")]
    IllegalMove { mv: Move, board: Board },
}

/// Result of applying one move: the post-spawn board and the merge reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub board: Board,
    pub reward: u32,
}

/// Board mechanics as seen by the search.
///
/// Boards are `Copy` values and implementations hold no per-game state, so
/// "cloning an engine at a board" is just copying the board.
pub trait GameEngine {
    /// Moves that would change `board`. Deterministic.
    fn legal_actions(&self, board: Board) -> MoveSet;

    /// Merge/compact in `mv`, then spawn one random tile.
    ///
    /// Fails with [`EngineError::IllegalMove`] when `mv` is not legal on `board`.
    fn apply<R: Rng + ?Sized>(&self, board: Board, mv: Move, rng: &mut R) -> Result<Transition, EngineError>;

    /// True iff no move is legal.
    fn is_terminal(&self, board: Board) -> bool { self.legal_actions(board).is_empty() }

    /// Content identity: equal boards give equal keys.
    fn canonical_key(&self, board: Board) -> u64 { board.raw() }
}

/// The standard game: spawns a 2 with probability 0.9, otherwise a 4.
///
/// ```
/// use mcts_2048::engine::{Board, Classic, GameEngine, Move};
/// use rand::{rngs::StdRng, SeedableRng};
/// let mut rng = StdRng::seed_from_u64(3);
/// let b = Board::from_grid([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]).unwrap();
/// let t = Classic.apply(b, Move::Left, &mut rng).unwrap();
/// assert_eq!(t.reward, 4);
/// assert_eq!(t.board.tile_value(0, 0), 4);
/// assert!(!Classic.is_terminal(t.board));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Classic;

impl GameEngine for Classic {
    #[inline]
    fn legal_actions(&self, board: Board) -> MoveSet { board.legal_moves() }

    fn apply<R: Rng + ?Sized>(&self, board: Board, mv: Move, rng: &mut R) -> Result<Transition, EngineError> {
        let (moved, reward) = board.shift_with_reward(mv);
        if moved == board {
            return Err(EngineError::IllegalMove { mv, board });
        }
        Ok(Transition { board: moved.with_random_tile(rng), reward })
    }
}

struct Stores {
    shift_left: Box<[u64]>,
    shift_right: Box<[u64]>,
    shift_up: Box<[u64]>,
    shift_down: Box<[u64]>,
    reward_left: Box<[Reward]>,
    reward_right: Box<[Reward]>,
}

static STORES: OnceLock<Stores> = OnceLock::new();

/// Initialize internal tables. Safe to call multiple times; tables are also
/// built lazily on first use.
pub fn new() {
    let _ = stores();
}

/// Slide/merge tiles in the given direction. No randomness.
pub fn shift(board: Board, direction: Move) -> Board { board.shift(direction) }

/// True if no move in any direction changes the board.
pub fn is_game_over(board: Board) -> bool { board.is_game_over() }

// Credit to Nneonneo
pub(crate) fn transpose(x: BoardRaw) -> BoardRaw {
    let a1 = x & 0xF0F00F0FF0F00F0F;
    let a2 = x & 0x0000F0F00000F0F0;
    let a3 = x & 0x0F0F00000F0F0000;
    let a = a1 | (a2 << 12) | (a3 >> 12);
    let b1 = a & 0xFF00FF0000FF00FF;
    let b2 = a & 0x00FF00FF00000000;
    let b3 = a & 0x00000000FF00FF00;
    b1 | (b2 >> 24) | (b3 << 24)
}

pub(crate) fn extract_line(board: BoardRaw, line_idx: u64) -> Line {
    (board >> ((3 - line_idx) * 16)) & 0xffff
}

pub(crate) fn line_to_vec(line: Line) -> Vec<Tile> {
    (0..4).map(|tile_idx| line >> ((3 - tile_idx) * 4) & 0xf).collect()
}

// https://stackoverflow.com/questions/38225571/count-number-of-zero-nibbles-in-an-unsigned-64-bit-integer
/// Count the number of zero tiles.
pub fn count_empty(board: Board) -> u64 {
    16 - count_non_empty(board)
}

/// Highest tile value on the board (0 for an empty board).
pub fn get_highest_tile_val(board: Board) -> u32 {
    let max_exponent = (0..16).map(|idx| (board.0 >> (60 - 4 * idx)) & 0xf).max().unwrap_or(0);
    if max_exponent == 0 { 0 } else { 1 << max_exponent }
}

fn count_non_empty(board: Board) -> u64 {
    let mut board_copy = board.0;
    board_copy |= board_copy >> 1;
    board_copy |= board_copy >> 2;
    board_copy &= 0x1111111111111111;
    board_copy.count_ones() as u64
}

fn create_stores() -> Stores {
    // Allocate on the heap to avoid large stack frames
    let mut shift_left = vec![0u64; LINE_TABLE_SIZE];
    let mut shift_right = vec![0u64; LINE_TABLE_SIZE];
    let mut shift_up = vec![0u64; LINE_TABLE_SIZE];
    let mut shift_down = vec![0u64; LINE_TABLE_SIZE];
    let mut reward_left = vec![0 as Reward; LINE_TABLE_SIZE];
    let mut reward_right = vec![0 as Reward; LINE_TABLE_SIZE];

    for val in 0..LINE_TABLE_SIZE {
        let tiles = line_to_vec(val as u64);
        let (left, left_reward) = shift_vec_left(tiles.clone());
        let (right, right_reward) = shift_vec_right(tiles);
        shift_left[val] = vec_to_row(&left);
        shift_right[val] = vec_to_row(&right);
        shift_up[val] = vec_to_col(&left);
        shift_down[val] = vec_to_col(&right);
        reward_left[val] = left_reward;
        reward_right[val] = right_reward;
    }

    Stores {
        shift_left: shift_left.into_boxed_slice(),
        shift_right: shift_right.into_boxed_slice(),
        shift_up: shift_up.into_boxed_slice(),
        shift_down: shift_down.into_boxed_slice(),
        reward_left: reward_left.into_boxed_slice(),
        reward_right: reward_right.into_boxed_slice(),
    }
}

#[inline(always)]
fn stores() -> &'static Stores {
    STORES.get_or_init(create_stores)
}

pub(crate) fn shift_rows(board: Board, move_dir: Move) -> (Board, Reward) {
    let s = stores();
    let (table, rewards): (&[u64], &[Reward]) = match move_dir {
        Move::Right => (&s.shift_right, &s.reward_right),
        _ => (&s.shift_left, &s.reward_left),
    };
    (0..4).fold((Board(0), 0), |(new_board, reward), row_idx| {
        let row_val = extract_line(board.0, row_idx) as usize;
        (
            Board(new_board.0 | (table[row_val] << (48 - (16 * row_idx)))),
            reward + rewards[row_val],
        )
    })
}

pub(crate) fn shift_cols(board: Board, move_dir: Move) -> (Board, Reward) {
    let transpose_board = transpose(board.0);
    let s = stores();
    let (table, rewards): (&[u64], &[Reward]) = match move_dir {
        Move::Down => (&s.shift_down, &s.reward_right),
        _ => (&s.shift_up, &s.reward_left),
    };
    (0..4).fold((Board(0), 0), |(new_board, reward), col_idx| {
        let col_val = extract_line(transpose_board, col_idx) as usize;
        (
            Board(new_board.0 | (table[col_val] << (12 - (4 * col_idx)))),
            reward + rewards[col_val],
        )
    })
}

fn vec_to_row(tiles: &[Tile]) -> Line {
    tiles[0] << 12 | tiles[1] << 8 | tiles[2] << 4 | tiles[3]
}

fn vec_to_col(tiles: &[Tile]) -> Line {
    tiles[0] << 48 | tiles[1] << 32 | tiles[2] << 16 | tiles[3]
}

fn shift_vec_right(vec: Vec<Tile>) -> (Vec<Tile>, Reward) {
    let rev_vec: Vec<Tile> = vec.into_iter().rev().collect();
    let (shifted, reward) = shift_vec_left(rev_vec);
    (shifted.into_iter().rev().collect(), reward)
}

fn shift_vec_left(mut vec: Vec<Tile>) -> (Vec<Tile>, Reward) {
    let mut reward = 0;
    for i in 0..4 {
        if let Some(merged) = calculate_left_shift(&mut vec[i..]) {
            reward += 1 << merged;
        }
    }
    (vec, reward)
}

/// Pull the first tile of `slice` to the front, merging it with the next
/// equal tile. Returns the merged exponent, if a merge happened.
fn calculate_left_shift(slice: &mut [Tile]) -> Option<Tile> {
    let mut acc = 0;
    let mut merged = None;
    for idx in 0..slice.len() {
        let val = slice[idx];
        if val == 0 {
            continue;
        }
        if acc == 0 {
            slice[idx] = 0;
            acc = val;
        } else if acc == val && acc < MAX_EXPONENT {
            slice[idx] = 0;
            acc += 1;
            merged = Some(acc);
            break;
        } else {
            break;
        }
    }
    slice[0] = acc;
    merged
}
