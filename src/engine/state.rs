use rand::Rng;
use std::fmt;

use super::{count_empty, get_highest_tile_val, shift_cols, shift_rows, EngineError, MAX_EXPONENT};

/// A direction to move/merge tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Move {
    Up,
    Down,
    Left,
    Right,
}

impl Move {
    /// Canonical order. Also used to break ties when picking the final move.
    pub const ALL: [Move; 4] = [Move::Up, Move::Down, Move::Left, Move::Right];

    /// Position of this move in [`Move::ALL`].
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Move::Up => 0,
            Move::Down => 1,
            Move::Left => 2,
            Move::Right => 3,
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Move::Up => "UP",
            Move::Down => "DOWN",
            Move::Left => "LEFT",
            Move::Right => "RIGHT",
        };
        f.write_str(s)
    }
}

/// A set of moves packed into the low four bits of a byte.
///
/// Iteration always follows [`Move::ALL`] order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MoveSet(u8);

impl MoveSet {
    pub const EMPTY: MoveSet = MoveSet(0);
    pub const ALL: MoveSet = MoveSet(0b1111);

    #[inline]
    pub fn contains(self, mv: Move) -> bool { self.0 & (1 << mv.index()) != 0 }

    #[inline]
    pub fn insert(&mut self, mv: Move) { self.0 |= 1 << mv.index(); }

    #[inline]
    pub fn remove(&mut self, mv: Move) { self.0 &= !(1 << mv.index()); }

    #[inline]
    pub fn len(self) -> usize { self.0.count_ones() as usize }

    #[inline]
    pub fn is_empty(self) -> bool { self.0 == 0 }

    pub fn iter(self) -> impl Iterator<Item = Move> {
        Move::ALL.into_iter().filter(move |&mv| self.contains(mv))
    }

    /// The `n`-th member in canonical order.
    pub fn nth(self, n: usize) -> Option<Move> { self.iter().nth(n) }
}

impl FromIterator<Move> for MoveSet {
    fn from_iter<I: IntoIterator<Item = Move>>(iter: I) -> Self {
        let mut set = MoveSet::EMPTY;
        for mv in iter {
            set.insert(mv);
        }
        set
    }
}

impl fmt::Debug for MoveSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

type BoardRaw = u64;
type Tile = u64;

/// Packed 4x4 2048 board as 16 4-bit nibbles in a `u64`.
///
/// Each nibble holds the tile's exponent (`0` for an empty cell), row-major,
/// with cell 0 in the most significant nibble. Boards are plain values: every
/// transition returns a new board and never touches the old one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Board(pub(crate) BoardRaw);

impl Board {
    /// A constant empty board (all zeros).
    pub const EMPTY: Board = Board(0);

    /// Construct a `Board` from its raw packed representation.
    #[inline]
    pub fn from_raw(raw: BoardRaw) -> Self { Board(raw) }

    /// Borrow the raw packed `u64` for this `Board`.
    #[inline]
    pub fn raw(&self) -> BoardRaw { self.0 }

    /// Build a board from tile values, row by row.
    ///
    /// Every value must be `0` or a power of two between 2 and 32768.
    ///
    /// ```
    /// use mcts_2048::engine::Board;
    /// let b = Board::from_grid([[2, 2, 0, 0], [0; 4], [0; 4], [0, 0, 0, 1024]]).unwrap();
    /// assert_eq!(b.tile_value(0, 1), 2);
    /// assert_eq!(b.highest_tile(), 1024);
    /// assert!(Board::from_grid([[3, 0, 0, 0], [0; 4], [0; 4], [0; 4]]).is_err());
    /// ```
    pub fn from_grid(grid: [[u32; 4]; 4]) -> Result<Self, EngineError> {
        let mut raw = 0u64;
        for (row, cells) in grid.iter().enumerate() {
            for (col, &value) in cells.iter().enumerate() {
                if value == 0 {
                    continue;
                }
                let exponent = value.trailing_zeros() as u64;
                if !value.is_power_of_two() || exponent == 0 || exponent > MAX_EXPONENT {
                    return Err(EngineError::InvalidTile { row, col, value });
                }
                raw |= exponent << (60 - 4 * (row * 4 + col));
            }
        }
        Ok(Board(raw))
    }

    /// Tile values, row by row (`0` for empty cells).
    pub fn to_grid(self) -> [[u32; 4]; 4] {
        let mut grid = [[0u32; 4]; 4];
        for (row, cells) in grid.iter_mut().enumerate() {
            for (col, cell) in cells.iter_mut().enumerate() {
                *cell = self.tile_value(row, col);
            }
        }
        grid
    }

    /// Exponent stored at `(row, col)`; `0` means empty.
    #[inline]
    pub fn exponent(self, row: usize, col: usize) -> u8 {
        ((self.0 >> (60 - 4 * (row * 4 + col))) & 0xf) as u8
    }

    /// Tile value at `(row, col)`, e.g. 2, 4, 8, ... (`0` if empty).
    #[inline]
    pub fn tile_value(self, row: usize, col: usize) -> u32 {
        match self.exponent(row, col) {
            0 => 0,
            e => 1 << e,
        }
    }

    /// Return the board resulting from sliding/merging tiles in `dir` (no random insert).
    ///
    /// ```
    /// use mcts_2048::engine::{Board, Move};
    /// let b = Board::from_raw(0x0000_0000_0000_2020);
    /// assert_eq!(b.shift(Move::Left), Board::from_raw(0x0000_0000_0000_3000));
    /// ```
    #[inline]
    pub fn shift(self, dir: Move) -> Self { self.shift_with_reward(dir).0 }

    /// Slide/merge tiles in `dir`, also returning the merge reward: the sum of
    /// the values of all tiles created by merges (0 if nothing merged).
    #[inline]
    pub fn shift_with_reward(self, dir: Move) -> (Self, u32) {
        match dir {
            Move::Left | Move::Right => shift_rows(self, dir),
            Move::Up | Move::Down => shift_cols(self, dir),
        }
    }

    /// Moves that change this board, in canonical order.
    #[inline]
    pub fn legal_moves(self) -> MoveSet {
        Move::ALL.into_iter().filter(|&dir| self.shift(dir) != self).collect()
    }

    /// Insert a random 2 (90%) or 4 (10%) tile into a random empty slot, using the provided RNG.
    ///
    /// The board must have at least one empty cell.
    ///
    /// ```
    /// use mcts_2048::engine::Board;
    /// use rand::{SeedableRng, rngs::StdRng};
    /// let mut rng = StdRng::seed_from_u64(123);
    /// let b = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
    /// assert_eq!(b.count_empty(), 14);
    /// ```
    #[inline]
    pub fn with_random_tile<R: Rng + ?Sized>(self, rng: &mut R) -> Self {
        let mut index = rng.gen_range(0..count_empty(self));
        let mut tmp = self.0;
        let mut tile = generate_random_tile(rng);
        loop {
            while (tmp & 0xf) != 0 {
                tmp >>= 4;
                tile <<= 4;
            }
            if index == 0 { break; }
            index -= 1;
            tmp >>= 4;
            tile <<= 4;
        }
        Board(self.0 | tile)
    }

    /// Perform a move then insert a random tile if the move changed the board.
    #[inline]
    pub fn make_move<R: Rng + ?Sized>(self, direction: Move, rng: &mut R) -> Self {
        let moved = self.shift(direction);
        if moved != self { moved.with_random_tile(rng) } else { self }
    }

    /// Return true if no legal moves remain.
    ///
    /// ```
    /// use mcts_2048::engine::Board;
    /// // Nothing slides or merges on an empty board.
    /// assert!(Board::EMPTY.is_game_over());
    /// ```
    #[inline]
    pub fn is_game_over(self) -> bool { self.legal_moves().is_empty() }

    /// Return the highest tile value (e.g., 2048) present on the board, 0 when empty.
    #[inline]
    pub fn highest_tile(self) -> u32 { get_highest_tile_val(self) }

    /// Count the number of empty cells on the board.
    #[inline]
    pub fn count_empty(self) -> u64 { count_empty(self) }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Board({:#018x})", self.0)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..4 {
            if row > 0 {
                writeln!(f, "-------------------------------")?;
            }
            let cells: Vec<String> = (0..4).map(|col| format_val(self.tile_value(row, col))).collect();
            writeln!(f, "{}", cells.join("|"))?;
        }
        Ok(())
    }
}

impl From<BoardRaw> for Board { fn from(v: BoardRaw) -> Self { Board::from_raw(v) } }
impl From<Board> for BoardRaw { fn from(b: Board) -> Self { b.0 } }

fn generate_random_tile<R: Rng + ?Sized>(rng: &mut R) -> Tile { if rng.gen_range(0..10) < 9 { 1 } else { 2 } }

fn format_val(val: u32) -> String {
    match val {
        0 => " ".repeat(7),
        v => format!("{:^7}", v),
    }
}
