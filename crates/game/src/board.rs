//! Board state and move application.
//!
//! The board is a `width x height` grid of cells. Moves mutate the grid
//! and report every touched cell so sessions can broadcast deltas instead
//! of full snapshots.

use rand::seq::SliceRandom;

use crate::error::{GameError, GameResult};

/// Cell-update value tags (high nibble).
///
/// `SHOW_COUNT` carries the neighbor-mine count (0..=8) in the low nibble;
/// the others are bare tags.
pub const SHOW_COUNT: u8 = 0x00;
pub const SHOW_MINE: u8 = 0x10;
pub const SHOW_FLAG: u8 = 0x20;
pub const UNFLAG: u8 = 0x30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
    pub mine: bool,
    pub revealed: bool,
    pub flagged: bool,
}

/// A single cell delta as broadcast to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdatedCell {
    pub x: i32,
    pub y: i32,
    pub value: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MoveType {
    Reveal = 0x01,
    Flag = 0x02,
}

impl TryFrom<u8> for MoveType {
    type Error = GameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MoveType::Reveal),
            0x02 => Ok(MoveType::Flag),
            other => Err(GameError::UnknownMoveType(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub x: i32,
    pub y: i32,
    pub kind: MoveType,
    pub player_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveResultKind {
    NoChange,
    MineBlown,
    CellRevealed,
    Flagged,
    GameWon,
}

/// Outcome of one applied move, with every cell the move touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveResult {
    pub kind: MoveResultKind,
    pub updated_cells: Vec<Cell>,
}

#[derive(Debug, Clone)]
pub struct Board {
    width: i32,
    height: i32,
    mines: i32,
    revealed_count: i32,
    cells: Vec<Cell>,
}

impl Board {
    /// Creates a board with `mines` mines placed by shuffling the cell
    /// indices and marking the leading ones.
    pub fn new(width: i32, height: i32, mines: i32) -> GameResult<Board> {
        let mut board = Board::empty(width, height, mines)?;
        let mut positions: Vec<usize> = (0..board.cells.len()).collect();
        positions.shuffle(&mut rand::thread_rng());
        for &pos in &positions[..mines as usize] {
            board.cells[pos].mine = true;
        }
        Ok(board)
    }

    /// Creates a board with a fixed mine layout. Deterministic counterpart
    /// of [`Board::new`] for tests and tooling.
    pub fn with_mines(width: i32, height: i32, mines: &[(i32, i32)]) -> GameResult<Board> {
        let mut board = Board::empty(width, height, mines.len() as i32)?;
        for &(x, y) in mines {
            if !board.in_bounds(x, y) {
                return Err(GameError::InvalidMove {
                    x,
                    y,
                    width,
                    height,
                });
            }
            let idx = board.index(x, y);
            board.cells[idx].mine = true;
        }
        Ok(board)
    }

    fn empty(width: i32, height: i32, mines: i32) -> GameResult<Board> {
        if width <= 0 || height <= 0 || mines < 0 || mines > width * height {
            return Err(GameError::InvalidBoardParams {
                width,
                height,
                mines,
            });
        }
        let mut cells = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                cells.push(Cell {
                    x,
                    y,
                    mine: false,
                    revealed: false,
                    flagged: false,
                });
            }
        }
        Ok(Board {
            width,
            height,
            mines,
            revealed_count: 0,
            cells,
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn mines(&self) -> i32 {
        self.mines
    }

    pub fn revealed_count(&self) -> i32 {
        self.revealed_count
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < self.width && y >= 0 && y < self.height
    }

    fn index(&self, x: i32, y: i32) -> usize {
        (y * self.width + x) as usize
    }

    pub fn cell(&self, x: i32, y: i32) -> Option<&Cell> {
        if self.in_bounds(x, y) {
            Some(&self.cells[self.index(x, y)])
        } else {
            None
        }
    }

    /// All in-bounds cells adjacent to `(x, y)`, excluding the cell itself.
    fn neighbors(&self, x: i32, y: i32) -> impl Iterator<Item = (i32, i32)> + '_ {
        (-1..=1)
            .flat_map(move |dx| (-1..=1).map(move |dy| (x + dx, y + dy)))
            .filter(move |&(nx, ny)| (nx, ny) != (x, y) && self.in_bounds(nx, ny))
    }

    /// Count of mines in the (up to 8) surrounding cells.
    pub fn neighbor_mines(&self, x: i32, y: i32) -> u8 {
        self.neighbors(x, y)
            .filter(|&(nx, ny)| self.cells[self.index(nx, ny)].mine)
            .count() as u8
    }

    pub fn apply_move(&mut self, mv: Move) -> GameResult<MoveResult> {
        match mv.kind {
            MoveType::Reveal => self.reveal(mv.x, mv.y),
            MoveType::Flag => self.flag(mv.x, mv.y),
        }
    }

    /// Reveals `(x, y)`, cascading through zero-count regions.
    ///
    /// Revealing a mine ends the game (`MineBlown`); revealing the last
    /// safe cell wins it (`revealed_count + mines == width * height`).
    pub fn reveal(&mut self, x: i32, y: i32) -> GameResult<MoveResult> {
        if !self.in_bounds(x, y) {
            return Err(self.out_of_range(x, y));
        }
        let idx = self.index(x, y);
        if self.cells[idx].revealed || self.cells[idx].flagged {
            return Ok(MoveResult {
                kind: MoveResultKind::NoChange,
                updated_cells: Vec::new(),
            });
        }
        if self.cells[idx].mine {
            self.cells[idx].revealed = true;
            return Ok(MoveResult {
                kind: MoveResultKind::MineBlown,
                updated_cells: vec![self.cells[idx]],
            });
        }
        let updated = self.cascade(x, y);
        self.revealed_count += updated.len() as i32;
        let kind = if self.revealed_count + self.mines == self.width * self.height {
            MoveResultKind::GameWon
        } else {
            MoveResultKind::CellRevealed
        };
        Ok(MoveResult {
            kind,
            updated_cells: updated,
        })
    }

    /// Flood reveal: expose the target, then every connected zero-count
    /// cell and its fringe. Flagged cells are never traversed and no cell
    /// is visited twice.
    fn cascade(&mut self, x: i32, y: i32) -> Vec<Cell> {
        let mut updated = Vec::new();
        let mut stack = vec![(x, y)];
        while let Some((cx, cy)) = stack.pop() {
            let idx = self.index(cx, cy);
            if self.cells[idx].revealed || self.cells[idx].flagged {
                continue;
            }
            self.cells[idx].revealed = true;
            updated.push(self.cells[idx]);
            if self.neighbor_mines(cx, cy) == 0 {
                for (nx, ny) in self.neighbors(cx, cy).collect::<Vec<_>>() {
                    let nidx = self.index(nx, ny);
                    if !self.cells[nidx].revealed && !self.cells[nidx].flagged {
                        stack.push((nx, ny));
                    }
                }
            }
        }
        updated
    }

    /// Toggles the flag on `(x, y)`. Revealed cells cannot be flagged.
    pub fn flag(&mut self, x: i32, y: i32) -> GameResult<MoveResult> {
        if !self.in_bounds(x, y) {
            return Err(self.out_of_range(x, y));
        }
        let idx = self.index(x, y);
        if self.cells[idx].revealed {
            return Ok(MoveResult {
                kind: MoveResultKind::NoChange,
                updated_cells: Vec::new(),
            });
        }
        self.cells[idx].flagged = !self.cells[idx].flagged;
        Ok(MoveResult {
            kind: MoveResultKind::Flagged,
            updated_cells: vec![self.cells[idx]],
        })
    }

    fn out_of_range(&self, x: i32, y: i32) -> GameError {
        GameError::InvalidMove {
            x,
            y,
            width: self.width,
            height: self.height,
        }
    }

    /// Translates touched cells into wire update values from the current
    /// board state.
    pub fn cell_updates(&self, cells: &[Cell]) -> Vec<UpdatedCell> {
        cells
            .iter()
            .map(|cell| {
                let value = if cell.revealed {
                    if cell.mine {
                        SHOW_MINE
                    } else {
                        self.neighbor_mines(cell.x, cell.y)
                    }
                } else if cell.flagged {
                    SHOW_FLAG
                } else {
                    UNFLAG
                };
                UpdatedCell {
                    x: cell.x,
                    y: cell.y,
                    value,
                }
            })
            .collect()
    }

    /// Updates for every currently revealed or flagged cell; sent to
    /// players joining a game already in progress.
    pub fn changed_cell_updates(&self) -> Vec<UpdatedCell> {
        let changed: Vec<Cell> = self
            .cells
            .iter()
            .filter(|cell| cell.revealed || cell.flagged)
            .copied()
            .collect();
        self.cell_updates(&changed)
    }

    /// Iterates all cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    /// Overwrites one cell wholesale. Only snapshot decoding needs this.
    pub fn set_cell(&mut self, cell: Cell) -> GameResult<()> {
        if !self.in_bounds(cell.x, cell.y) {
            return Err(self.out_of_range(cell.x, cell.y));
        }
        let idx = self.index(cell.x, cell.y);
        self.cells[idx] = cell;
        Ok(())
    }

    /// Builds an unmined board for snapshot decoding.
    pub fn blank(width: i32, height: i32) -> GameResult<Board> {
        Board::empty(width, height, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reveal_kind(board: &mut Board, x: i32, y: i32) -> MoveResultKind {
        board.reveal(x, y).unwrap().kind
    }

    #[test]
    fn rejects_bad_params() {
        assert!(Board::new(0, 5, 1).is_err());
        assert!(Board::new(5, -1, 1).is_err());
        assert!(Board::new(3, 3, 10).is_err());
        assert!(Board::new(3, 3, 9).is_ok());
    }

    #[test]
    fn board_places_requested_mines() {
        let board = Board::new(12, 7, 20).unwrap();
        let placed = board.cells().filter(|c| c.mine).count();
        assert_eq!(placed, 20);
    }

    #[test]
    fn cascade_reveals_region_and_fringe() {
        // Mine in one corner of a 3x3: revealing the far corner floods
        // every safe cell, leaving counts 1 around the mine and 0 at the
        // origin of the flood.
        let mut board = Board::with_mines(3, 3, &[(0, 0)]).unwrap();
        let result = board.reveal(2, 2).unwrap();
        assert_eq!(result.updated_cells.len(), 8);
        assert!(result.updated_cells.iter().all(|c| !c.mine));
        assert_eq!(board.neighbor_mines(1, 1), 1);
        assert_eq!(board.neighbor_mines(2, 2), 0);
        // Every safe cell revealed at once is also an immediate win.
        assert_eq!(result.kind, MoveResultKind::GameWon);
    }

    #[test]
    fn cascade_has_no_duplicates_and_skips_flags() {
        let mut board = Board::with_mines(4, 4, &[(0, 0)]).unwrap();
        board.flag(0, 1).unwrap();
        let result = board.reveal(3, 3).unwrap();
        let mut seen = std::collections::HashSet::new();
        for cell in &result.updated_cells {
            assert!(seen.insert((cell.x, cell.y)), "cell revealed twice");
            assert!(!(cell.x == 0 && cell.y == 1), "flagged cell traversed");
        }
        assert!(!board.cell(0, 1).unwrap().revealed);
    }

    #[test]
    fn reveal_mine_blows_up() {
        let mut board = Board::with_mines(3, 3, &[(1, 1)]).unwrap();
        let result = board.reveal(1, 1).unwrap();
        assert_eq!(result.kind, MoveResultKind::MineBlown);
        assert_eq!(result.updated_cells.len(), 1);
        assert!(result.updated_cells[0].revealed);
    }

    #[test]
    fn revealing_last_safe_cell_wins() {
        // 2x2 with a mine at (0,0): revealing (1,1) cascades nothing
        // (count 1), so the three safe cells take three reveals.
        let mut board = Board::with_mines(2, 2, &[(0, 0)]).unwrap();
        assert_eq!(reveal_kind(&mut board, 1, 1), MoveResultKind::CellRevealed);
        assert_eq!(reveal_kind(&mut board, 0, 1), MoveResultKind::CellRevealed);
        assert_eq!(reveal_kind(&mut board, 1, 0), MoveResultKind::GameWon);
        assert_eq!(board.revealed_count() + board.mines(), 4);
    }

    #[test]
    fn reveal_is_idempotent() {
        let mut board = Board::with_mines(3, 3, &[(0, 0)]).unwrap();
        board.reveal(2, 2).unwrap();
        let again = board.reveal(2, 2).unwrap();
        assert_eq!(again.kind, MoveResultKind::NoChange);
        assert!(again.updated_cells.is_empty());
    }

    #[test]
    fn flag_toggles_and_ignores_revealed() {
        let mut board = Board::with_mines(3, 3, &[(0, 0)]).unwrap();
        let flagged = board.flag(1, 1).unwrap();
        assert_eq!(flagged.kind, MoveResultKind::Flagged);
        assert!(flagged.updated_cells[0].flagged);
        let unflagged = board.flag(1, 1).unwrap();
        assert!(!unflagged.updated_cells[0].flagged);

        board.reveal(2, 2).unwrap();
        let on_revealed = board.flag(2, 2).unwrap();
        assert_eq!(on_revealed.kind, MoveResultKind::NoChange);
    }

    #[test]
    fn out_of_bounds_moves_are_rejected() {
        let mut board = Board::with_mines(3, 3, &[(0, 0)]).unwrap();
        assert!(matches!(
            board.reveal(3, 0),
            Err(GameError::InvalidMove { .. })
        ));
        assert!(matches!(
            board.flag(0, -1),
            Err(GameError::InvalidMove { .. })
        ));
    }

    #[test]
    fn cell_update_values() {
        let mut board = Board::with_mines(2, 2, &[(0, 0)]).unwrap();
        board.flag(0, 0).unwrap();
        board.reveal(1, 1).unwrap();
        let updates = board.changed_cell_updates();
        let value_at = |x, y| {
            updates
                .iter()
                .find(|u| u.x == x && u.y == y)
                .map(|u| u.value)
        };
        assert_eq!(value_at(0, 0), Some(SHOW_FLAG));
        assert_eq!(value_at(1, 1), Some(1));
    }
}
