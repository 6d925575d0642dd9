//! Minesweeper rules for the minefield service.
//!
//! This crate is transport-free: boards, moves and game modes, nothing
//! else. Sessions own a [`Game`] and drive it move by move; the wire
//! protocol crate reuses the types here for its payloads.

pub mod board;
pub mod error;
pub mod modes;

pub use board::{
    Board, Cell, Move, MoveResult, MoveResultKind, MoveType, UpdatedCell, SHOW_COUNT, SHOW_FLAG,
    SHOW_MINE, UNFLAG,
};
pub use error::{GameError, GameResult};
pub use modes::{Classic, Coop, CoopUpdate, GameMode, MarkChange, Mode, ModeDelta, ModeId};

/// Parameters a game is constructed from, as carried by `StartGame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameParams {
    pub width: i32,
    pub height: i32,
    pub mines: i32,
    pub mode: ModeId,
}

/// One live match: a board plus its mode plugin.
///
/// [`Game::make_move`] applies the move and runs the mode hook in one
/// call so the session can do both under a single lock and broadcast the
/// results in order.
#[derive(Debug, Clone)]
pub struct Game {
    params: GameParams,
    board: Board,
    mode: Mode,
}

impl Game {
    pub fn new(params: GameParams) -> GameResult<Game> {
        let board = Board::new(params.width, params.height, params.mines)?;
        Ok(Game::with_board(params, board))
    }

    /// Builds a game over a prepared board. Used by tests that need a
    /// deterministic mine layout.
    pub fn with_board(params: GameParams, board: Board) -> Game {
        let mut mode = Mode::new(params.mode);
        mode.init(&board);
        Game {
            params,
            board,
            mode,
        }
    }

    pub fn params(&self) -> GameParams {
        self.params
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn make_move(&mut self, mv: Move) -> GameResult<(MoveResult, Option<ModeDelta>)> {
        let result = self.board.apply_move(mv)?;
        let delta = self.mode.on_move(&self.board, &mv, &result)?;
        Ok((result, delta))
    }

    /// Wire updates for the cells a move touched.
    pub fn cell_updates(&self, cells: &[Cell]) -> Vec<UpdatedCell> {
        self.board.cell_updates(cells)
    }

    /// Wire updates covering everything revealed or flagged so far.
    pub fn snapshot_updates(&self) -> Vec<UpdatedCell> {
        self.board.changed_cell_updates()
    }
}
