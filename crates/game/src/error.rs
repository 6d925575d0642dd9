use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("cannot create a {width}x{height} board with {mines} mines")]
    InvalidBoardParams { width: i32, height: i32, mines: i32 },

    #[error("move out of range: ({x}, {y}) on a {width}x{height} board")]
    InvalidMove {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },

    #[error("unknown move type {0:#04x}")]
    UnknownMoveType(u8),

    #[error("unknown game mode {0:#04x}")]
    UnknownMode(u8),
}

/// Result type for board and mode operations
pub type GameResult<T> = std::result::Result<T, GameError>;
