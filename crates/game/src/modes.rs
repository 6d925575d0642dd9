//! Game-mode plugins.
//!
//! A mode observes every applied move and may emit a mode-specific delta
//! that the session broadcasts alongside the cell updates. Modes are a
//! closed sum type rather than trait objects: the wire protocol knows the
//! full catalog anyway.

use std::collections::HashMap;

use crate::board::{Board, Move, MoveResult, MoveResultKind};
use crate::error::{GameError, GameResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModeId {
    Classic = 0x00,
    Coop = 0x01,
}

impl ModeId {
    pub fn name(&self) -> &'static str {
        match self {
            ModeId::Classic => "Classic",
            ModeId::Coop => "Coop",
        }
    }

    /// Full catalog, in wire-id order.
    pub fn all() -> [ModeId; 2] {
        [ModeId::Classic, ModeId::Coop]
    }
}

impl TryFrom<u8> for ModeId {
    type Error = GameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ModeId::Classic),
            0x01 => Ok(ModeId::Coop),
            other => Err(GameError::UnknownMode(other)),
        }
    }
}

/// One changed cell attribution in cooperative mode. `player_id` 0 means
/// the attribution was cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkChange {
    pub x: i32,
    pub y: i32,
    pub player_id: u32,
}

/// Cooperative-mode delta: the full score table plus the attributions the
/// move changed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoopUpdate {
    pub scores: HashMap<u32, i32>,
    pub marks: Vec<MarkChange>,
}

/// Per-move, mode-specific update record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeDelta {
    Coop(CoopUpdate),
}

/// Contract shared by every game mode.
pub trait GameMode {
    fn init(&mut self, board: &Board);

    /// Called once per move, after the board mutated and before the
    /// session broadcasts.
    fn on_move(
        &mut self,
        board: &Board,
        mv: &Move,
        result: &MoveResult,
    ) -> GameResult<Option<ModeDelta>>;

    fn mode_id(&self) -> ModeId;
}

#[derive(Debug, Clone)]
pub enum Mode {
    Classic(Classic),
    Coop(Coop),
}

impl Mode {
    pub fn new(id: ModeId) -> Mode {
        match id {
            ModeId::Classic => Mode::Classic(Classic),
            ModeId::Coop => Mode::Coop(Coop::default()),
        }
    }
}

impl GameMode for Mode {
    fn init(&mut self, board: &Board) {
        match self {
            Mode::Classic(m) => m.init(board),
            Mode::Coop(m) => m.init(board),
        }
    }

    fn on_move(
        &mut self,
        board: &Board,
        mv: &Move,
        result: &MoveResult,
    ) -> GameResult<Option<ModeDelta>> {
        match self {
            Mode::Classic(m) => m.on_move(board, mv, result),
            Mode::Coop(m) => m.on_move(board, mv, result),
        }
    }

    fn mode_id(&self) -> ModeId {
        match self {
            Mode::Classic(m) => m.mode_id(),
            Mode::Coop(m) => m.mode_id(),
        }
    }
}

/// Classic minesweeper: no extra state, no deltas.
#[derive(Debug, Clone, Copy, Default)]
pub struct Classic;

impl GameMode for Classic {
    fn init(&mut self, _board: &Board) {}

    fn on_move(
        &mut self,
        _board: &Board,
        _mv: &Move,
        _result: &MoveResult,
    ) -> GameResult<Option<ModeDelta>> {
        Ok(None)
    }

    fn mode_id(&self) -> ModeId {
        ModeId::Classic
    }
}

/// Cooperative mode: every revealed or flagged cell is attributed to the
/// player who touched it, and each attribution is worth one point.
#[derive(Debug, Clone, Default)]
pub struct Coop {
    width: i32,
    marks: Vec<u32>,
    scores: HashMap<u32, i32>,
}

impl Coop {
    fn mark_index(&self, x: i32, y: i32) -> usize {
        (y * self.width + x) as usize
    }
}

impl GameMode for Coop {
    fn init(&mut self, board: &Board) {
        self.width = board.width();
        self.marks = vec![0; (board.width() * board.height()) as usize];
        self.scores.clear();
    }

    fn on_move(
        &mut self,
        _board: &Board,
        mv: &Move,
        result: &MoveResult,
    ) -> GameResult<Option<ModeDelta>> {
        if result.kind == MoveResultKind::NoChange {
            return Ok(None);
        }
        let mut marks = Vec::new();
        for cell in &result.updated_cells {
            let idx = self.mark_index(cell.x, cell.y);
            if cell.flagged || cell.revealed {
                self.marks[idx] = mv.player_id;
                *self.scores.entry(mv.player_id).or_insert(0) += 1;
                marks.push(MarkChange {
                    x: cell.x,
                    y: cell.y,
                    player_id: mv.player_id,
                });
            } else {
                // Flag removed: take the point back and clear the stamp.
                self.marks[idx] = 0;
                *self.scores.entry(mv.player_id).or_insert(0) -= 1;
                marks.push(MarkChange {
                    x: cell.x,
                    y: cell.y,
                    player_id: 0,
                });
            }
        }
        Ok(Some(ModeDelta::Coop(CoopUpdate {
            scores: self.scores.clone(),
            marks,
        })))
    }

    fn mode_id(&self) -> ModeId {
        ModeId::Coop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::MoveType;

    fn coop_with_board() -> (Coop, Board) {
        let board = Board::with_mines(3, 3, &[(0, 0)]).unwrap();
        let mut coop = Coop::default();
        coop.init(&board);
        (coop, board)
    }

    #[test]
    fn classic_emits_nothing() {
        let mut board = Board::with_mines(3, 3, &[(0, 0)]).unwrap();
        let mut classic = Classic;
        classic.init(&board);
        let mv = Move {
            x: 2,
            y: 2,
            kind: MoveType::Reveal,
            player_id: 4,
        };
        let result = board.reveal(2, 2).unwrap();
        assert_eq!(classic.on_move(&board, &mv, &result).unwrap(), None);
    }

    #[test]
    fn coop_credits_cascade_to_mover() {
        let (mut coop, mut board) = coop_with_board();
        let mv = Move {
            x: 2,
            y: 2,
            kind: MoveType::Reveal,
            player_id: 7,
        };
        let result = board.reveal(2, 2).unwrap();
        let delta = coop.on_move(&board, &mv, &result).unwrap().unwrap();
        let ModeDelta::Coop(update) = delta;
        assert_eq!(update.scores.get(&7), Some(&8));
        assert_eq!(update.marks.len(), 8);
        assert!(update.marks.iter().all(|m| m.player_id == 7));
    }

    #[test]
    fn coop_unflag_revokes_credit() {
        let (mut coop, mut board) = coop_with_board();
        let flag = Move {
            x: 1,
            y: 1,
            kind: MoveType::Flag,
            player_id: 3,
        };
        let result = board.flag(1, 1).unwrap();
        coop.on_move(&board, &flag, &result).unwrap();

        let result = board.flag(1, 1).unwrap();
        let delta = coop.on_move(&board, &flag, &result).unwrap().unwrap();
        let ModeDelta::Coop(update) = delta;
        assert_eq!(update.scores.get(&3), Some(&0));
        assert_eq!(
            update.marks,
            vec![MarkChange {
                x: 1,
                y: 1,
                player_id: 0
            }]
        );
    }

    #[test]
    fn coop_ignores_no_change() {
        let (mut coop, mut board) = coop_with_board();
        board.reveal(2, 2).unwrap();
        let mv = Move {
            x: 2,
            y: 2,
            kind: MoveType::Reveal,
            player_id: 1,
        };
        let result = board.reveal(2, 2).unwrap();
        assert_eq!(coop.on_move(&board, &mv, &result).unwrap(), None);
    }
}
