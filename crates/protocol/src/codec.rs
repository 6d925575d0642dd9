//! Gameplay-plane messages: moves, text, board state and game lifecycle.
//!
//! All encoders are pure: they take the typed value and return a complete
//! frame. Decoders validate the frame shape and reject malformed buffers
//! with a [`CodecError`]; semantically bad but well-formed content is the
//! handler's concern.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use minefield_game::{
    Board, Cell, CoopUpdate, GameParams, MarkChange, ModeDelta, ModeId, Move, MoveType,
    UpdatedCell,
};

use crate::error::{CodecError, CodecResult};
use crate::frame::{encode_frame, need, Frame, MessageType};

/// Bytes per cell record in `Board` and `CellUpdate` payloads.
pub const CELL_RECORD_LEN: usize = 9;

/// Cell flag bits inside a board snapshot.
const CELL_MINE: u8 = 0b0001;
const CELL_REVEALED: u8 = 0b0010;
const CELL_FLAGGED: u8 = 0b0100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GameEndKind {
    Win = 0x01,
    Loss = 0x02,
    Aborted = 0x03,
}

impl TryFrom<u8> for GameEndKind {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(GameEndKind::Win),
            0x02 => Ok(GameEndKind::Loss),
            0x03 => Ok(GameEndKind::Aborted),
            other => Err(CodecError::PayloadMalformed(format!(
                "unknown game end kind {other:#04x}"
            ))),
        }
    }
}

pub fn encode_move(mv: &Move) -> Bytes {
    let mut payload = BytesMut::with_capacity(13);
    payload.put_u8(mv.kind as u8);
    payload.put_i32(mv.x);
    payload.put_i32(mv.y);
    payload.put_u32(mv.player_id);
    encode_frame(MessageType::Move, None, &payload)
}

pub fn decode_move(data: &[u8]) -> CodecResult<Move> {
    let frame = Frame::parse(data, MessageType::Move)?;
    let mut cur = frame.payload;
    if cur.len() != 13 {
        return Err(CodecError::PayloadMalformed(format!(
            "move payload must be 13 bytes, got {}",
            cur.len()
        )));
    }
    let kind_byte = cur.get_u8();
    let kind = MoveType::try_from(kind_byte).map_err(|_| {
        CodecError::PayloadMalformed(format!("unknown move type {kind_byte:#04x}"))
    })?;
    Ok(Move {
        kind,
        x: cur.get_i32(),
        y: cur.get_i32(),
        player_id: cur.get_u32(),
    })
}

pub fn encode_text(message: &str) -> Bytes {
    encode_frame(MessageType::Text, None, message.as_bytes())
}

pub fn decode_text(data: &[u8]) -> CodecResult<String> {
    let frame = Frame::parse(data, MessageType::Text)?;
    String::from_utf8(frame.payload.to_vec())
        .map_err(|_| CodecError::PayloadMalformed("text message is not valid UTF-8".into()))
}

pub fn encode_game_start(params: &GameParams) -> Bytes {
    let mut payload = BytesMut::with_capacity(13);
    payload.put_i32(params.width);
    payload.put_i32(params.height);
    payload.put_i32(params.mines);
    payload.put_u8(params.mode as u8);
    encode_frame(MessageType::StartGame, None, &payload)
}

pub fn decode_game_start(data: &[u8]) -> CodecResult<GameParams> {
    let frame = Frame::parse(data, MessageType::StartGame)?;
    let mut cur = frame.payload;
    if cur.len() != 13 {
        return Err(CodecError::PayloadMalformed(format!(
            "start game payload must be 13 bytes, got {}",
            cur.len()
        )));
    }
    let width = cur.get_i32();
    let height = cur.get_i32();
    let mines = cur.get_i32();
    let mode_byte = cur.get_u8();
    let mode = ModeId::try_from(mode_byte).map_err(|_| {
        CodecError::PayloadMalformed(format!("unknown game mode {mode_byte:#04x}"))
    })?;
    Ok(GameParams {
        width,
        height,
        mines,
        mode,
    })
}

pub fn encode_game_end(kind: GameEndKind) -> Bytes {
    encode_frame(MessageType::GameEnd, None, &[kind as u8])
}

pub fn decode_game_end(data: &[u8]) -> CodecResult<GameEndKind> {
    let frame = Frame::parse(data, MessageType::GameEnd)?;
    if frame.payload.len() != 1 {
        return Err(CodecError::PayloadMalformed(format!(
            "game end payload must be 1 byte, got {}",
            frame.payload.len()
        )));
    }
    GameEndKind::try_from(frame.payload[0])
}

pub fn encode_cell_updates(cells: &[UpdatedCell]) -> Bytes {
    let mut payload = BytesMut::with_capacity(cells.len() * CELL_RECORD_LEN);
    for cell in cells {
        payload.put_i32(cell.x);
        payload.put_i32(cell.y);
        payload.put_u8(cell.value);
    }
    encode_frame(MessageType::CellUpdate, None, &payload)
}

pub fn decode_cell_updates(data: &[u8]) -> CodecResult<Vec<UpdatedCell>> {
    let frame = Frame::parse(data, MessageType::CellUpdate)?;
    let mut cur = frame.payload;
    if cur.len() % CELL_RECORD_LEN != 0 {
        return Err(CodecError::PayloadMalformed(format!(
            "cell update payload length {} is not a multiple of {CELL_RECORD_LEN}",
            cur.len()
        )));
    }
    let mut cells = Vec::with_capacity(cur.len() / CELL_RECORD_LEN);
    while !cur.is_empty() {
        cells.push(UpdatedCell {
            x: cur.get_i32(),
            y: cur.get_i32(),
            value: cur.get_u8(),
        });
    }
    Ok(cells)
}

fn cell_flags(cell: &Cell) -> u8 {
    let mut flags = 0;
    if cell.mine {
        flags |= CELL_MINE;
    }
    if cell.revealed {
        flags |= CELL_REVEALED;
    }
    if cell.flagged {
        flags |= CELL_FLAGGED;
    }
    flags
}

/// Full board snapshot: dimensions followed by one record per cell.
pub fn encode_board(board: &Board) -> Bytes {
    let cell_count = (board.width() * board.height()) as usize;
    let mut payload = BytesMut::with_capacity(8 + cell_count * CELL_RECORD_LEN);
    payload.put_i32(board.height());
    payload.put_i32(board.width());
    for cell in board.cells() {
        payload.put_i32(cell.x);
        payload.put_i32(cell.y);
        payload.put_u8(cell_flags(cell));
    }
    encode_frame(MessageType::Board, None, &payload)
}

pub fn decode_board(data: &[u8]) -> CodecResult<Board> {
    let frame = Frame::parse(data, MessageType::Board)?;
    let mut cur = frame.payload;
    need(cur, 8)?;
    let height = cur.get_i32();
    let width = cur.get_i32();
    if width <= 0 || height <= 0 {
        return Err(CodecError::PayloadMalformed(format!(
            "invalid board dimensions {width}x{height}"
        )));
    }
    if cur.len() % CELL_RECORD_LEN != 0 {
        return Err(CodecError::PayloadMalformed(
            "board cell payload is not a whole number of records".into(),
        ));
    }
    if cur.len() / CELL_RECORD_LEN != (width * height) as usize {
        return Err(CodecError::PayloadMalformed(format!(
            "cell count does not match a {width}x{height} board"
        )));
    }
    let mut board = Board::blank(width, height)
        .map_err(|e| CodecError::PayloadMalformed(e.to_string()))?;
    let mut seen = vec![false; (width * height) as usize];
    while !cur.is_empty() {
        let x = cur.get_i32();
        let y = cur.get_i32();
        let flags = cur.get_u8();
        if !board.in_bounds(x, y) {
            return Err(CodecError::PayloadMalformed(format!(
                "cell position out of bounds: ({x}, {y})"
            )));
        }
        let idx = (y * width + x) as usize;
        if seen[idx] {
            return Err(CodecError::PayloadMalformed(format!(
                "duplicate cell record for ({x}, {y})"
            )));
        }
        seen[idx] = true;
        board
            .set_cell(Cell {
                x,
                y,
                mine: flags & CELL_MINE != 0,
                revealed: flags & CELL_REVEALED != 0,
                flagged: flags & CELL_FLAGGED != 0,
            })
            .map_err(|e| CodecError::PayloadMalformed(e.to_string()))?;
    }
    Ok(board)
}

/// Mode-specific update record under `GamemodeInfo`.
pub fn encode_gamemode_info(delta: &ModeDelta) -> Bytes {
    match delta {
        ModeDelta::Coop(update) => encode_coop_update(update),
    }
}

pub fn decode_gamemode_info(data: &[u8]) -> CodecResult<ModeDelta> {
    let frame = Frame::parse(data, MessageType::GamemodeInfo)?;
    need(frame.payload, 1)?;
    let mode_byte = frame.payload[0];
    match ModeId::try_from(mode_byte) {
        Ok(ModeId::Coop) => Ok(ModeDelta::Coop(decode_coop_update(frame.payload)?)),
        _ => Err(CodecError::PayloadMalformed(format!(
            "no gamemode info defined for mode {mode_byte:#04x}"
        ))),
    }
}

fn encode_coop_update(update: &CoopUpdate) -> Bytes {
    let mut payload = BytesMut::with_capacity(
        1 + 2 + 8 * update.scores.len() + 12 * update.marks.len(),
    );
    payload.put_u8(ModeId::Coop as u8);
    payload.put_u16(update.scores.len() as u16);
    for (player_id, score) in &update.scores {
        payload.put_u32(*player_id);
        payload.put_i32(*score);
    }
    for mark in &update.marks {
        payload.put_i32(mark.x);
        payload.put_i32(mark.y);
        payload.put_u32(mark.player_id);
    }
    encode_frame(MessageType::GamemodeInfo, None, &payload)
}

fn decode_coop_update(payload: &[u8]) -> CodecResult<CoopUpdate> {
    let mut cur = payload;
    need(cur, 3)?;
    cur.advance(1); // mode id, checked by the caller
    let score_count = cur.get_u16() as usize;
    let mut update = CoopUpdate::default();
    for _ in 0..score_count {
        need(cur, 8)?;
        let player_id = cur.get_u32();
        let score = cur.get_i32();
        update.scores.insert(player_id, score);
    }
    if cur.len() % 12 != 0 {
        return Err(CodecError::PayloadMalformed(
            "coop mark records are not a whole number of entries".into(),
        ));
    }
    while !cur.is_empty() {
        update.marks.push(MarkChange {
            x: cur.get_i32(),
            y: cur.get_i32(),
            player_id: cur.get_u32(),
        });
    }
    Ok(update)
}
