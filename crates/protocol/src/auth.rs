//! Auth-plane messages: registration, login, token handover and the
//! join-a-game exchange.
//!
//! Tokens travel packed: `player_id:u32 | expiry:i64 | nonce:[16] |
//! signature:[32]`, 60 bytes. The wire carries them as-is; nothing here
//! verifies a signature - that is the game server's handshake.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use minefield_players::{AuthToken, PlayerInfo, AUTH_TOKEN_LEN};

use crate::error::{CodecError, CodecResult};
use crate::frame::{encode_frame, get_string, need, put_string, Frame, MessageType};
use crate::service::{get_connect_info, put_connect_info, GameServerConnectInfo};

/// Credentials as sent by `RegisterPlayerRequest` and `AuthRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPlayerParams {
    pub name: String,
    pub password: String,
}

/// Outcome of a login attempt (`AuthResponse`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthReply {
    Denied,
    Granted(PlayerInfo),
}

/// Outcome of a join request (`ConnectToGameResponse`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectReply {
    Denied,
    Granted {
        token: AuthToken,
        game: GameServerConnectInfo,
    },
}

fn put_auth_token(buf: &mut BytesMut, token: &AuthToken) {
    buf.put_u32(token.player_id);
    buf.put_u64(token.expiry as u64);
    buf.put_slice(&token.nonce);
    buf.put_slice(&token.signature);
}

fn get_auth_token(cur: &mut &[u8]) -> CodecResult<AuthToken> {
    need(*cur, AUTH_TOKEN_LEN)?;
    let player_id = cur.get_u32();
    let expiry = cur.get_u64() as i64;
    let mut nonce = [0u8; 16];
    cur.copy_to_slice(&mut nonce);
    let mut signature = [0u8; 32];
    cur.copy_to_slice(&mut signature);
    Ok(AuthToken {
        player_id,
        expiry,
        nonce,
        signature,
    })
}

pub fn encode_auth_with_token(token: &AuthToken) -> Bytes {
    let mut payload = BytesMut::with_capacity(AUTH_TOKEN_LEN);
    put_auth_token(&mut payload, token);
    encode_frame(MessageType::AuthWithToken, None, &payload)
}

pub fn decode_auth_with_token(data: &[u8]) -> CodecResult<AuthToken> {
    let frame = Frame::parse(data, MessageType::AuthWithToken)?;
    if frame.payload.len() != AUTH_TOKEN_LEN {
        return Err(CodecError::PayloadMalformed(format!(
            "auth token must be {AUTH_TOKEN_LEN} bytes, got {}",
            frame.payload.len()
        )));
    }
    let mut cur = frame.payload;
    get_auth_token(&mut cur)
}

fn encode_player_params(params: &AuthPlayerParams, msg_type: MessageType) -> Bytes {
    let mut payload = BytesMut::new();
    put_string(&mut payload, &params.name);
    payload.put_slice(params.password.as_bytes());
    encode_frame(msg_type, None, &payload)
}

fn decode_player_params(data: &[u8], msg_type: MessageType) -> CodecResult<AuthPlayerParams> {
    let frame = Frame::parse(data, msg_type)?;
    let mut cur = frame.payload;
    let name = get_string(&mut cur)?;
    let password = String::from_utf8(cur.to_vec())
        .map_err(|_| CodecError::PayloadMalformed("password is not valid UTF-8".into()))?;
    Ok(AuthPlayerParams { name, password })
}

pub fn encode_register_player_request(params: &AuthPlayerParams) -> Bytes {
    encode_player_params(params, MessageType::RegisterPlayerRequest)
}

pub fn decode_register_player_request(data: &[u8]) -> CodecResult<AuthPlayerParams> {
    decode_player_params(data, MessageType::RegisterPlayerRequest)
}

pub fn encode_auth_request(params: &AuthPlayerParams) -> Bytes {
    encode_player_params(params, MessageType::AuthRequest)
}

pub fn decode_auth_request(data: &[u8]) -> CodecResult<AuthPlayerParams> {
    decode_player_params(data, MessageType::AuthRequest)
}

pub fn encode_register_player_response(success: bool) -> Bytes {
    encode_frame(
        MessageType::RegisterPlayerResponse,
        None,
        &[u8::from(success)],
    )
}

pub fn decode_register_player_response(data: &[u8]) -> CodecResult<bool> {
    let frame = Frame::parse(data, MessageType::RegisterPlayerResponse)?;
    if frame.payload.len() != 1 {
        return Err(CodecError::PayloadMalformed(format!(
            "register response payload must be 1 byte, got {}",
            frame.payload.len()
        )));
    }
    Ok(frame.payload[0] == 1)
}

pub fn encode_auth_response(reply: &AuthReply) -> Bytes {
    let mut payload = BytesMut::new();
    match reply {
        AuthReply::Denied => payload.put_u8(0),
        AuthReply::Granted(player) => {
            payload.put_u8(1);
            payload.put_u32(player.id);
            put_string(&mut payload, &player.name);
        }
    }
    encode_frame(MessageType::AuthResponse, None, &payload)
}

pub fn decode_auth_response(data: &[u8]) -> CodecResult<AuthReply> {
    let frame = Frame::parse(data, MessageType::AuthResponse)?;
    let mut cur = frame.payload;
    need(cur, 1)?;
    if cur.get_u8() != 1 {
        if !cur.is_empty() {
            return Err(CodecError::PayloadMalformed(
                "denied auth response carries extra bytes".into(),
            ));
        }
        return Ok(AuthReply::Denied);
    }
    need(cur, 4)?;
    let id = cur.get_u32();
    let name = get_string(&mut cur)?;
    Ok(AuthReply::Granted(PlayerInfo { id, name }))
}

pub fn encode_connect_to_game_request(server_id: u32) -> Bytes {
    let mut payload = BytesMut::with_capacity(4);
    payload.put_u32(server_id);
    encode_frame(MessageType::ConnectToGameRequest, None, &payload)
}

pub fn decode_connect_to_game_request(data: &[u8]) -> CodecResult<u32> {
    let frame = Frame::parse(data, MessageType::ConnectToGameRequest)?;
    let mut cur = frame.payload;
    if cur.len() != 4 {
        return Err(CodecError::PayloadMalformed(format!(
            "connect request payload must be 4 bytes, got {}",
            cur.len()
        )));
    }
    Ok(cur.get_u32())
}

pub fn encode_connect_to_game_response(reply: &ConnectReply) -> Bytes {
    let mut payload = BytesMut::new();
    match reply {
        ConnectReply::Denied => payload.put_u8(0),
        ConnectReply::Granted { token, game } => {
            payload.put_u8(1);
            put_auth_token(&mut payload, token);
            put_connect_info(&mut payload, game);
        }
    }
    encode_frame(MessageType::ConnectToGameResponse, None, &payload)
}

pub fn decode_connect_to_game_response(data: &[u8]) -> CodecResult<ConnectReply> {
    let frame = Frame::parse(data, MessageType::ConnectToGameResponse)?;
    let mut cur = frame.payload;
    need(cur, 1)?;
    if cur.get_u8() != 1 {
        if !cur.is_empty() {
            return Err(CodecError::PayloadMalformed(
                "denied connect response carries extra bytes".into(),
            ));
        }
        return Ok(ConnectReply::Denied);
    }
    let token = get_auth_token(&mut cur)?;
    let game = get_connect_info(&mut cur)?;
    if !cur.is_empty() {
        return Err(CodecError::PayloadMalformed(
            "trailing bytes after connect info".into(),
        ));
    }
    Ok(ConnectReply::Granted { token, game })
}
