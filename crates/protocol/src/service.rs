//! Service-plane messages between players, the matchmaker and launchers.
//!
//! These are the only messages that may carry a correlation id: the
//! matchmaker stamps one onto every request it forwards to a launcher and
//! the launcher echoes it back, letting the matchmaker route the response
//! to the waiting player.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CodecError, CodecResult};
use crate::frame::{encode_frame, get_string, need, put_string, Frame, MessageType};

/// A game server as advertised to players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameServerInfo {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub player_count: i32,
}

/// Connection coordinates handed to a player joining a game server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameServerConnectInfo {
    pub host: String,
    pub port: u16,
}

fn put_game_server_info(buf: &mut BytesMut, info: &GameServerInfo) {
    put_string(buf, &info.name);
    put_string(buf, &info.host);
    buf.put_u16(info.port);
    buf.put_i32(info.player_count);
}

fn get_game_server_info(cur: &mut &[u8]) -> CodecResult<GameServerInfo> {
    let name = get_string(cur)?;
    let host = get_string(cur)?;
    need(*cur, 6)?;
    let port = cur.get_u16();
    let player_count = cur.get_i32();
    Ok(GameServerInfo {
        name,
        host,
        port,
        player_count,
    })
}

pub(crate) fn put_connect_info(buf: &mut BytesMut, info: &GameServerConnectInfo) {
    put_string(buf, &info.host);
    buf.put_u16(info.port);
}

pub(crate) fn get_connect_info(cur: &mut &[u8]) -> CodecResult<GameServerConnectInfo> {
    let host = get_string(cur)?;
    need(*cur, 2)?;
    let port = cur.get_u16();
    Ok(GameServerConnectInfo { host, port })
}

pub fn encode_spawn_server_request(name: &str, request_id: Option<u32>) -> Bytes {
    encode_frame(MessageType::SpawnServerRequest, request_id, name.as_bytes())
}

pub fn decode_spawn_server_request(data: &[u8]) -> CodecResult<(String, Option<u32>)> {
    let frame = Frame::parse(data, MessageType::SpawnServerRequest)?;
    let name = String::from_utf8(frame.payload.to_vec())
        .map_err(|_| CodecError::PayloadMalformed("server name is not valid UTF-8".into()))?;
    Ok((name, frame.request_id))
}

pub fn encode_get_game_servers(request_id: Option<u32>) -> Bytes {
    encode_frame(MessageType::GetGameServers, request_id, &[])
}

pub fn decode_get_game_servers(data: &[u8]) -> CodecResult<Option<u32>> {
    let frame = Frame::parse(data, MessageType::GetGameServers)?;
    if !frame.payload.is_empty() {
        return Err(CodecError::PayloadMalformed(
            "get game servers carries no payload beyond the id".into(),
        ));
    }
    Ok(frame.request_id)
}

pub fn encode_server_spawned(info: &GameServerInfo, request_id: Option<u32>) -> Bytes {
    let mut payload = BytesMut::new();
    put_game_server_info(&mut payload, info);
    encode_frame(MessageType::ServerSpawned, request_id, &payload)
}

pub fn decode_server_spawned(data: &[u8]) -> CodecResult<(GameServerInfo, Option<u32>)> {
    let frame = Frame::parse(data, MessageType::ServerSpawned)?;
    let mut cur = frame.payload;
    let info = get_game_server_info(&mut cur)?;
    if !cur.is_empty() {
        return Err(CodecError::PayloadMalformed(
            "trailing bytes after server info".into(),
        ));
    }
    Ok((info, frame.request_id))
}

pub fn encode_send_game_servers(servers: &[GameServerInfo], request_id: Option<u32>) -> Bytes {
    let mut payload = BytesMut::new();
    for info in servers {
        put_game_server_info(&mut payload, info);
    }
    encode_frame(MessageType::SendGameServers, request_id, &payload)
}

pub fn decode_send_game_servers(data: &[u8]) -> CodecResult<(Vec<GameServerInfo>, Option<u32>)> {
    let frame = Frame::parse(data, MessageType::SendGameServers)?;
    let mut cur = frame.payload;
    let mut servers = Vec::new();
    while !cur.is_empty() {
        servers.push(get_game_server_info(&mut cur)?);
    }
    Ok((servers, frame.request_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_servers() -> Vec<GameServerInfo> {
        vec![
            GameServerInfo {
                name: "Game server 69".into(),
                host: "127.0.0.1".into(),
                port: 42069,
                player_count: 3,
            },
            GameServerInfo {
                name: "GS Rest".into(),
                host: "192.168.0.1".into(),
                port: 11111,
                player_count: 7,
            },
            GameServerInfo {
                name: "FD Free".into(),
                host: "10.0.0.5".into(),
                port: 429,
                player_count: 0,
            },
        ]
    }

    #[test]
    fn spawn_request_roundtrip_with_and_without_id() {
        for id in [None, Some(11u32)] {
            let frame = encode_spawn_server_request("Testing server", id);
            let (name, got_id) = decode_spawn_server_request(&frame).unwrap();
            assert_eq!(name, "Testing server");
            assert_eq!(got_id, id);
        }
    }

    #[test]
    fn get_game_servers_roundtrip() {
        assert_eq!(
            decode_get_game_servers(&encode_get_game_servers(Some(5))).unwrap(),
            Some(5)
        );
        assert_eq!(
            decode_get_game_servers(&encode_get_game_servers(None)).unwrap(),
            None
        );
    }

    #[test]
    fn server_spawned_roundtrip() {
        let info = sample_servers().remove(0);
        let frame = encode_server_spawned(&info, Some(99));
        let (decoded, id) = decode_server_spawned(&frame).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(id, Some(99));
    }

    #[test]
    fn send_game_servers_roundtrip() {
        let servers = sample_servers();
        let frame = encode_send_game_servers(&servers, None);
        let (decoded, id) = decode_send_game_servers(&frame).unwrap();
        assert_eq!(decoded, servers);
        assert_eq!(id, None);
    }

    #[test]
    fn send_game_servers_empty_list() {
        let frame = encode_send_game_servers(&[], Some(3));
        let (decoded, id) = decode_send_game_servers(&frame).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(id, Some(3));
    }

    #[test]
    fn truncated_server_info_is_rejected() {
        let servers = sample_servers();
        let frame = encode_send_game_servers(&servers, None);
        let mut cut = frame[..frame.len() - 3].to_vec();
        let len = (cut.len() - crate::frame::HEADER_LEN) as u32;
        cut[2..6].copy_from_slice(&len.to_be_bytes());
        assert!(decode_send_game_servers(&cut).is_err());
    }
}
