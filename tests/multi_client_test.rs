//! Multiple clients on one game server: everyone observes the same
//! update order, and a restart aborts the running game for all of them.

mod support;

use minefield::game::{CoopUpdate, GameParams, ModeDelta, ModeId, Move, MoveType};
use minefield::protocol::codec::{
    decode_game_end, decode_gamemode_info, encode_game_start, encode_move, GameEndKind,
};
use minefield::protocol::MessageType;
use minefield::server::GameServer;
use support::read_frame_of_type;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

async fn connect(server: &GameServer) -> TcpStream {
    let mut stream = TcpStream::connect(("127.0.0.1", server.port()))
        .await
        .unwrap();
    // Every admitted player is announced; seeing our own announcement
    // means registration finished and broadcasts will reach us.
    read_frame_of_type(&mut stream, MessageType::Text).await;
    stream
}

fn mineless(width: i32, height: i32, mode: ModeId) -> GameParams {
    GameParams {
        width,
        height,
        mines: 0,
        mode,
    }
}

#[tokio::test]
async fn concurrent_moves_broadcast_in_one_order() {
    let server = GameServer::spawn(1, "shared", 0, None).await.unwrap();
    let mut alice = connect(&server).await;
    let mut bob = connect(&server).await;

    alice
        .write_all(&encode_game_start(&mineless(16, 16, ModeId::Classic)))
        .await
        .unwrap();
    read_frame_of_type(&mut alice, MessageType::StartGame).await;
    read_frame_of_type(&mut bob, MessageType::StartGame).await;

    // Fire flag moves from both clients at once; every client must see
    // the identical sequence of CellUpdate frames.
    let flags_a: Vec<_> = (0..8).map(|i| (i, 0)).collect();
    let flags_b: Vec<_> = (0..8).map(|i| (i, 1)).collect();
    let mut alice_writer = alice;
    let mut bob_writer = bob;
    let write_a = async {
        for (x, y) in &flags_a {
            alice_writer
                .write_all(&encode_move(&Move {
                    x: *x,
                    y: *y,
                    kind: MoveType::Flag,
                    player_id: 0,
                }))
                .await
                .unwrap();
        }
        alice_writer
    };
    let write_b = async {
        for (x, y) in &flags_b {
            bob_writer
                .write_all(&encode_move(&Move {
                    x: *x,
                    y: *y,
                    kind: MoveType::Flag,
                    player_id: 0,
                }))
                .await
                .unwrap();
        }
        bob_writer
    };
    let (mut alice, mut bob) = tokio::join!(write_a, write_b);

    let mut seen_a = Vec::new();
    let mut seen_b = Vec::new();
    for _ in 0..16 {
        seen_a.push(read_frame_of_type(&mut alice, MessageType::CellUpdate).await);
        seen_b.push(read_frame_of_type(&mut bob, MessageType::CellUpdate).await);
    }
    assert_eq!(seen_a, seen_b, "clients observed different update orders");
}

#[tokio::test]
async fn restart_aborts_for_every_client() {
    let server = GameServer::spawn(1, "shared", 0, None).await.unwrap();
    let mut alice = connect(&server).await;
    let mut bob = connect(&server).await;

    alice
        .write_all(&encode_game_start(&mineless(4, 4, ModeId::Classic)))
        .await
        .unwrap();
    read_frame_of_type(&mut alice, MessageType::StartGame).await;
    read_frame_of_type(&mut bob, MessageType::StartGame).await;

    bob.write_all(&encode_game_start(&mineless(6, 6, ModeId::Classic)))
        .await
        .unwrap();
    for stream in [&mut alice, &mut bob] {
        let end = read_frame_of_type(stream, MessageType::GameEnd).await;
        assert_eq!(decode_game_end(&end).unwrap(), GameEndKind::Aborted);
        read_frame_of_type(stream, MessageType::StartGame).await;
    }
}

#[tokio::test]
async fn coop_scores_reach_every_client() {
    let server = GameServer::spawn(1, "coop", 0, None).await.unwrap();
    let mut alice = connect(&server).await;
    let mut bob = connect(&server).await;

    alice
        .write_all(&encode_game_start(&mineless(8, 8, ModeId::Coop)))
        .await
        .unwrap();
    read_frame_of_type(&mut alice, MessageType::StartGame).await;
    read_frame_of_type(&mut bob, MessageType::StartGame).await;

    alice
        .write_all(&encode_move(&Move {
            x: 3,
            y: 3,
            kind: MoveType::Flag,
            player_id: 0,
        }))
        .await
        .unwrap();

    for stream in [&mut alice, &mut bob] {
        let frame = read_frame_of_type(stream, MessageType::GamemodeInfo).await;
        let ModeDelta::Coop(CoopUpdate { scores, marks }) =
            decode_gamemode_info(&frame).unwrap();
        assert_eq!(marks.len(), 1);
        assert_eq!((marks[0].x, marks[0].y), (3, 3));
        // Flag credit goes to whoever moved, under their session id.
        assert_eq!(scores.get(&marks[0].player_id), Some(&1));
    }
}
