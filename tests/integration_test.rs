//! End-to-end flow across all three tiers: register and log in against
//! the SQLite-backed matchmaker, spawn a game server through a launcher,
//! join it with the minted token and play a game to completion.

mod support;

use std::sync::Arc;

use minefield::game::{GameParams, ModeId, Move, MoveType};
use minefield::launcher::GameLauncher;
use minefield::matchmaking::MatchmakingServer;
use minefield::players::PlayerService;
use minefield::protocol::auth::{
    decode_auth_response, decode_connect_to_game_response, decode_register_player_response,
    encode_auth_request, encode_auth_with_token, encode_connect_to_game_request,
    encode_register_player_request, AuthPlayerParams, AuthReply, ConnectReply,
};
use minefield::protocol::codec::{
    decode_cell_updates, decode_game_end, encode_game_start, encode_move, GameEndKind,
};
use minefield::protocol::service::{decode_server_spawned, encode_spawn_server_request};
use minefield::protocol::MessageType;
use minefield::server::AuthSettings;
use minefield::store::SqlStore;
use support::{read_frame_of_type, temp_db_path};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

const SECRET: &[u8] = b"integration secret";

#[tokio::test]
async fn register_login_spawn_join_and_win() {
    let store = SqlStore::open(&temp_db_path("full-flow")).await.unwrap();
    store.initialize_tables().await.unwrap();
    let service = PlayerService::new(Arc::new(store));

    let launcher = GameLauncher::bind(
        "localhost",
        0,
        Some(AuthSettings {
            secret: SECRET.to_vec(),
        }),
    )
    .await
    .unwrap();
    let matchmaker = MatchmakingServer::bind(0, service, SECRET.to_vec())
        .await
        .unwrap();
    matchmaker
        .connect_to_launcher("localhost", launcher.port(), true)
        .await
        .unwrap();

    let mut player = TcpStream::connect(("127.0.0.1", matchmaker.port()))
        .await
        .unwrap();
    let credentials = AuthPlayerParams {
        name: "John".into(),
        password: "password+123".into(),
    };

    // Register and log in.
    player
        .write_all(&encode_register_player_request(&credentials))
        .await
        .unwrap();
    let reply = read_frame_of_type(&mut player, MessageType::RegisterPlayerResponse).await;
    assert!(decode_register_player_response(&reply).unwrap());

    player
        .write_all(&encode_auth_request(&credentials))
        .await
        .unwrap();
    let reply = read_frame_of_type(&mut player, MessageType::AuthResponse).await;
    let AuthReply::Granted(identity) = decode_auth_response(&reply).unwrap() else {
        panic!("login denied");
    };
    assert_eq!(identity.name, "John");

    // Spawn a game server through the launcher.
    player
        .write_all(&encode_spawn_server_request("John's lobby", None))
        .await
        .unwrap();
    let reply = read_frame_of_type(&mut player, MessageType::ServerSpawned).await;
    let (info, request_id) = decode_server_spawned(&reply).unwrap();
    assert_eq!(request_id, None);
    assert_eq!(info.name, "John's lobby");

    // Ask to join it: the matchmaker mints a token.
    player
        .write_all(&encode_connect_to_game_request(0))
        .await
        .unwrap();
    let reply = read_frame_of_type(&mut player, MessageType::ConnectToGameResponse).await;
    let ConnectReply::Granted { token, game } =
        decode_connect_to_game_response(&reply).unwrap()
    else {
        panic!("join denied");
    };
    assert_eq!(token.player_id, identity.id);

    // Dial the game server directly and authenticate with the token.
    let mut session = TcpStream::connect((game.host.as_str(), game.port))
        .await
        .unwrap();
    session
        .write_all(&encode_auth_with_token(&token))
        .await
        .unwrap();

    // A mine-free board wins on the first reveal.
    session
        .write_all(&encode_game_start(&GameParams {
            width: 5,
            height: 5,
            mines: 0,
            mode: ModeId::Classic,
        }))
        .await
        .unwrap();
    read_frame_of_type(&mut session, MessageType::StartGame).await;

    session
        .write_all(&encode_move(&Move {
            x: 0,
            y: 0,
            kind: MoveType::Reveal,
            player_id: 0,
        }))
        .await
        .unwrap();
    let updates = read_frame_of_type(&mut session, MessageType::CellUpdate).await;
    assert_eq!(decode_cell_updates(&updates).unwrap().len(), 25);
    let end = read_frame_of_type(&mut session, MessageType::GameEnd).await;
    assert_eq!(decode_game_end(&end).unwrap(), GameEndKind::Win);
}
