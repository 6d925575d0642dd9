//! One game server hosts one live match.
//!
//! Players connect directly over TCP. When the server was started with an
//! auth secret, the first message on a fresh connection must be
//! `AuthWithToken` carrying a matchmaker-minted token; everything else -
//! or five seconds of silence - closes the connection. Authenticated (or
//! all, when auth is off) players share one board: every move is applied
//! under a single mutex and its deltas broadcast to everyone, so all
//! clients observe the same update order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use minefield_game::{Game, GameError, GameParams, Move, MoveResultKind};
use minefield_protocol::auth::decode_auth_with_token;
use minefield_protocol::codec::{
    decode_game_start, decode_move, encode_cell_updates, encode_game_end, encode_game_start,
    encode_gamemode_info, encode_text, GameEndKind,
};
use minefield_protocol::{
    ConnectionController, GameServerInfo, MessageType, ProtocolError, SendError,
};

/// Window between accept and a valid `AuthWithToken`.
const AUTH_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Token verification settings. Present means the handshake is required.
#[derive(Clone)]
pub struct AuthSettings {
    pub secret: Vec<u8>,
}

impl AuthSettings {
    /// Reads the shared HMAC secret from `AUTH_SECRET` (raw bytes).
    pub fn from_env() -> Option<AuthSettings> {
        std::env::var("AUTH_SECRET").ok().map(|secret| AuthSettings {
            secret: secret.into_bytes(),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct GameState {
    game: Option<Game>,
    running: bool,
}

/// One connected player: controller plus session-scoped identity.
pub struct PlayerSession {
    pub local_id: u32,
    controller: Arc<ConnectionController>,
    authenticated: AtomicBool,
    identity: Mutex<Option<u32>>,
}

pub struct GameServer {
    id: u32,
    name: String,
    port: u16,
    auth: Option<AuthSettings>,
    next_player_id: AtomicU32,
    players: Mutex<HashMap<u32, Arc<PlayerSession>>>,
    // The move mutex: board mutation, mode hooks and the resulting
    // broadcasts all happen under it, which is what gives every client
    // the same delta order.
    state: Mutex<GameState>,
}

impl GameServer {
    /// Binds (port 0 means OS-assigned) and starts the accept loop.
    pub async fn spawn(
        id: u32,
        name: &str,
        port: u16,
        auth: Option<AuthSettings>,
    ) -> Result<Arc<GameServer>, ServerError> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let port = listener.local_addr()?.port();
        let server = Arc::new(GameServer {
            id,
            name: name.to_owned(),
            port,
            auth,
            next_player_id: AtomicU32::new(1),
            players: Mutex::new(HashMap::new()),
            state: Mutex::new(GameState {
                game: None,
                running: false,
            }),
        });
        tokio::spawn(GameServer::accept_loop(Arc::clone(&server), listener));
        tracing::info!(id, name = %server.name, port, "game server listening");
        Ok(server)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connected-player count as advertised in server listings.
    pub fn player_count(&self) -> i32 {
        lock(&self.players)
            .values()
            .filter(|p| p.controller.is_connected())
            .count() as i32
    }

    /// Listing entry for this server. The host field is left empty: only
    /// the launcher knows its externally visible address and stamps it.
    pub fn server_info(&self) -> GameServerInfo {
        GameServerInfo {
            name: self.name.clone(),
            host: String::new(),
            port: self.port,
            player_count: self.player_count(),
        }
    }

    async fn accept_loop(server: Arc<GameServer>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    tracing::info!(peer = %addr, "player connecting");
                    server.admit(stream);
                }
                Err(err) => {
                    tracing::error!(error = %err, "accept failed, stopping server");
                    return;
                }
            }
        }
    }

    fn admit(self: &Arc<Self>, stream: TcpStream) {
        let local_id = self.next_player_id.fetch_add(1, Ordering::SeqCst);
        let controller = ConnectionController::new();
        if let Err(err) = controller.set_connection(stream) {
            tracing::error!(player = local_id, error = %err, "failed to adopt connection");
            return;
        }
        let session = Arc::new(PlayerSession {
            local_id,
            controller: Arc::clone(&controller),
            authenticated: AtomicBool::new(false),
            identity: Mutex::new(None),
        });
        lock(&self.players).insert(local_id, Arc::clone(&session));

        let server = Arc::clone(self);
        controller.set_disconnect_hook(move || server.handle_disconnect(local_id));

        if self.auth.is_some() {
            let (auth_tx, auth_rx) = oneshot::channel();
            self.register_auth_handlers(&session, auth_tx);
            let watchdog = Arc::clone(&controller);
            tokio::spawn(async move {
                match tokio::time::timeout(AUTH_HANDSHAKE_TIMEOUT, auth_rx).await {
                    Ok(Ok(true)) => {}
                    _ => {
                        tracing::warn!(player = local_id, "auth handshake failed, closing");
                        watchdog.close();
                    }
                }
            });
        } else {
            session.authenticated.store(true, Ordering::SeqCst);
            self.register_gameplay_handlers(&session);
            self.sync_new_player(&session);
        }
        controller.spawn();
    }

    fn handle_disconnect(&self, local_id: u32) {
        // Bind first: holding the map guard across broadcast_text would
        // self-deadlock on the players mutex.
        let removed = lock(&self.players).remove(&local_id);
        if let Some(session) = removed {
            session.controller.clear_handlers();
            tracing::info!(player = local_id, "player disconnected");
            self.broadcast_text(&format!("Player {local_id} disconnected"));
        }
    }

    /// Auth-only handler set: nothing but `AuthWithToken` is understood
    /// until the token checks out.
    fn register_auth_handlers(
        self: &Arc<Self>,
        session: &Arc<PlayerSession>,
        auth_tx: oneshot::Sender<bool>,
    ) {
        let server = Arc::clone(self);
        let session = Arc::clone(session);
        let secret = self
            .auth
            .as_ref()
            .map(|a| a.secret.clone())
            .unwrap_or_default();
        let auth_tx = Mutex::new(Some(auth_tx));
        let controller = Arc::clone(&session.controller);
        controller.register_handler(
            MessageType::AuthWithToken,
            Arc::new(move |frame| {
                let token = decode_auth_with_token(frame)?;
                match token.validate(&secret) {
                    Ok(()) => {
                        session.authenticated.store(true, Ordering::SeqCst);
                        *lock(&session.identity) = Some(token.player_id);
                        session.controller.delete_handler(MessageType::AuthWithToken);
                        server.register_gameplay_handlers(&session);
                        server.sync_new_player(&session);
                        if let Some(tx) = lock(&auth_tx).take() {
                            let _ = tx.send(true);
                        }
                        tracing::info!(
                            player = session.local_id,
                            identity = token.player_id,
                            "player authenticated"
                        );
                        Ok(())
                    }
                    Err(err) => {
                        tracing::warn!(player = session.local_id, error = %err, "token rejected");
                        if let Some(tx) = lock(&auth_tx).take() {
                            let _ = tx.send(false);
                        }
                        Err(ProtocolError::Handler(err.to_string()))
                    }
                }
            }),
        );
    }

    fn register_gameplay_handlers(self: &Arc<Self>, session: &Arc<PlayerSession>) {
        let controller = Arc::clone(&session.controller);
        {
            let server = Arc::clone(self);
            let session = Arc::clone(session);
            controller.register_handler(
                MessageType::StartGame,
                Arc::new(move |frame| {
                    let params = decode_game_start(frame)?;
                    server
                        .broadcast_text(&format!("Player {} requested a new game", session.local_id));
                    if let Err(err) = server.start_game(params) {
                        tracing::warn!(player = session.local_id, error = %err, "rejected game params");
                        server.send_text(&session, &err.to_string());
                    }
                    Ok(())
                }),
            );
        }
        {
            let server = Arc::clone(self);
            let session = Arc::clone(session);
            controller.register_handler(
                MessageType::Move,
                Arc::new(move |frame| {
                    let mv = decode_move(frame)?;
                    server.handle_move(&session, mv);
                    Ok(())
                }),
            );
        }
    }

    /// Brings a newly admitted player up to date and announces them.
    fn sync_new_player(&self, session: &Arc<PlayerSession>) {
        {
            let state = lock(&self.state);
            if state.running {
                if let Some(game) = state.game.as_ref() {
                    self.send_frame(session, encode_game_start(&game.params()));
                    self.send_frame(session, encode_cell_updates(&game.snapshot_updates()));
                }
            }
        }
        self.broadcast_text(&format!("Player {} connected", session.local_id));
    }

    /// Starts a fresh game, aborting any running one first.
    fn start_game(&self, params: GameParams) -> Result<(), GameError> {
        let mut state = lock(&self.state);
        if state.running {
            self.broadcast(&encode_game_end(GameEndKind::Aborted));
        }
        let game = Game::new(params)?;
        state.game = Some(game);
        state.running = true;
        tracing::info!(
            width = params.width,
            height = params.height,
            mines = params.mines,
            mode = params.mode.name(),
            "starting a new game"
        );
        self.broadcast_text(&format!(
            "Starting a new game...\nNumber of mines: {}",
            params.mines
        ));
        self.broadcast(&encode_game_start(&params));
        Ok(())
    }

    fn handle_move(&self, session: &Arc<PlayerSession>, mut mv: Move) {
        // The mover's wire-supplied id is meaningless; stamp the token
        // identity, or the session-local id when auth is off.
        let identity = *lock(&session.identity);
        mv.player_id = identity.unwrap_or(session.local_id);

        let mut state = lock(&self.state);
        if !state.running {
            self.send_text(session, "Game not running. Can't make moves.");
            return;
        }
        let outcome = match state.game.as_mut() {
            Some(game) => game
                .make_move(mv)
                .map(|(result, delta)| (game.cell_updates(&result.updated_cells), result.kind, delta)),
            None => return,
        };
        match outcome {
            Err(err) => {
                // Bad move, board untouched: only the mover hears about it.
                self.send_text(session, &err.to_string());
            }
            Ok((updates, kind, delta)) => {
                if !updates.is_empty() {
                    self.broadcast(&encode_cell_updates(&updates));
                    if let Some(delta) = delta {
                        self.broadcast(&encode_gamemode_info(&delta));
                    }
                }
                match kind {
                    MoveResultKind::MineBlown => {
                        self.broadcast(&encode_game_end(GameEndKind::Loss));
                        state.running = false;
                    }
                    MoveResultKind::GameWon => {
                        self.broadcast(&encode_game_end(GameEndKind::Win));
                        state.running = false;
                    }
                    _ => {}
                }
            }
        }
    }

    /// Enqueues `frame` to every live player. A full queue is that
    /// player's problem: log it and keep going, the broadcast must not
    /// stall on one slow peer.
    fn broadcast(&self, frame: &Bytes) {
        for (id, player) in lock(&self.players).iter() {
            if !player.authenticated.load(Ordering::SeqCst) {
                continue;
            }
            match player.controller.send(frame.clone()) {
                Ok(()) => {}
                Err(SendError::QueueFull) => {
                    tracing::warn!(player = *id, "send queue full, dropping broadcast frame");
                }
                Err(SendError::NotConnected) => {}
            }
        }
    }

    fn broadcast_text(&self, message: &str) {
        self.broadcast(&encode_text(message));
    }

    fn send_frame(&self, session: &Arc<PlayerSession>, frame: Bytes) {
        match session.controller.send(frame) {
            Ok(()) => {}
            Err(err) => {
                tracing::warn!(player = session.local_id, error = %err, "failed to send frame");
            }
        }
    }

    fn send_text(&self, session: &Arc<PlayerSession>, message: &str) {
        self.send_frame(session, encode_text(message));
    }
}
