//! The matchmaking tier: one process every player dials first.
//!
//! The matchmaker brokers between two kinds of peers. Players connect in;
//! launchers are dialed out to (with reconnect enabled). Requests that
//! need a launcher are forwarded with a freshly minted correlation id and
//! the originating player is recorded as the waiter; when the launcher's
//! response comes back carrying the same id, the waiter is looked up
//! (load-and-delete, entries are single-use) and the response forwarded
//! with the id stripped.
//!
//! The auth plane never touches launchers: registration and login hit
//! the credential store directly, and a successful `ConnectToGameRequest`
//! is answered with an HMAC token minted right here.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use minefield_players::{AuthToken, PlayerInfo, PlayerService};
use minefield_protocol::auth::{
    decode_auth_request, decode_connect_to_game_request, decode_register_player_request,
    encode_auth_response, encode_connect_to_game_response, encode_register_player_response,
    AuthReply, ConnectReply,
};
use minefield_protocol::service::{
    decode_get_game_servers, decode_send_game_servers, decode_server_spawned,
    decode_spawn_server_request, encode_get_game_servers, encode_send_game_servers,
    encode_server_spawned, encode_spawn_server_request,
};
use minefield_protocol::{
    CodecError, ConnectionController, GameServerConnectInfo, GameServerInfo, MessageType,
    ProtocolError,
};

/// Default lifetime of a minted join token.
const TOKEN_TTL: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum MatchmakingError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("AUTH_SECRET not set in environment")]
    MissingSecret,

    #[error(transparent)]
    Store(#[from] minefield_store::SqlStoreError),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One connected player: controller plus whatever identity a login
/// attached to the connection.
pub struct PlayerPeer {
    addr: SocketAddr,
    controller: Arc<ConnectionController>,
    identity: Mutex<Option<PlayerInfo>>,
}

pub struct MatchmakingServer {
    port: u16,
    secret: Vec<u8>,
    service: PlayerService,
    launchers: Mutex<HashMap<SocketAddr, Arc<ConnectionController>>>,
    players: Mutex<HashMap<SocketAddr, Arc<PlayerPeer>>>,
    // correlation id -> waiter; entries are single-use (load-and-delete)
    pending: Mutex<HashMap<u32, Arc<PlayerPeer>>>,
    next_request_id: Mutex<u32>,
    // Opportunistic cache of servers seen in launcher responses, indexed
    // by discovery order. ConnectToGameRequest ids refer into it.
    known_servers: Mutex<Vec<GameServerInfo>>,
}

impl MatchmakingServer {
    /// Binds the player-facing port and starts accepting.
    pub async fn bind(
        port: u16,
        service: PlayerService,
        secret: Vec<u8>,
    ) -> Result<Arc<MatchmakingServer>, MatchmakingError> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let port = listener.local_addr()?.port();
        let server = Arc::new(MatchmakingServer {
            port,
            secret,
            service,
            launchers: Mutex::new(HashMap::new()),
            players: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_request_id: Mutex::new(0),
            known_servers: Mutex::new(Vec::new()),
        });
        tokio::spawn(MatchmakingServer::accept_loop(
            Arc::clone(&server),
            listener,
        ));
        tracing::info!(port, "matchmaking server listening");
        Ok(server)
    }

    /// Builds the server from the environment: credential store at
    /// `DB_PATH`, HMAC secret from `AUTH_SECRET`.
    pub async fn from_env(port: u16) -> Result<Arc<MatchmakingServer>, MatchmakingError> {
        let secret = std::env::var("AUTH_SECRET")
            .map(String::into_bytes)
            .map_err(|_| MatchmakingError::MissingSecret)?;
        let store = minefield_store::SqlStore::from_env().await?;
        let service = PlayerService::new(Arc::new(store));
        MatchmakingServer::bind(port, service, secret).await
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Dials a launcher and keeps the connection alive with reconnect.
    pub async fn connect_to_launcher(
        self: &Arc<Self>,
        host: &str,
        port: u16,
        attempt_reconnect: bool,
    ) -> Result<(), MatchmakingError> {
        let controller = ConnectionController::new();
        controller.set_attempt_reconnect(attempt_reconnect);
        controller
            .connect(host, port)
            .await
            .map_err(|err| MatchmakingError::Io(std::io::Error::other(err)))?;
        let addr = match controller.peer_addr() {
            Some(addr) => addr,
            None => {
                return Err(MatchmakingError::Io(std::io::Error::other(
                    "launcher connection has no peer address",
                )))
            }
        };
        self.register_launcher_handlers(&controller);
        lock(&self.launchers).insert(addr, Arc::clone(&controller));
        controller.spawn();
        tracing::info!(launcher = %addr, "registered game launcher");
        Ok(())
    }

    async fn accept_loop(server: Arc<MatchmakingServer>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => server.admit_player(stream, addr),
                Err(err) => {
                    tracing::error!(error = %err, "accept failed, stopping matchmaker");
                    return;
                }
            }
        }
    }

    fn admit_player(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let controller = ConnectionController::new();
        if let Err(err) = controller.set_connection(stream) {
            tracing::error!(peer = %addr, error = %err, "failed to adopt player connection");
            return;
        }
        let peer = Arc::new(PlayerPeer {
            addr,
            controller: Arc::clone(&controller),
            identity: Mutex::new(None),
        });
        lock(&self.players).insert(addr, Arc::clone(&peer));
        tracing::info!(player = %addr, "player connected");

        let server = Arc::clone(self);
        let hook_peer = Arc::downgrade(&peer);
        controller.set_disconnect_hook(move || {
            if let Some(peer) = hook_peer.upgrade() {
                server.drop_player(&peer);
            }
        });
        self.register_player_handlers(&peer);
        controller.spawn();
    }

    /// Forgets a player and prunes any pending requests still waiting on
    /// a launcher: responses that arrive later are discarded.
    fn drop_player(&self, peer: &Arc<PlayerPeer>) {
        if lock(&self.players).remove(&peer.addr).is_some() {
            tracing::info!(player = %peer.addr, "player disconnected");
        }
        let mut pending = lock(&self.pending);
        pending.retain(|id, waiter| {
            let stale = Arc::ptr_eq(waiter, peer);
            if stale {
                tracing::debug!(id = *id, player = %peer.addr, "pruning pending request");
            }
            !stale
        });
        drop(pending);
        peer.controller.clear_handlers();
    }

    fn next_request_id(&self) -> u32 {
        let mut next = lock(&self.next_request_id);
        *next = (*next).wrapping_add(1);
        *next
    }

    /// Any live launcher will do; iteration order decides.
    fn choose_launcher(&self) -> Option<Arc<ConnectionController>> {
        lock(&self.launchers)
            .values()
            .find(|l| l.is_connected())
            .cloned()
    }

    fn connected_launchers(&self) -> Vec<Arc<ConnectionController>> {
        lock(&self.launchers)
            .values()
            .filter(|l| l.is_connected())
            .cloned()
            .collect()
    }

    /// Records a server seen in a launcher response, replacing any stale
    /// entry for the same endpoint.
    fn remember_server(&self, info: &GameServerInfo) {
        let mut known = lock(&self.known_servers);
        if let Some(existing) = known
            .iter_mut()
            .find(|s| s.host == info.host && s.port == info.port)
        {
            *existing = info.clone();
        } else {
            known.push(info.clone());
        }
    }

    fn register_player_handlers(self: &Arc<Self>, peer: &Arc<PlayerPeer>) {
        let controller = Arc::clone(&peer.controller);
        {
            let server = Arc::clone(self);
            let peer = Arc::clone(peer);
            controller.register_handler(
                MessageType::SpawnServerRequest,
                Arc::new(move |frame| {
                    let (name, _) = decode_spawn_server_request(frame)?;
                    server.forward_spawn_request(&peer, &name);
                    Ok(())
                }),
            );
        }
        {
            let server = Arc::clone(self);
            let peer = Arc::clone(peer);
            controller.register_handler(
                MessageType::GetGameServers,
                Arc::new(move |frame| {
                    decode_get_game_servers(frame)?;
                    server.fan_out_listing_request(&peer);
                    Ok(())
                }),
            );
        }
        {
            let server = Arc::clone(self);
            let peer = Arc::clone(peer);
            controller.register_handler(
                MessageType::RegisterPlayerRequest,
                Arc::new(move |frame| {
                    let params = decode_register_player_request(frame)?;
                    let server = Arc::clone(&server);
                    let peer = Arc::clone(&peer);
                    // bcrypt plus a store write: off the read path.
                    tokio::spawn(async move {
                        let result = server.service.register(&params.name, &params.password).await;
                        if let Err(ref err) = result {
                            tracing::warn!(name = %params.name, error = %err, "registration failed");
                        }
                        let frame = encode_register_player_response(result.is_ok());
                        if let Err(err) = peer.controller.send(frame) {
                            tracing::warn!(player = %peer.addr, error = %err, "failed to answer registration");
                        }
                    });
                    Ok(())
                }),
            );
        }
        {
            let server = Arc::clone(self);
            let peer = Arc::clone(peer);
            controller.register_handler(
                MessageType::AuthRequest,
                Arc::new(move |frame| {
                    let params = decode_auth_request(frame)?;
                    let server = Arc::clone(&server);
                    let peer = Arc::clone(&peer);
                    tokio::spawn(async move {
                        let reply = match server.service.login(&params.name, &params.password).await
                        {
                            Ok(player) => {
                                let info = PlayerInfo::from(&player);
                                *lock(&peer.identity) = Some(info.clone());
                                tracing::info!(player = %peer.addr, name = %info.name, "login succeeded");
                                AuthReply::Granted(info)
                            }
                            Err(err) => {
                                tracing::debug!(player = %peer.addr, error = %err, "login failed");
                                AuthReply::Denied
                            }
                        };
                        if let Err(err) = peer.controller.send(encode_auth_response(&reply)) {
                            tracing::warn!(player = %peer.addr, error = %err, "failed to answer login");
                        }
                    });
                    Ok(())
                }),
            );
        }
        {
            let server = Arc::clone(self);
            let peer = Arc::clone(peer);
            controller.register_handler(
                MessageType::ConnectToGameRequest,
                Arc::new(move |frame| {
                    let server_id = decode_connect_to_game_request(frame)?;
                    let reply = server.connect_reply(&peer, server_id);
                    if let Err(err) = peer
                        .controller
                        .send(encode_connect_to_game_response(&reply))
                    {
                        tracing::warn!(player = %peer.addr, error = %err, "failed to answer join request");
                    }
                    Ok(())
                }),
            );
        }
    }

    fn forward_spawn_request(&self, peer: &Arc<PlayerPeer>, name: &str) {
        let Some(launcher) = self.choose_launcher() else {
            tracing::error!(player = %peer.addr, "no launcher available for spawn request");
            return;
        };
        let id = self.next_request_id();
        lock(&self.pending).insert(id, Arc::clone(peer));
        if let Err(err) = launcher.send(encode_spawn_server_request(name, Some(id))) {
            lock(&self.pending).remove(&id);
            tracing::error!(id, error = %err, "failed to forward spawn request");
        }
    }

    /// One request id per launcher: each launcher answers independently
    /// and each answer is forwarded to the player as it arrives.
    fn fan_out_listing_request(&self, peer: &Arc<PlayerPeer>) {
        for launcher in self.connected_launchers() {
            let id = self.next_request_id();
            lock(&self.pending).insert(id, Arc::clone(peer));
            if let Err(err) = launcher.send(encode_get_game_servers(Some(id))) {
                lock(&self.pending).remove(&id);
                tracing::error!(id, error = %err, "failed to forward listing request");
            }
        }
    }

    /// Authenticated players get a fresh token and the coordinates of the
    /// cached server they asked for; everyone else is denied.
    fn connect_reply(&self, peer: &Arc<PlayerPeer>, server_id: u32) -> ConnectReply {
        let identity = lock(&peer.identity).clone();
        let Some(identity) = identity else {
            tracing::debug!(player = %peer.addr, "join request without login");
            return ConnectReply::Denied;
        };
        let game = {
            let known = lock(&self.known_servers);
            known.get(server_id as usize).map(|info| GameServerConnectInfo {
                host: info.host.clone(),
                port: info.port,
            })
        };
        let Some(game) = game else {
            tracing::debug!(player = %peer.addr, server_id, "join request for unknown server");
            return ConnectReply::Denied;
        };
        match AuthToken::generate(identity.id, &self.secret, TOKEN_TTL) {
            Ok(token) => ConnectReply::Granted { token, game },
            Err(err) => {
                tracing::error!(error = %err, "failed to mint token");
                ConnectReply::Denied
            }
        }
    }

    fn register_launcher_handlers(self: &Arc<Self>, controller: &Arc<ConnectionController>) {
        {
            let server = Arc::clone(self);
            controller.register_handler(
                MessageType::ServerSpawned,
                Arc::new(move |frame| {
                    let (info, request_id) = decode_server_spawned(frame)?;
                    let id =
                        request_id.ok_or(ProtocolError::Codec(CodecError::MissingId))?;
                    server.remember_server(&info);
                    server.complete_request(id, encode_server_spawned(&info, None));
                    Ok(())
                }),
            );
        }
        {
            let server = Arc::clone(self);
            controller.register_handler(
                MessageType::SendGameServers,
                Arc::new(move |frame| {
                    let (servers, request_id) = decode_send_game_servers(frame)?;
                    let id =
                        request_id.ok_or(ProtocolError::Codec(CodecError::MissingId))?;
                    for info in &servers {
                        server.remember_server(info);
                    }
                    server.complete_request(id, encode_send_game_servers(&servers, None));
                    Ok(())
                }),
            );
        }
    }

    /// Load-and-delete the waiter and forward the re-encoded response.
    /// A missing waiter means the player is gone: drop the response.
    fn complete_request(&self, id: u32, frame: bytes::Bytes) {
        let waiter = lock(&self.pending).remove(&id);
        match waiter {
            Some(waiter) => {
                if let Err(err) = waiter.controller.send(frame) {
                    tracing::warn!(id, player = %waiter.addr, error = %err, "failed to deliver response");
                }
            }
            None => {
                tracing::error!(id, "no waiter for correlated response, dropping");
            }
        }
    }
}
