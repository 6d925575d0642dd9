//! The game launcher hosts game servers on one physical machine.
//!
//! It accepts matchmaking peers over TCP and answers two requests:
//! spawn a new game server, and list the registered ones. Every
//! `GameServerInfo` leaving the launcher has the launcher's externally
//! visible host stamped into it - game servers bind `0.0.0.0` and cannot
//! know the address players should dial.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use minefield_protocol::service::{
    decode_get_game_servers, decode_spawn_server_request, encode_send_game_servers,
    encode_server_spawned,
};
use minefield_protocol::{ConnectionController, GameServerInfo, MessageType};
use minefield_server::{AuthSettings, GameServer, ServerError};

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Server(#[from] ServerError),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct GameLauncher {
    public_host: String,
    port: u16,
    auth: Option<AuthSettings>,
    next_server_id: Mutex<u32>,
    servers: Mutex<HashMap<u32, Arc<GameServer>>>,
}

impl GameLauncher {
    /// Binds the launcher port and starts accepting matchmaking peers.
    ///
    /// `public_host` is what players are told to dial; spawned game
    /// servers inherit `auth` so tokens verify with the same secret the
    /// matchmaker signs with.
    pub async fn bind(
        public_host: &str,
        port: u16,
        auth: Option<AuthSettings>,
    ) -> Result<Arc<GameLauncher>, LauncherError> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let port = listener.local_addr()?.port();
        let launcher = Arc::new(GameLauncher {
            public_host: public_host.to_owned(),
            port,
            auth,
            next_server_id: Mutex::new(0),
            servers: Mutex::new(HashMap::new()),
        });
        tokio::spawn(GameLauncher::accept_loop(Arc::clone(&launcher), listener));
        tracing::info!(host = %launcher.public_host, port, "game launcher listening");
        Ok(launcher)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    async fn accept_loop(launcher: Arc<GameLauncher>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    tracing::info!(peer = %addr, "matchmaking peer connected");
                    launcher.admit(stream);
                }
                Err(err) => {
                    tracing::error!(error = %err, "accept failed, stopping launcher");
                    return;
                }
            }
        }
    }

    fn admit(self: &Arc<Self>, stream: TcpStream) {
        let controller = ConnectionController::new();
        if let Err(err) = controller.set_connection(stream) {
            tracing::error!(error = %err, "failed to adopt matchmaking peer");
            return;
        }
        self.register_peer_handlers(&controller);
        let weak = Arc::downgrade(&controller);
        controller.set_disconnect_hook(move || {
            if let Some(controller) = weak.upgrade() {
                controller.clear_handlers();
            }
            tracing::info!("matchmaking peer disconnected");
        });
        controller.spawn();
    }

    fn register_peer_handlers(self: &Arc<Self>, controller: &Arc<ConnectionController>) {
        {
            let launcher = Arc::clone(self);
            let peer = Arc::downgrade(controller);
            controller.register_handler(
                MessageType::SpawnServerRequest,
                Arc::new(move |frame| {
                    let (name, request_id) = decode_spawn_server_request(frame)?;
                    let launcher = Arc::clone(&launcher);
                    let peer = peer.clone();
                    // Binding the new server's port is async; answer from
                    // a task so the peer's read loop keeps draining.
                    tokio::spawn(async move {
                        let server = match launcher.spawn_game_server(&name).await {
                            Ok(server) => server,
                            Err(err) => {
                                tracing::error!(name = %name, error = %err, "failed to spawn game server");
                                return;
                            }
                        };
                        let mut info = server.server_info();
                        info.host = launcher.public_host.clone();
                        if let Some(peer) = peer.upgrade() {
                            if let Err(err) = peer.send(encode_server_spawned(&info, request_id)) {
                                tracing::warn!(error = %err, "failed to answer spawn request");
                            }
                        }
                    });
                    Ok(())
                }),
            );
        }
        {
            let launcher = Arc::clone(self);
            let peer = Arc::downgrade(controller);
            controller.register_handler(
                MessageType::GetGameServers,
                Arc::new(move |frame| {
                    let request_id = decode_get_game_servers(frame)?;
                    let listing = launcher.server_listing();
                    if let Some(peer) = peer.upgrade() {
                        if let Err(err) = peer.send(encode_send_game_servers(&listing, request_id))
                        {
                            tracing::warn!(error = %err, "failed to answer server listing");
                        }
                    }
                    Ok(())
                }),
            );
        }
    }

    /// Spawns a game server on an OS-assigned port and registers it under
    /// the next local id.
    pub async fn spawn_game_server(&self, name: &str) -> Result<Arc<GameServer>, ServerError> {
        let id = {
            let mut next = lock(&self.next_server_id);
            let id = *next;
            *next += 1;
            id
        };
        let server = GameServer::spawn(id, name, 0, self.auth.clone()).await?;
        tracing::info!(id, name, port = server.port(), "spawned game server");
        lock(&self.servers).insert(id, Arc::clone(&server));
        Ok(server)
    }

    /// Every registered server with live player counts, host stamped.
    pub fn server_listing(&self) -> Vec<GameServerInfo> {
        lock(&self.servers)
            .values()
            .map(|server| {
                let mut info = server.server_info();
                info.host = self.public_host.clone();
                info
            })
            .collect()
    }

    /// Looks a registered server up by id.
    pub fn server(&self, id: u32) -> Option<Arc<GameServer>> {
        lock(&self.servers).get(&id).cloned()
    }
}
