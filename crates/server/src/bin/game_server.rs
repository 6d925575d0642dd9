//! Standalone game server. Configuration comes from the environment:
//! `SERVER_NAME` (default "Server"), `GAME_SERVER_PORT` (default 0 =
//! OS-assigned) and `AUTH_SECRET` (presence enables the token handshake).

use minefield_server::{AuthSettings, GameServer};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();
    let name = std::env::var("SERVER_NAME").unwrap_or_else(|_| "Server".to_owned());
    let port = std::env::var("GAME_SERVER_PORT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0);
    let server = match GameServer::spawn(0, &name, port, AuthSettings::from_env()).await {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "failed to start game server");
            std::process::exit(1);
        }
    };
    tracing::info!(name = server.name(), port = server.port(), "game server started");
    std::future::pending::<()>().await;
}
