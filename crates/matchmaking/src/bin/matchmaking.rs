//! Standalone matchmaking server. Configuration comes from the
//! environment: `DB_PATH` (credential store), `AUTH_SECRET` (token key),
//! `MATCHMAKING_PORT` (default 42071) and `LAUNCHER_HOST`/`LAUNCHER_PORT`
//! (default localhost:42070) for the launcher to dial on startup.

use minefield_matchmaking::MatchmakingServer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();
    let port = std::env::var("MATCHMAKING_PORT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(42071);
    let launcher_host =
        std::env::var("LAUNCHER_HOST").unwrap_or_else(|_| "localhost".to_owned());
    let launcher_port = std::env::var("LAUNCHER_PORT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(42070);

    let server = match MatchmakingServer::from_env(port).await {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "failed to start matchmaking server");
            std::process::exit(1);
        }
    };
    if let Err(err) = server
        .connect_to_launcher(&launcher_host, launcher_port, true)
        .await
    {
        tracing::error!(
            host = %launcher_host,
            port = launcher_port,
            error = %err,
            "failed to reach launcher"
        );
    }
    std::future::pending::<()>().await;
}
