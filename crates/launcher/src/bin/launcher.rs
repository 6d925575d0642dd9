//! Standalone game launcher. Configuration comes from the environment:
//! `LAUNCHER_HOST` (externally visible host, default "localhost"),
//! `LAUNCHER_PORT` (default 42070) and `AUTH_SECRET` (passed through to
//! spawned game servers).

use minefield_launcher::GameLauncher;
use minefield_server::AuthSettings;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();
    let host = std::env::var("LAUNCHER_HOST").unwrap_or_else(|_| "localhost".to_owned());
    let port = std::env::var("LAUNCHER_PORT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(42070);
    match GameLauncher::bind(&host, port, AuthSettings::from_env()).await {
        Ok(_launcher) => {
            tracing::info!("game launcher running");
            std::future::pending::<()>().await;
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to start game launcher");
            std::process::exit(1);
        }
    }
}
