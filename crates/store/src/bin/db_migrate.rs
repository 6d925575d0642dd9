//! Creates the credential-store tables at `DB_PATH`.

use minefield_store::SqlStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();
    let store = match SqlStore::from_env().await {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(error = %err, "failed to open store");
            std::process::exit(1);
        }
    };
    if let Err(err) = store.initialize_tables().await {
        tracing::error!(error = %err, "failed to create tables");
        std::process::exit(1);
    }
    tracing::info!("tables created");
}
