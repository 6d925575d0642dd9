//! SQLite implementation of the player-credential store.
//!
//! The database path comes from `DB_PATH`. The schema is embedded and
//! applied by [`SqlStore::initialize_tables`] (also exposed through the
//! `minefield-db-migrate` binary), which additionally seeds the gamemode
//! reference table from the mode catalog.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

use minefield_game::ModeId;
use minefield_players::{Player, PlayerStore, StoreError};

const SCHEMA: &str = include_str!("../schema.sql");

#[derive(Error, Debug)]
pub enum SqlStoreError {
    #[error("DB_PATH not set in environment")]
    MissingDbPath,

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

pub struct SqlStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct PlayerRow {
    id: i64,
    username: String,
    password_hash: String,
}

impl From<PlayerRow> for Player {
    fn from(row: PlayerRow) -> Player {
        Player {
            id: row.id as u32,
            name: row.username,
            password_hash: row.password_hash,
        }
    }
}

impl SqlStore {
    /// Opens the database file named by `DB_PATH`, creating it if needed.
    pub async fn from_env() -> Result<SqlStore, SqlStoreError> {
        let path = std::env::var("DB_PATH").map_err(|_| SqlStoreError::MissingDbPath)?;
        SqlStore::open(&path).await
    }

    pub async fn open(path: &str) -> Result<SqlStore, SqlStoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(SqlStore { pool })
    }

    /// Applies the embedded schema and seeds the gamemode catalog.
    pub async fn initialize_tables(&self) -> Result<(), SqlStoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        for mode in ModeId::all() {
            sqlx::query("INSERT OR REPLACE INTO gamemodes (id, name) VALUES (?1, ?2)")
                .bind(mode as u8 as i64)
                .bind(mode.name())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
        _ => StoreError::Backend(err.to_string()),
    }
}

#[async_trait]
impl PlayerStore for SqlStore {
    async fn create_player(&self, username: &str, password_hash: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO players (username, password_hash) VALUES (?1, ?2)")
            .bind(username)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_player_by_name(&self, username: &str) -> Result<Player, StoreError> {
        let row = sqlx::query_as::<_, PlayerRow>(
            "SELECT id, username, password_hash FROM players WHERE username = ?1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.map(Player::from).ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store(tag: &str) -> SqlStore {
        let path = std::env::temp_dir().join(format!(
            "minefield-store-{}-{}.db",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let store = SqlStore::open(path.to_str().expect("temp path is not UTF-8"))
            .await
            .expect("failed to open temp database");
        store.initialize_tables().await.expect("failed to migrate");
        store
    }

    #[tokio::test]
    async fn create_and_find_player() {
        let store = temp_store("create-find").await;
        store.create_player("john", "hash-123").await.unwrap();
        let player = store.find_player_by_name("john").await.unwrap();
        assert_eq!(player.name, "john");
        assert_eq!(player.password_hash, "hash-123");
        assert!(player.id > 0);
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let store = temp_store("duplicate").await;
        store.create_player("john", "a").await.unwrap();
        let err = store.create_player("john", "b").await.unwrap_err();
        assert_eq!(err, StoreError::Duplicate);
    }

    #[tokio::test]
    async fn missing_player_reports_not_found() {
        let store = temp_store("missing").await;
        let err = store.find_player_by_name("ghost").await.unwrap_err();
        assert_eq!(err, StoreError::NotFound);
    }

    #[tokio::test]
    async fn migration_is_idempotent() {
        let store = temp_store("idempotent").await;
        store.initialize_tables().await.unwrap();
        store.create_player("john", "h").await.unwrap();
        store.initialize_tables().await.unwrap();
        assert!(store.find_player_by_name("john").await.is_ok());
    }
}
