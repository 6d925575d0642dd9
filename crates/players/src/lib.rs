//! Player identity and credentials.
//!
//! The credential store itself lives behind the [`PlayerStore`] trait;
//! this crate provides the service layer on top (bcrypt hashing and
//! verification) plus the HMAC capability tokens game servers accept.

pub mod error;
pub mod token;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

pub use error::{AuthError, StoreError};
pub use token::{AuthToken, AUTH_TOKEN_LEN};

/// A registered player as stored in the credential store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: u32,
    pub name: String,
    pub password_hash: String,
}

/// Identity sent over the wire: no credential material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub id: u32,
    pub name: String,
}

impl From<&Player> for PlayerInfo {
    fn from(player: &Player) -> Self {
        PlayerInfo {
            id: player.id,
            name: player.name.clone(),
        }
    }
}

/// Credential-store contract. The SQLite implementation lives in
/// `minefield-store`; [`MemoryStore`] backs tests.
#[async_trait]
pub trait PlayerStore: Send + Sync {
    async fn create_player(&self, username: &str, password_hash: &str) -> Result<(), StoreError>;

    async fn find_player_by_name(&self, username: &str) -> Result<Player, StoreError>;
}

/// Registration and login on top of a [`PlayerStore`].
///
/// Passwords are bcrypt-hashed; hashing and verification run on the
/// blocking pool so a burst of logins cannot stall the reactor.
#[derive(Clone)]
pub struct PlayerService {
    store: Arc<dyn PlayerStore>,
}

impl PlayerService {
    pub fn new(store: Arc<dyn PlayerStore>) -> PlayerService {
        PlayerService { store }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let password = password.to_owned();
        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
            .await
            .map_err(|e| AuthError::Hash(e.to_string()))?
            .map_err(|e| AuthError::Hash(e.to_string()))?;
        self.store.create_player(username, &hash).await?;
        Ok(())
    }

    /// Verifies credentials. An unknown name and a bad password both
    /// collapse into `InvalidCredentials`.
    pub async fn login(&self, username: &str, password: &str) -> Result<Player, AuthError> {
        let player = self
            .store
            .find_player_by_name(username)
            .await
            .map_err(|_| AuthError::InvalidCredentials)?;
        let password = password.to_owned();
        let hash = player.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AuthError::Hash(e.to_string()))?
            .map_err(|e| AuthError::Hash(e.to_string()))?;
        if !matches {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(player)
    }

    pub async fn find_player_by_name(&self, username: &str) -> Result<Player, StoreError> {
        self.store.find_player_by_name(username).await
    }
}

/// In-memory store with the same semantics as the SQLite backend.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    next_id: u32,
    players: HashMap<String, Player>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

#[async_trait]
impl PlayerStore for MemoryStore {
    async fn create_player(&self, username: &str, password_hash: &str) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if inner.players.contains_key(username) {
            return Err(StoreError::Duplicate);
        }
        inner.next_id += 1;
        let player = Player {
            id: inner.next_id,
            name: username.to_owned(),
            password_hash: password_hash.to_owned(),
        };
        inner.players.insert(username.to_owned(), player);
        Ok(())
    }

    async fn find_player_by_name(&self, username: &str) -> Result<Player, StoreError> {
        let inner = self
            .inner
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        inner.players.get(username).cloned().ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> PlayerService {
        PlayerService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn register_then_login() {
        let service = service();
        service.register("john", "password+123").await.unwrap();
        let player = service.login("john", "password+123").await.unwrap();
        assert_eq!(player.name, "john");
        assert_ne!(player.password_hash, "password+123");
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let service = service();
        service.register("john", "password+123").await.unwrap();
        let err = service.login("john", "nope").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unknown_player_is_invalid_credentials() {
        let service = service();
        let err = service.login("ghost", "whatever").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let service = service();
        service.register("john", "a").await.unwrap();
        let err = service.register("john", "b").await.unwrap_err();
        assert!(matches!(err, AuthError::Store(StoreError::Duplicate)));
    }
}
