//! HMAC-signed capability tokens.
//!
//! The matchmaker mints a token after a successful login; the game server
//! verifies it during the join handshake. Both sides share the raw secret
//! from `AUTH_SECRET`, so a token proves the bearer authenticated against
//! the matchmaker without the game server ever touching the credential
//! store.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Wire size of a packed token:
/// `player_id:u32 | expiry:i64 | nonce:[16] | signature:[32]`.
pub const AUTH_TOKEN_LEN: usize = 4 + 8 + 16 + 32;

/// A bearer token proving the holder is `player_id` until `expiry`.
///
/// The signature covers `player_id ‖ expiry ‖ nonce`, so neither the
/// identity nor the lifetime can be altered without the secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthToken {
    pub player_id: u32,
    pub expiry: i64,
    pub nonce: [u8; 16],
    pub signature: [u8; 32],
}

impl AuthToken {
    /// Mints a token for `player_id` valid for `ttl` from now.
    pub fn generate(player_id: u32, secret: &[u8], ttl: Duration) -> Result<AuthToken, AuthError> {
        let expiry = unix_now() + ttl.as_secs() as i64;
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let signature = sign(player_id, expiry, &nonce, secret)?;
        Ok(AuthToken {
            player_id,
            expiry,
            nonce,
            signature,
        })
    }

    /// Checks the expiry, then the signature in constant time.
    ///
    /// Expiry is checked first so a tampered-but-expired token reports
    /// `TokenExpired`; any signature mismatch (bit flips, wrong secret,
    /// altered expiry) reports `InvalidSignature`.
    pub fn validate(&self, secret: &[u8]) -> Result<(), AuthError> {
        if unix_now() > self.expiry {
            return Err(AuthError::TokenExpired);
        }
        let mac = mac_over(self.player_id, self.expiry, &self.nonce, secret)?;
        mac.verify_slice(&self.signature)
            .map_err(|_| AuthError::InvalidSignature)
    }
}

/// HMAC-SHA256 over the signed portion of a token.
pub fn sign(
    player_id: u32,
    expiry: i64,
    nonce: &[u8; 16],
    secret: &[u8],
) -> Result<[u8; 32], AuthError> {
    let mac = mac_over(player_id, expiry, nonce, secret)?;
    Ok(mac.finalize().into_bytes().into())
}

fn mac_over(
    player_id: u32,
    expiry: i64,
    nonce: &[u8; 16],
    secret: &[u8],
) -> Result<HmacSha256, AuthError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| AuthError::InvalidFormat)?;
    mac.update(&player_id.to_be_bytes());
    mac.update(&(expiry as u64).to_be_bytes());
    mac.update(nonce);
    Ok(mac)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
