//! # Minefield
//!
//! A three-tier multiplayer minesweeper service:
//! - A length-prefixed binary wire protocol with request correlation
//! - Short-lived game servers hosting one match each
//! - Game launchers that spawn servers on demand
//! - A matchmaking tier that routes players to launchers and mints
//!   HMAC capability tokens for joining game servers
//!
//! ## Components
//!
//! - `minefield-protocol`: wire codec, framing and the connection controller
//! - `minefield-game`: board rules, cascade reveal and game-mode plugins
//! - `minefield-players`: player identity, credentials and auth tokens
//! - `minefield-store`: SQLite-backed player store
//! - `minefield-server`: per-match game-server session
//! - `minefield-launcher`: spawns and registers game servers
//! - `minefield-matchmaking`: request router between players and launchers

pub use minefield_game as game;
pub use minefield_launcher as launcher;
pub use minefield_matchmaking as matchmaking;
pub use minefield_players as players;
pub use minefield_protocol as protocol;
pub use minefield_server as server;
pub use minefield_store as store;
