//! # Janken Game Server
//!
//! A single-process lobby and game host for elimination-style janken
//! rounds. Clients bootstrap over HTTP, then talk to their game instance
//! directly over two raw TCP connections.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      JANKEN SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/            - Round rules (pure)                       │
//! │  └── rules.rs     - Gestures, scoring, winner, ready gate    │
//! │                                                              │
//! │  network/         - Sessions and the lobby                   │
//! │  ├── channel.rs   - Framed string/list values over TCP       │
//! │  ├── protocol.rs  - Wire tokens and typed message views      │
//! │  ├── session.rs   - Per-instance state machine + roster task │
//! │  ├── registry.rs  - Instance creation, discovery, reaping    │
//! │  └── client.rs    - The player's side of the protocol        │
//! │                                                              │
//! │  lobby.rs         - HTTP bootstrap (action-dispatched)       │
//! │  store.rs         - Durable accounts and win counts          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Session protocol
//!
//! Each player holds two connections to its instance. The primary channel
//! carries one identity frame, then repeating vote/broadcast and
//! choice/broadcast exchanges; the secondary channel carries client
//! heartbeats one way and roster pushes the other. Frames are untyped and
//! meaning is positional, so every server-side parse fails closed and a
//! misbehaving peer is simply disconnected.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod lobby;
pub mod network;
pub mod store;

// Re-export commonly used types
pub use game::{Gesture, ReadyOutcome};
pub use network::{
    ClientConfig, GameSession, SessionClient, SessionConfig, SessionInfo, SessionRegistry,
};
pub use store::ScoreStore;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
