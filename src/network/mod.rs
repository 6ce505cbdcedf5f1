//! Network Layer
//!
//! Sockets, sessions, and the lobby registry. Everything that blocks on a
//! peer lives here; the round rules themselves stay in `game/`.

pub mod channel;
pub mod client;
pub mod protocol;
pub mod registry;
pub mod session;

pub use channel::{Channel, ChannelError, Frame, FrameReader, FrameWriter};
pub use client::{ClientConfig, ClientError, SessionClient};
pub use protocol::{GateBroadcast, ProtocolError, ReadyVote, RoundOutcome};
pub use registry::{RegistryError, SessionRegistry};
pub use session::{GameSession, SessionConfig, SessionError, SessionInfo};
