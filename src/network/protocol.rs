//! Session Wire Protocol
//!
//! Tokens and typed views for the two per-player connections. The primary
//! channel carries game-state traffic: one Identity frame after connect,
//! then repeating ready-vote / broadcast / choice / broadcast cycles. The
//! secondary channel carries heartbeats one way and roster pushes the
//! other. Frames themselves are untyped (see [`Frame`]); meaning is
//! positional, so every parse here fails closed and the caller treats the
//! offending slot as disconnected.

use crate::game::Gesture;
use crate::network::channel::{ChannelError, Frame};

/// Vote token: the player wants the round to start.
pub const READY: &str = "ready";
/// Vote and broadcast token: keep waiting in the lobby.
pub const WAIT: &str = "wait";
/// Broadcast token: a new player connected, a ready-check is starting.
pub const CONNECTED: &str = "connected";
/// Broadcast token: the ready-check passed, send a choice.
pub const PLAYING: &str = "playing";
/// Heartbeat token emitted on the secondary channel.
pub const HEARTBEAT: &str = "doki";

/// Faults at the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The transport faulted underneath the protocol.
    #[error(transparent)]
    Transport(#[from] ChannelError),

    /// The peer sent a frame outside the expected sequence.
    #[error("unexpected message: {0:?}")]
    Unexpected(Frame),
}

/// A player's answer to a ready-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyVote {
    /// Start the round.
    Ready,
    /// Hold the lobby open.
    Wait,
}

impl ReadyVote {
    /// Wire word for this vote.
    pub fn as_str(self) -> &'static str {
        match self {
            ReadyVote::Ready => READY,
            ReadyVote::Wait => WAIT,
        }
    }

    /// Parse a vote frame; anything else is a protocol violation.
    pub fn from_frame(frame: Frame) -> Result<Self, ProtocolError> {
        match &frame {
            Frame::Text(s) if s == READY => Ok(ReadyVote::Ready),
            Frame::Text(s) if s == WAIT => Ok(ReadyVote::Wait),
            _ => Err(ProtocolError::Unexpected(frame)),
        }
    }
}

/// Parse a choice frame; anything outside the gesture alphabet is a
/// protocol violation.
pub fn choice_from_frame(frame: Frame) -> Result<Gesture, ProtocolError> {
    match &frame {
        Frame::Text(s) => s.parse().map_err(|_| ProtocolError::Unexpected(frame)),
        Frame::List(_) => Err(ProtocolError::Unexpected(frame)),
    }
}

/// Lobby-phase broadcast received on the primary channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateBroadcast {
    /// Enough players are here; a ready-check is open.
    Connected,
    /// The lobby stays open; vote again once prompted.
    Wait,
    /// The round is on; submit a choice.
    Playing,
}

impl GateBroadcast {
    /// Parse a lobby broadcast; anything else is a protocol violation.
    pub fn from_frame(frame: Frame) -> Result<Self, ProtocolError> {
        match &frame {
            Frame::Text(s) if s == CONNECTED => Ok(GateBroadcast::Connected),
            Frame::Text(s) if s == WAIT => Ok(GateBroadcast::Wait),
            Frame::Text(s) if s == PLAYING => Ok(GateBroadcast::Playing),
            _ => Err(ProtocolError::Unexpected(frame)),
        }
    }
}

/// What the post-choice broadcast resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The round was abandoned for lack of players; return to waiting.
    Aborted,
    /// The named player won the round.
    Winner(String),
}

impl RoundOutcome {
    /// Parse the broadcast that follows a submitted choice. `wait` means
    /// the round was aborted; any other text is the winner's name.
    pub fn from_frame(frame: Frame) -> Result<Self, ProtocolError> {
        match frame {
            Frame::Text(s) if s == WAIT => Ok(RoundOutcome::Aborted),
            Frame::Text(name) => Ok(RoundOutcome::Winner(name)),
            list => Err(ProtocolError::Unexpected(list)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn votes_parse_and_fail_closed() {
        assert_eq!(
            ReadyVote::from_frame(Frame::Text("ready".into())).unwrap(),
            ReadyVote::Ready
        );
        assert_eq!(
            ReadyVote::from_frame(Frame::Text("wait".into())).unwrap(),
            ReadyVote::Wait
        );
        assert!(ReadyVote::from_frame(Frame::Text("rock".into())).is_err());
        assert!(ReadyVote::from_frame(Frame::List(vec![])).is_err());
    }

    #[test]
    fn choices_parse_and_fail_closed() {
        assert_eq!(
            choice_from_frame(Frame::Text("scissors".into())).unwrap(),
            Gesture::Scissors
        );
        assert!(choice_from_frame(Frame::Text("ready".into())).is_err());
        assert!(choice_from_frame(Frame::List(vec!["rock".into()])).is_err());
    }

    #[test]
    fn gate_broadcasts_parse() {
        assert_eq!(
            GateBroadcast::from_frame(Frame::Text("connected".into())).unwrap(),
            GateBroadcast::Connected
        );
        assert_eq!(
            GateBroadcast::from_frame(Frame::Text("playing".into())).unwrap(),
            GateBroadcast::Playing
        );
        assert!(GateBroadcast::from_frame(Frame::Text("alice".into())).is_err());
    }

    #[test]
    fn round_outcome_treats_wait_as_aborted() {
        assert_eq!(
            RoundOutcome::from_frame(Frame::Text("wait".into())).unwrap(),
            RoundOutcome::Aborted
        );
        assert_eq!(
            RoundOutcome::from_frame(Frame::Text("alice".into())).unwrap(),
            RoundOutcome::Winner("alice".into())
        );
        assert!(RoundOutcome::from_frame(Frame::List(vec![])).is_err());
    }
}
