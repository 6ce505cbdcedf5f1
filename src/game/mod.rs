//! Game Logic Module
//!
//! Pure round rules, kept free of I/O so the session runner stays the only
//! place where sockets and rules meet.

pub mod rules;

pub use rules::{ready_gate, score_round, winner_index, Gesture, ReadyOutcome};
