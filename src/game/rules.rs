//! Round Rules
//!
//! The gesture alphabet, the pairwise-beats relation, per-round scoring,
//! winner selection, and the ready-check gate policy. Everything here is
//! pure; the session runner feeds it gathered input and broadcasts what
//! comes back.

use std::fmt;
use std::str::FromStr;

/// A player's gesture for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// Beats scissors.
    Rock,
    /// Beats rock.
    Paper,
    /// Beats paper.
    Scissors,
}

impl Gesture {
    /// Wire word for this gesture.
    pub fn as_str(self) -> &'static str {
        match self {
            Gesture::Rock => "rock",
            Gesture::Paper => "paper",
            Gesture::Scissors => "scissors",
        }
    }

    /// Whether this gesture beats `other`. Irreflexive; a gesture never
    /// beats itself.
    pub fn beats(self, other: Gesture) -> bool {
        matches!(
            (self, other),
            (Gesture::Rock, Gesture::Scissors)
                | (Gesture::Scissors, Gesture::Paper)
                | (Gesture::Paper, Gesture::Rock)
        )
    }

    /// All three gestures, in wire order.
    pub const ALL: [Gesture; 3] = [Gesture::Rock, Gesture::Paper, Gesture::Scissors];
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a word outside the gesture alphabet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a gesture: {0:?}")]
pub struct ParseGestureError(pub String);

impl FromStr for Gesture {
    type Err = ParseGestureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rock" => Ok(Gesture::Rock),
            "paper" => Ok(Gesture::Paper),
            "scissors" => Ok(Gesture::Scissors),
            other => Err(ParseGestureError(other.to_string())),
        }
    }
}

/// Score each slot's gesture against every other slot: one point per
/// opponent beaten. Ties and self contribute nothing.
pub fn score_round(choices: &[Gesture]) -> Vec<u32> {
    choices
        .iter()
        .enumerate()
        .map(|(i, mine)| {
            choices
                .iter()
                .enumerate()
                .filter(|&(j, other)| i != j && mine.beats(*other))
                .count() as u32
        })
        .collect()
}

/// Index of the round winner: the first slot holding the strictly highest
/// score, so the earliest-connected slot wins every tie. `None` only for an
/// empty round.
pub fn winner_index(scores: &[u32]) -> Option<usize> {
    if scores.is_empty() {
        return None;
    }
    let mut winner = 0;
    for (i, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[winner] {
            winner = i;
        }
    }
    Some(winner)
}

/// Outcome of tallying a ready-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// A strict majority voted ready; the round proceeds.
    Play,
    /// Ties favor waiting, as does losing the quorum of 2.
    Wait,
}

/// Gate policy for a tallied ready-check: play iff strictly more slots
/// voted ready than waiting and at least 2 voters remain.
pub fn ready_gate(ready: usize, waiting: usize) -> ReadyOutcome {
    if ready + waiting < 2 || ready <= waiting {
        ReadyOutcome::Wait
    } else {
        ReadyOutcome::Play
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gesture() -> impl Strategy<Value = Gesture> {
        prop_oneof![
            Just(Gesture::Rock),
            Just(Gesture::Paper),
            Just(Gesture::Scissors),
        ]
    }

    #[test]
    fn beats_is_cyclic() {
        assert!(Gesture::Rock.beats(Gesture::Scissors));
        assert!(Gesture::Scissors.beats(Gesture::Paper));
        assert!(Gesture::Paper.beats(Gesture::Rock));
    }

    #[test]
    fn wire_words_round_trip() {
        for g in Gesture::ALL {
            assert_eq!(g.as_str().parse::<Gesture>().unwrap(), g);
        }
        assert!("lizard".parse::<Gesture>().is_err());
    }

    proptest! {
        #[test]
        fn beats_is_irreflexive(g in gesture()) {
            prop_assert!(!g.beats(g));
        }

        #[test]
        fn beats_is_antisymmetric(a in gesture(), b in gesture()) {
            prop_assert!(!(a.beats(b) && b.beats(a)));
        }

        #[test]
        fn distinct_gestures_have_exactly_one_winner(a in gesture(), b in gesture()) {
            if a != b {
                prop_assert!(a.beats(b) ^ b.beats(a));
            }
        }

        #[test]
        fn score_counts_beaten_opponents(choices in prop::collection::vec(gesture(), 1..8)) {
            let scores = score_round(&choices);
            prop_assert_eq!(scores.len(), choices.len());
            for (i, score) in scores.iter().enumerate() {
                let expected = choices
                    .iter()
                    .enumerate()
                    .filter(|&(j, other)| i != j && choices[i].beats(*other))
                    .count() as u32;
                prop_assert_eq!(*score, expected);
            }
        }

        #[test]
        fn winner_is_first_maximum(scores in prop::collection::vec(0u32..4, 1..8)) {
            let w = winner_index(&scores).unwrap();
            let max = *scores.iter().max().unwrap();
            prop_assert_eq!(scores[w], max);
            prop_assert!(scores[..w].iter().all(|&s| s < max));
        }
    }

    #[test]
    fn winner_ties_go_to_earliest_slot() {
        assert_eq!(winner_index(&[1, 1, 0]), Some(0));
        assert_eq!(winner_index(&[0, 2, 2, 1]), Some(1));
        assert_eq!(winner_index(&[]), None);
    }

    #[test]
    fn two_player_round_scores() {
        let scores = score_round(&[Gesture::Rock, Gesture::Scissors]);
        assert_eq!(scores, vec![1, 0]);
        assert_eq!(winner_index(&scores), Some(0));
    }

    #[test]
    fn all_tied_round_goes_to_first_slot() {
        let scores = score_round(&[Gesture::Rock, Gesture::Rock, Gesture::Rock]);
        assert_eq!(scores, vec![0, 0, 0]);
        assert_eq!(winner_index(&scores), Some(0));
    }

    #[test]
    fn ready_gate_requires_strict_majority() {
        assert_eq!(ready_gate(2, 1), ReadyOutcome::Play);
        assert_eq!(ready_gate(3, 0), ReadyOutcome::Play);
        // Ties favor waiting.
        assert_eq!(ready_gate(1, 1), ReadyOutcome::Wait);
        assert_eq!(ready_gate(2, 2), ReadyOutcome::Wait);
        assert_eq!(ready_gate(1, 2), ReadyOutcome::Wait);
    }

    #[test]
    fn ready_gate_needs_two_voters() {
        assert_eq!(ready_gate(1, 0), ReadyOutcome::Wait);
        assert_eq!(ready_gate(0, 0), ReadyOutcome::Wait);
    }
}
