//! Per-activation round history and reversible state changes

use crate::weight::NormWeight;
use aika_core::ActivationId;
use serde::{Deserialize, Serialize};

/// Search decision for one candidate.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Unknown,
    Selected,
    Excluded,
}

impl Default for Decision {
    fn default() -> Self {
        Decision::Unknown
    }
}

/// Which side of a [`StateChange`] to restore.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Change {
    Old,
    New,
}

/// Value of an activation in one relaxation round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundState {
    pub value: f64,
    pub net: f64,
    pub weight: NormWeight,
}

/// Round history. Only rounds whose state differs from the previous one are
/// stored, so `get` returns the last stored state at or before the round.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rounds {
    states: Vec<(u32, RoundState)>,
}

impl Rounds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, round: u32) -> RoundState {
        self.states
            .iter()
            .rev()
            .find(|(r, _)| *r <= round)
            .map(|(_, s)| *s)
            .unwrap_or_default()
    }

    /// Set the state of `round`, dropping later rounds. Returns whether the
    /// history changed.
    pub fn set(&mut self, round: u32, state: RoundState) -> bool {
        let before = self.states.clone();
        self.states.retain(|(r, _)| *r < round);
        // a round equal to its predecessor carries no information
        if self.get(round) != state {
            self.states.push((round, state));
        }
        self.states != before
    }

    /// Last round that holds a stored state.
    pub fn last_round(&self) -> u32 {
        self.states.last().map(|(r, _)| *r).unwrap_or(0)
    }

    pub fn last(&self) -> RoundState {
        self.states.last().map(|(_, s)| *s).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Reversible record of one activation's change during a search decision.
#[derive(Clone, Debug, PartialEq)]
pub struct StateChange {
    pub activation: ActivationId,
    pub old_rounds: Rounds,
    pub new_rounds: Rounds,
    pub old_decision: Decision,
    pub new_decision: Decision,
}

impl StateChange {
    pub fn rounds(&self, change: Change) -> &Rounds {
        match change {
            Change::Old => &self.old_rounds,
            Change::New => &self.new_rounds,
        }
    }

    pub fn decision(&self, change: Change) -> Decision {
        match change {
            Change::Old => self.old_decision,
            Change::New => self.new_decision,
        }
    }

    /// Weight this change adds on top of the old state.
    pub fn weight_delta(&self) -> NormWeight {
        self.new_rounds.last().weight - self.old_rounds.last().weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(value: f64) -> RoundState {
        RoundState {
            value,
            net: value,
            weight: NormWeight::new(value, 1.0),
        }
    }

    #[test]
    fn get_reads_last_state_at_or_before() {
        let mut rounds = Rounds::new();
        assert!(rounds.set(0, state(1.0)));
        assert!(rounds.set(2, state(2.0)));
        assert_eq!(rounds.get(1), state(1.0));
        assert_eq!(rounds.get(5), state(2.0));
        assert_eq!(rounds.last_round(), 2);
    }

    #[test]
    fn unchanged_round_is_not_stored() {
        let mut rounds = Rounds::new();
        rounds.set(0, state(1.0));
        assert!(!rounds.set(1, state(1.0)));
        assert_eq!(rounds.last_round(), 0);
    }

    #[test]
    fn setting_earlier_round_drops_later_ones() {
        let mut rounds = Rounds::new();
        rounds.set(0, state(1.0));
        rounds.set(3, state(4.0));
        assert!(rounds.set(1, state(2.0)));
        assert_eq!(rounds.get(3), state(2.0));
    }
}
