//! Terminals and transitions
//!
//! A transition takes a signal state on the input side of a synapse to a
//! state on the output side. Its mode says what it may be used for:
//! matching pairs of existing activations into links, or carrying signals
//! over links and spawning new activations.

use crate::relation::Relation;
use crate::signal::SignalState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Terminal {
    Fixed(SignalState),
    /// Accepts any pattern state and passes it on unchanged.
    Variable,
}

impl Terminal {
    pub fn accepts(self, state: SignalState) -> bool {
        match self {
            Terminal::Fixed(s) => s == state,
            Terminal::Variable => state.is_pattern(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionMode {
    MatchOnly,
    PropagateOnly,
    MatchAndPropagate,
}

impl TransitionMode {
    pub fn matches(self) -> bool {
        matches!(self, Self::MatchOnly | Self::MatchAndPropagate)
    }

    pub fn propagates(self) -> bool {
        matches!(self, Self::PropagateOnly | Self::MatchAndPropagate)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: Terminal,
    pub to: Terminal,
    pub mode: TransitionMode,
}

impl Transition {
    pub const fn new(from: Terminal, to: Terminal, mode: TransitionMode) -> Self {
        Self { from, to, mode }
    }

    /// State a matching partner must hold on the output side.
    pub fn expected(&self, input: SignalState) -> Option<SignalState> {
        if !self.from.accepts(input) {
            return None;
        }
        match self.to {
            Terminal::Fixed(s) => Some(s),
            Terminal::Variable => Some(input),
        }
    }

    /// Whether a signal in `input` state at the input activation and one in
    /// `output` state at the output activation belong together.
    pub fn connects(&self, input: SignalState, output: SignalState) -> bool {
        self.expected(input) == Some(output)
    }

    /// State of the signal carried across. Pattern scopes never narrow.
    pub fn next(&self, input: SignalState) -> Option<SignalState> {
        let target = self.expected(input)?;
        Some(match (input, target) {
            (SignalState::Pattern(s), SignalState::Pattern(t)) => SignalState::Pattern(s.next(t)),
            _ => target,
        })
    }
}

/// Transition as attached to a synapse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynapseTransition {
    Single(Transition),
    /// Links only when the input signal coincides with a signal already at
    /// the output activation whose origin stands in `relation` to it.
    Bi {
        first: Transition,
        second: Transition,
        relation: Relation,
    },
}

impl SynapseTransition {
    /// Transition whose mode governs carrying signals.
    pub fn carrier(&self) -> &Transition {
        match self {
            Self::Single(t) => t,
            Self::Bi { first, .. } => first,
        }
    }

    pub fn propagates(&self) -> bool {
        self.carrier().mode.propagates()
    }
}
