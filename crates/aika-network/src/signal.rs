//! Binding signals
//!
//! A binding signal records that an activation is bound to some origin
//! activation. Pattern signals carry a scope that only ever widens as the
//! signal crosses synapses (SAME, then INPUT, then RELATED). Branch signals
//! mark binding activations so inhibitory loops can tell rivals apart.

use aika_core::{ActivationId, NeuronId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SignalId(pub u32);

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Same,
    Input,
    Related,
}

impl Scope {
    /// Scope after crossing a transition towards `target`. Never narrows.
    pub fn next(self, target: Scope) -> Scope {
        self.max(target)
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalState {
    Pattern(Scope),
    Branch,
}

impl SignalState {
    pub fn is_pattern(self) -> bool {
        matches!(self, SignalState::Pattern(_))
    }
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalState::Pattern(s) => write!(f, "pattern:{:?}", s),
            SignalState::Branch => write!(f, "branch"),
        }
    }
}

/// Key of a signal within one activation.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SignalKey {
    pub origin_neuron: NeuronId,
    pub state: SignalState,
    pub origin_activation: ActivationId,
}

#[derive(Clone, Debug)]
pub struct BindingSignal {
    pub id: SignalId,
    /// Activation holding this signal.
    pub activation: ActivationId,
    /// Root of the parent chain. A root signal is its own origin.
    pub origin: SignalId,
    pub origin_activation: ActivationId,
    pub origin_neuron: NeuronId,
    pub parent: Option<SignalId>,
    pub depth: u32,
    pub state: SignalState,
}

impl BindingSignal {
    pub fn key(&self) -> SignalKey {
        SignalKey {
            origin_neuron: self.origin_neuron,
            state: self.state,
            origin_activation: self.origin_activation,
        }
    }

    pub fn is_origin(&self) -> bool {
        self.origin == self.id
    }
}

/// Arena of every signal in a document.
#[derive(Debug, Default)]
pub struct SignalArena {
    signals: Vec<BindingSignal>,
}

impl SignalArena {
    pub fn get(&self, id: SignalId) -> Option<&BindingSignal> {
        self.signals.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Root signal of a new origin activation.
    pub fn origin(&mut self, activation: ActivationId, neuron: NeuronId, state: SignalState) -> SignalId {
        let id = SignalId(self.signals.len() as u32);
        self.signals.push(BindingSignal {
            id,
            activation,
            origin: id,
            origin_activation: activation,
            origin_neuron: neuron,
            parent: None,
            depth: 0,
            state,
        });
        id
    }

    /// Signal derived from `parent`, held by `activation`.
    pub fn derive(&mut self, parent: SignalId, activation: ActivationId, state: SignalState) -> Option<SignalId> {
        let p = self.get(parent)?.clone();
        let id = SignalId(self.signals.len() as u32);
        self.signals.push(BindingSignal {
            id,
            activation,
            origin: p.origin,
            origin_activation: p.origin_activation,
            origin_neuron: p.origin_neuron,
            parent: Some(parent),
            depth: p.depth + 1,
            state,
        });
        Some(id)
    }

    /// Follow parents up to the root.
    pub fn root(&self, id: SignalId) -> Option<SignalId> {
        let mut current = self.get(id)?;
        while let Some(parent) = current.parent {
            current = self.get(parent)?;
        }
        Some(current.id)
    }
}
