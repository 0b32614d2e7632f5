//! Synapses and their transition tables

use crate::relation::Relation;
use crate::signal::{Scope, SignalState};
use crate::transition::{SynapseTransition, Terminal, Transition, TransitionMode};
use aika_core::{NeuronId, SynapseId};
use serde::{Deserialize, Serialize};

const SAME: Terminal = Terminal::Fixed(SignalState::Pattern(Scope::Same));
const INPUT: Terminal = Terminal::Fixed(SignalState::Pattern(Scope::Input));
const RELATED: Terminal = Terminal::Fixed(SignalState::Pattern(Scope::Related));
const BRANCH: Terminal = Terminal::Fixed(SignalState::Branch);

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynapseKind {
    /// Token or pattern into a binding neuron.
    PrimaryInput,
    /// Binding neuron into a pattern neuron.
    InputPattern,
    /// Pattern back into one of its binding neurons.
    PatternFeedback,
    /// Binding neuron into an inhibitory neuron.
    Inhibitory,
    /// Inhibitory neuron back into binding neurons.
    NegativeFeedback,
}

impl SynapseKind {
    /// Recurrent synapses read their input from the previous round.
    pub fn is_recurrent(self) -> bool {
        matches!(self, Self::PatternFeedback | Self::NegativeFeedback)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::PrimaryInput => "primary-input",
            Self::InputPattern => "input-pattern",
            Self::PatternFeedback => "pattern-feedback",
            Self::Inhibitory => "inhibitory",
            Self::NegativeFeedback => "negative-feedback",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Synapse {
    pub id: SynapseId,
    pub kind: SynapseKind,
    pub input: NeuronId,
    pub output: NeuronId,
    pub weight: f64,
    /// Siblings may be linked through discovered relations.
    pub allow_latent_linking: bool,
    /// Links over this synapse never create new output activations.
    pub propagate_disabled: bool,
    /// Synapse this one was instantiated from.
    pub template: Option<SynapseId>,
    /// Explicit relation between the incoming origin and an origin already
    /// bound to the output activation, read `existing R incoming`.
    pub relation: Option<Relation>,
}

impl Synapse {
    pub fn is_recurrent(&self) -> bool {
        self.kind.is_recurrent()
    }

    pub fn transitions(&self) -> Vec<SynapseTransition> {
        use TransitionMode::*;
        match (self.kind, self.relation) {
            (SynapseKind::PrimaryInput, _) => vec![SynapseTransition::Single(Transition::new(
                SAME,
                INPUT,
                MatchAndPropagate,
            ))],
            (SynapseKind::InputPattern, None) => vec![SynapseTransition::Single(
                Transition::new(INPUT, RELATED, MatchAndPropagate),
            )],
            (SynapseKind::InputPattern, Some(relation)) => vec![SynapseTransition::Bi {
                first: Transition::new(Terminal::Variable, RELATED, MatchAndPropagate),
                second: Transition::new(RELATED, RELATED, MatchOnly),
                relation,
            }],
            (SynapseKind::PatternFeedback, _) => vec![SynapseTransition::Single(
                Transition::new(RELATED, INPUT, MatchOnly),
            )],
            (SynapseKind::Inhibitory, _) => vec![
                SynapseTransition::Single(Transition::new(
                    Terminal::Variable,
                    Terminal::Variable,
                    MatchAndPropagate,
                )),
                SynapseTransition::Single(Transition::new(BRANCH, BRANCH, PropagateOnly)),
            ],
            (SynapseKind::NegativeFeedback, _) => vec![SynapseTransition::Single(
                Transition::new(Terminal::Variable, Terminal::Variable, MatchOnly),
            )],
        }
    }

    /// Whether firing the input activation may create output activations.
    pub fn can_propagate(&self) -> bool {
        !self.propagate_disabled && self.transitions().iter().any(|t| t.propagates())
    }

    /// Latent links between two synapses of one output neuron are allowed
    /// when neither is instantiated from the other and at least one opts in.
    pub fn latent_compatible(&self, sibling: &Synapse) -> bool {
        self.id != sibling.id
            && self.output == sibling.output
            && self.template != Some(sibling.id)
            && sibling.template != Some(self.id)
            && (self.allow_latent_linking || sibling.allow_latent_linking)
    }
}

/// Builder passed to [`Model::connect`](crate::model::Model::connect).
#[derive(Clone, Debug)]
pub struct SynapseSpec {
    pub kind: SynapseKind,
    pub input: NeuronId,
    pub output: NeuronId,
    pub weight: f64,
    pub allow_latent_linking: bool,
    pub propagate_disabled: bool,
    pub template: Option<SynapseId>,
    pub relation: Option<Relation>,
}

impl SynapseSpec {
    pub fn new(kind: SynapseKind, input: NeuronId, output: NeuronId) -> Self {
        Self {
            kind,
            input,
            output,
            weight: 0.0,
            allow_latent_linking: false,
            propagate_disabled: false,
            template: None,
            relation: None,
        }
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn latent(mut self, allow: bool) -> Self {
        self.allow_latent_linking = allow;
        self
    }

    pub fn propagate_disabled(mut self, disabled: bool) -> Self {
        self.propagate_disabled = disabled;
        self
    }

    pub fn template(mut self, template: SynapseId) -> Self {
        self.template = Some(template);
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relation = Some(relation);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synapse(id: u64, kind: SynapseKind) -> Synapse {
        Synapse {
            id: SynapseId(id),
            kind,
            input: NeuronId(0),
            output: NeuronId(1),
            weight: 1.0,
            allow_latent_linking: false,
            propagate_disabled: false,
            template: None,
            relation: None,
        }
    }

    #[test]
    fn feedback_synapses_never_propagate() {
        assert!(!synapse(0, SynapseKind::PatternFeedback).can_propagate());
        assert!(!synapse(0, SynapseKind::NegativeFeedback).can_propagate());
        assert!(synapse(0, SynapseKind::InputPattern).can_propagate());
    }

    #[test]
    fn propagate_disabled_blocks_propagation() {
        let mut s = synapse(0, SynapseKind::PrimaryInput);
        s.propagate_disabled = true;
        assert!(!s.can_propagate());
    }

    #[test]
    fn explicit_relation_yields_bi_transition() {
        let mut s = synapse(0, SynapseKind::InputPattern);
        s.relation = Some(Relation::Precedes);
        assert!(matches!(
            s.transitions()[0],
            SynapseTransition::Bi {
                relation: Relation::Precedes,
                ..
            }
        ));
    }

    #[test]
    fn latent_linking_respects_templates() {
        let mut a = synapse(1, SynapseKind::InputPattern);
        let mut b = synapse(2, SynapseKind::InputPattern);
        assert!(!a.latent_compatible(&b));
        b.allow_latent_linking = true;
        assert!(a.latent_compatible(&b));
        a.template = Some(SynapseId(2));
        assert!(!a.latent_compatible(&b));
    }
}
