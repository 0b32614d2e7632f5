//! Activations and links

use crate::neuron::NeuronKind;
use crate::relation::{Anchor, Relation};
use crate::signal::{SignalId, SignalKey};
use crate::synapse::SynapseKind;
use aika_core::{ActivationId, NeuronId, SynapseId, TextRange};
use aika_fields::{ActivationFunction, FieldId};
use aika_search::{Decision, NormWeight, OptionId};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct LinkId(pub u32);

/// Field nodes making up an activation's value.
#[derive(Clone, Copy, Debug)]
pub struct ActivationFields {
    pub bias: FieldId,
    /// Queued sum of bias and weighted inputs (max of inputs for inhibitory).
    pub net: FieldId,
    pub value_fn: FieldId,
    /// 1 unless the interpretation search excluded the activation.
    pub gate: FieldId,
    pub value: FieldId,
    /// Latches to 1 once `net` goes above zero.
    pub fired: FieldId,
}

/// Gradient fields, built in the training phase.
#[derive(Clone, Copy, Debug)]
pub struct TrainingFields {
    pub derivative: FieldId,
    pub gradient: FieldId,
}

#[derive(Clone, Debug)]
pub struct Activation {
    pub id: ActivationId,
    pub neuron: NeuronId,
    pub kind: NeuronKind,
    pub function: ActivationFunction,
    pub neuron_label: String,
    /// Set by post-processing.
    pub label: Option<String>,
    pub position: Option<u32>,
    pub range: Option<TextRange>,
    pub is_token: bool,
    pub fields: ActivationFields,
    pub(crate) signals: BTreeMap<SignalKey, SignalId>,
    pub(crate) inputs: Vec<LinkId>,
    pub(crate) outputs: Vec<LinkId>,
    pub option: Option<OptionId>,
    pub decision: Decision,
    pub norm_weight: NormWeight,
    pub training: Option<TrainingFields>,
}

impl Activation {
    pub fn anchor(&self) -> Anchor {
        Anchor {
            position: self.position,
            range: self.range,
        }
    }

    pub fn signals(&self) -> impl Iterator<Item = (&SignalKey, &SignalId)> {
        self.signals.iter()
    }

    pub fn input_links(&self) -> &[LinkId] {
        &self.inputs
    }

    pub fn output_links(&self) -> &[LinkId] {
        &self.outputs
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.neuron_label)?;
        if let Some(range) = self.range {
            write!(f, "{}", range)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Link {
    pub id: LinkId,
    pub synapse: SynapseId,
    pub kind: SynapseKind,
    pub input: ActivationId,
    pub output: ActivationId,
    pub weight: FieldId,
    /// `input.value * weight`, absent for negative feedback links.
    pub weighted: Option<FieldId>,
    /// Relation discovered when the link was created latently.
    pub latent_relation: Option<Relation>,
    /// Built in the training phase.
    pub weight_update: Option<FieldId>,
}

impl Link {
    pub fn is_recurrent(&self) -> bool {
        self.kind.is_recurrent()
    }
}
