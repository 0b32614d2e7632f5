//! Neurons

use crate::synapse::Synapse;
use aika_core::{NeuronId, SynapseId};
use aika_fields::ActivationFunction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeuronKind {
    Binding,
    Pattern,
    Inhibitory,
}

impl NeuronKind {
    pub fn default_function(self) -> ActivationFunction {
        match self {
            NeuronKind::Binding | NeuronKind::Pattern => ActivationFunction::RectifiedHyperbolicTangent,
            NeuronKind::Inhibitory => ActivationFunction::Linear,
        }
    }
}

/// Outgoing synapse reference. The synapse itself lives with its output neuron.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    pub synapse: SynapseId,
    pub output: NeuronId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Neuron {
    pub id: NeuronId,
    pub kind: NeuronKind,
    pub label: String,
    pub bias: f64,
    pub function: ActivationFunction,
    pub(crate) inputs: BTreeMap<SynapseId, Synapse>,
    pub(crate) outputs: Vec<OutputRef>,
}

impl Neuron {
    pub(crate) fn new(id: NeuronId, kind: NeuronKind, label: String) -> Self {
        Self {
            id,
            kind,
            label,
            bias: 0.0,
            function: kind.default_function(),
            inputs: BTreeMap::new(),
            outputs: Vec::new(),
        }
    }

    pub fn input_synapses(&self) -> impl Iterator<Item = &Synapse> {
        self.inputs.values()
    }

    pub fn input_synapse(&self, id: SynapseId) -> Option<&Synapse> {
        self.inputs.get(&id)
    }

    pub fn outputs(&self) -> &[OutputRef] {
        &self.outputs
    }
}
