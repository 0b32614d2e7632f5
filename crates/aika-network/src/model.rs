//! Model: neuron registry shared by documents
//!
//! Neurons sit in a `DashMap`, each behind its own `RwLock`: documents take
//! read locks while linking and searching, `update_model` takes write locks
//! to commit weights and biases. Id counters are owned by the model.

use crate::neuron::{Neuron, NeuronKind, OutputRef};
use crate::synapse::{Synapse, SynapseKind, SynapseSpec};
use aika_core::{Config, DocumentId, Error, NeuronId, Result, SynapseId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

pub struct Model {
    config: Arc<Config>,
    neurons: DashMap<NeuronId, Arc<RwLock<Neuron>>>,
    /// Synapse id to output neuron, which owns the synapse.
    synapses: DashMap<SynapseId, NeuronId>,
    next_neuron: AtomicU64,
    next_synapse: AtomicU64,
    next_document: AtomicU64,
}

impl Default for Model {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Model {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            neurons: DashMap::new(),
            synapses: DashMap::new(),
            next_neuron: AtomicU64::new(0),
            next_synapse: AtomicU64::new(0),
            next_document: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.clone()
    }

    pub fn next_document_id(&self) -> DocumentId {
        DocumentId(self.next_document.fetch_add(1, Ordering::SeqCst))
    }

    pub fn neuron_count(&self) -> usize {
        self.neurons.len()
    }

    // ========================================================================
    // Neurons
    // ========================================================================

    pub fn create_neuron(&self, kind: NeuronKind, label: impl Into<String>) -> NeuronId {
        let id = NeuronId(self.next_neuron.fetch_add(1, Ordering::SeqCst));
        let label = label.into();
        debug!("created {:?} neuron {} '{}'", kind, id, label);
        self.neurons
            .insert(id, Arc::new(RwLock::new(Neuron::new(id, kind, label))));
        id
    }

    pub fn neuron(&self, id: NeuronId) -> Result<Arc<RwLock<Neuron>>> {
        self.neurons
            .get(&id)
            .map(|n| n.clone())
            .ok_or(Error::NeuronNotFound(id))
    }

    /// Run `f` under the neuron's read lock.
    pub fn read<T>(&self, id: NeuronId, f: impl FnOnce(&Neuron) -> T) -> Result<T> {
        let neuron = self.neuron(id)?;
        let guard = neuron
            .read()
            .map_err(|_| Error::LockPoisoned(id.to_string()))?;
        Ok(f(&guard))
    }

    /// Run `f` under the neuron's write lock.
    pub fn write<T>(&self, id: NeuronId, f: impl FnOnce(&mut Neuron) -> T) -> Result<T> {
        let neuron = self.neuron(id)?;
        let mut guard = neuron
            .write()
            .map_err(|_| Error::LockPoisoned(id.to_string()))?;
        Ok(f(&mut guard))
    }

    pub fn set_bias(&self, id: NeuronId, bias: f64) -> Result<()> {
        self.write(id, |n| n.bias = bias)
    }

    // ========================================================================
    // Synapses
    // ========================================================================

    /// Validate and register a synapse on its output neuron.
    pub fn connect(&self, spec: SynapseSpec) -> Result<SynapseId> {
        let input_kind = self.read(spec.input, |n| n.kind)?;
        let output_kind = self.read(spec.output, |n| n.kind)?;

        let valid = match spec.kind {
            SynapseKind::PrimaryInput => output_kind == NeuronKind::Binding,
            SynapseKind::InputPattern => {
                input_kind == NeuronKind::Binding && output_kind == NeuronKind::Pattern
            }
            SynapseKind::PatternFeedback => {
                input_kind == NeuronKind::Pattern && output_kind == NeuronKind::Binding
            }
            SynapseKind::Inhibitory => {
                input_kind == NeuronKind::Binding && output_kind == NeuronKind::Inhibitory
            }
            SynapseKind::NegativeFeedback => {
                input_kind == NeuronKind::Inhibitory && output_kind == NeuronKind::Binding
            }
        };
        if !valid {
            return Err(Error::InvalidSynapse(format!(
                "{} synapse cannot connect {:?} {} to {:?} {}",
                spec.kind.name(),
                input_kind,
                spec.input,
                output_kind,
                spec.output
            )));
        }
        if spec.relation.is_some() && spec.kind != SynapseKind::InputPattern {
            return Err(Error::InvalidSynapse(format!(
                "relations are only supported on {} synapses",
                SynapseKind::InputPattern.name()
            )));
        }
        if let Some(template) = spec.template {
            let owner = self
                .synapses
                .get(&template)
                .map(|o| *o)
                .ok_or(Error::SynapseNotFound(template))?;
            if owner != spec.output {
                return Err(Error::InvalidSynapse(format!(
                    "template {} belongs to another neuron",
                    template
                )));
            }
        }

        let id = SynapseId(self.next_synapse.fetch_add(1, Ordering::SeqCst));
        let synapse = Synapse {
            id,
            kind: spec.kind,
            input: spec.input,
            output: spec.output,
            weight: spec.weight,
            allow_latent_linking: spec.allow_latent_linking,
            propagate_disabled: spec.propagate_disabled,
            template: spec.template,
            relation: spec.relation,
        };
        self.write(spec.output, |n| {
            n.inputs.insert(id, synapse);
        })?;
        self.write(spec.input, |n| {
            n.outputs.push(OutputRef {
                synapse: id,
                output: spec.output,
            })
        })?;
        self.synapses.insert(id, spec.output);
        info!(
            "connected {} {} -> {} ({}, w={})",
            id,
            spec.input,
            spec.output,
            spec.kind.name(),
            spec.weight
        );
        Ok(id)
    }

    pub fn synapse(&self, id: SynapseId) -> Result<Synapse> {
        let owner = self
            .synapses
            .get(&id)
            .map(|o| *o)
            .ok_or(Error::SynapseNotFound(id))?;
        self.read(owner, |n| n.inputs.get(&id).cloned())?
            .ok_or(Error::SynapseNotFound(id))
    }

    pub fn input_synapses(&self, neuron: NeuronId) -> Result<Vec<Synapse>> {
        self.read(neuron, |n| n.inputs.values().cloned().collect())
    }

    pub fn output_synapses(&self, neuron: NeuronId) -> Result<Vec<Synapse>> {
        let refs = self.read(neuron, |n| n.outputs.clone())?;
        refs.iter().map(|r| self.synapse(r.synapse)).collect()
    }

    /// Update a synapse weight in place.
    pub fn set_weight(&self, id: SynapseId, weight: f64) -> Result<()> {
        self.update_weight(id, |_| weight).map(|_| ())
    }

    /// Read-modify-write of a synapse weight under one write lock on the
    /// owning neuron. Returns the new weight.
    pub fn update_weight(&self, id: SynapseId, f: impl FnOnce(f64) -> f64) -> Result<f64> {
        let owner = self
            .synapses
            .get(&id)
            .map(|o| *o)
            .ok_or(Error::SynapseNotFound(id))?;
        self.write(owner, |n| match n.inputs.get_mut(&id) {
            Some(s) => {
                s.weight = f(s.weight);
                Ok(s.weight)
            }
            None => Err(Error::SynapseNotFound(id)),
        })?
    }
}
