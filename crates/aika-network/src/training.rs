//! Gradient fields and model updates

use crate::activation::TrainingFields;
use crate::document::{Document, Step};
use crate::neuron::NeuronKind;
use crate::synapse::SynapseKind;
use aika_core::{ActivationId, NeuronId, Phase, Result, SynapseId};
use aika_fields::{FieldKind, FieldOwner};
use aika_search::Decision;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Values committed to the model by one `update_model` call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelUpdate {
    pub weights: Vec<(SynapseId, f64)>,
    pub biases: Vec<(NeuronId, f64)>,
}

impl ModelUpdate {
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty() && self.biases.is_empty()
    }
}

impl Document {
    /// Build gradients for every fired, non-excluded activation and commit
    /// the resulting weight and bias updates to the model. Does nothing when
    /// training is disabled.
    pub fn update_model(&mut self) -> Result<ModelUpdate> {
        self.ensure_connected()?;
        if !self.config.training_enabled {
            debug!("{} training disabled, model left unchanged", self.id());
            return Ok(ModelUpdate::default());
        }
        let targets: Vec<ActivationId> = self
            .activations
            .iter()
            .filter(|a| {
                !a.is_token
                    && a.kind != NeuronKind::Inhibitory
                    && a.decision != Decision::Excluded
            })
            .map(|a| a.id)
            .filter(|id| self.is_fired(*id))
            .collect();
        for activation in targets {
            self.add_step(Step::Training { activation });
        }
        self.process_until(Phase::Training)?;
        self.commit_updates()
    }

    /// Training step: `gradient = learn_rate * value * f'(net)`, and per
    /// input link `weight_update = input.value * gradient`.
    pub(crate) fn build_gradients(&mut self, act: ActivationId) -> Result<()> {
        let a = self.activation(act)?;
        if a.training.is_some() {
            return Ok(());
        }
        let (fields, function) = (a.fields, a.function);
        let inputs = a.inputs.clone();
        let owner = FieldOwner::Activation(act);
        let g = &mut self.graph;

        let derivative = g.add(FieldKind::Derivative(function), "derivative", owner);
        g.connect(fields.net, 0, derivative)?;
        let product = g.add(FieldKind::Multiplication, "value-derivative", owner);
        g.connect(fields.value, 0, product)?;
        g.connect(derivative, 1, product)?;
        let gradient = g.add(FieldKind::Scale(self.config.learn_rate), "gradient", owner);
        g.connect(product, 0, gradient)?;
        self.activations[act.index()].training = Some(TrainingFields {
            derivative,
            gradient,
        });

        for l in inputs {
            let link = &self.links[l.0 as usize];
            if link.kind == SynapseKind::NegativeFeedback {
                continue;
            }
            let (input, output) = (link.input, link.output);
            let input_value = self.activations[input.index()].fields.value;
            let update = self.graph.add(
                FieldKind::Multiplication,
                "weight-update",
                FieldOwner::Link { input, output },
            );
            self.graph.connect(input_value, 0, update)?;
            self.graph.connect(gradient, 1, update)?;
            self.links[l.0 as usize].weight_update = Some(update);
        }
        debug!("gradients built for {}", act);
        Ok(())
    }

    /// `w' = w * (1 - alpha) + delta` under the neuron's write lock. Deltas
    /// are summed per synapse and per neuron; decay applies once to each.
    fn commit_updates(&mut self) -> Result<ModelUpdate> {
        let decay = 1.0 - self.config.alpha.unwrap_or(0.0);

        let mut weight_deltas: BTreeMap<SynapseId, f64> = BTreeMap::new();
        for link in &self.links {
            if let Some(field) = link.weight_update {
                *weight_deltas.entry(link.synapse).or_default() += self.graph.value_or(field, 0.0);
            }
        }
        let mut bias_deltas: BTreeMap<NeuronId, f64> = BTreeMap::new();
        for act in &self.activations {
            if let Some(t) = act.training {
                *bias_deltas.entry(act.neuron).or_default() += self.graph.value_or(t.gradient, 0.0);
            }
        }

        let mut update = ModelUpdate::default();
        for (synapse, delta) in weight_deltas {
            let weight = self.model.update_weight(synapse, |w| w * decay + delta)?;
            update.weights.push((synapse, weight));
        }
        for (neuron, delta) in bias_deltas {
            let bias = self.model.write(neuron, |n| {
                n.bias = n.bias * decay + delta;
                n.bias
            })?;
            update.biases.push((neuron, bias));
        }
        info!(
            "{} committed {} weight and {} bias updates",
            self.id(),
            update.weights.len(),
            update.biases.len()
        );
        Ok(update)
    }
}
