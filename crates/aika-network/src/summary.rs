//! Post-processing: labels, discovered patterns and the document summary

use crate::document::{Document, Step};
use crate::neuron::NeuronKind;
use crate::relation::Relation;
use aika_core::{
    ActivationId, DocumentId, Error, LabelContext, NeuronId, Phase, Result, SynapseId, TextRange,
};
use aika_search::{Decision, NormWeight, OptionId};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize)]
pub struct ActivationSummary {
    pub id: ActivationId,
    pub neuron: NeuronId,
    pub kind: NeuronKind,
    pub label: String,
    pub range: Option<TextRange>,
    pub value: Option<f64>,
    pub fired: bool,
    pub decision: Decision,
    pub norm_weight: NormWeight,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternInput {
    pub activation: ActivationId,
    pub neuron: NeuronId,
    pub synapse: SynapseId,
    pub latent_relation: Option<Relation>,
}

/// A fired pattern activation together with the inputs that bound it.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredPattern {
    pub activation: ActivationId,
    pub label: String,
    pub inputs: Vec<PatternInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub document: DocumentId,
    pub steps: u64,
    pub interrupted: bool,
    pub activations: Vec<ActivationSummary>,
    pub patterns: Vec<DiscoveredPattern>,
}

impl DocumentSummary {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Internal(e.to_string()))
    }

    pub fn pattern(&self, activation: ActivationId) -> Option<&DiscoveredPattern> {
        self.patterns.iter().find(|p| p.activation == activation)
    }
}

impl Document {
    /// Label every activation and collect the discovered patterns.
    pub fn post_processing(&mut self) -> Result<DocumentSummary> {
        self.ensure_connected()?;
        self.add_step(Step::PostProcessing);
        self.process_until(Phase::PostProcessing)?;
        let summary = self.summary()?;
        info!(
            "{} post-processed: {} activations, {} patterns",
            self.id(),
            summary.activations.len(),
            summary.patterns.len()
        );
        Ok(summary)
    }

    pub(crate) fn finish_post_processing(&mut self) -> Result<()> {
        for i in 0..self.activations.len() {
            let label = {
                let a = &self.activations[i];
                let text = a.range.and_then(|r| self.text().get(r.begin..r.end));
                self.config.label(&LabelContext {
                    neuron_label: &a.neuron_label,
                    range: a.range,
                    text,
                })
            };
            self.activations[i].label = Some(label);
        }

        let mut found: Vec<(ActivationId, OptionId)> = Vec::new();
        let patterns: Vec<ActivationId> = self
            .activations
            .iter()
            .filter(|a| a.kind == NeuronKind::Pattern && a.decision != Decision::Excluded)
            .map(|a| a.id)
            .filter(|id| self.is_fired(*id))
            .collect();
        for p in patterns {
            let mut parts: Vec<OptionId> = self.activations[p.index()]
                .inputs
                .iter()
                .map(|l| &self.links[l.0 as usize])
                .filter(|l| !l.is_recurrent())
                .filter_map(|l| self.activations[l.input.index()].option)
                .collect();
            parts.sort();
            parts.dedup();
            if parts.is_empty() {
                continue;
            }
            match self.options.conjunction(&parts) {
                Ok(option) => found.push((p, option)),
                Err(e) if e.is_recoverable() => debug!("skipping pattern {}: {}", p, e),
                Err(e) => return Err(e),
            }
        }

        // keep only patterns not covered by a larger one
        let mut kept = Vec::new();
        for (p, option) in &found {
            let mut covered = false;
            for (_, other) in &found {
                if other != option
                    && self.options.length(*other)? > self.options.length(*option)?
                    && self.options.contains(*other, *option)?
                {
                    covered = true;
                    break;
                }
            }
            if !covered {
                kept.push(*p);
            }
        }
        self.discovered = kept;
        Ok(())
    }

    /// Snapshot of the current document state.
    pub fn summary(&self) -> Result<DocumentSummary> {
        let label_of = |id: ActivationId| -> String {
            let a = &self.activations[id.index()];
            a.label.clone().unwrap_or_else(|| a.neuron_label.clone())
        };
        let activations = self
            .activations
            .iter()
            .map(|a| ActivationSummary {
                id: a.id,
                neuron: a.neuron,
                kind: a.kind,
                label: label_of(a.id),
                range: a.range,
                value: self.graph.value(a.fields.value).ok(),
                fired: self.is_fired(a.id),
                decision: a.decision,
                norm_weight: a.norm_weight,
            })
            .collect();
        let patterns = self
            .discovered
            .iter()
            .map(|p| DiscoveredPattern {
                activation: *p,
                label: label_of(*p),
                inputs: self.activations[p.index()]
                    .inputs
                    .iter()
                    .map(|l| &self.links[l.0 as usize])
                    .filter(|l| !l.is_recurrent())
                    .map(|l| PatternInput {
                        activation: l.input,
                        neuron: self.activations[l.input.index()].neuron,
                        synapse: l.synapse,
                        latent_relation: l.latent_relation,
                    })
                    .collect(),
            })
            .collect();
        Ok(DocumentSummary {
            document: self.id(),
            steps: self.steps(),
            interrupted: self.interrupted(),
            activations,
            patterns,
        })
    }
}
