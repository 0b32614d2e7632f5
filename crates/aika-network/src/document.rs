//! Per-text activation registry and step loop
//!
//! A document owns everything created while processing one text: the field
//! graph, activations, links, binding signals, the step queue and the
//! conflict registry. It only reads the shared [`Model`], except in
//! `update_model`. Processing is single-threaded; documents themselves are
//! `Send` and may be processed in parallel against the same model.

use crate::activation::{Activation, Link, LinkId};
use crate::model::Model;
use crate::signal::{BindingSignal, SignalArena, SignalId};
use aika_core::{
    ActivationId, Config, DocumentId, Error, NeuronId, Phase, Result, SynapseId, TextRange,
};
use aika_fields::{FieldEvent, FieldGraph, FieldId, FieldOwner, Queue};
use aika_search::{OptionDag, OptionId, SearchOutcome};
use bytes::BufMut;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Deferred unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Match and carry a newly arrived binding signal.
    Linking {
        activation: ActivationId,
        signal: SignalId,
    },
    /// Create or find the output activation of a fired activation.
    Propagate {
        activation: ActivationId,
        synapse: SynapseId,
    },
    /// Commit a queued field.
    FieldUpdate(FieldId),
    /// Look for latent relations into a pattern activation.
    LatentLinking { activation: ActivationId },
    /// Build gradient fields.
    Training { activation: ActivationId },
    PostProcessing,
}

impl Step {
    pub fn phase(&self) -> Phase {
        match self {
            Step::Linking { .. } | Step::LatentLinking { .. } => Phase::Linking,
            Step::Propagate { .. } => Phase::Propagate,
            Step::FieldUpdate(_) => Phase::Inference,
            Step::Training { .. } => Phase::Training,
            Step::PostProcessing => Phase::PostProcessing,
        }
    }
}

/// Coincidence detector for a bi-transition: `first * second` crosses 0.5
/// once both events have been seen.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BiListener {
    pub first: FieldId,
    pub second: FieldId,
}

pub type BiKey = (SynapseId, ActivationId, ActivationId);

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

pub struct Document {
    id: DocumentId,
    pub(crate) model: Arc<Model>,
    pub(crate) config: Arc<Config>,
    text: String,
    pub(crate) graph: FieldGraph,
    pub(crate) queue: Queue<Step>,
    pub(crate) activations: Vec<Activation>,
    pub(crate) links: Vec<Link>,
    pub(crate) link_index: HashMap<(ActivationId, ActivationId, SynapseId), LinkId>,
    pub(crate) signals: SignalArena,
    pub(crate) by_neuron: HashMap<NeuronId, Vec<ActivationId>>,
    pub(crate) propagated: HashSet<(ActivationId, SynapseId)>,
    pub(crate) bi_listeners: HashMap<BiKey, BiListener>,
    pub(crate) bi_index: HashMap<FieldId, BiKey>,
    pub(crate) options: OptionDag,
    pub(crate) option_owner: HashMap<OptionId, ActivationId>,
    pub(crate) search: Option<SearchOutcome>,
    /// Pattern activations kept by post-processing.
    pub(crate) discovered: Vec<ActivationId>,
    disconnected: bool,
    steps: u64,
}

impl Document {
    pub fn new(model: Arc<Model>, text: impl Into<String>) -> Self {
        let config = model.config();
        let id = model.next_document_id();
        debug!("created document {}", id);
        Self {
            id,
            graph: FieldGraph::new(config.tolerance),
            options: OptionDag::new(config.max_rid),
            model,
            config,
            text: text.into(),
            queue: Queue::new(),
            activations: Vec::new(),
            links: Vec::new(),
            link_index: HashMap::new(),
            signals: SignalArena::default(),
            by_neuron: HashMap::new(),
            propagated: HashSet::new(),
            bi_listeners: HashMap::new(),
            bi_index: HashMap::new(),
            option_owner: HashMap::new(),
            search: None,
            discovered: Vec::new(),
            disconnected: false,
            steps: 0,
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Steps executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub(crate) fn ensure_connected(&self) -> Result<()> {
        if self.disconnected {
            return Err(Error::DocumentDisconnected);
        }
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create an input activation for a token and prime its net value.
    pub fn add_token(
        &mut self,
        neuron: NeuronId,
        position: u32,
        range: TextRange,
        net: f64,
    ) -> Result<ActivationId> {
        self.ensure_connected()?;
        let id = self.create_activation(neuron, Some(position), Some(range), true)?;
        let field = self.activations[id.index()].fields.net;
        self.graph.add_and_trigger_update(field, net)?;
        self.sync()?;
        debug!("token {} at {} {}", id, position, range);
        Ok(id)
    }

    /// Drain linking, propagation and inference steps.
    pub fn process(&mut self) -> Result<usize> {
        let count = self.process_until(Phase::Inference)?;
        info!(
            "{} processed {} steps, {} activations",
            self.id,
            count,
            self.activations.len()
        );
        Ok(count)
    }

    /// Drain every step whose phase is at most `max_phase`, including steps
    /// added while draining.
    pub fn process_until(&mut self, max_phase: Phase) -> Result<usize> {
        self.ensure_connected()?;
        self.sync()?;
        let mut count = 0;
        while let Some((_, step)) = self.queue.pop_until(max_phase) {
            self.run(step)?;
            self.sync()?;
            count += 1;
        }
        self.steps += count as u64;
        Ok(count)
    }

    fn run(&mut self, step: Step) -> Result<()> {
        match step {
            Step::Linking { activation, signal } => self.link_signal(activation, signal),
            Step::Propagate {
                activation,
                synapse,
            } => self.propagate(activation, synapse),
            Step::FieldUpdate(field) => self.graph.trigger_update(field),
            Step::LatentLinking { activation } => self.latent_linking(activation),
            Step::Training { activation } => self.build_gradients(activation),
            Step::PostProcessing => self.finish_post_processing(),
        }
    }

    pub(crate) fn add_step(&mut self, step: Step) {
        self.queue.add(step.phase(), 0, step);
    }

    /// Move scheduled field commits into the queue and react to field events
    /// until neither produces anything new.
    pub(crate) fn sync(&mut self) -> Result<()> {
        loop {
            let scheduled = self.graph.take_scheduled();
            let events = self.graph.take_events();
            if scheduled.is_empty() && events.is_empty() {
                return Ok(());
            }
            for s in scheduled {
                self.queue.add(s.phase, s.round, Step::FieldUpdate(s.field));
            }
            for event in events {
                self.handle_event(event)?;
            }
        }
    }

    fn handle_event(&mut self, event: FieldEvent) -> Result<()> {
        if event.new <= 0.5 {
            return Ok(());
        }
        if let Some(key) = self.bi_index.get(&event.field).copied() {
            return self.link_bi(key);
        }
        if let FieldOwner::Activation(act) = event.owner {
            let fired = self
                .activations
                .get(act.index())
                .map(|a| a.fields.fired == event.field)
                .unwrap_or(false);
            if fired {
                self.on_fired(act)?;
            }
        }
        Ok(())
    }

    /// Tear down every field link of this document. Safe to call twice.
    pub fn disconnect(&mut self) -> Result<usize> {
        if self.disconnected {
            return Ok(0);
        }
        let count = self.graph.disconnect_all()?;
        self.graph.take_events();
        self.graph.take_scheduled();
        self.queue.clear();
        self.disconnected = true;
        info!("{} disconnected {} field links", self.id, count);
        Ok(count)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn activation(&self, id: ActivationId) -> Result<&Activation> {
        self.activations
            .get(id.index())
            .ok_or(Error::ActivationNotFound(id))
    }

    pub fn activations(&self) -> &[Activation] {
        &self.activations
    }

    pub fn activations_of(&self, neuron: NeuronId) -> Vec<ActivationId> {
        self.by_neuron.get(&neuron).cloned().unwrap_or_default()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.0 as usize)
    }

    /// First link from `input` to `output`, over any synapse.
    pub fn link_between(&self, input: ActivationId, output: ActivationId) -> Option<&Link> {
        self.activations
            .get(output.index())?
            .inputs
            .iter()
            .map(|l| &self.links[l.0 as usize])
            .find(|l| l.input == input)
    }

    pub(crate) fn has_link(&self, input: ActivationId, output: ActivationId, synapse: SynapseId) -> bool {
        self.link_index.contains_key(&(input, output, synapse))
    }

    pub fn signal(&self, id: SignalId) -> Option<&BindingSignal> {
        self.signals.get(id)
    }

    pub fn signals_of(&self, act: ActivationId) -> Result<Vec<&BindingSignal>> {
        Ok(self
            .activation(act)?
            .signals
            .values()
            .filter_map(|s| self.signals.get(*s))
            .collect())
    }

    pub fn value(&self, act: ActivationId) -> Result<f64> {
        self.graph.value(self.activation(act)?.fields.value)
    }

    pub fn net(&self, act: ActivationId) -> Result<f64> {
        self.graph.value(self.activation(act)?.fields.net)
    }

    pub fn is_fired(&self, act: ActivationId) -> bool {
        self.activation(act)
            .map(|a| self.graph.value_or(a.fields.fired, 0.0) > 0.5)
            .unwrap_or(false)
    }

    pub fn field_graph(&self) -> &FieldGraph {
        &self.graph
    }

    pub fn search_outcome(&self) -> Option<&SearchOutcome> {
        self.search.as_ref()
    }

    pub fn interrupted(&self) -> bool {
        self.search.as_ref().map(|s| s.interrupted).unwrap_or(false)
    }

    /// Activations registered as conflicting with `act`.
    pub fn conflicts_of(&self, act: ActivationId) -> Result<Vec<ActivationId>> {
        let option = match self.activation(act)?.option {
            Some(o) => o,
            None => return Ok(Vec::new()),
        };
        Ok(self
            .options
            .conflicts(option)?
            .iter()
            .filter_map(|o| self.option_owner.get(o).copied())
            .collect())
    }

    /// Write net and value of an activation in the field binary contract.
    pub fn write_activation(&self, act: ActivationId, buf: &mut impl BufMut) -> Result<()> {
        let fields = self.activation(act)?.fields;
        self.graph.write_value(fields.net, buf)?;
        self.graph.write_value(fields.value, buf)
    }
}
