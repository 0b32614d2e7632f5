//! Linking
//!
//! Activations are created with their field sub-graph and an origin
//! signal. Signals arriving at an activation are matched against partners
//! on both sides of every synapse of its neuron, then carried over the
//! activation's existing output links. Fired activations propagate into new
//! output activations unless a latent relation lets them join an existing
//! one.

use crate::activation::{Activation, ActivationFields, Link, LinkId};
use crate::document::{BiKey, BiListener, Document, Step};
use crate::neuron::NeuronKind;
use crate::relation::Relation;
use crate::signal::{Scope, SignalId, SignalKey, SignalState};
use crate::synapse::{Synapse, SynapseKind};
use crate::transition::SynapseTransition;
use aika_core::{ActivationId, Error, NeuronId, Phase, Result, SynapseId, TextRange};
use aika_fields::{FieldKind, FieldOwner, MinMaxMode, ThresholdKind};
use aika_search::{Decision, NormWeight};
use std::collections::BTreeMap;
use tracing::debug;

const RELATED: SignalState = SignalState::Pattern(Scope::Related);

impl Document {
    // ========================================================================
    // Activations
    // ========================================================================

    pub(crate) fn create_activation(
        &mut self,
        neuron: NeuronId,
        position: Option<u32>,
        range: Option<TextRange>,
        is_token: bool,
    ) -> Result<ActivationId> {
        let (kind, bias, function, neuron_label) =
            self.model
                .read(neuron, |n| (n.kind, n.bias, n.function, n.label.clone()))?;
        let id = ActivationId(self.activations.len() as u32);
        let owner = FieldOwner::Activation(id);
        let g = &mut self.graph;

        let bias_field = g.constant("bias", owner, bias);
        let net = match kind {
            NeuronKind::Inhibitory => g.add(
                FieldKind::MinMax {
                    mode: MinMaxMode::Max,
                    selected: None,
                },
                "net",
                owner,
            ),
            _ => g.add(FieldKind::Addition, "net", owner),
        };
        g.make_queued(net, Phase::Inference, 0)?;
        if kind != NeuronKind::Inhibitory {
            g.connect(bias_field, 0, net)?;
        }
        let value_fn = g.add(FieldKind::Function(function), "value-fn", owner);
        g.connect(net, 0, value_fn)?;
        let gate = g.constant("gate", owner, 1.0);
        let value = g.add(FieldKind::Multiplication, "value", owner);
        g.connect(value_fn, 0, value)?;
        g.connect(gate, 1, value)?;
        let fired = g.add(
            FieldKind::Threshold {
                threshold: 0.0,
                kind: ThresholdKind::Above,
                is_final: true,
            },
            "fired",
            owner,
        );
        g.set_notify(fired)?;
        g.connect(net, 0, fired)?;

        let option = if kind == NeuronKind::Binding {
            let option = self.options.primitive(position.unwrap_or(0) as i64);
            self.option_owner.insert(option, id);
            Some(option)
        } else {
            None
        };

        self.activations.push(Activation {
            id,
            neuron,
            kind,
            function,
            neuron_label,
            label: None,
            position,
            range,
            is_token,
            fields: ActivationFields {
                bias: bias_field,
                net,
                value_fn,
                gate,
                value,
                fired,
            },
            signals: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            option,
            decision: Decision::Unknown,
            norm_weight: NormWeight::ZERO,
            training: None,
        });
        self.by_neuron.entry(neuron).or_default().push(id);

        match kind {
            NeuronKind::Binding => {
                self.add_signal(id, SignalState::Branch, None)?;
            }
            NeuronKind::Pattern => {
                self.add_signal(id, SignalState::Pattern(Scope::Same), None)?;
            }
            NeuronKind::Inhibitory => {}
        }
        debug!("created activation {}", self.activations[id.index()]);
        Ok(id)
    }

    // ========================================================================
    // Signals
    // ========================================================================

    /// Attach a signal to `act`: a root signal when `parent` is `None`,
    /// otherwise one derived from `parent`. Returns `None` when the
    /// activation is already bound to that origin.
    pub(crate) fn add_signal(
        &mut self,
        act: ActivationId,
        state: SignalState,
        parent: Option<SignalId>,
    ) -> Result<Option<SignalId>> {
        let (origin_activation, origin_neuron) = match parent {
            Some(p) => {
                let s = self
                    .signals
                    .get(p)
                    .ok_or_else(|| Error::Internal(format!("unknown signal {}", p.0)))?;
                (s.origin_activation, s.origin_neuron)
            }
            None => (act, self.activation(act)?.neuron),
        };
        if self.holds_signal(act, origin_activation, state) {
            return Ok(None);
        }
        let id = match parent {
            Some(p) => self
                .signals
                .derive(p, act, state)
                .ok_or_else(|| Error::Internal(format!("unknown signal {}", p.0)))?,
            None => self.signals.origin(act, origin_neuron, state),
        };
        let holder = &mut self.activations[act.index()];
        holder.signals.insert(
            SignalKey {
                origin_neuron,
                state,
                origin_activation,
            },
            id,
        );
        let latent = state == RELATED && holder.kind == NeuronKind::Pattern;

        self.add_step(Step::Linking {
            activation: act,
            signal: id,
        });
        if latent {
            self.add_step(Step::LatentLinking { activation: act });
        }
        Ok(Some(id))
    }

    /// Bound to `origin` with the same or a narrower pattern scope.
    fn holds_signal(&self, act: ActivationId, origin: ActivationId, state: SignalState) -> bool {
        self.activations[act.index()]
            .signals
            .keys()
            .any(|k| {
                k.origin_activation == origin
                    && match (k.state, state) {
                        (SignalState::Pattern(held), SignalState::Pattern(new)) => held <= new,
                        (SignalState::Branch, SignalState::Branch) => true,
                        _ => false,
                    }
            })
    }

    fn holds_exact(&self, act: ActivationId, origin: ActivationId, state: SignalState) -> bool {
        self.activations[act.index()]
            .signals
            .keys()
            .any(|k| k.origin_activation == origin && k.state == state)
    }

    /// Carry a signal across a link using the synapse's propagating
    /// transitions.
    fn transfer(&mut self, signal: SignalId, link: LinkId) -> Result<()> {
        let (synapse, output) = {
            let l = &self.links[link.0 as usize];
            (l.synapse, l.output)
        };
        let (state, origin) = match self.signals.get(signal) {
            Some(s) => (s.state, s.origin_activation),
            None => return Ok(()),
        };
        if origin == output {
            return Ok(());
        }
        let synapse = self.model.synapse(synapse)?;
        for transition in synapse.transitions() {
            if !transition.propagates() {
                continue;
            }
            if let Some(next) = transition.carrier().next(state) {
                self.add_signal(output, next, Some(signal))?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Links
    // ========================================================================

    pub(crate) fn create_link(
        &mut self,
        synapse: &Synapse,
        input: ActivationId,
        output: ActivationId,
        latent_relation: Option<Relation>,
    ) -> Result<LinkId> {
        if let Some(existing) = self.link_index.get(&(input, output, synapse.id)) {
            return Ok(*existing);
        }
        let id = LinkId(self.links.len() as u32);
        let owner = FieldOwner::Link { input, output };
        let input_value = self.activation(input)?.fields.value;
        let output_net = self.activation(output)?.fields.net;

        let weight = self.graph.constant("weight", owner, synapse.weight);
        let weighted = if synapse.kind == SynapseKind::NegativeFeedback {
            None
        } else {
            let w = self.graph.add(FieldKind::Multiplication, "weighted", owner);
            self.graph.connect(input_value, 0, w)?;
            self.graph.connect(weight, 1, w)?;
            self.graph.connect(w, 0, output_net)?;
            Some(w)
        };

        self.links.push(Link {
            id,
            synapse: synapse.id,
            kind: synapse.kind,
            input,
            output,
            weight,
            weighted,
            latent_relation,
            weight_update: None,
        });
        self.link_index.insert((input, output, synapse.id), id);
        self.activations[input.index()].outputs.push(id);

        let anchor = self.activations[input.index()].anchor();
        let out = &mut self.activations[output.index()];
        out.inputs.push(id);
        if !synapse.is_recurrent() {
            if out.position.is_none() {
                out.position = anchor.position;
            }
            if let Some(r) = anchor.range {
                out.range = Some(out.range.map_or(r, |o| o.union(&r)));
            }
        }
        debug!(
            "linked {} -> {} over {} ({})",
            input,
            output,
            synapse.id,
            synapse.kind.name()
        );

        let carried: Vec<SignalId> = self.activations[input.index()]
            .signals
            .values()
            .copied()
            .collect();
        for signal in carried {
            self.transfer(signal, id)?;
        }

        if synapse.kind == SynapseKind::NegativeFeedback {
            let branches: Vec<ActivationId> = self.activations[input.index()]
                .signals
                .keys()
                .filter(|k| k.state == SignalState::Branch && k.origin_activation != output)
                .map(|k| k.origin_activation)
                .collect();
            for branch in branches {
                self.register_conflict(branch, output)?;
            }
        }
        Ok(id)
    }

    pub(crate) fn register_conflict(&mut self, a: ActivationId, b: ActivationId) -> Result<()> {
        if a == b {
            return Ok(());
        }
        let (oa, ob) = match (self.activation(a)?.option, self.activation(b)?.option) {
            (Some(x), Some(y)) => (x, y),
            _ => return Ok(()),
        };
        if self.options.conflicts(oa)?.contains(&ob) {
            return Ok(());
        }
        self.options.add_conflict(oa, ob)?;
        debug!("conflict {} <-> {}", a, b);
        Ok(())
    }

    // ========================================================================
    // Linking step
    // ========================================================================

    pub(crate) fn link_signal(&mut self, act: ActivationId, signal: SignalId) -> Result<()> {
        let sig = match self.signals.get(signal) {
            Some(s) => s.clone(),
            None => return Ok(()),
        };
        let neuron = self.activation(act)?.neuron;

        // act as input side
        for synapse in self.model.output_synapses(neuron)? {
            for transition in synapse.transitions() {
                match transition {
                    SynapseTransition::Single(t) if t.mode.matches() => {
                        let expected = match t.expected(sig.state) {
                            Some(s) => s,
                            None => continue,
                        };
                        for target in self.activations_of(synapse.output) {
                            if target == act
                                || target == sig.origin_activation
                                || self.has_link(act, target, synapse.id)
                            {
                                continue;
                            }
                            if self.holds_exact(target, sig.origin_activation, expected) {
                                self.create_link(&synapse, act, target, None)?;
                            }
                        }
                    }
                    SynapseTransition::Bi {
                        first,
                        second,
                        relation,
                    } => {
                        if !first.from.accepts(sig.state) {
                            continue;
                        }
                        let incoming = self.activation(sig.origin_activation)?.anchor();
                        for target in self.activations_of(synapse.output) {
                            if target == act || self.has_link(act, target, synapse.id) {
                                continue;
                            }
                            let existing: Vec<ActivationId> = self.activations[target.index()]
                                .signals
                                .keys()
                                .filter(|k| {
                                    second.from.accepts(k.state)
                                        && k.origin_activation != sig.origin_activation
                                })
                                .map(|k| k.origin_activation)
                                .collect();
                            let mut holds = false;
                            for e in existing {
                                if relation.evaluate(self.activation(e)?.anchor(), incoming)? {
                                    holds = true;
                                    break;
                                }
                            }
                            self.feed_bi(synapse.id, act, target, true, holds)?;
                        }
                    }
                    _ => {}
                }
            }
        }

        // act as output side
        if act != sig.origin_activation {
            for synapse in self.model.input_synapses(neuron)? {
                for transition in synapse.transitions() {
                    match transition {
                        SynapseTransition::Single(t) if t.mode.matches() => {
                            for source in self.activations_of(synapse.input) {
                                if source == act || self.has_link(source, act, synapse.id) {
                                    continue;
                                }
                                let bound = self.activations[source.index()].signals.keys().any(|k| {
                                    k.origin_activation == sig.origin_activation
                                        && t.connects(k.state, sig.state)
                                });
                                if bound {
                                    self.create_link(&synapse, source, act, None)?;
                                }
                            }
                        }
                        SynapseTransition::Bi {
                            first,
                            second,
                            relation,
                        } => {
                            if !second.from.accepts(sig.state) {
                                continue;
                            }
                            let existing = self.activation(sig.origin_activation)?.anchor();
                            for source in self.activations_of(synapse.input) {
                                if source == act || self.has_link(source, act, synapse.id) {
                                    continue;
                                }
                                let origins: Vec<ActivationId> = self.activations[source.index()]
                                    .signals
                                    .keys()
                                    .filter(|k| {
                                        first.from.accepts(k.state)
                                            && k.origin_activation != sig.origin_activation
                                    })
                                    .map(|k| k.origin_activation)
                                    .collect();
                                if origins.is_empty() {
                                    continue;
                                }
                                let mut holds = false;
                                for o in origins {
                                    if relation.evaluate(existing, self.activation(o)?.anchor())? {
                                        holds = true;
                                        break;
                                    }
                                }
                                self.feed_bi(synapse.id, source, act, true, holds)?;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        let outputs = self.activations[act.index()].outputs.clone();
        for link in outputs {
            self.transfer(signal, link)?;
        }

        if sig.state == SignalState::Branch
            && self.activations[act.index()].kind == NeuronKind::Inhibitory
        {
            let rivals: Vec<ActivationId> = self.activations[act.index()]
                .outputs
                .iter()
                .map(|l| &self.links[l.0 as usize])
                .filter(|l| {
                    l.kind == SynapseKind::NegativeFeedback && l.output != sig.origin_activation
                })
                .map(|l| l.output)
                .collect();
            for rival in rivals {
                self.register_conflict(sig.origin_activation, rival)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Bi-transitions
    // ========================================================================

    fn feed_bi(
        &mut self,
        synapse: SynapseId,
        input: ActivationId,
        output: ActivationId,
        first: bool,
        second: bool,
    ) -> Result<()> {
        let key = (synapse, input, output);
        let listener = match self.bi_listeners.get(&key) {
            Some(l) => *l,
            None => {
                let owner = FieldOwner::Link { input, output };
                let f = self.graph.constant("bi-first", owner, 0.0);
                let s = self.graph.constant("bi-second", owner, 0.0);
                let product = self.graph.add(FieldKind::Multiplication, "bi-linked", owner);
                self.graph.set_notify(product)?;
                self.graph.connect(f, 0, product)?;
                self.graph.connect(s, 1, product)?;
                self.bi_index.insert(product, key);
                let l = BiListener {
                    first: f,
                    second: s,
                };
                self.bi_listeners.insert(key, l);
                l
            }
        };
        if first && self.graph.value_or(listener.first, 0.0) < 0.5 {
            self.graph.set_value(listener.first, 1.0)?;
        }
        if second && self.graph.value_or(listener.second, 0.0) < 0.5 {
            self.graph.set_value(listener.second, 1.0)?;
        }
        Ok(())
    }

    pub(crate) fn link_bi(&mut self, (synapse, input, output): BiKey) -> Result<()> {
        if self.has_link(input, output, synapse) {
            return Ok(());
        }
        let synapse = self.model.synapse(synapse)?;
        self.create_link(&synapse, input, output, None)?;
        Ok(())
    }

    // ========================================================================
    // Propagation
    // ========================================================================

    pub(crate) fn on_fired(&mut self, act: ActivationId) -> Result<()> {
        let neuron = self.activation(act)?.neuron;
        debug!("{} fired", act);
        for synapse in self.model.output_synapses(neuron)? {
            if synapse.can_propagate() && self.propagated.insert((act, synapse.id)) {
                self.add_step(Step::Propagate {
                    activation: act,
                    synapse: synapse.id,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn propagate(&mut self, act: ActivationId, synapse: SynapseId) -> Result<()> {
        let already = self
            .activation(act)?
            .outputs
            .iter()
            .any(|l| self.links[l.0 as usize].synapse == synapse);
        if already {
            return Ok(());
        }
        let synapse = self.model.synapse(synapse)?;
        if self.latent_link_from(&synapse, act)? {
            return Ok(());
        }
        let anchor = self.activation(act)?.anchor();
        let target = self.create_activation(synapse.output, anchor.position, anchor.range, false)?;
        self.create_link(&synapse, act, target, None)?;
        debug!("propagated {} -> {} over {}", act, target, synapse.id);
        Ok(())
    }

    // ========================================================================
    // Latent linking
    // ========================================================================

    /// Join existing output activations instead of creating a new one.
    fn latent_link_from(&mut self, synapse: &Synapse, input: ActivationId) -> Result<bool> {
        let siblings = self.latent_siblings(synapse)?;
        if siblings.is_empty() {
            return Ok(false);
        }
        let mut linked = false;
        for target in self.activations_of(synapse.output) {
            if self.has_link(input, target, synapse.id) {
                continue;
            }
            if let Some(relation) = self.latent_relation(synapse, &siblings, input, target)? {
                self.create_link(synapse, input, target, Some(relation))?;
                debug!("latent link {} -> {} ({})", input, target, relation);
                linked = true;
            }
        }
        Ok(linked)
    }

    /// LatentLinking step, run when a pattern activation gains a related
    /// origin.
    pub(crate) fn latent_linking(&mut self, target: ActivationId) -> Result<()> {
        let neuron = self.activation(target)?.neuron;
        for synapse in self.model.input_synapses(neuron)? {
            let siblings = self.latent_siblings(&synapse)?;
            if siblings.is_empty() {
                continue;
            }
            for input in self.activations_of(synapse.input) {
                if input == target || self.has_link(input, target, synapse.id) {
                    continue;
                }
                if let Some(relation) = self.latent_relation(&synapse, &siblings, input, target)? {
                    self.create_link(&synapse, input, target, Some(relation))?;
                    debug!("latent link {} -> {} ({})", input, target, relation);
                }
            }
        }
        Ok(())
    }

    fn latent_siblings(&self, synapse: &Synapse) -> Result<Vec<SynapseId>> {
        Ok(self
            .model
            .input_synapses(synapse.output)?
            .into_iter()
            .filter(|s| synapse.latent_compatible(s))
            .map(|s| s.id)
            .collect())
    }

    /// First latent relation between an origin already bound to `target`
    /// through a sibling synapse and an origin `input` would carry in.
    fn latent_relation(
        &self,
        synapse: &Synapse,
        siblings: &[SynapseId],
        input: ActivationId,
        target: ActivationId,
    ) -> Result<Option<Relation>> {
        let target_act = self.activation(target)?;
        let bound = target_act
            .inputs
            .iter()
            .any(|l| siblings.contains(&self.links[l.0 as usize].synapse));
        if !bound {
            return Ok(None);
        }
        let transitions = synapse.transitions();
        let incoming: Vec<ActivationId> = self
            .activation(input)?
            .signals
            .keys()
            .filter(|k| {
                transitions
                    .iter()
                    .any(|t| t.propagates() && t.carrier().next(k.state) == Some(RELATED))
            })
            .map(|k| k.origin_activation)
            .collect();
        let existing: Vec<ActivationId> = target_act
            .signals
            .keys()
            .filter(|k| k.state == RELATED)
            .map(|k| k.origin_activation)
            .collect();

        for e in &existing {
            let e_anchor = self.activation(*e)?.anchor();
            for i in incoming.iter().filter(|i| *i != e) {
                let i_anchor = self.activation(*i)?.anchor();
                for relation in Relation::LATENT {
                    if matches!(relation.evaluate(e_anchor, i_anchor), Ok(true)) {
                        return Ok(Some(relation));
                    }
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use aika_core::Config;
    use std::sync::Arc;

    fn two_tokens() -> (Document, ActivationId, ActivationId) {
        let model = Arc::new(Model::new(Config::default()));
        let a = model.create_neuron(NeuronKind::Pattern, "a");
        let mut doc = Document::new(model, "a a");
        let t1 = doc.add_token(a, 0, TextRange::new(0, 1), 1.0).unwrap();
        let t2 = doc.add_token(a, 1, TextRange::new(2, 3), 1.0).unwrap();
        doc.process().unwrap();
        (doc, t1, t2)
    }

    fn origin_signal(doc: &Document, act: ActivationId) -> SignalId {
        doc.activation(act)
            .unwrap()
            .signals()
            .find(|(k, _)| k.origin_activation == act)
            .map(|(_, id)| *id)
            .unwrap()
    }

    #[test]
    fn wider_scope_from_held_origin_is_ignored() {
        let (mut doc, t1, _) = two_tokens();
        let queued = doc.queue.len();

        // t1 holds its own origin at SAME
        let input = doc.add_signal(t1, SignalState::Pattern(Scope::Input), None).unwrap();
        assert!(input.is_none());
        assert_eq!(doc.queue.len(), queued);
    }

    #[test]
    fn scope_only_widens_per_origin() {
        let (mut doc, t1, t2) = two_tokens();
        let s1 = origin_signal(&doc, t1);
        let queued = doc.queue.len();

        let input = doc
            .add_signal(t2, SignalState::Pattern(Scope::Input), Some(s1))
            .unwrap();
        assert!(input.is_some());
        assert_eq!(doc.queue.len(), queued + 1);

        let related = doc.add_signal(t2, RELATED, Some(s1)).unwrap();
        assert!(related.is_none());
        let again = doc
            .add_signal(t2, SignalState::Pattern(Scope::Input), Some(s1))
            .unwrap();
        assert!(again.is_none());
        assert_eq!(doc.queue.len(), queued + 1);
    }
}
