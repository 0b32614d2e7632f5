//! Interpretation search over a document
//!
//! The document is snapshotted into an [`AnnealSpace`], a plain evaluation
//! network that can be re-run under any set of decisions. Each evaluation
//! relaxes the network for up to `max_rounds` rounds: forward links read
//! the current round, recurrent links the previous one. Negative feedback
//! only carries inhibition from rivals that are currently selected.

use crate::document::Document;
use crate::neuron::NeuronKind;
use crate::synapse::SynapseKind;
use aika_core::{ActivationId, Result};
use aika_fields::ActivationFunction;
use aika_search::{
    search, Change, Decision, NormWeight, RoundState, Rounds, SearchOutcome, SearchSpace,
    StateChange,
};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

#[derive(Clone, Copy, Debug)]
enum EvalKind {
    Token { net: f64 },
    Binding,
    Pattern,
    Inhibitory,
}

#[derive(Clone, Copy, Debug)]
struct EvalInput {
    from: usize,
    weight: f64,
    recurrent: bool,
    negative: bool,
}

#[derive(Clone, Debug)]
struct EvalNode {
    id: ActivationId,
    kind: EvalKind,
    bias: f64,
    function: ActivationFunction,
    inputs: Vec<EvalInput>,
}

pub struct AnnealSpace {
    nodes: Vec<EvalNode>,
    /// Evaluation order of forward links.
    order: Vec<usize>,
    decisions: Vec<Decision>,
    rounds: Vec<Rounds>,
    candidates: Vec<ActivationId>,
    conflicts: HashMap<ActivationId, Vec<ActivationId>>,
    max_rounds: u32,
    tolerance: f64,
}

impl AnnealSpace {
    pub fn snapshot(doc: &Document) -> Result<Self> {
        let mut nodes = Vec::with_capacity(doc.activations.len());
        for act in &doc.activations {
            let kind = if act.is_token {
                EvalKind::Token {
                    net: doc.graph.value_or(act.fields.net, 0.0),
                }
            } else {
                match act.kind {
                    NeuronKind::Binding => EvalKind::Binding,
                    NeuronKind::Pattern => EvalKind::Pattern,
                    NeuronKind::Inhibitory => EvalKind::Inhibitory,
                }
            };
            let inputs = act
                .inputs
                .iter()
                .map(|l| {
                    let link = &doc.links[l.0 as usize];
                    EvalInput {
                        from: link.input.index(),
                        weight: doc.graph.value_or(link.weight, 0.0),
                        recurrent: link.is_recurrent(),
                        negative: link.kind == SynapseKind::NegativeFeedback,
                    }
                })
                .collect();
            nodes.push(EvalNode {
                id: act.id,
                kind,
                bias: doc.graph.value_or(act.fields.bias, 0.0),
                function: act.function,
                inputs,
            });
        }

        let mut conflicts = HashMap::new();
        for act in &doc.activations {
            let rivals = doc.conflicts_of(act.id)?;
            if !rivals.is_empty() {
                conflicts.insert(act.id, rivals);
            }
        }
        let mut candidates: Vec<ActivationId> = conflicts.keys().copied().collect();
        candidates.sort();

        let n = nodes.len();
        let mut space = Self {
            order: forward_order(&nodes),
            nodes,
            decisions: vec![Decision::Unknown; n],
            rounds: Vec::new(),
            candidates,
            conflicts,
            max_rounds: doc.config.max_rounds,
            tolerance: doc.config.tolerance,
        };
        space.rounds = space.evaluate();
        Ok(space)
    }

    /// Evaluated rounds per activation, indexed like the document's activations.
    pub fn rounds(&self) -> &[Rounds] {
        &self.rounds
    }

    pub fn decision(&self, act: ActivationId) -> Decision {
        self.decisions
            .get(act.index())
            .copied()
            .unwrap_or(Decision::Unknown)
    }

    pub fn set_decision(&mut self, act: ActivationId, decision: Decision) {
        if let Some(d) = self.decisions.get_mut(act.index()) {
            *d = decision;
        }
    }

    /// Relax the network under the current decisions.
    pub fn evaluate(&self) -> Vec<Rounds> {
        let n = self.nodes.len();
        let mut history = vec![Rounds::new(); n];
        let mut prev = vec![0.0; n];

        for round in 0..=self.max_rounds {
            let mut current = vec![0.0; n];
            let mut max_change: f64 = 0.0;
            for &i in &self.order {
                let state = self.evaluate_node(i, &current, &prev);
                current[i] = state.value;
                max_change = max_change.max((state.value - prev[i]).abs());
                history[i].set(round, state);
            }
            prev = current;
            if round >= 1 && max_change <= self.tolerance {
                break;
            }
        }
        history
    }

    fn evaluate_node(&self, i: usize, current: &[f64], prev: &[f64]) -> RoundState {
        let node = &self.nodes[i];
        let f = node.function;
        match node.kind {
            EvalKind::Token { net } => RoundState {
                value: f.f(net),
                net,
                weight: NormWeight::ZERO,
            },
            _ if self.decisions[i] == Decision::Excluded => RoundState::default(),
            EvalKind::Inhibitory => {
                let net = node
                    .inputs
                    .iter()
                    .map(|inp| inp.weight * read(inp, current, prev))
                    .fold(None, |acc: Option<f64>, x| Some(acc.map_or(x, |a| a.max(x))))
                    .unwrap_or(0.0);
                RoundState {
                    value: f.f(net),
                    net,
                    weight: NormWeight::ZERO,
                }
            }
            EvalKind::Binding | EvalKind::Pattern => {
                let mut net = node.bias;
                let mut evidence = node.bias.max(0.0);
                for inp in &node.inputs {
                    let c = if inp.negative {
                        inp.weight * self.inhibition(inp.from, i, prev)
                    } else {
                        inp.weight * read(inp, current, prev)
                    };
                    net += c;
                    if c > 0.0 {
                        evidence += c;
                    }
                }
                let value = f.f(net);
                let weight = if evidence > 0.0 {
                    NormWeight::new(value * evidence, evidence)
                } else {
                    NormWeight::ZERO
                };
                RoundState { value, net, weight }
            }
        }
    }

    /// Strongest selected rival of `target` feeding the inhibitory node,
    /// read from the previous round.
    fn inhibition(&self, inhibitory: usize, target: usize, prev: &[f64]) -> f64 {
        self.nodes[inhibitory]
            .inputs
            .iter()
            .filter(|k| k.from != target && self.decisions[k.from] == Decision::Selected)
            .map(|k| k.weight * prev[k.from])
            .fold(0.0, f64::max)
    }

    pub fn final_weight(&self, act: ActivationId) -> NormWeight {
        self.rounds
            .get(act.index())
            .map(|r| r.last().weight)
            .unwrap_or(NormWeight::ZERO)
    }
}

fn read(inp: &EvalInput, current: &[f64], prev: &[f64]) -> f64 {
    if inp.recurrent {
        prev[inp.from]
    } else {
        current[inp.from]
    }
}

/// Kahn order over forward links. Nodes left in a forward cycle are
/// appended in index order.
fn forward_order(nodes: &[EvalNode]) -> Vec<usize> {
    let n = nodes.len();
    let mut indegree = vec![0usize; n];
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, node) in nodes.iter().enumerate() {
        for inp in node.inputs.iter().filter(|inp| !inp.recurrent) {
            indegree[i] += 1;
            outgoing[inp.from].push(i);
        }
    }
    let mut ready: VecDeque<usize> = (0..n).filter(|i| indegree[*i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    let mut placed = vec![false; n];
    while let Some(i) = ready.pop_front() {
        order.push(i);
        placed[i] = true;
        for &o in &outgoing[i] {
            indegree[o] -= 1;
            if indegree[o] == 0 {
                ready.push_back(o);
            }
        }
    }
    order.extend((0..n).filter(|i| !placed[*i]));
    order
}

impl SearchSpace for AnnealSpace {
    fn candidates(&self) -> Vec<ActivationId> {
        self.candidates.clone()
    }

    fn conflicts(&self, candidate: ActivationId) -> Vec<ActivationId> {
        self.conflicts.get(&candidate).cloned().unwrap_or_default()
    }

    fn base_weight(&self) -> NormWeight {
        self.rounds
            .iter()
            .fold(NormWeight::ZERO, |acc, r| acc + r.last().weight)
    }

    fn apply(&mut self, candidate: ActivationId, decision: Decision) -> Result<Vec<StateChange>> {
        let idx = candidate.index();
        let old_decision = self.decisions[idx];
        self.decisions[idx] = decision;

        let mut changes = Vec::new();
        for (i, rounds) in self.evaluate().into_iter().enumerate() {
            if rounds == self.rounds[i] && i != idx {
                continue;
            }
            changes.push(StateChange {
                activation: self.nodes[i].id,
                old_rounds: std::mem::replace(&mut self.rounds[i], rounds.clone()),
                new_rounds: rounds,
                old_decision: if i == idx {
                    old_decision
                } else {
                    self.decisions[i]
                },
                new_decision: self.decisions[i],
            });
        }
        Ok(changes)
    }

    fn restore(&mut self, changes: &[StateChange], change: Change) -> Result<()> {
        for c in changes.iter().rev() {
            let i = c.activation.index();
            self.rounds[i] = c.rounds(change).clone();
            self.decisions[i] = c.decision(change);
        }
        Ok(())
    }
}

impl Document {
    /// Search for the best consistent interpretation and commit it.
    /// Excluded activations have their gate closed.
    pub fn anneal(&mut self) -> Result<SearchOutcome> {
        self.ensure_connected()?;
        let mut space = AnnealSpace::snapshot(self)?;
        debug!(
            "{} annealing {} candidates",
            self.id(),
            space.candidates.len()
        );
        let outcome = search(&mut space, self.config.max_search_steps)?;

        for (candidate, decision) in &outcome.decisions {
            space.set_decision(*candidate, *decision);
        }
        space.rounds = space.evaluate();

        for (candidate, decision) in &outcome.decisions {
            let act = &mut self.activations[candidate.index()];
            act.decision = *decision;
            if *decision == Decision::Excluded {
                let gate = act.fields.gate;
                self.graph.set_value(gate, 0.0)?;
            }
        }
        for act in self.activations.iter_mut() {
            act.norm_weight = space.final_weight(act.id);
        }
        self.sync()?;
        self.process_until(aika_core::Phase::Inference)?;

        info!(
            "{} interpretation: weight {} after {} steps{}",
            self.id(),
            outcome.weight,
            outcome.steps,
            if outcome.interrupted {
                " (interrupted)"
            } else {
                ""
            }
        );
        self.search = Some(outcome.clone());
        Ok(outcome)
    }
}
