//! Interpretation search
//!
//! Depth-first search over binary decisions. Candidates are visited in a
//! fixed order; each one is first SELECTED, then EXCLUDED, and every branch
//! is rolled back through the [`StateChange`]s the space returned for it.
//! A leaf compares its accumulated [`NormWeight`] with the best one seen so
//! far. The search stops early, keeping the best-so-far, once the step
//! counter passes `max_steps`.

use crate::state::{Change, Decision, StateChange};
use crate::weight::NormWeight;
use aika_core::{ActivationId, Result};
use std::collections::HashMap;
use tracing::{debug, warn};

/// The mutable state a search runs against.
pub trait SearchSpace {
    /// Candidates in visiting order.
    fn candidates(&self) -> Vec<ActivationId>;

    /// Candidates that cannot be selected together with `candidate`.
    fn conflicts(&self, candidate: ActivationId) -> Vec<ActivationId>;

    fn is_conflicting(&self, a: ActivationId, b: ActivationId) -> bool {
        self.conflicts(a).contains(&b)
    }

    /// Weight of the state before any decision.
    fn base_weight(&self) -> NormWeight {
        NormWeight::ZERO
    }

    /// Apply a decision and return every state change it caused.
    fn apply(&mut self, candidate: ActivationId, decision: Decision) -> Result<Vec<StateChange>>;

    /// Put the recorded changes back to their `Old` or `New` side.
    fn restore(&mut self, changes: &[StateChange], change: Change) -> Result<()>;
}

/// One visited decision in the search tree.
#[derive(Clone, Debug)]
pub struct SearchNode {
    pub candidate: ActivationId,
    pub decision: Decision,
    pub parent: Option<usize>,
    /// Nearest ancestor that selected its candidate.
    pub selected_parent: Option<usize>,
    /// Nearest ancestor that excluded its candidate.
    pub excluded_parent: Option<usize>,
    pub visited: u64,
    pub weight_delta: NormWeight,
    pub accumulated: NormWeight,
}

#[derive(Clone, Debug, Default)]
pub struct SearchOutcome {
    /// Best decision per candidate, in visiting order.
    pub decisions: Vec<(ActivationId, Decision)>,
    pub weight: NormWeight,
    pub steps: usize,
    pub interrupted: bool,
}

impl SearchOutcome {
    pub fn decision(&self, candidate: ActivationId) -> Decision {
        self.decisions
            .iter()
            .find(|(c, _)| *c == candidate)
            .map(|(_, d)| *d)
            .unwrap_or(Decision::Unknown)
    }
}

pub struct Searcher<'a, S: SearchSpace> {
    space: &'a mut S,
    candidates: Vec<ActivationId>,
    index: HashMap<ActivationId, usize>,
    decisions: Vec<Decision>,
    /// Best decision per candidate, keyed on the decisions around it.
    cached: Vec<Option<(Vec<Decision>, Decision)>>,
    nodes: Vec<SearchNode>,
    best: Option<(NormWeight, Vec<Decision>)>,
    steps: usize,
    max_steps: usize,
    interrupted: bool,
}

impl<'a, S: SearchSpace> Searcher<'a, S> {
    pub fn new(space: &'a mut S, max_steps: usize) -> Self {
        let candidates = space.candidates();
        let index = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (*c, i))
            .collect();
        let n = candidates.len();
        Self {
            space,
            candidates,
            index,
            decisions: vec![Decision::Unknown; n],
            cached: vec![None; n],
            nodes: Vec::new(),
            best: None,
            steps: 0,
            max_steps,
            interrupted: false,
        }
    }

    /// Visited search nodes, in visiting order.
    pub fn nodes(&self) -> &[SearchNode] {
        &self.nodes
    }

    pub fn run(&mut self) -> Result<SearchOutcome> {
        let base = self.space.base_weight();
        self.explore(0, None, base)?;

        let (weight, decisions) = match &self.best {
            Some((w, d)) => (*w, d.clone()),
            None => (NormWeight::ZERO, vec![Decision::Unknown; self.candidates.len()]),
        };
        debug!(
            "search finished: {} candidates, {} steps, weight {}",
            self.candidates.len(),
            self.steps,
            weight
        );
        Ok(SearchOutcome {
            decisions: self.candidates.iter().copied().zip(decisions).collect(),
            weight,
            steps: self.steps,
            interrupted: self.interrupted,
        })
    }

    /// Returns the best normalized leaf weight reached below this point.
    fn explore(
        &mut self,
        i: usize,
        parent: Option<usize>,
        accumulated: NormWeight,
    ) -> Result<Option<f64>> {
        if self.interrupted {
            return Ok(None);
        }
        if i == self.candidates.len() {
            return Ok(Some(self.leaf(accumulated)));
        }

        self.steps += 1;
        if self.steps > self.max_steps {
            self.interrupted = true;
            warn!(
                "search interrupted after {} steps, keeping best-so-far",
                self.max_steps
            );
            return Ok(None);
        }

        let candidate = self.candidates[i];
        let rivals: Vec<usize> = self
            .space
            .conflicts(candidate)
            .iter()
            .filter_map(|c| self.index.get(c).copied())
            .collect();
        let context = self.conflict_context(candidate, &rivals);
        let already_excluded = rivals
            .iter()
            .any(|j| self.decisions[*j] == Decision::Selected);
        let already_selected = rivals
            .iter()
            .all(|j| self.decisions[*j] == Decision::Excluded);

        let order: &[Decision] = if already_excluded {
            &[Decision::Excluded]
        } else if already_selected {
            &[Decision::Selected]
        } else {
            match &self.cached[i] {
                Some((key, Decision::Selected)) if *key == context => &[Decision::Selected],
                Some((key, Decision::Excluded)) if *key == context => &[Decision::Excluded],
                _ => &[Decision::Selected, Decision::Excluded],
            }
        };
        let explored_both = order.len() == 2;

        let mut best: Option<(f64, Decision)> = None;
        for decision in order.iter().copied() {
            let changes = self.space.apply(candidate, decision)?;
            let delta = changes
                .iter()
                .fold(NormWeight::ZERO, |acc, c| acc + c.weight_delta());
            self.invalidate_dependents(i, &changes);
            self.decisions[i] = decision;

            let node = self.push_node(candidate, decision, parent, delta, accumulated + delta);
            let result = self.explore(i + 1, Some(node), accumulated + delta)?;

            self.space.restore(&changes, Change::Old)?;
            self.decisions[i] = Decision::Unknown;

            if let Some(w) = result {
                if best.map_or(true, |(b, _)| w > b) {
                    best = Some((w, decision));
                }
            }
            if self.interrupted {
                break;
            }
        }

        if explored_both && !self.interrupted {
            self.cached[i] = best.map(|(_, d)| (context, d));
        }
        Ok(best.map(|(w, _)| w))
    }

    fn leaf(&mut self, accumulated: NormWeight) -> f64 {
        let w = accumulated.normalized();
        let improved = match &self.best {
            Some((b, _)) => w > b.normalized(),
            None => true,
        };
        if improved {
            debug!("new best interpretation: {}", accumulated);
            self.best = Some((accumulated, self.decisions.clone()));
        }
        w
    }

    /// Decisions of the rivals and the rivals' rivals of a candidate. A
    /// cached decision only holds while these stay the same.
    fn conflict_context(&self, candidate: ActivationId, rivals: &[usize]) -> Vec<Decision> {
        let mut around: Vec<usize> = rivals.to_vec();
        for j in rivals {
            around.extend(
                self.space
                    .conflicts(self.candidates[*j])
                    .iter()
                    .filter(|c| **c != candidate)
                    .filter_map(|c| self.index.get(c).copied()),
            );
        }
        around.sort_unstable();
        around.dedup();
        around.into_iter().map(|j| self.decisions[j]).collect()
    }

    /// Changes to later candidates make their cached decisions stale.
    fn invalidate_dependents(&mut self, i: usize, changes: &[StateChange]) {
        for change in changes {
            if let Some(k) = self.index.get(&change.activation) {
                if *k > i {
                    self.cached[*k] = None;
                }
            }
        }
    }

    fn push_node(
        &mut self,
        candidate: ActivationId,
        decision: Decision,
        parent: Option<usize>,
        weight_delta: NormWeight,
        accumulated: NormWeight,
    ) -> usize {
        let (selected_parent, excluded_parent) = match parent {
            Some(p) => {
                let pn = &self.nodes[p];
                match pn.decision {
                    Decision::Selected => (Some(p), pn.excluded_parent),
                    Decision::Excluded => (pn.selected_parent, Some(p)),
                    Decision::Unknown => (pn.selected_parent, pn.excluded_parent),
                }
            }
            None => (None, None),
        };
        let id = self.nodes.len();
        self.nodes.push(SearchNode {
            candidate,
            decision,
            parent,
            selected_parent,
            excluded_parent,
            visited: self.steps as u64,
            weight_delta,
            accumulated,
        });
        id
    }
}

/// Run a search to completion with a step ceiling.
pub fn search<S: SearchSpace>(space: &mut S, max_steps: usize) -> Result<SearchOutcome> {
    Searcher::new(space, max_steps).run()
}
