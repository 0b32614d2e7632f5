//! Field graph: incremental push-based dataflow over scalar nodes
//!
//! Nodes and links live in one arena each and refer to each other by index.
//! Every change travels as a delta: a producer commits `current += update`
//! and hands the update to each consumer, which translates it into its own
//! delta (sum, product rule, quotient rule, ...). Connecting a link pushes
//! the producer's current value, disconnecting pushes its negation, so the
//! graph never needs a full recompute.
//!
//! Propagation runs off an explicit worklist rather than the call stack.
//! Nodes with a [`QueueSlot`] are not committed here at all: their first
//! pending update is reported through [`FieldGraph::take_scheduled`] and the
//! owner calls [`FieldGraph::trigger_update`] when its step queue drains them.

use crate::node::{
    Arity, FieldId, FieldKind, FieldLink, FieldLinkId, FieldNode, FieldOwner, Precondition,
    QueueSlot,
};
use aika_core::{Error, Phase, Result};
use bytes::{Buf, BufMut};
use tracing::debug;

pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Emitted when a node flagged with `notify` commits a new value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldEvent {
    pub field: FieldId,
    pub owner: FieldOwner,
    pub old: Option<f64>,
    pub new: f64,
}

/// A queue field that needs a step to commit its pending update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledUpdate {
    pub field: FieldId,
    pub phase: Phase,
    pub round: u32,
}

/// One incoming delta as seen by a consumer.
#[derive(Clone, Copy, Debug)]
struct Update {
    link: FieldLinkId,
    arg: usize,
    delta: f64,
    /// Value the link carries after this update (0 when retracting).
    input_value: f64,
    retracting: bool,
}

pub struct FieldGraph {
    nodes: Vec<FieldNode>,
    links: Vec<FieldLink>,
    tolerance: f64,
    worklist: Vec<FieldId>,
    events: Vec<FieldEvent>,
    scheduled: Vec<ScheduledUpdate>,
}

impl Default for FieldGraph {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl FieldGraph {
    pub fn new(tolerance: f64) -> Self {
        Self {
            nodes: Vec::new(),
            links: Vec::new(),
            tolerance,
            worklist: Vec::new(),
            events: Vec::new(),
            scheduled: Vec::new(),
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    // =========================================================================
    // CONSTRUCTION
    // =========================================================================

    pub fn add(&mut self, kind: FieldKind, label: impl Into<String>, owner: FieldOwner) -> FieldId {
        let id = FieldId(self.nodes.len() as u32);
        self.nodes.push(FieldNode::new(kind, label.into(), owner));
        id
    }

    /// A value cell that starts initialized. Nothing listens yet, so no
    /// propagation is needed.
    pub fn constant(&mut self, label: impl Into<String>, owner: FieldOwner, value: f64) -> FieldId {
        let id = self.add(FieldKind::Value, label, owner);
        self.nodes[id.0 as usize].current = Some(value);
        id
    }

    pub fn set_precondition(&mut self, id: FieldId, precondition: Precondition) -> Result<()> {
        self.node_mut(id)?.precondition = precondition;
        Ok(())
    }

    /// Route commits of this node through the step queue.
    pub fn make_queued(&mut self, id: FieldId, phase: Phase, round: u32) -> Result<()> {
        self.node_mut(id)?.queue = Some(QueueSlot {
            phase,
            round,
            is_queued: false,
        });
        Ok(())
    }

    pub fn set_round(&mut self, id: FieldId, round: u32) -> Result<()> {
        if let Some(slot) = self.node_mut(id)?.queue.as_mut() {
            slot.round = round;
        }
        Ok(())
    }

    pub fn set_notify(&mut self, id: FieldId) -> Result<()> {
        self.node_mut(id)?.notify = true;
        Ok(())
    }

    // =========================================================================
    // READING
    // =========================================================================

    pub fn node(&self, id: FieldId) -> Result<&FieldNode> {
        self.nodes
            .get(id.0 as usize)
            .ok_or_else(|| Error::Internal(format!("unknown field {}", id)))
    }

    fn node_mut(&mut self, id: FieldId) -> Result<&mut FieldNode> {
        self.nodes
            .get_mut(id.0 as usize)
            .ok_or_else(|| Error::Internal(format!("unknown field {}", id)))
    }

    pub fn link(&self, id: FieldLinkId) -> Result<&FieldLink> {
        self.links
            .get(id.0 as usize)
            .ok_or_else(|| Error::Internal(format!("unknown field link {}", id.0)))
    }

    /// Committed value. Reading a node that never received a value is a
    /// wiring bug.
    pub fn value(&self, id: FieldId) -> Result<f64> {
        let node = self.node(id)?;
        node.current
            .ok_or_else(|| Error::uninitialized(format!("{} {}", node.owner, node.label)))
    }

    pub fn value_or(&self, id: FieldId, default: f64) -> f64 {
        self.nodes
            .get(id.0 as usize)
            .and_then(|n| n.current)
            .unwrap_or(default)
    }

    pub fn is_initialized(&self, id: FieldId) -> bool {
        self.nodes
            .get(id.0 as usize)
            .map(|n| n.is_initialized())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of currently connected links.
    pub fn connected_links(&self) -> usize {
        self.links.iter().filter(|l| l.connected).count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (FieldId, &FieldNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (FieldId(i as u32), n))
    }

    pub fn take_events(&mut self) -> Vec<FieldEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn take_scheduled(&mut self) -> Vec<ScheduledUpdate> {
        std::mem::take(&mut self.scheduled)
    }

    // =========================================================================
    // LINKS
    // =========================================================================

    pub fn connect(&mut self, input: FieldId, arg: usize, output: FieldId) -> Result<FieldLinkId> {
        self.node(input)?;
        let target = self.node(output)?;
        let occupied = |a: usize| {
            target
                .inputs
                .iter()
                .any(|l| self.links[l.0 as usize].arg == a)
        };
        let valid = match target.kind.arity() {
            Arity::Many => arg == 0,
            Arity::Unary => arg == 0 && !occupied(0),
            Arity::Binary => arg <= 1 && !occupied(arg),
        };
        if !valid {
            return Err(Error::invalid_argument(
                format!("{} {}", target.owner, target.label),
                arg,
            ));
        }

        let id = FieldLinkId(self.links.len() as u32);
        self.links.push(FieldLink {
            input,
            arg,
            output,
            connected: true,
        });
        self.nodes[input.0 as usize].outputs.push(id);
        self.nodes[output.0 as usize].inputs.push(id);

        if let Some(v) = self.nodes[input.0 as usize].current {
            let consumer_initialized = self.nodes[output.0 as usize].is_initialized();
            if v.abs() > self.tolerance || !consumer_initialized {
                self.receive(
                    output,
                    Update {
                        link: id,
                        arg,
                        delta: v,
                        input_value: v,
                        retracting: false,
                    },
                )?;
                self.flush()?;
            }
        }
        Ok(id)
    }

    /// Retract exactly what the link contributed. Disconnecting twice is a no-op.
    pub fn disconnect(&mut self, id: FieldLinkId) -> Result<()> {
        let link = *self.link(id)?;
        if !link.connected {
            return Ok(());
        }
        self.links[id.0 as usize].connected = false;
        self.nodes[link.input.0 as usize].outputs.retain(|l| *l != id);
        self.nodes[link.output.0 as usize].inputs.retain(|l| *l != id);

        if let Some(v) = self.nodes[link.input.0 as usize].current {
            self.receive(
                link.output,
                Update {
                    link: id,
                    arg: link.arg,
                    delta: -v,
                    input_value: 0.0,
                    retracting: true,
                },
            )?;
            self.flush()?;
        }
        Ok(())
    }

    /// Disconnect every remaining link, newest first.
    pub fn disconnect_all(&mut self) -> Result<usize> {
        let mut count = 0;
        for i in (0..self.links.len()).rev() {
            if self.links[i].connected {
                self.disconnect(FieldLinkId(i as u32))?;
                count += 1;
            }
        }
        debug!("disconnected {} field links", count);
        Ok(count)
    }

    // =========================================================================
    // UPDATES
    // =========================================================================

    /// Move the node to `value` by pushing the difference as an update.
    pub fn set_value(&mut self, id: FieldId, value: f64) -> Result<()> {
        let node = self.node(id)?;
        let delta = if node.is_initialized() || node.pending.is_some() {
            value - node.updated_value()
        } else {
            value
        };
        self.add_and_trigger_update(id, delta)
    }

    pub fn add_and_trigger_update(&mut self, id: FieldId, delta: f64) -> Result<()> {
        self.node(id)?;
        self.accumulate(id, delta);
        self.flush()
    }

    /// Commit a queued node's pending update. Called when its step is drained.
    pub fn trigger_update(&mut self, id: FieldId) -> Result<()> {
        if let Some(slot) = self.node_mut(id)?.queue.as_mut() {
            slot.is_queued = false;
        }
        self.commit(id)?;
        self.flush()
    }

    fn accumulate(&mut self, id: FieldId, update: f64) {
        let node = &mut self.nodes[id.0 as usize];
        node.pending = Some(node.pending.unwrap_or(0.0) + update);
        match node.queue {
            Some(slot) => {
                if !slot.is_queued {
                    if let Some(s) = node.queue.as_mut() {
                        s.is_queued = true;
                    }
                    self.scheduled.push(ScheduledUpdate {
                        field: id,
                        phase: slot.phase,
                        round: slot.round,
                    });
                }
            }
            None => self.worklist.push(id),
        }
    }

    fn flush(&mut self) -> Result<()> {
        while let Some(id) = self.worklist.pop() {
            self.commit(id)?;
        }
        Ok(())
    }

    fn commit(&mut self, id: FieldId) -> Result<()> {
        let tolerance = self.tolerance;
        let node = &mut self.nodes[id.0 as usize];
        let update = match node.pending.take() {
            Some(u) => u,
            None => return Ok(()),
        };
        let old = node.current;
        if old.is_some() && !node.precondition.check(old, update, tolerance) {
            // Below the gate: keep accumulating until it matters.
            node.pending = Some(update);
            return Ok(());
        }
        let new = old.unwrap_or(0.0) + update;
        node.current = Some(new);
        if node.notify {
            self.events.push(FieldEvent {
                field: id,
                owner: node.owner,
                old,
                new,
            });
        }

        let outputs = node.outputs.clone();
        for link_id in outputs {
            let link = self.links[link_id.0 as usize];
            self.receive(
                link.output,
                Update {
                    link: link_id,
                    arg: link.arg,
                    delta: update,
                    input_value: new,
                    retracting: false,
                },
            )?;
        }
        Ok(())
    }

    fn receive(&mut self, target: FieldId, update: Update) -> Result<()> {
        if let Some(delta) = self.compute_update(target, update)? {
            self.accumulate(target, delta);
        }
        Ok(())
    }

    /// Value currently delivered on argument `arg` of `target` (0 if absent).
    fn arg_value(&self, target: FieldId, arg: usize) -> f64 {
        self.nodes[target.0 as usize]
            .inputs
            .iter()
            .map(|l| self.links[l.0 as usize])
            .find(|l| l.arg == arg && l.connected)
            .and_then(|l| self.nodes[l.input.0 as usize].current)
            .unwrap_or(0.0)
    }

    fn compute_update(&mut self, target: FieldId, u: Update) -> Result<Option<f64>> {
        let node = &self.nodes[target.0 as usize];
        let invalid = || Error::invalid_argument(format!("{} {}", node.owner, node.label), u.arg);
        let own = node.updated_value();
        let kind = node.kind;

        let delta = match kind {
            FieldKind::Value | FieldKind::Addition | FieldKind::Identity => u.delta,
            FieldKind::Subtraction => match u.arg {
                0 => u.delta,
                1 => -u.delta,
                _ => return Err(invalid()),
            },
            FieldKind::Scale(factor) => u.delta * factor,
            FieldKind::Multiplication => match u.arg {
                0 => u.delta * self.arg_value(target, 1),
                1 => u.delta * self.arg_value(target, 0),
                _ => return Err(invalid()),
            },
            FieldKind::Division => match u.arg {
                0 => {
                    let b = self.arg_value(target, 1);
                    if b == 0.0 {
                        0.0
                    } else {
                        u.delta / b
                    }
                }
                1 => {
                    let a = self.arg_value(target, 0);
                    let b_new = u.input_value;
                    let b_old = u.input_value - u.delta;
                    if b_new != 0.0 && b_old != 0.0 {
                        -a * u.delta / (b_old * b_new)
                    } else {
                        quotient(a, b_new) - quotient(a, b_old)
                    }
                }
                _ => return Err(invalid()),
            },
            FieldKind::Invert => (1.0 - u.input_value) - own,
            FieldKind::Threshold {
                threshold,
                kind,
                is_final,
            } => {
                if is_final && own > 0.5 {
                    return Ok(None);
                }
                let fired = if kind.test(u.input_value, threshold) { 1.0 } else { 0.0 };
                fired - own
            }
            FieldKind::Function(f) => f.f(u.input_value) - own,
            FieldKind::Derivative(f) => f.derivative(u.input_value) - own,
            FieldKind::MinMax { mode, selected } => {
                let (next, delta) = if u.retracting {
                    if selected != Some(u.link) {
                        return Ok(None);
                    }
                    match self.best_input(target, mode) {
                        Some((link, value)) => (Some(link), value - own),
                        None => (None, -own),
                    }
                } else {
                    match selected {
                        Some(s) if s != u.link => {
                            let selected_value = self.link_value(s);
                            if !mode.prefers(u.input_value, selected_value) {
                                return Ok(None);
                            }
                            (Some(u.link), u.input_value - own)
                        }
                        // The selected input moved; another one may now lead.
                        Some(_) => match self.best_input(target, mode) {
                            Some((link, value)) => (Some(link), value - own),
                            None => (Some(u.link), u.input_value - own),
                        },
                        None => (Some(u.link), u.input_value - own),
                    }
                };
                if let FieldKind::MinMax { selected, .. } = &mut self.nodes[target.0 as usize].kind {
                    *selected = next;
                }
                delta
            }
        };
        Ok(Some(delta))
    }

    fn link_value(&self, link: FieldLinkId) -> f64 {
        let l = self.links[link.0 as usize];
        self.nodes[l.input.0 as usize].current.unwrap_or(0.0)
    }

    fn best_input(
        &self,
        target: FieldId,
        mode: crate::function::MinMaxMode,
    ) -> Option<(FieldLinkId, f64)> {
        let mut best: Option<(FieldLinkId, f64)> = None;
        for link in &self.nodes[target.0 as usize].inputs {
            let l = self.links[link.0 as usize];
            let value = match self.nodes[l.input.0 as usize].current {
                Some(v) if l.connected => v,
                _ => continue,
            };
            best = match best {
                Some((_, b)) if !mode.prefers(value, b) => best,
                _ => Some((*link, value)),
            };
        }
        best
    }

    // =========================================================================
    // BINARY CONTRACT
    // =========================================================================

    /// Writes the initialized flag, then the value if there is one.
    pub fn write_value(&self, id: FieldId, buf: &mut impl BufMut) -> Result<()> {
        let node = self.node(id)?;
        match node.current {
            Some(v) => {
                buf.put_u8(1);
                buf.put_f64(v);
            }
            None => buf.put_u8(0),
        }
        Ok(())
    }

    /// Restores a value written by [`write_value`](Self::write_value) without
    /// propagating it.
    pub fn read_value(&mut self, id: FieldId, buf: &mut impl Buf) -> Result<()> {
        if buf.remaining() < 1 {
            return Err(Error::Internal("truncated field value".into()));
        }
        let current = match buf.get_u8() {
            0 => None,
            _ => {
                if buf.remaining() < 8 {
                    return Err(Error::Internal("truncated field value".into()));
                }
                Some(buf.get_f64())
            }
        };
        let node = self.node_mut(id)?;
        node.current = current;
        node.pending = None;
        Ok(())
    }

    /// One line per node, for debugging.
    pub fn dump(&self) -> String {
        self.nodes
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn quotient(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        0.0
    } else {
        a / b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_node_schedules_once() {
        let mut g = FieldGraph::default();
        let net = g.add(FieldKind::Addition, "net", FieldOwner::Detached);
        g.make_queued(net, Phase::Inference, 0).unwrap();
        g.add_and_trigger_update(net, 1.0).unwrap();
        g.add_and_trigger_update(net, 2.0).unwrap();
        assert_eq!(g.take_scheduled().len(), 1);
        assert!(!g.is_initialized(net));
        g.trigger_update(net).unwrap();
        assert_eq!(g.value(net).unwrap(), 3.0);
    }

    #[test]
    fn precondition_holds_back_small_updates() {
        let mut g = FieldGraph::new(0.1);
        let a = g.constant("a", FieldOwner::Detached, 1.0);
        let id = g.add(FieldKind::Identity, "id", FieldOwner::Detached);
        g.connect(a, 0, id).unwrap();
        g.add_and_trigger_update(a, 0.05).unwrap();
        assert_eq!(g.value(a).unwrap(), 1.0);
        g.add_and_trigger_update(a, 0.07).unwrap();
        assert!((g.value(a).unwrap() - 1.12).abs() < 1e-12);
        assert!((g.value(id).unwrap() - 1.12).abs() < 1e-12);
    }
}
