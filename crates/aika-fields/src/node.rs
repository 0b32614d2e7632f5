//! Field nodes and links

use crate::function::{ActivationFunction, MinMaxMode, ThresholdKind};
use aika_core::{ActivationId, NeuronId, Phase};
use std::fmt;

/// Index of a node in the field graph arena.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct FieldId(pub u32);

/// Index of a link in the field graph arena.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct FieldLinkId(pub u32);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Back-reference to the element a field belongs to. Only used for
/// printing and for routing field events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldOwner {
    Activation(ActivationId),
    Link {
        input: ActivationId,
        output: ActivationId,
    },
    Neuron(NeuronId),
    Detached,
}

impl fmt::Display for FieldOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activation(id) => write!(f, "{}", id),
            Self::Link { input, output } => write!(f, "{}->{}", input, output),
            Self::Neuron(id) => write!(f, "{}", id),
            Self::Detached => write!(f, "-"),
        }
    }
}

/// How a node turns incoming deltas into its own delta.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldKind {
    /// Settable value cell; sums whatever is connected to it.
    Value,
    /// Sum over any number of inputs.
    Addition,
    /// `arg0 - arg1`
    Subtraction,
    /// `arg0 * arg1`, product rule on deltas.
    Multiplication,
    /// `arg0 / arg1`, quotient rule on deltas. A zero denominator yields 0.
    Division,
    Scale(f64),
    /// `1 - x`
    Invert,
    Identity,
    Threshold {
        threshold: f64,
        kind: ThresholdKind,
        /// Once fired (value > 0.5) the node ignores further updates.
        is_final: bool,
    },
    Function(ActivationFunction),
    Derivative(ActivationFunction),
    MinMax {
        mode: MinMaxMode,
        selected: Option<FieldLinkId>,
    },
}

/// Number of input slots accepted by a kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    /// Any number of links, all on argument 0.
    Many,
    /// Exactly one link on argument 0.
    Unary,
    /// One link each on arguments 0 and 1.
    Binary,
}

impl FieldKind {
    pub fn arity(&self) -> Arity {
        match self {
            Self::Value | Self::Addition | Self::MinMax { .. } => Arity::Many,
            Self::Subtraction | Self::Multiplication | Self::Division => Arity::Binary,
            Self::Scale(_)
            | Self::Invert
            | Self::Identity
            | Self::Threshold { .. }
            | Self::Function(_)
            | Self::Derivative(_) => Arity::Unary,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Addition => "add",
            Self::Subtraction => "sub",
            Self::Multiplication => "mul",
            Self::Division => "div",
            Self::Scale(_) => "scale",
            Self::Invert => "invert",
            Self::Identity => "identity",
            Self::Threshold { .. } => "threshold",
            Self::Function(_) => "fn",
            Self::Derivative(_) => "derivative",
            Self::MinMax { .. } => "minmax",
        }
    }
}

/// Gate deciding whether a pending update is committed and propagated.
#[derive(Clone, Copy, Debug)]
pub enum Precondition {
    /// Commit when `|update|` exceeds the graph tolerance.
    ExceedsTolerance,
    Always,
    Custom(fn(current: Option<f64>, update: f64) -> bool),
}

impl Precondition {
    pub fn check(&self, current: Option<f64>, update: f64, tolerance: f64) -> bool {
        match self {
            Self::ExceedsTolerance => update.abs() > tolerance,
            Self::Always => true,
            Self::Custom(f) => f(current, update),
        }
    }
}

/// Present on nodes whose commits are deferred through the step queue.
#[derive(Clone, Copy, Debug)]
pub struct QueueSlot {
    pub phase: Phase,
    pub round: u32,
    pub is_queued: bool,
}

#[derive(Clone, Debug)]
pub struct FieldNode {
    pub(crate) label: String,
    pub(crate) owner: FieldOwner,
    pub(crate) kind: FieldKind,
    pub(crate) current: Option<f64>,
    pub(crate) pending: Option<f64>,
    pub(crate) inputs: Vec<FieldLinkId>,
    pub(crate) outputs: Vec<FieldLinkId>,
    pub(crate) precondition: Precondition,
    pub(crate) queue: Option<QueueSlot>,
    pub(crate) notify: bool,
}

impl FieldNode {
    pub(crate) fn new(kind: FieldKind, label: String, owner: FieldOwner) -> Self {
        Self {
            label,
            owner,
            kind,
            current: None,
            pending: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            precondition: Precondition::ExceedsTolerance,
            queue: None,
            notify: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn owner(&self) -> FieldOwner {
        self.owner
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_initialized(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<f64> {
        self.current
    }

    pub fn pending(&self) -> Option<f64> {
        self.pending
    }

    /// Committed value plus the not yet committed update.
    pub fn updated_value(&self) -> f64 {
        self.current.unwrap_or(0.0) + self.pending.unwrap_or(0.0)
    }

    pub fn inputs(&self) -> &[FieldLinkId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[FieldLinkId] {
        &self.outputs
    }

    pub fn is_queued(&self) -> bool {
        self.queue.map(|q| q.is_queued).unwrap_or(false)
    }
}

impl fmt::Display for FieldNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.current {
            Some(v) => write!(f, "{} {}({}) = {:.6}", self.owner, self.label, self.kind.name(), v),
            None => write!(f, "{} {}({}) = --", self.owner, self.label, self.kind.name()),
        }
    }
}

/// Directed edge from a producer to one argument of a consumer.
#[derive(Clone, Copy, Debug)]
pub struct FieldLink {
    pub input: FieldId,
    pub arg: usize,
    pub output: FieldId,
    pub(crate) connected: bool,
}

impl FieldLink {
    pub fn is_connected(&self) -> bool {
        self.connected
    }
}
