//! Aika Fields - Incremental dataflow graph and step queue

pub mod function;
pub mod graph;
pub mod node;
pub mod queue;

pub use function::{ActivationFunction, MinMaxMode, ThresholdKind};
pub use graph::{FieldEvent, FieldGraph, ScheduledUpdate, DEFAULT_TOLERANCE};
pub use node::{
    Arity, FieldId, FieldKind, FieldLink, FieldLinkId, FieldNode, FieldOwner, Precondition,
    QueueSlot,
};
pub use queue::{Queue, QueueKey};
