//! Aika: recurrent, interpretation-searching inference over neuro-symbolic
//! networks.
//!
//! The engine is split across the workspace crates; this package re-exports
//! them under one roof.

pub use aika_core as core;
pub use aika_fields as fields;
pub use aika_network as network;
pub use aika_search as search;

pub use aika_core::{
    ActivationId, Config, DocumentId, Error, LabelContext, NeuronId, Phase, Result, SynapseId,
    TextRange,
};
pub use aika_network::{
    Document, DocumentSummary, Model, ModelUpdate, NeuronKind, Relation, SynapseKind,
    SynapseSpec,
};
pub use aika_search::{Decision, NormWeight, SearchOutcome};
