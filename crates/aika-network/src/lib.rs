//! Aika Network - Neurons, documents, linking and interpretation search

pub mod activation;
pub mod anneal;
pub mod document;
pub mod linker;
pub mod model;
pub mod neuron;
pub mod relation;
pub mod signal;
pub mod summary;
pub mod synapse;
pub mod training;
pub mod transition;

pub use activation::{Activation, ActivationFields, Link, LinkId, TrainingFields};
pub use anneal::AnnealSpace;
pub use document::{Document, Step};
pub use model::Model;
pub use neuron::{Neuron, NeuronKind, OutputRef};
pub use relation::{Anchor, Relation};
pub use signal::{BindingSignal, Scope, SignalArena, SignalId, SignalKey, SignalState};
pub use summary::{ActivationSummary, DiscoveredPattern, DocumentSummary, PatternInput};
pub use synapse::{Synapse, SynapseKind, SynapseSpec};
pub use training::ModelUpdate;
pub use transition::{SynapseTransition, Terminal, Transition, TransitionMode};
