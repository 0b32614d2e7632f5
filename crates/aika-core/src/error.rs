//! Error types for Aika

use crate::types::{ActivationId, NeuronId, SynapseId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("field not initialized: {field}")]
    UninitializedField { field: String },

    #[error("invalid argument {arg} for field {field}")]
    InvalidArgument { field: String, arg: usize },

    #[error("unsupported relation {relation}: {reason}")]
    UnsupportedRelation { relation: String, reason: String },

    #[error("relative position {rid} exceeds maximum {max}")]
    RidOutOfRange { rid: i64, max: i64 },

    #[error("neuron not found: {0}")]
    NeuronNotFound(NeuronId),

    #[error("synapse not found: {0}")]
    SynapseNotFound(SynapseId),

    #[error("activation not found: {0}")]
    ActivationNotFound(ActivationId),

    #[error("invalid synapse: {0}")]
    InvalidSynapse(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("document already disconnected")]
    DocumentDisconnected,

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn uninitialized(field: impl Into<String>) -> Self {
        Self::UninitializedField {
            field: field.into(),
        }
    }

    pub fn invalid_argument(field: impl Into<String>, arg: usize) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            arg,
        }
    }

    pub fn unsupported_relation(relation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedRelation {
            relation: relation.into(),
            reason: reason.into(),
        }
    }

    /// True for conditions a caller may recover from by abandoning a single
    /// construction attempt.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RidOutOfRange { .. })
    }
}
