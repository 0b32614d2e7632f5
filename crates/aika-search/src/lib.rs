//! Aika Search - Interpretation search over conflicting activations

pub mod options;
pub mod search;
pub mod state;
pub mod weight;

pub use options::{OptionDag, OptionId};
pub use search::{search, SearchNode, SearchOutcome, SearchSpace, Searcher};
pub use state::{Change, Decision, RoundState, Rounds, StateChange};
pub use weight::NormWeight;
