//! Scalar functions used by field nodes

use serde::{Deserialize, Serialize};

/// Activation function of a neuron, applied to its net value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationFunction {
    /// `max(0, tanh(x))`
    RectifiedHyperbolicTangent,
    HyperbolicTangent,
    Linear,
}

impl ActivationFunction {
    pub fn f(self, x: f64) -> f64 {
        match self {
            Self::RectifiedHyperbolicTangent => x.tanh().max(0.0),
            Self::HyperbolicTangent => x.tanh(),
            Self::Linear => x,
        }
    }

    pub fn derivative(self, x: f64) -> f64 {
        match self {
            Self::RectifiedHyperbolicTangent => {
                if x > 0.0 {
                    1.0 - x.tanh().powi(2)
                } else {
                    0.0
                }
            }
            Self::HyperbolicTangent => 1.0 - x.tanh().powi(2),
            Self::Linear => 1.0,
        }
    }
}

/// Comparison used by threshold nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKind {
    Above,
    Below,
    AboveAbs,
}

impl ThresholdKind {
    pub fn test(self, x: f64, threshold: f64) -> bool {
        match self {
            Self::Above => x > threshold,
            Self::Below => x < threshold,
            Self::AboveAbs => x.abs() > threshold,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinMaxMode {
    Min,
    Max,
}

impl MinMaxMode {
    /// Whether `candidate` replaces the currently selected value.
    /// Ties go to the candidate for MAX and to the incumbent for MIN.
    pub fn prefers(self, candidate: f64, selected: f64) -> bool {
        match self {
            Self::Max => candidate >= selected,
            Self::Min => candidate < selected,
        }
    }
}
