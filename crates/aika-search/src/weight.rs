//! Normalized evidence weight

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Evidence weight `w` with its normalization `n`. Weights combine by
/// component-wise addition and compare by `w / n`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NormWeight {
    pub w: f64,
    pub n: f64,
}

impl NormWeight {
    pub const ZERO: NormWeight = NormWeight { w: 0.0, n: 0.0 };

    pub fn new(w: f64, n: f64) -> Self {
        Self { w, n }
    }

    /// `w / n`, or 0 when there is nothing to normalize by.
    pub fn normalized(&self) -> f64 {
        if self.n == 0.0 {
            0.0
        } else {
            self.w / self.n
        }
    }

    pub fn is_zero(&self) -> bool {
        self.w == 0.0 && self.n == 0.0
    }

    pub fn compare(&self, other: &NormWeight) -> Ordering {
        self.normalized()
            .partial_cmp(&other.normalized())
            .unwrap_or(Ordering::Equal)
    }
}

impl Add for NormWeight {
    type Output = NormWeight;

    fn add(self, rhs: NormWeight) -> NormWeight {
        NormWeight::new(self.w + rhs.w, self.n + rhs.n)
    }
}

impl Sub for NormWeight {
    type Output = NormWeight;

    fn sub(self, rhs: NormWeight) -> NormWeight {
        NormWeight::new(self.w - rhs.w, self.n - rhs.n)
    }
}

impl AddAssign for NormWeight {
    fn add_assign(&mut self, rhs: NormWeight) {
        self.w += rhs.w;
        self.n += rhs.n;
    }
}

impl fmt::Display for NormWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}/{:.3}", self.w, self.n)
    }
}
