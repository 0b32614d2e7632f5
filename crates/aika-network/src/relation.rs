//! Positional relations between activations

use aika_core::{Error, Result, TextRange};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an activation sits in the document. Token activations carry a
/// position; activations derived from them inherit it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Anchor {
    pub position: Option<u32>,
    pub range: Option<TextRange>,
}

/// Relation `a R b`, read "a precedes b", "a contains b", ...
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Equals,
    Before,
    After,
    /// `a` comes directly before `b`.
    Precedes,
    /// `a` comes directly after `b`.
    Follows,
    Overlaps,
    Contains,
}

impl Relation {
    /// Relations tried, in order, when discovering latent links.
    pub const LATENT: [Relation; 3] = [Relation::Equals, Relation::Precedes, Relation::Follows];

    pub fn name(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::Before => "before",
            Self::After => "after",
            Self::Precedes => "precedes",
            Self::Follows => "follows",
            Self::Overlaps => "overlaps",
            Self::Contains => "contains",
        }
    }

    /// `b R a` for every relation that has a counterpart in this set.
    pub fn inverse(self) -> Option<Relation> {
        match self {
            Self::Equals => Some(Self::Equals),
            Self::Before => Some(Self::After),
            Self::After => Some(Self::Before),
            Self::Precedes => Some(Self::Follows),
            Self::Follows => Some(Self::Precedes),
            Self::Overlaps => Some(Self::Overlaps),
            Self::Contains => None,
        }
    }

    /// Token positions take precedence over character ranges. Anchors
    /// without either cannot be related.
    pub fn evaluate(self, a: Anchor, b: Anchor) -> Result<bool> {
        if let (Some(pa), Some(pb)) = (a.position, b.position) {
            return Ok(self.holds_positions(pa, pb));
        }
        if let (Some(ra), Some(rb)) = (a.range, b.range) {
            return Ok(self.holds_ranges(ra, rb));
        }
        Err(Error::unsupported_relation(
            self.name(),
            "activation has neither a position nor a text range",
        ))
    }

    pub fn holds_positions(self, a: u32, b: u32) -> bool {
        match self {
            Self::Equals | Self::Overlaps | Self::Contains => a == b,
            Self::Before => a < b,
            Self::After => a > b,
            Self::Precedes => a.checked_add(1) == Some(b),
            Self::Follows => b.checked_add(1) == Some(a),
        }
    }

    pub fn holds_ranges(self, a: TextRange, b: TextRange) -> bool {
        match self {
            Self::Equals => a == b,
            Self::Before => a.end <= b.begin,
            Self::After => b.end <= a.begin,
            Self::Precedes => a.end == b.begin,
            Self::Follows => b.end == a.begin,
            Self::Overlaps => a.begin < b.end && b.begin < a.end,
            Self::Contains => a.begin <= b.begin && b.end <= a.end,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(position: u32) -> Anchor {
        Anchor {
            position: Some(position),
            range: None,
        }
    }

    #[test]
    fn positions_take_precedence() {
        let a = Anchor {
            position: Some(0),
            range: Some(TextRange::new(0, 1)),
        };
        let b = Anchor {
            position: Some(1),
            range: Some(TextRange::new(2, 3)),
        };
        assert!(Relation::Precedes.evaluate(a, b).unwrap());
        assert!(Relation::Follows.evaluate(b, a).unwrap());
        assert!(!Relation::Precedes.evaluate(b, a).unwrap());
    }

    #[test]
    fn ranges_used_without_positions() {
        let a = Anchor {
            position: None,
            range: Some(TextRange::new(0, 5)),
        };
        let b = Anchor {
            position: None,
            range: Some(TextRange::new(1, 3)),
        };
        assert!(Relation::Contains.evaluate(a, b).unwrap());
        assert!(Relation::Overlaps.evaluate(a, b).unwrap());
        assert!(!Relation::Before.evaluate(a, b).unwrap());
    }

    #[test]
    fn missing_anchor_is_unsupported() {
        let err = Relation::Equals.evaluate(at(0), Anchor::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedRelation { .. }));
    }

    #[test]
    fn inverse_swaps_direction() {
        for r in [Relation::Before, Relation::Precedes, Relation::Equals] {
            let inv = r.inverse().unwrap();
            assert_eq!(r.holds_positions(2, 3), inv.holds_positions(3, 2));
        }
        assert_eq!(Relation::Contains.inverse(), None);
    }

    #[test]
    fn adjacency_at_last_position() {
        assert!(!Relation::Precedes.holds_positions(u32::MAX, 0));
        assert!(!Relation::Follows.holds_positions(0, u32::MAX));
        assert!(Relation::Precedes.holds_positions(u32::MAX - 1, u32::MAX));
        assert!(Relation::Follows.holds_positions(u32::MAX, u32::MAX - 1));
    }
}
