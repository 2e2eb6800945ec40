//! Linearized instruction sequences for a single evaluation sweep
use crate::eval::clause::{Clause, ClauseId};
use crate::types::Interval;

use nalgebra::Vector3;

/// Describes how a tape on the stack was produced
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TapeType {
    /// The base tape, containing every clause of the expression
    Original,
    /// Reduced against an interval region
    Interval,
    /// Reduced against a feature's branch choices
    Feature,
    /// Reduced against float comparisons at a single point
    Specialized,
}

/// A tape is a topologically ordered sequence of clauses
///
/// Clauses are stored root-first: every clause appears before the clauses
/// which compute its operands, and evaluation walks the sequence from the
/// back.  Interval-reduced tapes also record the region they were reduced
/// against, so that later point queries can tell whether the tape is valid
/// for them.
#[derive(Clone, Debug)]
pub struct Tape {
    pub(crate) t: Vec<Clause>,
    pub(crate) root: ClauseId,
    pub(crate) tag: TapeType,
    pub(crate) x: Interval,
    pub(crate) y: Interval,
    pub(crate) z: Interval,
}

impl Tape {
    pub(crate) fn with_capacity(tag: TapeType, cap: usize) -> Self {
        Self {
            t: Vec::with_capacity(cap),
            root: 0,
            tag,
            x: 0.0.into(),
            y: 0.0.into(),
            z: 0.0.into(),
        }
    }

    /// Returns the number of clauses in the tape
    pub fn len(&self) -> usize {
        self.t.len()
    }

    /// Checks whether the tape contains no clauses
    ///
    /// This is the case when the root is a leaf (an axis, constant, or
    /// variable), whether by construction or after reduction.
    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Checks whether `p` is inside the region this tape was reduced against
    ///
    /// Only meaningful for [`TapeType::Interval`] tapes.
    pub(crate) fn contains(&self, p: Vector3<f32>) -> bool {
        self.x.contains(p.x) && self.y.contains(p.y) && self.z.contains(p.z)
    }
}
