//! Features: equivalence classes of directions at ambiguous points
use crate::eval::clause::ClauseId;

use nalgebra::Vector3;

/// A single branch decision at an ambiguous `min`/`max` clause
///
/// `choice` is 0 to select the left-hand operand and 1 for the right.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Choice {
    pub id: ClauseId,
    pub choice: u8,
}

/// An equivalence class of infinitesimal directions at a point
///
/// Where several `min`/`max` branches tie, each feature records one
/// consistent set of branch decisions, the one-sided spatial gradient that
/// results, and a system of open half-space constraints: a direction is
/// compatible with the feature if it has positive dot product with every
/// stored epsilon.
#[derive(Clone, Debug)]
pub struct Feature {
    /// One-sided spatial gradient implied by this feature's choices
    pub deriv: Vector3<f32>,

    /// Branch decisions, sorted by clause id
    ///
    /// Slot ids ascend along the tape, so this ordering is also the order
    /// in which a tape walk encounters the clauses.
    choices: Vec<Choice>,

    /// Unit direction constraints, one per directional choice
    epsilons: Vec<(ClauseId, Vector3<f32>)>,
}

impl Default for Feature {
    fn default() -> Self {
        Self {
            deriv: Vector3::zeros(),
            choices: vec![],
            epsilons: vec![],
        }
    }
}

impl Feature {
    /// Attempts to add a directional branch decision
    ///
    /// The epsilon is normalized and accepted only if the intersection of
    /// all half-space constraints (including the new one) remains non-empty;
    /// returns whether the decision was accepted.
    pub fn push(&mut self, epsilon: Vector3<f32>, choice: Choice) -> bool {
        let norm = epsilon.norm();
        if norm == 0.0 || !norm.is_finite() {
            return false;
        }
        let e = epsilon / norm;
        if !self.feasible_with(e) {
            return false;
        }
        self.push_raw(choice, e);
        true
    }

    /// Adds a branch decision with no direction constraint
    pub fn push_choice(&mut self, choice: Choice) {
        let i = self.choices.partition_point(|c| c.id < choice.id);
        self.choices.insert(i, choice);
    }

    /// Adds a branch decision with an already-normalized epsilon, without
    /// re-checking feasibility
    pub(crate) fn push_raw(&mut self, choice: Choice, e: Vector3<f32>) {
        self.push_choice(choice);
        self.epsilons.push((choice.id, e));
    }

    /// Checks whether the unit direction `v` satisfies every accumulated
    /// half-space constraint
    pub fn is_compatible(&self, v: Vector3<f32>) -> bool {
        let norm = v.norm();
        if norm == 0.0 || !norm.is_finite() {
            return false;
        }
        let v = v / norm;
        self.epsilons.iter().all(|(_, e)| v.dot(e) > 0.0)
    }

    /// Checks whether the given clause has a direction constraint
    pub fn has_epsilon(&self, id: ClauseId) -> bool {
        self.epsilons.iter().any(|(i, _)| *i == id)
    }

    /// Returns the direction constraint for the given clause
    ///
    /// # Panics
    /// Panics if the clause has no stored epsilon
    pub(crate) fn epsilon(&self, id: ClauseId) -> Vector3<f32> {
        self.epsilons
            .iter()
            .find(|(i, _)| *i == id)
            .map(|(_, e)| *e)
            .unwrap()
    }

    /// Returns the branch decisions, sorted by clause id
    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    /// Decides whether the open half-space intersection stays non-empty
    /// after adding `e`
    ///
    /// The intersection is non-empty exactly when the convex hull of the
    /// unit epsilons excludes the origin; we find the minimum-norm point of
    /// the hull by Frank-Wolfe iteration.  The optimality condition of that
    /// point `p` guarantees `p . e_i >= |p|^2` for every epsilon, so a
    /// nonzero `p` is itself a strictly compatible direction.
    fn feasible_with(&self, e: Vector3<f32>) -> bool {
        if self.epsilons.is_empty() {
            return true;
        }
        let dirs: Vec<Vector3<f32>> = self
            .epsilons
            .iter()
            .map(|(_, e)| *e)
            .chain(std::iter::once(e))
            .collect();

        let mut p = dirs[0];
        for _ in 0..(8 * dirs.len()).max(32) {
            let mut best = dirs[0];
            let mut bd = best.dot(&p);
            for d in &dirs[1..] {
                let t = d.dot(&p);
                if t < bd {
                    bd = t;
                    best = *d;
                }
            }
            if bd >= p.norm_squared() - 1e-12 {
                break;
            }
            let step = best - p;
            let denom = step.norm_squared();
            if denom <= f32::EPSILON {
                break;
            }
            let t = (-p.dot(&step) / denom).clamp(0.0, 1.0);
            if t <= 0.0 {
                break;
            }
            p += step * t;
        }
        p.norm() > 1e-6
    }
}
