//! Dense storage for per-slot evaluation results
use crate::types::Interval;

use nalgebra::Vector3;

/// Number of columns in each row of the result arena
///
/// Batched evaluation operates on up to this many points at once; callers
/// pass `count <= N` to the evaluation kernels.
pub const N: usize = 256;

/// Dense result arena, indexed by slot id
///
/// Every slot owns a row of [`N`] values, three rows of [`N`] spatial
/// derivatives, one interval, and a Jacobian vector with one entry per free
/// variable.  Rows for constants, variables, and axis derivatives are
/// written once at build time and never touched by the evaluation kernels.
#[derive(Clone, Debug)]
pub struct Results {
    pub(crate) f: Vec<[f32; N]>,
    pub(crate) dx: Vec<[f32; N]>,
    pub(crate) dy: Vec<[f32; N]>,
    pub(crate) dz: Vec<[f32; N]>,
    pub(crate) i: Vec<Interval>,
    pub(crate) j: Vec<Vec<f32>>,
}

impl Results {
    pub(crate) fn new(slots: usize, vars: usize) -> Self {
        Self {
            f: vec![[0.0; N]; slots],
            dx: vec![[0.0; N]; slots],
            dy: vec![[0.0; N]; slots],
            dz: vec![[0.0; N]; slots],
            i: vec![0.0.into(); slots],
            j: vec![vec![0.0; vars]; slots],
        }
    }

    /// Stores `v` in every column of the given slot's value row, and in its
    /// interval slot
    ///
    /// Used for constants and variables, whose values do not vary across
    /// the batch and whose intervals are degenerate.
    pub(crate) fn fill(&mut self, v: f32, slot: usize) {
        self.f[slot] = [v; N];
        self.i[slot] = v.into();
    }

    /// Stores a constant spatial derivative for the given slot
    pub(crate) fn set_deriv(&mut self, d: Vector3<f32>, slot: usize) {
        self.dx[slot] = [d.x; N];
        self.dy[slot] = [d.y; N];
        self.dz[slot] = [d.z; N];
    }

    /// Stores the `index`-th Jacobian basis vector in the given slot
    pub(crate) fn set_gradient(&mut self, slot: usize, index: usize) {
        let j = &mut self.j[slot];
        j.iter_mut().for_each(|v| *v = 0.0);
        j[index] = 1.0;
    }
}
