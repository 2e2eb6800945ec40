//! Tape-machine evaluation of implicit surfaces
//!
//! An [`Evaluator`] flattens an expression graph into a linear instruction
//! tape over a dense result arena, then runs forward sweeps over that tape
//! to compute values, spatial derivatives, interval bounds, and per-variable
//! gradients.
//!
//! The evaluator also maintains a stack of *reduced* tapes: when a region or
//! point proves one branch of a `min`/`max` clause inactive, [`push`] and
//! friends emit a shorter tape with that branch elided, which is then reused
//! for evaluations inside the region.  [`features_at`] drives repeated
//! push/evaluate/pop cycles to enumerate the distinct one-sided gradients
//! meeting at an ambiguous point.
//!
//! [`push`]: Evaluator::push
//! [`features_at`]: Evaluator::features_at
mod clause;
mod feature;
mod result;
mod tape;

pub use clause::{Clause, ClauseId, ClauseOp};
pub use feature::{Choice, Feature};
pub use result::{Results, N};
pub use tape::{Tape, TapeType};

use crate::{
    context::{Context, Node, Op},
    types::Interval,
    var::Var,
    Error,
};

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use nalgebra::Vector3;

/// Borrowed result rows returned by [`Evaluator::derivs`]
///
/// All four slices alias the root slot of the arena and are valid for the
/// leading `count` columns of the most recent sweep.
pub struct Derivs<'a> {
    pub v: &'a [f32],
    pub dx: &'a [f32],
    pub dy: &'a [f32],
    pub dz: &'a [f32],
}

/// Evaluates a math expression as a tape machine
///
/// Each instance is single-threaded and stateful: it owns its result arena,
/// its tape stack, and the scratch arrays used during tape reduction.
/// Callers wishing to parallelize construct one evaluator per worker.
pub struct Evaluator {
    /// Stack of tapes; index 0 is the full tape built from the graph
    tapes: Vec<Tape>,
    /// Cursor into `tapes`
    tape: usize,

    result: Results,

    /// Scratch space for tape reduction, valid only during a push
    disabled: Vec<bool>,
    remap: Vec<ClauseId>,

    /// Slots assigned to the X, Y, Z axes
    x: ClauseId,
    y: ClauseId,
    z: ClauseId,

    /// Free variables, keyed by slot (ascending slot id is the Jacobian
    /// ordering) and by identity
    vars: BTreeMap<ClauseId, Var>,
    var_slots: HashMap<Var, ClauseId>,
}

impl Evaluator {
    /// Flattens the graph rooted at `root` into an evaluator
    ///
    /// `vs` supplies the initial value for every free variable in the
    /// expression; a missing variable is an error.
    pub fn new(
        ctx: &Context,
        root: Node,
        vs: &HashMap<Var, f32>,
    ) -> Result<Self, Error> {
        let flat = ctx.ordered(root)?;

        // Slots are assigned in descending order along the leaves-first
        // ordering, so that the root lands in slot 1 and every operand's
        // slot is strictly greater than the slot of the clause using it.
        let mut slots: HashMap<Node, ClauseId> =
            HashMap::with_capacity(flat.len());
        let mut id = flat.len() as ClauseId;

        let mut t = Vec::new();
        let mut constants: Vec<(ClauseId, f32)> = Vec::new();
        let mut vars = BTreeMap::new();
        let mut var_slots = HashMap::new();
        let mut axes: [ClauseId; 3] = [0; 3];

        for n in &flat {
            match ctx.get_op(*n).unwrap() {
                Op::Const(c) => constants.push((id, c.0 as f32)),
                Op::Input(vn) => {
                    let var = ctx.get_var_by_index(*vn)?;
                    match var {
                        Var::X => axes[0] = id,
                        Var::Y => axes[1] = id,
                        Var::Z => axes[2] = id,
                        Var::V(_) => {
                            let v = vs
                                .get(&var)
                                .copied()
                                .ok_or(Error::UnknownVariable(var))?;
                            constants.push((id, v));
                            vars.insert(id, var);
                            var_slots.insert(var, id);
                        }
                    }
                }
                Op::Unary(op, a) => t.push(Clause {
                    op: (*op).into(),
                    id,
                    a: slots[a],
                    b: 0,
                }),
                Op::Binary(op, a, b) => t.push(Clause {
                    op: (*op).into(),
                    id,
                    a: slots[a],
                    b: slots[b],
                }),
            }
            slots.insert(*n, id);
            id -= 1;
        }
        debug_assert_eq!(id, 0);
        debug_assert_eq!(slots[&root], 1);

        // Clauses were emitted leaves-first; the tape stores them root-first
        // and is evaluated from the back.
        t.reverse();

        // Make sure that X, Y, Z have slots even if the expression never
        // references them, so that points can always be loaded.
        let mut slot_count = flat.len() as ClauseId;
        for a in axes.iter_mut() {
            if *a == 0 {
                slot_count += 1;
                *a = slot_count;
            }
        }

        let mut result = Results::new(slot_count as usize + 1, vars.len());
        for (slot, v) in &constants {
            result.fill(*v, *slot as usize);
        }

        // Axis derivatives never change
        result.set_deriv(Vector3::x(), axes[0] as usize);
        result.set_deriv(Vector3::y(), axes[1] as usize);
        result.set_deriv(Vector3::z(), axes[2] as usize);

        // Neither does the Jacobian basis
        for (index, (slot, _)) in vars.iter().enumerate() {
            result.set_gradient(*slot as usize, index);
        }

        let mut base = Tape::with_capacity(TapeType::Original, 0);
        base.root = slots[&root];
        base.t = t;

        Ok(Self {
            tapes: vec![base],
            tape: 0,
            result,
            disabled: vec![false; slot_count as usize + 1],
            remap: vec![0; slot_count as usize + 1],
            x: axes[0],
            y: axes[1],
            z: axes[2],
            vars,
            var_slots,
        })
    }

    ////////////////////////////////////////////////////////////////////////
    // Loading inputs

    /// Stores the given position in column `index` of the value rows
    pub fn set(&mut self, p: Vector3<f32>, index: usize) {
        self.result.f[self.x as usize][index] = p.x;
        self.result.f[self.y as usize][index] = p.y;
        self.result.f[self.z as usize][index] = p.z;
    }

    /// Stores the given region in the axis interval slots
    fn set_region(&mut self, lower: Vector3<f32>, upper: Vector3<f32>) {
        self.result.i[self.x as usize] = Interval::new(lower.x, upper.x);
        self.result.i[self.y as usize] = Interval::new(lower.y, upper.y);
        self.result.i[self.z as usize] = Interval::new(lower.z, upper.z);
    }

    ////////////////////////////////////////////////////////////////////////
    // Single-shot evaluation

    /// Evaluates the field at the given position
    pub fn eval(&mut self, p: Vector3<f32>) -> f32 {
        self.set(p, 0);
        self.values(1)[0]
    }

    /// Bounds the field over the given axis-aligned region
    pub fn eval_interval(
        &mut self,
        lower: Vector3<f32>,
        upper: Vector3<f32>,
    ) -> Interval {
        self.set_region(lower, upper);
        self.interval()
    }

    /// Evaluates at `p` on the best reduced tape which is valid there
    ///
    /// Walks from the cursor toward the base of the stack, stopping at the
    /// first interval-reduced tape whose region contains `p` (or at the base
    /// tape).  The cursor is restored before returning.
    pub fn base_eval(&mut self, p: Vector3<f32>) -> f32 {
        let prev = self.tape;
        while self.tape != 0 {
            let t = &self.tapes[self.tape];
            if t.tag == TapeType::Interval && t.contains(p) {
                break;
            }
            self.tape -= 1;
        }
        let out = self.eval(p);
        self.tape = prev;
        out
    }

    ////////////////////////////////////////////////////////////////////////
    // Forward kernels

    /// Evaluates values over the leading `count` columns
    ///
    /// Returns the root slot's value row.  Callers are responsible for
    /// having loaded positions with [`set`](Self::set).
    pub fn values(&mut self, count: usize) -> &[f32] {
        debug_assert!(count <= N);
        for k in (0..self.tapes[self.tape].t.len()).rev() {
            let c = self.tapes[self.tape].t[k];
            let (id, a, b) = (c.id as usize, c.a as usize, c.b as usize);
            for j in 0..count {
                let av = self.result.f[a][j];
                let bv = self.result.f[b][j];
                self.result.f[id][j] = value_op(c.op, av, bv);
            }
        }
        let root = self.tapes[self.tape].root as usize;
        &self.result.f[root][..count]
    }

    /// Evaluates values and spatial derivatives over the leading `count`
    /// columns
    pub fn derivs(&mut self, count: usize) -> Derivs {
        self.values(count);

        for k in (0..self.tapes[self.tape].t.len()).rev() {
            let c = self.tapes[self.tape].t[k];
            let (id, a, b) = (c.id as usize, c.a as usize, c.b as usize);
            for j in 0..count {
                let av = self.result.f[a][j];
                let bv = self.result.f[b][j];
                let ov = self.result.f[id][j];

                let adx = self.result.dx[a][j];
                let bdx = self.result.dx[b][j];
                self.result.dx[id][j] = deriv_op(c.op, av, bv, ov, adx, bdx);

                let ady = self.result.dy[a][j];
                let bdy = self.result.dy[b][j];
                self.result.dy[id][j] = deriv_op(c.op, av, bv, ov, ady, bdy);

                let adz = self.result.dz[a][j];
                let bdz = self.result.dz[b][j];
                self.result.dz[id][j] = deriv_op(c.op, av, bv, ov, adz, bdz);
            }
        }

        let root = self.tapes[self.tape].root as usize;
        Derivs {
            v: &self.result.f[root][..count],
            dx: &self.result.dx[root][..count],
            dy: &self.result.dy[root][..count],
            dz: &self.result.dz[root][..count],
        }
    }

    /// Evaluates interval bounds over the active tape
    ///
    /// Callers are responsible for having loaded a region, e.g. through
    /// [`eval_interval`](Self::eval_interval).
    pub fn interval(&mut self) -> Interval {
        for k in (0..self.tapes[self.tape].t.len()).rev() {
            let c = self.tapes[self.tape].t[k];
            let (id, a, b) = (c.id as usize, c.a as usize, c.b as usize);
            let ia = self.result.i[a];
            let ib = self.result.i[b];
            self.result.i[id] = interval_op(c.op, ia, ib);
        }
        self.result.i[self.tapes[self.tape].root as usize]
    }

    /// Computes the gradient of the field with respect to every free
    /// variable, at the given position
    pub fn gradient(&mut self, p: Vector3<f32>) -> HashMap<Var, f32> {
        self.set(p, 0);
        self.values(1);

        for k in (0..self.tapes[self.tape].t.len()).rev() {
            let c = self.tapes[self.tape].t[k];
            let (id, a, b) = (c.id as usize, c.a as usize, c.b as usize);
            let av = self.result.f[a][0];
            let bv = self.result.f[b][0];
            let ov = self.result.f[id][0];
            for v in 0..self.vars.len() {
                let aj = self.result.j[a][v];
                let bj = self.result.j[b][v];
                self.result.j[id][v] =
                    jacobian_op(c.op, av, bv, ov, aj, bj);
            }
        }

        let root = self.tapes[self.tape].root as usize;
        self.vars
            .values()
            .enumerate()
            .map(|(index, var)| (*var, self.result.j[root][index]))
            .collect()
    }

    ////////////////////////////////////////////////////////////////////////
    // Tape stack

    /// Pushes a reduced tape, eliding `min`/`max` branches proven inactive
    /// by the most recent interval evaluation
    ///
    /// Must be called after a fresh [`interval`](Self::interval) sweep on
    /// the current tape; the new tape records the driving region and is
    /// valid for any point inside it.
    pub fn push(&mut self) {
        self.disabled.fill(true);
        self.remap.fill(0);
        let root = self.tapes[self.tape].root as usize;
        self.disabled[root] = false;

        for k in 0..self.tapes[self.tape].t.len() {
            let c = self.tapes[self.tape].t[k];
            let (id, a, b) = (c.id as usize, c.a as usize, c.b as usize);
            if self.disabled[id] {
                continue;
            }
            // For min and max operations, we may only need to keep one
            // branch active if it is decisively above or below the other.
            match c.op {
                ClauseOp::Max => {
                    if self.result.i[a].lower() > self.result.i[b].upper() {
                        self.disabled[a] = false;
                        self.remap[id] = c.a;
                    } else if self.result.i[b].lower()
                        > self.result.i[a].upper()
                    {
                        self.disabled[b] = false;
                        self.remap[id] = c.b;
                    }
                }
                ClauseOp::Min => {
                    if self.result.i[a].lower() > self.result.i[b].upper() {
                        self.disabled[b] = false;
                        self.remap[id] = c.b;
                    } else if self.result.i[b].lower()
                        > self.result.i[a].upper()
                    {
                        self.disabled[a] = false;
                        self.remap[id] = c.a;
                    }
                }
                _ => (),
            }
            if self.remap[id] == 0 {
                self.disabled[a] = false;
                self.disabled[b] = false;
            } else {
                self.disabled[id] = true;
            }
        }

        self.push_tape(TapeType::Interval);

        let x = self.result.i[self.x as usize];
        let y = self.result.i[self.y as usize];
        let z = self.result.i[self.z as usize];
        let t = &mut self.tapes[self.tape];
        t.x = x;
        t.y = y;
        t.z = z;
    }

    /// Pushes a tape consistent with the given feature's branch choices
    ///
    /// Walks the current tape, collapsing each ambiguous `min`/`max` clause
    /// named by the feature to its chosen branch.  Returns a minimized copy
    /// of the feature: choices whose clauses were already elided by earlier
    /// collapses are consumed but not retained.
    ///
    /// # Panics
    /// Panics if any of the feature's choices goes unconsumed by the walk
    /// (which indicates that it was built against a different tape).
    pub fn push_feature(&mut self, f: &Feature) -> Feature {
        self.disabled.fill(true);
        self.remap.fill(0);
        let root = self.tapes[self.tape].root as usize;
        self.disabled[root] = false;

        let mut out = Feature::default();
        out.deriv = f.deriv;

        let choices = f.choices();
        let mut next = 0;

        for k in 0..self.tapes[self.tape].t.len() {
            let c = self.tapes[self.tape].t[k];
            let (id, a, b) = (c.id as usize, c.a as usize, c.b as usize);

            // The choice stream advances whenever an ambiguous clause
            // matches its front, whether or not the clause is still live.
            let matched = c.op.is_choice()
                && (c.a == c.b
                    || self.result.f[a][0] == self.result.f[b][0])
                && next < choices.len()
                && choices[next].id == c.id;

            if !self.disabled[id] {
                if matched {
                    let ch = choices[next];
                    if f.has_epsilon(c.id) {
                        out.push_raw(ch, f.epsilon(c.id));
                    } else {
                        out.push_choice(ch);
                    }
                    if ch.choice == 0 {
                        self.disabled[a] = false;
                        self.remap[id] = c.a;
                    } else {
                        self.disabled[b] = false;
                        self.remap[id] = c.b;
                    }
                }
                if self.remap[id] == 0 {
                    self.disabled[a] = false;
                    self.disabled[b] = false;
                } else {
                    self.disabled[id] = true;
                }
            }

            if matched {
                next += 1;
            }
        }
        assert_eq!(
            next,
            choices.len(),
            "feature choices were not fully consumed"
        );

        self.push_tape(TapeType::Feature);
        out
    }

    /// Pushes a tape specialized to the given position
    ///
    /// Performs the same collapse as [`push`](Self::push), but comparing
    /// point values instead of intervals (ties keep both branches).  This
    /// pins the tape to `p` so that feature enumeration can inspect
    /// per-branch gradients.
    pub fn specialize(&mut self, p: Vector3<f32>) {
        self.eval(p);

        self.disabled.fill(true);
        self.remap.fill(0);
        let root = self.tapes[self.tape].root as usize;
        self.disabled[root] = false;

        for k in 0..self.tapes[self.tape].t.len() {
            let c = self.tapes[self.tape].t[k];
            let (id, a, b) = (c.id as usize, c.a as usize, c.b as usize);
            if self.disabled[id] {
                continue;
            }
            match c.op {
                ClauseOp::Max => {
                    if self.result.f[a][0] > self.result.f[b][0] {
                        self.disabled[a] = false;
                        self.remap[id] = c.a;
                    } else if self.result.f[b][0] > self.result.f[a][0] {
                        self.disabled[b] = false;
                        self.remap[id] = c.b;
                    }
                }
                ClauseOp::Min => {
                    if self.result.f[a][0] > self.result.f[b][0] {
                        self.disabled[b] = false;
                        self.remap[id] = c.b;
                    } else if self.result.f[b][0] > self.result.f[a][0] {
                        self.disabled[a] = false;
                        self.remap[id] = c.a;
                    }
                }
                _ => (),
            }
            if self.remap[id] == 0 {
                self.disabled[a] = false;
                self.disabled[b] = false;
            } else {
                self.disabled[id] = true;
            }
        }

        self.push_tape(TapeType::Specialized);
    }

    /// Materializes the next tape on the stack from `disabled` and `remap`
    ///
    /// Tapes are allocated lazily with capacity reserved to the base tape's
    /// length, then reused on subsequent pushes to the same depth.
    fn push_tape(&mut self, tag: TapeType) {
        let prev = self.tape;
        self.tape += 1;
        if self.tape == self.tapes.len() {
            let cap = self.tapes[0].t.len();
            self.tapes.push(Tape::with_capacity(tag, cap));
        }

        let (head, tail) = self.tapes.split_at_mut(self.tape);
        let prev_tape = &head[prev];
        let next = &mut tail[0];
        next.t.clear();
        next.tag = tag;

        let remap = &self.remap;
        let disabled = &self.disabled;
        let chase = |mut i: ClauseId| {
            while remap[i as usize] != 0 {
                i = remap[i as usize];
            }
            i
        };

        for c in &prev_tape.t {
            if !disabled[c.id as usize] {
                next.t.push(Clause {
                    op: c.op,
                    id: c.id,
                    a: chase(c.a),
                    b: chase(c.b),
                });
            }
        }
        next.root = chase(prev_tape.root);

        debug_assert!(next.t.len() <= prev_tape.t.len());
    }

    /// Drops the current tape, returning to the one below
    ///
    /// The vacated tape's storage is retained for reuse.
    ///
    /// # Panics
    /// Panics when called with no pushed tape.
    pub fn pop(&mut self) {
        assert!(self.tape > 0, "cannot pop the base tape");
        self.tape -= 1;
    }

    /// Ratio of the current tape's length to the base tape's length
    pub fn utilization(&self) -> f64 {
        self.tapes[self.tape].t.len() as f64 / self.tapes[0].t.len() as f64
    }

    /// Returns the number of clauses in the current tape
    pub fn tape_len(&self) -> usize {
        self.tapes[self.tape].t.len()
    }

    /// Returns the type tag of the current tape
    pub fn tape_type(&self) -> TapeType {
        self.tapes[self.tape].tag
    }

    ////////////////////////////////////////////////////////////////////////
    // Ambiguity and features

    /// Checks whether any `min`/`max` clause ties in column 0
    ///
    /// Reads the most recent value sweep; callers are responsible for
    /// having evaluated at the point of interest.
    pub fn is_ambiguous(&self) -> bool {
        self.tapes[self.tape].t.iter().any(|c| {
            c.op.is_choice()
                && self.result.f[c.a as usize][0]
                    == self.result.f[c.b as usize][0]
        })
    }

    /// Evaluates at `p`, then checks for `min`/`max` ties
    pub fn is_ambiguous_at(&mut self, p: Vector3<f32>) -> bool {
        self.eval(p);
        self.is_ambiguous()
    }

    /// Returns the set of columns in `0..count` where any `min`/`max`
    /// clause ties
    ///
    /// Reads the most recent value sweep over those columns.
    pub fn get_ambiguous(&self, count: usize) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        for c in &self.tapes[self.tape].t {
            if c.op.is_choice() {
                for j in 0..count {
                    if self.result.f[c.a as usize][j]
                        == self.result.f[c.b as usize][j]
                    {
                        out.insert(j);
                    }
                }
            }
        }
        out
    }

    /// Enumerates the distinct one-sided gradients meeting at `p`
    ///
    /// Each returned [`Feature`] records one consistent assignment of
    /// branches at the ambiguous `min`/`max` clauses, along with the
    /// gradient implied by those branches.  At least one feature is always
    /// returned; features are deduplicated by their choice set.
    pub fn features_at(&mut self, p: Vector3<f32>) -> Vec<Feature> {
        let mut todo = VecDeque::from([Feature::default()]);
        let mut done: Vec<Feature> = Vec::new();
        let mut seen: BTreeSet<Vec<Choice>> = BTreeSet::new();

        self.specialize(p);

        while let Some(f) = todo.pop_front() {
            // Push into this feature's choices (keeping the minimized
            // version), then evaluate: the value is unchanged, but the
            // derivatives depend on which branches were taken.
            let f = self.push_feature(&f);

            let ds = self.derivs(1);
            let deriv = Vector3::new(ds.dx[0], ds.dy[0], ds.dz[0]);

            // Scan bottom-up for the first ambiguous choice clause and
            // spawn successor features for its branches.
            let mut ambiguous = false;
            for k in (0..self.tapes[self.tape].t.len()).rev() {
                if ambiguous {
                    break;
                }
                let c = self.tapes[self.tape].t[k];
                if !c.op.is_choice() {
                    continue;
                }
                let (a, b) = (c.a as usize, c.b as usize);
                if c.a == c.b {
                    // A prior collapse left both operands aliased; there
                    // is only one branch to take.
                    let mut fa = f.clone();
                    fa.push_choice(Choice {
                        id: c.id,
                        choice: 0,
                    });
                    todo.push_back(fa);
                    ambiguous = true;
                } else if self.result.f[a][0] == self.result.f[b][0] {
                    let lhs = Vector3::new(
                        self.result.dx[a][0],
                        self.result.dy[a][0],
                        self.result.dz[a][0],
                    );
                    let rhs = Vector3::new(
                        self.result.dx[b][0],
                        self.result.dy[b][0],
                        self.result.dz[b][0],
                    );
                    // Moving along epsilon must keep the chosen branch
                    // selected.
                    let epsilon = if c.op == ClauseOp::Min {
                        rhs - lhs
                    } else {
                        lhs - rhs
                    };

                    let mut fa = f.clone();
                    if fa.push(
                        epsilon,
                        Choice {
                            id: c.id,
                            choice: 0,
                        },
                    ) {
                        ambiguous = true;
                        todo.push_back(fa);
                    }

                    let mut fb = f.clone();
                    if fb.push(
                        -epsilon,
                        Choice {
                            id: c.id,
                            choice: 1,
                        },
                    ) {
                        ambiguous = true;
                        todo.push_back(fb);
                    }
                }
            }

            if !ambiguous {
                let mut f = f;
                f.deriv = deriv;
                if seen.insert(f.choices().to_vec()) {
                    done.push(f);
                }
            }
            self.pop(); // push_feature
        }
        self.pop(); // specialize

        assert!(!done.is_empty());
        done
    }

    /// Classifies whether `p` is inside the surface
    ///
    /// Negative values are inside and positive values are outside.  On the
    /// zero isosurface itself, the point counts as inside if some
    /// infinitesimal motion can produce a negative value, which is decided
    /// through the gradient (and through feature enumeration when several
    /// `min`/`max` branches tie at `p`).
    pub fn is_inside(&mut self, p: Vector3<f32>) -> bool {
        self.set(p, 0);
        let ds = self.derivs(1);
        let v = ds.v[0];
        let deriv = Vector3::new(ds.dx[0], ds.dy[0], ds.dz[0]);

        // Unambiguous cases
        if v < 0.0 {
            return true;
        } else if v > 0.0 {
            return false;
        }

        // Special case to save time on non-ambiguous points: a nonzero
        // gradient produces both positive and negative values nearby
        // (same as the single-feature case below).
        if !self.is_ambiguous() {
            return deriv != Vector3::zeros();
        }

        let fs = self.features_at(p);

        // If there's only a single feature, we can get both positive and
        // negative values out if it's got a non-zero gradient
        if fs.len() == 1 {
            return fs[0].deriv.norm() > 0.0;
        }

        // Otherwise, check each feature.  The only case where we're outside
        // the surface is if all features and their normals only ever
        // produce positive values: for every direction we can move from p,
        // the field grows.
        let mut pos = false;
        let mut neg = false;
        for f in &fs {
            pos |= f.is_compatible(f.deriv);
            neg |= f.is_compatible(-f.deriv);
        }
        !(pos && !neg)
    }

    ////////////////////////////////////////////////////////////////////////
    // Variable state

    /// Writes a new value for the given variable
    ///
    /// Unknown variables are ignored.
    pub fn set_var(&mut self, var: Var, value: f32) {
        if let Some(&slot) = self.var_slots.get(&var) {
            self.result.fill(value, slot as usize);
        }
    }

    /// Reads back the current value of every free variable
    pub fn var_values(&self) -> HashMap<Var, f32> {
        self.vars
            .iter()
            .map(|(slot, var)| (*var, self.result.f[*slot as usize][0]))
            .collect()
    }

    /// Applies a batch update of variable values
    ///
    /// Returns whether any value actually changed, so that outer
    /// optimization loops can skip re-evaluation.  Every variable of this
    /// evaluator must be present in the map.
    pub fn update_vars(
        &mut self,
        values: &HashMap<Var, f32>,
    ) -> Result<bool, Error> {
        let result = &mut self.result;
        let mut changed = false;
        for (&slot, var) in &self.vars {
            let v = *values.get(var).ok_or(Error::UnknownVariable(*var))?;
            if v != result.f[slot as usize][0] {
                result.fill(v, slot as usize);
                changed = true;
            }
        }
        Ok(changed)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Per-clause evaluation rules

fn value_op(op: ClauseOp, a: f32, b: f32) -> f32 {
    match op {
        ClauseOp::Add => a + b,
        ClauseOp::Sub => a - b,
        ClauseOp::Mul => a * b,
        ClauseOp::Div => a / b,
        ClauseOp::Min => a.min(b),
        ClauseOp::Max => a.max(b),
        ClauseOp::Atan2 => a.atan2(b),
        ClauseOp::Pow => a.powf(b),
        ClauseOp::NthRoot => a.powf(1.0 / b),
        ClauseOp::Mod => a.rem_euclid(b),
        ClauseOp::NanFill => {
            if a.is_nan() {
                b
            } else {
                a
            }
        }

        ClauseOp::Neg => -a,
        ClauseOp::Square => a * a,
        ClauseOp::Sqrt => a.sqrt(),
        ClauseOp::Sin => a.sin(),
        ClauseOp::Cos => a.cos(),
        ClauseOp::Tan => a.tan(),
        ClauseOp::Asin => a.asin(),
        ClauseOp::Acos => a.acos(),
        ClauseOp::Atan => a.atan(),
        ClauseOp::Exp => a.exp(),
        ClauseOp::ConstVar => a,
    }
}

/// One derivative component: `av`/`bv`/`ov` are the operand and output
/// values, `ad`/`bd` the operand derivatives along the same direction
fn deriv_op(op: ClauseOp, av: f32, bv: f32, ov: f32, ad: f32, bd: f32) -> f32 {
    match op {
        ClauseOp::Add => ad + bd,
        ClauseOp::Sub => ad - bd,
        ClauseOp::Mul => av * bd + ad * bv, // Product rule
        ClauseOp::Div => (bv * ad - av * bd) / bv.powi(2),
        ClauseOp::Min => {
            if av < bv {
                ad
            } else {
                bd
            }
        }
        ClauseOp::Max => {
            if av < bv {
                bd
            } else {
                ad
            }
        }
        ClauseOp::Atan2 => (ad * bv - av * bd) / (av.powi(2) + bv.powi(2)),
        ClauseOp::Pow => {
            // The full derivative would include av^bv * ln(av) * bd, but
            // ln(av) is often NaN and bd is always zero (the exponent is
            // constant), so that term is dropped.
            av.powf(bv - 1.0) * bv * ad
        }
        ClauseOp::NthRoot => {
            let m = 1.0 / bv;
            av.powf(m - 1.0) * m * ad
        }
        // Not quite how the partial derivative of mod works, but close
        // enough for rendering normals away from the step points.
        ClauseOp::Mod => ad,
        ClauseOp::NanFill => {
            if av.is_nan() {
                bd
            } else {
                ad
            }
        }

        ClauseOp::Neg => -ad,
        ClauseOp::Square => 2.0 * av * ad,
        ClauseOp::Sqrt => {
            if av < 0.0 {
                0.0
            } else {
                ad / (2.0 * ov)
            }
        }
        ClauseOp::Sin => ad * av.cos(),
        ClauseOp::Cos => ad * -av.sin(),
        ClauseOp::Tan => ad / av.cos().powi(2),
        ClauseOp::Asin => ad / (1.0 - av.powi(2)).sqrt(),
        ClauseOp::Acos => ad / -(1.0 - av.powi(2)).sqrt(),
        ClauseOp::Atan => ad / (av.powi(2) + 1.0),
        ClauseOp::Exp => av.exp() * ad,
        ClauseOp::ConstVar => ad,
    }
}

/// One Jacobian component; identical to [`deriv_op`] except that
/// `ConstVar` freezes its subtree's dependence on variables
fn jacobian_op(
    op: ClauseOp,
    av: f32,
    bv: f32,
    ov: f32,
    aj: f32,
    bj: f32,
) -> f32 {
    match op {
        ClauseOp::ConstVar => 0.0,
        _ => deriv_op(op, av, bv, ov, aj, bj),
    }
}

fn interval_op(op: ClauseOp, a: Interval, b: Interval) -> Interval {
    match op {
        ClauseOp::Add => a + b,
        ClauseOp::Sub => a - b,
        ClauseOp::Mul => a * b,
        ClauseOp::Div => a / b,
        ClauseOp::Min => a.min(b),
        ClauseOp::Max => a.max(b),
        ClauseOp::Atan2 => a.atan2(b),
        ClauseOp::Pow => a.pow(b.lower()),
        ClauseOp::NthRoot => a.nth_root(b.lower()),
        ClauseOp::Mod => a.modulo(b),
        ClauseOp::NanFill => a.nanfill(b),

        ClauseOp::Neg => -a,
        ClauseOp::Square => a.square(),
        ClauseOp::Sqrt => a.sqrt(),
        ClauseOp::Sin => a.sin(),
        ClauseOp::Cos => a.cos(),
        ClauseOp::Tan => a.tan(),
        ClauseOp::Asin => a.asin(),
        ClauseOp::Acos => a.acos(),
        ClauseOp::Atan => a.atan(),
        ClauseOp::Exp => a.exp(),
        ClauseOp::ConstVar => a,
    }
}
