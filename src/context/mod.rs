//! Infrastructure for representing math expressions as deduplicated graphs
//!
//! A [`Context`] is an arena for unique (deduplicated) math expressions,
//! which are represented as [`Node`] handles.  Each `Node` is specific to a
//! particular context.  `Node` objects are flattened into instruction tapes
//! by an [`Evaluator`](crate::Evaluator).
mod op;

pub use op::{BinaryOpcode, Op, UnaryOpcode};

use crate::{var::Var, Error};

use std::collections::{BTreeMap, HashMap, HashSet};

use ordered_float::OrderedFloat;

/// Handle to an operation stored in a [`Context`]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Node(usize);

/// Handle to a variable stored in a [`Context`]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct VarNode(usize);

/// Interning store: each distinct value is kept once, addressed by its
/// insertion index
///
/// This is all the container machinery the context needs: interning on
/// insert, lookup by index, and removal of the newest entry (used to
/// discard scratch nodes after constant folding).
#[derive(Debug)]
struct Arena<V> {
    items: Vec<V>,
    lookup: HashMap<V, usize>,
}

impl<V> Default for Arena<V> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            lookup: HashMap::new(),
        }
    }
}

impl<V: Clone + Eq + std::hash::Hash> Arena<V> {
    /// Stores `v` if it is new, returning its index either way
    fn intern(&mut self, v: V) -> usize {
        *self.lookup.entry(v.clone()).or_insert_with(|| {
            self.items.push(v);
            self.items.len() - 1
        })
    }

    fn get(&self, i: usize) -> Option<&V> {
        self.items.get(i)
    }

    /// Drops the newest entry, invalidating its index
    ///
    /// Only sound when that entry was freshly interned and its index was
    /// never handed out.
    fn pop_newest(&mut self) -> Result<(), Error> {
        let v = self.items.pop().ok_or(Error::EmptyContext)?;
        self.lookup.remove(&v);
        Ok(())
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn clear(&mut self) {
        self.items.clear();
        self.lookup.clear();
    }
}

/// A `Context` holds a set of deduplicated constants, variables, and
/// operations.
///
/// It should be used like an arena allocator: it grows over time, then frees
/// all of its contents when dropped.
#[derive(Debug, Default)]
pub struct Context {
    ops: Arena<Op>,
    vars: Arena<Var>,
}

impl Context {
    /// Build a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the context
    ///
    /// All [`Node`] and [`VarNode`] handles from this context are
    /// invalidated.
    pub fn clear(&mut self) {
        self.ops.clear();
        self.vars.clear();
    }

    /// Returns the number of [`Op`] nodes in the context
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Checks whether the context is empty
    pub fn is_empty(&self) -> bool {
        self.ops.len() == 0
    }

    /// Checks whether the given [`Node`] is valid in this context
    fn check_node(&self, node: Node) -> Result<(), Error> {
        self.get_op(node).ok_or(Error::BadNode).map(|_| ())
    }

    /// Erases the most recently added node from the tree.
    ///
    /// A few caveats apply, so this must be used with caution:
    /// - Existing handles to the node will be invalidated
    /// - The most recently added node must be unique
    ///
    /// In practice, this is only used to delete temporary operation nodes
    /// during constant folding.  Such nodes have no handles (because they are
    /// never returned) and are guaranteed to be unique (because we never
    /// store them persistently).
    fn pop(&mut self) -> Result<(), Error> {
        self.ops.pop_newest()
    }

    /// Looks up the constant associated with the given node.
    ///
    /// If the node is invalid for this tree, returns an error; if the node is
    /// not a constant, returns `Ok(None)`.
    pub fn const_value(&self, n: Node) -> Result<Option<f64>, Error> {
        match self.get_op(n) {
            Some(Op::Const(c)) => Ok(Some(c.0)),
            Some(_) => Ok(None),
            _ => Err(Error::BadNode),
        }
    }

    /// Looks up the [`Var`] associated with the given node.
    ///
    /// If the node is invalid for this tree, returns an error; if the node is
    /// not an `Op::Input`, returns `Ok(None)`.
    pub fn var_name(&self, n: Node) -> Result<Option<Var>, Error> {
        match self.get_op(n) {
            Some(Op::Input(c)) => self.get_var_by_index(*c).map(Some),
            Some(_) => Ok(None),
            _ => Err(Error::BadNode),
        }
    }

    /// Looks up the [`Var`] associated with the given [`VarNode`]
    pub fn get_var_by_index(&self, n: VarNode) -> Result<Var, Error> {
        self.vars.get(n.0).copied().ok_or(Error::BadVar)
    }

    ////////////////////////////////////////////////////////////////////////
    // Primitives

    /// Constructs or finds a node for the given variable
    pub fn var(&mut self, v: Var) -> Node {
        let vn = VarNode(self.vars.intern(v));
        Node(self.ops.intern(Op::Input(vn)))
    }

    /// Constructs or finds the variable node "X"
    /// ```
    /// # use isofield::Context;
    /// let mut ctx = Context::new();
    /// let x = ctx.x();
    /// let v = ctx.eval_xyz(x, 1.0, 0.0, 0.0).unwrap();
    /// assert_eq!(v, 1.0);
    /// ```
    pub fn x(&mut self) -> Node {
        self.var(Var::X)
    }

    /// Constructs or finds the variable node "Y"
    pub fn y(&mut self) -> Node {
        self.var(Var::Y)
    }

    /// Constructs or finds the variable node "Z"
    pub fn z(&mut self) -> Node {
        self.var(Var::Z)
    }

    /// Returns a 3-element array of `X`, `Y`, `Z` nodes
    pub fn axes(&mut self) -> [Node; 3] {
        [self.x(), self.y(), self.z()]
    }

    /// Returns a node representing the given constant value.
    /// ```
    /// # let mut ctx = isofield::Context::new();
    /// let v = ctx.constant(3.0);
    /// assert_eq!(ctx.eval_xyz(v, 0.0, 0.0, 0.0).unwrap(), 3.0);
    /// ```
    pub fn constant(&mut self, f: f64) -> Node {
        Node(self.ops.intern(Op::Const(OrderedFloat(f))))
    }

    ////////////////////////////////////////////////////////////////////////
    // Helper functions to create nodes with constant folding

    /// Find or create a [Node] for the given unary operation, with constant
    /// folding.
    fn op_unary(&mut self, a: Node, op: UnaryOpcode) -> Result<Node, Error> {
        let op_a = *self.get_op(a).ok_or(Error::BadNode)?;
        let n = Node(self.ops.intern(Op::Unary(op, a)));
        let out = if matches!(op_a, Op::Const(_)) {
            let v = self.eval(n, &BTreeMap::new())?;
            self.pop().unwrap(); // removes `n`
            self.constant(v)
        } else {
            n
        };
        Ok(out)
    }

    /// Find or create a [Node] for the given binary operation, with constant
    /// folding.
    fn op_binary(
        &mut self,
        a: Node,
        b: Node,
        op: BinaryOpcode,
    ) -> Result<Node, Error> {
        let op_a = *self.get_op(a).ok_or(Error::BadNode)?;
        let op_b = *self.get_op(b).ok_or(Error::BadNode)?;

        // This call to `intern` should always insert the node, because we
        // don't permanently store operations in the tree that could be
        // constant-folded (indeed, we pop the node right afterwards)
        let n = Node(self.ops.intern(Op::Binary(op, a, b)));
        let out = if matches!((op_a, op_b), (Op::Const(_), Op::Const(_))) {
            let v = self.eval(n, &BTreeMap::new())?;
            self.pop().unwrap(); // removes `n`
            self.constant(v)
        } else {
            n
        };
        Ok(out)
    }

    /// Find or create a [Node] for the given commutative operation, with
    /// constant folding; deduplication is encouraged by sorting `a` and `b`.
    fn op_binary_commutative(
        &mut self,
        a: Node,
        b: Node,
        op: BinaryOpcode,
    ) -> Result<Node, Error> {
        self.op_binary(a.min(b), a.max(b), op)
    }

    /// Builds an addition node
    /// ```
    /// # let mut ctx = isofield::Context::new();
    /// let x = ctx.x();
    /// let op = ctx.add(x, 1.0).unwrap();
    /// let v = ctx.eval_xyz(op, 1.0, 0.0, 0.0).unwrap();
    /// assert_eq!(v, 2.0);
    /// ```
    pub fn add<A: IntoNode, B: IntoNode>(
        &mut self,
        a: A,
        b: B,
    ) -> Result<Node, Error> {
        let a: Node = a.into_node(self)?;
        let b: Node = b.into_node(self)?;
        match (self.const_value(a)?, self.const_value(b)?) {
            (Some(zero), _) if zero == 0.0 => Ok(b),
            (_, Some(zero)) if zero == 0.0 => Ok(a),
            _ => self.op_binary_commutative(a, b, BinaryOpcode::Add),
        }
    }

    /// Builds a multiplication node
    /// ```
    /// # let mut ctx = isofield::Context::new();
    /// let x = ctx.x();
    /// let op = ctx.mul(x, 5.0).unwrap();
    /// let v = ctx.eval_xyz(op, 2.0, 0.0, 0.0).unwrap();
    /// assert_eq!(v, 10.0);
    /// ```
    pub fn mul<A: IntoNode, B: IntoNode>(
        &mut self,
        a: A,
        b: B,
    ) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        let b = b.into_node(self)?;
        if a == b {
            self.square(a)
        } else {
            match (self.const_value(a)?, self.const_value(b)?) {
                (Some(one), _) if one == 1.0 => Ok(b),
                (_, Some(one)) if one == 1.0 => Ok(a),
                _ => self.op_binary_commutative(a, b, BinaryOpcode::Mul),
            }
        }
    }

    /// Builds a `min` node
    /// ```
    /// # let mut ctx = isofield::Context::new();
    /// let x = ctx.x();
    /// let op = ctx.min(x, 5.0).unwrap();
    /// let v = ctx.eval_xyz(op, 2.0, 0.0, 0.0).unwrap();
    /// assert_eq!(v, 2.0);
    /// ```
    pub fn min<A: IntoNode, B: IntoNode>(
        &mut self,
        a: A,
        b: B,
    ) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        let b = b.into_node(self)?;
        if a == b {
            Ok(a)
        } else {
            self.op_binary_commutative(a, b, BinaryOpcode::Min)
        }
    }

    /// Builds a `max` node
    /// ```
    /// # let mut ctx = isofield::Context::new();
    /// let x = ctx.x();
    /// let op = ctx.max(x, 5.0).unwrap();
    /// let v = ctx.eval_xyz(op, 2.0, 0.0, 0.0).unwrap();
    /// assert_eq!(v, 5.0);
    /// ```
    pub fn max<A: IntoNode, B: IntoNode>(
        &mut self,
        a: A,
        b: B,
    ) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        let b = b.into_node(self)?;
        if a == b {
            Ok(a)
        } else {
            self.op_binary_commutative(a, b, BinaryOpcode::Max)
        }
    }

    /// Builds a node which performs subtraction.
    /// ```
    /// # let mut ctx = isofield::Context::new();
    /// let x = ctx.x();
    /// let y = ctx.y();
    /// let op = ctx.sub(x, y).unwrap();
    /// let v = ctx.eval_xyz(op, 3.0, 2.0, 0.0).unwrap();
    /// assert_eq!(v, 1.0);
    /// ```
    pub fn sub<A: IntoNode, B: IntoNode>(
        &mut self,
        a: A,
        b: B,
    ) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        let b = b.into_node(self)?;

        match (self.const_value(a)?, self.const_value(b)?) {
            (Some(zero), _) if zero == 0.0 => self.neg(b),
            (_, Some(zero)) if zero == 0.0 => Ok(a),
            _ => self.op_binary(a, b, BinaryOpcode::Sub),
        }
    }

    /// Builds a node which performs division.
    /// ```
    /// # let mut ctx = isofield::Context::new();
    /// let x = ctx.x();
    /// let y = ctx.y();
    /// let op = ctx.div(x, y).unwrap();
    /// let v = ctx.eval_xyz(op, 3.0, 2.0, 0.0).unwrap();
    /// assert_eq!(v, 1.5);
    /// ```
    pub fn div<A: IntoNode, B: IntoNode>(
        &mut self,
        a: A,
        b: B,
    ) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        let b = b.into_node(self)?;

        match (self.const_value(a)?, self.const_value(b)?) {
            (Some(zero), _) if zero == 0.0 => Ok(a),
            (_, Some(one)) if one == 1.0 => Ok(a),
            _ => self.op_binary(a, b, BinaryOpcode::Div),
        }
    }

    /// Builds a node which computes `atan2(y, x)`
    /// ```
    /// # let mut ctx = isofield::Context::new();
    /// let x = ctx.x();
    /// let y = ctx.y();
    /// let op = ctx.atan2(y, x).unwrap();
    /// let v = ctx.eval_xyz(op, 0.0, 1.0, 0.0).unwrap();
    /// assert_eq!(v, std::f64::consts::FRAC_PI_2);
    /// ```
    pub fn atan2<A: IntoNode, B: IntoNode>(
        &mut self,
        y: A,
        x: B,
    ) -> Result<Node, Error> {
        let y = y.into_node(self)?;
        let x = x.into_node(self)?;
        self.op_binary(y, x, BinaryOpcode::Atan2)
    }

    /// Builds a node which raises `a` to the power `b`
    ///
    /// `b` should be a constant; derivative and interval evaluation treat it
    /// as one.
    pub fn pow<A: IntoNode, B: IntoNode>(
        &mut self,
        a: A,
        b: B,
    ) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        let b = b.into_node(self)?;
        self.op_binary(a, b, BinaryOpcode::Pow)
    }

    /// Builds a node which takes the `b`-th root of `a`
    ///
    /// `b` should be a constant; derivative and interval evaluation treat it
    /// as one.
    pub fn nth_root<A: IntoNode, B: IntoNode>(
        &mut self,
        a: A,
        b: B,
    ) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        let b = b.into_node(self)?;
        self.op_binary(a, b, BinaryOpcode::NthRoot)
    }

    /// Builds a node that takes the modulo (least non-negative remainder)
    pub fn modulo<A: IntoNode, B: IntoNode>(
        &mut self,
        a: A,
        b: B,
    ) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        let b = b.into_node(self)?;
        self.op_binary(a, b, BinaryOpcode::Mod)
    }

    /// Builds a node which passes `a` through, patching NaN values with `b`
    /// ```
    /// # let mut ctx = isofield::Context::new();
    /// let x = ctx.x();
    /// let s = ctx.sqrt(x).unwrap();
    /// let op = ctx.nanfill(s, 0.0).unwrap();
    /// let v = ctx.eval_xyz(op, -1.0, 0.0, 0.0).unwrap();
    /// assert_eq!(v, 0.0);
    /// ```
    pub fn nanfill<A: IntoNode, B: IntoNode>(
        &mut self,
        a: A,
        b: B,
    ) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        let b = b.into_node(self)?;
        self.op_binary(a, b, BinaryOpcode::NanFill)
    }

    /// Builds a unary negation node
    /// ```
    /// # let mut ctx = isofield::Context::new();
    /// let x = ctx.x();
    /// let op = ctx.neg(x).unwrap();
    /// let v = ctx.eval_xyz(op, 2.0, 0.0, 0.0).unwrap();
    /// assert_eq!(v, -2.0);
    /// ```
    pub fn neg<A: IntoNode>(&mut self, a: A) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        self.op_unary(a, UnaryOpcode::Neg)
    }

    /// Builds a node which squares its input
    /// ```
    /// # let mut ctx = isofield::Context::new();
    /// let x = ctx.x();
    /// let op = ctx.square(x).unwrap();
    /// let v = ctx.eval_xyz(op, 2.0, 0.0, 0.0).unwrap();
    /// assert_eq!(v, 4.0);
    /// ```
    pub fn square<A: IntoNode>(&mut self, a: A) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        self.op_unary(a, UnaryOpcode::Square)
    }

    /// Builds a node which calculates the square root of its input
    /// ```
    /// # let mut ctx = isofield::Context::new();
    /// let x = ctx.x();
    /// let op = ctx.sqrt(x).unwrap();
    /// let v = ctx.eval_xyz(op, 4.0, 0.0, 0.0).unwrap();
    /// assert_eq!(v, 2.0);
    /// ```
    pub fn sqrt<A: IntoNode>(&mut self, a: A) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        self.op_unary(a, UnaryOpcode::Sqrt)
    }

    /// Builds a node which calculates the sine of its input (in radians)
    pub fn sin<A: IntoNode>(&mut self, a: A) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        self.op_unary(a, UnaryOpcode::Sin)
    }

    /// Builds a node which calculates the cosine of its input (in radians)
    pub fn cos<A: IntoNode>(&mut self, a: A) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        self.op_unary(a, UnaryOpcode::Cos)
    }

    /// Builds a node which calculates the tangent of its input (in radians)
    pub fn tan<A: IntoNode>(&mut self, a: A) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        self.op_unary(a, UnaryOpcode::Tan)
    }

    /// Builds a node which calculates the arcsine of its input (in radians)
    pub fn asin<A: IntoNode>(&mut self, a: A) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        self.op_unary(a, UnaryOpcode::Asin)
    }

    /// Builds a node which calculates the arccosine of its input (in radians)
    pub fn acos<A: IntoNode>(&mut self, a: A) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        self.op_unary(a, UnaryOpcode::Acos)
    }

    /// Builds a node which calculates the arctangent of its input (in
    /// radians)
    pub fn atan<A: IntoNode>(&mut self, a: A) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        self.op_unary(a, UnaryOpcode::Atan)
    }

    /// Builds a node which calculates the exponent of its input
    pub fn exp<A: IntoNode>(&mut self, a: A) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        self.op_unary(a, UnaryOpcode::Exp)
    }

    /// Wraps the given subtree, freezing its variable dependence
    ///
    /// Values and spatial derivatives pass through unchanged, but the
    /// wrapped subtree contributes nothing to
    /// [`Evaluator::gradient`](crate::Evaluator::gradient).
    pub fn const_var<A: IntoNode>(&mut self, a: A) -> Result<Node, Error> {
        let a = a.into_node(self)?;
        self.op_unary(a, UnaryOpcode::ConstVar)
    }

    ////////////////////////////////////////////////////////////////////////

    /// Returns every node reachable from `root`, children strictly first
    ///
    /// Leaves appear at the front of the list and `root` is the final
    /// element.  This is the ordering consumed by the
    /// [`Evaluator`](crate::Evaluator) when flattening the graph into a
    /// tape.
    pub fn ordered(&self, root: Node) -> Result<Vec<Node>, Error> {
        self.check_node(root)?;

        // Iterative post-order traversal; the second `bool` marks nodes
        // whose children have already been scheduled.
        let mut seen = HashSet::new();
        let mut todo = vec![(root, false)];
        let mut out = Vec::new();
        while let Some((n, ready)) = todo.pop() {
            if ready {
                out.push(n);
                continue;
            }
            if !seen.insert(n) {
                continue;
            }
            todo.push((n, true));
            for child in self.get_op(n).unwrap().iter_children() {
                todo.push((child, false));
            }
        }
        Ok(out)
    }

    ////////////////////////////////////////////////////////////////////////

    /// Evaluates the given node with the provided values for X, Y, and Z.
    ///
    /// This is extremely inefficient; consider building an
    /// [`Evaluator`](crate::Evaluator) instead.
    ///
    /// ```
    /// # let mut ctx = isofield::Context::new();
    /// let x = ctx.x();
    /// let y = ctx.y();
    /// let z = ctx.z();
    /// let op = ctx.mul(x, y).unwrap();
    /// let op = ctx.div(op, z).unwrap();
    /// let v = ctx.eval_xyz(op, 3.0, 5.0, 2.0).unwrap();
    /// assert_eq!(v, 7.5); // (3.0 * 5.0) / 2.0
    /// ```
    pub fn eval_xyz(
        &self,
        root: Node,
        x: f64,
        y: f64,
        z: f64,
    ) -> Result<f64, Error> {
        let vars = [(Var::X, x), (Var::Y, y), (Var::Z, z)]
            .into_iter()
            .collect();
        self.eval(root, &vars)
    }

    /// Evaluates the given node with a generic set of variables
    ///
    /// This is extremely inefficient; consider building an
    /// [`Evaluator`](crate::Evaluator) instead.
    pub fn eval(
        &self,
        root: Node,
        vars: &BTreeMap<Var, f64>,
    ) -> Result<f64, Error> {
        let mut cache = vec![None; self.ops.len()];
        self.eval_inner(root, vars, &mut cache)
    }

    fn eval_inner(
        &self,
        node: Node,
        vars: &BTreeMap<Var, f64>,
        cache: &mut Vec<Option<f64>>,
    ) -> Result<f64, Error> {
        match cache.get(node.0) {
            None => return Err(Error::BadNode),
            Some(Some(v)) => return Ok(*v),
            Some(None) => (),
        }
        let mut get = |n: Node| self.eval_inner(n, vars, cache);
        let v = match self.get_op(node).ok_or(Error::BadNode)? {
            Op::Input(v) => {
                let var = self.get_var_by_index(*v)?;
                *vars.get(&var).ok_or(Error::UnknownVariable(var))?
            }
            Op::Const(c) => c.0,

            Op::Binary(op, a, b) => {
                let a = get(*a)?;
                let b = get(*b)?;
                match op {
                    BinaryOpcode::Add => a + b,
                    BinaryOpcode::Sub => a - b,
                    BinaryOpcode::Mul => a * b,
                    BinaryOpcode::Div => a / b,
                    BinaryOpcode::Min => a.min(b),
                    BinaryOpcode::Max => a.max(b),
                    BinaryOpcode::Atan2 => a.atan2(b),
                    BinaryOpcode::Pow => a.powf(b),
                    BinaryOpcode::NthRoot => a.powf(1.0 / b),
                    BinaryOpcode::Mod => a.rem_euclid(b),
                    BinaryOpcode::NanFill => {
                        if a.is_nan() {
                            b
                        } else {
                            a
                        }
                    }
                }
            }

            Op::Unary(op, a) => {
                let a = get(*a)?;
                match op {
                    UnaryOpcode::Neg => -a,
                    UnaryOpcode::Square => a * a,
                    UnaryOpcode::Sqrt => a.sqrt(),
                    UnaryOpcode::Sin => a.sin(),
                    UnaryOpcode::Cos => a.cos(),
                    UnaryOpcode::Tan => a.tan(),
                    UnaryOpcode::Asin => a.asin(),
                    UnaryOpcode::Acos => a.acos(),
                    UnaryOpcode::Atan => a.atan(),
                    UnaryOpcode::Exp => a.exp(),
                    UnaryOpcode::ConstVar => a,
                }
            }
        };

        cache[node.0] = Some(v);
        Ok(v)
    }

    /// Looks up an operation by `Node` handle
    pub fn get_op(&self, node: Node) -> Option<&Op> {
        self.ops.get(node.0)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Helper trait for things that can be converted into a [`Node`] given a
/// [`Context`].
///
/// This trait allows you to write
/// ```
/// # let mut ctx = isofield::Context::new();
/// let x = ctx.x();
/// let sum = ctx.add(x, 1.0).unwrap();
/// ```
/// instead of the more verbose
/// ```
/// # let mut ctx = isofield::Context::new();
/// let x = ctx.x();
/// let num = ctx.constant(1.0);
/// let sum = ctx.add(x, num).unwrap();
/// ```
pub trait IntoNode {
    /// Converts the given value into a node
    fn into_node(self, ctx: &mut Context) -> Result<Node, Error>;
}

impl IntoNode for Node {
    fn into_node(self, ctx: &mut Context) -> Result<Node, Error> {
        ctx.check_node(self)?;
        Ok(self)
    }
}

impl IntoNode for f32 {
    fn into_node(self, ctx: &mut Context) -> Result<Node, Error> {
        Ok(ctx.constant(self as f64))
    }
}

impl IntoNode for f64 {
    fn into_node(self, ctx: &mut Context) -> Result<Node, Error> {
        Ok(ctx.constant(self))
    }
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn it_works() {
        let mut ctx = Context::new();
        let x1 = ctx.x();
        let x2 = ctx.x();
        assert_eq!(x1, x2);

        let a = ctx.constant(1.0);
        let b = ctx.constant(1.0);
        assert_eq!(a, b);
        assert_eq!(ctx.const_value(a).unwrap(), Some(1.0));
        assert_eq!(ctx.const_value(x1).unwrap(), None);

        let c = ctx.add(a, b).unwrap();
        assert_eq!(ctx.const_value(c).unwrap(), Some(2.0));

        let c = ctx.neg(c).unwrap();
        assert_eq!(ctx.const_value(c).unwrap(), Some(-2.0));
    }

    #[test]
    fn test_constant_folding() {
        let mut ctx = Context::new();
        let a = ctx.constant(1.0);
        assert_eq!(ctx.len(), 1);
        let b = ctx.constant(-1.0);
        assert_eq!(ctx.len(), 2);
        let _ = ctx.add(a, b);
        assert_eq!(ctx.len(), 3);
        let _ = ctx.add(a, b);
        assert_eq!(ctx.len(), 3);
        let _ = ctx.mul(a, b);
        assert_eq!(ctx.len(), 3);
    }

    #[test]
    fn test_eval() {
        let mut ctx = Context::new();
        let x = ctx.x();
        let y = ctx.y();
        let v = ctx.add(x, y).unwrap();

        assert_eq!(
            ctx.eval(v, &[(Var::X, 1.0), (Var::Y, 2.0)].into_iter().collect())
                .unwrap(),
            3.0
        );
        assert_eq!(ctx.eval_xyz(v, 2.0, 3.0, 0.0).unwrap(), 5.0);
    }

    #[test]
    fn test_ordered() {
        let mut ctx = Context::new();
        let x = ctx.x();
        let y = ctx.y();
        let sum = ctx.add(x, y).unwrap();
        let sq = ctx.square(sum).unwrap();

        let flat = ctx.ordered(sq).unwrap();
        assert_eq!(flat.len(), 4);
        assert_eq!(*flat.last().unwrap(), sq);

        // Children always appear before their parents
        for (i, n) in flat.iter().enumerate() {
            for child in ctx.get_op(*n).unwrap().iter_children() {
                assert!(flat[..i].contains(&child));
            }
        }
    }

    #[test]
    fn test_free_var_eval() {
        let mut ctx = Context::new();
        let v = Var::new();
        let n = ctx.var(v);
        let x = ctx.x();
        let prod = ctx.mul(n, x).unwrap();

        let vars = [(Var::X, 2.0), (v, 3.0)].into_iter().collect();
        assert_eq!(ctx.eval(prod, &vars).unwrap(), 6.0);

        // Missing variable values are an error
        assert!(matches!(
            ctx.eval_xyz(prod, 2.0, 0.0, 0.0),
            Err(Error::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_clear_invalidates_handles() {
        let mut ctx = Context::new();
        let x = ctx.x();
        ctx.clear();
        assert!(ctx.is_empty());
        assert!(ctx.eval_xyz(x, 1.0, 0.0, 0.0).is_err());
    }
}
