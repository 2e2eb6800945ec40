//! Identity of the scalar inputs to a field expression
//!
//! A [`Var`] names an input wherever it appears: in the expression graph
//! (wrapped in [`Op::Input`](crate::context::Op::Input)) and in the
//! [`Evaluator`](crate::Evaluator), which assigns each one a result slot
//! and, for free parameters, a Jacobian column.

/// Names one scalar input of a field expression
///
/// The three spatial axes are built in, and every occurrence of `Var::X`
/// refers to the same input.  Anything else is a free parameter, minted
/// with [`Var::new`] and adjusted per-evaluator through
/// [`Evaluator::set_var`](crate::Evaluator::set_var).
#[allow(missing_docs)]
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Var {
    X,
    Y,
    Z,
    /// A free parameter, distinguished by its tag
    V(VarIndex),
}

/// Tag distinguishing one free parameter from another
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct VarIndex(u64);

impl Var {
    /// Mints a fresh free parameter
    ///
    /// The tag is drawn at random from the full 64-bit space, so
    /// parameters minted anywhere in the process are distinct for all
    /// practical purposes.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Var::V(VarIndex(rand::random()))
    }

    /// Returns the tag of a free parameter, or `None` for a spatial axis
    pub fn index(&self) -> Option<VarIndex> {
        match *self {
            Var::V(i) => Some(i),
            _ => None,
        }
    }
}

impl std::fmt::Display for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Var::X => f.write_str("X"),
            Var::Y => f.write_str("Y"),
            Var::Z => f.write_str("Z"),
            Var::V(VarIndex(i)) => write!(f, "v{i:x}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fresh_vars_are_distinct() {
        let a = Var::new();
        let b = Var::new();
        assert_ne!(a, b);
        assert!(a.index().is_some());
        assert!(Var::Z.index().is_none());
    }
}
