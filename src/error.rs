//! Module containing the universal error type
use thiserror::Error;

/// Universal error type for this crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("node is not present in this `Context`")]
    BadNode,
    #[error("variable is not present in this `Context`")]
    BadVar,

    #[error("cannot remove a node from an empty `Context`")]
    EmptyContext,

    #[error("unknown variable {0}")]
    UnknownVariable(crate::var::Var),
}
