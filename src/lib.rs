//! Infrastructure for evaluating closed-form implicit surfaces.
//!
//! Expressions are built up as nodes in a deduplicating [`Context`], then
//! flattened into an instruction tape by an [`Evaluator`], which can compute
//! values, spatial derivatives, interval bounds, and per-variable gradients.
//!
//! ```
//! use isofield::{Context, Evaluator};
//! use nalgebra::Vector3;
//! use std::collections::HashMap;
//!
//! let mut ctx = Context::new();
//! let x = ctx.x();
//! let y = ctx.y();
//! let x_squared = ctx.square(x)?;
//! let y_squared = ctx.square(y)?;
//! let radius = ctx.add(x_squared, y_squared)?;
//! let circle = ctx.sub(radius, 1.0)?;
//!
//! let mut eval = Evaluator::new(&ctx, circle, &HashMap::new())?;
//! assert_eq!(eval.eval(Vector3::new(0.0, 0.0, 0.0)), -1.0);
//! assert_eq!(eval.eval(Vector3::new(1.0, 0.0, 0.0)), 0.0);
//!
//! // Interval evaluation bounds the field over a region
//! let i = eval.eval_interval(
//!     Vector3::new(0.0, 0.0, 0.0),
//!     Vector3::new(1.0, 1.0, 1.0),
//! );
//! assert!(i.lower() <= -1.0 && i.upper() >= 1.0);
//! # Ok::<(), isofield::Error>(())
//! ```
pub mod context;
pub mod eval;
pub mod types;
pub mod var;

mod error;

pub use context::Context;
pub use error::Error;
pub use eval::Evaluator;
