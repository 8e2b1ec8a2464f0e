//! Gauntlet Expression
//!
//! Definitions carry `{{ }}` expressions in their string values. This crate
//! resolves the parts of those expressions that are known at a given stage and
//! leaves everything else in place, so that later stages (or the runner) can
//! finish the job.
//!
//! # Flow
//! 1. Build a [`Machine`] out of one or more [`Scope`]s
//! 2. Call [`simplify`] on any serializable value, or [`simplify_str`] on a string
//! 3. Each reference the machine knows is substituted; fully resolved
//!    expressions are evaluated with minijinja, the rest stay as `{{ }}`
//!
//! # Example
//! ```json
//! { "shell": "abra {{config.foo}}" }
//! ```
//! with `config.foo = 30` becomes `"abra 30"`, while
//! `"some {{ unknown(300) }} value"` is kept as is.

mod error;
mod eval;
mod machine;
mod scope;
mod template;
mod walk;

pub use error::ExpressionError;
pub use machine::{Machine, Resolution, Scope};
pub use scope::{FunctionScope, MapScope, RenamePrefixScope};
pub use template::{simplify_str, template_expression};
pub use walk::{simplify, simplify_value};
