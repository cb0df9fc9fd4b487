//! simlc is a compiler for Siml, a small language for describing dynamical
//! systems as systems of ordinary differential equations and algebraic
//! equations.
//!
//! A Siml program declares reusable `MODEL` blocks and top-level `PROCESS`
//! blocks, each with parameters, variables, sub-model instances (units) and
//! three equation sections: SET (parameter assignments), EQUATION
//! (differential and algebraic equations) and INITIAL (initial conditions).
//! The compiler turns every process into a Python simulation class that
//! drives an ODE integrator.
//!
//! The interesting work is the middle end.  The parser produces a
//! [`model::Repository`] of hierarchical definitions; the pipeline then
//! runs, per process:
//!
//! 1. [`flatten::flatten_process`] - inline all sub-models recursively,
//!    qualifying names with the instance path;
//! 2. [`flatten::propagate_parameters`] - a parameter declared higher in
//!    the hierarchy replaces same-named parameters below it;
//! 3. [`flatten::mark_state_variables`] - variables with an assigned time
//!    derivative become state variables;
//! 4. [`semck::check`] - the semantic rule set over all three sections;
//! 5. [`layout::layout_arrays`] - state vector and result array indices
//!    for code generation.
//!
//! [`compiler::Compiler`] drives all of that and is the API entry point;
//! the `simlc` binary is a thin shell around it.  Diagnostics are values
//! collected in a per-compilation [`diag::DiagnosticSink`]; the core never
//! aborts on a user error and a run reports as many problems as it can
//! find.

pub mod codegen;
pub mod compiler;
pub mod diag;
pub mod flatten;
pub mod formula;
pub mod layout;
pub mod model;
pub mod parser;
pub mod path;
pub mod semck;
pub mod units;
pub mod util;

#[cfg(test)]
mod flatten_tests;
#[cfg(test)]
mod parser_tests;

pub use crate::compiler::CompileOptions;
pub use crate::compiler::Compiler;
pub use crate::diag::Diagnostic;
pub use crate::diag::DiagnosticSink;
pub use crate::diag::Severity;
pub use crate::diag::SourceSpan;
pub use crate::formula::Formula;
pub use crate::model::Model;
pub use crate::model::Repository;
pub use crate::path::MemoryAccess;
pub use crate::path::Path;
