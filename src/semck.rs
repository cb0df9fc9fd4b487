//! Semantic checks on the flat model.
//!
//! Runs after flattening, parameter propagation and state variable marking;
//! the syntax was already checked by the parser.  The rules, per section:
//!
//! SET:
//!   - all operands (left and right) must be declared parameters;
//!   - no time derivative anywhere;
//!   - every parameter is assigned exactly once.
//!
//! EQUATION:
//!   - the left hand side must be a declared variable, never a parameter;
//!   - every variable is assigned exactly once - which also catches a
//!     plain assignment to a state variable, because the `$x := ...`
//!     assignment already consumed the name;
//!   - right hand side accesses must be declared parameters or variables,
//!     without time derivative.
//!
//! INITIAL:
//!   - the left hand side must be a declared state variable, without time
//!     derivative;
//!   - every state variable is initialised exactly once;
//!   - right hand side accesses must be declared parameters or variables,
//!     without time derivative.
//!
//! Every violation is reported and checking continues, so a single run
//! surfaces as many problems as possible.  Exactly-once bookkeeping uses a
//! set seeded with all candidate names: each assignment removes its name,
//! a missing name means a duplicate, and whatever remains at the end of the
//! section is reported as unassigned in one summary diagnostic.

use crate::diag::DiagnosticSink;
use crate::diag::SourceSpan;
use crate::model::Model;
use crate::path::MemoryAccess;
use crate::path::Path;
use itertools::Itertools;
use std::collections::BTreeSet;

/// Checks one flat model, reporting violations to `diags` and making the
/// model's error flag sticky.
pub fn check(flat: &mut Model, diags: &mut DiagnosticSink) {
    let mut errors = false;
    check_set_section(flat, diags, &mut errors);
    check_equation_section(flat, diags, &mut errors);
    check_initial_section(flat, diags, &mut errors);
    if errors {
        flat.errors_detected = true;
    }
}

/// An operand of the SET section: must be a declared parameter and must
/// not carry the time derivative marker.
fn inspect_set_access(
    flat: &Model,
    access: &MemoryAccess,
    span: &SourceSpan,
    diags: &mut DiagnosticSink,
    errors: &mut bool,
) {
    if flat.find_parameter(&access.path).is_none() {
        diags.error(format!("Undefined parameter: {}", access.path), span);
        *errors = true;
    } else if access.time_derivative {
        diags.error(
            format!("Parameters can not be differentiated! See: {}", access),
            span,
        );
        *errors = true;
    }
}

/// A right hand side operand of the EQUATION or INITIAL section: must be a
/// declared parameter or variable and must not carry the time derivative
/// marker.
fn inspect_rhs_access(
    flat: &Model,
    access: &MemoryAccess,
    span: &SourceSpan,
    diags: &mut DiagnosticSink,
    errors: &mut bool,
) {
    if !flat.identifier_exists(&access.path) {
        diags.error(
            format!(
                "Undefined identifier: {}\n\
                 Expecting a variable or parameter here.",
                access.path
            ),
            span,
        );
        *errors = true;
    } else if access.time_derivative {
        diags.error(
            format!(
                "Illegal time derivation: {}\n\
                 Time derivation is only legal on the LHS of an equation.",
                access
            ),
            span,
        );
        *errors = true;
    }
}

fn check_set_section(flat: &Model, diags: &mut DiagnosticSink, errors: &mut bool) {
    // every parameter goes into the set; an assignment takes it out again
    let mut unassigned: BTreeSet<Path> =
        flat.parameters.iter().map(|mem| mem.name.clone()).collect();

    for equ in &flat.param_assignments {
        equ.rhs
            .visit_accesses(|access| inspect_set_access(flat, access, &equ.span, diags, errors));
        inspect_set_access(flat, &equ.lhs, &equ.span, diags, errors);

        // the lhs was already reported above if it is no parameter
        if flat.find_parameter(&equ.lhs.path).is_none() {
            continue;
        }
        if !unassigned.remove(&equ.lhs.path) {
            diags.error(
                format!("Duplicate assignment to parameter: {}", equ.lhs.path),
                &equ.span,
            );
            *errors = true;
        }
    }

    if !unassigned.is_empty() {
        diags.error(
            format!(
                "Process: {}. The following parameters are unassigned: {}",
                flat.name,
                unassigned.iter().join(", ")
            ),
            &flat.span,
        );
        *errors = true;
    }
}

fn check_equation_section(flat: &Model, diags: &mut DiagnosticSink, errors: &mut bool) {
    let mut unassigned: BTreeSet<Path> =
        flat.variables.iter().map(|mem| mem.name.clone()).collect();

    for equ in &flat.equations {
        equ.rhs
            .visit_accesses(|access| inspect_rhs_access(flat, access, &equ.span, diags, errors));

        if flat.find_parameter(&equ.lhs.path).is_some() {
            diags.error(
                format!(
                    "Illegal assignment to parameter: {}\n\
                     Parameters can only be assigned once, in the SET section.",
                    equ.lhs.path
                ),
                &equ.span,
            );
            *errors = true;
            continue;
        }
        if flat.find_variable(&equ.lhs.path).is_none() {
            diags.error(format!("Undefined variable: {}", equ.lhs.path), &equ.span);
            *errors = true;
            continue;
        }
        if !unassigned.remove(&equ.lhs.path) {
            diags.error(
                format!("Duplicate assignment to variable: {}", equ.lhs.path),
                &equ.span,
            );
            *errors = true;
        }
    }

    if !unassigned.is_empty() {
        diags.error(
            format!(
                "Process: {}. The following variables are unassigned: {}",
                flat.name,
                unassigned.iter().join(", ")
            ),
            &flat.span,
        );
        *errors = true;
    }
}

fn check_initial_section(flat: &Model, diags: &mut DiagnosticSink, errors: &mut bool) {
    let mut unassigned: BTreeSet<Path> = flat
        .variables
        .iter()
        .filter(|mem| mem.is_state_variable)
        .map(|mem| mem.name.clone())
        .collect();

    for equ in &flat.initial_equations {
        equ.rhs
            .visit_accesses(|access| inspect_rhs_access(flat, access, &equ.span, diags, errors));

        let lhs_var = match flat.find_variable(&equ.lhs.path) {
            Some(var) => var,
            None => {
                diags.error(format!("Undefined variable: {}", equ.lhs.path), &equ.span);
                *errors = true;
                continue;
            }
        };
        if !lhs_var.is_state_variable {
            diags.error(
                format!(
                    "State variable required! Variable {} is algebraic.\n\
                     Only state variables can be initialised.",
                    equ.lhs.path
                ),
                &equ.span,
            );
            *errors = true;
            continue;
        }
        if equ.lhs.time_derivative {
            diags.error(
                format!("Illegal time derivative in INITIAL section: {}", equ.lhs),
                &equ.span,
            );
            *errors = true;
        }
        if !unassigned.remove(&equ.lhs.path) {
            diags.error(
                format!("Duplicate initialisation of state variable: {}", equ.lhs.path),
                &equ.span,
            );
            *errors = true;
        }
    }

    if !unassigned.is_empty() {
        diags.error(
            format!(
                "Process: {}. The following state variables are not initialised: {}",
                flat.name,
                unassigned.iter().join(", ")
            ),
            &flat.span,
        );
        *errors = true;
    }
}
