//! Construction of the flat intermediate model.
//!
//! A process declared in the source is a composite: it instantiates other
//! models as units, which instantiate further models in turn.  The code
//! generator wants none of that, so this module turns the composite into an
//! equivalent `Model` with no units: parameters, variables and equations of
//! every sub-model are recursively inlined, with names qualified by the
//! instance path (`r1.X` for variable `X` of unit `r1`).  This can also be
//! read as allocating memory for all the sub-models.
//!
//! Three stages live here and run in this order:
//!
//! 1. `flatten_process` - recursive inlining with name qualification;
//! 2. `propagate_parameters` - a parameter declared higher in the
//!    hierarchy replaces same-named parameters declared lower;
//! 3. `mark_state_variables` - variables whose time derivative is assigned
//!    become state variables.
//!
//! The semantic checker (`semck`) runs afterwards on the result.  All
//! stages report problems to the sink and keep going; the flat model's
//! `errors_detected` flag is sticky.

use crate::diag::DiagnosticSink;
use crate::model::Model;
use crate::model::Repository;
use crate::path::Path;
use crate::path::ReplaceMap;
use crate::util::new_map;
use log::debug;

/// How deep unit instantiation may nest.  Exceeding the limit means the
/// model definitions are circular, or absurd; either way recursion stops.
/// This is a policy, not a correctness boundary.
pub const RECURSION_MAX: u32 = 10;

/// Creates the flat model for one composite process.
///
/// The non-recursive features (name, role, initial equations, solution
/// parameters, span) are copied from the top level process only; initial
/// equations of sub-models have no meaning and are not collected.  The
/// recursive features are inlined depth-first, preserving textual order
/// within each section, so higher-hierarchy parameters always precede the
/// parameters of their sub-models in the flat tables - the order the
/// propagation pass relies on.
pub fn flatten_process(repo: &Repository, process: &Model, diags: &mut DiagnosticSink) -> Model {
    let mut flat = Model::new(process.name.clone(), process.is_process);
    flat.initial_equations = process.initial_equations.clone();
    flat.solution_parameters = process.solution_parameters.clone();
    flat.span = process.span.clone();

    flatten_recursive(repo, process, &Path::new(), 0, &mut flat, diags);
    debug!(
        "flattened process {}: {} parameters, {} variables, {} equations",
        flat.name,
        flat.parameters.len(),
        flat.variables.len(),
        flat.equations.len()
    );
    flat
}

/// Copies parameters, variables, SET assignments and equations of
/// `source` into `flat`, every name prefixed with `prefix`, then recurses
/// into the units of `source`.
fn flatten_recursive(
    repo: &Repository,
    source: &Model,
    prefix: &Path,
    level: u32,
    flat: &mut Model,
    diags: &mut DiagnosticSink,
) {
    // protect against circular unit definitions
    if level > RECURSION_MAX {
        diags.error(
            format!(
                "The maximum nesting depth ({}) of sub-models has been reached!\n\
                 Process: {}; sub-model where the limit was hit: {}.\n\
                 (Maybe the model definitions are circular.)",
                RECURSION_MAX, flat.name, source.name
            ),
            &source.span,
        );
        flat.errors_detected = true;
        return;
    }

    for parameter in &source.parameters {
        let mut mem = parameter.clone();
        mem.name = mem.name.prepend(prefix);
        flat.add_parameter(mem, diags);
    }

    for variable in &source.variables {
        let mut mem = variable.clone();
        mem.name = mem.name.prepend(prefix);
        flat.add_variable(mem, diags);
    }

    for assignment in &source.param_assignments {
        let mut equ = assignment.clone();
        equ.lhs = equ.lhs.prepend(prefix);
        equ.rhs = equ.rhs.prepend_paths(prefix);
        flat.param_assignments.push(equ);
    }

    for equation in &source.equations {
        let mut equ = equation.clone();
        equ.lhs = equ.lhs.prepend(prefix);
        equ.rhs = equ.rhs.prepend_paths(prefix);
        flat.equations.push(equ);
    }

    // errors were maybe detected in the source model; don't stop, we want
    // to find more
    if source.errors_detected {
        flat.errors_detected = true;
    }

    for unit in &source.units {
        let sub_model = match repo.find_model(&unit.model_type) {
            Some(model) => model,
            None => {
                diags.error(
                    format!(
                        "The model {} does not exist!\n\
                         Needed by unit {} of {}.",
                        unit.model_type, unit.name, source.name
                    ),
                    &unit.span,
                );
                flat.errors_detected = true;
                continue;
            }
        };
        let new_prefix = prefix.append(&Path::from_component(unit.name.clone()));
        flatten_recursive(repo, sub_model, &new_prefix, level + 1, flat, diags);
    }
}

/// Applies the parameter propagation rule to a flat model.
///
/// A parameter declared high in the hierarchy replaces parameters declared
/// lower in the hierarchy whose name ends in the same components: `Ks`
/// replaces `r.Ks` and `a.b.Ks`.  Replaced parameters are deleted and
/// every reference to them, left or right hand side, in any section, is
/// rewritten to the surviving name.
///
/// The pass runs once, in declaration order, which is hierarchy order by
/// construction of `flatten_process`.  A parameter that is itself replaced
/// does not shadow anything on this pass; the rule is deliberately not
/// saturating.
pub fn propagate_parameters(flat: &mut Model) {
    let mut replacements: ReplaceMap = new_map();

    for (i, shadower) in flat.parameters.iter().enumerate() {
        if replacements.contains_key(&shadower.name) {
            continue;
        }
        for shadowed in &flat.parameters[i + 1..] {
            if shadower.name.is_tail_of(&shadowed.name) {
                replacements.insert(shadowed.name.clone(), shadower.name.clone());
            }
        }
    }

    if replacements.is_empty() {
        return;
    }
    debug!(
        "process {}: propagating {} parameter replacements",
        flat.name,
        replacements.len()
    );

    flat.parameters.retain(|mem| !replacements.contains_key(&mem.name));

    for equation in flat
        .param_assignments
        .iter_mut()
        .chain(flat.initial_equations.iter_mut())
        .chain(flat.equations.iter_mut())
    {
        equation.lhs = equation.lhs.replace(&replacements);
        equation.rhs = equation.rhs.replace_paths(&replacements);
    }
}

/// Finds all uses of the time derivative marker on equation left hand
/// sides and marks the assigned variables as state variables.
///
/// Time derivatives anywhere else are illegal; the semantic checker
/// rejects them, so this pass only looks at EQUATION left hand sides.
pub fn mark_state_variables(flat: &mut Model, diags: &mut DiagnosticSink) {
    let odes: Vec<_> = flat
        .equations
        .iter()
        .filter(|equ| equ.is_ode())
        .map(|equ| (equ.lhs.path.clone(), equ.span.clone()))
        .collect();

    for (path, span) in odes {
        match flat.find_variable_mut(&path) {
            Some(variable) => variable.is_state_variable = true,
            None => {
                diags.error(
                    format!(
                        "Undefined variable: {}\n\
                         The symbol is used as a state variable.",
                        path
                    ),
                    &span,
                );
                flat.errors_detected = true;
            }
        }
    }
}
