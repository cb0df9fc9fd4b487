//! Tests for flattening, parameter propagation and state variable marking.

use crate::diag::DiagnosticSink;
use crate::flatten;
use crate::model::Model;
use crate::model::Repository;
use crate::parser;
use crate::path::Path;
use std::sync::Arc;

fn parse(text: &str) -> (Repository, DiagnosticSink) {
    let mut repo = Repository::new();
    let mut diags = DiagnosticSink::new();
    let name: Arc<str> = "test.siml".into();
    parser::parse_source(&name, text, &mut repo, &mut diags);
    (repo, diags)
}

/// Flattens the first process of the program.
fn flatten_first(text: &str) -> (Model, DiagnosticSink) {
    let (repo, mut diags) = parse(text);
    assert!(!diags.has_errors(), "{:?}", diags.diagnostics());
    let flat = flatten::flatten_process(&repo, &repo.processes[0], &mut diags);
    (flat, diags)
}

const TWO_REACTORS: &str = "\
MODEL R
PARAMETER
    d
VARIABLE
    X
EQUATION
    $X := -d * X
END

PROCESS P
UNIT
    r1 AS R
    r2 AS R
SET
    r1.d := 1
    r2.d := 2
INITIAL
    r1.X := 10
    r2.X := 20
END
";

#[test]
fn one_level_composition() {
    let (mut flat, mut diags) = flatten_first(TWO_REACTORS);
    assert!(diags.is_empty(), "{:?}", diags.diagnostics());

    // no sub-model links survive flattening
    assert!(flat.units.is_empty());
    assert!(!flat.errors_detected);

    let param_names: Vec<String> =
        flat.parameters.iter().map(|p| p.name.to_string()).collect();
    assert_eq!(param_names, vec!["r1.d", "r2.d"]);
    let var_names: Vec<String> =
        flat.variables.iter().map(|v| v.name.to_string()).collect();
    assert_eq!(var_names, vec!["r1.X", "r2.X"]);

    // equations are rewritten with the instance prefix
    assert_eq!(flat.equations.len(), 2);
    assert_eq!(flat.equations[0].lhs.to_string(), "$r1.X");
    assert_eq!(flat.equations[0].rhs.to_string(), "r1.d - r1.X *");
    assert_eq!(flat.equations[1].lhs.to_string(), "$r2.X");
    assert_eq!(flat.equations[1].rhs.to_string(), "r2.d - r2.X *");

    // initial equations are taken unchanged from the process
    assert_eq!(flat.initial_equations.len(), 2);
    assert_eq!(flat.initial_equations[0].lhs.to_string(), "r1.X");

    flatten::mark_state_variables(&mut flat, &mut diags);
    assert!(diags.is_empty());
    assert!(flat.variables.iter().all(|v| v.is_state_variable));
}

#[test]
fn nested_units_qualify_names_with_the_full_chain() {
    let (flat, diags) = flatten_first(
        "\
MODEL Leaf
PARAMETER
    k
VARIABLE
    x
EQUATION
    $x := -k * x
END

MODEL Mid
UNIT
    leaf AS Leaf
END

PROCESS P
UNIT
    m AS Mid
SET
    m.leaf.k := 1
INITIAL
    m.leaf.x := 0
END
",
    );
    assert!(diags.is_empty(), "{:?}", diags.diagnostics());
    assert_eq!(flat.parameters.len(), 1);
    assert_eq!(flat.parameters[0].name, Path::from("m.leaf.k"));
    assert_eq!(flat.variables[0].name, Path::from("m.leaf.x"));
    assert_eq!(flat.equations[0].lhs.to_string(), "$m.leaf.x");
}

#[test]
fn parameter_propagation_shadows_by_tail() {
    let (mut flat, diags) = flatten_first(
        "\
MODEL R
PARAMETER
    d
VARIABLE
    X
EQUATION
    $X := -d * X
END

PROCESS P
PARAMETER
    d
UNIT
    r1 AS R
SET
    r1.d := 0.2
INITIAL
    r1.X := 10
END
",
    );
    assert!(diags.is_empty(), "{:?}", diags.diagnostics());

    // before propagation both parameters exist, the top level one first
    let names: Vec<String> = flat.parameters.iter().map(|p| p.name.to_string()).collect();
    assert_eq!(names, vec!["d", "r1.d"]);

    flatten::propagate_parameters(&mut flat);

    // r1.d is gone, and every reference to it now reads d
    let names: Vec<String> = flat.parameters.iter().map(|p| p.name.to_string()).collect();
    assert_eq!(names, vec!["d"]);
    assert_eq!(flat.param_assignments[0].lhs.to_string(), "d");
    assert_eq!(flat.equations[0].rhs.to_string(), "d - r1.X *");

    // no remaining parameter is a tail of another
    for p in &flat.parameters {
        for q in &flat.parameters {
            assert!(p.name == q.name || !p.name.is_tail_of(&q.name));
        }
    }
}

#[test]
fn propagation_is_single_pass_not_saturating() {
    // three levels share the tail `d`: d, a.d, a.b.d.  The top level `d`
    // shadows both deeper ones in a single pass; `a.d`, being itself
    // replaced, shadows nothing.
    let mut flat = Model::new("P", true);
    let mut diags = DiagnosticSink::new();
    for name in ["d", "a.d", "a.b.d"] {
        flat.add_parameter(
            crate::model::MemoryDescriptor::new(name, crate::model::MemoryType::Real),
            &mut diags,
        );
    }
    flatten::propagate_parameters(&mut flat);
    let names: Vec<String> = flat.parameters.iter().map(|p| p.name.to_string()).collect();
    assert_eq!(names, vec!["d"]);
    assert!(diags.is_empty());
}

#[test]
fn shadowed_parameter_never_appears_as_lhs() {
    let (mut flat, _) = flatten_first(
        "\
MODEL R
PARAMETER
    d
VARIABLE
    X
EQUATION
    $X := -d * X
END

PROCESS P
PARAMETER
    d
UNIT
    r1 AS R
SET
    d := 0.1
    r1.d := 0.2
INITIAL
    r1.X := 10
END
",
    );
    flatten::propagate_parameters(&mut flat);
    let shadowed = Path::from("r1.d");
    for equ in flat
        .param_assignments
        .iter()
        .chain(flat.initial_equations.iter())
        .chain(flat.equations.iter())
    {
        assert_ne!(equ.lhs.path, shadowed);
        equ.rhs.visit_accesses(|access| assert_ne!(access.path, shadowed));
    }
}

#[test]
fn unknown_sub_model_is_a_diagnostic() {
    let (repo, mut diags) = parse(
        "PROCESS P\nUNIT\n u AS NoSuchModel\nEND\n",
    );
    let flat = flatten::flatten_process(&repo, &repo.processes[0], &mut diags);
    assert_eq!(diags.len(), 1);
    assert!(diags.diagnostics()[0].message.contains("NoSuchModel"));
    assert!(flat.errors_detected);
}

#[test]
fn cyclic_units_hit_the_recursion_limit_once() {
    let (repo, mut diags) = parse(
        "\
MODEL A
UNIT
    x AS A
END

PROCESS P
UNIT
    a AS A
END
",
    );
    assert!(diags.is_empty());
    let flat = flatten::flatten_process(&repo, &repo.processes[0], &mut diags);
    // exactly one recursion limit diagnostic, the error flag is set, and
    // the traversal terminated
    assert_eq!(diags.len(), 1);
    assert!(diags.diagnostics()[0].message.contains("nesting depth"));
    assert!(flat.errors_detected);
    assert!(flat.units.is_empty());
}

#[test]
fn marking_unknown_state_variable_is_a_diagnostic() {
    let (repo, mut diags) = parse(
        "PROCESS P\nEQUATION\n $ghost := 1\nEND\n",
    );
    let mut flat = flatten::flatten_process(&repo, &repo.processes[0], &mut diags);
    flatten::mark_state_variables(&mut flat, &mut diags);
    assert_eq!(diags.len(), 1);
    assert!(diags.diagnostics()[0].message.contains("ghost"));
    assert!(flat.errors_detected);
}

#[test]
fn error_flags_are_merged_from_source_models() {
    let (mut repo, mut diags) = parse(TWO_REACTORS);
    assert!(diags.is_empty());
    repo.models[0].errors_detected = true;
    let flat = flatten::flatten_process(&repo, &repo.processes[0], &mut diags);
    assert!(flat.errors_detected);
}
