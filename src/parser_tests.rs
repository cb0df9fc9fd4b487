//! Tests for the lexer and parser: section handling, formula RPN
//! construction, spans and error recovery.

use crate::diag::DiagnosticSink;
use crate::model::MemoryType;
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

const BIOREACTOR: &str = "\
# Continuous fermenter, after the freeode examples.
MODEL Reactor
PARAMETER
    mu_max AS REAL
    Ks
VARIABLE
    X AS ANY
    S
    mu
EQUATION
    mu := mu_max * S / (Ks + S)
    $X := mu * X
    $S := -mu * X
END

PROCESS Plant
PARAMETER
    Ks
UNIT
    r1 AS Reactor
SET
    Ks := 0.1
    r1.mu_max := 0.32
INITIAL
    r1.X := 0.1; r1.S := 20
SOLUTIONPARAMETERS
    ReportingInterval := 0.1
    SimulationTime := 30
END
";

#[test]
fn parses_models_and_processes() {
    let (repo, diags) = parse(BIOREACTOR);
    assert!(diags.is_empty(), "{:?}", diags.diagnostics());
    assert_eq!(repo.models.len(), 1);
    assert_eq!(repo.processes.len(), 1);

    let reactor = repo.find_model("Reactor").unwrap();
    assert!(!reactor.is_process);
    assert_eq!(reactor.parameters.len(), 2);
    assert_eq!(reactor.parameters[0].name, Path::from("mu_max"));
    assert_eq!(reactor.parameters[0].mem_type, MemoryType::Real);
    assert_eq!(reactor.variables.len(), 3);
    assert_eq!(reactor.variables[0].mem_type, MemoryType::Any);
    assert_eq!(reactor.equations.len(), 3);
    assert!(!reactor.equations[0].is_ode());
    assert!(reactor.equations[1].is_ode());
    assert!(!reactor.errors_detected);

    let plant = repo.find_process("Plant").unwrap();
    assert!(plant.is_process);
    assert_eq!(plant.units.len(), 1);
    assert_eq!(plant.units[0].name, "r1");
    assert_eq!(plant.units[0].model_type, "Reactor");
    assert_eq!(plant.param_assignments.len(), 2);
    assert_eq!(plant.initial_equations.len(), 2);
    assert_eq!(plant.solution_parameters.reporting_interval, "0.1");
    assert_eq!(plant.solution_parameters.simulation_time, "30");
}

#[test]
fn formulas_are_reverse_polish() {
    let (repo, diags) = parse(BIOREACTOR);
    assert!(diags.is_empty());
    let reactor = repo.find_model("Reactor").unwrap();
    // mu := mu_max * S / (Ks + S)
    assert_eq!(
        reactor.equations[0].rhs.to_string(),
        "mu_max S * Ks S + () /"
    );
    // $S := -mu * X
    assert_eq!(reactor.equations[2].rhs.to_string(), "mu - X *");
}

#[test]
fn precedence_and_associativity() {
    let (repo, diags) = parse(
        "PROCESS P\nVARIABLE\n x\nEQUATION\n x := a + b * c ^ d ^ e\nEND\n",
    );
    assert!(diags.is_empty());
    let process = repo.find_process("P").unwrap();
    // ^ binds tightest and is right associative
    assert_eq!(process.equations[0].rhs.to_string(), "a b c d e ^ ^ * +");
}

#[test]
fn unary_sign_binds_tighter_than_product() {
    let (repo, diags) = parse("PROCESS P\nVARIABLE\n x\nEQUATION\n x := -a * b\nEND\n");
    assert!(diags.is_empty());
    let process = repo.find_process("P").unwrap();
    // (-a) * b
    assert_eq!(process.equations[0].rhs.to_string(), "a - b *");
}

#[test]
fn dotted_paths_and_derivatives() {
    let (repo, diags) = parse(
        "PROCESS P\nVARIABLE\n x\nEQUATION\n $x := r1.sub.v + $x\nEND\n",
    );
    assert!(diags.is_empty());
    let process = repo.find_process("P").unwrap();
    let equ = &process.equations[0];
    assert!(equ.lhs.time_derivative);
    assert_eq!(equ.lhs.path, Path::from("x"));
    // the parser accepts the misplaced $ on the rhs; rejecting it is the
    // checker's job
    assert_eq!(equ.rhs.to_string(), "r1.sub.v $x +");
}

#[test]
fn spans_carry_file_and_line() {
    let (repo, diags) = parse(BIOREACTOR);
    assert!(diags.is_empty());
    let reactor = repo.find_model("Reactor").unwrap();
    assert_eq!(&*reactor.span.file, "test.siml");
    assert_eq!(reactor.span.line, 2);
    // `Ks` is declared on line 5
    assert_eq!(reactor.parameters[1].span.line, 5);
}

#[test]
fn duplicate_declarations_are_reported() {
    let (repo, diags) = parse("MODEL M\nPARAMETER\n a\nVARIABLE\n a\nEND\n");
    assert_eq!(diags.len(), 1);
    let model = repo.find_model("M").unwrap();
    assert!(model.errors_detected);
    assert_eq!(model.parameters.len(), 1);
    assert!(model.variables.is_empty());
}

#[test]
fn recovery_continues_after_bad_statement() {
    let (repo, diags) = parse(
        "PROCESS P\nPARAMETER\n a\nSET\n a := * 2\n a := 2\nEND\n",
    );
    assert!(!diags.is_empty());
    let process = repo.find_process("P").unwrap();
    assert!(process.errors_detected);
    // the statement after the broken one is still parsed
    assert_eq!(process.param_assignments.len(), 1);
}

#[test]
fn default_initialisers_are_rejected() {
    let (repo, diags) = parse("MODEL M\nPARAMETER\n a AS REAL DEFAULT 1\nEND\n");
    assert_eq!(diags.len(), 1);
    assert!(diags.diagnostics()[0].message.contains("DEFAULT"));
    assert!(repo.find_model("M").unwrap().errors_detected);
}

#[test]
fn unknown_solution_parameter_is_reported() {
    let (_, diags) = parse(
        "PROCESS P\nSOLUTIONPARAMETERS\n StepSize := 0.5\nEND\n",
    );
    assert_eq!(diags.len(), 1);
    assert!(diags.diagnostics()[0].message.contains("StepSize"));
}

#[test]
fn missing_end_is_reported() {
    let (repo, diags) = parse("MODEL M\nPARAMETER\n a\n");
    assert_eq!(diags.len(), 1);
    assert!(diags.diagnostics()[0].message.contains("Missing END"));
    assert!(repo.find_model("M").unwrap().errors_detected);
}

#[test]
fn stray_text_resynchronizes_at_next_definition() {
    let (repo, diags) = parse("garbage here\nMODEL M\nEND\n");
    assert_eq!(diags.len(), 1);
    assert!(repo.find_model("M").is_some());
}

#[test]
fn multiple_buffers_share_one_repository() {
    let mut repo = Repository::new();
    let mut diags = DiagnosticSink::new();
    let first: Arc<str> = "models.siml".into();
    let second: Arc<str> = "plant.siml".into();
    parser::parse_source(
        &first,
        "MODEL R\nPARAMETER\n d\nVARIABLE\n X\nEQUATION\n $X := -d * X\nEND\n",
        &mut repo,
        &mut diags,
    );
    parser::parse_source(
        &second,
        "PROCESS P\nUNIT\n r1 AS R\nSET\n r1.d := 1\nINITIAL\n r1.X := 10\nEND\n",
        &mut repo,
        &mut diags,
    );
    assert!(diags.is_empty(), "{:?}", diags.diagnostics());
    assert_eq!(repo.models.len(), 1);
    assert_eq!(repo.processes.len(), 1);
    assert_eq!(&*repo.find_process("P").unwrap().span.file, "plant.siml");
}
