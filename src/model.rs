//! The code model: descriptors for parsed models and the repository that
//! collects them.
//!
//! The parser fills a `Repository` with one `Model` per `MODEL` or
//! `PROCESS` block; the repository is read-only from then on.  The
//! flattening pass in `flatten` reuses `Model` for its output, so the same
//! descriptor types flow through the whole pipeline.
//!
//! Within one model the parameter names, variable names and unit instance
//! names share a single name space.  The `add_*` methods enforce that and
//! report collisions as diagnostics, so both the parser and the flattener
//! get the check for free.

use crate::diag::DiagnosticSink;
use crate::diag::SourceSpan;
use crate::formula::Formula;
use crate::path::MemoryAccess;
use crate::path::Path;
use std::fmt;

/// Declared type of a parameter or variable.
///
/// The keyword is parsed and carried along but later stages treat it as an
/// opaque token; no type checking is done on formulas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MemoryType {
    /// `REAL`, the parameter default.
    Real,
    /// `ANY`, the variable default.
    #[default]
    Any,
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MemoryType::Real => "REAL",
            MemoryType::Any => "ANY",
        })
    }
}

/// All data of a single parameter or variable.
///
/// Whether the descriptor is a parameter or a variable is determined by the
/// table that contains it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryDescriptor {
    /// The name; one component as declared, qualified after flattening.
    pub name: Path,
    /// Declared type keyword.
    pub mem_type: MemoryType,
    /// True if the variable is integrated over time.  Set by the state
    /// variable marking pass; meaningless for parameters.
    pub is_state_variable: bool,
    /// Where the declaration was parsed.
    pub span: SourceSpan,
}

impl MemoryDescriptor {
    /// A descriptor with the given name and type and no position.
    pub fn new(name: impl Into<Path>, mem_type: MemoryType) -> MemoryDescriptor {
        MemoryDescriptor {
            name: name.into(),
            mem_type,
            is_state_variable: false,
            span: SourceSpan::none(),
        }
    }
}

/// One assignment: `lhs := rhs`.
///
/// Used for all three equation sections.  In the EQUATION section an lhs
/// with the time derivative marker makes the statement an ODE.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EquationDescriptor {
    /// The assigned storage location.
    pub lhs: MemoryAccess,
    /// The right hand side formula.
    pub rhs: Formula,
    /// Where the statement was parsed.
    pub span: SourceSpan,
}

impl EquationDescriptor {
    /// An equation without a position, for building models in memory.
    pub fn new(lhs: MemoryAccess, rhs: Formula) -> EquationDescriptor {
        EquationDescriptor {
            lhs,
            rhs,
            span: SourceSpan::none(),
        }
    }

    /// True if this equation defines a time derivative: `$x := ...`.
    pub fn is_ode(&self) -> bool {
        self.lhs.time_derivative
    }
}

/// One line of the UNIT section: a named sub-model instance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnitDescriptor {
    /// The instance name inside the parent model.
    pub name: String,
    /// The name of the instantiated model.
    pub model_type: String,
    /// Where the declaration was parsed.
    pub span: SourceSpan,
}

/// Storage for the SOLUTIONPARAMETERS section.
#[derive(Clone, Debug, PartialEq)]
pub struct SolutionParameters {
    /// Distance between result samples, as a literal.
    pub reporting_interval: String,
    /// Total simulated time, as a literal.
    pub simulation_time: String,
}

impl Default for SolutionParameters {
    /// Defaults applied when the section is absent, so the generated
    /// program always has usable values.
    fn default() -> SolutionParameters {
        SolutionParameters {
            reporting_interval: "1.0".to_string(),
            simulation_time: "100.0".to_string(),
        }
    }
}

/// A parsed `MODEL` or `PROCESS` definition, and equally the flat model
/// produced from a process by the flattening pass.
#[derive(Clone, Debug, Default)]
pub struct Model {
    /// The model's name.
    pub name: String,
    /// True for `PROCESS`; a process is a model intended for simulation
    /// and differs only in role.
    pub is_process: bool,
    /// The PARAMETER table.
    pub parameters: Vec<MemoryDescriptor>,
    /// The VARIABLE table.
    pub variables: Vec<MemoryDescriptor>,
    /// The UNIT table; empty after flattening.
    pub units: Vec<UnitDescriptor>,
    /// The SET section: assignments to parameters.
    pub param_assignments: Vec<EquationDescriptor>,
    /// The EQUATION section: differential and algebraic equations.
    pub equations: Vec<EquationDescriptor>,
    /// The INITIAL section: initial conditions of state variables.
    pub initial_equations: Vec<EquationDescriptor>,
    /// The SOLUTIONPARAMETERS section.
    pub solution_parameters: SolutionParameters,
    /// Sticky error flag; once true, no code is generated for the model.
    pub errors_detected: bool,
    /// Where the definition starts.
    pub span: SourceSpan,
}

impl Model {
    /// An empty model with a name.
    pub fn new(name: impl Into<String>, is_process: bool) -> Model {
        Model {
            name: name.into(),
            is_process,
            ..Model::default()
        }
    }

    /// Adds a parameter, checking the shared name space.  Collisions are a
    /// diagnostic, not a crash: the first declaration wins and the error
    /// flag is set.
    pub fn add_parameter(&mut self, mem: MemoryDescriptor, diags: &mut DiagnosticSink) {
        if self.check_name_free(&mem.name, &mem.span, diags) {
            self.parameters.push(mem);
        }
    }

    /// Adds a variable; same collision handling as `add_parameter`.
    pub fn add_variable(&mut self, mem: MemoryDescriptor, diags: &mut DiagnosticSink) {
        if self.check_name_free(&mem.name, &mem.span, diags) {
            self.variables.push(mem);
        }
    }

    /// Adds a sub-model instance; same collision handling as
    /// `add_parameter`.
    pub fn add_unit(&mut self, unit: UnitDescriptor, diags: &mut DiagnosticSink) {
        let name = Path::from_component(unit.name.clone());
        if self.check_name_free(&name, &unit.span, diags) {
            self.units.push(unit);
        }
    }

    fn check_name_free(&mut self, name: &Path, span: &SourceSpan, diags: &mut DiagnosticSink) -> bool {
        if self.identifier_exists(name) {
            diags.error(
                format!(
                    "Duplicate identifier: {}\n\
                     Parameters, variables and units of one model share a single name space.",
                    name
                ),
                span,
            );
            self.errors_detected = true;
            false
        } else {
            true
        }
    }

    /// Looks up a parameter by exact path.
    pub fn find_parameter(&self, name: &Path) -> Option<&MemoryDescriptor> {
        self.parameters.iter().find(|mem| &mem.name == name)
    }

    /// Looks up a variable by exact path.
    pub fn find_variable(&self, name: &Path) -> Option<&MemoryDescriptor> {
        self.variables.iter().find(|mem| &mem.name == name)
    }

    /// Mutable variable lookup, used by the state variable marker.
    pub fn find_variable_mut(&mut self, name: &Path) -> Option<&mut MemoryDescriptor> {
        self.variables.iter_mut().find(|mem| &mem.name == name)
    }

    /// Looks up a unit instance by name.
    pub fn find_unit(&self, name: &str) -> Option<&UnitDescriptor> {
        self.units.iter().find(|unit| unit.name == name)
    }

    /// True if `name` is a parameter, a variable or a unit instance of
    /// this model.
    pub fn identifier_exists(&self, name: &Path) -> bool {
        self.find_parameter(name).is_some()
            || self.find_variable(name).is_some()
            || (name.len() == 1 && self.find_unit(&name.components()[0]).is_some())
    }

    /// Number of state variables, meaningful after marking.
    pub fn state_variable_count(&self) -> usize {
        self.variables.iter().filter(|v| v.is_state_variable).count()
    }
}

/// The registry of all declared models and processes of one compilation.
///
/// Written exactly once, by the parser; every later stage only reads it.
/// Lookups are by exact name over the small declaration tables, so a linear
/// scan is fine.
#[derive(Default, Debug)]
pub struct Repository {
    /// Reusable model definitions.
    pub models: Vec<Model>,
    /// Top-level simulation definitions.
    pub processes: Vec<Model>,
}

impl Repository {
    /// An empty repository.
    pub fn new() -> Repository {
        Repository::default()
    }

    /// Looks up a reusable model by name.
    pub fn find_model(&self, name: &str) -> Option<&Model> {
        self.models.iter().find(|model| model.name == name)
    }

    /// Looks up a process by name.
    pub fn find_process(&self, name: &str) -> Option<&Model> {
        self.processes.iter().find(|model| model.name == name)
    }

    /// Stores a parsed definition in the right table.  A duplicate
    /// top-level name is a diagnostic; the first definition wins.
    pub fn add(&mut self, model: Model, diags: &mut DiagnosticSink) {
        let taken = self.find_model(&model.name).is_some() || self.find_process(&model.name).is_some();
        if taken {
            diags.error(
                format!("Duplicate model name: {}", model.name),
                &model.span,
            );
            return;
        }
        if model.is_process {
            self.processes.push(model);
        } else {
            self.models.push(model);
        }
    }
}
