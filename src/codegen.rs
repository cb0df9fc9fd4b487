//! Python code generation.
//!
//! For every flat process one simulation class is emitted, derived from the
//! runtime's `SimulatorBase`.  The class carries the parameters as data
//! members, knows the layout of the state vector and the result array, and
//! exposes:
//!
//! - `setParameters(...)` - the SET section; parameters that are assigned a
//!   plain number become named arguments with that default, so they can be
//!   changed from the outside without recompiling;
//! - `setInitialValues()` - the INITIAL section, returning the initial
//!   state vector;
//! - `_diffStateT(y, time)` - the EQUATION section, called repeatedly by
//!   the integrator;
//! - `_outputEquations(stateResult)` - recomputes the algebraic variables
//!   from the integration result, since only state variables are stored
//!   during the run.
//!
//! The generator refuses to emit a process whose error flag is set; it
//! records one summary diagnostic and moves on to the next process.

use crate::diag::Diagnostic;
use crate::diag::DiagnosticSink;
use crate::formula::Atom;
use crate::formula::Formula;
use crate::layout::render_formula;
use crate::layout::Layout;
use crate::model::Model;
use crate::path::Path;
use crate::util::new_map;
use crate::util::HashMap;
use itertools::Itertools;
use std::fmt;
use std::io;
use std::io::Write;

/// Failure of code generation: either the output stream broke, or an
/// internal error surfaced while rendering a formula.
#[derive(Debug)]
pub enum GenError {
    /// Writing the output failed.
    Io(io::Error),
    /// The formula rewriter met a malformed sequence; a compiler bug.
    Formula(Diagnostic),
}

impl From<io::Error> for GenError {
    fn from(err: io::Error) -> GenError {
        GenError::Io(err)
    }
}

impl From<Diagnostic> for GenError {
    fn from(diag: Diagnostic) -> GenError {
        GenError::Formula(diag)
    }
}

impl fmt::Display for GenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenError::Io(err) => write!(f, "Can not write output: {}", err),
            GenError::Formula(diag) => write!(f, "{}", diag),
        }
    }
}

impl std::error::Error for GenError {}

/// Target-language names for every path of one flat process.
struct PyNames {
    /// Access expression inside method bodies: `self.p_r1_d` for
    /// parameters, `v_r1_X` for variables.
    access: HashMap<Path, String>,
    /// Spelling as a function argument of `setParameters`: `r1_d`.
    func_arg: HashMap<Path, String>,
}

impl PyNames {
    /// Creates the path to Python name mapping for a flat process.
    fn build(flat: &Model) -> PyNames {
        let mut access = new_map();
        let mut func_arg = new_map();
        for mem in &flat.parameters {
            access.insert(mem.name.clone(), format!("self.p_{}", mem.name.to_string_sep("_")));
            func_arg.insert(mem.name.clone(), mem.name.to_string_sep("_"));
        }
        for mem in &flat.variables {
            access.insert(mem.name.clone(), format!("v_{}", mem.name.to_string_sep("_")));
        }
        PyNames { access, func_arg }
    }

    fn access(&self, path: &Path) -> String {
        match self.access.get(path) {
            Some(name) => name.clone(),
            // unreachable after a clean semantic check; still render
            // something recognizable rather than panic
            None => path.to_string_sep("_"),
        }
    }
}

/// Emits the whole output program: preamble, one class per process, and a
/// small driver block.
///
/// Processes with detected errors are skipped with a summary diagnostic.
pub fn generate_program<W: Write>(
    out: &mut W,
    source_names: &[&str],
    processes: &[(&Model, &Layout)],
    diags: &mut DiagnosticSink,
) -> Result<(), GenError> {
    writeln!(out, "#!/usr/bin/env python")?;
    writeln!(out, "# This program was generated by the Siml compiler.")?;
    writeln!(out, "#   Source: {}", source_names.iter().join(", "))?;
    writeln!(out, "#   Changes will be lost when the compiler runs again.")?;
    writeln!(out)?;
    writeln!(out, "from simulatorbase import SimulatorBase, zeros, shape, size, Float")?;
    writeln!(out)?;
    writeln!(out)?;

    let mut emitted = Vec::new();
    for &(flat, layout) in processes {
        if flat.errors_detected {
            diags.push(Diagnostic::error(
                format!("Process {}: no Python object generated due to errors.", flat.name),
                &flat.span,
            ));
            continue;
        }
        ProcessGenerator {
            out: &mut *out,
            flat,
            layout,
            names: PyNames::build(flat),
        }
        .generate()?;
        emitted.push(flat.name.clone());
    }

    // driver block; runs every successfully generated process
    writeln!(out, "if __name__ == '__main__':")?;
    if emitted.is_empty() {
        writeln!(out, "    pass")?;
    }
    for name in &emitted {
        writeln!(out, "    simulation = {}()", name)?;
        writeln!(out, "    simulation.simulateDynamic()")?;
    }
    Ok(())
}

/// Generates the simulation class of a single flat process.
struct ProcessGenerator<'a, W: Write> {
    out: &'a mut W,
    flat: &'a Model,
    layout: &'a Layout,
    names: PyNames,
}

impl<'a, W: Write> ProcessGenerator<'a, W> {
    fn convert(&self, formula: &Formula) -> Result<String, GenError> {
        let names = &self.names;
        Ok(render_formula(formula, &|path| names.access(path))?)
    }

    fn generate(&mut self) -> Result<(), GenError> {
        writeln!(self.out, "class {}(SimulatorBase):", self.flat.name)?;
        writeln!(self.out, "    \"\"\"")?;
        writeln!(self.out, "    Object to simulate process {}", self.flat.name)?;
        if !self.flat.span.is_none() {
            writeln!(
                self.out,
                "    Definition in file: '{}' line: {}",
                self.flat.span.file, self.flat.span.line
            )?;
        }
        writeln!(self.out, "    \"\"\"")?;
        writeln!(self.out)?;

        self.gen_constructor()?;
        self.gen_set_parameters()?;
        self.gen_set_initial_values()?;
        self.gen_ode_function()?;
        self.gen_output_equations()?;
        writeln!(self.out)?;
        Ok(())
    }

    /// The `__init__` function: result array map, solution parameters,
    /// array sizes.
    fn gen_constructor(&mut self) -> Result<(), GenError> {
        writeln!(self.out, "    def __init__(self):")?;
        writeln!(self.out, "        #call the base class' constructor.")?;
        writeln!(self.out, "        SimulatorBase.__init__(self)")?;
        writeln!(self.out)?;

        // map for converting variable names to indices or slices;
        // used by the runtime's get(...) and graph(...) functions
        writeln!(self.out, "        #Map for converting variable names to indices or slices.")?;
        let entries = self
            .layout
            .result_index
            .iter()
            .sorted_by(|a, b| a.0.cmp(b.0))
            .map(|(path, index)| format!("'{}':{}", path, index))
            .join(", ");
        writeln!(self.out, "        self._resultArrayMap = {{ {} }}", entries)?;
        writeln!(self.out)?;

        writeln!(self.out, "        #Set the solution parameters.")?;
        writeln!(
            self.out,
            "        self.reportingInterval = float({})",
            self.flat.solution_parameters.reporting_interval
        )?;
        writeln!(
            self.out,
            "        self.simulationTime    = float({})",
            self.flat.solution_parameters.simulation_time
        )?;
        writeln!(self.out)?;

        writeln!(self.out, "        #Compute parameter values.")?;
        writeln!(self.out, "        self.setParameters()")?;
        writeln!(self.out)?;

        writeln!(self.out, "        #Number of state variables and total number of variables.")?;
        writeln!(self.out, "        self._numStates    = {}", self.layout.state_count)?;
        writeln!(self.out, "        self._numVariables = {}", self.layout.result_count)?;
        writeln!(self.out)?;
        Ok(())
    }

    /// True if the SET assignment's right hand side is one plain number,
    /// which makes the parameter eligible as a function argument.
    fn is_plain_number(rhs: &Formula) -> bool {
        rhs.len() == 1 && matches!(rhs.atoms()[0], Atom::Number(_))
    }

    /// The `setParameters` function, representing the SET section.
    fn gen_set_parameters(&mut self) -> Result<(), GenError> {
        // first line of the definition, with the simple parameters as
        // named arguments carrying their assigned number as default
        write!(self.out, "    def setParameters(self")?;
        for equ in &self.flat.param_assignments {
            if !Self::is_plain_number(&equ.rhs) {
                continue;
            }
            let arg = match self.names.func_arg.get(&equ.lhs.path) {
                Some(arg) => arg.clone(),
                None => continue,
            };
            let default = self.convert(&equ.rhs)?;
            write!(self.out, ", {}={}", arg, default)?;
        }
        writeln!(self.out, "):")?;

        writeln!(self.out, "        \"\"\"")?;
        writeln!(self.out, "        Assign values to the parameters. The function represents the SET section.")?;
        writeln!(self.out, "        All parameters that have numbers assigned to them can be given new")?;
        writeln!(self.out, "        values by passing them as named arguments of this function, e.g.")?;
        writeln!(self.out, "        mySimulation.setParameters(Ks=0.5, Sf=5)")?;
        writeln!(self.out, "        The parameters are data members of the simulation object.")?;
        writeln!(self.out, "        \"\"\"")?;

        writeln!(self.out, "        #Assign the parameters with function arguments.")?;
        for equ in &self.flat.param_assignments {
            if !Self::is_plain_number(&equ.rhs) {
                continue;
            }
            let arg = match self.names.func_arg.get(&equ.lhs.path) {
                Some(arg) => arg.clone(),
                None => continue,
            };
            writeln!(
                self.out,
                "        {} = float({}) # = {}",
                self.names.access(&equ.lhs.path),
                arg,
                equ.lhs.path
            )?;
        }

        writeln!(self.out, "        #Assign the parameters with computations.")?;
        for equ in &self.flat.param_assignments {
            if Self::is_plain_number(&equ.rhs) {
                continue;
            }
            writeln!(
                self.out,
                "        {} = {} # = {}",
                self.names.access(&equ.lhs.path),
                self.convert(&equ.rhs)?,
                equ.lhs.path
            )?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    /// The `setInitialValues` function, representing the INITIAL section.
    fn gen_set_initial_values(&mut self) -> Result<(), GenError> {
        writeln!(self.out, "    def setInitialValues(self):")?;
        writeln!(self.out, "        \"\"\"")?;
        writeln!(self.out, "        Compute the initial values of the state variables.")?;
        writeln!(self.out, "        The function represents the INITIAL section.")?;
        writeln!(self.out, "        \"\"\"")?;
        writeln!(
            self.out,
            "        initialValues = zeros({}, Float)",
            self.layout.state_count
        )?;
        for equ in &self.flat.initial_equations {
            let index = self.state_index(&equ.lhs.path)?;
            writeln!(
                self.out,
                "        initialValues[{}] = {} # = {}",
                index,
                self.convert(&equ.rhs)?,
                equ.lhs.path
            )?;
        }
        writeln!(self.out, "        return initialValues")?;
        writeln!(self.out)?;
        Ok(())
    }

    /// The `_diffStateT` function: all equations, called repeatedly by the
    /// integration algorithm.
    fn gen_ode_function(&mut self) -> Result<(), GenError> {
        writeln!(self.out, "    def _diffStateT(self, y, time):")?;
        writeln!(self.out, "        \"\"\"")?;
        writeln!(self.out, "        Compute the time derivatives of the state variables.")?;
        writeln!(self.out, "        y: state vector, time: current time")?;
        writeln!(self.out, "        \"\"\"")?;

        writeln!(self.out, "        #Dissect the state vector into individual state variables.")?;
        for variable in self.flat.variables.iter().filter(|v| v.is_state_variable) {
            let index = self.state_index(&variable.name)?;
            writeln!(
                self.out,
                "        {} = y[{}]",
                self.names.access(&variable.name),
                index
            )?;
        }
        writeln!(self.out)?;

        writeln!(self.out, "        #Create the return vector (the time derivatives dy/dt).")?;
        writeln!(self.out, "        y_t = zeros({}, Float)", self.layout.state_count)?;
        writeln!(self.out)?;

        writeln!(self.out, "        #Compute the algebraic variables.")?;
        for equ in self.flat.equations.iter().filter(|equ| !equ.is_ode()) {
            writeln!(
                self.out,
                "        {} = {}",
                self.names.access(&equ.lhs.path),
                self.convert(&equ.rhs)?
            )?;
        }

        writeln!(self.out, "        #Compute the time derivatives of the state variables.")?;
        for equ in self.flat.equations.iter().filter(|equ| equ.is_ode()) {
            let index = self.state_index(&equ.lhs.path)?;
            writeln!(
                self.out,
                "        y_t[{}] = {} # = d {} /dt",
                index,
                self.convert(&equ.rhs)?,
                equ.lhs.path
            )?;
        }
        writeln!(self.out)?;
        writeln!(self.out, "        return y_t")?;
        writeln!(self.out)?;
        Ok(())
    }

    /// The `_outputEquations` function: computes the algebraic variables
    /// again after the simulation, so they can be examined too.
    fn gen_output_equations(&mut self) -> Result<(), GenError> {
        writeln!(self.out, "    def _outputEquations(self, stateResult):")?;
        writeln!(self.out, "        \"\"\"")?;
        writeln!(self.out, "        Compute the algebraic variables as functions of the state")?;
        writeln!(self.out, "        variables. All variables are then stored together in a 2D array.")?;
        writeln!(self.out, "        \"\"\"")?;

        writeln!(self.out, "        #compute the size of the result array")?;
        writeln!(self.out, "        if size(shape(stateResult)) == 1:")?;
        writeln!(self.out, "            sizeTime = 1")?;
        writeln!(self.out, "        else:")?;
        writeln!(self.out, "            sizeTime = shape(stateResult)[0]")?;
        writeln!(self.out)?;

        writeln!(
            self.out,
            "        resultArray = zeros((sizeTime, {}), Float)",
            self.layout.result_count
        )?;
        writeln!(self.out, "        #copy the state variables into the result array")?;
        writeln!(self.out, "        resultArray[:,0:self._numStates] = stateResult")?;
        writeln!(self.out)?;

        writeln!(self.out, "        #Create local state variables - take them from the result array.")?;
        for variable in self.flat.variables.iter().filter(|v| v.is_state_variable) {
            let index = self.result_index(&variable.name)?;
            writeln!(
                self.out,
                "        {} = resultArray[:,{}]",
                self.names.access(&variable.name),
                index
            )?;
        }
        writeln!(self.out)?;

        writeln!(self.out, "        #Compute the algebraic variables from the state variables.")?;
        for equ in self.flat.equations.iter().filter(|equ| !equ.is_ode()) {
            let index = self.result_index(&equ.lhs.path)?;
            writeln!(
                self.out,
                "        resultArray[:,{}] = {} # = {}",
                index,
                self.convert(&equ.rhs)?,
                equ.lhs.path
            )?;
        }
        writeln!(self.out)?;
        writeln!(self.out, "        return resultArray")?;
        Ok(())
    }

    fn state_index(&self, path: &Path) -> Result<usize, GenError> {
        match self.layout.state_index.get(path) {
            Some(&index) => Ok(index),
            None => Err(GenError::Formula(Diagnostic::error_nospan(format!(
                "Internal compiler error: {} has no state vector slot",
                path
            )))),
        }
    }

    fn result_index(&self, path: &Path) -> Result<usize, GenError> {
        match self.layout.result_index.get(path) {
            Some(&index) => Ok(index),
            None => Err(GenError::Formula(Diagnostic::error_nospan(format!(
                "Internal compiler error: {} has no result array slot",
                path
            )))),
        }
    }
}
