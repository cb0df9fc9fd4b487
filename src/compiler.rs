//! Main API entry point for compiling Siml programs.
//!
//! A `Compiler` value represents one compilation: it owns the repository of
//! parsed definitions, the retained source buffers, the diagnostic sink and
//! the computed pass results.  Feed it source text with `parse` (once per
//! input file), then query results; analysis runs on demand and is cached
//! until the next `parse` invalidates it.
//!
//! The pipeline behind `flat_result` is strictly ordered: flattening,
//! parameter propagation, state variable marking, semantic checking, array
//! layout.  Diagnostics appear in the traversal order of the stage that
//! produced them, and across stages in pipeline order, because every stage
//! appends to the same sink.
//!
//! Everything is single threaded and synchronous.  Compilations are
//! independent values - nothing in the crate is shared or static - so an
//! embedding application may run several `Compiler`s concurrently without
//! coordination.

use crate::codegen;
use crate::codegen::GenError;
use crate::diag;
use crate::diag::Diagnostic;
use crate::diag::DiagnosticSink;
use crate::flatten;
use crate::layout;
use crate::layout::Layout;
use crate::model::Model;
use crate::model::Repository;
use crate::parser;
use crate::parser::SourceMap;
use crate::semck;
use crate::units;
use crate::units::UnitNode;
use annotate_snippets::snippet::Snippet;
use std::io;
use std::time::Instant;

/// Options that affect compilation and stay constant for the lifetime of
/// the `Compiler` value.
#[derive(Default, Debug)]
pub struct CompileOptions {
    /// If true, the time taken by each pass is printed after the pass
    /// completes.
    pub timing: bool,
}

/// One fully analyzed process: the flat model and its array layout.
#[derive(Debug)]
pub struct FlatProcess {
    /// The flat model, after propagation, marking and checking.
    pub model: Model,
    /// State vector and result array indices for the model.
    pub layout: Layout,
}

/// Master type of a compilation.
pub struct Compiler {
    options: CompileOptions,
    repository: Repository,
    sources: SourceMap,
    diags: DiagnosticSink,
    /// Lazily computed analysis of all processes; cleared by `parse`.
    flat: Option<Vec<FlatProcess>>,
}

fn time<R, F: FnOnce() -> R>(opts: &CompileOptions, name: &str, f: F) -> R {
    let now = Instant::now();
    let ret = f();
    if opts.timing {
        println!("{} {}ms", name, now.elapsed().as_millis());
    }
    ret
}

impl Compiler {
    /// Constructs a compiler with no input yet.
    pub fn new(options: CompileOptions) -> Compiler {
        Compiler {
            options,
            repository: Repository::new(),
            sources: SourceMap::new(),
            diags: DiagnosticSink::new(),
            flat: None,
        }
    }

    /// Parses one input buffer into the repository.
    ///
    /// May be called repeatedly; later files see the definitions of earlier
    /// ones, so splitting a program over several files is equivalent to
    /// concatenating them.  All analysis results are invalidated.
    pub fn parse(&mut self, name: &str, text: String) {
        time(&self.options, "parse", || {
            self.sources.add(name, text);
            let file = match self.sources.files().last() {
                Some(file) => file,
                None => return,
            };
            parser::parse_source(&file.name, &file.text, &mut self.repository, &mut self.diags);
        });
        self.flat = None;
    }

    /// The parsed definitions.
    pub fn parse_result(&self) -> &Repository {
        &self.repository
    }

    /// The retained source buffers.
    pub fn sources(&self) -> &SourceMap {
        &self.sources
    }

    /// Calculates and returns the analyzed flat processes, one per PROCESS
    /// definition, in declaration order.
    pub fn flat_result(&mut self) -> &[FlatProcess] {
        if self.flat.is_none() {
            let mut flats: Vec<Model> = time(&self.options, "flatten", || {
                self.repository
                    .processes
                    .iter()
                    .map(|process| {
                        flatten::flatten_process(&self.repository, process, &mut self.diags)
                    })
                    .collect()
            });
            time(&self.options, "propagate", || {
                for flat in &mut flats {
                    flatten::propagate_parameters(flat);
                }
            });
            time(&self.options, "markstate", || {
                for flat in &mut flats {
                    flatten::mark_state_variables(flat, &mut self.diags);
                }
            });
            time(&self.options, "semck", || {
                for flat in &mut flats {
                    semck::check(flat, &mut self.diags);
                }
            });
            let processed = time(&self.options, "layout", || {
                flats
                    .into_iter()
                    .map(|model| {
                        let layout = layout::layout_arrays(&model);
                        FlatProcess { model, layout }
                    })
                    .collect()
            });
            self.flat = Some(processed);
        }
        self.flat.as_ref().unwrap()
    }

    /// Generates the output program for all processes.
    ///
    /// Processes whose error flag is set are skipped with a summary
    /// diagnostic; the remaining ones are emitted.
    pub fn generate(&mut self, out: &mut impl io::Write) -> Result<(), GenError> {
        self.flat_result();
        let source_names: Vec<&str> =
            self.sources.files().iter().map(|file| &*file.name).collect();
        let flat = match &self.flat {
            Some(flat) => flat,
            None => return Ok(()),
        };
        let pairs: Vec<(&Model, &Layout)> =
            flat.iter().map(|fp| (&fp.model, &fp.layout)).collect();
        time(&self.options, "codegen", || {
            codegen::generate_program(out, &source_names, &pairs, &mut self.diags)
        })
    }

    /// All diagnostics recorded so far, in pipeline order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diags.diagnostics()
    }

    /// True if any recorded diagnostic is an error.
    pub fn has_errors(&self) -> bool {
        self.diags.has_errors()
    }

    /// Renders all diagnostics against the retained sources, for terminal
    /// display.
    pub fn diag_notations(&self) -> Vec<Snippet<'_>> {
        diag::to_annotations(&self.sources, self.diags.diagnostics())
    }

    /// The unit instance tree of every process, for `--dump-units`.
    pub fn unit_trees(&self) -> Vec<UnitNode> {
        self.repository
            .processes
            .iter()
            .map(|process| units::build_unit_tree(&self.repository, process))
            .collect()
    }

    /// Dumps the unit instance tree of every process.
    pub fn print_unit_trees(&self, out: &mut impl io::Write) -> io::Result<()> {
        for tree in self.unit_trees() {
            tree.write_tree(out)?;
        }
        Ok(())
    }

    /// Exports the unit instance tree of every process in DOT format, one
    /// `<process>_units.dot` file per process.
    #[cfg(feature = "dot")]
    pub fn export_units_dot(&self) -> io::Result<()> {
        for tree in self.unit_trees() {
            let mut file = std::fs::File::create(format!("{}_units.dot", tree.instance))?;
            tree.export_dot(&mut file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECAY: &str = "\
PROCESS Decay
PARAMETER
    k
VARIABLE
    x
SET
    k := 2
EQUATION
    $x := -k * x
INITIAL
    x := 1
SOLUTIONPARAMETERS
    ReportingInterval := 0.1
    SimulationTime := 20
END
";

    #[test]
    fn compiles_and_generates_end_to_end() {
        let mut compiler = Compiler::new(CompileOptions::default());
        compiler.parse("decay.siml", DECAY.to_string());
        assert!(!compiler.has_errors(), "{:?}", compiler.diagnostics());

        let flat = compiler.flat_result();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].model.name, "Decay");
        assert_eq!(flat[0].layout.state_count, 1);

        let mut out = Vec::new();
        compiler.generate(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("class Decay(SimulatorBase):"));
        assert!(text.contains("self.reportingInterval = float(0.1)"));
        assert!(text.contains("self.simulationTime    = float(20)"));
        assert!(!compiler.has_errors());
    }

    #[test]
    fn parse_invalidates_results() {
        let mut compiler = Compiler::new(CompileOptions::default());
        compiler.parse("decay.siml", DECAY.to_string());
        assert_eq!(compiler.flat_result().len(), 1);
        compiler.parse("more.siml", DECAY.replace("Decay", "Decay2"));
        assert_eq!(compiler.flat_result().len(), 2);
    }

    #[test]
    fn snippet_rendering_resolves_source_lines() {
        let mut compiler = Compiler::new(CompileOptions::default());
        // k is never assigned
        compiler.parse(
            "broken.siml",
            DECAY.replace("    k := 2\n", "").to_string(),
        );
        compiler.flat_result();
        assert!(compiler.has_errors());
        let snippets = compiler.diag_notations();
        assert!(!snippets.is_empty());
    }
}
