//! The `simlc` command line driver.
//!
//! A thin shell around [`simlc::Compiler`]: it reads the input files, runs
//! the compilation, writes the generated Python program and prints all
//! collected diagnostics to stderr at the end.  Exit code 0 on success, 1
//! on usage errors, unreadable files or any error diagnostic.

use annotate_snippets::display_list::DisplayList;
use clap::App;
use clap::Arg;
use log::LevelFilter;
use simlc::CompileOptions;
use simlc::Compiler;
use std::fs;
use std::io::Write;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let app = App::new("simlc")
        .version(env!("CARGO_PKG_VERSION"))
        .version_short("v")
        .about("Compiler for the Siml modeling language for differential equations")
        .arg(
            Arg::with_name("INPUT")
                .help("Input source file(s); later files see earlier definitions")
                .required(true)
                .multiple(true),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .value_name("PATH")
                .takes_value(true)
                .help("Output file. Defaults to the first input file with a .py extension"),
        )
        .arg(
            Arg::with_name("debug")
                .short("d")
                .multiple(true)
                .help("Show debug information. Repeat for more output"),
        )
        .arg(
            Arg::with_name("timing")
                .long("timing")
                .help("Print the time taken by each compiler pass"),
        )
        .arg(
            Arg::with_name("dump-units")
                .long("dump-units")
                .help("Print the sub-model instance tree of every process"),
        );
    #[cfg(feature = "dot")]
    let app = app.arg(
        Arg::with_name("units-dot")
            .long("units-dot")
            .help("Export the sub-model instance tree of every process in DOT format"),
    );
    let matches = app.get_matches();

    let level = match matches.occurrences_of("debug") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if let Err(err) = simple_logger::SimpleLogger::new().with_level(level).init() {
        eprintln!("Warning: could not initialize logging: {}", err);
    }

    let inputs: Vec<&str> = match matches.values_of("INPUT") {
        Some(values) => values.collect(),
        None => {
            eprintln!("Error: No input file(s).");
            return 1;
        }
    };

    // name.siml -> name.py, unless -o was given
    let output = match matches.value_of("output") {
        Some(path) => path.to_string(),
        None => std::path::Path::new(inputs[0])
            .with_extension("py")
            .to_string_lossy()
            .into_owned(),
    };

    let mut compiler = Compiler::new(CompileOptions {
        timing: matches.is_present("timing"),
    });

    for input in &inputs {
        match fs::read_to_string(input) {
            Ok(text) => compiler.parse(input, text),
            Err(err) => {
                eprintln!("Error: Can not open input file: {}: {}", input, err);
                return 1;
            }
        }
    }

    if matches.is_present("dump-units") {
        let stdout = std::io::stdout();
        if let Err(err) = compiler.print_unit_trees(&mut stdout.lock()) {
            eprintln!("Error: {}", err);
            return 1;
        }
    }
    #[cfg(feature = "dot")]
    if matches.is_present("units-dot") {
        if let Err(err) = compiler.export_units_dot() {
            eprintln!("Error: Can not write DOT output: {}", err);
            return 1;
        }
    }

    let mut generated = Vec::new();
    if let Err(err) = compiler.generate(&mut generated) {
        eprintln!("Error: {}", err);
        return 1;
    }

    let mut output_file = match fs::File::create(&output) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Error: Can not open output file: {}: {}", output, err);
            return 1;
        }
    };
    if let Err(err) = output_file.write_all(&generated) {
        eprintln!("Error: Can not write output file: {}: {}", output, err);
        return 1;
    }

    // all diagnostics are printed at the end, in pipeline order
    for snippet in compiler.diag_notations() {
        eprintln!("{}", DisplayList::from(snippet));
    }

    if compiler.has_errors() {
        1
    } else {
        0
    }
}
