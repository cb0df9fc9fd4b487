//! Lexer and parser for the Siml language.
//!
//! The parser fills the `Repository` with one `Model` per `MODEL` or
//! `PROCESS` block and retains every source buffer in a `SourceMap` so
//! diagnostics can be rendered with their offending line later.  Parse
//! errors are ordinary diagnostics: the parser reports, skips to the next
//! statement or definition, and keeps going, so one run surfaces as many
//! problems as possible.
//!
//! Both block kinds accept the same section set (PARAMETER, VARIABLE, UNIT,
//! SET, EQUATION, INITIAL, SOLUTIONPARAMETERS); a process differs from a
//! model only in role.  Statements are terminated by `;` or end of line,
//! and `#` starts a comment that runs to the end of the line.
//!
//! The expression parser builds `Formula` values directly in reverse Polish
//! order by precedence climbing.  `$` is accepted wherever a memory access
//! is legal, even where it is semantically wrong; rejecting misplaced time
//! derivatives is the checker's job, which keeps those rules observable
//! from source code.

use crate::diag::DiagnosticSink;
use crate::diag::SourceSpan;
use crate::formula::Formula;
use crate::formula::MathOp;
use crate::model::EquationDescriptor;
use crate::model::MemoryDescriptor;
use crate::model::MemoryType;
use crate::model::Model;
use crate::model::Repository;
use crate::model::UnitDescriptor;
use crate::path::MemoryAccess;
use crate::path::Path;
use crate::util::HashMap;
use lazy_static::lazy_static;
use log::info;
use std::sync::Arc;

/// One input file, retained for diagnostic rendering.
#[derive(Debug)]
pub struct SourceFile {
    /// The name as given on the command line.
    pub name: Arc<str>,
    /// The full text.
    pub text: String,
}

/// All source buffers of one compilation.
#[derive(Default, Debug)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    /// An empty source map.
    pub fn new() -> SourceMap {
        SourceMap::default()
    }

    /// Stores a buffer and returns its interned name.
    pub fn add(&mut self, name: &str, text: String) -> Arc<str> {
        let name: Arc<str> = name.into();
        self.files.push(SourceFile {
            name: name.clone(),
            text,
        });
        name
    }

    /// The retained files, in the order they were added.
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Looks up one line (1-based) of a named file.
    pub fn line(&self, file: &str, line: u32) -> Option<&str> {
        if line == 0 {
            return None;
        }
        let source = self.files.iter().find(|f| &*f.name == file)?;
        source.text.lines().nth(line as usize - 1)
    }
}

/// The reserved words of the language.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kw {
    Model,
    Process,
    End,
    Parameter,
    Variable,
    Unit,
    Set,
    Equation,
    Initial,
    SolutionParameters,
    As,
    Default,
    Real,
    Any,
}

lazy_static! {
    static ref KEYWORDS: HashMap<&'static str, Kw> = {
        let mut map = HashMap::default();
        map.insert("MODEL", Kw::Model);
        map.insert("PROCESS", Kw::Process);
        map.insert("END", Kw::End);
        map.insert("PARAMETER", Kw::Parameter);
        map.insert("VARIABLE", Kw::Variable);
        map.insert("UNIT", Kw::Unit);
        map.insert("SET", Kw::Set);
        map.insert("EQUATION", Kw::Equation);
        map.insert("INITIAL", Kw::Initial);
        map.insert("SOLUTIONPARAMETERS", Kw::SolutionParameters);
        map.insert("AS", Kw::As);
        map.insert("DEFAULT", Kw::Default);
        map.insert("REAL", Kw::Real);
        map.insert("ANY", Kw::Any);
        map
    };
}

#[derive(Clone, Debug, PartialEq)]
enum TokenKind {
    Ident(String),
    Number(String),
    Keyword(Kw),
    /// `:=`
    Assign,
    Dollar,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    /// `;` or end of line.
    Terminator,
    Eof,
}

#[derive(Clone, Debug)]
struct Token {
    kind: TokenKind,
    line: u32,
}

/// Splits one buffer into tokens.  Lexical problems become diagnostics and
/// the offending character is dropped.
fn tokenize(file: &Arc<str>, text: &str, diags: &mut DiagnosticSink) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut line: u32 = 1;
    let mut i = 0;

    let mut push = |kind: TokenKind, line: u32| tokens.push(Token { kind, line });

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '\n' => {
                push(TokenKind::Terminator, line);
                line += 1;
                i += 1;
            }
            ';' => {
                push(TokenKind::Terminator, line);
                i += 1;
            }
            '$' => {
                push(TokenKind::Dollar, line);
                i += 1;
            }
            '.' => {
                push(TokenKind::Dot, line);
                i += 1;
            }
            '+' => {
                push(TokenKind::Plus, line);
                i += 1;
            }
            '-' => {
                push(TokenKind::Minus, line);
                i += 1;
            }
            '*' => {
                push(TokenKind::Star, line);
                i += 1;
            }
            '/' => {
                push(TokenKind::Slash, line);
                i += 1;
            }
            '^' => {
                push(TokenKind::Caret, line);
                i += 1;
            }
            '(' => {
                push(TokenKind::LParen, line);
                i += 1;
            }
            ')' => {
                push(TokenKind::RParen, line);
                i += 1;
            }
            ':' => {
                if i + 1 < chars.len() && chars[i + 1] == '=' {
                    push(TokenKind::Assign, line);
                    i += 2;
                } else {
                    diags.error("Expected ':='", &SourceSpan::new(file, line));
                    i += 1;
                }
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match KEYWORDS.get(word.as_str()) {
                    Some(&kw) => push(TokenKind::Keyword(kw), line),
                    None => push(TokenKind::Ident(word), line),
                }
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let lexeme: String = chars[start..i].iter().collect();
                push(TokenKind::Number(lexeme), line);
            }
            _ => {
                diags.error(
                    format!("Unexpected character: '{}'", c),
                    &SourceSpan::new(file, line),
                );
                i += 1;
            }
        }
    }
    push(TokenKind::Eof, line);
    tokens
}

/// Which assignment section a statement belongs to.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Set,
    Equation,
    Initial,
}

struct Parser<'a> {
    file: Arc<str>,
    tokens: Vec<Token>,
    pos: usize,
    repo: &'a mut Repository,
    diags: &'a mut DiagnosticSink,
}

/// Parses one buffer into the repository.
///
/// The caller is expected to have stored `text` in a `SourceMap` under the
/// same name, so diagnostic spans resolve later.
pub fn parse_source(
    name: &Arc<str>,
    text: &str,
    repo: &mut Repository,
    diags: &mut DiagnosticSink,
) {
    let tokens = tokenize(name, text, diags);
    let mut parser = Parser {
        file: name.clone(),
        tokens,
        pos: 0,
        repo,
        diags,
    };
    parser.parse_program();
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn span(&self) -> SourceSpan {
        SourceSpan::new(&self.file, self.line())
    }

    fn bump(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if kind != TokenKind::Eof {
            self.pos += 1;
        }
        kind
    }

    fn at_keyword(&self, kw: Kw) -> bool {
        matches!(self.peek(), TokenKind::Keyword(k) if *k == kw)
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let span = self.span();
        self.diags.error(message, &span);
    }

    fn skip_terminators(&mut self) {
        while matches!(self.peek(), TokenKind::Terminator) {
            self.bump();
        }
    }

    /// Skips past the current statement after an error, consuming the
    /// trailing terminator run.  Stops short of section level keywords so
    /// a mangled statement cannot swallow the section that follows it.
    fn skip_statement(&mut self) {
        loop {
            match self.peek() {
                TokenKind::Terminator => {
                    self.skip_terminators();
                    return;
                }
                TokenKind::Eof
                | TokenKind::Keyword(Kw::End)
                | TokenKind::Keyword(Kw::Model)
                | TokenKind::Keyword(Kw::Process)
                | TokenKind::Keyword(Kw::Parameter)
                | TokenKind::Keyword(Kw::Variable)
                | TokenKind::Keyword(Kw::Unit)
                | TokenKind::Keyword(Kw::Set)
                | TokenKind::Keyword(Kw::Equation)
                | TokenKind::Keyword(Kw::Initial)
                | TokenKind::Keyword(Kw::SolutionParameters) => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// Consumes the terminator after a statement.  A following section
    /// keyword or END is accepted silently, everything else is an error.
    fn expect_terminator(&mut self) -> bool {
        match self.peek() {
            TokenKind::Terminator => {
                self.skip_terminators();
                true
            }
            TokenKind::Eof | TokenKind::Keyword(_) => true,
            _ => {
                self.error_here("Expected end of statement");
                self.skip_statement();
                false
            }
        }
    }

    fn expect_ident(&mut self, what: &str) -> Option<String> {
        match self.peek() {
            TokenKind::Ident(_) => match self.bump() {
                TokenKind::Ident(name) => Some(name),
                _ => unreachable!(),
            },
            _ => {
                self.error_here(format!("Expected {}", what));
                None
            }
        }
    }

    fn parse_program(&mut self) {
        loop {
            self.skip_terminators();
            match self.peek() {
                TokenKind::Eof => return,
                TokenKind::Keyword(Kw::Model) => {
                    self.bump();
                    self.parse_definition(false);
                }
                TokenKind::Keyword(Kw::Process) => {
                    self.bump();
                    self.parse_definition(true);
                }
                _ => {
                    self.error_here("Expected MODEL or PROCESS");
                    // resynchronize on the next top level keyword
                    loop {
                        match self.peek() {
                            TokenKind::Eof
                            | TokenKind::Keyword(Kw::Model)
                            | TokenKind::Keyword(Kw::Process) => break,
                            _ => {
                                self.bump();
                            }
                        }
                    }
                }
            }
        }
    }

    /// Parses one MODEL or PROCESS body; the introducing keyword is already
    /// consumed.
    fn parse_definition(&mut self, is_process: bool) {
        let span = self.span();
        let name = match self.expect_ident(if is_process {
            "a process name after PROCESS"
        } else {
            "a model name after MODEL"
        }) {
            Some(name) => name,
            None => {
                self.skip_statement();
                return;
            }
        };
        let mut model = Model::new(name, is_process);
        model.span = span;

        loop {
            self.skip_terminators();
            match self.peek() {
                TokenKind::Keyword(Kw::Parameter) => {
                    self.bump();
                    self.parse_memory_section(&mut model, true);
                }
                TokenKind::Keyword(Kw::Variable) => {
                    self.bump();
                    self.parse_memory_section(&mut model, false);
                }
                TokenKind::Keyword(Kw::Unit) => {
                    self.bump();
                    self.parse_unit_section(&mut model);
                }
                TokenKind::Keyword(Kw::Set) => {
                    self.bump();
                    self.parse_assignment_section(&mut model, Section::Set);
                }
                TokenKind::Keyword(Kw::Equation) => {
                    self.bump();
                    self.parse_assignment_section(&mut model, Section::Equation);
                }
                TokenKind::Keyword(Kw::Initial) => {
                    self.bump();
                    self.parse_assignment_section(&mut model, Section::Initial);
                }
                TokenKind::Keyword(Kw::SolutionParameters) => {
                    self.bump();
                    self.parse_solution_section(&mut model);
                }
                TokenKind::Keyword(Kw::End) => {
                    self.bump();
                    break;
                }
                TokenKind::Eof => {
                    let message = format!("Missing END in definition of {}", model.name);
                    let span = model.span.clone();
                    self.diags.error(message, &span);
                    model.errors_detected = true;
                    break;
                }
                _ => {
                    self.error_here(format!(
                        "Unexpected token in definition of {}",
                        model.name
                    ));
                    model.errors_detected = true;
                    self.bump();
                    self.skip_statement();
                }
            }
        }
        info!(
            "parsed {} {}",
            if model.is_process { "process" } else { "model" },
            model.name
        );
        self.repo.add(model, self.diags);
    }

    /// PARAMETER and VARIABLE sections have the same statement shape and
    /// differ only in the target table and the default type keyword.
    fn parse_memory_section(&mut self, model: &mut Model, is_parameter: bool) {
        loop {
            self.skip_terminators();
            let name = match self.peek() {
                TokenKind::Ident(_) => match self.bump() {
                    TokenKind::Ident(name) => name,
                    _ => unreachable!(),
                },
                _ => return,
            };
            let span = self.span();
            let mut mem_type = if is_parameter {
                MemoryType::Real
            } else {
                MemoryType::Any
            };
            if self.at_keyword(Kw::As) {
                self.bump();
                match self.peek() {
                    TokenKind::Keyword(Kw::Real) => {
                        self.bump();
                        mem_type = MemoryType::Real;
                    }
                    TokenKind::Keyword(Kw::Any) => {
                        self.bump();
                        mem_type = MemoryType::Any;
                    }
                    _ => {
                        self.error_here("Expected REAL or ANY after AS");
                        model.errors_detected = true;
                        self.skip_statement();
                        continue;
                    }
                }
            }
            if self.at_keyword(Kw::Default) {
                self.error_here(
                    "DEFAULT initialisers are not supported; assign the parameter in the SET section",
                );
                model.errors_detected = true;
                self.skip_statement();
                continue;
            }
            if !self.expect_terminator() {
                model.errors_detected = true;
                continue;
            }
            let descriptor = MemoryDescriptor {
                name: Path::from_component(name),
                mem_type,
                is_state_variable: false,
                span,
            };
            if is_parameter {
                model.add_parameter(descriptor, self.diags);
            } else {
                model.add_variable(descriptor, self.diags);
            }
        }
    }

    fn parse_unit_section(&mut self, model: &mut Model) {
        loop {
            self.skip_terminators();
            let name = match self.peek() {
                TokenKind::Ident(_) => match self.bump() {
                    TokenKind::Ident(name) => name,
                    _ => unreachable!(),
                },
                _ => return,
            };
            let span = self.span();
            if !self.at_keyword(Kw::As) {
                self.error_here("Expected AS and a model name in unit definition");
                model.errors_detected = true;
                self.skip_statement();
                continue;
            }
            self.bump();
            let model_type = match self.expect_ident("a model name after AS") {
                Some(name) => name,
                None => {
                    model.errors_detected = true;
                    self.skip_statement();
                    continue;
                }
            };
            if !self.expect_terminator() {
                model.errors_detected = true;
                continue;
            }
            model.add_unit(
                UnitDescriptor {
                    name,
                    model_type,
                    span,
                },
                self.diags,
            );
        }
    }

    /// SET, EQUATION and INITIAL statements all read `lhs := formula`.
    fn parse_assignment_section(&mut self, model: &mut Model, section: Section) {
        loop {
            self.skip_terminators();
            match self.peek() {
                TokenKind::Ident(_) | TokenKind::Dollar => {}
                _ => return,
            }
            let span = self.span();
            let lhs = match self.parse_access() {
                Some(access) => access,
                None => {
                    model.errors_detected = true;
                    self.skip_statement();
                    continue;
                }
            };
            if self.peek() != &TokenKind::Assign {
                self.error_here(format!("Expected ':=' after {}", lhs));
                model.errors_detected = true;
                self.skip_statement();
                continue;
            }
            self.bump();
            let rhs = match self.parse_formula() {
                Some(formula) => formula,
                None => {
                    model.errors_detected = true;
                    self.skip_statement();
                    continue;
                }
            };
            if !self.expect_terminator() {
                model.errors_detected = true;
                continue;
            }
            let equation = EquationDescriptor { lhs, rhs, span };
            match section {
                Section::Set => model.param_assignments.push(equation),
                Section::Equation => model.equations.push(equation),
                Section::Initial => model.initial_equations.push(equation),
            }
        }
    }

    fn parse_solution_section(&mut self, model: &mut Model) {
        loop {
            self.skip_terminators();
            let name = match self.peek() {
                TokenKind::Ident(_) => match self.bump() {
                    TokenKind::Ident(name) => name,
                    _ => unreachable!(),
                },
                _ => return,
            };
            if self.peek() != &TokenKind::Assign {
                self.error_here(format!("Expected ':=' after {}", name));
                model.errors_detected = true;
                self.skip_statement();
                continue;
            }
            self.bump();
            let value = match self.peek() {
                TokenKind::Number(_) => match self.bump() {
                    TokenKind::Number(value) => value,
                    _ => unreachable!(),
                },
                _ => {
                    self.error_here(format!("Expected a number for {}", name));
                    model.errors_detected = true;
                    self.skip_statement();
                    continue;
                }
            };
            match name.as_str() {
                "ReportingInterval" => model.solution_parameters.reporting_interval = value,
                "SimulationTime" => model.solution_parameters.simulation_time = value,
                _ => {
                    self.error_here(format!(
                        "Unknown solution parameter: {}\n\
                         Expected ReportingInterval or SimulationTime.",
                        name
                    ));
                    model.errors_detected = true;
                }
            }
            if !self.expect_terminator() {
                model.errors_detected = true;
            }
        }
    }

    /// Parses `[$] name { "." name }` into a memory access.
    fn parse_access(&mut self) -> Option<MemoryAccess> {
        let time_derivative = if self.peek() == &TokenKind::Dollar {
            self.bump();
            true
        } else {
            false
        };
        let mut path = Path::from_component(self.expect_ident("an identifier")?);
        while self.peek() == &TokenKind::Dot {
            self.bump();
            path.push(self.expect_ident("an identifier after '.'")?);
        }
        Some(MemoryAccess {
            path,
            time_derivative,
        })
    }

    /// Parses a mathematical expression into reverse Polish form.
    fn parse_formula(&mut self) -> Option<Formula> {
        let mut formula = Formula::new();
        self.parse_expr(0, &mut formula)?;
        Some(formula)
    }

    /// Precedence climbing; atoms and operators are appended to `out` in
    /// postfix order.  Binding powers: `+ -` (1,2), `* /` (3,4), unary
    /// sign 5, `^` (6,5) so exponentiation is right associative and binds
    /// tighter than the sign, as in the target language.
    fn parse_expr(&mut self, min_bp: u8, out: &mut Formula) -> Option<()> {
        match self.peek().clone() {
            TokenKind::Number(_) => {
                if let TokenKind::Number(lexeme) = self.bump() {
                    out.push_number(lexeme);
                }
            }
            TokenKind::Ident(_) | TokenKind::Dollar => {
                let access = self.parse_access()?;
                out.push_access(access);
            }
            TokenKind::LParen => {
                self.bump();
                self.parse_expr(0, out)?;
                if self.peek() != &TokenKind::RParen {
                    self.error_here("Expected ')'");
                    return None;
                }
                self.bump();
                out.push_bracket();
            }
            TokenKind::Minus => {
                self.bump();
                self.parse_expr(5, out)?;
                out.push_operator(MathOp::Sub, 1);
            }
            TokenKind::Plus => {
                self.bump();
                self.parse_expr(5, out)?;
                out.push_operator(MathOp::Add, 1);
            }
            _ => {
                self.error_here("Expected an expression");
                return None;
            }
        }

        loop {
            let (op, lbp, rbp) = match self.peek() {
                TokenKind::Plus => (MathOp::Add, 1, 2),
                TokenKind::Minus => (MathOp::Sub, 1, 2),
                TokenKind::Star => (MathOp::Mul, 3, 4),
                TokenKind::Slash => (MathOp::Div, 3, 4),
                TokenKind::Caret => (MathOp::Pow, 6, 5),
                _ => break,
            };
            if lbp < min_bp {
                break;
            }
            self.bump();
            self.parse_expr(rbp, out)?;
            out.push_operator(op, 2);
        }
        Some(())
    }
}
