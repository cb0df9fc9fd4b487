//! Diagnostics and their rendering.
//!
//! Diagnostics are values, not exceptions.  Every stage of the compiler
//! appends to a `DiagnosticSink` owned by the compilation session and keeps
//! going, so the user sees as many problems as possible per run.  The sink is
//! the only shared mutable state in the pipeline; making it per-session (one
//! sink per `Compiler` value) keeps concurrent compilations trivially safe.
//!
//! A diagnostic optionally carries a `SourceSpan`, an opaque `file:line`
//! token filled in by the parser and forwarded untouched by every later
//! stage.  `to_annotations` combines diagnostics with the retained source
//! buffers to produce `annotate_snippets` output for the terminal.

use crate::parser::SourceMap;
use annotate_snippets::display_list::DisplayList;
use annotate_snippets::display_list::FormatOptions;
use annotate_snippets::snippet::Annotation;
use annotate_snippets::snippet::AnnotationType;
use annotate_snippets::snippet::Slice;
use annotate_snippets::snippet::Snippet;
use std::fmt;
use std::sync::Arc;

/// A position in the Siml source, with the granularity of one line.
///
/// The parser attaches one of these to every descriptor it produces; the
/// later stages never look inside, they only hand it back to diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSpan {
    /// Name of the source file, as given on the command line.
    pub file: Arc<str>,
    /// 1-based line number.
    pub line: u32,
}

impl SourceSpan {
    /// A span pointing at a line of a named file.
    pub fn new(file: &Arc<str>, line: u32) -> SourceSpan {
        SourceSpan {
            file: file.clone(),
            line,
        }
    }

    /// The span of descriptors built in memory rather than parsed.
    pub fn none() -> SourceSpan {
        SourceSpan {
            file: "".into(),
            line: 0,
        }
    }

    /// True if this span does not point anywhere.
    pub fn is_none(&self) -> bool {
        self.file.is_empty()
    }
}

impl Default for SourceSpan {
    fn default() -> SourceSpan {
        SourceSpan::none()
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            Ok(())
        } else {
            write!(f, "{}:{}", self.file, self.line)
        }
    }
}

/// How bad a diagnostic is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Worth mentioning.
    Info,
    /// Suspicious but compilable.
    Warning,
    /// The compilation cannot produce output.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "Info",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
        })
    }
}

/// One diagnostic record.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Error, warning or info.
    pub severity: Severity,
    /// The rendered message.  May span several lines.
    pub message: String,
    /// Where the problem was found, if known.
    pub span: Option<SourceSpan>,
}

impl Diagnostic {
    /// An error diagnostic with a span.
    pub fn error(message: impl Into<String>, span: &SourceSpan) -> Diagnostic {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            span: span_opt(span),
        }
    }

    /// An error diagnostic without a position.
    pub fn error_nospan(message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            span: None,
        }
    }

    /// A warning diagnostic with a span.
    pub fn warning(message: impl Into<String>, span: &SourceSpan) -> Diagnostic {
        Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            span: span_opt(span),
        }
    }

    /// An info diagnostic with a span.
    pub fn info(message: impl Into<String>, span: &SourceSpan) -> Diagnostic {
        Diagnostic {
            severity: Severity::Info,
            message: message.into(),
            span: span_opt(span),
        }
    }
}

fn span_opt(span: &SourceSpan) -> Option<SourceSpan> {
    if span.is_none() {
        None
    } else {
        Some(span.clone())
    }
}

impl fmt::Display for Diagnostic {
    /// The plain rendering: `<loc>: <severity>: \n<message>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.span {
            Some(span) => write!(f, "{}: {}: \n{}", span, self.severity, self.message),
            None => write!(f, ": {}: \n{}", self.severity, self.message),
        }
    }
}

/// Append-only store of diagnostics for one compilation.
#[derive(Default, Debug)]
pub struct DiagnosticSink {
    diags: Vec<Diagnostic>,
}

impl DiagnosticSink {
    /// An empty sink.
    pub fn new() -> DiagnosticSink {
        DiagnosticSink::default()
    }

    /// Appends one diagnostic.
    pub fn push(&mut self, diag: Diagnostic) {
        self.diags.push(diag);
    }

    /// Shorthand for pushing an error with a span.
    pub fn error(&mut self, message: impl Into<String>, span: &SourceSpan) {
        self.push(Diagnostic::error(message, span));
    }

    /// All diagnostics, in the order they were produced.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diags
    }

    /// True if any diagnostic has `Error` severity.
    pub fn has_errors(&self) -> bool {
        self.diags.iter().any(|d| d.severity == Severity::Error)
    }

    /// Number of diagnostics recorded so far.
    pub fn len(&self) -> usize {
        self.diags.len()
    }

    /// True if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.diags.is_empty()
    }
}

fn annotation_type(severity: Severity) -> AnnotationType {
    match severity {
        Severity::Info => AnnotationType::Info,
        Severity::Warning => AnnotationType::Warning,
        Severity::Error => AnnotationType::Error,
    }
}

/// Converts diagnostics into `annotate_snippets` snippets for display.
///
/// The offending source line is looked up in the retained source buffers;
/// diagnostics without a span, or whose span no longer resolves, render with
/// a bare title.  Used by the CLI to print everything to stderr at the end
/// of a compilation.
pub fn to_annotations<'a>(
    sources: &'a SourceMap,
    diags: &'a [Diagnostic],
) -> Vec<Snippet<'a>> {
    diags
        .iter()
        .map(|diag| {
            let slices = match &diag.span {
                Some(span) => match sources.line(&span.file, span.line) {
                    Some(text) => vec![Slice {
                        source: text,
                        line_start: span.line as usize,
                        origin: Some(&span.file),
                        annotations: vec![],
                        fold: false,
                    }],
                    None => vec![],
                },
                None => vec![],
            };
            Snippet {
                title: Some(Annotation {
                    id: None,
                    label: Some(&diag.message),
                    annotation_type: annotation_type(diag.severity),
                }),
                footer: vec![],
                slices,
                opt: FormatOptions {
                    color: true,
                    ..Default::default()
                },
            }
        })
        .collect()
}

/// Renders all diagnostics to a string, one display list per diagnostic.
pub fn render_to_string(sources: &SourceMap, diags: &[Diagnostic]) -> String {
    let mut out = String::new();
    for snippet in to_annotations(sources, diags) {
        out.push_str(&DisplayList::from(snippet).to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format_with_span() {
        let span = SourceSpan::new(&"model.siml".into(), 12);
        let diag = Diagnostic::error("Undefined parameter: k", &span);
        assert_eq!(
            diag.to_string(),
            "model.siml:12: Error: \nUndefined parameter: k"
        );
    }

    #[test]
    fn display_format_without_span() {
        let diag = Diagnostic::error_nospan("no input");
        assert_eq!(diag.to_string(), ": Error: \nno input");
    }

    #[test]
    fn sink_tracks_errors() {
        let mut sink = DiagnosticSink::new();
        assert!(!sink.has_errors());
        sink.push(Diagnostic::info("note", &SourceSpan::none()));
        assert!(!sink.has_errors());
        sink.error("boom", &SourceSpan::none());
        assert!(sink.has_errors());
        assert_eq!(sink.len(), 2);
    }
}
