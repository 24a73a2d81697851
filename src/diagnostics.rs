//! User facing diagnostics. Passes never stop on these: they are pushed into
//! the [`DiagnosticCollector`] of the module being compiled and merged into the
//! shared [`Reporter`] once the module is done.

use colored::Colorize;
use strum::{Display, EnumIter};

use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum DiagnosticKind {
    UnreachableCode,
    NotAllPathsReturn,
    UninitializedField,
    FieldUsedBeforeInitialization,
    CircularCreate,
}

impl DiagnosticKind {
    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticKind::UnreachableCode => Severity::Warning,
            DiagnosticKind::NotAllPathsReturn
            | DiagnosticKind::UninitializedField
            | DiagnosticKind::FieldUsedBeforeInitialization
            | DiagnosticKind::CircularCreate => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub span: Span,
    pub message: String,
    /// Which compiler function raised the diagnostic
    pub origin: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            message: message.into(),
            origin: None,
        }
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}

impl core::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(origin) = &self.origin {
            writeln!(f, "{}: {}", "backtrace".blue(), origin)?;
        }

        let tag = match self.severity() {
            Severity::Warning => "warning".yellow(),
            Severity::Error => "error".red(),
        };

        write!(
            f,
            "{tag}[{}]: {} {}",
            self.kind,
            self.message,
            format!("(at {})", self.span).white()
        )
    }
}

/// Expands to the name of the enclosing function
macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .unwrap_or("<unknown>")
    }};
}

/// Pushes a diagnostic into a collector. With the `error-backtrace` feature
/// the raising function and source location are recorded alongside it.
macro_rules! report {
    ($collector:expr, $kind:expr, $span:expr, $($message:tt)+) => {{
        #[allow(unused_mut)]
        let mut diagnostic =
            $crate::diagnostics::Diagnostic::new($kind, $span, format!($($message)+));

        #[cfg(feature = "error-backtrace")]
        {
            diagnostic.origin = Some(format!(
                "{}::{} (at {}:{}:{})",
                module_path!(),
                $crate::diagnostics::function!(),
                file!(),
                line!(),
                column!()
            ));
        }

        $collector.report(diagnostic)
    }};
}

pub(crate) use function;
pub(crate) use report;

/// Diagnostics raised while compiling a single module
#[derive(Debug, Default, Clone)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
    unreachable_regions: Vec<Span>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a diagnostic unless it falls inside code already reported as
    /// unreachable. Returns whether it was kept.
    pub fn report(&mut self, diagnostic: Diagnostic) -> bool {
        if self
            .unreachable_regions
            .iter()
            .any(|region| region.contains(diagnostic.span))
        {
            return false;
        }

        if diagnostic.kind == DiagnosticKind::UnreachableCode {
            self.unreachable_regions.push(diagnostic.span);
        }

        self.diagnostics.push(diagnostic);
        true
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn has_kind(&self, kind: DiagnosticKind) -> bool {
        self.diagnostics.iter().any(|d| d.kind == kind)
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

/// The diagnostics of a whole compilation
#[derive(Debug, Default)]
pub struct Reporter {
    diagnostics: Vec<Diagnostic>,
    deny_warnings: bool,
}

impl Reporter {
    pub fn new(deny_warnings: bool) -> Self {
        Self {
            diagnostics: Vec::new(),
            deny_warnings,
        }
    }

    pub fn merge(&mut self, collector: DiagnosticCollector) {
        self.diagnostics.extend(collector.into_diagnostics());
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity() == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics.len() - self.error_count()
    }

    /// Whether the compilation must be considered failed
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0 || (self.deny_warnings && self.warning_count() > 0)
    }

    pub fn print(&self) {
        for diagnostic in &self.diagnostics {
            eprintln!("{diagnostic}");
        }
    }
}
