use crate::span::Span;

/// A harness diagnostic anchored in a kernel source file.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub label: Option<String>,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Diagnostic {
    pub fn error(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message,
            span,
            label: None,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn warning(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            message,
            span,
            label: None,
            notes: Vec::new(),
            help: None,
        }
    }

    /// Text attached to the highlighted span (defaults to the message).
    pub fn with_label(mut self, label: String) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    /// Render the diagnostic to stderr using ariadne.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };

        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        };

        // Clamp into the source so a stale span never panics the renderer.
        let start = self.span.start.min(source.len());
        let end = self.span.end.clamp(start, source.len());
        let label = self.label.as_deref().unwrap_or(&self.message);

        let mut report = Report::build(kind, filename, start)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, start..end))
                    .with_message(label)
                    .with_color(color),
            );

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        if let Err(e) = report.finish().eprint((filename, Source::from(source))) {
            eprintln!("error: {} ({})", self.message, e);
        }
    }
}

/// Render a list of diagnostics.
pub fn render_diagnostics(diagnostics: &[Diagnostic], filename: &str, source: &str) {
    for diag in diagnostics {
        diag.render(filename, source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let d = Diagnostic::error("unbalanced delimiters".to_string(), Span::new(10, 15));
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.message, "unbalanced delimiters");
        assert_eq!(d.span.start, 10);
        assert_eq!(d.span.end, 15);
        assert!(d.label.is_none());
        assert!(d.notes.is_empty());
        assert!(d.help.is_none());
    }

    #[test]
    fn test_chained_builders() {
        let d = Diagnostic::warning("missing directive".to_string(), Span::new(0, 5))
            .with_label("body starts here".to_string())
            .with_note("note 1".to_string())
            .with_help("add `#version 450`".to_string())
            .with_note("note 2".to_string());
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.label.as_deref(), Some("body starts here"));
        assert_eq!(d.notes, vec!["note 1", "note 2"]);
        assert!(d.help.is_some());
    }

    #[test]
    fn test_render_does_not_panic() {
        let source = "@@ sin_add_double @@\n#version 450\n@@ sin_add_float\n";
        let d = Diagnostic::error("unbalanced".to_string(), Span::new(36, 52))
            .with_note("found 3 segments".to_string());
        d.render("kernels.glsl", source);
    }

    #[test]
    fn test_render_clamps_out_of_range_span() {
        let source = "@@ a @@";
        let d = Diagnostic::error("stale".to_string(), Span::new(40, 90));
        d.render("kernels.glsl", source);
    }

    #[test]
    fn test_render_diagnostics_multiple() {
        let source = "@@ a @@ body\n@@ @@ body\n";
        let diagnostics = vec![
            Diagnostic::warning("first".to_string(), Span::new(3, 4)),
            Diagnostic::warning("second".to_string(), Span::new(16, 17)),
        ];
        render_diagnostics(&diagnostics, "kernels.glsl", source);
    }
}
