//! Multiplexed kernel source files.
//!
//! One file carries several named kernels separated by a literal delimiter:
//!
//! ```text
//! preamble, ignored
//! @@ sin_add_double @@
//! // commentary before the directive is dropped
//! #version 450
//! ...
//! @@ sin_add_float @@
//! #version 450
//! ...
//! ```
//!
//! After the first delimiter the segments alternate name, body, name, body.
//! Order is kept exactly: test selection is positional.

use serde::Deserialize;
use thiserror::Error;

use crate::diagnostic::Diagnostic;
use crate::span::Span;

pub const DEFAULT_DELIMITER: &str = "@@";
pub const DEFAULT_DIRECTIVE: &str = "#version";

/// How a multiplexed source file is cut into kernel units.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceFormat {
    pub delimiter: String,
    /// Marker the effective kernel body starts at.
    pub directive: String,
}

impl Default for SourceFormat {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            directive: DEFAULT_DIRECTIVE.to_string(),
        }
    }
}

/// One named kernel body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelUnit {
    pub name: String,
    pub body: String,
    /// Location of the name in the original file.
    pub span: Span,
}

impl KernelUnit {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
            span: Span::dummy(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error(
        "malformed kernel source: {segments} segments follow the first '{delimiter}', \
         expected name/body pairs"
    )]
    Unbalanced {
        segments: usize,
        delimiter: String,
        dangling: Span,
    },

    #[error("kernel unit #{position} has an empty name")]
    EmptyName { position: usize, span: Span },

    #[error("kernel delimiter must not be empty")]
    EmptyDelimiter,
}

impl SourceError {
    pub fn span(&self) -> Span {
        match self {
            SourceError::Unbalanced { dangling, .. } => *dangling,
            SourceError::EmptyName { span, .. } => *span,
            SourceError::EmptyDelimiter => Span::dummy(),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string(), self.span());
        match self {
            SourceError::Unbalanced { delimiter, .. } => diag
                .with_label("this name has no body".to_string())
                .with_help(format!(
                    "every kernel is written as `{d} name {d}` followed by its body",
                    d = delimiter
                )),
            SourceError::EmptyName { .. } => {
                diag.with_label("expected a kernel name between these delimiters".to_string())
            }
            SourceError::EmptyDelimiter => {
                diag.with_help("set `source.delimiter` to a token such as \"@@\"".to_string())
            }
        }
    }
}

/// Cut `text` into ordered kernel units.
///
/// Input without any delimiter yields no units. An odd number of segments
/// after the first delimiter is an error, never a silent truncation.
pub fn split(text: &str, format: &SourceFormat) -> Result<Vec<KernelUnit>, SourceError> {
    let delimiter = format.delimiter.as_str();
    if delimiter.is_empty() {
        return Err(SourceError::EmptyDelimiter);
    }

    let marks: Vec<usize> = text.match_indices(delimiter).map(|(at, _)| at).collect();
    let segments: Vec<Span> = marks
        .iter()
        .enumerate()
        .map(|(k, &at)| {
            let end = marks.get(k + 1).copied().unwrap_or(text.len());
            Span::new(at + delimiter.len(), end)
        })
        .collect();

    if segments.len() % 2 != 0 {
        let last = segments[segments.len() - 1];
        let line_end = text[last.start..last.end]
            .find('\n')
            .map_or(last.end, |nl| last.start + nl);
        return Err(SourceError::Unbalanced {
            segments: segments.len(),
            delimiter: delimiter.to_string(),
            dangling: Span::new(last.start - delimiter.len(), line_end),
        });
    }

    segments
        .chunks_exact(2)
        .enumerate()
        .map(|(position, pair)| {
            let (name_seg, body_seg) = (pair[0], pair[1]);
            let raw_name = &text[name_seg.start..name_seg.end];
            let name = raw_name.trim();
            if name.is_empty() {
                return Err(SourceError::EmptyName {
                    position,
                    span: Span::new(name_seg.start - delimiter.len(), body_seg.start),
                });
            }
            let lead = raw_name.len() - raw_name.trim_start().len();
            let name_start = name_seg.start + lead;
            Ok(KernelUnit {
                name: name.to_string(),
                body: trim_to_directive(&text[body_seg.start..body_seg.end], &format.directive)
                    .to_string(),
                span: Span::new(name_start, name_start + name.len()),
            })
        })
        .collect()
}

/// Non-fatal findings on split units: bodies without the directive and
/// repeated names. Neither stops a run.
pub fn lint(units: &[KernelUnit], format: &SourceFormat) -> Vec<Diagnostic> {
    let mut warnings = Vec::new();
    for (position, unit) in units.iter().enumerate() {
        if !format.directive.is_empty() && !unit.body.starts_with(&format.directive) {
            warnings.push(
                Diagnostic::warning(
                    format!(
                        "kernel '{}' has no '{}' directive",
                        unit.name, format.directive
                    ),
                    unit.span,
                )
                .with_help("the device compiler will likely reject this body".to_string()),
            );
        }
        if let Some(first) = units[..position].iter().position(|u| u.name == unit.name) {
            warnings.push(
                Diagnostic::warning(format!("duplicate kernel name '{}'", unit.name), unit.span)
                    .with_note(format!(
                        "also used by unit #{}; units are selected by position, not name",
                        first
                    )),
            );
        }
    }
    warnings
}

/// Drop everything before the first directive marker. Bodies without the
/// marker are kept whole so the compiler can report on them.
fn trim_to_directive<'a>(body: &'a str, directive: &str) -> &'a str {
    if directive.is_empty() {
        return body.trim();
    }
    match body.find(directive) {
        Some(at) => body[at..].trim_end(),
        None => body.trim(),
    }
}
