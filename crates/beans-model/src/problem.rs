use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        f.write_str(name)
    }
}

/// Where an element was declared.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub resource: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl SourceLocation {
    pub fn new(resource: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            resource: resource.into(),
            start_line,
            end_line,
        }
    }

    pub fn line(resource: impl Into<String>, line: u32) -> Self {
        Self::new(resource, line, line)
    }
}

/// A recoverable problem recorded while loading a document.
///
/// Problems never cross the document boundary as errors; hosts render them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Problem {
    pub severity: Severity,
    pub message: String,
    pub resource: String,
    /// 1-based line, when known.
    pub line: Option<u32>,
}

impl Problem {
    pub fn error(message: impl Into<String>, resource: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            resource: resource.into(),
            line,
        }
    }

    pub fn warning(
        message: impl Into<String>,
        resource: impl Into<String>,
        line: Option<u32>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            resource: resource.into(),
            line,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(
                f,
                "{}: {} ({}:{line})",
                self.severity, self.message, self.resource
            ),
            None => write!(f, "{}: {} ({})", self.severity, self.message, self.resource),
        }
    }
}
