use beans_model::ParsedDocument;
use thiserror::Error;

/// Rejected preconditions of query and registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BeansError {
    #[error("bean '{bean}' has no {element}")]
    UnknownElement { bean: String, element: String },
    #[error("unknown document '{0}'")]
    UnknownDocument(String),
    #[error("unknown document set '{0}'")]
    UnknownDocumentSet(String),
    #[error("document set '{0}' already exists")]
    DuplicateDocumentSet(String),
}

/// A parser condition that stops population of one document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseAbort {
    #[error("resource '{resource}' not found")]
    NotFound { resource: String },
    /// Everything parsed before the failure is kept in `partial`.
    #[error("{message}")]
    Fatal {
        message: String,
        line: Option<u32>,
        partial: ParsedDocument,
    },
}

impl ParseAbort {
    pub fn fatal(message: impl Into<String>, line: Option<u32>) -> Self {
        ParseAbort::Fatal {
            message: message.into(),
            line,
            partial: ParsedDocument::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to resolve '{pattern}': {message}")]
pub struct ResourceError {
    pub pattern: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExtensionError {
    pub message: String,
}

impl ExtensionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
