use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a document: its registry name, or the resource path for imported documents.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A bean addressed by the document that declares it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BeanId {
    pub document: DocumentId,
    pub name: String,
}

impl BeanId {
    pub fn new(document: impl Into<DocumentId>, name: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for BeanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document, self.name)
    }
}

/// The element a [`crate::Connection`] originates from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementId {
    Bean(BeanId),
    ConstructorArg { bean: BeanId, index: usize },
    Property { bean: BeanId, name: String },
    Group {
        document: DocumentId,
        name: Option<String>,
        line: u32,
    },
}

impl ElementId {
    /// The bean that owns this element, if any.
    pub fn bean(&self) -> Option<&BeanId> {
        match self {
            ElementId::Bean(bean)
            | ElementId::ConstructorArg { bean, .. }
            | ElementId::Property { bean, .. } => Some(bean),
            ElementId::Group { .. } => None,
        }
    }
}

/// The lookup context a query was evaluated in.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextId {
    Document(DocumentId),
    Set(String),
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextId::Document(id) => write!(f, "document {id}"),
            ContextId::Set(name) => write!(f, "set {name}"),
        }
    }
}
