//! Data model for bean-definition documents.
//!
//! This crate holds the plain data shared by the rest of the workspace:
//! - [`Value`]: the tagged union used for constructor arguments and properties
//! - [`Bean`]: one named component definition, plus [`Group`] and [`Alias`]
//! - raw parser records ([`RawBean`], [`ParsedDocument`], ...) produced by a document parser
//! - [`Problem`]: recoverable problems collected while loading a document
//! - [`Connection`]: reference edges discovered between beans
//!
//! Nothing here locks or performs I/O; see `beans-core` for the document graph.

mod bean;
mod connection;
mod ids;
mod problem;
mod raw;
mod value;

pub use bean::{
    Alias, Bean, ConstructorArg, Group, MethodOverride, MethodOverrideKind, DEFAULT_SCOPE,
};
pub use connection::{Connection, ConnectionKind};
pub use ids::{BeanId, ContextId, DocumentId, ElementId};
pub use problem::{Problem, Severity, SourceLocation};
pub use raw::{
    ParsedDocument, RawAlias, RawBean, RawConstructorArg, RawGroup, RawImport, RawProperty,
    RawValue,
};
pub use value::{value_name, Value};
