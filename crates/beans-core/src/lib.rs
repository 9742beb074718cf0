//! In-memory model of bean configuration documents.
//!
//! A [`ProjectRegistry`] owns [`DocumentNode`]s. Each node populates itself on first access by
//! running its [`DocumentParser`] under a timeout, expanding imports and running the extension
//! pipeline; afterwards it serves a frozen snapshot. Lookups, parent-chain merging and reference
//! walks run against a [`ResolveContext`], either one document or a [`DocumentSet`].

mod builder;
mod document;
mod error;
mod events;
mod extensions;
mod imports;
mod memory;
mod parser;
mod references;
mod registry;
mod resolve;

pub use document::{DocumentContents, DocumentKind, DocumentNode, Element, ImportRecord};
pub use error::{BeansError, ExtensionError, ParseAbort, ResourceError};
pub use events::{ChannelListener, DocumentEvent, DocumentListener, ListenerId, RecordingListener};
pub use extensions::{Extension, ExtensionContext, ExtensionRegistry, RegisterError};
pub use memory::{MemoryParser, MemoryResourceResolver};
pub use parser::{Collaborators, DocumentParser, LoadSettings, ResourceResolver};
pub use references::{transitive_references, ElementRef, INTERCEPTOR_NAMES};
pub use registry::{DocumentSet, ProjectRegistry};
pub use resolve::{
    bean_class, inner_beans, merged_definition, resolve, BeanHandle, ResolveContext, SetView,
};
