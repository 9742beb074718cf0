//! Name lookup, parent-chain merging and class resolution over a document or a document set.

use std::collections::BTreeSet;
use std::sync::Arc;

use beans_model::{Bean, BeanId, ContextId, DocumentId};

use crate::document::DocumentNode;
use crate::parser::LoadSettings;

/// A bean together with the document that declares it.
#[derive(Clone, Debug, PartialEq)]
pub struct BeanHandle {
    pub document: DocumentId,
    pub bean: Arc<Bean>,
}

impl BeanHandle {
    pub fn new(document: DocumentId, bean: Arc<Bean>) -> Self {
        Self { document, bean }
    }

    pub fn id(&self) -> BeanId {
        BeanId::new(self.document.clone(), self.bean.name.clone())
    }

    pub fn name(&self) -> &str {
        &self.bean.name
    }
}

/// Documents of one document set, frozen for a single query.
#[derive(Clone, Debug)]
pub struct SetView {
    name: String,
    documents: Vec<Arc<DocumentNode>>,
    profiles: BTreeSet<String>,
    allow_overriding: bool,
    settings: Arc<LoadSettings>,
}

impl SetView {
    pub fn new(
        name: impl Into<String>,
        documents: Vec<Arc<DocumentNode>>,
        profiles: BTreeSet<String>,
        allow_overriding: bool,
        settings: Arc<LoadSettings>,
    ) -> Self {
        Self {
            name: name.into(),
            documents,
            profiles,
            allow_overriding,
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn documents(&self) -> &[Arc<DocumentNode>] {
        &self.documents
    }

    pub fn profiles(&self) -> &BTreeSet<String> {
        &self.profiles
    }

    pub fn allow_overriding(&self) -> bool {
        self.allow_overriding
    }
}

/// Where a name is looked up.
#[derive(Clone, Debug)]
pub enum ResolveContext {
    Document(Arc<DocumentNode>),
    Set(Arc<SetView>),
}

impl ResolveContext {
    pub fn id(&self) -> ContextId {
        match self {
            ResolveContext::Document(document) => ContextId::Document(document.id().clone()),
            ResolveContext::Set(set) => ContextId::Set(set.name.clone()),
        }
    }

    pub fn settings(&self) -> &LoadSettings {
        match self {
            ResolveContext::Document(document) => &document.collaborators().settings,
            ResolveContext::Set(set) => &set.settings,
        }
    }

    /// Active profiles; `None` outside a document set, where no group is filtered.
    pub fn active_profiles(&self) -> Option<&BTreeSet<String>> {
        match self {
            ResolveContext::Document(_) => None,
            ResolveContext::Set(set) => Some(&set.profiles),
        }
    }

    /// Every visible bean, groups filtered by the active profiles.
    pub fn beans(&self) -> Vec<BeanHandle> {
        match self {
            ResolveContext::Document(document) => document.all_beans(None),
            ResolveContext::Set(set) => set
                .documents
                .iter()
                .flat_map(|document| document.all_beans(Some(&set.profiles)))
                .collect(),
        }
    }

    fn find_direct(&self, name: &str) -> Option<BeanHandle> {
        match self {
            ResolveContext::Document(document) => document.find_direct(name),
            ResolveContext::Set(set) if set.allow_overriding => set
                .documents
                .iter()
                .rev()
                .find_map(|document| document.find_direct(name)),
            ResolveContext::Set(set) => set
                .documents
                .iter()
                .find_map(|document| document.find_direct(name)),
        }
    }

    fn alias_target(&self, name: &str) -> Option<String> {
        let alias = match self {
            ResolveContext::Document(document) => document.alias(name),
            ResolveContext::Set(set) => set
                .documents
                .iter()
                .find_map(|document| document.alias(name)),
        };
        alias.map(|alias| alias.target)
    }

    fn find_in_groups(&self, name: &str) -> Option<BeanHandle> {
        match self {
            ResolveContext::Document(document) => document.find_in_groups(name, None),
            ResolveContext::Set(set) => set
                .documents
                .iter()
                .find_map(|document| document.find_in_groups(name, Some(&set.profiles))),
        }
    }
}

/// Looks `name` up: direct beans, then one alias hop, then nested groups.
pub fn resolve(name: &str, ctx: &ResolveContext) -> Option<BeanHandle> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    ctx.find_direct(name)
        .or_else(|| {
            ctx.alias_target(name)
                .and_then(|target| ctx.find_direct(&target))
        })
        .or_else(|| ctx.find_in_groups(name))
}

/// Folds `bean` with its ancestor chain into one effective definition.
///
/// The walk stops at the first unresolvable parent, at a repeated ancestor, or at an ancestor
/// named like `bean` itself. The result keeps the `parent_name` of the top-most ancestor reached.
pub fn merged_definition(bean: &Bean, ctx: &ResolveContext) -> Bean {
    let ancestors = ancestors(bean, ctx);
    let Some((root, rest)) = ancestors.split_last() else {
        return bean.clone();
    };

    let mut merged = Bean::clone(root);
    for ancestor in rest.iter().rev() {
        merged.override_from(ancestor);
    }
    merged.override_from(bean);
    merged
}

/// Ancestors nearest first.
fn ancestors(bean: &Bean, ctx: &ResolveContext) -> Vec<Arc<Bean>> {
    let mut out: Vec<Arc<Bean>> = Vec::new();
    let mut names = BTreeSet::new();
    let mut next = bean.parent_name.clone();
    while let Some(parent_name) = next.take() {
        if parent_name == bean.name || !names.insert(parent_name.clone()) {
            tracing::debug!(
                target: "beans.resolve",
                bean = %bean.name,
                parent = %parent_name,
                "parent chain cycle"
            );
            break;
        }
        let Some(parent) = resolve(&parent_name, ctx) else {
            break;
        };
        next = parent.bean.parent_name.clone();
        out.push(parent.bean);
    }
    out
}

/// Class name of `bean`, inherited through its parent chain when unset.
pub fn bean_class(bean: &Bean, ctx: &ResolveContext) -> Option<String> {
    if let Some(class) = &bean.class_name {
        return Some(class.clone());
    }
    ancestors(bean, ctx)
        .into_iter()
        .find_map(|ancestor| ancestor.class_name.clone())
}

/// Inner beans of `bean`; with `recursive`, inner beans of inner beans too, depth first.
pub fn inner_beans(bean: &Bean, recursive: bool) -> Vec<Arc<Bean>> {
    let mut out = Vec::new();
    for inner in bean.inner_beans() {
        let nested = if recursive {
            inner_beans(&inner, true)
        } else {
            Vec::new()
        };
        out.push(inner);
        out.extend(nested);
    }
    out
}
