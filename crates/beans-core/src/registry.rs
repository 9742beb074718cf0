//! The documents of one project, and the named sets they are queried in.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use beans_model::DocumentId;
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::document::{DocumentKind, DocumentNode};
use crate::events::{DocumentEvent, DocumentListener};
use crate::parser::Collaborators;
use crate::resolve::{bean_class, resolve, BeanHandle, ResolveContext, SetView};
use crate::BeansError;

/// A named collection of documents queried together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentSet {
    pub name: String,
    /// Lookup order; with `allow_overriding` the last document defining a name wins.
    pub documents: Vec<DocumentId>,
    /// Active profiles. Groups declaring disjoint profiles are invisible in this set.
    pub profiles: BTreeSet<String>,
    pub allow_overriding: bool,
}

impl DocumentSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: Vec::new(),
            profiles: BTreeSet::new(),
            allow_overriding: true,
        }
    }

    pub fn with_document(mut self, document: impl Into<DocumentId>) -> Self {
        self.documents.push(document.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profiles.insert(profile.into());
        self
    }

    pub fn with_overriding(mut self, allow_overriding: bool) -> Self {
        self.allow_overriding = allow_overriding;
        self
    }

    pub fn contains(&self, document: &DocumentId) -> bool {
        self.documents.contains(document)
    }
}

struct SetEntry {
    set: DocumentSet,
    generation: Arc<AtomicU64>,
    /// Auto-detection locator that contributed this set.
    locator: Option<String>,
}

#[derive(Default)]
struct RegistryState {
    manual: IndexMap<DocumentId, Arc<DocumentNode>>,
    auto_detected: IndexMap<DocumentId, Arc<DocumentNode>>,
    auto_by_locator: BTreeMap<String, Vec<DocumentId>>,
    /// Manual entries shadow auto-detected ones. Rebuilt on every mutation.
    all: IndexMap<DocumentId, Arc<DocumentNode>>,
    sets: IndexMap<String, SetEntry>,
}

impl RegistryState {
    fn rebuild(&mut self) {
        let mut all = self.manual.clone();
        for (id, node) in &self.auto_detected {
            all.entry(id.clone()).or_insert_with(|| Arc::clone(node));
        }
        self.all = all;
    }

    fn forget_auto_detected(&mut self, id: &DocumentId) {
        self.auto_detected.shift_remove(id);
        for ids in self.auto_by_locator.values_mut() {
            ids.retain(|existing| existing != id);
        }
        self.auto_by_locator.retain(|_, ids| !ids.is_empty());
    }
}

struct RegistryInner {
    collaborators: Collaborators,
    state: RwLock<RegistryState>,
}

impl RegistryInner {
    fn bump_generations(&self, document: &DocumentId) {
        let state = self.state.read();
        for entry in state.sets.values().filter(|entry| entry.set.contains(document)) {
            entry.generation.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Other documents sharing `source`'s resource, or already known to import it.
    fn siblings(&self, source: &DocumentId) -> Vec<Arc<DocumentNode>> {
        let documents: Vec<Arc<DocumentNode>> = self.state.read().all.values().cloned().collect();
        let Some(resource) = documents
            .iter()
            .find(|node| node.id() == source)
            .map(|node| node.resource().to_string())
        else {
            return Vec::new();
        };
        documents
            .into_iter()
            .filter(|node| node.id() != source)
            .filter(|node| node.resource() == resource || imports_resource(node, &resource, false))
            .collect()
    }
}

/// Keeps the registry's derived state in step with one document's events.
struct RegistryListener {
    registry: Weak<RegistryInner>,
}

impl DocumentListener for RegistryListener {
    fn on_event(&self, event: &DocumentEvent) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        match event {
            DocumentEvent::Reset { document } => registry.bump_generations(document),
            DocumentEvent::ExtensionAdded {
                document,
                extension,
            } => {
                for sibling in registry.siblings(document) {
                    tracing::debug!(
                        target: "beans.registry",
                        extension = %extension,
                        source = %document,
                        sibling = %sibling.id(),
                        "mirroring extension"
                    );
                    sibling.add_external_extension(extension, document.clone());
                }
            }
            DocumentEvent::ExtensionRemoved {
                document,
                extension,
            } => {
                for sibling in registry.siblings(document) {
                    sibling.remove_external_extension(extension, document);
                }
            }
            DocumentEvent::ReadStarted { .. } | DocumentEvent::ReadFinished { .. } => {}
        }
    }

    fn is_closed(&self) -> bool {
        self.registry.strong_count() == 0
    }
}

/// Explicitly added and auto-detected documents plus document sets.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct ProjectRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for ProjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("ProjectRegistry")
            .field("manual", &state.manual.keys().collect::<Vec<_>>())
            .field("auto_detected", &state.auto_detected.keys().collect::<Vec<_>>())
            .field("sets", &state.sets.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProjectRegistry {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                collaborators,
                state: RwLock::new(RegistryState::default()),
            }),
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.inner.collaborators
    }

    fn create_node(&self, name: &str, kind: DocumentKind) -> Arc<DocumentNode> {
        let node = DocumentNode::new(name, name, kind, self.inner.collaborators.clone());
        node.register_listener(Arc::new(RegistryListener {
            registry: Arc::downgrade(&self.inner),
        }));
        node
    }

    /// Adds a manual document backed by the resource `name`.
    ///
    /// An auto-detected document of the same name moves to the manual table.
    pub fn add_document(&self, name: &str) -> Arc<DocumentNode> {
        let id = DocumentId::new(name);
        let mut state = self.inner.state.write();
        if let Some(existing) = state.manual.get(&id) {
            return Arc::clone(existing);
        }
        if state.auto_detected.contains_key(&id) {
            tracing::debug!(target: "beans.registry", document = %id, "promoting auto-detected document");
            state.forget_auto_detected(&id);
        }
        let node = self.create_node(name, DocumentKind::Manual);
        state.manual.insert(id, Arc::clone(&node));
        state.rebuild();
        node
    }

    /// Replaces the documents, and the optional document set, contributed by `locator`.
    ///
    /// Names already present as manual documents are left alone.
    pub fn set_auto_detected(&self, locator: &str, names: &[String], set: Option<DocumentSet>) {
        let mut state = self.inner.state.write();
        let previous = state.auto_by_locator.remove(locator).unwrap_or_default();
        let wanted: BTreeSet<DocumentId> = names.iter().map(DocumentId::new).collect();
        for id in previous.iter().filter(|id| !wanted.contains(*id)) {
            state.auto_detected.shift_remove(id);
        }

        let mut contributed = Vec::new();
        for name in names {
            let id = DocumentId::new(name.as_str());
            if state.manual.contains_key(&id) {
                continue;
            }
            if !state.auto_detected.contains_key(&id) {
                let node = self.create_node(
                    name,
                    DocumentKind::AutoDetected {
                        locator: locator.to_string(),
                    },
                );
                state.auto_detected.insert(id.clone(), node);
            }
            if !contributed.contains(&id) {
                contributed.push(id);
            }
        }
        if !contributed.is_empty() {
            state.auto_by_locator.insert(locator.to_string(), contributed);
        }

        state
            .sets
            .retain(|_, entry| entry.locator.as_deref() != Some(locator));
        if let Some(set) = set {
            if !state.sets.contains_key(&set.name) {
                state.sets.insert(
                    set.name.clone(),
                    SetEntry {
                        set,
                        generation: Arc::new(AtomicU64::new(0)),
                        locator: Some(locator.to_string()),
                    },
                );
            }
        }
        state.rebuild();
        tracing::debug!(
            target: "beans.registry",
            locator = %locator,
            documents = names.len(),
            "auto-detected documents updated"
        );
    }

    /// Drops everything `locator` contributed.
    pub fn remove_auto_detected(&self, locator: &str) {
        let mut state = self.inner.state.write();
        if let Some(ids) = state.auto_by_locator.remove(locator) {
            for id in ids {
                state.auto_detected.shift_remove(&id);
            }
        }
        state
            .sets
            .retain(|_, entry| entry.locator.as_deref() != Some(locator));
        state.rebuild();
    }

    /// Removes a document and drops it from every document set.
    pub fn remove_document(&self, name: &str) -> bool {
        let id = DocumentId::new(name);
        let mut state = self.inner.state.write();
        let removed = state.manual.shift_remove(&id).is_some() || {
            let known = state.auto_detected.contains_key(&id);
            state.forget_auto_detected(&id);
            known
        };
        if !removed {
            return false;
        }
        for entry in state.sets.values_mut() {
            let before = entry.set.documents.len();
            entry.set.documents.retain(|existing| *existing != id);
            if entry.set.documents.len() != before {
                entry.generation.fetch_add(1, Ordering::Relaxed);
            }
        }
        state.rebuild();
        tracing::debug!(target: "beans.registry", document = %id, "document removed");
        true
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<DocumentNode>> {
        self.inner.state.read().all.get(&DocumentId::new(name)).cloned()
    }

    /// Manual documents first, then auto-detected ones.
    pub fn documents(&self) -> Vec<Arc<DocumentNode>> {
        self.inner.state.read().all.values().cloned().collect()
    }

    pub fn add_document_set(&self, set: DocumentSet) -> Result<(), BeansError> {
        let mut state = self.inner.state.write();
        if state.sets.contains_key(&set.name) {
            return Err(BeansError::DuplicateDocumentSet(set.name));
        }
        state.sets.insert(
            set.name.clone(),
            SetEntry {
                set,
                generation: Arc::new(AtomicU64::new(0)),
                locator: None,
            },
        );
        Ok(())
    }

    pub fn remove_document_set(&self, name: &str) -> Result<DocumentSet, BeansError> {
        self.inner
            .state
            .write()
            .sets
            .shift_remove(name)
            .map(|entry| entry.set)
            .ok_or_else(|| BeansError::UnknownDocumentSet(name.to_string()))
    }

    pub fn document_set(&self, name: &str) -> Option<DocumentSet> {
        self.inner
            .state
            .read()
            .sets
            .get(name)
            .map(|entry| entry.set.clone())
    }

    pub fn document_sets(&self) -> Vec<DocumentSet> {
        self.inner
            .state
            .read()
            .sets
            .values()
            .map(|entry| entry.set.clone())
            .collect()
    }

    /// Bumped whenever a member document is reset or removed.
    pub fn set_generation(&self, name: &str) -> Option<u64> {
        self.inner
            .state
            .read()
            .sets
            .get(name)
            .map(|entry| entry.generation.load(Ordering::Relaxed))
    }

    /// Lookup context over a set's documents. Members not in the registry are skipped.
    pub fn set_context(&self, name: &str) -> Result<ResolveContext, BeansError> {
        let state = self.inner.state.read();
        let entry = state
            .sets
            .get(name)
            .ok_or_else(|| BeansError::UnknownDocumentSet(name.to_string()))?;
        Ok(set_context(&state, &entry.set, &self.inner.collaborators))
    }

    pub fn document_context(&self, name: &str) -> Result<ResolveContext, BeansError> {
        self.resolve(name)
            .map(ResolveContext::Document)
            .ok_or_else(|| BeansError::UnknownDocument(name.to_string()))
    }

    /// Looks `name` up in `document`, then in every document set containing it.
    pub fn resolve_with_sets(
        &self,
        name: &str,
        document: &str,
    ) -> Result<Option<BeanHandle>, BeansError> {
        let ctx = self.document_context(document)?;
        if let Some(found) = resolve(name, &ctx) {
            return Ok(Some(found));
        }
        let id = DocumentId::new(document);
        Ok(self
            .set_contexts_containing(&[id])
            .iter()
            .find_map(|ctx| resolve(name, ctx)))
    }

    /// Class of a bean, resolved in its own document first and then in the sets containing it.
    pub fn bean_class(&self, handle: &BeanHandle) -> Option<String> {
        if let Some(class) = &handle.bean.class_name {
            return Some(class.clone());
        }

        let owners: Vec<Arc<DocumentNode>> = match self.inner.state.read().all.get(&handle.document) {
            Some(node) => vec![Arc::clone(node)],
            None => Vec::new(),
        };
        let owners = if owners.is_empty() {
            self.documents_for_resource(handle.document.as_str(), true)
        } else {
            owners
        };

        let ids: Vec<DocumentId> = owners.iter().map(|node| node.id().clone()).collect();
        owners
            .into_iter()
            .map(ResolveContext::Document)
            .chain(self.set_contexts_containing(&ids))
            .find_map(|ctx| bean_class(&handle.bean, &ctx))
    }

    /// Documents backed by `resource`, plus those importing it when `include_imported` is set.
    pub fn documents_for_resource(
        &self,
        resource: &str,
        include_imported: bool,
    ) -> Vec<Arc<DocumentNode>> {
        self.documents()
            .into_iter()
            .filter(|node| {
                node.resource() == resource
                    || (include_imported && imports_resource(node, resource, true))
            })
            .collect()
    }

    pub fn is_bean_class(&self, class_name: &str) -> bool {
        self.documents()
            .iter()
            .any(|node| node.bean_classes().contains(class_name))
    }

    pub fn bean_classes(&self) -> BTreeSet<String> {
        self.documents()
            .iter()
            .flat_map(|node| node.bean_classes())
            .collect()
    }

    /// Reloads every document.
    pub fn reset(&self) {
        for node in self.documents() {
            node.reload();
        }
    }

    fn set_contexts_containing(&self, documents: &[DocumentId]) -> Vec<ResolveContext> {
        let state = self.inner.state.read();
        state
            .sets
            .values()
            .filter(|entry| documents.iter().any(|id| entry.set.contains(id)))
            .map(|entry| set_context(&state, &entry.set, &self.inner.collaborators))
            .collect()
    }
}

fn set_context(state: &RegistryState, set: &DocumentSet, collaborators: &Collaborators) -> ResolveContext {
    let documents = set
        .documents
        .iter()
        .filter_map(|id| state.all.get(id).cloned())
        .collect();
    ResolveContext::Set(Arc::new(SetView::new(
        set.name.clone(),
        documents,
        set.profiles.clone(),
        set.allow_overriding,
        Arc::clone(&collaborators.settings),
    )))
}

/// Whether `node` imports `resource`, directly or transitively.
///
/// Without `populate`, documents that have not been populated yet count as importing nothing.
fn imports_resource(node: &DocumentNode, resource: &str, populate: bool) -> bool {
    let contents = if populate {
        node.snapshot()
    } else {
        match node.populated_snapshot() {
            Some(contents) => contents,
            None => return false,
        }
    };
    contents
        .imports()
        .iter()
        .flat_map(|import| import.documents.iter())
        .any(|imported| imported.resource() == resource || imports_resource(imported, resource, populate))
}
