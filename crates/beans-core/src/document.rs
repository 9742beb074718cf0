//! One configuration source and its lazily populated snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use beans_model::{Alias, Bean, DocumentId, Group, ParsedDocument, Problem, Severity, SourceLocation};
use beans_scheduler::{CancellationToken, TaskError, Watchdog};
use crossbeam_channel::Receiver;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use crate::builder::DocumentBuilder;
use crate::events::{ChannelListener, DocumentEvent, DocumentListener, ListenerId};
use crate::extensions::{run_extension, run_pipeline};
use crate::imports::expand_imports;
use crate::parser::Collaborators;
use crate::resolve::{bean_class, BeanHandle, ResolveContext};
use crate::ParseAbort;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    Manual,
    AutoDetected { locator: String },
    /// Owned by the import declaration of `importing`.
    Imported { importing: DocumentId },
}

/// An import declaration and the documents it expanded to.
#[derive(Debug)]
pub struct ImportRecord {
    pub importing: DocumentId,
    pub resource: String,
    pub location: SourceLocation,
    pub documents: Vec<Arc<DocumentNode>>,
}

/// A top-level child of a document, for display in declaration order.
#[derive(Clone, Debug)]
pub enum Element {
    Import(Arc<ImportRecord>),
    Alias(Alias),
    Group(Arc<Group>),
    Bean(Arc<Bean>),
}

impl Element {
    pub fn start_line(&self) -> u32 {
        match self {
            Element::Import(import) => import.location.start_line,
            Element::Alias(alias) => alias.location.start_line,
            Element::Group(group) => group.location.start_line,
            Element::Bean(bean) => bean.location.start_line,
        }
    }
}

/// Frozen result of one population run.
#[derive(Debug)]
pub struct DocumentContents {
    beans: IndexMap<String, Arc<Bean>>,
    aliases: IndexMap<String, Alias>,
    groups: Vec<Arc<Group>>,
    imports: Vec<Arc<ImportRecord>>,
    problems: Vec<Problem>,
    elements: Vec<Element>,
    modification_stamp: Option<u64>,
    applied_external: BTreeSet<String>,
}

impl DocumentContents {
    fn new(
        builder: DocumentBuilder,
        imports: Vec<Arc<ImportRecord>>,
        modification_stamp: Option<u64>,
        applied_external: BTreeSet<String>,
    ) -> Self {
        let mut elements: Vec<Element> = imports.iter().cloned().map(Element::Import).collect();
        elements.extend(builder.aliases.values().cloned().map(Element::Alias));
        elements.extend(builder.groups.iter().cloned().map(Element::Group));
        elements.extend(builder.beans.values().cloned().map(Element::Bean));
        elements.sort_by_key(Element::start_line);

        Self {
            beans: builder.beans,
            aliases: builder.aliases,
            groups: builder.groups,
            imports,
            problems: builder.problems,
            elements,
            modification_stamp,
            applied_external,
        }
    }

    /// Top-level beans declared directly in this document.
    pub fn beans(&self) -> &IndexMap<String, Arc<Bean>> {
        &self.beans
    }

    pub fn aliases(&self) -> &IndexMap<String, Alias> {
        &self.aliases
    }

    pub fn groups(&self) -> &[Arc<Group>] {
        &self.groups
    }

    pub fn imports(&self) -> &[Arc<ImportRecord>] {
        &self.imports
    }

    /// Problems recorded for this document only.
    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    /// Children sorted by start line.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn modification_stamp(&self) -> Option<u64> {
        self.modification_stamp
    }

    fn builder(&self, document: &DocumentId, resource: &str) -> DocumentBuilder {
        let mut builder = DocumentBuilder::new(document.clone(), resource);
        builder.beans = self.beans.clone();
        builder.aliases = self.aliases.clone();
        builder.groups = self.groups.clone();
        builder.problems = self.problems.clone();
        builder
    }
}

enum NodeState {
    Empty,
    Populating,
    Populated(Arc<DocumentContents>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadOutcome {
    Complete,
    NotFound,
    Aborted,
    /// The deadline passed before the result could be registered.
    Cancelled,
}

pub struct DocumentNode {
    id: DocumentId,
    resource: String,
    kind: DocumentKind,
    collaborators: Collaborators,
    /// Resources of the importing documents, outermost first.
    import_chain: Vec<String>,
    state: RwLock<NodeState>,
    population: Mutex<()>,
    own_extensions: Mutex<BTreeSet<String>>,
    external_extensions: Mutex<BTreeMap<String, BTreeSet<DocumentId>>>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn DocumentListener>)>>,
    next_listener_id: AtomicU64,
}

impl fmt::Debug for DocumentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentNode")
            .field("id", &self.id)
            .field("resource", &self.resource)
            .field("kind", &self.kind)
            .field("populated", &self.is_populated())
            .finish_non_exhaustive()
    }
}

impl DocumentNode {
    pub fn new(
        id: impl Into<DocumentId>,
        resource: impl Into<String>,
        kind: DocumentKind,
        collaborators: Collaborators,
    ) -> Arc<Self> {
        Arc::new(Self::with_chain(
            id.into(),
            resource.into(),
            kind,
            collaborators,
            Vec::new(),
        ))
    }

    pub(crate) fn imported(
        resource: String,
        importing: DocumentId,
        import_chain: Vec<String>,
        collaborators: Collaborators,
    ) -> Arc<Self> {
        Arc::new(Self::with_chain(
            DocumentId::new(resource.clone()),
            resource,
            DocumentKind::Imported { importing },
            collaborators,
            import_chain,
        ))
    }

    fn with_chain(
        id: DocumentId,
        resource: String,
        kind: DocumentKind,
        collaborators: Collaborators,
        import_chain: Vec<String>,
    ) -> Self {
        Self {
            id,
            resource,
            kind,
            collaborators,
            import_chain,
            state: RwLock::new(NodeState::Empty),
            population: Mutex::new(()),
            own_extensions: Mutex::new(BTreeSet::new()),
            external_extensions: Mutex::new(BTreeMap::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn kind(&self) -> &DocumentKind {
        &self.kind
    }

    pub fn is_imported(&self) -> bool {
        matches!(self.kind, DocumentKind::Imported { .. })
    }

    pub(crate) fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub(crate) fn import_chain(&self) -> &[String] {
        &self.import_chain
    }

    pub fn is_populated(&self) -> bool {
        matches!(&*self.state.read(), NodeState::Populated(_))
    }

    /// The snapshot, if population already ran. Never triggers population.
    pub fn populated_snapshot(&self) -> Option<Arc<DocumentContents>> {
        match &*self.state.read() {
            NodeState::Populated(contents) => Some(Arc::clone(contents)),
            NodeState::Empty | NodeState::Populating => None,
        }
    }

    /// Returns the populated snapshot, populating first if needed.
    ///
    /// Concurrent callers block until the single population run finishes.
    pub fn snapshot(&self) -> Arc<DocumentContents> {
        if let Some(contents) = self.populated_snapshot() {
            return contents;
        }

        let (contents, events) = {
            let _population = self.population.lock();
            if let Some(contents) = self.populated_snapshot() {
                return contents;
            }
            *self.state.write() = NodeState::Populating;
            let (contents, events) = self.populate();
            *self.state.write() = NodeState::Populated(Arc::clone(&contents));
            (contents, events)
        };

        let mut notifications = Vec::with_capacity(events.len() + 2);
        notifications.push(DocumentEvent::ReadStarted {
            document: self.id.clone(),
        });
        notifications.extend(events);
        notifications.push(DocumentEvent::ReadFinished {
            document: self.id.clone(),
        });
        self.notify(notifications);
        contents
    }

    fn populate(&self) -> (Arc<DocumentContents>, Vec<DocumentEvent>) {
        let started = Instant::now();
        let settings = Arc::clone(&self.collaborators.settings);
        tracing::debug!(target: "beans.document", document = %self.id, "populating document");

        let modification_stamp = self.collaborators.parser.modification_stamp(&self.resource);
        let shared = Arc::new(Mutex::new(DocumentBuilder::new(
            self.id.clone(),
            self.resource.clone(),
        )));

        let worker_builder = Arc::clone(&shared);
        let parser = Arc::clone(&self.collaborators.parser);
        let resource = self.resource.clone();
        let watchdog = Watchdog::new(settings.timeout);
        let outcome = watchdog.run(CancellationToken::new(), move |cancel| {
            let parsed = parser.parse(&resource, &cancel);
            register_parse_result(&mut worker_builder.lock(), parsed, &cancel)
        });
        let mut builder = shared.lock().take();

        let complete = match outcome {
            Ok(LoadOutcome::Complete) => true,
            Ok(LoadOutcome::NotFound) => {
                builder.problem(
                    Severity::Error,
                    format!("Beans config file '{}' not accessible", self.resource),
                    None,
                );
                false
            }
            Ok(LoadOutcome::Aborted) => {
                tracing::warn!(
                    target: "beans.document",
                    document = %self.id,
                    "parser aborted; keeping partial document"
                );
                false
            }
            Ok(LoadOutcome::Cancelled) => {
                tracing::debug!(target: "beans.document", document = %self.id, "document load cancelled");
                false
            }
            Err(TaskError::DeadlineExceeded(timeout)) => {
                tracing::warn!(
                    target: "beans.document",
                    document = %self.id,
                    timeout_ms = timeout.as_millis() as u64,
                    "document load exceeded timeout"
                );
                builder.problem(
                    Severity::Error,
                    format!("Load exceeded timeout of {} ms", timeout.as_millis()),
                    None,
                );
                false
            }
            Err(err) => {
                tracing::warn!(target: "beans.document", document = %self.id, error = %err, "document load failed");
                builder.problem(Severity::Error, format!("Load failed: {err}"), None);
                false
            }
        };

        let raw_imports = std::mem::take(&mut builder.imports);
        let imports = expand_imports(
            self,
            raw_imports,
            &mut builder,
            complete && settings.imports_enabled,
        );

        let mut events = Vec::new();
        let mut applied_external = BTreeSet::new();
        if complete && !self.is_imported() {
            let beans = collect_beans(&self.id, &builder.beans, &builder.groups, &imports);
            let classes = resolved_classes(&beans);
            let registry = &self.collaborators.extensions;
            let ran = run_pipeline(
                registry,
                &settings.extensions,
                &beans,
                &classes,
                &mut builder,
            );

            let pending: Vec<String> = self
                .external_extensions
                .lock()
                .keys()
                .filter(|id| !ran.contains(*id))
                .cloned()
                .collect();
            for id in pending {
                let Some(extension) = registry.get(&id) else {
                    continue;
                };
                if run_extension(extension.as_ref(), &settings.extensions, &beans, &mut builder) {
                    applied_external.insert(id);
                }
            }

            let mut own = self.own_extensions.lock();
            for removed in own.difference(&ran) {
                events.push(DocumentEvent::ExtensionRemoved {
                    document: self.id.clone(),
                    extension: removed.clone(),
                });
            }
            for added in ran.difference(&own) {
                events.push(DocumentEvent::ExtensionAdded {
                    document: self.id.clone(),
                    extension: added.clone(),
                });
            }
            *own = ran;
        }

        let contents = DocumentContents::new(builder, imports, modification_stamp, applied_external);
        tracing::debug!(
            target: "beans.document",
            document = %self.id,
            beans = contents.beans.len(),
            problems = contents.problems.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "populated document"
        );
        (Arc::new(contents), events)
    }

    /// Drops the snapshot; the next query repopulates. A no-op for imported documents.
    pub fn reload(&self) {
        if self.is_imported() {
            return;
        }
        {
            let _population = self.population.lock();
            *self.state.write() = NodeState::Empty;
        }
        tracing::debug!(target: "beans.document", document = %self.id, "document reset");
        self.notify(vec![DocumentEvent::Reset {
            document: self.id.clone(),
        }]);
    }

    /// Top-level beans declared directly in this document.
    pub fn beans(&self) -> Vec<Arc<Bean>> {
        self.snapshot().beans.values().cloned().collect()
    }

    pub fn aliases(&self) -> Vec<Alias> {
        self.snapshot().aliases.values().cloned().collect()
    }

    pub fn groups(&self) -> Vec<Arc<Group>> {
        self.snapshot().groups.clone()
    }

    pub fn imports(&self) -> Vec<Arc<ImportRecord>> {
        self.snapshot().imports.clone()
    }

    pub fn elements(&self) -> Vec<Element> {
        self.snapshot().elements.clone()
    }

    /// Problems of this document and of every document it imports.
    pub fn problems(&self) -> Vec<Problem> {
        let contents = self.snapshot();
        let mut out = contents.problems.clone();
        for import in &contents.imports {
            for document in &import.documents {
                out.extend(document.problems());
            }
        }
        out
    }

    pub fn modification_stamp(&self) -> Option<u64> {
        self.snapshot().modification_stamp
    }

    /// Whether the resource, or an imported one, changed since population.
    pub fn is_stale(&self) -> bool {
        let Some(contents) = self.populated_snapshot() else {
            return false;
        };
        if self.collaborators.parser.modification_stamp(&self.resource)
            != contents.modification_stamp
        {
            return true;
        }
        contents
            .imports
            .iter()
            .flat_map(|import| import.documents.iter())
            .any(|document| document.is_stale())
    }

    /// Bean declared directly here or in an imported document.
    pub fn bean(&self, name: &str) -> Option<Arc<Bean>> {
        self.find_direct(name).map(|handle| handle.bean)
    }

    pub fn has_bean(&self, name: &str) -> bool {
        self.find_direct(name).is_some()
    }

    /// Alias declared here or in an imported document.
    pub fn alias(&self, name: &str) -> Option<Alias> {
        let contents = self.snapshot();
        if let Some(alias) = contents.aliases.get(name) {
            return Some(alias.clone());
        }
        contents
            .imports
            .iter()
            .flat_map(|import| import.documents.iter())
            .find_map(|document| document.alias(name))
    }

    pub(crate) fn find_direct(&self, name: &str) -> Option<BeanHandle> {
        let contents = self.snapshot();
        if let Some(bean) = contents.beans.get(name) {
            return Some(BeanHandle::new(self.id.clone(), Arc::clone(bean)));
        }
        contents
            .imports
            .iter()
            .flat_map(|import| import.documents.iter())
            .find_map(|document| document.find_direct(name))
    }

    /// Searches nested groups, skipping groups disabled for `active` profiles.
    pub(crate) fn find_in_groups(
        &self,
        name: &str,
        active: Option<&BTreeSet<String>>,
    ) -> Option<BeanHandle> {
        let contents = self.snapshot();
        contents
            .groups
            .iter()
            .find_map(|group| find_in_group(group, name, active))
            .map(|bean| BeanHandle::new(self.id.clone(), bean))
            .or_else(|| {
                contents
                    .imports
                    .iter()
                    .flat_map(|import| import.documents.iter())
                    .find_map(|document| document.find_in_groups(name, active))
            })
    }

    /// Own, group and imported beans. Groups disabled for `active` profiles are skipped.
    pub fn all_beans(&self, active: Option<&BTreeSet<String>>) -> Vec<BeanHandle> {
        let contents = self.snapshot();
        let mut out: Vec<BeanHandle> = contents
            .beans
            .values()
            .map(|bean| BeanHandle::new(self.id.clone(), Arc::clone(bean)))
            .collect();
        for group in &contents.groups {
            let beans = match active {
                Some(active) => group.enabled_beans(active),
                None => group.all_beans(),
            };
            out.extend(beans.into_iter().map(|bean| BeanHandle::new(self.id.clone(), bean)));
        }
        for import in &contents.imports {
            for document in &import.documents {
                out.extend(document.all_beans(active));
            }
        }
        out
    }

    /// Resolved class names of every bean visible from this document.
    pub fn bean_classes(self: &Arc<Self>) -> BTreeSet<String> {
        let ctx = ResolveContext::Document(Arc::clone(self));
        self.all_beans(None)
            .iter()
            .filter_map(|handle| bean_class(&handle.bean, &ctx))
            .collect()
    }

    pub fn beans_by_class(self: &Arc<Self>, class_name: &str) -> Vec<BeanHandle> {
        let ctx = ResolveContext::Document(Arc::clone(self));
        self.all_beans(None)
            .into_iter()
            .filter(|handle| bean_class(&handle.bean, &ctx).as_deref() == Some(class_name))
            .collect()
    }

    /// Extensions detected by this document's own pipeline run.
    pub fn own_extensions(&self) -> BTreeSet<String> {
        self.own_extensions.lock().clone()
    }

    /// Extensions mirrored from sibling documents, with the documents that detected them.
    pub fn external_extensions(&self) -> BTreeMap<String, BTreeSet<DocumentId>> {
        self.external_extensions.lock().clone()
    }

    /// Mirrors an extension detected by `source`.
    ///
    /// Applied at once to a populated document unless it already ran the extension itself;
    /// otherwise deferred to the end of the next population.
    pub fn add_external_extension(&self, extension: &str, source: DocumentId) {
        if self.is_imported() {
            return;
        }
        let _population = self.population.lock();
        let first_source = {
            let mut external = self.external_extensions.lock();
            let sources = external.entry(extension.to_string()).or_default();
            let first = sources.is_empty();
            sources.insert(source);
            first
        };

        let Some(contents) = self.populated_snapshot() else {
            return;
        };
        if !first_source
            || contents.applied_external.contains(extension)
            || self.own_extensions.lock().contains(extension)
        {
            return;
        }
        let Some(ext) = self.collaborators.extensions.get(extension) else {
            tracing::debug!(
                target: "beans.extensions",
                document = %self.id,
                extension = %extension,
                "mirrored extension is not registered"
            );
            return;
        };

        let mut builder = contents.builder(&self.id, &self.resource);
        let beans = collect_beans(&self.id, &builder.beans, &builder.groups, &contents.imports);
        let settings = &self.collaborators.settings;
        if run_extension(ext.as_ref(), &settings.extensions, &beans, &mut builder) {
            let mut applied = contents.applied_external.clone();
            applied.insert(extension.to_string());
            let updated = DocumentContents::new(
                builder,
                contents.imports.clone(),
                contents.modification_stamp,
                applied,
            );
            *self.state.write() = NodeState::Populated(Arc::new(updated));
        }
    }

    /// Drops `source` as a reason for `extension`; removing the last source reloads the document.
    pub fn remove_external_extension(&self, extension: &str, source: &DocumentId) {
        let last_removed = {
            let mut external = self.external_extensions.lock();
            match external.get_mut(extension) {
                Some(sources) => {
                    sources.remove(source);
                    if sources.is_empty() {
                        external.remove(extension);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };
        if last_removed && self.is_populated() {
            self.reload();
        }
    }

    pub fn register_listener(&self, listener: Arc<dyn DocumentListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Bounded channel of this document's events. Events are dropped if the receiver lags.
    pub fn subscribe(&self) -> Receiver<DocumentEvent> {
        let (listener, rx) = ChannelListener::new();
        self.register_listener(Arc::new(listener));
        rx
    }

    fn notify(&self, events: Vec<DocumentEvent>) {
        if events.is_empty() {
            return;
        }
        let listeners: Vec<Arc<dyn DocumentListener>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for event in &events {
            for listener in &listeners {
                listener.on_event(event);
            }
        }
        self.listeners
            .lock()
            .retain(|(_, listener)| !listener.is_closed());
    }
}

/// Registers a parse result unless the load was already given up on.
///
/// A cancelled load leaves the builder to the caller, which reports the timeout itself.
fn register_parse_result(
    builder: &mut DocumentBuilder,
    parsed: Result<ParsedDocument, ParseAbort>,
    cancel: &CancellationToken,
) -> LoadOutcome {
    if cancel.is_cancelled() {
        return LoadOutcome::Cancelled;
    }
    match parsed {
        Ok(parsed) => {
            builder.register_document(parsed, cancel);
            LoadOutcome::Complete
        }
        Err(ParseAbort::NotFound { .. }) => LoadOutcome::NotFound,
        Err(ParseAbort::Fatal {
            message,
            line,
            partial,
        }) => {
            builder.register_document(partial, cancel);
            builder.problem(Severity::Error, message, line);
            LoadOutcome::Aborted
        }
    }
}

fn find_in_group(
    group: &Group,
    name: &str,
    active: Option<&BTreeSet<String>>,
) -> Option<Arc<Bean>> {
    if let Some(active) = active {
        if !group.is_profile_enabled(active) {
            return None;
        }
    }
    group
        .beans
        .get(name)
        .cloned()
        .or_else(|| {
            group
                .groups
                .iter()
                .find_map(|nested| find_in_group(nested, name, active))
        })
}

fn collect_beans(
    document: &DocumentId,
    beans: &IndexMap<String, Arc<Bean>>,
    groups: &[Arc<Group>],
    imports: &[Arc<ImportRecord>],
) -> Vec<BeanHandle> {
    let mut out: Vec<BeanHandle> = beans
        .values()
        .map(|bean| BeanHandle::new(document.clone(), Arc::clone(bean)))
        .collect();
    for group in groups {
        out.extend(
            group
                .all_beans()
                .into_iter()
                .map(|bean| BeanHandle::new(document.clone(), bean)),
        );
    }
    for import in imports {
        for imported in &import.documents {
            out.extend(imported.all_beans(None));
        }
    }
    out
}

/// Class names of `beans`, following parent chains among `beans` themselves.
fn resolved_classes(beans: &[BeanHandle]) -> BTreeSet<String> {
    let mut by_name: BTreeMap<&str, &Bean> = BTreeMap::new();
    for handle in beans {
        by_name
            .entry(handle.bean.name.as_str())
            .or_insert(&*handle.bean);
    }

    let mut classes = BTreeSet::new();
    for handle in beans {
        let mut seen = BTreeSet::new();
        let mut current: Option<&Bean> = Some(&*handle.bean);
        while let Some(bean) = current {
            if let Some(class) = &bean.class_name {
                classes.insert(class.clone());
                break;
            }
            if !seen.insert(bean.name.as_str()) {
                break;
            }
            current = bean
                .parent_name
                .as_deref()
                .and_then(|parent| by_name.get(parent).copied());
        }
    }
    classes
}
