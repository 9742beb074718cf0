//! Post-population pass that lets extensions add beans, groups and aliases.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use beans_config::ExtensionsConfig;
use beans_model::{Bean, DocumentId, Group, Severity, SourceLocation};

use crate::builder::DocumentBuilder;
use crate::resolve::BeanHandle;
use crate::ExtensionError;

pub trait Extension: Send + Sync {
    /// Stable id, used for allow/deny filtering and for tracking across reloads.
    fn id(&self) -> &str;

    fn run(&self, ctx: &mut ExtensionContext<'_>) -> Result<(), ExtensionError>;
}

/// What an extension sees of the document it runs for.
pub struct ExtensionContext<'a> {
    beans: &'a [BeanHandle],
    builder: &'a mut DocumentBuilder,
}

impl<'a> ExtensionContext<'a> {
    pub fn document(&self) -> &DocumentId {
        self.builder.document()
    }

    /// Beans of the document, its groups and its imported documents.
    pub fn beans(&self) -> &[BeanHandle] {
        self.beans
    }

    pub fn beans_of_class<'s>(&'s self, class_name: &'s str) -> impl Iterator<Item = &'s BeanHandle> + 's {
        self.beans
            .iter()
            .filter(move |handle| handle.bean.class_name.as_deref() == Some(class_name))
    }

    pub fn register_bean(&mut self, bean: Bean) {
        self.builder.register_bean(Arc::new(bean));
    }

    pub fn register_group(&mut self, group: Group) {
        self.builder.register_group(group);
    }

    pub fn register_alias(&mut self, name: impl Into<String>, target: impl Into<String>) {
        self.builder
            .register_alias(name.into(), target.into(), SourceLocation::default());
    }

    pub fn report_problem(&mut self, severity: Severity, message: impl Into<String>) {
        self.builder.problem(severity, message, None);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegisterError {
    DuplicateId { kind: &'static str, id: String },
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterError::DuplicateId { kind, id } => write!(f, "duplicate {kind} extension id: {id}"),
        }
    }
}

impl std::error::Error for RegisterError {}

/// Class-agnostic and per-class extension registrations.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    global: BTreeMap<String, Arc<dyn Extension>>,
    by_class: BTreeMap<String, BTreeMap<String, Arc<dyn Extension>>>,
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("global", &self.global.keys().collect::<Vec<_>>())
            .field(
                "by_class",
                &self
                    .by_class
                    .iter()
                    .map(|(class, exts)| (class, exts.keys().collect::<Vec<_>>()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_global(&mut self, extension: Arc<dyn Extension>) -> Result<(), RegisterError> {
        register_extension("global", &mut self.global, extension)
    }

    pub fn register_for_class(
        &mut self,
        class_name: impl Into<String>,
        extension: Arc<dyn Extension>,
    ) -> Result<(), RegisterError> {
        let slot = self.by_class.entry(class_name.into()).or_default();
        register_extension("class", slot, extension)
    }

    pub fn global(&self) -> impl Iterator<Item = &Arc<dyn Extension>> {
        self.global.values()
    }

    pub fn for_class(&self, class_name: &str) -> impl Iterator<Item = &Arc<dyn Extension>> {
        self.by_class
            .get(class_name)
            .into_iter()
            .flat_map(|slot| slot.values())
    }

    /// Looks an extension up by id in every slot.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Extension>> {
        self.global
            .get(id)
            .or_else(|| self.by_class.values().find_map(|slot| slot.get(id)))
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.by_class.is_empty()
    }
}

fn register_extension(
    kind: &'static str,
    map: &mut BTreeMap<String, Arc<dyn Extension>>,
    extension: Arc<dyn Extension>,
) -> Result<(), RegisterError> {
    let id = extension.id().to_string();
    if map.contains_key(&id) {
        return Err(RegisterError::DuplicateId { kind, id });
    }

    map.insert(id, extension);
    Ok(())
}

/// Runs every global extension once, then every extension registered for one of `classes`.
///
/// Returns the ids of the extensions that ran, including ones that failed.
pub(crate) fn run_pipeline(
    registry: &ExtensionRegistry,
    filter: &ExtensionsConfig,
    beans: &[BeanHandle],
    classes: &BTreeSet<String>,
    builder: &mut DocumentBuilder,
) -> BTreeSet<String> {
    let mut ran = BTreeSet::new();
    if !filter.enabled || registry.is_empty() {
        return ran;
    }

    let triggered = registry
        .global()
        .chain(classes.iter().flat_map(|class| registry.for_class(class)));
    for extension in triggered {
        if ran.contains(extension.id()) {
            continue;
        }
        if run_extension(extension.as_ref(), filter, beans, builder) {
            ran.insert(extension.id().to_string());
        }
    }
    ran
}

/// Runs one extension behind a fault barrier. Returns `false` if the filter skipped it.
pub(crate) fn run_extension(
    extension: &dyn Extension,
    filter: &ExtensionsConfig,
    beans: &[BeanHandle],
    builder: &mut DocumentBuilder,
) -> bool {
    let id = extension.id();
    if !filter.is_extension_allowed(id) {
        tracing::debug!(target: "beans.extensions", extension = %id, "extension filtered out");
        return false;
    }

    let document = builder.document().clone();
    let outcome = {
        let mut ctx = ExtensionContext {
            beans,
            builder: &mut *builder,
        };
        panic::catch_unwind(AssertUnwindSafe(|| extension.run(&mut ctx)))
    };

    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err.to_string()),
        Err(_) => Some("extension panicked".to_string()),
    };
    if let Some(reason) = failure {
        tracing::warn!(
            target: "beans.extensions",
            extension = %id,
            document = %document,
            reason = %reason,
            "extension failed"
        );
        builder.problem(
            Severity::Warning,
            format!("Extension '{id}' failed: {reason}"),
            None,
        );
    }
    true
}
