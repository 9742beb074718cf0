//! Collaborators consumed by document population.

use std::sync::Arc;
use std::time::Duration;

use beans_config::{BeansConfig, ExtensionsConfig};
use beans_model::ParsedDocument;
use beans_scheduler::CancellationToken;

use crate::extensions::ExtensionRegistry;
use crate::{ParseAbort, ResourceError};

/// Turns one resource into raw definition records.
///
/// Implementations run on a loader thread and should return early once `cancel` fires.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, resource: &str, cancel: &CancellationToken)
        -> Result<ParsedDocument, ParseAbort>;

    /// Opaque stamp that changes whenever the resource changes.
    fn modification_stamp(&self, _resource: &str) -> Option<u64> {
        None
    }
}

/// Resolves an import locator (possibly an ant-style pattern) to concrete resources.
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, pattern: &str, relative_to: &str) -> Result<Vec<String>, ResourceError>;
}

/// Settings handed to every document at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadSettings {
    pub timeout: Duration,
    pub imports_enabled: bool,
    pub proxy_factory_classes: Vec<String>,
    pub extensions: ExtensionsConfig,
}

impl LoadSettings {
    pub fn is_proxy_factory(&self, class_name: &str) -> bool {
        self.proxy_factory_classes
            .iter()
            .any(|class| class == class_name)
    }
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self::from(&BeansConfig::default())
    }
}

impl From<&BeansConfig> for LoadSettings {
    fn from(config: &BeansConfig) -> Self {
        Self {
            timeout: config.loading.timeout(),
            imports_enabled: config.loading.imports_enabled,
            proxy_factory_classes: config.resolution.proxy_factory_classes.clone(),
            extensions: config.extensions.clone(),
        }
    }
}

/// Everything a document needs to populate itself.
#[derive(Clone)]
pub struct Collaborators {
    pub parser: Arc<dyn DocumentParser>,
    pub resources: Arc<dyn ResourceResolver>,
    pub extensions: Arc<ExtensionRegistry>,
    pub settings: Arc<LoadSettings>,
}

impl Collaborators {
    pub fn new(parser: Arc<dyn DocumentParser>, resources: Arc<dyn ResourceResolver>) -> Self {
        Self {
            parser,
            resources,
            extensions: Arc::new(ExtensionRegistry::default()),
            settings: Arc::new(LoadSettings::default()),
        }
    }

    pub fn with_extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = Arc::new(extensions);
        self
    }

    pub fn with_settings(mut self, settings: LoadSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("extensions", &self.extensions)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
