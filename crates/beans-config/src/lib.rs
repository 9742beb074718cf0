use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once, OnceLock};
use std::time::Duration;

use globset::GlobBuilder;
use parking_lot::{Mutex, ReentrantMutex};
use thiserror::Error;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

mod diagnostics;
mod schema;
mod validation;

pub use diagnostics::{ConfigDiagnostics, ConfigWarning, ValidationDiagnostics};
pub use schema::json_schema;

/// Class names treated as proxy factories when walking `interceptorNames`.
pub const DEFAULT_PROXY_FACTORY_CLASS: &str = "org.springframework.aop.framework.ProxyFactoryBean";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct LoadingConfig {
    /// Wall-clock bound on parsing and registering one document, in milliseconds.
    #[serde(default = "LoadingConfig::default_timeout_ms")]
    #[schemars(range(min = 1))]
    pub timeout_ms: u64,

    /// Expand `import` declarations. When disabled, imports are recorded but never loaded.
    #[serde(default = "LoadingConfig::default_imports_enabled")]
    pub imports_enabled: bool,
}

impl LoadingConfig {
    fn default_timeout_ms() -> u64 {
        60_000
    }

    fn default_imports_enabled() -> bool {
        true
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
            imports_enabled: Self::default_imports_enabled(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct ResolutionConfig {
    /// Bean classes whose `interceptorNames` property lists interceptor bean names.
    #[serde(default = "ResolutionConfig::default_proxy_factory_classes")]
    pub proxy_factory_classes: Vec<String>,
}

impl ResolutionConfig {
    fn default_proxy_factory_classes() -> Vec<String> {
        vec![DEFAULT_PROXY_FACTORY_CLASS.to_string()]
    }

    fn normalize(&mut self) {
        let mut seen = BTreeSet::new();
        self.proxy_factory_classes = self
            .proxy_factory_classes
            .drain(..)
            .map(|class| class.trim().to_string())
            .filter(|class| !class.is_empty() && seen.insert(class.clone()))
            .collect();
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            proxy_factory_classes: Self::default_proxy_factory_classes(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct ExtensionsConfig {
    /// Whether the extension pipeline runs at all.
    #[serde(default = "default_extensions_enabled")]
    pub enabled: bool,
    /// If set, only extensions with an id in this list will run.
    #[serde(default)]
    pub allow: Option<Vec<String>>,
    /// Extensions with an id in this list never run.
    #[serde(default)]
    pub deny: Vec<String>,
}

fn default_extensions_enabled() -> bool {
    true
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            enabled: default_extensions_enabled(),
            allow: None,
            deny: Vec::new(),
        }
    }
}

impl ExtensionsConfig {
    /// Returns `true` if an extension with the given id may run.
    ///
    /// - `enabled = false` disables all extensions
    /// - `allow = Some([...])` restricts to ids matching *any* pattern
    /// - `deny = [...]` always blocks ids matching *any* pattern (deny overrides allow)
    ///
    /// `*` matches any substring; patterns without `*` match exactly.
    pub fn is_extension_allowed(&self, id: &str) -> bool {
        if !self.enabled {
            return false;
        }

        if self
            .deny
            .iter()
            .any(|pattern| id_matches(pattern, id))
        {
            return false;
        }

        match &self.allow {
            Some(patterns) => patterns
                .iter()
                .any(|pattern| id_matches(pattern, id)),
            None => true,
        }
    }

    fn normalize(&mut self) {
        fn normalize_id_list(list: &mut Vec<String>) {
            let mut out = BTreeSet::<String>::new();
            for raw in list.drain(..) {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    continue;
                }
                out.insert(trimmed.to_string());
            }
            *list = out.into_iter().collect();
        }

        if let Some(allow) = &mut self.allow {
            normalize_id_list(allow);
        }
        normalize_id_list(&mut self.deny);
    }
}

/// Matches an extension id against a pattern in which only `*` is special.
fn id_matches(pattern: &str, id: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == id;
    }
    let escaped = pattern
        .split('*')
        .map(globset::escape)
        .collect::<Vec<_>>()
        .join("*");
    match GlobBuilder::new(&escaped).literal_separator(false).build() {
        Ok(glob) => glob.compile_matcher().is_match(id),
        Err(err) => {
            tracing::warn!(
                target: "beans.config",
                pattern = %pattern,
                error = %err,
                "invalid extension pattern"
            );
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level, or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Write logs to stderr.
    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to the given file path.
    ///
    /// If the file cannot be opened, file logging is disabled while other sinks remain active.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            // Anything else is treated as an `EnvFilter` directive string.
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// Create the effective `EnvFilter`.
    ///
    /// If `RUST_LOG` is set, it is merged into the resulting filter.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

/// Top-level configuration (`beans.toml`).
///
/// ```toml
/// [loading]
/// timeout_ms = 60000
/// imports_enabled = true
///
/// [resolution]
/// proxy_factory_classes = ["org.springframework.aop.framework.ProxyFactoryBean"]
///
/// [extensions]
/// enabled = true
/// allow = ["example.*"]
/// deny = ["example.noisy"]
///
/// [logging]
/// level = "info"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct BeansConfig {
    #[serde(default)]
    pub loading: LoadingConfig,

    #[serde(default)]
    pub resolution: ResolutionConfig,

    #[serde(default)]
    pub extensions: ExtensionsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` carries a source snippet; keep only the message.
        ConfigError::Toml(err.message().to_string())
    }
}

impl BeansConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = read_config(path.as_ref())?;
        let mut config: BeansConfig = toml::from_str(&text)?;
        config.normalize();
        Ok(config)
    }

    /// Load a config file from TOML and return diagnostics.
    pub fn load_from_path_with_diagnostics(
        path: impl AsRef<Path>,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let text = read_config(path.as_ref())?;
        Self::load_from_str_with_diagnostics(&text)
    }

    /// Load a config from a TOML string and return diagnostics (unknown keys and semantic
    /// validation warnings).
    pub fn load_from_str_with_diagnostics(
        text: &str,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let (mut config, unknown_keys) =
            diagnostics::deserialize_toml_with_unknown_keys::<BeansConfig>(text)?;

        let mut diagnostics = ConfigDiagnostics {
            unknown_keys,
            ..ConfigDiagnostics::default()
        };
        diagnostics.extend_validation(config.validate());
        config.normalize();

        Ok((config, diagnostics))
    }

    fn normalize(&mut self) {
        self.resolution.normalize();
        self.extensions.normalize();
    }
}

fn read_config(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub const BEANS_CONFIG_ENV_VAR: &str = "BEANS_CONFIG_PATH";

static CONFIG_ENV_LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();

fn config_env_lock() -> &'static ReentrantMutex<()> {
    CONFIG_ENV_LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// Run `f` while holding the config environment lock.
///
/// Tests that set [`BEANS_CONFIG_ENV_VAR`] wrap the mutation and the discovery call in this
/// helper so concurrent discovery never observes the temporary value.
pub fn with_config_env_lock<R>(f: impl FnOnce() -> R) -> R {
    let _guard = config_env_lock().lock();
    f()
}

/// Discover the configuration file for a project root.
///
/// Search order:
/// 1) `BEANS_CONFIG_PATH` (absolute or relative to `root`)
/// 2) `beans.toml` in `root`
/// 3) `.beans.toml` in `root`
pub fn discover_config_path(root: &Path) -> Option<PathBuf> {
    let _guard = config_env_lock().lock();
    if let Some(value) = std::env::var_os(BEANS_CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            root.join(candidate)
        };
        return Some(path.canonicalize().unwrap_or(path));
    }

    ["beans.toml", ".beans.toml"]
        .into_iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
        .map(|path| path.canonicalize().unwrap_or(path))
}

/// Load the configuration for a project root.
///
/// If no config is present, returns [`BeansConfig::default`] and `None`.
pub fn load_for_root(root: &Path) -> Result<(BeansConfig, Option<PathBuf>), ConfigError> {
    let Some(path) = discover_config_path(root) else {
        return Ok((BeansConfig::default(), None));
    };

    let config = BeansConfig::load_from_path(&path)?;
    tracing::debug!(target: "beans.config", path = %path.display(), "loaded config");
    Ok((config, Some(path)))
}

/// Like [`load_for_root`], also returning diagnostics.
pub fn load_for_root_with_diagnostics(
    root: &Path,
) -> Result<(BeansConfig, Option<PathBuf>, ConfigDiagnostics), ConfigError> {
    let Some(path) = discover_config_path(root) else {
        return Ok((BeansConfig::default(), None, ConfigDiagnostics::default()));
    };

    let (config, diagnostics) = BeansConfig::load_from_path_with_diagnostics(&path)?;
    for key in &diagnostics.unknown_keys {
        tracing::warn!(target: "beans.config", path = %path.display(), key = %key, "unknown config key");
    }
    Ok((config, Some(path), diagnostics))
}

struct MutexFileMakeWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl<'a> MakeWriter<'a> for MutexFileMakeWriter {
    type Writer = MutexFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        MutexFileWriter {
            guard: self.file.lock(),
        }
    }
}

struct MutexFileWriter<'a> {
    guard: parking_lot::MutexGuard<'a, std::fs::File>,
}

impl Write for MutexFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.guard.flush()
    }
}

static TRACING_INIT: Once = Once::new();

/// Initializes structured `tracing` logging.
///
/// This function is safe to call multiple times; only the first call installs a global
/// subscriber.
pub fn init_tracing(logging: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = logging.env_filter();

        let file = logging
            .file
            .as_ref()
            .and_then(|path| {
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .ok()
            })
            .map(|file| Arc::new(Mutex::new(file)));
        let file_open_failed = logging.file.is_some() && file.is_none();

        let mut make_writer: Option<BoxMakeWriter> = None;
        if logging.stderr {
            // Test output capture only works for the stdlib's `eprint!`; `TestWriter` keeps
            // unit tests quiet in debug builds.
            make_writer = Some(if cfg!(debug_assertions) {
                BoxMakeWriter::new(tracing_subscriber::fmt::writer::TestWriter::with_stderr)
            } else {
                BoxMakeWriter::new(std::io::stderr)
            });
        }
        if let Some(file) = file {
            let file_writer = MutexFileMakeWriter { file };
            make_writer = Some(match make_writer {
                Some(writer) => BoxMakeWriter::new(writer.and(file_writer)),
                None => BoxMakeWriter::new(file_writer),
            });
        }
        let make_writer = make_writer.unwrap_or_else(|| BoxMakeWriter::new(std::io::sink));

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if logging.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() && file_open_failed {
            if let Some(path) = logging.file.as_ref() {
                tracing::warn!(
                    target: "beans.config",
                    path = %path.display(),
                    "failed to open log file; file logging disabled"
                );
            }
        }
    });
}
