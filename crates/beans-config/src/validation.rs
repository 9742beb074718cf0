use crate::diagnostics::{ConfigWarning, ValidationDiagnostics};
use crate::{BeansConfig, LoggingConfig};

impl BeansConfig {
    /// Validate semantic invariants for a configuration.
    ///
    /// Validation is best-effort: it reports as many problems as possible in one pass.
    #[must_use]
    pub fn validate(&self) -> ValidationDiagnostics {
        let mut out = ValidationDiagnostics::default();

        validate_loading(self, &mut out);
        validate_extensions(self, &mut out);
        validate_logging(self, &mut out);

        out
    }
}

fn validate_loading(config: &BeansConfig, out: &mut ValidationDiagnostics) {
    if config.loading.timeout_ms == 0 {
        out.warnings.push(ConfigWarning::InvalidValue {
            toml_path: "loading.timeout_ms".to_string(),
            message: "must be >= 1; using 1".to_string(),
        });
    }
}

fn validate_extensions(config: &BeansConfig, out: &mut ValidationDiagnostics) {
    let Some(allow) = &config.extensions.allow else {
        return;
    };
    for id in allow {
        let id = id.trim();
        if config.extensions.deny.iter().any(|denied| denied.trim() == id) {
            out.warnings.push(ConfigWarning::ExtensionAllowedAndDenied { id: id.to_string() });
        }
    }
}

fn validate_logging(config: &BeansConfig, out: &mut ValidationDiagnostics) {
    let normalized = LoggingConfig::normalize_level_directives(&config.logging.level);
    if !config.logging.level.trim().is_empty()
        && tracing_subscriber::EnvFilter::try_new(normalized.clone()).is_err()
    {
        out.warnings.push(ConfigWarning::LoggingLevelInvalid {
            value: config.logging.level.clone(),
            normalized,
        });
    }
}
