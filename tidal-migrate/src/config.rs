//! Configuration for the migration core.
//!
//! Settings are read from a TOML document such as `tidal-migrate.toml`:
//!
//! ```toml
//! [differ]
//! detect_renames = true
//! rename_threshold = 0.8
//!
//! [registry]
//! warn_on_excluded = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};

/// Top-level migration settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrateConfig {
    /// Model differ settings.
    #[serde(default)]
    pub differ: DifferConfig,

    /// Registry settings.
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl MigrateConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrationError::config(format!("failed to read {}: {}", path.display(), e))
        })?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> MigrateResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| MigrationError::config(format!("failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the differ settings.
    pub fn differ(mut self, differ: DifferConfig) -> Self {
        self.differ = differ;
        self
    }

    /// Set the registry settings.
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    /// Reject settings that are out of range.
    pub fn validate(&self) -> MigrateResult<()> {
        self.differ.validate()
    }
}

/// Settings for the [`ModelDiffer`](crate::diff::ModelDiffer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DifferConfig {
    /// Infer renames from structural similarity. Explicit `renamed_from`
    /// markers and case-only changes are honoured either way.
    #[serde(default = "default_true")]
    pub detect_renames: bool,

    /// Fraction of columns (0.0 to 1.0) two tables must share, by name and
    /// definition, to be treated as one renamed table.
    #[serde(default = "default_rename_threshold")]
    pub rename_threshold: f64,
}

fn default_true() -> bool {
    true
}

fn default_rename_threshold() -> f64 {
    0.8
}

impl Default for DifferConfig {
    fn default() -> Self {
        Self {
            detect_renames: true,
            rename_threshold: default_rename_threshold(),
        }
    }
}

impl DifferConfig {
    /// Create differ settings with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable similarity-based rename detection.
    pub fn detect_renames(mut self, detect: bool) -> Self {
        self.detect_renames = detect;
        self
    }

    /// Set the table rename similarity threshold.
    pub fn rename_threshold(mut self, threshold: f64) -> Self {
        self.rename_threshold = threshold;
        self
    }

    /// Reject a threshold outside `(0.0, 1.0]`.
    pub fn validate(&self) -> MigrateResult<()> {
        if self.rename_threshold > 0.0 && self.rename_threshold <= 1.0 {
            Ok(())
        } else {
            Err(MigrationError::config(format!(
                "rename_threshold must be in (0.0, 1.0], got {}",
                self.rename_threshold
            )))
        }
    }
}

/// Settings for the [`MigrationRegistry`](crate::registry::MigrationRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Log a warning for every discovered migration that is excluded.
    #[serde(default = "default_true")]
    pub warn_on_excluded: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            warn_on_excluded: true,
        }
    }
}

impl RegistryConfig {
    /// Create registry settings with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable warning logs for excluded migrations.
    pub fn warn_on_excluded(mut self, warn: bool) -> Self {
        self.warn_on_excluded = warn;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MigrateConfig::new();
        assert!(config.differ.detect_renames);
        assert_eq!(config.differ.rename_threshold, 0.8);
        assert!(config.registry.warn_on_excluded);
    }

    #[test]
    fn test_parse_partial() {
        let config = MigrateConfig::from_str(
            r#"
            [differ]
            rename_threshold = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.differ.rename_threshold, 0.5);
        assert!(config.differ.detect_renames);
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(MigrateConfig::from_str("").unwrap(), MigrateConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = MigrateConfig::from_str("[differ]\nfuzzy = true\n").unwrap_err();
        assert!(matches!(err, MigrationError::Config(_)));
    }

    #[test]
    fn test_threshold_out_of_range() {
        assert!(MigrateConfig::from_str("[differ]\nrename_threshold = 1.5\n").is_err());
        assert!(DifferConfig::new().rename_threshold(0.0).validate().is_err());
        assert!(DifferConfig::new().rename_threshold(1.0).validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[registry]\nwarn_on_excluded = false").unwrap();

        let config = MigrateConfig::from_file(file.path()).unwrap();
        assert!(!config.registry.warn_on_excluded);
    }

    #[test]
    fn test_from_missing_file() {
        let err = MigrateConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn test_builder() {
        let config = MigrateConfig::new()
            .differ(DifferConfig::new().detect_renames(false).rename_threshold(0.9))
            .registry(RegistryConfig::new().warn_on_excluded(false));
        assert!(!config.differ.detect_renames);
        assert_eq!(config.differ.rename_threshold, 0.9);
        assert!(!config.registry.warn_on_excluded);
    }
}
