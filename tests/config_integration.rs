//! Integration tests for configuration parsing and handling.
//!
//! These tests verify that loaded settings reach the differ and the registry.

use std::io::Write;

use tidal::migrate::{
    Column, ContextType, DifferConfig, MigrateConfig, MigrationError, MigrationRegistry,
    MigrationUnit, ModelDiffer, RegistryConfig, Snapshot, Table,
};

/// Test full configuration with all options
#[test]
fn test_config_full() {
    let config = MigrateConfig::from_str(
        r#"
        [differ]
        detect_renames = false
        rename_threshold = 0.6

        [registry]
        warn_on_excluded = false
        "#,
    )
    .expect("Failed to parse config");

    assert_eq!(
        config.differ,
        DifferConfig::new().detect_renames(false).rename_threshold(0.6)
    );
    assert_eq!(config.registry, RegistryConfig::new().warn_on_excluded(false));
}

/// Test that defaults apply to missing sections
#[test]
fn test_config_defaults() {
    let config: MigrateConfig = toml::from_str("[registry]\n").expect("Failed to parse config");
    assert!(config.differ.detect_renames);
    assert_eq!(config.differ.rename_threshold, 0.8);
}

/// Test invalid configuration values
#[test]
fn test_config_invalid() {
    assert!(matches!(
        MigrateConfig::from_str("[differ]\nrename_threshold = -1.0\n"),
        Err(MigrationError::Config(_))
    ));
    assert!(MigrateConfig::from_str("[migrations]\ndirectory = \"x\"\n").is_err());
}

/// Test loading configuration from disk
#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tidal-migrate.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "[differ]\nrename_threshold = 0.5").unwrap();

    let config = MigrateConfig::from_file(&path).unwrap();
    assert_eq!(config.differ.rename_threshold, 0.5);
}

/// Test that the rename threshold changes what the differ infers
#[test]
fn test_threshold_drives_rename_detection() {
    let source = Snapshot::new().with_table(
        Table::new("Customers")
            .with_column(Column::new("Id", "int"))
            .with_column(Column::new("Name", "text"))
            .with_column(Column::new("Phone", "text")),
    );
    let target = Snapshot::new().with_table(
        Table::new("Clients")
            .with_column(Column::new("Id", "int"))
            .with_column(Column::new("Name", "text"))
            .with_column(Column::new("Email", "text")),
    );

    let strict = ModelDiffer::with_config(MigrateConfig::new().differ);
    assert_eq!(strict.diff(&source, &target).unwrap().len(), 2);

    let loose = MigrateConfig::from_str("[differ]\nrename_threshold = 0.6\n").unwrap();
    let ops = ModelDiffer::with_config(loose.differ)
        .diff(&source, &target)
        .unwrap();
    let ops: Vec<String> = ops.iter().map(ToString::to_string).collect();
    assert_eq!(
        ops,
        vec![
            "rename table Customers to Clients",
            "rename column Clients.Phone to Email",
        ]
    );
}

/// Test registry settings are honoured
#[test]
fn test_registry_config() {
    let units = vec![MigrationUnit::unowned("20240101000000_Lost".parse().unwrap())];
    let registry = MigrationRegistry::with_config(
        ContextType::new("AppContext"),
        &units,
        &RegistryConfig::new().warn_on_excluded(false),
    );

    assert!(registry.is_empty());
    assert_eq!(registry.warnings().len(), 1);
}
