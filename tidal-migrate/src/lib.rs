//! # tidal-migrate
//!
//! Schema-migration core for the Tidal data-access layer.
//!
//! This crate provides functionality for:
//! - Sortable, collision-free migration identities (`<timestamp>_<name>`)
//! - A registry that resolves migrations by identity or name, scoped to a
//!   context type and its bases
//! - A model differ that turns two schema snapshots into an ordered list of
//!   migration operations, in both directions
//!
//! ## Architecture
//!
//! Snapshots and discovered migrations are supplied from outside; this crate
//! never reflects over application code or talks to a database. The differ's
//! output is plain data that a script generator renders for a provider.
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌──────────────────┐
//! │ Snapshot A/B │────▶│  Model Differ  │────▶│ MigrationPlan    │
//! └──────────────┘     └────────────────┘     │ (up / down ops)  │
//!                                             └──────────────────┘
//!                                                      │
//! ┌──────────────┐     ┌────────────────┐              ▼
//! │ Id Generator │────▶│ MigrationUnit  │────▶ script generator
//! └──────────────┘     └────────────────┘
//!                              │
//!                              ▼
//!                      ┌────────────────┐
//!                      │    Registry    │◀──── MigrationSource
//!                      └────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use tidal_migrate::{
//!     Column, ContextType, IdGenerator, Key, MigrationRegistry, MigrationUnit, ModelDiffer,
//!     Snapshot, Table,
//! };
//!
//! # fn main() -> Result<(), tidal_migrate::MigrationError> {
//! let before = Snapshot::new();
//! let after = Snapshot::new().with_table(
//!     Table::new("Users")
//!         .with_column(Column::new("Id", "int"))
//!         .with_column(Column::new("Email", "nvarchar(256)"))
//!         .with_primary_key(Key::new("PK_Users", ["Id"])),
//! );
//!
//! let plan = ModelDiffer::new().plan(&before, &after)?;
//! assert_eq!(plan.summary(), "Create table: 1");
//!
//! let id = IdGenerator::new().generate("CreateUsers")?;
//! let unit = MigrationUnit::new(id, "AppContext").with_plan(plan);
//!
//! let registry = MigrationRegistry::new(ContextType::new("AppContext"), &vec![unit]);
//! assert!(registry.resolve("createusers").is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! Differ and registry settings can be loaded from TOML with
//! [`MigrateConfig::from_file`]; see [`config`] for the available keys.

pub mod config;
pub mod diff;
pub mod error;
pub mod id;
pub mod operation;
pub mod plan;
pub mod registry;
pub mod snapshot;

// Re-exports
pub use config::{DifferConfig, MigrateConfig, RegistryConfig};
pub use diff::ModelDiffer;
pub use error::{MigrateResult, MigrationError};
pub use id::{Clock, FixedClock, IdGenerator, MigrationId, SystemClock, extract_name, is_valid};
pub use operation::{ColumnDefinition, MigrationOperation, SequenceOptions};
pub use plan::MigrationPlan;
pub use registry::{ContextType, MigrationRegistry, MigrationSource, MigrationUnit, RegistryWarning};
pub use snapshot::{
    Annotations, Column, ForeignKey, Index, Key, QualifiedName, ReferentialAction, Sequence,
    Snapshot, Table,
};
