//! # Tidal
//!
//! Schema migrations for the Tidal data-access layer.
//!
//! Tidal provides:
//! - Sortable, monotonic migration identities
//! - A migration registry scoped to context types and their bases
//! - A model differ producing ordered, reversible migration operations
//!
//! ## Quick Start
//!
//! ```rust
//! use tidal::prelude::*;
//!
//! # fn main() -> Result<(), tidal::MigrationError> {
//! let source = Snapshot::new().with_table(
//!     Table::new("Blogs")
//!         .with_column(Column::new("Id", "int"))
//!         .with_primary_key(Key::new("PK_Blogs", ["Id"])),
//! );
//! let target = Snapshot::new().with_table(
//!     Table::new("Blogs")
//!         .with_column(Column::new("Id", "int"))
//!         .with_column(Column::new("Url", "nvarchar(max)").nullable())
//!         .with_primary_key(Key::new("PK_Blogs", ["Id"])),
//! );
//!
//! let plan = ModelDiffer::new().plan(&source, &target)?;
//! assert_eq!(plan.up.len(), 1);
//! assert_eq!(plan.down.len(), 1);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Migration identities, registry and model differ.
pub mod migrate {
    pub use tidal_migrate::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::migrate::{
        Column, ContextType, ForeignKey, IdGenerator, Index, Key, MigrateConfig, MigrationId,
        MigrationOperation, MigrationPlan, MigrationRegistry, MigrationUnit, ModelDiffer,
        QualifiedName, Sequence, Snapshot, Table,
    };
}

// Re-export key types at the crate root
pub use migrate::{MigrateResult, MigrationError};
