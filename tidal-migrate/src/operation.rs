//! Migration operations.
//!
//! Operations are the output of the [`ModelDiffer`](crate::diff::ModelDiffer)
//! and the input of script generators. Each one is a single structural change
//! that carries everything needed to render it: the names involved and, for
//! creates and alters, the complete definition afterwards (alters also keep
//! the definition before, so a generator can produce the reverse statement).

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::snapshot::{Annotations, Column, ForeignKey, Index, Key, QualifiedName, ReferentialAction, Sequence};

/// A single structural schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MigrationOperation {
    /// Create a schema if it does not exist.
    EnsureSchema(SchemaOperation),
    /// Drop a schema that no object uses any more.
    DropSchema(SchemaOperation),
    /// Change model-wide annotations.
    AlterDatabase(AlterDatabase),
    /// Create a table, with its columns, keys and inline foreign keys.
    CreateTable(CreateTable),
    /// Drop a table.
    DropTable(DropTable),
    /// Rename a table or move it to another schema.
    RenameTable(RenameTable),
    /// Change table annotations.
    AlterTable(AlterTable),
    /// Add a column to an existing table.
    AddColumn(AddColumn),
    /// Drop a column.
    DropColumn(DropColumn),
    /// Rename a column.
    RenameColumn(RenameColumn),
    /// Change a column's definition in place.
    AlterColumn(AlterColumn),
    /// Add a primary key.
    AddPrimaryKey(AddKey),
    /// Drop a primary key.
    DropPrimaryKey(DropConstraint),
    /// Add a unique constraint.
    AddUniqueConstraint(AddKey),
    /// Drop a unique constraint.
    DropUniqueConstraint(DropConstraint),
    /// Create an index.
    CreateIndex(CreateIndex),
    /// Drop an index.
    DropIndex(DropIndex),
    /// Rename an index.
    RenameIndex(RenameIndex),
    /// Add a foreign key.
    AddForeignKey(AddForeignKey),
    /// Drop a foreign key.
    DropForeignKey(DropConstraint),
    /// Create a sequence.
    CreateSequence(CreateSequence),
    /// Drop a sequence.
    DropSequence(DropSequence),
    /// Rename a sequence or move it to another schema.
    RenameSequence(RenameSequence),
    /// Change a sequence's options.
    AlterSequence(AlterSequence),
    /// Restart a sequence at a new value.
    RestartSequence(RestartSequence),
}

impl MigrationOperation {
    /// Short snake_case label for the operation kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EnsureSchema(_) => "ensure_schema",
            Self::DropSchema(_) => "drop_schema",
            Self::AlterDatabase(_) => "alter_database",
            Self::CreateTable(_) => "create_table",
            Self::DropTable(_) => "drop_table",
            Self::RenameTable(_) => "rename_table",
            Self::AlterTable(_) => "alter_table",
            Self::AddColumn(_) => "add_column",
            Self::DropColumn(_) => "drop_column",
            Self::RenameColumn(_) => "rename_column",
            Self::AlterColumn(_) => "alter_column",
            Self::AddPrimaryKey(_) => "add_primary_key",
            Self::DropPrimaryKey(_) => "drop_primary_key",
            Self::AddUniqueConstraint(_) => "add_unique_constraint",
            Self::DropUniqueConstraint(_) => "drop_unique_constraint",
            Self::CreateIndex(_) => "create_index",
            Self::DropIndex(_) => "drop_index",
            Self::RenameIndex(_) => "rename_index",
            Self::AddForeignKey(_) => "add_foreign_key",
            Self::DropForeignKey(_) => "drop_foreign_key",
            Self::CreateSequence(_) => "create_sequence",
            Self::DropSequence(_) => "drop_sequence",
            Self::RenameSequence(_) => "rename_sequence",
            Self::AlterSequence(_) => "alter_sequence",
            Self::RestartSequence(_) => "restart_sequence",
        }
    }

    /// The table this operation works on, if any.
    pub fn table(&self) -> Option<&QualifiedName> {
        match self {
            Self::CreateTable(op) => Some(&op.table),
            Self::DropTable(op) => Some(&op.table),
            Self::RenameTable(op) => Some(&op.table),
            Self::AlterTable(op) => Some(&op.table),
            Self::AddColumn(op) => Some(&op.table),
            Self::DropColumn(op) => Some(&op.table),
            Self::RenameColumn(op) => Some(&op.table),
            Self::AlterColumn(op) => Some(&op.table),
            Self::AddPrimaryKey(op) | Self::AddUniqueConstraint(op) => Some(&op.table),
            Self::DropPrimaryKey(op) | Self::DropUniqueConstraint(op) | Self::DropForeignKey(op) => {
                Some(&op.table)
            }
            Self::CreateIndex(op) => Some(&op.table),
            Self::DropIndex(op) => Some(&op.table),
            Self::RenameIndex(op) => Some(&op.table),
            Self::AddForeignKey(op) => Some(&op.table),
            Self::EnsureSchema(_)
            | Self::DropSchema(_)
            | Self::AlterDatabase(_)
            | Self::CreateSequence(_)
            | Self::DropSequence(_)
            | Self::RenameSequence(_)
            | Self::AlterSequence(_)
            | Self::RestartSequence(_) => None,
        }
    }

    /// Whether applying this operation can lose stored data.
    pub fn is_destructive(&self) -> bool {
        match self {
            Self::DropTable(_) | Self::DropColumn(_) | Self::DropSequence(_) => true,
            Self::AlterColumn(op) => op.is_destructive,
            _ => false,
        }
    }
}

impl fmt::Display for MigrationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnsureSchema(op) => write!(f, "ensure schema {}", op.name),
            Self::DropSchema(op) => write!(f, "drop schema {}", op.name),
            Self::AlterDatabase(_) => f.write_str("alter database annotations"),
            Self::CreateTable(op) => write!(f, "create table {}", op.table),
            Self::DropTable(op) => write!(f, "drop table {}", op.table),
            Self::RenameTable(op) => write!(f, "rename table {} to {}", op.table, op.new_table),
            Self::AlterTable(op) => write!(f, "alter table {}", op.table),
            Self::AddColumn(op) => write!(f, "add column {}.{}", op.table, op.column.name),
            Self::DropColumn(op) => write!(f, "drop column {}.{}", op.table, op.name),
            Self::RenameColumn(op) => {
                write!(f, "rename column {}.{} to {}", op.table, op.name, op.new_name)
            }
            Self::AlterColumn(op) => write!(f, "alter column {}.{}", op.table, op.column.name),
            Self::AddPrimaryKey(op) => write!(f, "add primary key {} on {}", op.name, op.table),
            Self::DropPrimaryKey(op) => write!(f, "drop primary key {} on {}", op.name, op.table),
            Self::AddUniqueConstraint(op) => {
                write!(f, "add unique constraint {} on {}", op.name, op.table)
            }
            Self::DropUniqueConstraint(op) => {
                write!(f, "drop unique constraint {} on {}", op.name, op.table)
            }
            Self::CreateIndex(op) => write!(f, "create index {} on {}", op.name, op.table),
            Self::DropIndex(op) => write!(f, "drop index {} on {}", op.name, op.table),
            Self::RenameIndex(op) => {
                write!(f, "rename index {} on {} to {}", op.name, op.table, op.new_name)
            }
            Self::AddForeignKey(op) => write!(
                f,
                "add foreign key {} from {} to {}",
                op.name, op.table, op.principal_table
            ),
            Self::DropForeignKey(op) => write!(f, "drop foreign key {} on {}", op.name, op.table),
            Self::CreateSequence(op) => write!(f, "create sequence {}", op.sequence),
            Self::DropSequence(op) => write!(f, "drop sequence {}", op.sequence),
            Self::RenameSequence(op) => {
                write!(f, "rename sequence {} to {}", op.sequence, op.new_sequence)
            }
            Self::AlterSequence(op) => write!(f, "alter sequence {}", op.sequence),
            Self::RestartSequence(op) => {
                write!(f, "restart sequence {} at {}", op.sequence, op.start_value)
            }
        }
    }
}

/// Ensure or drop a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaOperation {
    /// Schema name.
    pub name: SmolStr,
}

/// Change model-wide annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterDatabase {
    /// Annotations afterwards.
    pub annotations: Annotations,
    /// Annotations before.
    pub old_annotations: Annotations,
}

/// Complete definition of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: SmolStr,
    /// Store type.
    pub store_type: SmolStr,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Maximum length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    /// Literal default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Default value expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sql: Option<String>,
    /// Computed column expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_sql: Option<String>,
    /// Annotations.
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
}

impl From<&Column> for ColumnDefinition {
    fn from(column: &Column) -> Self {
        Self {
            name: column.name.clone(),
            store_type: column.store_type.clone(),
            nullable: column.nullable,
            max_length: column.max_length,
            default_value: column.default_value.clone(),
            default_sql: column.default_sql.clone(),
            computed_sql: column.computed_sql.clone(),
            annotations: column.annotations.clone(),
        }
    }
}

/// Create a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTable {
    /// Table name.
    pub table: QualifiedName,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDefinition>,
    /// Primary key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<AddKey>,
    /// Unique constraints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique_constraints: Vec<AddKey>,
    /// Foreign keys created together with the table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<AddForeignKey>,
    /// Annotations.
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
}

/// Drop a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropTable {
    /// Table name.
    pub table: QualifiedName,
    /// Annotations the table had.
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
}

/// Rename a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameTable {
    /// Current name.
    pub table: QualifiedName,
    /// New name.
    pub new_table: QualifiedName,
}

/// Change table annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterTable {
    /// Table name.
    pub table: QualifiedName,
    /// Annotations afterwards.
    pub annotations: Annotations,
    /// Annotations before.
    pub old_annotations: Annotations,
}

/// Add a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddColumn {
    /// Table name.
    pub table: QualifiedName,
    /// The new column.
    pub column: ColumnDefinition,
}

/// Drop a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropColumn {
    /// Table name.
    pub table: QualifiedName,
    /// Column name.
    pub name: SmolStr,
}

/// Rename a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameColumn {
    /// Table name.
    pub table: QualifiedName,
    /// Current column name.
    pub name: SmolStr,
    /// New column name.
    pub new_name: SmolStr,
}

/// Change a column in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterColumn {
    /// Table name.
    pub table: QualifiedName,
    /// Definition afterwards.
    pub column: ColumnDefinition,
    /// Definition before.
    pub old_column: ColumnDefinition,
    /// Set when the change can lose data: a store type change, or a
    /// nullable column becoming required.
    pub is_destructive: bool,
}

/// Add a primary key or unique constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddKey {
    /// Table name.
    pub table: QualifiedName,
    /// Constraint name.
    pub name: SmolStr,
    /// Key columns.
    pub columns: Vec<SmolStr>,
    /// Annotations.
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
}

impl AddKey {
    pub(crate) fn from_key(table: &QualifiedName, key: &Key) -> Self {
        Self {
            table: table.clone(),
            name: key.name.clone(),
            columns: key.columns.clone(),
            annotations: key.annotations.clone(),
        }
    }
}

/// Drop a named constraint (primary key, unique constraint or foreign key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropConstraint {
    /// Table name.
    pub table: QualifiedName,
    /// Constraint name.
    pub name: SmolStr,
}

/// Create an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIndex {
    /// Table name.
    pub table: QualifiedName,
    /// Index name.
    pub name: SmolStr,
    /// Indexed columns.
    pub columns: Vec<SmolStr>,
    /// Whether the index is unique.
    pub unique: bool,
    /// Partial index predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Annotations.
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
}

impl CreateIndex {
    pub(crate) fn from_index(table: &QualifiedName, index: &Index) -> Self {
        Self {
            table: table.clone(),
            name: index.name.clone(),
            columns: index.columns.clone(),
            unique: index.unique,
            filter: index.filter.clone(),
            annotations: index.annotations.clone(),
        }
    }
}

/// Drop an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropIndex {
    /// Table name.
    pub table: QualifiedName,
    /// Index name.
    pub name: SmolStr,
}

/// Rename an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameIndex {
    /// Table name.
    pub table: QualifiedName,
    /// Current index name.
    pub name: SmolStr,
    /// New index name.
    pub new_name: SmolStr,
}

/// Add a foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddForeignKey {
    /// Dependent table.
    pub table: QualifiedName,
    /// Constraint name.
    pub name: SmolStr,
    /// Dependent columns.
    pub columns: Vec<SmolStr>,
    /// Principal table.
    pub principal_table: QualifiedName,
    /// Principal columns.
    pub principal_columns: Vec<SmolStr>,
    /// Delete behaviour.
    pub on_delete: ReferentialAction,
    /// Annotations.
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
}

impl AddForeignKey {
    pub(crate) fn from_foreign_key(table: &QualifiedName, fk: &ForeignKey) -> Self {
        Self {
            table: table.clone(),
            name: fk.name.clone(),
            columns: fk.columns.clone(),
            principal_table: fk.principal_table.clone(),
            principal_columns: fk.principal_columns.clone(),
            on_delete: fk.on_delete,
            annotations: fk.annotations.clone(),
        }
    }

    /// Whether the foreign key points back at its own table.
    pub fn is_self_referencing(&self) -> bool {
        self.table == self.principal_table
    }
}

/// The tunable options of a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceOptions {
    /// Step between values.
    pub increment_by: i64,
    /// Lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i64>,
    /// Upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<i64>,
    /// Whether the sequence wraps around.
    pub cyclic: bool,
    /// Annotations.
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
}

impl From<&Sequence> for SequenceOptions {
    fn from(sequence: &Sequence) -> Self {
        Self {
            increment_by: sequence.increment_by,
            min_value: sequence.min_value,
            max_value: sequence.max_value,
            cyclic: sequence.cyclic,
            annotations: sequence.annotations.clone(),
        }
    }
}

/// Create a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSequence {
    /// Sequence name.
    pub sequence: QualifiedName,
    /// Store type.
    pub store_type: SmolStr,
    /// First value.
    pub start_value: i64,
    /// Options.
    #[serde(flatten)]
    pub options: SequenceOptions,
}

impl From<&Sequence> for CreateSequence {
    fn from(sequence: &Sequence) -> Self {
        Self {
            sequence: sequence.qualified_name(),
            store_type: sequence.store_type.clone(),
            start_value: sequence.start_value,
            options: SequenceOptions::from(sequence),
        }
    }
}

/// Drop a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropSequence {
    /// Sequence name.
    pub sequence: QualifiedName,
}

/// Rename a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameSequence {
    /// Current name.
    pub sequence: QualifiedName,
    /// New name.
    pub new_sequence: QualifiedName,
}

/// Change a sequence's options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterSequence {
    /// Sequence name.
    pub sequence: QualifiedName,
    /// Options afterwards.
    pub options: SequenceOptions,
    /// Options before.
    pub old_options: SequenceOptions,
}

/// Restart a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartSequence {
    /// Sequence name.
    pub sequence: QualifiedName,
    /// Value to restart at.
    pub start_value: i64,
}
