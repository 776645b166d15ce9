//! Schema snapshots.
//!
//! A [`Snapshot`] is a frozen description of a relational schema: tables with
//! their columns, keys, indexes and foreign keys, plus sequences and free-form
//! annotations. Snapshots are produced by an external provider (usually from
//! model metadata) and compared by the [`ModelDiffer`](crate::diff::ModelDiffer).
//! Nothing in this crate mutates a snapshot after it is built.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{MigrateResult, MigrationError};

/// Provider-specific key/value annotations attached to a schema object.
///
/// Annotations are opaque to the differ: two bags are equal when they hold
/// the same keys with the same values, in any order.
pub type Annotations = BTreeMap<SmolStr, String>;

/// A possibly schema-qualified object name.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct QualifiedName {
    /// Schema (namespace), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SmolStr>,
    /// Object name.
    pub name: SmolStr,
}

impl QualifiedName {
    /// A name in the default schema.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// A name in an explicit schema.
    pub fn in_schema(schema: impl Into<SmolStr>, name: impl Into<SmolStr>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Compare ignoring ASCII case.
    pub fn eq_ignore_case(&self, other: &QualifiedName) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && match (&self.schema, &other.schema) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                (None, None) => true,
                _ => false,
            }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A complete schema snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Model-wide annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Annotations,
    /// Tables.
    #[serde(default)]
    pub tables: Vec<Table>,
    /// Sequences.
    #[serde(default)]
    pub sequences: Vec<Sequence>,
}

impl Snapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table.
    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Add a sequence.
    pub fn with_sequence(mut self, sequence: Sequence) -> Self {
        self.sequences.push(sequence);
        self
    }

    /// Add a model-wide annotation.
    pub fn with_annotation(mut self, key: impl Into<SmolStr>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Look up a table by qualified name.
    pub fn table(&self, name: &QualifiedName) -> Option<&Table> {
        self.tables.iter().find(|t| &t.qualified_name() == name)
    }

    /// Look up a sequence by qualified name.
    pub fn sequence(&self, name: &QualifiedName) -> Option<&Sequence> {
        self.sequences.iter().find(|s| &s.qualified_name() == name)
    }

    /// Every explicit schema used by a table or sequence.
    pub fn schemas(&self) -> BTreeSet<SmolStr> {
        self.tables
            .iter()
            .filter_map(|t| t.schema.clone())
            .chain(self.sequences.iter().filter_map(|s| s.schema.clone()))
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Check that every reference inside the snapshot resolves.
    pub fn validate(&self) -> MigrateResult<()> {
        let mut table_names = HashSet::new();
        for table in &self.tables {
            if !table_names.insert(table.qualified_name()) {
                return Err(MigrationError::inconsistent(format!(
                    "table '{}' is defined more than once",
                    table.qualified_name()
                )));
            }
        }

        let mut sequence_names = HashSet::new();
        for sequence in &self.sequences {
            if !sequence_names.insert(sequence.qualified_name()) {
                return Err(MigrationError::inconsistent(format!(
                    "sequence '{}' is defined more than once",
                    sequence.qualified_name()
                )));
            }
        }

        for table in &self.tables {
            self.validate_table(table)?;
        }

        Ok(())
    }

    fn validate_table(&self, table: &Table) -> MigrateResult<()> {
        let table_name = table.qualified_name();

        for (key, column) in &table.columns {
            if key != &column.name {
                return Err(MigrationError::inconsistent(format!(
                    "table '{}' stores column '{}' under the key '{}'",
                    table_name, column.name, key
                )));
            }
        }

        let check_columns = |kind: &str, name: &str, columns: &[SmolStr]| {
            if columns.is_empty() {
                return Err(MigrationError::inconsistent(format!(
                    "{} '{}' on table '{}' has no columns",
                    kind, name, table_name
                )));
            }
            match columns.iter().find(|c| !table.columns.contains_key(c.as_str())) {
                Some(missing) => Err(MigrationError::inconsistent(format!(
                    "{} '{}' on table '{}' references missing column '{}'",
                    kind, name, table_name, missing
                ))),
                None => Ok(()),
            }
        };

        let mut constraint_names = HashSet::new();
        let mut claim = |name: &SmolStr| {
            if constraint_names.insert(name.clone()) {
                Ok(())
            } else {
                Err(MigrationError::inconsistent(format!(
                    "constraint '{}' is defined more than once on table '{}'",
                    name, table_name
                )))
            }
        };

        if let Some(pk) = &table.primary_key {
            check_columns("primary key", &pk.name, &pk.columns)?;
            claim(&pk.name)?;
        }
        for key in &table.unique_constraints {
            check_columns("unique constraint", &key.name, &key.columns)?;
            claim(&key.name)?;
        }
        for fk in &table.foreign_keys {
            check_columns("foreign key", &fk.name, &fk.columns)?;
            claim(&fk.name)?;

            let principal = self.table(&fk.principal_table).ok_or_else(|| {
                MigrationError::inconsistent(format!(
                    "foreign key '{}' on table '{}' references missing table '{}'",
                    fk.name, table_name, fk.principal_table
                ))
            })?;
            if let Some(missing) = fk
                .principal_columns
                .iter()
                .find(|c| !principal.columns.contains_key(c.as_str()))
            {
                return Err(MigrationError::inconsistent(format!(
                    "foreign key '{}' on table '{}' references missing column '{}.{}'",
                    fk.name, table_name, fk.principal_table, missing
                )));
            }
            if fk.principal_columns.len() != fk.columns.len() {
                return Err(MigrationError::inconsistent(format!(
                    "foreign key '{}' on table '{}' maps {} columns onto {}",
                    fk.name,
                    table_name,
                    fk.columns.len(),
                    fk.principal_columns.len()
                )));
            }
        }

        let mut index_names = HashSet::new();
        for index in &table.indexes {
            check_columns("index", &index.name, &index.columns)?;
            if !index_names.insert(index.name.clone()) {
                return Err(MigrationError::inconsistent(format!(
                    "index '{}' is defined more than once on table '{}'",
                    index.name, table_name
                )));
            }
        }

        Ok(())
    }
}

/// A table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Schema, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SmolStr>,
    /// Table name.
    pub name: SmolStr,
    /// Columns in declaration order.
    #[serde(default)]
    pub columns: IndexMap<SmolStr, Column>,
    /// Primary key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Key>,
    /// Alternate keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique_constraints: Vec<Key>,
    /// Indexes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Index>,
    /// Relationships where this table is the dependent side.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
    /// Annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Annotations,
    /// The name this table had in the previous snapshot, when it was renamed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<QualifiedName>,
}

impl Table {
    /// Create a table in the default schema.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Place the table in a schema.
    pub fn in_schema(mut self, schema: impl Into<SmolStr>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// The schema-qualified name.
    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName {
            schema: self.schema.clone(),
            name: self.name.clone(),
        }
    }

    /// Add a column.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.insert(column.name.clone(), column);
        self
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Set the primary key.
    pub fn with_primary_key(mut self, key: Key) -> Self {
        self.primary_key = Some(key);
        self
    }

    /// Add an alternate key.
    pub fn with_unique(mut self, key: Key) -> Self {
        self.unique_constraints.push(key);
        self
    }

    /// Add an index.
    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Add a foreign key.
    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Add an annotation.
    pub fn with_annotation(mut self, key: impl Into<SmolStr>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Record the table's previous name.
    pub fn renamed_from(mut self, previous: QualifiedName) -> Self {
        self.renamed_from = Some(previous);
        self
    }
}

/// A column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: SmolStr,
    /// Store type, such as `integer` or `nvarchar(max)`.
    pub store_type: SmolStr,
    /// Whether the column accepts NULL.
    #[serde(default)]
    pub nullable: bool,
    /// Maximum length, for sized types.
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
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Annotations,
    /// The name this column had in the previous snapshot, when it was renamed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<SmolStr>,
}

impl Column {
    /// Create a non-nullable column.
    pub fn new(name: impl Into<SmolStr>, store_type: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            store_type: store_type.into(),
            ..Default::default()
        }
    }

    /// Make the column nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Set the maximum length.
    pub fn max_length(mut self, len: u32) -> Self {
        self.max_length = Some(len);
        self
    }

    /// Set a literal default value.
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Set a default value expression.
    pub fn default_sql(mut self, sql: impl Into<String>) -> Self {
        self.default_sql = Some(sql.into());
        self
    }

    /// Make the column computed.
    pub fn computed(mut self, sql: impl Into<String>) -> Self {
        self.computed_sql = Some(sql.into());
        self
    }

    /// Add an annotation.
    pub fn with_annotation(mut self, key: impl Into<SmolStr>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Record the column's previous name.
    pub fn renamed_from(mut self, previous: impl Into<SmolStr>) -> Self {
        self.renamed_from = Some(previous.into());
        self
    }

    /// Whether two columns have the same definition, ignoring their names.
    pub fn same_definition(&self, other: &Column) -> bool {
        self.store_type == other.store_type
            && self.nullable == other.nullable
            && self.max_length == other.max_length
            && self.default_value == other.default_value
            && self.default_sql == other.default_sql
            && self.computed_sql == other.computed_sql
            && self.annotations == other.annotations
    }
}

/// A primary key or unique constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Key {
    /// Constraint name.
    pub name: SmolStr,
    /// Key columns, in order.
    pub columns: Vec<SmolStr>,
    /// Annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Annotations,
}

impl Key {
    /// Create a key over `columns`.
    pub fn new<I, S>(name: impl Into<SmolStr>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            annotations: Annotations::new(),
        }
    }
}

/// An index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: SmolStr,
    /// Indexed columns, in order.
    pub columns: Vec<SmolStr>,
    /// Whether the index enforces uniqueness.
    #[serde(default)]
    pub unique: bool,
    /// Filter predicate for partial indexes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Annotations,
}

impl Index {
    /// Create a non-unique index over `columns`.
    pub fn new<I, S>(name: impl Into<SmolStr>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Make the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Make the index partial.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// What happens to dependent rows when the principal row is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    /// Leave dependents alone (the store rejects the delete).
    #[default]
    NoAction,
    /// Reject the delete immediately.
    Restrict,
    /// Delete dependents.
    Cascade,
    /// Null out the dependent columns.
    SetNull,
    /// Reset the dependent columns to their defaults.
    SetDefault,
}

/// A foreign key (relationship) declared on the dependent table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: SmolStr,
    /// Dependent columns.
    pub columns: Vec<SmolStr>,
    /// Principal table.
    pub principal_table: QualifiedName,
    /// Principal columns, matched positionally with `columns`.
    pub principal_columns: Vec<SmolStr>,
    /// Delete behaviour.
    #[serde(default)]
    pub on_delete: ReferentialAction,
    /// Annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Annotations,
}

impl ForeignKey {
    /// Create a foreign key.
    pub fn new<I, S, P, T>(
        name: impl Into<SmolStr>,
        columns: I,
        principal_table: QualifiedName,
        principal_columns: P,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
        P: IntoIterator<Item = T>,
        T: Into<SmolStr>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            principal_table,
            principal_columns: principal_columns.into_iter().map(Into::into).collect(),
            on_delete: ReferentialAction::NoAction,
            annotations: Annotations::new(),
        }
    }

    /// Set the delete behaviour.
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }
}

/// A sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    /// Schema, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SmolStr>,
    /// Sequence name.
    pub name: SmolStr,
    /// Store type of the generated values.
    #[serde(default = "default_sequence_type")]
    pub store_type: SmolStr,
    /// First value.
    #[serde(default = "default_one")]
    pub start_value: i64,
    /// Step between values.
    #[serde(default = "default_one")]
    pub increment_by: i64,
    /// Lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i64>,
    /// Upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<i64>,
    /// Whether the sequence wraps around.
    #[serde(default)]
    pub cyclic: bool,
    /// Annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Annotations,
}

fn default_sequence_type() -> SmolStr {
    SmolStr::new_static("bigint")
}

fn default_one() -> i64 {
    1
}

impl Sequence {
    /// Create a `bigint` sequence starting at 1.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            store_type: default_sequence_type(),
            start_value: 1,
            increment_by: 1,
            min_value: None,
            max_value: None,
            cyclic: false,
            annotations: Annotations::new(),
        }
    }

    /// Place the sequence in a schema.
    pub fn in_schema(mut self, schema: impl Into<SmolStr>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Set the store type.
    pub fn store_type(mut self, store_type: impl Into<SmolStr>) -> Self {
        self.store_type = store_type.into();
        self
    }

    /// Set the start value.
    pub fn start_at(mut self, start: i64) -> Self {
        self.start_value = start;
        self
    }

    /// Set the increment.
    pub fn increment_by(mut self, step: i64) -> Self {
        self.increment_by = step;
        self
    }

    /// The schema-qualified name.
    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName {
            schema: self.schema.clone(),
            name: self.name.clone(),
        }
    }
}
