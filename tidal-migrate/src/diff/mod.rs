//! Model differ.
//!
//! [`ModelDiffer`] compares two [`Snapshot`]s and produces the ordered list of
//! [`MigrationOperation`]s that turns the first into the second.
//!
//! Objects of each kind are paired between the snapshots before anything is
//! emitted. Pairing tries, in order:
//!
//! 1. explicit `renamed_from` markers, when the old name is gone from the
//!    target and the new name is absent from the source,
//! 2. identical names,
//! 3. names differing only in case (and, for tables and sequences, only in
//!    schema),
//! 4. structural similarity, when [`DifferConfig::detect_renames`] is set.
//!
//! A paired object with a different name becomes a rename; everything left
//! unpaired is dropped or created. Keys and foreign keys are never altered in
//! place: any change drops and re-adds them, as does a store type change on
//! one of their columns.
//!
//! ```rust
//! use tidal_migrate::diff::ModelDiffer;
//! use tidal_migrate::snapshot::{Column, Snapshot, Table};
//!
//! let before = Snapshot::new().with_table(Table::new("T").with_column(Column::new("a", "int")));
//! let after = Snapshot::new().with_table(
//!     Table::new("T")
//!         .with_column(Column::new("a", "int"))
//!         .with_column(Column::new("b", "text").nullable()),
//! );
//!
//! let ops = ModelDiffer::new().diff(&before, &after).unwrap();
//! assert_eq!(ops.len(), 1);
//! assert_eq!(ops[0].to_string(), "add column T.b");
//! ```

mod graph;
mod matching;
#[cfg(test)]
mod replay;
mod sort;

use std::collections::{HashMap, HashSet};

use smol_str::SmolStr;
use tracing::{debug, info};

use crate::config::DifferConfig;
use crate::error::MigrateResult;
use crate::operation::{
    AddColumn, AddForeignKey, AddKey, AlterColumn, AlterDatabase, AlterSequence, AlterTable,
    ColumnDefinition, CreateIndex, CreateSequence, CreateTable, DropColumn, DropConstraint,
    DropIndex, DropSequence, DropTable, MigrationOperation, RenameColumn, RenameIndex,
    RenameSequence, RenameTable, RestartSequence, SchemaOperation, SequenceOptions,
};
use crate::plan::MigrationPlan;
use crate::snapshot::{Column, ForeignKey, Index, Key, QualifiedName, Sequence, Snapshot, Table};

use matching::Matcher;
use sort::{OperationSet, Phase};

/// Computes the operations between two schema snapshots.
#[derive(Debug, Clone, Default)]
pub struct ModelDiffer {
    config: DifferConfig,
}

impl ModelDiffer {
    /// Create a differ with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a differ with custom settings.
    pub fn with_config(config: DifferConfig) -> Self {
        Self { config }
    }

    /// The differ's settings.
    pub fn config(&self) -> &DifferConfig {
        &self.config
    }

    /// Compute the operations that turn `source` into `target`.
    ///
    /// Both snapshots are validated first; an inconsistent snapshot fails
    /// with [`MigrationError::InconsistentSnapshot`](crate::MigrationError::InconsistentSnapshot)
    /// and nothing is emitted.
    pub fn diff(&self, source: &Snapshot, target: &Snapshot) -> MigrateResult<Vec<MigrationOperation>> {
        self.config.validate()?;
        source.validate()?;
        target.validate()?;

        debug!(
            source_tables = source.tables.len(),
            target_tables = target.tables.len(),
            detect_renames = self.config.detect_renames,
            "diffing snapshots"
        );

        let operations = Diff::new(&self.config, source, target).run();

        debug!(operations = operations.len(), "diff complete");
        Ok(operations)
    }

    /// Whether `source` and `target` differ at all.
    pub fn has_differences(&self, source: &Snapshot, target: &Snapshot) -> MigrateResult<bool> {
        Ok(!self.diff(source, target)?.is_empty())
    }

    /// Compute both directions: `up` from `source` to `target` and `down` back.
    pub fn plan(&self, source: &Snapshot, target: &Snapshot) -> MigrateResult<MigrationPlan> {
        let plan = MigrationPlan::new(self.diff(source, target)?, self.diff(target, source)?);
        info!(summary = %plan.summary(), "computed migration plan");
        Ok(plan)
    }
}

/// Source column name -> target column name, for one paired table.
type ColumnMap = HashMap<SmolStr, SmolStr>;

/// State of a single diff run.
struct Diff<'a> {
    config: &'a DifferConfig,
    source: &'a Snapshot,
    target: &'a Snapshot,
    ops: OperationSet,
    /// Paired tables, source name -> target name.
    table_names: HashMap<QualifiedName, QualifiedName>,
    /// Column pairings, keyed by source table name.
    column_maps: HashMap<QualifiedName, ColumnMap>,
    /// Target columns whose type changed or that were recreated, keyed by
    /// target table name. Constraints over them are rebuilt.
    rebuilt_columns: HashMap<QualifiedName, HashSet<SmolStr>>,
    /// Source keys (table, columns) that are dropped.
    dropped_keys: HashSet<(QualifiedName, Vec<SmolStr>)>,
}

impl<'a> Diff<'a> {
    fn new(config: &'a DifferConfig, source: &'a Snapshot, target: &'a Snapshot) -> Self {
        Self {
            config,
            source,
            target,
            ops: OperationSet::default(),
            table_names: HashMap::new(),
            column_maps: HashMap::new(),
            rebuilt_columns: HashMap::new(),
            dropped_keys: HashSet::new(),
        }
    }

    fn run(mut self) -> Vec<MigrationOperation> {
        self.diff_schemas();
        self.diff_database();

        let tables = self.pair_tables();
        for &(source, target) in &tables.pairs {
            self.diff_table(source, target);
        }
        for &(source, target) in &tables.pairs {
            self.diff_keys(source, target);
            self.diff_indexes(source, target);
        }
        for &(source, target) in &tables.pairs {
            self.diff_foreign_keys(source, target);
        }
        for &table in &tables.removed {
            self.drop_table(table);
        }
        for &table in &tables.added {
            self.create_table(table);
        }

        self.diff_sequences();

        self.ops.into_operations()
    }

    fn diff_schemas(&mut self) {
        let before = self.source.schemas();
        let after = self.target.schemas();

        for name in after.difference(&before) {
            self.ops.push(
                Phase::EnsureSchemas,
                MigrationOperation::EnsureSchema(SchemaOperation { name: name.clone() }),
            );
        }
        for name in before.difference(&after) {
            self.ops.push(
                Phase::DropSchemas,
                MigrationOperation::DropSchema(SchemaOperation { name: name.clone() }),
            );
        }
    }

    fn diff_database(&mut self) {
        if self.source.annotations != self.target.annotations {
            self.ops.push(
                Phase::AlterDatabase,
                MigrationOperation::AlterDatabase(AlterDatabase {
                    annotations: self.target.annotations.clone(),
                    old_annotations: self.source.annotations.clone(),
                }),
            );
        }
    }

    // Tables

    fn pair_tables(&self) -> matching::Pairing<'a, Table> {
        let source: &'a Snapshot = self.source;
        let target: &'a Snapshot = self.target;

        // A hint only counts when the old name is gone from the target and the
        // new one is absent from the source; otherwise both are separate tables.
        let mut matcher = Matcher::new(sorted_tables(source), sorted_tables(target));
        matcher
            .pass(|s, t| {
                let (old_name, new_name) = (s.qualified_name(), t.qualified_name());
                (t.renamed_from.as_ref() == Some(&old_name) || s.renamed_from.as_ref() == Some(&new_name))
                    && target.table(&old_name).is_none()
                    && source.table(&new_name).is_none()
            })
            .pass(|s, t| s.qualified_name() == t.qualified_name())
            .pass(|s, t| s.qualified_name().eq_ignore_case(&t.qualified_name()))
            .pass(|s, t| s.name.eq_ignore_ascii_case(&t.name));
        if self.config.detect_renames {
            matcher.pass_scored(table_similarity, self.config.rename_threshold);
        }
        matcher.finish()
    }

    fn diff_table(&mut self, source: &'a Table, target: &'a Table) {
        let old_name = source.qualified_name();
        let name = target.qualified_name();

        if old_name != name {
            debug!(from = %old_name, to = %name, "table renamed");
            self.ops.push(
                Phase::RenameTables,
                MigrationOperation::RenameTable(RenameTable {
                    table: old_name.clone(),
                    new_table: name.clone(),
                }),
            );
        }

        if source.annotations != target.annotations {
            self.ops.push(
                Phase::AlterTables,
                MigrationOperation::AlterTable(AlterTable {
                    table: name.clone(),
                    annotations: target.annotations.clone(),
                    old_annotations: source.annotations.clone(),
                }),
            );
        }

        self.table_names.insert(old_name, name);
        self.diff_columns(source, target);
    }

    fn drop_table(&mut self, table: &'a Table) {
        let name = table.qualified_name();

        for fk in sorted_by_name(&table.foreign_keys, |fk| &fk.name) {
            self.ops.push(
                Phase::DropForeignKeys,
                MigrationOperation::DropForeignKey(DropConstraint {
                    table: name.clone(),
                    name: fk.name.clone(),
                }),
            );
        }

        let principals = table
            .foreign_keys
            .iter()
            .map(|fk| fk.principal_table.clone())
            .collect();
        self.ops.push_drop_table(
            MigrationOperation::DropTable(DropTable {
                table: name,
                annotations: table.annotations.clone(),
            }),
            principals,
        );
    }

    fn create_table(&mut self, table: &'a Table) {
        let name = table.qualified_name();

        self.ops.push_create_table(CreateTable {
            table: name.clone(),
            columns: table.columns.values().map(ColumnDefinition::from).collect(),
            primary_key: table.primary_key.as_ref().map(|pk| AddKey::from_key(&name, pk)),
            unique_constraints: sorted_by_name(&table.unique_constraints, |k| &k.name)
                .into_iter()
                .map(|k| AddKey::from_key(&name, k))
                .collect(),
            foreign_keys: sorted_by_name(&table.foreign_keys, |fk| &fk.name)
                .into_iter()
                .map(|fk| AddForeignKey::from_foreign_key(&name, fk))
                .collect(),
            annotations: table.annotations.clone(),
        });

        for index in sorted_by_name(&table.indexes, |i| &i.name) {
            self.ops.push(
                Phase::Constraints,
                MigrationOperation::CreateIndex(CreateIndex::from_index(&name, index)),
            );
        }
    }

    // Columns

    fn diff_columns(&mut self, source: &'a Table, target: &'a Table) {
        let old_table = source.qualified_name();
        let table = target.qualified_name();

        let mut matcher = Matcher::new(
            source.columns.values().collect(),
            target.columns.values().collect(),
        );
        matcher
            .pass(|s, t| {
                (t.renamed_from.as_ref() == Some(&s.name) || s.renamed_from.as_ref() == Some(&t.name))
                    && !target.columns.contains_key(&s.name)
                    && !source.columns.contains_key(&t.name)
            })
            .pass(|s, t| s.name == t.name)
            .pass(|s, t| s.name.eq_ignore_ascii_case(&t.name));
        if self.config.detect_renames {
            matcher.pass_unique(|s, t| s.same_definition(t));
        }
        let columns = matcher.finish();

        let mut column_map = ColumnMap::new();
        let mut rebuilt = HashSet::new();

        for &column in &columns.removed {
            self.drop_column(&old_table, column);
        }

        for &(before, after) in &columns.pairs {
            // Switching between stored and computed cannot be done in place.
            if before.computed_sql.is_some() != after.computed_sql.is_some() {
                self.drop_column(&old_table, before);
                self.add_column(&table, after);
                rebuilt.insert(after.name.clone());
                continue;
            }

            column_map.insert(before.name.clone(), after.name.clone());

            if before.name != after.name {
                debug!(table = %table, from = %before.name, to = %after.name, "column renamed");
                self.ops.push(
                    Phase::Renames,
                    MigrationOperation::RenameColumn(RenameColumn {
                        table: table.clone(),
                        name: before.name.clone(),
                        new_name: after.name.clone(),
                    }),
                );
            }

            if !before.same_definition(after) {
                let retyped = type_changed(before, after);
                if retyped {
                    rebuilt.insert(after.name.clone());
                }

                let mut old_column = ColumnDefinition::from(before);
                old_column.name = after.name.clone();
                self.ops.push(
                    column_phase(after),
                    MigrationOperation::AlterColumn(AlterColumn {
                        table: table.clone(),
                        column: ColumnDefinition::from(after),
                        old_column,
                        is_destructive: retyped || (before.nullable && !after.nullable),
                    }),
                );
            }
        }

        for &column in &columns.added {
            self.add_column(&table, column);
        }

        self.column_maps.insert(old_table, column_map);
        self.rebuilt_columns.insert(table, rebuilt);
    }

    fn add_column(&mut self, table: &QualifiedName, column: &Column) {
        self.ops.push(
            column_phase(column),
            MigrationOperation::AddColumn(AddColumn {
                table: table.clone(),
                column: ColumnDefinition::from(column),
            }),
        );
    }

    fn drop_column(&mut self, table: &QualifiedName, column: &Column) {
        self.ops.push(
            Phase::DropColumns,
            MigrationOperation::DropColumn(DropColumn {
                table: table.clone(),
                name: column.name.clone(),
            }),
        );
    }

    /// Translate source column names of `table` to their target names.
    fn map_columns(&self, table: &QualifiedName, columns: &[SmolStr]) -> Option<Vec<SmolStr>> {
        let map = self.column_maps.get(table)?;
        columns.iter().map(|c| map.get(c).cloned()).collect()
    }

    fn touches_rebuilt(&self, table: &QualifiedName, columns: &[SmolStr]) -> bool {
        self.rebuilt_columns
            .get(table)
            .is_some_and(|rebuilt| columns.iter().any(|c| rebuilt.contains(c)))
    }

    // Keys

    fn diff_keys(&mut self, source: &'a Table, target: &'a Table) {
        let old_table = source.qualified_name();
        let table = target.qualified_name();

        match (&source.primary_key, &target.primary_key) {
            (Some(before), Some(after)) if self.same_key(&old_table, before, &table, after) => {}
            (before, after) => {
                if let Some(before) = before {
                    self.drop_key(&old_table, before, true);
                }
                if let Some(after) = after {
                    self.ops.push(
                        Phase::Alters,
                        MigrationOperation::AddPrimaryKey(AddKey::from_key(&table, after)),
                    );
                }
            }
        }

        let mut matcher = Matcher::new(
            sorted_by_name(&source.unique_constraints, |k| &k.name),
            sorted_by_name(&target.unique_constraints, |k| &k.name),
        );
        matcher.pass(|s, t| s.name == t.name);
        let keys = matcher.finish();

        let mut dropped: Vec<&Key> = keys.removed.clone();
        let mut added: Vec<&Key> = keys.added.clone();
        for &(before, after) in &keys.pairs {
            if !self.same_key(&old_table, before, &table, after) {
                dropped.push(before);
                added.push(after);
            }
        }

        for key in dropped {
            self.drop_key(&old_table, key, false);
        }
        for key in added {
            self.ops.push(
                Phase::Alters,
                MigrationOperation::AddUniqueConstraint(AddKey::from_key(&table, key)),
            );
        }
    }

    fn same_key(&self, old_table: &QualifiedName, before: &Key, table: &QualifiedName, after: &Key) -> bool {
        before.name == after.name
            && before.annotations == after.annotations
            && self.map_columns(old_table, &before.columns).as_ref() == Some(&after.columns)
            && !self.touches_rebuilt(table, &after.columns)
    }

    fn drop_key(&mut self, table: &QualifiedName, key: &Key, primary: bool) {
        self.dropped_keys.insert((table.clone(), key.columns.clone()));

        let drop = DropConstraint {
            table: table.clone(),
            name: key.name.clone(),
        };
        let op = if primary {
            MigrationOperation::DropPrimaryKey(drop)
        } else {
            MigrationOperation::DropUniqueConstraint(drop)
        };
        self.ops.push(Phase::Drops, op);
    }

    // Indexes

    fn diff_indexes(&mut self, source: &'a Table, target: &'a Table) {
        let old_table = source.qualified_name();
        let table = target.qualified_name();

        let mut matcher = Matcher::new(
            sorted_by_name(&source.indexes, |i| &i.name),
            sorted_by_name(&target.indexes, |i| &i.name),
        );
        matcher
            .pass(|s, t| s.name == t.name)
            .pass(|s, t| s.name.eq_ignore_ascii_case(&t.name));
        if self.config.detect_renames {
            matcher.pass_unique(|s, t| self.same_index(&old_table, s, t));
        }
        let indexes = matcher.finish();

        let mut dropped: Vec<&Index> = indexes.removed.clone();
        let mut added: Vec<&Index> = indexes.added.clone();
        for &(before, after) in &indexes.pairs {
            if !self.same_index(&old_table, before, after) || self.touches_rebuilt(&table, &after.columns) {
                dropped.push(before);
                added.push(after);
            } else if before.name != after.name {
                self.ops.push(
                    Phase::Renames,
                    MigrationOperation::RenameIndex(RenameIndex {
                        table: table.clone(),
                        name: before.name.clone(),
                        new_name: after.name.clone(),
                    }),
                );
            }
        }

        for index in dropped {
            self.ops.push(
                Phase::Drops,
                MigrationOperation::DropIndex(DropIndex {
                    table: old_table.clone(),
                    name: index.name.clone(),
                }),
            );
        }
        for index in added {
            self.ops.push(
                Phase::Constraints,
                MigrationOperation::CreateIndex(CreateIndex::from_index(&table, index)),
            );
        }
    }

    fn same_index(&self, old_table: &QualifiedName, before: &Index, after: &Index) -> bool {
        before.unique == after.unique
            && before.filter == after.filter
            && before.annotations == after.annotations
            && self.map_columns(old_table, &before.columns).as_ref() == Some(&after.columns)
    }

    // Foreign keys

    fn diff_foreign_keys(&mut self, source: &'a Table, target: &'a Table) {
        let old_table = source.qualified_name();
        let table = target.qualified_name();

        let mut matcher = Matcher::new(
            sorted_by_name(&source.foreign_keys, |fk| &fk.name),
            sorted_by_name(&target.foreign_keys, |fk| &fk.name),
        );
        matcher.pass(|s, t| s.name == t.name);
        let foreign_keys = matcher.finish();

        let mut dropped: Vec<&ForeignKey> = foreign_keys.removed.clone();
        let mut added: Vec<&ForeignKey> = foreign_keys.added.clone();
        for &(before, after) in &foreign_keys.pairs {
            if !self.same_foreign_key(&old_table, before, &table, after) {
                dropped.push(before);
                added.push(after);
            }
        }

        for fk in dropped {
            self.ops.push(
                Phase::DropForeignKeys,
                MigrationOperation::DropForeignKey(DropConstraint {
                    table: old_table.clone(),
                    name: fk.name.clone(),
                }),
            );
        }
        for fk in added {
            self.ops.push(
                Phase::Constraints,
                MigrationOperation::AddForeignKey(AddForeignKey::from_foreign_key(&table, fk)),
            );
        }
    }

    fn same_foreign_key(
        &self,
        old_table: &QualifiedName,
        before: &ForeignKey,
        table: &QualifiedName,
        after: &ForeignKey,
    ) -> bool {
        before.on_delete == after.on_delete
            && before.annotations == after.annotations
            && self.map_columns(old_table, &before.columns).as_ref() == Some(&after.columns)
            && self.table_names.get(&before.principal_table) == Some(&after.principal_table)
            && self
                .map_columns(&before.principal_table, &before.principal_columns)
                .as_ref()
                == Some(&after.principal_columns)
            && !self
                .dropped_keys
                .contains(&(before.principal_table.clone(), before.principal_columns.clone()))
            && !self.touches_rebuilt(table, &after.columns)
    }

    // Sequences

    fn diff_sequences(&mut self) {
        let mut matcher = Matcher::new(sorted_sequences(self.source), sorted_sequences(self.target));
        matcher
            .pass(|s, t| s.qualified_name() == t.qualified_name() && s.store_type == t.store_type)
            .pass(|s, t| {
                s.qualified_name().eq_ignore_case(&t.qualified_name()) && s.store_type == t.store_type
            })
            .pass(|s, t| s.name.eq_ignore_ascii_case(&t.name) && s.store_type == t.store_type);
        let sequences = matcher.finish();

        for &sequence in &sequences.removed {
            self.ops.push(
                Phase::Drops,
                MigrationOperation::DropSequence(DropSequence {
                    sequence: sequence.qualified_name(),
                }),
            );
        }

        for &(before, after) in &sequences.pairs {
            self.diff_sequence(before, after);
        }

        for &sequence in &sequences.added {
            self.ops.push(
                Phase::CreateSequences,
                MigrationOperation::CreateSequence(CreateSequence::from(sequence)),
            );
        }
    }

    fn diff_sequence(&mut self, before: &Sequence, after: &Sequence) {
        let old_name = before.qualified_name();
        let name = after.qualified_name();

        if old_name != name {
            self.ops.push(
                Phase::Renames,
                MigrationOperation::RenameSequence(RenameSequence {
                    sequence: old_name,
                    new_sequence: name.clone(),
                }),
            );
        }

        let old_options = SequenceOptions::from(before);
        let options = SequenceOptions::from(after);
        if old_options != options {
            self.ops.push(
                Phase::Alters,
                MigrationOperation::AlterSequence(AlterSequence {
                    sequence: name.clone(),
                    options,
                    old_options,
                }),
            );
        }

        if before.start_value != after.start_value {
            self.ops.push(
                Phase::RestartSequences,
                MigrationOperation::RestartSequence(RestartSequence {
                    sequence: name,
                    start_value: after.start_value,
                }),
            );
        }
    }
}

fn sorted_tables(snapshot: &Snapshot) -> Vec<&Table> {
    let mut tables: Vec<&Table> = snapshot.tables.iter().collect();
    tables.sort_by_key(|t| t.qualified_name());
    tables
}

fn sorted_sequences(snapshot: &Snapshot) -> Vec<&Sequence> {
    let mut sequences: Vec<&Sequence> = snapshot.sequences.iter().collect();
    sequences.sort_by_key(|s| s.qualified_name());
    sequences
}

fn sorted_by_name<T>(items: &[T], name: impl Fn(&T) -> &SmolStr) -> Vec<&T> {
    let mut sorted: Vec<&T> = items.iter().collect();
    sorted.sort_by(|a, b| name(a).cmp(name(b)));
    sorted
}

/// Share of columns two tables have in common, by name and definition.
fn table_similarity(source: &Table, target: &Table) -> f64 {
    let total = source.columns.len().max(target.columns.len());
    if total == 0 {
        return 0.0;
    }

    let shared = target
        .columns
        .values()
        .filter(|c| {
            source
                .columns
                .get(&c.name)
                .is_some_and(|s| s.same_definition(c))
        })
        .count();

    shared as f64 / total as f64
}

fn type_changed(before: &Column, after: &Column) -> bool {
    before.store_type != after.store_type || before.max_length != after.max_length
}

fn column_phase(column: &Column) -> Phase {
    if column.computed_sql.is_some() {
        Phase::ComputedColumns
    } else {
        Phase::Columns
    }
}
