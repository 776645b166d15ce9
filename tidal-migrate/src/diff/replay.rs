//! Applies operations to an in-memory snapshot.
//!
//! Used by the differ tests to check that emitted operations really turn one
//! snapshot into the other. Every operation must find the objects it names,
//! so an operation emitted in the wrong phase or under the wrong name panics.

use smol_str::SmolStr;

use crate::operation::{AddForeignKey, AddKey, ColumnDefinition, MigrationOperation};
use crate::snapshot::{Column, ForeignKey, Index, Key, QualifiedName, Sequence, Snapshot, Table};

/// Apply `ops` in order to a copy of `snapshot` and normalize the result.
pub(crate) fn replay(snapshot: &Snapshot, ops: &[MigrationOperation]) -> Snapshot {
    let mut snapshot = snapshot.clone();
    for op in ops {
        apply(&mut snapshot, op);
    }
    normalize(&snapshot)
}

/// Drop rename hints and put every collection in name order, so structurally
/// equal snapshots compare equal.
pub(crate) fn normalize(snapshot: &Snapshot) -> Snapshot {
    let mut snapshot = snapshot.clone();
    snapshot.tables.sort_by_key(Table::qualified_name);
    for table in &mut snapshot.tables {
        table.renamed_from = None;
        table.columns.sort_keys();
        for column in table.columns.values_mut() {
            column.renamed_from = None;
        }
        table.unique_constraints.sort_by(|a, b| a.name.cmp(&b.name));
        table.indexes.sort_by(|a, b| a.name.cmp(&b.name));
        table.foreign_keys.sort_by(|a, b| a.name.cmp(&b.name));
    }
    snapshot.sequences.sort_by_key(Sequence::qualified_name);
    snapshot
}

fn apply(snapshot: &mut Snapshot, op: &MigrationOperation) {
    match op {
        // Schemas follow from the objects placed in them.
        MigrationOperation::EnsureSchema(_) | MigrationOperation::DropSchema(_) => {}
        MigrationOperation::AlterDatabase(op) => snapshot.annotations = op.annotations.clone(),

        MigrationOperation::CreateTable(op) => {
            assert!(snapshot.table(&op.table).is_none(), "{} already exists", op.table);
            snapshot.tables.push(Table {
                schema: op.table.schema.clone(),
                name: op.table.name.clone(),
                columns: op.columns.iter().map(|c| (c.name.clone(), column(c))).collect(),
                primary_key: op.primary_key.as_ref().map(key),
                unique_constraints: op.unique_constraints.iter().map(key).collect(),
                indexes: Vec::new(),
                foreign_keys: op.foreign_keys.iter().map(foreign_key).collect(),
                annotations: op.annotations.clone(),
                renamed_from: None,
            });
        }
        MigrationOperation::DropTable(op) => {
            let before = snapshot.tables.len();
            snapshot.tables.retain(|t| t.qualified_name() != op.table);
            assert_eq!(snapshot.tables.len() + 1, before, "no table {}", op.table);
            let referenced = snapshot
                .tables
                .iter()
                .flat_map(|t| &t.foreign_keys)
                .any(|fk| fk.principal_table == op.table);
            assert!(!referenced, "{} dropped while still referenced", op.table);
        }
        MigrationOperation::RenameTable(op) => {
            assert!(snapshot.table(&op.new_table).is_none(), "{} already exists", op.new_table);
            let table = table_mut(snapshot, &op.table);
            table.schema = op.new_table.schema.clone();
            table.name = op.new_table.name.clone();
            for fk in snapshot.tables.iter_mut().flat_map(|t| &mut t.foreign_keys) {
                if fk.principal_table == op.table {
                    fk.principal_table = op.new_table.clone();
                }
            }
        }
        MigrationOperation::AlterTable(op) => {
            table_mut(snapshot, &op.table).annotations = op.annotations.clone();
        }

        MigrationOperation::AddColumn(op) => {
            let table = table_mut(snapshot, &op.table);
            assert!(!table.columns.contains_key(&op.column.name), "{}.{} exists", op.table, op.column.name);
            table.columns.insert(op.column.name.clone(), column(&op.column));
        }
        MigrationOperation::DropColumn(op) => {
            let table = table_mut(snapshot, &op.table);
            assert!(table.columns.shift_remove(&op.name).is_some(), "no column {}.{}", op.table, op.name);
        }
        MigrationOperation::RenameColumn(op) => {
            let table = table_mut(snapshot, &op.table);
            let mut renamed = table
                .columns
                .shift_remove(&op.name)
                .unwrap_or_else(|| panic!("no column {}.{}", op.table, op.name));
            assert!(!table.columns.contains_key(&op.new_name), "{}.{} exists", op.table, op.new_name);
            renamed.name = op.new_name.clone();
            table.columns.insert(op.new_name.clone(), renamed);

            let rename = |columns: &mut Vec<SmolStr>| {
                for c in columns.iter_mut().filter(|c| **c == op.name) {
                    *c = op.new_name.clone();
                }
            };
            if let Some(pk) = &mut table.primary_key {
                rename(&mut pk.columns);
            }
            table.unique_constraints.iter_mut().for_each(|k| rename(&mut k.columns));
            table.indexes.iter_mut().for_each(|i| rename(&mut i.columns));
            table.foreign_keys.iter_mut().for_each(|fk| rename(&mut fk.columns));
            for fk in snapshot.tables.iter_mut().flat_map(|t| &mut t.foreign_keys) {
                if fk.principal_table == op.table {
                    rename(&mut fk.principal_columns);
                }
            }
        }
        MigrationOperation::AlterColumn(op) => {
            let table = table_mut(snapshot, &op.table);
            let current = table
                .columns
                .get_mut(&op.column.name)
                .unwrap_or_else(|| panic!("no column {}.{}", op.table, op.column.name));
            assert_eq!(ColumnDefinition::from(&*current), op.old_column);
            *current = column(&op.column);
        }

        MigrationOperation::AddPrimaryKey(op) => {
            let table = table_mut(snapshot, &op.table);
            assert!(table.primary_key.is_none(), "{} already has a primary key", op.table);
            table.primary_key = Some(key(op));
        }
        MigrationOperation::DropPrimaryKey(op) => {
            let table = table_mut(snapshot, &op.table);
            let dropped = table.primary_key.take().map(|pk| pk.name);
            assert_eq!(dropped.as_ref(), Some(&op.name));
        }
        MigrationOperation::AddUniqueConstraint(op) => {
            table_mut(snapshot, &op.table).unique_constraints.push(key(op));
        }
        MigrationOperation::DropUniqueConstraint(op) => {
            remove_named(&mut table_mut(snapshot, &op.table).unique_constraints, &op.name, |k| &k.name);
        }

        MigrationOperation::CreateIndex(op) => {
            table_mut(snapshot, &op.table).indexes.push(Index {
                name: op.name.clone(),
                columns: op.columns.clone(),
                unique: op.unique,
                filter: op.filter.clone(),
                annotations: op.annotations.clone(),
            });
        }
        MigrationOperation::DropIndex(op) => {
            remove_named(&mut table_mut(snapshot, &op.table).indexes, &op.name, |i| &i.name);
        }
        MigrationOperation::RenameIndex(op) => {
            let table = table_mut(snapshot, &op.table);
            let index = table
                .indexes
                .iter_mut()
                .find(|i| i.name == op.name)
                .unwrap_or_else(|| panic!("no index {} on {}", op.name, op.table));
            index.name = op.new_name.clone();
        }

        MigrationOperation::AddForeignKey(op) => {
            assert!(snapshot.table(&op.principal_table).is_some(), "no table {}", op.principal_table);
            table_mut(snapshot, &op.table).foreign_keys.push(foreign_key(op));
        }
        MigrationOperation::DropForeignKey(op) => {
            remove_named(&mut table_mut(snapshot, &op.table).foreign_keys, &op.name, |fk| &fk.name);
        }

        MigrationOperation::CreateSequence(op) => {
            assert!(snapshot.sequence(&op.sequence).is_none(), "{} already exists", op.sequence);
            snapshot.sequences.push(Sequence {
                schema: op.sequence.schema.clone(),
                name: op.sequence.name.clone(),
                store_type: op.store_type.clone(),
                start_value: op.start_value,
                increment_by: op.options.increment_by,
                min_value: op.options.min_value,
                max_value: op.options.max_value,
                cyclic: op.options.cyclic,
                annotations: op.options.annotations.clone(),
            });
        }
        MigrationOperation::DropSequence(op) => {
            assert!(snapshot.sequence(&op.sequence).is_some(), "no sequence {}", op.sequence);
            snapshot.sequences.retain(|s| s.qualified_name() != op.sequence);
        }
        MigrationOperation::RenameSequence(op) => {
            assert!(snapshot.sequence(&op.new_sequence).is_none(), "{} already exists", op.new_sequence);
            let sequence = sequence_mut(snapshot, &op.sequence);
            sequence.schema = op.new_sequence.schema.clone();
            sequence.name = op.new_sequence.name.clone();
        }
        MigrationOperation::AlterSequence(op) => {
            let sequence = sequence_mut(snapshot, &op.sequence);
            sequence.increment_by = op.options.increment_by;
            sequence.min_value = op.options.min_value;
            sequence.max_value = op.options.max_value;
            sequence.cyclic = op.options.cyclic;
            sequence.annotations = op.options.annotations.clone();
        }
        MigrationOperation::RestartSequence(op) => {
            sequence_mut(snapshot, &op.sequence).start_value = op.start_value;
        }
    }
}

fn table_mut<'s>(snapshot: &'s mut Snapshot, name: &QualifiedName) -> &'s mut Table {
    snapshot
        .tables
        .iter_mut()
        .find(|t| &t.qualified_name() == name)
        .unwrap_or_else(|| panic!("no table {}", name))
}

fn sequence_mut<'s>(snapshot: &'s mut Snapshot, name: &QualifiedName) -> &'s mut Sequence {
    snapshot
        .sequences
        .iter_mut()
        .find(|s| &s.qualified_name() == name)
        .unwrap_or_else(|| panic!("no sequence {}", name))
}

fn remove_named<T>(items: &mut Vec<T>, name: &SmolStr, name_of: impl Fn(&T) -> &SmolStr) {
    let position = items
        .iter()
        .position(|item| name_of(item) == name)
        .unwrap_or_else(|| panic!("no constraint or index {}", name));
    items.remove(position);
}

fn column(definition: &ColumnDefinition) -> Column {
    Column {
        name: definition.name.clone(),
        store_type: definition.store_type.clone(),
        nullable: definition.nullable,
        max_length: definition.max_length,
        default_value: definition.default_value.clone(),
        default_sql: definition.default_sql.clone(),
        computed_sql: definition.computed_sql.clone(),
        annotations: definition.annotations.clone(),
        renamed_from: None,
    }
}

fn key(op: &AddKey) -> Key {
    Key {
        name: op.name.clone(),
        columns: op.columns.clone(),
        annotations: op.annotations.clone(),
    }
}

fn foreign_key(op: &AddForeignKey) -> ForeignKey {
    ForeignKey {
        name: op.name.clone(),
        columns: op.columns.clone(),
        principal_table: op.principal_table.clone(),
        principal_columns: op.principal_columns.clone(),
        on_delete: op.on_delete,
        annotations: op.annotations.clone(),
    }
}
