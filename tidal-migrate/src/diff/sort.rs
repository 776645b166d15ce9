//! Ordering of emitted operations.
//!
//! Operations are collected into phases while the snapshots are compared and
//! flattened at the end. Phase order keeps every intermediate schema valid:
//! foreign keys are dropped before the tables and keys they point at, removals
//! go before renames, renames before creates, and new indexes and foreign keys
//! go last.
//! Table creation and removal are additionally sorted along foreign keys.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::graph::DependencyGraph;
use crate::operation::{AddForeignKey, CreateTable, MigrationOperation};
use crate::snapshot::QualifiedName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Phase {
    DropForeignKeys,
    DropTables,
    /// Indexes, keys and sequences.
    Drops,
    DropColumns,
    EnsureSchemas,
    RenameTables,
    /// Columns, indexes and sequences.
    Renames,
    AlterDatabase,
    CreateSequences,
    AlterTables,
    /// Added and altered stored columns.
    Columns,
    /// Added and altered computed columns, which may read stored ones.
    ComputedColumns,
    /// Keys and sequence options.
    Alters,
    RestartSequences,
    CreateTables,
    /// Indexes and foreign keys.
    Constraints,
    DropSchemas,
}

#[derive(Debug, Default)]
pub(crate) struct OperationSet {
    phases: BTreeMap<Phase, Vec<MigrationOperation>>,
    /// Dropped tables with the principal tables they referenced.
    dropped_tables: Vec<(MigrationOperation, Vec<QualifiedName>)>,
    created_tables: Vec<CreateTable>,
}

impl OperationSet {
    pub(crate) fn push(&mut self, phase: Phase, op: MigrationOperation) {
        self.phases.entry(phase).or_default().push(op);
    }

    pub(crate) fn push_drop_table(&mut self, op: MigrationOperation, principals: Vec<QualifiedName>) {
        self.dropped_tables.push((op, principals));
    }

    pub(crate) fn push_create_table(&mut self, op: CreateTable) {
        self.created_tables.push(op);
    }

    pub(crate) fn into_operations(mut self) -> Vec<MigrationOperation> {
        let dropped = sort_drops(std::mem::take(&mut self.dropped_tables));
        self.phases.entry(Phase::DropTables).or_default().extend(dropped);

        let (created, deferred) = sort_creates(std::mem::take(&mut self.created_tables));
        self.phases
            .entry(Phase::CreateTables)
            .or_default()
            .extend(created.into_iter().map(MigrationOperation::CreateTable));
        self.phases
            .entry(Phase::Constraints)
            .or_default()
            .extend(deferred.into_iter().map(MigrationOperation::AddForeignKey));

        self.phases.into_values().flatten().collect()
    }
}

/// Dependents are dropped before their principals.
fn sort_drops(dropped: Vec<(MigrationOperation, Vec<QualifiedName>)>) -> Vec<MigrationOperation> {
    let mut graph = DependencyGraph::new();
    let mut index: HashMap<QualifiedName, usize> = HashMap::new();
    let mut principals = Vec::with_capacity(dropped.len());

    for (op, refs) in dropped {
        let table = op.table().cloned();
        let node = graph.add_node(op);
        if let Some(table) = table {
            index.insert(table, node);
        }
        principals.push(refs);
    }

    for (dependent, refs) in principals.iter().enumerate() {
        for principal in refs {
            if let Some(&p) = index.get(principal)
                && p != dependent
            {
                graph.add_edge(dependent, p, ());
            }
        }
    }

    // Foreign keys of dropped tables are removed up front, so cycles are harmless.
    graph.sort(|_| {})
}

/// Principals are created before their dependents. A foreign key that closes
/// a cycle is taken out of its table and returned to be added afterwards.
fn sort_creates(created: Vec<CreateTable>) -> (Vec<CreateTable>, Vec<AddForeignKey>) {
    let mut graph = DependencyGraph::new();
    let mut index: HashMap<QualifiedName, usize> = HashMap::new();
    for op in &created {
        index.insert(op.table.clone(), index.len());
    }

    let mut edges = Vec::new();
    for (dependent, op) in created.iter().enumerate() {
        for fk in &op.foreign_keys {
            if fk.is_self_referencing() {
                continue;
            }
            if let Some(&principal) = index.get(&fk.principal_table) {
                edges.push((principal, dependent, (op.table.clone(), fk.name.clone())));
            }
        }
    }

    for op in created {
        graph.add_node(op);
    }
    for (from, to, payload) in edges {
        graph.add_edge(from, to, payload);
    }

    let mut cyclic = Vec::new();
    let mut sorted = graph.sort(|edge| cyclic.push(edge));

    let mut deferred = Vec::new();
    for (table, fk_name) in cyclic {
        debug!(table = %table, foreign_key = %fk_name, "deferring foreign key to break a cycle");
        if let Some(op) = sorted.iter_mut().find(|op| op.table == table)
            && let Some(pos) = op.foreign_keys.iter().position(|fk| fk.name == fk_name)
        {
            deferred.push(op.foreign_keys.remove(pos));
        }
    }

    (sorted, deferred)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{DropConstraint, DropTable};
    use crate::snapshot::ReferentialAction;

    fn create(name: &str, refs: &[&str]) -> CreateTable {
        let table = QualifiedName::new(name);
        CreateTable {
            foreign_keys: refs
                .iter()
                .map(|p| AddForeignKey {
                    table: table.clone(),
                    name: format!("FK_{}_{}", name, p).into(),
                    columns: vec![format!("{}Id", p).into()],
                    principal_table: QualifiedName::new(*p),
                    principal_columns: vec!["Id".into()],
                    on_delete: ReferentialAction::NoAction,
                    annotations: Default::default(),
                })
                .collect(),
            table,
            columns: vec![],
            primary_key: None,
            unique_constraints: vec![],
            annotations: Default::default(),
        }
    }

    fn names(ops: &[MigrationOperation]) -> Vec<String> {
        ops.iter().map(|op| op.to_string()).collect()
    }

    #[test]
    fn test_phase_order() {
        let mut set = OperationSet::default();
        set.push_create_table(create("Orders", &[]));
        set.push(
            Phase::DropForeignKeys,
            MigrationOperation::DropForeignKey(DropConstraint {
                table: QualifiedName::new("Lines"),
                name: "FK_Lines_Orders".into(),
            }),
        );

        assert_eq!(
            names(&set.into_operations()),
            vec!["drop foreign key FK_Lines_Orders on Lines", "create table Orders"]
        );
    }

    #[test]
    fn test_creates_follow_foreign_keys() {
        let mut set = OperationSet::default();
        set.push_create_table(create("Lines", &["Orders"]));
        set.push_create_table(create("Orders", &["Customers"]));
        set.push_create_table(create("Customers", &[]));

        assert_eq!(
            names(&set.into_operations()),
            vec!["create table Customers", "create table Orders", "create table Lines"]
        );
    }

    #[test]
    fn test_cycle_defers_one_foreign_key() {
        let mut set = OperationSet::default();
        set.push_create_table(create("A", &["B"]));
        set.push_create_table(create("B", &["A"]));

        let ops = set.into_operations();
        assert_eq!(
            names(&ops),
            vec![
                "create table A",
                "create table B",
                "add foreign key FK_A_B from A to B"
            ]
        );
        let MigrationOperation::CreateTable(a) = &ops[0] else {
            panic!("expected create table");
        };
        assert!(a.foreign_keys.is_empty());
    }

    #[test]
    fn test_drops_dependents_first() {
        let drop = |name: &str| {
            MigrationOperation::DropTable(DropTable {
                table: QualifiedName::new(name),
                annotations: Default::default(),
            })
        };
        let mut set = OperationSet::default();
        set.push_drop_table(drop("T1"), vec![]);
        set.push_drop_table(drop("T2"), vec![QualifiedName::new("T1")]);

        assert_eq!(
            names(&set.into_operations()),
            vec!["drop table T2", "drop table T1"]
        );
    }
}
