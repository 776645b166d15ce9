//! Two-way migration plans.

use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};
use crate::operation::MigrationOperation;

/// The operations moving a schema forward, and the ones moving it back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Operations from the source snapshot to the target.
    #[serde(default)]
    pub up: Vec<MigrationOperation>,
    /// Operations from the target snapshot back to the source.
    #[serde(default)]
    pub down: Vec<MigrationOperation>,
}

impl MigrationPlan {
    /// Create a plan.
    pub fn new(up: Vec<MigrationOperation>, down: Vec<MigrationOperation>) -> Self {
        Self { up, down }
    }

    /// Whether the plan changes nothing.
    pub fn is_empty(&self) -> bool {
        self.up.is_empty() && self.down.is_empty()
    }

    /// Operations in the `up` direction that can lose data.
    pub fn destructive_operations(&self) -> impl Iterator<Item = &MigrationOperation> {
        self.up.iter().filter(|op| op.is_destructive())
    }

    /// Fail when the `up` direction would lose data and `allow_data_loss`
    /// is not set.
    pub fn ensure_no_data_loss(&self, allow_data_loss: bool) -> MigrateResult<()> {
        if allow_data_loss {
            return Ok(());
        }

        let destructive: Vec<String> = self
            .destructive_operations()
            .map(ToString::to_string)
            .collect();
        if destructive.is_empty() {
            return Ok(());
        }

        Err(MigrationError::data_loss(format!(
            "{}. Set allow_data_loss=true to proceed.",
            destructive.join(", ")
        )))
    }

    /// A one-line description of the `up` direction.
    pub fn summary(&self) -> String {
        let mut counts: Vec<(&'static str, usize)> = Vec::new();
        for op in &self.up {
            match counts.iter_mut().find(|(kind, _)| *kind == op.kind()) {
                Some((_, n)) => *n += 1,
                None => counts.push((op.kind(), 1)),
            }
        }

        if counts.is_empty() {
            return "No changes".to_string();
        }

        counts
            .into_iter()
            .map(|(kind, n)| format!("{} {}", describe(kind), n))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn describe(kind: &str) -> String {
    let mut words = kind.split('_');
    let mut out = String::new();
    if let Some(first) = words.next() {
        let mut chars = first.chars();
        if let Some(c) = chars.next() {
            out.extend(c.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    for word in words {
        out.push(' ');
        out.push_str(word);
    }
    out.push(':');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{DropColumn, DropTable, SchemaOperation};
    use crate::snapshot::QualifiedName;

    fn drop_table(name: &str) -> MigrationOperation {
        MigrationOperation::DropTable(DropTable {
            table: QualifiedName::new(name),
            annotations: Default::default(),
        })
    }

    #[test]
    fn test_empty_plan() {
        let plan = MigrationPlan::default();
        assert!(plan.is_empty());
        assert_eq!(plan.summary(), "No changes");
        assert!(plan.ensure_no_data_loss(false).is_ok());
    }

    #[test]
    fn test_summary_groups_by_kind() {
        let plan = MigrationPlan::new(
            vec![
                drop_table("A"),
                MigrationOperation::EnsureSchema(SchemaOperation {
                    name: "audit".into(),
                }),
                drop_table("B"),
            ],
            vec![],
        );
        assert_eq!(plan.summary(), "Drop table: 2, Ensure schema: 1");
    }

    #[test]
    fn test_data_loss_guard() {
        let plan = MigrationPlan::new(
            vec![
                drop_table("Legacy"),
                MigrationOperation::DropColumn(DropColumn {
                    table: QualifiedName::new("Users"),
                    name: "Fax".into(),
                }),
            ],
            vec![],
        );

        assert_eq!(plan.destructive_operations().count(), 2);
        let err = plan.ensure_no_data_loss(false).unwrap_err();
        assert!(matches!(err, MigrationError::DataLoss(_)));
        assert!(err.to_string().contains("drop table Legacy"));
        assert!(err.to_string().contains("drop column Users.Fax"));
        assert!(plan.ensure_no_data_loss(true).is_ok());
    }

    #[test]
    fn test_down_direction_is_not_guarded() {
        let plan = MigrationPlan::new(vec![], vec![drop_table("New")]);
        assert!(!plan.is_empty());
        assert!(plan.ensure_no_data_loss(false).is_ok());
    }
}
