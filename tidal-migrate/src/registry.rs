//! Migration registry.
//!
//! The registry indexes the migrations that belong to one schema context and
//! resolves user-supplied references (a full identity or just the name part)
//! to a single migration.
//!
//! Migrations are not discovered here. An external [`MigrationSource`] hands
//! over plain [`MigrationUnit`] values, each tagged with the name of the
//! context type that owns it. A unit is visible to the active context when its
//! owner is that context or one of the context's base types:
//!
//! ```rust
//! use tidal_migrate::id::MigrationId;
//! use tidal_migrate::registry::{ContextType, MigrationRegistry, MigrationUnit};
//!
//! let base = ContextType::new("ShopContext");
//! let derived = ContextType::new("AuditedShopContext").derived_from(&base);
//!
//! let units = vec![
//!     MigrationUnit::new(MigrationId::parse("20240101000000_Initial").unwrap(), "ShopContext"),
//!     MigrationUnit::new(MigrationId::parse("20240201000000_AddAudit").unwrap(), "AuditedShopContext"),
//! ];
//!
//! let registry = MigrationRegistry::new(derived, &units);
//! assert_eq!(registry.len(), 2);
//! assert_eq!(registry.resolve("addaudit").unwrap().id.name(), "AddAudit");
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::config::RegistryConfig;
use crate::error::{MigrateResult, MigrationError};
use crate::id::MigrationId;
use crate::operation::MigrationOperation;
use crate::plan::MigrationPlan;

/// A schema-context type together with its inheritance chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextType {
    /// Type name.
    pub name: SmolStr,
    /// Base types, nearest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<SmolStr>,
}

impl ContextType {
    /// A context type with no base.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
        }
    }

    /// Derive this type from `base`, inheriting the base's own ancestors.
    pub fn derived_from(mut self, base: &ContextType) -> Self {
        self.bases = std::iter::once(base.name.clone())
            .chain(base.bases.iter().cloned())
            .collect();
        self
    }

    /// Whether `owner` names this type or one of its bases.
    pub fn is_or_derives_from(&self, owner: &str) -> bool {
        self.distance_to(owner).is_some()
    }

    /// Inheritance steps from this type up to `owner`: 0 for the type itself.
    fn distance_to(&self, owner: &str) -> Option<usize> {
        if self.name == owner {
            return Some(0);
        }
        self.bases.iter().position(|b| b == owner).map(|i| i + 1)
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A migration as supplied by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationUnit {
    /// Identity.
    pub id: MigrationId,
    /// Name of the owning context type. `None` when discovery found no
    /// owner metadata; such units are never indexed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<SmolStr>,
    /// Operations applying the migration.
    #[serde(default)]
    pub up: Vec<MigrationOperation>,
    /// Operations reverting the migration.
    #[serde(default)]
    pub down: Vec<MigrationOperation>,
}

impl MigrationUnit {
    /// Create an empty unit owned by `owner`.
    pub fn new(id: MigrationId, owner: impl Into<SmolStr>) -> Self {
        Self {
            id,
            owner: Some(owner.into()),
            up: Vec::new(),
            down: Vec::new(),
        }
    }

    /// Create a unit without owner metadata.
    pub fn unowned(id: MigrationId) -> Self {
        Self {
            id,
            owner: None,
            up: Vec::new(),
            down: Vec::new(),
        }
    }

    /// Attach the operations of a plan.
    pub fn with_plan(mut self, plan: MigrationPlan) -> Self {
        self.up = plan.up;
        self.down = plan.down;
        self
    }

    /// The name part of the identity.
    pub fn name(&self) -> &str {
        self.id.name()
    }
}

/// Supplies discovered migrations to a registry.
pub trait MigrationSource {
    /// Every migration found, in discovery order.
    fn discover(&self) -> Vec<MigrationUnit>;
}

impl MigrationSource for [MigrationUnit] {
    fn discover(&self) -> Vec<MigrationUnit> {
        self.to_vec()
    }
}

impl MigrationSource for Vec<MigrationUnit> {
    fn discover(&self) -> Vec<MigrationUnit> {
        self.clone()
    }
}

/// A problem found while building the index. None of these are fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryWarning {
    /// A migration had no owner metadata and was left out.
    MissingOwner {
        /// The excluded migration.
        migration_id: MigrationId,
    },
    /// Two visible migrations share an identity; the one owned by the
    /// context nearest the active context was kept.
    Shadowed {
        /// The shared identity.
        migration_id: MigrationId,
        /// Owner of the migration that was left out.
        owner: SmolStr,
        /// Owner of the migration that was kept.
        kept_owner: SmolStr,
    },
}

impl fmt::Display for RegistryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingOwner { migration_id } => {
                write!(
                    f,
                    "Migration '{}' has no owning context and was ignored",
                    migration_id
                )
            }
            Self::Shadowed {
                migration_id,
                owner,
                kept_owner,
            } => {
                write!(
                    f,
                    "Migration '{}' owned by '{}' is shadowed by the one owned by '{}'",
                    migration_id, owner, kept_owner
                )
            }
        }
    }
}

/// Read-only index of the migrations visible to one context.
#[derive(Debug, Clone)]
pub struct MigrationRegistry {
    context: ContextType,
    /// Ordered by case-folded identity, then discovery order.
    units: Vec<MigrationUnit>,
    by_id: HashMap<MigrationId, usize>,
    warnings: Vec<RegistryWarning>,
}

impl MigrationRegistry {
    /// Build a registry with default settings.
    pub fn new<S>(context: ContextType, source: &S) -> Self
    where
        S: MigrationSource + ?Sized,
    {
        Self::with_config(context, source, &RegistryConfig::default())
    }

    /// Build a registry.
    pub fn with_config<S>(context: ContextType, source: &S, config: &RegistryConfig) -> Self
    where
        S: MigrationSource + ?Sized,
    {
        let discovered = source.discover();
        let discovered_count = discovered.len();

        let mut warnings = Vec::new();
        // identity -> (inheritance distance, position in `visible`)
        let mut claimed: HashMap<MigrationId, (usize, usize)> = HashMap::new();
        let mut visible: Vec<Option<MigrationUnit>> = Vec::new();

        for unit in discovered {
            let Some(owner) = unit.owner.clone() else {
                if config.warn_on_excluded {
                    warn!(
                        migration = %unit.id,
                        context = %context,
                        "migration has no owning context and was ignored"
                    );
                }
                warnings.push(RegistryWarning::MissingOwner {
                    migration_id: unit.id,
                });
                continue;
            };

            let Some(distance) = context.distance_to(&owner) else {
                debug!(migration = %unit.id, owner = %owner, "migration belongs to another context");
                continue;
            };

            match claimed.get(&unit.id).copied() {
                None => {
                    claimed.insert(unit.id.clone(), (distance, visible.len()));
                    visible.push(Some(unit));
                }
                Some((kept_distance, slot)) => {
                    let kept_owner = visible[slot]
                        .as_ref()
                        .and_then(|u| u.owner.clone())
                        .unwrap_or_default();
                    if distance < kept_distance {
                        warnings.push(RegistryWarning::Shadowed {
                            migration_id: unit.id.clone(),
                            owner: kept_owner,
                            kept_owner: owner,
                        });
                        claimed.insert(unit.id.clone(), (distance, slot));
                        visible[slot] = Some(unit);
                    } else {
                        warnings.push(RegistryWarning::Shadowed {
                            migration_id: unit.id,
                            owner,
                            kept_owner,
                        });
                    }
                }
            }
        }

        let mut units: Vec<MigrationUnit> = visible.into_iter().flatten().collect();
        // Stable: equal keys keep discovery order.
        units.sort_by_cached_key(|u| fold_case(u.id.as_str()));

        let by_id = units
            .iter()
            .enumerate()
            .map(|(i, u)| (u.id.clone(), i))
            .collect();

        debug!(
            context = %context,
            discovered = discovered_count,
            indexed = units.len(),
            excluded = warnings
                .iter()
                .filter(|w| matches!(w, RegistryWarning::MissingOwner { .. }))
                .count(),
            "built migration registry"
        );

        Self {
            context,
            units,
            by_id,
            warnings,
        }
    }

    /// The context this registry was built for.
    pub fn context(&self) -> &ContextType {
        &self.context
    }

    /// Problems found while building the index.
    pub fn warnings(&self) -> &[RegistryWarning] {
        &self.warnings
    }

    /// Number of indexed migrations.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether no migration is indexed.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// All indexed migrations, oldest first.
    pub fn list(&self) -> impl ExactSizeIterator<Item = &MigrationUnit> {
        self.units.iter()
    }

    /// Identities of all indexed migrations, oldest first.
    pub fn ids(&self) -> impl ExactSizeIterator<Item = &MigrationId> {
        self.units.iter().map(|u| &u.id)
    }

    /// Look up a migration by its exact identity.
    pub fn get(&self, id: &str) -> Option<&MigrationUnit> {
        let id = MigrationId::parse(id).ok()?;
        self.by_id.get(&id).map(|&i| &self.units[i])
    }

    /// The newest migration.
    pub fn latest(&self) -> Option<&MigrationUnit> {
        self.units.last()
    }

    /// Resolve a full identity or a migration name, ignoring case.
    ///
    /// Full identities are tried first, then names. When several migrations
    /// match at the same level the oldest one wins.
    pub fn resolve(&self, fragment: &str) -> Option<&MigrationUnit> {
        let folded = fold_case(fragment);

        self.units
            .iter()
            .find(|u| fold_case(u.id.as_str()) == folded)
            .or_else(|| self.units.iter().find(|u| fold_case(u.name()) == folded))
    }

    /// Like [`resolve`](Self::resolve), but a miss is an error carrying the
    /// fragment.
    pub fn resolve_or_fail(&self, fragment: &str) -> MigrateResult<&MigrationUnit> {
        self.resolve(fragment)
            .ok_or_else(|| MigrationError::not_found(fragment))
    }
}

fn fold_case(s: &str) -> String {
    s.to_lowercase()
}
