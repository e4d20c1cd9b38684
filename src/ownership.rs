use std::collections::BTreeMap;

use crate::{config::ConfigError, models::is_identifier};

/// OwnershipMode
///
/// Whether a table's rows are scoped to an owning identity, and through which column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipMode {
    Unowned,
    OwnedByColumn(String),
}

/// TableRegistration
///
/// One entry of the registry. Adding an owned table is a new registration; neither the
/// dispatcher nor the composer changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRegistration {
    pub name: String,
    pub ownership: OwnershipMode,
}

impl TableRegistration {
    pub fn unowned(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ownership: OwnershipMode::Unowned,
        }
    }

    pub fn owned_by(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ownership: OwnershipMode::OwnedByColumn(column.into()),
        }
    }
}

/// OwnershipRegistry
///
/// Static table → ownership lookup. Built at startup; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipRegistry {
    tables: BTreeMap<String, OwnershipMode>,
}

impl OwnershipRegistry {
    pub fn new(
        registrations: impl IntoIterator<Item = TableRegistration>,
    ) -> Result<Self, ConfigError> {
        let mut tables = BTreeMap::new();
        for TableRegistration { name, ownership } in registrations {
            if !is_identifier(&name) {
                return Err(ConfigError::InvalidIdentifier(name));
            }
            if let OwnershipMode::OwnedByColumn(column) = &ownership {
                if !is_identifier(column) {
                    return Err(ConfigError::InvalidIdentifier(column.clone()));
                }
            }
            if tables.insert(name.clone(), ownership).is_some() {
                return Err(ConfigError::DuplicateTable(name));
            }
        }
        if tables.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }
        Ok(Self { tables })
    }

    /// parse
    ///
    /// Reads the `RESOURCE_TABLES` format: comma-separated `table` or `table:owner_column`.
    /// e.g. `ideas:user_id,blueprints`
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let registrations = raw
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.split_once(':') {
                Some((table, column)) => {
                    TableRegistration::owned_by(table.trim(), column.trim())
                }
                None => TableRegistration::unowned(entry),
            });
        Self::new(registrations)
    }

    /// policy_for
    ///
    /// `None` means the table is not registered; the composer rejects such requests.
    pub fn policy_for(&self, table: &str) -> Option<&OwnershipMode> {
        self.tables.get(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &OwnershipMode)> {
        self.tables.iter().map(|(name, mode)| (name.as_str(), mode))
    }
}
