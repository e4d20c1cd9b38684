use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use uuid::Uuid;

use crate::{
    composer::{Columns, Filter, ID_COLUMN},
    error::StoreError,
    repository::{Record, TableStore},
};

/// InMemoryTableStore
///
/// A `TableStore` held in process memory. Used when running locally without `DATABASE_URL`
/// and as the store behind the integration tests. Rows keep insertion order, so repeated
/// selects over an unchanged store return identical results.
///
/// Store-generated fields: `id` (UUID v4) and `created_at` (RFC 3339), filled in on insert
/// when the caller did not supply them.
pub struct InMemoryTableStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
    /// When true, every operation returns a simulated store failure.
    pub should_fail: bool,
}

impl Default for InMemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            should_fail: false,
        }
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }

    /// Seeds rows verbatim (no generated fields).
    pub fn with_rows(self, table: &str, rows: impl IntoIterator<Item = Record>) -> Self {
        if let Ok(mut tables) = self.tables.write() {
            tables.entry(table.to_string()).or_default().extend(rows);
        }
        self
    }

    /// Snapshot of a table's rows, bypassing filters. For inspection in tests and tooling.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.read()
            .map(|tables| tables.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.should_fail {
            return Err(StoreError::Rejected(
                "simulated store failure".to_string(),
            ));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Vec<Record>>>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Rejected("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Vec<Record>>>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Rejected("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    async fn insert(&self, table: &str, mut record: Record) -> Result<Record, StoreError> {
        self.check()?;
        record
            .entry(ID_COLUMN)
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        record
            .entry("created_at")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

        let mut tables = self.write()?;
        let rows = tables.entry(table.to_string()).or_default();
        let id_filter = Filter::eq(ID_COLUMN, record[ID_COLUMN].clone());
        if rows.iter().any(|row| id_filter.matches(row)) {
            return Err(StoreError::Rejected(format!(
                "duplicate key value violates unique constraint \"{}_pkey\"",
                table
            )));
        }
        rows.push(record.clone());
        Ok(record)
    }

    async fn select_where(
        &self,
        table: &str,
        columns: &Columns,
        filters: &[Filter],
    ) -> Result<Vec<Record>, StoreError> {
        self.check()?;
        let tables = self.read()?;
        let rows = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| filters.iter().all(|filter| filter.matches(row)))
                    .map(|row| columns.project(row))
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn update_where(
        &self,
        table: &str,
        id: &Value,
        values: Record,
    ) -> Result<Option<Record>, StoreError> {
        self.check()?;
        let id_filter = Filter::eq(ID_COLUMN, id.clone());
        let mut tables = self.write()?;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(None);
        };
        let Some(index) = rows.iter().position(|row| id_filter.matches(row)) else {
            return Ok(None);
        };

        // Primary keys stay unique across updates, as they do on insert.
        if let Some(new_id) = values.get(ID_COLUMN) {
            let new_id_filter = Filter::eq(ID_COLUMN, new_id.clone());
            let taken = rows
                .iter()
                .enumerate()
                .any(|(other, row)| other != index && new_id_filter.matches(row));
            if taken {
                return Err(StoreError::Rejected(format!(
                    "duplicate key value violates unique constraint \"{}_pkey\"",
                    table
                )));
            }
        }

        let row = &mut rows[index];
        row.extend(values);
        Ok(Some(row.clone()))
    }

    async fn delete_where(&self, table: &str, id: &Value) -> Result<Option<Record>, StoreError> {
        self.check()?;
        let id_filter = Filter::eq(ID_COLUMN, id.clone());
        let mut tables = self.write()?;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(None);
        };
        Ok(rows
            .iter()
            .position(|row| id_filter.matches(row))
            .map(|index| rows.remove(index)))
    }
}
