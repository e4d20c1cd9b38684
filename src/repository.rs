use crate::{
    composer::{Columns, Filter, FilterOperator, ID_COLUMN},
    error::StoreError,
    ownership::{OwnershipMode, OwnershipRegistry},
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder, types::Json};
use std::sync::Arc;

/// A row as the gateway sees it: a JSON object keyed by column name.
pub type Record = Map<String, Value>;

/// TableStore Trait
///
/// The external table store as the composer consumes it: four filtered primitives, nothing
/// more. Ownership is not a store concept; the composer adds it on top.
///
/// **Send + Sync + async_trait** are required so `Arc<dyn TableStore>` can be shared across
/// Axum's asynchronous task boundaries.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError>;

    async fn select_where(
        &self,
        table: &str,
        columns: &Columns,
        filters: &[Filter],
    ) -> Result<Vec<Record>, StoreError>;

    /// `Ok(None)` when no row carries `id`.
    async fn update_where(
        &self,
        table: &str,
        id: &Value,
        values: Record,
    ) -> Result<Option<Record>, StoreError>;

    /// `Ok(None)` when no row carries `id`.
    async fn delete_where(&self, table: &str, id: &Value) -> Result<Option<Record>, StoreError>;
}

/// StoreState
///
/// The concrete type used to share the table store across the application state.
pub type StoreState = Arc<dyn TableStore>;

/// PostgresTableStore
///
/// `TableStore` backed by PostgreSQL. Every value is bound, never interpolated; identifiers
/// are validated upstream and double-quoted here. Rows travel as `jsonb`.
pub struct PostgresTableStore {
    pool: PgPool,
}

impl PostgresTableStore {
    /// Creates a new store instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// verify_registry
    ///
    /// Startup check: every registered table exists with an `id` column, and every owner
    /// column exists. A mismatch is a hard configuration error.
    pub async fn verify_registry(&self, registry: &OwnershipRegistry) -> Result<(), StoreError> {
        for (table, mode) in registry.tables() {
            let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
                .bind(quote_ident(table))
                .fetch_one(&self.pool)
                .await?;
            if !exists {
                return Err(StoreError::Schema(format!("table `{}` does not exist", table)));
            }

            let mut required = vec![ID_COLUMN];
            if let OwnershipMode::OwnedByColumn(column) = mode {
                required.push(column.as_str());
            }
            for column in required {
                let present: bool = sqlx::query_scalar(
                    "SELECT EXISTS (SELECT 1 FROM information_schema.columns WHERE table_name = $1 AND column_name = $2)",
                )
                .bind(table)
                .bind(column)
                .fetch_one(&self.pool)
                .await?;
                if !present {
                    return Err(StoreError::Schema(format!(
                        "column `{}.{}` does not exist",
                        table, column
                    )));
                }
            }
            tracing::info!(table = %table, ownership = ?mode, "registered table verified");
        }
        Ok(())
    }
}

#[async_trait]
impl TableStore for PostgresTableStore {
    async fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError> {
        let mut builder = build_insert(table, record);
        let Json(row) = builder
            .build_query_scalar::<Json<Record>>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("insert into {} error: {:?}", table, e);
                StoreError::from(e)
            })?;
        Ok(row)
    }

    async fn select_where(
        &self,
        table: &str,
        columns: &Columns,
        filters: &[Filter],
    ) -> Result<Vec<Record>, StoreError> {
        let mut builder = build_select(table, columns, filters);
        let rows = builder
            .build_query_scalar::<Json<Record>>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("select from {} error: {:?}", table, e);
                StoreError::from(e)
            })?;
        Ok(rows.into_iter().map(|Json(row)| row).collect())
    }

    async fn update_where(
        &self,
        table: &str,
        id: &Value,
        values: Record,
    ) -> Result<Option<Record>, StoreError> {
        let mut builder = build_update(table, id, values);
        let row = builder
            .build_query_scalar::<Json<Record>>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("update {} error: {:?}", table, e);
                StoreError::from(e)
            })?;
        Ok(row.map(|Json(row)| row))
    }

    async fn delete_where(&self, table: &str, id: &Value) -> Result<Option<Record>, StoreError> {
        let mut builder = build_delete(table, id);
        let row = builder
            .build_query_scalar::<Json<Record>>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("delete from {} error: {:?}", table, e);
                StoreError::from(e)
            })?;
        Ok(row.map(|Json(row)| row))
    }
}

// --- SQL construction ---

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_list(record: &Record) -> String {
    record
        .keys()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// build_insert
///
/// Only the supplied columns are written; `jsonb_populate_record` coerces the JSON values
/// to the table's column types and every other column keeps its default.
pub fn build_insert(table: &str, record: Record) -> QueryBuilder<'static, Postgres> {
    let table = quote_ident(table);
    let mut builder = QueryBuilder::new(format!("INSERT INTO {} AS t ", table));
    if record.is_empty() {
        builder.push("DEFAULT VALUES");
    } else {
        let columns = column_list(&record);
        builder.push(format!(
            "({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::{table}, "
        ));
        builder.push_bind(Json(Value::Object(record)));
        builder.push(")");
    }
    builder.push(" RETURNING to_jsonb(t) AS record");
    builder
}

/// build_select
///
/// Filters are ANDed, each compared as `jsonb` against a bound value. Rows come back in
/// primary-key order so repeated selects over unchanged data agree.
pub fn build_select(
    table: &str,
    columns: &Columns,
    filters: &[Filter],
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT ");
    match columns {
        Columns::All => {
            builder.push("to_jsonb(t)");
        }
        Columns::List(columns) => {
            let pairs = columns
                .iter()
                .map(|column| format!("'{}', t.{}", column, quote_ident(column)))
                .collect::<Vec<_>>()
                .join(", ");
            builder.push(format!("jsonb_build_object({})", pairs));
        }
    }
    builder.push(format!(" AS record FROM {} AS t WHERE TRUE", quote_ident(table)));
    for filter in filters {
        push_filter(&mut builder, filter);
    }
    builder.push(format!(" ORDER BY t.{}", quote_ident(ID_COLUMN)));
    builder
}

fn push_filter(builder: &mut QueryBuilder<'static, Postgres>, filter: &Filter) {
    let column = format!("to_jsonb(t.{})", quote_ident(&filter.column));
    builder.push(" AND ");
    match filter.operator {
        FilterOperator::In => {
            builder.push(format!("jsonb_build_array({}) ", column));
        }
        _ => {
            builder.push(format!("{} ", column));
        }
    }
    builder.push(filter.operator.sql_symbol());
    builder.push(" ");
    builder.push_bind(Json(filter.value.clone()));
}

pub fn build_update(table: &str, id: &Value, values: Record) -> QueryBuilder<'static, Postgres> {
    let table = quote_ident(table);
    let columns = column_list(&values);
    let mut builder = QueryBuilder::new(format!(
        "UPDATE {table} AS t SET ({columns}) = (SELECT {columns} FROM jsonb_populate_record(NULL::{table}, "
    ));
    builder.push_bind(Json(Value::Object(values)));
    builder.push(format!(")) WHERE to_jsonb(t.{}) = ", quote_ident(ID_COLUMN)));
    builder.push_bind(Json(id.clone()));
    builder.push(" RETURNING to_jsonb(t) AS record");
    builder
}

pub fn build_delete(table: &str, id: &Value) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "DELETE FROM {} AS t WHERE to_jsonb(t.{}) = ",
        quote_ident(table),
        quote_ident(ID_COLUMN)
    ));
    builder.push_bind(Json(id.clone()));
    builder.push(" RETURNING to_jsonb(t) AS record");
    builder
}
